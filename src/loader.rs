use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, log_enabled, trace, Level};

use crate::assembler::{self, Program};
use crate::bus::Bus;
use crate::config::{Config, CONSOLE_IN, CONSOLE_OUT};
use crate::cpu::{Cpu, CpuState};
use crate::error::{Fault, LoadError};
use crate::io::{ConsoleIn, ConsoleOut};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Halted,
    Faulted(Fault),
    // the configured step budget ran out first
    StepLimit,
}

/// What a file on disk holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Source(String),
    Image(Vec<u8>),
}

/// `.rom` and `.bin` files are raw images; anything else is assembly source.
pub fn read_input(path: &Path) -> Result<Input, LoadError> {
    let is_image = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("rom") || ext.eq_ignore_ascii_case("bin")
    );
    let input = if is_image {
        fs::read(path).map(Input::Image)
    } else {
        fs::read_to_string(path).map(Input::Source)
    };
    input.map_err(|source| io_error(path, source))
}

pub fn read_source(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> LoadError {
    LoadError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Assembles `source` at the configured origin, or at `start` when given.
pub fn assemble(source: &str, config: &Config) -> Result<Program, LoadError> {
    let origin = config.start.unwrap_or(config.origin);
    Ok(assembler::assemble(source, origin)?)
}

/// What `dump` writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    /// `$ADDR: BB` listing, one line per emitted byte
    Hex,
    /// flat image from the lowest emitted address
    Bin,
    Both,
}

impl DumpFormat {
    fn hex(self) -> bool {
        self != DumpFormat::Bin
    }

    fn bin(self) -> bool {
        self != DumpFormat::Hex
    }
}

/// The `$ADDR: BB` listing of every emitted byte, segment by segment.
pub fn hex_listing(program: &Program) -> String {
    program
        .segments
        .iter()
        .flat_map(|segment| {
            segment
                .bytes
                .iter()
                .enumerate()
                .map(move |(i, b)| (segment.addr as usize + i, *b))
        })
        .map(|(addr, b)| format!("${:04X}: {:02X}\n", addr, b))
        .collect()
}

/// Assembles `source` and writes the requested outputs. The image goes to
/// `out` (default: the source path with a `.rom` extension) and the listing
/// next to it with a `.hex` extension, or to `out` itself when it is the only
/// output. Returns the written paths.
pub fn dump(
    source_path: &Path,
    out: Option<PathBuf>,
    format: DumpFormat,
    config: &Config,
) -> Result<(Vec<PathBuf>, Program), LoadError> {
    let program = assemble(&read_source(source_path)?, config)?;
    let mut written = Vec::new();

    if format.bin() {
        let path = out
            .clone()
            .unwrap_or_else(|| source_path.with_extension("rom"));
        fs::write(&path, program.image()).map_err(|source| io_error(&path, source))?;
        info!(
            "wrote {} bytes (${:04X} base) to {}",
            program.image().len(),
            program.image_base(),
            path.display()
        );
        written.push(path);
    }
    if format.hex() {
        let path = match (&out, format) {
            (Some(out), DumpFormat::Hex) => out.clone(),
            (Some(out), _) => out.with_extension("hex"),
            (None, _) => source_path.with_extension("hex"),
        };
        fs::write(&path, hex_listing(&program)).map_err(|source| io_error(&path, source))?;
        info!("wrote {} line listing to {}", program.len(), path.display());
        written.push(path);
    }
    Ok((written, program))
}

/// Builds the machine and drives it to a terminal state.
pub struct Loader {
    config: Config,
}

impl Loader {
    pub fn new(config: Config) -> Self {
        Loader { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The default memory map with console input and output attached.
    pub fn machine<R, W>(&self, input: R, output: W) -> Result<Bus, LoadError>
    where
        R: Read + 'static,
        W: Write + 'static,
    {
        let mut bus = Bus::with_default_map()?;
        bus.attach(CONSOLE_IN, Box::new(ConsoleIn::new(input)))?;
        bus.attach(CONSOLE_OUT, Box::new(ConsoleOut::new(output)))?;
        Ok(bus)
    }

    /// Loads every segment of `program` and points the CPU at its entry, or
    /// at the configured start address.
    pub fn boot_program(&self, mut bus: Bus, program: &Program) -> Result<Cpu, LoadError> {
        for segment in &program.segments {
            bus.load(segment.addr, &segment.bytes)?;
            debug!(
                "loaded {} bytes at ${:04X}",
                segment.bytes.len(),
                segment.addr
            );
        }
        let start = self.config.start.unwrap_or_else(|| program.entry());
        info!("loaded {} bytes, start ${:04X}", program.len(), start);
        Ok(Cpu::new(bus, start))
    }

    /// Loads a raw image verbatim at the start address.
    pub fn boot_image(&self, mut bus: Bus, image: &[u8]) -> Result<Cpu, LoadError> {
        let start = self.config.start.unwrap_or(self.config.origin);
        bus.load(start, image)?;
        info!("loaded {} byte image at ${:04X}", image.len(), start);
        Ok(Cpu::new(bus, start))
    }

    pub fn boot<R, W>(&self, input: &Input, stdin: R, stdout: W) -> Result<Cpu, LoadError>
    where
        R: Read + 'static,
        W: Write + 'static,
    {
        let bus = self.machine(stdin, stdout)?;
        match input {
            Input::Source(source) => {
                let program = assemble(source, &self.config)?;
                self.boot_program(bus, &program)
            }
            Input::Image(image) => self.boot_image(bus, image),
        }
    }

    /// Steps `cpu` until it halts, faults or spends the step budget.
    pub fn run(&self, cpu: &mut Cpu) -> RunOutcome {
        loop {
            if let Some(max_steps) = self.config.max_steps {
                if cpu.steps() >= max_steps {
                    info!("step limit {} reached at ${:04X}", max_steps, cpu.pc());
                    return RunOutcome::StepLimit;
                }
            }
            if log_enabled!(Level::Trace) {
                trace!("{}", cpu.trace());
            }
            match cpu.step() {
                Ok(CpuState::Running) => {}
                Ok(_) => {
                    info!(
                        "halted at ${:04X} after {} steps, {} cycles",
                        cpu.pc(),
                        cpu.steps(),
                        cpu.total_cycles()
                    );
                    return RunOutcome::Halted;
                }
                Err(fault) => return RunOutcome::Faulted(fault),
            }
        }
    }

    /// Assembles or loads `input`, then runs it on a fresh machine.
    pub fn execute<R, W>(&self, input: &Input, stdin: R, stdout: W) -> Result<RunOutcome, LoadError>
    where
        R: Read + 'static,
        W: Write + 'static,
    {
        let mut cpu = self.boot(input, stdin, stdout)?;
        Ok(self.run(&mut cpu))
    }
}

/// Assembles `source` with the default configuration and runs it against the
/// given console streams.
pub fn run_source<R, W>(source: &str, stdin: R, stdout: W) -> Result<RunOutcome, LoadError>
where
    R: Read + 'static,
    W: Write + 'static,
{
    Loader::new(Config::default()).execute(&Input::Source(source.to_string()), stdin, stdout)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::ROM_BASE;
    use crate::error::AsmErrorKind;
    use crate::io::Capture;
    use std::io::empty;

    #[test]
    fn test_run_echo() {
        let out = Capture::new();
        let source = "
        loop:
            LDA $D010
            BEQ done
            STA $D020
            JMP loop
        done:
            BRK
        ";
        let outcome = run_source(source, &b"hi!"[..], out.clone()).unwrap();
        assert_eq!(outcome, RunOutcome::Halted);
        assert_eq!(out.text(), "hi!");
    }

    #[test]
    fn test_step_limit() {
        let config = Config {
            max_steps: Some(10),
            ..Config::default()
        };
        let loader = Loader::new(config);
        let input = Input::Source("spin: JMP spin".to_string());
        let mut cpu = loader.boot(&input, empty(), Capture::new()).unwrap();
        assert_eq!(loader.run(&mut cpu), RunOutcome::StepLimit);
        assert_eq!(cpu.steps(), 10);
        assert_eq!(cpu.state(), CpuState::Running);
    }

    #[test]
    fn test_boot_image_at_start() {
        let loader = Loader::new(Config::with_start(Some(0x0300)));
        let image = Input::Image(vec![0xE8, 0xE8, 0x00]);
        let mut cpu = loader.boot(&image, empty(), Capture::new()).unwrap();
        assert_eq!(cpu.pc(), 0x0300);
        assert_eq!(loader.run(&mut cpu), RunOutcome::Halted);
        assert_eq!(cpu.registers().x, 2);
    }

    #[test]
    fn test_program_lands_in_rom() {
        let loader = Loader::new(Config::default());
        let input = Input::Source("  LDA #1\n  STA $A000\n  BRK".to_string());
        let mut cpu = loader.boot(&input, empty(), Capture::new()).unwrap();
        assert_eq!(cpu.pc(), ROM_BASE);
        assert_eq!(loader.run(&mut cpu), RunOutcome::Halted);
        // the store hit ROM and was dropped
        assert_eq!(cpu.bus.peek(ROM_BASE), 0xA9);
    }

    #[test]
    fn test_assembly_error_surfaces() {
        let err = run_source("  LDA #1\n  BOGUS\n", empty(), Capture::new()).unwrap_err();
        match err {
            LoadError::Asm(e) => {
                assert_eq!(e.line, 2);
                assert_eq!(e.kind, AsmErrorKind::UnknownMnemonic("BOGUS".to_string()));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_hex_listing() {
        let program = assembler::assemble("  LDA #1\n  .org $C000\n  .byte $FF", 0x0600).unwrap();
        assert_eq!(hex_listing(&program), "$0600: A9\n$0601: 01\n$C000: FF\n");
    }

    #[test]
    fn test_dump_formats() {
        let dir = std::env::temp_dir().join(format!("v6502-dump-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let source = dir.join("prog.asm");
        fs::write(&source, "  LDX #$41\n  BRK\n").unwrap();
        let config = Config::default();

        let (written, program) = dump(&source, None, DumpFormat::Both, &config).unwrap();
        assert_eq!(written, vec![dir.join("prog.rom"), dir.join("prog.hex")]);
        assert_eq!(fs::read(&written[0]).unwrap(), program.image());
        assert_eq!(
            fs::read_to_string(&written[1]).unwrap(),
            "$A000: A2\n$A001: 41\n$A002: 00\n"
        );

        let out = dir.join("listing.txt");
        let (written, _) = dump(&source, Some(out.clone()), DumpFormat::Hex, &config).unwrap();
        assert_eq!(written, vec![out.clone()]);
        assert!(fs::read_to_string(&out).unwrap().starts_with("$A000: A2"));

        let (written, _) = dump(&source, None, DumpFormat::Bin, &config).unwrap();
        assert_eq!(written, vec![dir.join("prog.rom")]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_into_io_rejected() {
        let loader = Loader::new(Config::default());
        let input = Input::Source("  .org $D000\n  NOP\n".to_string());
        let err = loader.boot(&input, empty(), Capture::new()).err().unwrap();
        assert!(matches!(err, LoadError::Memory(_)), "{}", err);
    }
}
