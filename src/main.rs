use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;

use v6502::config::{parse_addr, Config};
use v6502::loader::{self, DumpFormat, Loader, RunOutcome};

/// A virtual 6502 computer: assembler, memory map and CPU interpreter.
#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// More logging; repeat for more detail (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Args)]
struct StartArgs {
    /// Start address ($A000, 0xA000 or decimal); also the assembly origin
    #[arg(long, value_parser = parse_addr)]
    start: Option<u16>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// `$ADDR: BB` listing in a `.hex` file
    Hex,
    /// raw image in a `.rom` file
    Bin,
    Both,
}

impl From<Format> for DumpFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Hex => DumpFormat::Hex,
            Format::Bin => DumpFormat::Bin,
            Format::Both => DumpFormat::Both,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a `.asm` file (or load a raw `.rom`/`.bin` image) and run it
    Run {
        /// Source or image file to run
        file: PathBuf,
        #[command(flatten)]
        placement: StartArgs,
        /// Stop after this many instructions
        #[arg(long)]
        max_steps: Option<u64>,
    },
    /// Assemble a file and write its raw image and/or hex listing
    Dump {
        /// `.asm` file to assemble
        file: PathBuf,
        /// Image destination; defaults to the source name with a `.rom`
        /// extension. The listing goes next to it as `.hex`.
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Format::Both)]
        format: Format,
        #[command(flatten)]
        placement: StartArgs,
        /// Print the symbol table
        #[arg(long)]
        symbols: bool,
    },
    /// Assemble a file without running it
    Check {
        /// `.asm` file to check
        file: PathBuf,
        #[command(flatten)]
        placement: StartArgs,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Run {
            file,
            placement,
            max_steps,
        } => {
            let config = Config {
                max_steps,
                ..Config::with_start(placement.start)
            };
            let input = loader::read_input(&file)?;
            let outcome = Loader::new(config)
                .execute(&input, io::stdin(), io::stdout())
                .with_context(|| format!("failed to run {}", file.display()))?;
            match outcome {
                RunOutcome::Halted => Ok(()),
                RunOutcome::StepLimit => {
                    bail!("{}: step limit reached before halting", file.display())
                }
                RunOutcome::Faulted(fault) => bail!("{}: {}", file.display(), fault),
            }
        }
        Command::Dump {
            file,
            output,
            format,
            placement,
            symbols,
        } => {
            let config = Config::with_start(placement.start);
            let (written, program) = loader::dump(&file, output, format.into(), &config)
                .with_context(|| format!("failed to assemble {}", file.display()))?;
            println!(
                "{}: {} bytes at ${:04X}",
                file.display(),
                program.len(),
                program.image_base()
            );
            for out in written {
                println!("wrote {}", out.display());
            }
            if symbols {
                let mut table: Vec<(&str, u16)> = program.symbols.iter().collect();
                table.sort_by_key(|(name, value)| (*value, *name));
                for (name, value) in table {
                    println!("${:04X}  {}", value, name);
                }
            }
            Ok(())
        }
        Command::Check { file, placement } => {
            let config = Config::with_start(placement.start);
            let source = loader::read_source(&file)?;
            let program = loader::assemble(&source, &config)
                .with_context(|| format!("failed to assemble {}", file.display()))?;
            println!(
                "{}: ok, {} bytes, {} symbols",
                file.display(),
                program.len(),
                program.symbols.len()
            );
            Ok(())
        }
    }
}
