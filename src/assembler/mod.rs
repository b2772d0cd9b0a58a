pub mod parse;

use std::collections::{BTreeMap, HashSet};

use log::{debug, info};

use crate::cpu::addr::AddrMode;
use crate::cpu::spec::{self, Opcode};
use crate::error::{AsmError, AsmErrorKind};
use parse::{ByteSelect, Expr, Index, Line, Operand, Statement};

const ADDR_SPACE: u32 = 0x10000;

pub fn assemble(source: &str, origin: u16) -> Result<Program, AsmError> {
    Assembler::new(origin).assemble(source)
}

/// Label and constant names mapped to their resolved values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    symbols: BTreeMap<String, u16>,
}

impl SymbolTable {
    pub fn get(&self, name: &str) -> Option<u16> {
        self.symbols.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Iterates in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.symbols.iter().map(|(name, value)| (name.as_str(), *value))
    }

    fn insert(&mut self, name: &str, value: u16) -> Result<(), AsmErrorKind> {
        if self.symbols.contains_key(name) {
            return Err(AsmErrorKind::DuplicateLabel(name.to_string()));
        }
        self.symbols.insert(name.to_string(), value);
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<i32> {
        self.get(name).map(i32::from)
    }
}

/// A run of bytes emitted contiguously from `addr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub addr: u16,
    pub bytes: Vec<u8>,
}

impl Segment {
    pub fn end(&self) -> u32 {
        self.addr as u32 + self.bytes.len() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub segments: Vec<Segment>,
    pub symbols: SymbolTable,
    origin: u16,
}

impl Program {
    pub fn origin(&self) -> u16 {
        self.origin
    }

    /// All emitted bytes in source order.
    pub fn bytes(&self) -> Vec<u8> {
        self.segments
            .iter()
            .flat_map(|s| s.bytes.iter().copied())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.bytes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Where the first emitted byte lives; the origin for an empty program.
    pub fn entry(&self) -> u16 {
        self.segments.first().map_or(self.origin, |s| s.addr)
    }

    /// Lowest address covered by `image()`.
    pub fn image_base(&self) -> u16 {
        self.segments
            .iter()
            .map(|s| s.addr)
            .min()
            .unwrap_or(self.origin)
    }

    /// Flat memory image from `image_base()`, gaps zero-filled. Later
    /// segments win where two overlap.
    pub fn image(&self) -> Vec<u8> {
        let base = self.image_base() as usize;
        let end = self
            .segments
            .iter()
            .map(|s| s.end() as usize)
            .max()
            .unwrap_or(base);
        let mut image = vec![0u8; end - base];
        for segment in &self.segments {
            let start = segment.addr as usize - base;
            image[start..start + segment.bytes.len()].copy_from_slice(&segment.bytes);
        }
        image
    }
}

struct SourceLine<'a> {
    number: usize,
    text: &'a str,
    line: Line,
}

impl<'a> SourceLine<'a> {
    fn error(&self, kind: AsmErrorKind) -> AsmError {
        AsmError::new(self.number, self.text, kind)
    }
}

// what pass 1 decided for one line; pass 2 must agree on it
#[derive(Debug, Clone, Copy)]
struct Placement {
    addr: u16,
    mode: Option<AddrMode>,
    len: u32,
}

pub struct Assembler {
    origin: u16,
}

impl Assembler {
    pub fn new(origin: u16) -> Self {
        Assembler { origin }
    }

    pub fn assemble(&self, source: &str) -> Result<Program, AsmError> {
        let lines = source
            .lines()
            .enumerate()
            .map(|(i, text)| {
                parse::parse_line(text)
                    .map(|line| SourceLine {
                        number: i + 1,
                        text,
                        line,
                    })
                    .map_err(|kind| AsmError::new(i + 1, text, kind))
            })
            .collect::<Result<Vec<SourceLine>, AsmError>>()?;

        // `.zp` declarations apply to the whole file, wherever they appear
        let zero_page: HashSet<&str> = lines
            .iter()
            .filter_map(|src| match &src.line.statement {
                Some(Statement::ZeroPage(names)) => Some(names),
                _ => None,
            })
            .flatten()
            .map(|name| name.as_str())
            .collect();

        let (symbols, placements) = self.layout(&lines, &zero_page)?;
        let segments = self.emit(&lines, &placements, &symbols)?;
        let program = Program {
            segments,
            symbols,
            origin: self.origin,
        };
        info!(
            "assembled {} bytes from origin ${:04X}, {} symbols",
            program.len(),
            self.origin,
            program.symbols.len()
        );
        Ok(program)
    }

    // pass 1: addresses, symbol values and addressing modes
    fn layout(
        &self,
        lines: &[SourceLine],
        zero_page: &HashSet<&str>,
    ) -> Result<(SymbolTable, Vec<Placement>), AsmError> {
        let mut symbols = SymbolTable::default();
        let mut placements = Vec::with_capacity(lines.len());
        let mut pc = self.origin as u32;

        for src in lines {
            if let Some(Statement::Org(expr)) = &src.line.statement {
                let value = expr
                    .eval(pc as u16, |name| symbols.lookup(name))
                    .and_then(to_word)
                    .map_err(|kind| src.error(kind))?;
                pc = value as u32;
            }
            // only lines that place something need to sit below $10000
            let needs_addr = src.line.label.is_some()
                || match &src.line.statement {
                    None | Some(Statement::Org(_)) | Some(Statement::ZeroPage(_)) => false,
                    Some(Statement::Define { expr, .. }) => expr.uses_here(),
                    Some(_) => true,
                };
            let here = if needs_addr {
                address(pc).map_err(|kind| src.error(kind))?
            } else {
                pc as u16
            };

            if let Some(label) = &src.line.label {
                symbols.insert(label, here).map_err(|kind| src.error(kind))?;
            }

            let mut mode = None;
            let len = match &src.line.statement {
                None | Some(Statement::Org(_)) | Some(Statement::ZeroPage(_)) => 0,
                Some(Statement::Instruction { opcode, operand }) => {
                    let m = select_mode(*opcode, operand, here, &symbols, zero_page)
                        .map_err(|kind| src.error(kind))?;
                    mode = Some(m);
                    1 + m.size() as u32
                }
                Some(Statement::Byte(items)) => items.len() as u32,
                Some(Statement::Word(items)) => 2 * items.len() as u32,
                Some(Statement::Data(bytes)) => bytes.len() as u32,
                Some(Statement::Res(expr)) => {
                    let count = expr
                        .eval(here, |name| symbols.lookup(name))
                        .map_err(|kind| src.error(kind))?;
                    if !(0..=ADDR_SPACE as i32).contains(&count) {
                        return Err(src.error(AsmErrorKind::ValueOutOfRange {
                            value: count,
                            bits: 16,
                        }));
                    }
                    count as u32
                }
                Some(Statement::Define { name, expr }) => {
                    let value = expr
                        .eval(here, |name| symbols.lookup(name))
                        .and_then(to_word)
                        .map_err(|kind| src.error(kind))?;
                    symbols.insert(name, value).map_err(|kind| src.error(kind))?;
                    0
                }
            };

            pc += len;
            if pc > ADDR_SPACE {
                return Err(src.error(AsmErrorKind::ValueOutOfRange {
                    value: pc as i32,
                    bits: 16,
                }));
            }
            placements.push(Placement { addr: here, mode, len });
        }
        Ok((symbols, placements))
    }

    // pass 2: every symbol is known, emit the bytes
    fn emit(
        &self,
        lines: &[SourceLine],
        placements: &[Placement],
        symbols: &SymbolTable,
    ) -> Result<Vec<Segment>, AsmError> {
        let lookup = |name: &str| symbols.lookup(name);
        let mut segments = vec![Segment {
            addr: self.origin,
            bytes: Vec::new(),
        }];

        for (src, placement) in lines.iter().zip(placements) {
            let here = placement.addr;
            let bytes = match &src.line.statement {
                None | Some(Statement::Define { .. }) | Some(Statement::ZeroPage(_)) => continue,
                Some(Statement::Org(_)) => {
                    let reuse = segments.last().map_or(false, |s| s.bytes.is_empty());
                    match segments.last_mut() {
                        Some(last) if reuse => last.addr = here,
                        _ => segments.push(Segment {
                            addr: here,
                            bytes: Vec::new(),
                        }),
                    }
                    continue;
                }
                Some(Statement::Instruction { opcode, operand }) => match placement.mode {
                    Some(mode) => encode_instruction(*opcode, mode, operand, here, lookup),
                    None => continue,
                },
                Some(Statement::Byte(items)) => items
                    .iter()
                    .map(|expr| expr.eval(here, lookup).and_then(to_byte))
                    .collect(),
                Some(Statement::Word(items)) => items
                    .iter()
                    .map(|expr| expr.eval(here, lookup).and_then(to_word_bytes))
                    .collect::<Result<Vec<[u8; 2]>, AsmErrorKind>>()
                    .map(|words| words.concat()),
                Some(Statement::Res(_)) => Ok(vec![0u8; placement.len as usize]),
                Some(Statement::Data(data)) => Ok(data.clone()),
            }
            .map_err(|kind| src.error(kind))?;

            debug_assert_eq!(bytes.len() as u32, placement.len, "line {}", src.number);
            if let Some(segment) = segments.last_mut() {
                segment.bytes.extend_from_slice(&bytes);
            }
        }

        segments.retain(|s| !s.bytes.is_empty());
        for segment in &segments {
            debug!(
                "segment ${:04X}..${:05X} ({} bytes)",
                segment.addr,
                segment.end(),
                segment.bytes.len()
            );
        }
        Ok(segments)
    }
}

fn address(pc: u32) -> Result<u16, AsmErrorKind> {
    if pc < ADDR_SPACE {
        Ok(pc as u16)
    } else {
        Err(AsmErrorKind::ValueOutOfRange {
            value: pc as i32,
            bits: 16,
        })
    }
}

fn to_byte(value: i32) -> Result<u8, AsmErrorKind> {
    if (-128..=255).contains(&value) {
        Ok(value as u8)
    } else {
        Err(AsmErrorKind::ValueOutOfRange { value, bits: 8 })
    }
}

fn to_zero_page(value: i32) -> Result<u8, AsmErrorKind> {
    if (0..=0xFF).contains(&value) {
        Ok(value as u8)
    } else {
        Err(AsmErrorKind::ValueOutOfRange { value, bits: 8 })
    }
}

fn to_word(value: i32) -> Result<u16, AsmErrorKind> {
    if (0..=0xFFFF).contains(&value) {
        Ok(value as u16)
    } else {
        Err(AsmErrorKind::ValueOutOfRange { value, bits: 16 })
    }
}

// `.word` also takes negatives, stored as two's complement
fn to_word_bytes(value: i32) -> Result<[u8; 2], AsmErrorKind> {
    if (-0x8000..=0xFFFF).contains(&value) {
        Ok((value as u16).to_le_bytes())
    } else {
        Err(AsmErrorKind::ValueOutOfRange { value, bits: 16 })
    }
}

fn unsupported(opcode: Opcode, mode: AddrMode) -> AsmErrorKind {
    AsmErrorKind::UnsupportedAddressingMode {
        mnemonic: opcode.mnemonic(),
        mode: mode.to_string(),
    }
}

/// Picks the addressing mode from operand syntax alone plus what pass 1 knows
/// so far. A reference to a symbol not yet defined takes the absolute form
/// unless every such symbol was declared with `.zp`.
fn select_mode(
    opcode: Opcode,
    operand: &Operand,
    here: u16,
    symbols: &SymbolTable,
    zero_page: &HashSet<&str>,
) -> Result<AddrMode, AsmErrorKind> {
    use AddrMode::*;

    let pick = |mode: AddrMode| {
        if spec::supports(opcode, mode) {
            Ok(mode)
        } else {
            Err(unsupported(opcode, mode))
        }
    };

    match operand {
        Operand::None if spec::supports(opcode, Implied) => Ok(Implied),
        // `LSR` with no operand means `LSR A`
        Operand::None => pick(Accumulator).map_err(|_| unsupported(opcode, Implied)),
        Operand::Accumulator => pick(Accumulator),
        Operand::Immediate(_) => pick(Immediate),
        Operand::Indirect(_) => pick(Indirect),
        Operand::IndirectX(_) => pick(IndirectX),
        Operand::IndirectY(_) => pick(IndirectY),
        Operand::Direct(_, None) if opcode.is_branch() => Ok(Relative),
        Operand::Direct(expr, index) => {
            let (zp, abs) = match index {
                None => (ZeroPage, Absolute),
                Some(Index::X) => (ZeroPageX, AbsoluteX),
                Some(Index::Y) => (ZeroPageY, AbsoluteY),
            };
            if spec::supports(opcode, zp) && fits_zero_page(expr, here, symbols, zero_page) {
                Ok(zp)
            } else if spec::supports(opcode, abs) {
                Ok(abs)
            } else {
                // e.g. `STX addr,Y` only exists in zero page; pass 2 range-checks it
                pick(zp).map_err(|_| unsupported(opcode, abs))
            }
        }
    }
}

fn fits_zero_page(
    expr: &Expr,
    here: u16,
    symbols: &SymbolTable,
    zero_page: &HashSet<&str>,
) -> bool {
    if expr.select != ByteSelect::Whole {
        return true;
    }
    let mut forward = expr.symbols().filter(|name| !symbols.contains(name)).peekable();
    if forward.peek().is_some() {
        return forward.all(|name| zero_page.contains(name));
    }
    matches!(
        expr.eval(here, |name| symbols.lookup(name)),
        Ok(value) if (0..=0xFF).contains(&value)
    )
}

fn encode_instruction<F>(
    opcode: Opcode,
    mode: AddrMode,
    operand: &Operand,
    here: u16,
    lookup: F,
) -> Result<Vec<u8>, AsmErrorKind>
where
    F: Fn(&str) -> Option<i32>,
{
    use AddrMode::*;

    let opcode_byte = spec::encode(opcode, mode).ok_or_else(|| unsupported(opcode, mode))?;
    let mut bytes = vec![opcode_byte];
    let value = match operand.expr() {
        Some(expr) => expr.eval(here, lookup)?,
        None => return Ok(bytes),
    };

    match mode {
        Implied | Accumulator => {}
        Relative => {
            // `value` can be anywhere in i32
            let offset = value as i64 - (here as i64 + 2);
            if !(-128..=127).contains(&offset) {
                let clamped = offset.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
                return Err(AsmErrorKind::BranchOutOfRange(clamped));
            }
            bytes.push(offset as i8 as u8);
        }
        Immediate => bytes.push(to_byte(value)?),
        ZeroPage | ZeroPageX | ZeroPageY | IndirectX | IndirectY => {
            bytes.push(to_zero_page(value)?)
        }
        Absolute | AbsoluteX | AbsoluteY | Indirect => {
            bytes.extend_from_slice(&to_word(value)?.to_le_bytes())
        }
    }
    Ok(bytes)
}
