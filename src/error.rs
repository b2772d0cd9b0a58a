use thiserror::Error;

/// Setup-time failures of the memory subsystem.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum MemoryError {
    #[error("region ${base:04X}..${end:04X} overlaps existing region ${other_base:04X}..${other_end:04X}")]
    Overlap {
        base: u16,
        end: u32,
        other_base: u16,
        other_end: u32,
    },
    #[error("region at ${base:04X} with length {length:#X} exceeds the 64KB address space")]
    OutOfBounds { base: u16, length: u32 },
    #[error("region at ${0:04X} has zero length")]
    EmptyRegion(u16),
    #[error("${0:04X} is not inside an IO region")]
    NotIo(u16),
    #[error("cannot load program bytes into IO address ${0:04X}")]
    LoadIntoIo(u16),
}

/// Why an assembly run stopped.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum AsmErrorKind {
    #[error("unknown mnemonic '{0}'")]
    UnknownMnemonic(String),
    #[error("invalid operand syntax '{0}'")]
    InvalidOperandSyntax(String),
    #[error("{mnemonic} does not support {mode} addressing")]
    UnsupportedAddressingMode { mnemonic: String, mode: String },
    #[error("label '{0}' is defined more than once")]
    DuplicateLabel(String),
    #[error("unknown label '{0}'")]
    UnknownLabel(String),
    #[error("branch target is {0} bytes away, outside -128..=127")]
    BranchOutOfRange(i32),
    #[error("value {value} does not fit in {bits} bits")]
    ValueOutOfRange { value: i32, bits: u8 },
    #[error("invalid directive '{0}'")]
    InvalidDirective(String),
}

/// An assembly failure, pinned to the offending source line.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("line {line}: {kind}\n    {source_line}")]
pub struct AsmError {
    pub line: usize,
    pub source_line: String,
    pub kind: AsmErrorKind,
}

impl AsmError {
    pub fn new(line: usize, source_line: &str, kind: AsmErrorKind) -> Self {
        AsmError {
            line,
            source_line: source_line.trim().to_string(),
            kind,
        }
    }
}

/// Execution-time fault. Terminal: a faulted CPU never resumes.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum Fault {
    #[error("invalid opcode ${opcode:02X} at ${addr:04X}")]
    InvalidOpcode { addr: u16, opcode: u8 },
}

impl Fault {
    pub fn addr(&self) -> u16 {
        match self {
            Fault::InvalidOpcode { addr, .. } => *addr,
        }
    }
}

/// Anything the loader can surface to its caller.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Asm(#[from] AsmError),
    #[error(transparent)]
    Fault(#[from] Fault),
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
