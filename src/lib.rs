pub mod assembler;
pub mod bus;
pub mod config;
pub mod cpu;
pub mod error;
pub mod io;
pub mod loader;

pub use assembler::{assemble, Assembler, Program, SymbolTable};
pub use bus::{Bus, Policy, Region};
pub use config::Config;
pub use cpu::{Cpu, CpuState, Registers, Status};
pub use error::{AsmError, AsmErrorKind, Fault, LoadError, MemoryError};
pub use loader::{Input, Loader, RunOutcome};
