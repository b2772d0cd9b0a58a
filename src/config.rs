/*
  _______________ $10000
 | KERNAL ROM    |
 |_______________| $E000
 | I/O           |   $D010 console in, $D020 console out
 |_______________| $D000
 | (unmapped)    |   default RAM backing
 |_______________| $C000
 | ROM           |   assembler target
 |_______________| $A000
 | Screen /      |
 | Program RAM   |
 |_ _ _ _ _ _ _ _| $0200
 | Stack         |
 |_ _ _ _ _ _ _ _| $0100
 | Zero Page     |
 |_______________| $0000
*/

pub const RAM_BASE: u16 = 0x0000;
pub const RAM_SIZE: u32 = 0xA000;
pub const ROM_BASE: u16 = 0xA000;
pub const ROM_SIZE: u32 = 0x2000;
pub const IO_BASE: u16 = 0xD000;
pub const IO_SIZE: u32 = 0x1000;
pub const KERNAL_BASE: u16 = 0xE000;
pub const KERNAL_SIZE: u32 = 0x2000;

pub const CONSOLE_IN: u16 = 0xD010;
pub const CONSOLE_OUT: u16 = 0xD020;

pub const STACK_BASE: u16 = 0x0100;

/// Run-time knobs shared by the loader and the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address the assembler starts emitting at, absent `.org`.
    pub origin: u16,
    /// Explicit start address; overrides both the origin and the program entry.
    pub start: Option<u16>,
    /// Stop after this many instructions; `None` runs until halt or fault.
    pub max_steps: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            origin: ROM_BASE,
            start: None,
            max_steps: None,
        }
    }
}

impl Config {
    pub fn with_start(start: Option<u16>) -> Self {
        Config {
            origin: start.unwrap_or(ROM_BASE),
            start,
            ..Config::default()
        }
    }
}

/// Parses `$A000`, `0xA000` or plain decimal.
pub fn parse_addr(s: &str) -> Result<u16, String> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix('$') {
        u16::from_str_radix(hex, 16)
    } else if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16)
    } else {
        s.parse::<u16>()
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", s, e))
}
