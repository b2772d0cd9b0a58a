use super::addr::{AddrMode, Address};
use super::spec;
use super::Cpu;
use crate::bus::Bus;

/// One decoded instruction as it sits in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disassembly {
    pub addr: u16,
    pub bytes: Vec<u8>,
    pub asm: String,
}

/// Decodes the instruction at `addr` without side effects. Bytes outside the
/// instruction set come back as a `.byte` line.
pub fn disassemble(bus: &Bus, addr: u16) -> Disassembly {
    let opcode_byte = bus.peek(addr);
    let spec = match spec::lookup(opcode_byte) {
        Some(spec) => spec,
        None => {
            return Disassembly {
                addr,
                bytes: vec![opcode_byte],
                asm: format!(".byte ${:02X}", opcode_byte),
            }
        }
    };

    let bytes: Vec<u8> = (0..spec.encoded_len() as u16)
        .map(|i| bus.peek(addr.wrapping_add(i)))
        .collect();
    let operand = spec.addr_mode.fetch(bytes[1..].iter());
    let operand_asm = match operand {
        // branches read better as their absolute target
        Address::Relative(offset) => {
            let next = addr.wrapping_add(spec.encoded_len() as u16);
            format!("${:04X}", next.wrapping_add(offset as u16))
        }
        other => other.to_string(),
    };

    let asm = if spec.addr_mode == AddrMode::Implied {
        spec.opcode.mnemonic()
    } else {
        format!("{} {}", spec.opcode.mnemonic(), operand_asm)
    };
    Disassembly { addr, bytes, asm }
}

impl Cpu {
    /// A log line for the instruction about to execute, in the usual
    /// `PC  BYTES  ASM  REGISTERS` layout.
    pub fn trace(&self) -> String {
        let regs = self.registers();
        let inst = disassemble(&self.bus, regs.pc);
        let inst_bytes_str: String = inst
            .bytes
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<String>>()
            .join(" ");
        format!(
            "{:04X}  {:8}  {:15}  A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X} CYC:{}",
            regs.pc,
            inst_bytes_str,
            inst.asm,
            regs.a,
            regs.x,
            regs.y,
            regs.status.bits(),
            regs.sp,
            self.total_cycles()
        )
    }
}
