pub mod addr;
pub mod spec;
pub mod status;
pub mod trace;

use log::warn;

use crate::bus::Bus;
use crate::config::STACK_BASE;
use crate::error::Fault;
use addr::AddrMode;
use spec::Spec;
pub use status::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuState {
    Running,
    Halted,
    Faulted(Fault),
}

impl CpuState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CpuState::Running)
    }
}

/// The register file. Every field wraps at its own width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub pc: u16,
    pub status: Status,
}

impl Registers {
    pub fn reset(pc: u16) -> Registers {
        Registers {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFF,
            pc,
            status: Status::reset_value(),
        }
    }
}

/// Where an instruction's operand lives once the addressing mode is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Implied,
    Accumulator,
    Immediate(u8),
    Memory(u16),
    Branch(u16),
}

#[derive(Clone, Copy, Debug)]
pub struct Instruction {
    pub addr: u16,
    pub spec: Spec,
    pub operand: Operand,
    pub cycles: u32,
}

pub struct Cpu {
    regs: Registers,
    state: CpuState,
    total_cycles: u64,
    steps: u64,
    pub bus: Bus,
}

impl Cpu {
    pub fn new(bus: Bus, start: u16) -> Cpu {
        Cpu {
            regs: Registers::reset(start),
            state: CpuState::Running,
            total_cycles: 0,
            steps: 0,
            bus,
        }
    }

    pub fn reset(&mut self, start: u16) {
        self.regs = Registers::reset(start);
        self.state = CpuState::Running;
        self.total_cycles = 0;
        self.steps = 0;
    }

    pub fn registers(&self) -> Registers {
        self.regs
    }

    pub fn set_registers(&mut self, regs: Registers) {
        self.regs = regs;
    }

    pub fn pc(&self) -> u16 {
        self.regs.pc
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.regs.pc = pc;
    }

    pub fn status(&self) -> Status {
        self.regs.status
    }

    pub fn state(&self) -> CpuState {
        self.state
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn run(&mut self) -> Result<CpuState, Fault> {
        self.run_with_callback(|_| {})
    }

    /// Steps until the engine halts or faults, calling `callback` before each
    /// instruction.
    pub fn run_with_callback<F: FnMut(&mut Cpu)>(
        &mut self,
        mut callback: F,
    ) -> Result<CpuState, Fault> {
        while self.state == CpuState::Running {
            callback(self);
            self.step()?;
        }
        Ok(self.state)
    }

    /// Executes exactly one instruction. A halted engine stays halted; a
    /// faulted one reports its fault again without touching any state.
    pub fn step(&mut self) -> Result<CpuState, Fault> {
        match self.state {
            CpuState::Running => {}
            CpuState::Halted => return Ok(CpuState::Halted),
            CpuState::Faulted(fault) => return Err(fault),
        }

        let inst = match self.fetch_next_instruction() {
            Ok(inst) => inst,
            Err(fault) => {
                warn!("{}", fault);
                self.state = CpuState::Faulted(fault);
                return Err(fault);
            }
        };
        self.execute_inst(inst);
        self.total_cycles += inst.cycles as u64;
        self.steps += 1;
        Ok(self.state)
    }

    fn fetch_next_instruction(&mut self) -> Result<Instruction, Fault> {
        let addr = self.regs.pc;
        let opcode_byte = self.read(addr);
        self.regs.pc = addr.wrapping_add(1);
        let spec = spec::lookup(opcode_byte).ok_or(Fault::InvalidOpcode {
            addr,
            opcode: opcode_byte,
        })?;
        let (operand, page_crossed) = self.resolve_operand(spec.addr_mode);
        let extra = (page_crossed && spec.inc_cycle_on_page_crossed) as u32;
        Ok(Instruction {
            addr,
            spec,
            operand,
            cycles: spec.base_cycles as u32 + extra,
        })
    }

    // consumes the operand bytes at PC; returns (operand, page crossed)
    fn resolve_operand(&mut self, addr_mode: AddrMode) -> (Operand, bool) {
        use addr::AddrMode::*;

        let pc = self.regs.pc;
        let operand = match addr_mode {
            Implied => (Operand::Implied, false),
            Accumulator => (Operand::Accumulator, false),
            Immediate => (Operand::Immediate(self.read(pc)), false),
            ZeroPage => (Operand::Memory(self.read(pc) as u16), false),
            ZeroPageX => {
                let base = self.read(pc);
                (Operand::Memory(base.wrapping_add(self.regs.x) as u16), false)
            }
            ZeroPageY => {
                let base = self.read(pc);
                (Operand::Memory(base.wrapping_add(self.regs.y) as u16), false)
            }
            Absolute => (Operand::Memory(self.read_u16(pc)), false),
            AbsoluteX => {
                let base = self.read_u16(pc);
                let addr = base.wrapping_add(self.regs.x as u16);
                (Operand::Memory(addr), page_crossed(base, addr))
            }
            AbsoluteY => {
                let base = self.read_u16(pc);
                let addr = base.wrapping_add(self.regs.y as u16);
                (Operand::Memory(addr), page_crossed(base, addr))
            }
            Indirect => {
                // NMOS quirk: the pointer's high byte never carries into the next page
                let ptr = self.read_u16(pc);
                let hi_ptr = (ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF);
                let lo = self.read(ptr);
                let hi = self.read(hi_ptr);
                (Operand::Memory(u16::from_le_bytes([lo, hi])), false)
            }
            IndirectX => {
                let zp = self.read(pc).wrapping_add(self.regs.x);
                (Operand::Memory(self.read_zero_page_u16(zp)), false)
            }
            IndirectY => {
                let zp = self.read(pc);
                let base = self.read_zero_page_u16(zp);
                let addr = base.wrapping_add(self.regs.y as u16);
                (Operand::Memory(addr), page_crossed(base, addr))
            }
            Relative => {
                let offset = self.read(pc) as i8;
                let next = pc.wrapping_add(1);
                (Operand::Branch(next.wrapping_add(offset as u16)), false)
            }
        };
        self.regs.pc = pc.wrapping_add(addr_mode.size() as u16);
        operand
    }

    fn execute_inst(&mut self, inst: Instruction) {
        use spec::Opcode::*;
        use status::Status as S;

        let operand = inst.operand;
        match inst.spec.opcode {
            ADC => {
                let value = self.load(operand);
                self.add_with_carry(value);
            }
            SBC => {
                let value = self.load(operand);
                self.add_with_carry(!value);
            }
            AND => {
                self.regs.a &= self.load(operand);
                self.update_zero_and_negative(self.regs.a);
            }
            ORA => {
                self.regs.a |= self.load(operand);
                self.update_zero_and_negative(self.regs.a);
            }
            EOR => {
                self.regs.a ^= self.load(operand);
                self.update_zero_and_negative(self.regs.a);
            }
            ASL => {
                let value = self.load(operand);
                let result = value << 1;
                self.set_flag(S::CARRY, value & 0x80 != 0);
                self.update_zero_and_negative(result);
                self.store(operand, result);
            }
            LSR => {
                let value = self.load(operand);
                let result = value >> 1;
                self.set_flag(S::CARRY, value & 0x01 != 0);
                self.update_zero_and_negative(result);
                self.store(operand, result);
            }
            ROL => {
                let value = self.load(operand);
                let result = (value << 1) | self.flag(S::CARRY) as u8;
                self.set_flag(S::CARRY, value & 0x80 != 0);
                self.update_zero_and_negative(result);
                self.store(operand, result);
            }
            ROR => {
                let value = self.load(operand);
                let result = (value >> 1) | ((self.flag(S::CARRY) as u8) << 7);
                self.set_flag(S::CARRY, value & 0x01 != 0);
                self.update_zero_and_negative(result);
                self.store(operand, result);
            }
            BCC => self.branch_if(operand, !self.flag(S::CARRY)),
            BCS => self.branch_if(operand, self.flag(S::CARRY)),
            BEQ => self.branch_if(operand, self.flag(S::ZERO)),
            BNE => self.branch_if(operand, !self.flag(S::ZERO)),
            BMI => self.branch_if(operand, self.flag(S::NEGATIVE)),
            BPL => self.branch_if(operand, !self.flag(S::NEGATIVE)),
            BVS => self.branch_if(operand, self.flag(S::OVERFLOW)),
            BVC => self.branch_if(operand, !self.flag(S::OVERFLOW)),
            BIT => {
                let value = self.load(operand);
                self.set_flag(S::ZERO, value & self.regs.a == 0);
                self.set_flag(S::NEGATIVE, value & 0x80 != 0);
                self.set_flag(S::OVERFLOW, value & 0x40 != 0);
            }
            BRK => {
                self.set_flag(S::BREAK, true);
                self.state = CpuState::Halted;
            }
            CLC => self.set_flag(S::CARRY, false),
            CLD => self.set_flag(S::DECIMAL, false),
            CLI => self.set_flag(S::INTERRUPT_DISABLE, false),
            CLV => self.set_flag(S::OVERFLOW, false),
            SEC => self.set_flag(S::CARRY, true),
            SED => self.set_flag(S::DECIMAL, true),
            SEI => self.set_flag(S::INTERRUPT_DISABLE, true),
            CMP => {
                let value = self.load(operand);
                self.compare(self.regs.a, value);
            }
            CPX => {
                let value = self.load(operand);
                self.compare(self.regs.x, value);
            }
            CPY => {
                let value = self.load(operand);
                self.compare(self.regs.y, value);
            }
            DEC => {
                let result = self.load(operand).wrapping_sub(1);
                self.store(operand, result);
                self.update_zero_and_negative(result);
            }
            DEX => {
                self.regs.x = self.regs.x.wrapping_sub(1);
                self.update_zero_and_negative(self.regs.x);
            }
            DEY => {
                self.regs.y = self.regs.y.wrapping_sub(1);
                self.update_zero_and_negative(self.regs.y);
            }
            INC => {
                let result = self.load(operand).wrapping_add(1);
                self.store(operand, result);
                self.update_zero_and_negative(result);
            }
            INX => {
                self.regs.x = self.regs.x.wrapping_add(1);
                self.update_zero_and_negative(self.regs.x);
            }
            INY => {
                self.regs.y = self.regs.y.wrapping_add(1);
                self.update_zero_and_negative(self.regs.y);
            }
            JMP => {
                if let Operand::Memory(target) = operand {
                    self.regs.pc = target;
                }
            }
            JSR => {
                if let Operand::Memory(target) = operand {
                    // the pushed return address points at the last byte of JSR
                    self.stack_push_u16(self.regs.pc.wrapping_sub(1));
                    self.regs.pc = target;
                }
            }
            RTS => {
                self.regs.pc = self.stack_pop_u16().wrapping_add(1);
            }
            RTI => {
                let pulled = self.stack_pop();
                self.regs.status.restore_from(pulled);
                self.regs.pc = self.stack_pop_u16();
            }
            LDA => {
                self.regs.a = self.load(operand);
                self.update_zero_and_negative(self.regs.a);
            }
            LDX => {
                self.regs.x = self.load(operand);
                self.update_zero_and_negative(self.regs.x);
            }
            LDY => {
                self.regs.y = self.load(operand);
                self.update_zero_and_negative(self.regs.y);
            }
            NOP => {}
            PHA => self.stack_push(self.regs.a),
            PHP => self.stack_push(self.regs.status.to_pushed_byte()),
            PLA => {
                self.regs.a = self.stack_pop();
                self.update_zero_and_negative(self.regs.a);
            }
            PLP => {
                let pulled = self.stack_pop();
                self.regs.status.restore_from(pulled);
            }
            STA => self.store(operand, self.regs.a),
            STX => self.store(operand, self.regs.x),
            STY => self.store(operand, self.regs.y),
            TAX => {
                self.regs.x = self.regs.a;
                self.update_zero_and_negative(self.regs.x);
            }
            TAY => {
                self.regs.y = self.regs.a;
                self.update_zero_and_negative(self.regs.y);
            }
            TSX => {
                self.regs.x = self.regs.sp;
                self.update_zero_and_negative(self.regs.x);
            }
            TXA => {
                self.regs.a = self.regs.x;
                self.update_zero_and_negative(self.regs.a);
            }
            TXS => self.regs.sp = self.regs.x,
            TYA => {
                self.regs.a = self.regs.y;
                self.update_zero_and_negative(self.regs.a);
            }
        }
    }

    fn add_with_carry(&mut self, value: u8) {
        use status::Status as S;

        let acc = self.regs.a;
        let sum = acc as u16 + value as u16 + self.flag(S::CARRY) as u16;
        let result = sum as u8;
        self.set_flag(S::CARRY, sum > 0xFF);
        self.set_flag(S::OVERFLOW, (acc ^ result) & (value ^ result) & 0x80 != 0);
        self.regs.a = result;
        self.update_zero_and_negative(result);
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.set_flag(Status::CARRY, register >= value);
        self.update_zero_and_negative(register.wrapping_sub(value));
    }

    fn branch_if(&mut self, operand: Operand, condition: bool) {
        if let (true, Operand::Branch(target)) = (condition, operand) {
            // taken branches cost one cycle, two when they cross a page
            self.total_cycles += 1 + page_crossed(self.regs.pc, target) as u64;
            self.regs.pc = target;
        }
    }

    fn load(&mut self, operand: Operand) -> u8 {
        match operand {
            Operand::Accumulator => self.regs.a,
            Operand::Immediate(value) => value,
            Operand::Memory(addr) => self.read(addr),
            Operand::Implied | Operand::Branch(_) => 0,
        }
    }

    fn store(&mut self, operand: Operand, value: u8) {
        match operand {
            Operand::Accumulator => self.regs.a = value,
            Operand::Memory(addr) => self.write(addr, value),
            Operand::Implied | Operand::Immediate(_) | Operand::Branch(_) => {}
        }
    }

    fn read(&mut self, addr: u16) -> u8 {
        self.bus.read(addr)
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.bus.write(addr, value);
    }

    fn read_u16(&mut self, addr: u16) -> u16 {
        let a = self.read(addr);
        let b = self.read(addr.wrapping_add(1));
        u16::from_le_bytes([a, b])
    }

    // pointer fetch that wraps inside the zero page
    fn read_zero_page_u16(&mut self, zp: u8) -> u16 {
        let a = self.read(zp as u16);
        let b = self.read(zp.wrapping_add(1) as u16);
        u16::from_le_bytes([a, b])
    }

    fn flag(&self, flag: Status) -> bool {
        self.regs.status.contains(flag)
    }

    fn set_flag(&mut self, flag: Status, set: bool) {
        self.regs.status.set(flag, set);
    }

    fn update_zero_and_negative(&mut self, result: u8) {
        self.set_flag(Status::ZERO, result == 0);
        self.set_flag(Status::NEGATIVE, result & 0b1000_0000 != 0);
    }

    fn stack_push(&mut self, data: u8) {
        self.write(STACK_BASE + self.regs.sp as u16, data);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
    }

    fn stack_pop(&mut self) -> u8 {
        self.regs.sp = self.regs.sp.wrapping_add(1);
        self.read(STACK_BASE + self.regs.sp as u16)
    }

    fn stack_push_u16(&mut self, data: u16) {
        let [lo, hi] = data.to_le_bytes();
        self.stack_push(hi);
        self.stack_push(lo);
    }

    fn stack_pop_u16(&mut self) -> u16 {
        let lo = self.stack_pop();
        let hi = self.stack_pop();
        u16::from_le_bytes([lo, hi])
    }
}

fn page_crossed(a: u16, b: u16) -> bool {
    a & 0xFF00 != b & 0xFF00
}
