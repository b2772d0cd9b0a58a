use bitflags::bitflags;

bitflags! {
    // 7  bit  0
    // ---- ----
    // NV.B DIZC
    // |||| ||||
    // |||| |||+- Carry
    // |||| ||+-- Zero
    // |||| |+--- Interrupt Disable
    // |||| +---- Decimal (stored only, arithmetic stays binary)
    // |||+------ Break, set by BRK when the machine halts
    // ||+------- unused, always pushed as 1
    // |+-------- Overflow
    // +--------- Negative
    pub struct Status: u8 {
        const CARRY             = 0b00000001;
        const ZERO              = 0b00000010;
        const INTERRUPT_DISABLE = 0b00000100;
        const DECIMAL           = 0b00001000;
        const BREAK             = 0b00010000;
        const OVERFLOW          = 0b01000000;
        const NEGATIVE          = 0b10000000;
    }
}

const UNUSED_BIT: u8 = 0b0010_0000;

impl Status {
    /// Power-on value: everything clear except Interrupt Disable.
    pub fn reset_value() -> Self {
        Status::INTERRUPT_DISABLE
    }

    /// The byte PHP writes to the stack: B and the unused bit read as 1.
    pub fn to_pushed_byte(self) -> u8 {
        (self | Status::BREAK).bits() | UNUSED_BIT
    }

    /// Applies a byte pulled by PLP/RTI. Break is not a real latch, so it
    /// keeps its current value.
    pub fn restore_from(&mut self, pulled: u8) {
        let keep_break = self.contains(Status::BREAK);
        *self = Status::from_bits_truncate(pulled);
        self.set(Status::BREAK, keep_break);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_status_bits() {
        let mut status = Status::empty();
        assert_eq!(status.bits(), 0b0000_0000);

        status.set(Status::CARRY, true);
        status.insert(Status::NEGATIVE);
        assert_eq!(status.bits(), 0b1000_0001);
        assert_eq!(status.to_pushed_byte(), 0b1011_0001);

        status.remove(Status::NEGATIVE);
        assert_eq!(status.bits(), 0b0000_0001);
    }

    #[test]
    fn test_restore_keeps_break() {
        let mut status = Status::empty();
        status.restore_from(0xFF);
        assert_eq!(status, Status::all() - Status::BREAK);

        let mut status = Status::BREAK;
        status.restore_from(0x00);
        assert_eq!(status, Status::BREAK);
    }
}
