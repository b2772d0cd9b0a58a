use std::fmt;

/// Raw operand bytes as they sit after the opcode, before any register or
/// memory indirection is applied.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Address {
    Implied,
    Accumulator,
    Immediate(u8),
    ZeroPage(u8),
    ZeroPageX(u8),
    ZeroPageY(u8),
    Absolute(u16),
    AbsoluteX(u16),
    AbsoluteY(u16),
    Indirect(u16),
    IndirectX(u8),
    IndirectY(u8),
    Relative(i8),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddrMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
    Relative,
}

impl AddrMode {
    /// Number of operand bytes following the opcode.
    pub fn size(&self) -> u8 {
        match self {
            Self::Implied | Self::Accumulator => 0,
            Self::Immediate => 1,
            Self::ZeroPage | Self::ZeroPageX | Self::ZeroPageY => 1,
            Self::Absolute | Self::AbsoluteX | Self::AbsoluteY => 2,
            Self::Indirect => 2,
            Self::IndirectX | Self::IndirectY => 1,
            Self::Relative => 1,
        }
    }

    pub fn fetch<'a, I>(&self, bytes: I) -> Address
    where
        I: Iterator<Item = &'a u8>,
    {
        let value = read_bytes(bytes, self.size());
        match self {
            Self::Implied => Address::Implied,
            Self::Accumulator => Address::Accumulator,
            Self::Immediate => Address::Immediate(value as u8),
            Self::ZeroPage => Address::ZeroPage(value as u8),
            Self::ZeroPageX => Address::ZeroPageX(value as u8),
            Self::ZeroPageY => Address::ZeroPageY(value as u8),
            Self::Absolute => Address::Absolute(value),
            Self::AbsoluteX => Address::AbsoluteX(value),
            Self::AbsoluteY => Address::AbsoluteY(value),
            Self::Indirect => Address::Indirect(value),
            Self::IndirectX => Address::IndirectX(value as u8),
            Self::IndirectY => Address::IndirectY(value as u8),
            Self::Relative => Address::Relative(value as u8 as i8),
        }
    }
}

impl fmt::Display for AddrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Implied => "implied",
            Self::Accumulator => "accumulator",
            Self::Immediate => "immediate",
            Self::ZeroPage => "zero page",
            Self::ZeroPageX => "zero page,X",
            Self::ZeroPageY => "zero page,Y",
            Self::Absolute => "absolute",
            Self::AbsoluteX => "absolute,X",
            Self::AbsoluteY => "absolute,Y",
            Self::Indirect => "indirect",
            Self::IndirectX => "(indirect,X)",
            Self::IndirectY => "(indirect),Y",
            Self::Relative => "relative",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Implied => Ok(()),
            Address::Accumulator => write!(f, "A"),
            Address::Immediate(v) => write!(f, "#${:02X}", v),
            Address::ZeroPage(a) => write!(f, "${:02X}", a),
            Address::ZeroPageX(a) => write!(f, "${:02X},X", a),
            Address::ZeroPageY(a) => write!(f, "${:02X},Y", a),
            Address::Absolute(a) => write!(f, "${:04X}", a),
            Address::AbsoluteX(a) => write!(f, "${:04X},X", a),
            Address::AbsoluteY(a) => write!(f, "${:04X},Y", a),
            Address::Indirect(a) => write!(f, "(${:04X})", a),
            Address::IndirectX(a) => write!(f, "(${:02X},X)", a),
            Address::IndirectY(a) => write!(f, "(${:02X}),Y", a),
            Address::Relative(d) => write!(f, "*{:+}", d),
        }
    }
}

fn read_bytes<'a, I>(mut bytes: I, num_bytes: u8) -> u16
where
    I: Iterator<Item = &'a u8>,
{
    match num_bytes {
        0 => 0u16,
        1 => bytes.next().copied().unwrap_or(0) as u16,
        _ => {
            let b0 = bytes.next().copied().unwrap_or(0);
            let b1 = bytes.next().copied().unwrap_or(0);
            u16::from_le_bytes([b0, b1])
        }
    }
}

#[cfg(test)]
mod test {
    use itertools::izip;

    use super::*;

    #[test]
    fn test_addr_mode_fetch_single_addr() {
        let bytes_list: Vec<Vec<u8>> = vec![
            vec![0xAB, 0xCD],
            vec![0xC0],
            vec![0xFE],
            vec![0x00, 0xF0],
            vec![],
        ];
        let addr_modes = vec![
            AddrMode::Absolute,
            AddrMode::ZeroPageY,
            AddrMode::Relative,
            AddrMode::Indirect,
            AddrMode::Accumulator,
        ];
        let expected_addrs = vec![
            Address::Absolute(0xCDAB),
            Address::ZeroPageY(0xC0),
            Address::Relative(-2),
            Address::Indirect(0xF000),
            Address::Accumulator,
        ];
        for (bytes, addr_mode, expected_addr) in izip!(bytes_list, addr_modes, expected_addrs) {
            let actual_addr = addr_mode.fetch(bytes.iter());
            assert_eq!(actual_addr, expected_addr);
        }
    }

    #[test]
    fn test_addr_mode_fetch_multiple_addr() {
        let bytes = vec![0xA0, 0xB0, 0xC0, 0xD0, 0x12, 0x34, 0x56];
        let mut iter = bytes.iter();
        assert_eq!(
            AddrMode::Absolute.fetch(&mut iter),
            Address::Absolute(0xB0A0)
        );
        assert_eq!(
            AddrMode::AbsoluteX.fetch(&mut iter),
            Address::AbsoluteX(0xD0C0)
        );
        assert_eq!(
            AddrMode::Immediate.fetch(&mut iter),
            Address::Immediate(0x12)
        );
        assert_eq!(
            AddrMode::Indirect.fetch(&mut iter),
            Address::Indirect(0x5634)
        );
    }

    #[test]
    fn test_address_display() {
        let addrs = vec![
            Address::Immediate(0x41),
            Address::IndirectX(0x20),
            Address::IndirectY(0x20),
            Address::AbsoluteY(0xD020),
            Address::Relative(-3),
            Address::Implied,
        ];
        let texts = vec!["#$41", "($20,X)", "($20),Y", "$D020,Y", "*-3", ""];
        for (addr, text) in izip!(addrs, texts) {
            assert_eq!(addr.to_string(), text);
        }
    }
}
