use std::fmt;

use log::debug;

use crate::config::{
    IO_BASE, IO_SIZE, KERNAL_BASE, KERNAL_SIZE, RAM_BASE, RAM_SIZE, ROM_BASE, ROM_SIZE,
};
use crate::error::MemoryError;
use crate::io::IoDevice;

const ADDR_SPACE: u32 = 0x10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Ram,
    // writes are silently dropped, like the real chip
    Rom,
    Io,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Policy::Ram => "RAM",
            Policy::Rom => "ROM",
            Policy::Io => "IO",
        };
        write!(f, "{}", name)
    }
}

/// A contiguous range `[base, end)` with one access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    base: u16,
    end: u32,
    policy: Policy,
}

impl Region {
    pub fn base(&self) -> u16 {
        self.base
    }

    /// Exclusive upper bound; may be $10000.
    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn contains(&self, addr: u16) -> bool {
        (self.base as u32) <= (addr as u32) && (addr as u32) < self.end
    }

    fn overlaps(&self, base: u32, end: u32) -> bool {
        (self.base as u32) < end && base < self.end
    }
}

// a device bound to the ports `[base, end)`
struct Binding {
    base: u16,
    end: u32,
    device: Box<dyn IoDevice>,
}

impl Binding {
    fn contains(&self, addr: u16) -> bool {
        (self.base as u32) <= (addr as u32) && (addr as u32) < self.end
    }
}

/// The 64KB address space. Addresses outside every registered region fall
/// back to plain RAM, so `read` and `write` are total.
pub struct Bus {
    mem: Box<[u8]>,
    // sorted by base, never overlapping
    regions: Vec<Region>,
    devices: Vec<Binding>,
}

impl Default for Bus {
    fn default() -> Self {
        Bus::new()
    }
}

impl Bus {
    /// A bus with no regions: the whole space is default RAM.
    pub fn new() -> Bus {
        Bus {
            mem: vec![0u8; ADDR_SPACE as usize].into_boxed_slice(),
            regions: Vec::new(),
            devices: Vec::new(),
        }
    }

    /// RAM $0000-$9FFF, ROM $A000-$BFFF, IO $D000-$DFFF, KERNAL ROM $E000-$FFFF.
    pub fn with_default_map() -> Result<Bus, MemoryError> {
        let mut bus = Bus::new();
        bus.register_region(RAM_BASE, RAM_SIZE, Policy::Ram)?;
        bus.register_region(ROM_BASE, ROM_SIZE, Policy::Rom)?;
        bus.register_region(IO_BASE, IO_SIZE, Policy::Io)?;
        bus.register_region(KERNAL_BASE, KERNAL_SIZE, Policy::Rom)?;
        Ok(bus)
    }

    pub fn register_region(
        &mut self,
        base: u16,
        length: u32,
        policy: Policy,
    ) -> Result<(), MemoryError> {
        if length == 0 {
            return Err(MemoryError::EmptyRegion(base));
        }
        let end = base as u32 + length;
        if end > ADDR_SPACE {
            return Err(MemoryError::OutOfBounds { base, length });
        }
        if let Some(other) = self.regions.iter().find(|r| r.overlaps(base as u32, end)) {
            return Err(MemoryError::Overlap {
                base,
                end,
                other_base: other.base,
                other_end: other.end,
            });
        }

        let idx = self.regions.partition_point(|r| r.base < base);
        self.regions.insert(idx, Region { base, end, policy });
        debug!("registered {} region ${:04X}..${:05X}", policy, base, end);
        Ok(())
    }

    /// Binds `device` to a single address inside an IO region, replacing any
    /// device already bound there.
    pub fn attach(&mut self, addr: u16, device: Box<dyn IoDevice>) -> Result<(), MemoryError> {
        self.attach_range(addr, 1, device)
    }

    /// Binds one device to the ports `[base, base + length)`. The whole range
    /// must sit inside a single IO region. Bindings it overlaps are dropped.
    pub fn attach_range(
        &mut self,
        base: u16,
        length: u32,
        device: Box<dyn IoDevice>,
    ) -> Result<(), MemoryError> {
        if length == 0 {
            return Err(MemoryError::EmptyRegion(base));
        }
        let end = base as u32 + length;
        let region_end = match self.region_at(base) {
            Some(region) if region.policy == Policy::Io => region.end,
            _ => return Err(MemoryError::NotIo(base)),
        };
        if end > region_end {
            return Err(MemoryError::NotIo(region_end as u16));
        }

        self.devices
            .retain(|b| !((b.base as u32) < end && (base as u32) < b.end));
        self.devices.push(Binding { base, end, device });
        debug!("attached IO device at ${:04X}..${:05X}", base, end);
        Ok(())
    }

    fn device_at(&mut self, addr: u16) -> Option<&mut Box<dyn IoDevice>> {
        self.devices
            .iter_mut()
            .find(|b| b.contains(addr))
            .map(|b| &mut b.device)
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region_at(&self, addr: u16) -> Option<&Region> {
        let idx = self.regions.partition_point(|r| r.base <= addr);
        if idx == 0 {
            return None;
        }
        let region = &self.regions[idx - 1];
        if region.contains(addr) {
            Some(region)
        } else {
            None
        }
    }

    fn policy_at(&self, addr: u16) -> Policy {
        self.region_at(addr).map_or(Policy::Ram, |r| r.policy)
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        if self.policy_at(addr) == Policy::Io {
            if let Some(device) = self.device_at(addr) {
                return device.read(addr);
            }
        }
        self.mem[addr as usize]
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        match self.policy_at(addr) {
            Policy::Rom => {}
            Policy::Io => match self.device_at(addr) {
                Some(device) => device.write(addr, value),
                None => self.mem[addr as usize] = value,
            },
            Policy::Ram => self.mem[addr as usize] = value,
        }
    }

    /// Reads the backing store without side effects; IO devices are not
    /// consulted.
    pub fn peek(&self, addr: u16) -> u8 {
        self.mem[addr as usize]
    }

    /// Load-time write that bypasses the ROM policy. IO addresses are refused.
    pub fn load(&mut self, start_addr: u16, data: &[u8]) -> Result<(), MemoryError> {
        let end = start_addr as u32 + data.len() as u32;
        if end > ADDR_SPACE {
            return Err(MemoryError::OutOfBounds {
                base: start_addr,
                length: data.len() as u32,
            });
        }
        if let Some(io) = self
            .regions
            .iter()
            .find(|r| r.policy == Policy::Io && r.overlaps(start_addr as u32, end))
        {
            return Err(MemoryError::LoadIntoIo(io.base.max(start_addr)));
        }
        let start = start_addr as usize;
        self.mem[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}
