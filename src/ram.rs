//! Flash simulated in RAM.
//!
//! Behaves like NOR flash: erasing sets whole erase units to `0xFF` and programming can only clear bits.
//! Faults can be injected to exercise the wear leveling, and erase counters show where the wear went.
//!
//! ```
//! use flash_env::{EnvConfig, EnvVar, FlashEnv, RamFlash};
//!
//! const DEFAULTS: &[EnvVar] = &[EnvVar::new("boot_times", "0")];
//!
//! let config = EnvConfig::new(0x1000, 0x2000, 0x400).unwrap();
//! let mut env = FlashEnv::init(RamFlash::for_config(&config), config, DEFAULTS).unwrap();
//!
//! env.set("boot_times", "1").unwrap();
//! env.save().unwrap();
//! assert_eq!(env.get("boot_times"), Some("1"));
//! ```

use alloc::{vec, vec::Vec};

use crate::{config::EnvConfig, error::FlashError, Flash};

/// Flash simulated in RAM
#[derive(Debug, Clone)]
pub struct RamFlash {
    base: u32,
    erase_unit: u32,
    memory: Vec<u8>,
    erase_counts: Vec<u32>,
    bad_units: Vec<(usize, FlashError)>,
    failing_erases: u32,
    failing_writes: u32,
}

impl RamFlash {
    /// Creates an erased flash of `size` bytes starting at `base`
    pub fn new(base: u32, size: u32, erase_unit: u32) -> Self {
        assert!(erase_unit > 0, "The erase unit can't be empty");
        assert!(
            base % erase_unit == 0 && size % erase_unit == 0,
            "The flash must consist of whole erase units"
        );

        Self {
            base,
            erase_unit,
            memory: vec![0xFF; size as usize],
            erase_counts: vec![0; (size / erase_unit) as usize],
            bad_units: Vec::new(),
            failing_erases: 0,
            failing_writes: 0,
        }
    }

    /// Creates an erased flash that exactly covers the environment area
    pub fn for_config(config: &EnvConfig) -> Self {
        let erase_unit = config.erase_unit_size();
        let size = (config.total_size() + erase_unit - 1) / erase_unit * erase_unit;
        Self::new(config.start_address(), size, erase_unit)
    }

    /// The bytes stored at the address range
    #[track_caller]
    pub fn contents(&self, address: u32, length: usize) -> &[u8] {
        let start = self.offset(address, length);
        &self.memory[start..start + length]
    }

    /// How often the erase unit containing `address` was erased
    #[track_caller]
    pub fn erase_count(&self, address: u32) -> u32 {
        self.erase_counts[self.offset(address, 0) / self.erase_unit as usize]
    }

    /// How many erase units were erased in total
    pub fn total_erase_count(&self) -> u32 {
        self.erase_counts.iter().sum()
    }

    /// Lets every erase (for [FlashError::EraseFault]) or every write (for [FlashError::WriteFault])
    /// that touches the erase unit containing `address` fail
    #[track_caller]
    pub fn mark_bad(&mut self, address: u32, error: FlashError) {
        let unit = self.offset(address, 0) / self.erase_unit as usize;
        self.bad_units.push((unit, error));
    }

    /// Lets the erase unit containing `address` work again after [Self::mark_bad]
    #[track_caller]
    pub fn repair(&mut self, address: u32) {
        let unit = self.offset(address, 0) / self.erase_unit as usize;
        self.bad_units.retain(|(bad_unit, _)| *bad_unit != unit);
    }

    /// Lets the next `count` erases fail, wherever they are
    pub fn fail_next_erases(&mut self, count: u32) {
        self.failing_erases = count;
    }

    /// Lets the next `count` writes fail, wherever they are
    pub fn fail_next_writes(&mut self, count: u32) {
        self.failing_writes = count;
    }

    /// Flips the lowest bit of the byte at `address`
    #[track_caller]
    pub fn corrupt(&mut self, address: u32) {
        let offset = self.offset(address, 1);
        self.memory[offset] ^= 0x01;
    }

    /// Overwrites the bytes at `address` without erasing and without fault injection
    #[track_caller]
    pub fn overwrite(&mut self, address: u32, data: &[u8]) {
        let start = self.offset(address, data.len());
        self.memory[start..start + data.len()].copy_from_slice(data);
    }

    /// Converts an address range to an offset in the memory
    #[track_caller]
    fn offset(&self, address: u32, length: usize) -> usize {
        assert!(
            address >= self.base
                && (address - self.base) as usize + length <= self.memory.len(),
            "Address range {:#010X}+{} lies outside of the flash",
            address,
            length
        );
        (address - self.base) as usize
    }

    /// The erase units touched by the address range
    fn units(&self, address: u32, length: usize) -> core::ops::Range<usize> {
        let start = self.offset(address, length);
        let unit = self.erase_unit as usize;
        start / unit..(start + length + unit - 1) / unit
    }

    fn is_bad(&self, units: &core::ops::Range<usize>, error: FlashError) -> bool {
        self.bad_units
            .iter()
            .any(|(unit, bad_error)| *bad_error == error && units.contains(unit))
    }
}

impl Flash for RamFlash {
    #[track_caller]
    fn read(&self, address: u32, buffer: &mut [u8]) {
        buffer.copy_from_slice(self.contents(address, buffer.len()));
    }

    #[track_caller]
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        let units = self.units(address, data.len());
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(FlashError::WriteFault);
        }
        if self.is_bad(&units, FlashError::WriteFault) {
            return Err(FlashError::WriteFault);
        }

        let start = self.offset(address, data.len());
        // Programming can only change bits from 1 to 0
        for (flash_byte, data_byte) in self.memory[start..start + data.len()]
            .iter_mut()
            .zip(data)
        {
            *flash_byte &= data_byte;
        }

        Ok(())
    }

    #[track_caller]
    fn erase(&mut self, address: u32, length: u32) -> Result<(), FlashError> {
        let units = self.units(address, length as usize);
        if self.failing_erases > 0 {
            self.failing_erases -= 1;
            return Err(FlashError::EraseFault);
        }
        if self.is_bad(&units, FlashError::EraseFault) {
            return Err(FlashError::EraseFault);
        }

        let unit_size = self.erase_unit as usize;
        for unit in units {
            self.memory[unit * unit_size..(unit + 1) * unit_size].fill(0xFF);
            self.erase_counts[unit] += 1;
        }

        Ok(())
    }
}
