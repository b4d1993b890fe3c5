//! Configuration of the environment area

use crate::{
    error::ConfigError,
    layout::{Area, PARAM_PART_SIZE, WORD_SIZE},
};

/// Where the environment lives in flash.
///
/// The area starts with one erase unit for the system section. The rest holds the data section,
/// which moves forward through the area when the flash fails.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct EnvConfig {
    area: Area,
}

impl EnvConfig {
    /// Validates the area.
    ///
    /// `total_size` must be word aligned, `start_address` must be aligned to `erase_unit_size`
    /// and the area must be able to hold the system section and one data section.
    pub fn new(
        start_address: u32,
        total_size: u32,
        erase_unit_size: u32,
    ) -> Result<Self, ConfigError> {
        if total_size == 0 || erase_unit_size == 0 {
            return Err(ConfigError::ZeroSize);
        }
        if total_size % WORD_SIZE != 0 {
            return Err(ConfigError::UnalignedSize(total_size));
        }
        if erase_unit_size % WORD_SIZE != 0 {
            return Err(ConfigError::UnalignedEraseUnit(erase_unit_size));
        }
        if start_address % erase_unit_size != 0 {
            return Err(ConfigError::UnalignedStart(start_address));
        }
        if start_address.checked_add(total_size).is_none() {
            return Err(ConfigError::AddressOverflow);
        }
        if total_size < erase_unit_size + PARAM_PART_SIZE {
            return Err(ConfigError::AreaTooSmall {
                total: total_size,
                erase_unit: erase_unit_size,
            });
        }

        log::debug!(
            "Env start address is {:#010X}, size is {} bytes",
            start_address,
            total_size
        );

        Ok(Self {
            area: Area {
                start: start_address,
                total_size,
                erase_unit: erase_unit_size,
            },
        })
    }

    /// Takes the area from the `_env_area_start` and `_env_area_end` linker symbols
    #[cfg(feature = "linker-area")]
    pub fn from_linker_symbols(erase_unit_size: u32) -> Result<Self, ConfigError> {
        let range = linker_area::env_area_range();
        Self::new(range.start, range.end - range.start, erase_unit_size)
    }

    /// The first address of the area
    pub fn start_address(&self) -> u32 {
        self.area.start
    }

    /// The size of the area in bytes
    pub fn total_size(&self) -> u32 {
        self.area.total_size
    }

    /// The smallest erasable unit of the flash
    pub fn erase_unit_size(&self) -> u32 {
        self.area.erase_unit
    }

    pub(crate) fn area(&self) -> Area {
        self.area
    }
}

#[cfg(feature = "linker-area")]
mod linker_area {
    //! The environment area as defined by the linker script

    use core::ops::Range;

    extern "C" {
        static _env_area_start: u32;
        static _env_area_end: u32;
    }

    /// The address range of the environment area
    pub fn env_area_range() -> Range<u32> {
        unsafe {
            let start = core::ptr::addr_of!(_env_area_start) as u32;
            let end = core::ptr::addr_of!(_env_area_end) as u32;
            start..end
        }
    }
}
