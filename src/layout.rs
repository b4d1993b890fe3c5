//! Address and size arithmetic of the environment area
//!
//! All addresses are absolute flash addresses. The values stored in flash
//! (active slot address, detail end address) are absolute as well.

use core::mem::size_of;

/// The size of a word in bytes
pub const WORD_SIZE: u32 = size_of::<u32>() as u32;

/// The value of an erased word. Stored in the system section it means "no active data section".
pub const SENTINEL: u32 = 0xFFFF_FFFF;

/// The word index of the detail end address in the parameter part
pub const END_ADDRESS_INDEX: usize = 0;
/// The word index of the CRC32 in the parameter part
#[cfg(feature = "crc-check")]
pub const CRC_INDEX: usize = 1;

/// The number of words in the parameter part of a data section
#[cfg(feature = "crc-check")]
pub const PARAM_PART_WORDS: u32 = 2;
/// The number of words in the parameter part of a data section
#[cfg(not(feature = "crc-check"))]
pub const PARAM_PART_WORDS: u32 = 1;

/// The size of the parameter part of a data section in bytes
pub const PARAM_PART_SIZE: u32 = PARAM_PART_WORDS * WORD_SIZE;

/// Rounds the length up to the next multiple of the word size
pub const fn align_to_word(length: usize) -> usize {
    (length + WORD_SIZE as usize - 1) / WORD_SIZE as usize * WORD_SIZE as usize
}

/// The start of the detail part of the data section at `slot_address`
pub const fn detail_part_address(slot_address: u32) -> u32 {
    slot_address + PARAM_PART_SIZE
}

/// The flash region reserved for the environment
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Area {
    /// The first address of the area, also the address of the system section
    pub start: u32,
    /// The size of the area in bytes
    pub total_size: u32,
    /// The smallest erasable size of the flash
    pub erase_unit: u32,
}

impl Area {
    /// The first address after the area
    pub const fn end(&self) -> u32 {
        self.start + self.total_size
    }

    /// The address of the system section
    pub const fn system_section(&self) -> u32 {
        self.start
    }

    /// The first data section position, right after the system section
    pub const fn first_slot(&self) -> u32 {
        self.start + self.erase_unit
    }

    /// Whether a data section of `section_size` bytes placed at `slot_address` lies inside the area
    pub fn slot_fits(&self, slot_address: u32, section_size: u32) -> bool {
        slot_address >= self.first_slot()
            && slot_address
                .checked_add(section_size)
                .map_or(false, |end| end <= self.end())
    }

    /// Whether a stored active slot address can point at a data section.
    /// Data sections start on an erase unit boundary, the sentinel never does.
    pub fn is_valid_slot(&self, slot_address: u32) -> bool {
        slot_address != SENTINEL
            && self.slot_fits(slot_address, PARAM_PART_SIZE)
            && (slot_address - self.start) % self.erase_unit == 0
    }

    /// The distance to the next slot when a section of `section_size` bytes failed to be stored.
    ///
    /// It is the footprint of the section rounded up to whole erase units,
    /// so the new slot never overlaps a unit of the failed one.
    pub const fn relocation_stride(&self, section_size: u32) -> u32 {
        let units = (section_size + self.erase_unit - 1) / self.erase_unit;
        let units = if units == 0 { 1 } else { units };
        units * self.erase_unit
    }

    /// How many bytes of records fit in the first data section
    pub const fn first_slot_capacity(&self) -> u32 {
        self.total_size - self.erase_unit - PARAM_PART_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AREA: Area = Area {
        start: 0x1000,
        total_size: 0x4000,
        erase_unit: 0x400,
    };

    #[test]
    fn word_alignment() {
        assert_eq!(align_to_word(0), 0);
        assert_eq!(align_to_word(1), 4);
        assert_eq!(align_to_word(4), 4);
        assert_eq!(align_to_word(5), 8);
    }

    #[test]
    fn slot_bounds() {
        assert!(!AREA.slot_fits(AREA.start, 4));
        assert!(AREA.slot_fits(AREA.first_slot(), 4));
        assert!(AREA.slot_fits(AREA.end() - 0x10, 0x10));
        assert!(!AREA.slot_fits(AREA.end() - 0x10, 0x14));
        assert!(!AREA.slot_fits(u32::MAX - 2, 8));
        assert!(!AREA.is_valid_slot(SENTINEL));
        assert!(!AREA.is_valid_slot(AREA.end()));
        assert!(AREA.is_valid_slot(AREA.first_slot() + 0x400));
    }

    #[test]
    fn slot_must_be_on_erase_unit() {
        assert!(AREA.is_valid_slot(AREA.first_slot()));
        assert!(!AREA.is_valid_slot(AREA.first_slot() + 1));
        assert!(!AREA.is_valid_slot(AREA.first_slot() + WORD_SIZE));
        assert!(!AREA.is_valid_slot(AREA.end() - 0x400 + 0x200));
    }

    #[test]
    fn stride_covers_whole_section() {
        assert_eq!(AREA.relocation_stride(0), 0x400);
        assert_eq!(AREA.relocation_stride(0x20), 0x400);
        assert_eq!(AREA.relocation_stride(0x400), 0x400);
        assert_eq!(AREA.relocation_stride(0x401), 0x800);
    }

    #[test]
    fn detail_part_follows_parameters() {
        assert_eq!(detail_part_address(0x1400), 0x1400 + PARAM_PART_SIZE);
        assert_eq!(
            AREA.first_slot_capacity(),
            0x4000 - 0x400 - PARAM_PART_SIZE
        );
    }
}
