//! The RAM copy of one data section and the record operations on it

use alloc::{vec, vec::Vec};

use crate::{
    error::EnvError,
    layout::{detail_part_address, Area, END_ADDRESS_INDEX, PARAM_PART_SIZE, WORD_SIZE},
    record::{self, Records},
};

/// Mirror of the data section at [EnvCache::slot].
///
/// The buffer holds the parameter part followed by the detail part, exactly as it is stored in flash.
pub(crate) struct EnvCache {
    area: Area,
    slot: u32,
    buffer: Vec<u8>,
}

impl EnvCache {
    pub fn new(area: Area) -> Self {
        let mut cache = Self {
            area,
            slot: area.first_slot(),
            buffer: vec![0; area.total_size as usize],
        };
        cache.clear();
        cache
    }

    pub fn area(&self) -> Area {
        self.area
    }

    /// The address of the data section this cache belongs to
    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn set_slot(&mut self, slot: u32) {
        self.slot = slot;
    }

    /// Moves the section `stride` bytes forward.
    /// The end address is absolute, so it moves along.
    pub fn relocate(&mut self, stride: u32) {
        self.slot = self.slot.saturating_add(stride);
        self.set_detail_end_address(self.detail_end_address().saturating_add(stride));
    }

    /// Removes all records
    pub fn clear(&mut self) {
        self.set_detail_end_address(self.detail_part_address());
    }

    pub fn detail_part_address(&self) -> u32 {
        detail_part_address(self.slot)
    }

    pub fn detail_end_address(&self) -> u32 {
        self.word(END_ADDRESS_INDEX)
    }

    pub fn set_detail_end_address(&mut self, address: u32) {
        self.set_word(END_ADDRESS_INDEX, address);
    }

    pub fn detail_size(&self) -> u32 {
        self.detail_end_address()
            .saturating_sub(self.detail_part_address())
    }

    /// The parameter part and the detail part together
    pub fn section_size(&self) -> u32 {
        PARAM_PART_SIZE + self.detail_size()
    }

    /// Bytes of the area in use, from its start up to the detail end address
    pub fn used_size(&self) -> u32 {
        self.detail_end_address().saturating_sub(self.area.start)
    }

    #[cfg(feature = "crc-check")]
    pub fn crc(&self) -> u32 {
        self.word(crate::layout::CRC_INDEX)
    }

    #[cfg(feature = "crc-check")]
    pub fn set_crc(&mut self, crc: u32) {
        self.set_word(crate::layout::CRC_INDEX, crc);
    }

    /// The used bytes of the detail part
    pub fn detail(&self) -> &[u8] {
        let start = PARAM_PART_SIZE as usize;
        &self.buffer[start..start + self.detail_size() as usize]
    }

    /// The bytes to program into flash
    pub fn section(&self) -> &[u8] {
        &self.buffer[..self.section_size() as usize]
    }

    /// The first `length` bytes of the detail part, for loading them from flash.
    /// Returns `None` if the cache can't hold that many bytes.
    pub fn detail_buffer_mut(&mut self, length: u32) -> Option<&mut [u8]> {
        let start = PARAM_PART_SIZE as usize;
        let end = start.checked_add(length as usize)?;
        self.buffer.get_mut(start..end)
    }

    pub fn records(&self) -> Records<'_> {
        Records::new(self.detail())
    }

    /// Finds the offset of the record of `key` in the detail part
    pub fn find(&self, key: &str) -> Option<usize> {
        if key.is_empty() {
            log::info!("Environment variable names must not be empty");
            return None;
        }

        self.records()
            .find(|record| record.has_key(key.as_bytes()))
            .map(|record| record.offset)
    }

    /// The value of `key`, up to the terminator
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        let offset = self.find(key)?;
        Records::new(&self.detail()[offset..])
            .next()
            .map(|record| record.value())
    }

    /// Whether a record of `length` bytes can be appended
    fn has_room_for(&self, length: u32) -> bool {
        let capacity = self.buffer.len() as u32;
        self.section_size()
            .checked_add(length)
            .map_or(false, |size| size <= capacity)
            && self
                .used_size()
                .checked_add(length)
                .map_or(false, |size| size <= self.area.total_size)
    }

    /// Writes a new record behind the last one
    fn append(&mut self, key: &str, value: &str) -> Result<(), EnvError> {
        let length = record::encoded_len(key, value);
        if !self.has_room_for(length as u32) {
            log::info!("No room left for environment variable {:?}", key);
            return Err(EnvError::EnvFull);
        }

        let start = (PARAM_PART_SIZE + self.detail_size()) as usize;
        record::encode(key, value, &mut self.buffer[start..start + length]);
        self.set_detail_end_address(self.detail_end_address() + length as u32);

        Ok(())
    }

    /// Adds a variable that doesn't exist yet
    pub fn create(&mut self, key: &str, value: &str) -> Result<(), EnvError> {
        record::validate_key(key)?;
        record::validate_value(value)?;

        if self.find(key).is_some() {
            log::info!("The name {:?} already exists", key);
            return Err(EnvError::NameExists);
        }

        self.append(key, value)
    }

    /// Removes the variable and closes the gap it leaves
    pub fn delete(&mut self, key: &str) -> Result<(), EnvError> {
        record::validate_key(key)?;

        let Some(offset) = self.find(key) else {
            log::info!("Environment variable {:?} not found", key);
            return Err(EnvError::NameError);
        };
        self.remove_at(offset);

        Ok(())
    }

    fn remove_at(&mut self, offset: usize) {
        let detail_size = self.detail_size() as usize;
        let length = match Records::new(&self.detail()[offset..]).next() {
            Some(record) => record.stored_len().min(detail_size - offset),
            None => return,
        };

        let start = PARAM_PART_SIZE as usize + offset;
        let end = PARAM_PART_SIZE as usize + detail_size;
        self.buffer.copy_within(start + length..end, start);
        self.set_detail_end_address(self.detail_end_address() - length as u32);
    }

    /// Sets the variable, deleting it when the value is empty.
    ///
    /// An existing variable is removed and appended again with the new value.
    /// This only happens when the new record fits, so a failed update keeps the old value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), EnvError> {
        if value.is_empty() {
            return self.delete(key);
        }

        record::validate_key(key)?;
        record::validate_value(value)?;

        if let Some(offset) = self.find(key) {
            let old_length = Records::new(&self.detail()[offset..])
                .next()
                .map_or(0, |record| record.stored_len() as u32);
            let new_length = record::encoded_len(key, value) as u32;

            if new_length > old_length && !self.has_room_for(new_length - old_length) {
                log::info!("No room left to update environment variable {:?}", key);
                return Err(EnvError::EnvFull);
            }

            self.remove_at(offset);
        }

        self.append(key, value)
    }

    fn word(&self, index: usize) -> u32 {
        let start = index * WORD_SIZE as usize;
        let mut bytes = [0; WORD_SIZE as usize];
        bytes.copy_from_slice(&self.buffer[start..start + WORD_SIZE as usize]);
        u32::from_ne_bytes(bytes)
    }

    fn set_word(&mut self, index: usize, value: u32) {
        let start = index * WORD_SIZE as usize;
        self.buffer[start..start + WORD_SIZE as usize].copy_from_slice(&value.to_ne_bytes());
    }
}
