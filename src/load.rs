//! Restoring the cache from flash

use crate::{
    env::FlashEnv,
    error::EnvError,
    layout::{detail_part_address, SENTINEL, WORD_SIZE},
    Flash,
};

/// What [FlashEnv::load] found in flash
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoadState {
    /// The stored data section was loaded
    Ready,
    /// The stored data was unusable, so the default variables were installed and saved
    Defaults(DefaultReason),
}

/// Why the default variables were installed
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DefaultReason {
    /// The system section is erased, the environment was never saved
    Uninitialized,
    /// The system section points outside of the area
    SlotOutOfRange,
    /// The detail end address of the data section is outside of the area
    EndOutOfRange,
    /// The CRC of the data section doesn't match its contents
    CrcMismatch,
}

impl<'a, F: Flash> FlashEnv<'a, F> {
    /// Loads the variables from flash.
    ///
    /// When the stored environment is missing or damaged, the defaults are installed and saved.
    /// An error is only returned when saving the defaults failed.
    pub fn load(&mut self) -> Result<LoadState, EnvError> {
        match self.read_stored_section() {
            Ok(()) => {
                log::debug!(
                    "Loaded environment from {:#010X}, {} bytes",
                    self.cache.slot(),
                    self.cache.detail_size()
                );
                Ok(LoadState::Ready)
            }
            Err(reason) => {
                log::warn!("Environment is unusable ({:?}), setting it to default", reason);
                self.load_defaults()?;
                Ok(LoadState::Defaults(reason))
            }
        }
    }

    fn read_stored_section(&mut self) -> Result<(), DefaultReason> {
        let area = self.cache.area();

        let slot = self.read_word(area.system_section());
        if slot == SENTINEL {
            self.stored_slot = None;
            self.cache.set_slot(area.first_slot());
            return Err(DefaultReason::Uninitialized);
        }
        if !area.is_valid_slot(slot) {
            self.stored_slot = None;
            self.cache.set_slot(area.first_slot());
            return Err(DefaultReason::SlotOutOfRange);
        }
        self.stored_slot = Some(slot);
        self.cache.set_slot(slot);

        let end_address = self.read_word(slot);
        let detail_address = detail_part_address(slot);
        if end_address < detail_address
            || end_address > area.end()
            || (end_address - detail_address) % WORD_SIZE != 0
        {
            return Err(DefaultReason::EndOutOfRange);
        }

        let detail_size = end_address - detail_address;
        let Some(detail) = self.cache.detail_buffer_mut(detail_size) else {
            return Err(DefaultReason::EndOutOfRange);
        };
        self.flash.read(detail_address, detail);
        self.cache.set_detail_end_address(end_address);

        #[cfg(feature = "crc-check")]
        {
            let crc = self.read_word(slot + crate::layout::CRC_INDEX as u32 * WORD_SIZE);
            self.cache.set_crc(crc);
            if !crate::integrity::is_valid(&self.cache) {
                log::info!("Environment CRC check failed");
                return Err(DefaultReason::CrcMismatch);
            }
            log::debug!("Environment CRC check is OK");
        }

        Ok(())
    }

    fn read_word(&self, address: u32) -> u32 {
        let mut bytes = [0; WORD_SIZE as usize];
        self.flash.read(address, &mut bytes);
        u32::from_ne_bytes(bytes)
    }
}
