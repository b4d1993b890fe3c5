//! Storing the cache in flash with wear leveling.
//!
//! The data section is erased and programmed at its current slot. When either fails,
//! the section is moved forward by its size rounded up to whole erase units and stored again,
//! until it succeeds or the area runs out. The system section is only touched when the slot changed.

use arrayvec::ArrayVec;

use crate::{
    env::FlashEnv,
    error::{EnvError, FlashError},
    layout::{SENTINEL, WORD_SIZE},
    Flash,
};

/// How many faults a [SaveReport] keeps track of
pub const FAULT_LOG_SIZE: usize = 8;

/// A failed attempt to store the data section
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SlotFault {
    /// The address of the data section that couldn't be stored
    pub slot: u32,
    /// The operation that failed
    pub error: FlashError,
}

/// The result of a successful [FlashEnv::save]
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SaveReport {
    slot: u32,
    fault_count: u32,
    faults: ArrayVec<SlotFault, FAULT_LOG_SIZE>,
    skipped_defaults: u32,
}

impl SaveReport {
    fn new(slot: u32) -> Self {
        Self {
            slot,
            fault_count: 0,
            faults: ArrayVec::new(),
            skipped_defaults: 0,
        }
    }

    pub(crate) fn with_skipped_defaults(mut self, skipped: u32) -> Self {
        self.skipped_defaults = skipped;
        self
    }

    fn record(&mut self, fault: SlotFault) {
        self.fault_count += 1;
        // Only the first faults are kept, the count keeps going
        let _ = self.faults.try_push(fault);
    }

    /// The address the data section was stored at
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Whether the data section had to be moved because of flash faults
    pub fn recovered(&self) -> bool {
        self.fault_count > 0
    }

    /// The total number of faults recovered from
    pub fn fault_count(&self) -> u32 {
        self.fault_count
    }

    /// The first [FAULT_LOG_SIZE] faults, in the order they happened
    pub fn faults(&self) -> &[SlotFault] {
        &self.faults
    }

    /// How many default variables were left out because they were invalid or duplicated.
    /// Always zero for a plain [FlashEnv::save].
    pub fn skipped_defaults(&self) -> u32 {
        self.skipped_defaults
    }
}

impl<'a, F: Flash> FlashEnv<'a, F> {
    /// Stores the variables in flash.
    ///
    /// Erase and write faults are recovered from by moving the data section forward.
    /// When no position is left, the system section is cleared so the next load starts
    /// from the defaults, and [EnvError::AreaFull] is returned.
    ///
    /// [EnvError::SystemSection] means the data was stored but its new address could not be
    /// recorded. The next save tries to record it again.
    pub fn save(&mut self) -> Result<SaveReport, EnvError> {
        let area = self.cache.area();
        let mut report = SaveReport::new(self.cache.slot());

        loop {
            let slot = self.cache.slot();
            let section_size = self.cache.section_size();

            if !area.slot_fits(slot, section_size) {
                log::error!("The flash has no available space to save environment variables");
                self.clear_slot_address();
                return Err(EnvError::AreaFull);
            }

            match self.store_section(slot, section_size) {
                Ok(()) => break,
                Err(error) => {
                    log::warn!(
                        "{} at {:#010X}, moving environment variables to next available position",
                        error,
                        slot
                    );
                    report.record(SlotFault { slot, error });
                    self.cache.relocate(area.relocation_stride(section_size));
                }
            }
        }

        report.slot = self.cache.slot();
        if self.stored_slot != Some(report.slot) {
            self.store_slot_address(report.slot)
                .map_err(EnvError::SystemSection)?;
        }

        Ok(report)
    }

    /// Erases and programs the data section at `slot`
    fn store_section(&mut self, slot: u32, section_size: u32) -> Result<(), FlashError> {
        #[cfg(feature = "crc-check")]
        {
            let crc = crate::integrity::calculate(&self.cache);
            self.cache.set_crc(crc);
        }

        self.flash.erase(slot, section_size)?;
        log::info!("Erased environment variables OK");

        self.flash.write(slot, self.cache.section())?;
        log::info!("Saved environment variables OK");

        Ok(())
    }

    /// Points the system section at the data section at `slot`
    fn store_slot_address(&mut self, slot: u32) -> Result<(), FlashError> {
        let system_section = self.cache.area().system_section();
        // Until the write succeeds, nothing valid is stored
        self.stored_slot = None;

        if let Err(e) = self.flash.erase(system_section, WORD_SIZE) {
            log::error!("Erasing the system section failed, the environment can not be used");
            return Err(e);
        }
        if let Err(e) = self.flash.write(system_section, &slot.to_ne_bytes()) {
            log::error!("Writing the system section failed, the environment can not be used");
            return Err(e);
        }

        if slot != SENTINEL {
            log::debug!("Active environment data section is now {:#010X}", slot);
            self.stored_slot = Some(slot);
        }
        Ok(())
    }

    /// Marks the environment as unusable so it is reinitialized on the next load
    fn clear_slot_address(&mut self) {
        // Errors are logged, there is nothing more to fall back to
        let _ = self.store_slot_address(SENTINEL);
    }
}
