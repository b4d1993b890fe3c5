//! [flash_env::Flash] on the internal flash of the nRF9160, through its NVMC peripheral.
//!
//! The NVMC doesn't report failures, so every erase and write is read back and checked.
//! A mismatch is reported as a fault, which makes the environment move to the next position.
#![no_std]

use core::mem::size_of;

use flash_env::{Flash, FlashError};

/// The size of a page in bytes
pub const PAGE_SIZE: u32 = 0x0000_1000;

/// The size of the internal flash in bytes
pub const FLASH_SIZE: u32 = 0x0010_0000;

const WORD_SIZE: u32 = size_of::<u32>() as u32;

/// The NVMC flash operations
pub struct Nvmc<'a> {
    registers: &'a nrf9160_pac::NVMC_S,
}

impl<'a> Nvmc<'a> {
    /// Uses the secure NVMC instance. No one else may use it while this exists.
    pub fn new(registers: &'a nrf9160_pac::NVMC_S) -> Self {
        Self { registers }
    }

    fn erase_page(&mut self, page_address: u32) {
        assert_valid_page_address(page_address);

        // Enable the erase functionality of the flash
        self.registers.config.modify(|_, w| w.wen().een());
        // Start the erase process by writing a u32 word containing all 1's to the first word of the page
        // This is safe because the page address is aligned and lies in flash
        unsafe {
            let first_word = page_address as *mut u32;
            first_word.write_volatile(0xFFFF_FFFF);
        }
        self.wait_ready();

        self.registers.config.modify(|_, w| w.wen().ren());
        synchronize();
    }

    fn wait_ready(&self) {
        while self.registers.ready.read().ready().is_busy() {}
    }

    fn read_word(&self, address: u32) -> u32 {
        // Flash is always mapped, so reading any word aligned address in it is fine
        unsafe { (address as *const u32).read_volatile() }
    }
}

impl<'a> Flash for Nvmc<'a> {
    #[track_caller]
    fn read(&self, address: u32, buffer: &mut [u8]) {
        assert_in_flash(address, buffer.len() as u32);

        for (offset, byte) in buffer.iter_mut().enumerate() {
            *byte = unsafe { ((address + offset as u32) as *const u8).read_volatile() };
        }
    }

    #[track_caller]
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        assert!(
            address % WORD_SIZE == 0,
            "Flash can only be programmed at word aligned addresses"
        );
        assert_in_flash(address, data.len() as u32);

        // Set the flash to write mode
        self.registers.config.modify(|_, w| w.wen().wen());

        for (index, chunk) in data.chunks(WORD_SIZE as usize).enumerate() {
            // A partial last word leaves the remaining bytes erased
            let mut bytes = [0xFF; WORD_SIZE as usize];
            bytes[..chunk.len()].copy_from_slice(chunk);
            let data_word = u32::from_ne_bytes(bytes);
            let flash_address = address + index as u32 * WORD_SIZE;

            // We only have to write when the words are different
            if self.read_word(flash_address) != data_word {
                unsafe {
                    (flash_address as *mut u32).write_volatile(data_word);
                }
                self.wait_ready();
            }
        }

        // Set the flash to default readonly mode
        self.registers.config.modify(|_, w| w.wen().ren());
        synchronize();

        let mismatch = data
            .iter()
            .enumerate()
            .any(|(offset, &expected)| {
                let mut actual = [0];
                self.read(address + offset as u32, &mut actual);
                actual[0] != expected
            });
        if mismatch {
            log::warn!("Programming flash at {:#010X} failed", address);
            return Err(FlashError::WriteFault);
        }

        Ok(())
    }

    #[track_caller]
    fn erase(&mut self, address: u32, length: u32) -> Result<(), FlashError> {
        assert_in_flash(address, length);

        let first_page = address / PAGE_SIZE * PAGE_SIZE;
        let end = (address + length + PAGE_SIZE - 1) / PAGE_SIZE * PAGE_SIZE;

        for page_address in (first_page..end).step_by(PAGE_SIZE as usize) {
            self.erase_page(page_address);
        }

        let erased = (first_page..end)
            .step_by(WORD_SIZE as usize)
            .all(|word_address| self.read_word(word_address) == 0xFFFF_FFFF);
        if !erased {
            log::warn!("Erasing flash at {:#010X} failed", first_page);
            return Err(FlashError::EraseFault);
        }

        Ok(())
    }
}

/// Makes sure the flash changes are visible before continuing
fn synchronize() {
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

/// Asserts that the address is at the start of a flash page
#[track_caller]
fn assert_valid_page_address(page_address: u32) {
    assert!(
        page_address % PAGE_SIZE == 0,
        "Page addresses must be aligned to 4KB blocks"
    );
    assert!(
        page_address < FLASH_SIZE,
        "Page cannot lie outside of flash memory"
    );
}

/// Asserts that the address range lies in flash
#[track_caller]
fn assert_in_flash(address: u32, length: u32) {
    assert!(
        address
            .checked_add(length)
            .map_or(false, |end| end <= FLASH_SIZE),
        "Address range cannot lie outside of flash memory"
    );
}
