//! Wear-leveling environment variable storage for flash memory.
//!
//! The environment area is a fixed flash region split into a system section, which holds the
//! address of the data section currently in use, and the data sections themselves.
//! All variables live in a RAM cache of one data section. Mutations only touch the cache,
//! [`FlashEnv::save`] writes it back and moves the data section forward whenever an erase or
//! a write fails.
//!
//! ```text
//! start                 start + erase unit
//! | system section      | data section                                  ...   | end
//! | active slot address | end address | crc32 | key=value\0 key=value\0 ...   |
//! ```
#![no_std]
#![warn(missing_docs)]

extern crate alloc;

mod cache;
pub mod config;
mod env;
pub mod error;
#[cfg(feature = "crc-check")]
mod integrity;
pub mod layout;
mod load;
pub mod ram;
pub mod record;
mod save;

pub use config::EnvConfig;
pub use env::{EnvVar, FlashEnv};
pub use error::{ConfigError, EnvError, ErrorCode, FlashError};
pub use load::{DefaultReason, LoadState};
pub use ram::RamFlash;
pub use save::{SaveReport, SlotFault, FAULT_LOG_SIZE};

/// A trait defining the flash operations the environment needs
pub trait Flash {
    /// Read the flash starting at the given address into the buffer.
    ///
    /// Reading is assumed to always succeed. If the address range is invalid, then the function may panic.
    fn read(&self, address: u32, buffer: &mut [u8]);

    /// Program the data at the given address.
    /// The target range must have been erased before.
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError>;

    /// Erase every erase unit that overlaps the range `address..address + length`.
    /// Erased bytes read back as `0xFF`.
    fn erase(&mut self, address: u32, length: u32) -> Result<(), FlashError>;
}

impl<T: Flash + ?Sized> Flash for &mut T {
    fn read(&self, address: u32, buffer: &mut [u8]) {
        (**self).read(address, buffer)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        (**self).write(address, data)
    }

    fn erase(&mut self, address: u32, length: u32) -> Result<(), FlashError> {
        (**self).erase(address, length)
    }
}
