//! The environment handle and its public operations

use core::fmt;

use crate::{
    cache::EnvCache,
    config::EnvConfig,
    error::{ConfigError, EnvError},
    record,
    save::SaveReport,
    Flash,
};

/// A variable of the default environment
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct EnvVar<'a> {
    /// The name of the variable
    pub key: &'a str,
    /// The value of the variable
    pub value: &'a str,
}

impl<'a> EnvVar<'a> {
    /// Creates a default variable
    pub const fn new(key: &'a str, value: &'a str) -> Self {
        Self { key, value }
    }
}

/// Environment variables stored in a wear-leveled flash area.
///
/// All reads and updates work on a RAM cache of the active data section.
/// Nothing reaches the flash until [Self::save] is called.
///
/// The handle is not synchronized. When the environment is used from multiple tasks,
/// the caller has to put it behind a mutex.
pub struct FlashEnv<'a, F: Flash> {
    pub(crate) flash: F,
    pub(crate) cache: EnvCache,
    pub(crate) defaults: &'a [EnvVar<'a>],
    /// The slot address that is currently stored in the system section, if any
    pub(crate) stored_slot: Option<u32>,
}

impl<'a, F: Flash> FlashEnv<'a, F> {
    /// Creates the environment without touching the flash.
    ///
    /// The cache is empty until [Self::load] or [Self::load_defaults] is called.
    pub fn new(
        flash: F,
        config: EnvConfig,
        defaults: &'a [EnvVar<'a>],
    ) -> Result<Self, ConfigError> {
        let area = config.area();

        let needed = defaults
            .iter()
            .map(|var| record::encoded_len(var.key, var.value) as u32)
            .fold(0u32, u32::saturating_add);
        let available = area.first_slot_capacity();
        if needed > available {
            return Err(ConfigError::DefaultsTooLarge { needed, available });
        }

        Ok(Self {
            flash,
            cache: EnvCache::new(area),
            defaults,
            stored_slot: None,
        })
    }

    /// Creates the environment and loads it from flash, falling back to the defaults
    pub fn init(
        flash: F,
        config: EnvConfig,
        defaults: &'a [EnvVar<'a>],
    ) -> Result<Self, EnvError> {
        let mut env = Self::new(flash, config, defaults)?;
        env.load()?;
        Ok(env)
    }

    /// Replaces all variables with the default set and saves them.
    ///
    /// Invalid or duplicated defaults are skipped and counted in
    /// [SaveReport::skipped_defaults].
    pub fn load_defaults(&mut self) -> Result<SaveReport, EnvError> {
        self.cache.clear();

        let mut skipped = 0;
        for var in self.defaults {
            if let Err(e) = self.cache.create(var.key, var.value) {
                log::warn!("Skipping default variable {:?}: {}", var.key, e);
                skipped += 1;
            }
        }

        Ok(self.save()?.with_skipped_defaults(skipped))
    }

    /// Gets the value of a variable.
    ///
    /// Returns `None` when the variable doesn't exist or its value is not valid UTF-8.
    pub fn get(&self, key: &str) -> Option<&str> {
        let value = self.cache.get(key)?;
        match core::str::from_utf8(value) {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("Environment variable {:?} is not valid UTF-8", key);
                None
            }
        }
    }

    /// Gets the raw value of a variable
    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        self.cache.get(key)
    }

    /// Sets a variable. An empty value deletes it.
    ///
    /// Updating moves the variable to the end of the section. When the new value doesn't fit,
    /// [EnvError::EnvFull] is returned and the old value stays.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), EnvError> {
        self.cache.set(key, value)
    }

    /// Creates a variable that doesn't exist yet
    pub fn create(&mut self, key: &str, value: &str) -> Result<(), EnvError> {
        self.cache.create(key, value)
    }

    /// Deletes a variable
    pub fn delete(&mut self, key: &str) -> Result<(), EnvError> {
        self.cache.delete(key)
    }

    /// Iterates over all variables in the order they are stored
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        self.cache
            .records()
            .map(|record| (record.key(), record.value()))
    }

    /// The size of the environment area
    pub fn total_size(&self) -> u32 {
        self.cache.area().total_size
    }

    /// The bytes of the area in use, from the area start up to the last record
    pub fn used_size(&self) -> u32 {
        self.cache.used_size()
    }

    /// The address of the active data section
    pub fn data_section_address(&self) -> u32 {
        self.cache.slot()
    }

    /// Writes all variables, one per line, followed by the usage of the area
    pub fn dump(&self, out: &mut impl fmt::Write) -> fmt::Result {
        for record in self.cache.records() {
            for &b in record.bytes {
                out.write_char(char::from(b))?;
            }
            out.write_char('\n')?;
        }
        write!(
            out,
            "\nEnvironment variables size: {}/{} bytes, mode: wear leveling.\n",
            self.used_size(),
            self.total_size()
        )
    }

    /// The flash the environment is stored in
    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// The flash the environment is stored in.
    ///
    /// Changing the area behind the environment's back only has effect after the next [Self::load].
    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Gives the flash back
    pub fn into_flash(self) -> F {
        self.flash
    }
}

impl<'a, F: Flash> fmt::Debug for FlashEnv<'a, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlashEnv")
            .field("area", &self.cache.area())
            .field("data_section", &format_args!("{:#010X}", self.cache.slot()))
            .field("used_size", &self.used_size())
            .finish()
    }
}
