//! Encoding of the `key=value\0` records in the detail part.
//!
//! A record is the key, an equal sign, the value and a NUL terminator,
//! padded with zero bytes to a multiple of the word size.

use crate::{error::EnvError, layout::align_to_word};

/// Separates the key from the value
pub const SEPARATOR: u8 = b'=';
/// Terminates a record
pub const TERMINATOR: u8 = 0;

/// Checks that the key can be stored: not empty, no `=` and no NUL
pub fn validate_key(key: &str) -> Result<(), EnvError> {
    if key.is_empty() {
        log::info!("Environment variable names must not be empty");
        return Err(EnvError::NameError);
    }
    if key.bytes().any(|b| b == SEPARATOR || b == TERMINATOR) {
        log::info!("Environment variable name {:?} contains '=' or NUL", key);
        return Err(EnvError::NameError);
    }
    Ok(())
}

/// Checks that the value can be stored: no NUL, it would end the record early
pub fn validate_value(value: &str) -> Result<(), EnvError> {
    if value.bytes().any(|b| b == TERMINATOR) {
        log::info!("Environment variable values must not contain NUL");
        return Err(EnvError::ValueError);
    }
    Ok(())
}

/// The number of bytes the record for `key` and `value` takes, padding included
pub const fn encoded_len(key: &str, value: &str) -> usize {
    align_to_word(key.len() + value.len() + 2)
}

/// Writes the record into `out`, which must be exactly [encoded_len] bytes long.
/// The padding is zero filled.
pub fn encode(key: &str, value: &str, out: &mut [u8]) {
    debug_assert_eq!(out.len(), encoded_len(key, value));

    let (key_part, rest) = out.split_at_mut(key.len());
    key_part.copy_from_slice(key.as_bytes());
    let (separator, rest) = rest.split_at_mut(1);
    separator[0] = SEPARATOR;
    let (value_part, rest) = rest.split_at_mut(value.len());
    value_part.copy_from_slice(value.as_bytes());
    rest.fill(TERMINATOR);
}

/// A record as found in the detail part, without terminator and padding
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Record<'a> {
    /// The offset of the record in the detail part
    pub offset: usize,
    /// The raw `key=value` bytes
    pub bytes: &'a [u8],
}

impl<'a> Record<'a> {
    /// The number of bytes the record occupies in the detail part, padding included
    pub fn stored_len(&self) -> usize {
        align_to_word(self.bytes.len() + 1)
    }

    /// Whether this is the record of `key`
    pub fn has_key(&self, key: &[u8]) -> bool {
        !key.is_empty()
            && self.bytes.len() > key.len()
            && self.bytes.starts_with(key)
            && self.bytes[key.len()] == SEPARATOR
    }

    /// The part before the first `=`
    pub fn key(&self) -> &'a [u8] {
        match self.separator() {
            Some(index) => &self.bytes[..index],
            None => self.bytes,
        }
    }

    /// The part after the first `=`
    pub fn value(&self) -> &'a [u8] {
        match self.separator() {
            Some(index) => &self.bytes[index + 1..],
            None => &[],
        }
    }

    fn separator(&self) -> Option<usize> {
        self.bytes.iter().position(|&b| b == SEPARATOR)
    }
}

/// Iterator over the records of a detail part
#[derive(Debug, Clone)]
pub struct Records<'a> {
    detail: &'a [u8],
    offset: usize,
}

impl<'a> Records<'a> {
    /// Iterates over the records in `detail`, which must hold exactly the used detail bytes
    pub fn new(detail: &'a [u8]) -> Self {
        Self { detail, offset: 0 }
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Record<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.offset < self.detail.len() {
            let remaining = &self.detail[self.offset..];
            let length = remaining
                .iter()
                .position(|&b| b == TERMINATOR)
                .unwrap_or(remaining.len());

            let record = Record {
                offset: self.offset,
                bytes: &remaining[..length],
            };
            self.offset += record.stored_len();

            // Zero words are padding left behind by a damaged section
            if !record.bytes.is_empty() {
                return Some(record);
            }
        }
        None
    }
}
