//! Error types of the environment storage

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// A failed flash operation, as reported by a [crate::Flash] implementation
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FlashError {
    /// The erase did not leave the range in the erased state
    #[error("flash erase failed")]
    EraseFault,
    /// The programmed data did not end up in flash
    #[error("flash write failed")]
    WriteFault,
}

/// The environment area configuration is unusable.
///
/// These are programming errors of the caller, never the result of flash contents.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The total size or the erase unit size is zero
    #[error("area size and erase unit size must not be zero")]
    ZeroSize,
    /// The total size is not a multiple of the word size
    #[error("area size {0} is not word aligned")]
    UnalignedSize(u32),
    /// The erase unit is not a multiple of the word size
    #[error("erase unit size {0} is not word aligned")]
    UnalignedEraseUnit(u32),
    /// The start address is not aligned to the erase unit
    #[error("start address {0:#010X} is not aligned to the erase unit")]
    UnalignedStart(u32),
    /// The area does not fit in the 32-bit address space
    #[error("area overflows the address space")]
    AddressOverflow,
    /// The area cannot hold the system section and at least one data section
    #[error("area of {total} bytes is too small for an erase unit of {erase_unit} bytes")]
    AreaTooSmall {
        /// The configured area size
        total: u32,
        /// The configured erase unit size
        erase_unit: u32,
    },
    /// The default variables do not fit in the first data section
    #[error("default variables need {needed} bytes but only {available} are available")]
    DefaultsTooLarge {
        /// Bytes the encoded default set occupies
        needed: u32,
        /// Bytes available in the first data section
        available: u32,
    },
}

/// Errors of the environment operations
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum EnvError {
    /// The key is empty, contains `=` or contains a NUL byte, or was not found for deletion
    #[error("invalid or unknown variable name")]
    NameError,
    /// The value contains a NUL byte
    #[error("variable value must not contain NUL")]
    ValueError,
    /// A variable with this key already exists
    #[error("variable name already exists")]
    NameExists,
    /// The variable does not fit in the data section
    #[error("environment is full")]
    EnvFull,
    /// No data section position is left in the area after relocating
    #[error("no space left in the environment area")]
    AreaFull,
    /// The data section was saved, but its address could not be stored in the system section
    #[error("could not store the active section address: {0}")]
    SystemSection(FlashError),
    /// The configuration is invalid
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// The numeric status codes of the environment API.
///
/// Useful to report results over a console or a C interface.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
pub enum ErrorCode {
    /// The operation succeeded
    NoErr = 0,
    /// A flash erase failed
    EraseErr = 1,
    /// A flash write failed
    WriteErr = 2,
    /// The variable name is invalid or unknown
    EnvNameErr = 3,
    /// The variable name already exists
    EnvNameExist = 4,
    /// There is no space left
    EnvFull = 5,
    /// The area configuration or the default set is unusable
    ConfigErr = 6,
}

impl From<FlashError> for ErrorCode {
    fn from(error: FlashError) -> Self {
        match error {
            FlashError::EraseFault => ErrorCode::EraseErr,
            FlashError::WriteFault => ErrorCode::WriteErr,
        }
    }
}

impl From<EnvError> for ErrorCode {
    fn from(error: EnvError) -> Self {
        match error {
            EnvError::NameError | EnvError::ValueError => ErrorCode::EnvNameErr,
            EnvError::NameExists => ErrorCode::EnvNameExist,
            EnvError::EnvFull | EnvError::AreaFull => ErrorCode::EnvFull,
            EnvError::SystemSection(flash_error) => flash_error.into(),
            EnvError::Config(_) => ErrorCode::ConfigErr,
        }
    }
}

impl<T> From<Result<T, EnvError>> for ErrorCode {
    fn from(result: Result<T, EnvError>) -> Self {
        match result {
            Ok(_) => ErrorCode::NoErr,
            Err(error) => error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(u8::from(ErrorCode::NoErr), 0);
        assert_eq!(u8::from(ErrorCode::EnvFull), 5);
        assert_eq!(ErrorCode::try_from(3u8).unwrap(), ErrorCode::EnvNameErr);
        assert_eq!(u8::from(ErrorCode::ConfigErr), 6);
        assert!(ErrorCode::try_from(7u8).is_err());
    }

    #[test]
    fn errors_map_to_codes() {
        assert_eq!(ErrorCode::from(EnvError::AreaFull), ErrorCode::EnvFull);
        assert_eq!(
            ErrorCode::from(EnvError::SystemSection(FlashError::WriteFault)),
            ErrorCode::WriteErr
        );
        assert_eq!(ErrorCode::from(Ok::<(), EnvError>(())), ErrorCode::NoErr);
        assert_eq!(
            ErrorCode::from(Err::<(), _>(EnvError::NameExists)),
            ErrorCode::EnvNameExist
        );
    }

    #[test]
    fn configuration_errors_have_their_own_code() {
        assert_eq!(
            ErrorCode::from(EnvError::Config(ConfigError::ZeroSize)),
            ErrorCode::ConfigErr
        );
        assert_eq!(ErrorCode::from(EnvError::ValueError), ErrorCode::EnvNameErr);
    }
}
