//! CRC32 over the cached data section

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::cache::EnvCache;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Calculates the CRC of the detail end address followed by the used detail bytes.
/// The stored CRC itself is not included.
pub(crate) fn calculate(cache: &EnvCache) -> u32 {
    let mut digest = CRC32.digest();
    digest.update(&cache.detail_end_address().to_ne_bytes());
    digest.update(cache.detail());
    let crc = digest.finalize();

    log::debug!("Calculated environment CRC32 {:#010X}", crc);
    crc
}

/// Tests if the cache is intact by comparing its CRC against the stored one
pub(crate) fn is_valid(cache: &EnvCache) -> bool {
    calculate(cache) == cache.crc()
}
