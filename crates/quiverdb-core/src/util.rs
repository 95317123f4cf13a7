//! Small shared helpers: CRC32 and identifier validation.

/// CRC32 (IEEE 802.3 polynomial) over a byte slice.
///
/// Used to validate index snapshots, pages, and log records.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)] // Table index always 0-255
pub fn crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let idx = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[idx];
    }
    !crc
}

/// Validates a collection name: 1-64 chars of `[A-Za-z0-9_-]`, starting
/// with an alphanumeric. Names become directory names, so path separators
/// and dot-prefixes are rejected by construction.
#[must_use]
pub fn is_valid_collection_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 64 {
        return false;
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or(' ');
    if !first.is_ascii_alphanumeric() {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
