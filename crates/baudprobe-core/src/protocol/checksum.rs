//! Frame checksum
//!
//! CRC16-CCITT: polynomial 0x1021, initial value 0xFFFF, MSB first, no
//! reflection and no final XOR. This is the catalogue's CRC-16/IBM-3740
//! (also known as CCITT-FALSE).

use crc::{Crc, CRC_16_IBM_3740};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Compute the CRC16-CCITT of `data`
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Compute the CRC16-CCITT over several slices as if they were contiguous
pub(crate) fn crc16_ccitt_parts(parts: &[&[u8]]) -> u16 {
    let mut digest = CRC16.digest();
    for part in parts {
        digest.update(part);
    }
    digest.finalize()
}
