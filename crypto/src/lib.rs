/*++

Licensed under the Apache-2.0 license.

File Name:

   lib.rs

Abstract:

    File contains the checksum, digest and legacy stream cipher primitives
    used by the boot image codecs.

--*/

mod rc4;

pub use rc4::{cipher, cipher_block, cipher_blocks};

use sha2::{Digest, Sha256};

/// Vendor CRC-32 polynomial. Not the IEEE variant: forward (non-reflected),
/// zero initial value, no final XOR.
const CRC32_POLY: u32 = 0x04C1_0DB7;

const fn crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut c = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            c = if c & 0x8000_0000 != 0 {
                (c << 1) ^ CRC32_POLY
            } else {
                c << 1
            };
            bit += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}

static CRC32_TABLE: [u32; 256] = crc32_table();

/// Compute the vendor CRC-32 over `data`.
pub fn crc32(data: &[u8]) -> u32 {
    crc32_continue(0, data)
}

/// Continue a vendor CRC-32 computation from a previous value.
pub fn crc32_continue(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        crc = (crc << 8) ^ CRC32_TABLE[(((crc >> 24) as u8) ^ byte) as usize];
    }
    crc
}

/// Compute the SHA-256 digest of `data`.
pub fn digest256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Digest for a second-loader header.
///
/// Headers with a zero version digest the payload alone. A non-zero version
/// additionally feeds the version, load address, load size and digest
/// length words (little-endian) into the hash; externally generated
/// signatures depend on reproducing this asymmetry exactly.
pub fn loader_digest(
    payload: &[u8],
    version: u32,
    load_addr: u32,
    load_size: u32,
    hash_len: u32,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    if version > 0 {
        hasher.update(version.to_le_bytes());
        hasher.update(load_addr.to_le_bytes());
        hasher.update(load_size.to_le_bytes());
        hasher.update(hash_len.to_le_bytes());
    }
    hasher.finalize().into()
}
