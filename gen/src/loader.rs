/*++

Licensed under the Apache-2.0 license.

File Name:

   loader.rs

Abstract:

    File contains the second-loader codec: the fixed-header wrapper used
    for the primary bootloader and trusted-OS binaries, emitted as
    multiple redundant copies for recovery from storage corruption.

--*/

use rkimage_crypto::{crc32, loader_digest};
use rkimage_types::{
    ImageError, ImageResult, IntegrityWarning, LoaderHeader, LOADER_HASH_SIZE, LOADER_HEADER_SIZE,
    LOADER_MAGIC_TRUST_OS, LOADER_MAGIC_UBOOT,
};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::pad_to_align;

/// Default capacity of one redundant copy.
pub const DEFAULT_MAX_SIZE: usize = 1024 * 1024;

/// Default number of redundant copies. The boot ROM falls back to the
/// next copy when one fails to load.
pub const DEFAULT_COPIES: usize = 4;

/// Which wrapper variant to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoaderKind {
    /// Primary bootloader image.
    #[default]
    Uboot,
    /// Trusted-OS image.
    TrustOs,
}

impl LoaderKind {
    fn magic(&self) -> [u8; 8] {
        match self {
            LoaderKind::Uboot => LOADER_MAGIC_UBOOT,
            LoaderKind::TrustOs => LOADER_MAGIC_TRUST_OS,
        }
    }

    fn from_magic(magic: &[u8; 8]) -> ImageResult<Self> {
        match *magic {
            LOADER_MAGIC_UBOOT => Ok(LoaderKind::Uboot),
            LOADER_MAGIC_TRUST_OS => Ok(LoaderKind::TrustOs),
            _ => Err(ImageError::MalformedImage(format!(
                "unrecognized loader magic {:02X?}",
                magic
            ))),
        }
    }
}

/// Pack parameters.
#[derive(Debug, Clone)]
pub struct LoaderParams {
    pub kind: LoaderKind,
    pub load_addr: u32,
    /// Zero by default; a non-zero version changes the digest input.
    pub version: u32,
    pub max_size: usize,
    pub copies: usize,
}

impl Default for LoaderParams {
    fn default() -> Self {
        Self {
            kind: LoaderKind::Uboot,
            load_addr: 0,
            version: 0,
            max_size: DEFAULT_MAX_SIZE,
            copies: DEFAULT_COPIES,
        }
    }
}

/// Result of unpacking a second-loader container: the decoded header,
/// the payload from the first copy, and any integrity findings.
pub struct UnpackedLoader {
    pub kind: LoaderKind,
    pub header: LoaderHeader,
    pub payload: Vec<u8>,
    pub warnings: Vec<IntegrityWarning>,
}

/// Wrap `payload` with the loader header and emit the redundant copies.
pub fn pack(payload: &[u8], params: &LoaderParams) -> ImageResult<Vec<u8>> {
    if params.max_size <= LOADER_HEADER_SIZE {
        return Err(ImageError::Config(format!(
            "copy capacity of {} bytes leaves no room behind the header",
            params.max_size
        )));
    }
    let capacity = params.max_size - LOADER_HEADER_SIZE;
    let mut padded = payload.to_vec();
    pad_to_align(&mut padded, 4);
    if padded.len() > capacity {
        return Err(ImageError::PayloadTooLarge {
            size: payload.len(),
            capacity,
        });
    }

    let load_size = padded.len() as u32;
    let crc = crc32(&padded);
    let hash = loader_digest(
        &padded,
        params.version,
        params.load_addr,
        load_size,
        LOADER_HASH_SIZE as u32,
    );

    let mut header = LoaderHeader::new_zeroed();
    header.magic = params.kind.magic();
    header.version = params.version;
    header.raw_size = payload.len() as u32;
    header.load_addr = params.load_addr;
    header.load_size = load_size;
    header.crc = crc;
    header.hash_len = LOADER_HASH_SIZE as u32;
    header.hash = hash;

    let mut block = Vec::with_capacity(params.max_size);
    block.extend_from_slice(header.as_bytes());
    block.extend_from_slice(&padded);
    block.resize(params.max_size, 0);

    let mut out = Vec::with_capacity(params.max_size * params.copies);
    for _ in 0..params.copies {
        out.extend_from_slice(&block);
    }
    Ok(out)
}

/// Decode the first copy of a second-loader container.
///
/// A checksum mismatch is reported as a warning while the payload is
/// still returned, so corrupted images remain recoverable.
pub fn unpack(container: &[u8]) -> ImageResult<UnpackedLoader> {
    let header = LoaderHeader::read_from_prefix(container).ok_or_else(|| {
        ImageError::MalformedImage(format!(
            "container of {} bytes is shorter than the loader header",
            container.len()
        ))
    })?;
    let kind = LoaderKind::from_magic(&header.magic)?;

    let start = LOADER_HEADER_SIZE;
    let end = start
        .checked_add(header.load_size as usize)
        .filter(|&e| e <= container.len())
        .ok_or_else(|| {
            ImageError::MalformedImage(format!(
                "payload of {} bytes extends past container end",
                header.load_size
            ))
        })?;
    let stored = &container[start..end];

    let mut warnings = Vec::new();
    let computed = crc32(stored);
    if computed != header.crc {
        warnings.push(IntegrityWarning::Crc {
            stored: header.crc,
            computed,
        });
    }

    let raw = header.raw_size as usize;
    let payload = if raw > 0 && raw <= stored.len() {
        stored[..raw].to_vec()
    } else {
        stored.to_vec()
    };

    Ok(UnpackedLoader {
        kind,
        header,
        payload,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkimage_crypto::digest256;

    #[test]
    fn test_pack_zero_filled_payload() {
        let params = LoaderParams {
            load_addr: 0x0020_0000,
            ..Default::default()
        };
        let out = pack(&[0u8; 512], &params).unwrap();
        assert_eq!(out.len(), DEFAULT_MAX_SIZE * DEFAULT_COPIES);
        assert_eq!(&out[0x10..0x14], &0x0020_0000u32.to_le_bytes());
    }

    #[test]
    fn test_copies_are_identical() {
        let payload: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
        let out = pack(&payload, &LoaderParams::default()).unwrap();
        let first = &out[..DEFAULT_MAX_SIZE];
        for copy in out.chunks(DEFAULT_MAX_SIZE) {
            assert_eq!(copy, first);
        }
    }

    #[test]
    fn test_round_trip_unaligned_payload() {
        let payload: Vec<u8> = (0..511u32).map(|i| (i * 3) as u8).collect();
        let out = pack(&payload, &LoaderParams::default()).unwrap();
        let unpacked = unpack(&out).unwrap();
        assert!(unpacked.warnings.is_empty());
        assert_eq!(unpacked.payload, payload);
        assert_eq!(unpacked.kind, LoaderKind::Uboot);
    }

    #[test]
    fn test_round_trip_empty_payload() {
        let out = pack(&[], &LoaderParams::default()).unwrap();
        let unpacked = unpack(&out).unwrap();
        assert!(unpacked.payload.is_empty());
        assert!(unpacked.warnings.is_empty());
    }

    #[test]
    fn test_payload_too_large() {
        let params = LoaderParams::default();
        let payload = vec![0u8; DEFAULT_MAX_SIZE - LOADER_HEADER_SIZE + 1];
        assert!(matches!(
            pack(&payload, &params),
            Err(ImageError::PayloadTooLarge { .. })
        ));
        // The largest payload that fits is accepted.
        let payload = vec![0u8; DEFAULT_MAX_SIZE - LOADER_HEADER_SIZE];
        assert!(pack(&payload, &params).is_ok());
    }

    #[test]
    fn test_corrupt_payload_warns_but_returns() {
        let payload = vec![0x5Au8; 4096];
        let mut out = pack(&payload, &LoaderParams::default()).unwrap();
        out[LOADER_HEADER_SIZE + 100] ^= 0xFF;

        let unpacked = unpack(&out).unwrap();
        assert_eq!(unpacked.warnings.len(), 1);
        assert!(matches!(
            unpacked.warnings[0],
            IntegrityWarning::Crc { .. }
        ));
        // The (now incorrect) payload is still handed back.
        assert_eq!(unpacked.payload.len(), payload.len());
        assert_ne!(unpacked.payload, payload);
    }

    #[test]
    fn test_versioned_digest_differs() {
        let payload = vec![1u8; 64];
        let plain = pack(&payload, &LoaderParams::default()).unwrap();
        let versioned = pack(
            &payload,
            &LoaderParams {
                version: 0x0102,
                ..Default::default()
            },
        )
        .unwrap();

        let hash_of = |img: &[u8]| img[32..32 + LOADER_HASH_SIZE].to_vec();
        assert_eq!(hash_of(&plain), digest256(&payload).to_vec());
        assert_ne!(hash_of(&plain), hash_of(&versioned));

        let unpacked = unpack(&versioned).unwrap();
        assert_eq!(unpacked.header.version, 0x0102);
    }

    #[test]
    fn test_trust_os_magic() {
        let out = pack(
            b"tee payload",
            &LoaderParams {
                kind: LoaderKind::TrustOs,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(&out[..8], b"TOS     ");
        assert_eq!(unpack(&out).unwrap().kind, LoaderKind::TrustOs);
    }

    #[test]
    fn test_unknown_magic_rejected() {
        let mut out = pack(b"x", &LoaderParams::default()).unwrap();
        out[0..8].copy_from_slice(b"GARBAGE!");
        assert!(matches!(
            unpack(&out),
            Err(ImageError::MalformedImage(_))
        ));
    }
}
