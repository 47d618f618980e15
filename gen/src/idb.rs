/*++

Licensed under the Apache-2.0 license.

File Name:

   idb.rs

Abstract:

    File contains the card-boot sector image codec. The boot ROM reads
    this layout from SD/eMMC: a stream-ciphered 512-byte header naming
    the init payload's location and size in blocks, the init payload at
    block 4, and the next boot stage behind it.

--*/

use rkimage_crypto::{cipher_block, cipher_blocks};
use rkimage_types::{
    IdbHeader, ImageError, ImageResult, BLOCK_SIZE, DATA_ALIGN, IDB_HEADER_SIZE,
    IDB_INIT_ALIGN_BLOCKS, IDB_INIT_OFFSET, IDB_SIGNATURE,
};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::align_up;

/// Default init payload limit (the RK33-family SPL window).
pub const DEFAULT_INIT_LIMIT: usize = 0x30000 - 0x2000;

/// Space reserved for the next boot stage when none is supplied.
pub const DEFAULT_BOOT_RESERVE: usize = 512 * 1024;

/// Pack parameters.
#[derive(Debug, Clone)]
pub struct IdbParams {
    /// Cipher the init payload per 512-byte block (legacy chips).
    pub cipher_payload: bool,
    /// Maximum init payload size in bytes.
    pub init_limit: usize,
    /// Blocks accounted to the next stage when no payload is given.
    pub boot_reserve: usize,
}

impl Default for IdbParams {
    fn default() -> Self {
        Self {
            cipher_payload: false,
            init_limit: DEFAULT_INIT_LIMIT,
            boot_reserve: DEFAULT_BOOT_RESERVE,
        }
    }
}

/// Result of unpacking a card-boot image. Payload sizes are only tracked
/// at block granularity in this format, so both fields come back
/// zero-padded to whole blocks.
#[derive(Debug)]
pub struct UnpackedIdb {
    pub init: Vec<u8>,
    pub boot: Vec<u8>,
    pub ciphered_payload: bool,
}

fn blocks(len: usize) -> usize {
    (len + BLOCK_SIZE - 1) / BLOCK_SIZE
}

/// Assemble a card-boot image from the init payload (DRAM init/SPL) and
/// an optional next-stage payload.
pub fn pack(init: &[u8], boot: Option<&[u8]>, params: &IdbParams) -> ImageResult<Vec<u8>> {
    if init.len() > params.init_limit {
        return Err(ImageError::PayloadTooLarge {
            size: init.len(),
            capacity: params.init_limit,
        });
    }

    let init_blocks = align_up(blocks(init.len()), IDB_INIT_ALIGN_BLOCKS);
    let boot_blocks = blocks(boot.map_or(params.boot_reserve, <[u8]>::len));
    let init_boot_blocks = align_up(init_blocks + boot_blocks, IDB_INIT_ALIGN_BLOCKS);
    if init_boot_blocks > u16::MAX as usize {
        return Err(ImageError::PayloadTooLarge {
            size: init_boot_blocks * BLOCK_SIZE,
            capacity: u16::MAX as usize * BLOCK_SIZE,
        });
    }

    let mut header = IdbHeader::new_zeroed();
    header.signature = IDB_SIGNATURE;
    header.disable_rc4 = if params.cipher_payload { 0 } else { 1 };
    header.init_offset = IDB_INIT_OFFSET;
    header.init_size = init_blocks as u16;
    header.init_boot_size = init_boot_blocks as u16;

    let mut out = Vec::with_capacity(DATA_ALIGN + init_blocks * BLOCK_SIZE);
    out.extend_from_slice(header.as_bytes());
    // The header block is never written in cleartext.
    cipher_block(&mut out[..IDB_HEADER_SIZE]);
    out.resize(IDB_INIT_OFFSET as usize * BLOCK_SIZE, 0);

    let payload_start = out.len();
    out.extend_from_slice(init);
    out.resize(payload_start + init_blocks * BLOCK_SIZE, 0);
    if params.cipher_payload {
        cipher_blocks(&mut out[payload_start..]);
    }

    if let Some(boot) = boot {
        out.extend_from_slice(boot);
    }
    Ok(out)
}

/// Decode a card-boot image.
pub fn unpack(image: &[u8]) -> ImageResult<UnpackedIdb> {
    if image.len() < IDB_INIT_OFFSET as usize * BLOCK_SIZE {
        return Err(ImageError::MalformedImage(format!(
            "image of {} bytes is shorter than the card-boot header area",
            image.len()
        )));
    }

    let mut header_block = [0u8; IDB_HEADER_SIZE];
    header_block.copy_from_slice(&image[..IDB_HEADER_SIZE]);
    cipher_block(&mut header_block);
    let header = IdbHeader::read_from(&header_block[..]).unwrap();
    if header.signature != IDB_SIGNATURE {
        return Err(ImageError::MalformedImage(format!(
            "bad card-boot signature 0x{:08X}",
            header.signature
        )));
    }

    let start = header.init_offset as usize * BLOCK_SIZE;
    let len = header.init_size as usize * BLOCK_SIZE;
    let init_area = image.get(start..start + len).ok_or_else(|| {
        ImageError::MalformedImage(format!(
            "init payload at 0x{start:X}+0x{len:X} extends past image end"
        ))
    })?;

    let ciphered_payload = header.disable_rc4 == 0;
    let mut init = init_area.to_vec();
    if ciphered_payload {
        cipher_blocks(&mut init);
    }

    Ok(UnpackedIdb {
        init,
        boot: image[start + len..].to_vec(),
        ciphered_payload,
    })
}
