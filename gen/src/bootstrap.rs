/*++

Licensed under the Apache-2.0 license.

File Name:

   bootstrap.rs

Abstract:

    File contains the bootstrap codec: the container holding the
    early-stage binaries (DRAM init, USB plug, flash loader stages)
    behind an entry table, closed by a trailing checksum.

--*/

use std::path::{Path, PathBuf};

use rkimage_crypto::{cipher, cipher_block, cipher_blocks, crc32};
use rkimage_types::{
    chip_id, packed_bcd_version, unpack_bcd_version, BootEntry, BootEntryKind, BootHeader,
    ImageError, ImageResult, IntegrityWarning, ReleaseTime, BLOCK_SIZE, BOOT_ENTRY_SIZE,
    BOOT_HEADER_SIZE, BOOT_MERGER_VERSION, BOOT_TAG, DATA_ALIGN,
};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::align_up;

/// One component to embed, already loaded into memory.
#[derive(Debug, Clone)]
pub struct BootComponent {
    /// Entry name recorded in the container (truncated to 20 units).
    pub name: String,
    pub kind: BootEntryKind,
    pub data: Vec<u8>,
}

/// Pack parameters.
#[derive(Debug, Clone)]
pub struct BootstrapParams {
    pub chip_name: String,
    pub version: (u32, u32),
    pub release_time: ReleaseTime,
    /// Stream-cipher the header region (header plus entry table).
    pub encrypt_header: bool,
    /// Stream-cipher the entry data, vendor-compatibility switch.
    /// Loader stages are ciphered per 512-byte block, CODE471/472
    /// buffers in one pass.
    pub encrypt_entries: bool,
}

impl Default for BootstrapParams {
    fn default() -> Self {
        Self {
            chip_name: String::new(),
            version: (0, 0),
            release_time: ReleaseTime::new_zeroed(),
            encrypt_header: false,
            encrypt_entries: false,
        }
    }
}

/// One component recovered from a container.
#[derive(Debug)]
pub struct UnpackedBootComponent {
    pub name: String,
    pub kind: BootEntryKind,
    pub data: Vec<u8>,
}

/// Result of unpacking a bootstrap container.
#[derive(Debug)]
pub struct UnpackedBootstrap {
    pub chip_type: u32,
    pub version: (u32, u32),
    pub release_time: ReleaseTime,
    pub ciphered_header: bool,
    pub components: Vec<UnpackedBootComponent>,
    pub warnings: Vec<IntegrityWarning>,
}

const GROUP_ORDER: [BootEntryKind; 3] = [
    BootEntryKind::Code471,
    BootEntryKind::Code472,
    BootEntryKind::Loader,
];

/// Assemble a bootstrap container from `components` in declaration order
/// (grouped by entry kind, as the header's group directory requires).
pub fn pack(components: &[BootComponent], params: &BootstrapParams) -> ImageResult<Vec<u8>> {
    if components.is_empty() {
        return Err(ImageError::UnsupportedComponentCombination(
            "no components selected for the bootstrap container".into(),
        ));
    }

    let grouped: Vec<&BootComponent> = GROUP_ORDER
        .iter()
        .flat_map(|kind| components.iter().filter(move |c| c.kind == *kind))
        .collect();
    let count_of = |kind: BootEntryKind| grouped.iter().filter(|c| c.kind == kind).count();
    let n471 = count_of(BootEntryKind::Code471);
    let n472 = count_of(BootEntryKind::Code472);
    let nloader = count_of(BootEntryKind::Loader);
    if n471 > u8::MAX as usize || n472 > u8::MAX as usize || nloader > u8::MAX as usize {
        return Err(ImageError::UnsupportedComponentCombination(
            "more than 255 components in one entry group".into(),
        ));
    }

    let total = grouped.len();
    let table_end = BOOT_HEADER_SIZE + total * BOOT_ENTRY_SIZE;
    let data_start = align_up(table_end, DATA_ALIGN);

    // Entry table and data region.
    let mut entries = Vec::with_capacity(total);
    let mut data = Vec::new();
    let mut offset = data_start;
    for component in &grouped {
        let stored = align_up(component.data.len(), DATA_ALIGN);
        let mut entry = BootEntry::new_zeroed();
        entry.size = BOOT_ENTRY_SIZE as u8;
        entry.kind = component.kind as u8;
        entry.set_name(&component.name);
        entry.data_offset = offset as u32;
        entry.data_size = stored as u32;
        entry.raw_size = component.data.len() as u32;
        entries.push(entry);

        let mut region = component.data.clone();
        region.resize(stored, 0);
        if params.encrypt_entries {
            match component.kind {
                BootEntryKind::Loader => cipher_blocks(&mut region),
                _ => cipher(&mut region),
            }
        }
        data.extend_from_slice(&region);
        offset += stored;
    }

    // Header with the group directory.
    let mut header = BootHeader::new_zeroed();
    header.tag = BOOT_TAG;
    header.size = BOOT_HEADER_SIZE as u16;
    header.version = packed_bcd_version(params.version.0, params.version.1);
    header.merger_version = BOOT_MERGER_VERSION;
    header.release_time = params.release_time;
    header.chip_type = chip_id(&params.chip_name);
    header.code471_num = n471 as u8;
    header.code471_offset = BOOT_HEADER_SIZE as u32;
    header.code471_size = BOOT_ENTRY_SIZE as u8;
    header.code472_num = n472 as u8;
    header.code472_offset = (BOOT_HEADER_SIZE + n471 * BOOT_ENTRY_SIZE) as u32;
    header.code472_size = BOOT_ENTRY_SIZE as u8;
    header.loader_num = nloader as u8;
    header.loader_offset = (BOOT_HEADER_SIZE + (n471 + n472) * BOOT_ENTRY_SIZE) as u32;
    header.loader_size = BOOT_ENTRY_SIZE as u8;
    header.sign_flag = 0;
    header.rc4_flag = if params.encrypt_entries { 0 } else { 1 };

    let mut out = Vec::with_capacity(data_start + data.len() + 4);
    out.extend_from_slice(header.as_bytes());
    for entry in &entries {
        out.extend_from_slice(entry.as_bytes());
    }
    out.resize(data_start, 0);
    out.extend_from_slice(&data);

    if params.encrypt_header {
        let enc_len = align_up(table_end, BLOCK_SIZE);
        cipher_blocks(&mut out[..enc_len]);
    }

    // Trailing checksum over everything written so far, ciphered form
    // included.
    let crc = crc32(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(out)
}

/// Decode a bootstrap container.
///
/// The trailing checksum is verified first, over the bytes as written; a
/// mismatch is reported as a warning and decoding continues so corrupted
/// images can still be inspected.
pub fn unpack(container: &[u8]) -> ImageResult<UnpackedBootstrap> {
    if container.len() < BOOT_HEADER_SIZE + 4 {
        return Err(ImageError::MalformedImage(format!(
            "container of {} bytes is shorter than the bootstrap header",
            container.len()
        )));
    }
    let body_len = container.len() - 4;
    let stored_crc = u32::from_le_bytes(container[body_len..].try_into().unwrap());
    let computed_crc = crc32(&container[..body_len]);

    let mut warnings = Vec::new();
    if stored_crc != computed_crc {
        warnings.push(IntegrityWarning::Crc {
            stored: stored_crc,
            computed: computed_crc,
        });
    }

    let mut scratch = container[..body_len].to_vec();
    let mut header = BootHeader::read_from_prefix(&scratch[..]).unwrap();
    let mut ciphered_header = false;
    if header.tag != BOOT_TAG {
        // Vendor-compat form with a ciphered header region: decipher the
        // first block, which covers the header struct, and retry.
        let first = BLOCK_SIZE.min(scratch.len());
        cipher_block(&mut scratch[..first]);
        header = BootHeader::read_from_prefix(&scratch[..]).unwrap();
        let tag = header.tag;
        if tag != BOOT_TAG {
            return Err(ImageError::MalformedImage(format!(
                "unrecognized bootstrap tag 0x{tag:08X}"
            )));
        }
        ciphered_header = true;
        let total =
            header.code471_num as usize + header.code472_num as usize + header.loader_num as usize;
        let table_end = BOOT_HEADER_SIZE + total * BOOT_ENTRY_SIZE;
        let enc_len = align_up(table_end, BLOCK_SIZE);
        if enc_len > scratch.len() {
            return Err(ImageError::MalformedImage(
                "entry table extends past container end".into(),
            ));
        }
        if enc_len > first {
            cipher_blocks(&mut scratch[first..enc_len]);
        }
    }

    let groups = [
        (header.code471_offset, header.code471_num, BootEntryKind::Code471),
        (header.code472_offset, header.code472_num, BootEntryKind::Code472),
        (header.loader_offset, header.loader_num, BootEntryKind::Loader),
    ];

    let rc4_entries = header.rc4_flag == 0;
    let mut components = Vec::new();
    for (group_offset, num, expected_kind) in groups {
        for i in 0..num as usize {
            let entry_offset = group_offset as usize + i * BOOT_ENTRY_SIZE;
            let entry = scratch
                .get(entry_offset..)
                .and_then(BootEntry::read_from_prefix)
                .ok_or_else(|| {
                    ImageError::MalformedImage("entry table extends past container end".into())
                })?;
            let kind = BootEntryKind::try_from(entry.kind)?;
            if kind != expected_kind {
                return Err(ImageError::MalformedImage(format!(
                    "entry {i} in the {expected_kind:?} group has kind {kind:?}"
                )));
            }

            let start = entry.data_offset as usize;
            let size = entry.data_size as usize;
            let region = scratch.get(start..start + size).ok_or_else(|| {
                ImageError::MalformedImage(format!(
                    "component data at 0x{start:X}+0x{size:X} extends past container end"
                ))
            })?;
            let mut data = region.to_vec();
            if rc4_entries {
                match kind {
                    BootEntryKind::Loader => cipher_blocks(&mut data),
                    _ => cipher(&mut data),
                }
            }
            let raw = entry.raw_size as usize;
            if raw > 0 && raw <= data.len() {
                data.truncate(raw);
            }
            components.push(UnpackedBootComponent {
                name: entry.name_string(),
                kind,
                data,
            });
        }
    }

    Ok(UnpackedBootstrap {
        chip_type: header.chip_type,
        version: unpack_bcd_version(header.version),
        release_time: header.release_time,
        ciphered_header,
        components,
        warnings,
    })
}

/// Unpack a container and write each component to `dir` as `<name>.bin`,
/// returning the written paths in entry order.
pub fn unpack_to_dir(
    container: &[u8],
    dir: &Path,
) -> ImageResult<(Vec<PathBuf>, Vec<IntegrityWarning>)> {
    let unpacked = unpack(container)?;
    std::fs::create_dir_all(dir)?;
    let mut paths = Vec::with_capacity(unpacked.components.len());
    for (i, component) in unpacked.components.iter().enumerate() {
        let stem = if component.name.is_empty() {
            format!("entry{i}")
        } else {
            component.name.clone()
        };
        let mut path = dir.join(format!("{stem}.bin"));
        if paths.contains(&path) {
            path = dir.join(format!("{stem}_{i}.bin"));
        }
        std::fs::write(&path, &component.data)?;
        paths.push(path);
    }
    Ok((paths, unpacked.warnings))
}
