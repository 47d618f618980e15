/*++

Licensed under the Apache-2.0 license.

File Name:

   trust.rs

Abstract:

    File contains the trust codec: the container holding the secure-world
    firmware components behind per-component digests and a sector-unit
    location table.

--*/

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rkimage_crypto::digest256;
use rkimage_elf::{segment_payload, select_segments, SegmentSelection};
use rkimage_types::{
    packed_bcd_version, unpack_bcd_version, ComponentData, ImageError, ImageResult,
    IntegrityWarning, TrustComponent, TrustComponentId, TrustHeader, COMPONENT_DATA_SIZE,
    DATA_ALIGN, SECTOR_SHIFT, TRUST_COMPONENT_SIZE, TRUST_HEADER_BLOCK_SIZE,
    TRUST_HEADER_STRUCT_SIZE, TRUST_SIGNATURE_SIZE, TRUST_TAG,
};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::align_up;

/// Default capacity of one redundant copy.
pub const DEFAULT_MAX_SIZE: usize = 2 * 1024 * 1024;

/// Default number of redundant copies.
pub const DEFAULT_COPIES: usize = 2;

/// Digest mode recorded in the header flags. The digest itself is always
/// the little-endian SHA-256; the mode is nominal, like the signature
/// mode, and exists for boot ROM compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum ShaMode {
    None = 0,
    Sha1 = 1,
    Sha256Be = 2,
    #[default]
    Sha256 = 3,
}

/// Signature mode recorded in the header flags. Signing is not
/// implemented; the RSA regions stay reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum RsaMode {
    None = 0,
    Pkcs15Rsa1024 = 1,
    #[default]
    Pkcs15Rsa2048 = 2,
    Pkcs21 = 3,
    Pkcs21New = 4,
}

impl TryFrom<u32> for ShaMode {
    type Error = ImageError;

    fn try_from(value: u32) -> ImageResult<Self> {
        match value {
            0 => Ok(ShaMode::None),
            1 => Ok(ShaMode::Sha1),
            2 => Ok(ShaMode::Sha256Be),
            3 => Ok(ShaMode::Sha256),
            _ => Err(ImageError::Config(format!("unknown digest mode {value}"))),
        }
    }
}

impl TryFrom<u32> for RsaMode {
    type Error = ImageError;

    fn try_from(value: u32) -> ImageResult<Self> {
        match value {
            0 => Ok(RsaMode::None),
            1 => Ok(RsaMode::Pkcs15Rsa1024),
            2 => Ok(RsaMode::Pkcs15Rsa2048),
            3 => Ok(RsaMode::Pkcs21),
            4 => Ok(RsaMode::Pkcs21New),
            _ => Err(ImageError::Config(format!("unknown signature mode {value}"))),
        }
    }
}

/// A secure-world component with its payload resolved to bytes.
#[derive(Debug, Clone)]
pub struct TrustSource {
    pub id: TrustComponentId,
    pub load_addr: u32,
    pub data: Vec<u8>,
}

impl TrustSource {
    /// Wrap a flat binary loading at `load_addr`.
    pub fn from_binary(id: TrustComponentId, load_addr: u32, data: Vec<u8>) -> Self {
        Self {
            id,
            load_addr,
            data,
        }
    }

    /// Resolve component payloads from raw input bytes.
    ///
    /// An ELF executable contributes its loadable segments under the
    /// selection rule, each loading at its own virtual address (the
    /// manifest address is ignored, as the vendor chain does). Anything
    /// else is taken as a flat binary at `load_addr`.
    pub fn from_image_bytes(
        id: TrustComponentId,
        load_addr: u32,
        bytes: &[u8],
        selection: SegmentSelection,
    ) -> ImageResult<Vec<Self>> {
        if !rkimage_elf::is_elf(bytes) {
            return Ok(vec![Self::from_binary(id, load_addr, bytes.to_vec())]);
        }
        let segments = select_segments(bytes, selection)?;
        let mut sources = Vec::with_capacity(segments.len());
        for segment in &segments {
            sources.push(Self {
                id,
                load_addr: segment.addr as u32,
                data: segment_payload(bytes, segment)?.to_vec(),
            });
        }
        Ok(sources)
    }
}

/// Pack parameters.
#[derive(Debug, Clone)]
pub struct TrustParams {
    pub version: (u32, u32),
    pub sha_mode: ShaMode,
    pub rsa_mode: RsaMode,
    pub max_size: usize,
    pub copies: usize,
}

impl Default for TrustParams {
    fn default() -> Self {
        Self {
            version: (1, 0),
            sha_mode: ShaMode::default(),
            rsa_mode: RsaMode::default(),
            max_size: DEFAULT_MAX_SIZE,
            copies: DEFAULT_COPIES,
        }
    }
}

/// One component recovered from a container.
#[derive(Debug)]
pub struct UnpackedTrustComponent {
    pub id: TrustComponentId,
    pub load_addr: u32,
    pub data: Vec<u8>,
}

/// Result of unpacking a trust container.
#[derive(Debug)]
pub struct UnpackedTrust {
    pub version: (u32, u32),
    pub components: Vec<UnpackedTrustComponent>,
    pub warnings: Vec<IntegrityWarning>,
}

/// Assemble a trust container from resolved components in declaration
/// order.
pub fn pack(components: &[TrustSource], params: &TrustParams) -> ImageResult<Vec<u8>> {
    let count = components.len();
    if count == 0 {
        return Err(ImageError::UnsupportedComponentCombination(
            "no enabled components for the trust container".into(),
        ));
    }
    let sign_offset = TRUST_HEADER_STRUCT_SIZE + count * COMPONENT_DATA_SIZE;
    let table_offset = sign_offset + TRUST_SIGNATURE_SIZE;
    if table_offset + count * TRUST_COMPONENT_SIZE > TRUST_HEADER_BLOCK_SIZE {
        return Err(ImageError::UnsupportedComponentCombination(format!(
            "{count} components do not fit the trust header block"
        )));
    }

    let mut header = TrustHeader::new_zeroed();
    header.tag = TRUST_TAG;
    header.version = packed_bcd_version(params.version.0, params.version.1);
    header.flags = (params.sha_mode as u32 & 0xF) | ((params.rsa_mode as u32 & 0xF) << 4);
    header.size = ((count as u32) << 16) | ((sign_offset as u32) >> 2);

    let mut out = vec![0u8; TRUST_HEADER_BLOCK_SIZE];
    out[..TRUST_HEADER_STRUCT_SIZE].copy_from_slice(header.as_bytes());

    for (i, component) in components.iter().enumerate() {
        let mut padded = component.data.clone();
        padded.resize(align_up(padded.len(), DATA_ALIGN), 0);

        let mut record = ComponentData::new_zeroed();
        record.hash = digest256(&padded);
        record.load_addr = component.load_addr;
        let record_offset = TRUST_HEADER_STRUCT_SIZE + i * COMPONENT_DATA_SIZE;
        out[record_offset..record_offset + COMPONENT_DATA_SIZE]
            .copy_from_slice(record.as_bytes());

        let location = TrustComponent {
            id: component.id.tag(),
            storage_addr: (out.len() >> SECTOR_SHIFT) as u32,
            storage_size: (padded.len() >> SECTOR_SHIFT) as u32,
            raw_size: component.data.len() as u32,
        };
        let location_offset = table_offset + i * TRUST_COMPONENT_SIZE;
        out[location_offset..location_offset + TRUST_COMPONENT_SIZE]
            .copy_from_slice(location.as_bytes());

        out.extend_from_slice(&padded);
    }

    if out.len() > params.max_size {
        return Err(ImageError::PayloadTooLarge {
            size: out.len(),
            capacity: params.max_size,
        });
    }
    out.resize(params.max_size, 0);

    let mut image = Vec::with_capacity(params.max_size * params.copies);
    for _ in 0..params.copies {
        image.extend_from_slice(&out);
    }
    Ok(image)
}

/// Decode the first copy of a trust container.
///
/// Per-component digest mismatches are warnings; the payloads are still
/// returned.
pub fn unpack(container: &[u8]) -> ImageResult<UnpackedTrust> {
    let header = TrustHeader::read_from_prefix(container).ok_or_else(|| {
        ImageError::MalformedImage(format!(
            "container of {} bytes is shorter than the trust header",
            container.len()
        ))
    })?;
    if header.tag != TRUST_TAG {
        return Err(ImageError::MalformedImage(format!(
            "unrecognized trust tag {:02X?}",
            header.tag
        )));
    }
    if container.len() < TRUST_HEADER_BLOCK_SIZE {
        return Err(ImageError::MalformedImage(
            "container is shorter than the trust header block".into(),
        ));
    }

    let count = header.component_count();
    let table_offset = header.sign_offset() + TRUST_SIGNATURE_SIZE;
    if header.sign_offset() != TRUST_HEADER_STRUCT_SIZE + count * COMPONENT_DATA_SIZE
        || table_offset + count * TRUST_COMPONENT_SIZE > TRUST_HEADER_BLOCK_SIZE
    {
        return Err(ImageError::MalformedImage(
            "trust header tables are inconsistent with the component count".into(),
        ));
    }

    let mut components = Vec::with_capacity(count);
    let mut warnings = Vec::new();
    for i in 0..count {
        let record_offset = TRUST_HEADER_STRUCT_SIZE + i * COMPONENT_DATA_SIZE;
        let record = ComponentData::read_from_prefix(&container[record_offset..]).unwrap();
        let location_offset = table_offset + i * TRUST_COMPONENT_SIZE;
        let location = TrustComponent::read_from_prefix(&container[location_offset..]).unwrap();

        let id = TrustComponentId::from_tag(location.id)?;
        let start = location.byte_offset();
        let size = location.byte_size();
        let stored = container.get(start..start + size).ok_or_else(|| {
            ImageError::MalformedImage(format!(
                "component {} at 0x{start:X}+0x{size:X} extends past container end",
                id.name()
            ))
        })?;

        if digest256(stored) != record.hash {
            warnings.push(IntegrityWarning::Digest {
                component: id.name().to_string(),
            });
        }

        let raw = location.raw_size as usize;
        let data = if raw > 0 && raw <= stored.len() {
            stored[..raw].to_vec()
        } else {
            stored.to_vec()
        };
        components.push(UnpackedTrustComponent {
            id,
            load_addr: record.load_addr,
            data,
        });
    }

    Ok(UnpackedTrust {
        version: unpack_bcd_version(header.version),
        components,
        warnings,
    })
}

/// Unpack a container and write each component to `dir`, returning the
/// written paths keyed by component name. Repeated ids (an all-segments
/// packing) get an index suffix instead of overwriting each other.
pub fn unpack_to_dir(
    container: &[u8],
    dir: &Path,
) -> ImageResult<(BTreeMap<String, PathBuf>, Vec<IntegrityWarning>)> {
    let unpacked = unpack(container)?;
    std::fs::create_dir_all(dir)?;
    let mut paths = BTreeMap::new();
    for component in &unpacked.components {
        let mut name = component.id.name().to_string();
        if paths.contains_key(&name) {
            let mut i = 1;
            while paths.contains_key(&format!("{name}_{i}")) {
                i += 1;
            }
            name = format!("{name}_{i}");
        }
        let path = dir.join(&name);
        std::fs::write(&path, &component.data)?;
        paths.insert(name, path);
    }
    Ok((paths, unpacked.warnings))
}
