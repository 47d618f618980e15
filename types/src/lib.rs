/*++

Licensed under the Apache-2.0 license.

File Name:

   lib.rs

Abstract:

    File contains the wire-format data structures shared by the boot image
    codecs, along with the error taxonomy and small encoding helpers.

--*/

use thiserror::Error;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Alignment of every component data region within a container.
pub const DATA_ALIGN: usize = 2048;

/// Storage block size; also the stream cipher's unit of operation.
pub const BLOCK_SIZE: usize = 512;

/// Shift converting 512-byte sector counts to byte counts.
pub const SECTOR_SHIFT: u32 = 9;

pub const LOADER_MAGIC_SIZE: usize = 8;
pub const LOADER_HASH_SIZE: usize = 32;
pub const LOADER_HEADER_SIZE: usize = 2048;
pub const LOADER_MAGIC_UBOOT: [u8; LOADER_MAGIC_SIZE] = *b"LOADER  ";
pub const LOADER_MAGIC_TRUST_OS: [u8; LOADER_MAGIC_SIZE] = *b"TOS     ";

pub const BOOT_TAG: u32 = 0x544F_4F42; // "BOOT"
pub const BOOT_MERGER_VERSION: u32 = 0x0103_0000;
pub const BOOT_HEADER_SIZE: usize = 102;
pub const BOOT_ENTRY_SIZE: usize = 54;
pub const BOOT_NAME_LEN: usize = 20;

pub const TRUST_TAG: [u8; 4] = *b"BL3X";
pub const TRUST_HEADER_STRUCT_SIZE: usize = 800;
pub const TRUST_HEADER_BLOCK_SIZE: usize = 2048;
pub const TRUST_SIGNATURE_SIZE: usize = 256;
pub const COMPONENT_DATA_SIZE: usize = 48;
pub const TRUST_COMPONENT_SIZE: usize = 16;

pub const IDB_SIGNATURE: u32 = 0x0FF0_AA55;
pub const IDB_HEADER_SIZE: usize = 512;
/// First payload block of a card-boot image, in 512-byte blocks.
pub const IDB_INIT_OFFSET: u16 = 4;
/// Init payload sizes are rounded up to this many blocks.
pub const IDB_INIT_ALIGN_BLOCKS: usize = 4;

/// Error taxonomy for the codec layer.
///
/// Checksum mismatches found while unpacking are deliberately not part of
/// this taxonomy; they surface as [`IntegrityWarning`] values next to the
/// decoded payload.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("config: {0}")]
    Config(String),

    #[error("payload too large: {size} bytes exceeds capacity of {capacity} bytes")]
    PayloadTooLarge { size: usize, capacity: usize },

    #[error("malformed image: {0}")]
    MalformedImage(String),

    #[error("unsupported component combination: {0}")]
    UnsupportedComponentCombination(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ImageResult<T> = Result<T, ImageError>;

/// Non-fatal integrity finding reported by an unpack operation.
///
/// The decoded payload is returned regardless, so corrupted images remain
/// inspectable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityWarning {
    /// Stored CRC does not match the recomputed value.
    Crc { stored: u32, computed: u32 },
    /// Stored digest of a named component does not match.
    Digest { component: String },
}

impl core::fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            IntegrityWarning::Crc { stored, computed } => {
                write!(
                    f,
                    "checksum mismatch: stored 0x{stored:08X}, computed 0x{computed:08X}"
                )
            }
            IntegrityWarning::Digest { component } => {
                write!(f, "digest mismatch on component {component}")
            }
        }
    }
}

/// Encode a decimal value into one packed-decimal byte (one digit per
/// nibble). Values above 99 wrap modulo 100, as the vendor tools do.
pub fn bcd_byte(value: u32) -> u8 {
    let value = value % 100;
    (((value / 10) << 4) | (value % 10)) as u8
}

/// Decode one packed-decimal byte.
pub fn bcd_decode(value: u8) -> u32 {
    ((value >> 4) as u32) * 10 + (value & 0xF) as u32
}

/// Pack a major/minor pair into the version word used by the bootstrap and
/// trust headers: packed-decimal major in bits 15:8, minor in bits 7:0.
pub fn packed_bcd_version(major: u32, minor: u32) -> u32 {
    ((bcd_byte(major) as u32) << 8) | bcd_byte(minor) as u32
}

/// Decode a packed-decimal version word back into (major, minor).
pub fn unpack_bcd_version(version: u32) -> (u32, u32) {
    (bcd_decode((version >> 8) as u8), bcd_decode(version as u8))
}

/// Map a chip name to its packed 32-bit identifier.
///
/// Early chip families use fixed enumerator values; newer names drop the
/// "RK" prefix and pack the next four ASCII characters big-endian, so
/// "RK3399" becomes 0x33333939.
pub fn chip_id(name: &str) -> u32 {
    const LEGACY: &[(&str, u32)] = &[
        ("RK27", 0x10),
        ("RKCAYMAN", 0x11),
        ("RK28", 0x20),
        ("RK281X", 0x21),
        ("RKPANDA", 0x22),
        ("RKNANO", 0x30),
        ("RKSMART", 0x31),
        ("RKCROWN", 0x40),
        ("RK29", 0x50),
        ("RK292X", 0x51),
        ("RK30", 0x60),
        ("RK30B", 0x61),
        ("RK31", 0x70),
        ("RK32", 0x80),
    ];
    if let Some((_, id)) = LEGACY.iter().find(|(n, _)| *n == name) {
        return *id;
    }
    let digits = name.strip_prefix("RK").unwrap_or(name);
    let mut bytes = [0u8; 4];
    for (i, b) in digits.bytes().take(4).enumerate() {
        bytes[i] = b;
    }
    u32::from_be_bytes(bytes)
}

/// Second-loader container header. One 2048-byte copy precedes each
/// redundant payload block.
///
/// The word after `version` is reserved from the boot ROM's point of view;
/// the packer records the payload's original byte length there so unpack
/// can strip the 4-byte alignment padding.
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy)]
pub struct LoaderHeader {
    pub magic: [u8; LOADER_MAGIC_SIZE],
    pub version: u32,
    pub raw_size: u32,
    pub load_addr: u32,
    pub load_size: u32,
    pub crc: u32,
    pub hash_len: u32,
    pub hash: [u8; LOADER_HASH_SIZE],
    pub reserved: [u8; 960],
    pub sign_tag: u32,
    pub sign_len: u32,
    pub rsa_sign: [u8; 256],
    pub reserved2: [u8; 760],
}

const _: () = assert!(core::mem::size_of::<LoaderHeader>() == LOADER_HEADER_SIZE);

/// Creation timestamp stored in the bootstrap header.
#[repr(C, packed)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReleaseTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

const _: () = assert!(core::mem::size_of::<ReleaseTime>() == 7);

/// Bootstrap container header.
#[repr(C, packed)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy)]
pub struct BootHeader {
    pub tag: u32,
    pub size: u16,
    pub version: u32,
    pub merger_version: u32,
    pub release_time: ReleaseTime,
    pub chip_type: u32,
    pub code471_num: u8,
    pub code471_offset: u32,
    pub code471_size: u8,
    pub code472_num: u8,
    pub code472_offset: u32,
    pub code472_size: u8,
    pub loader_num: u8,
    pub loader_offset: u32,
    pub loader_size: u8,
    pub sign_flag: u8,
    pub rc4_flag: u8,
    pub reserved: [u8; 57],
}

const _: () = assert!(core::mem::size_of::<BootHeader>() == BOOT_HEADER_SIZE);

/// Kind tag of a bootstrap entry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootEntryKind {
    /// DRAM initialization code, recovery/USB boot path.
    Code471 = 0x1,
    /// USB-plug code, recovery/USB boot path.
    Code472 = 0x2,
    /// Flash data/boot stages, storage boot path.
    Loader = 0x4,
}

impl TryFrom<u8> for BootEntryKind {
    type Error = ImageError;

    fn try_from(value: u8) -> ImageResult<Self> {
        match value {
            0x1 => Ok(BootEntryKind::Code471),
            0x2 => Ok(BootEntryKind::Code472),
            0x4 => Ok(BootEntryKind::Loader),
            _ => Err(ImageError::MalformedImage(format!(
                "unknown bootstrap entry kind 0x{value:02X}"
            ))),
        }
    }
}

/// Bootstrap entry-table record.
///
/// `data_size` is the stored (2048-aligned) size; `raw_size` is the
/// component's original byte length, used to strip padding on unpack.
#[repr(C, packed)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy)]
pub struct BootEntry {
    pub size: u8,
    pub kind: u8,
    pub name: [u16; BOOT_NAME_LEN],
    pub data_offset: u32,
    pub data_size: u32,
    pub raw_size: u32,
}

const _: () = assert!(core::mem::size_of::<BootEntry>() == BOOT_ENTRY_SIZE);

impl BootEntry {
    /// Store `name` as a zero-padded UTF-16LE array, truncated to fit.
    pub fn set_name(&mut self, name: &str) {
        let mut wide = [0u16; BOOT_NAME_LEN];
        for (slot, unit) in wide.iter_mut().zip(name.encode_utf16()) {
            *slot = unit;
        }
        self.name = wide;
    }

    /// Decode the stored name, stopping at the first NUL unit.
    pub fn name_string(&self) -> String {
        let name = self.name;
        let units: Vec<u16> = name.iter().copied().take_while(|&u| u != 0).collect();
        String::from_utf16_lossy(&units)
    }
}

/// Identifier of a secure-world firmware component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrustComponentId {
    Bl30,
    Bl31,
    Bl32,
    Bl33,
}

impl TrustComponentId {
    pub fn name(&self) -> &'static str {
        match self {
            TrustComponentId::Bl30 => "BL30",
            TrustComponentId::Bl31 => "BL31",
            TrustComponentId::Bl32 => "BL32",
            TrustComponentId::Bl33 => "BL33",
        }
    }

    pub fn tag(&self) -> [u8; 4] {
        let mut tag = [0u8; 4];
        tag.copy_from_slice(self.name().as_bytes());
        tag
    }

    pub fn from_tag(tag: [u8; 4]) -> ImageResult<Self> {
        match &tag {
            b"BL30" => Ok(TrustComponentId::Bl30),
            b"BL31" => Ok(TrustComponentId::Bl31),
            b"BL32" => Ok(TrustComponentId::Bl32),
            b"BL33" => Ok(TrustComponentId::Bl33),
            _ => Err(ImageError::MalformedImage(format!(
                "unknown trust component tag {:02X?}",
                tag
            ))),
        }
    }
}

/// Trust container header structure. Occupies the first 800 bytes of the
/// 2048-byte header block; the RSA fields are reserved, not computed.
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy)]
pub struct TrustHeader {
    pub tag: [u8; 4],
    pub version: u32,
    /// Digest mode in bits 3:0, signature mode in bits 7:4.
    pub flags: u32,
    /// Component count in bits 31:16, signature offset >> 2 in bits 15:0.
    pub size: u32,
    pub reserved: [u32; 4],
    pub rsa_n: [u8; 256],
    pub rsa_e: [u8; 256],
    pub rsa_c: [u8; 256],
}

const _: () = assert!(core::mem::size_of::<TrustHeader>() == TRUST_HEADER_STRUCT_SIZE);

impl TrustHeader {
    pub fn component_count(&self) -> usize {
        (self.size >> 16) as usize
    }

    pub fn sign_offset(&self) -> usize {
        ((self.size & 0xFFFF) << 2) as usize
    }
}

/// Per-component digest record in the trust header block.
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy)]
pub struct ComponentData {
    pub hash: [u8; 32],
    pub load_addr: u32,
    pub reserved: [u32; 3],
}

const _: () = assert!(core::mem::size_of::<ComponentData>() == COMPONENT_DATA_SIZE);

/// Trust component location record. Offsets and sizes are in 512-byte
/// sectors; the last word is reserved for the boot ROM and records the
/// component's original byte length for padding removal.
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy)]
pub struct TrustComponent {
    pub id: [u8; 4],
    pub storage_addr: u32,
    pub storage_size: u32,
    pub raw_size: u32,
}

const _: () = assert!(core::mem::size_of::<TrustComponent>() == TRUST_COMPONENT_SIZE);

impl TrustComponent {
    pub fn byte_offset(&self) -> usize {
        (self.storage_addr as usize) << SECTOR_SHIFT
    }

    pub fn byte_size(&self) -> usize {
        (self.storage_size as usize) << SECTOR_SHIFT
    }
}

/// Card-boot sector header (header0). Always stream-ciphered on disk.
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy)]
pub struct IdbHeader {
    pub signature: u32,
    pub reserved: [u8; 4],
    /// 0 = init payload is ciphered per 512-byte block, 1 = cleartext.
    pub disable_rc4: u32,
    /// Init payload offset in 512-byte blocks.
    pub init_offset: u16,
    pub reserved1: [u8; 492],
    /// Init payload size in blocks, 4-block aligned.
    pub init_size: u16,
    /// Init plus next-stage size in blocks, 4-block aligned.
    pub init_boot_size: u16,
    pub reserved2: [u8; 2],
}

const _: () = assert!(core::mem::size_of::<IdbHeader>() == IDB_HEADER_SIZE);
