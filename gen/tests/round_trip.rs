/*++

Licensed under the Apache-2.0 license.

File Name:

   round_trip.rs

Abstract:

    End-to-end tests driving the codecs from parsed manifests, the way
    the packaging tool uses them.

--*/

use std::path::{Path, PathBuf};

use rkimage_gen::{bootstrap, loader, trust};
use rkimage_manifest::{BootManifest, BootTarget, TrustManifest};
use rkimage_types::{BootEntryKind, ReleaseTime, TrustComponentId, DATA_ALIGN};
use zerocopy::FromZeroes;

struct TempDir(PathBuf);

impl TempDir {
    fn new(label: &str) -> Self {
        let path = std::env::temp_dir().join(format!("rkimage-{label}-{}", std::process::id()));
        std::fs::create_dir_all(&path).unwrap();
        Self(path)
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn load_components(
    manifest: &BootManifest,
    target: BootTarget,
) -> Vec<bootstrap::BootComponent> {
    manifest
        .components(target)
        .into_iter()
        .map(|c| bootstrap::BootComponent {
            name: c.name,
            kind: c.kind,
            data: std::fs::read(&c.path).unwrap(),
        })
        .collect()
}

/// A manifest declaring the same DRAM-init binary under both boot-media
/// groups. Selecting the storage target must pack the flash stages and
/// nothing from the USB groups, even though those are also populated.
#[test]
fn test_storage_target_ignores_usb_group() {
    let dir = TempDir::new("scenario2");
    let ddr: Vec<u8> = (0..4000u32).map(|i| (i % 199) as u8).collect();
    let usbplug = vec![0xEE; 2000];
    std::fs::write(dir.path().join("ddr.bin"), &ddr).unwrap();
    std::fs::write(dir.path().join("usbplug.bin"), &usbplug).unwrap();

    let text = "\
[CHIP_NAME]
NAME=RK3399
[VERSION]
MAJOR=1
MINOR=2
[CODE471_OPTION]
NUM=1
Path1=ddr.bin
[CODE472_OPTION]
NUM=1
Path1=usbplug.bin
[LOADER_OPTION]
NUM=1
LOADER1=FlashBoot
FlashBoot=ddr.bin
[OUTPUT]
PATH=loader.bin
";
    let manifest_path = dir.path().join("RKBOOT.ini");
    std::fs::write(&manifest_path, text).unwrap();
    let manifest = BootManifest::from_file(&manifest_path).unwrap();

    let components = load_components(&manifest, BootTarget::Storage);
    assert_eq!(components.len(), 1);

    let params = bootstrap::BootstrapParams {
        chip_name: manifest.chip_name.clone(),
        version: manifest.version,
        release_time: ReleaseTime::new_zeroed(),
        ..Default::default()
    };
    let image = bootstrap::pack(&components, &params).unwrap();

    let unpacked = bootstrap::unpack(&image).unwrap();
    assert_eq!(unpacked.components.len(), 1);
    assert_eq!(unpacked.components[0].name, "FlashBoot");
    assert_eq!(unpacked.components[0].kind, BootEntryKind::Loader);
    // The single component is the flash-boot file, byte for byte.
    assert_eq!(unpacked.components[0].data, ddr);

    // The recovery selection of the same manifest packs the USB pair.
    let recovery = load_components(&manifest, BootTarget::Recovery);
    assert_eq!(recovery.len(), 2);
    assert_eq!(recovery[1].data, usbplug);
}

/// Corrupting a component byte must produce a warning and the payload,
/// never an abort.
#[test]
fn test_corrupted_bootstrap_still_unpacks() {
    let components = vec![bootstrap::BootComponent {
        name: "FlashData".into(),
        kind: BootEntryKind::Loader,
        data: vec![0x11; 5000],
    }];
    let params = bootstrap::BootstrapParams {
        chip_name: "RK3399".into(),
        version: (1, 0),
        ..Default::default()
    };
    let mut image = bootstrap::pack(&components, &params).unwrap();
    // Flip one byte inside the component region.
    image[DATA_ALIGN + 123] ^= 0x20;

    let unpacked = bootstrap::unpack(&image).unwrap();
    assert_eq!(unpacked.warnings.len(), 1);
    assert_eq!(unpacked.components.len(), 1);
    assert_eq!(unpacked.components[0].data.len(), 5000);
    assert_ne!(unpacked.components[0].data, components[0].data);
}

/// Trust packing straight from a manifest, with the enabled ELF
/// component resolved through the extractor.
#[test]
fn test_trust_pack_from_manifest_with_elf() {
    let dir = TempDir::new("trust-elf");
    let payload = b"secure monitor code".to_vec();
    let elf = build_elf64(&[(0x40000, &payload), (0x50000, b"second segment")]);
    std::fs::write(dir.path().join("bl31.elf"), &elf).unwrap();
    std::fs::write(dir.path().join("bl32.bin"), [0x77u8; 300]).unwrap();

    let text = "\
[VERSION]
MAJOR=1
MINOR=3
[BL31_OPTION]
SEC=1
PATH=bl31.elf
ADDR=0x10000
[BL32_OPTION]
SEC=1
PATH=bl32.bin
ADDR=0x08400000
[OUTPUT]
PATH=trust.img
";
    let manifest_path = dir.path().join("RKTRUST.ini");
    std::fs::write(&manifest_path, text).unwrap();
    let manifest = TrustManifest::from_file(&manifest_path).unwrap();

    let mut sources = Vec::new();
    for component in &manifest.components {
        let bytes = std::fs::read(&component.path).unwrap();
        sources.extend(
            trust::TrustSource::from_image_bytes(
                component.id,
                component.load_addr,
                &bytes,
                rkimage_elf::SegmentSelection::FirstLoadable,
            )
            .unwrap(),
        );
    }
    assert_eq!(sources.len(), 2);
    // The ELF component loads at its first segment's address, not the
    // manifest's.
    assert_eq!(sources[0].load_addr, 0x40000);
    assert_eq!(sources[0].data, payload);

    let params = trust::TrustParams {
        version: manifest.version,
        ..Default::default()
    };
    let image = trust::pack(&sources, &params).unwrap();
    let unpacked = trust::unpack(&image).unwrap();
    assert!(unpacked.warnings.is_empty());
    assert_eq!(unpacked.version, (1, 3));
    assert_eq!(unpacked.components[0].id, TrustComponentId::Bl31);
    assert_eq!(unpacked.components[0].data, payload);
    assert_eq!(unpacked.components[1].load_addr, 0x0840_0000);

    let out = TempDir::new("trust-elf-out");
    let (paths, _) = trust::unpack_to_dir(&image, out.path()).unwrap();
    assert_eq!(std::fs::read(&paths["BL31"]).unwrap(), payload);
}

/// Every codec keeps its component data on 2048-byte boundaries.
#[test]
fn test_alignment_invariant_across_codecs() {
    let loader_image = loader::pack(&[1u8; 777], &loader::LoaderParams::default()).unwrap();
    // The loader payload region starts right after the fixed header.
    assert_eq!(loader_image.len() % DATA_ALIGN, 0);

    let trust_image = trust::pack(
        &[
            trust::TrustSource::from_binary(TrustComponentId::Bl31, 0x10000, vec![9u8; 100]),
            trust::TrustSource::from_binary(TrustComponentId::Bl32, 0x20000, vec![8u8; 3000]),
        ],
        &trust::TrustParams::default(),
    )
    .unwrap();
    let unpacked = trust::unpack(&trust_image).unwrap();
    assert_eq!(unpacked.components.len(), 2);

    let components: Vec<bootstrap::BootComponent> = (0..3)
        .map(|i| bootstrap::BootComponent {
            name: format!("stage{i}"),
            kind: BootEntryKind::Loader,
            data: vec![i as u8; 100 + i * 1000],
        })
        .collect();
    let image = bootstrap::pack(&components, &bootstrap::BootstrapParams::default()).unwrap();
    let unpacked = bootstrap::unpack(&image).unwrap();
    for (got, want) in unpacked.components.iter().zip(&components) {
        assert_eq!(got.data, want.data);
    }
}

/// Round-trip identity across the full range of loader payload sizes at
/// the alignment edges.
#[test]
fn test_loader_round_trip_size_sweep() {
    for size in [0usize, 1, 3, 4, 5, 511, 512, 513, 2047, 2048] {
        let payload: Vec<u8> = (0..size).map(|i| (i * 13 % 251) as u8).collect();
        let image = loader::pack(&payload, &loader::LoaderParams::default()).unwrap();
        let unpacked = loader::unpack(&image).unwrap();
        assert!(unpacked.warnings.is_empty(), "warnings at size {size}");
        assert_eq!(unpacked.payload, payload, "mismatch at size {size}");
    }
}

/// Minimal 64-bit ELF builder shared with the unit tests in rkimage-elf.
fn build_elf64(segments: &[(u64, &[u8])]) -> Vec<u8> {
    const EHDR: usize = 64;
    const PHENT: usize = 56;
    let phoff = EHDR;
    let data_start = phoff + segments.len() * PHENT;

    let mut image = vec![0u8; data_start];
    image[0..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
    image[4] = 2;
    image[5] = 1;
    image[6] = 1;
    image[16..18].copy_from_slice(&2u16.to_le_bytes());
    image[18..20].copy_from_slice(&0xB7u16.to_le_bytes());
    image[20..24].copy_from_slice(&1u32.to_le_bytes());
    image[32..40].copy_from_slice(&(phoff as u64).to_le_bytes());
    image[52..54].copy_from_slice(&(EHDR as u16).to_le_bytes());
    image[54..56].copy_from_slice(&(PHENT as u16).to_le_bytes());
    image[56..58].copy_from_slice(&(segments.len() as u16).to_le_bytes());

    let mut offset = data_start as u64;
    for (i, (vaddr, payload)) in segments.iter().enumerate() {
        let p = phoff + i * PHENT;
        image[p..p + 4].copy_from_slice(&1u32.to_le_bytes());
        image[p + 8..p + 16].copy_from_slice(&offset.to_le_bytes());
        image[p + 16..p + 24].copy_from_slice(&vaddr.to_le_bytes());
        image[p + 24..p + 32].copy_from_slice(&vaddr.to_le_bytes());
        image[p + 32..p + 40].copy_from_slice(&(payload.len() as u64).to_le_bytes());
        image[p + 40..p + 48].copy_from_slice(&(payload.len() as u64).to_le_bytes());
        offset += payload.len() as u64;
    }
    for (_, payload) in segments {
        image.extend_from_slice(payload);
    }
    image
}
