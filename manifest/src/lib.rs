/*++

Licensed under the Apache-2.0 license.

File Name:

   lib.rs

Abstract:

    File contains the parser for the declarative component manifests
    (RKBOOT/RKTRUST INI files) that drive the boot image codecs.

--*/

mod ini;

use std::path::{Path, PathBuf};

use ini::Ini;
use rkimage_types::{BootEntryKind, ImageError, ImageResult, TrustComponentId};

/// Boot medium a bootstrap container is assembled for.
///
/// The same physical binary may be declared under both the recovery/USB
/// option groups and the storage-boot group; which one applies is a
/// property of the target medium, never of which sections happen to be
/// populated, so callers must state it explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootTarget {
    /// USB/recovery boot: CODE471 (DRAM init) and CODE472 (USB plug).
    Recovery,
    /// SD/eMMC boot: the named loader stages (FlashData, FlashBoot).
    Storage,
}

/// One component referenced by a bootstrap manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRef {
    /// Entry name recorded in the container.
    pub name: String,
    pub path: PathBuf,
    pub kind: BootEntryKind,
}

/// Parsed RKBOOT manifest.
///
/// Both boot-media option groups are exposed side by side;
/// [`BootManifest::components`] selects one for packing.
#[derive(Debug, Clone)]
pub struct BootManifest {
    pub chip_name: String,
    pub version: (u32, u32),
    pub code471: Vec<PathBuf>,
    pub code472: Vec<PathBuf>,
    pub loader: Vec<(String, PathBuf)>,
    pub output: PathBuf,
}

impl BootManifest {
    pub fn parse(text: &str) -> ImageResult<Self> {
        let ini = Ini::parse(text)?;

        let chip_name = ini.require("CHIP_NAME", "NAME")?.to_string();
        let version = parse_version(&ini)?;

        let code471 = parse_numbered_paths(&ini, "CODE471_OPTION")?;
        let code472 = parse_numbered_paths(&ini, "CODE472_OPTION")?;
        let loader = parse_loader_group(&ini)?;

        let output = PathBuf::from(ini.require("OUTPUT", "PATH")?);

        Ok(Self {
            chip_name,
            version,
            code471,
            code472,
            loader,
            output,
        })
    }

    /// Parse a manifest file, rebasing relative component paths against
    /// the manifest's directory.
    pub fn from_file(path: &Path) -> ImageResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut manifest = Self::parse(&text)?;
        if let Some(base) = path.parent() {
            for p in manifest
                .code471
                .iter_mut()
                .chain(manifest.code472.iter_mut())
                .chain(manifest.loader.iter_mut().map(|(_, p)| p))
            {
                rebase(p, base);
            }
        }
        Ok(manifest)
    }

    /// Components to pack for the given boot medium, in declaration order.
    pub fn components(&self, target: BootTarget) -> Vec<ComponentRef> {
        match target {
            BootTarget::Recovery => self
                .code471
                .iter()
                .map(|p| ComponentRef {
                    name: file_stem(p),
                    path: p.clone(),
                    kind: BootEntryKind::Code471,
                })
                .chain(self.code472.iter().map(|p| ComponentRef {
                    name: file_stem(p),
                    path: p.clone(),
                    kind: BootEntryKind::Code472,
                }))
                .collect(),
            BootTarget::Storage => self
                .loader
                .iter()
                .map(|(name, p)| ComponentRef {
                    name: name.clone(),
                    path: p.clone(),
                    kind: BootEntryKind::Loader,
                })
                .collect(),
        }
    }
}

/// One secure-world component referenced by a trust manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustComponentRef {
    pub id: TrustComponentId,
    pub path: PathBuf,
    pub load_addr: u32,
}

/// Parsed RKTRUST manifest. Components with `SEC=0` are excluded here,
/// regardless of whether a path is configured.
#[derive(Debug, Clone)]
pub struct TrustManifest {
    pub version: (u32, u32),
    pub components: Vec<TrustComponentRef>,
    pub output: PathBuf,
}

impl TrustManifest {
    pub fn parse(text: &str) -> ImageResult<Self> {
        let ini = Ini::parse(text)?;
        let version = parse_version(&ini)?;

        let mut components = Vec::new();
        for id in [
            TrustComponentId::Bl30,
            TrustComponentId::Bl31,
            TrustComponentId::Bl32,
            TrustComponentId::Bl33,
        ] {
            let section = format!("{}_OPTION", id.name());
            let Some(sec) = ini.section(&section) else {
                continue;
            };
            let enabled = sec.get("SEC").unwrap_or("0");
            if parse_u32(enabled)
                .map_err(|_| ImageError::Config(format!("[{section}] SEC is not a number")))?
                == 0
            {
                continue;
            }
            let path = sec.get("PATH").ok_or_else(|| {
                ImageError::Config(format!("[{section}] is enabled but has no PATH"))
            })?;
            let load_addr = match sec.get("ADDR") {
                Some(addr) => parse_u32(addr)
                    .map_err(|_| ImageError::Config(format!("[{section}] ADDR is not a number")))?,
                None => 0,
            };
            components.push(TrustComponentRef {
                id,
                path: PathBuf::from(path),
                load_addr,
            });
        }

        let output = PathBuf::from(ini.require("OUTPUT", "PATH")?);

        Ok(Self {
            version,
            components,
            output,
        })
    }

    /// Parse a manifest file, rebasing relative component paths against
    /// the manifest's directory.
    pub fn from_file(path: &Path) -> ImageResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut manifest = Self::parse(&text)?;
        if let Some(base) = path.parent() {
            for c in manifest.components.iter_mut() {
                rebase(&mut c.path, base);
            }
        }
        Ok(manifest)
    }
}

/// Resolve a declared component path, consulting `fallback` when the file
/// is missing. Resolution policy (search roots, substitutions) belongs to
/// the caller; a `None` from the hook leaves the declared path in place so
/// the eventual read error names it.
pub fn resolve_path(
    path: &Path,
    fallback: Option<&dyn Fn(&Path) -> Option<PathBuf>>,
) -> PathBuf {
    if path.exists() {
        return path.to_path_buf();
    }
    fallback
        .and_then(|hook| hook(path))
        .unwrap_or_else(|| path.to_path_buf())
}

fn rebase(path: &mut PathBuf, base: &Path) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn parse_version(ini: &Ini) -> ImageResult<(u32, u32)> {
    let major = ini.require("VERSION", "MAJOR")?;
    let minor = ini.require("VERSION", "MINOR")?;
    Ok((
        parse_u32(major).map_err(|_| ImageError::Config("[VERSION] MAJOR is not a number".into()))?,
        parse_u32(minor).map_err(|_| ImageError::Config("[VERSION] MINOR is not a number".into()))?,
    ))
}

/// Parse `Path1..PathN` from a `NUM=`-counted option group. The section
/// itself is optional; a declared count with a missing path is not.
fn parse_numbered_paths(ini: &Ini, section: &str) -> ImageResult<Vec<PathBuf>> {
    let Some(sec) = ini.section(section) else {
        return Ok(Vec::new());
    };
    let num = parse_u32(sec.get("NUM").unwrap_or("0"))
        .map_err(|_| ImageError::Config(format!("[{section}] NUM is not a number")))?;
    let mut paths = Vec::new();
    for i in 1..=num {
        let key = format!("Path{i}");
        let path = sec.get(&key).ok_or_else(|| {
            ImageError::Config(format!("[{section}] declares NUM={num} but {key} is missing"))
        })?;
        paths.push(PathBuf::from(path));
    }
    Ok(paths)
}

/// Parse `[LOADER_OPTION]`: `NUM=`, `LOADER1..N` naming keys whose values
/// are the stage paths.
fn parse_loader_group(ini: &Ini) -> ImageResult<Vec<(String, PathBuf)>> {
    let Some(sec) = ini.section("LOADER_OPTION") else {
        return Ok(Vec::new());
    };
    let num = parse_u32(sec.get("NUM").unwrap_or("0"))
        .map_err(|_| ImageError::Config("[LOADER_OPTION] NUM is not a number".into()))?;
    let mut loaders = Vec::new();
    for i in 1..=num {
        let key = format!("LOADER{i}");
        let name = sec.get(&key).ok_or_else(|| {
            ImageError::Config(format!(
                "[LOADER_OPTION] declares NUM={num} but {key} is missing"
            ))
        })?;
        let path = sec.get(name).ok_or_else(|| {
            ImageError::Config(format!("[LOADER_OPTION] names {name} but has no {name}= path"))
        })?;
        loaders.push((name.to_string(), PathBuf::from(path)));
    }
    Ok(loaders)
}

fn parse_u32(text: &str) -> Result<u32, core::num::ParseIntError> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        text.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RKBOOT: &str = "\
[CHIP_NAME]
NAME=RK330C
[VERSION]
MAJOR=2
MINOR=58
[CODE471_OPTION]
NUM=1
Path1=bin/rk33/rk3399_ddr_800MHz_v1.25.bin
[CODE472_OPTION]
NUM=1
Path1=bin/rk33/rk3399_usbplug_v1.26.bin
[LOADER_OPTION]
NUM=2
LOADER1=FlashData
LOADER2=FlashBoot
FlashData=bin/rk33/rk3399_ddr_800MHz_v1.25.bin
FlashBoot=bin/rk33/rk3399_miniloader_v1.26.bin
[OUTPUT]
PATH=rk3399_loader_v1.25.126.bin
";

    const RKTRUST: &str = "\
[VERSION]
MAJOR=1
MINOR=0
[BL31_OPTION]
SEC=1
PATH=bin/rk33/rk3399_bl31_v1.35.elf
ADDR=0x10000
[BL32_OPTION]
SEC=0
PATH=bin/rk33/rk3399_bl32_v2.01.bin
ADDR=0x8400000
[OUTPUT]
PATH=trust.img
";

    #[test]
    fn test_boot_manifest_exposes_both_media_groups() {
        let m = BootManifest::parse(RKBOOT).unwrap();
        assert_eq!(m.chip_name, "RK330C");
        assert_eq!(m.version, (2, 58));

        // The DRAM-init binary is declared under both media groups; the
        // parser must surface both and prefer neither.
        let recovery = m.components(BootTarget::Recovery);
        let storage = m.components(BootTarget::Storage);
        assert_eq!(recovery.len(), 2);
        assert_eq!(storage.len(), 2);
        assert_eq!(recovery[0].kind, BootEntryKind::Code471);
        assert_eq!(recovery[1].kind, BootEntryKind::Code472);
        assert_eq!(recovery[0].path, storage[0].path);
        assert_eq!(storage[0].name, "FlashData");
        assert_eq!(storage[1].name, "FlashBoot");
        assert_eq!(storage[1].kind, BootEntryKind::Loader);
    }

    #[test]
    fn test_boot_manifest_missing_sections() {
        assert!(matches!(
            BootManifest::parse("[VERSION]\nMAJOR=1\nMINOR=0\n"),
            Err(ImageError::Config(_))
        ));
        // Declared count without the matching path.
        let broken = "[CHIP_NAME]\nNAME=RK3399\n[VERSION]\nMAJOR=1\nMINOR=0\n\
                      [CODE471_OPTION]\nNUM=2\nPath1=a.bin\n[OUTPUT]\nPATH=out.bin\n";
        assert!(matches!(
            BootManifest::parse(broken),
            Err(ImageError::Config(_))
        ));
    }

    #[test]
    fn test_trust_manifest_sec_flag_excludes() {
        let m = TrustManifest::parse(RKTRUST).unwrap();
        // BL32 has a path and an address but SEC=0, so it must not pack.
        assert_eq!(m.components.len(), 1);
        assert_eq!(m.components[0].id, TrustComponentId::Bl31);
        assert_eq!(m.components[0].load_addr, 0x10000);
        assert_eq!(m.output, PathBuf::from("trust.img"));
    }

    #[test]
    fn test_trust_manifest_enabled_without_path() {
        let broken = "[VERSION]\nMAJOR=1\nMINOR=0\n[BL31_OPTION]\nSEC=1\n[OUTPUT]\nPATH=t.img\n";
        assert!(matches!(
            TrustManifest::parse(broken),
            Err(ImageError::Config(_))
        ));
    }

    #[test]
    fn test_resolve_path_hook() {
        let missing = Path::new("definitely/not/here.bin");
        let hook = |p: &Path| Some(PathBuf::from("alt").join(p.file_name()?));
        assert_eq!(
            resolve_path(missing, Some(&hook)),
            PathBuf::from("alt/here.bin")
        );
        // Without a hook the declared path is kept for error reporting.
        assert_eq!(resolve_path(missing, None), missing.to_path_buf());
    }
}
