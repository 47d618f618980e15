/*++

Licensed under the Apache-2.0 license.

File Name:

   boot.rs

Abstract:

    File contains the bootstrap container commands.

--*/

use anyhow::{anyhow, Context};
use chrono::{Datelike, Timelike};
use clap::ArgMatches;
use rkimage_gen::bootstrap;
use rkimage_manifest::{resolve_path, BootManifest, BootTarget};
use rkimage_types::ReleaseTime;
use std::path::{Path, PathBuf};

use crate::report_warnings;

fn release_time_now() -> ReleaseTime {
    let now = chrono::Local::now();
    ReleaseTime {
        year: now.year() as u16,
        month: now.month() as u8,
        day: now.day() as u8,
        hour: now.hour() as u8,
        minute: now.minute() as u8,
        second: now.second() as u8,
    }
}

pub(crate) fn run_pack(args: &ArgMatches) -> anyhow::Result<()> {
    let config: &PathBuf = args.get_one("config").unwrap();
    let target = match args.get_one::<String>("target").unwrap().as_str() {
        "recovery" => BootTarget::Recovery,
        "storage" => BootTarget::Storage,
        other => return Err(anyhow!("unknown boot target {other:?}")),
    };

    let manifest = BootManifest::from_file(config)
        .with_context(|| format!("Failed to load manifest {}", config.display()))?;

    // Fall back to a flat --bin-dir lookup when a declared path is gone.
    let bin_dir = args.get_one::<PathBuf>("bin-dir").cloned();
    let fallback = |path: &Path| -> Option<PathBuf> {
        let candidate = bin_dir.as_ref()?.join(path.file_name()?);
        candidate.exists().then_some(candidate)
    };

    let mut components = Vec::new();
    for component in manifest.components(target) {
        let path = resolve_path(&component.path, Some(&fallback));
        let data = std::fs::read(&path)
            .with_context(|| format!("Failed to read component {}", path.display()))?;
        components.push(bootstrap::BootComponent {
            name: component.name,
            kind: component.kind,
            data,
        });
    }

    let params = bootstrap::BootstrapParams {
        chip_name: manifest.chip_name.clone(),
        version: manifest.version,
        release_time: release_time_now(),
        encrypt_header: args.get_flag("cipher-header"),
        encrypt_entries: args.get_flag("cipher-entries"),
    };
    let image = bootstrap::pack(&components, &params)?;

    let out = args
        .get_one::<PathBuf>("out")
        .cloned()
        .unwrap_or_else(|| manifest.output.clone());
    std::fs::write(&out, &image)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!(
        "packed {} components for {:?} boot into {} ({} bytes)",
        components.len(),
        target,
        out.display(),
        image.len()
    );
    Ok(())
}

pub(crate) fn run_unpack(args: &ArgMatches) -> anyhow::Result<()> {
    let image_path: &PathBuf = args.get_one("image").unwrap();
    let out_dir: &PathBuf = args.get_one("out-dir").unwrap();

    let image = std::fs::read(image_path)
        .with_context(|| format!("Failed to read {}", image_path.display()))?;
    let (paths, warnings) = bootstrap::unpack_to_dir(&image, out_dir)?;
    report_warnings(&warnings);
    for path in &paths {
        println!("extracted {}", path.display());
    }
    Ok(())
}
