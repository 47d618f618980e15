/*++

Licensed under the Apache-2.0 license.

File Name:

   secure.rs

Abstract:

    File contains the trust container commands.

--*/

use anyhow::Context;
use clap::ArgMatches;
use rkimage_elf::SegmentSelection;
use rkimage_gen::trust;
use rkimage_manifest::TrustManifest;
use std::path::PathBuf;

use crate::report_warnings;

pub(crate) fn run_pack(args: &ArgMatches) -> anyhow::Result<()> {
    let config: &PathBuf = args.get_one("config").unwrap();
    let manifest = TrustManifest::from_file(config)
        .with_context(|| format!("Failed to load manifest {}", config.display()))?;

    let selection = if args.get_flag("all-segments") {
        SegmentSelection::AllLoadable
    } else {
        SegmentSelection::FirstLoadable
    };

    let mut sources = Vec::new();
    for component in &manifest.components {
        let bytes = std::fs::read(&component.path)
            .with_context(|| format!("Failed to read component {}", component.path.display()))?;
        sources.extend(trust::TrustSource::from_image_bytes(
            component.id,
            component.load_addr,
            &bytes,
            selection,
        )?);
    }

    let mut params = trust::TrustParams {
        version: manifest.version,
        ..Default::default()
    };
    if let Some(sha) = args.get_one::<u32>("sha") {
        params.sha_mode = trust::ShaMode::try_from(*sha)?;
    }
    if let Some(rsa) = args.get_one::<u32>("rsa") {
        params.rsa_mode = trust::RsaMode::try_from(*rsa)?;
    }
    if let Some(size) = args.get_one::<usize>("size") {
        params.max_size = size * 1024;
    }
    if let Some(copies) = args.get_one::<usize>("copies") {
        params.copies = *copies;
    }

    let image = trust::pack(&sources, &params)?;
    let out = args
        .get_one::<PathBuf>("out")
        .cloned()
        .unwrap_or_else(|| manifest.output.clone());
    std::fs::write(&out, &image)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!(
        "packed {} components into {} ({} bytes)",
        sources.len(),
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
    let (paths, warnings) = trust::unpack_to_dir(&image, out_dir)?;
    report_warnings(&warnings);
    for (name, path) in &paths {
        println!("extracted {name} to {}", path.display());
    }
    Ok(())
}
