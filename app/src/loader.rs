/*++

Licensed under the Apache-2.0 license.

File Name:

   loader.rs

Abstract:

    File contains the second-loader and card-boot image commands.

--*/

use anyhow::Context;
use clap::ArgMatches;
use rkimage_gen::{idb, loader};
use std::path::PathBuf;

use crate::{parse_number, report_warnings};

pub(crate) fn run_pack(args: &ArgMatches) -> anyhow::Result<()> {
    let input: &PathBuf = args.get_one("input").unwrap();
    let out: &PathBuf = args.get_one("out").unwrap();
    let addr = parse_number(args.get_one::<String>("addr").unwrap())?;

    let mut params = loader::LoaderParams {
        load_addr: addr,
        ..Default::default()
    };
    if args.get_flag("tos") {
        params.kind = loader::LoaderKind::TrustOs;
    }
    if let Some(version) = args.get_one::<u32>("version") {
        params.version = *version;
    }
    if let Some(size) = args.get_one::<usize>("size") {
        params.max_size = size * 1024;
    }
    if let Some(copies) = args.get_one::<usize>("copies") {
        params.copies = *copies;
    }

    let payload = std::fs::read(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let image = loader::pack(&payload, &params)?;
    std::fs::write(out, &image)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!(
        "packed {} ({} bytes) into {} ({} bytes, {} copies)",
        input.display(),
        payload.len(),
        out.display(),
        image.len(),
        params.copies
    );
    Ok(())
}

pub(crate) fn run_unpack(args: &ArgMatches) -> anyhow::Result<()> {
    let image_path: &PathBuf = args.get_one("image").unwrap();
    let out: &PathBuf = args.get_one("out").unwrap();

    let image = std::fs::read(image_path)
        .with_context(|| format!("Failed to read {}", image_path.display()))?;
    let unpacked = loader::unpack(&image)?;
    report_warnings(&unpacked.warnings);
    std::fs::write(out, &unpacked.payload)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!(
        "extracted {} bytes (load address 0x{:08X}) to {}",
        unpacked.payload.len(),
        unpacked.header.load_addr,
        out.display()
    );
    Ok(())
}

pub(crate) fn run_idb_pack(args: &ArgMatches) -> anyhow::Result<()> {
    let init_path: &PathBuf = args.get_one("init").unwrap();
    let out: &PathBuf = args.get_one("out").unwrap();

    let init = std::fs::read(init_path)
        .with_context(|| format!("Failed to read {}", init_path.display()))?;
    let boot = match args.get_one::<PathBuf>("boot") {
        Some(path) => Some(
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        None => None,
    };

    let params = idb::IdbParams {
        cipher_payload: args.get_flag("cipher-payload"),
        ..Default::default()
    };
    let image = idb::pack(&init, boot.as_deref(), &params)?;
    std::fs::write(out, &image)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!("packed card-boot image {} ({} bytes)", out.display(), image.len());
    Ok(())
}

pub(crate) fn run_idb_unpack(args: &ArgMatches) -> anyhow::Result<()> {
    let image_path: &PathBuf = args.get_one("image").unwrap();
    let out_dir: &PathBuf = args.get_one("out-dir").unwrap();

    let image = std::fs::read(image_path)
        .with_context(|| format!("Failed to read {}", image_path.display()))?;
    let unpacked = idb::unpack(&image)?;

    std::fs::create_dir_all(out_dir)?;
    let init_path = out_dir.join("init.bin");
    std::fs::write(&init_path, &unpacked.init)?;
    println!(
        "extracted {} bytes to {}",
        unpacked.init.len(),
        init_path.display()
    );
    if !unpacked.boot.is_empty() {
        let boot_path = out_dir.join("boot.bin");
        std::fs::write(&boot_path, &unpacked.boot)?;
        println!(
            "extracted {} bytes to {}",
            unpacked.boot.len(),
            boot_path.display()
        );
    }
    Ok(())
}
