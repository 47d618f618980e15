/*++

Licensed under the Apache-2.0 license.

File Name:

   main.rs

Abstract:

    Main entry point for the boot image packaging tool.

--*/

use std::path::PathBuf;

use clap::{arg, value_parser, ArgAction, Command};

mod boot;
mod loader;
mod secure;

/// Entry point
fn main() {
    let sub_cmds = vec![
        Command::new("loader-pack")
            .about("Wrap a bootloader or trusted-OS binary in the second-loader format")
            .arg(
                arg!(--"input" <FILE> "Raw binary to wrap")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"out" <FILE> "Output image")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(arg!(--"addr" <ADDR> "Load address (hex with 0x prefix, or decimal)").required(true))
            .arg(
                arg!(--"version" <U32> "Image version, 0 by default")
                    .required(false)
                    .value_parser(value_parser!(u32)),
            )
            .arg(
                arg!(--"size" <KB> "Capacity of one copy in KiB")
                    .required(false)
                    .value_parser(value_parser!(usize)),
            )
            .arg(
                arg!(--"copies" <N> "Number of redundant copies")
                    .required(false)
                    .value_parser(value_parser!(usize)),
            )
            .arg(
                arg!(--"tos" "Emit the trusted-OS variant instead of the bootloader one")
                    .action(ArgAction::SetTrue),
            ),
        Command::new("loader-unpack")
            .about("Extract the payload from a second-loader image")
            .arg(
                arg!(--"image" <FILE> "Packed image")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"out" <FILE> "Extracted payload")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            ),
        Command::new("boot-pack")
            .about("Assemble a bootstrap container from an RKBOOT manifest")
            .arg(
                arg!(--"config" <INI> "RKBOOT manifest")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"target" <TARGET> "Boot medium: recovery (USB) or storage (SD/eMMC)")
                    .required(true),
            )
            .arg(
                arg!(--"out" <FILE> "Output image (default: the manifest's OUTPUT path)")
                    .required(false)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"bin-dir" <DIR> "Alternate directory searched for missing binaries")
                    .required(false)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"cipher-header" "Stream-cipher the header region")
                    .action(ArgAction::SetTrue),
            )
            .arg(
                arg!(--"cipher-entries" "Stream-cipher the entry data (vendor compatibility)")
                    .action(ArgAction::SetTrue),
            ),
        Command::new("boot-unpack")
            .about("Extract the components of a bootstrap container")
            .arg(
                arg!(--"image" <FILE> "Packed container")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"out-dir" <DIR> "Directory for the extracted components")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            ),
        Command::new("trust-pack")
            .about("Assemble a trust container from an RKTRUST manifest")
            .arg(
                arg!(--"config" <INI> "RKTRUST manifest")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"out" <FILE> "Output image (default: the manifest's OUTPUT path)")
                    .required(false)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"sha" <N> "Digest mode recorded in the header (default 3)")
                    .required(false)
                    .value_parser(value_parser!(u32)),
            )
            .arg(
                arg!(--"rsa" <N> "Signature mode recorded in the header (default 2)")
                    .required(false)
                    .value_parser(value_parser!(u32)),
            )
            .arg(
                arg!(--"size" <KB> "Capacity of one copy in KiB")
                    .required(false)
                    .value_parser(value_parser!(usize)),
            )
            .arg(
                arg!(--"copies" <N> "Number of redundant copies")
                    .required(false)
                    .value_parser(value_parser!(usize)),
            )
            .arg(
                arg!(--"all-segments" "Take every loadable ELF segment, not only the first")
                    .action(ArgAction::SetTrue),
            ),
        Command::new("trust-unpack")
            .about("Extract the components of a trust container")
            .arg(
                arg!(--"image" <FILE> "Packed container")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"out-dir" <DIR> "Directory for the extracted components")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            ),
        Command::new("idb-pack")
            .about("Assemble a card-boot sector image")
            .arg(
                arg!(--"init" <FILE> "DRAM init/SPL payload")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"boot" <FILE> "Next-stage payload appended after the init area")
                    .required(false)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"out" <FILE> "Output image")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"cipher-payload" "Stream-cipher the init payload (legacy chips)")
                    .action(ArgAction::SetTrue),
            ),
        Command::new("idb-unpack")
            .about("Extract the payloads of a card-boot sector image")
            .arg(
                arg!(--"image" <FILE> "Packed image")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"out-dir" <DIR> "Directory for the extracted payloads")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            ),
    ];

    let cmd = Command::new("rkimage")
        .arg_required_else_help(true)
        .subcommands(sub_cmds)
        .about("Boot image packaging tools")
        .get_matches();

    let result = match cmd.subcommand().unwrap() {
        ("loader-pack", args) => loader::run_pack(args),
        ("loader-unpack", args) => loader::run_unpack(args),
        ("boot-pack", args) => boot::run_pack(args),
        ("boot-unpack", args) => boot::run_unpack(args),
        ("trust-pack", args) => secure::run_pack(args),
        ("trust-unpack", args) => secure::run_unpack(args),
        ("idb-pack", args) => loader::run_idb_pack(args),
        ("idb-unpack", args) => loader::run_idb_unpack(args),
        (_, _) => unreachable!(),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

/// Parse a `0x`-prefixed hex or decimal number.
pub(crate) fn parse_number(text: &str) -> anyhow::Result<u32> {
    let text = text.trim();
    let value = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    value.map_err(|_| anyhow::anyhow!("invalid number {text:?}"))
}

/// Report integrity findings without failing the operation.
pub(crate) fn report_warnings(warnings: &[rkimage_types::IntegrityWarning]) {
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
}
