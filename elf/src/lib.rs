/*++

Licensed under the Apache-2.0 license.

File Name:

   lib.rs

Abstract:

    File contains ELF executable parsing for secure-firmware inputs that
    arrive as executables rather than flat binaries.

--*/

use elf::abi::PT_LOAD;
use elf::endian::AnyEndian;
use elf::ElfBytes;
use rkimage_types::{ImageError, ImageResult};

/// One loadable segment of an executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSegment {
    /// Virtual address the segment is mapped at.
    pub addr: u64,
    /// Offset of the segment's bytes within the file.
    pub offset: u64,
    /// Number of bytes the segment occupies in the file.
    pub size: u64,
}

/// Which loadable segments a caller wants.
///
/// The vendor tools were observed to consume only the first PT_LOAD of a
/// secure-firmware executable; that rule is inferred, not specified, so it
/// stays overridable. Deviating from `FirstLoadable` is a compatibility
/// risk with images produced by the vendor chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentSelection {
    #[default]
    FirstLoadable,
    AllLoadable,
}

/// Returns true if `image` starts with the ELF identification magic.
pub fn is_elf(image: &[u8]) -> bool {
    image.len() >= 4 && image[0..4] == [0x7F, b'E', b'L', b'F']
}

/// Parse `image` and return its loadable segments in program-header table
/// order. The 32/64-bit class is detected from the identification bytes.
pub fn loadable_segments(image: &[u8]) -> ImageResult<Vec<LoadSegment>> {
    let file = ElfBytes::<AnyEndian>::minimal_parse(image)
        .map_err(|e| ImageError::MalformedImage(format!("invalid ELF image: {e}")))?;

    let Some(segments) = file.segments() else {
        return Err(ImageError::MalformedImage(
            "ELF image has no program header table".into(),
        ));
    };

    let mut result = Vec::new();
    for phdr in segments {
        if phdr.p_type != PT_LOAD {
            continue;
        }
        let end = phdr
            .p_offset
            .checked_add(phdr.p_filesz)
            .ok_or_else(|| ImageError::MalformedImage("program header offset overflow".into()))?;
        if end > image.len() as u64 {
            return Err(ImageError::MalformedImage(format!(
                "PT_LOAD segment at 0x{:X}..0x{:X} exceeds image of {} bytes",
                phdr.p_offset,
                end,
                image.len()
            )));
        }
        result.push(LoadSegment {
            addr: phdr.p_vaddr,
            offset: phdr.p_offset,
            size: phdr.p_filesz,
        });
    }
    Ok(result)
}

/// Segments to assemble under the given selection rule. Fails when the
/// executable exposes no loadable segment at all.
pub fn select_segments(
    image: &[u8],
    selection: SegmentSelection,
) -> ImageResult<Vec<LoadSegment>> {
    let mut segments = loadable_segments(image)?;
    if segments.is_empty() {
        return Err(ImageError::UnsupportedComponentCombination(
            "ELF image has no loadable segments".into(),
        ));
    }
    if selection == SegmentSelection::FirstLoadable {
        segments.truncate(1);
    }
    Ok(segments)
}

/// The file bytes backing a segment.
pub fn segment_payload<'a>(image: &'a [u8], segment: &LoadSegment) -> ImageResult<&'a [u8]> {
    let start = usize::try_from(segment.offset)
        .map_err(|_| ImageError::MalformedImage("segment offset exceeds address space".into()))?;
    let size = usize::try_from(segment.size)
        .map_err(|_| ImageError::MalformedImage("segment size exceeds address space".into()))?;
    image
        .get(start..start + size)
        .ok_or_else(|| ImageError::MalformedImage("segment extends past end of image".into()))
}
