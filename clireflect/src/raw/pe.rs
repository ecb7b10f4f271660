//! Just enough PE/COFF parsing to hand the metadata reader its byte range:
//! DOS stub, COFF header, optional header, section table, then the CLI
//! header named by data directory 14.

use std::ops::Range;

use crate::error::{Error, Result};
use crate::utilities::ByteReader;

const DOS_MAGIC: u16 = 0x5A4D;
const PE_SIGNATURE: u32 = 0x4550;
const PE32_MAGIC: u16 = 0x010B;
const PE64_MAGIC: u16 = 0x020B;

const CLI_HEADER_DIRECTORY: usize = 14;

#[derive(Debug, Copy, Clone)]
struct SectionHeader {
    virtual_address: u32,
    raw_size: u32,
    raw_offset: u32,
}

/// Maps an RVA range to a file-offset range through the section table.
fn resolve_rva(
    sections: &[SectionHeader],
    data_len: usize,
    rva: u32,
    size: u32,
) -> Result<Range<usize>> {
    let section = sections
        .iter()
        .find(|s| rva >= s.virtual_address && rva - s.virtual_address < s.raw_size)
        .ok_or_else(|| Error::corrupt(format!("RVA {rva:#x} maps to no section")))?;

    let delta = rva - section.virtual_address;
    if delta + size > section.raw_size {
        return Err(Error::corrupt(format!(
            "range {rva:#x}+{size:#x} overruns its section"
        )));
    }
    let start = (section.raw_offset + delta) as usize;
    let end = start + size as usize;
    if end > data_len {
        return Err(Error::corrupt(format!(
            "range {rva:#x}+{size:#x} overruns the file"
        )));
    }
    Ok(start..end)
}

/// Locates the CLI metadata root inside a PE image.
pub(crate) fn locate_metadata(data: &[u8]) -> Result<Range<usize>> {
    let mut reader = ByteReader::new(data);
    if reader.u16()? != DOS_MAGIC {
        return Err(Error::corrupt("missing MZ signature"));
    }
    reader.seek(0x3C)?;
    let pe_offset = reader.u32()? as usize;
    reader.seek(pe_offset)?;
    if reader.u32()? != PE_SIGNATURE {
        return Err(Error::corrupt("missing PE signature"));
    }

    // COFF file header.
    let _machine = reader.u16()?;
    let section_count = reader.u16()?;
    reader.skip(12)?; // timestamp, symbol table, symbol count
    let optional_size = reader.u16()? as usize;
    let _characteristics = reader.u16()?;

    let optional_start = reader.position();
    let directories_offset = match reader.u16()? {
        PE32_MAGIC => 96,
        PE64_MAGIC => 112,
        magic => {
            return Err(Error::corrupt(format!(
                "unknown optional header magic {magic:#06x}"
            )))
        }
    };

    reader.seek(optional_start + directories_offset - 4)?;
    let directory_count = reader.u32()? as usize;
    if directory_count <= CLI_HEADER_DIRECTORY {
        return Err(Error::corrupt("image has no CLI data directory"));
    }
    reader.seek(optional_start + directories_offset + CLI_HEADER_DIRECTORY * 8)?;
    let cli_rva = reader.u32()?;
    let cli_size = reader.u32()?;
    if cli_rva == 0 || cli_size == 0 {
        return Err(Error::corrupt("image is not a CLI assembly"));
    }

    reader.seek(optional_start + optional_size)?;
    let mut sections = Vec::with_capacity(section_count as usize);
    for _ in 0..section_count {
        reader.skip(8)?; // name
        let _virtual_size = reader.u32()?;
        let virtual_address = reader.u32()?;
        let raw_size = reader.u32()?;
        let raw_offset = reader.u32()?;
        reader.skip(16)?; // relocations, line numbers, characteristics
        sections.push(SectionHeader {
            virtual_address,
            raw_size,
            raw_offset,
        });
    }

    // CLI header: size, runtime version pair, then the metadata directory.
    let cli = resolve_rva(&sections, data.len(), cli_rva, cli_size)?;
    let mut cli_reader = ByteReader::new(&data[cli]);
    let _size = cli_reader.u32()?;
    let _major_runtime = cli_reader.u16()?;
    let _minor_runtime = cli_reader.u16()?;
    let metadata_rva = cli_reader.u32()?;
    let metadata_size = cli_reader.u32()?;
    if metadata_rva == 0 {
        return Err(Error::corrupt("CLI header has no metadata directory"));
    }

    resolve_rva(&sections, data.len(), metadata_rva, metadata_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::wrap_pe;

    #[test]
    fn locates_metadata_through_cli_header() {
        let mut metadata = vec![0u8; 16];
        metadata[..4].copy_from_slice(&crate::raw::root::METADATA_SIGNATURE.to_le_bytes());

        let image = wrap_pe(&metadata);
        let range = locate_metadata(&image).unwrap();
        assert_eq!(range, 0x248..0x258);
        assert_eq!(
            &image[range][..4],
            crate::raw::root::METADATA_SIGNATURE.to_le_bytes()
        );
    }

    #[test]
    fn rejects_non_pe_input() {
        assert!(matches!(
            locate_metadata(&[0u8; 128]),
            Err(Error::Corrupt(_))
        ));
        let mut image = wrap_pe(&[0u8; 16]);
        image[0x80] = 0; // break the PE signature
        assert!(matches!(locate_metadata(&image), Err(Error::Corrupt(_))));
    }

    #[test]
    fn rejects_missing_cli_directory() {
        let mut image = wrap_pe(&[0u8; 16]);
        // Zero out the CLI data directory.
        let dir = 0x80 + 24 + 96 + CLI_HEADER_DIRECTORY * 8;
        image[dir..dir + 8].fill(0);
        assert!(matches!(locate_metadata(&image), Err(Error::Corrupt(_))));
    }
}
