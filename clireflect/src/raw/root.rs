use std::ops::Range;

use crate::error::{Error, Result};
use crate::utilities::ByteReader;

pub(crate) const METADATA_SIGNATURE: u32 = 0x424A5342;

/// Byte range of a stream, relative to the metadata root.
#[derive(Debug, Default, Copy, Clone)]
pub(crate) struct StreamRange {
    pub offset: u32,
    pub size: u32,
}

impl StreamRange {
    pub fn range(&self) -> Range<usize> {
        self.offset as usize..(self.offset + self.size) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// Parsed metadata root: the version string and the stream directory.
#[derive(Debug)]
pub(crate) struct MetadataRoot {
    pub version: String,
    pub tables: StreamRange,
    pub strings: StreamRange,
    pub user_strings: StreamRange,
    pub guids: StreamRange,
    pub blobs: StreamRange,
}

impl MetadataRoot {
    pub fn read(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);

        let signature = reader.u32()?;
        if signature != METADATA_SIGNATURE {
            return Err(Error::corrupt(format!(
                "invalid metadata signature {signature:#010x}, expected {METADATA_SIGNATURE:#010x}"
            )));
        }
        let _major = reader.u16()?;
        let _minor = reader.u16()?;
        reader.skip(4)?; // Reserved

        // The version buffer length is stored rounded up to four bytes.
        let length = (reader.u32()? as usize).div_ceil(4) * 4;
        let buffer = reader.bytes(length)?;
        let end = buffer.iter().position(|b| *b == 0).unwrap_or(length);
        let version = std::str::from_utf8(&buffer[..end])
            .map_err(|_| Error::corrupt("invalid UTF-8 in metadata version string"))?
            .to_string();

        let _flags = reader.u16()?;
        let stream_count = reader.u16()?;

        let mut root = Self {
            version,
            tables: StreamRange::default(),
            strings: StreamRange::default(),
            user_strings: StreamRange::default(),
            guids: StreamRange::default(),
            blobs: StreamRange::default(),
        };

        let mut seen_tables = false;
        for _ in 0..stream_count {
            let offset = reader.u32()?;
            let size = reader.u32()?;
            let name = reader.str_padded(4, 32)?;

            if (offset as usize) > data.len() || (offset as u64 + size as u64) > data.len() as u64 {
                return Err(Error::corrupt(format!(
                    "stream {name:?} ({offset:#x}+{size:#x}) overruns the metadata root"
                )));
            }
            let stream = StreamRange { offset, size };

            match name {
                "#~" => {
                    root.tables = stream;
                    seen_tables = true;
                }
                "#Strings" => root.strings = stream,
                "#US" => root.user_strings = stream,
                "#GUID" => root.guids = stream,
                "#Blob" => root.blobs = stream,
                "#-" => {
                    return Err(Error::unsupported(
                        "uncompressed #- table stream".to_string(),
                    ))
                }
                // Other streams (#Pdb, #JTD, ...) carry nothing we read.
                _ => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(name, offset, size, "skipping metadata stream");
                }
            }
        }

        if !seen_tables {
            return Err(Error::corrupt("metadata root has no #~ stream"));
        }
        Ok(root)
    }
}
