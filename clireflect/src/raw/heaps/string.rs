use std::fmt::{Debug, Formatter};

use crate::error::{Error, Result};
use crate::raw::heaps::{SizeDebugWrapper, StringIndex};
use crate::utilities::ByteReader;

/// The `#Strings` heap: null-terminated UTF-8, addressed by byte offset.
#[derive(Copy, Clone)]
pub struct StringHeap<'l> {
    data: &'l [u8],
}

impl<'l> StringHeap<'l> {
    pub(crate) fn new(data: &'l [u8]) -> Self {
        Self { data }
    }

    pub fn get(&self, index: StringIndex) -> Result<&'l str> {
        if index.is_null() {
            return Ok("");
        }
        let offset = index.0 as usize;
        let Some(slice) = self.data.get(offset..) else {
            return Err(Error::corrupt(format!(
                "string index {offset} beyond #Strings heap of {} bytes",
                self.data.len()
            )));
        };
        let Some(end) = slice.iter().position(|b| *b == 0) else {
            return Err(Error::corrupt(format!(
                "unterminated string at #Strings offset {offset}"
            )));
        };
        std::str::from_utf8(&slice[..end])
            .map_err(|_| Error::corrupt(format!("invalid UTF-8 at #Strings offset {offset}")))
    }
}

impl Debug for StringHeap<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("StringHeap");
        dbg.field("data", &SizeDebugWrapper(self.data.len()));
        dbg.finish()
    }
}

/// The `#US` heap: length-prefixed UTF-16 user strings. When the prefixed
/// byte count is odd, the final byte is a flag and not part of the string.
#[derive(Copy, Clone)]
pub struct UserStringHeap<'l> {
    data: &'l [u8],
}

impl<'l> UserStringHeap<'l> {
    pub(crate) fn new(data: &'l [u8]) -> Self {
        Self { data }
    }

    pub fn get(&self, offset: u32) -> Result<String> {
        if offset == 0 {
            return Ok(String::new());
        }
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Err(Error::corrupt(format!(
                "user string index {offset} beyond #US heap of {} bytes",
                self.data.len()
            )));
        }
        let mut reader = ByteReader::new(&self.data[offset..]);
        let length = reader.compressed_u32()? as usize;
        let bytes = reader.bytes(length)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units)
            .map_err(|_| Error::corrupt(format!("invalid UTF-16 at #US offset {offset}")))
    }
}

impl Debug for UserStringHeap<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("UserStringHeap");
        dbg.field("data", &SizeDebugWrapper(self.data.len()));
        dbg.finish()
    }
}
