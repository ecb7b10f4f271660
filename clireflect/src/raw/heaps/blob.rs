use std::fmt::{Debug, Formatter};

use crate::error::{Error, Result};
use crate::raw::heaps::{BlobIndex, SizeDebugWrapper};
use crate::utilities::ByteReader;

/// The `#Blob` heap: compressed-length-prefixed opaque byte runs.
#[derive(Copy, Clone)]
pub struct BlobHeap<'l> {
    data: &'l [u8],
}

impl<'l> BlobHeap<'l> {
    pub(crate) fn new(data: &'l [u8]) -> Self {
        Self { data }
    }

    pub fn get(&self, index: BlobIndex) -> Result<&'l [u8]> {
        if index.is_null() {
            return Ok(&[]);
        }
        let offset = index.0 as usize;
        if offset >= self.data.len() {
            return Err(Error::corrupt(format!(
                "blob index {offset} beyond #Blob heap of {} bytes",
                self.data.len()
            )));
        }
        let mut reader = ByteReader::new(&self.data[offset..]);
        let length = reader.compressed_u32()? as usize;
        reader
            .bytes(length)
            .map_err(|_| Error::corrupt(format!("blob at offset {offset} overruns the heap")))
    }
}

impl Debug for BlobHeap<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("BlobHeap");
        dbg.field("data", &SizeDebugWrapper(self.data.len()));
        dbg.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_index_is_empty() {
        let heap = BlobHeap::new(&[0, 2, 0xAA, 0xBB]);
        assert_eq!(heap.get(BlobIndex(0)).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn reads_length_prefixed_blobs() {
        let heap = BlobHeap::new(&[0, 2, 0xAA, 0xBB, 0x00]);
        assert_eq!(heap.get(BlobIndex(1)).unwrap(), &[0xAA, 0xBB]);
        assert_eq!(heap.get(BlobIndex(4)).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn rejects_truncated_blob() {
        let heap = BlobHeap::new(&[0, 5, 0xAA]);
        assert!(matches!(heap.get(BlobIndex(1)), Err(Error::Corrupt(_))));
        assert!(matches!(heap.get(BlobIndex(40)), Err(Error::Corrupt(_))));
    }
}
