use std::fmt::{Debug, Formatter};

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::raw::heaps::GuidIndex;

const GUID_SIZE: usize = 16;

/// The `#GUID` heap: consecutive 16-byte entries addressed by 1-based index.
#[derive(Copy, Clone)]
pub struct GuidHeap<'l> {
    data: &'l [u8],
}

impl<'l> GuidHeap<'l> {
    pub(crate) fn new(data: &'l [u8]) -> Self {
        Self { data }
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.data.len() / GUID_SIZE
    }

    pub fn get(&self, index: GuidIndex) -> Result<Option<Uuid>> {
        if index.is_null() {
            return Ok(None);
        }
        let offset = (index.0 as usize - 1) * GUID_SIZE;
        let Some(bytes) = self.data.get(offset..offset + GUID_SIZE) else {
            return Err(Error::corrupt(format!(
                "GUID index {} beyond #GUID heap of {} entries",
                index.0,
                self.len()
            )));
        };
        Ok(Some(Uuid::from_slice_le(bytes).map_err(|_| {
            Error::corrupt(format!("malformed GUID at index {}", index.0))
        })?))
    }

    pub fn guids(&self) -> impl Iterator<Item = Result<Uuid>> + '_ {
        (1..=self.len() as u32).map(|i| self.get(GuidIndex(i)).map(|g| g.unwrap_or(Uuid::nil())))
    }
}

impl Debug for GuidHeap<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("GuidHeap ")?;
        let mut dbg = f.debug_list();
        for guid in self.guids() {
            match guid {
                Ok(guid) => dbg.entry(&guid),
                Err(_) => dbg.entry(&"<invalid>"),
            };
        }
        dbg.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_index_is_none() {
        let heap = GuidHeap::new(&[0; 16]);
        assert!(heap.get(GuidIndex(0)).unwrap().is_none());
    }

    #[test]
    fn reads_mixed_endian_layout() {
        let mut data = [0u8; 16];
        data[..4].copy_from_slice(&0xA1B2C3D4u32.to_le_bytes());
        data[4..6].copy_from_slice(&0xE5F6u16.to_le_bytes());
        data[6..8].copy_from_slice(&0x0718u16.to_le_bytes());
        data[8..].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

        let heap = GuidHeap::new(&data);
        let guid = heap.get(GuidIndex(1)).unwrap().unwrap();
        assert_eq!(
            guid,
            Uuid::from_fields(0xA1B2C3D4, 0xE5F6, 0x0718, &[1, 2, 3, 4, 5, 6, 7, 8])
        );
    }

    #[test]
    fn rejects_out_of_range_index() {
        let heap = GuidHeap::new(&[0; 16]);
        assert!(matches!(heap.get(GuidIndex(2)), Err(Error::Corrupt(_))));
    }
}
