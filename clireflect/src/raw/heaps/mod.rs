//! Borrowed views over the four metadata heaps. Heap index 0 always
//! resolves to an empty value; anything past a heap's end is `Corrupt`.

use std::fmt::{Debug, Formatter};

pub use blob::BlobHeap;
pub use guid::GuidHeap;
pub use string::{StringHeap, UserStringHeap};

pub mod blob;
pub mod guid;
pub mod string;

/// Offset into the `#Strings` heap.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StringIndex(pub u32);

/// Offset into the `#Blob` heap.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BlobIndex(pub u32);

/// 1-based entry number in the `#GUID` heap; 0 is null.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct GuidIndex(pub u32);

impl StringIndex {
    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl BlobIndex {
    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl GuidIndex {
    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

pub(crate) struct SizeDebugWrapper(pub usize);

impl Debug for SizeDebugWrapper {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("[u8; ")?;
        Debug::fmt(&self.0, f)?;
        f.write_str("]")
    }
}
