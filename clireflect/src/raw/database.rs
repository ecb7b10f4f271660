//! The physical metadata database: parses the `#~` stream header, computes
//! column widths and per-table row sizes/offsets, and serves typed row
//! views that decode columns on access. Nothing beyond the layout is
//! cached.

use std::fmt::{Debug, Formatter};
use std::path::Path;

use crate::error::{Error, Result};
use crate::raw::heaps::{
    BlobHeap, BlobIndex, GuidHeap, GuidIndex, SizeDebugWrapper, StringHeap, StringIndex,
    UserStringHeap,
};
use crate::raw::indices::RowReference;
use crate::raw::pe;
use crate::raw::root::MetadataRoot;
use crate::raw::schema::{table_schema, Column, TableKind, MAX_COLUMNS};
use crate::utilities::{enumerate_set_bits, equal_range_by, ByteReader};

/// Row counts must stay encodable in a 24-bit metadata token index.
const MAX_ROW_COUNT: u32 = 0x00FF_FFFF;

const HEAP_WIDE_STRINGS: u8 = 0x01;
const HEAP_WIDE_GUIDS: u8 = 0x02;
const HEAP_WIDE_BLOBS: u8 = 0x04;
const HEAP_EXTRA_DATA: u8 = 0x40;

enum Image {
    Owned(Vec<u8>),
    #[cfg(feature = "memmap2")]
    Mapped(memmap2::Mmap),
}

impl Image {
    fn bytes(&self) -> &[u8] {
        match self {
            Image::Owned(bytes) => bytes,
            #[cfg(feature = "memmap2")]
            Image::Mapped(map) => map,
        }
    }
}

#[derive(Debug, Default, Copy, Clone)]
pub(crate) struct ColumnLayout {
    pub offset: u8,
    pub width: u8,
}

#[derive(Debug, Default, Copy, Clone)]
pub(crate) struct TableLayout {
    pub row_count: u32,
    pub row_size: u32,
    /// Absolute offset of the first row within the image.
    pub offset: usize,
    pub columns: [ColumnLayout; MAX_COLUMNS],
}

/// A parsed metadata image. Owns the file bytes; every other structure in
/// this crate borrows from it.
pub struct Database {
    image: Image,
    version: String,
    major_version: u8,
    minor_version: u8,
    sorted: u64,
    strings: std::ops::Range<usize>,
    user_strings: std::ops::Range<usize>,
    guids: std::ops::Range<usize>,
    blobs: std::ops::Range<usize>,
    layouts: [TableLayout; TableKind::COUNT],
}

impl Database {
    /// Reads (or maps, with the `memmap2` feature) an assembly file.
    #[cfg(feature = "memmap2")]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let map = unsafe { memmap2::Mmap::map(&file) }?;
        Self::new(Image::Mapped(map))
    }

    #[cfg(not(feature = "memmap2"))]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(std::fs::read(path.as_ref())?)
    }

    /// Parses a PE image, or a bare metadata root when the bytes start with
    /// the `BSJB` signature.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::new(Image::Owned(bytes))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn new(image: Image) -> Result<Self> {
        let data = image.bytes();
        let root_range = if data.starts_with(b"MZ") {
            pe::locate_metadata(data)?
        } else {
            0..data.len()
        };
        let base = root_range.start;
        let root = MetadataRoot::read(&data[root_range])?;

        let tables = root.tables.range();
        let mut reader = ByteReader::new(&data[base + tables.start..base + tables.end]);

        reader.skip(4)?; // Reserved
        let major_version = reader.u8()?;
        let minor_version = reader.u8()?;
        let heap_sizes = reader.u8()?;
        reader.skip(1)?; // Reserved
        let valid = reader.u64()?;
        let sorted = reader.u64()?;

        let mut row_counts = [0u32; TableKind::COUNT];
        for id in enumerate_set_bits(valid) {
            if id >= TableKind::COUNT {
                return Err(Error::corrupt(format!(
                    "unknown metadata table {id:#04x} in Valid bitmask"
                )));
            }
            let count = reader.u32()?;
            if count > MAX_ROW_COUNT {
                return Err(Error::corrupt(format!(
                    "impossible row count {count} for table {:?}",
                    TableKind::from_id(id).unwrap()
                )));
            }
            row_counts[id] = count;
        }
        if heap_sizes & HEAP_EXTRA_DATA != 0 {
            reader.skip(4)?;
        }

        if row_counts[TableKind::Module as usize] != 1 {
            return Err(Error::corrupt(format!(
                "image must contain exactly one Module row, found {}",
                row_counts[TableKind::Module as usize]
            )));
        }
        if row_counts[TableKind::Assembly as usize] > 1 {
            return Err(Error::corrupt(format!(
                "image contains {} Assembly rows",
                row_counts[TableKind::Assembly as usize]
            )));
        }

        let string_width = heap_index_width(heap_sizes, HEAP_WIDE_STRINGS);
        let guid_width = heap_index_width(heap_sizes, HEAP_WIDE_GUIDS);
        let blob_width = heap_index_width(heap_sizes, HEAP_WIDE_BLOBS);

        let mut layouts = [TableLayout::default(); TableKind::COUNT];
        let mut position = base + tables.start + reader.position();
        for kind in TableKind::all() {
            let schema = table_schema(kind);
            let mut columns = [ColumnLayout::default(); MAX_COLUMNS];
            let mut row_size = 0u32;
            for (slot, column) in schema.columns.iter().enumerate() {
                let width = match column {
                    Column::Fixed(width) => *width,
                    Column::Str => string_width,
                    Column::Guid => guid_width,
                    Column::Blob => blob_width,
                    Column::Index(target) => table_index_width(row_counts[*target as usize]),
                    Column::Coded(coded) => coded.width(&row_counts),
                };
                columns[slot] = ColumnLayout {
                    offset: row_size as u8,
                    width,
                };
                row_size += width as u32;
            }

            let layout = &mut layouts[kind as usize];
            layout.row_count = row_counts[kind as usize];
            layout.row_size = row_size;
            layout.offset = position;
            layout.columns = columns;
            position += layout.row_count as usize * row_size as usize;
        }

        if position > base + tables.end {
            return Err(Error::corrupt(format!(
                "table rows need {} bytes but the #~ stream holds {}",
                position - (base + tables.start),
                tables.end - tables.start
            )));
        }

        let absolute = |range: &crate::raw::root::StreamRange| {
            let r = range.range();
            base + r.start..base + r.end
        };

        Ok(Self {
            version: root.version,
            major_version,
            minor_version,
            sorted,
            strings: absolute(&root.strings),
            user_strings: absolute(&root.user_strings),
            guids: absolute(&root.guids),
            blobs: absolute(&root.blobs),
            layouts,
            image,
        })
    }

    fn bytes(&self) -> &[u8] {
        self.image.bytes()
    }

    /// The runtime version string from the metadata root.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn table_stream_version(&self) -> (u8, u8) {
        (self.major_version, self.minor_version)
    }

    pub fn row_count(&self, table: TableKind) -> u32 {
        self.layouts[table as usize].row_count
    }

    /// Whether the image declared this table sorted. Tables with a
    /// mandated sort order are searchable regardless.
    pub fn declared_sorted(&self, table: TableKind) -> bool {
        self.sorted >> (table as u64) & 1 != 0
    }

    pub(crate) fn layout(&self, table: TableKind) -> &TableLayout {
        &self.layouts[table as usize]
    }

    // -- heaps ------------------------------------------------------------

    pub fn strings(&self) -> StringHeap<'_> {
        StringHeap::new(&self.bytes()[self.strings.clone()])
    }

    pub fn user_strings(&self) -> UserStringHeap<'_> {
        UserStringHeap::new(&self.bytes()[self.user_strings.clone()])
    }

    pub fn guids(&self) -> GuidHeap<'_> {
        GuidHeap::new(&self.bytes()[self.guids.clone()])
    }

    pub fn blobs(&self) -> BlobHeap<'_> {
        BlobHeap::new(&self.bytes()[self.blobs.clone()])
    }

    pub fn string(&self, index: StringIndex) -> Result<&str> {
        self.strings().get(index)
    }

    pub fn blob(&self, index: BlobIndex) -> Result<&[u8]> {
        self.blobs().get(index)
    }

    pub fn guid(&self, index: GuidIndex) -> Result<Option<uuid::Uuid>> {
        self.guids().get(index)
    }

    // -- rows -------------------------------------------------------------

    pub fn row<'db, T: TableRow<'db>>(&'db self, index: u32) -> Result<T> {
        let count = self.row_count(T::KIND);
        if index == 0 || index > count {
            return Err(Error::corrupt(format!(
                "row index {index} out of range for {:?} ({count} rows)",
                T::KIND
            )));
        }
        Ok(T::new(self, index))
    }

    /// Typed access through a row reference; the reference's table must
    /// match the requested row kind.
    pub fn row_at<'db, T: TableRow<'db>>(&'db self, row: RowReference) -> Result<T> {
        if row.table() != T::KIND {
            return Err(Error::invalid_argument(format!(
                "expected a {:?} row reference, got {row}",
                T::KIND
            )));
        }
        self.row(row.index())
    }

    pub fn rows<'db, T: TableRow<'db>>(&'db self) -> RowIterator<'db, T> {
        RowIterator {
            database: self,
            next: 1,
            end: self.row_count(T::KIND) + 1,
            marker: std::marker::PhantomData,
        }
    }

    // -- columns ----------------------------------------------------------

    pub(crate) fn column_value(&self, table: TableKind, index: u32, column: usize) -> Result<u32> {
        let layout = &self.layouts[table as usize];
        if index == 0 || index > layout.row_count {
            return Err(Error::corrupt(format!(
                "row index {index} out of range for {table:?} ({} rows)",
                layout.row_count
            )));
        }
        let column = layout.columns[column];
        let offset =
            layout.offset + (index as usize - 1) * layout.row_size as usize + column.offset as usize;
        let mut reader = ByteReader::new(self.bytes());
        reader.seek(offset)?;
        reader.uint(column.width)
    }

    pub(crate) fn col_string(&self, table: TableKind, index: u32, column: usize) -> Result<StringIndex> {
        debug_assert!(matches!(table_schema(table).columns[column], Column::Str));
        Ok(StringIndex(self.column_value(table, index, column)?))
    }

    pub(crate) fn col_blob(&self, table: TableKind, index: u32, column: usize) -> Result<BlobIndex> {
        debug_assert!(matches!(table_schema(table).columns[column], Column::Blob));
        Ok(BlobIndex(self.column_value(table, index, column)?))
    }

    pub(crate) fn col_guid(&self, table: TableKind, index: u32, column: usize) -> Result<GuidIndex> {
        debug_assert!(matches!(table_schema(table).columns[column], Column::Guid));
        Ok(GuidIndex(self.column_value(table, index, column)?))
    }

    pub(crate) fn col_index(&self, table: TableKind, index: u32, column: usize) -> Result<RowReference> {
        let Column::Index(target) = table_schema(table).columns[column] else {
            return Err(Error::invalid_argument(format!(
                "column {column} of {table:?} is not a table index"
            )));
        };
        Ok(RowReference::new(
            target,
            self.column_value(table, index, column)?,
        ))
    }

    pub(crate) fn col_coded(&self, table: TableKind, index: u32, column: usize) -> Result<u32> {
        debug_assert!(matches!(
            table_schema(table).columns[column],
            Column::Coded(_)
        ));
        self.column_value(table, index, column)
    }

    // -- searches ---------------------------------------------------------

    /// Equal range `[first, last)` of rows whose sort-key column equals
    /// `probe`, by binary search over the table's declared key.
    pub(crate) fn equal_range(&self, table: TableKind, probe: u32) -> Result<(u32, u32)> {
        let Some(key) = table_schema(table).key else {
            return Err(Error::invalid_argument(format!(
                "{table:?} has no mandated sort order"
            )));
        };
        equal_range_by(self.row_count(table), probe, |row| {
            self.column_value(table, row, key as usize)
        })
    }
}

impl Debug for Database {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("Database");
        dbg.field("version", &self.version);
        dbg.field("image", &SizeDebugWrapper(self.bytes().len()));
        let rows: u32 = self.layouts.iter().map(|l| l.row_count).sum();
        dbg.field("rows", &rows);
        dbg.finish()
    }
}

fn heap_index_width(heap_sizes: u8, bit: u8) -> u8 {
    if heap_sizes & bit != 0 {
        4
    } else {
        2
    }
}

fn table_index_width(row_count: u32) -> u8 {
    if row_count > 0xFFFF {
        4
    } else {
        2
    }
}

/// A typed zero-copy view over one table row.
pub trait TableRow<'db>: Sized {
    const KIND: TableKind;

    fn new(database: &'db Database, index: u32) -> Self;
    fn database(&self) -> &'db Database;
    fn index(&self) -> u32;
}

/// Iterates a contiguous row range, materializing typed row views.
pub struct RowIterator<'db, T> {
    database: &'db Database,
    next: u32,
    end: u32,
    marker: std::marker::PhantomData<fn() -> T>,
}

impl<'db, T: TableRow<'db>> Iterator for RowIterator<'db, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.next >= self.end {
            return None;
        }
        let row = T::new(self.database, self.next);
        self.next += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl<'db, T: TableRow<'db>> ExactSizeIterator for RowIterator<'db, T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::rows::{ModuleRow, TypeDefRow};
    use crate::testing::ImageBuilder;

    #[test]
    fn computes_layout_for_small_image() {
        let mut builder = ImageBuilder::new();
        let name = builder.string("test");
        builder.row(TableKind::Module, &[0, name, 0, 0, 0]);
        let database = builder.build_database();

        assert_eq!(database.row_count(TableKind::Module), 1);
        // Small image: every heap index and table index is two bytes.
        let layout = database.layout(TableKind::Module);
        assert_eq!(layout.row_size, 10);
        assert_eq!(layout.columns[1].offset, 2);
        assert_eq!(layout.columns[4].offset, 8);

        let module: ModuleRow = database.row(1).unwrap();
        assert_eq!(database.string(module.name().unwrap()).unwrap(), "test");
    }

    #[test]
    fn consecutive_tables_are_laid_out_back_to_back() {
        let mut builder = ImageBuilder::new();
        let name = builder.string("m");
        builder.row(TableKind::Module, &[0, name, 0, 0, 0]);
        let t = builder.string("A");
        builder.row(TableKind::TypeDef, &[0, t, 0, 0, 1, 1]);
        builder.row(TableKind::TypeDef, &[0, t, 0, 0, 1, 1]);
        let database = builder.build_database();

        let module = database.layout(TableKind::Module);
        let typedef = database.layout(TableKind::TypeDef);
        assert_eq!(typedef.offset, module.offset + module.row_size as usize);
        // flags(4) + name(2) + namespace(2) + extends(2) + two lists(2+2)
        assert_eq!(typedef.row_size, 14);
        assert_eq!(database.row_count(TableKind::TypeDef), 2);
    }

    #[test]
    fn row_index_zero_and_past_end_are_corrupt() {
        let mut builder = ImageBuilder::new();
        let name = builder.string("m");
        builder.row(TableKind::Module, &[0, name, 0, 0, 0]);
        let database = builder.build_database();

        assert!(matches!(
            database.row::<ModuleRow>(0),
            Err(Error::Corrupt(_))
        ));
        assert!(matches!(
            database.row::<ModuleRow>(2),
            Err(Error::Corrupt(_))
        ));
        assert!(matches!(
            database.row::<TypeDefRow>(1),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn row_at_rejects_cross_kind_references() {
        let mut builder = ImageBuilder::new();
        let name = builder.string("m");
        builder.row(TableKind::Module, &[0, name, 0, 0, 0]);
        let database = builder.build_database();

        let reference = RowReference::new(TableKind::Module, 1);
        assert!(database.row_at::<ModuleRow>(reference).is_ok());
        assert!(matches!(
            database.row_at::<TypeDefRow>(reference),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn iteration_is_ascending_and_sized() {
        let mut builder = ImageBuilder::new();
        let name = builder.string("m");
        builder.row(TableKind::Module, &[0, name, 0, 0, 0]);
        for i in 0..5 {
            let t = builder.string(&format!("T{i}"));
            builder.row(TableKind::TypeDef, &[0, t, 0, 0, 1, 1]);
        }
        let database = builder.build_database();

        let rows: Vec<u32> = database.rows::<TypeDefRow>().map(|r| r.index()).collect();
        assert_eq!(rows, [1, 2, 3, 4, 5]);
        assert_eq!(database.rows::<TypeDefRow>().len(), 5);
    }

    #[test]
    fn rejects_unknown_valid_bits() {
        let mut builder = ImageBuilder::new();
        let name = builder.string("m");
        builder.row(TableKind::Module, &[0, name, 0, 0, 0]);
        let mut image = builder.build();
        // The #~ stream begins right after the root header; flip a Valid
        // bit above 0x2C.
        let tables = crate::raw::root::MetadataRoot::read(&image).unwrap().tables;
        let valid_offset = tables.range().start + 8;
        image[valid_offset + 6] |= 0x20; // bit 53
        assert!(matches!(
            Database::from_bytes(image),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn rejects_missing_module_row() {
        let builder = ImageBuilder::new();
        let image = builder.build();
        assert!(matches!(
            Database::from_bytes(image),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn parses_pe_wrapped_images() {
        let mut builder = ImageBuilder::new();
        let name = builder.string("wrapped");
        builder.row(TableKind::Module, &[0, name, 0, 0, 0]);
        let image = crate::testing::wrap_pe(&builder.build());
        let database = Database::from_bytes(image).unwrap();
        let module: ModuleRow = database.row(1).unwrap();
        assert_eq!(database.string(module.name().unwrap()).unwrap(), "wrapped");
    }
}
