//! Persistence of matrices and statistics as compressed archives.
//!
//! An archive is a small container of named entries which is compressed as a whole with one of
//! the supported [Compression] algorithms. Uncompressed layout, all integers little-endian:
//!
//! ```text
//! magic "SPNA" | format version: u16 | entry count: u16
//! then per entry: name length: u16 | name (UTF-8) | data length: u64 | data
//! ```
//!
//! Matrix archives contain the entries `metadata.json`, `row_categories.json`,
//! `column_categories.json` and `cells.coo`. The cells entry holds the number of non-zero cells
//! `nnz: u64` followed by `nnz` row indices (`u32`), `nnz` column indices (`u32`) and `nnz`
//! values (`u64`).

use std::fs;
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::compression;
use crate::error::SpnetError;
use crate::heatmap::MatrixInfo;
use crate::models::Compression;
use crate::table::{TableKind, TableType};
use crate::types::LabelIndex;

/// Leading bytes of an uncompressed archive.
pub const MAGIC: &[u8; 4] = b"SPNA";

/// Version of the container and entry layout written by this crate.
pub const FORMAT_VERSION: u16 = 1;

pub const METADATA_ENTRY: &str = "metadata.json";
pub const ROW_CATEGORIES_ENTRY: &str = "row_categories.json";
pub const COLUMN_CATEGORIES_ENTRY: &str = "column_categories.json";
pub const CELLS_ENTRY: &str = "cells.coo";

/// An ordered collection of named binary entries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Archive {
    entries: Vec<(String, Bytes)>,
}

impl Archive {
    /// Create an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Entry names must be unique.
    pub fn insert(&mut self, name: &str, data: impl Into<Bytes>) -> Result<(), SpnetError> {
        if self.get(name).is_some() {
            return Err(SpnetError::archive(format!("duplicate entry {}", name)));
        }
        if name.len() > u16::MAX as usize {
            return Err(SpnetError::archive("entry name too long"));
        }
        self.entries.push((name.to_string(), data.into()));
        Ok(())
    }

    /// Add an entry containing the JSON serialisation of a value.
    pub fn insert_json<T: Serialize>(&mut self, name: &str, value: &T) -> Result<(), SpnetError> {
        self.insert(name, serde_json::to_vec(value)?)
    }

    /// Data of an entry, if present.
    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, data)| data)
    }

    /// Data of an entry that must be present.
    pub fn require(&self, name: &str) -> Result<&Bytes, SpnetError> {
        self.get(name)
            .ok_or_else(|| SpnetError::archive(format!("missing entry {}", name)))
    }

    /// Deserialise a required JSON entry.
    pub fn json<T: DeserializeOwned>(&self, name: &str) -> Result<T, SpnetError> {
        serde_json::from_slice(self.require(name)?)
            .map_err(|err| SpnetError::archive(format!("entry {}: {}", name, err)))
    }

    /// Deserialise an optional JSON entry.
    pub fn json_opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, SpnetError> {
        match self.get(name) {
            Some(_) => self.json(name).map(Some),
            None => Ok(None),
        }
    }

    /// Serialise the archive without compression.
    pub fn to_bytes(&self) -> Result<Bytes, SpnetError> {
        let size = self
            .entries
            .iter()
            .map(|(name, data)| 2 + name.len() + 8 + data.len())
            .sum::<usize>();
        let mut buf = BytesMut::with_capacity(MAGIC.len() + 4 + size);
        buf.put_slice(MAGIC);
        buf.put_u16_le(FORMAT_VERSION);
        buf.put_u16_le(u16::try_from(self.entries.len())?);
        for (name, data) in &self.entries {
            buf.put_u16_le(u16::try_from(name.len())?);
            buf.put_slice(name.as_bytes());
            buf.put_u64_le(u64::try_from(data.len())?);
            buf.put_slice(data);
        }
        Ok(buf.freeze())
    }

    /// Parse an uncompressed archive.
    pub fn from_bytes(mut data: Bytes) -> Result<Self, SpnetError> {
        if data.remaining() < MAGIC.len() + 4 || &data[..MAGIC.len()] != MAGIC {
            return Err(SpnetError::archive("bad magic"));
        }
        data.advance(MAGIC.len());
        let version = data.get_u16_le();
        if version != FORMAT_VERSION {
            return Err(SpnetError::archive(format!(
                "unsupported format version {}",
                version
            )));
        }
        let count = data.get_u16_le();
        let mut archive = Archive::new();
        for _ in 0..count {
            let name_len = read_len(&mut data, 2)?;
            let name = take(&mut data, name_len)?;
            let name = std::str::from_utf8(&name)
                .map_err(|_| SpnetError::archive("entry name is not UTF-8"))?;
            let data_len = read_len(&mut data, 8)?;
            let entry = take(&mut data, data_len)?;
            archive.insert(name, entry)?;
        }
        if data.has_remaining() {
            return Err(SpnetError::archive("trailing data after last entry"));
        }
        Ok(archive)
    }

    /// Serialise and compress the archive.
    pub fn compress(&self, compression: Compression) -> Result<Bytes, SpnetError> {
        compression::compress(compression, &self.to_bytes()?)
    }

    /// Decompress and parse an archive, detecting the compression algorithm.
    pub fn decompress(data: &Bytes) -> Result<Self, SpnetError> {
        Self::from_bytes(compression::decompress_auto(data)?)
    }

    /// Write the compressed archive to a file.
    pub fn write_file(&self, path: &Path, compression: Compression) -> Result<(), SpnetError> {
        fs::write(path, self.compress(compression)?)?;
        Ok(())
    }

    /// Read a compressed archive from a file.
    pub fn read_file(path: &Path) -> Result<Self, SpnetError> {
        Self::decompress(&fs::read(path)?.into())
    }
}

/// Read a little-endian length field of `width` bytes.
fn read_len(data: &mut Bytes, width: usize) -> Result<usize, SpnetError> {
    if data.remaining() < width {
        return Err(SpnetError::archive("truncated entry header"));
    }
    let len = match width {
        2 => data.get_u16_le() as u64,
        _ => data.get_u64_le(),
    };
    Ok(usize::try_from(len)?)
}

fn take(data: &mut Bytes, len: usize) -> Result<Bytes, SpnetError> {
    if data.remaining() < len {
        return Err(SpnetError::archive("truncated entry data"));
    }
    Ok(data.split_to(len))
}

/// Metadata stored in every archive.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ArchiveMetadata {
    /// Table type code
    pub table_type: TableType,
    /// Date of the source data in `YYYY_MM_DD` format
    pub datestr: String,
    /// Code of the axis 0 dimension
    pub dim_0_code: String,
    /// Code of the axis 1 dimension, if any
    pub dim_1_code: Option<String>,
    /// Name of the field cell values came from
    pub value_fld: String,
    /// Presence threshold of PAMs and PAM statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_presence_count: Option<u64>,
    /// Archive format version
    pub format_version: u16,
}

impl ArchiveMetadata {
    /// Return a new ArchiveMetadata object.
    pub fn new(info: &MatrixInfo, min_presence_count: Option<u64>) -> Self {
        ArchiveMetadata {
            table_type: info.table_type,
            datestr: info.datestr.clone(),
            dim_0_code: info.table_type.dim0().code().to_string(),
            dim_1_code: info.table_type.dim1().map(|dim| dim.code().to_string()),
            value_fld: info.value_fld.clone(),
            min_presence_count,
            format_version: FORMAT_VERSION,
        }
    }

    /// Matrix metadata described by this archive metadata.
    pub fn info(&self) -> MatrixInfo {
        MatrixInfo::new(self.table_type, &self.datestr, &self.value_fld)
    }

    /// Read the metadata entry of an archive, checking its table kind.
    pub fn read(archive: &Archive, kind: TableKind) -> Result<Self, SpnetError> {
        let metadata: ArchiveMetadata = archive.json(METADATA_ENTRY)?;
        if metadata.format_version != FORMAT_VERSION {
            return Err(SpnetError::archive(format!(
                "unsupported format version {}",
                metadata.format_version
            )));
        }
        if metadata.table_type.kind() != kind {
            return Err(SpnetError::archive(format!(
                "expected a {} table, found {}",
                kind.code(),
                metadata.table_type
            )));
        }
        let dim_1_code = metadata.table_type.dim1().map(|dim| dim.code());
        if metadata.dim_0_code != metadata.table_type.dim0().code()
            || metadata.dim_1_code.as_deref() != dim_1_code
        {
            return Err(SpnetError::archive(
                "dimension codes do not match table type",
            ));
        }
        Ok(metadata)
    }

    /// Archive filename for a compression algorithm.
    pub fn filename(&self, compression: Compression) -> Result<String, SpnetError> {
        self.table_type
            .filename(&self.datestr, compression.extension())
    }
}

/// Labels and coordinate-list cells of a persisted matrix.
#[derive(Debug)]
pub struct MatrixParts {
    pub metadata: ArchiveMetadata,
    pub rows: LabelIndex,
    pub columns: LabelIndex,
    pub cells: Vec<(u32, u32, u64)>,
}

impl MatrixParts {
    /// Build a matrix archive.
    pub fn to_archive<I>(
        metadata: &ArchiveMetadata,
        rows: &[String],
        columns: &[String],
        cells: I,
    ) -> Result<Archive, SpnetError>
    where
        I: ExactSizeIterator<Item = (u32, u32, u64)>,
    {
        let mut archive = Archive::new();
        archive.insert_json(METADATA_ENTRY, metadata)?;
        archive.insert_json(ROW_CATEGORIES_ENTRY, &rows)?;
        archive.insert_json(COLUMN_CATEGORIES_ENTRY, &columns)?;
        archive.insert(CELLS_ENTRY, encode_cells(cells)?)?;
        Ok(archive)
    }

    /// Read the parts of a matrix archive of some table kind.
    pub fn from_archive(archive: &Archive, kind: TableKind) -> Result<Self, SpnetError> {
        let metadata = ArchiveMetadata::read(archive, kind)?;
        let rows = LabelIndex::from_labels(archive.json(ROW_CATEGORIES_ENTRY)?)?;
        let columns = LabelIndex::from_labels(archive.json(COLUMN_CATEGORIES_ENTRY)?)?;
        let cells = decode_cells(archive.require(CELLS_ENTRY)?.clone())?;
        Ok(MatrixParts {
            metadata,
            rows,
            columns,
            cells,
        })
    }
}

/// Encode coordinate-list cells.
pub fn encode_cells<I>(cells: I) -> Result<Bytes, SpnetError>
where
    I: ExactSizeIterator<Item = (u32, u32, u64)>,
{
    let nnz = cells.len();
    let mut rows = BytesMut::with_capacity(nnz * 4);
    let mut columns = BytesMut::with_capacity(nnz * 4);
    let mut values = BytesMut::with_capacity(nnz * 8);
    for (row, column, value) in cells {
        rows.put_u32_le(row);
        columns.put_u32_le(column);
        values.put_u64_le(value);
    }
    let mut buf = BytesMut::with_capacity(8 + nnz * 16);
    buf.put_u64_le(u64::try_from(nnz)?);
    buf.put(rows);
    buf.put(columns);
    buf.put(values);
    Ok(buf.freeze())
}

/// Decode coordinate-list cells.
pub fn decode_cells(mut data: Bytes) -> Result<Vec<(u32, u32, u64)>, SpnetError> {
    if data.remaining() < 8 {
        return Err(SpnetError::archive("truncated cells"));
    }
    let nnz = usize::try_from(data.get_u64_le())?;
    let expected = nnz
        .checked_mul(16)
        .ok_or_else(|| SpnetError::archive("cell count too large"))?;
    if data.remaining() != expected {
        return Err(SpnetError::archive(format!(
            "expected {} bytes of cell data for {} cells, found {}",
            expected,
            nnz,
            data.remaining()
        )));
    }
    let mut rows = data.split_to(nnz * 4);
    let mut columns = data.split_to(nnz * 4);
    let cells = (0..nnz)
        .map(|_| (rows.get_u32_le(), columns.get_u32_le(), data.get_u64_le()))
        .collect();
    Ok(cells)
}

/// Write an archive to a directory, naming it from its metadata.
///
/// Returns the path of the new file.
pub fn write_to_dir(
    archive: &Archive,
    metadata: &ArchiveMetadata,
    dir: &Path,
    compression: Compression,
) -> Result<PathBuf, SpnetError> {
    let path = dir.join(metadata.filename(compression)?);
    archive.write_file(&path, compression)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;

    fn metadata() -> ArchiveMetadata {
        ArchiveMetadata::new(&test_utils::matrix_info(), None)
    }

    #[test]
    fn archive_round_trip() {
        let mut archive = Archive::new();
        archive.insert("a", Bytes::from_static(b"hello")).unwrap();
        archive.insert("b", Bytes::new()).unwrap();
        let bytes = archive.to_bytes().unwrap();
        assert_eq!(MAGIC, &bytes[..4]);
        assert_eq!(archive, Archive::from_bytes(bytes).unwrap());
        for compression in [Compression::Gzip, Compression::Zlib] {
            let compressed = archive.compress(compression).unwrap();
            assert_eq!(archive, Archive::decompress(&compressed).unwrap());
        }
        assert_eq!(Some(&Bytes::from_static(b"hello")), archive.get("a"));
        assert_eq!(Some(&Bytes::new()), archive.get("b"));
    }

    #[test]
    fn archive_duplicate_entry() {
        let mut archive = Archive::new();
        archive.insert("a", Bytes::new()).unwrap();
        let err = archive.insert("a", Bytes::new()).unwrap_err();
        assert_eq!("invalid archive: duplicate entry a", err.to_string());
    }

    #[test]
    fn archive_missing_entry() {
        let err = Archive::new().require("cells.coo").unwrap_err();
        assert_eq!("invalid archive: missing entry cells.coo", err.to_string());
    }

    #[test]
    fn archive_bad_magic() {
        let err = Archive::from_bytes(Bytes::from_static(b"ZIPX\x01\x00\x00\x00")).unwrap_err();
        assert_eq!("invalid archive: bad magic", err.to_string());
        let err = Archive::from_bytes(Bytes::from_static(b"SP")).unwrap_err();
        assert_eq!("invalid archive: bad magic", err.to_string());
    }

    #[test]
    fn archive_unsupported_version() {
        let err = Archive::from_bytes(Bytes::from_static(b"SPNA\x02\x00\x00\x00")).unwrap_err();
        assert_eq!(
            "invalid archive: unsupported format version 2",
            err.to_string()
        );
    }

    #[test]
    fn archive_truncated() {
        let mut archive = Archive::new();
        archive.insert("a", Bytes::from_static(b"hello")).unwrap();
        let bytes = archive.to_bytes().unwrap();
        let truncated = bytes.slice(..bytes.len() - 1);
        let err = Archive::from_bytes(truncated).unwrap_err();
        assert_eq!("invalid archive: truncated entry data", err.to_string());
        let truncated = bytes.slice(..9);
        let err = Archive::from_bytes(truncated).unwrap_err();
        assert_eq!("invalid archive: truncated entry header", err.to_string());
    }

    #[test]
    fn archive_trailing_data() {
        let bytes = Archive::new().to_bytes().unwrap();
        let mut extended = BytesMut::from(bytes.as_ref());
        extended.put_u8(0);
        assert!(Archive::from_bytes(extended.freeze()).is_err());
    }

    #[test]
    fn cells_round_trip() {
        let cells = vec![(0, 0, 5), (0, 1, 1), (1, 0, u64::MAX)];
        let encoded = encode_cells(cells.iter().copied()).unwrap();
        assert_eq!(8 + 3 * 16, encoded.len());
        assert_eq!(cells, decode_cells(encoded).unwrap());
    }

    #[test]
    fn cells_bad_length() {
        let encoded = encode_cells(vec![(0, 0, 5)].into_iter()).unwrap();
        let err = decode_cells(encoded.slice(..encoded.len() - 1)).unwrap_err();
        assert!(matches!(err, SpnetError::ArchiveFormat { .. }));
        assert!(decode_cells(Bytes::new()).is_err());
    }

    #[test]
    fn metadata_json() {
        let json = serde_json::to_value(metadata()).unwrap();
        assert_eq!(
            serde_json::json!({
                "table_type": "county_x_species_matrix",
                "datestr": "2024_02_01",
                "dim_0_code": "county",
                "dim_1_code": "species",
                "value_fld": "occ_count",
                "format_version": 1,
            }),
            json
        );
    }

    #[test]
    fn metadata_wrong_kind() {
        let mut archive = Archive::new();
        archive.insert_json(METADATA_ENTRY, &metadata()).unwrap();
        let err = ArchiveMetadata::read(&archive, TableKind::Pam).unwrap_err();
        assert_eq!(
            "invalid archive: expected a pam table, found county_x_species_matrix",
            err.to_string()
        );
        assert_eq!(
            metadata(),
            ArchiveMetadata::read(&archive, TableKind::Matrix).unwrap()
        );
    }

    #[test]
    fn metadata_mismatched_dimension() {
        let mut bad = metadata();
        bad.dim_0_code = "state".to_string();
        let mut archive = Archive::new();
        archive.insert_json(METADATA_ENTRY, &bad).unwrap();
        assert!(ArchiveMetadata::read(&archive, TableKind::Matrix).is_err());
    }

    #[test]
    fn metadata_invalid_json() {
        let mut archive = Archive::new();
        archive.insert(METADATA_ENTRY, Bytes::from_static(b"{")).unwrap();
        let err = ArchiveMetadata::read(&archive, TableKind::Matrix).unwrap_err();
        assert!(matches!(err, SpnetError::ArchiveFormat { .. }));
    }

    #[test]
    fn matrix_parts() {
        let rows = vec!["county1".to_string()];
        let columns = vec!["sp1".to_string(), "sp2".to_string()];
        let archive =
            MatrixParts::to_archive(&metadata(), &rows, &columns, vec![(0, 1, 3)].into_iter())
                .unwrap();
        let parts = MatrixParts::from_archive(&archive, TableKind::Matrix).unwrap();
        assert_eq!(metadata(), parts.metadata);
        assert_eq!(rows, parts.rows.as_slice());
        assert_eq!(columns, parts.columns.as_slice());
        assert_eq!(vec![(0, 1, 3)], parts.cells);
    }

    #[test]
    fn write_and_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = Archive::new();
        archive.insert_json(METADATA_ENTRY, &metadata()).unwrap();
        let path = write_to_dir(&archive, &metadata(), dir.path(), Compression::Zlib).unwrap();
        assert_eq!(
            dir.path().join("county_x_species_matrix_2024_02_01.zz"),
            path
        );
        assert_eq!(archive, Archive::read_file(&path).unwrap());
    }
}
