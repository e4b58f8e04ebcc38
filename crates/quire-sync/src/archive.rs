//! Notebook archives: a zip holding a single `source.json` entry.

use std::io::{Cursor, Read, Write};

use quire_core::NotebookSource;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{SyncError, SyncResult};

/// Name of the JSON document inside an archive.
pub const ARCHIVE_ENTRY: &str = "source.json";

/// Local file header signature.
const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

/// Serialize `source` to JSON and compress it.
pub fn pack(source: &NotebookSource) -> SyncResult<Vec<u8>> {
    let json = serde_json::to_vec(source)?;

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file(ARCHIVE_ENTRY, options)?;
    writer.write_all(&json)?;
    let bytes = writer.finish()?.into_inner();

    tracing::debug!(
        "Packed {} cells: {} bytes -> {} bytes",
        source.cells.len(),
        json.len(),
        bytes.len()
    );
    Ok(bytes)
}

/// Decompress an archive produced by [`pack`].
pub fn unpack(bytes: &[u8]) -> SyncResult<NotebookSource> {
    if !is_archive(bytes) {
        return Err(SyncError::InvalidArchive("missing zip header".to_string()));
    }

    let invalid = |e: zip::result::ZipError| SyncError::InvalidArchive(e.to_string());
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(invalid)?;
    let mut entry = archive.by_name(ARCHIVE_ENTRY).map_err(|_| {
        SyncError::InvalidArchive(format!("no {} entry", ARCHIVE_ENTRY))
    })?;

    let mut json = Vec::new();
    entry
        .read_to_end(&mut json)
        .map_err(|e| SyncError::InvalidArchive(e.to_string()))?;
    Ok(serde_json::from_slice(&json)?)
}

/// Whether `bytes` start like a zip archive.
pub fn is_archive(bytes: &[u8]) -> bool {
    bytes.starts_with(&ZIP_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_core::CellSource;

    #[test]
    fn test_pack_writes_single_entry() {
        let source = NotebookSource::new(vec![CellSource::code("project")]);
        let bytes = pack(&source).unwrap();

        assert!(is_archive(&bytes));
        let archive = ZipArchive::new(Cursor::new(&bytes[..])).unwrap();
        assert_eq!(archive.file_names().collect::<Vec<_>>(), vec![ARCHIVE_ENTRY]);
    }

    #[test]
    fn test_unpack_rejects_plain_json() {
        let err = unpack(br#"{"cells":[]}"#).unwrap_err();
        assert!(matches!(err, SyncError::InvalidArchive(_)));
    }

    #[test]
    fn test_unpack_rejects_truncated_archive() {
        let bytes = pack(&NotebookSource::default()).unwrap();
        let err = unpack(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, SyncError::InvalidArchive(_)));
    }

    #[test]
    fn test_unpack_requires_source_entry() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("notes.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"not a notebook").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        match unpack(&bytes).unwrap_err() {
            SyncError::InvalidArchive(message) => assert!(message.contains(ARCHIVE_ENTRY)),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
