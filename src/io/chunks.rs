//! Lazy fixed-size chunking of a source table.
//!
//! The header is read once when the reader is opened; every chunk after that
//! addresses its fields through that shared schema. Chunks are produced on
//! demand, strictly in source order, and the reader cannot be rewound.
//!
//! A chunk containing a row that cannot be decoded (invalid UTF-8, a csv
//! syntax error, an I/O error) is reported as a `ChunkFailure` rather than a
//! partial chunk. The reader still consumes the chunk's full row window so
//! later chunks keep their boundaries. Ragged rows decode fine and are passed
//! through; a row too short to hold a date column fails at the record level.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use csv::{ReaderBuilder, StringRecord};

use crate::domain::{Schema, SkippedChunk};
use crate::error::AppError;

/// Buffer size for the underlying file reader (64 KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Up to `chunk_size` consecutive source rows.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// 0-based chunk index.
    pub index: usize,
    /// 1-based source row of `records[0]` (header excluded).
    pub first_row: usize,
    pub records: Vec<StringRecord>,
}

/// A chunk window that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFailure {
    pub index: usize,
    pub first_row: usize,
    pub last_row: usize,
    pub reason: String,
}

impl From<ChunkFailure> for SkippedChunk {
    fn from(failure: ChunkFailure) -> Self {
        SkippedChunk {
            index: failure.index,
            first_row: failure.first_row,
            last_row: failure.last_row,
            reason: failure.reason,
        }
    }
}

pub type ChunkRead = Result<Chunk, ChunkFailure>;

/// Streaming chunk source over any reader.
pub struct ChunkReader<R> {
    reader: csv::Reader<R>,
    schema: Arc<Schema>,
    chunk_size: usize,
    next_index: usize,
    next_row: usize,
    exhausted: bool,
}

impl ChunkReader<BufReader<File>> {
    /// Open `path` and read its header.
    ///
    /// # Errors
    ///
    /// Returns an input error if the file cannot be opened or has no header.
    pub fn open(path: &Path, chunk_size: usize, delimiter: u8) -> Result<Self, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::input(format!("Failed to open source '{}': {e}", path.display())))?;
        Self::from_reader(BufReader::with_capacity(BUFFER_SIZE, file), chunk_size, delimiter)
    }
}

impl<R: Read> ChunkReader<R> {
    pub fn from_reader(reader: R, chunk_size: usize, delimiter: u8) -> Result<Self, AppError> {
        if chunk_size == 0 {
            return Err(AppError::input("Chunk size must be at least 1."));
        }

        // Ragged rows are records, not decode errors.
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| AppError::input(format!("Failed to read source headers: {e}")))?;
        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            return Err(AppError::input("Source table has no header row."));
        }
        let schema = Arc::new(Schema::from_record(headers));

        Ok(Self {
            reader,
            schema,
            chunk_size,
            next_index: 0,
            next_row: 1,
            exhausted: false,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = ChunkRead;

    fn next(&mut self) -> Option<ChunkRead> {
        if self.exhausted {
            return None;
        }

        let mut records = Vec::with_capacity(self.chunk_size);
        let mut failure: Option<String> = None;
        let mut consumed = 0usize;

        while consumed < self.chunk_size {
            let mut record = StringRecord::new();
            match self.reader.read_record(&mut record) {
                Ok(true) => {
                    consumed += 1;
                    if failure.is_none() {
                        records.push(record);
                    }
                }
                Ok(false) => {
                    self.exhausted = true;
                    break;
                }
                Err(e) => {
                    consumed += 1;
                    let fatal = matches!(e.kind(), csv::ErrorKind::Io(_));
                    if failure.is_none() {
                        failure = Some(format!("row {}: {e}", self.next_row + consumed - 1));
                        records.clear();
                    }
                    if fatal {
                        self.exhausted = true;
                        break;
                    }
                }
            }
        }

        if consumed == 0 {
            return None;
        }

        let index = self.next_index;
        let first_row = self.next_row;
        self.next_index += 1;
        self.next_row += consumed;

        Some(match failure {
            Some(reason) => Err(ChunkFailure {
                index,
                first_row,
                last_row: first_row + consumed - 1,
                reason,
            }),
            None => Ok(Chunk {
                index,
                first_row,
                records,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn reader(content: &str, chunk_size: usize) -> ChunkReader<&[u8]> {
        ChunkReader::from_reader(content.as_bytes(), chunk_size, b',').expect("open reader")
    }

    #[test]
    fn splits_in_order_without_gaps() {
        let chunks: Vec<Chunk> = reader("id,plant\n1,a\n2,b\n3,c\n4,d\n5,e\n", 2)
            .map(|c| c.expect("chunk"))
            .collect();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().map(|c| c.records.len()).collect::<Vec<_>>(), vec![2, 2, 1]);
        assert_eq!(chunks.iter().map(|c| c.first_row).collect::<Vec<_>>(), vec![1, 3, 5]);

        let ids: Vec<&str> = chunks
            .iter()
            .flat_map(|c| c.records.iter())
            .map(|r| r.get(0).unwrap())
            .collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn schema_comes_from_header() {
        let reader = reader("Id,Planting Date\n1,01/01/2024\n", 10);
        assert_eq!(reader.schema().columns(), &["Id".to_string(), "Planting Date".to_string()]);
        assert_eq!(reader.schema().index_of("planting date"), Some(1));
    }

    #[test]
    fn header_only_yields_no_chunks() {
        assert_eq!(reader("id,plant\n", 3).count(), 0);
    }

    #[test]
    fn exact_multiple_has_no_trailing_empty_chunk() {
        let chunks: Vec<_> = reader("id\n1\n2\n3\n4\n", 2).collect();
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn ragged_rows_pass_through_as_records() {
        let chunks: Vec<Chunk> = reader("id,v\n1,a\n2,b\n3\n4,d,extra\n5,e\n", 2)
            .map(|c| c.expect("chunk"))
            .collect();
        assert_eq!(chunks.len(), 3);

        let middle = &chunks[1];
        assert_eq!(middle.first_row, 3);
        assert_eq!(middle.records[0].len(), 1);
        assert_eq!(middle.records[1].len(), 3);
        assert_eq!(chunks[2].records[0].get(0), Some("5"));
    }

    #[test]
    fn invalid_utf8_fails_its_chunk_only() {
        let mut bytes = b"id,v\n1,a\n2,".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(b"\n3,c\n");

        let reads: Vec<ChunkRead> = ChunkReader::from_reader(bytes.as_slice(), 1, b',')
            .unwrap()
            .collect();
        assert_eq!(reads.len(), 3);
        assert!(reads[0].is_ok());
        assert!(reads[1].is_err());
        assert_eq!(reads[2].as_ref().unwrap().records[0].get(1), Some("c"));
    }

    #[test]
    fn empty_source_has_no_header() {
        let err = ChunkReader::from_reader("".as_bytes(), 5, b',').err().expect("error");
        assert!(err.message().contains("header"));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(ChunkReader::from_reader("id\n1\n".as_bytes(), 0, b',').is_err());
    }

    #[test]
    fn open_reads_from_disk_with_custom_delimiter() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("source.csv");
        fs::write(&path, "id;plant\n1;01/01/2024\n2;02/01/2024\n").unwrap();

        let reader = ChunkReader::open(&path, 10, b';').unwrap();
        assert_eq!(reader.schema().len(), 2);
        let chunks: Vec<_> = reader.collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().records[1].get(1), Some("02/01/2024"));
    }

    #[test]
    fn missing_file_is_an_input_error() {
        let dir = TempDir::new().unwrap();
        let err = ChunkReader::open(&dir.path().join("nope.csv"), 10, b',').err().expect("error");
        assert_eq!(err.exit_code(), crate::error::EXIT_INPUT);
    }
}
