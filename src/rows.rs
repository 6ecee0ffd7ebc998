//! `read_csv_rows` (§6): a lazy row iterator yielding `name -> raw
//! string value` maps, bypassing type inference entirely. Grounded on
//! the teacher's `StringRecord`-based row walk in `ParReader::next_rows`,
//! reshaped into a pull iterator instead of a batch-at-a-time builder
//! feed.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::builder::decode_field;
use crate::chunk::{scan_chunk, FieldView, RawChunk};
use crate::dialect::{detect_dialect_from_bytes, Dialect};
use crate::error::Result;
use crate::options::ReadOptions;
use crate::scanner::ScanState;

/// One decoded CSV record, keyed by column name (§6).
pub type Row = BTreeMap<String, String>;

/// Lazily walks every row of a CSV file without materializing Arrow
/// arrays or running type inference (§6). Reads the whole file up
/// front (mirroring [`crate::reader::read_csv`]'s strategy) but yields
/// rows one at a time rather than building columns.
pub struct RowReader {
    data: Arc<[u8]>,
    dialect: Dialect,
    column_names: Vec<String>,
    cursor: usize,
    skip_remaining: u64,
    rows_remaining: Option<u64>,
}

impl RowReader {
    pub fn open(path: impl AsRef<Path>, options: &ReadOptions) -> Result<Self> {
        options.validate()?;
        let mut file = File::open(path.as_ref())?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        let data: Arc<[u8]> = Arc::from(buf);

        let sample_len = data.len().min(64 * 1024);
        let dialect = detect_dialect_from_bytes(
            &data[..sample_len],
            options.delimiter,
            options.quote,
            options.has_header,
        );

        let first_row_end = first_record_end(&data, &dialect);
        let header_chunk = scan_chunk(
            data[..first_row_end].into(),
            0,
            0,
            ScanState::START,
            dialect.scan_dialect(),
            true,
            true,
            None,
        )?;
        let mut scratch = String::new();
        let (column_names, body_start): (Vec<String>, usize) = match header_chunk.rows.first() {
            None => (Vec::new(), 0),
            Some(first) if dialect.has_header => (
                first
                    .iter()
                    .map(|fv| decode_field(&header_chunk, fv, &mut scratch).to_string())
                    .collect(),
                first_row_end,
            ),
            Some(first) => (
                (0..first.len()).map(|i| format!("column_{i}")).collect(),
                0,
            ),
        };

        Ok(RowReader {
            data,
            dialect,
            column_names,
            cursor: body_start,
            skip_remaining: options.skip_rows,
            rows_remaining: options.n_rows,
        })
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }
}

fn first_record_end(data: &[u8], dialect: &Dialect) -> usize {
    let mut end = data.len();
    crate::scanner::scan(data, ScanState::START, dialect.scan_dialect(), |event| {
        if end == data.len() {
            if let crate::scanner::ScanEvent::RecordEnd { pos, len } = event {
                end = pos + len;
            }
        }
    });
    end
}

fn row_to_map(chunk: &RawChunk, row: &[FieldView], names: &[String]) -> Row {
    let mut scratch = String::new();
    names
        .iter()
        .zip(row)
        .map(|(name, fv)| (name.clone(), decode_field(chunk, fv, &mut scratch).to_string()))
        .collect()
}

/// Initial window scanned to find one row's end; grown if a single row
/// turns out to be larger (rare: a multi-KB quoted field).
const ROW_WINDOW: usize = 8 * 1024;

impl Iterator for RowReader {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        if self.rows_remaining == Some(0) {
            return None;
        }

        loop {
            if self.cursor >= self.data.len() {
                return None;
            }

            let mut window = ROW_WINDOW;
            let (chunk, consumed) = loop {
                let end = (self.cursor + window).min(self.data.len());
                let is_last = end == self.data.len();
                let slice: Arc<[u8]> = Arc::from(&self.data[self.cursor..end]);
                let chunk = scan_chunk(
                    slice,
                    0,
                    self.cursor as u64,
                    ScanState::START,
                    self.dialect.scan_dialect(),
                    is_last,
                    true,
                    None,
                )
                .ok()?;
                if chunk.rows.len() > 1 || is_last {
                    let row_len = row_byte_span(&chunk);
                    break (chunk, row_len);
                }
                window *= 2;
            };

            self.cursor += consumed;
            let row = chunk.rows.first()?;

            if self.skip_remaining > 0 {
                self.skip_remaining -= 1;
                continue;
            }
            if let Some(remaining_rows) = &mut self.rows_remaining {
                *remaining_rows -= 1;
            }
            return Some(row_to_map(&chunk, row, &self.column_names));
        }
    }
}

/// Bytes consumed by `chunk`'s first row, including its terminator.
fn row_byte_span(chunk: &RawChunk) -> usize {
    let Some(first_row) = chunk.rows.first() else {
        return chunk.bytes.len();
    };
    let last_field_end = first_row
        .last()
        .map(|fv: &FieldView| fv.offset as usize + fv.length as usize)
        .unwrap_or(0);
    let mut pos = last_field_end;
    if pos < chunk.bytes.len() && chunk.bytes[pos] == b'\r' {
        pos += if chunk.bytes.get(pos + 1) == Some(&b'\n') { 2 } else { 1 };
    } else if pos < chunk.bytes.len() && chunk.bytes[pos] == b'\n' {
        pos += 1;
    }
    pos.max(1).min(chunk.bytes.len().max(1))
}

/// Opens `path` as a lazy row iterator (§6).
pub fn read_csv_rows(path: impl AsRef<Path>, options: &ReadOptions) -> Result<RowReader> {
    RowReader::open(path, options)
}
