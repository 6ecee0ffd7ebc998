//! Dialect sniffing from a prefix of the input (§4.3).

use std::fs::File;
use std::io::Read as _;
use std::path::Path;

use crate::error::Result;
use crate::infer::{classify_cell, LogicalType, NullTokenSet};
use crate::scanner::{scan, ScanDialect, ScanEvent, ScanState};

const SAMPLE_SIZE: usize = 64 * 1024;
const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b'\t', b';', b'|'];
const HEADER_BODY_SAMPLE_ROWS: usize = 50;

/// The byte-level conventions characterizing a CSV file (§3). Immutable
/// once computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: u8,
    pub quote: u8,
    pub line_terminator: LineTerminator,
    pub has_header: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTerminator {
    Lf,
    Crlf,
    Cr,
}

impl Dialect {
    pub fn scan_dialect(&self) -> ScanDialect {
        ScanDialect {
            delimiter: self.delimiter,
            quote: self.quote,
        }
    }
}

/// Splits a sample buffer into rows of raw (not-yet-unescaped) string
/// fields, using `dialect`. Used only for sniffing, where perf matters
/// far less than for the main scan.
fn sample_rows(sample: &[u8], dialect: ScanDialect) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = Vec::new();

    scan(sample, ScanState::START, dialect, |event| match event {
        ScanEvent::Data { pos, escaped: _ } => field.push(sample[pos]),
        ScanEvent::QuoteEnter { .. } | ScanEvent::QuoteExit { .. } => {}
        ScanEvent::FieldEnd { .. } => {
            row.push(String::from_utf8_lossy(&field).into_owned());
            field.clear();
        }
        ScanEvent::RecordEnd { .. } => {
            row.push(String::from_utf8_lossy(&field).into_owned());
            field.clear();
            rows.push(std::mem::take(&mut row));
        }
    });
    if !field.is_empty() || !row.is_empty() {
        row.push(String::from_utf8_lossy(&field).into_owned());
        rows.push(row);
    }
    rows
}

fn mean_and_variance(counts: &[usize]) -> (f64, f64) {
    if counts.is_empty() {
        return (0.0, 0.0);
    }
    let n = counts.len() as f64;
    let mean = counts.iter().sum::<usize>() as f64 / n;
    let variance = counts
        .iter()
        .map(|&c| {
            let d = c as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean, variance)
}

/// Scores `delimiter` over `sample` per §4.3: `mean_fields * 1/(1+variance)`.
fn score_delimiter(sample: &[u8], delimiter: u8) -> f64 {
    let dialect = ScanDialect {
        delimiter,
        quote: b'"',
    };
    let rows = sample_rows(sample, dialect);
    let counts: Vec<usize> = rows.iter().map(|r| r.len()).collect();
    let (mean, variance) = mean_and_variance(&counts);
    mean * (1.0 / (1.0 + variance))
}

/// Picks the best-scoring delimiter from the fixed candidate list,
/// breaking ties in listed order (§4.3, §9 open question (a)).
pub fn detect_delimiter(sample: &[u8]) -> u8 {
    let mut best: Option<(u8, f64)> = None;
    for d in CANDIDATE_DELIMITERS {
        let score = score_delimiter(sample, d);
        if best.map(|(_, b)| score > b).unwrap_or(true) {
            best = Some((d, score));
        }
    }
    best.map(|(d, _)| d).unwrap_or(b',')
}

/// First occurrence of `\n`, `\r\n`, or `\r` in `sample` (§4.3, §9 open
/// question (b)).
pub fn detect_line_terminator(sample: &[u8]) -> LineTerminator {
    for (i, &b) in sample.iter().enumerate() {
        if b == b'\n' {
            return LineTerminator::Lf;
        }
        if b == b'\r' {
            return if sample.get(i + 1) == Some(&b'\n') {
                LineTerminator::Crlf
            } else {
                LineTerminator::Cr
            };
        }
    }
    LineTerminator::Lf
}

/// Compares the column-wise type profile of row 0 against the body rows
/// (§4.3): header present iff every row-0 column is STRING while at
/// least one body column is non-STRING.
fn detect_has_header(rows: &[Vec<String>]) -> bool {
    let Some(header) = rows.first() else {
        return false;
    };
    let body = &rows[1..rows.len().min(1 + HEADER_BODY_SAMPLE_ROWS)];
    if body.is_empty() {
        return false;
    }
    let nulls = NullTokenSet::default();

    let header_all_string = header
        .iter()
        .all(|cell| classify_cell(cell, &nulls) == LogicalType::String);
    if !header_all_string {
        return false;
    }

    let ncols = header.len();
    (0..ncols).any(|col| {
        body.iter().any(|row| {
            row.get(col)
                .map(|cell| {
                    matches!(
                        classify_cell(cell, &nulls),
                        LogicalType::Int64 | LogicalType::Float64 | LogicalType::Bool
                    )
                })
                .unwrap_or(false)
        })
    })
}

/// Sniffs a [`Dialect`] from up to the first 64 KiB of `data` (§4.3).
/// `override_delimiter`/`override_has_header` let the caller's explicit
/// options win over detection.
pub fn detect_dialect_from_bytes(
    data: &[u8],
    override_delimiter: Option<u8>,
    override_quote: u8,
    override_has_header: Option<bool>,
) -> Dialect {
    let sample = &data[..data.len().min(SAMPLE_SIZE)];
    let delimiter = override_delimiter.unwrap_or_else(|| detect_delimiter(sample));
    let line_terminator = detect_line_terminator(sample);

    let has_header = match override_has_header {
        Some(v) => v,
        None => {
            let dialect = ScanDialect {
                delimiter,
                quote: override_quote,
            };
            detect_has_header(&sample_rows(sample, dialect))
        }
    };

    Dialect {
        delimiter,
        quote: override_quote,
        line_terminator,
        has_header,
    }
}

/// Sniffs the [`Dialect`] of the file at `path` by reading only its first
/// 64 KiB, without parsing the rest of the file (§6).
pub fn detect_dialect(path: impl AsRef<Path>) -> Result<Dialect> {
    let file = File::open(path.as_ref())?;
    let mut sample = Vec::with_capacity(SAMPLE_SIZE);
    file.take(SAMPLE_SIZE as u64).read_to_end(&mut sample)?;
    Ok(detect_dialect_from_bytes(&sample, None, b'"', None))
}
