//! `ReadOptions` and its builder (§6). Grounded on the teacher's
//! constructor-argument shape (`ParReader::from_reader`,
//! `build_csv_reader`), reshaped into the builder-method idiom used by
//! `csv::ReaderBuilder`.

use std::collections::HashMap;

use crate::error::{Result, VroomError};
use crate::infer::LogicalType;

/// A column selector: either a name or a zero-based positional index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelector {
    Name(String),
    Index(usize),
}

/// The full set of knobs accepted by [`crate::read_csv`] (§6).
#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub delimiter: Option<u8>,
    pub has_header: Option<bool>,
    pub quote: u8,
    pub num_threads: u32,
    pub memory_map: Option<bool>,
    pub skip_rows: u64,
    pub n_rows: Option<u64>,
    pub usecols: Option<Vec<ColumnSelector>>,
    pub infer_types: bool,
    pub type_inference_rows: u64,
    pub null_values: Vec<String>,
    pub empty_is_null: bool,
    pub dtype: HashMap<String, LogicalType>,
    pub allow_ragged: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            delimiter: None,
            has_header: None,
            quote: b'"',
            num_threads: num_cpus::get().max(1) as u32,
            memory_map: None,
            skip_rows: 0,
            n_rows: None,
            usecols: None,
            infer_types: true,
            type_inference_rows: 1000,
            null_values: ["", "NA", "N/A", "null", "NULL"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            empty_is_null: true,
            dtype: HashMap::new(),
            allow_ragged: false,
        }
    }
}

impl ReadOptions {
    pub fn builder() -> ReadOptionsBuilder {
        ReadOptionsBuilder::default()
    }

    /// Validates option combinations that must be rejected before any
    /// I/O happens (§7: "option validation errors surface before any
    /// I/O").
    pub(crate) fn validate(&self) -> Result<()> {
        if self.num_threads == 0 {
            return Err(VroomError::Option("num_threads must be >= 1".into()));
        }
        Ok(())
    }
}

/// Builder for [`ReadOptions`], mirroring `ReaderBuilder`'s
/// `&mut self -> &mut Self` chaining idiom.
#[derive(Debug, Clone, Default)]
pub struct ReadOptionsBuilder {
    opts: ReadOptions,
}

impl ReadOptionsBuilder {
    pub fn delimiter(&mut self, delimiter: u8) -> &mut Self {
        self.opts.delimiter = Some(delimiter);
        self
    }

    /// Validates a caller-supplied delimiter string is exactly one byte,
    /// mirroring the `ValueError("single character")` check in
    /// `original_source`'s `test_invalid_delimiter`.
    pub fn delimiter_str(&mut self, delimiter: &str) -> Result<&mut Self> {
        if delimiter.len() != 1 {
            return Err(VroomError::Option(
                "delimiter must be a single character".into(),
            ));
        }
        self.opts.delimiter = Some(delimiter.as_bytes()[0]);
        Ok(self)
    }

    pub fn has_header(&mut self, has_header: bool) -> &mut Self {
        self.opts.has_header = Some(has_header);
        self
    }

    pub fn quote(&mut self, quote: u8) -> &mut Self {
        self.opts.quote = quote;
        self
    }

    pub fn num_threads(&mut self, n: u32) -> &mut Self {
        self.opts.num_threads = n;
        self
    }

    pub fn memory_map(&mut self, yes: bool) -> &mut Self {
        self.opts.memory_map = Some(yes);
        self
    }

    pub fn skip_rows(&mut self, n: u64) -> &mut Self {
        self.opts.skip_rows = n;
        self
    }

    pub fn n_rows(&mut self, n: u64) -> &mut Self {
        self.opts.n_rows = Some(n);
        self
    }

    pub fn usecols(&mut self, cols: Vec<ColumnSelector>) -> &mut Self {
        self.opts.usecols = Some(cols);
        self
    }

    pub fn infer_types(&mut self, yes: bool) -> &mut Self {
        self.opts.infer_types = yes;
        self
    }

    pub fn type_inference_rows(&mut self, n: u64) -> &mut Self {
        self.opts.type_inference_rows = n;
        self
    }

    pub fn null_values(&mut self, values: Vec<String>) -> &mut Self {
        self.opts.null_values = values;
        self
    }

    pub fn empty_is_null(&mut self, yes: bool) -> &mut Self {
        self.opts.empty_is_null = yes;
        self
    }

    pub fn dtype(&mut self, column: impl Into<String>, ty: LogicalType) -> &mut Self {
        self.opts.dtype.insert(column.into(), ty);
        self
    }

    pub fn allow_ragged(&mut self, yes: bool) -> &mut Self {
        self.opts.allow_ragged = yes;
        self
    }

    pub fn build(&self) -> ReadOptions {
        self.opts.clone()
    }
}
