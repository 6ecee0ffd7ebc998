//! Per-column, per-chunk Arrow array construction (§4.6, §5). Grounded
//! on the teacher's `Builder` enum / `field_to_builder` / `add_to_primitive`
//! (`frame/ser/fork/csv.rs`), reshaped onto `arrow_array`'s builders
//! instead of `PrimitiveChunkedBuilder`/`Utf8ChunkedBuilder`.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, NullArray, StringBuilder,
};

use crate::chunk::{FieldView, RawChunk};
use crate::infer::{classify_bool, parse_float64, parse_int64, LogicalType, NullTokenSet};

/// Decodes a field's raw bytes into its logical string value, unescaping
/// doubled quotes only when the scanner flagged it as necessary (§4.4).
pub(crate) fn decode_field<'a>(chunk: &'a RawChunk, fv: &FieldView, scratch: &'a mut String) -> &'a str {
    let raw = chunk.field(fv);
    if !fv.needs_unescape {
        return std::str::from_utf8(raw).unwrap_or_default();
    }
    scratch.clear();
    let s = std::str::from_utf8(raw).unwrap_or_default();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        scratch.push(c);
        if c == '"' && chars.peek() == Some(&'"') {
            chars.next();
        }
    }
    scratch
}

/// One column's worth of cells, materialized into an Arrow array at a
/// single, possibly-widened, `LogicalType` (§4.6). Values observed before
/// a widening event are reconstructed from `strings`, mirroring the
/// teacher's `builders_to_df` finalization step but adding the
/// mid-stream type-widening the teacher's single-pass builder never
/// needed because its schema was already fixed by inference.
pub struct ColumnBuilder {
    ty: LogicalType,
    /// When set via `dtype` (§6), the column never widens: a value that
    /// doesn't fit `ty` becomes null instead (forced-null coercion).
    pinned: bool,
    strings: Vec<Option<String>>,
    nulls: NullTokenSet,
}

impl ColumnBuilder {
    pub fn new(ty: LogicalType, nulls: NullTokenSet) -> Self {
        ColumnBuilder {
            ty,
            pinned: false,
            strings: Vec::new(),
            nulls,
        }
    }

    pub fn new_pinned(ty: LogicalType, nulls: NullTokenSet) -> Self {
        ColumnBuilder {
            ty,
            pinned: true,
            strings: Vec::new(),
            nulls,
        }
    }

    /// Appends one decoded cell. Unpinned columns widen `self.ty` in
    /// place if `value` doesn't fit the current type (§4.6: "a later
    /// contradicting value widens the column instead of erroring").
    /// Pinned columns (explicit `dtype` override) coerce a non-conforming
    /// value to null instead of widening.
    pub fn push(&mut self, value: &str) {
        if self.nulls.is_null(value) {
            self.strings.push(None);
            return;
        }
        if self.pinned {
            if value_fits(self.ty, value) {
                self.strings.push(Some(value.to_string()));
            } else {
                self.strings.push(None);
            }
            return;
        }
        let observed = crate::infer::classify_cell(value, &self.nulls);
        if observed > self.ty {
            self.ty = observed;
        }
        self.strings.push(Some(value.to_string()));
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn logical_type(&self) -> LogicalType {
        self.ty
    }

    /// Reconciles `self` with a type observed elsewhere (another chunk,
    /// or the global schema), widening if `ty` is higher on the lattice.
    /// A pinned (`dtype`-overridden) column never widens: its type is
    /// fixed by the caller, not by what was observed.
    pub fn widen_to(&mut self, ty: LogicalType) {
        if self.pinned {
            return;
        }
        self.ty = self.ty.join(ty);
    }

    /// Builds the final Arrow array at `self.logical_type()`, reconstructing
    /// already-appended values from their string form. A column explicitly
    /// pinned by `dtype` at a type outside what was observed still forces
    /// this representation (§6 `dtype` override).
    pub fn finish(self) -> ArrayRef {
        match self.ty {
            LogicalType::Null => Arc::new(NullArray::new(self.strings.len())),
            LogicalType::Bool => {
                let mut b = BooleanBuilder::with_capacity(self.strings.len());
                for v in &self.strings {
                    match v {
                        Some(s) => b.append_option(classify_bool(s)),
                        None => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
            LogicalType::Int64 => {
                let mut b = Int64Builder::with_capacity(self.strings.len());
                for v in &self.strings {
                    match v {
                        Some(s) => b.append_option(parse_int64(s)),
                        None => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
            LogicalType::Float64 => {
                let mut b = Float64Builder::with_capacity(self.strings.len());
                for v in &self.strings {
                    match v {
                        Some(s) => b.append_option(parse_float64(s)),
                        None => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
            LogicalType::String => {
                let mut b = StringBuilder::with_capacity(self.strings.len(), self.strings.len() * 8);
                for v in &self.strings {
                    match v {
                        Some(s) => b.append_value(s),
                        None => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
        }
    }
}

/// Whether `value` parses cleanly as `ty`, used to decide forced-null
/// coercion on a pinned (`dtype`-overridden) column.
fn value_fits(ty: LogicalType, value: &str) -> bool {
    match ty {
        LogicalType::Null => false,
        LogicalType::Bool => classify_bool(value).is_some(),
        LogicalType::Int64 => parse_int64(value).is_some(),
        LogicalType::Float64 => parse_float64(value).is_some(),
        LogicalType::String => true,
    }
}

/// Appends every row of `chunk`'s column `col_idx` into `builder`,
/// decoding escapes as needed. Mirrors the teacher's `add_to_builders` /
/// `add_to_primitive` row-walk.
pub fn append_column_from_chunk(builder: &mut ColumnBuilder, chunk: &RawChunk, col_idx: usize) {
    let mut scratch = String::new();
    for row in &chunk.rows {
        let fv = &row[col_idx];
        let value = decode_field(chunk, fv, &mut scratch);
        builder.push(value);
    }
}
