//! The user-visible result type (§5): `Table`, wrapping one or more
//! Arrow `RecordBatch`es sharing a `Schema`. Grounded on the teacher's
//! `Series`/`DataFrame` accessor shape (`series/mod.rs`'s `name`,
//! `dtype`, `len`, `n_chunks`), reshaped around real `arrow_array`
//! types instead of polars' own `ChunkedArray`.

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

use crate::error::{Result, VroomError};
use crate::options::ColumnSelector;

/// A single decoded row, keyed by column name, with each cell rendered
/// to its string form (`None` for null) — the same shape as
/// [`crate::rows::Row`], but pulled out of an already-typed [`Table`]
/// instead of scanned straight from raw CSV text.
pub type TableRow = BTreeMap<String, Option<String>>;

/// A parsed CSV file: a shared [`Schema`] plus one [`RecordBatch`] per
/// chunk that was scanned (§4.2, §5). Chunks keep their relative order;
/// concatenating them column-by-column reconstructs the whole file.
#[derive(Debug, Clone)]
pub struct Table {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Table {
    pub(crate) fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Table { schema, batches }
    }

    /// Builds a `Table` from per-chunk columns, one `Vec<ArrayRef>` per
    /// chunk in chunk order, each inner vec already in schema-column
    /// order (§4.6: column materialization happens per chunk, in
    /// parallel, and is reassembled here).
    pub(crate) fn from_chunk_columns(
        schema: SchemaRef,
        chunk_columns: Vec<Vec<ArrayRef>>,
    ) -> Result<Self> {
        let mut batches = Vec::with_capacity(chunk_columns.len());
        for columns in chunk_columns {
            batches.push(RecordBatch::try_new(schema.clone(), columns)?);
        }
        if batches.is_empty() {
            // §3: "Batch count ≥ 1 even for empty tables" — a
            // zero-chunk file (every chunk dropped by `skip_rows`/
            // `n_rows`, or an entirely empty input) still needs one
            // batch to carry the schema.
            let empty_columns = schema
                .fields()
                .iter()
                .map(|f| arrow::array::new_empty_array(f.data_type()))
                .collect();
            batches.push(RecordBatch::try_new(schema.clone(), empty_columns)?);
        }
        Ok(Table { schema, batches })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema.fields().iter().map(|f| f.name().as_str()).collect()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn num_chunks(&self) -> usize {
        self.batches.len()
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Resolves a [`ColumnSelector`] against this table's schema,
    /// returning the column's position. `KeyError`/`IndexError` mirror
    /// the teacher's `PolarsError` taxonomy for an unknown name or an
    /// out-of-range index (§7).
    pub fn column_index(&self, selector: &ColumnSelector) -> Result<usize> {
        match selector {
            ColumnSelector::Name(name) => self
                .schema
                .index_of(name)
                .map_err(|_| VroomError::KeyError(name.clone())),
            ColumnSelector::Index(idx) => {
                if *idx < self.schema.fields().len() {
                    Ok(*idx)
                } else {
                    Err(VroomError::IndexError(*idx))
                }
            }
        }
    }

    /// All chunks of one column, concatenated in chunk order.
    pub fn column(&self, selector: &ColumnSelector) -> Result<ArrayRef> {
        let idx = self.column_index(selector)?;
        let arrays: Vec<&dyn arrow::array::Array> = self
            .batches
            .iter()
            .map(|b| b.column(idx).as_ref())
            .collect();
        if arrays.is_empty() {
            return Ok(arrow::array::new_empty_array(self.schema.field(idx).data_type()));
        }
        Ok(arrow::compute::concat(&arrays)?)
    }

    /// Materializes row `index` (0-based, across the whole table) as a
    /// name → rendered-value map (§6). Out-of-range indices are an
    /// `IndexError`, matching [`Table::column`]'s resolution errors.
    pub fn row(&self, index: usize) -> Result<TableRow> {
        let mut remaining = index;
        for batch in &self.batches {
            if remaining < batch.num_rows() {
                return Ok(self
                    .schema
                    .fields()
                    .iter()
                    .enumerate()
                    .map(|(i, field)| {
                        (field.name().clone(), cell_to_string(batch.column(i).as_ref(), remaining))
                    })
                    .collect());
            }
            remaining -= batch.num_rows();
        }
        Err(VroomError::IndexError(index))
    }

    /// Projects `table` down to the subset of columns in `selectors`, in
    /// the order given (§6 `usecols`).
    pub fn project(&self, selectors: &[ColumnSelector]) -> Result<Table> {
        let indices: Vec<usize> = selectors
            .iter()
            .map(|s| self.column_index(s))
            .collect::<Result<_>>()?;

        let fields: Vec<Field> = indices
            .iter()
            .map(|&i| self.schema.field(i).clone())
            .collect();
        let new_schema = Arc::new(Schema::new(fields));

        let new_batches = self
            .batches
            .iter()
            .map(|b| {
                let columns: Vec<ArrayRef> = indices.iter().map(|&i| b.column(i).clone()).collect();
                RecordBatch::try_new(new_schema.clone(), columns)
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Table::new(new_schema, new_batches))
    }
}

/// Renders one array cell to its display string, `None` on null. Only
/// the four [`crate::infer::LogicalType`] Arrow mappings ever appear in
/// a `Table`'s schema, so a full `arrow-cast` dependency isn't needed
/// for this.
fn cell_to_string(array: &dyn Array, row: usize) -> Option<String> {
    if array.is_null(row) {
        return None;
    }
    match array.data_type() {
        DataType::Int64 => Some(array.as_any().downcast_ref::<Int64Array>().unwrap().value(row).to_string()),
        DataType::Float64 => Some(array.as_any().downcast_ref::<Float64Array>().unwrap().value(row).to_string()),
        DataType::Boolean => Some(array.as_any().downcast_ref::<BooleanArray>().unwrap().value(row).to_string()),
        DataType::Utf8 => Some(array.as_any().downcast_ref::<StringArray>().unwrap().value(row).to_string()),
        DataType::Null => None,
        other => unreachable!("Table schema never produces {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::DataType;

    fn sample_table() -> Table {
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Int64, true),
        ]));
        let batch1 = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef,
                Arc::new(Int64Array::from(vec![10, 20])) as ArrayRef,
            ],
        )
        .unwrap();
        let batch2 = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![3])) as ArrayRef,
                Arc::new(Int64Array::from(vec![30])) as ArrayRef,
            ],
        )
        .unwrap();
        Table::new(schema, vec![batch1, batch2])
    }

    #[test]
    fn header_only_file_still_yields_one_batch() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Int64, true),
        ]));
        let empty_columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(Vec::<i64>::new())),
            Arc::new(Int64Array::from(Vec::<i64>::new())),
        ];
        let t = Table::from_chunk_columns(schema, vec![empty_columns]).unwrap();
        assert_eq!(t.num_chunks(), 1);
        assert_eq!(t.num_rows(), 0);
        assert_eq!(t.column_names(), vec!["a", "b"]);
    }

    #[test]
    fn zero_chunks_still_yields_one_empty_batch() {
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int64, true)]));
        let t = Table::from_chunk_columns(schema, Vec::new()).unwrap();
        assert_eq!(t.num_chunks(), 1);
        assert_eq!(t.num_rows(), 0);
    }

    #[test]
    fn shape_accessors() {
        let t = sample_table();
        assert_eq!(t.num_rows(), 3);
        assert_eq!(t.num_columns(), 2);
        assert_eq!(t.num_chunks(), 2);
        assert_eq!(t.column_names(), vec!["a", "b"]);
    }

    #[test]
    fn column_by_name_concatenates_chunks() {
        let t = sample_table();
        let col = t.column(&ColumnSelector::Name("a".into())).unwrap();
        let col = col.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(col.values(), &[1, 2, 3]);
    }

    #[test]
    fn column_by_unknown_name_errors() {
        let t = sample_table();
        let err = t.column(&ColumnSelector::Name("z".into())).unwrap_err();
        assert!(matches!(err, VroomError::KeyError(_)));
    }

    #[test]
    fn column_by_out_of_range_index_errors() {
        let t = sample_table();
        let err = t.column(&ColumnSelector::Index(9)).unwrap_err();
        assert!(matches!(err, VroomError::IndexError(9)));
    }

    #[test]
    fn row_crosses_chunk_boundaries() {
        let t = sample_table();
        assert_eq!(t.row(0).unwrap()["a"], Some("1".to_string()));
        // Row 2 lives in the second RecordBatch (first has only rows 0-1).
        let row2 = t.row(2).unwrap();
        assert_eq!(row2["a"], Some("3".to_string()));
        assert_eq!(row2["b"], Some("30".to_string()));
    }

    #[test]
    fn row_out_of_range_errors() {
        let t = sample_table();
        let err = t.row(3).unwrap_err();
        assert!(matches!(err, VroomError::IndexError(3)));
    }

    #[test]
    fn row_renders_null_as_none() {
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int64, true)]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Int64Array::from(vec![Some(1), None])) as ArrayRef],
        )
        .unwrap();
        let t = Table::new(schema, vec![batch]);
        assert_eq!(t.row(1).unwrap()["a"], None);
    }

    #[test]
    fn project_reorders_and_narrows() {
        let t = sample_table();
        let p = t
            .project(&[ColumnSelector::Name("b".into()), ColumnSelector::Index(0)])
            .unwrap();
        assert_eq!(p.column_names(), vec!["b", "a"]);
        assert_eq!(p.num_rows(), 3);
    }
}
