//! Arrow C Data Interface export (§4.7). Produces `FFI_ArrowSchema` and
//! `FFI_ArrowArrayStream` directly from the `arrow` crate's own `ffi`/
//! `ffi_stream` implementations rather than hand-rolled `repr(C)` structs.
//! The host binding that wraps these in a PyCapsule is outside this
//! crate's scope; `ArrowExporter` only produces the raw structures those
//! bindings call into.

use arrow::array::{Array, ArrayRef};
use arrow::error::ArrowError;
use arrow::ffi::to_ffi;
use arrow::ffi_stream::FFI_ArrowArrayStream;
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use arrow::datatypes::SchemaRef;

use crate::error::Result;
use crate::table::Table;

/// Exports a [`Table`]'s schema and batches through the Arrow C Data
/// Interface (§4.7). Each export clones the `Table`'s `Arc`-backed
/// internals cheaply; the underlying buffers are released only once the
/// last exported structure's release callback has run.
pub struct ArrowExporter {
    table: Table,
}

impl ArrowExporter {
    pub fn new(table: Table) -> Self {
        ArrowExporter { table }
    }

    /// Produces the table's schema as a `FFI_ArrowSchema`, ready to be
    /// handed to a C Data Interface consumer.
    pub fn export_schema(&self) -> Result<arrow::ffi::FFI_ArrowSchema> {
        Ok(arrow::ffi::FFI_ArrowSchema::try_from(self.table.schema().as_ref())?)
    }

    /// Produces a `FFI_ArrowArrayStream` that yields one `ArrowArray` per
    /// chunk the table holds, in chunk order, then signals end-of-stream
    /// (§4.7). The stream owns a clone of the table's batches; it is not
    /// thread-safe, matching the standard C Stream Interface contract.
    pub fn export_stream(&self) -> FFI_ArrowArrayStream {
        let reader = TableBatchReader {
            schema: self.table.schema().clone(),
            batches: self.table.batches().to_vec(),
            position: 0,
        };
        FFI_ArrowArrayStream::new(Box::new(reader))
    }

    /// Produces a single column's `ArrowArray`/`ArrowSchema` pair, for
    /// callers exporting one column at a time instead of the whole
    /// stream.
    pub fn export_column(
        &self,
        selector: &crate::options::ColumnSelector,
    ) -> Result<(arrow::ffi::FFI_ArrowArray, arrow::ffi::FFI_ArrowSchema)> {
        let array: ArrayRef = self.table.column(selector)?;
        Ok(to_ffi(&array.to_data())?)
    }
}

/// Adapts a `Table`'s owned batches to the `RecordBatchReader` interface
/// `FFI_ArrowArrayStream::new` expects.
struct TableBatchReader {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    position: usize,
}

impl Iterator for TableBatchReader {
    type Item = std::result::Result<RecordBatch, ArrowError>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = self.batches.get(self.position)?.clone();
        self.position += 1;
        Some(Ok(batch))
    }
}

impl RecordBatchReader for TableBatchReader {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{ColumnSelector, ReadOptions};
    use crate::reader::read_csv;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn export_schema_matches_table_fields() {
        let f = write_csv("name,age\nAlice,30\nBob,25\n");
        let table = read_csv(f.path(), &ReadOptions::default()).unwrap();
        let exporter = ArrowExporter::new(table);
        let ffi_schema = exporter.export_schema().unwrap();
        let schema = arrow::datatypes::Schema::try_from(&ffi_schema).unwrap();
        assert_eq!(schema.field(0).name(), "name");
        assert_eq!(schema.field(1).name(), "age");
        assert_eq!(schema.field(1).data_type(), &arrow::datatypes::DataType::Int64);
    }

    #[test]
    fn export_stream_round_trips_all_rows() {
        let f = write_csv("id,value\n1,10\n2,20\n3,30\n");
        let table = read_csv(f.path(), &ReadOptions::default()).unwrap();
        let expected_rows = table.num_rows();
        let exporter = ArrowExporter::new(table);

        let mut stream = exporter.export_stream();
        let reader = unsafe { arrow::ffi_stream::ArrowArrayStreamReader::from_raw(&mut stream) }.unwrap();
        let total: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(total, expected_rows);
    }

    #[test]
    fn export_column_round_trips_values() {
        let f = write_csv("value\n1\n2\n3\n");
        let table = read_csv(f.path(), &ReadOptions::default()).unwrap();
        let exporter = ArrowExporter::new(table);
        let (ffi_array, ffi_schema) = exporter.export_column(&ColumnSelector::Name("value".into())).unwrap();
        let data = unsafe { arrow::ffi::from_ffi(ffi_array, &ffi_schema) }.unwrap();
        let array = arrow::array::make_array(data);
        let array = array.as_any().downcast_ref::<arrow::array::Int64Array>().unwrap();
        assert_eq!(array.values(), &[1, 2, 3]);
    }
}
