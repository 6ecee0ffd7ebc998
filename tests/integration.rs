//! End-to-end tests exercising the public API surface (`vroom::*`)
//! across modules, rather than one module in isolation.

use std::io::Write;

use arrow::array::Array;
use vroom::{read_csv, read_csv_rows, ColumnSelector, LogicalType, ReadOptions, VroomError};

fn write_csv(content: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(content.as_bytes()).unwrap();
    f
}

#[test]
fn detect_dialect_then_read_csv_agree_on_delimiter() {
    let f = write_csv("name;age;city\nAlice;30;New York\nBob;25;Los Angeles\n");
    let dialect = vroom::detect_dialect(f.path()).unwrap();
    assert_eq!(dialect.delimiter, b';');
    assert!(dialect.has_header);

    let table = read_csv(f.path(), &ReadOptions::default()).unwrap();
    assert_eq!(table.num_rows(), 2);
    assert_eq!(table.column_names(), vec!["name", "age", "city"]);
}

#[test]
fn row_reader_and_table_agree_on_values() {
    let mut content = String::from("id,value,category\n");
    for i in 0..2_000 {
        content.push_str(&format!("{i},{},cat_{}\n", i * 10, i % 5));
    }
    let f = write_csv(&content);

    let table = read_csv(f.path(), &ReadOptions::builder().num_threads(3).build()).unwrap();
    let rows: Vec<_> = read_csv_rows(f.path(), &ReadOptions::default())
        .unwrap()
        .collect();

    assert_eq!(table.num_rows(), rows.len());
    assert_eq!(rows[1500]["id"], "1500");
    assert_eq!(rows[1500]["value"], "15000");

    let ids = table.column(&ColumnSelector::Name("id".into())).unwrap();
    let ids = ids
        .as_any()
        .downcast_ref::<arrow::array::Int64Array>()
        .unwrap();
    assert_eq!(ids.value(1500), 1500);
}

#[test]
fn arrow_export_stream_preserves_all_chunks_and_rows() {
    let mut content = String::from("id,value\n");
    for i in 0..8_000 {
        content.push_str(&format!("{i},{}\n", i * 2));
    }
    let f = write_csv(&content);
    let opts = ReadOptions::builder().num_threads(4).build();
    let table = read_csv(f.path(), &opts).unwrap();
    let expected_rows = table.num_rows();
    let expected_chunks = table.num_chunks();

    let exporter = vroom::ArrowExporter::new(table);
    let mut stream = exporter.export_stream();
    let reader =
        unsafe { arrow::ffi_stream::ArrowArrayStreamReader::from_raw(&mut stream) }.unwrap();

    let batches: Vec<_> = reader.map(|b| b.unwrap()).collect();
    assert_eq!(batches.len(), expected_chunks);
    let total_rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    assert_eq!(total_rows, expected_rows);
}

#[test]
fn usecols_with_unknown_column_name_is_key_error() {
    let f = write_csv("a,b\n1,2\n");
    let opts = ReadOptions::builder()
        .usecols(vec![ColumnSelector::Name("nope".into())])
        .build();
    let err = read_csv(f.path(), &opts).unwrap_err();
    assert!(matches!(err, VroomError::KeyError(name) if name == "nope"));
}

#[test]
fn ragged_row_without_allow_ragged_is_parse_error() {
    let f = write_csv("a,b,c\n1,2,3\n4,5\n");
    let err = read_csv(f.path(), &ReadOptions::default()).unwrap_err();
    assert!(matches!(err, VroomError::Parse { .. }));
}

#[test]
fn cancellation_token_stops_a_multi_chunk_read() {
    let mut content = String::from("id,value\n");
    for i in 0..50_000 {
        content.push_str(&format!("{i},{}\n", i * 2));
    }
    let f = write_csv(&content);
    let token = vroom::CancellationToken::new();
    token.cancel();
    let err = vroom::read_csv_cancellable(f.path(), &ReadOptions::default(), &token).unwrap_err();
    assert!(matches!(err, VroomError::Cancelled));
}

#[test]
fn dtype_override_pins_the_schema_even_under_type_inference() {
    let f = write_csv("flag\ntrue\nfalse\n1\n");
    let opts = ReadOptions::builder()
        .dtype("flag", LogicalType::Bool)
        .build();
    let table = read_csv(f.path(), &opts).unwrap();
    assert_eq!(
        table.schema().field(0).data_type(),
        &arrow::datatypes::DataType::Boolean
    );
    let col = table.column(&ColumnSelector::Name("flag".into())).unwrap();
    let col = col
        .as_any()
        .downcast_ref::<arrow::array::BooleanArray>()
        .unwrap();
    assert!(col.value(0));
    assert!(!col.value(1));
    assert!(col.is_null(2));
}
