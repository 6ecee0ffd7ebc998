pub mod arrow_export;
pub mod builder;
pub mod chunk;
pub mod dialect;
pub mod error;
pub mod infer;
pub mod options;
pub mod reader;
pub mod rows;
pub mod scanner;
pub mod table;

pub use arrow_export::ArrowExporter;
pub use dialect::{detect_dialect, detect_dialect_from_bytes, Dialect};
pub use error::{Result, VroomError};
pub use infer::LogicalType;
pub use options::{ColumnSelector, ReadOptions, ReadOptionsBuilder};
pub use reader::{read_csv, read_csv_cancellable, CancellationToken};
pub use rows::{read_csv_rows, Row, RowReader};
pub use table::{Table, TableRow};
