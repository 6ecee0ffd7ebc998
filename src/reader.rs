//! The `read_csv` driver (§4, §6): dialect detection, chunk planning,
//! a parallel scan/build pass over a dedicated thread pool, and strict
//! reassembly into a [`Table`]. Grounded on the teacher's `ParReader`
//! (thread pool sizing, `take_projection`, `accumulate_dataframes`),
//! reshaped from `csv::Reader` row iteration onto the crate's own
//! [`scan_chunk`]/[`ChunkPlanner`].

use std::fs::File;
use std::io;
use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::datatypes::{Field as ArrowField, Schema, SchemaRef};
use rayon::prelude::*;
use tracing::debug;

use crate::builder::{append_column_from_chunk, ColumnBuilder};
use crate::chunk::{scan_chunk, ChunkPlanner, RawChunk};
use crate::dialect::{detect_dialect_from_bytes, Dialect};
use crate::error::{Result, VroomError};
use crate::infer::{classify_cell, LogicalType, NullTokenSet, TypeInferer};
use crate::options::ReadOptions;
use crate::scanner::ScanState;
use crate::table::Table;

/// Below this size, mmap isn't worth the syscall overhead even when
/// `memory_map` auto-detection is on.
const MMAP_AUTO_THRESHOLD: u64 = 8 * 1024 * 1024;
/// Floor on the chunk size the planner targets, regardless of file size
/// or worker count (§4.2: `max(1 MiB, L / (4·worker_count))`).
const MIN_CHUNK_BYTES: usize = 1024 * 1024;

/// Target bytes per chunk before snapping to a record boundary, scaled
/// so a fixed worker pool always gets real work to split across: more
/// threads or a smaller file both push the target size down (§4.2).
fn target_chunk_bytes(data_len: usize, num_threads: usize) -> usize {
    let worker_count = num_threads.max(1);
    (data_len / (4 * worker_count)).max(MIN_CHUNK_BYTES)
}

/// A cooperative cancellation flag a caller can share across threads to
/// abort an in-flight `read_csv` between chunks (§6, §7).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum FileBytes {
    Owned(Vec<u8>),
    #[cfg(feature = "mmap")]
    Mapped(memmap2::Mmap),
}

impl Deref for FileBytes {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        match self {
            FileBytes::Owned(v) => v,
            #[cfg(feature = "mmap")]
            FileBytes::Mapped(m) => m,
        }
    }
}

fn load_file(path: &Path, memory_map: Option<bool>) -> Result<FileBytes> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    let want_mmap = memory_map.unwrap_or(len >= MMAP_AUTO_THRESHOLD);

    #[cfg(feature = "mmap")]
    if want_mmap {
        // SAFETY: the file is not concurrently truncated by this process;
        // the standard caveat for mmap (external modification during the
        // read) applies as it does for every mmap-based reader.
        let mmap = unsafe { memmap2::Mmap::map(&file) }?;
        return Ok(FileBytes::Mapped(mmap));
    }
    let _ = want_mmap;

    let mut file = file;
    let mut buf = Vec::with_capacity(len as usize);
    io::Read::read_to_end(&mut file, &mut buf)?;
    Ok(FileBytes::Owned(buf))
}

/// Scans the first record of `data` regardless of `has_header`, to
/// learn both the column count and (if present) the header names
/// (§4.3, §6 `has_header=false` auto-naming).
fn read_first_row(
    data: &[u8],
    dialect: &Dialect,
) -> Result<(Vec<String>, usize)> {
    let chunk = scan_chunk(
        Arc::from(&data[..data.len().min(data.len())]),
        0,
        0,
        ScanState::START,
        dialect.scan_dialect(),
        true,
        true,
        None,
    )?;
    let Some(first) = chunk.rows.first() else {
        return Ok((Vec::new(), 0));
    };
    let ncols = first.len();
    let mut scratch = String::new();
    let names: Vec<String> = first
        .iter()
        .map(|fv| crate::builder::decode_field(&chunk, fv, &mut scratch).to_string())
        .collect();
    Ok((names, ncols))
}

/// Byte offset just past the header row (0 if there is no header).
fn header_byte_len(data: &[u8], dialect: &Dialect) -> usize {
    let mut end = 0usize;
    crate::scanner::scan(data, ScanState::START, dialect.scan_dialect(), |event| {
        if end == 0 {
            if let crate::scanner::ScanEvent::RecordEnd { pos, len } = event {
                end = pos + len;
            }
        }
    });
    end
}

/// Reads the CSV file at `path` into a [`Table`] (§4, §6).
pub fn read_csv(path: impl AsRef<Path>, options: &ReadOptions) -> Result<Table> {
    read_csv_cancellable(path, options, &CancellationToken::new())
}

/// Same as [`read_csv`] but checked for cancellation between chunks.
pub fn read_csv_cancellable(
    path: impl AsRef<Path>,
    options: &ReadOptions,
    cancel: &CancellationToken,
) -> Result<Table> {
    options.validate()?;
    let path = path.as_ref();
    let bytes = load_file(path, options.memory_map)?;
    let data: &[u8] = &bytes;

    let sample_len = data.len().min(64 * 1024);
    let dialect = detect_dialect_from_bytes(
        &data[..sample_len],
        options.delimiter,
        options.quote,
        options.has_header,
    );
    debug!(?dialect.delimiter, has_header = dialect.has_header, "dialect detected");

    let (header_names, ncols) = read_first_row(data, &dialect)?;
    let body_start = if dialect.has_header {
        header_byte_len(data, &dialect)
    } else {
        0
    };

    let column_names: Vec<String> = if dialect.has_header {
        header_names
    } else {
        (0..ncols).map(|i| format!("column_{i}")).collect()
    };

    let num_threads = options.num_threads.max(1) as usize;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .map_err(|e| VroomError::Other(anyhow::anyhow!(e)))?;

    let chunk_bytes = target_chunk_bytes(data.len(), num_threads);
    let ranges = ChunkPlanner::plan(data, body_start, chunk_bytes, dialect.scan_dialect());
    let nchunks = ranges.len();

    let expected_cols = if ncols == 0 { None } else { Some(ncols) };
    let data_arc: Arc<[u8]> = Arc::from(data);

    let mut raw_chunks: Vec<RawChunk> = pool.install(|| {
        ranges
            .par_iter()
            .enumerate()
            .map(|(idx, &(start, end))| -> Result<RawChunk> {
                if cancel.is_cancelled() {
                    return Err(VroomError::Cancelled);
                }
                let slice: Arc<[u8]> = Arc::from(&data_arc[start..end]);
                scan_chunk(
                    slice,
                    idx as u64,
                    start as u64,
                    ScanState::START,
                    dialect.scan_dialect(),
                    idx + 1 == nchunks,
                    options.allow_ragged,
                    expected_cols,
                )
            })
            .collect::<Result<Vec<_>>>()
    })?;
    // Strict reassembly by chunk_index (Issue #628 regression guard):
    // `par_iter().enumerate()` already preserves order, but sort
    // defensively so a future refactor of the parallel split can't
    // silently reorder or drop a chunk.
    raw_chunks.sort_by_key(|c| c.chunk_index);
    for (expected, chunk) in raw_chunks.iter().enumerate() {
        debug_assert_eq!(chunk.chunk_index, expected as u64);
    }

    apply_row_window(&mut raw_chunks, options.skip_rows, options.n_rows);

    let nulls = NullTokenSet::new(options.null_values.iter().cloned(), options.empty_is_null);
    let column_types = infer_column_types(&raw_chunks, ncols, options, &nulls);

    // First pass: build each chunk's columns independently (parallel),
    // but keep the builders around instead of finishing them — a chunk
    // past the sampled rows can observe a value that contradicts the
    // inferred type, widening that one chunk's builder in place (§4.5,
    // §4.6) without yet knowing whether sibling chunks agree.
    let chunk_builders: Vec<Vec<ColumnBuilder>> = pool.install(|| {
        raw_chunks
            .par_iter()
            .map(|chunk| {
                (0..ncols)
                    .into_par_iter()
                    .map(|col_idx| {
                        let override_ty = options.dtype.get(&column_names[col_idx]).copied();
                        let mut builder = match override_ty {
                            Some(ty) => ColumnBuilder::new_pinned(ty, nulls.clone()),
                            None => ColumnBuilder::new(column_types[col_idx], nulls.clone()),
                        };
                        append_column_from_chunk(&mut builder, chunk, col_idx);
                        builder
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    });

    // Second pass: reconcile each column's final type across all chunks
    // (and the sampled type) via `widen_to` before the schema is fixed,
    // so every chunk's finished array matches the one global Schema
    // (fixes a `RecordBatch::try_new` schema mismatch when a later chunk
    // widens beyond what the first `type_inference_rows` rows showed).
    let mut final_types = column_types.clone();
    for builders in &chunk_builders {
        for (col_idx, builder) in builders.iter().enumerate() {
            final_types[col_idx] = final_types[col_idx].join(builder.logical_type());
        }
    }

    let schema = build_schema(&column_names, &final_types, options);

    let chunk_columns: Vec<Vec<ArrayRef>> = pool.install(|| {
        chunk_builders
            .into_par_iter()
            .map(|builders| {
                builders
                    .into_par_iter()
                    .enumerate()
                    .map(|(col_idx, mut builder)| {
                        builder.widen_to(final_types[col_idx]);
                        builder.finish()
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    });

    let table = Table::from_chunk_columns(schema, chunk_columns)?;
    // Completeness guard (Issue #628): every scanned row must have made
    // it into the table; a chunk silently dropped during reassembly
    // would otherwise only show up as a quietly-short result.
    debug_assert_eq!(
        table.num_rows(),
        raw_chunks.iter().map(|c| c.rows.len()).sum::<usize>()
    );

    match &options.usecols {
        Some(selectors) => table.project(selectors),
        None => Ok(table),
    }
}

/// Drops `skip_rows` leading rows and truncates to `n_rows` total,
/// across chunk boundaries, by mutating each chunk's row list in place
/// (§6 `skip_rows`/`n_rows`).
fn apply_row_window(chunks: &mut Vec<RawChunk>, skip_rows: u64, n_rows: Option<u64>) {
    let mut to_skip = skip_rows;
    let mut remaining = n_rows;

    chunks.retain_mut(|chunk| {
        if to_skip > 0 {
            let skip_here = (to_skip as usize).min(chunk.rows.len());
            chunk.rows.drain(0..skip_here);
            to_skip -= skip_here as u64;
        }
        if let Some(limit) = remaining {
            if limit == 0 {
                chunk.rows.clear();
            } else if (chunk.rows.len() as u64) > limit {
                chunk.rows.truncate(limit as usize);
            }
            remaining = Some(limit.saturating_sub(chunk.rows.len() as u64));
        }
        !chunk.rows.is_empty()
    });
}

/// Samples up to `options.type_inference_rows` rows, in chunk order, to
/// compute each column's lattice join (§4.5). `dtype`-pinned columns
/// skip sampling and take the override type directly.
fn infer_column_types(
    chunks: &[RawChunk],
    ncols: usize,
    options: &ReadOptions,
    nulls: &NullTokenSet,
) -> Vec<LogicalType> {
    let mut inferers = vec![TypeInferer::new(); ncols];

    if options.infer_types {
        let mut sampled = 0u64;
        'outer: for chunk in chunks {
            for row in &chunk.rows {
                if sampled >= options.type_inference_rows {
                    break 'outer;
                }
                let mut scratch = String::new();
                for (col_idx, fv) in row.iter().enumerate() {
                    let value =
                        crate::builder::decode_field(chunk, fv, &mut scratch);
                    inferers[col_idx].observe(classify_cell(value, nulls));
                }
                sampled += 1;
            }
        }
    }

    if !options.infer_types {
        return vec![LogicalType::String; ncols];
    }
    inferers.into_iter().map(TypeInferer::finish).collect()
}

fn build_schema(names: &[String], types: &[LogicalType], options: &ReadOptions) -> SchemaRef {
    let fields: Vec<ArrowField> = names
        .iter()
        .zip(types)
        .map(|(name, ty)| {
            let ty = options
                .dtype
                .get(name)
                .copied()
                .unwrap_or(*ty);
            ArrowField::new(name, arrow_type_for(ty), true)
        })
        .collect();
    Arc::new(Schema::new(fields))
}

fn arrow_type_for(ty: LogicalType) -> arrow::datatypes::DataType {
    use arrow::datatypes::DataType;
    match ty {
        LogicalType::Null => DataType::Null,
        LogicalType::Bool => DataType::Boolean,
        LogicalType::Int64 => DataType::Int64,
        LogicalType::Float64 => DataType::Float64,
        LogicalType::String => DataType::Utf8,
    }
}
