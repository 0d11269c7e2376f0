//! Event capture for auction runs.
//!
//! A `tracing` subscriber files every info-level event under its target
//! (`announce`, `bid`, `round`, `final_result`, `agent_state`, ...) as one
//! row of a column table. Columns appear as fields are first seen; rows that
//! lack a field get a zero/empty value. Every row also gets a `seq` column
//! holding a global event counter, so rows from different tables can be put
//! back in emission order.
//!
//! ```ignore
//! // In simulation code:
//! tracing::info!(target: "bid", bidder_id, product_id, round, price_proposal);
//!
//! // In a test:
//! let mut rec = instrument::ScopedRecorder::new("data", "two_bidders");
//! // ... run simulation ...
//! let bids = &rec.get()["bid"];
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing::{Event, Id, Metadata, Subscriber};

/// Column name carrying the global event sequence number.
pub const SEQ_COLUMN: &str = "seq";

#[derive(Debug, Clone, PartialEq)]
pub enum TypedColumn {
    U64(Vec<u64>),
    I64(Vec<i64>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

impl TypedColumn {
    pub fn len(&self) -> usize {
        match self {
            TypedColumn::U64(v) => v.len(),
            TypedColumn::I64(v) => v.len(),
            TypedColumn::F64(v) => v.len(),
            TypedColumn::Bool(v) => v.len(),
            TypedColumn::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fill_to(&mut self, rows: usize) {
        let missing = rows.saturating_sub(self.len());
        match self {
            TypedColumn::U64(v) => v.extend(std::iter::repeat_n(0, missing)),
            TypedColumn::I64(v) => v.extend(std::iter::repeat_n(0, missing)),
            TypedColumn::F64(v) => v.extend(std::iter::repeat_n(0.0, missing)),
            TypedColumn::Bool(v) => v.extend(std::iter::repeat_n(false, missing)),
            TypedColumn::Str(v) => v.extend(std::iter::repeat_n(String::new(), missing)),
        }
    }
}

/// Rows recorded for one event target. Columns are kept in name order so
/// exported files have a stable layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTable {
    pub columns: BTreeMap<String, TypedColumn>,
    pub row_count: usize,
}

impl EventTable {
    fn align(&mut self) {
        for col in self.columns.values_mut() {
            col.fill_to(self.row_count);
        }
    }

    pub fn u64s(&self, name: &str) -> Option<&[u64]> {
        match self.columns.get(name)? {
            TypedColumn::U64(v) => Some(v),
            _ => None,
        }
    }

    pub fn f64s(&self, name: &str) -> Option<&[f64]> {
        match self.columns.get(name)? {
            TypedColumn::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn bools(&self, name: &str) -> Option<&[bool]> {
        match self.columns.get(name)? {
            TypedColumn::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn strs(&self, name: &str) -> Option<&[String]> {
        match self.columns.get(name)? {
            TypedColumn::Str(v) => Some(v),
            _ => None,
        }
    }
}

/// All tables recorded on this thread, keyed by target.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub tables: HashMap<String, EventTable>,
    next_seq: u64,
}

impl Recorder {
    pub fn table(&self, target: &str) -> Option<&EventTable> {
        self.tables.get(target)
    }

    pub fn rows(&self, target: &str) -> usize {
        self.tables.get(target).map_or(0, |t| t.row_count)
    }
}

thread_local! {
    static RECORDER: RefCell<Recorder> = RefCell::default();
}

/// Appends one event's fields to the row being built. A field whose type
/// disagrees with an existing column is dropped.
struct RowVisitor<'a> {
    table: &'a mut EventTable,
    row: usize,
}

impl RowVisitor<'_> {
    fn column(&mut self, name: &str, empty: fn() -> TypedColumn) -> &mut TypedColumn {
        let row = self.row;
        let col = self.table.columns.entry(name.to_string()).or_insert_with(empty);
        col.fill_to(row);
        col
    }
}

impl Visit for RowVisitor<'_> {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if let TypedColumn::U64(v) = self.column(field.name(), || TypedColumn::U64(Vec::new())) {
            v.push(value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if let TypedColumn::I64(v) = self.column(field.name(), || TypedColumn::I64(Vec::new())) {
            v.push(value);
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let TypedColumn::F64(v) = self.column(field.name(), || TypedColumn::F64(Vec::new())) {
            v.push(value);
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if let TypedColumn::Bool(v) = self.column(field.name(), || TypedColumn::Bool(Vec::new())) {
            v.push(value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if let TypedColumn::Str(v) = self.column(field.name(), || TypedColumn::Str(Vec::new())) {
            v.push(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record_str(field, &format!("{value:?}"));
    }
}

/// Tracing subscriber that files info-level events into per-target tables.
pub struct DataFrameSubscriber;

impl Subscriber for DataFrameSubscriber {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.is_event() && *metadata.level() <= tracing::Level::INFO
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let target = event.metadata().target().to_string();

        RECORDER.with(|r| {
            let mut recorder = r.borrow_mut();
            let seq = recorder.next_seq;
            recorder.next_seq += 1;

            let table = recorder.tables.entry(target).or_default();
            let row = table.row_count;
            let mut visitor = RowVisitor {
                table: &mut *table,
                row,
            };
            if let TypedColumn::U64(v) = visitor.column(SEQ_COLUMN, || TypedColumn::U64(Vec::new())) {
                v.push(seq);
            }
            event.record(&mut visitor);

            table.row_count += 1;
            table.align();
        });
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

/// Install `DataFrameSubscriber` as the global default. Later calls are no-ops.
pub fn install_subscriber() {
    let _ = tracing::subscriber::set_global_default(DataFrameSubscriber);
}

/// Take everything recorded on this thread.
pub fn drain() -> Recorder {
    RECORDER.with(|r| std::mem::take(&mut *r.borrow_mut()))
}

pub fn clear() {
    RECORDER.with(|r| *r.borrow_mut() = Recorder::default());
}

// === Polars Integration ===

use polars::prelude::*;

impl EventTable {
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let columns: Vec<Column> = self
            .columns
            .iter()
            .map(|(name, col)| match col {
                TypedColumn::U64(v) => Column::new(name.into(), v),
                TypedColumn::I64(v) => Column::new(name.into(), v),
                TypedColumn::F64(v) => Column::new(name.into(), v),
                TypedColumn::Bool(v) => Column::new(name.into(), v),
                TypedColumn::Str(v) => Column::new(name.into(), v),
            })
            .collect();
        DataFrame::new(columns)
    }
}

impl Recorder {
    /// Tables that fail to convert are skipped.
    pub fn to_dataframes(&self) -> HashMap<String, DataFrame> {
        self.tables
            .iter()
            .filter_map(|(name, table)| table.to_dataframe().ok().map(|df| (name.clone(), df)))
            .collect()
    }
}

pub fn drain_to_dataframes() -> HashMap<String, DataFrame> {
    drain().to_dataframes()
}

fn io_err(e: std::io::Error) -> PolarsError {
    PolarsError::IO {
        error: e.into(),
        msg: None,
    }
}

/// Write each table to `{dir}/{name}.csv`.
pub fn save_csv(dfs: &mut HashMap<String, DataFrame>, dir: &Path) -> PolarsResult<()> {
    std::fs::create_dir_all(dir).map_err(io_err)?;
    for (name, df) in dfs.iter_mut() {
        let path = dir.join(format!("{name}.csv"));
        let mut file = std::fs::File::create(&path).map_err(io_err)?;
        CsvWriter::new(&mut file).include_header(true).finish(df)?;
    }
    Ok(())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(60)
        .collect()
}

/// Clears recorded data on creation and writes CSVs to `{parent}/{name}/` on drop.
///
/// ```ignore
/// let mut rec = instrument::ScopedRecorder::new("data", "seed_42");
/// // ... run simulation ...
/// let dfs = rec.get();
/// // rec drops → data/seed_42/{announce,bid,round,final_result,agent_state}.csv
/// ```
pub struct ScopedRecorder {
    run_dir: PathBuf,
    dfs: Option<HashMap<String, DataFrame>>,
    persist: bool,
}

impl ScopedRecorder {
    pub fn new(parent: impl Into<PathBuf>, name: &str) -> Self {
        clear();
        install_subscriber();
        Self {
            run_dir: parent.into().join(sanitize(name)),
            dfs: None,
            persist: true,
        }
    }

    /// Capture without writing anything on drop.
    pub fn in_memory() -> Self {
        clear();
        install_subscriber();
        Self {
            run_dir: PathBuf::new(),
            dfs: None,
            persist: false,
        }
    }

    /// Drain on first call; later calls return the cached frames.
    pub fn get(&mut self) -> &HashMap<String, DataFrame> {
        self.dfs.get_or_insert_with(drain_to_dataframes)
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}

impl Drop for ScopedRecorder {
    fn drop(&mut self) {
        let mut dfs = self.dfs.take().unwrap_or_else(drain_to_dataframes);
        if !self.persist || dfs.is_empty() {
            return;
        }
        match save_csv(&mut dfs, &self.run_dir) {
            Ok(()) => eprintln!(
                "ScopedRecorder: wrote {} tables to {}",
                dfs.len(),
                self.run_dir.display()
            ),
            Err(e) => eprintln!(
                "ScopedRecorder({}): failed to write csv: {e}",
                self.run_dir.display()
            ),
        }
    }
}
