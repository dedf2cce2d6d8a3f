use std::{
    collections::HashMap,
    fmt,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use super::error::{EngineError, Result};

/// A decoded row: qualified column name (`table.column`) -> value.
pub type Row = HashMap<String, String>;

/// Extension of sheet files.
const SHEET_EXT: &str = "csv";

/// Field separator inside a sheet. Values never contain it (INSERT rejects
/// them), so sheets need no quoting.
const SEPARATOR: char = ',';

/// Index of a sheet within a table directory.
///
/// Sheets are numbered from 1 and stored as `<index>.csv`. Indices are never
/// reused or renumbered, even when deletes leave a sheet empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId(pub u64);

impl PageId {
    pub const FIRST: PageId = PageId(1);

    pub fn next(self) -> PageId {
        PageId(self.0 + 1)
    }

    pub fn file_name(self) -> String {
        format!("{}.{}", self.0, SHEET_EXT)
    }

    /// Parses a sheet file name, ignoring anything that is not `<n>.csv`
    /// with `n >= 1`.
    fn from_file_name(name: &str) -> Option<PageId> {
        let index = name.strip_suffix(SHEET_EXT)?.strip_suffix('.')?;
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        index.parse::<u64>().ok().filter(|&n| n > 0).map(PageId)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// In-memory image of one sheet file.
///
/// ## File Format
/// ```text
/// beer_pk,name,style      <- header: the table's columns, pk first
/// 1,Duvel,Belgian Ale     <- one line per row, values in column order
/// 2,Orval,Trappist
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sheet {
    /// Row values in column order
    pub records: Vec<Vec<String>>,
}

impl Sheet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Decodes sheet text, checking the header and every row against the
    /// table's columns.
    pub fn decode(text: &str, columns: &[String]) -> Result<Self> {
        let mut lines = text.lines();
        let header = lines
            .next()
            .ok_or_else(|| EngineError::ParseError("sheet has no header line".to_string()))?;
        if !header.split(SEPARATOR).eq(columns.iter().map(String::as_str)) {
            return Err(EngineError::ParseError(format!(
                "sheet header {:?} does not match columns {:?}",
                header, columns
            )));
        }

        let mut records = Vec::new();
        for (n, line) in lines.enumerate() {
            if line.is_empty() {
                return Err(EngineError::ParseError(format!("sheet row {} is blank", n + 1)));
            }
            let record: Vec<String> = line.split(SEPARATOR).map(str::to_string).collect();
            if record.len() != columns.len() {
                return Err(EngineError::ParseError(format!(
                    "sheet row {} has {} fields, expected {}",
                    n + 1,
                    record.len(),
                    columns.len()
                )));
            }
            records.push(record);
        }
        Ok(Self { records })
    }

    /// Encodes the sheet with its header line; every line ends with `\n`.
    pub fn encode(&self, columns: &[String]) -> String {
        let mut out = header_line(columns);
        for record in &self.records {
            out.push_str(&record_line(record));
        }
        out
    }
}

fn header_line(columns: &[String]) -> String {
    record_line(columns)
}

fn record_line(values: &[String]) -> String {
    let mut line = values.join(",");
    line.push('\n');
    line
}

/// On-disk storage of a single table.
///
/// ## Directory Layout
/// ```text
/// <root>/<database>/<table>/
///     1.csv, 2.csv, ...      sheets, each holding at most tuples_limit rows
///     <table>_pk_sequence    next primary key, decimal text, no newline
/// ```
///
/// `TableStorage` does no locking of its own. Callers hold the table's lock
/// from the lock manager for the whole statement.
#[derive(Clone, Debug)]
pub struct TableStorage {
    /// Table name
    pub name: String,
    /// Directory holding the table's sheets and pk sequence
    pub dir: PathBuf,
    /// Physical columns, pk column first
    pub columns: Vec<String>,
    /// `columns` qualified with the table name, used as row keys
    qualified: Vec<String>,
}

impl TableStorage {
    /// Opens the table in `database_dir`, creating whatever is missing.
    ///
    /// Creates the table directory, the first sheet (header only) and the pk
    /// sequence initialized to 1. Anything that already exists is left
    /// untouched, so reopening a table after a restart keeps its data.
    pub fn open(database_dir: &Path, name: &str, columns: Vec<String>) -> Result<Self> {
        let qualified = columns.iter().map(|c| format!("{name}.{c}")).collect();
        let storage = Self {
            name: name.to_string(),
            dir: database_dir.join(name),
            columns,
            qualified,
        };
        storage.create()?;
        Ok(storage)
    }

    fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(EngineError::io(&self.dir))?;

        let first = self.page_path(PageId::FIRST);
        if first.exists() {
            debug!(table = %self.name, path = %first.display(), "sheet already exists");
        } else {
            write_atomic(&first, &header_line(&self.columns))?;
        }

        let pk_path = self.pk_path();
        if pk_path.exists() {
            debug!(table = %self.name, path = %pk_path.display(), "pk sequence already exists");
        } else {
            write_atomic(&pk_path, "1")?;
        }
        Ok(())
    }

    /// Drops every row and resets the pk sequence by recreating the table
    /// directory from scratch.
    pub fn reset(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(EngineError::io(&self.dir)(e)),
        }
        self.create()?;
        info!(table = %self.name, "table recreated");
        Ok(())
    }

    pub fn page_path(&self, pid: PageId) -> PathBuf {
        self.dir.join(pid.file_name())
    }

    pub fn pk_path(&self) -> PathBuf {
        self.dir.join(format!("{}_pk_sequence", self.name))
    }

    /// Lists the table's sheets in index order.
    pub fn pages(&self) -> Result<Vec<PageId>> {
        let entries = fs::read_dir(&self.dir).map_err(EngineError::io(&self.dir))?;
        let mut pages = Vec::new();
        for entry in entries {
            let entry = entry.map_err(EngineError::io(&self.dir))?;
            let is_file = entry
                .file_type()
                .map_err(EngineError::io(entry.path()))?
                .is_file();
            if let Some(pid) = entry.file_name().to_str().and_then(PageId::from_file_name) {
                if is_file {
                    pages.push(pid);
                }
            }
        }
        pages.sort_unstable();
        Ok(pages)
    }

    pub fn read_page(&self, pid: PageId) -> Result<Sheet> {
        let path = self.page_path(pid);
        let text = fs::read_to_string(&path).map_err(EngineError::io(&path))?;
        Sheet::decode(&text, &self.columns).map_err(|e| match e {
            EngineError::ParseError(msg) => {
                EngineError::ParseError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Replaces a sheet with `sheet`. The new content becomes visible all at
    /// once: either the old or the new sheet is on disk, never a mix.
    pub fn write_page(&self, pid: PageId, sheet: &Sheet) -> Result<()> {
        write_atomic(&self.page_path(pid), &sheet.encode(&self.columns))
    }

    /// Returns every sheet with its index, in order.
    pub fn scan(&self) -> Result<Vec<(PageId, Sheet)>> {
        self.pages()?
            .into_iter()
            .map(|pid| Ok((pid, self.read_page(pid)?)))
            .collect()
    }

    /// Decodes every row of the table, sheet by sheet.
    pub fn rows(&self) -> Result<Vec<Row>> {
        let mut out = Vec::new();
        for (_pid, sheet) in self.scan()? {
            out.extend(sheet.records.iter().map(|r| self.qualify(r)));
        }
        Ok(out)
    }

    /// Turns a record into a row keyed by qualified column names.
    pub fn qualify(&self, record: &[String]) -> Row {
        self.qualified
            .iter()
            .cloned()
            .zip(record.iter().cloned())
            .collect()
    }

    pub fn read_pk_sequence(&self) -> Result<u64> {
        let path = self.pk_path();
        let text = fs::read_to_string(&path).map_err(EngineError::io(&path))?;
        text.trim().parse().map_err(|_| {
            EngineError::ParseError(format!(
                "pk sequence {} holds {:?}, not a number",
                path.display(),
                text
            ))
        })
    }

    fn store_pk_sequence(&self, next: u64) -> Result<()> {
        write_atomic(&self.pk_path(), &next.to_string())
    }

    /// Appends a row built from the next pk and `values`, returning the pk.
    ///
    /// The row goes to the first sheet holding fewer than `tuples_limit`
    /// rows; when every sheet is full a new sheet is started after the last
    /// one. The pk sequence only advances once the row is written.
    pub fn append_row(&self, tuples_limit: usize, values: Vec<String>) -> Result<u64> {
        let pk = self.read_pk_sequence()?;
        let mut record = Vec::with_capacity(values.len() + 1);
        record.push(pk.to_string());
        record.extend(values);

        let pages = self.pages()?;
        let mut target = None;
        for &pid in &pages {
            if self.read_page(pid)?.len() < tuples_limit {
                target = Some(pid);
                break;
            }
        }

        match target {
            Some(pid) => self.append_line(pid, &record)?,
            None => {
                let pid = pages.last().map_or(PageId::FIRST, |last| last.next());
                info!(table = %self.name, page = %pid, "starting new sheet");
                let sheet = Sheet {
                    records: vec![record],
                };
                self.write_page(pid, &sheet)?;
            }
        }

        self.store_pk_sequence(pk + 1)?;
        Ok(pk)
    }

    fn append_line(&self, pid: PageId, record: &[String]) -> Result<()> {
        let path = self.page_path(pid);
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(EngineError::io(&path))?;
        file.write_all(record_line(record).as_bytes())
            .map_err(EngineError::io(&path))
    }

    /// Removes the rows for which `matches` returns true, sheet by sheet.
    ///
    /// Each sheet keeps its surviving rows in their original order; sheets
    /// are never merged. Returns the number of rows removed.
    pub fn delete_where(&self, mut matches: impl FnMut(&Row) -> bool) -> Result<usize> {
        let mut removed = 0usize;
        for (pid, sheet) in self.scan()? {
            let before = sheet.len();
            let kept = Sheet {
                records: sheet
                    .records
                    .into_iter()
                    .filter(|r| !matches(&self.qualify(r)))
                    .collect(),
            };
            if kept.len() != before {
                self.write_page(pid, &kept)?;
                removed += before - kept.len();
            }
        }
        Ok(removed)
    }
}

/// Writes `contents` to a temporary sibling and renames it over `path`.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents).map_err(EngineError::io(&tmp))?;
    fs::rename(&tmp, path).map_err(EngineError::io(path))
}
