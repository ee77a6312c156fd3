//! Hierarchical tables
//!
//! A table groups columns into levels. Each `write_level(l)` appends one
//! row to every column of level `l`. With more than one level, a line
//! index (two int vectors, `line-level` and `line-row`) records the global
//! order of rows so a reader can replay the interleaving: line `n` is row
//! `line-row[n]` of level `line-level[n]`. Single-level tables need no
//! index; the line number is the row number.
//!
//! # Examples
//!
//! ```rust,no_run
//! use chipstore::{Dtype, OpenFlags, StoreFile};
//!
//! let mut file = StoreFile::open("report.cst", OpenFlags::REPLACE)?;
//! let table = file.open_table("probesets", OpenFlags::CREATE)?;
//! table.define_column(0, 0, "probeset_id", Dtype::Int)?;
//! table.define_column(1, 0, "intensity", Dtype::Double)?;
//!
//! table.set_int(0, "probeset_id", 100)?;
//! table.write_level(0)?;
//! for value in [1.5, 2.5] {
//!     table.set_double(1, "intensity", value)?;
//!     table.write_level(1)?;
//! }
//!
//! table.rewind();
//! while table.next_line()? {
//!     let level = table.line_level()?;
//!     println!("{} {}", level, table.get_as_string(level, 0usize)?);
//! }
//! # Ok::<(), chipstore::StoreError>(())
//! ```

use crate::core::buffer::Element;
use crate::core::catalog::{join_path, validate_name, ObjectKind, ObjectMeta};
use crate::core::column::{Column, ColumnRef};
use crate::core::dtype::{Dtype, Value};
use crate::core::error::{Result, StoreError};
use crate::core::headers::HeaderList;
use crate::core::object::{close_on_drop, resolve, ObjectCore, OpenFlags, Resolution, StorageObject};
use crate::core::store::SharedStore;
use crate::core::vector::Vector;
use tracing::debug;

pub const LINE_LEVEL: &str = "line-level";
pub const LINE_ROW: &str = "line-row";

pub struct Table {
    core: ObjectCore,
    levels: Vec<Vec<Option<Column>>>,
    level_rows: Vec<u64>,
    line_level: Option<Vector>,
    line_row: Option<Vector>,
    /// Current line; `None` before the first `next_line`
    cursor: Option<u64>,
    headers: HeaderList,
}

impl Table {
    pub(crate) fn open(
        store: &SharedStore,
        parent_path: &str,
        parent_read_only: bool,
        name: &str,
        flags: OpenFlags,
    ) -> Result<Table> {
        validate_name(name)?;
        let path = join_path(parent_path, name);
        let read_only = parent_read_only || flags.contains(OpenFlags::READONLY);

        let (id, existing, headers) = {
            let mut guard = store.lock();
            match resolve(&mut guard, &path, ObjectKind::Table, flags, read_only)? {
                Resolution::Existing(id) => {
                    let children = guard.catalog().children(&path);
                    (id, children, HeaderList::load(&guard, id)?)
                }
                Resolution::Create => {
                    let id = guard
                        .catalog_mut()
                        .insert(&path, ObjectMeta::new(ObjectKind::Table))?;
                    debug!("Created table {}", path);
                    (id, Vec::new(), HeaderList::default())
                }
            }
        };

        let mut table = Table {
            core: ObjectCore::new(store.clone(), id, path, read_only)?,
            levels: Vec::new(),
            level_rows: Vec::new(),
            line_level: None,
            line_row: None,
            cursor: None,
            headers,
        };

        for (child, _) in existing {
            let vector = Vector::open(store, table.core.path(), read_only, &child, None, OpenFlags::OPEN, None)?;
            match child.as_str() {
                LINE_LEVEL => table.line_level = Some(vector),
                LINE_ROW => table.line_row = Some(vector),
                _ => match Column::from_vector(vector) {
                    Some(column) => {
                        let (level, index) = (column.level(), column.index());
                        *table.slot_mut(level, index) = Some(column);
                    }
                    None => debug!("Skipping non-column vector {} in {}", child, table.core.path()),
                },
            }
        }
        table.level_rows = table
            .levels
            .iter()
            .map(|columns| columns.iter().flatten().map(Column::rows).max().unwrap_or(0))
            .collect();
        Ok(table)
    }

    /// Create or replace the column at `(level, index)`
    pub fn define_column(&mut self, level: usize, index: usize, name: &str, dtype: Dtype) -> Result<()> {
        self.core.check_writable()?;
        if name.is_empty() {
            return Err(StoreError::InvalidState("column name must not be empty".to_string()));
        }
        let clash = self.levels.get(level).and_then(|columns| {
            columns
                .iter()
                .flatten()
                .find(|c| c.name() == name && c.index() != index)
                .map(Column::index)
        });
        if let Some(other) = clash {
            return Err(StoreError::InvalidState(format!(
                "column '{}' already defined at level {} index {}",
                name, level, other
            )));
        }

        if let Some(mut old) = self.slot_mut(level, index).take() {
            old.close()?;
        }
        let mut column = Column::define(
            self.core.store(),
            self.core.path(),
            self.core.is_read_only(),
            level,
            index,
            name,
            dtype,
        )?;

        // Keep row counts equal within the level
        if self.level_rows.len() <= level {
            self.level_rows.resize(level + 1, 0);
        }
        let rows = self.level_rows[level];
        if rows > 0 {
            column.vector_mut().resize(rows)?;
            column.vector_mut().set_fill_index(rows)?;
        }
        *self.slot_mut(level, index) = Some(column);

        if self.levels.len() > 1 {
            self.ensure_line_index()?;
        }
        Ok(())
    }

    /// Define a string column; `width: None` stores variable-length strings
    pub fn define_string_column(&mut self, level: usize, index: usize, name: &str, width: Option<u32>) -> Result<()> {
        let dtype = match width {
            Some(w) if w > 0 => Dtype::FixedString(w),
            Some(_) => {
                return Err(StoreError::InvalidState(format!(
                    "string column '{}' needs a positive width",
                    name
                )))
            }
            None => Dtype::VarString,
        };
        self.define_column(level, index, name, dtype)
    }

    /// Replicate the column layout of another table
    pub fn copy_format(&mut self, other: &Table) -> Result<()> {
        for column in other.levels.iter().flatten().flatten() {
            self.define_column(column.level(), column.index(), column.name(), column.dtype())?;
        }
        Ok(())
    }

    /// Stage a value for the next `write_level` of `level`
    pub fn set_value(&mut self, level: usize, column: impl Into<ColumnRef>, value: impl Into<Value>) -> Result<()> {
        self.core.check_writable()?;
        let index = self.locate(level, &column.into())?;
        self.column_at_mut(level, index)?.stage(value.into())
    }

    pub fn set_char(&mut self, level: usize, column: impl Into<ColumnRef>, value: i8) -> Result<()> {
        self.set_value(level, column, value)
    }

    pub fn set_short(&mut self, level: usize, column: impl Into<ColumnRef>, value: i16) -> Result<()> {
        self.set_value(level, column, value)
    }

    pub fn set_int(&mut self, level: usize, column: impl Into<ColumnRef>, value: i32) -> Result<()> {
        self.set_value(level, column, value)
    }

    pub fn set_float(&mut self, level: usize, column: impl Into<ColumnRef>, value: f32) -> Result<()> {
        self.set_value(level, column, value)
    }

    pub fn set_double(&mut self, level: usize, column: impl Into<ColumnRef>, value: f64) -> Result<()> {
        self.set_value(level, column, value)
    }

    pub fn set_string(&mut self, level: usize, column: impl Into<ColumnRef>, value: &str) -> Result<()> {
        self.set_value(level, column, value)
    }

    /// Commit the staged values of `level` as one row
    pub fn write_level(&mut self, level: usize) -> Result<()> {
        self.core.check_writable()?;
        let defined = self
            .levels
            .get(level)
            .map(|columns| columns.iter().any(Option::is_some))
            .unwrap_or(false);
        if !defined {
            return Err(StoreError::ColumnNotFound(format!("no columns at level {}", level)));
        }

        let row = self.level_rows[level];
        if let (Some(levels), Some(rows)) = (self.line_level.as_mut(), self.line_row.as_mut()) {
            levels.push_back(to_i32(level as u64)?)?;
            rows.push_back(to_i32(row)?)?;
        }
        for column in self.levels[level].iter_mut().flatten() {
            column.commit()?;
        }
        self.level_rows[level] = row + 1;
        Ok(())
    }

    /// Number of levels (highest defined level + 1)
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Number of columns defined at `level`
    pub fn column_count(&self, level: usize) -> usize {
        self.levels
            .get(level)
            .map(|columns| columns.iter().flatten().count())
            .unwrap_or(0)
    }

    /// Rows written at `level`
    pub fn row_count(&self, level: usize) -> u64 {
        self.level_rows.get(level).copied().unwrap_or(0)
    }

    /// Index of the column named `name` at `level`
    pub fn column_index(&self, level: usize, name: &str) -> Result<usize> {
        self.locate(level, &ColumnRef::from(name))
    }

    pub fn column_name(&self, level: usize, index: usize) -> Result<&str> {
        Ok(self.column(level, index)?.name())
    }

    pub fn column_dtype(&self, level: usize, index: usize) -> Result<Dtype> {
        Ok(self.column(level, index)?.dtype())
    }

    pub fn column(&self, level: usize, column: impl Into<ColumnRef>) -> Result<&Column> {
        let index = self.locate(level, &column.into())?;
        self.levels[level][index]
            .as_ref()
            .ok_or_else(|| StoreError::ColumnNotFound(format!("level {} index {}", level, index)))
    }

    /// Columns of `level` in index order
    pub fn columns(&self, level: usize) -> impl Iterator<Item = &Column> {
        self.levels.get(level).into_iter().flatten().flatten()
    }

    /// Total number of lines across all levels
    pub fn line_count(&self) -> u64 {
        match &self.line_level {
            Some(index) => index.size(),
            None => self.row_count(0),
        }
    }

    /// Position the cursor before the first line
    pub fn rewind(&mut self) {
        self.cursor = None;
    }

    /// Advance to the next line; false once the table is exhausted
    pub fn next_line(&mut self) -> Result<bool> {
        self.core.check_open()?;
        let total = self.line_count();
        let next = self.cursor.map_or(0, |line| line + 1).min(total);
        self.cursor = Some(next);
        Ok(next < total)
    }

    /// Current line number, if positioned on a line
    pub fn line_num(&self) -> Option<u64> {
        self.cursor.filter(|&line| line < self.line_count())
    }

    pub fn goto_line(&mut self, line: u64) -> Result<()> {
        let total = self.line_count();
        if line >= total {
            return Err(StoreError::out_of_bounds(line, total));
        }
        self.cursor = Some(line);
        Ok(())
    }

    /// Level of the current line
    pub fn line_level(&mut self) -> Result<usize> {
        let line = self.current_line()?;
        match self.line_level.as_mut() {
            Some(index) => Ok(index.get::<i32>(line)? as usize),
            None => Ok(0),
        }
    }

    /// Read a column of the current line
    pub fn get<T: Element>(&mut self, level: usize, column: impl Into<ColumnRef>) -> Result<T> {
        let index = self.locate(level, &column.into())?;
        let row = self.current_row(level)?;
        self.column_at_mut(level, index)?.vector_mut().get::<T>(row)
    }

    pub fn get_value(&mut self, level: usize, column: impl Into<ColumnRef>) -> Result<Value> {
        let index = self.locate(level, &column.into())?;
        let row = self.current_row(level)?;
        self.column_at_mut(level, index)?.vector_mut().get_value(row)
    }

    pub fn get_as_string(&mut self, level: usize, column: impl Into<ColumnRef>) -> Result<String> {
        Ok(self.get_value(level, column)?.to_string())
    }

    /// Advance to the next line of `level` whose column renders as `value`.
    ///
    /// The scan includes the current line, or starts at the first line when
    /// the cursor is rewound, and is linear in the number of lines. A match
    /// leaves the cursor on it, so call `next_line` before searching again.
    /// Returns false and leaves the cursor at the end when nothing matches.
    pub fn find_first(&mut self, level: usize, column: impl Into<ColumnRef>, value: &str) -> Result<bool> {
        let index = self.locate(level, &column.into())?;
        self.core.check_open()?;
        let total = self.line_count();
        let start = self.cursor.unwrap_or(0).min(total);
        for line in start..total {
            self.cursor = Some(line);
            if self.line_level()? != level {
                continue;
            }
            if self.get_as_string(level, index)? == value {
                return Ok(true);
            }
        }
        self.cursor = Some(total);
        Ok(false)
    }

    /// Resize every column of a single-level table
    pub fn resize(&mut self, rows: u64) -> Result<()> {
        self.core.check_writable()?;
        if self.levels.len() > 1 {
            return Err(StoreError::UnsupportedOperation(format!(
                "resize of multi-level table {} ({} levels)",
                self.core.path(),
                self.levels.len()
            )));
        }
        for column in self.levels.iter_mut().flatten().flatten() {
            column.vector_mut().resize(rows)?;
            column.vector_mut().set_fill_index(rows)?;
        }
        if let Some(count) = self.level_rows.first_mut() {
            *count = rows;
        }
        Ok(())
    }

    pub fn add_header(&mut self, key: &str, value: &str) -> Result<()> {
        self.core.check_writable()?;
        self.headers.add(key, value);
        Ok(())
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.first(key)
    }

    pub fn get_headers(&self, key: &str) -> Vec<&str> {
        self.headers.all(key)
    }

    pub fn headers(&self) -> &[(String, String)] {
        self.headers.entries()
    }

    pub fn headers_begin(&mut self) {
        self.headers.begin();
    }

    pub fn headers_next(&mut self) -> Option<(String, String)> {
        self.headers.next_pair()
    }

    fn slot_mut(&mut self, level: usize, index: usize) -> &mut Option<Column> {
        if self.levels.len() <= level {
            self.levels.resize_with(level + 1, Vec::new);
        }
        let columns = &mut self.levels[level];
        if columns.len() <= index {
            columns.resize_with(index + 1, || None);
        }
        &mut columns[index]
    }

    fn locate(&self, level: usize, column: &ColumnRef) -> Result<usize> {
        let columns = self
            .levels
            .get(level)
            .ok_or_else(|| StoreError::ColumnNotFound(format!("level {} of {}", level, self.core.path())))?;
        let found = match column {
            ColumnRef::Index(i) => columns.get(*i).and_then(Option::as_ref).map(|_| *i),
            ColumnRef::Name(name) => columns.iter().flatten().find(|c| c.name() == name).map(Column::index),
        };
        found.ok_or_else(|| {
            StoreError::ColumnNotFound(format!("{} at level {} of {}", column, level, self.core.path()))
        })
    }

    fn column_at_mut(&mut self, level: usize, index: usize) -> Result<&mut Column> {
        self.levels
            .get_mut(level)
            .and_then(|columns| columns.get_mut(index))
            .and_then(Option::as_mut)
            .ok_or_else(|| StoreError::ColumnNotFound(format!("level {} index {}", level, index)))
    }

    fn current_line(&self) -> Result<u64> {
        self.line_num().ok_or_else(|| {
            StoreError::InvalidState(format!("no current line in {}", self.core.path()))
        })
    }

    /// Column-local row of the current line, which must belong to `level`
    fn current_row(&mut self, level: usize) -> Result<u64> {
        let line = self.current_line()?;
        let found = self.line_level()?;
        if found != level {
            return Err(StoreError::InvalidState(format!(
                "line {} of {} is at level {}, not {}",
                line,
                self.core.path(),
                found,
                level
            )));
        }
        match self.line_row.as_mut() {
            Some(rows) => Ok(rows.get::<i32>(line)? as u64),
            None => Ok(line),
        }
    }

    /// Open the line index, back-filling rows written before it existed
    fn ensure_line_index(&mut self) -> Result<()> {
        if self.line_level.is_some() && self.line_row.is_some() {
            return Ok(());
        }
        let store = self.core.store().clone();
        let (path, ro) = (self.core.path().to_string(), self.core.is_read_only());
        let mut levels = Vector::open(&store, &path, ro, LINE_LEVEL, Some(Dtype::Int), OpenFlags::OPEN_OR_CREATE, None)?;
        let mut rows = Vector::open(&store, &path, ro, LINE_ROW, Some(Dtype::Int), OpenFlags::OPEN_OR_CREATE, None)?;

        if levels.is_empty() {
            for (level, &count) in self.level_rows.iter().enumerate() {
                for row in 0..count {
                    levels.push_back(to_i32(level as u64)?)?;
                    rows.push_back(to_i32(row)?)?;
                }
            }
            debug!("Line index of {} started with {} lines", path, levels.size());
        }
        self.line_level = Some(levels);
        self.line_row = Some(rows);
        Ok(())
    }

    fn close_inner(&mut self) -> Result<()> {
        let mut first_error = None;
        for column in self.levels.iter_mut().flatten().flatten() {
            if let Err(e) = column.close() {
                first_error.get_or_insert(e);
            }
        }
        for vector in self.line_level.iter_mut().chain(self.line_row.iter_mut()) {
            if let Err(e) = vector.close() {
                first_error.get_or_insert(e);
            }
        }

        let shared = self.core.store().clone();
        let mut store = shared.lock();
        if !self.core.is_read_only() {
            self.headers.flush(&mut store, self.core.id())?;
        }
        self.core.flush_attrs(&mut store)?;
        first_error.map_or(Ok(()), Err)
    }
}

fn to_i32(value: u64) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::out_of_bounds(value, i32::MAX as u64))
}

impl StorageObject for Table {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ObjectCore {
        &mut self.core
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Table
    }

    fn flush(&mut self) -> Result<()> {
        if !self.core.is_open() {
            return Ok(());
        }
        for column in self.levels.iter_mut().flatten().flatten() {
            column.flush()?;
        }
        for vector in self.line_level.iter_mut().chain(self.line_row.iter_mut()) {
            vector.flush()?;
        }
        let shared = self.core.store().clone();
        let mut store = shared.lock();
        if !self.core.is_read_only() {
            self.headers.flush(&mut store, self.core.id())?;
        }
        self.core.flush_attrs(&mut store)
    }

    fn close(&mut self) -> Result<()> {
        if !self.core.is_open() {
            return Ok(());
        }
        let result = self.close_inner();
        self.core.mark_closed();
        result
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        close_on_drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::ROOT_PATH;
    use crate::core::io::CreateMode;
    use crate::core::store::{Store, StoreOptions};
    use tempfile::TempDir;

    fn shared(dir: &TempDir) -> SharedStore {
        Store::create(dir.path().join("t.cst"), CreateMode::Truncate, StoreOptions::default())
            .unwrap()
            .shared()
    }

    fn open(store: &SharedStore, flags: OpenFlags) -> Table {
        Table::open(store, ROOT_PATH, false, "t", flags).unwrap()
    }

    #[test]
    fn test_single_level_rows() {
        let dir = TempDir::new().unwrap();
        let store = shared(&dir);
        let mut table = open(&store, OpenFlags::CREATE);
        table.define_column(0, 0, "name", Dtype::VarString).unwrap();
        table.define_column(0, 1, "count", Dtype::Int).unwrap();

        for (name, count) in [("a", 1), ("b", 2), ("c", 3)] {
            table.set_string(0, "name", name).unwrap();
            table.set_int(0, 1usize, count).unwrap();
            table.write_level(0).unwrap();
        }
        assert_eq!(table.line_count(), 3);
        assert!(table.line_level.is_none());

        table.rewind();
        let mut seen = Vec::new();
        while table.next_line().unwrap() {
            assert_eq!(table.line_level().unwrap(), 0);
            seen.push((table.get::<String>(0, "name").unwrap(), table.get::<i32>(0, "count").unwrap()));
        }
        assert_eq!(seen, vec![("a".into(), 1), ("b".into(), 2), ("c".into(), 3)]);
        assert!(!table.next_line().unwrap());
    }

    #[test]
    fn test_unknown_columns() {
        let dir = TempDir::new().unwrap();
        let store = shared(&dir);
        let mut table = open(&store, OpenFlags::CREATE);
        table.define_column(0, 0, "id", Dtype::Int).unwrap();

        assert!(matches!(table.set_int(0, "nope", 1), Err(StoreError::ColumnNotFound(_))));
        assert!(matches!(table.set_int(3, 0usize, 1), Err(StoreError::ColumnNotFound(_))));
        assert!(matches!(table.write_level(2), Err(StoreError::ColumnNotFound(_))));
        assert!(matches!(table.column_name(0, 4), Err(StoreError::ColumnNotFound(_))));
        assert!(matches!(
            table.define_column(0, 1, "id", Dtype::Int),
            Err(StoreError::InvalidState(_))
        ));
    }

    #[test]
    fn test_redefine_replaces_column() {
        let dir = TempDir::new().unwrap();
        let store = shared(&dir);
        let mut table = open(&store, OpenFlags::CREATE);
        table.define_column(0, 0, "v", Dtype::Int).unwrap();
        table.set_int(0, 0usize, 5).unwrap();
        table.write_level(0).unwrap();

        table.define_column(0, 0, "v", Dtype::Double).unwrap();
        assert_eq!(table.column_dtype(0, 0).unwrap(), Dtype::Double);
        // The replacement is padded to the rows already in the level
        assert_eq!(table.column(0, 0usize).unwrap().rows(), 1);
        assert_eq!(table.column_count(0), 1);
    }

    #[test]
    fn test_multi_level_resize_rejected() {
        let dir = TempDir::new().unwrap();
        let store = shared(&dir);
        let mut table = open(&store, OpenFlags::CREATE);
        table.define_column(0, 0, "a", Dtype::Int).unwrap();
        for i in 0..4 {
            table.set_int(0, 0usize, i).unwrap();
            table.write_level(0).unwrap();
        }
        table.resize(2).unwrap();
        assert_eq!(table.line_count(), 2);

        table.define_column(1, 0, "b", Dtype::Int).unwrap();
        assert!(matches!(table.resize(1), Err(StoreError::UnsupportedOperation(_))));

        // Rows written before the second level exist are back-filled
        assert_eq!(table.line_count(), 2);
        table.goto_line(1).unwrap();
        assert_eq!(table.line_level().unwrap(), 0);
        assert_eq!(table.get::<i32>(0, "a").unwrap(), 1);
    }

    #[test]
    fn test_find_first_scans_forward() {
        let dir = TempDir::new().unwrap();
        let store = shared(&dir);
        let mut table = open(&store, OpenFlags::CREATE);
        table.define_column(0, 0, "id", Dtype::Int).unwrap();
        table.define_column(1, 0, "tag", Dtype::FixedString(8)).unwrap();

        for (id, tags) in [(1, vec!["x", "y"]), (2, vec!["y"]), (3, vec![])] {
            table.set_int(0, "id", id).unwrap();
            table.write_level(0).unwrap();
            for tag in tags {
                table.set_string(1, "tag", tag).unwrap();
                table.write_level(1).unwrap();
            }
        }

        table.rewind();
        assert!(table.find_first(1, "tag", "y").unwrap());
        assert_eq!(table.line_num(), Some(2));
        // The current line is part of the scan
        assert!(table.find_first(1, "tag", "y").unwrap());
        assert_eq!(table.line_num(), Some(2));
        assert!(table.next_line().unwrap());
        assert!(table.find_first(1, "tag", "y").unwrap());
        assert_eq!(table.line_num(), Some(4));
        assert!(table.next_line().unwrap());
        assert!(!table.find_first(1, "tag", "y").unwrap());
        assert_eq!(table.line_num(), None);

        table.goto_line(1).unwrap();
        assert!(table.find_first(1, "tag", "x").unwrap());
        assert_eq!(table.line_num(), Some(1));

        table.rewind();
        assert!(table.find_first(0, 0usize, "3").unwrap());
        assert_eq!(table.line_num(), Some(5));
        assert!(matches!(
            table.find_first(0, "missing", "3"),
            Err(StoreError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_level_mismatch_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = shared(&dir);
        let mut table = open(&store, OpenFlags::CREATE);
        table.define_column(0, 0, "id", Dtype::Int).unwrap();
        table.define_column(1, 0, "val", Dtype::Double).unwrap();
        table.set_int(0, 0usize, 7).unwrap();
        table.write_level(0).unwrap();

        assert!(matches!(table.get::<i32>(0, 0usize), Err(StoreError::InvalidState(_))));
        table.rewind();
        table.next_line().unwrap();
        assert!(matches!(table.get::<f64>(1, 0usize), Err(StoreError::InvalidState(_))));
        assert_eq!(table.get::<i32>(0, 0usize).unwrap(), 7);
    }

    #[test]
    fn test_reopen_restores_schema_and_counters() {
        let dir = TempDir::new().unwrap();
        let store = shared(&dir);
        {
            let mut table = open(&store, OpenFlags::CREATE);
            table.define_column(0, 0, "id", Dtype::Int).unwrap();
            table.define_column(1, 0, "val", Dtype::Float).unwrap();
            table.add_header("source", "unit-test").unwrap();
            table.set_int(0, 0usize, 1).unwrap();
            table.write_level(0).unwrap();
            table.set_float(1, 0usize, 0.5).unwrap();
            table.write_level(1).unwrap();
            table.close().unwrap();
            table.close().unwrap();
        }

        let mut table = open(&store, OpenFlags::OPEN);
        assert_eq!(table.level_count(), 2);
        assert_eq!(table.column_name(1, 0).unwrap(), "val");
        assert_eq!(table.row_count(0), 1);
        assert_eq!(table.line_count(), 2);
        assert_eq!(table.get_header("source"), Some("unit-test"));

        table.set_int(0, 0usize, 2).unwrap();
        table.write_level(0).unwrap();
        table.goto_line(2).unwrap();
        assert_eq!(table.get::<i32>(0, "id").unwrap(), 2);

        let mut copy = Table::open(&store, ROOT_PATH, false, "copy", OpenFlags::CREATE).unwrap();
        copy.copy_format(&table).unwrap();
        assert_eq!(copy.column_dtype(1, 0).unwrap(), Dtype::Float);
        assert_eq!(copy.line_count(), 0);
    }
}
