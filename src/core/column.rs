//! Table columns: vectors tagged with a (level, index) coordinate

use crate::core::catalog::{AttrValue, ObjectKind};
use crate::core::dtype::{Dtype, Value};
use crate::core::error::{Result, StoreError};
use crate::core::object::{ObjectCore, OpenFlags, StorageObject};
use crate::core::store::SharedStore;
use crate::core::vector::Vector;

pub const ATTR_COLUMN_NAME: &str = "column-name";
pub const ATTR_COLUMN_LEVEL: &str = "column-level";
pub const ATTR_COLUMN_INDEX: &str = "column-index";

/// Vector name for the column at a coordinate
pub fn canonical_name(level: usize, index: usize) -> String {
    format!("col-{:03}-{:03}", level, index)
}

/// Reference to a column by position or by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Index(usize),
    Name(String),
}

impl From<usize> for ColumnRef {
    fn from(index: usize) -> Self {
        ColumnRef::Index(index)
    }
}

impl From<&str> for ColumnRef {
    fn from(name: &str) -> Self {
        ColumnRef::Name(name.to_string())
    }
}

impl From<String> for ColumnRef {
    fn from(name: String) -> Self {
        ColumnRef::Name(name)
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnRef::Index(i) => write!(f, "#{}", i),
            ColumnRef::Name(n) => write!(f, "'{}'", n),
        }
    }
}

/// One column of a table.
///
/// The staged value is what the next `write_level` appends; it keeps its
/// content after a write, so unchanged fields repeat.
pub struct Column {
    vector: Vector,
    level: usize,
    index: usize,
    name: String,
    staged: Value,
}

impl Column {
    /// Create (or replace) the column vector for a coordinate
    pub(crate) fn define(
        store: &SharedStore,
        table_path: &str,
        read_only: bool,
        level: usize,
        index: usize,
        name: &str,
        dtype: Dtype,
    ) -> Result<Column> {
        let mut vector = Vector::open(
            store,
            table_path,
            read_only,
            &canonical_name(level, index),
            Some(dtype),
            OpenFlags::REPLACE,
            None,
        )?;
        vector.set_attr(ATTR_COLUMN_NAME, name)?;
        vector.set_attr(ATTR_COLUMN_LEVEL, level)?;
        vector.set_attr(ATTR_COLUMN_INDEX, index)?;

        Ok(Column {
            vector,
            level,
            index,
            name: name.to_string(),
            staged: Value::zero(dtype),
        })
    }

    /// Rebuild a column from a reopened vector; `None` if it carries no coordinate
    pub(crate) fn from_vector(vector: Vector) -> Option<Column> {
        let name = vector.get_attr(ATTR_COLUMN_NAME).and_then(AttrValue::as_str)?.to_string();
        let level = vector.get_attr(ATTR_COLUMN_LEVEL).and_then(AttrValue::as_int)?;
        let index = vector.get_attr(ATTR_COLUMN_INDEX).and_then(AttrValue::as_int)?;
        let staged = Value::zero(vector.dtype());

        Some(Column {
            vector,
            level: usize::try_from(level).ok()?,
            index: usize::try_from(index).ok()?,
            name,
            staged,
        })
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> Dtype {
        self.vector.dtype()
    }

    /// Number of rows written
    pub fn rows(&self) -> u64 {
        self.vector.size()
    }

    pub fn vector(&self) -> &Vector {
        &self.vector
    }

    pub fn vector_mut(&mut self) -> &mut Vector {
        &mut self.vector
    }

    pub fn staged(&self) -> &Value {
        &self.staged
    }

    /// Stage a value for the next row, converting between numeric types
    pub(crate) fn stage(&mut self, value: Value) -> Result<()> {
        let dtype = self.dtype();
        let type_name = value.type_name();
        self.staged = value.coerce(dtype).ok_or_else(|| {
            StoreError::type_conflict(StorageObject::path(&self.vector), dtype, type_name)
        })?;
        Ok(())
    }

    /// Append the staged value
    pub(crate) fn commit(&mut self) -> Result<()> {
        self.vector.push_value(self.staged.clone())
    }
}

impl StorageObject for Column {
    fn core(&self) -> &ObjectCore {
        self.vector.core()
    }

    fn core_mut(&mut self) -> &mut ObjectCore {
        self.vector.core_mut()
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Vector
    }

    fn flush(&mut self) -> Result<()> {
        self.vector.flush()
    }

    fn close(&mut self) -> Result<()> {
        self.vector.close()
    }
}
