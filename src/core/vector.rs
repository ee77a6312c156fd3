//! Buffered, resizable typed vectors
//!
//! A vector keeps one window of at most `chunk_size()` elements in memory.
//! Element access outside the window flushes the window if it is dirty and
//! reloads it at the requested index. Bulk `read_array`/`write_array`
//! transfers go straight to the store after flushing the window.
//!
//! Three lengths describe a vector:
//! - `size()`: elements filled by appends (`push_back` writes here)
//! - `reserved()`: logical length; indices below it are addressable
//! - `file_len()`: elements committed to the store
//!
//! `size() <= reserved()` always holds. A flush commits at least
//! `reserved()` elements, and `close()` truncates the committed length back
//! to `reserved()`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use chipstore::{Dtype, OpenFlags, StoreFile};
//!
//! let mut file = StoreFile::open("scores.cst", OpenFlags::REPLACE)?;
//! let scores = file.open_vector("scores", Some(Dtype::Float), OpenFlags::CREATE)?;
//! for i in 0..10_000 {
//!     scores.push_back(i as f32 * 0.5)?;
//! }
//! assert_eq!(scores.get::<f32>(9_999)?, 4999.5);
//! file.close()?;
//! # Ok::<(), chipstore::StoreError>(())
//! ```

use crate::core::buffer::{Buffer, Element};
use crate::core::catalog::{join_path, validate_name, ObjectKind, ObjectMeta};
use crate::core::dtype::{Dtype, Value, VAR_STRING_SLOT};
use crate::core::error::{Result, StoreError};
use crate::core::object::{close_on_drop, resolve, ObjectCore, OpenFlags, Resolution, StorageObject};
use crate::core::store::{SharedStore, Store, StreamKind};
use std::ops::Range;
use tracing::debug;

pub struct Vector {
    core: ObjectCore,
    dtype: Dtype,
    size: u64,
    reserved: u64,
    file_len: u64,
    chunk: u64,
    window: Buffer,
    win_start: u64,
    win_end: u64,
    dirty: bool,
    /// Indices stored into the window since the last flush
    dirty_slots: Range<u64>,
    /// Heap bytes of overwritten variable-length strings are unreferenced
    heap_stale: bool,
}

impl Vector {
    /// Open a vector named `name` inside the container at `parent_path`.
    ///
    /// `dtype` may be `None` only when opening an existing vector.
    pub(crate) fn open(
        store: &SharedStore,
        parent_path: &str,
        parent_read_only: bool,
        name: &str,
        dtype: Option<Dtype>,
        flags: OpenFlags,
        chunk: Option<u64>,
    ) -> Result<Vector> {
        validate_name(name)?;
        let path = join_path(parent_path, name);
        let read_only = parent_read_only || flags.contains(OpenFlags::READONLY);

        let mut guard = store.lock();
        let (id, dtype, size, len, stored_chunk) =
            match resolve(&mut guard, &path, ObjectKind::Vector, flags, read_only)? {
                Resolution::Existing(id) => {
                    let meta = guard.object(id)?;
                    let stored = meta.dtype.ok_or_else(|| {
                        StoreError::InvalidState(format!("vector '{}' has no element type", path))
                    })?;
                    if let Some(requested) = dtype {
                        if requested != stored {
                            return Err(StoreError::type_conflict(&path, stored, requested));
                        }
                    }
                    (id, stored, meta.fill, meta.len, meta.chunk)
                }
                Resolution::Create => {
                    let dtype = dtype.ok_or_else(|| {
                        StoreError::InvalidState(format!(
                            "an element type is required to create '{}'",
                            path
                        ))
                    })?;
                    let chunk = chunk.unwrap_or_else(|| guard.options().default_window(dtype.width()));
                    let id = guard
                        .catalog_mut()
                        .insert(&path, ObjectMeta::vector(dtype, chunk))?;
                    debug!("Created vector {} ({}, window {})", path, dtype, chunk);
                    (id, dtype, 0, 0, chunk)
                }
            };
        let default_chunk = guard.options().default_window(dtype.width());
        drop(guard);

        let chunk = chunk
            .or(Some(stored_chunk).filter(|c| *c > 0))
            .unwrap_or(default_chunk)
            .max(1);

        Ok(Vector {
            core: ObjectCore::new(store.clone(), id, path, read_only)?,
            dtype,
            size,
            reserved: len,
            file_len: len,
            chunk,
            window: Buffer::new(dtype, 0),
            win_start: 0,
            win_end: 0,
            dirty: false,
            dirty_slots: 0..0,
            heap_stale: false,
        })
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// Filled length
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Logical length
    pub fn reserved(&self) -> u64 {
        self.reserved
    }

    /// Committed length in the store
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Window capacity in elements
    pub fn chunk_size(&self) -> u64 {
        self.chunk
    }

    /// Index range currently held in memory
    pub fn window(&self) -> Range<u64> {
        self.win_start..self.win_end
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Read one element
    pub fn get<T: Element>(&mut self, idx: u64) -> Result<T> {
        self.core.check_open()?;
        self.check_element::<T>()?;
        self.check_index(idx)?;
        self.ensure_window(idx)?;

        let slot = (idx - self.win_start) as usize;
        T::slots(&self.window)
            .and_then(|slots| slots.get(slot))
            .cloned()
            .ok_or_else(|| self.window_mismatch())
    }

    /// Read one element as a dynamically typed value
    pub fn get_value(&mut self, idx: u64) -> Result<Value> {
        self.core.check_open()?;
        self.check_index(idx)?;
        self.ensure_window(idx)?;
        let slot = (idx - self.win_start) as usize;
        self.window.get(slot).ok_or_else(|| self.window_mismatch())
    }

    /// Read one element formatted as text
    pub fn get_as_string(&mut self, idx: u64) -> Result<String> {
        Ok(self.get_value(idx)?.to_string())
    }

    /// Format `start..end` as text
    pub fn to_string_vec(&mut self, start: u64, end: u64) -> Result<Vec<String>> {
        (start..end).map(|idx| self.get_as_string(idx)).collect()
    }

    /// Overwrite one element
    pub fn assign<T: Element>(&mut self, idx: u64, value: T) -> Result<()> {
        self.core.check_writable()?;
        self.check_element::<T>()?;
        self.check_index(idx)?;
        self.ensure_window(idx)?;
        self.store_slot(idx, value)
    }

    /// Overwrite one element with a dynamically typed value
    pub fn assign_value(&mut self, idx: u64, value: Value) -> Result<()> {
        self.core.check_writable()?;
        self.check_value(&value)?;
        self.check_index(idx)?;
        self.ensure_window(idx)?;
        self.store_value(idx, value)
    }

    /// Append at `size()`, growing the logical length when needed
    pub fn push_back<T: Element>(&mut self, value: T) -> Result<()> {
        self.core.check_writable()?;
        self.check_element::<T>()?;
        let idx = self.grow_for_append()?;
        self.store_slot(idx, value)
    }

    /// Append a dynamically typed value
    pub fn push_value(&mut self, value: Value) -> Result<()> {
        self.core.check_writable()?;
        self.check_value(&value)?;
        let idx = self.grow_for_append()?;
        self.store_value(idx, value)
    }

    /// Set the logical length.
    ///
    /// Shrinking clamps the fill index; the store keeps its bytes until
    /// `close()` truncates them. Slots gained by growing read as zero until
    /// written, unless they were committed before an earlier shrink.
    pub fn resize(&mut self, len: u64) -> Result<()> {
        self.core.check_writable()?;
        self.flush_window()?;
        self.invalidate_window();

        if self.dtype == Dtype::VarString && len < self.file_len {
            self.heap_stale = true;
        }
        self.reserved = len;
        self.size = self.size.min(len);
        self.dirty = true;
        Ok(())
    }

    /// Grow the logical length to at least `len`
    pub fn reserve(&mut self, len: u64) -> Result<()> {
        if len > self.reserved {
            self.resize(len)?;
        }
        Ok(())
    }

    /// Move the fill index; it cannot pass the logical length
    pub fn set_fill_index(&mut self, idx: u64) -> Result<()> {
        self.core.check_writable()?;
        if idx > self.reserved {
            return Err(StoreError::out_of_bounds(idx, self.reserved));
        }
        self.size = idx;
        self.dirty = true;
        Ok(())
    }

    /// Bulk read of up to `count` elements starting at `idx`.
    ///
    /// The result is shorter than `count` when the range passes the logical
    /// length. Pending window writes are flushed first.
    pub fn read_array<T: Element>(&mut self, idx: u64, count: usize) -> Result<Vec<T>> {
        self.core.check_open()?;
        self.check_element::<T>()?;
        if idx > self.reserved {
            return Err(StoreError::out_of_bounds(idx, self.reserved));
        }
        self.flush_window()?;

        let count = count.min((self.reserved - idx) as usize);
        let mut buf = Buffer::new(self.dtype, count);
        {
            let mut store = self.core.store().lock();
            read_elements(&mut store, &self.core, self.dtype, idx, &mut buf, 0, count)?;
        }
        T::from_buffer(buf).ok_or_else(|| self.window_mismatch())
    }

    /// Bulk write starting at `idx`, extending the vector as needed.
    ///
    /// Pending window writes are flushed first; a window overlapping the
    /// written range is discarded.
    pub fn write_array<T: Element>(&mut self, idx: u64, values: &[T]) -> Result<()> {
        self.core.check_writable()?;
        self.check_element::<T>()?;
        self.flush_window()?;

        let end = idx + values.len() as u64;
        if idx < self.win_end && end > self.win_start {
            self.invalidate_window();
        }
        if self.dtype == Dtype::VarString && idx < self.file_len {
            self.heap_stale = true;
        }

        let buf = self.clip(T::into_buffer(values.to_vec()));
        let mut store = self.core.store().lock();
        write_elements(&mut store, &self.core, self.dtype, idx, &buf, 0..values.len())?;

        self.reserved = self.reserved.max(end);
        self.size = self.size.max(end);
        self.file_len = self.file_len.max(end);
        self.commit_meta(&mut store)
    }

    /// Move the window so that it starts at `idx`
    pub fn seek(&mut self, idx: u64) -> Result<()> {
        self.core.check_open()?;
        if idx > self.reserved {
            return Err(StoreError::out_of_bounds(idx, self.reserved));
        }
        self.flush_window()?;

        if self.window.len() as u64 == self.chunk {
            self.window.reset();
        } else {
            self.window = Buffer::new(self.dtype, self.chunk as usize);
        }
        self.win_start = idx;
        self.win_end = (idx + self.chunk).min(self.reserved).max(idx);

        let load = self.win_end.min(self.file_len).saturating_sub(idx) as usize;
        if load > 0 {
            let mut store = self.core.store().lock();
            read_elements(&mut store, &self.core, self.dtype, idx, &mut self.window, 0, load)?;
        }
        debug!(
            "Window {} -> [{}, {}) ({} loaded)",
            self.core.path(),
            self.win_start,
            self.win_end,
            load
        );
        Ok(())
    }

    fn ensure_window(&mut self, idx: u64) -> Result<()> {
        if idx < self.win_start || idx >= self.win_end {
            self.seek(idx)?;
        }
        Ok(())
    }

    fn invalidate_window(&mut self) {
        self.win_start = 0;
        self.win_end = 0;
    }

    /// Reserve slot `size()` for an append and make sure the window covers it
    fn grow_for_append(&mut self) -> Result<u64> {
        let idx = self.size;
        self.size += 1;
        if self.size > self.reserved {
            self.reserved = self.size;
        }

        let in_window = idx >= self.win_start && idx < self.win_end;
        let extends_window =
            idx == self.win_end && (idx - self.win_start) < self.window.len() as u64;
        if extends_window {
            self.win_end += 1;
        } else if !in_window {
            self.seek(idx)?;
        }
        Ok(idx)
    }

    fn store_slot<T: Element>(&mut self, idx: u64, value: T) -> Result<()> {
        let slot = (idx - self.win_start) as usize;
        let cell = T::slots_mut(&mut self.window)
            .and_then(|slots| slots.get_mut(slot))
            .ok_or_else(|| StoreError::InvalidState(format!("slot {} outside window", idx)))?;
        *cell = value;
        self.after_store(idx, slot);
        Ok(())
    }

    fn store_value(&mut self, idx: u64, value: Value) -> Result<()> {
        let slot = (idx - self.win_start) as usize;
        if !self.window.set(slot, value) {
            return Err(self.window_mismatch());
        }
        self.after_store(idx, slot);
        Ok(())
    }

    fn after_store(&mut self, idx: u64, slot: usize) {
        if let Dtype::FixedString(width) = self.dtype {
            if let Some(s) = self.window.strings_mut().and_then(|v| v.get_mut(slot)) {
                clip_string(s, width as usize);
            }
        }
        if self.dtype == Dtype::VarString && idx < self.file_len {
            self.heap_stale = true;
        }
        self.dirty_slots = if self.dirty_slots.is_empty() {
            idx..idx + 1
        } else {
            self.dirty_slots.start.min(idx)..self.dirty_slots.end.max(idx + 1)
        };
        self.dirty = true;
    }

    fn clip(&self, mut buf: Buffer) -> Buffer {
        if let Dtype::FixedString(width) = self.dtype {
            if let Some(strings) = buf.strings_mut() {
                strings.iter_mut().for_each(|s| clip_string(s, width as usize));
            }
        }
        buf
    }

    /// Write the window back and commit lengths
    fn flush_window(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let mut store = self.core.store().lock();
        // Only slots stored since the last flush are written back
        let start = self.dirty_slots.start.max(self.win_start);
        let end = self.dirty_slots.end.min(self.win_end);
        if end > start {
            let range = (start - self.win_start) as usize..(end - self.win_start) as usize;
            write_elements(&mut store, &self.core, self.dtype, start, &self.window, range)?;
        }
        self.dirty_slots = 0..0;
        if self.reserved > self.file_len {
            let width = self.dtype.width() as u64;
            store.truncate(self.core.id(), StreamKind::Data, self.reserved * width)?;
            self.file_len = self.reserved;
        }
        self.file_len = self.file_len.max(self.win_end);
        self.commit_meta(&mut store)?;
        self.dirty = false;
        Ok(())
    }

    fn commit_meta(&self, store: &mut Store) -> Result<()> {
        let meta = store.object_mut(self.core.id())?;
        meta.len = self.file_len;
        meta.fill = self.size;
        meta.chunk = self.chunk;
        Ok(())
    }

    fn close_inner(&mut self) -> Result<()> {
        self.flush_window()?;

        let shared = self.core.store().clone();
        let mut store = shared.lock();
        if !self.core.is_read_only() {
            let id = self.core.id();
            let width = self.dtype.width() as u64;
            if self.file_len != self.reserved {
                store.truncate(id, StreamKind::Data, self.reserved * width)?;
                self.file_len = self.reserved;
            }
            if self.heap_stale {
                self.compact_heap(&mut store)?;
                self.heap_stale = false;
            }
            self.commit_meta(&mut store)?;
        }
        self.core.flush_attrs(&mut store)
    }

    /// Rewrite the string heap keeping only referenced bytes
    fn compact_heap(&self, store: &mut Store) -> Result<()> {
        let count = self.reserved as usize;
        let mut all = Buffer::new(self.dtype, count);
        read_elements(store, &self.core, self.dtype, 0, &mut all, 0, count)?;

        let before = store.stream_len(self.core.id(), StreamKind::Heap)?;
        store.truncate(self.core.id(), StreamKind::Heap, 0)?;
        write_elements(store, &self.core, self.dtype, 0, &all, 0..count)?;
        let after = store.stream_len(self.core.id(), StreamKind::Heap)?;

        debug!("Compacted heap of {}: {} -> {} bytes", self.core.path(), before, after);
        Ok(())
    }

    fn check_element<T: Element>(&self) -> Result<()> {
        if !T::accepts(self.dtype) {
            return Err(StoreError::type_conflict(self.core.path(), self.dtype, T::NAME));
        }
        Ok(())
    }

    fn check_value(&self, value: &Value) -> Result<()> {
        if !value.matches(self.dtype) {
            return Err(StoreError::type_conflict(
                self.core.path(),
                self.dtype,
                value.type_name(),
            ));
        }
        Ok(())
    }

    fn check_index(&self, idx: u64) -> Result<()> {
        if idx >= self.reserved {
            return Err(StoreError::out_of_bounds(idx, self.reserved));
        }
        Ok(())
    }

    fn window_mismatch(&self) -> StoreError {
        StoreError::InvalidState(format!(
            "window of '{}' does not hold {} elements",
            self.core.path(),
            self.dtype
        ))
    }
}

impl StorageObject for Vector {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ObjectCore {
        &mut self.core
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Vector
    }

    fn flush(&mut self) -> Result<()> {
        if !self.core.is_open() {
            return Ok(());
        }
        self.flush_window()?;
        let shared = self.core.store().clone();
        let mut store = shared.lock();
        self.core.flush_attrs(&mut store)
    }

    fn close(&mut self) -> Result<()> {
        if !self.core.is_open() {
            return Ok(());
        }
        let result = self.close_inner();
        self.window.release();
        self.invalidate_window();
        self.core.mark_closed();
        result
    }
}

impl Drop for Vector {
    fn drop(&mut self) {
        close_on_drop(self);
    }
}

/// Truncate `s` to at most `width` bytes on a character boundary
fn clip_string(s: &mut String, width: usize) {
    if s.len() > width {
        let mut end = width;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
}

/// Decode `count` elements at vector index `idx` into `buf[at..]`
fn read_elements(
    store: &mut Store,
    core: &ObjectCore,
    dtype: Dtype,
    idx: u64,
    buf: &mut Buffer,
    at: usize,
    count: usize,
) -> Result<()> {
    let width = dtype.width();
    let mut raw = vec![0u8; count * width];
    store.read_at(core.id(), StreamKind::Data, idx * width as u64, &mut raw)?;

    if dtype != Dtype::VarString {
        buf.decode(at, dtype, &raw);
        return Ok(());
    }

    let strings = buf
        .strings_mut()
        .ok_or_else(|| StoreError::InvalidState(format!("'{}' buffer is not textual", core.path())))?;
    for (slot, encoded) in strings[at..at + count]
        .iter_mut()
        .zip(raw.chunks_exact(VAR_STRING_SLOT))
    {
        let mut offset = [0u8; 8];
        offset.copy_from_slice(&encoded[..8]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&encoded[8..12]);
        let (offset, len) = (u64::from_le_bytes(offset), u32::from_le_bytes(len) as usize);

        if len == 0 {
            slot.clear();
            continue;
        }
        let mut bytes = vec![0u8; len];
        store.read_at(core.id(), StreamKind::Heap, offset, &mut bytes)?;
        *slot = String::from_utf8_lossy(&bytes).into_owned();
    }
    Ok(())
}

/// Encode `buf[range]` at vector index `idx`
fn write_elements(
    store: &mut Store,
    core: &ObjectCore,
    dtype: Dtype,
    idx: u64,
    buf: &Buffer,
    range: Range<usize>,
) -> Result<()> {
    let width = dtype.width() as u64;
    if dtype != Dtype::VarString {
        let bytes = buf.encode(range, dtype);
        return store.write_at(core.id(), StreamKind::Data, idx * width, &bytes);
    }

    let strings = buf
        .strings()
        .ok_or_else(|| StoreError::InvalidState(format!("'{}' buffer is not textual", core.path())))?;
    let heap_start = store.stream_len(core.id(), StreamKind::Heap)?;
    let mut heap = Vec::new();
    let mut slots = Vec::with_capacity(range.len() * VAR_STRING_SLOT);
    for s in &strings[range] {
        let offset = if s.is_empty() { 0 } else { heap_start + heap.len() as u64 };
        slots.extend_from_slice(&offset.to_le_bytes());
        slots.extend_from_slice(&(s.len() as u32).to_le_bytes());
        heap.extend_from_slice(s.as_bytes());
    }
    if !heap.is_empty() {
        store.write_at(core.id(), StreamKind::Heap, heap_start, &heap)?;
    }
    store.write_at(core.id(), StreamKind::Data, idx * width, &slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::ROOT_PATH;
    use crate::core::io::CreateMode;
    use crate::core::store::StoreOptions;
    use tempfile::TempDir;

    fn shared(dir: &TempDir) -> SharedStore {
        Store::create(dir.path().join("v.cst"), CreateMode::Truncate, StoreOptions::default())
            .unwrap()
            .shared()
    }

    fn open(store: &SharedStore, name: &str, dtype: Option<Dtype>, flags: OpenFlags, chunk: u64) -> Result<Vector> {
        Vector::open(store, ROOT_PATH, false, name, dtype, flags, Some(chunk))
    }

    #[test]
    fn test_push_back_within_and_across_windows() {
        let dir = TempDir::new().unwrap();
        let store = shared(&dir);
        let mut v = open(&store, "ints", Some(Dtype::Int), OpenFlags::CREATE, 4).unwrap();

        for i in 0..10 {
            v.push_back(i * 10).unwrap();
        }
        assert_eq!(v.size(), 10);
        assert_eq!(v.reserved(), 10);
        assert_eq!(v.window(), 8..10);

        assert_eq!(v.get::<i32>(3).unwrap(), 30);
        assert_eq!(v.window(), 3..7);
        assert_eq!(v.get::<i32>(9).unwrap(), 90);
    }

    #[test]
    fn test_bounds_and_type_checks() {
        let dir = TempDir::new().unwrap();
        let store = shared(&dir);
        let mut v = open(&store, "f", Some(Dtype::Float), OpenFlags::CREATE, 8).unwrap();
        v.push_back(1.0f32).unwrap();

        assert!(matches!(v.get::<f32>(1), Err(StoreError::OutOfBounds { index: 1, len: 1 })));
        assert!(matches!(v.get::<f64>(0), Err(StoreError::TypeConflict { .. })));
        assert!(matches!(v.push_back(3i32), Err(StoreError::TypeConflict { .. })));
        assert!(matches!(
            v.assign_value(0, Value::Double(1.0)),
            Err(StoreError::TypeConflict { .. })
        ));
        assert!(matches!(v.set_fill_index(2), Err(StoreError::OutOfBounds { .. })));
    }

    #[test]
    fn test_resize_clamps_fill_and_zero_extends() {
        let dir = TempDir::new().unwrap();
        let store = shared(&dir);
        let mut v = open(&store, "d", Some(Dtype::Double), OpenFlags::CREATE, 3).unwrap();
        for i in 0..5 {
            v.push_back(i as f64).unwrap();
        }

        v.resize(2).unwrap();
        assert_eq!(v.size(), 2);
        assert_eq!(v.reserved(), 2);
        assert!(v.get::<f64>(2).is_err());

        let mut fresh = open(&store, "fresh", Some(Dtype::Double), OpenFlags::CREATE, 3).unwrap();
        fresh.resize(6).unwrap();
        assert_eq!(fresh.size(), 0);
        assert_eq!(fresh.get::<f64>(5).unwrap(), 0.0);
        fresh.assign(4, 2.5f64).unwrap();
        assert_eq!(fresh.read_array::<f64>(0, 10).unwrap(), vec![0.0, 0.0, 0.0, 0.0, 2.5, 0.0]);
    }

    #[test]
    fn test_bulk_io_sees_buffered_writes() {
        let dir = TempDir::new().unwrap();
        let store = shared(&dir);
        let mut v = open(&store, "s", Some(Dtype::Short), OpenFlags::CREATE, 16).unwrap();

        v.write_array(0, &[1i16, 2, 3, 4, 5]).unwrap();
        v.assign(2, 30i16).unwrap();
        assert_eq!(v.read_array::<i16>(0, 5).unwrap(), vec![1, 2, 30, 4, 5]);
        // The window survives the bulk read
        assert_eq!(v.get::<i16>(2).unwrap(), 30);

        v.write_array(1, &[20i16, 31]).unwrap();
        assert_eq!(v.get::<i16>(2).unwrap(), 31);
        assert_eq!(v.read_array::<i16>(3, 100).unwrap(), vec![4, 5]);
    }

    #[test]
    fn test_reopen_restores_lengths_and_checks_type() {
        let dir = TempDir::new().unwrap();
        let store = shared(&dir);
        {
            let mut v = open(&store, "c", Some(Dtype::Char), OpenFlags::CREATE, 2).unwrap();
            for b in [1i8, -2, 3] {
                v.push_back(b).unwrap();
            }
            v.reserve(5).unwrap();
            v.close().unwrap();
            v.close().unwrap();
        }

        let mut v = open(&store, "c", None, OpenFlags::OPEN, 2).unwrap();
        assert_eq!(v.dtype(), Dtype::Char);
        assert_eq!(v.size(), 3);
        assert_eq!(v.reserved(), 5);
        assert_eq!(v.get::<i8>(1).unwrap(), -2);

        assert!(matches!(
            open(&store, "c", Some(Dtype::Int), OpenFlags::OPEN, 2),
            Err(StoreError::TypeConflict { .. })
        ));
        assert!(matches!(
            open(&store, "none", Some(Dtype::Int), OpenFlags::OPEN, 2),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            open(&store, "new", None, OpenFlags::CREATE, 2),
            Err(StoreError::InvalidState(_))
        ));
    }

    #[test]
    fn test_strings_fixed_and_variable() {
        let dir = TempDir::new().unwrap();
        let store = shared(&dir);

        let mut fixed = open(&store, "fixed", Some(Dtype::FixedString(4)), OpenFlags::CREATE, 2).unwrap();
        fixed.push_back("abcdef".to_string()).unwrap();
        fixed.push_back("xy".to_string()).unwrap();
        fixed.push_back(String::new()).unwrap();
        assert_eq!(fixed.get::<String>(0).unwrap(), "abcd");
        assert_eq!(fixed.read_array::<String>(0, 3).unwrap(), vec!["abcd", "xy", ""]);

        let mut var = open(&store, "var", Some(Dtype::VarString), OpenFlags::CREATE, 2).unwrap();
        let words = ["alpha", "", "a much longer string value", "é"];
        for w in words {
            var.push_back(w.to_string()).unwrap();
        }
        var.assign(0, "beta".to_string()).unwrap();
        assert_eq!(
            var.read_array::<String>(0, 4).unwrap(),
            vec!["beta", "", "a much longer string value", "é"]
        );
        var.close().unwrap();

        let mut var = open(&store, "var", Some(Dtype::VarString), OpenFlags::OPEN, 2).unwrap();
        assert_eq!(var.get::<String>(2).unwrap(), "a much longer string value");
        assert_eq!(var.get_as_string(0).unwrap(), "beta");
    }

    #[test]
    fn test_read_only_vector_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let store = shared(&dir);
        {
            let mut v = open(&store, "ro", Some(Dtype::Int), OpenFlags::CREATE, 4).unwrap();
            v.push_back(5i32).unwrap();
        }

        let mut v = open(&store, "ro", None, OpenFlags::OPEN | OpenFlags::READONLY, 4).unwrap();
        assert_eq!(v.get::<i32>(0).unwrap(), 5);
        assert!(matches!(v.push_back(6i32), Err(StoreError::ReadOnly(_))));
        assert!(matches!(v.set_attr("k", "v"), Err(StoreError::ReadOnly(_))));
    }

    #[test]
    fn test_closed_vector_rejects_access() {
        let dir = TempDir::new().unwrap();
        let store = shared(&dir);
        let mut v = open(&store, "x", Some(Dtype::Int), OpenFlags::CREATE, 4).unwrap();
        v.set_attr("unit", "counts").unwrap();
        v.close().unwrap();

        assert!(matches!(v.get::<i32>(0), Err(StoreError::InvalidState(_))));
        assert!(matches!(v.set_attr("k", "v"), Err(StoreError::InvalidState(_))));

        let v = open(&store, "x", None, OpenFlags::OPEN, 4).unwrap();
        assert_eq!(v.get_attr("unit").and_then(|a| a.as_str()), Some("counts"));
    }

    #[test]
    fn test_string_heap_holds_each_value_once() {
        let dir = TempDir::new().unwrap();
        let store = shared(&dir);
        let mut v = open(&store, "ids", Some(Dtype::VarString), OpenFlags::CREATE, 64).unwrap();
        let id = v.core().id();
        let value = "abcdefghijklmnopqrstuvwxyz";

        for _ in 0..200 {
            v.push_back(value.to_string()).unwrap();
            v.flush().unwrap();
        }
        assert_eq!(store.lock().stream_len(id, StreamKind::Heap).unwrap(), 200 * 26);

        v.assign(5, "ZYXWVUTSRQPONMLKJIHGFEDCBA".to_string()).unwrap();
        v.flush().unwrap();
        v.close().unwrap();
        assert_eq!(store.lock().stream_len(id, StreamKind::Heap).unwrap(), 200 * 26);

        let mut v = open(&store, "ids", None, OpenFlags::OPEN, 64).unwrap();
        assert_eq!(v.get::<String>(4).unwrap(), value);
        assert_eq!(v.get::<String>(5).unwrap(), "ZYXWVUTSRQPONMLKJIHGFEDCBA");
        assert_eq!(v.get::<String>(199).unwrap(), value);
    }
}
