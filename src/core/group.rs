//! Groups: named containers of vectors, tables and subgroups
//!
//! A group owns every child it has opened. Children stay open until the
//! group closes, `close_child` releases one, or `unlink` removes it from the
//! file. Opening a name that is already held open returns the held object.

use crate::core::catalog::{join_path, validate_name, ObjectKind, ObjectMeta, ROOT_PATH};
use crate::core::dtype::Dtype;
use crate::core::error::{Result, StoreError};
use crate::core::headers::HeaderList;
use crate::core::object::{close_on_drop, resolve, ObjectCore, OpenFlags, Resolution, StorageObject};
use crate::core::store::SharedStore;
use crate::core::table::Table;
use crate::core::vector::Vector;
use tracing::debug;

/// An open child object
pub enum Child {
    Vector(Vector),
    Table(Table),
    Group(Group),
}

impl Child {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Child::Vector(_) => ObjectKind::Vector,
            Child::Table(_) => ObjectKind::Table,
            Child::Group(_) => ObjectKind::Group,
        }
    }

    fn object(&self) -> &dyn StorageObject {
        match self {
            Child::Vector(v) => v,
            Child::Table(t) => t,
            Child::Group(g) => g,
        }
    }

    fn object_mut(&mut self) -> &mut dyn StorageObject {
        match self {
            Child::Vector(v) => v,
            Child::Table(t) => t,
            Child::Group(g) => g,
        }
    }
}

pub struct Group {
    core: ObjectCore,
    children: Vec<(String, Child)>,
    headers: HeaderList,
}

impl Group {
    /// The root group of a store
    pub(crate) fn root(store: &SharedStore, read_only: bool) -> Result<Group> {
        let (id, headers) = {
            let guard = store.lock();
            let id = guard
                .catalog()
                .lookup(ROOT_PATH)
                .ok_or_else(|| StoreError::NotFound(ROOT_PATH.to_string()))?;
            (id, HeaderList::load(&guard, id)?)
        };
        Ok(Group {
            core: ObjectCore::new(store.clone(), id, ROOT_PATH.to_string(), read_only)?,
            children: Vec::new(),
            headers,
        })
    }

    pub(crate) fn open(
        store: &SharedStore,
        parent_path: &str,
        parent_read_only: bool,
        name: &str,
        flags: OpenFlags,
    ) -> Result<Group> {
        validate_name(name)?;
        let path = join_path(parent_path, name);
        let read_only = parent_read_only || flags.contains(OpenFlags::READONLY);

        let (id, headers) = {
            let mut guard = store.lock();
            match resolve(&mut guard, &path, ObjectKind::Group, flags, read_only)? {
                Resolution::Existing(id) => (id, HeaderList::load(&guard, id)?),
                Resolution::Create => {
                    let id = guard
                        .catalog_mut()
                        .insert(&path, ObjectMeta::new(ObjectKind::Group))?;
                    debug!("Created group {}", path);
                    (id, HeaderList::default())
                }
            }
        };
        Ok(Group {
            core: ObjectCore::new(store.clone(), id, path, read_only)?,
            children: Vec::new(),
            headers,
        })
    }

    /// Open a vector child; `dtype` may be `None` when opening an existing one
    pub fn open_vector(&mut self, name: &str, dtype: Option<Dtype>, flags: OpenFlags) -> Result<&mut Vector> {
        self.open_vector_inner(name, dtype, flags, None)
    }

    /// Open a vector child with an explicit window size in elements
    pub fn open_vector_with_chunk(
        &mut self,
        name: &str,
        dtype: Option<Dtype>,
        flags: OpenFlags,
        chunk: u64,
    ) -> Result<&mut Vector> {
        self.open_vector_inner(name, dtype, flags, Some(chunk))
    }

    fn open_vector_inner(
        &mut self,
        name: &str,
        dtype: Option<Dtype>,
        flags: OpenFlags,
        chunk: Option<u64>,
    ) -> Result<&mut Vector> {
        self.core.check_open()?;
        let pos = match self.reuse_child(name, ObjectKind::Vector, flags)? {
            Some(pos) => pos,
            None => {
                let vector = Vector::open(
                    self.core.store(),
                    self.core.path(),
                    self.core.is_read_only(),
                    name,
                    dtype,
                    flags,
                    chunk,
                )?;
                self.children.push((name.to_string(), Child::Vector(vector)));
                self.children.len() - 1
            }
        };

        match &mut self.children[pos].1 {
            Child::Vector(vector) => match dtype {
                Some(requested) if requested != vector.dtype() => {
                    Err(StoreError::type_conflict(vector.path(), vector.dtype(), requested))
                }
                _ => Ok(vector),
            },
            other => Err(kind_mismatch(name, other.kind(), ObjectKind::Vector)),
        }
    }

    pub fn open_table(&mut self, name: &str, flags: OpenFlags) -> Result<&mut Table> {
        self.core.check_open()?;
        let pos = match self.reuse_child(name, ObjectKind::Table, flags)? {
            Some(pos) => pos,
            None => {
                let table = Table::open(self.core.store(), self.core.path(), self.core.is_read_only(), name, flags)?;
                self.children.push((name.to_string(), Child::Table(table)));
                self.children.len() - 1
            }
        };

        match &mut self.children[pos].1 {
            Child::Table(table) => Ok(table),
            other => Err(kind_mismatch(name, other.kind(), ObjectKind::Table)),
        }
    }

    /// Open a subgroup. Nested names (`a/b/c`) walk intermediate groups,
    /// creating them when `flags` allows creation.
    pub fn open_group(&mut self, name: &str, flags: OpenFlags) -> Result<&mut Group> {
        self.core.check_open()?;
        if let Some((first, rest)) = name.split_once('/') {
            let creates = flags.contains(OpenFlags::CREATE) || flags.contains(OpenFlags::REPLACE);
            let mut step = if creates { OpenFlags::OPEN_OR_CREATE } else { OpenFlags::OPEN };
            if flags.contains(OpenFlags::READONLY) {
                step = step | OpenFlags::READONLY;
            }
            return self.open_group(first, step)?.open_group(rest, flags);
        }

        let pos = match self.reuse_child(name, ObjectKind::Group, flags)? {
            Some(pos) => pos,
            None => {
                let group = Group::open(self.core.store(), self.core.path(), self.core.is_read_only(), name, flags)?;
                self.children.push((name.to_string(), Child::Group(group)));
                self.children.len() - 1
            }
        };

        match &mut self.children[pos].1 {
            Child::Group(group) => Ok(group),
            other => Err(kind_mismatch(name, other.kind(), ObjectKind::Group)),
        }
    }

    /// Position of a held-open child that `flags` allow reusing.
    ///
    /// `REPLACE` closes and drops a held child so the caller recreates it;
    /// closed children are dropped so the caller reopens them.
    fn reuse_child(&mut self, name: &str, kind: ObjectKind, flags: OpenFlags) -> Result<Option<usize>> {
        let Some(pos) = self.position(name) else {
            return Ok(None);
        };

        let replace = flags.contains(OpenFlags::REPLACE);
        if replace {
            self.core.check_writable()?;
        }
        if replace || !self.children[pos].1.object().is_open() {
            let (_, mut child) = self.children.remove(pos);
            child.object_mut().close()?;
            return Ok(None);
        }

        let held = self.children[pos].1.kind();
        if !flags.contains(OpenFlags::OPEN) {
            return Err(StoreError::AlreadyExists(join_path(self.core.path(), name)));
        }
        if held != kind {
            return Err(kind_mismatch(name, held, kind));
        }
        Ok(Some(pos))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.children.iter().position(|(n, _)| n == name)
    }

    /// A held-open vector child
    pub fn vector(&self, name: &str) -> Option<&Vector> {
        match self.children.iter().find(|(n, _)| n == name) {
            Some((_, Child::Vector(v))) => Some(v),
            _ => None,
        }
    }

    pub fn vector_mut(&mut self, name: &str) -> Option<&mut Vector> {
        match self.children.iter_mut().find(|(n, _)| n == name) {
            Some((_, Child::Vector(v))) => Some(v),
            _ => None,
        }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        match self.children.iter().find(|(n, _)| n == name) {
            Some((_, Child::Table(t))) => Some(t),
            _ => None,
        }
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        match self.children.iter_mut().find(|(n, _)| n == name) {
            Some((_, Child::Table(t))) => Some(t),
            _ => None,
        }
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        match self.children.iter().find(|(n, _)| n == name) {
            Some((_, Child::Group(g))) => Some(g),
            _ => None,
        }
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut Group> {
        match self.children.iter_mut().find(|(n, _)| n == name) {
            Some((_, Child::Group(g))) => Some(g),
            _ => None,
        }
    }

    /// Names of the children currently held open
    pub fn open_children(&self) -> Vec<&str> {
        self.children.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Close one held child. Names that exist but are not held are a no-op.
    pub fn close_child(&mut self, name: &str) -> Result<()> {
        match self.position(name) {
            Some(pos) => {
                let (_, mut child) = self.children.remove(pos);
                child.object_mut().close()
            }
            None if self.name_exists(name) => Ok(()),
            None => Err(StoreError::NotFound(join_path(self.core.path(), name))),
        }
    }

    pub fn name_exists(&self, name: &str) -> bool {
        self.kind_of(name).is_some()
    }

    /// Kind of the stored child `name`
    pub fn kind_of(&self, name: &str) -> Option<ObjectKind> {
        let path = join_path(self.core.path(), name);
        self.core.store().lock().catalog().meta(&path).map(|meta| meta.kind)
    }

    /// Every stored child name, in creation order
    pub fn list_names(&self) -> Vec<String> {
        self.core
            .store()
            .lock()
            .catalog()
            .children(self.core.path())
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    /// Remove one reference to `name`; the object goes away with its last link
    pub fn unlink(&mut self, name: &str) -> Result<()> {
        self.core.check_writable()?;
        if let Some(pos) = self.position(name) {
            let (_, mut child) = self.children.remove(pos);
            child.object_mut().close()?;
        }
        let path = join_path(self.core.path(), name);
        let released = self.core.store().lock().unlink(&path)?;
        debug!("Unlinked {} from {} ({} released)", name, self.core.path(), released);
        Ok(())
    }

    /// Remove everything inside subgroup `name`, keeping the group itself
    pub fn delete_items_in(&mut self, name: &str) -> Result<()> {
        self.core.check_writable()?;
        match self.group_mut(name) {
            Some(group) => group.clear(),
            None => {
                let mut group = Group::open(
                    self.core.store(),
                    self.core.path(),
                    self.core.is_read_only(),
                    name,
                    OpenFlags::OPEN,
                )?;
                let result = group.clear();
                group.close()?;
                result
            }
        }
    }

    /// Unlink every child of this group
    pub fn clear(&mut self) -> Result<()> {
        self.core.check_writable()?;
        for name in self.list_names() {
            self.unlink(&name)?;
        }
        Ok(())
    }

    /// Give the vector `existing` a second name in this group
    pub fn link(&mut self, existing: &str, new_name: &str) -> Result<()> {
        self.core.check_writable()?;
        validate_name(new_name)?;
        if let Some(vector) = self.vector_mut(existing) {
            vector.flush()?;
        }
        let from = join_path(self.core.path(), existing);
        let to = join_path(self.core.path(), new_name);
        self.core.store().lock().catalog_mut().link(&from, &to)
    }

    pub fn add_header(&mut self, key: &str, value: &str) -> Result<()> {
        self.core.check_writable()?;
        self.headers.add(key, value);
        Ok(())
    }

    /// Restart header enumeration
    pub fn headers_begin(&mut self) {
        self.headers.begin();
    }

    /// Next header pair, in insertion order
    pub fn headers_next(&mut self) -> Option<(String, String)> {
        self.headers.next_pair()
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

    pub fn header_count(&self) -> usize {
        self.headers.entries().len()
    }

    fn flush_own(&mut self) -> Result<()> {
        let shared = self.core.store().clone();
        let mut store = shared.lock();
        if !self.core.is_read_only() {
            self.headers.flush(&mut store, self.core.id())?;
        }
        self.core.flush_attrs(&mut store)
    }
}

fn kind_mismatch(name: &str, found: ObjectKind, wanted: ObjectKind) -> StoreError {
    StoreError::InvalidState(format!("'{}' is a {}, not a {}", name, found, wanted))
}

impl StorageObject for Group {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ObjectCore {
        &mut self.core
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Group
    }

    fn flush(&mut self) -> Result<()> {
        if !self.core.is_open() {
            return Ok(());
        }
        for (_, child) in self.children.iter_mut() {
            child.object_mut().flush()?;
        }
        self.flush_own()
    }

    /// Close every child in open order, then the group itself
    fn close(&mut self) -> Result<()> {
        if !self.core.is_open() {
            return Ok(());
        }
        let mut first_error = None;
        for (_, mut child) in self.children.drain(..) {
            if let Err(e) = child.object_mut().close() {
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.flush_own() {
            first_error.get_or_insert(e);
        }
        self.core.mark_closed();
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for Group {
    fn drop(&mut self) {
        close_on_drop(self);
    }
}
