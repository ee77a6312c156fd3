//! Storage object lifecycle: open flags, attributes and closing

use crate::core::catalog::{leaf_name, parent_path, AttrValue, ObjectId, ObjectKind};
use crate::core::error::{Result, StoreError};
use crate::core::store::{SharedStore, Store};
use std::fmt;
use std::ops::BitOr;
use tracing::{debug, warn};

/// How `open` treats existing and missing objects
///
/// Flags combine with `|`. `REPLACE` discards any existing object and
/// implies `CREATE`; `OPEN | CREATE` opens an existing object or creates
/// a missing one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpenFlags(u8);

impl OpenFlags {
    pub const OPEN: OpenFlags = OpenFlags(0x01);
    pub const CREATE: OpenFlags = OpenFlags(0x02);
    pub const REPLACE: OpenFlags = OpenFlags(0x04);
    pub const READONLY: OpenFlags = OpenFlags(0x08);
    pub const OPEN_OR_CREATE: OpenFlags = OpenFlags(0x03);

    pub const fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }

    fn creates(self) -> bool {
        self.contains(Self::CREATE) || self.contains(Self::REPLACE)
    }
}

impl BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::OPEN, "OPEN"),
            (Self::CREATE, "CREATE"),
            (Self::REPLACE, "REPLACE"),
            (Self::READONLY, "READONLY"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect();
        write!(f, "OpenFlags({})", names.join(" | "))
    }
}

/// Outcome of applying open flags to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    Existing(ObjectId),
    Create,
}

/// Decide whether `path` is opened or (re)created under `flags`
pub(crate) fn resolve(
    store: &mut Store,
    path: &str,
    kind: ObjectKind,
    flags: OpenFlags,
    read_only: bool,
) -> Result<Resolution> {
    let existing = store.catalog().lookup(path);

    if flags.contains(OpenFlags::REPLACE) {
        if read_only {
            return Err(StoreError::ReadOnly(path.to_string()));
        }
        if existing.is_some() {
            store.unlink(path)?;
        }
        return Ok(Resolution::Create);
    }

    match existing {
        Some(id) if flags.contains(OpenFlags::OPEN) => {
            let found = store.object(id)?.kind;
            if found != kind {
                return Err(StoreError::InvalidState(format!(
                    "'{}' is a {}, not a {}",
                    path, found, kind
                )));
            }
            Ok(Resolution::Existing(id))
        }
        Some(_) => Err(StoreError::AlreadyExists(path.to_string())),
        None if flags.creates() => {
            if read_only {
                return Err(StoreError::ReadOnly(path.to_string()));
            }
            Ok(Resolution::Create)
        }
        None => Err(StoreError::NotFound(path.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectState {
    Open,
    Closed,
}

/// State shared by every storage object
///
/// Holds the object's identity, its open/closed state and a write-back
/// copy of its attributes. The parent is referenced by path only.
pub struct ObjectCore {
    store: SharedStore,
    id: ObjectId,
    path: String,
    state: ObjectState,
    read_only: bool,
    attrs: Vec<(String, AttrValue)>,
    attrs_dirty: bool,
}

impl ObjectCore {
    pub(crate) fn new(store: SharedStore, id: ObjectId, path: String, read_only: bool) -> Result<Self> {
        let attrs = store.lock().object(id)?.attrs.clone();
        Ok(ObjectCore {
            store,
            id,
            path,
            state: ObjectState::Open,
            read_only,
            attrs,
            attrs_dirty: false,
        })
    }

    pub(crate) fn store(&self) -> &SharedStore {
        &self.store
    }

    pub(crate) fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        leaf_name(&self.path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path of the owning container
    pub fn parent_path(&self) -> &str {
        parent_path(&self.path)
    }

    pub fn is_open(&self) -> bool {
        self.state == ObjectState::Open
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn check_open(&self) -> Result<()> {
        if !self.is_open() {
            return Err(StoreError::InvalidState(format!("'{}' is closed", self.path)));
        }
        Ok(())
    }

    pub(crate) fn check_writable(&self) -> Result<()> {
        self.check_open()?;
        if self.read_only {
            return Err(StoreError::ReadOnly(self.path.clone()));
        }
        Ok(())
    }

    pub fn get_attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Attributes in insertion order
    pub fn attrs(&self) -> &[(String, AttrValue)] {
        &self.attrs
    }

    /// Set an attribute; an existing key is deleted and re-added at the end
    pub fn set_attr(&mut self, key: &str, value: impl Into<AttrValue>) -> Result<()> {
        self.check_writable()?;
        self.attrs.retain(|(k, _)| k != key);
        self.attrs.push((key.to_string(), value.into()));
        self.attrs_dirty = true;
        Ok(())
    }

    /// Remove an attribute, reporting whether it existed
    pub fn delete_attr(&mut self, key: &str) -> Result<bool> {
        self.check_writable()?;
        let before = self.attrs.len();
        self.attrs.retain(|(k, _)| k != key);
        let removed = self.attrs.len() != before;
        self.attrs_dirty |= removed;
        Ok(removed)
    }

    /// Write pending attribute changes into the catalog
    pub(crate) fn flush_attrs(&mut self, store: &mut Store) -> Result<()> {
        if self.attrs_dirty && !self.read_only {
            store.object_mut(self.id)?.attrs = self.attrs.clone();
            self.attrs_dirty = false;
        }
        Ok(())
    }

    pub(crate) fn mark_closed(&mut self) {
        self.state = ObjectState::Closed;
    }
}

/// Common interface of vectors, tables and groups
pub trait StorageObject {
    fn core(&self) -> &ObjectCore;

    fn core_mut(&mut self) -> &mut ObjectCore;

    fn kind(&self) -> ObjectKind;

    /// Push buffered state to the store without closing
    fn flush(&mut self) -> Result<()>;

    /// Flush and release the object.
    ///
    /// Closing a closed object is a no-op. The object is closed afterwards
    /// even when flushing failed; the error is still returned.
    fn close(&mut self) -> Result<()>;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn path(&self) -> &str {
        self.core().path()
    }

    fn is_open(&self) -> bool {
        self.core().is_open()
    }

    fn is_read_only(&self) -> bool {
        self.core().is_read_only()
    }

    fn get_attr(&self, key: &str) -> Option<&AttrValue> {
        self.core().get_attr(key)
    }

    fn set_attr(&mut self, key: &str, value: impl Into<AttrValue>) -> Result<()>
    where
        Self: Sized,
    {
        self.core_mut().set_attr(key, value)
    }

    fn delete_attr(&mut self, key: &str) -> Result<bool> {
        self.core_mut().delete_attr(key)
    }
}

/// Close from a drop path: failures are logged, never raised
pub(crate) fn close_on_drop<T: StorageObject>(object: &mut T) {
    if !object.is_open() {
        return;
    }
    debug!("Closing {} {} on drop", object.kind(), object.path());
    if let Err(e) = object.close() {
        warn!("Failed to close {} {}: {}", object.kind(), object.path(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::ObjectMeta;
    use crate::core::dtype::Dtype;
    use crate::core::io::CreateMode;
    use crate::core::store::StoreOptions;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> Store {
        Store::create(dir.path().join("o.cst"), CreateMode::Truncate, StoreOptions::default()).unwrap()
    }

    #[test]
    fn test_flag_combinations() {
        let flags = OpenFlags::OPEN | OpenFlags::CREATE;
        assert_eq!(flags, OpenFlags::OPEN_OR_CREATE);
        assert!(flags.contains(OpenFlags::OPEN));
        assert!(!flags.contains(OpenFlags::REPLACE));
        assert_eq!(format!("{:?}", flags), "OpenFlags(OPEN | CREATE)");
    }

    #[test]
    fn test_resolution_rules() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        let kind = ObjectKind::Vector;

        assert!(matches!(
            resolve(&mut store, "/v", kind, OpenFlags::OPEN, false),
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(
            resolve(&mut store, "/v", kind, OpenFlags::CREATE, false).unwrap(),
            Resolution::Create
        );

        let id = store
            .catalog_mut()
            .insert("/v", ObjectMeta::vector(Dtype::Int, 8))
            .unwrap();
        assert_eq!(
            resolve(&mut store, "/v", kind, OpenFlags::OPEN_OR_CREATE, false).unwrap(),
            Resolution::Existing(id)
        );
        assert!(matches!(
            resolve(&mut store, "/v", kind, OpenFlags::CREATE, false),
            Err(StoreError::AlreadyExists(_))
        ));
        assert!(matches!(
            resolve(&mut store, "/v", ObjectKind::Group, OpenFlags::OPEN, false),
            Err(StoreError::InvalidState(_))
        ));
        assert!(matches!(
            resolve(&mut store, "/v", kind, OpenFlags::REPLACE, true),
            Err(StoreError::ReadOnly(_))
        ));

        assert_eq!(
            resolve(&mut store, "/v", kind, OpenFlags::REPLACE, false).unwrap(),
            Resolution::Create
        );
        assert_eq!(store.catalog().lookup("/v"), None);
    }

    #[test]
    fn test_attributes_overwrite_moves_to_end() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        let id = store
            .catalog_mut()
            .insert("/v", ObjectMeta::vector(Dtype::Int, 8))
            .unwrap();
        let shared = store.shared();

        let mut core = ObjectCore::new(shared.clone(), id, "/v".to_string(), false).unwrap();
        core.set_attr("a", 1i64).unwrap();
        core.set_attr("b", "two").unwrap();
        core.set_attr("a", 3.5).unwrap();

        let keys: Vec<&str> = core.attrs().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(core.get_attr("a"), Some(&AttrValue::Double(3.5)));
        assert!(core.delete_attr("b").unwrap());
        assert!(!core.delete_attr("b").unwrap());

        core.flush_attrs(&mut shared.lock()).unwrap();
        assert_eq!(shared.lock().object(id).unwrap().attrs.len(), 1);

        core.mark_closed();
        assert!(matches!(core.set_attr("c", 1i64), Err(StoreError::InvalidState(_))));
    }
}
