//! Object catalog: persistent metadata for every object in a container
//!
//! Objects are addressed by absolute slash-separated paths (`/`, `/a`,
//! `/a/b`). A path is a link to an object ID; vectors may carry several
//! links, and an object is removed once its last link goes away. Links are
//! kept in creation order so listings enumerate children the way they were
//! added.

use crate::core::dtype::Dtype;
use crate::core::error::{Result, StoreError};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type ObjectId = u64;

pub const ROOT_PATH: &str = "/";

/// Kind of object behind a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Group,
    Vector,
    Table,
}

impl ObjectKind {
    /// Whether objects of this kind can hold children
    pub fn is_container(&self) -> bool {
        matches!(self, ObjectKind::Group | ObjectKind::Table)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Group => write!(f, "group"),
            ObjectKind::Vector => write!(f, "vector"),
            ObjectKind::Table => write!(f, "table"),
        }
    }
}

/// Typed attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Double(#[serde(with = "double_repr")] f64),
}

/// Finite doubles are stored as JSON numbers; NaN and the infinities, which
/// JSON cannot carry, as the strings `NaN`, `inf` and `-inf`.
mod double_repr {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "inf" } else { "-inf" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("invalid double attribute {:?}", other))),
            },
        }
    }
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            AttrValue::Double(v) => Some(*v),
            AttrValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => f.write_str(s),
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Double(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(v as i64)
    }
}

impl From<usize> for AttrValue {
    fn from(v: usize) -> Self {
        AttrValue::Int(v as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Double(v)
    }
}

/// A byte stream stored in a list of pages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    /// Pages backing the stream, in stream order
    pub pages: Vec<u64>,

    /// Stream length in bytes
    pub len: u64,
}

/// Persistent metadata for one object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub kind: ObjectKind,

    /// Element type (vectors only)
    pub dtype: Option<Dtype>,

    /// Committed element count
    pub len: u64,

    /// Filled element count
    pub fill: u64,

    /// Window size in elements
    pub chunk: u64,

    /// Fixed-width element stream
    pub data: Stream,

    /// Variable-length string bytes
    pub heap: Stream,

    /// Attributes in insertion order
    pub attrs: Vec<(String, AttrValue)>,

    /// Ordered header pairs, duplicates allowed (containers only)
    pub headers: Vec<(String, String)>,

    /// Number of links naming this object
    pub links: u32,

    /// Creation time, seconds since the Unix epoch
    pub created: i64,
}

impl ObjectMeta {
    pub fn new(kind: ObjectKind) -> Self {
        ObjectMeta {
            kind,
            dtype: None,
            len: 0,
            fill: 0,
            chunk: 0,
            data: Stream::default(),
            heap: Stream::default(),
            attrs: Vec::new(),
            headers: Vec::new(),
            links: 0,
            created: chrono::Utc::now().timestamp(),
        }
    }

    pub fn vector(dtype: Dtype, chunk: u64) -> Self {
        let mut meta = Self::new(ObjectKind::Vector);
        meta.dtype = Some(dtype);
        meta.chunk = chunk;
        meta
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Link {
    path: String,
    id: ObjectId,
}

/// Object catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    next_id: ObjectId,
    objects: BTreeMap<ObjectId, ObjectMeta>,
    links: Vec<Link>,

    /// Path to position in `links`
    #[serde(skip)]
    index: AHashMap<String, usize>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Catalog holding only the root group
    pub fn new() -> Self {
        let mut root = ObjectMeta::new(ObjectKind::Group);
        root.links = 1;
        let mut objects = BTreeMap::new();
        objects.insert(0, root);

        let mut catalog = Catalog {
            next_id: 1,
            objects,
            links: vec![Link {
                path: ROOT_PATH.to_string(),
                id: 0,
            }],
            index: AHashMap::new(),
        };
        catalog.rebuild_index();
        catalog
    }

    /// Rebuild the path index after deserialization
    pub(crate) fn rebuild_index(&mut self) {
        self.index = self
            .links
            .iter()
            .enumerate()
            .map(|(pos, link)| (link.path.clone(), pos))
            .collect();
    }

    pub fn lookup(&self, path: &str) -> Option<ObjectId> {
        self.index.get(path).map(|&pos| self.links[pos].id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&ObjectMeta> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut ObjectMeta> {
        self.objects.get_mut(&id)
    }

    pub fn meta(&self, path: &str) -> Option<&ObjectMeta> {
        self.lookup(path).and_then(|id| self.get(id))
    }

    /// Create a new object linked at `path`
    pub fn insert(&mut self, path: &str, mut meta: ObjectMeta) -> Result<ObjectId> {
        if self.index.contains_key(path) {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        self.check_parent(path)?;

        let id = self.next_id;
        self.next_id += 1;
        meta.links = 1;
        self.objects.insert(id, meta);
        self.push_link(path, id);
        Ok(id)
    }

    /// Add a second name for an existing vector
    pub fn link(&mut self, existing: &str, path: &str) -> Result<()> {
        let id = self
            .lookup(existing)
            .ok_or_else(|| StoreError::NotFound(existing.to_string()))?;
        if self.index.contains_key(path) {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        self.check_parent(path)?;

        let meta = self
            .objects
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(existing.to_string()))?;
        if meta.kind != ObjectKind::Vector {
            return Err(StoreError::UnsupportedOperation(format!(
                "cannot hard-link {} '{}'",
                meta.kind, existing
            )));
        }
        meta.links += 1;
        self.push_link(path, id);
        Ok(())
    }

    /// Remove the link at `path`.
    ///
    /// Containers lose their whole subtree. Returns every object whose last
    /// link disappeared so the caller can release its pages.
    pub fn unlink(&mut self, path: &str) -> Result<Vec<ObjectMeta>> {
        if path == ROOT_PATH {
            return Err(StoreError::UnsupportedOperation(
                "cannot unlink the root group".to_string(),
            ));
        }
        let id = self
            .lookup(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        let mut released = Vec::new();
        let is_container = self
            .objects
            .get(&id)
            .map(|m| m.kind.is_container())
            .unwrap_or(false);
        if is_container {
            let children: Vec<String> = self
                .children(path)
                .into_iter()
                .map(|(name, _)| join_path(path, &name))
                .collect();
            for child in children {
                released.extend(self.unlink(&child)?);
            }
        }

        self.links.retain(|link| link.path != path);
        self.rebuild_index();

        let remove = match self.objects.get_mut(&id) {
            Some(meta) => {
                meta.links = meta.links.saturating_sub(1);
                meta.links == 0
            }
            None => false,
        };
        if remove {
            if let Some(meta) = self.objects.remove(&id) {
                released.push(meta);
            }
        }
        Ok(released)
    }

    /// Direct children of a container, in creation order
    pub fn children(&self, path: &str) -> Vec<(String, ObjectId)> {
        self.links
            .iter()
            .filter(|link| link.path != ROOT_PATH && parent_path(&link.path) == path)
            .map(|link| (leaf_name(&link.path).to_string(), link.id))
            .collect()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn check_parent(&self, path: &str) -> Result<()> {
        let parent = parent_path(path);
        match self.meta(parent) {
            Some(meta) if meta.kind.is_container() => Ok(()),
            Some(meta) => Err(StoreError::InvalidState(format!(
                "parent '{}' of '{}' is a {}",
                parent, path, meta.kind
            ))),
            None => Err(StoreError::NotFound(parent.to_string())),
        }
    }

    fn push_link(&mut self, path: &str, id: ObjectId) {
        self.index.insert(path.to_string(), self.links.len());
        self.links.push(Link {
            path: path.to_string(),
            id,
        });
    }
}

/// Join a container path and a child name
pub fn join_path(parent: &str, name: &str) -> String {
    if parent == ROOT_PATH {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Path of the container holding `path`
pub fn parent_path(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => ROOT_PATH,
        Some((parent, _)) => parent,
    }
}

/// Last component of `path`
pub fn leaf_name(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, leaf)| leaf).unwrap_or(path)
}

/// Reject names that cannot be a single path component
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(StoreError::InvalidState(format!(
            "invalid object name '{}'",
            name
        )));
    }
    Ok(())
}
