//! Storage engine
//!
//! One container file holds a tree of named objects:
//!
//! - [`vector`] - typed, resizable vectors with a buffered window
//! - [`column`] / [`table`] - vectors tagged with (level, index) coordinates,
//!   grouped into hierarchical tables with a global line index
//! - [`group`] / [`file`] - containers owning their open children, with
//!   ordered header pairs
//!
//! Underneath, [`store`] maps object streams onto 4 KiB pages through an LRU
//! write-back cache and persists the [`catalog`] at the tail of the file.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Page 0: Header                              │
//! │  - Magic "CHIPSTOR", version 1.0            │
//! │  - Catalog run location, length, CRC-32     │
//! ├─────────────────────────────────────────────┤
//! │ Pages 1+: object streams                    │
//! │  - data: fixed-width element encodings      │
//! │  - heap: variable-length string bytes       │
//! ├─────────────────────────────────────────────┤
//! │ Tail run: catalog + allocator (JSON)        │
//! └─────────────────────────────────────────────┘
//! ```

pub mod allocator;
pub mod buffer;
pub mod catalog;
pub mod column;
pub mod dtype;
pub mod error;
pub mod file;
pub mod group;
pub mod header;
pub mod headers;
pub mod io;
pub mod object;
pub mod store;
pub mod table;
pub mod vector;

pub use catalog::{AttrValue, ObjectKind};
pub use column::{Column, ColumnRef};
pub use dtype::{Dtype, Value};
pub use error::{Result, StoreError};
pub use file::StoreFile;
pub use group::{Child, Group};
pub use object::{OpenFlags, StorageObject};
pub use store::{StoreOptions, StoreStats};
pub use table::Table;
pub use vector::Vector;
