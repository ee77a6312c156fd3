//! Container files
//!
//! [`StoreFile`] owns the page store of one file and its root [`Group`];
//! it dereferences to the root group, so children are opened directly on
//! the file.
//!
//! ```rust,no_run
//! use chipstore::{Dtype, OpenFlags, StoreFile};
//!
//! let mut file = StoreFile::open("results.cst", OpenFlags::OPEN_OR_CREATE)?;
//! file.add_header("program", "chipstore-util")?;
//! let group = file.open_group("runs/2024", OpenFlags::OPEN_OR_CREATE)?;
//! group.open_vector("signal", Some(Dtype::Double), OpenFlags::OPEN_OR_CREATE)?;
//! file.close()?;
//! # Ok::<(), chipstore::StoreError>(())
//! ```

use crate::core::error::{Result, StoreError};
use crate::core::group::Group;
use crate::core::header::MAGIC;
use crate::core::io::CreateMode;
use crate::core::object::{OpenFlags, StorageObject};
use crate::core::store::{SharedStore, Store, StoreOptions, StoreStats};
use std::fs::File;
use std::io::Read;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct StoreFile {
    root: Group,
    store: SharedStore,
    closed: bool,
}

impl StoreFile {
    /// Open or create a container file with default options
    pub fn open<P: AsRef<Path>>(path: P, flags: OpenFlags) -> Result<StoreFile> {
        Self::open_with(path, flags, StoreOptions::default())
    }

    /// Open or create a container file.
    ///
    /// `REPLACE` truncates any existing file. `CREATE` alone fails with
    /// `AlreadyExists` when the file exists; add `OPEN` to open it instead.
    /// `READONLY` opens without write access and cannot be combined with
    /// creating a file.
    pub fn open_with<P: AsRef<Path>>(path: P, flags: OpenFlags, options: StoreOptions) -> Result<StoreFile> {
        let path = path.as_ref();
        let read_only = flags.contains(OpenFlags::READONLY);
        let display = || path.display().to_string();

        let store = if flags.contains(OpenFlags::REPLACE) {
            if read_only {
                return Err(StoreError::ReadOnly(display()));
            }
            Store::create(path, CreateMode::Truncate, options)?
        } else if path.exists() {
            if !flags.contains(OpenFlags::OPEN) {
                return Err(StoreError::AlreadyExists(display()));
            }
            Store::open(path, read_only, options)?
        } else if flags.contains(OpenFlags::CREATE) {
            if read_only {
                return Err(StoreError::ReadOnly(display()));
            }
            Store::create(path, CreateMode::Exclusive, options)?
        } else {
            return Err(StoreError::NotFound(display()));
        };

        let store = store.shared();
        let root = Group::root(&store, read_only)?;
        Ok(StoreFile {
            root,
            store,
            closed: false,
        })
    }

    /// Whether `path` starts with the container magic
    pub fn is_store_file<P: AsRef<Path>>(path: P) -> bool {
        let mut magic = [0u8; 8];
        File::open(path)
            .and_then(|mut f| f.read_exact(&mut magic))
            .map(|_| magic == MAGIC)
            .unwrap_or(false)
    }

    pub fn file_path(&self) -> PathBuf {
        self.store.lock().path().to_path_buf()
    }

    pub fn root(&self) -> &Group {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Group {
        &mut self.root
    }

    pub fn stats(&self) -> StoreStats {
        self.store.lock().stats()
    }

    /// Push every open object and the catalog to disk
    pub fn flush(&mut self) -> Result<()> {
        self.root.flush()?;
        self.store.lock().flush()
    }

    /// Close every open object and write the file. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let closed = self.root.close();
        let flushed = self.store.lock().flush();
        info!("Closed container {:?}", self.store.lock().path());
        closed.and(flushed)
    }
}

impl Deref for StoreFile {
    type Target = Group;

    fn deref(&self) -> &Group {
        &self.root
    }
}

impl DerefMut for StoreFile {
    fn deref_mut(&mut self) -> &mut Group {
        &mut self.root
    }
}

impl Drop for StoreFile {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close container: {}", e);
        }
    }
}
