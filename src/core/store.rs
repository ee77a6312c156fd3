//! Page store: page cache, allocation and catalog persistence for one file
//!
//! Every object of an open container shares one [`Store`] through a
//! [`SharedStore`] handle. Datasets address their bytes as streams (data and
//! heap) whose pages are allocated on demand; writes land in an LRU page
//! cache and reach the file when evicted or on [`Store::flush`].

use crate::core::allocator::PageAllocator;
use crate::core::catalog::{Catalog, ObjectId, ObjectMeta, Stream};
use crate::core::error::{Result, StoreError};
use crate::core::header::{Header, PAGE_SIZE};
use crate::core::io::{CreateMode, PageFile};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Handle shared by every object of one container file
pub type SharedStore = Arc<Mutex<Store>>;

/// Default page cache capacity (1 MiB of 4 KiB pages)
pub const DEFAULT_CACHE_PAGES: usize = 256;

/// Default vector window size, in pages of encoded elements
pub const DEFAULT_WINDOW_PAGES: usize = 4;

/// Tuning knobs for an open container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Pages held by the write-back page cache
    pub cache_pages: usize,

    /// Default vector window size in pages
    pub window_pages: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            cache_pages: DEFAULT_CACHE_PAGES,
            window_pages: DEFAULT_WINDOW_PAGES,
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_pages(mut self, pages: usize) -> Self {
        self.cache_pages = pages.max(1);
        self
    }

    pub fn window_pages(mut self, pages: usize) -> Self {
        self.window_pages = pages.max(1);
        self
    }

    /// Default window length in elements for a given element width
    pub fn default_window(&self, width: usize) -> u64 {
        ((self.window_pages * PAGE_SIZE) / width.max(1)).max(1) as u64
    }
}

/// Which byte stream of a dataset to address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Data,
    Heap,
}

/// Store-level counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total_pages: u64,
    pub free_pages: u64,
    pub objects: usize,
    pub file_bytes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

struct CachedPage {
    data: Vec<u8>,
    dirty: bool,
}

/// What gets serialized into the catalog run
#[derive(Serialize, Deserialize)]
struct CatalogImage {
    catalog: Catalog,
    allocator: PageAllocator,
}

pub struct Store {
    file: PageFile,
    header: Header,
    catalog: Catalog,
    allocator: PageAllocator,
    cache: LruCache<u64, CachedPage>,
    options: StoreOptions,
    catalog_dirty: bool,
    cache_hits: u64,
    cache_misses: u64,
}

impl Store {
    /// Create an empty container file
    pub fn create<P: AsRef<Path>>(path: P, mode: CreateMode, options: StoreOptions) -> Result<Self> {
        let header = Header::new();
        let file = PageFile::create(&path, &header, mode)?;
        info!("Created container {:?}", path.as_ref());

        Ok(Store {
            file,
            header,
            catalog: Catalog::new(),
            allocator: PageAllocator::new(),
            cache: LruCache::new(cache_capacity(&options)),
            options,
            catalog_dirty: true,
            cache_hits: 0,
            cache_misses: 0,
        })
    }

    /// Open an existing container file
    pub fn open<P: AsRef<Path>>(path: P, read_only: bool, options: StoreOptions) -> Result<Self> {
        let mut file = PageFile::open(&path, read_only)?;
        let header = file.read_header()?;
        header.validate()?;

        let (catalog, mut allocator) = if header.catalog_pages == 0 {
            (Catalog::new(), PageAllocator::new())
        } else {
            let bytes = file.read_run(header.catalog_page, header.catalog_len as usize)?;
            if crc32fast::hash(&bytes) != header.catalog_crc {
                return Err(StoreError::ChecksumMismatch);
            }
            let mut image: CatalogImage = serde_json::from_slice(&bytes)?;
            image.catalog.rebuild_index();
            (image.catalog, image.allocator)
        };
        // The catalog run stays allocated until the next flush replaces it
        allocator.ensure_total(header.catalog_page + header.catalog_pages);

        info!(
            "Opened container {:?} ({} objects, {} pages{})",
            path.as_ref(),
            catalog.object_count(),
            header.total_pages,
            if read_only { ", read-only" } else { "" }
        );

        Ok(Store {
            file,
            header,
            catalog,
            allocator,
            cache: LruCache::new(cache_capacity(&options)),
            options,
            catalog_dirty: false,
            cache_hits: 0,
            cache_misses: 0,
        })
    }

    /// Wrap into the shared handle handed to objects
    pub fn shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn is_read_only(&self) -> bool {
        self.file.is_read_only()
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        self.catalog_dirty = true;
        &mut self.catalog
    }

    /// Metadata of a live object
    pub fn object(&self, id: ObjectId) -> Result<&ObjectMeta> {
        self.catalog
            .get(id)
            .ok_or_else(|| StoreError::NotFound(format!("object #{}", id)))
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Result<&mut ObjectMeta> {
        self.catalog_dirty = true;
        self.catalog
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("object #{}", id)))
    }

    /// Unlink `path` and release the pages of every object that went away
    pub fn unlink(&mut self, path: &str) -> Result<usize> {
        self.check_writable()?;
        let released = self.catalog_mut().unlink(path)?;
        for meta in &released {
            self.release_pages(&meta.data.pages);
            self.release_pages(&meta.heap.pages);
        }
        debug!("Unlinked {} ({} objects released)", path, released.len());
        Ok(released.len())
    }

    pub fn stream_len(&self, id: ObjectId, kind: StreamKind) -> Result<u64> {
        let meta = self.object(id)?;
        Ok(match kind {
            StreamKind::Data => meta.data.len,
            StreamKind::Heap => meta.heap.len,
        })
    }

    /// Read `out.len()` bytes at `offset`; bytes never written read as zero
    pub fn read_at(&mut self, id: ObjectId, kind: StreamKind, offset: u64, out: &mut [u8]) -> Result<()> {
        let stream = self.stream_ref(id, kind)?.clone();
        let mut done = 0usize;
        while done < out.len() {
            let pos = offset + done as u64;
            let page_index = (pos / PAGE_SIZE as u64) as usize;
            let within = (pos % PAGE_SIZE as u64) as usize;
            let take = (PAGE_SIZE - within).min(out.len() - done);

            match stream.pages.get(page_index) {
                Some(&page_id) => {
                    let page = self.page(page_id)?;
                    out[done..done + take].copy_from_slice(&page.data[within..within + take]);
                }
                None => out[done..done + take].fill(0),
            }
            done += take;
        }
        Ok(())
    }

    /// Write `data` at `offset`, allocating pages as the stream grows
    pub fn write_at(&mut self, id: ObjectId, kind: StreamKind, offset: u64, data: &[u8]) -> Result<()> {
        self.check_writable()?;
        let mut stream = std::mem::take(self.stream_mut(id, kind)?);
        let result = self.write_stream(&mut stream, offset, data);
        *self.stream_mut(id, kind)? = stream;
        result
    }

    /// Shrink (or logically extend) a stream to `len` bytes
    pub fn truncate(&mut self, id: ObjectId, kind: StreamKind, len: u64) -> Result<()> {
        self.check_writable()?;
        let mut stream = std::mem::take(self.stream_mut(id, kind)?);

        let keep = len.div_ceil(PAGE_SIZE as u64) as usize;
        if stream.pages.len() > keep {
            let dropped = stream.pages.split_off(keep);
            self.release_pages(&dropped);
        }
        // Clear the tail of the last kept page so a later extension reads zeros
        let tail = (len % PAGE_SIZE as u64) as usize;
        if tail != 0 && len < stream.len {
            if let Some(&last) = stream.pages.get(keep - 1) {
                let page = self.page(last)?;
                page.data[tail..].fill(0);
                page.dirty = true;
            }
        }
        stream.len = len;

        *self.stream_mut(id, kind)? = stream;
        Ok(())
    }

    /// Write dirty pages and persist the catalog
    pub fn flush(&mut self) -> Result<()> {
        if self.is_read_only() {
            return Ok(());
        }

        let mut written = 0usize;
        for (&page_id, page) in self.cache.iter_mut() {
            if page.dirty {
                self.file.write_page_data(page_id, &page.data)?;
                page.dirty = false;
                written += 1;
            }
        }

        if self.catalog_dirty || self.header.catalog_pages == 0 {
            self.write_catalog()?;
        }
        self.file.sync()?;
        debug!("Flushed {:?}: {} pages written", self.file.path(), written);
        Ok(())
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            total_pages: self.allocator.total_pages(),
            free_pages: self.allocator.free_pages(),
            objects: self.catalog.object_count(),
            file_bytes: self.file.len_bytes().unwrap_or(0),
            cache_hits: self.cache_hits,
            cache_misses: self.cache_misses,
        }
    }

    fn write_catalog(&mut self) -> Result<()> {
        if self.header.catalog_pages > 0 {
            self.allocator
                .free_run(self.header.catalog_page, self.header.catalog_pages);
        }
        let total = self.allocator.trim_tail();

        let bytes = serde_json::to_vec(&CatalogImage {
            catalog: self.catalog.clone(),
            allocator: self.allocator.clone(),
        })?;
        let pages = (bytes.len() as u64).div_ceil(PAGE_SIZE as u64).max(1);
        let first = self.allocator.allocate_tail(pages);
        debug_assert_eq!(first, total);

        self.file.write_run(first, &bytes)?;

        self.header.total_pages = self.allocator.total_pages();
        self.header.catalog_page = first;
        self.header.catalog_pages = pages;
        self.header.catalog_len = bytes.len() as u64;
        self.header.catalog_crc = crc32fast::hash(&bytes);

        self.file.set_len_pages(self.header.total_pages)?;
        self.file.write_header(&self.header)?;
        self.catalog_dirty = false;
        Ok(())
    }

    fn write_stream(&mut self, stream: &mut Stream, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset + data.len() as u64;
        let needed = end.div_ceil(PAGE_SIZE as u64) as usize;
        while stream.pages.len() < needed {
            let page_id = self.allocator.allocate();
            // Reused pages may hold stale bytes
            self.install(page_id, vec![0u8; PAGE_SIZE], true)?;
            stream.pages.push(page_id);
        }

        let mut done = 0usize;
        while done < data.len() {
            let pos = offset + done as u64;
            let page_index = (pos / PAGE_SIZE as u64) as usize;
            let within = (pos % PAGE_SIZE as u64) as usize;
            let take = (PAGE_SIZE - within).min(data.len() - done);

            let page = self.page(stream.pages[page_index])?;
            page.data[within..within + take].copy_from_slice(&data[done..done + take]);
            page.dirty = true;
            done += take;
        }
        stream.len = stream.len.max(end);
        Ok(())
    }

    /// Cached page, loading it from disk on a miss
    fn page(&mut self, page_id: u64) -> Result<&mut CachedPage> {
        if self.cache.contains(&page_id) {
            self.cache_hits += 1;
        } else {
            self.cache_misses += 1;
            let data = self.file.read_page_data(page_id)?;
            self.install(page_id, data, false)?;
        }
        self.cache
            .get_mut(&page_id)
            .ok_or_else(|| StoreError::InvalidState(format!("page {} missing from cache", page_id)))
    }

    fn install(&mut self, page_id: u64, data: Vec<u8>, dirty: bool) -> Result<()> {
        if let Some((evicted_id, evicted)) = self.cache.push(page_id, CachedPage { data, dirty }) {
            if evicted_id != page_id && evicted.dirty {
                self.file.write_page_data(evicted_id, &evicted.data)?;
            }
        }
        Ok(())
    }

    fn release_pages(&mut self, pages: &[u64]) {
        for page_id in pages {
            self.cache.pop(page_id);
        }
        self.allocator.free(pages);
    }

    fn stream_ref(&self, id: ObjectId, kind: StreamKind) -> Result<&Stream> {
        let meta = self.object(id)?;
        Ok(match kind {
            StreamKind::Data => &meta.data,
            StreamKind::Heap => &meta.heap,
        })
    }

    fn stream_mut(&mut self, id: ObjectId, kind: StreamKind) -> Result<&mut Stream> {
        let meta = self.object_mut(id)?;
        Ok(match kind {
            StreamKind::Data => &mut meta.data,
            StreamKind::Heap => &mut meta.heap,
        })
    }

    fn check_writable(&self) -> Result<()> {
        if self.is_read_only() {
            return Err(StoreError::ReadOnly(self.file.path().display().to_string()));
        }
        Ok(())
    }
}

fn cache_capacity(options: &StoreOptions) -> NonZeroUsize {
    NonZeroUsize::new(options.cache_pages).unwrap_or(NonZeroUsize::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::ObjectMeta;
    use crate::core::dtype::Dtype;
    use tempfile::TempDir;

    fn new_store(dir: &TempDir, options: StoreOptions) -> Store {
        Store::create(dir.path().join("s.cst"), CreateMode::Truncate, options).unwrap()
    }

    #[test]
    fn test_stream_write_read_across_pages() {
        let dir = TempDir::new().unwrap();
        let mut store = new_store(&dir, StoreOptions::default());
        let id = store
            .catalog_mut()
            .insert("/v", ObjectMeta::vector(Dtype::Char, 64))
            .unwrap();

        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 253) as u8).collect();
        store.write_at(id, StreamKind::Data, 100, &payload).unwrap();
        assert_eq!(store.stream_len(id, StreamKind::Data).unwrap(), 10_100);

        let mut out = vec![0xFFu8; 10_200];
        store.read_at(id, StreamKind::Data, 0, &mut out).unwrap();
        assert!(out[..100].iter().all(|&b| b == 0));
        assert_eq!(&out[100..10_100], &payload[..]);
        assert!(out[10_100..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_eviction_writes_back() {
        let dir = TempDir::new().unwrap();
        let mut store = new_store(&dir, StoreOptions::new().cache_pages(2));
        let id = store
            .catalog_mut()
            .insert("/v", ObjectMeta::vector(Dtype::Char, 64))
            .unwrap();

        let payload: Vec<u8> = (0..5 * PAGE_SIZE).map(|i| (i % 97) as u8).collect();
        store.write_at(id, StreamKind::Data, 0, &payload).unwrap();

        let mut out = vec![0u8; payload.len()];
        store.read_at(id, StreamKind::Data, 0, &mut out).unwrap();
        assert_eq!(out, payload);
        assert!(store.stats().cache_misses > 0);
    }

    #[test]
    fn test_flush_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.cst");
        {
            let mut store = Store::create(&path, CreateMode::Truncate, StoreOptions::default()).unwrap();
            let id = store
                .catalog_mut()
                .insert("/v", ObjectMeta::vector(Dtype::Int, 64))
                .unwrap();
            store.write_at(id, StreamKind::Data, 0, b"persisted").unwrap();
            store.flush().unwrap();
        }

        let mut store = Store::open(&path, true, StoreOptions::default()).unwrap();
        let id = store.catalog().lookup("/v").unwrap();
        let mut out = vec![0u8; 9];
        store.read_at(id, StreamKind::Data, 0, &mut out).unwrap();
        assert_eq!(&out, b"persisted");
        assert!(matches!(
            store.write_at(id, StreamKind::Data, 0, b"x"),
            Err(StoreError::ReadOnly(_))
        ));
    }

    #[test]
    fn test_truncate_and_unlink_release_pages() {
        let dir = TempDir::new().unwrap();
        let mut store = new_store(&dir, StoreOptions::default());
        let id = store
            .catalog_mut()
            .insert("/v", ObjectMeta::vector(Dtype::Char, 64))
            .unwrap();
        store
            .write_at(id, StreamKind::Data, 0, &vec![7u8; 3 * PAGE_SIZE])
            .unwrap();

        store.truncate(id, StreamKind::Data, 10).unwrap();
        assert_eq!(store.stats().free_pages, 2);

        // Extending again exposes zeros, not the old bytes
        let mut out = vec![0u8; 20];
        store.read_at(id, StreamKind::Data, 0, &mut out).unwrap();
        assert_eq!(&out[..10], &[7u8; 10]);
        assert_eq!(&out[10..], &[0u8; 10]);

        assert_eq!(store.unlink("/v").unwrap(), 1);
        store.flush().unwrap();
        // Header page plus the catalog run remain
        assert_eq!(store.stats().total_pages, 1 + store.header.catalog_pages);
    }

    #[test]
    fn test_corrupt_catalog_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.cst");
        let catalog_page = {
            let mut store = Store::create(&path, CreateMode::Truncate, StoreOptions::default()).unwrap();
            store.flush().unwrap();
            store.header.catalog_page
        };

        let mut file = PageFile::open(&path, false).unwrap();
        let mut page = file.read_page_data(catalog_page).unwrap();
        page[0] ^= 0xFF;
        file.write_page_data(catalog_page, &page).unwrap();
        drop(file);

        assert!(matches!(
            Store::open(&path, false, StoreOptions::default()),
            Err(StoreError::ChecksumMismatch)
        ));
    }
}
