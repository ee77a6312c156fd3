//! Disk I/O for container files

use crate::core::error::{Result, StoreError};
use crate::core::header::{Header, PAGE_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// How a container file is brought into existence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Truncate any existing file
    Truncate,
    /// Fail if the file already exists
    Exclusive,
}

/// Page-addressed container file
pub struct PageFile {
    file: File,
    path: PathBuf,
    read_only: bool,
}

impl PageFile {
    /// Create a new container file and write its header to page 0
    pub fn create<P: AsRef<Path>>(path: P, header: &Header, mode: CreateMode) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        match mode {
            CreateMode::Truncate => options.create(true).truncate(true),
            CreateMode::Exclusive => options.create_new(true),
        };
        let mut file = options.open(&path).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => {
                StoreError::AlreadyExists(path.as_ref().display().to_string())
            }
            _ => StoreError::Io(e),
        })?;

        file.write_all(&header.to_bytes())?;
        file.flush()?;

        Ok(PageFile {
            file,
            path: path.as_ref().to_path_buf(),
            read_only: false,
        })
    }

    /// Open an existing container file
    pub fn open<P: AsRef<Path>>(path: P, read_only: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => StoreError::NotFound(path.as_ref().display().to_string()),
                _ => StoreError::Io(e),
            })?;

        Ok(PageFile {
            file,
            path: path.as_ref().to_path_buf(),
            read_only,
        })
    }

    /// Read the header (page 0)
    pub fn read_header(&mut self) -> Result<Header> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buffer = vec![0u8; PAGE_SIZE];
        let filled = self.read_available(&mut buffer)?;
        Header::from_bytes(&buffer[..filled])
    }

    /// Write the header (page 0)
    pub fn write_header(&mut self, header: &Header) -> Result<()> {
        self.check_writable()?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header.to_bytes())?;
        Ok(())
    }

    /// Read raw page data.
    ///
    /// Pages past the end of the file read as zeros; allocated pages are
    /// only materialized on disk once written.
    pub fn read_page_data(&mut self, page_id: u64) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; PAGE_SIZE];
        self.file.seek(SeekFrom::Start(page_id * PAGE_SIZE as u64))?;
        self.read_available(&mut buffer)?;
        Ok(buffer)
    }

    /// Write raw page data
    pub fn write_page_data(&mut self, page_id: u64, data: &[u8]) -> Result<()> {
        if data.len() != PAGE_SIZE {
            return Err(StoreError::InvalidState(format!(
                "Page data must be exactly {} bytes, got {}",
                PAGE_SIZE,
                data.len()
            )));
        }
        self.check_writable()?;
        self.file.seek(SeekFrom::Start(page_id * PAGE_SIZE as u64))?;
        self.file.write_all(data)?;
        Ok(())
    }

    /// Write a contiguous byte run starting at `first_page`
    pub fn write_run(&mut self, first_page: u64, data: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.file.seek(SeekFrom::Start(first_page * PAGE_SIZE as u64))?;
        self.file.write_all(data)?;
        let tail = data.len() % PAGE_SIZE;
        if tail != 0 {
            self.file.write_all(&vec![0u8; PAGE_SIZE - tail])?;
        }
        Ok(())
    }

    /// Read `len` bytes of a contiguous run starting at `first_page`
    pub fn read_run(&mut self, first_page: u64, len: usize) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(first_page * PAGE_SIZE as u64))?;
        let mut buffer = vec![0u8; len];
        self.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Resize the file to exactly `pages` pages
    pub fn set_len_pages(&mut self, pages: u64) -> Result<()> {
        self.check_writable()?;
        self.file.set_len(pages * PAGE_SIZE as u64)?;
        Ok(())
    }

    /// Current on-disk length in bytes
    pub fn len_bytes(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Sync all writes to disk
    pub fn sync(&mut self) -> Result<()> {
        if !self.read_only {
            self.file.flush()?;
            self.file.sync_all()?;
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(StoreError::ReadOnly(self.path.display().to_string()));
        }
        Ok(())
    }

    /// Fill as much of `buffer` as the file provides, returning the count
    fn read_available(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buffer.len() {
            match self.file.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}
