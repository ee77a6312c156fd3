use crate::core::error::{Result, StoreError};

pub const MAGIC: [u8; 8] = *b"CHIPSTOR";
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;
pub const PAGE_SIZE: usize = 4096;

/// Encoded length of the header fields; the rest of page 0 is zero padding
const HEADER_LEN: usize = 8 + 2 + 2 + 4 + 8 + 8 + 8 + 8 + 4;

/// Container file header (page 0)
///
/// Locates the catalog run, which is rewritten at the tail of the file on
/// every flush. A header with `catalog_pages == 0` describes an empty
/// container that has never been flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Magic number: "CHIPSTOR"
    pub magic: [u8; 8],

    /// Format version (major)
    pub version_major: u16,

    /// Format version (minor)
    pub version_minor: u16,

    /// Page size in bytes (always 4096)
    pub page_size: u32,

    /// Total number of pages in the file, header included
    pub total_pages: u64,

    /// First page of the catalog run
    pub catalog_page: u64,

    /// Number of pages in the catalog run
    pub catalog_pages: u64,

    /// Exact catalog length in bytes
    pub catalog_len: u64,

    /// CRC-32 of the catalog bytes
    pub catalog_crc: u32,
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

impl Header {
    pub fn new() -> Self {
        Header {
            magic: MAGIC,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            page_size: PAGE_SIZE as u32,
            total_pages: 1,
            catalog_page: 0,
            catalog_pages: 0,
            catalog_len: 0,
            catalog_crc: 0,
        }
    }

    /// Validate magic, version and page geometry
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(StoreError::InvalidMagic);
        }

        // Minor versions are forward compatible
        if self.version_major != VERSION_MAJOR {
            return Err(StoreError::UnsupportedVersion {
                major: self.version_major,
                minor: self.version_minor,
            });
        }

        if self.page_size != PAGE_SIZE as u32 {
            return Err(StoreError::InvalidState(format!(
                "unsupported page size {}",
                self.page_size
            )));
        }

        if self.catalog_pages > 0 && self.catalog_page + self.catalog_pages > self.total_pages {
            return Err(StoreError::InvalidState(format!(
                "catalog run {}+{} exceeds {} pages",
                self.catalog_page, self.catalog_pages, self.total_pages
            )));
        }

        Ok(())
    }

    /// Serialize header to one page
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(PAGE_SIZE);

        bytes.extend_from_slice(&self.magic);
        bytes.extend_from_slice(&self.version_major.to_le_bytes());
        bytes.extend_from_slice(&self.version_minor.to_le_bytes());
        bytes.extend_from_slice(&self.page_size.to_le_bytes());
        bytes.extend_from_slice(&self.total_pages.to_le_bytes());
        bytes.extend_from_slice(&self.catalog_page.to_le_bytes());
        bytes.extend_from_slice(&self.catalog_pages.to_le_bytes());
        bytes.extend_from_slice(&self.catalog_len.to_le_bytes());
        bytes.extend_from_slice(&self.catalog_crc.to_le_bytes());

        bytes.resize(PAGE_SIZE, 0);
        bytes
    }

    /// Deserialize header from page 0 bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Insufficient bytes for header",
            )));
        }

        let mut cursor = FieldReader { bytes, offset: 0 };
        let mut magic = [0u8; 8];
        magic.copy_from_slice(cursor.take(8));

        Ok(Header {
            magic,
            version_major: u16::from_le_bytes(cursor.array()),
            version_minor: u16::from_le_bytes(cursor.array()),
            page_size: u32::from_le_bytes(cursor.array()),
            total_pages: u64::from_le_bytes(cursor.array()),
            catalog_page: u64::from_le_bytes(cursor.array()),
            catalog_pages: u64::from_le_bytes(cursor.array()),
            catalog_len: u64::from_le_bytes(cursor.array()),
            catalog_crc: u32::from_le_bytes(cursor.array()),
        })
    }
}

struct FieldReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> FieldReader<'a> {
    fn take(&mut self, len: usize) -> &'a [u8] {
        let field = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        field
    }

    fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let mut header = Header::new();
        header.total_pages = 42;
        header.catalog_page = 40;
        header.catalog_pages = 2;
        header.catalog_len = 5000;
        header.catalog_crc = 0xDEADBEEF;

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), PAGE_SIZE);

        let decoded = Header::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, header);
        decoded.validate().unwrap();
    }

    #[test]
    fn test_header_validation() {
        let mut header = Header::new();
        header.magic = *b"NOTMAGIC";
        assert!(matches!(header.validate(), Err(StoreError::InvalidMagic)));

        let mut header = Header::new();
        header.version_major = 9;
        assert!(matches!(
            header.validate(),
            Err(StoreError::UnsupportedVersion { major: 9, .. })
        ));

        let mut header = Header::new();
        header.catalog_page = 3;
        header.catalog_pages = 2;
        header.total_pages = 4;
        assert!(header.validate().is_err());
    }

    #[test]
    fn test_short_buffer_rejected() {
        assert!(Header::from_bytes(&[0u8; 10]).is_err());
    }
}
