//! Configuration for [`FileService`](crate::FileService).
//!
//! ```
//! use recordfile::{FileService, FileServiceConfig};
//!
//! let config = FileServiceConfig {
//!     buffer_size: 16 * 1024,
//!     ..Default::default()
//! };
//! let fs = FileService::new(config);
//! assert_eq!(fs.buffer_size(), 16 * 1024);
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default read/write block buffer size (64 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default gzip compression level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Settings shared by every stream stack a [`FileService`](crate::FileService) builds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileServiceConfig {
    /// Size of the buffers placed between raw I/O, the compressor and the codec.
    pub buffer_size: usize,
    /// Gzip level, 0 (store) through 9 (best). Values above 9 are clamped.
    pub compression_level: u32,
}

impl Default for FileServiceConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl FileServiceConfig {
    /// Parse a config from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::decode("file service config", e))
    }

    /// Buffer size actually used: zero is bumped to one byte.
    pub(crate) fn effective_buffer_size(&self) -> usize {
        self.buffer_size.max(1)
    }

    pub(crate) fn gzip_level(&self) -> flate2::Compression {
        flate2::Compression::new(self.compression_level.min(9))
    }
}
