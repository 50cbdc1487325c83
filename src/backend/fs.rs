//! Directory-backed object store.
//!
//! Each object is one file in a flat directory. File names are the
//! percent-encoded key plus `.obj`; bodies are framed as
//!
//! ```text
//! magic(4) | version(1) | written_at(i64 LE) | len(u64 LE) | body | crc32(u32 LE)
//! ```
//!
//! Writes go to a temporary file that is renamed into place, so readers never
//! observe a half-written object.

use crate::backend::ObjectStore;
use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, Result};
use crate::types::{ObjectInfo, Timestamp};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::warn;

/// Magic bytes for object files.
const OBJECT_MAGIC: &[u8; 4] = b"TWC\0";

/// Current object format version.
const OBJECT_VERSION: u8 = 1;

/// magic + version + written_at + len
const HEADER_LEN: usize = 4 + 1 + 8 + 8;

const OBJECT_EXT: &str = ".obj";
const URL_SCHEME: &str = "file://";

/// Object store rooted at a directory.
pub struct FsObjectStore {
    /// Base directory for objects.
    path: PathBuf,

    /// LRU cache of recently read bodies, keyed by url.
    cache: Mutex<LruCache<String, Vec<u8>>>,

    clock: Arc<dyn Clock>,
}

impl FsObjectStore {
    /// Open (creating if needed) a store at `path`.
    pub fn new(path: impl AsRef<Path>, cache_size: usize) -> Result<Self> {
        Self::with_clock(path, cache_size, Arc::new(SystemClock))
    }

    pub fn with_clock(
        path: impl AsRef<Path>,
        cache_size: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;

        let cache_size = NonZeroUsize::new(cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            path,
            cache: Mutex::new(LruCache::new(cache_size)),
            clock,
        })
    }

    pub fn root(&self) -> &Path {
        &self.path
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.path.join(format!("{}{}", encode_key(key), OBJECT_EXT))
    }

    /// Map a url back to a file path inside this store.
    fn path_from_url(&self, url: &str) -> Result<PathBuf> {
        let raw = url
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| CacheError::Storage(format!("not a file url: {url}")))?;
        let path = PathBuf::from(raw);

        let inside = path.parent() == Some(self.path.as_path())
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(OBJECT_EXT));
        if !inside {
            return Err(CacheError::Storage(format!(
                "url {url} is outside store root {}",
                self.path.display()
            )));
        }
        Ok(path)
    }

    async fn read_written_at(path: &Path) -> Result<Timestamp> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut header = [0u8; HEADER_LEN];
        file.read_exact(&mut header).await?;
        let (written_at, _) = parse_header(&header)?;
        Ok(written_at)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.path).await?;

        while let Some(entry) = dir.next_entry().await? {
            let os_name = entry.file_name();
            let file_name = os_name.to_string_lossy();
            let Some(encoded) = file_name.strip_suffix(OBJECT_EXT) else {
                continue;
            };
            let Some(key) = decode_key(encoded) else {
                continue;
            };
            if !key.starts_with(prefix) {
                continue;
            }

            let path = entry.path();
            let size = entry.metadata().await?.len();
            let written_at = match Self::read_written_at(&path).await {
                Ok(ts) => ts,
                Err(e) => {
                    // Unreadable headers sort as oldest so the reaper clears them first.
                    warn!(key = %key, error = %e, "object header unreadable");
                    Timestamp(0)
                }
            };

            objects.push(ObjectInfo {
                url: format!("{URL_SCHEME}{}", path.display()),
                key,
                size,
                written_at,
            });
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<String> {
        let path = self.object_path(key);
        let temp = path.with_extension("tmp");

        let frame = encode_frame(self.clock.now(), &body);
        tokio::fs::write(&temp, &frame).await?;
        tokio::fs::rename(&temp, &path).await?;

        let url = format!("{URL_SCHEME}{}", path.display());
        self.cache.lock().put(url.clone(), body);
        Ok(url)
    }

    async fn get(&self, url: &str) -> Result<Option<Vec<u8>>> {
        if let Some(cached) = self.cache.lock().get(url).cloned() {
            return Ok(Some(cached));
        }

        let path = self.path_from_url(url)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let (_, body) = decode_frame(&bytes)?;
        self.cache.lock().put(url.to_string(), body.clone());
        Ok(Some(body))
    }

    async fn delete(&self, url: &str) -> Result<bool> {
        let path = self.path_from_url(url)?;
        self.cache.lock().pop(url);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{URL_SCHEME}{}", self.object_path(key).display())
    }
}

fn encode_frame(written_at: Timestamp, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + body.len() + 4);
    frame.extend_from_slice(OBJECT_MAGIC);
    frame.push(OBJECT_VERSION);
    frame.extend_from_slice(&written_at.0.to_le_bytes());
    frame.extend_from_slice(&(body.len() as u64).to_le_bytes());
    frame.extend_from_slice(body);
    frame.extend_from_slice(&crc32fast::hash(body).to_le_bytes());
    frame
}

fn parse_header(header: &[u8]) -> Result<(Timestamp, usize)> {
    if header.len() < HEADER_LEN {
        return Err(CacheError::Corruption("object shorter than header".into()));
    }
    if &header[0..4] != OBJECT_MAGIC {
        return Err(CacheError::Corruption("invalid object magic".into()));
    }
    if header[4] != OBJECT_VERSION {
        return Err(CacheError::Corruption(format!(
            "unsupported object version: {}",
            header[4]
        )));
    }

    let mut ts = [0u8; 8];
    ts.copy_from_slice(&header[5..13]);
    let mut len = [0u8; 8];
    len.copy_from_slice(&header[13..21]);

    let len = usize::try_from(u64::from_le_bytes(len))
        .map_err(|_| CacheError::Corruption("object length overflows".into()))?;
    Ok((Timestamp(i64::from_le_bytes(ts)), len))
}

fn decode_frame(bytes: &[u8]) -> Result<(Timestamp, Vec<u8>)> {
    let (written_at, len) = parse_header(bytes)?;

    let body_end = HEADER_LEN
        .checked_add(len)
        .ok_or_else(|| CacheError::Corruption("object length overflows".into()))?;
    if bytes.len() != body_end + 4 {
        return Err(CacheError::Corruption(format!(
            "object truncated: expected {} bytes, found {}",
            body_end + 4,
            bytes.len()
        )));
    }

    let body = &bytes[HEADER_LEN..body_end];
    let mut crc = [0u8; 4];
    crc.copy_from_slice(&bytes[body_end..]);
    let stored = u32::from_le_bytes(crc);
    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(CacheError::ChecksumMismatch {
            expected: stored,
            got: computed,
        });
    }

    Ok((written_at, body.to_vec()))
}

/// Percent-encode everything outside `[A-Za-z0-9_-]`.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn decode_key(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
