// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::utils::{get_file_mode, set_file_mode};
use crate::errors::*;
use crate::util::Digest;
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Name of the compiled object inside a cache entry.
const OBJECT: &str = "obj";
const STDOUT: &str = "stdout";
const STDERR: &str = "stderr";
const META: &str = "meta";

/// Result of a cache lookup.
pub enum Cache {
    /// Result was found in cache.
    Hit(CacheRead),
    /// Result was not found in cache.
    Miss,
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Cache::Hit(_) => write!(f, "Cache::Hit(...)"),
            Cache::Miss => write!(f, "Cache::Miss"),
        }
    }
}

/// CacheMode is used to represent which mode we are using.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CacheMode {
    /// Only read cache from storage.
    ReadOnly,
    /// Full support of cache storage: read and write.
    ReadWrite,
}

/// Facts about a compilation recorded next to its outputs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// The exit code of the compiler that produced the entry.
    pub exit_code: i32,
    /// Size in bytes of the stored object.
    pub object_size: u64,
    /// BLAKE3 digest of the stored object.
    pub object_digest: String,
}

/// Trait objects can't be bounded by more than one non-builtin trait.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Data stored in the compiler cache.
pub struct CacheRead {
    zip: ZipArchive<Box<dyn ReadSeek>>,
}

/// Represents a failure to decompress stored object data.
#[derive(Debug)]
pub struct DecompressionFailure;

impl std::fmt::Display for DecompressionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to decompress content")
    }
}

impl std::error::Error for DecompressionFailure {}

impl CacheRead {
    /// Create a cache entry from `reader`.
    pub fn from<R>(reader: R) -> Result<CacheRead>
    where
        R: ReadSeek + 'static,
    {
        let z = ZipArchive::new(Box::new(reader) as Box<dyn ReadSeek>)
            .context("Failed to parse cache entry")?;
        Ok(CacheRead { zip: z })
    }

    /// Get an object from this cache entry at `name` and write it to `to`.
    /// If the file has stored permissions, return them.
    pub fn get_object<T>(&mut self, name: &str, to: &mut T) -> Result<Option<u32>>
    where
        T: Write,
    {
        let file = self.zip.by_name(name).or(Err(DecompressionFailure))?;
        if file.compression() != CompressionMethod::Stored {
            bail!(DecompressionFailure);
        }
        let mode = file.unix_mode();
        zstd::stream::copy_decode(file, to).or(Err(DecompressionFailure))?;
        Ok(mode)
    }

    /// Get the stdout from this cache entry. Empty output is not stored,
    /// so a missing member reads as empty.
    pub fn get_stdout(&mut self) -> Result<Vec<u8>> {
        self.get_bytes(STDOUT)
    }

    /// Get the stderr from this cache entry, empty if it was not stored.
    pub fn get_stderr(&mut self) -> Result<Vec<u8>> {
        self.get_bytes(STDERR)
    }

    fn get_bytes(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        match self.zip.by_name(name) {
            Ok(_) => {}
            Err(ZipError::FileNotFound) => return Ok(bytes),
            Err(e) => return Err(e).with_context(|| format!("failed to read `{}`", name)),
        }
        self.get_object(name, &mut bytes)
            .with_context(|| format!("failed to read `{}`", name))?;
        Ok(bytes)
    }

    /// Get the recorded facts about the compilation.
    pub fn get_meta(&mut self) -> Result<EntryMeta> {
        let mut bytes = Vec::new();
        self.get_object(META, &mut bytes)
            .context("cache entry has no metadata")?;
        serde_json::from_slice(&bytes).context("failed to parse cache entry metadata")
    }

    /// Decompress the stored object into memory.
    pub fn get_object_bytes(&mut self) -> Result<(Vec<u8>, Option<u32>)> {
        let mut bytes = Vec::new();
        let mode = self.get_object(OBJECT, &mut bytes)?;
        Ok((bytes, mode))
    }
}

/// Write `bytes` to `path`, replacing whatever is there in one step.
///
/// The data goes to a temporary file next to `path` which is then renamed
/// over it, so concurrent readers see either the old file or the complete
/// new one.
pub fn write_object_atomically(path: &Path, bytes: &[u8], mode: Option<u32>) -> Result<()> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        Some(_) => Path::new("."),
        None => bail!("Output file without a parent directory!"),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temporary file in {:?}", dir))?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to move object into place at {:?}", path))?;
    if let Some(mode) = mode {
        set_file_mode(path, mode)?;
    }
    Ok(())
}

/// Data to be stored in the compiler cache.
pub struct CacheWrite {
    zip: ZipWriter<Cursor<Vec<u8>>>,
}

impl CacheWrite {
    /// Create a new, empty cache entry.
    pub fn new() -> CacheWrite {
        CacheWrite {
            zip: ZipWriter::new(Cursor::new(vec![])),
        }
    }

    /// Create a complete cache entry for a compilation: the object at
    /// `object_path`, the captured output and the exit code.
    pub fn from_compilation(
        object_path: &Path,
        stdout: &[u8],
        stderr: &[u8],
        exit_code: i32,
    ) -> Result<CacheWrite> {
        let mut f = fs::File::open(object_path)
            .with_context(|| format!("failed to open file `{:?}`", object_path))?;
        let mode = get_file_mode(f.file())?;
        let mut object = Vec::new();
        f.read_to_end(&mut object)?;

        let mut digest = Digest::new();
        digest.update(&object);
        let meta = EntryMeta {
            exit_code,
            object_size: object.len() as u64,
            object_digest: digest.finish(),
        };

        let mut entry = CacheWrite::new();
        entry
            .put_object(OBJECT, &mut Cursor::new(object), mode)
            .with_context(|| format!("failed to put object `{:?}` in cache entry", object_path))?;
        entry.put_stdout(stdout)?;
        entry.put_stderr(stderr)?;
        entry.put_meta(&meta)?;
        Ok(entry)
    }

    /// Add an object containing the contents of `from` to this cache entry at `name`.
    /// If `mode` is `Some`, store the file entry with that mode.
    pub fn put_object<T>(&mut self, name: &str, from: &mut T, mode: Option<u32>) -> Result<()>
    where
        T: Read,
    {
        // We're going to declare the compression method as "stored",
        // but we're actually going to store zstd-compressed blobs.
        let opts = FileOptions::default().compression_method(CompressionMethod::Stored);
        let opts = if let Some(mode) = mode {
            opts.unix_permissions(mode)
        } else {
            opts
        };
        self.zip
            .start_file(name, opts)
            .context("Failed to start cache entry object")?;

        let compression_level = std::env::var("OBJCACHE_CACHE_ZSTD_LEVEL")
            .ok()
            .and_then(|value| value.parse::<i32>().ok())
            .unwrap_or(3);
        zstd::stream::copy_encode(from, &mut self.zip, compression_level)?;
        Ok(())
    }

    pub fn put_stdout(&mut self, bytes: &[u8]) -> Result<()> {
        self.put_bytes(STDOUT, bytes)
    }

    pub fn put_stderr(&mut self, bytes: &[u8]) -> Result<()> {
        self.put_bytes(STDERR, bytes)
    }

    pub fn put_meta(&mut self, meta: &EntryMeta) -> Result<()> {
        let bytes = serde_json::to_vec(meta)?;
        self.put_object(META, &mut Cursor::new(bytes), None)
    }

    fn put_bytes(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        if !bytes.is_empty() {
            let mut cursor = Cursor::new(bytes);
            return self.put_object(name, &mut cursor, None);
        }
        Ok(())
    }

    /// Finish writing data to the cache entry writer, and return the data.
    pub fn finish(self) -> Result<Vec<u8>> {
        let CacheWrite { mut zip } = self;
        let cur = zip.finish().context("Failed to finish cache entry zip")?;
        Ok(cur.into_inner())
    }
}

impl Default for CacheWrite {
    fn default() -> Self {
        Self::new()
    }
}
