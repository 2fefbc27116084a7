// Copyright 2016 Mozilla Foundation
//
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

use crate::cache::utils::{key_path, TEMP_ENTRY_PREFIX};
use crate::cache::{Cache, CacheRead, CacheWrite, Storage};
use crate::util::format_size;
use fs_err as fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

use crate::errors::*;

/// A cache that stores entries at local disk paths.
///
/// Entries live at `<root>/<k0>/<k1>/<k2>/<key>`. Every write goes to a
/// temporary file in the destination directory first and is renamed into
/// place, so any number of processes may share one root.
#[derive(Clone, Debug)]
pub struct DiskCache {
    /// The root directory of the cache.
    root: PathBuf,
    /// Advisory size limit, reported but not enforced.
    max_size: u64,
}

impl DiskCache {
    /// Create a new `DiskCache` rooted at `root`, with `max_size` as the reported limit.
    pub fn new<T: Into<PathBuf>>(root: T, max_size: u64) -> DiskCache {
        DiskCache {
            root: root.into(),
            max_size,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All regular files under the root, in-flight temporaries included.
    fn files(&self) -> impl Iterator<Item = walkdir::DirEntry> {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
    }

    /// The number of complete entries in the cache.
    pub fn entry_count(&self) -> u64 {
        self.files()
            .filter(|e| !e.file_name().to_string_lossy().starts_with(TEMP_ENTRY_PREFIX))
            .count() as u64
    }

    /// Remove every entry, and any temporary file left behind by an
    /// interrupted store. The root directory itself is kept.
    pub fn clear(&self) -> Result<()> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        debug!("Cleared cache at {:?}", self.root);
        Ok(())
    }
}

impl Storage for DiskCache {
    fn get(&self, key: &str) -> Result<Cache> {
        trace!("DiskCache::get({})", key);
        let path = key_path(&self.root, key)?;
        let f = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Cache::Miss),
            Err(e) => return Err(e.into()),
        };
        let entry = CacheRead::from(f).with_context(|| format!("corrupt cache entry {:?}", path))?;
        Ok(Cache::Hit(entry))
    }

    fn put(&self, key: &str, entry: CacheWrite) -> Result<Duration> {
        trace!("DiskCache::put({})", key);
        let start = Instant::now();
        let path = key_path(&self.root, key)?;
        let dir = match path.parent() {
            Some(dir) => dir,
            None => bail!("cache entry {:?} has no parent directory", path),
        };
        fs::create_dir_all(dir)?;
        let bytes = entry.finish()?;
        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_ENTRY_PREFIX)
            .tempfile_in(dir)
            .with_context(|| format!("failed to create temporary entry in {:?}", dir))?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;
        tmp.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("failed to move cache entry into place at {:?}", path))?;
        Ok(start.elapsed())
    }

    fn location(&self) -> String {
        format!("Local disk: {:?}", self.root)
    }

    fn current_size(&self) -> Result<Option<u64>> {
        let size = self
            .files()
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum::<u64>();
        trace!(
            "DiskCache size {} of {}",
            format_size(size),
            format_size(self.max_size)
        );
        Ok(Some(size))
    }

    fn max_size(&self) -> Result<Option<u64>> {
        Ok(Some(self.max_size))
    }
}
