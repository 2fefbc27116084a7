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

pub mod cache_io;
pub mod disk;
pub mod readonly;
pub mod storage;
pub(crate) mod utils;

pub use crate::cache::cache_io::*;
pub use crate::cache::storage::*;

use crate::config::Config;
use crate::errors::*;
use std::sync::Arc;

/// Get a suitable `Storage` implementation from configuration.
pub fn storage_from_config(config: &Config) -> Result<Arc<dyn Storage>> {
    let disk = &config.cache.disk;
    trace!("Using DiskCache({:?}, {})", disk.dir, disk.size);
    let storage: Arc<dyn Storage> = Arc::new(disk::DiskCache::new(&disk.dir, disk.size));
    if config.read_only {
        debug!("Wrapping cache storage as read-only");
        return Ok(Arc::new(readonly::ReadOnlyStorage(storage)));
    }
    Ok(storage)
}
