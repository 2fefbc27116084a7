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

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, CacheMode, CacheWrite, Storage};
use crate::errors::*;

pub struct ReadOnlyStorage(pub Arc<dyn Storage>);

impl Storage for ReadOnlyStorage {
    fn get(&self, key: &str) -> Result<Cache> {
        self.0.get(key)
    }

    fn put(&self, _key: &str, _entry: CacheWrite) -> Result<Duration> {
        Err(anyhow!("Cannot write to read-only storage"))
    }

    /// The ReadOnlyStorage cache is always read-only.
    fn check(&self) -> Result<CacheMode> {
        Ok(CacheMode::ReadOnly)
    }

    fn location(&self) -> String {
        self.0.location()
    }

    fn current_size(&self) -> Result<Option<u64>> {
        self.0.current_size()
    }

    fn max_size(&self) -> Result<Option<u64>> {
        self.0.max_size()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::mock_storage::MockStorage;

    #[test]
    fn readonly_storage_is_readonly() {
        let storage = ReadOnlyStorage(Arc::new(MockStorage::new()));
        assert_eq!(storage.check().unwrap(), CacheMode::ReadOnly);
    }

    #[test]
    fn readonly_storage_forwards_basics() {
        let storage = ReadOnlyStorage(Arc::new(MockStorage::new()));
        assert_eq!(storage.location(), "Mock Storage");
        assert_eq!(storage.current_size().unwrap(), None);
        assert_eq!(storage.max_size().unwrap(), None);
    }

    #[test]
    fn readonly_storage_forwards_get() {
        let mock = Arc::new(MockStorage::new());
        mock.next_get(Ok(Cache::Miss));
        let storage = ReadOnlyStorage(mock);
        assert!(matches!(storage.get("abcdef").unwrap(), Cache::Miss));
    }

    #[test]
    fn readonly_storage_put_err() {
        let mock = Arc::new(MockStorage::new());
        let storage = ReadOnlyStorage(mock.clone());
        assert_eq!(
            storage
                .put("abcdef", CacheWrite::new())
                .unwrap_err()
                .to_string(),
            "Cannot write to read-only storage"
        );
        assert_eq!(0, mock.puts().len());
    }
}
