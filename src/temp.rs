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

//! Scoped temporary files for toolchains that can only write their
//! preprocessor output to disk.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

use crate::errors::*;

const TEMPFILE_PREFIX: &str = "objcache-";

/// Hands out uniquely named temporary files inside one directory.
#[derive(Clone, Debug)]
pub struct TempFiles {
    dir: PathBuf,
}

impl TempFiles {
    pub fn new<P: Into<PathBuf>>(dir: P) -> TempFiles {
        TempFiles { dir: dir.into() }
    }

    /// The directory temporary files are created in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create an empty file with a unique name ending in `.{extension}`.
    ///
    /// The file is removed when the returned handle is dropped, whichever
    /// way the owning scope is left.
    pub fn acquire(&self, extension: &str) -> Result<TempFile> {
        let suffix = if extension.is_empty() {
            String::new()
        } else {
            format!(".{}", extension)
        };
        let path = tempfile::Builder::new()
            .prefix(TEMPFILE_PREFIX)
            .suffix(&suffix)
            .tempfile_in(&self.dir)
            .with_context(|| format!("failed to create temporary file in {:?}", self.dir))?
            .into_temp_path();
        trace!("acquired temporary file {:?}", path);
        Ok(TempFile { path })
    }
}

impl Default for TempFiles {
    fn default() -> Self {
        TempFiles::new(env::temp_dir())
    }
}

/// A temporary file owned by exactly one caller.
pub struct TempFile {
    path: TempPath,
}

impl TempFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now, reporting any error instead of swallowing it.
    pub fn release(self) -> Result<()> {
        let TempFile { path } = self;
        path.close().context("failed to remove temporary file")
    }
}

impl fmt::Debug for TempFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TempFile({:?})", self.path())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use fs_err as fs;

    #[test]
    fn test_acquire_uses_extension() {
        let dir = tempfile::tempdir().unwrap();
        let temps = TempFiles::new(dir.path());
        let t = temps.acquire("i").unwrap();
        assert!(t.path().exists());
        assert_eq!(t.path().extension().unwrap(), "i");
        assert_eq!(t.path().parent().unwrap(), dir.path());
    }

    #[test]
    fn test_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let temps = TempFiles::new(dir.path());
        let a = temps.acquire("i").unwrap();
        let b = temps.acquire("i").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_deleted_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let temps = TempFiles::new(dir.path());
        let path = {
            let t = temps.acquire("i").unwrap();
            fs::write(t.path(), b"preprocessed").unwrap();
            t.path().to_owned()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_deleted_on_early_return() {
        fn fails(temps: &TempFiles, seen: &mut Option<PathBuf>) -> Result<()> {
            let t = temps.acquire("i")?;
            *seen = Some(t.path().to_owned());
            bail!("preprocessor blew up")
        }

        let dir = tempfile::tempdir().unwrap();
        let temps = TempFiles::new(dir.path());
        let mut seen = None;
        assert!(fails(&temps, &mut seen).is_err());
        assert!(!seen.unwrap().exists());
    }

    #[test]
    fn test_release() {
        let dir = tempfile::tempdir().unwrap();
        let temps = TempFiles::new(dir.path());
        let t = temps.acquire("").unwrap();
        let path = t.path().to_owned();
        t.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let temps = TempFiles::new(dir.path().join("nope"));
        assert!(temps.acquire("i").is_err());
    }
}
