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

use fs_err as fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Return a `Vec` with each listed entry converted to an owned `String`.
macro_rules! stringvec {
    ( $( $x:expr ),* ) => {
        vec!($( $x.to_owned(), )*)
    };
}

/// Return a `Vec` with each listed entry converted to an owned `OsString`.
macro_rules! ovec {
    ( $( $x:expr ),* ) => {
        vec!($( ::std::ffi::OsString::from($x), )*)
    };
}

/// Assert that `left != right`.
macro_rules! assert_neq {
    ($left:expr , $right:expr) => {{
        match (&($left), &($right)) {
            (left_val, right_val) => {
                if !(*left_val != *right_val) {
                    panic!(
                        "assertion failed: `(left != right)` \
                         (left: `{:?}`, right: `{:?}`)",
                        left_val, right_val
                    )
                }
            }
        }
    }};
}

/// A scratch directory for compiler inputs, outputs and fake executables.
pub struct TestFixture {
    pub tempdir: TempDir,
}

pub fn create_file(dir: &Path, path: &str, contents: &[u8]) -> io::Result<PathBuf> {
    let b = dir.join(path);
    if let Some(parent) = b.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::File::create(&b)?.write_all(contents)?;
    b.canonicalize()
}

/// Create an empty executable file at `dir/path`. The compiler identity
/// hashes the executable, so it has to exist even when every process is
/// mocked.
#[cfg(unix)]
pub fn mk_bin(dir: &Path, path: &str) -> io::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;
    let bin = create_file(dir, path, b"")?;
    fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755))?;
    Ok(bin)
}

#[cfg(not(unix))]
pub fn mk_bin(dir: &Path, path: &str) -> io::Result<PathBuf> {
    let path = Path::new(path).with_extension(std::env::consts::EXE_EXTENSION);
    create_file(dir, &path.to_string_lossy(), b"")
}

impl TestFixture {
    pub fn new() -> TestFixture {
        let tempdir = tempfile::Builder::new()
            .prefix("objcache_test")
            .tempdir()
            .unwrap();
        TestFixture { tempdir }
    }

    #[allow(dead_code)]
    pub fn touch(&self, path: &str) -> io::Result<PathBuf> {
        create_file(self.tempdir.path(), path, b"")
    }

    #[allow(dead_code)]
    pub fn write(&self, path: &str, contents: &str) -> io::Result<PathBuf> {
        create_file(self.tempdir.path(), path, contents.as_bytes())
    }

    pub fn mk_bin(&self, path: &str) -> io::Result<PathBuf> {
        mk_bin(self.tempdir.path(), path)
    }
}

#[test]
fn test_fixture_files() {
    let f = TestFixture::new();
    let src = f.write("src/foo.c", "int foo;").unwrap();
    assert_eq!("int foo;", fs::read_to_string(src).unwrap());
    let bin = f.mk_bin("bin/gcc").unwrap();
    assert!(bin.is_file());
    assert!(bin.starts_with(f.tempdir.path().canonicalize().unwrap()));
}
