#![allow(dead_code)]

use anyhow::{Context, Result};
use assert_cmd::prelude::*;
use fs_err as fs;
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::process::Command;

pub static OBJCACHE_BIN: Lazy<PathBuf> = Lazy::new(|| assert_cmd::cargo::cargo_bin("objcache"));

/// A stand-in for gcc: preprocessing prints a line marker and the source
/// (with `-P`, only its non-blank lines), compiling writes `obj:` followed
/// by the source to the `-o` file and warns with the line of `unused`.
/// Every run appends its mode to `$FAKE_CC_LOG`.
#[cfg(unix)]
const FAKE_GCC: &str = r##"#!/bin/sh
if [ "$1" = "--version" ]; then
    echo version >> "$FAKE_CC_LOG"
    echo "gcc (fake) 1.0.0"
    exit 0
fi
out=""
src=""
mode=compile
markers=1
while [ $# -gt 0 ]; do
    case "$1" in
        -E) mode=preprocess ;;
        -P) markers=0 ;;
        -o) shift; out="$1" ;;
        -*) ;;
        *) src="$1" ;;
    esac
    shift
done
echo "$mode" >> "$FAKE_CC_LOG"
if [ "$mode" = preprocess ]; then
    if [ $markers = 1 ]; then
        echo "# 1 \"$(pwd -P)/$src\""
        cat "$src"
    else
        grep -v '^$' "$src"
    fi
    exit 0
fi
if grep -q error "$src"; then
    echo "$src: error: fake failure" >&2
    exit 1
fi
line=$(grep -n unused "$src" | cut -d: -f1)
echo "$src:${line:-1}: warning: fake warning" >&2
printf 'obj:' > "$out"
cat "$src" >> "$out"
"##;

/// Holds a temporary directory with a cache, a fake compiler and sources.
/// Everything is removed on drop.
pub struct ObjcacheTest {
    pub tempdir: tempfile::TempDir,
}

impl ObjcacheTest {
    pub fn new() -> Result<Self> {
        let tempdir = tempfile::Builder::new()
            .prefix("objcache_test")
            .tempdir()
            .context("Failed to create tempdir")?;
        fs::create_dir(tempdir.path().join("bin"))?;
        fs::create_dir(tempdir.path().join("tmp"))?;
        Ok(ObjcacheTest { tempdir })
    }

    pub fn path(&self) -> &Path {
        self.tempdir.path()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.path().join("cache")
    }

    pub fn log_path(&self) -> PathBuf {
        self.path().join("cc.log")
    }

    /// Install the fake compiler as `bin/<name>` and return its path.
    #[cfg(unix)]
    pub fn fake_compiler(&self, name: &str) -> Result<PathBuf> {
        use std::os::unix::fs::PermissionsExt;
        let path = self.path().join("bin").join(name);
        fs::write(&path, FAKE_GCC)?;
        fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    pub fn write_source(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// The modes the fake compiler ran in, in order.
    pub fn compiler_runs(&self) -> Result<Vec<String>> {
        match fs::read_to_string(self.log_path()) {
            Ok(s) => Ok(s.lines().map(str::to_owned).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(vec![]),
            Err(e) => Err(e.into()),
        }
    }

    /// An `objcache` command isolated from the user's configuration.
    pub fn objcache(&self) -> Command {
        let mut cmd = Command::new(OBJCACHE_BIN.as_os_str());
        cmd.current_dir(self.path())
            .env_clear()
            .env("PATH", std::env::var_os("PATH").unwrap_or_default())
            .env("OBJCACHE_CONF", self.path().join("objcache.toml"))
            .env("OBJCACHE_DIR", self.cache_dir())
            .env("OBJCACHE_TEMP_DIR", self.path().join("tmp"))
            .env("FAKE_CC_LOG", self.log_path());
        cmd
    }

    pub fn show_stats(&self) -> assert_cmd::assert::AssertResult {
        self.objcache().arg("--show-stats").assert().try_success()
    }
}
