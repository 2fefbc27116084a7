// Copyright 2017 Mozilla Foundation
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

use crate::mock_command::{CommandChild, RunCommand};
use blake3::Hasher as blake3_Hasher;
use fs_err as fs;
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::io::prelude::*;
use std::path::Path;
use std::process::{self, ExitStatus, Stdio};
use std::time::Duration;

use crate::errors::*;

#[derive(Clone)]
pub struct Digest {
    inner: blake3_Hasher,
}

impl Digest {
    pub fn new() -> Digest {
        Digest {
            inner: blake3_Hasher::new(),
        }
    }

    /// Calculate the BLAKE3 digest of the contents of `path`.
    pub fn file<T>(path: T) -> Result<String>
    where
        T: AsRef<Path>,
    {
        let reader = fs::File::open(path.as_ref())
            .with_context(|| format!("Failed to open file for hashing: {:?}", path.as_ref()))?;
        Digest::reader_sync(reader)
    }

    /// Calculate the BLAKE3 digest of the contents read from `reader`.
    pub fn reader_sync<R: Read>(mut reader: R) -> Result<String> {
        let mut m = Digest::new();
        // A buffer of 128KB should give us the best performance.
        // See https://eklitzke.org/efficient-file-copying-on-linux.
        let mut buffer = vec![0; 128 * 1024];
        loop {
            let count = reader.read(&mut buffer[..])?;
            if count == 0 {
                break;
            }
            m.update(&buffer[..count]);
        }
        Ok(m.finish())
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    /// Feed `bytes` prefixed by their length, so that adjacent fields
    /// can never run into each other.
    pub fn update_delimited(&mut self, bytes: &[u8]) {
        self.inner.update(&(bytes.len() as u64).to_le_bytes());
        self.inner.update(bytes);
    }

    pub fn finish(self) -> String {
        self.inner.finalize().to_hex().to_string()
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}

/// Format `duration` as seconds with a fractional component.
pub fn fmt_duration_as_secs(duration: &Duration) -> String {
    format!("{}.{:03} s", duration.as_secs(), duration.subsec_millis())
}

/// Format `size_in_bytes` as a size in sensible units.
///
/// e.g. format_size(3 * 1024 * 1024 * 1024) == "3 GiB"
pub fn format_size(size_in_bytes: u64) -> String {
    let mut size = size_in_bytes;
    let mut remainder = 0;
    for suffix in ["bytes", "KiB", "MiB", "GiB", "TiB"].iter() {
        if size < 1024 {
            let frac = if remainder > 0 {
                let rem = (100.0 * remainder as f32 / 1024.0).trunc() as i32;
                format!(".{}", if rem % 10 == 0 { rem / 10 } else { rem })
            } else {
                "".to_owned()
            };
            return format!("{}{} {}", size, frac, suffix);
        }
        remainder = size % 1024;
        size /= 1024;
    }
    format!("{} PiB", size)
}

/// Run `command` with its stdout and stderr captured and return the exit status and output.
///
/// If the command returns a non-successful exit status, an error of `ProcessError`
/// will be returned containing the process output.
pub fn run_input_output<C>(mut command: C) -> Result<process::Output>
where
    C: RunCommand,
{
    trace!("run_input_output: {:?}", command);
    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let output = child
        .wait_with_output()
        .context("failed to wait for child")?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(ProcessError(output).into())
    }
}

/// The exit code a shell would report for `status`.
///
/// Processes killed by a signal on Unix have no exit code; report them
/// the way shells do, as `128 + signal`.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// The platform's byte representation of `s`, for hashing.
#[cfg(unix)]
pub fn os_str_bytes(s: &OsStr) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(s.as_bytes())
}

#[cfg(windows)]
pub fn os_str_bytes(s: &OsStr) -> Cow<'_, [u8]> {
    use std::os::windows::ffi::OsStrExt;
    Cow::Owned(s.encode_wide().flat_map(|c| c.to_le_bytes()).collect())
}

pub trait OsStrExt {
    fn starts_with(&self, s: &str) -> bool;
    fn split_prefix(&self, s: &str) -> Option<OsString>;
}

#[cfg(unix)]
use std::os::unix::ffi::OsStrExt as _OsStrExt;

#[cfg(unix)]
impl OsStrExt for OsStr {
    fn starts_with(&self, s: &str) -> bool {
        self.as_bytes().starts_with(s.as_bytes())
    }

    fn split_prefix(&self, s: &str) -> Option<OsString> {
        let bytes = self.as_bytes();
        if bytes.starts_with(s.as_bytes()) {
            Some(OsStr::from_bytes(&bytes[s.len()..]).to_owned())
        } else {
            None
        }
    }
}

// Arguments we care about on Windows are always valid unicode, so a lossy
// view is enough to match on ascii prefixes.
#[cfg(windows)]
impl OsStrExt for OsStr {
    fn starts_with(&self, s: &str) -> bool {
        self.to_str().map_or(false, |this| this.starts_with(s))
    }

    fn split_prefix(&self, s: &str) -> Option<OsString> {
        self.to_str()
            .and_then(|this| this.strip_prefix(s))
            .map(OsString::from)
    }
}
