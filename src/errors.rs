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

pub use anyhow::{anyhow, bail, Context, Error};
use std::process;

// We use `anyhow` for error handling.
// - Use `context()`/`with_context()` to annotate errors.
// - Use `anyhow!` with a string to create a new `anyhow::Error`.
// - The error types below (`ProcessError`, `IncompleteRequest`) are internal
//   ones that need to be checked at points other than the outermost
//   error-checking layer.

/// A sub-process exited with a non-successful status.
#[derive(Debug)]
pub struct ProcessError(pub process::Output);

/// A compiler adapter could not extract what it needs from a command line.
///
/// This is never reported to the build: the dispatcher answers it by running
/// the original command uncached.
#[derive(Debug)]
pub struct IncompleteRequest(pub String);

impl std::error::Error for ProcessError {}

impl std::error::Error for IncompleteRequest {}

impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0.stderr))
    }
}

impl std::fmt::Display for IncompleteRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot cache this command: {}", self.0)
    }
}

/// Bail out of an adapter operation with an `IncompleteRequest`.
#[macro_export]
macro_rules! incomplete {
    ($($arg:tt)*) => {
        return Err($crate::errors::IncompleteRequest(format!($($arg)*)).into())
    };
}

pub type Result<T> = anyhow::Result<T>;
