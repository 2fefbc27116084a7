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

use crate::cache::{write_object_atomically, Cache, CacheRead, CacheWrite, Storage};
use crate::mock_command::{CommandChild, CommandCreator, RunCommand};
use crate::temp::TempFiles;
use crate::util::{exit_code, fmt_duration_as_secs, os_str_bytes, Digest};
use log::Level::Trace;
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{self, Stdio};
use std::time::{Duration, Instant};

use crate::errors::*;

/// Bump this when the cache key layout or the entry format changes; stored
/// entries computed with another version are never looked up again.
pub const CACHE_VERSION: &[u8] = b"objcache-1";

/// A compiler command line as the build system issued it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandInvocation {
    /// The compiler as named on the command line.
    pub executable: PathBuf,
    /// Arguments, not including the executable.
    pub arguments: Vec<OsString>,
    /// The directory the command runs in.
    pub cwd: PathBuf,
}

impl CommandInvocation {
    pub fn new<P, Q>(executable: P, arguments: Vec<OsString>, cwd: Q) -> CommandInvocation
    where
        P: Into<PathBuf>,
        Q: Into<PathBuf>,
    {
        CommandInvocation {
            executable: executable.into(),
            arguments,
            cwd: cwd.into(),
        }
    }

    /// Find the file that running `executable` would execute.
    pub fn resolve_executable(&self) -> Result<PathBuf> {
        if self.executable.components().count() > 1 {
            return Ok(self.cwd.join(&self.executable));
        }
        which::which_in(&self.executable, env::var_os("PATH"), &self.cwd)
            .with_context(|| format!("failed to find compiler {:?}", self.executable))
    }
}

/// Supported compiler families, in the order their recognizers run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompilerKind {
    Clang,
    Gcc,
    Msvc,
}

impl CompilerKind {
    pub const PRIORITY: [CompilerKind; 3] =
        [CompilerKind::Clang, CompilerKind::Gcc, CompilerKind::Msvc];

    pub fn as_str(self) -> &'static str {
        match self {
            CompilerKind::Clang => "clang",
            CompilerKind::Gcc => "gcc",
            CompilerKind::Msvc => "msvc",
        }
    }

    /// Whether `executable` names a compiler of this family.
    pub fn recognizes(self, executable: &Path) -> bool {
        let base = match compiler_base_name(executable) {
            Some(b) => b,
            None => return false,
        };
        match self {
            CompilerKind::Clang => base == "clang" || base == "clang++",
            CompilerKind::Gcc => matches!(base.as_str(), "gcc" | "g++" | "cc" | "c++"),
            CompilerKind::Msvc => base.eq_ignore_ascii_case("cl"),
        }
    }
}

impl fmt::Display for CompilerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// If `executable` is a known compiler, return `Some(CompilerKind)`.
pub fn detect_compiler_kind(executable: &Path) -> Option<CompilerKind> {
    let kind = CompilerKind::PRIORITY
        .iter()
        .copied()
        .find(|kind| kind.recognizes(executable));
    trace!("detect_compiler_kind({:?}) = {:?}", executable, kind);
    kind
}

/// The name of the compiler driver, without directory, extension, target
/// triple prefix or version suffix: `/usr/bin/x86_64-linux-gnu-g++-12`
/// becomes `g++`.
pub fn compiler_base_name(executable: &Path) -> Option<String> {
    let stem = executable.file_stem()?.to_str()?;
    let stem = match stem.rsplit_once('-') {
        Some((rest, version))
            if !version.is_empty() && version.chars().all(|c| c.is_ascii_digit() || c == '.') =>
        {
            rest
        }
        _ => stem,
    };
    let base = stem.rsplit('-').next()?;
    if base.is_empty() {
        return None;
    }
    Some(base.to_owned())
}

/// Supported source languages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Language {
    C,
    Cxx,
    ObjectiveC,
    ObjectiveCxx,
    AssemblerWithCpp,
}

impl Language {
    pub fn from_file_name(file: &Path) -> Option<Self> {
        match file.extension().and_then(|e| e.to_str()) {
            Some("c") => Some(Language::C),
            Some("C") | Some("cc") | Some("cp") | Some("cpp") | Some("CPP") | Some("cxx")
            | Some("c++") => Some(Language::Cxx),
            Some("m") => Some(Language::ObjectiveC),
            Some("mm") | Some("M") => Some(Language::ObjectiveCxx),
            Some("S") | Some("sx") => Some(Language::AssemblerWithCpp),
            e => {
                trace!("Unknown source extension: {}", e.unwrap_or("(None)"));
                None
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cxx => "c++",
            Language::ObjectiveC => "objc",
            Language::ObjectiveCxx => "objc++",
            Language::AssemblerWithCpp => "asm",
        }
    }
}

/// The four things a toolchain family must tell the cache about a command
/// line. Each may fail with `IncompleteRequest`, in which case the command
/// is run uncached.
pub trait Compiler {
    fn kind(&self) -> CompilerKind;

    /// Run the preprocessor and return the expanded source text.
    fn preprocess_source<T>(
        &self,
        creator: &mut T,
        invocation: &CommandInvocation,
        temps: &TempFiles,
    ) -> Result<Vec<u8>>
    where
        T: CommandCreator;

    /// The arguments that still affect the object once the source has
    /// been preprocessed, in their original order.
    fn filter_arguments(&self, invocation: &CommandInvocation) -> Result<Vec<OsString>>;

    /// A string identifying the exact compiler build in use.
    fn get_compiler_id<T>(&self, creator: &mut T, invocation: &CommandInvocation) -> Result<String>
    where
        T: CommandCreator;

    /// Where the command writes its object file.
    fn get_object_file(&self, invocation: &CommandInvocation) -> Result<PathBuf>;
}

/// Resolve and hash the compiler executable.
pub fn executable_digest(invocation: &CommandInvocation) -> Result<(PathBuf, String)> {
    let path = invocation.resolve_executable()?;
    let digest = Digest::file(&path)?;
    Ok((path, digest))
}

/// Compute the hash key of `identity` compiling `preprocessor_output` with `arguments`.
pub fn hash_key(identity: &str, arguments: &[OsString], preprocessor_output: &[u8]) -> String {
    // If you change any of the inputs to the hash, you should change `CACHE_VERSION`.
    let mut m = Digest::new();
    m.update(CACHE_VERSION);
    m.update_delimited(identity.as_bytes());
    m.update(&(arguments.len() as u64).to_le_bytes());
    for arg in arguments {
        m.update_delimited(&os_str_bytes(arg));
    }
    m.update_delimited(preprocessor_output);
    m.finish()
}

/// The result of a compilation or a cache retrieval.
#[derive(Debug, PartialEq, Eq)]
pub enum CompileResult {
    /// Results were found in the cache.
    CacheHit(Duration),
    /// Results were not found in the cache; the compiler ran and the
    /// results were offered to the cache.
    CacheMiss(MissType, Duration),
    /// The compiler failed, nothing was cached.
    CompileFailed,
}

/// The reason a cache lookup did not produce a usable entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissType {
    /// The compilation was not found in the cache, nothing more.
    Normal,
    /// There was an error reading from the cache.
    CacheReadError,
    /// The stored object did not match its recorded digest.
    VerificationFailed,
}

/// What the build sees: an exit code and the captured output streams.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl From<process::Output> for CompileOutput {
    fn from(output: process::Output) -> Self {
        CompileOutput {
            exit_code: exit_code(output.status),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// Whether to capture a processes output or inherit the parent stdio handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessOutput {
    /// Capture process output.
    Capture,
    /// Inherit parent stdio handles.
    Inherit,
}

/// Run the command in `invocation` exactly as given.
///
/// With `ProcessOutput::Inherit` the returned output streams are empty, the
/// child wrote straight to ours.
pub fn run_compiler<T>(
    creator: &mut T,
    invocation: &CommandInvocation,
    output: ProcessOutput,
) -> Result<process::Output>
where
    T: CommandCreator,
{
    let mut cmd = creator.new_command(&invocation.executable);
    cmd.args(&invocation.arguments)
        .current_dir(&invocation.cwd)
        .stdin(Stdio::inherit());
    if log_enabled!(Trace) {
        trace!("run_compiler: {:?}", cmd);
    }
    match output {
        ProcessOutput::Capture => {
            let child = cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).spawn()?;
            child
                .wait_with_output()
                .context("failed to wait for compiler")
        }
        ProcessOutput::Inherit => {
            let mut child = cmd
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .spawn()?;
            let status = child.wait().context("failed to wait for compiler")?;
            Ok(process::Output {
                status,
                stdout: vec![],
                stderr: vec![],
            })
        }
    }
}

/// Look up the result of `invocation` in `storage`, running the compiler
/// and storing its result if it is not there.
///
/// Any error returned from here means the compiler has not produced a
/// result yet, and running the original command is still the right thing
/// to do. Once the compiler has run, its result is returned whatever
/// happens to the cache.
pub fn get_cached_or_compile<C, T>(
    compiler: &C,
    creator: &mut T,
    storage: &dyn Storage,
    invocation: &CommandInvocation,
    temps: &TempFiles,
    verify_hits: bool,
) -> Result<(CompileResult, CompileOutput)>
where
    C: Compiler,
    T: CommandCreator,
{
    let start = Instant::now();
    let object = compiler.get_object_file(invocation)?;
    check_output_path(&object)?;
    let arguments = compiler.filter_arguments(invocation)?;
    let identity = compiler.get_compiler_id(creator, invocation)?;
    let preprocessed = compiler.preprocess_source(creator, invocation, temps)?;
    trace!(
        "[{}]: preprocessor output is {} bytes",
        object.display(),
        preprocessed.len()
    );

    let key = hash_key(&identity, &arguments, &preprocessed);
    trace!("[{}]: hash key {}", object.display(), key);

    let miss_type = match storage.get(&key) {
        Ok(Cache::Hit(mut entry)) => match materialize(&mut entry, &object, verify_hits) {
            Ok(Some(output)) => {
                let duration = start.elapsed();
                debug!(
                    "[{}]: cache hit in {}",
                    object.display(),
                    fmt_duration_as_secs(&duration)
                );
                return Ok((CompileResult::CacheHit(duration), output));
            }
            Ok(None) => MissType::VerificationFailed,
            Err(e) => {
                warn!("[{}]: failed to use cache entry: {:#}", object.display(), e);
                MissType::CacheReadError
            }
        },
        Ok(Cache::Miss) => MissType::Normal,
        Err(e) => {
            warn!("[{}]: cache read error: {:#}", object.display(), e);
            MissType::CacheReadError
        }
    };
    debug!("[{}]: cache miss ({:?})", object.display(), miss_type);

    let output = run_compiler(creator, invocation, ProcessOutput::Capture)?;
    let output = CompileOutput::from(output);
    if output.exit_code != 0 {
        debug!(
            "[{}]: compiler failed with exit code {}, not caching",
            object.display(),
            output.exit_code
        );
        return Ok((CompileResult::CompileFailed, output));
    }

    let stored = CacheWrite::from_compilation(&object, &output.stdout, &output.stderr, 0)
        .and_then(|entry| storage.put(&key, entry));
    match stored {
        Ok(duration) => debug!(
            "[{}]: stored in cache in {}",
            object.display(),
            fmt_duration_as_secs(&duration)
        ),
        Err(e) => warn!("[{}]: failed to store in cache: {:#}", object.display(), e),
    }
    Ok((
        CompileResult::CacheMiss(miss_type, start.elapsed()),
        output,
    ))
}

/// A cached object replaces the output by renaming a new file over it.
/// Only a regular file, or nothing at all, may be replaced that way: device
/// nodes like `/dev/null`, directories and symlinks are left to the compiler.
fn check_output_path(object: &Path) -> Result<()> {
    match std::fs::symlink_metadata(object) {
        Ok(meta) if !meta.file_type().is_file() => {
            incomplete!("output {:?} is not a regular file", object)
        }
        _ => Ok(()),
    }
}

/// Write the object in `entry` to `object` and return the recorded output.
///
/// Returns `Ok(None)` when `verify` is set and the stored object does not
/// match its recorded size and digest.
fn materialize(
    entry: &mut CacheRead,
    object: &Path,
    verify: bool,
) -> Result<Option<CompileOutput>> {
    let meta = entry.get_meta()?;
    let (bytes, mode) = entry.get_object_bytes()?;
    if verify {
        let mut digest = Digest::new();
        digest.update(&bytes);
        if bytes.len() as u64 != meta.object_size || digest.finish() != meta.object_digest {
            warn!("[{}]: cached object failed verification", object.display());
            return Ok(None);
        }
    }
    let stdout = entry.get_stdout()?;
    let stderr = entry.get_stderr()?;
    write_object_atomically(object, &bytes, mode)?;
    Ok(Some(CompileOutput {
        exit_code: meta.exit_code,
        stdout,
        stderr,
    }))
}

/// Rewrite the file names in line markers (`# 12 "/src/foo.c" 2`) that lie
/// under `cwd` to be relative to it. Line numbers are left alone.
pub fn normalize_line_markers(output: &[u8], cwd: &Path) -> Vec<u8> {
    // File names in markers are C string literals, backslashes escaped.
    let prefix = match cwd.to_str() {
        Some(cwd) => cwd.trim_end_matches(['/', '\\']).replace('\\', "\\\\"),
        None => return output.to_vec(),
    };
    if prefix.is_empty() {
        return output.to_vec();
    }
    let mut result = Vec::with_capacity(output.len());
    for line in output.split_inclusive(|&b| b == b'\n') {
        match split_marker(line, prefix.as_bytes()) {
            Some((head, relative)) => {
                result.extend_from_slice(head);
                result.extend_from_slice(relative);
            }
            None => result.extend_from_slice(line),
        }
    }
    result
}

/// Split a line marker naming a file under `prefix` into the part before
/// the file name and the rest of the line after `prefix/`.
fn split_marker<'a>(line: &'a [u8], prefix: &[u8]) -> Option<(&'a [u8], &'a [u8])> {
    let start = marker_file_start(line)?;
    let rest = line[start..].strip_prefix(prefix)?;
    let relative = rest
        .strip_prefix(b"/")
        .or_else(|| rest.strip_prefix(b"\\\\"))?;
    Some((&line[..start], relative))
}

/// Offset of the file name in a line marker, just past the opening quote.
fn marker_file_start(line: &[u8]) -> Option<usize> {
    let rest = line
        .strip_prefix(b"# ")
        .or_else(|| line.strip_prefix(b"#line "))?;
    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 || !rest[digits..].starts_with(b" \"") {
        return None;
    }
    Some(line.len() - rest.len() + digits + 2)
}
