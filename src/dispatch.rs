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

//! The entry point for a wrapped compiler command: pick an adapter, run
//! the cached compilation, and fall back to the plain command whenever
//! caching cannot complete.

use crate::cache::Storage;
use crate::compiler::clang::Clang;
use crate::compiler::gcc::Gcc;
use crate::compiler::msvc::Msvc;
use crate::compiler::{
    detect_compiler_kind, get_cached_or_compile, run_compiler, CommandInvocation, CompileOutput,
    CompileResult, Compiler, CompilerKind, ProcessOutput,
};
use crate::mock_command::CommandCreator;
use crate::temp::TempFiles;
use crate::util::{exit_code, fmt_duration_as_secs};
use std::io::Write;
use std::sync::Arc;

use crate::errors::*;

/// The outcome of `Dispatcher::handle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchResult {
    /// No adapter recognizes the executable; the caller runs the command itself.
    NotHandled,
    /// The command ran, from the cache or not, and this is its exit code.
    Handled { exit_code: i32 },
}

/// Routes compiler invocations through the cache.
pub struct Dispatcher<T: CommandCreator> {
    creator: T,
    storage: Arc<dyn Storage>,
    temps: TempFiles,
    verify_hits: bool,
}

impl<T: CommandCreator> Dispatcher<T> {
    pub fn new(
        creator: T,
        storage: Arc<dyn Storage>,
        temps: TempFiles,
        verify_hits: bool,
    ) -> Dispatcher<T> {
        Dispatcher {
            creator,
            storage,
            temps,
            verify_hits,
        }
    }

    pub fn creator_mut(&mut self) -> &mut T {
        &mut self.creator
    }

    /// Handle `invocation`, writing the compiler's output to `stdout` and
    /// `stderr` when it was captured.
    ///
    /// Errors are only returned when the compiler itself could not be run,
    /// or its output could not be written out.
    pub fn handle(
        &mut self,
        invocation: &CommandInvocation,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<DispatchResult> {
        let kind = match detect_compiler_kind(&invocation.executable) {
            Some(kind) => kind,
            None => {
                debug!("{:?} is not a known compiler", invocation.executable);
                return Ok(DispatchResult::NotHandled);
            }
        };
        debug!("handling {:?} as {}", invocation.executable, kind);
        let result = match kind {
            CompilerKind::Clang => self.cached_compile(&Clang, invocation),
            CompilerKind::Gcc => self.cached_compile(&Gcc, invocation),
            CompilerKind::Msvc => self.cached_compile(&Msvc, invocation),
        };
        let output = match result {
            Ok((result, output)) => {
                match result {
                    CompileResult::CacheHit(d) => {
                        debug!("cache hit in {}", fmt_duration_as_secs(&d))
                    }
                    CompileResult::CacheMiss(miss, d) => {
                        debug!("cache miss ({:?}) in {}", miss, fmt_duration_as_secs(&d))
                    }
                    CompileResult::CompileFailed => debug!("compilation failed"),
                }
                output
            }
            Err(e) => {
                if e.downcast_ref::<IncompleteRequest>().is_some() {
                    debug!("running uncached: {}", e);
                } else {
                    warn!("running uncached after error: {:#}", e);
                }
                let exit_code = run_original_command(&mut self.creator, invocation)?;
                return Ok(DispatchResult::Handled { exit_code });
            }
        };
        stdout.write_all(&output.stdout)?;
        stdout.flush()?;
        stderr.write_all(&output.stderr)?;
        stderr.flush()?;
        Ok(DispatchResult::Handled {
            exit_code: output.exit_code,
        })
    }

    fn cached_compile<C: Compiler>(
        &mut self,
        compiler: &C,
        invocation: &CommandInvocation,
    ) -> Result<(CompileResult, CompileOutput)> {
        get_cached_or_compile(
            compiler,
            &mut self.creator,
            &*self.storage,
            invocation,
            &self.temps,
            self.verify_hits,
        )
    }
}

/// Run `invocation` unmodified, the child writing straight to our stdio,
/// and return its exit code.
pub fn run_original_command<T: CommandCreator>(
    creator: &mut T,
    invocation: &CommandInvocation,
) -> Result<i32> {
    let output = run_compiler(creator, invocation, ProcessOutput::Inherit)
        .with_context(|| format!("failed to execute {:?}", invocation.executable))?;
    Ok(exit_code(output.status))
}
