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

use crate::compiler::args::*;
use crate::compiler::gcc::{self, ArgData::*};
use crate::compiler::{CommandInvocation, Compiler, CompilerKind};
use crate::mock_command::CommandCreator;
use crate::temp::TempFiles;
use std::ffi::OsString;
use std::path::PathBuf;

use crate::errors::*;

/// A struct on which to implement `Compiler`.
///
/// Clang accepts the GCC command line, plus the flags in `ARGS`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Clang;

impl Compiler for Clang {
    fn kind(&self) -> CompilerKind {
        CompilerKind::Clang
    }

    fn preprocess_source<T>(
        &self,
        creator: &mut T,
        invocation: &CommandInvocation,
        _temps: &TempFiles,
    ) -> Result<Vec<u8>>
    where
        T: CommandCreator,
    {
        let parsed = gcc::parse_invocation(invocation, &[gcc::ARGS, ARGS])?;
        gcc::preprocess(creator, invocation, &parsed)
    }

    fn filter_arguments(&self, invocation: &CommandInvocation) -> Result<Vec<OsString>> {
        let parsed = gcc::parse_invocation(invocation, &[gcc::ARGS, ARGS])?;
        Ok(gcc::filtered_arguments(&parsed))
    }

    fn get_compiler_id<T>(&self, creator: &mut T, invocation: &CommandInvocation) -> Result<String>
    where
        T: CommandCreator,
    {
        // `InstalledDir:` is the absolute location of the driver.
        gcc::compiler_id(creator, invocation, self.kind(), |line| {
            !line.starts_with("InstalledDir:")
        })
    }

    fn get_object_file(&self, invocation: &CommandInvocation) -> Result<PathBuf> {
        let parsed = gcc::parse_invocation(invocation, &[gcc::ARGS, ARGS])?;
        Ok(invocation.cwd.join(parsed.output))
    }
}

pub static ARGS: &[ArgInfo<gcc::ArgData>] = &[
    flag!("--analyze", TooHard),
    take_arg!("-MJ", CanBeSeparated, TooHard),
    take_arg!("-Xclang", Separated, PassThrough),
    flag!("-fcoverage-mapping", TooHard),
    flag!("-fcxx-modules", TooHard),
    flag!("-fmodules", TooHard),
    flag!("-fprofile-instr-generate", Prefix, TooHard),
    flag!("-fprofile-instr-use", Prefix, TooHard),
    take_arg!("-gcc-toolchain", Separated, PassThrough),
    take_arg!("-target", Separated, PassThrough),
];
