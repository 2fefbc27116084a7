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
use crate::compiler::{
    compiler_base_name, executable_digest, normalize_line_markers, CommandInvocation, Compiler,
    CompilerKind, Language,
};
use crate::mock_command::{CommandCreator, RunCommand};
use crate::temp::TempFiles;
use crate::util::{run_input_output, OsStrExt};
use log::Level::Trace;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::errors::*;

/// A struct on which to implement `Compiler`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Gcc;

impl Compiler for Gcc {
    fn kind(&self) -> CompilerKind {
        CompilerKind::Gcc
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
        let parsed = parse_invocation(invocation, &[ARGS])?;
        preprocess(creator, invocation, &parsed)
    }

    fn filter_arguments(&self, invocation: &CommandInvocation) -> Result<Vec<OsString>> {
        let parsed = parse_invocation(invocation, &[ARGS])?;
        Ok(filtered_arguments(&parsed))
    }

    fn get_compiler_id<T>(&self, creator: &mut T, invocation: &CommandInvocation) -> Result<String>
    where
        T: CommandCreator,
    {
        compiler_id(creator, invocation, self.kind(), |_| true)
    }

    fn get_object_file(&self, invocation: &CommandInvocation) -> Result<PathBuf> {
        let parsed = parse_invocation(invocation, &[ARGS])?;
        Ok(invocation.cwd.join(parsed.output))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgData {
    TooHard,
    DoCompilation,
    Output,
    ExplicitLanguage,
    PassThrough,
    PreprocessorArgument,
    NeedDepTarget,
    DepTarget,
    DepArgumentPath,
    DepFlag,
}

use self::ArgData::*;

// Mostly taken from https://github.com/ccache/ccache/blob/master/src/compopt.cpp
pub static ARGS: &[ArgInfo<ArgData>] = &[
    flag!("--coverage", TooHard),
    take_arg!("--param", Separated, PassThrough),
    flag!("--save-temps", Prefix, TooHard),
    take_arg!("--serialize-diagnostics", Separated, PassThrough),
    take_arg!("--sysroot", Separated, PassThrough),
    take_arg!("-A", Separated, PassThrough),
    take_arg!("-B", CanBeSeparated, PassThrough),
    take_arg!("-D", CanBeSeparated, PreprocessorArgument),
    flag!("-E", TooHard),
    take_arg!("-F", CanBeSeparated, PreprocessorArgument),
    take_arg!("-G", Separated, PassThrough),
    take_arg!("-I", CanBeSeparated, PreprocessorArgument),
    take_arg!("-L", Separated, PassThrough),
    flag!("-M", TooHard),
    flag!("-MD", NeedDepTarget),
    take_arg!("-MF", CanBeSeparated, DepArgumentPath),
    flag!("-MM", TooHard),
    flag!("-MMD", NeedDepTarget),
    flag!("-MP", DepFlag),
    take_arg!("-MQ", CanBeSeparated, DepTarget),
    take_arg!("-MT", CanBeSeparated, DepTarget),
    flag!("-P", PreprocessorArgument),
    flag!("-S", TooHard),
    take_arg!("-U", CanBeSeparated, PreprocessorArgument),
    take_arg!("-V", Separated, PassThrough),
    take_arg!("-Xassembler", Separated, PassThrough),
    take_arg!("-Xlinker", Separated, PassThrough),
    take_arg!("-Xpreprocessor", Separated, PreprocessorArgument),
    take_arg!("-arch", Separated, PassThrough),
    take_arg!("-aux-info", Separated, PassThrough),
    take_arg!("-b", Separated, PassThrough),
    flag!("-c", DoCompilation),
    flag!("-fprofile-arcs", TooHard),
    flag!("-fprofile-generate", Prefix, TooHard),
    flag!("-fprofile-use", Prefix, TooHard),
    flag!("-frepo", TooHard),
    flag!("-fsyntax-only", TooHard),
    flag!("-ftest-coverage", TooHard),
    flag!("-gsplit-dwarf", TooHard),
    take_arg!("-idirafter", CanBeSeparated, PreprocessorArgument),
    take_arg!("-imacros", CanBeSeparated, PreprocessorArgument),
    take_arg!("-include", CanBeSeparated, PreprocessorArgument),
    take_arg!("-include-pch", Separated, TooHard),
    take_arg!("-iprefix", CanBeSeparated, PreprocessorArgument),
    take_arg!("-iquote", CanBeSeparated, PreprocessorArgument),
    take_arg!("-isysroot", CanBeSeparated, PreprocessorArgument),
    take_arg!("-isystem", CanBeSeparated, PreprocessorArgument),
    take_arg!("-iwithprefix", CanBeSeparated, PreprocessorArgument),
    take_arg!("-iwithprefixbefore", CanBeSeparated, PreprocessorArgument),
    flag!("-nostdinc", PreprocessorArgument),
    flag!("-nostdinc++", PreprocessorArgument),
    take_arg!("-o", CanBeSeparated, Output),
    flag!("-save-temps", Prefix, TooHard),
    flag!("-trigraphs", PreprocessorArgument),
    take_arg!("-u", CanBeSeparated, PassThrough),
    take_arg!("-x", CanBeSeparated, ExplicitLanguage),
    take_arg!("-z", CanBeSeparated, PassThrough),
];

/// The results of parsing a compiler commandline.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ParsedArguments {
    /// The input source file.
    pub input: PathBuf,
    /// The type of language used in the input source file.
    pub language: Language,
    /// The object file, as written on the command line or implied by the input.
    pub output: PathBuf,
    /// Commandline arguments for the preprocessor (not including common_args).
    pub preprocessor_args: Vec<OsString>,
    /// Commandline arguments for dependency generation.
    pub dependency_args: Vec<OsString>,
    /// Commandline arguments for the preprocessor or the compiler.
    pub common_args: Vec<OsString>,
}

/// Whether the driver compiles C sources as C++, as `g++` and `clang++` do.
pub fn is_plusplus(executable: &Path) -> bool {
    compiler_base_name(executable).map_or(false, |b| b.ends_with("++"))
}

pub fn parse_invocation(
    invocation: &CommandInvocation,
    tables: &[&[ArgInfo<ArgData>]],
) -> Result<ParsedArguments> {
    parse_arguments(
        &invocation.arguments,
        tables,
        is_plusplus(&invocation.executable),
    )
}

fn language_from_gcc_arg(lang: &OsStr) -> Result<Option<Language>> {
    Ok(match lang.to_string_lossy().as_ref() {
        "none" => None,
        "c" => Some(Language::C),
        "c++" => Some(Language::Cxx),
        "objective-c" => Some(Language::ObjectiveC),
        "objective-c++" => Some(Language::ObjectiveCxx),
        "assembler-with-cpp" => Some(Language::AssemblerWithCpp),
        other => incomplete!("unsupported language -x {}", other),
    })
}

fn language_to_gcc_arg(lang: Language) -> &'static str {
    match lang {
        Language::C => "c",
        Language::Cxx => "c++",
        Language::ObjectiveC => "objective-c",
        Language::ObjectiveCxx => "objective-c++",
        Language::AssemblerWithCpp => "assembler-with-cpp",
    }
}

/// Parse `arguments`, determining whether the compilation is supported.
///
/// Anything that cannot be cached, including command lines that are not a
/// compilation of a single source file to an object, is an `IncompleteRequest`.
pub fn parse_arguments(
    arguments: &[OsString],
    tables: &[&[ArgInfo<ArgData>]],
    plusplus: bool,
) -> Result<ParsedArguments> {
    let mut output_arg = None;
    let mut input_arg: Option<OsString> = None;
    let mut language = None;
    let mut compilation = false;
    let mut common_args = vec![];
    let mut preprocessor_args = vec![];
    let mut dependency_args = vec![];
    let mut need_explicit_dep_target = false;
    let mut has_dep_target = false;
    enum DepArgumentRequirePath {
        NotNeeded,
        Missing,
        Provided,
    }
    let mut need_explicit_dep_argument_path = DepArgumentRequirePath::NotNeeded;

    for arg in ArgsIter::new(arguments.iter().cloned(), tables, FlagSyntax::Gnu) {
        let arg = arg?;
        if let Argument::WithValue(_, _, ref v, ValueForm::Separated) = arg {
            if v.starts_with("@") {
                incomplete!("response file in argument value");
            }
        }

        match arg.data() {
            Some(TooHard) => incomplete!(
                "{}",
                arg.flag().unwrap_or_default().to_string_lossy()
            ),
            Some(DoCompilation) => compilation = true,
            Some(Output) => output_arg = arg.value().map(PathBuf::from),
            Some(ExplicitLanguage) => {
                if input_arg.is_some() {
                    incomplete!("-x after the input file");
                }
                language = match arg.value() {
                    Some(v) => language_from_gcc_arg(v)?,
                    None => None,
                };
            }
            Some(NeedDepTarget) => {
                need_explicit_dep_target = true;
                if let DepArgumentRequirePath::NotNeeded = need_explicit_dep_argument_path {
                    need_explicit_dep_argument_path = DepArgumentRequirePath::Missing;
                }
            }
            Some(DepTarget) => has_dep_target = true,
            Some(DepArgumentPath) => {
                need_explicit_dep_argument_path = DepArgumentRequirePath::Provided
            }
            Some(PassThrough) | Some(PreprocessorArgument) | Some(DepFlag) => {}
            None => match arg {
                Argument::Raw(ref val) => {
                    if val == "-" {
                        incomplete!("input from stdin");
                    }
                    if val.starts_with("@") {
                        incomplete!("response file {:?}", val);
                    }
                    if input_arg.is_some() {
                        incomplete!("multiple input files");
                    }
                    input_arg = Some(val.clone());
                }
                Argument::UnknownFlag(_) => {}
                _ => unreachable!(),
            },
        }

        let args = match arg.data() {
            // Line markers must stay in the hashed output; `-P` only matters with `-E`.
            Some(PreprocessorArgument) if arg.flag() == Some(OsStr::new("-P")) => continue,
            Some(PassThrough) => &mut common_args,
            // The language goes into the key once, from `filtered_arguments`,
            // and is passed explicitly to the preprocessor.
            Some(ExplicitLanguage) => continue,
            Some(PreprocessorArgument) => &mut preprocessor_args,
            Some(NeedDepTarget) | Some(DepTarget) | Some(DepArgumentPath) | Some(DepFlag) => {
                &mut dependency_args
            }
            Some(DoCompilation) | Some(Output) | Some(TooHard) => continue,
            None => match arg {
                Argument::Raw(_) => continue,
                _ => &mut common_args,
            },
        };
        args.extend(arg.to_os_strings());
    }

    // We only support compilation.
    if !compilation {
        incomplete!("not a compilation");
    }
    let input = match input_arg {
        Some(i) => PathBuf::from(i),
        // We can't cache compilation without an input.
        None => incomplete!("no input file"),
    };
    let language = match language {
        Some(l) => l,
        None => match Language::from_file_name(&input) {
            Some(Language::C) if plusplus => Language::Cxx,
            Some(l) => l,
            None => incomplete!("unknown source language for {:?}", input),
        },
    };
    let output = match output_arg {
        Some(o) => o,
        None => match input.with_extension("o").file_name() {
            Some(name) => PathBuf::from(name),
            None => incomplete!("cannot derive an object name from {:?}", input),
        },
    };
    if need_explicit_dep_target && !has_dep_target {
        dependency_args.push(OsString::from("-MT"));
        dependency_args.push(output.clone().into_os_string());
    }
    if let DepArgumentRequirePath::Missing = need_explicit_dep_argument_path {
        dependency_args.push(OsString::from("-MF"));
        dependency_args.push(output.with_extension("d").into_os_string());
    }

    Ok(ParsedArguments {
        input,
        language,
        output,
        preprocessor_args,
        dependency_args,
        common_args,
    })
}

/// The arguments hashed into the key: the language, then every argument
/// that reaches the compiler proper.
pub fn filtered_arguments(parsed: &ParsedArguments) -> Vec<OsString> {
    let mut args = vec![
        OsString::from("-x"),
        OsString::from(language_to_gcc_arg(parsed.language)),
    ];
    args.extend(parsed.common_args.iter().cloned());
    args
}

/// Run the preprocessor over the input and return its output.
///
/// Line markers are kept, so that moving code around changes the output.
/// File names under the working directory are made relative to it.
pub fn preprocess<T>(
    creator: &mut T,
    invocation: &CommandInvocation,
    parsed: &ParsedArguments,
) -> Result<Vec<u8>>
where
    T: CommandCreator,
{
    trace!("preprocess {:?} as {}", parsed.input, parsed.language.as_str());
    let mut cmd = creator.new_command(&invocation.executable);
    cmd.arg("-x")
        .arg(language_to_gcc_arg(parsed.language))
        .args(&parsed.common_args)
        .args(&parsed.preprocessor_args)
        .args(&parsed.dependency_args)
        .arg("-E")
        .arg(&parsed.input)
        .current_dir(&invocation.cwd);
    if log_enabled!(Trace) {
        trace!("preprocess: {:?}", cmd);
    }
    let output = run_input_output(cmd)?;
    Ok(normalize_line_markers(&output.stdout, &invocation.cwd))
}

/// Identify a GNU-style compiler by its executable and `--version` output.
///
/// Lines for which `keep_line` returns false are left out of the identity.
pub fn compiler_id<T, F>(
    creator: &mut T,
    invocation: &CommandInvocation,
    kind: CompilerKind,
    keep_line: F,
) -> Result<String>
where
    T: CommandCreator,
    F: Fn(&str) -> bool,
{
    let (path, digest) = executable_digest(invocation)?;
    let mut cmd = creator.new_command(&invocation.executable);
    cmd.arg("--version").current_dir(&invocation.cwd);
    let output = run_input_output(cmd).context("failed to get compiler version")?;
    let version = String::from_utf8_lossy(&output.stdout);
    let version = version
        .lines()
        .filter(|line| keep_line(line))
        .collect::<Vec<_>>()
        .join("\n");
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(format!("{}:{}:{}:{}", kind, name, digest, version.trim()))
}
