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
    executable_digest, normalize_line_markers, CommandInvocation, Compiler, CompilerKind, Language,
};
use crate::mock_command::{CommandChild, CommandCreator, RunCommand};
use crate::temp::TempFiles;
use crate::util::{run_input_output, OsStrExt};
use fs_err as fs;
use log::Level::Trace;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::errors::*;

/// A struct on which to implement `Compiler`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Msvc;

impl Compiler for Msvc {
    fn kind(&self) -> CompilerKind {
        CompilerKind::Msvc
    }

    fn preprocess_source<T>(
        &self,
        creator: &mut T,
        invocation: &CommandInvocation,
        temps: &TempFiles,
    ) -> Result<Vec<u8>>
    where
        T: CommandCreator,
    {
        let parsed = parse_arguments(&invocation.arguments)?;
        preprocess(creator, invocation, &parsed, temps)
    }

    fn filter_arguments(&self, invocation: &CommandInvocation) -> Result<Vec<OsString>> {
        let parsed = parse_arguments(&invocation.arguments)?;
        Ok(filtered_arguments(&parsed))
    }

    fn get_compiler_id<T>(&self, creator: &mut T, invocation: &CommandInvocation) -> Result<String>
    where
        T: CommandCreator,
    {
        compiler_id(creator, invocation)
    }

    fn get_object_file(&self, invocation: &CommandInvocation) -> Result<PathBuf> {
        let parsed = parse_arguments(&invocation.arguments)?;
        Ok(invocation.cwd.join(parsed.output))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgData {
    TooHard,
    DoCompilation,
    Output,
    PreprocessorArgument,
    CompileAsC,
    CompileAsCxx,
}

use self::ArgData::*;

// Names are given without the leading `/` or `-`.
pub static ARGS: &[ArgInfo<ArgData>] = &[
    take_arg!("D", CanBeSeparated, PreprocessorArgument),
    flag!("E", TooHard),
    flag!("EP", TooHard),
    take_arg!("FA", Concatenated, TooHard),
    take_arg!("FI", CanBeSeparated, PreprocessorArgument),
    take_arg!("FR", Concatenated, TooHard),
    take_arg!("Fa", Concatenated, TooHard),
    take_arg!("Fd", Concatenated, TooHard),
    take_arg!("Fe", Concatenated, TooHard),
    take_arg!("Fi", Concatenated, TooHard),
    take_arg!("Fm", Concatenated, TooHard),
    take_arg!("Fo", Concatenated, Output),
    take_arg!("Fp", Concatenated, TooHard),
    take_arg!("Fr", Concatenated, TooHard),
    flag!("Fx", TooHard),
    take_arg!("I", CanBeSeparated, PreprocessorArgument),
    flag!("P", TooHard),
    flag!("TC", CompileAsC),
    flag!("TP", CompileAsCxx),
    take_arg!("Tc", CanBeSeparated, TooHard),
    take_arg!("Tp", CanBeSeparated, TooHard),
    take_arg!("U", CanBeSeparated, PreprocessorArgument),
    take_arg!("Yc", Concatenated, TooHard),
    take_arg!("Yu", Concatenated, TooHard),
    flag!("ZI", TooHard),
    flag!("Zi", TooHard),
    flag!("c", DoCompilation),
    flag!("showIncludes", TooHard),
    take_arg!("sourceDependencies", CanBeSeparated, TooHard),
];

/// The results of parsing a `cl` commandline.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ParsedArguments {
    pub input: PathBuf,
    /// Either `Language::C` or `Language::Cxx`.
    pub language: Language,
    /// The object file, relative to the working directory unless absolute.
    pub output: PathBuf,
    /// `/D /U /I /FI`, only given to the preprocessor.
    pub preprocessor_args: Vec<OsString>,
    /// Everything else that reaches the compiler, in order.
    pub common_args: Vec<OsString>,
}

/// Join `/Fo: path` into `/Fo:path`, the two-token spelling newer `cl`
/// versions accept.
fn join_colon_values(arguments: &[OsString]) -> Vec<OsString> {
    let mut joined = Vec::with_capacity(arguments.len());
    let mut it = arguments.iter();
    while let Some(arg) = it.next() {
        if arg == "/Fo:" || arg == "-Fo:" {
            if let Some(value) = it.next() {
                let mut a = arg.clone();
                a.push(value);
                joined.push(a);
                continue;
            }
        }
        joined.push(arg.clone());
    }
    joined
}

/// Work out the object path from the `/Fo` value, if any.
fn object_path(fo: Option<OsString>, input: &Path) -> Result<PathBuf> {
    let default_name = match input.file_stem() {
        Some(stem) => {
            let mut name = stem.to_os_string();
            name.push(".obj");
            PathBuf::from(name)
        }
        None => incomplete!("cannot derive an object name from {:?}", input),
    };
    let fo = match fo {
        None => return Ok(default_name),
        Some(fo) => fo,
    };
    let fo = match fo.split_prefix(":") {
        Some(rest) => rest,
        None => fo,
    };
    let s = fo.to_string_lossy();
    if s.is_empty() {
        incomplete!("empty /Fo");
    }
    if s.eq_ignore_ascii_case("nul") {
        incomplete!("output to nul");
    }
    if s.ends_with('/') || s.ends_with('\\') {
        return Ok(PathBuf::from(fo).join(default_name));
    }
    Ok(PathBuf::from(fo))
}

pub fn parse_arguments(arguments: &[OsString]) -> Result<ParsedArguments> {
    let mut output_arg = None;
    let mut input_arg: Option<OsString> = None;
    let mut language = None;
    let mut compilation = false;
    let mut common_args = vec![];
    let mut preprocessor_args = vec![];

    let arguments = join_colon_values(arguments);
    for arg in ArgsIter::new(arguments.into_iter(), &[ARGS], FlagSyntax::Msvc) {
        let arg = arg?;
        match arg.data() {
            Some(TooHard) => incomplete!(
                "{}",
                arg.flag().unwrap_or_default().to_string_lossy()
            ),
            Some(DoCompilation) => compilation = true,
            Some(Output) => output_arg = arg.value().map(|v| v.to_os_string()),
            Some(CompileAsC) => language = Some(Language::C),
            Some(CompileAsCxx) => language = Some(Language::Cxx),
            Some(PreprocessorArgument) => preprocessor_args.extend(arg.to_os_strings()),
            None => match arg {
                Argument::Raw(ref val) => {
                    if val.starts_with("@") {
                        incomplete!("response file {:?}", val);
                    }
                    if input_arg.is_some() {
                        incomplete!("multiple input files");
                    }
                    input_arg = Some(val.clone());
                }
                Argument::UnknownFlag(ref flag) => common_args.push(flag.clone()),
                _ => unreachable!(),
            },
        }
    }

    // We only support compilation.
    if !compilation {
        incomplete!("not a compilation");
    }
    let input = match input_arg {
        Some(i) => PathBuf::from(i),
        None => incomplete!("no input file"),
    };
    let language = match language {
        Some(l) => l,
        None => match Language::from_file_name(&input) {
            Some(l @ Language::C) | Some(l @ Language::Cxx) => l,
            _ => incomplete!("unknown source language for {:?}", input),
        },
    };
    let output = object_path(output_arg, &input)?;
    Ok(ParsedArguments {
        input,
        language,
        output,
        preprocessor_args,
        common_args,
    })
}

/// The arguments hashed into the key: `/TC` or `/TP`, then every argument
/// that reaches the compiler proper.
pub fn filtered_arguments(parsed: &ParsedArguments) -> Vec<OsString> {
    let language = match parsed.language {
        Language::C => "/TC",
        _ => "/TP",
    };
    let mut args = vec![OsString::from(language)];
    args.extend(parsed.common_args.iter().cloned());
    args
}

/// Preprocess into a temporary `.i` file and return its contents.
///
/// `/P` writes to a file instead of stdout. The `#line` directives are
/// kept, with file names under the working directory made relative.
pub fn preprocess<T>(
    creator: &mut T,
    invocation: &CommandInvocation,
    parsed: &ParsedArguments,
    temps: &TempFiles,
) -> Result<Vec<u8>>
where
    T: CommandCreator,
{
    let temp = temps.acquire("i")?;
    let mut fi = OsString::from("/Fi");
    fi.push(temp.path());

    let mut cmd = creator.new_command(&invocation.executable);
    cmd.arg("/nologo")
        .args(&parsed.common_args)
        .args(&parsed.preprocessor_args)
        .arg("/P")
        .arg(&fi)
        .arg(&parsed.input)
        .current_dir(&invocation.cwd);
    if log_enabled!(Trace) {
        trace!("preprocess: {:?}", cmd);
    }
    run_input_output(cmd)?;
    let preprocessed = fs::read(temp.path())?;
    if let Err(e) = temp.release() {
        warn!("{:#}", e);
    }
    Ok(normalize_line_markers(&preprocessed, &invocation.cwd))
}

/// Identify `cl` by its executable and the banner it prints on stderr
/// when run without arguments.
pub fn compiler_id<T>(creator: &mut T, invocation: &CommandInvocation) -> Result<String>
where
    T: CommandCreator,
{
    let (path, digest) = executable_digest(invocation)?;
    let mut cmd = creator.new_command(&invocation.executable);
    cmd.current_dir(&invocation.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    // `cl` with no input exits unsuccessfully, the banner is all we need.
    let output = cmd
        .spawn()?
        .wait_with_output()
        .context("failed to run compiler for its banner")?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    let banner = match stderr.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some(banner) => banner.to_owned(),
        None => bail!("no version banner from {:?}", path),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(format!("{}:{}:{}:{}", CompilerKind::Msvc, name, digest, banner))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mock_command::*;
    use crate::test::utils::*;

    fn parse_arguments_(arguments: Vec<String>) -> Result<ParsedArguments> {
        let args = arguments.iter().map(OsString::from).collect::<Vec<_>>();
        parse_arguments(&args)
    }

    fn assert_incomplete(res: Result<ParsedArguments>, what: &str) {
        match res {
            Ok(p) => panic!("expected {} to be incomplete, got {:?}", what, p),
            Err(e) => assert!(
                e.downcast_ref::<IncompleteRequest>().is_some(),
                "unexpected error for {}: {:#}",
                what,
                e
            ),
        }
    }

    #[test]
    fn test_parse_arguments_simple() {
        let ParsedArguments {
            input,
            language,
            output,
            preprocessor_args,
            common_args,
        } = parse_arguments_(stringvec!["-c", "foo.c", "-Fofoo.obj"]).unwrap();
        assert_eq!(Some("foo.c"), input.to_str());
        assert_eq!(Language::C, language);
        assert_eq!(PathBuf::from("foo.obj"), output);
        assert!(preprocessor_args.is_empty());
        assert!(common_args.is_empty());
    }

    #[test]
    fn test_parse_arguments_default_name() {
        let parsed = parse_arguments_(stringvec!["/c", "src/foo.cpp"]).unwrap();
        assert_eq!(Language::Cxx, parsed.language);
        assert_eq!(PathBuf::from("foo.obj"), parsed.output);
    }

    #[test]
    fn test_parse_arguments_output_forms() {
        for (fo, expected) in [
            (stringvec!["/Fobar.obj"], PathBuf::from("bar.obj")),
            (stringvec!["/Fo:bar.obj"], PathBuf::from("bar.obj")),
            (stringvec!["/Fo:", "bar.obj"], PathBuf::from("bar.obj")),
            (stringvec!["/Foout/"], PathBuf::from("out/").join("foo.obj")),
            (stringvec!["-Foout\\"], PathBuf::from("out\\").join("foo.obj")),
        ] {
            let mut args = stringvec!["/c", "foo.c"];
            args.extend(fo.clone());
            let parsed = parse_arguments_(args).unwrap();
            assert_eq!(expected, parsed.output, "{:?}", fo);
        }
        assert_incomplete(parse_arguments_(stringvec!["/c", "foo.c", "/Fonul"]), "nul");
        assert_incomplete(parse_arguments_(stringvec!["/c", "foo.c", "/Fo"]), "empty");
    }

    #[test]
    fn test_parse_arguments_preprocessor_args() {
        let parsed = parse_arguments_(stringvec![
            "/c", "foo.c", "/DX=1", "/D", "Y", "-Iinclude", "/I", "C:\\sdk", "/FIpch.h",
            "/UNDEBUG", "/O2", "/W4", "/nologo"
        ])
        .unwrap();
        assert_eq!(
            ovec!["/DX=1", "/D", "Y", "-Iinclude", "/I", "C:\\sdk", "/FIpch.h", "/UNDEBUG"],
            parsed.preprocessor_args
        );
        assert_eq!(ovec!["/O2", "/W4", "/nologo"], parsed.common_args);
        assert_eq!(ovec!["/TC", "/O2", "/W4", "/nologo"], filtered_arguments(&parsed));
    }

    #[test]
    fn test_parse_arguments_explicit_language() {
        let parsed = parse_arguments_(stringvec!["/c", "/TP", "foo.c"]).unwrap();
        assert_eq!(Language::Cxx, parsed.language);
        assert_eq!(ovec!["/TP"], filtered_arguments(&parsed));
        let parsed = parse_arguments_(stringvec!["/c", "foo.cpp", "/EHsc"]).unwrap();
        assert_eq!(ovec!["/TP", "/EHsc"], filtered_arguments(&parsed));
    }

    #[test]
    fn test_parse_arguments_too_hard() {
        for flag in [
            "/E",
            "/EP",
            "/P",
            "/Zi",
            "-ZI",
            "/Fdfoo.pdb",
            "/Fpfoo.pch",
            "/Ycstdafx.h",
            "/Yustdafx.h",
            "/FR",
            "/Frfoo.sbr",
            "/Fifoo.i",
            "/Tcfoo.c",
            "/Tpfoo.cpp",
            "/showIncludes",
            "@args.rsp",
        ] {
            assert_incomplete(parse_arguments_(stringvec!["/c", "foo.c", flag]), flag);
        }
        assert_incomplete(
            parse_arguments_(stringvec!["/c", "foo.c", "/sourceDependencies", "deps.json"]),
            "/sourceDependencies",
        );
    }

    #[test]
    fn test_parse_arguments_not_supported() {
        assert_incomplete(parse_arguments_(stringvec!["foo.c"]), "link");
        assert_incomplete(parse_arguments_(stringvec!["/c", "foo.c", "bar.c"]), "two inputs");
        assert_incomplete(parse_arguments_(stringvec!["/c"]), "no input");
        assert_incomplete(parse_arguments_(stringvec!["/c", "foo.asm"]), ".asm");
        assert_incomplete(parse_arguments_(stringvec!["/c", "foo.c", "/D"]), "missing /D value");
    }

    #[test]
    fn test_preprocess_uses_and_removes_temp_file() {
        let f = TestFixture::new();
        let temp_dir = f.tempdir.path().join("tmp");
        fs::create_dir_all(&temp_dir).unwrap();
        let temps = TempFiles::new(&temp_dir);
        let invocation = CommandInvocation::new(
            "cl.exe",
            ovec!["/c", "foo.c", "/DX", "/O2", "/Fofoo.obj"],
            f.tempdir.path(),
        );
        let parsed = parse_arguments(&invocation.arguments).unwrap();
        let mut creator = MockCommandCreator::new();
        let cwd = f.tempdir.path().display().to_string().replace('\\', "\\\\");
        creator.next_command_calls(move |args| {
            assert_eq!(&ovec!["/nologo", "/O2", "/DX", "/P"][..], &args[..4]);
            assert_eq!(Some("foo.c"), args[5].to_str());
            let fi = args[4].to_string_lossy();
            let path = fi.strip_prefix("/Fi").unwrap();
            assert!(path.ends_with(".i"));
            fs::write(path, format!("#line 1 \"{}/foo.c\"\nint x;\n", cwd))?;
            Ok(MockChild::new(exit_status(0), "foo.c\r\n", ""))
        });
        let out = preprocess(&mut creator, &invocation, &parsed, &temps).unwrap();
        assert_eq!(b"#line 1 \"foo.c\"\nint x;\n".to_vec(), out);
        assert_eq!(0, fs::read_dir(&temp_dir).unwrap().count());
    }

    #[test]
    fn test_preprocess_failure_removes_temp_file() {
        let f = TestFixture::new();
        let temp_dir = f.tempdir.path().join("tmp");
        fs::create_dir_all(&temp_dir).unwrap();
        let temps = TempFiles::new(&temp_dir);
        let invocation = CommandInvocation::new("cl.exe", ovec!["/c", "foo.c"], f.tempdir.path());
        let parsed = parse_arguments(&invocation.arguments).unwrap();
        let mut creator = MockCommandCreator::new();
        creator.next_command_spawns(Ok(MockChild::new(exit_status(2), "", "fatal error C1083")));
        let err = preprocess(&mut creator, &invocation, &parsed, &temps).unwrap_err();
        assert!(err.downcast_ref::<ProcessError>().is_some());
        assert_eq!(0, fs::read_dir(&temp_dir).unwrap().count());
    }

    #[test]
    fn test_compiler_id_from_banner() {
        let f = TestFixture::new();
        let cl = f.mk_bin("cl.exe").unwrap();
        let invocation = CommandInvocation::new(&cl, ovec!["/c", "foo.c"], f.tempdir.path());
        let mut creator = MockCommandCreator::new();
        creator.next_command_calls(|args| {
            assert!(args.is_empty());
            Ok(MockChild::new(
                exit_status(2),
                "",
                "\r\nMicrosoft (R) C/C++ Optimizing Compiler Version 19.38.33133 for x64\r\nCopyright (C) Microsoft Corporation.  All rights reserved.\r\n",
            ))
        });
        let id = Msvc.get_compiler_id(&mut creator, &invocation).unwrap();
        assert!(id.starts_with("msvc:cl.exe:"), "{}", id);
        assert!(
            id.ends_with(":Microsoft (R) C/C++ Optimizing Compiler Version 19.38.33133 for x64"),
            "{}",
            id
        );
    }

    #[test]
    fn test_compiler_id_without_banner() {
        let f = TestFixture::new();
        let cl = f.mk_bin("cl.exe").unwrap();
        let invocation = CommandInvocation::new(&cl, ovec!["/c", "foo.c"], f.tempdir.path());
        let mut creator = MockCommandCreator::new();
        creator.next_command_spawns(Ok(MockChild::new(exit_status(0), "", "")));
        assert!(Msvc.get_compiler_id(&mut creator, &invocation).is_err());
    }
}
