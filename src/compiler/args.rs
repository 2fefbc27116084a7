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

//! Table-driven command line tokenizing shared by the compiler adapters.

use crate::errors::*;
use std::ffi::{OsStr, OsString};

/// How a value is passed to an argument that takes one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgDisposition {
    /// As "-arg value"
    Separated,
    /// As "-argvalue", but "-arg value" would be valid too
    CanBeSeparated,
    /// As "-argvalue"
    Concatenated,
}

/// How a value was actually passed on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueForm {
    Separated,
    Concatenated,
}

/// Description of one known argument.
#[derive(Debug)]
pub enum ArgInfo<T> {
    /// A flag without a value, only matched exactly.
    Flag(&'static str, T),
    /// A flag matched exactly or as a prefix, e.g. `-fprofile-use=dir`.
    Prefix(&'static str, T),
    /// An argument taking a value.
    TakeArg(&'static str, ArgDisposition, T),
}

impl<T> ArgInfo<T> {
    fn name(&self) -> &'static str {
        match *self {
            ArgInfo::Flag(s, _) | ArgInfo::Prefix(s, _) | ArgInfo::TakeArg(s, _, _) => s,
        }
    }

    fn matches_prefix(&self) -> bool {
        !matches!(
            *self,
            ArgInfo::Flag(..) | ArgInfo::TakeArg(_, ArgDisposition::Separated, _)
        )
    }
}

/// Helper macro used to define `ArgInfo::Flag`s and `ArgInfo::Prefix`es.
///     flag!("-foo", Data)
///     flag!("-foo", Prefix, Data)
macro_rules! flag {
    ($s:expr, Prefix, $d:expr) => {
        ArgInfo::Prefix($s, $d)
    };
    ($s:expr, $d:expr) => {
        ArgInfo::Flag($s, $d)
    };
}

/// Helper macro used to define `ArgInfo::TakeArg`s.
///     take_arg!("-foo", Separated, Data)
///     take_arg!("-foo", CanBeSeparated, Data)
macro_rules! take_arg {
    ($s:expr, $disp:ident, $d:expr) => {
        ArgInfo::TakeArg($s, ArgDisposition::$disp, $d)
    };
}

/// Representation of a parsed argument
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Argument<T> {
    /// Unknown non-flag argument ; e.g. "foo.c"
    Raw(OsString),
    /// Unknown flag argument ; e.g. "-foo"
    UnknownFlag(OsString),
    /// Known flag, as written on the command line.
    Flag(OsString, T),
    /// Known argument with a value: the flag as written, and the value.
    WithValue(OsString, T, OsString, ValueForm),
}

impl<T: Copy> Argument<T> {
    pub fn data(&self) -> Option<T> {
        match *self {
            Argument::Flag(_, d) | Argument::WithValue(_, d, _, _) => Some(d),
            _ => None,
        }
    }
}

impl<T> Argument<T> {
    /// The flag part of the argument as written, if any.
    pub fn flag(&self) -> Option<&OsStr> {
        match *self {
            Argument::Raw(_) => None,
            Argument::UnknownFlag(ref s) | Argument::Flag(ref s, _) => Some(s),
            Argument::WithValue(ref s, _, _, _) => Some(s),
        }
    }

    pub fn value(&self) -> Option<&OsStr> {
        match *self {
            Argument::WithValue(_, _, ref v, _) => Some(v),
            _ => None,
        }
    }

    /// The command line tokens this argument was parsed from.
    pub fn to_os_strings(&self) -> Vec<OsString> {
        match *self {
            Argument::Raw(ref s) | Argument::UnknownFlag(ref s) | Argument::Flag(ref s, _) => {
                vec![s.clone()]
            }
            Argument::WithValue(ref f, _, ref v, ValueForm::Separated) => {
                vec![f.clone(), v.clone()]
            }
            Argument::WithValue(ref f, _, ref v, ValueForm::Concatenated) => {
                let mut s = f.clone();
                s.push(v);
                vec![s]
            }
        }
    }
}

/// Which characters introduce a flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagSyntax {
    /// `-flag`; table names include the dash.
    Gnu,
    /// `/flag` or `-flag`; table names omit the prefix character.
    Msvc,
}

impl FlagSyntax {
    /// Split `arg` into the part looked up in the tables, if it is a flag.
    fn lookup_key<'a>(&self, arg: &'a str) -> Option<&'a str> {
        if arg.len() < 2 {
            return None;
        }
        match *self {
            FlagSyntax::Gnu if arg.starts_with('-') => Some(arg),
            FlagSyntax::Msvc if arg.starts_with('-') || arg.starts_with('/') => Some(&arg[1..]),
            _ => None,
        }
    }
}

/// Find the entry for `key`: an exact match wins, otherwise the longest
/// prefix among entries that accept one.
fn search<'a, T>(tables: &[&'a [ArgInfo<T>]], key: &str) -> Option<&'a ArgInfo<T>> {
    let all = || tables.iter().flat_map(|t| t.iter());
    if let Some(info) = all().find(|info| info.name() == key) {
        return Some(info);
    }
    all()
        .filter(|info| info.matches_prefix() && key.starts_with(info.name()))
        .max_by_key(|info| info.name().len())
}

/// Iterates over `arguments`, classifying each one with `tables`.
pub struct ArgsIter<'a, I, T> {
    arguments: I,
    tables: &'a [&'a [ArgInfo<T>]],
    syntax: FlagSyntax,
}

impl<'a, I, T> ArgsIter<'a, I, T>
where
    I: Iterator<Item = OsString>,
{
    pub fn new(arguments: I, tables: &'a [&'a [ArgInfo<T>]], syntax: FlagSyntax) -> Self {
        ArgsIter {
            arguments,
            tables,
            syntax,
        }
    }

    fn classify(&mut self, arg: OsString) -> Result<Argument<T>>
    where
        T: Copy,
    {
        let s = match arg.to_str() {
            Some(s) => s,
            // Inputs may be arbitrary paths, flags we only know as text.
            None if self.syntax.lookup_key(&arg.to_string_lossy()).is_some() => {
                incomplete!("non-UTF-8 flag {:?}", arg)
            }
            None => return Ok(Argument::Raw(arg)),
        };
        let key = match self.syntax.lookup_key(s) {
            Some(key) => key,
            None => return Ok(Argument::Raw(arg)),
        };
        let info = match search(self.tables, key) {
            Some(info) => info,
            None => return Ok(Argument::UnknownFlag(arg)),
        };
        let written_len = s.len() - key.len() + info.name().len();
        let flag = OsString::from(&s[..written_len]);
        Ok(match *info {
            ArgInfo::Flag(_, d) | ArgInfo::Prefix(_, d) => Argument::Flag(arg, d),
            ArgInfo::TakeArg(name, disposition, d) => {
                if key.len() > name.len() || disposition == ArgDisposition::Concatenated {
                    let value = OsString::from(&key[name.len()..]);
                    Argument::WithValue(flag, d, value, ValueForm::Concatenated)
                } else {
                    match self.arguments.next() {
                        Some(value) => Argument::WithValue(flag, d, value, ValueForm::Separated),
                        None => incomplete!("missing value for {}", s),
                    }
                }
            }
        })
    }
}

impl<'a, I, T> Iterator for ArgsIter<'a, I, T>
where
    I: Iterator<Item = OsString>,
    T: Copy,
{
    type Item = Result<Argument<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let arg = self.arguments.next()?;
        Some(self.classify(arg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Data {
        A,
        B,
        C,
        D,
    }

    static TABLE: [ArgInfo<Data>; 5] = [
        flag!("-c", Data::A),
        flag!("-fprofile-use", Prefix, Data::B),
        take_arg!("-I", CanBeSeparated, Data::C),
        take_arg!("-include", Separated, Data::D),
        take_arg!("-o", CanBeSeparated, Data::C),
    ];

    fn parse(args: Vec<OsString>) -> Vec<Argument<Data>> {
        ArgsIter::new(args.into_iter(), &[&TABLE[..]], FlagSyntax::Gnu)
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_classify() {
        let args = parse(ovec![
            "-c",
            "foo.c",
            "-Ifoo",
            "-I",
            "bar",
            "-fprofile-use=x",
            "-Wall",
            "-include",
            "a.h"
        ]);
        assert_eq!(
            args,
            vec![
                Argument::Flag("-c".into(), Data::A),
                Argument::Raw("foo.c".into()),
                Argument::WithValue("-I".into(), Data::C, "foo".into(), ValueForm::Concatenated),
                Argument::WithValue("-I".into(), Data::C, "bar".into(), ValueForm::Separated),
                Argument::Flag("-fprofile-use=x".into(), Data::B),
                Argument::UnknownFlag("-Wall".into()),
                Argument::WithValue("-include".into(), Data::D, "a.h".into(), ValueForm::Separated),
            ]
        );
    }

    #[test]
    fn test_exact_beats_prefix() {
        // `-include` must not be read as `-I` with value `nclude`.
        let args = parse(ovec!["-include", "x.h"]);
        assert_eq!(args[0].data(), Some(Data::D));
    }

    #[test]
    fn test_flag_is_not_a_prefix() {
        let args = parse(ovec!["-cfoo"]);
        assert_eq!(args, vec![Argument::UnknownFlag("-cfoo".into())]);
    }

    #[test]
    fn test_round_trip_tokens() {
        let original = ovec!["-Ifoo", "-o", "out.o", "-fprofile-use=x", "bar.c"];
        let args = parse(original.clone());
        let tokens: Vec<OsString> = args.iter().flat_map(|a| a.to_os_strings()).collect();
        assert_eq!(original, tokens);
    }

    #[test]
    fn test_missing_value() {
        let res: Result<Vec<_>> =
            ArgsIter::new(ovec!["-o"].into_iter(), &[&TABLE[..]], FlagSyntax::Gnu).collect();
        let err = res.unwrap_err();
        assert!(err.downcast_ref::<IncompleteRequest>().is_some());
    }

    #[test]
    fn test_msvc_syntax() {
        static MSVC: [ArgInfo<Data>; 2] = [
            flag!("c", Data::A),
            take_arg!("Fo", Concatenated, Data::C),
        ];
        let args: Vec<_> = ArgsIter::new(
            ovec!["/c", "-Fofoo.obj", "/Fo", "foo.c"].into_iter(),
            &[&MSVC[..]],
            FlagSyntax::Msvc,
        )
        .collect::<Result<Vec<_>>>()
        .unwrap();
        assert_eq!(
            args,
            vec![
                Argument::Flag("/c".into(), Data::A),
                Argument::WithValue("-Fo".into(), Data::C, "foo.obj".into(), ValueForm::Concatenated),
                Argument::WithValue("/Fo".into(), Data::C, "".into(), ValueForm::Concatenated),
                Argument::Raw("foo.c".into()),
            ]
        );
    }
}
