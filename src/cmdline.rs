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

use crate::errors::*;
use clap::{value_parser, Arg, ArgAction, ArgGroup};
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

/// A specific command to run.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Show cache statistics and exit.
    ShowStats,
    /// Remove every cache entry.
    ClearCache,
    /// Show the resolved configuration.
    ShowConfig,
    /// Run a compiler command.
    Compile {
        /// The binary to execute.
        exe: OsString,
        /// The commandline arguments to pass to `exe`.
        cmdline: Vec<OsString>,
        /// The directory in which to execute the command.
        cwd: PathBuf,
    },
}

const ENV_VARS_HELP: &str = r#"Enabled features:
    A compiler named on the command line is run through the cache when it is
    recognized as clang, gcc or cl, and run unmodified otherwise.

Environment variables:
    OBJCACHE_CONF          config file location
    OBJCACHE_DIR           local disk cache directory
    OBJCACHE_CACHE_SIZE    maximum cache size, e.g. 10G
    OBJCACHE_DISABLE       run every command without caching
    OBJCACHE_READ_ONLY     look up entries, never store them
    OBJCACHE_VERIFY_HITS   check cached objects against their digest
    OBJCACHE_TEMP_DIR      directory for preprocessor output files
    OBJCACHE_LOG           log filter, e.g. debug
    OBJCACHE_LOG_FILE      write log output to this file instead of stderr
"#;

/// Get the `clap::Command` used for argument parsing.
fn get_clap_command() -> clap::Command {
    clap::Command::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .override_usage("objcache [OPTIONS] <--show-stats|--clear|--show-config|COMPILER [ARGS]...>")
        .after_help(ENV_VARS_HELP)
        .args(&[
            Arg::new("show-stats")
                .short('s')
                .long("show-stats")
                .help("show cache statistics")
                .action(ArgAction::SetTrue),
            Arg::new("clear")
                .short('C')
                .long("clear")
                .help("remove every entry from the cache")
                .action(ArgAction::SetTrue),
            Arg::new("show-config")
                .long("show-config")
                .help("show the resolved configuration")
                .action(ArgAction::SetTrue),
            Arg::new("CMD")
                .value_parser(value_parser!(OsString))
                .num_args(1..)
                .trailing_var_arg(true)
                .action(ArgAction::Append),
        ])
        .group(
            ArgGroup::new("one_and_only")
                .args(["show-stats", "clear", "show-config", "CMD"])
                .required(true),
        )
}

/// Parse the commandline into a `Command` to execute.
pub fn try_parse() -> Result<Command> {
    let cwd =
        env::current_dir().context("objcache: Couldn't determine current working directory")?;
    try_parse_from(env::args_os(), cwd)
}

pub fn try_parse_from<I, T>(args: I, cwd: PathBuf) -> Result<Command>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    trace!("parse");
    let matches = get_clap_command().try_get_matches_from(args)?;

    if matches.get_flag("show-stats") {
        Ok(Command::ShowStats)
    } else if matches.get_flag("clear") {
        Ok(Command::ClearCache)
    } else if matches.get_flag("show-config") {
        Ok(Command::ShowConfig)
    } else if let Some(mut args) = matches.get_many::<OsString>("CMD") {
        let exe = match args.next() {
            Some(exe) => exe.clone(),
            None => bail!("No compile command"),
        };
        let cmdline = args.cloned().collect::<Vec<_>>();
        Ok(Command::Compile { exe, cmdline, cwd })
    } else {
        unreachable!("Either a compile or one of the management commands must be present")
    }
}
