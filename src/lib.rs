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

#![deny(rust_2018_idioms)]
#![allow(clippy::new_without_default)]

#[macro_use]
extern crate log;
// To get macros in scope, this has to be first.
#[cfg(test)]
#[macro_use]
mod test;

#[macro_use]
pub mod errors;

pub mod cache;
mod cmdline;
mod commands;
pub mod compiler;
pub mod config;
pub mod dispatch;
pub mod mock_command;
pub mod temp;
#[doc(hidden)]
pub mod util;

use std::env;
use std::fs::OpenOptions;

/// VERSION is the pkg version of objcache.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The environment variable holding the log filter, in `env_logger` syntax.
pub const LOGGING_ENV: &str = "OBJCACHE_LOG";

/// When set, log output is appended to this file instead of going to stderr.
pub const LOG_FILE_ENV: &str = "OBJCACHE_LOG_FILE";

pub fn main() {
    init_logging();

    let command = match cmdline::try_parse() {
        Ok(cmd) => cmd,
        Err(e) => match e.downcast::<clap::error::Error>() {
            // If the error is from clap then let them handle formatting and exiting
            Ok(clap_err) => clap_err.exit(),
            Err(some_other_err) => {
                eprintln!("objcache: {some_other_err}");
                for source in some_other_err.chain().skip(1) {
                    eprintln!("objcache: caused by: {source}");
                }
                std::process::exit(1);
            }
        },
    };

    std::process::exit(match commands::run_command(command) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("objcache: error: {}", e);
            for e in e.chain().skip(1) {
                eprintln!("objcache: caused by: {}", e);
            }
            2
        }
    });
}

fn init_logging() {
    if env::var(LOGGING_ENV).is_err() {
        return;
    }
    let mut builder = env_logger::Builder::from_env(LOGGING_ENV);
    if let Some(path) = env::var_os(LOG_FILE_ENV) {
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("objcache: cannot open log file {:?}: {}", path, e),
        }
    }
    if let Err(e) = builder.try_init() {
        panic!("Failed to initialize logging: {:?}", e);
    }
}
