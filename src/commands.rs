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

use crate::cache::disk::DiskCache;
use crate::cache::{storage_from_config, Storage};
use crate::cmdline::Command;
use crate::compiler::CommandInvocation;
use crate::config::Config;
use crate::dispatch::{run_original_command, DispatchResult, Dispatcher};
use crate::mock_command::{CommandCreator, ProcessCommandCreator};
use crate::temp::TempFiles;
use crate::util::format_size;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::errors::*;

/// The exit code reported when the compiler itself could not be run.
const EXIT_CANNOT_RUN: i32 = 127;

/// Write cache statistics for `cache` to `out`.
fn write_stats<W: Write>(cache: &DiskCache, out: &mut W) -> Result<()> {
    let size = cache.current_size()?.unwrap_or(0);
    let stats = [
        ("Cache location", cache.location()),
        ("Cache entries", cache.entry_count().to_string()),
        ("Cache size", format_size(size)),
        ("Max cache size", format_size(cache.max_size()?.unwrap_or(0))),
    ];
    let name_width = stats.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, value) in stats.iter() {
        writeln!(out, "{:<width$} {}", name, value, width = name_width + 2)?;
    }
    Ok(())
}

fn disk_cache(config: &Config) -> DiskCache {
    DiskCache::new(&config.cache.disk.dir, config.cache.disk.size)
}

/// Run `exe` with `cmdline` in `cwd` through the cache and return its exit code.
///
/// The command runs uncached when caching is disabled, when the cache
/// cannot be set up, or when no compiler adapter recognizes `exe`.
pub fn do_compile<T: CommandCreator>(
    creator: T,
    config: &Config,
    exe: OsString,
    cmdline: Vec<OsString>,
    cwd: PathBuf,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<i32> {
    let invocation = CommandInvocation::new(exe, cmdline, cwd);
    let mut creator = creator;
    if config.disable {
        debug!("caching disabled, running {:?}", invocation.executable);
        return run_original_command(&mut creator, &invocation);
    }
    let storage = storage_from_config(config).and_then(|s| s.check().map(|mode| (s, mode)));
    let storage = match storage {
        Ok((storage, mode)) => {
            debug!("using {} ({:?})", storage.location(), mode);
            storage
        }
        Err(e) => {
            warn!("running uncached, cache unavailable: {:#}", e);
            return run_original_command(&mut creator, &invocation);
        }
    };
    let temps = TempFiles::new(&config.temp_dir);
    let mut dispatcher = Dispatcher::new(creator, storage, temps, config.verify_hits);
    match dispatcher.handle(&invocation, stdout, stderr)? {
        DispatchResult::Handled { exit_code } => Ok(exit_code),
        DispatchResult::NotHandled => run_original_command(dispatcher.creator_mut(), &invocation),
    }
}

/// Run `cmd` and return the process exit status.
pub fn run_command(cmd: Command) -> Result<i32> {
    match cmd {
        Command::ShowStats => {
            trace!("Command::ShowStats");
            let config = Config::load()?;
            let stdout = io::stdout();
            write_stats(&disk_cache(&config), &mut stdout.lock())?;
        }
        Command::ClearCache => {
            trace!("Command::ClearCache");
            let config = Config::load()?;
            let cache = disk_cache(&config);
            cache
                .clear()
                .with_context(|| format!("failed to clear {}", cache.location()))?;
            println!("Cleared {}", cache.location());
        }
        Command::ShowConfig => {
            trace!("Command::ShowConfig");
            let config = Config::load()?;
            print!("{}", toml::to_string(&config)?);
        }
        Command::Compile { exe, cmdline, cwd } => {
            trace!("Command::Compile {{ {:?}, {:?}, {:?} }}", exe, cmdline, cwd);
            let config = Config::load().unwrap_or_else(|e| {
                warn!("ignoring configuration: {:#}", e);
                Config::from_env()
            });
            let exe_name = exe.clone();
            let stdout = io::stdout();
            let stderr = io::stderr();
            let res = do_compile(
                ProcessCommandCreator,
                &config,
                exe,
                cmdline,
                cwd,
                &mut stdout.lock(),
                &mut stderr.lock(),
            );
            return Ok(match res {
                Ok(code) => code,
                Err(e) => {
                    eprintln!("objcache: failed to run {:?}: {:#}", exe_name, e);
                    EXIT_CANNOT_RUN
                }
            });
        }
    }
    Ok(0)
}
