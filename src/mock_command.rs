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

//! Traits and types for mocking process execution.
//!
//! This module provides a set of traits and types that can be used
//! to write code that expects to execute processes using `std::process::Command`
//! in a way that can be mocked for tests.
//!
//! Instead of using `Command::new()`, make your code generic using
//! `CommandCreator` as a trait bound, and use its `new_command` method.
//! `new_command` returns an object implementing `RunCommand`, whose
//! `spawn` method returns a `CommandChild`.
//!
//! For production code, pass a `ProcessCommandCreator`. For tests, pass
//! a `MockCommandCreator` and queue up the results of the commands the
//! code under test is expected to run with `next_command_spawns` or
//! `next_command_calls`.

use crate::errors::*;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Output, Stdio};

/// A trait that provides a subset of the methods of `std::process::Child`.
pub trait CommandChild {
    /// Wait for the process to complete and return its exit status.
    fn wait(&mut self) -> io::Result<ExitStatus>;
    /// Wait for the process to complete and return its exit status and output.
    fn wait_with_output(self) -> io::Result<Output>;
}

impl CommandChild for Child {
    fn wait(&mut self) -> io::Result<ExitStatus> {
        Child::wait(self)
    }
    fn wait_with_output(self) -> io::Result<Output> {
        Child::wait_with_output(self)
    }
}

/// A trait that provides a subset of the methods of `std::process::Command`.
pub trait RunCommand: fmt::Debug {
    /// The type returned by `spawn`.
    type C: CommandChild + 'static;

    /// Append `arg` to the process commandline.
    fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self;
    /// Append `args` to the process commandline.
    fn args<S: AsRef<OsStr>>(&mut self, args: &[S]) -> &mut Self;
    /// Set the working directory of the process to `dir`.
    fn current_dir<P: AsRef<Path>>(&mut self, dir: P) -> &mut Self;
    /// Set the process' stdin from `cfg`.
    fn stdin(&mut self, cfg: Stdio) -> &mut Self;
    /// Set the process' stdout from `cfg`.
    fn stdout(&mut self, cfg: Stdio) -> &mut Self;
    /// Set the process' stderr from `cfg`.
    fn stderr(&mut self, cfg: Stdio) -> &mut Self;
    /// Execute the process and return a process object.
    fn spawn(&mut self) -> Result<Self::C>;
}

impl RunCommand for Command {
    type C = Child;

    fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Command {
        Command::arg(self, arg)
    }
    fn args<S: AsRef<OsStr>>(&mut self, args: &[S]) -> &mut Command {
        Command::args(self, args)
    }
    fn current_dir<P: AsRef<Path>>(&mut self, dir: P) -> &mut Command {
        Command::current_dir(self, dir)
    }
    fn stdin(&mut self, cfg: Stdio) -> &mut Command {
        Command::stdin(self, cfg)
    }
    fn stdout(&mut self, cfg: Stdio) -> &mut Command {
        Command::stdout(self, cfg)
    }
    fn stderr(&mut self, cfg: Stdio) -> &mut Command {
        Command::stderr(self, cfg)
    }
    fn spawn(&mut self) -> Result<Child> {
        Command::spawn(self).with_context(|| format!("failed to spawn {:?}", self))
    }
}

/// A trait for creating objects that implement `RunCommand`.
pub trait CommandCreator {
    /// The type returned by `new_command`.
    type Cmd: RunCommand;

    /// Return a new object that implements `RunCommand` and can be
    /// used to create a new process.
    fn new_command<S: AsRef<OsStr>>(&mut self, program: S) -> Self::Cmd;
}

/// A `CommandCreator` that returns `std::process::Command`.
pub struct ProcessCommandCreator;

impl CommandCreator for ProcessCommandCreator {
    type Cmd = Command;

    fn new_command<S: AsRef<OsStr>>(&mut self, program: S) -> Command {
        Command::new(program)
    }
}

#[cfg(unix)]
pub type ExitStatusValue = i32;
#[cfg(windows)]
pub type ExitStatusValue = u32;

/// Build an `ExitStatus` that reports `v` as its exit code.
#[allow(dead_code)]
pub fn exit_status(v: ExitStatusValue) -> ExitStatus {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        // The raw value is a wait status; the exit code lives in the second byte.
        ExitStatus::from_raw(v << 8)
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::ExitStatusExt;
        ExitStatus::from_raw(v)
    }
}

/// A mock `CommandChild` that returns a predetermined output.
#[allow(dead_code)]
#[derive(Debug)]
pub struct MockChild {
    pub output: Option<io::Result<Output>>,
}

impl MockChild {
    /// Create a `MockChild` that will return the specified `status`, `stdout`, and `stderr` when waited upon.
    #[allow(dead_code)]
    pub fn new<T: AsRef<[u8]>, U: AsRef<[u8]>>(
        status: ExitStatus,
        stdout: T,
        stderr: U,
    ) -> MockChild {
        MockChild {
            output: Some(Ok(Output {
                status,
                stdout: stdout.as_ref().to_vec(),
                stderr: stderr.as_ref().to_vec(),
            })),
        }
    }

    /// Create a `MockChild` that will return the specified `err` when waited upon.
    #[allow(dead_code)]
    pub fn with_error(err: io::Error) -> MockChild {
        MockChild {
            output: Some(Err(err)),
        }
    }
}

impl CommandChild for MockChild {
    fn wait(&mut self) -> io::Result<ExitStatus> {
        match self.output.take() {
            Some(output) => output.map(|o| o.status),
            None => Err(io::Error::new(io::ErrorKind::Other, "MockChild already waited")),
        }
    }
    fn wait_with_output(mut self) -> io::Result<Output> {
        match self.output.take() {
            Some(output) => output,
            None => Err(io::Error::new(io::ErrorKind::Other, "MockChild already waited")),
        }
    }
}

pub enum ChildOrCall {
    Child(Result<MockChild>),
    Call(Box<dyn FnOnce(&[OsString]) -> Result<MockChild>>),
}

impl fmt::Debug for ChildOrCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ChildOrCall::Child(ref r) => write!(f, "ChildOrCall::Child({:?}", r),
            ChildOrCall::Call(_) => write!(f, "ChildOrCall::Call(...)"),
        }
    }
}

/// A mock `RunCommand` that returns a predetermined `MockChild` or calls a function.
#[allow(dead_code)]
#[derive(Debug)]
pub struct MockCommand {
    pub child: Option<ChildOrCall>,
    pub args: Vec<OsString>,
}

impl RunCommand for MockCommand {
    type C = MockChild;

    fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut MockCommand {
        self.args.push(arg.as_ref().to_owned());
        self
    }
    fn args<S: AsRef<OsStr>>(&mut self, args: &[S]) -> &mut MockCommand {
        self.args.extend(args.iter().map(|a| a.as_ref().to_owned()));
        self
    }
    fn current_dir<P: AsRef<Path>>(&mut self, _dir: P) -> &mut MockCommand {
        //TODO: assert value of dir
        self
    }
    fn stdin(&mut self, _cfg: Stdio) -> &mut MockCommand {
        self
    }
    fn stdout(&mut self, _cfg: Stdio) -> &mut MockCommand {
        self
    }
    fn stderr(&mut self, _cfg: Stdio) -> &mut MockCommand {
        self
    }
    fn spawn(&mut self) -> Result<MockChild> {
        match self.child.take() {
            Some(ChildOrCall::Child(c)) => c,
            Some(ChildOrCall::Call(f)) => f(&self.args),
            None => bail!("MockCommand spawned twice"),
        }
    }
}

/// `MockCommandCreator` allows mocking out process creation by providing `MockChild` instances to be used in advance.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockCommandCreator {
    /// Data to be used as the return value of `MockCommand::spawn`.
    pub children: Vec<ChildOrCall>,
}

impl MockCommandCreator {
    #[allow(dead_code)]
    pub fn new() -> MockCommandCreator {
        MockCommandCreator { children: vec![] }
    }

    /// The next `MockCommand` created will return `child` from `RunCommand::spawn`.
    #[allow(dead_code)]
    pub fn next_command_spawns(&mut self, child: Result<MockChild>) {
        self.children.push(ChildOrCall::Child(child));
    }

    /// The next `MockCommand` created will call `call` with the command-line
    /// arguments passed to the command.
    #[allow(dead_code)]
    pub fn next_command_calls<C>(&mut self, call: C)
    where
        C: FnOnce(&[OsString]) -> Result<MockChild> + 'static,
    {
        self.children.push(ChildOrCall::Call(Box::new(call)));
    }
}

impl CommandCreator for MockCommandCreator {
    type Cmd = MockCommand;

    fn new_command<S: AsRef<OsStr>>(&mut self, _program: S) -> MockCommand {
        assert!(
            !self.children.is_empty(),
            "Too many calls to MockCommandCreator::new_command, or not enough to MockCommandCreator::new_command_spawns!"
        );
        //TODO: assert value of program
        MockCommand {
            child: Some(self.children.remove(0)),
            args: vec![],
        }
    }
}
