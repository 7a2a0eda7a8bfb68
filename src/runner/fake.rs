//! Scripted fake runner for unit tests

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Error;

use super::{ArgList, CommandOutput, CommandRunner, ProcessHandle, StdioSinks};

/// Records every argument vector and plays back scripted outputs in order.
///
/// Calls beyond the script fall through to a success with stdout `"fake-id"`,
/// so tests only script the invocations they care about.
pub(crate) struct FakeRunner {
    calls: Mutex<Vec<Vec<String>>>,
    masks: Mutex<Vec<Vec<bool>>>,
    script: Mutex<VecDeque<CommandOutput>>,
}

impl FakeRunner {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            masks: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue the next invocation's result.
    pub(crate) fn push(&self, status: i32, stdout: &str) -> &Self {
        self.script.lock().unwrap().push_back(CommandOutput {
            status,
            stdout: stdout.to_string(),
            stderr: String::new(),
        });
        self
    }

    /// Every argument vector seen so far, in invocation order.
    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Per-call mask flags, parallel to [`FakeRunner::calls`].
    pub(crate) fn masks(&self) -> Vec<Vec<bool>> {
        self.masks.lock().unwrap().clone()
    }

    fn record(&self, args: &ArgList) {
        self.calls
            .lock()
            .unwrap()
            .push(args.tokens().map(str::to_string).collect());
        self.masks
            .lock()
            .unwrap()
            .push(args.iter().map(|(_, masked)| masked).collect());
    }

    fn next_output(&self) -> CommandOutput {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(CommandOutput {
                status: 0,
                stdout: "fake-id".to_string(),
                stderr: String::new(),
            })
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, args: &ArgList) -> Result<CommandOutput, Error> {
        self.record(args);
        Ok(self.next_output())
    }

    async fn spawn(&self, args: &ArgList, _io: StdioSinks) -> Result<ProcessHandle, Error> {
        self.record(args);
        Ok(ProcessHandle::scripted(self.next_output().status))
    }
}
