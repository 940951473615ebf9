//! Narrow seam between the backends and the external tools they drive.
//!
//! Backends only ever see [`ProcessRunner`]: argument vectors in, exit code
//! and captured output out. Nothing goes through a shell.

use crate::core::error::{Result, SubmitError};
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    /// `-1` when the process was killed by a signal.
    pub code: i32,
    /// Trimmed.
    pub stdout: String,
    /// Trimmed.
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Stderr, or stdout when stderr is empty.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

pub trait ProcessRunner: Send + Sync {
    /// Resolve `program` on the execution `PATH`.
    fn which(&self, program: &str) -> Option<PathBuf>;

    /// Run `program` to completion. A process that exits non-zero is still
    /// `Ok`; only spawn failures and timeouts are errors.
    fn run(
        &self,
        program: &str,
        args: &[String],
    ) -> impl Future<Output = Result<ProcessOutput>> + Send;
}

/// Runs real processes with a hard wall-clock timeout.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ProcessRunner for SystemRunner {
    fn which(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput> {
        tracing::debug!(program, ?args, "Running external command");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| SubmitError::ProcessTimeout {
                program: program.to_string(),
                timeout: self.timeout,
            })??;

        let result = ProcessOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };
        tracing::debug!(program, code = result.code, "External command finished");
        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;

    /// Scripted stand-in for [`SystemRunner`] that records every call.
    #[derive(Default)]
    pub(crate) struct FakeRunner {
        tools: HashSet<String>,
        responses: Mutex<VecDeque<(String, Result<ProcessOutput>)>>,
        calls: Mutex<Vec<Vec<String>>>,
        artifacts: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        pub(crate) fn with_tools(tools: &[&str]) -> Self {
            Self {
                tools: tools.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            }
        }

        /// Queue the reply for the next call to `program`. Calls with no
        /// queued reply exit 1 with empty output.
        pub(crate) fn reply(self, program: &str, code: i32, stdout: &str, stderr: &str) -> Self {
            self.responses.lock().unwrap().push_back((
                program.to_string(),
                Ok(ProcessOutput {
                    code,
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                }),
            ));
            self
        }

        pub(crate) fn fail_with(self, program: &str, err: SubmitError) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push_back((program.to_string(), Err(err)));
            self
        }

        pub(crate) fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        /// Contents of any existing file passed as an argument, captured at
        /// call time.
        pub(crate) fn artifacts(&self) -> Vec<String> {
            self.artifacts.lock().unwrap().clone()
        }
    }

    impl ProcessRunner for FakeRunner {
        fn which(&self, program: &str) -> Option<PathBuf> {
            self.tools
                .contains(program)
                .then(|| PathBuf::from("/usr/bin").join(program))
        }

        async fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput> {
            let mut call = vec![program.to_string()];
            call.extend(args.iter().cloned());
            self.calls.lock().unwrap().push(call);

            for arg in args {
                if let Ok(text) = std::fs::read_to_string(arg) {
                    self.artifacts.lock().unwrap().push(text);
                }
            }

            let mut responses = self.responses.lock().unwrap();
            let position = responses.iter().position(|(p, _)| p == program);
            match position.and_then(|i| responses.remove(i)) {
                Some((_, reply)) => reply,
                None => Ok(ProcessOutput {
                    code: 1,
                    ..Default::default()
                }),
            }
        }
    }
}
