//! Query engine collaborators for forwarded queries.

use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Instant;

use tracing::debug;

use crate::common::error::{CardError, CardResult};

/// Executes query text and returns the engine's textual answer.
pub trait QueryEngine: Send {
    fn execute(&mut self, query: &str) -> CardResult<String>;
}

/// Placeholder used when no engine is configured; every query fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEngine;

impl QueryEngine for NoEngine {
    fn execute(&mut self, _query: &str) -> CardResult<String> {
        Err(CardError::Engine("no query engine configured".to_string()))
    }
}

/// Runs a shell command per query: query text on stdin, answer on stdout.
///
/// There is no timeout; a hung command stalls the caller.
// TODO: kill the child after a configurable deadline and report a Timeout error.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    command: String,
}

impl CommandEngine {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl QueryEngine for CommandEngine {
    fn execute(&mut self, query: &str) -> CardResult<String> {
        let start = Instant::now();
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CardError::Engine(format!("spawn `{}`: {e}", self.command)))?;

        // The child may fill stdout before it has read all of its input.
        let writer = child.stdin.take().map(|mut stdin| {
            let bytes = query.as_bytes().to_vec();
            thread::spawn(move || stdin.write_all(&bytes))
        });

        let output = child.wait_with_output()?;
        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                // A command that ignores its input may close the pipe early.
                Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => return Err(CardError::Io(e)),
                Err(_) => return Err(CardError::Engine("stdin writer panicked".to_string())),
            }
        }

        debug!(
            ev = "engine_exec",
            status = output.status.code().unwrap_or(-1),
            len = output.stdout.len(),
            dur_us = start.elapsed().as_micros() as u64,
        );
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(CardError::Engine(if detail.is_empty() {
                format!("query command exited with {}", output.status)
            } else {
                detail.to_string()
            }));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    /// Run `query` through `command` on a helper thread; `None` if it hangs.
    fn run_bounded(command: &str, query: String) -> Option<CardResult<String>> {
        let (tx, rx) = mpsc::channel();
        let mut engine = CommandEngine::new(command);
        thread::spawn(move || {
            let _ = tx.send(engine.execute(&query));
        });
        rx.recv_timeout(Duration::from_secs(10)).ok()
    }

    #[test]
    fn no_engine_always_fails() {
        let err = NoEngine.execute("select 1").err().expect("must fail");
        assert_eq!(err.to_string(), "engine: no query engine configured");
    }

    #[test]
    fn command_receives_query_on_stdin() {
        let mut engine = CommandEngine::new("tr a-z A-Z");
        assert_eq!(engine.execute("select 1").expect("run"), "SELECT 1");
    }

    #[test]
    fn failing_command_reports_stderr() {
        let mut engine = CommandEngine::new("echo 'no such table' >&2; exit 3");
        match engine.execute("select * from nope") {
            Err(CardError::Engine(msg)) => assert_eq!(msg, "no such table"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn silent_failure_reports_exit_status() {
        let mut engine = CommandEngine::new("exit 1");
        let err = engine.execute("q").err().expect("must fail");
        assert!(err.to_string().contains("exited with"));
    }

    #[test]
    fn query_larger_than_a_pipe_buffer_streams_through() {
        let query = "x".repeat(300 * 1024);
        let answer = run_bounded("cat", query.clone())
            .expect("command finished")
            .expect("run");
        assert_eq!(answer.len(), query.len());
        assert_eq!(answer, query);
    }

    #[test]
    fn command_that_ignores_a_large_query_still_answers() {
        let answer = run_bounded("echo done", "y".repeat(300 * 1024))
            .expect("command finished")
            .expect("run");
        assert_eq!(answer, "done\n");
    }
}
