//! Utilities for running control-plane tools through [`std::process::Command`].
//!
//! Every component of the engine talks to the kernel through an [`Executor`], which is injected
//! at construction time. The production implementation is [`Runner`]; tests substitute executors
//! that return captured listing output.

use std::{fmt, io, process, sync::Arc};

/// Failure to run a control-plane tool.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("empty command provided")]
    Empty,
    #[error("io error running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error(
        "{program} returned non-zero status ({}): {}",
        .output.code_str(),
        .output.stderr.trim()
    )]
    NonZero { program: String, output: Output },
}

/// Captured result of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    /// A successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self { code: Some(0), stdout: stdout.into(), stderr: String::new() }
    }

    /// A failed output with exit code 2 and the given stderr, the way `tc` fails.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self { code: Some(2), stdout: String::new(), stderr: stderr.into() }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    fn code_str(&self) -> String {
        self.code.map_or_else(|| "signal".to_string(), |c| c.to_string())
    }
}

impl From<process::Output> for Output {
    fn from(value: process::Output) -> Self {
        Self {
            code: value.status.code(),
            stdout: String::from_utf8_lossy(&value.stdout).to_string(),
            stderr: String::from_utf8_lossy(&value.stderr).to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Runs a named tool with arguments and returns its captured output.
///
/// Implementations must return [`Error::NonZero`] when the tool ran but failed, so callers can
/// tell "could not run" from "ran and refused".
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, program: &str, args: &[String]) -> Result<Output>;
}

/// Runs tools as child processes of the agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Runner;

impl Executor for Runner {
    fn execute(&self, program: &str, args: &[String]) -> Result<Output> {
        if program.is_empty() {
            return Err(Error::Empty);
        }

        let mut cmd = process::Command::new(program);
        cmd.args(args).stderr(process::Stdio::piped()).stdout(process::Stdio::piped());

        tracing::debug!(?cmd, "running command");

        let output: Output = cmd
            .spawn()
            .and_then(|child| child.wait_with_output())
            .map_err(|source| Error::Io { program: program.to_string(), source })?
            .into();

        if !output.success() {
            tracing::debug!(?output.stderr, ?output.code, ?cmd, "command returned non-zero status");
            return Err(Error::NonZero { program: program.to_string(), output });
        }

        Ok(output)
    }
}

/// Handle to the `tc` binary, carrying the injected executor.
///
/// Cheap to clone; every engine component owns one.
#[derive(Clone)]
pub struct Tc {
    program: Arc<str>,
    executor: Arc<dyn Executor>,
}

impl fmt::Debug for Tc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tc").field("program", &self.program).finish_non_exhaustive()
    }
}

impl Tc {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { program: Arc::from("tc"), executor }
    }

    /// Use a different `tc` binary, e.g. an absolute path.
    pub fn with_program(mut self, program: impl AsRef<str>) -> Self {
        self.program = Arc::from(program.as_ref());
        self
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Runs `tc <args>` and returns its stdout.
    pub fn run<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        tracing::debug!("running: {} {}", self.program, args.join(" "));

        let output = self.executor.execute(&self.program, &args)?;
        tracing::trace!(stdout = %output.stdout, "output from tc");

        Ok(output.stdout)
    }

    /// Runs `tc <args>`, logging instead of failing when the tool refuses. Used for deletions
    /// whose target may legitimately be absent.
    pub fn run_tolerant<I, S>(&self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Err(e) = self.run(args) {
            tracing::debug!(%e, "ignoring tc failure");
        }
    }
}
