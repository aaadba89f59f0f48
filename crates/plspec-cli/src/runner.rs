//! External test command supervision

use crate::error::{CliError, CliResult};
use plspec::InterruptFlag;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::runtime::Runtime;
use tokio::sync::Notify;

/// How the test command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    /// Exit status zero
    Passed,
    /// Non-zero exit, or killed by a signal (`None`)
    Failed(Option<i32>),
    /// The driving process was interrupted and the child was stopped
    Interrupted,
}

impl TestStatus {
    /// Whether the suite passed
    #[must_use]
    pub const fn passed(self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// The command that drives the test suite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCommand {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl TestCommand {
    /// Build from `program arg...`
    pub fn from_argv(argv: &[String]) -> CliResult<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| CliError::invalid_argument("no test command given"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            env: Vec::new(),
        })
    }

    /// Add an environment variable for the child
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Program name
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run to completion, stopping the child once `interrupt` is raised
    async fn supervise(&self, interrupt: &Interrupt) -> CliResult<TestStatus> {
        let notified = interrupt.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if interrupt.flag.is_raised() {
            return Ok(TestStatus::Interrupted);
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CliError::test_execution(format!("cannot start '{}': {e}", self.program)))?;

        tracing::debug!(program = %self.program, pid = ?child.id(), "test command started");

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                tracing::debug!(%status, "test command finished");
                Ok(if status.success() {
                    TestStatus::Passed
                } else {
                    TestStatus::Failed(status.code())
                })
            }
            () = &mut notified => {
                tracing::warn!(program = %self.program, "interrupted; stopping test command");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "test command could not be stopped");
                }
                Ok(TestStatus::Interrupted)
            }
        }
    }
}

/// Ctrl-C state: a flag the engine polls and a wake-up for the running child
#[derive(Debug, Clone, Default)]
struct Interrupt {
    flag: InterruptFlag,
    notify: Arc<Notify>,
}

impl Interrupt {
    fn raise(&self) {
        self.flag.raise();
        self.notify.notify_waiters();
    }
}

/// Owns the runtime the test command runs on and the Ctrl-C watcher
///
/// Once [`Supervisor::watch_ctrl_c`] has run, SIGINT no longer ends the
/// process. It raises the interrupt, which the engine checks between deploys
/// and which stops a running test command.
#[derive(Debug)]
pub struct Supervisor {
    runtime: Runtime,
    interrupt: Interrupt,
}

impl Supervisor {
    /// Build the runtime
    pub fn new() -> CliResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        Ok(Self {
            runtime,
            interrupt: Interrupt::default(),
        })
    }

    /// Start turning SIGINT into a raised interrupt
    pub fn watch_ctrl_c(&self) -> CliResult<()> {
        let _context = self.runtime.enter();
        let interrupt = self.interrupt.clone();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigint = signal(SignalKind::interrupt())?;
            self.runtime.spawn(async move {
                while sigint.recv().await.is_some() {
                    tracing::warn!("interrupt received");
                    interrupt.raise();
                }
            });
        }

        #[cfg(not(unix))]
        self.runtime.spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received");
                interrupt.raise();
            }
        });

        Ok(())
    }

    /// Flag handed to the coverage engine
    #[must_use]
    pub fn interrupt_flag(&self) -> InterruptFlag {
        self.interrupt.flag.clone()
    }

    /// Run the test command, blocking the calling thread
    pub fn run(&self, command: &TestCommand) -> CliResult<TestStatus> {
        self.runtime.block_on(command.supervise(&self.interrupt))
    }
}
