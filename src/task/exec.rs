//! External command tasks: EXEC and EXECMOVE.
//!
//! Exit status 0 is success, 1 is a warning and anything else fails the
//! task. The delay budget, when non-zero, is the timeout in milliseconds;
//! the child is killed if the pipeline stops waiting for it.

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{Task, TaskContext, TaskOutcome};
use crate::runner::StepStatus;

struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

fn timeout_of(delay_ms: u64) -> Option<Duration> {
    (delay_ms > 0).then(|| Duration::from_millis(delay_ms))
}

/// Spawn the command and wait for it, mapping failures to step codes
async fn run_command(line: &str) -> Result<Output, TaskOutcome> {
    let Some(cmd) = CommandLine::parse(line) else {
        return Err(TaskOutcome::failed(StepStatus::CommandNotFound, "empty command"));
    };
    let program = Path::new(&cmd.program);
    if program.is_absolute() && !program.is_file() {
        return Err(TaskOutcome::failed(
            StepStatus::CommandNotFound,
            format!("command not found: {}", cmd.program),
        ));
    }

    debug!(program = %cmd.program, args = ?cmd.args, "Running external command");
    Command::new(&cmd.program)
        .args(&cmd.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TaskOutcome::failed(
                    StepStatus::CommandNotFound,
                    format!("command not found: {}", cmd.program),
                )
            } else {
                TaskOutcome::failed(StepStatus::ExternalOp, e.to_string())
            }
        })
}

/// Classify the exit status
fn classify(line: &str, output: &Output) -> TaskOutcome {
    match output.status.code() {
        Some(0) => TaskOutcome::Success,
        Some(1) => {
            warn!(command = line, "External command exited with warning status");
            TaskOutcome::Warning(format!("{} exited with status 1", line))
        }
        code => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            TaskOutcome::failed(
                StepStatus::ExternalOp,
                format!(
                    "{} exited with {:?}: {}",
                    line,
                    code,
                    stderr.lines().last().unwrap_or("")
                ),
            )
        }
    }
}

/// Run an external command
pub struct ExecTask {
    command: String,
    delay: u64,
}

impl ExecTask {
    pub fn new(command: &str, delay: u64) -> Self {
        Self {
            command: command.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl Task for ExecTask {
    fn kind(&self) -> &'static str {
        "EXEC"
    }

    fn timeout(&self) -> Option<Duration> {
        timeout_of(self.delay)
    }

    async fn run(&mut self, _ctx: &mut TaskContext<'_>) -> TaskOutcome {
        match run_command(&self.command).await {
            Ok(output) => classify(&self.command, &output),
            Err(outcome) => outcome,
        }
    }
}

/// Run an external command whose last output line names the new current file
pub struct ExecMoveTask {
    command: String,
    delay: u64,
}

impl ExecMoveTask {
    pub fn new(command: &str, delay: u64) -> Self {
        Self {
            command: command.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl Task for ExecMoveTask {
    fn kind(&self) -> &'static str {
        "EXECMOVE"
    }

    fn timeout(&self) -> Option<Duration> {
        timeout_of(self.delay)
    }

    async fn run(&mut self, ctx: &mut TaskContext<'_>) -> TaskOutcome {
        let output = match run_command(&self.command).await {
            Ok(output) => output,
            Err(outcome) => return outcome,
        };
        let outcome = classify(&self.command, &output);
        if !outcome.is_success() {
            return outcome;
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.lines().map(str::trim).filter(|l| !l.is_empty()).last() {
            Some(new_file) => {
                ctx.record.set_file_moved(new_file, true);
                outcome
            }
            None => TaskOutcome::failed(
                StepStatus::ExternalOp,
                format!("{} did not report the new file name", self.command),
            ),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::PathsConfig;
    use crate::rule::TransferRule;
    use crate::runner::{NewTransfer, TransferMode, TransferRecord};

    fn record() -> TransferRecord {
        TransferRecord::new(
            "me",
            NewTransfer {
                rule_id: "r".into(),
                is_sender: true,
                requester: "me".into(),
                requested: "peer".into(),
                transfer_id: Some(1),
                file_name: "/tmp/original".into(),
                file_metadata: String::new(),
                block_size: 1024,
                mode: TransferMode::Send,
            },
        )
    }

    async fn run_exec(task: &mut dyn Task, record: &mut TransferRecord) -> TaskOutcome {
        let rule = TransferRule::new("r", TransferMode::Send);
        let paths = PathsConfig::default();
        let mut ctx = TaskContext::new(record, &rule, &paths, "me");
        task.run(&mut ctx).await
    }

    #[tokio::test]
    async fn test_exit_codes() {
        let mut rec = record();
        assert_eq!(
            run_exec(&mut ExecTask::new("true", 0), &mut rec).await,
            TaskOutcome::Success
        );
        assert!(matches!(
            run_exec(&mut ExecTask::new("false", 0), &mut rec).await,
            TaskOutcome::Warning(_)
        ));
        assert!(matches!(
            run_exec(&mut ExecTask::new("ls /nonexistent-mft-path", 0), &mut rec).await,
            TaskOutcome::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_command_not_found() {
        let mut rec = record();
        assert!(matches!(
            run_exec(&mut ExecTask::new("/no/such/binary --flag", 0), &mut rec).await,
            TaskOutcome::Failed {
                code: StepStatus::CommandNotFound,
                ..
            }
        ));
        assert!(matches!(
            run_exec(&mut ExecTask::new("no-such-binary-mft", 0), &mut rec).await,
            TaskOutcome::Failed {
                code: StepStatus::CommandNotFound,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_exec_move_takes_last_line() {
        let mut rec = record();
        let outcome = run_exec(&mut ExecMoveTask::new("echo /tmp/moved.bin", 0), &mut rec).await;
        assert_eq!(outcome, TaskOutcome::Success);
        assert_eq!(rec.file_name(), "/tmp/moved.bin");
        assert!(rec.file_was_relocated());
    }

    #[test]
    fn test_timeout_from_delay() {
        assert_eq!(ExecTask::new("true", 0).timeout(), None);
        assert_eq!(
            ExecTask::new("true", 250).timeout(),
            Some(Duration::from_millis(250))
        );
    }
}
