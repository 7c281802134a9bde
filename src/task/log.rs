//! LOG task.
//!
//! The delay selects the output: 0 debug trace only, 1 warning log,
//! 2 append to the file named by the last word of the argument, 3 both.
//! A file that cannot be written degrades the task to a warning.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{Task, TaskContext, TaskOutcome};

pub struct LogTask {
    message: String,
    level: u64,
}

impl LogTask {
    pub fn new(argument: &str, level: u64) -> Self {
        Self {
            message: argument.trim().to_string(),
            level,
        }
    }

    /// Split the argument into (message, target file)
    fn file_target(&self) -> Option<(&str, PathBuf)> {
        let (message, file) = self.message.rsplit_once(char::is_whitespace)?;
        Some((message.trim_end(), PathBuf::from(file)))
    }

    async fn append(&self, transfer: &str) -> Result<(), String> {
        let (message, file) = self
            .file_target()
            .ok_or_else(|| format!("no log file in argument: {}", self.message))?;
        let mut out = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file)
            .await
            .map_err(|e| format!("cannot open {}: {}", file.display(), e))?;
        let line = format!("{} {}\n", transfer, message);
        out.write_all(line.as_bytes())
            .await
            .map_err(|e| format!("cannot write {}: {}", file.display(), e))
    }
}

#[async_trait]
impl Task for LogTask {
    fn kind(&self) -> &'static str {
        "LOG"
    }

    async fn run(&mut self, ctx: &mut TaskContext<'_>) -> TaskOutcome {
        let transfer = ctx.record.key().to_string();
        match self.level {
            0 => {
                debug!(transfer = %transfer, message = %self.message, "Task log");
                TaskOutcome::Success
            }
            1 => {
                warn!(transfer = %transfer, message = %self.message, "Task log");
                TaskOutcome::Success
            }
            level => {
                if level >= 3 {
                    warn!(transfer = %transfer, message = %self.message, "Task log");
                }
                match self.append(&transfer).await {
                    Ok(()) => TaskOutcome::Success,
                    Err(reason) => {
                        warn!(transfer = %transfer, reason = %reason, "Log file not written");
                        TaskOutcome::Warning(reason)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
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
                transfer_id: Some(9),
                file_name: "a".into(),
                file_metadata: String::new(),
                block_size: 1024,
                mode: TransferMode::Send,
            },
        )
    }

    #[tokio::test]
    async fn test_log_to_file() {
        let dir = PathBuf::from(format!("target/test_task_log_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("transfers.log");

        let mut rec = record();
        let rule = TransferRule::new("r", TransferMode::Send);
        let paths = PathsConfig::default();
        let mut ctx = TaskContext::new(&mut rec, &rule, &paths, "me");

        let mut task = LogTask::new(&format!("transfer done {}", file.display()), 2);
        assert_eq!(task.run(&mut ctx).await, TaskOutcome::Success);

        let content = std::fs::read_to_string(&file).unwrap();
        assert!(content.contains("9_me_peer@me transfer done"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_unwritable_file_is_warning() {
        let mut rec = record();
        let rule = TransferRule::new("r", TransferMode::Send);
        let paths = PathsConfig::default();
        let mut ctx = TaskContext::new(&mut rec, &rule, &paths, "me");

        let mut task = LogTask::new("oops /no/such/dir/file.log", 3);
        assert!(matches!(task.run(&mut ctx).await, TaskOutcome::Warning(_)));

        let mut single_word = LogTask::new("oops", 2);
        assert!(matches!(
            single_word.run(&mut ctx).await,
            TaskOutcome::Warning(_)
        ));
    }

    #[tokio::test]
    async fn test_plain_levels_succeed() {
        let mut rec = record();
        let rule = TransferRule::new("r", TransferMode::Send);
        let paths = PathsConfig::default();
        let mut ctx = TaskContext::new(&mut rec, &rule, &paths, "me");

        assert_eq!(
            LogTask::new("hello", 0).run(&mut ctx).await,
            TaskOutcome::Success
        );
        assert_eq!(
            LogTask::new("hello", 1).run(&mut ctx).await,
            TaskOutcome::Success
        );
    }
}
