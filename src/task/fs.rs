//! File system tasks: MOVE, MOVERENAME, COPY, COPYRENAME, DELETE, VALIDFILEPATH.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{Task, TaskContext, TaskOutcome};
use crate::runner::StepStatus;

/// Where a MOVE/COPY puts the file
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// Keep the file name, change the directory
    Dir(PathBuf),
    /// Full destination path
    Path(PathBuf),
}

impl Target {
    fn destination(&self, source: &Path) -> Option<PathBuf> {
        match self {
            Target::Dir(dir) => source.file_name().map(|name| dir.join(name)),
            Target::Path(path) => Some(path.clone()),
        }
    }
}

fn missing_file(source: &Path) -> TaskOutcome {
    TaskOutcome::failed(
        StepStatus::FileNotFound,
        format!("file not found: {}", source.display()),
    )
}

async fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}

/// Rename, falling back to copy + remove across file systems
pub(crate) async fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    ensure_parent(destination).await?;
    match tokio::fs::rename(source, destination).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(e),
        Err(_) => {
            tokio::fs::copy(source, destination).await?;
            tokio::fs::remove_file(source).await
        }
    }
}

/// Move the current file and make the destination the current file
pub struct MoveTask {
    target: Target,
}

impl MoveTask {
    pub fn into_dir(dir: &str) -> Self {
        Self {
            target: Target::Dir(PathBuf::from(dir)),
        }
    }

    pub fn to_path(path: &str) -> Self {
        Self {
            target: Target::Path(PathBuf::from(path)),
        }
    }
}

#[async_trait]
impl Task for MoveTask {
    fn kind(&self) -> &'static str {
        match self.target {
            Target::Dir(_) => "MOVE",
            Target::Path(_) => "MOVERENAME",
        }
    }

    async fn run(&mut self, ctx: &mut TaskContext<'_>) -> TaskOutcome {
        let source = ctx.current_file();
        let Some(destination) = self.target.destination(&source) else {
            return missing_file(&source);
        };
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            return missing_file(&source);
        }
        match move_file(&source, &destination).await {
            Ok(()) => {
                debug!(
                    from = %source.display(),
                    to = %destination.display(),
                    "File moved"
                );
                ctx.record
                    .set_file_moved(destination.display().to_string(), true);
                TaskOutcome::Success
            }
            Err(e) => TaskOutcome::failed(
                StepStatus::ExternalOp,
                format!("move to {} failed: {}", destination.display(), e),
            ),
        }
    }
}

/// Copy the current file. The current file stays the same.
pub struct CopyTask {
    target: Target,
}

impl CopyTask {
    pub fn into_dir(dir: &str) -> Self {
        Self {
            target: Target::Dir(PathBuf::from(dir)),
        }
    }

    pub fn to_path(path: &str) -> Self {
        Self {
            target: Target::Path(PathBuf::from(path)),
        }
    }
}

#[async_trait]
impl Task for CopyTask {
    fn kind(&self) -> &'static str {
        match self.target {
            Target::Dir(_) => "COPY",
            Target::Path(_) => "COPYRENAME",
        }
    }

    async fn run(&mut self, ctx: &mut TaskContext<'_>) -> TaskOutcome {
        let source = ctx.current_file();
        let Some(destination) = self.target.destination(&source) else {
            return missing_file(&source);
        };
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            return missing_file(&source);
        }
        if let Err(e) = ensure_parent(&destination).await {
            return TaskOutcome::failed(StepStatus::ExternalOp, e.to_string());
        }
        match tokio::fs::copy(&source, &destination).await {
            Ok(bytes) => {
                debug!(to = %destination.display(), bytes, "File copied");
                TaskOutcome::Success
            }
            Err(e) => TaskOutcome::failed(
                StepStatus::ExternalOp,
                format!("copy to {} failed: {}", destination.display(), e),
            ),
        }
    }
}

/// Delete the current file
pub struct DeleteTask;

#[async_trait]
impl Task for DeleteTask {
    fn kind(&self) -> &'static str {
        "DELETE"
    }

    async fn run(&mut self, ctx: &mut TaskContext<'_>) -> TaskOutcome {
        let source = ctx.current_file();
        match tokio::fs::remove_file(&source).await {
            Ok(()) => TaskOutcome::Success,
            Err(e) if e.kind() == io::ErrorKind::NotFound => missing_file(&source),
            Err(e) => TaskOutcome::failed(StepStatus::ExternalOp, e.to_string()),
        }
    }
}

/// Succeeds only when the current file lies under one of the directories
pub struct ValidFilePathTask {
    allowed: Vec<PathBuf>,
}

impl ValidFilePathTask {
    pub fn new(argument: &str) -> Self {
        Self {
            allowed: argument.split_whitespace().map(PathBuf::from).collect(),
        }
    }
}

#[async_trait]
impl Task for ValidFilePathTask {
    fn kind(&self) -> &'static str {
        "VALIDFILEPATH"
    }

    async fn run(&mut self, ctx: &mut TaskContext<'_>) -> TaskOutcome {
        let file = ctx.current_file();
        let file = tokio::fs::canonicalize(&file).await.unwrap_or(file);
        for dir in &self.allowed {
            let dir = tokio::fs::canonicalize(dir)
                .await
                .unwrap_or_else(|_| dir.clone());
            if file.starts_with(&dir) {
                return TaskOutcome::Success;
            }
        }
        TaskOutcome::failed(
            StepStatus::ExternalOp,
            format!("{} is not under an allowed directory", file.display()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathsConfig;
    use crate::rule::TransferRule;
    use crate::runner::{NewTransfer, TransferMode, TransferRecord};

    fn test_dir(name: &str) -> PathBuf {
        let dir = PathBuf::from(format!("target/test_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn record_for(file: &Path) -> TransferRecord {
        TransferRecord::new(
            "me",
            NewTransfer {
                rule_id: "r".into(),
                is_sender: false,
                requester: "peer".into(),
                requested: "me".into(),
                transfer_id: Some(1),
                file_name: file.display().to_string(),
                file_metadata: String::new(),
                block_size: 1024,
                mode: TransferMode::Recv,
            },
        )
    }

    #[tokio::test]
    async fn test_move_into_dir_updates_record() {
        let dir = test_dir("task_move");
        let source = dir.join("a.txt");
        std::fs::write(&source, b"hello").unwrap();

        let mut record = record_for(&source);
        let rule = TransferRule::new("r", TransferMode::Recv);
        let paths = PathsConfig::default();
        let mut ctx = TaskContext::new(&mut record, &rule, &paths, "me");

        let dest_dir = dir.join("archive");
        let mut task = MoveTask::into_dir(dest_dir.to_str().unwrap());
        assert_eq!(task.run(&mut ctx).await, TaskOutcome::Success);

        assert!(!source.exists());
        assert!(dest_dir.join("a.txt").exists());
        assert!(record.file_was_relocated());
        assert_eq!(
            record.file_name(),
            dest_dir.join("a.txt").display().to_string()
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_move_missing_file() {
        let dir = test_dir("task_move_missing");
        let mut record = record_for(&dir.join("missing.txt"));
        let rule = TransferRule::new("r", TransferMode::Recv);
        let paths = PathsConfig::default();
        let mut ctx = TaskContext::new(&mut record, &rule, &paths, "me");

        let mut task = MoveTask::to_path(dir.join("b.txt").to_str().unwrap());
        assert!(matches!(
            task.run(&mut ctx).await,
            TaskOutcome::Failed {
                code: StepStatus::FileNotFound,
                ..
            }
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_copy_rename_keeps_current_file() {
        let dir = test_dir("task_copy");
        let source = dir.join("a.txt");
        std::fs::write(&source, b"data").unwrap();

        let mut record = record_for(&source);
        let rule = TransferRule::new("r", TransferMode::Recv);
        let paths = PathsConfig::default();
        let mut ctx = TaskContext::new(&mut record, &rule, &paths, "me");

        let dest = dir.join("copies").join("b.txt");
        let mut task = CopyTask::to_path(dest.to_str().unwrap());
        assert_eq!(task.run(&mut ctx).await, TaskOutcome::Success);

        assert!(source.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"data");
        assert_eq!(record.file_name(), source.display().to_string());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = test_dir("task_delete");
        let source = dir.join("a.txt");
        std::fs::write(&source, b"x").unwrap();

        let mut record = record_for(&source);
        let rule = TransferRule::new("r", TransferMode::Recv);
        let paths = PathsConfig::default();
        let mut ctx = TaskContext::new(&mut record, &rule, &paths, "me");

        assert_eq!(DeleteTask.run(&mut ctx).await, TaskOutcome::Success);
        assert!(!source.exists());
        assert!(!DeleteTask.run(&mut ctx).await.is_success());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_valid_file_path() {
        let dir = test_dir("task_valid_path");
        let inside = dir.join("in");
        std::fs::create_dir_all(&inside).unwrap();
        let file = inside.join("a.txt");
        std::fs::write(&file, b"x").unwrap();

        let mut record = record_for(&file);
        let rule = TransferRule::new("r", TransferMode::Recv);
        let paths = PathsConfig::default();
        let mut ctx = TaskContext::new(&mut record, &rule, &paths, "me");

        let allowed = format!("/nonexistent {}", inside.display());
        assert_eq!(
            ValidFilePathTask::new(&allowed).run(&mut ctx).await,
            TaskOutcome::Success
        );
        assert!(
            !ValidFilePathTask::new("/nonexistent")
                .run(&mut ctx)
                .await
                .is_success()
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
