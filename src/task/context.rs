//! Task execution context and argument placeholders.

use std::path::{Path, PathBuf};

use chrono::Local;

use crate::config::PathsConfig;
use crate::rule::TransferRule;
use crate::runner::TransferRecord;

const NO_FILE: &str = "nofile";

/// What a running task can see and change.
pub struct TaskContext<'a> {
    pub record: &'a mut TransferRecord,
    pub rule: &'a TransferRule,
    pub paths: &'a PathsConfig,
    pub node_id: &'a str,
}

impl<'a> TaskContext<'a> {
    pub fn new(
        record: &'a mut TransferRecord,
        rule: &'a TransferRule,
        paths: &'a PathsConfig,
        node_id: &'a str,
    ) -> Self {
        Self {
            record,
            rule,
            paths,
            node_id,
        }
    }

    /// Path of the file the transfer currently works on
    pub fn current_file(&self) -> PathBuf {
        PathBuf::from(self.record.file_name())
    }

    /// The peer on the other end of the transfer
    pub fn remote_host(&self) -> &str {
        let key = self.record.key();
        if key.requester == self.node_id {
            &key.requested
        } else {
            &key.requester
        }
    }

    /// Replace `#NAME#` placeholders in a task argument.
    pub fn substitute(&self, template: &str) -> String {
        if !template.contains('#') {
            return template.to_string();
        }
        let record = &*self.record;
        let key = record.key();
        let now = Local::now();

        let true_full = non_empty_or(record.file_name(), NO_FILE);
        let true_name = file_name_of(record.file_name());
        let original_full = non_empty_or(record.original_file_name(), NO_FILE);
        let original_name = file_name_of(record.original_file_name());

        let mut out = template
            .replace("#TRUEFULLPATH#", &true_full)
            .replace("#TRUEFILENAME#", &true_name)
            .replace("#ORIGINALFULLPATH#", &original_full)
            .replace("#ORIGINALFILENAME#", &original_name)
            .replace("#RULE#", record.rule_id())
            .replace("#DATE#", &now.format("%Y%m%d").to_string())
            .replace("#HOUR#", &now.format("%H%M%S").to_string())
            .replace("#REMOTEHOST#", self.remote_host())
            .replace("#LOCALHOST#", self.node_id)
            .replace("#TRANSFERID#", &key.transfer_id.to_string())
            .replace("#REQUESTERHOST#", &key.requester)
            .replace("#REQUESTEDHOST#", &key.requested)
            .replace("#FULLTRANSFERID#", &key.full_transfer_id())
            .replace("#RANKTRANSFER#", &record.block_rank().to_string())
            .replace("#BLOCKSIZE#", &record.block_size().to_string())
            .replace("#INPATH#", &display(&self.rule.recv_dir(self.paths)))
            .replace("#OUTPATH#", &display(&self.rule.send_dir(self.paths)))
            .replace("#WORKPATH#", &display(&self.rule.work_dir(self.paths)))
            .replace("#ARCHPATH#", &display(&self.rule.archive_dir(self.paths)))
            .replace("#HOMEPATH#", &display(&self.paths.home));

        if out.contains("#FILESIZE#") {
            let size = std::fs::metadata(record.file_name())
                .map(|m| m.len())
                .unwrap_or(0);
            out = out.replace("#FILESIZE#", &size.to_string());
        }
        out
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn file_name_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| NO_FILE.to_string())
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{NewTransfer, TransferMode};

    fn record(file_name: &str) -> TransferRecord {
        TransferRecord::new(
            "hostA",
            NewTransfer {
                rule_id: "daily".into(),
                is_sender: true,
                requester: "hostA".into(),
                requested: "hostB".into(),
                transfer_id: Some(17),
                file_name: file_name.into(),
                file_metadata: String::new(),
                block_size: 1024,
                mode: TransferMode::Send,
            },
        )
    }

    #[test]
    fn test_substitute_identity_placeholders() {
        let mut rec = record("/srv/out/report.csv");
        let rule = TransferRule::new("daily", TransferMode::Send);
        let paths = PathsConfig::under("/srv");
        let ctx = TaskContext::new(&mut rec, &rule, &paths, "hostA");

        assert_eq!(
            ctx.substitute("#TRUEFILENAME# #RULE# #REMOTEHOST# #LOCALHOST#"),
            "report.csv daily hostB hostA"
        );
        assert_eq!(ctx.substitute("#FULLTRANSFERID#"), "17_hostA_hostB");
        assert_eq!(ctx.substitute("#TRANSFERID#:#BLOCKSIZE#"), "17:1024");
        assert_eq!(ctx.substitute("#INPATH#"), "/srv/in");
        assert_eq!(ctx.substitute("#ARCHPATH#"), "/srv/arch");
        assert_eq!(ctx.substitute("no placeholders"), "no placeholders");
    }

    #[test]
    fn test_substitute_missing_file() {
        let mut rec = record("");
        let rule = TransferRule::new("daily", TransferMode::Send);
        let paths = PathsConfig::default();
        let ctx = TaskContext::new(&mut rec, &rule, &paths, "hostA");

        assert_eq!(ctx.substitute("#TRUEFULLPATH#"), "nofile");
        assert_eq!(ctx.substitute("#FILESIZE#"), "0");
    }

    #[test]
    fn test_substitute_date_shape() {
        let mut rec = record("a");
        let rule = TransferRule::new("daily", TransferMode::Send);
        let paths = PathsConfig::default();
        let ctx = TaskContext::new(&mut rec, &rule, &paths, "hostA");

        let date = ctx.substitute("#DATE#");
        assert_eq!(date.len(), 8);
        assert!(date.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(ctx.substitute("#HOUR#").len(), 6);
    }

    #[test]
    fn test_remote_host_for_requested_side() {
        let mut rec = record("a");
        let rule = TransferRule::new("daily", TransferMode::Send);
        let paths = PathsConfig::default();
        let ctx = TaskContext::new(&mut rec, &rule, &paths, "hostB");
        assert_eq!(ctx.remote_host(), "hostA");
    }
}
