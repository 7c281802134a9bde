//! Transfer Rules
//!
//! A rule defines, for one class of transfers, which peers may use it, where
//! files live and which tasks run in each phase for each role. Rules are
//! immutable once handed out: `RuleRegistry::reload` swaps the entry for new
//! transfers and leaves in-flight ones on the `Arc` they already hold.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PathsConfig;
use crate::runner::{TaskStep, TransferError, TransferMode};

/// Suffix of files still being received
pub const WORK_FILE_SUFFIX: &str = ".r66";

/// One configured task: type name, argument template and delay budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTask {
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default, alias = "path")]
    pub argument: String,
    /// Timeout in ms for tasks running external work, sleep for DELAY, level for LOG
    #[serde(default)]
    pub delay: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl RuleTask {
    pub fn new(task_type: impl Into<String>, argument: impl Into<String>, delay: u64) -> Self {
        Self {
            task_type: task_type.into(),
            argument: argument.into(),
            delay,
            comment: None,
        }
    }
}

/// Ordered task lists for one role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleTasks {
    pub pre: Vec<RuleTask>,
    pub post: Vec<RuleTask>,
    pub error: Vec<RuleTask>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRule {
    pub id: String,
    /// Empty means every peer is allowed
    #[serde(default)]
    pub allowed_peers: Vec<String>,
    #[serde(default)]
    pub mode: TransferMode,
    #[serde(default)]
    pub recv_path: Option<String>,
    #[serde(default)]
    pub send_path: Option<String>,
    #[serde(default)]
    pub archive_path: Option<String>,
    #[serde(default)]
    pub work_path: Option<String>,
    #[serde(default)]
    pub sender: RoleTasks,
    #[serde(default)]
    pub receiver: RoleTasks,
}

impl TransferRule {
    pub fn new(id: impl Into<String>, mode: TransferMode) -> Self {
        Self {
            id: id.into(),
            allowed_peers: Vec::new(),
            mode,
            recv_path: None,
            send_path: None,
            archive_path: None,
            work_path: None,
            sender: RoleTasks::default(),
            receiver: RoleTasks::default(),
        }
    }

    /// Task list for a role and phase. The data phase and the
    /// non-executing phases have none.
    pub fn select_tasks(&self, is_sender: bool, phase: TaskStep) -> &[RuleTask] {
        let tasks = if is_sender {
            &self.sender
        } else {
            &self.receiver
        };
        match phase {
            TaskStep::PreTask => &tasks.pre,
            TaskStep::PostTask => &tasks.post,
            TaskStep::ErrorTask => &tasks.error,
            TaskStep::NoTask | TaskStep::TransferTask | TaskStep::AllDone => &[],
        }
    }

    /// Rule-level authorization, checked before accepting a transfer
    pub fn check_peer_allowed(&self, peer_id: &str) -> bool {
        self.allowed_peers.is_empty()
            || self
                .allowed_peers
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(peer_id))
    }

    pub fn recv_dir(&self, paths: &PathsConfig) -> PathBuf {
        configured(&self.recv_path).unwrap_or_else(|| paths.in_path())
    }

    pub fn send_dir(&self, paths: &PathsConfig) -> PathBuf {
        configured(&self.send_path).unwrap_or_else(|| paths.out_path())
    }

    pub fn archive_dir(&self, paths: &PathsConfig) -> PathBuf {
        configured(&self.archive_path).unwrap_or_else(|| paths.archive_path())
    }

    pub fn work_dir(&self, paths: &PathsConfig) -> PathBuf {
        configured(&self.work_path).unwrap_or_else(|| paths.work_path())
    }

    pub fn resolve_recv_path(&self, paths: &PathsConfig, file_name: &str) -> PathBuf {
        self.recv_dir(paths).join(base_name(file_name))
    }

    pub fn resolve_send_path(&self, paths: &PathsConfig, file_name: &str) -> PathBuf {
        self.send_dir(paths).join(base_name(file_name))
    }

    pub fn resolve_archive_path(&self, paths: &PathsConfig, file_name: &str) -> PathBuf {
        self.archive_dir(paths).join(base_name(file_name))
    }

    /// In-progress location of a received file, marked with [`WORK_FILE_SUFFIX`]
    pub fn resolve_work_path(&self, paths: &PathsConfig, file_name: &str) -> PathBuf {
        let mut name = base_name(file_name).to_os_string();
        name.push(WORK_FILE_SUFFIX);
        self.work_dir(paths).join(name)
    }
}

fn configured(path: &Option<String>) -> Option<PathBuf> {
    path.as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

/// Last component of a peer-supplied name, so it cannot escape the directory
fn base_name(file_name: &str) -> &std::ffi::OsStr {
    Path::new(file_name)
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new(file_name))
}

/// Rules by id
#[derive(Debug, Default)]
pub struct RuleRegistry {
    rules: DashMap<String, Arc<TransferRule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: impl IntoIterator<Item = TransferRule>) -> Self {
        let registry = Self::new();
        for rule in rules {
            registry.rules.insert(rule.id.clone(), Arc::new(rule));
        }
        registry
    }

    pub fn get(&self, rule_id: &str) -> Result<Arc<TransferRule>, TransferError> {
        self.rules
            .get(rule_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| TransferError::RuleNotFound(rule_id.to_string()))
    }

    /// Insert or replace a rule. Records already holding the old rule keep it.
    pub fn reload(&self, rule: TransferRule) -> Option<Arc<TransferRule>> {
        info!(rule_id = %rule.id, "Rule loaded");
        self.rules.insert(rule.id.clone(), Arc::new(rule))
    }

    pub fn remove(&self, rule_id: &str) -> Option<Arc<TransferRule>> {
        self.rules.remove(rule_id).map(|(_, rule)| rule)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rules.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
