//! No-Database Transfer Store
//!
//! Records live in a concurrent map for the life of the process. When a
//! runner directory is configured, each record is also written to its own
//! JSON file so in-flight transfers survive a restart.
//!
//! # File Format
//!
//! ```text
//! {owner}_{requester}_{requested}_{id}.runner.json
//! each key part keeps [A-Za-z0-9.-] and escapes every other byte as %XX
//! { "format_version": 1, "checksum": <crc32 of runner>, "runner": { ... } }
//! ```
//!
//! The lifecycle status is not written; it is re-derived on load. Files are
//! written to a temp name and renamed into place. A missing, unreadable or
//! mismatching file reads as "no such record".

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::TransferStore;
use super::identity::ClockIdAllocator;
use crate::runner::{LifecycleStatus, StepStatus, TransferError, TransferKey, TransferRecord};

const RUNNER_FILE_SUFFIX: &str = ".runner.json";

#[derive(Debug, Serialize, Deserialize)]
struct RunnerFile {
    format_version: u32,
    checksum: u32,
    runner: TransferRecord,
}

impl RunnerFile {
    const FORMAT_VERSION: u32 = 1;

    fn checksum_of(record: &TransferRecord) -> Result<u32, serde_json::Error> {
        Ok(crc32fast::hash(&serde_json::to_vec(record)?))
    }
}

pub struct NoDbTransferStore {
    records: DashMap<TransferKey, TransferRecord>,
    allocator: ClockIdAllocator,
    runner_dir: Option<PathBuf>,
}

impl NoDbTransferStore {
    /// Map only, nothing survives the process
    pub fn in_memory() -> Self {
        Self {
            records: DashMap::new(),
            allocator: ClockIdAllocator::new(),
            runner_dir: None,
        }
    }

    /// Map plus one durable file per transfer under `dir`
    pub async fn durable(dir: impl AsRef<Path>) -> Result<Self, TransferError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            records: DashMap::new(),
            allocator: ClockIdAllocator::new(),
            runner_dir: Some(dir),
        })
    }

    pub fn runner_dir(&self) -> Option<&Path> {
        self.runner_dir.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn file_path(&self, key: &TransferKey) -> Option<PathBuf> {
        self.runner_dir
            .as_ref()
            .map(|dir| dir.join(runner_file_name(key)))
    }

    // === Durable file operations ===

    pub async fn exists_on_disk(&self, key: &TransferKey) -> bool {
        match self.file_path(key) {
            Some(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            None => false,
        }
    }

    /// Read a record back from its file. Best effort.
    ///
    /// A file holding some other transfer reads as missing.
    pub async fn load_from_disk(&self, key: &TransferKey) -> Option<TransferRecord> {
        let path = self.file_path(key)?;
        let record = read_runner_file(&path).await?;
        if record.key() != key {
            warn!(
                path = %path.display(),
                expected = %key,
                found = %record.key(),
                "Runner file holds another transfer"
            );
            return None;
        }
        Some(record)
    }

    /// Returns whether a file was removed
    pub async fn delete_from_disk(&self, key: &TransferKey) -> bool {
        let Some(path) = self.file_path(key) else {
            return false;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to delete runner file");
                false
            }
        }
    }

    async fn save_to_disk(&self, record: &TransferRecord) -> Result<(), TransferError> {
        let Some(path) = self.file_path(record.key()) else {
            return Ok(());
        };
        let envelope = RunnerFile {
            format_version: RunnerFile::FORMAT_VERSION,
            checksum: RunnerFile::checksum_of(record)?,
            runner: record.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        let mut tmp_name = path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);
        {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Load every runner file in the directory into the map.
    ///
    /// Unreadable files are skipped. Returns the number loaded.
    pub async fn load_all_from_disk(&self) -> Result<usize, TransferError> {
        let Some(dir) = self.runner_dir.as_ref() else {
            return Ok(0);
        };
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut loaded = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_runner = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(RUNNER_FILE_SUFFIX));
            if !is_runner {
                continue;
            }
            if let Some(record) = read_runner_file(&path).await {
                self.allocator.observe(record.transfer_id());
                self.records.insert(record.key().clone(), record);
                loaded += 1;
            }
        }
        info!(dir = %dir.display(), loaded, "Runner files loaded");
        Ok(loaded)
    }
}

fn runner_file_name(key: &TransferKey) -> String {
    format!(
        "{}_{}_{}_{}{}",
        escape(&key.owner),
        escape(&key.requester),
        escape(&key.requested),
        key.transfer_id,
        RUNNER_FILE_SUFFIX
    )
}

/// Reversible, so distinct key parts never share a file name
fn escape(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for byte in part.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
            out.push(char::from(byte));
        } else {
            out.push('%');
            out.push_str(&hex::encode_upper([byte]));
        }
    }
    out
}

async fn read_runner_file(path: &Path) -> Option<TransferRecord> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Runner file unreadable");
            }
            return None;
        }
    };
    let envelope: RunnerFile = match serde_json::from_slice(&bytes) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Runner file corrupt");
            return None;
        }
    };
    if envelope.format_version != RunnerFile::FORMAT_VERSION {
        warn!(
            path = %path.display(),
            version = envelope.format_version,
            "Unsupported runner file version"
        );
        return None;
    }
    match RunnerFile::checksum_of(&envelope.runner) {
        Ok(sum) if sum == envelope.checksum => {}
        _ => {
            warn!(path = %path.display(), "Runner file checksum mismatch");
            return None;
        }
    }
    let mut record = envelope.runner;
    record.rederive_lifecycle();
    debug!(transfer = %record.key(), "Runner file loaded");
    Some(record)
}

#[async_trait]
impl TransferStore for NoDbTransferStore {
    fn name(&self) -> &'static str {
        if self.runner_dir.is_some() {
            "nodb-durable"
        } else {
            "nodb-memory"
        }
    }

    async fn create(&self, record: &mut TransferRecord) -> Result<(), TransferError> {
        if !record.key().is_assigned() {
            record.assign_id(self.allocator.next()?);
        } else {
            self.allocator.observe(record.transfer_id());
        }
        match self.records.entry(record.key().clone()) {
            Entry::Occupied(_) => {
                return Err(TransferError::IdentityConflict(record.key().to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
            }
        }
        if let Err(e) = self.save_to_disk(record).await {
            self.records.remove(record.key());
            return Err(e);
        }
        record.mark_saved();
        Ok(())
    }

    async fn update(&self, record: &mut TransferRecord) -> Result<(), TransferError> {
        self.records.insert(record.key().clone(), record.clone());
        self.save_to_disk(record).await?;
        record.mark_saved();
        Ok(())
    }

    async fn select(&self, key: &TransferKey) -> Result<Option<TransferRecord>, TransferError> {
        if let Some(record) = self.records.get(key) {
            return Ok(Some(record.value().clone()));
        }
        match self.load_from_disk(key).await {
            Some(record) => {
                self.allocator.observe(record.transfer_id());
                self.records.insert(key.clone(), record.clone());
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn exists(&self, key: &TransferKey) -> Result<bool, TransferError> {
        Ok(self.records.contains_key(key) || self.exists_on_disk(key).await)
    }

    async fn delete(&self, key: &TransferKey) -> Result<bool, TransferError> {
        let in_map = self.records.remove(key).is_some();
        let on_disk = self.delete_from_disk(key).await;
        Ok(in_map || on_disk)
    }

    async fn all_matching_lifecycle(
        &self,
        status: LifecycleStatus,
    ) -> Result<Vec<TransferRecord>, TransferError> {
        let mut records: Vec<TransferRecord> = self
            .records
            .iter()
            .filter(|entry| entry.value().lifecycle_status() == status)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|r| r.last_updated_at());
        Ok(records)
    }

    async fn reset_to_submit(&self, owner: &str) -> Result<u64, TransferError> {
        let mut count = 0;
        for mut entry in self.records.iter_mut() {
            let record = entry.value_mut();
            // Runner files carry no lifecycle, so reloaded unfinished records
            // come back as Unknown
            let resumable = match record.lifecycle_status() {
                LifecycleStatus::Running | LifecycleStatus::Interrupted => true,
                LifecycleStatus::Unknown => !record.is_finished(),
                _ => false,
            };
            if record.key().owner == owner && resumable {
                record.set_lifecycle(LifecycleStatus::ToSubmit);
                record.mark_saved();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn change_finished_to_done(&self, owner: &str) -> Result<u64, TransferError> {
        let mut count = 0;
        for mut entry in self.records.iter_mut() {
            let record = entry.value_mut();
            if record.key().owner == owner
                && record.is_all_done()
                && record.step_status() == StepStatus::CompleteOk
                && record.lifecycle_status() != LifecycleStatus::Done
            {
                record.set_lifecycle(LifecycleStatus::Done);
                record.mark_saved();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn purge(&self, before: DateTime<Utc>) -> Result<u64, TransferError> {
        let expired: Vec<TransferKey> = self
            .records
            .iter()
            .filter(|e| {
                let record = e.value();
                record.is_finished()
                    && record.lifecycle_status() != LifecycleStatus::ToSubmit
                    && record.last_updated_at() < before
            })
            .map(|e| e.key().clone())
            .collect();
        for key in &expired {
            self.records.remove(key);
            self.delete_from_disk(key).await;
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Purged finished transfers");
        }
        Ok(expired.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{NewTransfer, TaskStep, TransferMode};

    fn test_dir(name: &str) -> PathBuf {
        let dir = PathBuf::from(format!("target/test_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn new_record(id: Option<i64>, is_sender: bool) -> TransferRecord {
        TransferRecord::new(
            "hostA",
            NewTransfer {
                rule_id: "rule".into(),
                is_sender,
                requester: "hostA".into(),
                requested: "hostB".into(),
                transfer_id: id,
                file_name: "/data/out/f.bin".into(),
                file_metadata: String::new(),
                block_size: 4096,
                mode: TransferMode::SendMd5,
            },
        )
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_selects() {
        let store = NoDbTransferStore::in_memory();
        let mut rec = new_record(None, true);
        store.create(&mut rec).await.unwrap();

        assert!(rec.key().is_assigned());
        assert!(!rec.is_dirty());
        let loaded = store.select(rec.key()).await.unwrap().unwrap();
        assert_eq!(loaded, rec);
        assert!(store.exists(rec.key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_duplicate_key_conflicts() {
        let store = NoDbTransferStore::in_memory();
        let mut a = new_record(Some(5), true);
        let mut b = new_record(Some(5), true);
        store.create(&mut a).await.unwrap();
        assert!(matches!(
            store.create(&mut b).await,
            Err(TransferError::IdentityConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_durable_round_trip_except_lifecycle() {
        let dir = test_dir("nodb_round_trip");
        let store = NoDbTransferStore::durable(&dir).await.unwrap();

        let mut rec = new_record(Some(77), false);
        rec.enter_pre_task().unwrap();
        rec.finish_task_list();
        rec.enter_transfer_task(0).unwrap();
        for _ in 0..3 {
            rec.increment_rank().unwrap();
        }
        rec.set_original_file_name("orig name with spaces.bin");
        store.create(&mut rec).await.unwrap();
        assert!(store.exists_on_disk(rec.key()).await);

        // A fresh store only sees the file
        let reopened = NoDbTransferStore::durable(&dir).await.unwrap();
        let mut loaded = reopened.load_from_disk(rec.key()).await.unwrap();
        assert_eq!(loaded.lifecycle_status(), LifecycleStatus::Unknown);
        assert_eq!(loaded.block_rank(), 3);
        assert_eq!(loaded.phase(), TaskStep::TransferTask);
        assert_eq!(loaded.file_metadata(), "");

        loaded.set_lifecycle(rec.lifecycle_status());
        loaded.mark_saved();
        assert_eq!(loaded, rec);

        let _ = std::fs::remove_dir_all(&dir);
    }

    const ALL_STEP_CODES: &str = "iBXPOCAETMDFUSRIHQW-zfcd";

    fn varied_record(n: usize, step_status: StepStatus) -> TransferRecord {
        let phases = [
            TaskStep::NoTask,
            TaskStep::PreTask,
            TaskStep::TransferTask,
            TaskStep::PostTask,
            TaskStep::ErrorTask,
            TaskStep::AllDone,
        ];
        let metadata = [
            "",
            "k=v",
            "{\"json\": [1, 2, \"three\"]}",
            "multi\nline\twith tabs",
            "unicode \u{00e9}\u{4e2d}\u{1f4e6}",
        ];
        let phase = phases[n % phases.len()];
        let started = Utc::now() - chrono::Duration::milliseconds(n as i64 * 7919);
        let mut record = TransferRecord::from_parts(
            TransferKey::new("hostA", format!("peer {n}"), "hostA", 1000 + n as i64),
            format!("rule-{}", n % 3),
            phase,
            phases[(n + 2) % 4],
            (n % 5) as u32,
            (n as u64) * 1_000_003,
            step_status,
            StepStatus::from_code(ALL_STEP_CODES.chars().rev().nth(n % 24).unwrap_or('-')),
            LifecycleStatus::Running,
            n % 2 == 0,
            format!("/data/work/file {n}.bin.r66"),
            format!("file {n}.bin"),
            metadata[n % metadata.len()].to_string(),
            512 * (n as u32 % 4 + 1),
            TransferMode::from_id((n % 8) as i16 + 1).unwrap(),
            started,
            started + chrono::Duration::seconds(n as i64),
            n % 3 == 0,
        );
        record.mark_saved();
        record
    }

    #[tokio::test]
    async fn test_durable_round_trip_over_varied_records() {
        let dir = test_dir("nodb_round_trip_varied");
        let store = NoDbTransferStore::durable(&dir).await.unwrap();

        let mut originals = Vec::new();
        for (n, code) in ALL_STEP_CODES.chars().enumerate() {
            let status = StepStatus::from_code(code);
            assert_eq!(status.code(), code);
            let mut record = varied_record(n, status);
            store.create(&mut record).await.unwrap();
            originals.push(record);
        }
        assert!(originals.iter().any(|r| r.phase() == TaskStep::ErrorTask));
        assert!(originals.iter().any(|r| r.file_was_relocated()));
        assert!(originals.iter().any(|r| !r.file_metadata().is_empty()));

        let reopened = NoDbTransferStore::durable(&dir).await.unwrap();
        for original in &originals {
            let mut loaded = reopened
                .load_from_disk(original.key())
                .await
                .unwrap_or_else(|| panic!("{} not reloaded", original.key()));
            assert_eq!(
                loaded.lifecycle_status(),
                LifecycleStatus::derive(original.phase(), original.step_status())
            );
            assert_eq!(loaded.is_finished(), original.is_finished());
            loaded.set_lifecycle(original.lifecycle_status());
            loaded.mark_saved();
            assert_eq!(&loaded, original);
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_as_missing() {
        let dir = test_dir("nodb_corrupt");
        let store = NoDbTransferStore::durable(&dir).await.unwrap();
        let mut rec = new_record(Some(12), true);
        store.create(&mut rec).await.unwrap();

        let path = dir.join(runner_file_name(rec.key()));
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, text.replace("\"block_rank\": 0", "\"block_rank\": 99")).unwrap();
        assert!(store.load_from_disk(rec.key()).await.is_none());

        std::fs::write(&path, b"{ not json").unwrap();
        assert!(store.load_from_disk(rec.key()).await.is_none());

        assert!(store.delete_from_disk(rec.key()).await);
        assert!(!store.exists_on_disk(rec.key()).await);
        assert!(store.load_from_disk(rec.key()).await.is_none());
        assert!(!store.delete_from_disk(rec.key()).await);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_load_all_and_keep_ids_ahead() {
        let dir = test_dir("nodb_load_all");
        let far_id = Utc::now().timestamp_millis() + 10_000_000;
        {
            let store = NoDbTransferStore::durable(&dir).await.unwrap();
            let mut rec = new_record(Some(far_id), true);
            store.create(&mut rec).await.unwrap();
        }
        std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();

        let store = NoDbTransferStore::durable(&dir).await.unwrap();
        assert_eq!(store.load_all_from_disk().await.unwrap(), 1);
        let mut fresh = new_record(None, true);
        store.create(&mut fresh).await.unwrap();
        assert!(fresh.transfer_id() > far_id);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_sweeps() {
        let store = NoDbTransferStore::in_memory();

        let mut running = new_record(Some(1), true);
        running.enter_pre_task().unwrap();
        store.create(&mut running).await.unwrap();

        let mut stopped = new_record(Some(2), true);
        stopped.enter_pre_task().unwrap();
        stopped.interrupt(StepStatus::StoppedTransfer).unwrap();
        store.create(&mut stopped).await.unwrap();

        let mut done = new_record(Some(3), true);
        done.enter_pre_task().unwrap();
        done.mark_all_done().unwrap();
        done.set_lifecycle(LifecycleStatus::Unknown);
        store.create(&mut done).await.unwrap();

        assert_eq!(store.reset_to_submit("hostA").await.unwrap(), 2);
        assert_eq!(store.reset_to_submit("other").await.unwrap(), 0);
        let queued = store
            .all_matching_lifecycle(LifecycleStatus::ToSubmit)
            .await
            .unwrap();
        assert_eq!(queued.len(), 2);

        assert_eq!(store.change_finished_to_done("hostA").await.unwrap(), 1);
        assert_eq!(
            store
                .all_matching_lifecycle(LifecycleStatus::Done)
                .await
                .unwrap()
                .len(),
            1
        );

        let purged = store
            .purge(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        // Records queued for resubmission are kept
        assert_eq!(purged, 1);
        assert!(!store.exists(done.key()).await.unwrap());
        assert!(store.exists(stopped.key()).await.unwrap());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = NoDbTransferStore::in_memory();
        let mut rec = new_record(None, true);
        store.create(&mut rec).await.unwrap();

        rec.enter_pre_task().unwrap();
        assert!(rec.is_dirty());
        store.update(&mut rec).await.unwrap();
        assert!(!rec.is_dirty());
        assert_eq!(
            store.select(rec.key()).await.unwrap().unwrap().phase(),
            TaskStep::PreTask
        );

        assert!(store.delete(rec.key()).await.unwrap());
        assert!(!store.delete(rec.key()).await.unwrap());
        assert!(store.select(rec.key()).await.unwrap().is_none());
    }

    #[test]
    fn test_runner_file_name() {
        let key = TransferKey::new("me", "a/b", "c d", 9);
        assert_eq!(runner_file_name(&key), "me_a%2Fb_c%20d_9.runner.json");

        let key = TransferKey::new("n_1", "x%y", "h\u{e9}", 3);
        assert_eq!(runner_file_name(&key), "n%5F1_x%25y_h%C3%A9_3.runner.json");
    }

    #[test]
    fn test_runner_file_names_never_collide() {
        let parts = ["peer a", "peer-a", "peer_a", "peer%20a", "peer/a", "peer.a"];
        let mut names = std::collections::HashSet::new();
        for requester in parts {
            let key = TransferKey::new("hostA", requester, "hostB", 9);
            assert!(names.insert(runner_file_name(&key)), "{requester}");
        }
        // Separator inside a part cannot shift the boundary
        let a = TransferKey::new("a_b", "c", "d", 1);
        let b = TransferKey::new("a", "b_c", "d", 1);
        assert_ne!(runner_file_name(&a), runner_file_name(&b));
    }

    #[tokio::test]
    async fn test_similar_keys_keep_separate_files() {
        let dir = test_dir("nodb_similar_keys");
        let store = NoDbTransferStore::durable(&dir).await.unwrap();

        let from = |requester: &str, file: &str| {
            TransferRecord::new(
                "hostA",
                NewTransfer {
                    rule_id: "rule".into(),
                    is_sender: false,
                    requester: requester.into(),
                    requested: "hostA".into(),
                    transfer_id: Some(9),
                    file_name: file.into(),
                    file_metadata: String::new(),
                    block_size: 4096,
                    mode: TransferMode::Recv,
                },
            )
        };
        let mut first = from("peer a", "A.bin");
        let mut second = from("peer-a", "B.bin");
        store.create(&mut first).await.unwrap();
        store.create(&mut second).await.unwrap();

        let reopened = NoDbTransferStore::durable(&dir).await.unwrap();
        let a = reopened.load_from_disk(first.key()).await.unwrap();
        let b = reopened.load_from_disk(second.key()).await.unwrap();
        assert_eq!(a.key().requester, "peer a");
        assert_eq!(a.file_name(), "A.bin");
        assert_eq!(b.key().requester, "peer-a");
        assert_eq!(b.file_name(), "B.bin");
        assert_eq!(reopened.load_all_from_disk().await.unwrap(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_file_for_another_key_reads_as_missing() {
        let dir = test_dir("nodb_foreign_file");
        let store = NoDbTransferStore::durable(&dir).await.unwrap();
        let mut rec = new_record(Some(21), true);
        store.create(&mut rec).await.unwrap();

        let other = TransferKey::new("hostA", "hostA", "hostB", 22);
        std::fs::copy(
            dir.join(runner_file_name(rec.key())),
            dir.join(runner_file_name(&other)),
        )
        .unwrap();
        assert!(store.load_from_disk(&other).await.is_none());
        assert!(store.select(&other).await.unwrap().is_none());
        assert!(store.load_from_disk(rec.key()).await.is_some());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
