//! # Duplicate Detector
//!
//! Two-phase deduplication against the remote folder.
//!
//! 1. [`DuplicateDetector::find_duplicates`] sends the cheap name hashes of
//!    IDLE files to the remote store. Fresh hashes go READY; colliding ones go
//!    POSSIBLE_DUPLICATE and their remote counterparts are persisted.
//! 2. [`DuplicateDetector::check_duplicates`] computes the real content digest
//!    of each candidate and compares it with the persisted counterparts.
//!
//! Retrying phase 1 is left to the caller; phase 2 never fails on a single
//! file, it leaves the file for the next pass instead.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use bridge_traits::{ContentHasher, LinkState, PendingHash, RemoteStore};
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::models::{BackupDuplicate, BackupFile, BackupFileState, BackupFolder};
use crate::repositories::{BackupDuplicateRepository, BackupFileRepository};

/// Maximum number of hashes per availability request
pub const DEFAULT_HASH_BATCH_SIZE: usize = 150;

/// Outcome of the candidate detection phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CandidateSummary {
    pub ready: u64,
    pub possible_duplicates: u64,
}

/// Outcome of the content confirmation phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfirmationSummary {
    pub duplicated: u64,
    pub ready: u64,
    /// Ready files that will replace an interrupted draft of this client
    pub resumed_drafts: u64,
    /// Files whose digest could not be computed this pass
    pub deferred: u64,
}

pub struct DuplicateDetector {
    remote: Arc<dyn RemoteStore>,
    hasher: Arc<dyn ContentHasher>,
    files: Arc<dyn BackupFileRepository>,
    duplicates: Arc<dyn BackupDuplicateRepository>,
    client_uid: String,
    hash_batch_size: usize,
}

impl DuplicateDetector {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        hasher: Arc<dyn ContentHasher>,
        files: Arc<dyn BackupFileRepository>,
        duplicates: Arc<dyn BackupDuplicateRepository>,
        client_uid: impl Into<String>,
    ) -> Self {
        Self {
            remote,
            hasher,
            files,
            duplicates,
            client_uid: client_uid.into(),
            hash_batch_size: DEFAULT_HASH_BATCH_SIZE,
        }
    }

    pub fn with_hash_batch_size(mut self, size: usize) -> Self {
        self.hash_batch_size = size.max(1);
        self
    }

    /// Phase 1: classify IDLE files by asking which name hashes the remote folder already holds.
    ///
    /// Each batch is committed as soon as its response arrives. On error the
    /// files of the failing batch are still IDLE and are picked up again.
    #[instrument(skip(self, folder), fields(folder_id = %folder.folder_id, bucket_id = folder.bucket_id))]
    pub async fn find_duplicates(&self, folder: &BackupFolder) -> Result<CandidateSummary> {
        let idle = self
            .files
            .find_by_state(folder, BackupFileState::Idle, None)
            .await?;

        let mut summary = CandidateSummary::default();
        if idle.is_empty() {
            return Ok(summary);
        }

        let (hashes, ids_by_hash) = group_ids_by_hash(&idle);

        for batch in hashes.chunks(self.hash_batch_size) {
            let availability = self
                .remote
                .check_available_hashes(&folder.folder_id, batch)
                .await?;

            let available: HashSet<&str> =
                availability.available.iter().map(String::as_str).collect();
            let mut pending: HashMap<&str, Vec<&PendingHash>> = HashMap::new();
            for entry in &availability.pending {
                pending.entry(entry.hash.as_str()).or_default().push(entry);
            }

            for hash in batch {
                let Some(ids) = ids_by_hash.get(hash.as_str()) else {
                    continue;
                };

                if available.contains(hash.as_str()) {
                    summary.ready += self
                        .files
                        .transition(ids, BackupFileState::Idle, BackupFileState::Ready)
                        .await?;
                    continue;
                }

                let collisions: Vec<BackupDuplicate> = match pending.get(hash.as_str()) {
                    Some(entries) => entries
                        .iter()
                        .map(|entry| BackupDuplicate::from_pending(&folder.folder_id, entry))
                        .collect(),
                    None => vec![BackupDuplicate::unknown(&folder.folder_id, hash)],
                };

                self.duplicates
                    .replace_for_hash(&folder.folder_id, hash, &collisions)
                    .await?;
                summary.possible_duplicates += self
                    .files
                    .transition(
                        ids,
                        BackupFileState::Idle,
                        BackupFileState::PossibleDuplicate,
                    )
                    .await?;
            }

            debug!(batch = batch.len(), "Hash batch classified");
        }

        info!(
            ready = summary.ready,
            possible_duplicates = summary.possible_duplicates,
            "Duplicate candidates detected"
        );
        Ok(summary)
    }

    /// Phase 2: confirm or reject each POSSIBLE_DUPLICATE by content digest.
    #[instrument(skip(self, folder), fields(folder_id = %folder.folder_id, bucket_id = folder.bucket_id))]
    pub async fn check_duplicates(
        &self,
        user_id: &str,
        folder: &BackupFolder,
    ) -> Result<ConfirmationSummary> {
        let candidates = self
            .files
            .find_by_state(folder, BackupFileState::PossibleDuplicate, None)
            .await?;

        let mut summary = ConfirmationSummary::default();
        if candidates.is_empty() {
            return Ok(summary);
        }

        let mut by_hash: BTreeMap<&str, Vec<&BackupFile>> = BTreeMap::new();
        for file in &candidates {
            by_hash.entry(file.hash.as_str()).or_default().push(file);
        }

        for (hash, files) in by_hash {
            let remote = self.duplicates.find_by_hash(&folder.folder_id, hash).await?;
            let mut deferred = 0;

            for file in files {
                let digest = match self.hasher.content_digest(&file.uri).await {
                    Ok(digest) => digest,
                    Err(e) => {
                        warn!(file_id = file.id, error = %e, "Content digest unavailable, deferring");
                        deferred += 1;
                        continue;
                    }
                };

                match self.verdict(&digest, &remote) {
                    Verdict::Duplicate => {
                        summary.duplicated += self
                            .files
                            .transition(
                                &[file.id],
                                BackupFileState::PossibleDuplicate,
                                BackupFileState::Duplicated,
                            )
                            .await?;
                    }
                    Verdict::Upload => {
                        summary.ready += self
                            .files
                            .transition(
                                &[file.id],
                                BackupFileState::PossibleDuplicate,
                                BackupFileState::Ready,
                            )
                            .await?;
                    }
                    Verdict::ReplaceDraft(link_id) => {
                        debug!(file_id = file.id, link_id, "Replacing own interrupted draft");
                        if self.files.mark_ready_replacing(file.id, link_id).await? {
                            summary.ready += 1;
                            summary.resumed_drafts += 1;
                        }
                    }
                }
            }

            if deferred == 0 {
                self.duplicates.delete_by_hash(&folder.folder_id, hash).await?;
            }
            summary.deferred += deferred;
        }

        info!(
            user_id = %core_runtime::logging::mask_id(user_id),
            duplicated = summary.duplicated,
            ready = summary.ready,
            resumed_drafts = summary.resumed_drafts,
            deferred = summary.deferred,
            "Duplicate candidates confirmed"
        );
        Ok(summary)
    }

    /// A live remote item with the same content makes the file a duplicate.
    /// Otherwise the file is uploaded, replacing a draft this client left
    /// behind when there is one. Drafts of other clients are left alone.
    fn verdict<'a>(&self, digest: &str, remote: &'a [BackupDuplicate]) -> Verdict<'a> {
        let live_copy = remote.iter().any(|duplicate| {
            duplicate.link_state == Some(LinkState::Active)
                && duplicate.content_hash.as_deref() == Some(digest)
        });
        if live_copy {
            return Verdict::Duplicate;
        }

        remote
            .iter()
            .filter(|duplicate| duplicate.link_state == Some(LinkState::Draft))
            .filter(|duplicate| duplicate.client_uid.as_deref() == Some(self.client_uid.as_str()))
            .find_map(|duplicate| duplicate.link_id.as_deref())
            .map_or(Verdict::Upload, Verdict::ReplaceDraft)
    }
}

enum Verdict<'a> {
    Duplicate,
    Upload,
    ReplaceDraft(&'a str),
}

/// Distinct hashes in first-seen order, plus the ids carrying each
fn group_ids_by_hash(files: &[BackupFile]) -> (Vec<String>, HashMap<&str, Vec<i64>>) {
    let mut order = Vec::new();
    let mut ids: HashMap<&str, Vec<i64>> = HashMap::new();
    for file in files {
        let entry = ids.entry(file.hash.as_str()).or_default();
        if entry.is_empty() {
            order.push(file.hash.clone());
        }
        entry.push(file.id);
    }
    (order, ids)
}
