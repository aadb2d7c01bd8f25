use crate::error::{Result, SafebumpError};
use crate::utils::{FileStore, PathValidator};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub const MANIFEST_FILE: &str = "package.json";
pub const LOCK_FILE: &str = "package-lock.json";
const METADATA_FILE: &str = "metadata.json";
const ID_PREFIX: &str = "snapshot-";

pub type SnapshotId = String;

/// A captured copy of the project's manifest files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub timestamp: Timestamp,
    pub package_names: Vec<String>,
    /// Logical file name (`package.json`, `package-lock.json`) to raw bytes.
    pub captured_files: BTreeMap<String, Vec<u8>>,
}

impl Snapshot {
    pub fn has_lock_file(&self) -> bool {
        self.captured_files.contains_key(LOCK_FILE)
    }
}

/// On-disk metadata record. Written last, so its presence with
/// `success = true` marks a complete snapshot.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotMetadata {
    id: String,
    timestamp: String,
    packages: Vec<String>,
    success: bool,
}

/// How accumulated snapshots are pruned. Nothing is ever evicted unless the
/// user asks for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetentionPolicy {
    #[default]
    KeepAll,
    KeepLatest(usize),
}

/// Captures and restores `package.json` / `package-lock.json`.
pub struct SnapshotStore {
    project_path: PathBuf,
    snapshot_root: PathBuf,
    store: Arc<dyn FileStore>,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(
        project_path: P,
        snapshot_root: P,
        store: Arc<dyn FileStore>,
    ) -> Self {
        Self {
            project_path: project_path.as_ref().to_path_buf(),
            snapshot_root: snapshot_root.as_ref().to_path_buf(),
            store,
        }
    }

    pub fn snapshot_root(&self) -> &Path {
        &self.snapshot_root
    }

    /// Copies the current manifest (and lock file when present) into a new
    /// snapshot directory tagged with `package_names`.
    pub fn capture(&self, package_names: &[String]) -> Result<SnapshotId> {
        let manifest_path = self.project_path.join(MANIFEST_FILE);
        let manifest = self
            .store
            .read_bytes(&manifest_path)
            .map_err(|e| SafebumpError::manifest_unreadable(&manifest_path, e))?
            .ok_or_else(|| SafebumpError::manifest_unreadable(&manifest_path, "file not found"))?;

        let lock_file = self.store.read_bytes(&self.project_path.join(LOCK_FILE))?;

        let (id, timestamp) = self.allocate_id()?;
        let dir = self.snapshot_root.join(&id);

        self.store.write_bytes(&dir.join(MANIFEST_FILE), &manifest)?;
        if let Some(lock_file) = lock_file {
            self.store.write_bytes(&dir.join(LOCK_FILE), &lock_file)?;
        }

        let metadata = SnapshotMetadata {
            id: id.clone(),
            timestamp: timestamp.to_string(),
            packages: package_names.to_vec(),
            success: true,
        };
        let mut record = serde_json::to_vec_pretty(&metadata)?;
        record.push(b'\n');
        self.store.write_bytes(&dir.join(METADATA_FILE), &record)?;

        debug!(snapshot = %id, packages = package_names.len(), "captured snapshot");
        Ok(id)
    }

    /// Writes the captured bytes back over the project's manifest files.
    pub fn restore(&self, id: &str) -> Result<bool> {
        let id = PathValidator::validate_snapshot_id(id)?;
        let dir = self.snapshot_root.join(id);
        if !self.store.exists(&dir) {
            return Err(SafebumpError::SnapshotNotFound(id.to_string()));
        }

        let manifest = self
            .store
            .read_bytes(&dir.join(MANIFEST_FILE))?
            .ok_or_else(|| SafebumpError::SnapshotNotFound(id.to_string()))?;
        let lock_file = self.store.read_bytes(&dir.join(LOCK_FILE))?;

        self.store
            .write_bytes(&self.project_path.join(MANIFEST_FILE), &manifest)?;
        match lock_file {
            Some(lock_file) => self
                .store
                .write_bytes(&self.project_path.join(LOCK_FILE), &lock_file)?,
            None => debug!(snapshot = id, "snapshot has no lock file, leaving it untouched"),
        }

        debug!(snapshot = id, "restored snapshot");
        Ok(true)
    }

    /// Complete snapshots, newest first.
    pub fn list(&self) -> Result<Vec<Snapshot>> {
        let mut snapshots: Vec<Snapshot> = self
            .store
            .list_entries(&self.snapshot_root)?
            .iter()
            .filter_map(|entry| self.load(entry))
            .collect();

        snapshots.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(snapshots)
    }

    pub fn get(&self, id: &str) -> Option<Snapshot> {
        PathValidator::validate_snapshot_id(id).ok()?;
        self.load(id)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let id = PathValidator::validate_snapshot_id(id)?;
        let dir = self.snapshot_root.join(id);
        if !self.store.exists(&dir) {
            return Err(SafebumpError::SnapshotNotFound(id.to_string()));
        }
        self.store.remove_dir(&dir)?;
        debug!(snapshot = id, "deleted snapshot");
        Ok(())
    }

    /// Removes the snapshots the policy does not keep and returns their ids.
    pub fn prune(&self, policy: RetentionPolicy) -> Result<Vec<SnapshotId>> {
        let RetentionPolicy::KeepLatest(keep) = policy else {
            return Ok(Vec::new());
        };

        let mut removed = Vec::new();
        for snapshot in self.list()?.into_iter().skip(keep) {
            self.delete(&snapshot.id)?;
            removed.push(snapshot.id);
        }
        Ok(removed)
    }

    fn load(&self, id: &str) -> Option<Snapshot> {
        let dir = self.snapshot_root.join(id);
        let raw = match self.store.read_bytes(&dir.join(METADATA_FILE)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(snapshot = id, error = %e, "skipping unreadable snapshot metadata");
                return None;
            }
        };

        let metadata: SnapshotMetadata = serde_json::from_slice(&raw).ok()?;
        if !metadata.success || metadata.id != id {
            return None;
        }
        let timestamp: Timestamp = metadata.timestamp.parse().ok()?;

        let mut captured_files = BTreeMap::new();
        for name in [MANIFEST_FILE, LOCK_FILE] {
            if let Ok(Some(bytes)) = self.store.read_bytes(&dir.join(name)) {
                captured_files.insert(name.to_string(), bytes);
            }
        }
        if !captured_files.contains_key(MANIFEST_FILE) {
            return None;
        }

        Some(Snapshot {
            id: metadata.id,
            timestamp,
            package_names: metadata.packages,
            captured_files,
        })
    }

    /// Fixed-width, millisecond-resolution ids sort lexically in capture
    /// order. A new id is never older than the newest one on disk, even when
    /// the clock has stepped back; a clash moves to the next free millisecond.
    fn allocate_id(&self) -> Result<(SnapshotId, Timestamp)> {
        let now = Timestamp::now().as_millisecond();
        let newest = self
            .store
            .list_entries(&self.snapshot_root)?
            .iter()
            .filter_map(|entry| Self::parse_id(entry))
            .map(|timestamp| timestamp.as_millisecond() + 1)
            .max();
        let mut millis = newest.map_or(now, |next| next.max(now));

        loop {
            let timestamp = Timestamp::from_millisecond(millis).map_err(|e| {
                SafebumpError::ProjectValidation(format!("cannot allocate snapshot id: {e}"))
            })?;
            let id = Self::format_id(timestamp);
            if !self.store.exists(&self.snapshot_root.join(&id)) {
                return Ok((id, timestamp));
            }
            millis += 1;
        }
    }

    /// Inverse of `format_id`; `None` for directories it did not name.
    fn parse_id(id: &str) -> Option<Timestamp> {
        let stamp = id.strip_prefix(ID_PREFIX)?.strip_suffix('Z')?;
        let (date, time) = stamp.split_once('T')?;
        let mut parts = time.split('-');
        let (hour, minute, second, millis) =
            (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        format!("{date}T{hour}:{minute}:{second}.{millis}Z").parse().ok()
    }

    fn format_id(timestamp: Timestamp) -> SnapshotId {
        format!(
            "{ID_PREFIX}{}-{:03}Z",
            timestamp.strftime("%Y-%m-%dT%H-%M-%S"),
            timestamp.subsec_millisecond()
        )
    }
}
