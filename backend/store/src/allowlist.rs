//! Per-community allow-list files.
//!
//! One JSON array of member ids per community, at `<dir>/<community>.json`.
//! The whole file is loaded and replaced at once. Writes through one store
//! (and its clones) are serialized, so a read-modify-write via [`AllowlistStore::update`]
//! never loses a concurrent edit.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lastseen_core::{CommunityId, MemberId};
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct AllowlistStore {
    dir: PathBuf,
    writes: Arc<Mutex<()>>,
}

impl AllowlistStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), writes: Arc::new(Mutex::new(())) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, community: CommunityId) -> PathBuf {
        self.dir.join(format!("{community}.json"))
    }

    /// Load the allow-list. A missing file is an empty list.
    pub async fn load(&self, community: CommunityId) -> Result<BTreeSet<MemberId>, StoreError> {
        let path = self.path_for(community);
        if !fs::try_exists(&path).await? {
            debug!(%community, "No allow-list file, treating as empty");
            return Ok(BTreeSet::new());
        }
        let raw = fs::read_to_string(&path).await?;
        let members: Vec<MemberId> = serde_json::from_str(&raw)?;
        Ok(members.into_iter().collect())
    }

    /// Replace the allow-list wholesale.
    pub async fn replace(
        &self,
        community: CommunityId,
        members: &BTreeSet<MemberId>,
    ) -> Result<(), StoreError> {
        let _guard = self.writes.lock().await;
        self.write(community, members).await
    }

    /// Load, edit and write back under the store's write lock. `edit` returns
    /// whether it changed the set; nothing is written when it did not.
    ///
    /// Returns the new set, or `None` when `edit` left it unchanged.
    pub async fn update(
        &self,
        community: CommunityId,
        edit: impl FnOnce(&mut BTreeSet<MemberId>) -> bool,
    ) -> Result<Option<BTreeSet<MemberId>>, StoreError> {
        let _guard = self.writes.lock().await;
        let mut members = self.load(community).await?;
        if !edit(&mut members) {
            return Ok(None);
        }
        self.write(community, &members).await?;
        Ok(Some(members))
    }

    // Uniquely named temp file in the target directory, then an atomic rename.
    async fn write(
        &self,
        community: CommunityId,
        members: &BTreeSet<MemberId>,
    ) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(community);
        let json = serde_json::to_string_pretty(&members.iter().collect::<Vec<_>>())?;

        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(json.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;

        info!(%community, count = members.len(), "Allow-list written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = AllowlistStore::new(dir.path());
        assert!(store.load(CommunityId(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = AllowlistStore::new(dir.path().join("whitelists"));

        let members: BTreeSet<_> = [MemberId(30), MemberId(10)].into_iter().collect();
        store.replace(CommunityId(1), &members).await.unwrap();

        assert_eq!(store.load(CommunityId(1)).await.unwrap(), members);
        assert!(store.load(CommunityId(2)).await.unwrap().is_empty());

        let raw = std::fs::read_to_string(store.dir().join("1.json")).unwrap();
        let ids: Vec<u64> = serde_json::from_str(&raw).unwrap();
        assert_eq!(ids, vec![10, 30]);
        let leftovers = std::fs::read_dir(store.dir()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn unchanged_update_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = AllowlistStore::new(dir.path());

        let changed = store.update(CommunityId(1), |set| set.remove(&MemberId(4))).await.unwrap();
        assert!(changed.is_none());
        assert!(!dir.path().join("1.json").exists());

        let changed = store.update(CommunityId(1), |set| set.insert(MemberId(4))).await.unwrap();
        assert_eq!(changed.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = AllowlistStore::new(dir.path());

        let mut tasks = Vec::new();
        for member in 1..=20_u64 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.update(CommunityId(1), |set| set.insert(MemberId(member))).await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().unwrap().is_some());
        }

        let stored = store.load(CommunityId(1)).await.unwrap();
        let expected: BTreeSet<MemberId> = (1..=20).map(MemberId).collect();
        assert_eq!(stored, expected);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("5.json"), "{not json").unwrap();
        let store = AllowlistStore::new(dir.path());
        assert!(matches!(store.load(CommunityId(5)).await, Err(StoreError::Json(_))));
    }
}
