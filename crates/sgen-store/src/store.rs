//! Job records persisted as one JSON document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sgen_models::{JobId, JobRecord, JobStatus};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// File name of the persisted document inside the storage directory.
pub const STORE_FILE_NAME: &str = "jobs.json";

/// Page size used when a caller passes zero.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Largest accepted page size.
pub const MAX_PAGE_SIZE: usize = 100;

/// One page of records, newest first.
#[derive(Debug, Clone)]
pub struct JobPage {
    pub jobs: Vec<JobRecord>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

/// Keyed job record store.
///
/// Every mutation rewrites the whole document through a temp file and a
/// rename, under the write lock, so readers never observe a partial file.
#[derive(Debug)]
pub struct JobStore {
    path: PathBuf,
    records: RwLock<HashMap<JobId, JobRecord>>,
}

impl JobStore {
    /// Open the store at `path`, loading existing records.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let records = match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => {
                let list: Vec<JobRecord> = serde_json::from_slice(&bytes)?;
                list.into_iter().map(|r| (r.id.clone(), r)).collect()
            }
            Ok(_) => HashMap::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!("Opened job store {} with {} records", path.display(), records.len());
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    /// Open `jobs.json` inside `storage_dir`.
    pub async fn open_in(storage_dir: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open(storage_dir.as_ref().join(STORE_FILE_NAME)).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn insert(&self, record: JobRecord) -> StoreResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id.to_string()));
        }
        debug!(job_id = %record.id, "Inserting job record");
        let mut staged = records.clone();
        staged.insert(record.id.clone(), record);
        self.commit(&mut records, staged).await
    }

    /// Replace an existing record.
    pub async fn update(&self, record: JobRecord) -> StoreResult<()> {
        let mut records = self.records.write().await;
        if !records.contains_key(&record.id) {
            return Err(StoreError::not_found(record.id.as_str()));
        }
        let mut staged = records.clone();
        staged.insert(record.id.clone(), record);
        self.commit(&mut records, staged).await
    }

    /// Apply `f` to a copy of a record and persist the result.
    pub async fn modify<F>(&self, id: &JobId, f: F) -> StoreResult<JobRecord>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut records = self.records.write().await;
        let mut updated = records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;
        f(&mut updated);
        let mut staged = records.clone();
        staged.insert(id.clone(), updated.clone());
        self.commit(&mut records, staged).await?;
        Ok(updated)
    }

    pub async fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.records.read().await.get(id).cloned()
    }

    /// Records ordered newest first. `page` is 1-based.
    pub async fn list(&self, page: usize, limit: usize) -> JobPage {
        let page = page.max(1);
        let limit = match limit {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };

        let records = self.records.read().await;
        let mut all: Vec<&JobRecord> = records.values().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        let jobs = all
            .into_iter()
            .skip((page - 1) * limit)
            .take(limit)
            .cloned()
            .collect();

        JobPage {
            jobs,
            total: records.len(),
            page,
            limit,
        }
    }

    /// Remove a record, returning it.
    pub async fn delete(&self, id: &JobId) -> StoreResult<JobRecord> {
        let mut records = self.records.write().await;
        let mut staged = records.clone();
        let removed = staged
            .remove(id)
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;
        self.commit(&mut records, staged).await?;
        Ok(removed)
    }

    /// Remove every record, returning them.
    pub async fn delete_all(&self) -> StoreResult<Vec<JobRecord>> {
        let mut records = self.records.write().await;
        self.persist(&HashMap::new()).await?;
        Ok(records.drain().map(|(_, r)| r).collect())
    }

    /// Ids of records in `status`, oldest first.
    pub async fn ids_with_status(&self, status: JobStatus) -> Vec<JobId> {
        let records = self.records.read().await;
        let mut matching: Vec<&JobRecord> = records.values().filter(|r| r.status == status).collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matching.into_iter().map(|r| r.id.clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Write `staged` and make it current. Memory is left as it was when the
    /// write fails.
    async fn commit(
        &self,
        records: &mut HashMap<JobId, JobRecord>,
        staged: HashMap<JobId, JobRecord>,
    ) -> StoreResult<()> {
        self.persist(&staged).await?;
        *records = staged;
        Ok(())
    }

    async fn persist(&self, records: &HashMap<JobId, JobRecord>) -> StoreResult<()> {
        let mut list: Vec<&JobRecord> = records.values().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let bytes = serde_json::to_vec_pretty(&list)?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
