//! Filesystem backends.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/objects/<container>/<name>
//! <root>/tables/<table>/<partition>/<row>.json
//! ```
//!
//! Writes go to a hidden temporary sibling and are renamed into place, so a
//! reader never observes a half-written file. Entries starting with `.` are
//! ignored by listings and queries.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::stream;
use tokio::fs;
use tracing::warn;

use crate::codec::{decode, encode};
use crate::error::{StoreError, StoreResult};
use crate::object::{validate_name, ObjectStore, MAX_NAME_LEN};
use crate::table::{RowStream, TableFilter, TableRow, TableStore};

const ROW_EXTENSION: &str = ".json";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

async fn write_atomic(dir: &Path, name: &str, data: &[u8]) -> StoreResult<()> {
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = dir.join(format!(".tmp.{}.{seq}", std::process::id()));
    fs::write(&tmp, data).await?;
    if let Err(err) = fs::rename(&tmp, dir.join(name)).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(err.into());
    }
    Ok(())
}

async fn remove_if_exists(path: &Path) -> StoreResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

async fn read_if_exists(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

/// Visible (non-dot) entry names of a directory, sorted.
async fn entry_names(dir: &Path) -> StoreResult<Vec<String>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with('.') {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

// ---------------------------------------------------------------------------
// FsObjectStore
// ---------------------------------------------------------------------------

/// Object store keeping one file per object.
#[derive(Clone, Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into().join("objects"),
        }
    }

    async fn container_dir(&self, container: &str) -> StoreResult<PathBuf> {
        validate_name(container)?;
        let dir = self.root.join(container);
        if !is_dir(&dir).await {
            return Err(StoreError::ContainerNotFound(container.to_string()));
        }
        Ok(dir)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn create_container(&self, container: &str) -> StoreResult<()> {
        validate_name(container)?;
        fs::create_dir_all(self.root.join(container)).await?;
        Ok(())
    }

    async fn get(&self, container: &str, name: &str) -> StoreResult<Option<Vec<u8>>> {
        validate_name(name)?;
        let dir = self.container_dir(container).await?;
        read_if_exists(&dir.join(name)).await
    }

    async fn put(&self, container: &str, name: &str, data: Vec<u8>) -> StoreResult<()> {
        validate_name(name)?;
        let dir = self.container_dir(container).await?;
        write_atomic(&dir, name, &data).await
    }

    async fn delete(&self, container: &str, name: &str) -> StoreResult<bool> {
        validate_name(name)?;
        let dir = self.container_dir(container).await?;
        remove_if_exists(&dir.join(name)).await
    }

    async fn list(&self, container: &str) -> StoreResult<Vec<String>> {
        let dir = self.container_dir(container).await?;
        entry_names(&dir).await
    }
}

// ---------------------------------------------------------------------------
// FsTableStore
// ---------------------------------------------------------------------------

/// Table store keeping one JSON file per row, one directory per partition.
///
/// Queries pinned to a partition read only that directory; other queries
/// scan every partition. Results are materialized before being streamed.
#[derive(Clone, Debug)]
pub struct FsTableStore {
    root: PathBuf,
}

impl FsTableStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into().join("tables"),
        }
    }

    async fn table_dir(&self, table: &str) -> StoreResult<PathBuf> {
        validate_name(table)?;
        let dir = self.root.join(table);
        if !is_dir(&dir).await {
            return Err(StoreError::TableNotFound(table.to_string()));
        }
        Ok(dir)
    }

    /// File name of a row. Checks the key leaves room for the extension.
    fn row_file(row_key: &str) -> StoreResult<String> {
        validate_name(row_key)?;
        if row_key.len() + ROW_EXTENSION.len() > MAX_NAME_LEN {
            return Err(StoreError::InvalidName {
                name: row_key.to_string(),
                reason: "row key is too long".to_string(),
            });
        }
        Ok(format!("{row_key}{ROW_EXTENSION}"))
    }

    async fn read_partition(
        dir: &Path,
        filter: &TableFilter,
        limit: usize,
        out: &mut Vec<StoreResult<TableRow>>,
    ) -> StoreResult<()> {
        for file in entry_names(dir).await? {
            if out.len() >= limit {
                break;
            }
            if !file.ends_with(ROW_EXTENSION) {
                continue;
            }
            let Some(data) = read_if_exists(&dir.join(&file)).await? else {
                continue;
            };
            match decode::<TableRow>(&data) {
                Ok(row) if filter.matches(&row) => out.push(Ok(row)),
                Ok(_) => {}
                Err(err) => {
                    warn!(path = %dir.join(&file).display(), error = %err, "skipping unreadable row");
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TableStore for FsTableStore {
    async fn create_table(&self, table: &str) -> StoreResult<()> {
        validate_name(table)?;
        fs::create_dir_all(self.root.join(table)).await?;
        Ok(())
    }

    async fn upsert(&self, table: &str, row: TableRow) -> StoreResult<()> {
        validate_name(&row.partition_key)?;
        let file = Self::row_file(&row.row_key)?;
        let dir = self.table_dir(table).await?.join(&row.partition_key);
        fs::create_dir_all(&dir).await?;
        let data = encode(&row)?;
        write_atomic(&dir, &file, &data).await
    }

    async fn get(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> StoreResult<Option<TableRow>> {
        validate_name(partition_key)?;
        let file = Self::row_file(row_key)?;
        let path = self.table_dir(table).await?.join(partition_key).join(file);
        match read_if_exists(&path).await? {
            Some(data) => decode(&data).map(Some),
            None => Ok(None),
        }
    }

    async fn delete(&self, table: &str, partition_key: &str, row_key: &str) -> StoreResult<bool> {
        validate_name(partition_key)?;
        let file = Self::row_file(row_key)?;
        let path = self.table_dir(table).await?.join(partition_key).join(file);
        remove_if_exists(&path).await
    }

    async fn query(
        &self,
        table: &str,
        filter: &TableFilter,
        max_results: Option<usize>,
    ) -> StoreResult<RowStream> {
        let table_dir = self.table_dir(table).await?;
        let limit = max_results.unwrap_or(usize::MAX);
        let partitions = match filter.pinned_partition() {
            Some(partition) => {
                validate_name(partition)?;
                vec![partition.to_string()]
            }
            None => entry_names(&table_dir).await?,
        };

        let mut rows = Vec::new();
        for partition in partitions {
            if rows.len() >= limit {
                break;
            }
            let dir = table_dir.join(&partition);
            if is_dir(&dir).await {
                Self::read_partition(&dir, filter, limit, &mut rows).await?;
            }
        }
        Ok(Box::pin(stream::iter(rows)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn object_round_trip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.create_container("clients").await.unwrap();
        store.put("clients", "b", b"2".to_vec()).await.unwrap();
        store.put("clients", "a", b"1".to_vec()).await.unwrap();
        store.put("clients", "a", b"3".to_vec()).await.unwrap();

        assert_eq!(store.get("clients", "a").await.unwrap(), Some(b"3".to_vec()));
        assert_eq!(store.list("clients").await.unwrap(), vec!["a", "b"]);
        assert!(store.get("clients", "zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn object_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.create_container("c").await.unwrap();
        store.put("c", "x", vec![1]).await.unwrap();
        assert!(store.delete("c", "x").await.unwrap());
        assert!(!store.delete("c", "x").await.unwrap());
    }

    #[tokio::test]
    async fn longest_valid_name_is_writable() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.create_container("c").await.unwrap();
        let name = "a".repeat(MAX_NAME_LEN);
        store.put("c", &name, vec![7]).await.unwrap();
        assert_eq!(store.get("c", &name).await.unwrap(), Some(vec![7]));
        assert_eq!(store.list("c").await.unwrap(), vec![name]);
    }

    #[tokio::test]
    async fn missing_container_and_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        assert!(matches!(
            store.list("nope").await.unwrap_err(),
            StoreError::ContainerNotFound(_)
        ));
        store.create_container("c").await.unwrap();
        assert!(matches!(
            store.put("c", "../etc", vec![]).await.unwrap_err(),
            StoreError::InvalidName { .. }
        ));
    }

    #[tokio::test]
    async fn rows_round_trip_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTableStore::new(dir.path());
        store.create_table("grants").await.unwrap();

        let past = Utc::now() - Duration::minutes(5);
        store
            .upsert("grants", TableRow::new("p1", "r1").with("ClientId", "c1").with("Expiration", past))
            .await
            .unwrap();
        store
            .upsert("grants", TableRow::new("p1", "r2").with("ClientId", "c2"))
            .await
            .unwrap();
        store
            .upsert("grants", TableRow::new("p2", "r1").with("ClientId", "c1"))
            .await
            .unwrap();

        let row = store.get("grants", "p1", "r1").await.unwrap().unwrap();
        assert_eq!(row.get_datetime("Expiration"), Some(past));

        let c1 = store
            .query_all("grants", &TableFilter::new().and_eq("ClientId", "c1"), None)
            .await
            .unwrap();
        assert_eq!(c1.len(), 2);

        let p1 = store
            .query_all("grants", &TableFilter::partition("p1"), None)
            .await
            .unwrap();
        assert_eq!(p1.len(), 2);

        let capped = store
            .query_all("grants", &TableFilter::new(), Some(1))
            .await
            .unwrap();
        assert_eq!(capped.len(), 1);

        let expired = store
            .query_all("grants", &TableFilter::new().and_before("Expiration", Utc::now()), None)
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
    }

    #[tokio::test]
    async fn overlong_row_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTableStore::new(dir.path());
        store.create_table("t").await.unwrap();
        let longest = "r".repeat(MAX_NAME_LEN - ROW_EXTENSION.len());
        store.upsert("t", TableRow::new("p", longest.as_str())).await.unwrap();
        assert!(store.get("t", "p", &longest).await.unwrap().is_some());

        let overlong = format!("{longest}x");
        assert!(matches!(
            store.upsert("t", TableRow::new("p", overlong.as_str())).await.unwrap_err(),
            StoreError::InvalidName { .. }
        ));
    }

    #[tokio::test]
    async fn row_delete_and_missing_partition_query() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTableStore::new(dir.path());
        store.create_table("t").await.unwrap();
        store.upsert("t", TableRow::new("p", "r")).await.unwrap();
        assert!(store.delete("t", "p", "r").await.unwrap());
        assert!(!store.delete("t", "p", "r").await.unwrap());
        let rows = store
            .query_all("t", &TableFilter::partition("never"), None)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
