use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use futures::stream;

use crate::error::{StoreError, StoreResult};
use crate::object::ObjectStore;
use crate::table::{RowStream, TableFilter, TableRow, TableStore};

// ---------------------------------------------------------------------------
// InMemoryObjectStore
// ---------------------------------------------------------------------------

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. Object names registered with
/// [`inject_fault`](Self::inject_fault) fail every get/put/delete with a
/// [`StoreError::Backend`], which lets callers exercise their error paths.
pub struct InMemoryObjectStore {
    containers: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
    faults: RwLock<HashSet<String>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            faults: RwLock::new(HashSet::new()),
        }
    }

    /// Make every operation on objects named `name` fail.
    pub fn inject_fault(&self, name: impl Into<String>) {
        self.faults.write().expect("lock poisoned").insert(name.into());
    }

    pub fn clear_faults(&self) {
        self.faults.write().expect("lock poisoned").clear();
    }

    /// Number of objects in `container` (0 if it does not exist).
    pub fn object_count(&self, container: &str) -> usize {
        self.containers
            .read()
            .expect("lock poisoned")
            .get(container)
            .map_or(0, BTreeMap::len)
    }

    fn check_fault(&self, operation: &'static str, container: &str, name: &str) -> StoreResult<()> {
        if self.faults.read().expect("lock poisoned").contains(name) {
            return Err(StoreError::backend(
                operation,
                format!("{container}/{name}"),
                "injected fault",
            ));
        }
        Ok(())
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn create_container(&self, container: &str) -> StoreResult<()> {
        let mut map = self.containers.write().expect("lock poisoned");
        map.entry(container.to_string()).or_default();
        Ok(())
    }

    async fn get(&self, container: &str, name: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check_fault("get", container, name)?;
        let map = self.containers.read().expect("lock poisoned");
        let objects = map
            .get(container)
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))?;
        Ok(objects.get(name).cloned())
    }

    async fn put(&self, container: &str, name: &str, data: Vec<u8>) -> StoreResult<()> {
        self.check_fault("put", container, name)?;
        let mut map = self.containers.write().expect("lock poisoned");
        let objects = map
            .get_mut(container)
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))?;
        objects.insert(name.to_string(), data);
        Ok(())
    }

    async fn delete(&self, container: &str, name: &str) -> StoreResult<bool> {
        self.check_fault("delete", container, name)?;
        let mut map = self.containers.write().expect("lock poisoned");
        let objects = map
            .get_mut(container)
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))?;
        Ok(objects.remove(name).is_some())
    }

    async fn list(&self, container: &str) -> StoreResult<Vec<String>> {
        let map = self.containers.read().expect("lock poisoned");
        let objects = map
            .get(container)
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))?;
        Ok(objects.keys().cloned().collect())
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.containers.read().expect("lock poisoned").len();
        f.debug_struct("InMemoryObjectStore")
            .field("container_count", &count)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// InMemoryTableStore
// ---------------------------------------------------------------------------

type Rows = BTreeMap<(String, String), TableRow>;

/// In-memory partitioned table store.
///
/// Row keys registered with [`inject_fault`](Self::inject_fault) fail every
/// get/upsert/delete touching them; [`fail_queries`](Self::fail_queries)
/// makes every query fail.
pub struct InMemoryTableStore {
    tables: RwLock<HashMap<String, Rows>>,
    faults: RwLock<HashSet<String>>,
    fail_queries: RwLock<bool>,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            faults: RwLock::new(HashSet::new()),
            fail_queries: RwLock::new(false),
        }
    }

    /// Make every single-row operation on rows with this row key fail.
    pub fn inject_fault(&self, row_key: impl Into<String>) {
        self.faults.write().expect("lock poisoned").insert(row_key.into());
    }

    pub fn fail_queries(&self, fail: bool) {
        *self.fail_queries.write().expect("lock poisoned") = fail;
    }

    pub fn clear_faults(&self) {
        self.faults.write().expect("lock poisoned").clear();
        self.fail_queries(false);
    }

    /// Number of rows in `table` (0 if it does not exist).
    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .expect("lock poisoned")
            .get(table)
            .map_or(0, BTreeMap::len)
    }

    fn check_fault(&self, operation: &'static str, table: &str, pk: &str, rk: &str) -> StoreResult<()> {
        if self.faults.read().expect("lock poisoned").contains(rk) {
            return Err(StoreError::backend(
                operation,
                format!("{table}({pk},{rk})"),
                "injected fault",
            ));
        }
        Ok(())
    }
}

impl Default for InMemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    async fn create_table(&self, table: &str) -> StoreResult<()> {
        let mut map = self.tables.write().expect("lock poisoned");
        map.entry(table.to_string()).or_default();
        Ok(())
    }

    async fn upsert(&self, table: &str, row: TableRow) -> StoreResult<()> {
        self.check_fault("upsert", table, &row.partition_key, &row.row_key)?;
        let mut map = self.tables.write().expect("lock poisoned");
        let rows = map
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        rows.insert((row.partition_key.clone(), row.row_key.clone()), row);
        Ok(())
    }

    async fn get(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> StoreResult<Option<TableRow>> {
        self.check_fault("get", table, partition_key, row_key)?;
        let map = self.tables.read().expect("lock poisoned");
        let rows = map
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(rows
            .get(&(partition_key.to_string(), row_key.to_string()))
            .cloned())
    }

    async fn delete(&self, table: &str, partition_key: &str, row_key: &str) -> StoreResult<bool> {
        self.check_fault("delete", table, partition_key, row_key)?;
        let mut map = self.tables.write().expect("lock poisoned");
        let rows = map
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(rows
            .remove(&(partition_key.to_string(), row_key.to_string()))
            .is_some())
    }

    async fn query(
        &self,
        table: &str,
        filter: &TableFilter,
        max_results: Option<usize>,
    ) -> StoreResult<RowStream> {
        if *self.fail_queries.read().expect("lock poisoned") {
            return Err(StoreError::backend("query", format!("{table}[{filter}]"), "injected fault"));
        }
        let map = self.tables.read().expect("lock poisoned");
        let rows = map
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        let matched: Vec<StoreResult<TableRow>> = rows
            .values()
            .filter(|row| filter.matches(row))
            .take(max_results.unwrap_or(usize::MAX))
            .cloned()
            .map(Ok)
            .collect();
        Ok(Box::pin(stream::iter(matched)))
    }
}

impl std::fmt::Debug for InMemoryTableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.tables.read().expect("lock poisoned").len();
        f.debug_struct("InMemoryTableStore")
            .field("table_count", &count)
            .finish()
    }
}
