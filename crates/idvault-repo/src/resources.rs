//! API resources with a scope -> resource index.
//!
//! One row per (resource, scope): partition `hash(scope)`, row
//! `hash(resource name)`. Direct reads by name never use the index.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use idvault_store::{ObjectStore, TableFilter, TableRow, TableStore, ROW_KEY};
use idvault_types::{ApiResource, ApiScope, Entity, HashedKey, IdentityResource, KeyHasher};
use tracing::{debug, warn};

use crate::config::{CachedContainerConfig, DEFAULT_API_RESOURCE_CACHE};
use crate::error::{RepoError, RepoResult};
use crate::fanout::{join_reporting, SubOp};
use crate::repository::{EntityRepository, RefreshReport, SnapshotRefresh};

const RESOURCE_NAME: &str = "ResourceName";
const SCOPE_NAME: &str = "ScopeName";

fn scope_row(resource: &str, scope: &str) -> TableRow {
    TableRow::new(KeyHasher::hash(scope).as_str(), KeyHasher::hash(resource).as_str())
        .with(RESOURCE_NAME, resource)
        .with(SCOPE_NAME, scope)
}

/// [`ApiResource`] repository maintaining the scope index on every write.
pub struct ApiResourceStore {
    resources: EntityRepository<ApiResource>,
    tables: Arc<dyn TableStore>,
    scope_table: String,
}

impl ApiResourceStore {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        tables: Arc<dyn TableStore>,
        config: &CachedContainerConfig,
        scope_table: impl Into<String>,
    ) -> Self {
        Self {
            resources: EntityRepository::new(objects, config, DEFAULT_API_RESOURCE_CACHE),
            tables,
            scope_table: scope_table.into(),
        }
    }

    /// The underlying cached repository.
    pub fn repository(&self) -> &EntityRepository<ApiResource> {
        &self.resources
    }

    pub async fn ensure_containers(&self) -> RepoResult<()> {
        self.resources.ensure_containers().await?;
        self.tables.create_table(&self.scope_table).await?;
        Ok(())
    }

    pub async fn find_all(&self) -> RepoResult<Vec<ApiResource>> {
        self.resources.find_all().await
    }

    pub async fn find_by_name(&self, name: &str) -> RepoResult<Option<ApiResource>> {
        self.resources.find_by_key(name).await
    }

    pub async fn find_by_names<I, S>(&self, names: I) -> RepoResult<Vec<ApiResource>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.resources.find_by_keys(names).await
    }

    /// Replace the resource's index rows, then write the resource.
    ///
    /// Every index row of the previous version is deleted and every row of
    /// the new version inserted, even when the scopes are unchanged. Failed
    /// index operations are reported as [`RepoError::Partial`] after the
    /// resource itself has been written.
    pub async fn store(&self, resource: ApiResource) -> RepoResult<()> {
        resource.validate()?;
        let previous = self.resources.find_by_key(&resource.name).await?;

        let deletes: Vec<SubOp<'_>> = previous
            .iter()
            .flat_map(|old| old.scopes.iter().map(move |scope| (old.name.as_str(), scope.as_str())))
            .map(|(name, scope)| self.delete_row(name, scope))
            .collect();
        let deleted = join_reporting("unindex resource scopes", deletes).await;

        let upserts: Vec<SubOp<'_>> = resource
            .scopes
            .iter()
            .map(|scope| {
                self.tables
                    .upsert(&self.scope_table, scope_row(&resource.name, scope))
            })
            .collect();
        let indexed = join_reporting("index resource scopes", upserts).await;

        debug!(
            resource = %resource.name,
            old_scopes = previous.as_ref().map_or(0, |r| r.scopes.len()),
            new_scopes = resource.scopes.len(),
            "scope index rewritten"
        );
        self.resources.store(resource).await?;
        merge_partial("store api resource", [deleted, indexed])
    }

    fn delete_row<'a>(&'a self, resource: &str, scope: &str) -> SubOp<'a> {
        let partition = KeyHasher::hash(scope);
        let row = KeyHasher::hash(resource);
        async move {
            self.tables
                .delete(&self.scope_table, partition.as_str(), row.as_str())
                .await
                .map(drop)
        }
        .boxed()
    }

    /// Resources indexed under any of `scopes` that still exist.
    pub async fn find_by_scopes<I, S>(&self, scopes: I) -> RepoResult<Vec<ApiResource>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut partitions: Vec<HashedKey> = scopes.into_iter().map(|s| KeyHasher::hash(s.as_ref())).collect();
        partitions.sort();
        partitions.dedup();

        let filters: Vec<TableFilter> = partitions
            .iter()
            .map(|partition| TableFilter::partition(partition.as_str()))
            .collect();
        let queries = filters
            .iter()
            .map(|filter| self.tables.query_all(&self.scope_table, filter, None));
        let mut names = BTreeMap::new();
        let mut failures = Vec::new();
        let total = partitions.len();
        for result in join_all(queries).await {
            match result {
                Ok(rows) => {
                    for row in rows {
                        match row.get_str(RESOURCE_NAME) {
                            Some(name) => {
                                names.entry(KeyHasher::hash(name)).or_insert_with(|| name.to_string());
                            }
                            None => warn!(row = %row.row_key, "scope index row has no resource name"),
                        }
                    }
                }
                Err(err) => failures.push(err),
            }
        }
        if !failures.is_empty() {
            for err in &failures {
                warn!(error = %err, "scope index query failed");
            }
            return Err(RepoError::Partial {
                operation: "find resources by scope",
                total,
                failures,
            });
        }
        debug!(scopes = total, resources = names.len(), "scope index lookup");
        self.resources.find_by_keys(names.values()).await
    }

    /// Delete the resource, its index rows and rewrite the snapshot.
    ///
    /// Returns whether the resource object existed.
    pub async fn remove(&self, name: &str) -> RepoResult<bool> {
        let row_key = KeyHasher::hash(name);
        let rows = self
            .tables
            .query_all(
                &self.scope_table,
                &TableFilter::new().and_eq(ROW_KEY, row_key.as_str()),
                None,
            )
            .await?;
        let deletes: Vec<SubOp<'_>> = rows
            .iter()
            .map(|row| {
                self.tables
                    .delete(&self.scope_table, &row.partition_key, &row.row_key)
                    .map(|r| r.map(drop))
                    .boxed()
            })
            .collect();
        let unindexed = join_reporting("unindex resource", deletes).await;
        let existed = self.resources.remove(name).await?;
        merge_partial("remove api resource", [unindexed]).map(|()| existed)
    }
}

/// Fold fan-out results into one error naming the whole operation.
fn merge_partial<const N: usize>(operation: &'static str, results: [RepoResult<()>; N]) -> RepoResult<()> {
    let mut total = 0;
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(()) => {}
            Err(RepoError::Partial {
                total: t,
                failures: f,
                ..
            }) => {
                total += t;
                failures.extend(f);
            }
            Err(other) => return Err(other),
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(RepoError::Partial {
            operation,
            total,
            failures,
        })
    }
}

#[async_trait]
impl SnapshotRefresh for ApiResourceStore {
    fn target(&self) -> &str {
        self.resources.target()
    }

    async fn refresh_snapshot(&self) -> RepoResult<RefreshReport> {
        self.resources.refresh().await
    }
}

impl std::fmt::Debug for ApiResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiResourceStore")
            .field("resources", &self.resources)
            .field("scope_table", &self.scope_table)
            .finish()
    }
}

/// Every resource kind, as returned by `IdVault::all_resources`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resources {
    pub identity_resources: Vec<IdentityResource>,
    pub api_resources: Vec<ApiResource>,
    pub api_scopes: Vec<ApiScope>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use idvault_store::{InMemoryObjectStore, InMemoryTableStore};

    async fn store() -> (Arc<InMemoryTableStore>, ApiResourceStore) {
        let tables = Arc::new(InMemoryTableStore::new());
        let resources = ApiResourceStore::new(
            Arc::new(InMemoryObjectStore::new()),
            tables.clone(),
            &CachedContainerConfig::new("apiresources"),
            "scopes",
        );
        resources.ensure_containers().await.unwrap();
        (tables, resources)
    }

    fn names(mut resources: Vec<ApiResource>) -> Vec<String> {
        resources.sort_by(|a, b| a.name.cmp(&b.name));
        resources.into_iter().map(|r| r.name).collect()
    }

    #[tokio::test]
    async fn scopes_find_their_resource() {
        let (_, store) = store().await;
        store
            .store(ApiResource::new("orders").with_scopes(["orders.read", "orders.write"]))
            .await
            .unwrap();

        assert_eq!(names(store.find_by_scopes(["orders.read"]).await.unwrap()), vec!["orders"]);
        assert_eq!(names(store.find_by_scopes(["ORDERS.WRITE"]).await.unwrap()), vec!["orders"]);
        assert_eq!(
            names(store.find_by_scopes(["orders.read", "orders.write"]).await.unwrap()),
            vec!["orders"]
        );
        assert!(store.find_by_scopes(["billing"]).await.unwrap().is_empty());

        assert!(store.remove("orders").await.unwrap());
        assert!(store.find_by_scopes(["orders.read"]).await.unwrap().is_empty());
        assert!(store.find_by_scopes(["orders.write"]).await.unwrap().is_empty());
        assert!(store.find_by_name("orders").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rewrite_drops_old_scopes() {
        let (tables, store) = store().await;
        store
            .store(ApiResource::new("orders").with_scopes(["a", "b"]))
            .await
            .unwrap();
        store
            .store(ApiResource::new("orders").with_scopes(["b", "c"]))
            .await
            .unwrap();

        assert_eq!(tables.row_count("scopes"), 2);
        assert!(store.find_by_scopes(["a"]).await.unwrap().is_empty());
        assert_eq!(names(store.find_by_scopes(["c"]).await.unwrap()), vec!["orders"]);
        assert_eq!(names(store.find_all().await.unwrap()), vec!["orders"]);
    }

    #[tokio::test]
    async fn shared_scope_unions_resources() {
        let (_, store) = store().await;
        store.store(ApiResource::new("a").with_scopes(["shared", "x"])).await.unwrap();
        store.store(ApiResource::new("b").with_scopes(["shared"])).await.unwrap();
        assert_eq!(names(store.find_by_scopes(["shared", "x"]).await.unwrap()), vec!["a", "b"]);
        assert_eq!(names(store.find_by_names(["b", "missing"]).await.unwrap()), vec!["b"]);
    }

    #[tokio::test]
    async fn stale_index_rows_are_ignored() {
        let (tables, store) = store().await;
        tables.upsert("scopes", scope_row("ghost", "s")).await.unwrap();
        assert!(store.find_by_scopes(["s"]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_index_write_is_partial_but_resource_is_stored() {
        let (tables, store) = store().await;
        tables.inject_fault(HashedKey::of("orders").as_str());
        let err = store
            .store(ApiResource::new("orders").with_scopes(["a", "b"]))
            .await
            .unwrap_err();
        match err {
            RepoError::Partial { operation, failures, .. } => {
                assert_eq!(operation, "store api resource");
                assert_eq!(failures.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.find_by_name("orders").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn query_failure_is_reported() {
        let (tables, store) = store().await;
        tables.fail_queries(true);
        assert!(matches!(
            store.find_by_scopes(["a"]).await,
            Err(RepoError::Partial { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_resource_touches_nothing() {
        let (tables, store) = store().await;
        let err = store
            .store(ApiResource::new("orders").with_scopes(["a", "A"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
        assert_eq!(tables.row_count("scopes"), 0);
    }
}
