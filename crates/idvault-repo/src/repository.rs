//! Generic cached CRUD over one object container.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use futures::{stream, StreamExt};
use idvault_cache::{SnapshotCache, SnapshotId};
use idvault_store::{decode, encode, ObjectStore};
use idvault_types::{Entity, HashedKey, KeyHasher};
use tracing::{debug, info, warn};

use crate::config::CachedContainerConfig;
use crate::error::{RepoError, RepoResult};

/// Concurrent object reads during a full listing.
const LISTING_CONCURRENCY: usize = 16;

/// Outcome of one forced snapshot refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshReport {
    pub snapshot: SnapshotId,
    pub entities: usize,
    pub pruned: usize,
}

/// Anything whose snapshot can be rebuilt from a full listing.
#[async_trait]
pub trait SnapshotRefresh: Send + Sync {
    /// Name used in logs.
    fn target(&self) -> &str;

    /// List the container, write a fresh snapshot and prune older ones.
    async fn refresh_snapshot(&self) -> RepoResult<RefreshReport>;
}

/// Cached CRUD for one entity kind.
///
/// Entities live at `hash(key)` in the object container. The latest snapshot
/// in the cache container serves `find_all`; a miss falls back to a full
/// listing and writes a fresh snapshot.
pub struct EntityRepository<T> {
    objects: Arc<dyn ObjectStore>,
    container: String,
    cache: SnapshotCache,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> EntityRepository<T> {
    pub fn new(objects: Arc<dyn ObjectStore>, config: &CachedContainerConfig, default_cache: &str) -> Self {
        let cache = SnapshotCache::new(objects.clone(), config.cache_container_or(default_cache));
        Self {
            objects,
            container: config.container.clone(),
            cache,
            _entity: PhantomData,
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Create the object and cache containers.
    pub async fn ensure_containers(&self) -> RepoResult<()> {
        self.objects.create_container(&self.container).await?;
        self.cache.ensure_container().await?;
        Ok(())
    }

    /// Every entity, from the latest snapshot when there is one.
    ///
    /// On a miss the container is listed and a new snapshot is written. A
    /// failed snapshot write is logged; the listing is still returned.
    pub async fn find_all(&self) -> RepoResult<Vec<T>> {
        if let Some(entities) = self.cache.get_latest::<T>().await {
            return Ok(entities);
        }
        let entities = self.load_all().await?;
        if let Err(err) = self.cache.rebuild(&entities).await {
            warn!(
                kind = %T::KIND,
                container = %self.cache.container(),
                error = %err,
                "snapshot rebuild failed after listing"
            );
        }
        Ok(entities)
    }

    /// List and decode every object in the container, bypassing the cache.
    ///
    /// Objects that fail to read or decode are logged and skipped. Only a
    /// failure to list the container is returned.
    pub async fn load_all(&self) -> RepoResult<Vec<T>> {
        let names = self.objects.list(&self.container).await?;
        let total = names.len();
        let entities: Vec<T> = stream::iter(names)
            .map(|name| async move {
                let loaded = self.load_object(&name).await;
                (name, loaded)
            })
            .buffered(LISTING_CONCURRENCY)
            .filter_map(|(name, loaded)| async move {
                match loaded {
                    Ok(entity) => entity,
                    Err(err) => {
                        warn!(
                            kind = %T::KIND,
                            container = %self.container,
                            object = %name,
                            error = %err,
                            "skipping unreadable object"
                        );
                        None
                    }
                }
            })
            .collect()
            .await;
        debug!(
            kind = %T::KIND,
            container = %self.container,
            listed = total,
            loaded = entities.len(),
            "full listing"
        );
        Ok(entities)
    }

    async fn load_object(&self, name: &str) -> RepoResult<Option<T>> {
        match self.objects.get(&self.container, name).await? {
            Some(data) => decode::<T>(&data).map(Some).map_err(|err| RepoError::Corrupt {
                kind: T::KIND,
                key: name.to_string(),
                reason: err.to_string(),
            }),
            // Deleted between list and get.
            None => Ok(None),
        }
    }

    /// Direct read of one entity. Absent is `Ok(None)`.
    pub async fn find_by_key(&self, key: &str) -> RepoResult<Option<T>> {
        self.load_object(KeyHasher::hash(key).as_str()).await
    }

    /// Concurrent direct reads. Absent keys are left out of the result.
    pub async fn find_by_keys<I, S>(&self, keys: I) -> RepoResult<Vec<T>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hashed: Vec<HashedKey> = keys.into_iter().map(|k| KeyHasher::hash(k.as_ref())).collect();
        hashed.sort();
        hashed.dedup();
        let results = join_all(hashed.iter().map(|h| self.load_object(h.as_str()))).await;
        let mut entities = Vec::with_capacity(results.len());
        for result in results {
            if let Some(entity) = result? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    /// Validate and write `entity`, then rewrite the snapshot with it.
    ///
    /// The object is written before the snapshot. A snapshot write failure is
    /// returned; the object write is not undone.
    pub async fn store(&self, entity: T) -> RepoResult<()> {
        entity.validate()?;
        let hashed = entity.hashed_key();
        self.objects
            .put(&self.container, hashed.as_str(), encode(&entity)?)
            .await?;
        debug!(kind = %T::KIND, key = %hashed.short_hex(), "stored");
        self.rewrite_snapshot(&hashed, Some(entity)).await
    }

    /// Delete the entity at `key` and rewrite the snapshot without it.
    ///
    /// Idempotent. Returns whether an object was deleted.
    pub async fn remove(&self, key: &str) -> RepoResult<bool> {
        let hashed = KeyHasher::hash(key);
        let existed = self.objects.delete(&self.container, hashed.as_str()).await?;
        debug!(kind = %T::KIND, key = %hashed.short_hex(), existed, "removed");
        self.rewrite_snapshot(&hashed, None).await?;
        Ok(existed)
    }

    /// Replace (or drop) the entity at `hashed` in the current working set
    /// and write it as a new snapshot.
    async fn rewrite_snapshot(&self, hashed: &HashedKey, entity: Option<T>) -> RepoResult<()> {
        let mut entities = match self.cache.get_latest::<T>().await {
            Some(entities) => entities,
            None => self.load_all().await?,
        };
        let position = entities.iter().position(|e| e.hashed_key() == *hashed);
        match (position, entity) {
            (Some(i), Some(entity)) => entities[i] = entity,
            (None, Some(entity)) => entities.push(entity),
            (Some(i), None) => {
                entities.remove(i);
            }
            (None, None) => {}
        }
        self.cache.rebuild(&entities).await?;
        Ok(())
    }

    /// Force a fresh snapshot from a full listing, then prune older ones.
    pub async fn refresh(&self) -> RepoResult<RefreshReport> {
        let entities = self.load_all().await?;
        let snapshot = self.cache.rebuild(&entities).await?;
        let pruned = self.cache.prune(&snapshot).await?;
        info!(
            kind = %T::KIND,
            container = %self.cache.container(),
            snapshot = %snapshot,
            entities = entities.len(),
            pruned,
            "snapshot refreshed"
        );
        Ok(RefreshReport {
            snapshot,
            entities: entities.len(),
            pruned,
        })
    }
}

#[async_trait]
impl<T: Entity> SnapshotRefresh for EntityRepository<T> {
    fn target(&self) -> &str {
        T::KIND.as_str()
    }

    async fn refresh_snapshot(&self) -> RepoResult<RefreshReport> {
        self.refresh().await
    }
}

impl<T: Entity> fmt::Debug for EntityRepository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRepository")
            .field("kind", &T::KIND)
            .field("container", &self.container)
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CLIENT_CACHE;
    use idvault_store::InMemoryObjectStore;
    use idvault_types::{Client, SigningKeyRecord};

    async fn clients() -> (Arc<InMemoryObjectStore>, EntityRepository<Client>) {
        let store = Arc::new(InMemoryObjectStore::new());
        let repo = EntityRepository::new(
            store.clone(),
            &CachedContainerConfig::new("clients"),
            DEFAULT_CLIENT_CACHE,
        );
        repo.ensure_containers().await.unwrap();
        (store, repo)
    }

    fn ids(mut clients: Vec<Client>) -> Vec<String> {
        clients.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        clients.into_iter().map(|c| c.client_id).collect()
    }

    #[tokio::test]
    async fn store_then_find_by_key() {
        let (_, repo) = clients().await;
        let mut client = Client::new("c1");
        client.client_name = Some("First".into());
        repo.store(client.clone()).await.unwrap();

        assert_eq!(repo.find_by_key("c1").await.unwrap(), Some(client.clone()));
        assert_eq!(repo.find_by_key("  C1 ").await.unwrap(), Some(client));
        assert_eq!(repo.find_by_key("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_entity_is_not_written() {
        let (store, repo) = clients().await;
        let err = repo.store(Client::new(" ")).await.unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
        assert_eq!(store.object_count("clients"), 0);
    }

    #[tokio::test]
    async fn client_cache_scenario() {
        let (_, repo) = clients().await;
        repo.store(Client::new("c1")).await.unwrap();

        let rebuilds = repo.cache().stats().rebuilds;
        assert_eq!(ids(repo.find_all().await.unwrap()), vec!["c1"]);
        assert_eq!(ids(repo.find_all().await.unwrap()), vec!["c1"]);
        assert_eq!(repo.cache().stats().rebuilds, rebuilds);

        repo.store(Client::new("c2")).await.unwrap();
        assert_eq!(ids(repo.find_all().await.unwrap()), vec!["c1", "c2"]);

        assert!(repo.remove("c1").await.unwrap());
        assert_eq!(repo.find_by_key("c1").await.unwrap(), None);
        assert_eq!(ids(repo.find_all().await.unwrap()), vec!["c2"]);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (_, repo) = clients().await;
        repo.store(Client::new("c1")).await.unwrap();
        assert!(repo.remove("c1").await.unwrap());
        assert!(!repo.remove("c1").await.unwrap());
        assert_eq!(repo.find_by_key("c1").await.unwrap(), None);
        assert!(repo.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_replaces_by_normalized_key() {
        let (_, repo) = clients().await;
        repo.store(Client::new("c1")).await.unwrap();
        let mut renamed = Client::new("C1");
        renamed.client_name = Some("Upper".into());
        repo.store(renamed).await.unwrap();

        let all = repo.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].client_name.as_deref(), Some("Upper"));
    }

    #[tokio::test]
    async fn miss_lists_and_rebuilds() {
        let (store, repo) = clients().await;
        store
            .put("clients", HashedKey::of("c9").as_str(), encode(&Client::new("c9")).unwrap())
            .await
            .unwrap();

        assert_eq!(ids(repo.find_all().await.unwrap()), vec!["c9"]);
        let stats = repo.cache().stats();
        assert_eq!((stats.misses, stats.rebuilds), (1, 1));

        repo.find_all().await.unwrap();
        assert_eq!(repo.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn corrupt_and_unreadable_objects_are_skipped() {
        let (store, repo) = clients().await;
        repo.store(Client::new("good")).await.unwrap();
        store.put("clients", "garbage", b"{not json".to_vec()).await.unwrap();
        let bad = HashedKey::of("bad");
        store
            .put("clients", bad.as_str(), encode(&Client::new("bad")).unwrap())
            .await
            .unwrap();
        store.inject_fault(bad.as_str());

        let loaded = repo.load_all().await.unwrap();
        assert_eq!(ids(loaded), vec!["good"]);
    }

    #[tokio::test]
    async fn list_failure_propagates() {
        let store = Arc::new(InMemoryObjectStore::new());
        let repo: EntityRepository<Client> = EntityRepository::new(
            store,
            &CachedContainerConfig::new("clients"),
            DEFAULT_CLIENT_CACHE,
        );
        assert!(matches!(repo.find_all().await, Err(RepoError::Store(_))));
    }

    #[tokio::test]
    async fn snapshot_write_failure_still_returns_listing() {
        // No cache container: every snapshot read misses and every write fails.
        let store = Arc::new(InMemoryObjectStore::new());
        store.create_container("clients").await.unwrap();
        store
            .put("clients", HashedKey::of("c1").as_str(), encode(&Client::new("c1")).unwrap())
            .await
            .unwrap();
        let repo: EntityRepository<Client> = EntityRepository::new(
            store,
            &CachedContainerConfig::new("clients"),
            DEFAULT_CLIENT_CACHE,
        );

        assert_eq!(ids(repo.find_all().await.unwrap()), vec!["c1"]);
        assert!(repo.store(Client::new("c2")).await.is_err());
        assert!(repo.find_by_key("c2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn find_by_keys_skips_missing_and_duplicates() {
        let (_, repo) = clients().await;
        repo.store(Client::new("a")).await.unwrap();
        repo.store(Client::new("b")).await.unwrap();
        let found = repo.find_by_keys(["a", "A ", "b", "zz"]).await.unwrap();
        assert_eq!(ids(found), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn refresh_rebuilds_and_prunes() {
        let store = Arc::new(InMemoryObjectStore::new());
        let repo: EntityRepository<SigningKeyRecord> = EntityRepository::new(
            store.clone(),
            &CachedContainerConfig::new("signingkeys"),
            "signingkeycache",
        );
        repo.ensure_containers().await.unwrap();
        for i in 0..3 {
            repo.store(SigningKeyRecord {
                id: format!("k{i}"),
                version: 1,
                created: chrono::Utc::now(),
                algorithm: "RS256".into(),
                is_x509_certificate: false,
                data: "pem".into(),
                data_protected: false,
            })
            .await
            .unwrap();
        }
        assert_eq!(store.object_count("signingkeycache"), 3);

        let report = repo.refresh_snapshot().await.unwrap();
        assert_eq!(report.entities, 3);
        assert_eq!(report.pruned, 3);
        assert_eq!(store.object_count("signingkeycache"), 1);
        assert_eq!(repo.cache().latest_id().await.unwrap(), Some(report.snapshot));
        assert_eq!(repo.target(), "signing-key");
    }
}
