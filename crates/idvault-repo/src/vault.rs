use std::sync::Arc;

use idvault_store::{ObjectStore, TableStore};
use idvault_types::{ApiResource, ApiScope, Client, DeviceFlowCode, IdentityResource, SigningKeyRecord};
use tracing::info;

use crate::config::{
    StorageConfig, DEFAULT_API_SCOPE_CACHE, DEFAULT_CLIENT_CACHE, DEFAULT_DEVICE_CODE_CACHE,
    DEFAULT_IDENTITY_RESOURCE_CACHE, DEFAULT_SIGNING_KEY_CACHE,
};
use crate::error::RepoResult;
use crate::grants::PersistedGrantStore;
use crate::repository::{EntityRepository, SnapshotRefresh};
use crate::resources::{ApiResourceStore, Resources};

/// Every repository, wired over one object store and one table store.
///
/// Repositories are shared behind `Arc` so background loops can hold them.
#[derive(Debug)]
pub struct IdVault {
    clients: Arc<EntityRepository<Client>>,
    api_resources: Arc<ApiResourceStore>,
    api_scopes: Arc<EntityRepository<ApiScope>>,
    identity_resources: Arc<EntityRepository<IdentityResource>>,
    grants: Arc<PersistedGrantStore>,
    device_codes: Arc<EntityRepository<DeviceFlowCode>>,
    signing_keys: Arc<EntityRepository<SigningKeyRecord>>,
}

impl IdVault {
    /// Validate `config` and build every repository. Nothing is created in
    /// storage until [`ensure_containers_exist`](Self::ensure_containers_exist).
    pub fn new(
        config: &StorageConfig,
        objects: Arc<dyn ObjectStore>,
        tables: Arc<dyn TableStore>,
    ) -> RepoResult<Self> {
        config.validate()?;
        Ok(Self {
            clients: Arc::new(EntityRepository::new(
                objects.clone(),
                &config.clients,
                DEFAULT_CLIENT_CACHE,
            )),
            api_resources: Arc::new(ApiResourceStore::new(
                objects.clone(),
                tables.clone(),
                &config.api_resources,
                config.api_resource_scope_table.clone(),
            )),
            api_scopes: Arc::new(EntityRepository::new(
                objects.clone(),
                &config.api_scopes,
                DEFAULT_API_SCOPE_CACHE,
            )),
            identity_resources: Arc::new(EntityRepository::new(
                objects.clone(),
                &config.identity_resources,
                DEFAULT_IDENTITY_RESOURCE_CACHE,
            )),
            grants: Arc::new(PersistedGrantStore::new(
                objects.clone(),
                tables,
                &config.persisted_grants,
            )),
            device_codes: Arc::new(EntityRepository::new(
                objects.clone(),
                &config.device_codes,
                DEFAULT_DEVICE_CODE_CACHE,
            )),
            signing_keys: Arc::new(EntityRepository::new(
                objects,
                &config.signing_keys,
                DEFAULT_SIGNING_KEY_CACHE,
            )),
        })
    }

    /// Create every container and table. Idempotent; call once at startup.
    pub async fn ensure_containers_exist(&self) -> RepoResult<()> {
        self.clients.ensure_containers().await?;
        self.api_resources.ensure_containers().await?;
        self.api_scopes.ensure_containers().await?;
        self.identity_resources.ensure_containers().await?;
        self.grants.ensure_containers().await?;
        self.device_codes.ensure_containers().await?;
        self.signing_keys.ensure_containers().await?;
        info!("storage containers ready");
        Ok(())
    }

    pub fn clients(&self) -> &Arc<EntityRepository<Client>> {
        &self.clients
    }

    pub fn api_resources(&self) -> &Arc<ApiResourceStore> {
        &self.api_resources
    }

    pub fn api_scopes(&self) -> &Arc<EntityRepository<ApiScope>> {
        &self.api_scopes
    }

    pub fn identity_resources(&self) -> &Arc<EntityRepository<IdentityResource>> {
        &self.identity_resources
    }

    pub fn grants(&self) -> &Arc<PersistedGrantStore> {
        &self.grants
    }

    pub fn device_codes(&self) -> &Arc<EntityRepository<DeviceFlowCode>> {
        &self.device_codes
    }

    pub fn signing_keys(&self) -> &Arc<EntityRepository<SigningKeyRecord>> {
        &self.signing_keys
    }

    pub async fn find_api_resources_by_name<I, S>(&self, names: I) -> RepoResult<Vec<ApiResource>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.api_resources.find_by_names(names).await
    }

    pub async fn find_api_scopes_by_name<I, S>(&self, names: I) -> RepoResult<Vec<ApiScope>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.api_scopes.find_by_keys(names).await
    }

    /// Identity resources are named after the scope that requests them.
    pub async fn find_identity_resources_by_scope_name<I, S>(
        &self,
        scopes: I,
    ) -> RepoResult<Vec<IdentityResource>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.identity_resources.find_by_keys(scopes).await
    }

    pub async fn find_api_resources_by_scope_name<I, S>(&self, scopes: I) -> RepoResult<Vec<ApiResource>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.api_resources.find_by_scopes(scopes).await
    }

    /// All three resource collections, read concurrently.
    pub async fn all_resources(&self) -> RepoResult<Resources> {
        let (identity_resources, api_resources, api_scopes) = futures::try_join!(
            self.identity_resources.find_all(),
            self.api_resources.find_all(),
            self.api_scopes.find_all(),
        )?;
        Ok(Resources {
            identity_resources,
            api_resources,
            api_scopes,
        })
    }

    /// Every snapshot-cached repository, for the refresh loop.
    pub fn refresh_targets(&self) -> Vec<Arc<dyn SnapshotRefresh>> {
        vec![
            self.clients.clone() as Arc<dyn SnapshotRefresh>,
            self.api_resources.clone() as Arc<dyn SnapshotRefresh>,
            self.api_scopes.clone() as Arc<dyn SnapshotRefresh>,
            self.identity_resources.clone() as Arc<dyn SnapshotRefresh>,
            self.device_codes.clone() as Arc<dyn SnapshotRefresh>,
            self.signing_keys.clone() as Arc<dyn SnapshotRefresh>,
        ]
    }
}
