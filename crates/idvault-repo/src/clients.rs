use idvault_types::Client;
use tracing::debug;

use crate::error::RepoResult;
use crate::repository::EntityRepository;

impl EntityRepository<Client> {
    /// Whether any enabled client lists `origin` as an allowed CORS origin.
    ///
    /// Served from the snapshot, so a newly stored client may not be seen
    /// until its snapshot write lands.
    pub async fn is_origin_allowed(&self, origin: &str) -> RepoResult<bool> {
        let allowed = self
            .find_all()
            .await?
            .iter()
            .any(|client| client.enabled && client.allows_origin(origin));
        debug!(origin, allowed, "cors origin check");
        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use idvault_store::InMemoryObjectStore;

    use super::*;
    use crate::config::{CachedContainerConfig, DEFAULT_CLIENT_CACHE};

    #[tokio::test]
    async fn origins_of_enabled_clients_only() {
        let repo: EntityRepository<Client> = EntityRepository::new(
            Arc::new(InMemoryObjectStore::new()),
            &CachedContainerConfig::new("clients"),
            DEFAULT_CLIENT_CACHE,
        );
        repo.ensure_containers().await.unwrap();

        let mut spa = Client::new("spa");
        spa.allowed_cors_origins = vec!["https://app.example.com".into()];
        repo.store(spa).await.unwrap();

        let mut off = Client::new("off");
        off.enabled = false;
        off.allowed_cors_origins = vec!["https://old.example.com".into()];
        repo.store(off).await.unwrap();

        assert!(repo.is_origin_allowed("https://APP.example.com/").await.unwrap());
        assert!(!repo.is_origin_allowed("https://old.example.com").await.unwrap());
        assert!(!repo.is_origin_allowed("https://evil.example.com").await.unwrap());
    }
}
