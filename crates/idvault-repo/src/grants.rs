//! Persisted grants, dual-indexed by key and by subject.
//!
//! Every grant is three artifacts:
//!
//! ```text
//! table  (hash(key),     hash(key))  Index = "key"      metadata fields
//! table  (hash(subject), hash(key))  Index = "subject"  metadata fields
//! object container/hash(key)                            grant data body
//! ```
//!
//! The three writes of `store` and the three deletes of a removal are
//! issued concurrently and are not transactional. A failed write leaves the
//! artifact stale until the next `store` of the same key.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use idvault_store::{ObjectStore, TableFilter, TableRow, TableStore};
use idvault_types::{Entity, EntityKind, GrantFilter, HashedKey, KeyHasher, PersistedGrant};
use tracing::{debug, info, warn};

use crate::config::ContainerConfig;
use crate::error::{RepoError, RepoResult};
use crate::fanout::{join_reporting, SubOp};

const KEY: &str = "Key";
const TYPE: &str = "Type";
const SUBJECT_ID: &str = "SubjectId";
const SESSION_ID: &str = "SessionId";
const CLIENT_ID: &str = "ClientId";
const DESCRIPTION: &str = "Description";
const CREATION_TIME: &str = "CreationTime";
const EXPIRATION: &str = "Expiration";
const CONSUMED_TIME: &str = "ConsumedTime";
/// Which of the two index rows this is.
const INDEX: &str = "Index";
const BY_KEY: &str = "key";
const BY_SUBJECT: &str = "subject";

fn index_row(grant: &PersistedGrant, partition: &HashedKey, row: &HashedKey, index: &str) -> TableRow {
    TableRow::new(partition.as_str(), row.as_str())
        .with(INDEX, index)
        .with(KEY, grant.key.as_str())
        .with(TYPE, grant.grant_type.as_str())
        .with(SUBJECT_ID, grant.subject_id.as_str())
        .with_opt(SESSION_ID, grant.session_id.as_deref())
        .with(CLIENT_ID, grant.client_id.as_str())
        .with_opt(DESCRIPTION, grant.description.as_deref())
        .with(CREATION_TIME, grant.creation_time)
        .with_opt(EXPIRATION, grant.expiration)
        .with_opt(CONSUMED_TIME, grant.consumed_time)
}

/// Rebuild a grant's metadata from an index row. `data` is left empty.
fn grant_from_row(row: &TableRow) -> RepoResult<PersistedGrant> {
    let missing = |field: &str| RepoError::Corrupt {
        kind: EntityKind::PersistedGrant,
        key: row.row_key.clone(),
        reason: format!("index row has no {field}"),
    };
    let text = |field: &'static str| row.get_str(field).map(str::to_string).ok_or_else(|| missing(field));
    Ok(PersistedGrant {
        key: text(KEY)?,
        grant_type: text(TYPE)?,
        subject_id: row.get_str(SUBJECT_ID).unwrap_or_default().to_string(),
        session_id: row.get_str(SESSION_ID).map(str::to_string),
        client_id: text(CLIENT_ID)?,
        description: row.get_str(DESCRIPTION).map(str::to_string),
        creation_time: row
            .get_datetime(CREATION_TIME)
            .ok_or_else(|| missing(CREATION_TIME))?,
        expiration: row.get_datetime(EXPIRATION),
        consumed_time: row.get_datetime(CONSUMED_TIME),
        data: String::new(),
    })
}

/// Grant storage over an object container and an index table.
pub struct PersistedGrantStore {
    objects: Arc<dyn ObjectStore>,
    tables: Arc<dyn TableStore>,
    container: String,
    table: String,
}

impl PersistedGrantStore {
    pub fn new(objects: Arc<dyn ObjectStore>, tables: Arc<dyn TableStore>, config: &ContainerConfig) -> Self {
        Self {
            objects,
            tables,
            container: config.container.clone(),
            table: config.table.clone(),
        }
    }

    pub async fn ensure_containers(&self) -> RepoResult<()> {
        self.objects.create_container(&self.container).await?;
        self.tables.create_table(&self.table).await?;
        Ok(())
    }

    /// Write both index rows and the payload concurrently.
    ///
    /// Returns [`RepoError::Partial`] if any of the three writes failed.
    pub async fn store(&self, grant: &PersistedGrant) -> RepoResult<()> {
        grant.validate()?;
        let key = grant.hashed_key();
        let subject = KeyHasher::hash(&grant.subject_id);
        let ops: Vec<SubOp<'_>> = vec![
            self.tables
                .upsert(&self.table, index_row(grant, &key, &key, BY_KEY)),
            self.tables
                .upsert(&self.table, index_row(grant, &subject, &key, BY_SUBJECT)),
            self.objects
                .put(&self.container, key.as_str(), grant.data.clone().into_bytes()),
        ];
        join_reporting("store grant", ops).await?;
        debug!(key = %key.short_hex(), subject = %subject.short_hex(), "grant stored");
        Ok(())
    }

    /// Grant by key, with its payload.
    ///
    /// A key row whose payload object is missing is treated as absent.
    pub async fn find_by_key(&self, key: &str) -> RepoResult<Option<PersistedGrant>> {
        let hashed = KeyHasher::hash(key);
        match self.tables.get(&self.table, hashed.as_str(), hashed.as_str()).await? {
            Some(row) => self.with_payload(row).await,
            None => Ok(None),
        }
    }

    async fn with_payload(&self, row: TableRow) -> RepoResult<Option<PersistedGrant>> {
        let mut grant = grant_from_row(&row)?;
        let Some(payload) = self.objects.get(&self.container, &row.row_key).await? else {
            warn!(key = %row.row_key, "grant payload missing, ignoring index row");
            return Ok(None);
        };
        grant.data = String::from_utf8(payload).map_err(|err| RepoError::Corrupt {
            kind: EntityKind::PersistedGrant,
            key: row.row_key.clone(),
            reason: err.to_string(),
        })?;
        Ok(Some(grant))
    }

    fn subject_filter(filter: &GrantFilter) -> TableFilter {
        let mut query = TableFilter::partition(KeyHasher::hash(&filter.subject_id).as_str())
            .and_eq(INDEX, BY_SUBJECT);
        if let Some(client) = filter.client() {
            query = query.and_eq(CLIENT_ID, client);
        }
        if let Some(grant_type) = filter.grant_type() {
            query = query.and_eq(TYPE, grant_type);
        }
        if let Some(session) = filter.session() {
            query = query.and_eq(SESSION_ID, session);
        }
        query
    }

    async fn subject_rows(&self, filter: &GrantFilter) -> RepoResult<Vec<TableRow>> {
        let query = Self::subject_filter(filter);
        let rows = self.tables.query_all(&self.table, &query, None).await?;
        debug!(filter = %query, matched = rows.len(), "grant query");
        Ok(rows)
    }

    /// Grants of a subject, narrowed by the filter's optional predicates.
    pub async fn find_by_filter(&self, filter: &GrantFilter) -> RepoResult<Vec<PersistedGrant>> {
        let rows = self.subject_rows(filter).await?;
        join_all(rows.into_iter().map(|row| self.with_payload(row)))
            .await
            .into_iter()
            .filter_map(Result::transpose)
            .collect()
    }

    /// Remove every grant matching `filter`.
    ///
    /// Deletes are best-effort: failures are logged and the remaining grants
    /// are still removed. Returns the number of grants fully removed.
    pub async fn remove_by_filter(&self, filter: &GrantFilter) -> RepoResult<usize> {
        let rows = self.subject_rows(filter).await?;
        let matched = rows.len();
        let removed = join_all(
            rows.iter()
                .map(|row| self.delete_artifacts(&row.row_key, &row.partition_key)),
        )
        .await
        .into_iter()
        .filter(Result::is_ok)
        .count();
        if removed < matched {
            warn!(subject = %filter.subject_id, matched, removed, "some grants were not fully removed");
        } else {
            debug!(subject = %filter.subject_id, removed, "grants removed");
        }
        Ok(removed)
    }

    /// Remove one grant. Returns `false` if no key row exists.
    pub async fn remove_by_key(&self, key: &str) -> RepoResult<bool> {
        let hashed = KeyHasher::hash(key);
        let Some(row) = self.tables.get(&self.table, hashed.as_str(), hashed.as_str()).await? else {
            return Ok(false);
        };
        let subject = KeyHasher::hash(row.get_str(SUBJECT_ID).unwrap_or_default());
        self.delete_artifacts(hashed.as_str(), subject.as_str()).await?;
        Ok(true)
    }

    async fn delete_artifacts(&self, key: &str, subject: &str) -> RepoResult<()> {
        let ops: Vec<SubOp<'_>> = vec![
            self.tables.delete(&self.table, key, key).map(|r| r.map(drop)).boxed(),
            self.tables.delete(&self.table, subject, key).map(|r| r.map(drop)).boxed(),
            self.objects.delete(&self.container, key).map(|r| r.map(drop)).boxed(),
        ];
        join_reporting("remove grant", ops).await
    }

    /// Up to `max_results` grants whose expiration has passed.
    ///
    /// Only index rows are read, so `data` is empty in the results. Rows
    /// that cannot be decoded are logged and skipped.
    pub async fn get_expired(&self, max_results: usize) -> RepoResult<Vec<PersistedGrant>> {
        self.get_expired_before(Utc::now(), max_results).await
    }

    pub async fn get_expired_before(
        &self,
        now: DateTime<Utc>,
        max_results: usize,
    ) -> RepoResult<Vec<PersistedGrant>> {
        let query = TableFilter::new()
            .and_eq(INDEX, BY_KEY)
            .and_before(EXPIRATION, now);
        let rows = self
            .tables
            .query_all(&self.table, &query, Some(max_results))
            .await?;
        let grants = rows
            .iter()
            .filter_map(|row| match grant_from_row(row) {
                Ok(grant) => Some(grant),
                Err(err) => {
                    warn!(row = %row.row_key, error = %err, "skipping unreadable grant row");
                    None
                }
            })
            .collect::<Vec<_>>();
        if !grants.is_empty() {
            info!(count = grants.len(), max_results, "found expired grants");
        }
        Ok(grants)
    }
}

impl std::fmt::Debug for PersistedGrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedGrantStore")
            .field("container", &self.container)
            .field("table", &self.table)
            .finish()
    }
}
