use std::collections::HashSet;
use std::marker::PhantomData;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{instrument, warn};

use crate::error::{KvError, Result};
use crate::namespace::Namespace;
use crate::records::StoredRecord;

/// Typed record CRUD over a Redis-backed store (spec §4.1).
///
/// Cheaply cloneable: `ConnectionManager` is itself a handle around a
/// multiplexed connection, so a single `KvStore` can be shared across every
/// component that reads/writes records.
#[derive(Clone)]
pub struct KvStore {
    conn: ConnectionManager,
    namespace: Namespace,
}

impl KvStore {
    pub async fn connect(url: &str, namespace: Namespace) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn, namespace })
    }

    #[cfg(test)]
    pub(crate) fn from_manager(conn: ConnectionManager, namespace: Namespace) -> Self {
        Self { conn, namespace }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn rec_key(&self, tag: &str, pk: &str) -> String {
        format!("{}:rec:{}:{}", self.namespace, tag, pk)
    }

    fn all_key(&self, tag: &str) -> String {
        format!("{}:all:{}", self.namespace, tag)
    }

    fn seq_key(&self, tag: &str) -> String {
        format!("{}:seq:{}", self.namespace, tag)
    }

    fn idx_key(&self, tag: &str, field: &str, value: &str) -> String {
        format!("{}:idx:{}:{}:{}", self.namespace, tag, field, value)
    }

    fn uniq_key(&self, tag: &str, value: &str) -> String {
        format!("{}:uniq:{}:{}", self.namespace, tag, value)
    }

    fn sorted_key(&self, tag: &str, field: &str, scope: Option<&str>) -> String {
        match scope {
            Some(s) => format!("{}:sorted:{}:{}:{}", self.namespace, tag, field, s),
            None => format!("{}:sorted:{}:{}", self.namespace, tag, field),
        }
    }

    fn push_create_cmds<T: StoredRecord>(&self, pipe: &mut redis::Pipeline, record: &T) -> Result<()> {
        let tag = T::TYPE_TAG;
        let pk = record.key();
        let json = serde_json::to_string(record)?;

        pipe.hset(self.rec_key(tag, &pk), "data", json).ignore();
        pipe.sadd(self.all_key(tag), &pk).ignore();

        for field in T::INDEXED_FIELDS {
            if let Some(value) = record.field_str(field) {
                pipe.sadd(self.idx_key(tag, field, &value), &pk).ignore();
            }
        }

        for (field, scope) in T::SORTED_FIELDS {
            if let Some(score) = record.sort_score(field) {
                let scope_value = scope.and_then(|s| record.field_str(s));
                let key = self.sorted_key(tag, field, scope_value.as_deref());
                pipe.zadd(key, &pk, score).ignore();
            }
        }

        if let Some(uniq) = record.unique_key() {
            pipe.set(self.uniq_key(tag, &uniq), &pk).ignore();
        }

        Ok(())
    }

    fn push_delete_cmds<T: StoredRecord>(&self, pipe: &mut redis::Pipeline, record: &T) {
        let tag = T::TYPE_TAG;
        let pk = record.key();

        pipe.del(self.rec_key(tag, &pk)).ignore();
        pipe.srem(self.all_key(tag), &pk).ignore();

        for field in T::INDEXED_FIELDS {
            if let Some(value) = record.field_str(field) {
                pipe.srem(self.idx_key(tag, field, &value), &pk).ignore();
            }
        }

        for (field, scope) in T::SORTED_FIELDS {
            let scope_value = scope.and_then(|s| record.field_str(s));
            let key = self.sorted_key(tag, field, scope_value.as_deref());
            pipe.zrem(key, &pk).ignore();
        }

        if let Some(uniq) = record.unique_key() {
            pipe.del(self.uniq_key(tag, &uniq)).ignore();
        }
    }

    /// Allocates auto keys; fails with `Duplicate` if a uniqueness
    /// constraint is violated (spec §4.1 Create).
    #[instrument(skip(self, record), fields(type_tag = T::TYPE_TAG))]
    pub async fn create<T: StoredRecord>(&self, mut record: T) -> Result<T> {
        let tag = T::TYPE_TAG;
        let mut conn = self.conn.clone();

        if T::AUTO_KEY {
            let next: i64 = conn.incr(self.seq_key(tag), 1).await?;
            record.set_key(next.to_string());
        } else {
            let pk = record.key();
            let exists: bool = conn.exists(self.rec_key(tag, &pk)).await?;
            if exists {
                return Err(KvError::Duplicate { kind: tag, key: pk });
            }
        }

        if let Some(uniq) = record.unique_key() {
            let exists: bool = conn.exists(self.uniq_key(tag, &uniq)).await?;
            if exists {
                return Err(KvError::Duplicate { kind: tag, key: uniq });
            }
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        self.push_create_cmds(&mut pipe, &record)?;
        let _: () = pipe.query_async(&mut conn).await?;

        Ok(record)
    }

    /// Exact lookup by primary key (spec §4.1 Get).
    #[instrument(skip(self), fields(type_tag = T::TYPE_TAG))]
    pub async fn get<T: StoredRecord>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(self.rec_key(T::TYPE_TAG, key), "data").await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Removes all index entries; idempotent (spec §4.1 Delete).
    #[instrument(skip(self, record), fields(type_tag = T::TYPE_TAG))]
    pub async fn delete<T: StoredRecord>(&self, record: &T) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        self.push_delete_cmds(&mut pipe, record);
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    /// Overwrites a record's data blob and sorted-field scores in place.
    /// Only valid when none of `T::INDEXED_FIELDS` changed value — callers
    /// mutating a key-typed field (e.g. `AgentSession::status`) MUST use
    /// `transition` instead, never this method.
    #[instrument(skip(self, record), fields(type_tag = T::TYPE_TAG))]
    pub async fn update<T: StoredRecord>(&self, record: &T) -> Result<()> {
        let mut conn = self.conn.clone();
        let tag = T::TYPE_TAG;
        let pk = record.key();
        let json = serde_json::to_string(record)?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hset(self.rec_key(tag, &pk), "data", json).ignore();
        for (field, scope) in T::SORTED_FIELDS {
            if let Some(score) = record.sort_score(field) {
                let scope_value = scope.and_then(|s| record.field_str(s));
                let key = self.sorted_key(tag, field, scope_value.as_deref());
                pipe.zadd(key, &pk, score).ignore();
            }
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    /// Atomic delete-then-create, preserving non-key fields, for records
    /// whose key fields (e.g. `AgentSession::status`) must change (spec §3,
    /// §9 key-field mutation anomaly, §5 locking discipline). Both halves
    /// run in a single Redis transaction so no reader observes a state
    /// where the record is absent.
    #[instrument(skip(self, old, new), fields(type_tag = T::TYPE_TAG))]
    pub async fn transition<T: StoredRecord>(&self, old: &T, new: T) -> Result<T> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        self.push_delete_cmds(&mut pipe, old);
        self.push_create_cmds(&mut pipe, &new)?;
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(new)
    }

    /// Deletes every `T` whose `sorted_field` score is below `cutoff`
    /// (spec §3 Bridge event: "subject to age-based cleanup", grounded in
    /// `original_source/models/bridge_event.py`'s `cleanup_old`). Not
    /// scoped to any particular type — any record with a sorted field
    /// works, though today only `BridgeEvent` uses it.
    #[instrument(skip(self), fields(type_tag = T::TYPE_TAG))]
    pub async fn delete_older_than<T: StoredRecord>(&self, sorted_field: &'static str, cutoff: f64) -> Result<usize> {
        let stale = self.query::<T>().range(sorted_field, f64::NEG_INFINITY, cutoff)?.all().await?;
        let count = stale.len();
        for record in &stale {
            self.delete(record).await?;
        }
        Ok(count)
    }

    pub fn query<T: StoredRecord>(&self) -> QueryBuilder<'_, T> {
        QueryBuilder {
            store: self,
            filters: Vec::new(),
            range: None,
            limit: None,
            descending: false,
            _marker: PhantomData,
        }
    }

    /// Deletes every record under this namespace. Scoped to the namespace
    /// prefix only — production data is untouched (spec §4.1).
    #[instrument(skip(self))]
    pub async fn flush_namespace(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}:*", self.namespace);
        let mut cursor: u64 = 0;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await?;
            if !keys.is_empty() {
                let _: () = conn.del(keys).await?;
            }
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        Ok(())
    }
}

/// Builder for `Query(type).Filter(...).Range(...).All()` (spec §4.1).
pub struct QueryBuilder<'a, T: StoredRecord> {
    store: &'a KvStore,
    filters: Vec<(&'static str, String)>,
    range: Option<(&'static str, f64, f64)>,
    limit: Option<usize>,
    descending: bool,
    _marker: PhantomData<T>,
}

impl<'a, T: StoredRecord> QueryBuilder<'a, T> {
    pub fn filter(mut self, field: &'static str, value: impl Into<String>) -> Result<Self> {
        if !T::INDEXED_FIELDS.contains(&field) {
            return Err(KvError::UnknownField {
                kind: T::TYPE_TAG,
                field: field.to_string(),
            });
        }
        self.filters.push((field, value.into()));
        Ok(self)
    }

    pub fn range(mut self, field: &'static str, lo: f64, hi: f64) -> Result<Self> {
        if !T::SORTED_FIELDS.iter().any(|(f, _)| *f == field) {
            return Err(KvError::UnknownField {
                kind: T::TYPE_TAG,
                field: field.to_string(),
            });
        }
        self.range = Some((field, lo, hi));
        Ok(self)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn descending(mut self, descending: bool) -> Self {
        self.descending = descending;
        self
    }

    /// Returns records matching all constraints (spec §4.1 `.All()`).
    pub async fn all(self) -> Result<Vec<T>> {
        let tag = T::TYPE_TAG;
        let mut conn = self.store.conn.clone();

        let mut candidate_pks: Vec<String> = if let Some((field, lo, hi)) = self.range {
            let scope = T::SORTED_FIELDS
                .iter()
                .find(|(f, _)| *f == field)
                .and_then(|(_, s)| *s);
            let scope_value = scope.and_then(|sf| {
                self.filters
                    .iter()
                    .find(|(f, _)| *f == sf)
                    .map(|(_, v)| v.clone())
            });
            let key = self.store.sorted_key(tag, field, scope_value.as_deref());
            if self.descending {
                conn.zrevrangebyscore(key, hi, lo).await?
            } else {
                conn.zrangebyscore(key, lo, hi).await?
            }
        } else if !self.filters.is_empty() {
            let mut sets: Vec<HashSet<String>> = Vec::with_capacity(self.filters.len());
            for (field, value) in &self.filters {
                let key = self.store.idx_key(tag, field, value);
                let members: Vec<String> = conn.smembers(key).await?;
                sets.push(members.into_iter().collect());
            }
            let mut iter = sets.into_iter();
            let mut acc = iter.next().unwrap_or_default();
            for set in iter {
                acc = acc.intersection(&set).cloned().collect();
            }
            let mut v: Vec<String> = acc.into_iter().collect();
            v.sort();
            v
        } else {
            let mut members: Vec<String> = conn.smembers(self.store.all_key(tag)).await?;
            members.sort();
            members
        };

        // Any filter on a scope field has already narrowed the sorted-set
        // key; remaining filters (or none) still need an in-process check
        // against the fetched record in case a filter targets a field the
        // range path didn't consult.
        if let Some(limit) = self.limit {
            candidate_pks.truncate(limit);
        }

        let mut out = Vec::with_capacity(candidate_pks.len());
        for pk in &candidate_pks {
            let raw: Option<String> = conn.hget(self.store.rec_key(tag, pk), "data").await?;
            let Some(json) = raw else {
                warn!(pk, type_tag = tag, "index referenced missing record, skipping");
                continue;
            };
            let record: T = serde_json::from_str(&json)?;
            if self
                .filters
                .iter()
                .all(|(field, value)| record.field_str(field).as_deref() == Some(value.as_str()))
            {
                out.push(record);
            }
        }

        Ok(out)
    }
}
