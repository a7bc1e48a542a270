//! Entry point used by the presentation layer.
//!
//! [`Catalog`] resolves backend entries against the record cache, schedules
//! enrichment for anything missing or stale and returns records immediately.
//! Returned records may still be `CREATED` or `LOADING`; they fill in as the
//! workers finish.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, trace, warn};

use crate::backend::{DowngradeStream, PackageBackend};
use crate::context::CatalogContext;
use crate::error::CatalogError;
use crate::record::{PackageHandle, PackageRecord, PackageStatus, RawPackage};

/// Result of [`Catalog::downgrade`].
pub enum DowngradeOutcome {
    /// The backend accepted the downgrade; its output follows.
    Started(DowngradeStream),
    /// The current commit is already the oldest one in history.
    NotPossible,
}

impl std::fmt::Debug for DowngradeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DowngradeOutcome::Started(_) => f.write_str("Started(..)"),
            DowngradeOutcome::NotPossible => f.write_str("NotPossible"),
        }
    }
}

pub struct Catalog<B> {
    backend: B,
    ctx: Arc<CatalogContext>,
    /// Serialises `list_installed` against `refresh_catalog`. Distinct from the
    /// caches' own locks.
    refresh_lock: Mutex<()>,
}

impl<B: PackageBackend> Catalog<B> {
    pub fn new(backend: B, ctx: Arc<CatalogContext>) -> Self {
        Self {
            backend,
            ctx,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn context(&self) -> &Arc<CatalogContext> {
        &self.ctx
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Search the backend for `term`.
    ///
    /// Hits that are installed come back as the installed record (with its
    /// install flags) and are listed first; every other hit is resolved through
    /// the cache.
    pub fn search(&self, term: &str) -> Result<Vec<PackageHandle>, CatalogError> {
        let hits = self.backend.search(term)?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let installed = self.list_installed()?;
        let installed_by_id: HashMap<&str, &PackageHandle> =
            installed.iter().map(|r| (r.id(), r)).collect();

        let mut results = Vec::with_capacity(hits.len());
        let mut already_read = HashSet::new();

        for hit in &hits {
            if let Some(record) = installed_by_id.get(hit.id.as_str()) {
                if already_read.insert(hit.id.clone()) {
                    results.push(Arc::clone(record));
                }
            }
        }

        for hit in hits {
            if !already_read.contains(&hit.id) {
                results.push(self.resolve(hit));
            }
        }

        debug!(term, results = results.len(), "search resolved");
        Ok(results)
    }

    /// Installed packages, with install and update flags set, sorted by
    /// display name (case-insensitive).
    pub fn list_installed(&self) -> Result<Vec<PackageHandle>, CatalogError> {
        let _guard = lock(&self.refresh_lock);

        let installed = self.backend.list_installed()?;
        if installed.is_empty() {
            return Ok(Vec::new());
        }
        let updates = self.backend.list_available_update_ids()?;

        let mut records: Vec<PackageHandle> = installed
            .into_iter()
            .map(|raw| {
                let update_available = updates.contains(&raw.id);
                let record = self.resolve(raw);
                record.set_installed(true);
                record.set_update_available(update_available);
                record
            })
            .collect();

        records.sort_by_cached_key(|r| r.display_name().to_lowercase());
        Ok(records)
    }

    /// Pre-warm the catalog-data cache from the full catalog listing.
    ///
    /// Returns how many entries were stored.
    pub fn refresh_catalog(&self) -> Result<usize, CatalogError> {
        let _guard = lock(&self.refresh_lock);
        self.ctx.refresh_catalog_data()
    }

    /// Resolve one backend entry to a shared record.
    ///
    /// * not cached (or expired): a new record is created, filled from the
    ///   catalog-data cache when possible, otherwise queued for enrichment
    ///   (dependencies never are), then cached;
    /// * cached, `READY`, not installed and incomplete: the same record is
    ///   queued again;
    /// * otherwise the cached record is returned as is.
    pub fn resolve(&self, raw: RawPackage) -> PackageHandle {
        let records = self.ctx.records();

        if let Some(cached) = records.get(&raw.id) {
            if cached.status() == PackageStatus::Ready
                && !cached.is_installed()
                && cached.is_incomplete()
            {
                trace!(package_id = cached.id(), "re-enriching incomplete record");
                self.schedule(&cached);
            }
            return cached;
        }

        let record = PackageRecord::new_handle(raw);

        if let Some(data) = self.ctx.catalog_data().get(&record.id().to_owned()) {
            record.merge_enrichment(data);
            record.advance_status(PackageStatus::Ready);
        } else if !self.schedule(&record) {
            // Not cached, so the next read tries again.
            return record;
        }

        let expires_at = records.put(record.id().to_owned(), Arc::clone(&record));
        record.set_expires_at(expires_at);
        record
    }

    /// Downgrade the package to the commit preceding its current one.
    pub fn downgrade(
        &self,
        record: &PackageRecord,
        credential: &str,
    ) -> Result<DowngradeOutcome, CatalogError> {
        let source = record.source();
        let reference = required(record, source.reference.as_deref(), "ref")?;
        let origin = required(record, source.origin.as_deref(), "origin")?;
        let commit = required(record, source.commit.as_deref(), "commit")?;

        let history = self.backend.get_commit_history(reference, origin)?;
        let position = history
            .iter()
            .position(|c| c == commit)
            .ok_or_else(|| CatalogError::CommitNotFound {
                package_id: record.id().to_owned(),
                commit: commit.to_owned(),
            })?;

        match history.get(position + 1) {
            Some(older) => {
                info!(package_id = record.id(), from = commit, to = %older, "downgrading");
                let stream = self.backend.downgrade(reference, older, credential)?;
                Ok(DowngradeOutcome::Started(stream))
            }
            None => {
                info!(package_id = record.id(), commit, "already at the oldest commit");
                Ok(DowngradeOutcome::NotPossible)
            }
        }
    }

    /// Drop expired entries from both caches. Returns how many were evicted.
    pub fn evict_expired(&self) -> usize {
        self.ctx.records().evict_expired() + self.ctx.catalog_data().evict_expired()
    }

    /// Stop the workers and wait for their queues to drain.
    pub fn shutdown(&self) {
        self.ctx.pool().shutdown();
    }

    /// Queue `record` for enrichment unless it is a dependency or already queued.
    ///
    /// Returns `false` only when the pool refused the record.
    fn schedule(&self, record: &PackageHandle) -> bool {
        if record.is_dependency() || !record.try_mark_queued() {
            return true;
        }

        match self.ctx.pool().enqueue(Arc::clone(record)) {
            Ok(worker_id) => {
                trace!(package_id = record.id(), worker_id, "queued for enrichment");
                true
            }
            Err(e) => {
                record.clear_queued();
                warn!(
                    package_id = record.id(),
                    error = %e,
                    "could not queue package for enrichment"
                );
                false
            }
        }
    }
}

fn required<'a>(
    record: &PackageRecord,
    value: Option<&'a str>,
    field: &'static str,
) -> Result<&'a str, CatalogError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CatalogError::MissingField {
            package_id: record.id().to_owned(),
            field,
        })
}

fn lock(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
