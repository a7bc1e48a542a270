//! The enrichable package entity.
//!
//! A [`PackageRecord`] is shared between the catalog (which hands it to
//! callers) and the one worker it is queued to (which fills in catalog data).
//! Fields are split into groups with a single writer each:
//!
//! * `enrichment` – written only by the enrichment worker,
//! * `installed` / `update_available` – written only by the catalog,
//! * `status` – advanced by the worker, never moved backwards.
//!
//! Readers may observe any status and any subset of merged fields; a record in
//! [`PackageStatus::Loading`] is incomplete but displayable.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Shared handle to a record. Cloning shares the same underlying record.
pub type PackageHandle = Arc<PackageRecord>;

/// Lifecycle of a record. Ordered: `Created < Loading < Ready`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    AsRefStr,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum PackageStatus {
    Created = 0,
    Loading = 1,
    Ready = 2,
}

impl PackageStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => PackageStatus::Created,
            1 => PackageStatus::Loading,
            _ => PackageStatus::Ready,
        }
    }
}

/// A package entry as reported by the local package backend.
///
/// Everything except `id` and `runtime` is opaque to enrichment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPackage {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub latest_version: Option<String>,
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
    /// Non-empty for dependency entries (runtimes), which are never enriched.
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
}

impl RawPackage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn is_dependency(&self) -> bool {
        self.runtime.as_deref().is_some_and(|r| !r.is_empty())
    }
}

/// Catalog-sourced fields merged into a record by the fetch protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub version: Option<String>,
    pub latest_version: Option<String>,
    pub description: Option<String>,
    pub icon_url: Option<String>,
}

impl Enrichment {
    /// Merge `incoming` into `self`.
    ///
    /// `version` is only filled when absent so a locally known version is never
    /// replaced. The other fields take whatever the catalog sent, and
    /// `latest_version` falls back to the merged `version`.
    pub fn merge(&mut self, incoming: Enrichment) {
        if self.version.is_none() {
            self.version = incoming.version;
        }
        self.description = incoming.description;
        self.icon_url = incoming.icon_url;
        self.latest_version = incoming.latest_version.or_else(|| self.version.clone());
    }

    pub fn is_incomplete(&self) -> bool {
        self.description.is_none() || self.icon_url.is_none()
    }
}

#[derive(Debug)]
pub struct PackageRecord {
    id: String,
    source: RawPackage,
    status: AtomicU8,
    enrichment: RwLock<Enrichment>,
    installed: AtomicBool,
    update_available: AtomicBool,
    queued: AtomicBool,
    expires_at: Mutex<Option<DateTime<Utc>>>,
}

impl PackageRecord {
    /// Create a record in [`PackageStatus::Created`] from a backend entry.
    pub fn new(raw: RawPackage) -> Self {
        let enrichment = Enrichment {
            version: raw.version.clone(),
            latest_version: raw.latest_version.clone(),
            description: None,
            icon_url: None,
        };
        Self {
            id: raw.id.clone(),
            source: raw,
            status: AtomicU8::new(PackageStatus::Created as u8),
            enrichment: RwLock::new(enrichment),
            installed: AtomicBool::new(false),
            update_available: AtomicBool::new(false),
            queued: AtomicBool::new(false),
            expires_at: Mutex::new(None),
        }
    }

    pub fn new_handle(raw: RawPackage) -> PackageHandle {
        Arc::new(Self::new(raw))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &RawPackage {
        &self.source
    }

    /// Name used for display and sorting; the id when the backend gave none.
    pub fn display_name(&self) -> &str {
        self.source.name.as_deref().unwrap_or(&self.id)
    }

    pub fn is_dependency(&self) -> bool {
        self.source.is_dependency()
    }

    pub fn status(&self) -> PackageStatus {
        PackageStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Move the status forward to `to`. Never moves it backwards.
    ///
    /// Returns the status held before the call.
    pub fn advance_status(&self, to: PackageStatus) -> PackageStatus {
        PackageStatus::from_u8(self.status.fetch_max(to as u8, Ordering::AcqRel))
    }

    pub fn enrichment(&self) -> Enrichment {
        self.enrichment
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Merge catalog data into the record. Worker-owned.
    pub fn merge_enrichment(&self, incoming: Enrichment) -> Enrichment {
        let mut current = self
            .enrichment
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        current.merge(incoming);
        current.clone()
    }

    /// Missing a description or an icon.
    pub fn is_incomplete(&self) -> bool {
        self.enrichment
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_incomplete()
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    pub fn set_installed(&self, installed: bool) {
        self.installed.store(installed, Ordering::Release);
    }

    pub fn update_available(&self) -> bool {
        self.update_available.load(Ordering::Acquire)
    }

    pub fn set_update_available(&self, available: bool) {
        self.update_available.store(available, Ordering::Release);
    }

    /// Mark the record as sitting in a worker queue.
    ///
    /// Returns `false` if it already was, in which case the caller must not
    /// submit it again.
    pub fn try_mark_queued(&self) -> bool {
        self.queued
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn clear_queued(&self) {
        self.queued.store(false, Ordering::Release);
    }

    pub fn is_queued(&self) -> bool {
        self.queued.load(Ordering::Acquire)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        *self.expires_at.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_expires_at(&self, at: Option<DateTime<Utc>>) {
        *self.expires_at.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    /// A point-in-time copy for presentation.
    pub fn snapshot(&self) -> PackageView {
        let enrichment = self.enrichment();
        PackageView {
            id: self.id.clone(),
            name: self.source.name.clone(),
            status: self.status(),
            version: enrichment.version,
            latest_version: enrichment.latest_version,
            description: enrichment.description,
            icon_url: enrichment.icon_url,
            installed: self.is_installed(),
            update_available: self.update_available(),
            expires_at: self.expires_at(),
            reference: self.source.reference.clone(),
            origin: self.source.origin.clone(),
            commit: self.source.commit.clone(),
            runtime: self.source.runtime.clone(),
            arch: self.source.arch.clone(),
            branch: self.source.branch.clone(),
        }
    }
}

/// Serializable snapshot of a [`PackageRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageView {
    pub id: String,
    pub name: Option<String>,
    pub status: PackageStatus,
    pub version: Option<String>,
    pub latest_version: Option<String>,
    pub description: Option<String>,
    pub icon_url: Option<String>,
    pub installed: bool,
    pub update_available: bool,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub origin: Option<String>,
    pub commit: Option<String>,
    pub runtime: Option<String>,
    pub arch: Option<String>,
    pub branch: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_starts_created() {
        let record = PackageRecord::new(RawPackage::new("org.example.App"));
        assert_eq!(record.status(), PackageStatus::Created);
        assert!(record.is_incomplete());
        assert!(!record.is_installed());
    }

    #[test]
    fn status_never_regresses() {
        let record = PackageRecord::new(RawPackage::new("org.example.App"));
        let mut trace = vec![record.status()];

        for to in [
            PackageStatus::Loading,
            PackageStatus::Ready,
            PackageStatus::Loading,
            PackageStatus::Created,
        ] {
            record.advance_status(to);
            trace.push(record.status());
        }

        assert!(trace.windows(2).all(|w| w[0] <= w[1]), "trace: {trace:?}");
        assert_eq!(record.status(), PackageStatus::Ready);
    }

    #[test]
    fn merge_keeps_local_version() {
        let mut current = Enrichment {
            version: Some("1.0".into()),
            ..Enrichment::default()
        };
        current.merge(Enrichment {
            version: Some("2.0".into()),
            latest_version: Some("2.0".into()),
            description: Some("desc".into()),
            icon_url: Some("https://x/icon.png".into()),
        });

        assert_eq!(current.version.as_deref(), Some("1.0"));
        assert_eq!(current.latest_version.as_deref(), Some("2.0"));
        assert!(!current.is_incomplete());
    }

    #[test]
    fn merge_latest_version_falls_back_to_version() {
        let mut current = Enrichment::default();
        current.merge(Enrichment {
            version: Some("3.1".into()),
            ..Enrichment::default()
        });
        assert_eq!(current.latest_version.as_deref(), Some("3.1"));
    }

    #[test]
    fn merge_overwrites_description_on_every_success() {
        let mut current = Enrichment {
            description: Some("old".into()),
            icon_url: Some("https://x/old.png".into()),
            ..Enrichment::default()
        };
        current.merge(Enrichment {
            description: Some("new".into()),
            ..Enrichment::default()
        });
        assert_eq!(current.description.as_deref(), Some("new"));
        assert_eq!(current.icon_url, None);
    }

    #[test]
    fn runtime_marks_dependency() {
        let mut raw = RawPackage::new("org.freedesktop.Platform");
        assert!(!raw.is_dependency());
        raw.runtime = Some(String::new());
        assert!(!raw.is_dependency());
        raw.runtime = Some("org.freedesktop.Platform/x86_64/23.08".into());
        assert!(raw.is_dependency());
    }

    #[test]
    fn queued_flag_admits_one_submitter() {
        let record = PackageRecord::new(RawPackage::new("org.example.App"));
        assert!(record.try_mark_queued());
        assert!(!record.try_mark_queued());
        record.clear_queued();
        assert!(record.try_mark_queued());
    }

    #[test]
    fn status_round_trips_through_strum() {
        assert_eq!(PackageStatus::Loading.to_string(), "LOADING");
        assert_eq!("READY".parse::<PackageStatus>().ok(), Some(PackageStatus::Ready));
    }
}
