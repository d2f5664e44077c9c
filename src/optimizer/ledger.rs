//! Per-request bookkeeping.
//!
//! The first optimize call for a request id creates its entry (price, floor,
//! context and routing metadata are fixed from then on); every call bumps
//! `attempts`, every acknowledged feedback bumps `impressions`. Entries idle
//! for longer than the retention window are swept.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::optimizer::infra::logging::targets;

/// Opaque routing attributes carried with a request.
///
/// Fields are free-form: `null` reads as empty and numbers or booleans are
/// kept in their JSON text form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RoutingMetadata {
    #[serde(default, deserialize_with = "lenient_string")]
    pub data_center: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ext_ad_format: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub app_publisher_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub bundle_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tag_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub device_geo_country: String,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

/// State tracked for one request id.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub price: f64,
    pub floor_price: f64,
    pub attempts: u32,
    pub impressions: u32,
    pub context_id: String,
    pub metadata: RoutingMetadata,
    pub last_seen: Instant,
}

/// Concurrent request-id → entry map.
#[derive(Debug, Default)]
pub struct RequestLedger {
    entries: DashMap<String, LedgerEntry>,
}

impl RequestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the entry for `request_id`.
    pub fn get(&self, request_id: &str) -> Option<LedgerEntry> {
        self.entries.get(request_id).map(|e| e.clone())
    }

    /// Create-or-touch the entry and count one attempt.
    ///
    /// Returns `(attempts, impressions)` after the increment.
    pub fn record_attempt(
        &self,
        request_id: &str,
        context_id: &str,
        price: f64,
        floor_price: f64,
        metadata: &RoutingMetadata,
        now: Instant,
    ) -> (u32, u32) {
        let mut entry = self
            .entries
            .entry(request_id.to_string())
            .or_insert_with(|| LedgerEntry {
                price,
                floor_price,
                attempts: 0,
                impressions: 0,
                context_id: context_id.to_string(),
                metadata: metadata.clone(),
                last_seen: now,
            });
        entry.attempts = entry.attempts.saturating_add(1);
        entry.last_seen = now;
        (entry.attempts, entry.impressions)
    }

    /// Apply one feedback to the entry and count the impression.
    ///
    /// `apply` receives the entry's context and runs with the entry guard
    /// held, so a concurrent sweep cannot evict the entry halfway through. The
    /// impression is only counted when `apply` succeeds. `Ok(None)` when the
    /// id is unknown (or was evicted), in which case `apply` never runs.
    pub fn record_feedback<T, E>(
        &self,
        request_id: &str,
        now: Instant,
        apply: impl FnOnce(&str) -> Result<T, E>,
    ) -> Result<Option<(T, u32)>, E> {
        let Some(mut entry) = self.entries.get_mut(request_id) else {
            return Ok(None);
        };
        let applied = apply(&entry.context_id)?;
        entry.impressions = entry.impressions.saturating_add(1);
        entry.last_seen = now;
        Ok(Some((applied, entry.impressions)))
    }

    /// Drop entries idle for longer than `retention`. Returns how many went.
    pub fn evict_idle(&self, now: Instant, retention: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.last_seen) <= retention);
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            debug!(
                target: targets::LEDGER,
                evicted,
                remaining = self.entries.len(),
                "Evicted idle ledger entries"
            );
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> RoutingMetadata {
        RoutingMetadata {
            data_center: "ams".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_attempt_fixes_entry() {
        let ledger = RequestLedger::new();
        let now = Instant::now();

        assert_eq!(ledger.record_attempt("r1", "ctx", 2.0, 1.0, &meta(), now), (1, 0));
        assert_eq!(
            ledger.record_attempt("r1", "other", 5.0, 4.0, &RoutingMetadata::default(), now),
            (2, 0)
        );

        let entry = ledger.get("r1").unwrap();
        assert_eq!(entry.price, 2.0);
        assert_eq!(entry.floor_price, 1.0);
        assert_eq!(entry.context_id, "ctx");
        assert_eq!(entry.metadata, meta());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_feedback_counts_impressions() {
        let ledger = RequestLedger::new();
        let now = Instant::now();
        let mut called = false;
        let unknown = ledger.record_feedback("nope", now, |_| {
            called = true;
            Ok::<_, ()>(())
        });
        assert_eq!(unknown, Ok(None));
        assert!(!called);
        assert!(ledger.is_empty());

        ledger.record_attempt("r1", "ctx", 2.0, 1.0, &meta(), now);
        let seen = ledger.record_feedback("r1", now, |ctx| Ok::<_, ()>(ctx.to_string()));
        assert_eq!(seen, Ok(Some(("ctx".to_string(), 1))));
        assert_eq!(
            ledger.record_feedback("r1", now, |_| Ok::<_, ()>(())),
            Ok(Some(((), 2)))
        );
        assert_eq!(ledger.record_attempt("r1", "ctx", 2.0, 1.0, &meta(), now), (2, 2));
    }

    #[test]
    fn test_failed_feedback_leaves_entry_untouched() {
        let ledger = RequestLedger::new();
        let t0 = Instant::now();
        ledger.record_attempt("r1", "ctx", 2.0, 1.0, &meta(), t0);

        let later = t0 + Duration::from_secs(30);
        let res = ledger.record_feedback("r1", later, |_| Err::<(), _>("busy"));
        assert_eq!(res, Err("busy"));

        let entry = ledger.get("r1").unwrap();
        assert_eq!(entry.impressions, 0);
        assert_eq!(entry.last_seen, t0);
    }

    #[test]
    fn test_metadata_tolerates_null_and_numbers() {
        let meta: RoutingMetadata = serde_json::from_str(
            r#"{"data_center": null, "app_publisher_id": 123, "tag_id": "t-9"}"#,
        )
        .unwrap();
        assert_eq!(meta.data_center, "");
        assert_eq!(meta.app_publisher_id, "123");
        assert_eq!(meta.tag_id, "t-9");
        assert_eq!(meta.bundle_id, "");
    }

    #[test]
    fn test_evict_idle() {
        let ledger = RequestLedger::new();
        let t0 = Instant::now();
        let retention = Duration::from_secs(600);

        ledger.record_attempt("old", "ctx", 2.0, 1.0, &meta(), t0);
        ledger.record_attempt("fresh", "ctx", 2.0, 1.0, &meta(), t0 + Duration::from_secs(500));

        assert_eq!(ledger.evict_idle(t0 + Duration::from_secs(600), retention), 0);
        assert_eq!(ledger.evict_idle(t0 + Duration::from_secs(700), retention), 1);
        assert!(ledger.get("old").is_none());
        assert!(ledger.get("fresh").is_some());
    }

    #[test]
    fn test_activity_refreshes_last_seen() {
        let ledger = RequestLedger::new();
        let t0 = Instant::now();
        let retention = Duration::from_secs(10);

        ledger.record_attempt("r1", "ctx", 2.0, 1.0, &meta(), t0);
        ledger
            .record_feedback("r1", t0 + Duration::from_secs(8), |_| Ok::<_, ()>(()))
            .unwrap();
        assert_eq!(ledger.evict_idle(t0 + Duration::from_secs(15), retention), 0);
        assert_eq!(ledger.evict_idle(t0 + Duration::from_secs(19), retention), 1);
    }
}
