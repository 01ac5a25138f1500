//! Period delta engine
//!
//! Computes "XP earned this week" and "XP earned this day" for an account by
//! comparing its current total against a baseline snapshot taken from
//! history. Everything here is pure computation over an already loaded
//! history: no I/O, no errors. Missing or odd history degrades to zero.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, warn};

use crate::domain::{
    reference_date, AccountMap, AccountRecord, AccountSnapshot, CategoryProgress, CategoryXp,
    PeriodKind, SnapshotEntry,
};
use crate::storage::SnapshotStore;

/// Deltas derived for one account at one reference date
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodDeltas {
    pub weekly_xp: u64,
    pub weekly_xp_per_category: CategoryXp,
    pub daily_xp: u64,
    pub daily_xp_per_category: CategoryXp,
}

/// Where a baseline snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BaselineSource {
    /// Most recent snapshot dated before the period started
    BeforePeriod,
    /// Earliest snapshot inside the period (history began mid-period)
    EarliestInPeriod,
}

#[derive(Debug, Clone, Copy)]
struct Baseline<'h> {
    snapshot: &'h AccountSnapshot,
    source: BaselineSource,
}

/// Engine for period-over-period XP deltas
///
/// Cheap to construct and safe to share; it holds no history of its own.
/// An optional default store is consulted only by the `period_xp*`
/// convenience methods when the caller passes no history.
#[derive(Clone, Default)]
pub struct DeltaEngine {
    default_store: Option<Arc<dyn SnapshotStore>>,
}

impl DeltaEngine {
    /// Create an engine with no default store
    pub fn new() -> Self {
        Self { default_store: None }
    }

    /// Create an engine that loads history from `store` when none is given
    pub fn with_default_store(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            default_store: Some(store),
        }
    }

    /// XP earned in the period containing `reference`
    ///
    /// Returns `current_total_xp - baseline`, clamped at zero, or zero when
    /// no baseline exists. On the first day an account is tracked the only
    /// in-period snapshot equals the current total, which also yields zero.
    pub fn compute_period_xp(
        &self,
        kind: PeriodKind,
        account_key: &str,
        current_total_xp: u64,
        history: &[SnapshotEntry],
        reference: NaiveDate,
    ) -> u64 {
        match find_baseline(kind, account_key, history, reference) {
            None => {
                debug!(
                    "No {:?} baseline for {} at {}, reporting zero",
                    kind, account_key, reference
                );
                0
            }
            Some(baseline)
                if baseline.source == BaselineSource::EarliestInPeriod
                    && baseline.snapshot.total_xp == current_total_xp =>
            {
                0
            }
            Some(baseline) => current_total_xp.saturating_sub(baseline.snapshot.total_xp),
        }
    }

    /// Per-category XP earned in the period containing `reference`
    ///
    /// Uses the same baseline snapshot as [`compute_period_xp`]. Categories
    /// missing from the baseline count in full; categories missing from
    /// `current` are not reported. With no baseline at all the map is empty.
    ///
    /// [`compute_period_xp`]: DeltaEngine::compute_period_xp
    pub fn compute_period_xp_per_category(
        &self,
        kind: PeriodKind,
        account_key: &str,
        current: &BTreeMap<String, CategoryProgress>,
        history: &[SnapshotEntry],
        reference: NaiveDate,
    ) -> CategoryXp {
        let Some(baseline) = find_baseline(kind, account_key, history, reference) else {
            return CategoryXp::new();
        };

        current
            .iter()
            .map(|(category, progress)| {
                let before = baseline
                    .snapshot
                    .language_progress
                    .get(category)
                    .map(|p| p.xp)
                    .unwrap_or(0);
                (category.clone(), progress.xp.saturating_sub(before))
            })
            .collect()
    }

    /// All four deltas for one snapshot
    pub fn deltas_for(
        &self,
        account_key: &str,
        snapshot: &AccountSnapshot,
        history: &[SnapshotEntry],
        reference: NaiveDate,
    ) -> PeriodDeltas {
        let current = &snapshot.language_progress;
        PeriodDeltas {
            weekly_xp: self.compute_period_xp(
                PeriodKind::Week,
                account_key,
                snapshot.total_xp,
                history,
                reference,
            ),
            weekly_xp_per_category: self.compute_period_xp_per_category(
                PeriodKind::Week,
                account_key,
                current,
                history,
                reference,
            ),
            daily_xp: self.compute_period_xp(
                PeriodKind::Day,
                account_key,
                snapshot.total_xp,
                history,
                reference,
            ),
            daily_xp_per_category: self.compute_period_xp_per_category(
                PeriodKind::Day,
                account_key,
                current,
                history,
                reference,
            ),
        }
    }

    /// Merge freshly computed deltas into every usable snapshot
    ///
    /// Failure markers pass through untouched.
    pub fn apply_deltas(
        &self,
        current: &AccountMap,
        history: &[SnapshotEntry],
        reference: NaiveDate,
    ) -> AccountMap {
        current
            .iter()
            .map(|(display_key, record)| {
                let merged = match record {
                    AccountRecord::Snapshot(snapshot) => {
                        let deltas = self.deltas_for(display_key, snapshot, history, reference);
                        let mut snapshot = snapshot.clone();
                        snapshot.weekly_xp = deltas.weekly_xp;
                        snapshot.weekly_xp_per_language = deltas.weekly_xp_per_category;
                        snapshot.daily_xp = deltas.daily_xp;
                        snapshot.daily_xp_per_language = deltas.daily_xp_per_category;
                        AccountRecord::Snapshot(snapshot)
                    }
                    other => other.clone(),
                };
                (display_key.clone(), merged)
            })
            .collect()
    }

    /// Use the given history, or load it from the default store
    ///
    /// A store failure is logged and treated as empty history; callers that
    /// need hard failure should load from the store themselves.
    pub async fn resolve_history<'a>(
        &self,
        history: Option<&'a [SnapshotEntry]>,
    ) -> Cow<'a, [SnapshotEntry]> {
        if let Some(history) = history {
            return Cow::Borrowed(history);
        }

        let Some(store) = &self.default_store else {
            debug!("No history given and no default store configured");
            return Cow::Owned(Vec::new());
        };

        match store.load_history().await {
            Ok(history) => Cow::Owned(history),
            Err(e) => {
                warn!(
                    "Failed to load history from {} store, deltas will be zero: {}",
                    store.backend_name(),
                    e
                );
                Cow::Owned(Vec::new())
            }
        }
    }

    /// [`compute_period_xp`] with optional history and reference instant
    ///
    /// [`compute_period_xp`]: DeltaEngine::compute_period_xp
    pub async fn period_xp(
        &self,
        kind: PeriodKind,
        account_key: &str,
        current_total_xp: u64,
        history: Option<&[SnapshotEntry]>,
        reference: Option<NaiveDateTime>,
    ) -> u64 {
        let history = self.resolve_history(history).await;
        self.compute_period_xp(
            kind,
            account_key,
            current_total_xp,
            &history,
            reference_date(reference),
        )
    }

    /// [`compute_period_xp_per_category`] with optional history and reference instant
    ///
    /// [`compute_period_xp_per_category`]: DeltaEngine::compute_period_xp_per_category
    pub async fn period_xp_per_category(
        &self,
        kind: PeriodKind,
        account_key: &str,
        current: &BTreeMap<String, CategoryProgress>,
        history: Option<&[SnapshotEntry]>,
        reference: Option<NaiveDateTime>,
    ) -> CategoryXp {
        let history = self.resolve_history(history).await;
        self.compute_period_xp_per_category(
            kind,
            account_key,
            current,
            &history,
            reference_date(reference),
        )
    }
}

/// Pick the baseline snapshot for an account
fn find_baseline<'h>(
    kind: PeriodKind,
    account_key: &str,
    history: &'h [SnapshotEntry],
    reference: NaiveDate,
) -> Option<Baseline<'h>> {
    let start = kind.period_start(reference);

    match kind {
        PeriodKind::Week => {
            let mut before: Option<(NaiveDate, &AccountSnapshot)> = None;
            let mut earliest: Option<(NaiveDate, &AccountSnapshot)> = None;

            for entry in history {
                let Some(snapshot) = entry.find_account(account_key) else {
                    continue;
                };

                if entry.date < start {
                    if before.map_or(true, |(date, _)| entry.date >= date) {
                        before = Some((entry.date, snapshot));
                    }
                } else if earliest.map_or(true, |(date, _)| entry.date < date) {
                    earliest = Some((entry.date, snapshot));
                }
            }

            before
                .map(|(_, snapshot)| Baseline {
                    snapshot,
                    source: BaselineSource::BeforePeriod,
                })
                .or_else(|| {
                    earliest.map(|(_, snapshot)| Baseline {
                        snapshot,
                        source: BaselineSource::EarliestInPeriod,
                    })
                })
        }
        PeriodKind::Day => history
            .iter()
            .filter(|entry| entry.date <= start)
            .filter_map(|entry| entry.find_account(account_key).map(|s| (entry.date, s)))
            .max_by_key(|(date, _)| *date)
            .map(|(_, snapshot)| Baseline {
                snapshot,
                source: BaselineSource::BeforePeriod,
            }),
    }
}
