use std::collections::BTreeMap;
use vigil_types::{FailureCategory, ProfileKey, RecoveryAttempt, Strategy, StrategyProfile, WorkerType};

use crate::config::LearningConfig;

/// Immutable view of everything learned so far.
///
/// A snapshot is the left fold of [`ProfileSnapshot::apply`] over the
/// finalized attempt log, so replaying the persisted log reproduces it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProfileSnapshot {
    profiles: BTreeMap<ProfileKey, StrategyProfile>,
    applied: u64,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct ProfileRow {
    pub worker_type: WorkerType,
    pub failure_category: FailureCategory,
    pub strategy: Strategy,
    pub attempts: u64,
    pub successes: u64,
    pub success_rate: f64,
    pub mean_recovery_seconds: Option<f64>,
}

impl ProfileSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replay<'a>(
        attempts: impl IntoIterator<Item = &'a RecoveryAttempt>,
        learning: &LearningConfig,
    ) -> Self {
        let mut snapshot = Self::new();
        for attempt in attempts {
            snapshot.apply(attempt, learning);
        }
        snapshot
    }

    /// One fold step. Unfinalized attempts are skipped and return `false`.
    ///
    /// Weighted counts for the attempt's key decay by `learning.decay` before
    /// the new outcome is added; the mean recovery time is an EMA over
    /// successful attempts only.
    pub fn apply(&mut self, attempt: &RecoveryAttempt, learning: &LearningConfig) -> bool {
        let Some(outcome) = attempt.outcome else {
            return false;
        };

        let profile = self.profiles.entry(attempt.profile_key()).or_default();
        profile.attempts += 1;
        profile.weighted_attempts = profile.weighted_attempts * learning.decay + 1.0;
        profile.weighted_successes *= learning.decay;

        if outcome.is_success() {
            profile.successes += 1;
            profile.weighted_successes += 1.0;
            if let Some(secs) = attempt.recovery_seconds() {
                profile.mean_recovery_seconds = Some(match profile.mean_recovery_seconds {
                    Some(mean) => learning.ema_alpha * secs + (1.0 - learning.ema_alpha) * mean,
                    None => secs,
                });
            }
        }

        self.applied += 1;
        true
    }

    pub fn insert(&mut self, key: ProfileKey, profile: StrategyProfile) {
        self.profiles.insert(key, profile);
    }

    pub fn get(
        &self,
        worker_type: &WorkerType,
        failure_category: FailureCategory,
        strategy: Strategy,
    ) -> Option<&StrategyProfile> {
        self.profiles.get(&ProfileKey {
            worker_type: worker_type.clone(),
            failure_category,
            strategy,
        })
    }

    /// Profiles for one `(worker_type, failure_category)` in strategy order.
    pub fn candidates<'a>(
        &'a self,
        worker_type: &'a WorkerType,
        failure_category: FailureCategory,
    ) -> impl Iterator<Item = (Strategy, &'a StrategyProfile)> + 'a {
        self.profiles
            .iter()
            .filter(move |(key, _)| &key.worker_type == worker_type && key.failure_category == failure_category)
            .map(|(key, profile)| (key.strategy, profile))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProfileKey, &StrategyProfile)> {
        self.profiles.iter()
    }

    pub fn rows(&self) -> Vec<ProfileRow> {
        self.profiles
            .iter()
            .map(|(key, profile)| ProfileRow {
                worker_type: key.worker_type.clone(),
                failure_category: key.failure_category,
                strategy: key.strategy,
                attempts: profile.attempts,
                successes: profile.successes,
                success_rate: profile.success_rate(),
                mean_recovery_seconds: profile.mean_recovery_seconds,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Number of attempts folded in.
    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn approx_eq(&self, other: &ProfileSnapshot, tolerance: f64) -> bool {
        if self.profiles.len() != other.profiles.len() {
            return false;
        }
        let close = |a: f64, b: f64| (a - b).abs() <= tolerance;
        self.profiles.iter().all(|(key, a)| {
            other.profiles.get(key).is_some_and(|b| {
                a.attempts == b.attempts
                    && a.successes == b.successes
                    && close(a.weighted_attempts, b.weighted_attempts)
                    && close(a.weighted_successes, b.weighted_successes)
                    && match (a.mean_recovery_seconds, b.mean_recovery_seconds) {
                        (Some(x), Some(y)) => close(x, y),
                        (None, None) => true,
                        _ => false,
                    }
            })
        })
    }
}
