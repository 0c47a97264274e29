use std::cmp::Ordering;
use vigil_types::{FailureCategory, Strategy, StrategyProfile, WorkerType};

use crate::config::LearningConfig;
use crate::profile::ProfileSnapshot;

/// Picks a strategy for a failure from an immutable profile snapshot.
///
/// Deterministic: the same snapshot and inputs always give the same answer.
pub struct StrategySelector {
    learning: LearningConfig,
}

impl StrategySelector {
    pub fn new(learning: LearningConfig) -> Self {
        Self { learning }
    }

    /// Best-evidenced strategy, or the category default when nothing has
    /// enough evidence.
    pub fn select(
        &self,
        worker_type: &WorkerType,
        failure_category: FailureCategory,
        profiles: &ProfileSnapshot,
    ) -> Strategy {
        self.best_evidenced(worker_type, failure_category, profiles, &[])
            .unwrap_or_else(|| failure_category.default_strategy())
    }

    /// Next strategy after `tried` failed within the same incident. Evidence
    /// wins first, then the category's fallback chain; once everything has
    /// been tried the category default is repeated.
    pub fn select_next(
        &self,
        worker_type: &WorkerType,
        failure_category: FailureCategory,
        profiles: &ProfileSnapshot,
        tried: &[Strategy],
    ) -> Strategy {
        if tried.is_empty() {
            return self.select(worker_type, failure_category, profiles);
        }

        self.best_evidenced(worker_type, failure_category, profiles, tried)
            .or_else(|| {
                failure_category
                    .fallback_chain()
                    .iter()
                    .copied()
                    .find(|s| !tried.contains(s))
            })
            .unwrap_or_else(|| failure_category.default_strategy())
    }

    fn best_evidenced(
        &self,
        worker_type: &WorkerType,
        failure_category: FailureCategory,
        profiles: &ProfileSnapshot,
        exclude: &[Strategy],
    ) -> Option<Strategy> {
        profiles
            .candidates(worker_type, failure_category)
            .filter(|(strategy, profile)| {
                profile.attempts >= self.learning.min_evidence && !exclude.contains(strategy)
            })
            .min_by(|(sa, pa), (sb, pb)| rank(pa, pb).then_with(|| sa.cmp(sb)))
            .map(|(strategy, _)| strategy)
    }
}

/// Higher success rate first, then faster mean recovery. Unknown recovery
/// time sorts last.
fn rank(a: &StrategyProfile, b: &StrategyProfile) -> Ordering {
    b.success_rate()
        .partial_cmp(&a.success_rate())
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            let ta = a.mean_recovery_seconds.unwrap_or(f64::INFINITY);
            let tb = b.mean_recovery_seconds.unwrap_or(f64::INFINITY);
            ta.partial_cmp(&tb).unwrap_or(Ordering::Equal)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert_eq, proptest};
    use vigil_types::ProfileKey;

    fn key(category: FailureCategory, strategy: Strategy) -> ProfileKey {
        ProfileKey {
            worker_type: WorkerType::new("task-processor"),
            failure_category: category,
            strategy,
        }
    }

    fn selector() -> StrategySelector {
        StrategySelector::new(LearningConfig::default())
    }

    #[test]
    fn test_evidence_beats_default() {
        let mut profiles = ProfileSnapshot::new();
        profiles.insert(
            key(FailureCategory::Crashed, Strategy::SoftRestart),
            StrategyProfile::from_counts(50, 45, Some(20.0)),
        );
        profiles.insert(
            key(FailureCategory::Crashed, Strategy::HardRestart),
            StrategyProfile::from_counts(10, 6, Some(5.0)),
        );

        let chosen = selector().select(&WorkerType::new("task-processor"), FailureCategory::Crashed, &profiles);
        assert_eq!(chosen, Strategy::SoftRestart);
    }

    #[test]
    fn test_insufficient_evidence_uses_default() {
        let mut profiles = ProfileSnapshot::new();
        profiles.insert(
            key(FailureCategory::Crashed, Strategy::SoftRestart),
            StrategyProfile::from_counts(4, 4, Some(1.0)),
        );
        let chosen = selector().select(&WorkerType::new("task-processor"), FailureCategory::Crashed, &profiles);
        assert_eq!(chosen, Strategy::HardRestart);
    }

    #[test]
    fn test_empty_profile_resource_exhaustion_scales_up() {
        let chosen = selector().select(
            &WorkerType::new("task-processor"),
            FailureCategory::ResourceExhaustion,
            &ProfileSnapshot::new(),
        );
        assert_eq!(chosen, Strategy::ScaleUp);
    }

    #[test]
    fn test_tie_broken_by_recovery_time() {
        let mut profiles = ProfileSnapshot::new();
        profiles.insert(
            key(FailureCategory::Unresponsive, Strategy::SoftRestart),
            StrategyProfile::from_counts(10, 8, Some(30.0)),
        );
        profiles.insert(
            key(FailureCategory::Unresponsive, Strategy::HardRestart),
            StrategyProfile::from_counts(10, 8, Some(12.0)),
        );
        let chosen =
            selector().select(&WorkerType::new("task-processor"), FailureCategory::Unresponsive, &profiles);
        assert_eq!(chosen, Strategy::HardRestart);
    }

    #[test]
    fn test_other_worker_types_ignored() {
        let mut profiles = ProfileSnapshot::new();
        profiles.insert(
            ProfileKey {
                worker_type: WorkerType::new("indexer"),
                failure_category: FailureCategory::Crashed,
                strategy: Strategy::ScaleUp,
            },
            StrategyProfile::from_counts(100, 100, Some(1.0)),
        );
        let chosen = selector().select(&WorkerType::new("task-processor"), FailureCategory::Crashed, &profiles);
        assert_eq!(chosen, Strategy::HardRestart);
    }

    #[test]
    fn test_next_walks_fallback_chain() {
        let profiles = ProfileSnapshot::new();
        let worker_type = WorkerType::new("task-processor");
        let s = selector();

        assert_eq!(
            s.select_next(&worker_type, FailureCategory::Crashed, &profiles, &[]),
            Strategy::HardRestart
        );
        assert_eq!(
            s.select_next(&worker_type, FailureCategory::Crashed, &profiles, &[Strategy::HardRestart]),
            Strategy::SoftRestart
        );
        assert_eq!(
            s.select_next(
                &worker_type,
                FailureCategory::Crashed,
                &profiles,
                &[Strategy::HardRestart, Strategy::SoftRestart]
            ),
            Strategy::HardRestart
        );
    }

    #[test]
    fn test_next_skips_tried_evidence() {
        let mut profiles = ProfileSnapshot::new();
        profiles.insert(
            key(FailureCategory::BacklogOverflow, Strategy::ScaleUp),
            StrategyProfile::from_counts(20, 19, Some(60.0)),
        );
        profiles.insert(
            key(FailureCategory::BacklogOverflow, Strategy::HardRestart),
            StrategyProfile::from_counts(20, 10, Some(10.0)),
        );
        let chosen = selector().select_next(
            &WorkerType::new("task-processor"),
            FailureCategory::BacklogOverflow,
            &profiles,
            &[Strategy::ScaleUp],
        );
        assert_eq!(chosen, Strategy::HardRestart);
    }

    fn any_strategy() -> impl proptest::strategy::Strategy<Value = Strategy> {
        proptest::sample::select(Strategy::ALL.to_vec())
    }

    fn any_category() -> impl proptest::strategy::Strategy<Value = FailureCategory> {
        proptest::sample::select(vec![
            FailureCategory::Unresponsive,
            FailureCategory::Crashed,
            FailureCategory::ResourceExhaustion,
            FailureCategory::BacklogOverflow,
            FailureCategory::Transient,
        ])
    }

    proptest! {
        #[test]
        fn prop_select_is_deterministic(
            entries in proptest::collection::vec(
                (any_category(), any_strategy(), 0u64..40, 0u64..40, proptest::option::of(0.0f64..300.0)),
                0..20,
            ),
            category in any_category(),
        ) {
            let mut profiles = ProfileSnapshot::new();
            for (c, s, attempts, successes, mean) in entries {
                profiles.insert(key(c, s), StrategyProfile::from_counts(attempts, successes.min(attempts), mean));
            }
            let worker_type = WorkerType::new("task-processor");
            let s = selector();
            let first = s.select(&worker_type, category, &profiles);
            let second = s.select(&worker_type, category, &profiles.clone());
            prop_assert_eq!(first, second);
        }
    }
}
