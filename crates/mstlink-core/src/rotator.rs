//! Egress path selection with rolling per-path health.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// One candidate egress path: the direct base URL or a proxy-fronted mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub label: String,
    pub base_url: String,
}

impl EndpointConfig {
    pub fn new(label: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            base_url: base_url.into(),
        }
    }

    pub fn direct(base_url: impl Into<String>) -> Self {
        Self::new("direct", base_url)
    }
}

/// Health scoring knobs for the rotator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatorConfig {
    /// Exponential moving average weight of the latest observation.
    pub ema_alpha: f64,
    /// Paths scoring below this floor are excluded from selection.
    pub score_floor: f64,
    /// How long an excluded path stays out before reintroduction.
    pub exclusion_cooldown: Duration,
    /// Score assigned on reintroduction and at startup.
    pub neutral_score: f64,
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            ema_alpha: 0.3,
            score_floor: 0.2,
            exclusion_cooldown: Duration::from_secs(30),
            neutral_score: 0.5,
        }
    }
}

/// Selected path handle, reported back after the attempt completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointHandle {
    index: usize,
    pub label: String,
    pub base_url: String,
}

#[derive(Debug)]
struct EndpointState {
    endpoint: EndpointConfig,
    score: f64,
    last_selected: u64,
    excluded_until: Option<Instant>,
}

#[derive(Debug)]
struct RotatorInner {
    endpoints: Vec<EndpointState>,
    selection_clock: u64,
}

/// Per-source endpoint rotator.
///
/// `select` picks the healthiest path, breaking ties by least recent use so
/// a single bad path is not retried immediately. `report` feeds the rolling
/// score; a path dropping below the floor sits out a cooldown, then comes
/// back at a neutral score so recovery can be detected.
#[derive(Debug)]
pub struct EndpointRotator {
    config: RotatorConfig,
    inner: Mutex<RotatorInner>,
}

impl EndpointRotator {
    pub fn new(endpoints: Vec<EndpointConfig>, config: RotatorConfig) -> Self {
        let endpoints = endpoints
            .into_iter()
            .map(|endpoint| EndpointState {
                endpoint,
                score: config.neutral_score,
                last_selected: 0,
                excluded_until: None,
            })
            .collect();
        Self {
            config,
            inner: Mutex::new(RotatorInner {
                endpoints,
                selection_clock: 0,
            }),
        }
    }

    pub fn single(base_url: impl Into<String>) -> Self {
        Self::new(vec![EndpointConfig::direct(base_url)], RotatorConfig::default())
    }

    /// Pick the best available path. With every path excluded, all are
    /// reintroduced at the neutral score rather than stalling the client.
    pub fn select(&self) -> EndpointHandle {
        let mut inner = self.inner.lock().expect("rotator lock is not poisoned");
        let now = Instant::now();

        for state in &mut inner.endpoints {
            if let Some(until) = state.excluded_until {
                if now >= until {
                    state.excluded_until = None;
                    state.score = self.config.neutral_score;
                    debug!(endpoint = %state.endpoint.label, "endpoint reintroduced");
                }
            }
        }

        if inner.endpoints.iter().all(|s| s.excluded_until.is_some()) {
            for state in &mut inner.endpoints {
                state.excluded_until = None;
                state.score = self.config.neutral_score;
            }
        }

        let best = inner
            .endpoints
            .iter()
            .enumerate()
            .filter(|(_, s)| s.excluded_until.is_none())
            .max_by(|(_, a), (_, b)| {
                a.score
                    .partial_cmp(&b.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.last_selected.cmp(&a.last_selected))
            })
            .map(|(index, _)| index)
            .expect("rotator always holds at least one endpoint");

        inner.selection_clock += 1;
        let clock = inner.selection_clock;
        let state = &mut inner.endpoints[best];
        state.last_selected = clock;
        EndpointHandle {
            index: best,
            label: state.endpoint.label.clone(),
            base_url: state.endpoint.base_url.clone(),
        }
    }

    /// Fold an attempt outcome into the path's rolling score.
    pub fn report(&self, handle: &EndpointHandle, success: bool) {
        let mut inner = self.inner.lock().expect("rotator lock is not poisoned");
        let Some(state) = inner.endpoints.get_mut(handle.index) else {
            return;
        };

        let observation = if success { 1.0 } else { 0.0 };
        state.score =
            self.config.ema_alpha * observation + (1.0 - self.config.ema_alpha) * state.score;

        if state.score < self.config.score_floor && state.excluded_until.is_none() {
            state.excluded_until = Some(Instant::now() + self.config.exclusion_cooldown);
            warn!(
                endpoint = %state.endpoint.label,
                score = state.score,
                "endpoint excluded for cooldown"
            );
        }
    }

    /// Current (label, score) pairs, for diagnostics.
    pub fn scores(&self) -> Vec<(String, f64)> {
        let inner = self.inner.lock().expect("rotator lock is not poisoned");
        inner
            .endpoints
            .iter()
            .map(|s| (s.endpoint.label.clone(), s.score))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotator(cooldown: Duration) -> EndpointRotator {
        EndpointRotator::new(
            vec![
                EndpointConfig::direct("https://registry.test"),
                EndpointConfig::new("proxy-a", "https://proxy-a.test"),
            ],
            RotatorConfig {
                exclusion_cooldown: cooldown,
                ..RotatorConfig::default()
            },
        )
    }

    #[test]
    fn failures_shift_selection_to_the_healthier_path() {
        let rotator = rotator(Duration::from_secs(30));

        let first = rotator.select();
        rotator.report(&first, false);
        rotator.report(&first, false);

        let second = rotator.select();
        assert_ne!(second.label, first.label);
    }

    #[test]
    fn equal_scores_break_ties_by_least_recent_use() {
        let rotator = rotator(Duration::from_secs(30));

        let first = rotator.select();
        let second = rotator.select();
        assert_ne!(first.label, second.label);

        // Both untouched, so the next pick is the least recently used one.
        let third = rotator.select();
        assert_eq!(third.label, first.label);
    }

    #[test]
    fn path_below_floor_is_excluded_then_reintroduced_neutral() {
        let rotator = rotator(Duration::from_millis(30));

        let doomed = rotator.select();
        for _ in 0..6 {
            rotator.report(&doomed, false);
        }

        // Excluded: repeated selection avoids the failed path.
        for _ in 0..4 {
            assert_ne!(rotator.select().label, doomed.label);
        }

        std::thread::sleep(Duration::from_millis(40));
        rotator.select();
        let neutral = RotatorConfig::default().neutral_score;
        let scores = rotator.scores();
        let revived = scores
            .iter()
            .find(|(label, _)| *label == doomed.label)
            .expect("path still registered");
        assert!((revived.1 - neutral).abs() < 1e-9);
    }

    #[test]
    fn all_paths_excluded_falls_back_to_reintroduction() {
        let rotator = rotator(Duration::from_secs(60));

        for _ in 0..20 {
            let handle = rotator.select();
            rotator.report(&handle, false);
        }

        // Selection still succeeds even after everything failed.
        let handle = rotator.select();
        assert!(!handle.base_url.is_empty());
    }
}
