use hemilat_core::{Outcome, TrialRecord};
use serde::Serialize;
use std::fmt;

/// Session-lifetime aggregate of trial outcomes.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Scorer {
    hits: u32,
    misses: u32,
    late: u32,
    extra_keys: u32,
    reaction_times: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub hits: u32,
    pub misses: u32,
    pub late: u32,
    pub extra_keys: u32,
    pub valid_responses: usize,
    pub mean_rt: Option<f64>,
    pub median_rt: Option<f64>,
}

impl Scorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a finalized trial into the aggregates. Reaction times must
    /// exceed `min_valid` to count; late responses are tallied only for
    /// those valid reaction times.
    pub fn record(&mut self, trial: &TrialRecord, min_valid: f64) {
        self.extra_keys += trial.extra_key_presses.len() as u32;
        match trial.outcome {
            Outcome::Missed => self.misses += 1,
            Outcome::Hit | Outcome::LateHit => {
                self.hits += 1;
                if let Some(rt) = trial.reaction_time {
                    if rt > min_valid {
                        self.reaction_times.push(rt);
                        if trial.outcome == Outcome::LateHit {
                            self.late += 1;
                        }
                    }
                }
            }
        }
    }

    /// Counts presses from a trial that never reached finalization.
    pub fn add_extra_keys(&mut self, presses: usize) {
        self.extra_keys += presses as u32;
    }

    pub fn hits(&self) -> u32 {
        self.hits
    }

    pub fn misses(&self) -> u32 {
        self.misses
    }

    pub fn late(&self) -> u32 {
        self.late
    }

    pub fn extra_keys(&self) -> u32 {
        self.extra_keys
    }

    pub fn reaction_times(&self) -> &[f64] {
        &self.reaction_times
    }

    pub fn summary(&self) -> ScoreSummary {
        let n = self.reaction_times.len();
        let mean_rt = (n > 0).then(|| self.reaction_times.iter().sum::<f64>() / n as f64);
        let median_rt = (n > 0).then(|| {
            let mut sorted = self.reaction_times.clone();
            sorted.sort_by(f64::total_cmp);
            if n % 2 == 1 {
                sorted[n / 2]
            } else {
                (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
            }
        });
        ScoreSummary {
            hits: self.hits,
            misses: self.misses,
            late: self.late,
            extra_keys: self.extra_keys,
            valid_responses: n,
            mean_rt,
            median_rt,
        }
    }
}

impl fmt::Display for ScoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits {}, missed {}, late {}, extra keys {}",
            self.hits, self.misses, self.late, self.extra_keys
        )?;
        match (self.mean_rt, self.median_rt) {
            (Some(mean), Some(median)) => write!(
                f,
                ", mean RT {:.3}s, median RT {:.3}s over {} responses",
                mean, median, self.valid_responses
            ),
            _ => write!(f, ", no valid responses"),
        }
    }
}
