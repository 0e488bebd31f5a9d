use crate::stimulus::Hemifield;
use serde::{Deserialize, Serialize};

/// Classification of a finalized trial.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Key pressed while the target was still visible.
    Hit,
    /// Key pressed after the target vanished but inside the grace window.
    LateHit,
    /// Grace window expired without a key press.
    Missed,
}

impl Outcome {
    pub fn is_response(&self) -> bool {
        !matches!(self, Self::Missed)
    }
}

/// Opaque physiology reading stamped with session time in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysioSample {
    pub value: serde_json::Value,
    pub timestamp: f64,
}

/// One audio probe played during a delay phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeEvent {
    /// Session-wide probe counter.
    pub index: u64,
    /// Seconds from the start of the enclosing delay to the play time.
    pub offset: f64,
    /// Session time the probe was scheduled to play at.
    pub time: f64,
    pub pre: PhysioSample,
    pub post: PhysioSample,
}

/// Finalized record of a single trial, handed to the session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Monotonic across the whole session, never reset per block.
    pub sequence_number: u64,
    /// Correlation id returned by the trigger emitter.
    pub trial_id: u64,
    pub block: usize,
    pub hemifield: Hemifield,
    /// Sampled delay in seconds, already net of the extra wait.
    pub delay: f64,
    pub probes: Vec<ProbeEvent>,
    /// Session times of key presses outside the response window.
    pub extra_key_presses: Vec<f64>,
    pub coordinates: (f32, f32),
    /// Session time the response window opened.
    pub start_time: f64,
    pub outcome: Outcome,
    /// Seconds from window onset to the key press, only for responses.
    pub reaction_time: Option<f64>,
    pub response_key: Option<String>,
    /// Session time the miss alarm fired on this trial.
    pub alarm: Option<f64>,
    pub pre_spot: Option<PhysioSample>,
    pub post_spot: Option<PhysioSample>,
}

impl TrialRecord {
    pub fn is_late(&self) -> bool {
        self.outcome == Outcome::LateHit
    }

    pub fn missed(&self) -> bool {
        self.outcome == Outcome::Missed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(t: f64) -> PhysioSample {
        PhysioSample {
            value: json!({ "diameter": 3.25 }),
            timestamp: t,
        }
    }

    #[test]
    fn record_survives_json_round_trip() {
        let record = TrialRecord {
            sequence_number: 17,
            trial_id: 4242,
            block: 3,
            hemifield: Hemifield::Left,
            delay: 6.123456789,
            probes: vec![ProbeEvent {
                index: 9,
                offset: 2.000001,
                time: 101.5,
                pre: sample(101.49),
                post: sample(101.56),
            }],
            extra_key_presses: vec![100.25, 102.125],
            coordinates: (0.25, -0.5),
            start_time: 106.623456789,
            outcome: Outcome::LateHit,
            reaction_time: Some(0.600000001),
            response_key: Some("lshift".to_string()),
            alarm: None,
            pre_spot: Some(sample(106.6)),
            post_spot: None,
        };

        let line = serde_json::to_string(&record).unwrap();
        let parsed: TrialRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, record);
        assert!(parsed.is_late());
    }

    #[test]
    fn outcome_tags_are_snake_case() {
        assert_eq!(serde_json::to_string(&Outcome::LateHit).unwrap(), "\"late_hit\"");
        assert!(!Outcome::Missed.is_response());
        assert!(Outcome::Hit.is_response());
    }
}
