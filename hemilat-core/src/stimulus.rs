use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Half of the display the participant attends during a block.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hemifield {
    Left,
    Right,
}

impl Hemifield {
    pub fn from_left(show_left: bool) -> Self {
        if show_left { Self::Left } else { Self::Right }
    }

    pub fn is_left(&self) -> bool {
        matches!(self, Self::Left)
    }

    pub fn flipped(&self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for Hemifield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key press as reported by the key source, stamped on the session clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    pub key: String,
    pub timestamp: Duration,
}

impl KeyPress {
    pub fn new(key: impl Into<String>, timestamp: Duration) -> Self {
        Self {
            key: key.into(),
            timestamp,
        }
    }

    pub fn is(&self, key: &str) -> bool {
        self.key == key
    }
}

/// Audio clips the core asks the player to schedule.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Clip {
    Probe,
    Alarm,
    QuestionnaireReminder,
}

/// Hardware/software markers emitted for cross-system log alignment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Marker {
    StartBlank,
    EndBlank,
    Start,
    StartBlockLeft,
    StartBlockRight,
    BadResponse,
    Tone,
    Stim,
    Response,
    Alarm,
    Quit,
    End,
}

impl Marker {
    pub const ALL: [Marker; 12] = [
        Marker::StartBlank,
        Marker::EndBlank,
        Marker::Start,
        Marker::StartBlockLeft,
        Marker::StartBlockRight,
        Marker::BadResponse,
        Marker::Tone,
        Marker::Stim,
        Marker::Response,
        Marker::Alarm,
        Marker::Quit,
        Marker::End,
    ];

    pub fn block_start(side: Hemifield) -> Self {
        match side {
            Hemifield::Left => Self::StartBlockLeft,
            Hemifield::Right => Self::StartBlockRight,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::StartBlank => "StartBlank",
            Self::EndBlank => "EndBlank",
            Self::Start => "Start",
            Self::StartBlockLeft => "StartBlockLeft",
            Self::StartBlockRight => "StartBlockRight",
            Self::BadResponse => "BadResponse",
            Self::Tone => "Tone",
            Self::Stim => "Stim",
            Self::Response => "Response",
            Self::Alarm => "ALARM",
            Self::Quit => "Quit",
            Self::End => "End",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hemifield_flip_alternates() {
        let side = Hemifield::from_left(true);
        assert_eq!(side.flipped(), Hemifield::Right);
        assert_eq!(side.flipped().flipped(), side);
        assert_eq!(Hemifield::Right.to_string(), "right");
    }

    #[test]
    fn block_marker_follows_side() {
        assert_eq!(Marker::block_start(Hemifield::Left).label(), "StartBlockLeft");
        assert_eq!(Marker::block_start(Hemifield::Right).label(), "StartBlockRight");
        assert_eq!(Marker::Alarm.to_string(), "ALARM");
    }
}
