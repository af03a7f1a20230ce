//! Supporting types for director events

use serde::{Deserialize, Serialize};

/// Coarse lifecycle phase of the show director
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum DirectorPhase {
    /// Not running
    #[default]
    Idle,
    /// Greeting and background music while the first timeline is generated
    WarmingUp,
    /// Waiting on the content generator (slow path)
    Generating,
    /// Playing the active timeline
    Playing,
    /// Switching from one timeline to the next
    Transitioning,
    /// Backing off after a failed iteration
    Recovering,
}

impl std::fmt::Display for DirectorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectorPhase::Idle => write!(f, "idle"),
            DirectorPhase::WarmingUp => write!(f, "warmingUp"),
            DirectorPhase::Generating => write!(f, "generating"),
            DirectorPhase::Playing => write!(f, "playing"),
            DirectorPhase::Transitioning => write!(f, "transitioning"),
            DirectorPhase::Recovering => write!(f, "recovering"),
        }
    }
}

/// One line of a talk block as surfaced to listeners
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpokenLine {
    pub speaker: String,
    pub text: String,
}
