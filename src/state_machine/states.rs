use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one work unit as tracked by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkUnitState {
    /// Created, not yet handed to a transport
    #[default]
    Pending,
    /// Handed to a transport, awaiting its completion report
    InFlight,
    /// Worker reported success
    Completed,
    /// Worker reported failure, or the request never left the dispatcher
    Failed,
}

impl WorkUnitState {
    /// Check if this is a terminal state for the current attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if this is an active state (unit is being processed)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InFlight)
    }
}

impl fmt::Display for WorkUnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InFlight => write!(f, "in_flight"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for WorkUnitState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_flight" => Ok(Self::InFlight),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid work unit state: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_check() {
        assert!(WorkUnitState::Completed.is_terminal());
        assert!(WorkUnitState::Failed.is_terminal());
        assert!(!WorkUnitState::Pending.is_terminal());
        assert!(!WorkUnitState::InFlight.is_terminal());
    }

    #[test]
    fn test_state_string_conversion() {
        assert_eq!(WorkUnitState::InFlight.to_string(), "in_flight");
        assert_eq!(
            "failed".parse::<WorkUnitState>().unwrap(),
            WorkUnitState::Failed
        );
        assert!("error".parse::<WorkUnitState>().is_err());
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&WorkUnitState::InFlight).unwrap();
        assert_eq!(json, "\"in_flight\"");
    }
}
