//! Session errors surfaced by the mixing engine and the room coordinator.
//!
//! Every variant except `Underflow` is an expected, user-visible failure that
//! the coordinator turns into a `roomerror` event. `Underflow` means a channel
//! was drained without a readiness check and should never happen.

use uuid::Uuid;

/// Errors raised by room, roster and engine operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// No active room with this id
    UnknownRoom(String),
    /// A room with this id is already active
    DuplicateRoom(String),
    /// Member has no performer channel in the engine
    UnknownChannel(Uuid),
    /// Member already has a performer channel
    DuplicateChannel(Uuid),
    /// Role limit reached for the room
    CapacityExceeded { room_id: String, limit: usize },
    /// Requester is not the room host
    NotHost(Uuid),
    /// Room is registered but its roster is gone (room dissolving)
    RosterMissing(String),
    /// Invalid mixer or graph configuration
    ConfigError(String),
    /// take() asked for more samples than buffered
    Underflow { requested: usize, available: usize },
    /// Persistence collaborator rejected the session artifact
    Persistence(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownRoom(id) => write!(f, "Room {id} does not exist"),
            Self::DuplicateRoom(id) => write!(f, "Room {id} already exists"),
            Self::UnknownChannel(id) => write!(f, "No performer channel for member {id}"),
            Self::DuplicateChannel(id) => {
                write!(f, "Performer channel for member {id} already exists")
            }
            Self::CapacityExceeded { room_id, limit } => {
                write!(f, "Room {room_id} reached its capacity of {limit}")
            }
            Self::NotHost(id) => write!(f, "Member {id} is not the host of this room"),
            Self::RosterMissing(id) => write!(f, "Member data for room {id} is missing"),
            Self::ConfigError(e) => write!(f, "Configuration error: {e}"),
            Self::Underflow { requested, available } => write!(
                f,
                "Channel underflow: requested {requested} samples, {available} buffered"
            ),
            Self::Persistence(e) => write!(f, "Persistence error: {e}"),
        }
    }
}

impl std::error::Error for SessionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = SessionError::CapacityExceeded {
            room_id: "R1".into(),
            limit: 2,
        };
        assert_eq!(err.to_string(), "Room R1 reached its capacity of 2");
        assert_eq!(
            SessionError::UnknownRoom("R9".into()).to_string(),
            "Room R9 does not exist"
        );
    }

    #[test]
    fn test_underflow_reports_counts() {
        let err = SessionError::Underflow {
            requested: 1024,
            available: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("1024"));
        assert!(msg.contains("10"));
    }
}
