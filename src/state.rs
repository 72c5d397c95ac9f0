//! State machine for the process group supervisor
//!
//! Idle → Starting → Running → Restarting → Starting → ...
//! Any state → Terminated on interrupt or restart limit.

use std::time::{Duration, Instant};

/// Supervisor state
#[derive(Debug, Clone)]
pub enum GroupState {
    /// Not yet dispatched
    Idle,

    /// Launching the pair (primary, readiness wait, secondary)
    Starting {
        /// Launch attempt, 0 for the first start
        attempt: u32,
    },

    /// Both members launched and alive
    Running {
        /// When the secondary came up
        since: Instant,
        /// OS process ids (primary, secondary), when known
        pids: (Option<u32>, Option<u32>),
    },

    /// A member exited; tearing down and cooling off
    Restarting {
        /// Restart number, 1-based
        attempt: u32,
        /// Delay before the next start
        cooldown: Duration,
    },

    /// Supervisor finished, no children alive
    Terminated,
}

impl GroupState {
    /// Create a new idle state
    pub fn new() -> Self {
        GroupState::Idle
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, GroupState::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, GroupState::Running { .. })
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, GroupState::Terminated)
    }

    /// How long the pair has been up, if running
    pub fn uptime(&self) -> Option<Duration> {
        match self {
            GroupState::Running { since, .. } => Some(since.elapsed()),
            _ => None,
        }
    }
}

impl Default for GroupState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GroupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupState::Idle => write!(f, "Idle"),
            GroupState::Starting { attempt } => write!(f, "Starting (attempt {})", attempt),
            GroupState::Running { since, pids } => {
                let pid = |p: &Option<u32>| p.map_or_else(|| "?".to_string(), |p| p.to_string());
                write!(
                    f,
                    "Running ({:.1}s, pids {}/{})",
                    since.elapsed().as_secs_f32(),
                    pid(&pids.0),
                    pid(&pids.1)
                )
            }
            GroupState::Restarting { attempt, cooldown } => write!(
                f,
                "Restarting (#{}, cool-down {:.1}s)",
                attempt,
                cooldown.as_secs_f32()
            ),
            GroupState::Terminated => write!(f, "Terminated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_idle() {
        let state = GroupState::new();
        assert!(state.is_idle());
        assert!(!state.is_running());
    }

    #[test]
    fn test_running_state_has_uptime() {
        let state = GroupState::Running {
            since: Instant::now(),
            pids: (Some(10), Some(11)),
        };
        assert!(state.is_running());
        assert!(state.uptime().is_some());
    }

    #[test]
    fn test_only_running_has_uptime() {
        assert!(GroupState::Idle.uptime().is_none());
        assert!(GroupState::Starting { attempt: 0 }.uptime().is_none());
        assert!(GroupState::Terminated.uptime().is_none());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(format!("{}", GroupState::Idle), "Idle");
        assert_eq!(format!("{}", GroupState::Terminated), "Terminated");

        let state = GroupState::Running {
            since: Instant::now(),
            pids: (Some(42), None),
        };
        let display = format!("{}", state);
        assert!(display.starts_with("Running"));
        assert!(display.contains("42/?"));

        let state = GroupState::Restarting {
            attempt: 3,
            cooldown: Duration::from_secs(5),
        };
        assert_eq!(format!("{}", state), "Restarting (#3, cool-down 5.0s)");
    }
}
