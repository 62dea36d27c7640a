//! Service instance lifecycle state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The execution state of a service instance.
///
/// Legal transitions:
///
/// ```text
/// Stopped ── start ──▶ Booting ──▶ Running ── stop ──▶ ShuttingDown ──▶ Stopped
///                         │                                 │
///                         └──── boot/start failure ──┐      └─ shutdown timeout ─▶ Crashed
///                                                    ▼
///                                                 Stopped
/// ```
///
/// A boot or start failure never reaches `Running`; a lifecycle deadline
/// overrun during teardown ends in `Crashed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// No live sandbox for this project.
    Stopped,
    /// Boot and start callbacks are running; not yet serving.
    Booting,
    /// Serving routes, jobs, and delayed tasks.
    Running,
    /// Shutdown callback and teardown in progress.
    ShuttingDown,
    /// Forcibly torn down after a lifecycle deadline overrun.
    Crashed,
}

impl InstanceState {
    /// Whether the instance accepts router, scheduler, or executor traffic.
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether this is a terminal state (no live sandbox remains).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Crashed)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Booting => "booting",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Crashed => "crashed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_is_the_only_serving_state() {
        assert!(InstanceState::Running.is_running());
        for state in [
            InstanceState::Stopped,
            InstanceState::Booting,
            InstanceState::ShuttingDown,
            InstanceState::Crashed,
        ] {
            assert!(!state.is_running());
        }
    }

    #[test]
    fn terminal_states() {
        assert!(InstanceState::Stopped.is_terminal());
        assert!(InstanceState::Crashed.is_terminal());
        assert!(!InstanceState::Running.is_terminal());
        assert!(!InstanceState::ShuttingDown.is_terminal());
    }

    #[test]
    fn json_format_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&InstanceState::ShuttingDown).unwrap(),
            "\"shutting_down\""
        );
        assert_eq!(
            serde_json::to_string(&InstanceState::Running).unwrap(),
            "\"running\""
        );
    }
}
