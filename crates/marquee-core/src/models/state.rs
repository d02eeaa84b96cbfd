use serde::{Deserialize, Serialize};

/// Where a handle's pipeline stands.
///
/// `Idle → Loading → {Ready | Empty | Error}`; any terminal state goes back
/// to `Loading` on refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// No account handle configured.
    Idle,
    /// Fetch or resolution in flight.
    Loading,
    /// Last run produced at least one item.
    Ready,
    /// Last run succeeded with zero items.
    Empty,
    /// Last run failed outright.
    Error,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Empty => "empty",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
