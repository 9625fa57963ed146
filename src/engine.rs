//! The engine lifecycle exposed to the hosting node

/// The phases an engine moves through from cold start to participation.
///
/// Transitions are unidirectional, except that insufficient quorum re-enters
/// `StateSyncing` or `Bootstrapping` when retries are configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    Initializing,
    StateSyncing,
    Bootstrapping,
    NormalOp,
}

impl State {
    pub fn can_transition(&self, to: State) -> bool {
        match (self, to) {
            (State::Initializing, State::StateSyncing) => true,
            (State::Initializing, State::Bootstrapping) => true,
            (State::StateSyncing, State::StateSyncing) => true,
            (State::StateSyncing, State::Bootstrapping) => true,
            (State::Bootstrapping, State::Bootstrapping) => true,
            (State::Bootstrapping, State::NormalOp) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            State::Initializing => write!(f, "initializing"),
            State::StateSyncing => write!(f, "state syncing"),
            State::Bootstrapping => write!(f, "bootstrapping"),
            State::NormalOp => write!(f, "normal operation"),
        }
    }
}

/// Snowstorm counters included in the health report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnowstormHealth {
    pub processing: usize,
    pub virtuous: usize,
    pub preferences: usize,
}

/// A JSON-marshallable health report for the DAG engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Health {
    pub outstanding_vertices: usize,
    /// Age in milliseconds of the oldest vertex still processing.
    pub longest_running_vertex_ms: u64,
    pub snowstorm: SnowstormHealth,
}
