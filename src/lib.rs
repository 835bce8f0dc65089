pub mod agent;
pub mod clock;
pub mod config;
pub mod error;
pub mod faults;
pub mod geometry;
pub mod metrics;
pub mod monitor;
pub mod perception;
pub mod relay;
pub mod report;
pub mod scenario;
pub mod sim_agent;
pub mod sweep;
pub mod traffic;
pub mod trial;

pub use agent::{AgentHandle, AgentId, AgentState};
pub use config::TrialConfig;
pub use faults::{FaultModel, FaultModelConfig};
pub use monitor::CollisionMonitor;
pub use relay::RelayLoop;
pub use trial::{TrialCoordinator, TrialOutcome};

pub mod prelude {
    pub use crate::agent::{AgentHandle, AgentId, AgentState, Channel, SharedAgent, SourceTag};
    pub use crate::clock::{ClockState, ScenarioClock};
    pub use crate::config::TrialConfig;
    pub use crate::error::{ConfigError, PublishError, TrialError, TrialResult};
    pub use crate::faults::{FaultModel, FaultModelConfig};
    pub use crate::geometry::{Vec3, VehicleFootprint};
    pub use crate::monitor::{CollisionMonitor, PairKey};
    pub use crate::perception::{Obstacle, ObstacleSource, PerceptionSnapshot};
    pub use crate::relay::RelayLoop;
    pub use crate::report::MinDistances;
    pub use crate::scenario::ScenarioSpec;
    pub use crate::sim_agent::SimulatedAgent;
    pub use crate::sweep::Sweep;
    pub use crate::trial::{TrialCoordinator, TrialOutcome};
}
