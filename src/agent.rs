// Agents are external control stacks, the relay only pulls their state and pushes bytes

use crate::error::PublishError;
use crate::geometry::Vec3;
use parking_lot::RwLock;
use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub u32);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Where a state report came from. Only reports produced by the agent's own
// simulated control loop are trusted as ground truth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceTag {
    Authoritative,
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: AgentId,
    pub position: Vec3,
    pub heading: f64,
    pub linear_velocity: Vec3,
    pub linear_acceleration: Vec3,
    pub timestamp: f64,
    pub source_tag: SourceTag,
}

impl AgentState {
    pub fn at(agent_id: AgentId, position: Vec3, heading: f64) -> Self {
        Self {
            agent_id,
            position,
            heading,
            linear_velocity: Vec3::ZERO,
            linear_acceleration: Vec3::ZERO,
            timestamp: 0.0,
            source_tag: SourceTag::Authoritative,
        }
    }

    pub fn is_authoritative(&self) -> bool {
        self.source_tag == SourceTag::Authoritative
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Perception,
    TrafficControl,
    RoutingStart,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Perception => "perception",
            Channel::TrafficControl => "traffic_control",
            Channel::RoutingStart => "routing_start",
        };
        f.write_str(name)
    }
}

pub trait AgentHandle: Send + Sync {
    fn id(&self) -> AgentId;

    // Bounded, non-blocking push of one payload to the agent
    fn publish(&self, channel: Channel, payload: &[u8]) -> Result<(), PublishError>;

    // Last state the agent reported, or None if it has not reported yet
    fn true_state(&self) -> Option<AgentState>;

    // Simulated seconds after trial start at which the agent starts routing
    fn start_threshold(&self) -> f64;
}

pub type SharedAgent = Arc<dyn AgentHandle>;

// Latest reported state, swapped as a whole. Readers get a consistent copy
// no matter how often the owner writes
#[derive(Debug, Default)]
pub struct StateCell {
    inner: RwLock<Option<Arc<AgentState>>>,
}

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: AgentState) -> Self {
        Self {
            inner: RwLock::new(Some(Arc::new(state))),
        }
    }

    pub fn store(&self, state: AgentState) {
        *self.inner.write() = Some(Arc::new(state));
    }

    pub fn load(&self) -> Option<AgentState> {
        self.inner.read().as_deref().cloned()
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }
}

// n distinct six-digit ids in ascending order
pub fn random_agent_ids<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<AgentId> {
    const LOW: u32 = 100_000;
    const SPAN: usize = 899_999;

    let mut ids: Vec<AgentId> = index::sample(rng, SPAN, n.min(SPAN))
        .into_iter()
        .map(|i| AgentId(LOW + i as u32))
        .collect();
    ids.sort();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn state_cell_swaps_whole_states() {
        let cell = StateCell::new();
        assert!(cell.load().is_none());

        cell.store(AgentState::at(AgentId(1), Vec3::planar(1.0, 2.0), 0.5));
        let first = cell.load().unwrap();
        cell.store(AgentState::at(AgentId(1), Vec3::planar(3.0, 4.0), 1.0));

        assert_eq!(first.position, Vec3::planar(1.0, 2.0));
        assert_eq!(cell.load().unwrap().heading, 1.0);

        cell.clear();
        assert!(cell.load().is_none());
    }

    #[test]
    fn random_ids_are_sorted_distinct_and_six_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        let ids = random_agent_ids(5, &mut rng);
        assert_eq!(ids.len(), 5);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert!(ids.iter().all(|id| (100_000..999_999).contains(&id.0)));
    }
}
