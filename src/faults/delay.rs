use super::{Delivery, FaultModel, others};
use crate::agent::AgentId;
use crate::perception::{Obstacle, ObstacleMap};
use std::time::Duration;

// Holds every receiver's snapshot for one shared delay per tick, then
// publishes the cohort together
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl FaultModel for FixedDelay {
    fn perceive(&mut self, receiver: AgentId, agents: &ObstacleMap, non_agent: &[Obstacle]) -> Vec<Obstacle> {
        others(receiver, agents).cloned().chain(non_agent.iter().cloned()).collect()
    }

    fn delivery(&self) -> Delivery {
        Delivery::Cohort(self.delay)
    }

    fn name(&self) -> &str {
        "FixedDelay"
    }
}
