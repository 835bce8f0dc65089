use super::{Delivery, FaultModel, others};
use crate::agent::AgentId;
use crate::perception::{Obstacle, ObstacleMap};
use std::time::Duration;

// Per-message network latency. Content is computed at tick time; the relay
// queues it and a single FIFO worker waits latency before each publish.
// When the tick period is shorter than the latency the queue grows without
// bound and deliveries fall further behind every tick
#[derive(Debug, Clone)]
pub struct QueuedLatency {
    latency: Duration,
}

impl QueuedLatency {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl FaultModel for QueuedLatency {
    fn perceive(&mut self, receiver: AgentId, agents: &ObstacleMap, non_agent: &[Obstacle]) -> Vec<Obstacle> {
        others(receiver, agents).cloned().chain(non_agent.iter().cloned()).collect()
    }

    fn delivery(&self) -> Delivery {
        Delivery::Queued(self.latency)
    }

    fn name(&self) -> &str {
        "QueuedLatency"
    }
}
