use super::{FaultModel, others};
use crate::agent::AgentId;
use crate::perception::{Obstacle, ObstacleMap};

// Limited sensing range: another agent is visible only when the gap
// between the two footprints is at most radius
#[derive(Debug, Clone)]
pub struct RadiusCutoff {
    radius: f64,
}

impl RadiusCutoff {
    pub fn new(radius: f64) -> Self {
        Self { radius }
    }
}

impl FaultModel for RadiusCutoff {
    fn perceive(&mut self, receiver: AgentId, agents: &ObstacleMap, non_agent: &[Obstacle]) -> Vec<Obstacle> {
        // A receiver with no pose this tick cannot measure range to anyone.
        let visible: Vec<Obstacle> = match agents.get(&receiver) {
            Some(ego) => others(receiver, agents)
                .filter(|o| ego.footprint.distance(&o.footprint) <= self.radius)
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        visible.into_iter().chain(non_agent.iter().cloned()).collect()
    }

    fn name(&self) -> &str {
        "RadiusCutoff"
    }
}
