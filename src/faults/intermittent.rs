use super::{FaultModel, others};
use crate::agent::AgentId;
use crate::perception::{Obstacle, ObstacleMap};
use rand::Rng;
use rand::rngs::StdRng;

// Message loss. Each (sender, receiver) link loses the sender's obstacle
// with probability p, drawn independently every tick
#[derive(Debug, Clone)]
pub struct BernoulliDrop {
    p: f64,
    rng: StdRng,
}

impl BernoulliDrop {
    pub fn new(p: f64, rng: StdRng) -> Self {
        Self { p, rng }
    }
}

impl FaultModel for BernoulliDrop {
    fn perceive(&mut self, receiver: AgentId, agents: &ObstacleMap, non_agent: &[Obstacle]) -> Vec<Obstacle> {
        let mut kept = Vec::with_capacity(agents.len() + non_agent.len());
        for obs in others(receiver, agents) {
            if self.rng.r#gen::<f64>() < self.p {
                continue;
            }
            kept.push(obs.clone());
        }
        kept.extend(non_agent.iter().cloned());
        kept
    }

    fn name(&self) -> &str {
        "BernoulliDrop"
    }
}
