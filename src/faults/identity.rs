use super::{FaultModel, others};
use crate::agent::AgentId;
use crate::perception::{Obstacle, ObstacleMap};

// Control condition: every other agent, unfiltered
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl FaultModel for Identity {
    fn perceive(&mut self, receiver: AgentId, agents: &ObstacleMap, non_agent: &[Obstacle]) -> Vec<Obstacle> {
        others(receiver, agents).cloned().chain(non_agent.iter().cloned()).collect()
    }

    fn name(&self) -> &str {
        "Identity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faults::test_support::line_of_agents;
    use crate::geometry::Vec3;
    use crate::perception::ObstacleKind;

    #[test]
    fn sees_every_other_agent_exactly_once() {
        let agents = line_of_agents(5, 10.0);
        let mut model = Identity;

        for receiver in agents.keys() {
            let seen = model.perceive(*receiver, &agents, &[]);
            let mut ids: Vec<u32> = seen.iter().map(|o| o.id).collect();
            ids.sort();
            let expected: Vec<u32> = agents.keys().filter(|id| *id != receiver).map(|id| id.0).collect();
            assert_eq!(ids, expected);
        }
    }

    #[test]
    fn silent_receiver_still_sees_the_others() {
        let agents = line_of_agents(3, 10.0);
        let seen = Identity.perceive(AgentId(99), &agents, &[]);
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn appends_non_agent_obstacles() {
        let agents = line_of_agents(2, 10.0);
        let walker = Obstacle::non_agent(500, ObstacleKind::Pedestrian, Vec3::planar(3.0, 3.0), 0.0, Vec3::ZERO, 0.0);
        let seen = Identity.perceive(AgentId(1), &agents, std::slice::from_ref(&walker));
        assert_eq!(seen.len(), 2);
        assert_eq!(seen.last(), Some(&walker));
    }
}
