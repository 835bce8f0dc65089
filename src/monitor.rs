use crate::agent::{AgentId, SharedAgent};
use crate::geometry::{Footprint, VehicleFootprint, finite_or_zero};
use crate::report::MinDistances;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

// Unordered, smaller id first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey(AgentId, AgentId);

impl PairKey {
    pub fn new(a: AgentId, b: AgentId) -> Self {
        if a <= b { Self(a, b) } else { Self(b, a) }
    }

    pub fn first(&self) -> AgentId {
        self.0
    }

    pub fn second(&self) -> AgentId {
        self.1
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.0, self.1)
    }
}

// Reads true states directly, never the relayed view
pub struct CollisionMonitor {
    agents: Vec<SharedAgent>,
    vehicle: VehicleFootprint,
    minimum: BTreeMap<PairKey, f64>,
    samples: u64,
}

impl CollisionMonitor {
    pub fn new(agents: Vec<SharedAgent>, vehicle: VehicleFootprint) -> Self {
        let minimum = Self::seed(&agents);
        Self {
            agents,
            vehicle,
            minimum,
            samples: 0,
        }
    }

    fn seed(agents: &[SharedAgent]) -> BTreeMap<PairKey, f64> {
        let mut minimum = BTreeMap::new();
        for (i, a) in agents.iter().enumerate() {
            for b in &agents[i + 1..] {
                if a.id() != b.id() {
                    minimum.insert(PairKey::new(a.id(), b.id()), f64::INFINITY);
                }
            }
        }
        minimum
    }

    // Only pairs reporting authoritatively right now are lowered
    pub fn sample(&mut self) {
        let present: Vec<(AgentId, Footprint)> = self
            .agents
            .iter()
            .filter_map(|agent| {
                let state = agent.true_state()?;
                if !state.is_authoritative() {
                    return None;
                }
                let position = state.position.sanitized();
                let heading = finite_or_zero(state.heading);
                Some((agent.id(), self.vehicle.polygon(position, heading)))
            })
            .collect();

        for (i, (a, fa)) in present.iter().enumerate() {
            for (b, fb) in &present[i + 1..] {
                let key = PairKey::new(*a, *b);
                let d = fa.distance(fb);
                if let Some(stored) = self.minimum.get_mut(&key) {
                    if d < *stored {
                        if d == 0.0 && *stored > 0.0 {
                            info!("Collision between agents {} at sample {}", key, self.samples);
                        }
                        *stored = d;
                    }
                }
            }
        }

        self.samples += 1;
        debug!("Collision monitor sample {}: {} agents reporting", self.samples, present.len());
    }

    pub fn minimum_distances(&self) -> MinDistances {
        MinDistances::new(self.minimum.clone())
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn reset(&mut self) {
        self.minimum = Self::seed(&self.agents);
        self.samples = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentHandle, AgentState, SourceTag};
    use crate::geometry::Vec3;
    use crate::sim_agent::SimulatedAgent;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn vehicle() -> VehicleFootprint {
        VehicleFootprint::centered(5.0, 2.0, 1.5)
    }

    fn agent(id: u32, x: f64) -> Arc<SimulatedAgent> {
        Arc::new(SimulatedAgent::stationary(AgentId(id), Vec3::planar(x, 0.0), 0.0))
    }

    fn place(agent: &SimulatedAgent, x: f64, tag: SourceTag) {
        let mut state = AgentState::at(agent.id(), Vec3::planar(x, 0.0), 0.0);
        state.source_tag = tag;
        agent.report(state);
    }

    fn monitor(agents: &[Arc<SimulatedAgent>]) -> CollisionMonitor {
        CollisionMonitor::new(agents.iter().map(|a| a.clone() as SharedAgent).collect(), vehicle())
    }

    #[test]
    fn pair_keys_are_canonical() {
        assert_eq!(PairKey::new(AgentId(9), AgentId(2)), PairKey::new(AgentId(2), AgentId(9)));
        assert_eq!(PairKey::new(AgentId(9), AgentId(2)).to_string(), "2,9");
    }

    #[tokio::test]
    async fn seeds_every_pair_at_infinity() {
        let agents = vec![agent(1, 0.0), agent(2, 10.0), agent(3, 20.0), agent(4, 30.0)];
        let monitor = monitor(&agents);
        let mins = monitor.minimum_distances();
        assert_eq!(mins.len(), 6);
        assert!(mins.values().all(|d| d.is_infinite()));
    }

    #[tokio::test]
    async fn pairs_never_reporting_together_stay_infinite() {
        let agents = vec![agent(1, 0.0), agent(2, 10.0), agent(3, 20.0)];
        let mut monitor = monitor(&agents);

        place(&agents[0], 0.0, SourceTag::Authoritative);
        place(&agents[1], 10.0, SourceTag::Authoritative);
        place(&agents[2], 20.0, SourceTag::External);
        monitor.sample();

        place(&agents[0], 0.0, SourceTag::External);
        place(&agents[2], 20.0, SourceTag::Authoritative);
        monitor.sample();

        let mins = monitor.minimum_distances();
        assert!((mins.get(PairKey::new(AgentId(1), AgentId(2))).unwrap() - 5.0).abs() < 1e-9);
        assert!((mins.get(PairKey::new(AgentId(2), AgentId(3))).unwrap() - 5.0).abs() < 1e-9);
        assert!(mins.get(PairKey::new(AgentId(1), AgentId(3))).unwrap().is_infinite());
        assert_eq!(monitor.samples(), 2);
    }

    #[tokio::test]
    async fn overlap_reports_zero_and_sticks() {
        let agents = vec![agent(1, 0.0), agent(2, 20.0)];
        let mut monitor = monitor(&agents);
        let key = PairKey::new(AgentId(1), AgentId(2));

        let mut history = Vec::new();
        for x in [20.0, 12.0, 3.0, 12.0, 40.0] {
            place(&agents[1], x, SourceTag::Authoritative);
            monitor.sample();
            history.push(monitor.minimum_distances().get(key).unwrap());
        }

        assert!((history[0] - 15.0).abs() < 1e-9);
        assert_eq!(history[2], 0.0);
        assert!(history.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(history[4], 0.0);
    }

    #[tokio::test]
    async fn unestimated_heading_is_treated_as_zero() {
        let agents = vec![agent(1, 0.0), agent(2, 100.0)];
        let mut monitor = monitor(&agents);
        let mut state = AgentState::at(AgentId(2), Vec3::planar(100.0, 0.0), f64::NAN);
        state.source_tag = SourceTag::Authoritative;
        agents[1].report(state);

        monitor.sample();
        let d = monitor.minimum_distances().get(PairKey::new(AgentId(1), AgentId(2))).unwrap();
        assert!((d - 95.0).abs() < 1e-9, "got {d}");
    }

    #[tokio::test]
    async fn infinite_position_is_not_a_collision() {
        let agents = vec![agent(1, 0.0), agent(2, 100.0)];
        let mut monitor = monitor(&agents);
        place(&agents[1], f64::INFINITY, SourceTag::Authoritative);

        monitor.sample();
        let d = monitor.minimum_distances().get(PairKey::new(AgentId(1), AgentId(2))).unwrap();
        assert!(d.is_infinite());
        assert!(monitor.minimum_distances().collisions().is_empty());
    }

    #[tokio::test]
    async fn reset_restores_infinity() {
        let agents = vec![agent(1, 0.0), agent(2, 6.0)];
        let mut monitor = monitor(&agents);
        monitor.sample();
        assert!(monitor.minimum_distances().overall().is_finite());
        monitor.reset();
        assert!(monitor.minimum_distances().overall().is_infinite());
        assert_eq!(monitor.samples(), 0);
    }

    proptest! {
        #[test]
        fn minimum_never_increases(xs in prop::collection::vec(-30.0f64..30.0, 1..40)) {
            let a = agent(1, 0.0);
            let b = agent(2, 50.0);
            let agents = vec![a, b.clone()];
            let mut monitor = monitor(&agents);
            let key = PairKey::new(AgentId(1), AgentId(2));
            let mut last = f64::INFINITY;
            for x in xs {
                place(&b, x, SourceTag::Authoritative);
                monitor.sample();
                let now = monitor.minimum_distances().get(key).unwrap();
                prop_assert!(now <= last);
                prop_assert!(now >= 0.0);
                last = now;
            }
        }
    }
}
