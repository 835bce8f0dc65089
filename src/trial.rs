use crate::agent::{AgentId, Channel, SharedAgent};
use crate::clock::{ClockTick, ScenarioClock};
use crate::config::TrialConfig;
use crate::error::{ConfigError, TrialResult};
use crate::metrics::RelayMetricsSnapshot;
use crate::monitor::CollisionMonitor;
use crate::perception::ObstacleSource;
use crate::relay::RelayLoop;
use crate::report::MinDistances;
use crate::scenario::ScenarioSpec;
use crate::traffic::TrafficPlan;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRequest {
    pub agent_id: AgentId,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialOutcome {
    pub min_distances: MinDistances,
    pub clock_ticks: u64,
    pub simulated_secs: f64,
    pub relay: RelayMetricsSnapshot,
}

pub struct TrialCoordinator {
    config: TrialConfig,
}

impl TrialCoordinator {
    pub fn new(config: TrialConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrialConfig {
        &self.config
    }

    // Builds the scenario's agents (ids seeded from the config seed when
    // set) and runs one trial over them
    pub async fn run_scenario(&self, scenario: &ScenarioSpec) -> TrialResult<TrialOutcome> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let built = scenario.build(&mut rng);
        self.run(built.handles(), built.obstacles, built.traffic).await
    }

    // Runs the clock to its horizon while the relay publishes in the
    // background. The relay is stopped before this returns, whatever the
    // result
    pub async fn run(
        &self,
        agents: Vec<SharedAgent>,
        obstacles: Arc<dyn ObstacleSource>,
        mut traffic: TrafficPlan,
    ) -> TrialResult<TrialOutcome> {
        let config = &self.config;
        info!("Starting trial: {}", config.name);
        info!("Fault model: {}", config.fault);
        info!("Agents: {}, horizon: {:.1}s", agents.len(), config.horizon_secs);

        traffic.force_green |= config.force_green;
        let fault = config.fault.build(config.footprint, config.seed)?;
        let mut relay = RelayLoop::new(agents.clone(), fault, obstacles, config.footprint, config.tick_rate_hz)?;
        let mut clock = ScenarioClock::new(config.clock_step(), config.horizon_secs, traffic)?;
        clock.bind(&agents)?;
        let mut monitor = CollisionMonitor::new(agents.clone(), config.footprint);

        relay.start();
        let driven = drive(&mut clock, &relay, &mut monitor, &agents).await;
        relay.stop().await;
        driven?;

        let outcome = TrialOutcome {
            min_distances: monitor.minimum_distances(),
            clock_ticks: clock.ticks(),
            simulated_secs: clock.now_secs(),
            relay: relay.metrics().snapshot(),
        };
        info!(
            "Trial {} finished: min distance {:.3}, {} collision(s), {} relay ticks",
            config.name,
            outcome.min_distances.overall(),
            outcome.min_distances.collisions().len(),
            outcome.relay.ticks
        );
        Ok(outcome)
    }
}

async fn drive(
    clock: &mut ScenarioClock,
    relay: &RelayLoop,
    monitor: &mut CollisionMonitor,
    agents: &[SharedAgent],
) -> TrialResult<()> {
    while let Some(tick) = clock.next_tick().await? {
        let payload = serde_json::to_vec(&tick.traffic)?;
        let delivered = relay.broadcast(Channel::TrafficControl, &payload);
        debug!("Traffic state {} delivered to {} agents", tick.traffic.sequence, delivered);

        start_routing(&tick, agents)?;
        monitor.sample();
    }
    Ok(())
}

fn start_routing(tick: &ClockTick, agents: &[SharedAgent]) -> TrialResult<()> {
    for id in &tick.starts {
        let Some(agent) = agents.iter().find(|a| a.id() == *id) else {
            continue;
        };
        let payload = serde_json::to_vec(&RoutingRequest {
            agent_id: *id,
            timestamp: tick.secs(),
        })?;
        match agent.publish(Channel::RoutingStart, &payload) {
            Ok(()) => info!("Agent {} starts routing at {:.1}s", id, tick.secs()),
            Err(e) => warn!("Routing start for agent {} failed: {}", id, e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faults::FaultModelConfig;
    use crate::geometry::{Vec3, VehicleFootprint};
    use crate::perception::NoObstacles;
    use crate::sim_agent::SimulatedAgent;

    fn config(fault: FaultModelConfig) -> TrialConfig {
        TrialConfig::default()
            .with_fault(fault)
            .with_horizon(2.0)
            .with_footprint(VehicleFootprint::centered(5.0, 2.0, 1.5))
            .with_seed(11)
    }

    #[test]
    fn rejects_bad_config_before_anything_runs() {
        assert!(TrialCoordinator::new(config(FaultModelConfig::Drop { probability: 2.0 })).is_err());
        assert!(TrialCoordinator::new(config(FaultModelConfig::Identity).with_horizon(-1.0)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stationary_pair_reports_their_gap() {
        let a = Arc::new(SimulatedAgent::stationary(AgentId(1), Vec3::ZERO, 0.0));
        let b = Arc::new(SimulatedAgent::stationary(AgentId(2), Vec3::planar(12.0, 0.0), 0.0).with_start_threshold(1.0));
        let agents: Vec<SharedAgent> = vec![a.clone(), b.clone()];

        let trial = TrialCoordinator::new(config(FaultModelConfig::Identity)).unwrap();
        let outcome = trial.run(agents, Arc::new(NoObstacles), TrafficPlan::default()).await.unwrap();

        assert!((outcome.min_distances.overall() - 7.0).abs() < 1e-9);
        assert_eq!(outcome.clock_ticks, 21);
        assert!((outcome.simulated_secs - 2.0).abs() < 1e-9);
        assert!(outcome.relay.ticks > 0);

        assert!(a.routing_started() && b.routing_started());
        let requests: Vec<RoutingRequest> = b
            .received_on(Channel::RoutingStart)
            .iter()
            .map(|r| serde_json::from_slice(&r.payload).unwrap())
            .collect();
        assert_eq!(requests, vec![RoutingRequest { agent_id: AgentId(2), timestamp: 1.0 }]);
        assert_eq!(a.received_on(Channel::TrafficControl).len(), 21);
        assert!(!a.perception_snapshots().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_agent_does_not_abort_the_trial() {
        let a = Arc::new(SimulatedAgent::stationary(AgentId(1), Vec3::ZERO, 0.0));
        let b = Arc::new(SimulatedAgent::stationary(AgentId(2), Vec3::planar(8.0, 0.0), 0.0));
        b.set_reachable(false);
        let agents: Vec<SharedAgent> = vec![a.clone(), b];

        let trial = TrialCoordinator::new(config(FaultModelConfig::Latency { latency_secs: 0.2 })).unwrap();
        let outcome = trial.run(agents, Arc::new(NoObstacles), TrafficPlan::default()).await.unwrap();

        assert!((outcome.min_distances.overall() - 3.0).abs() < 1e-9);
        assert!(outcome.relay.publish_failures > 0);
        assert!(!a.perception_snapshots().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_agents_fail_at_setup() {
        let a: SharedAgent = Arc::new(SimulatedAgent::stationary(AgentId(1), Vec3::ZERO, 0.0));
        let trial = TrialCoordinator::new(config(FaultModelConfig::Identity)).unwrap();
        let result = trial.run(vec![a.clone(), a], Arc::new(NoObstacles), TrafficPlan::default()).await;
        assert!(matches!(
            result,
            Err(crate::error::TrialError::Config(ConfigError::DuplicateAgent(AgentId(1))))
        ));
    }
}
