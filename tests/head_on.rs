use std::sync::Arc;
use v2v_relay::perception::NoObstacles;
use v2v_relay::prelude::*;
use v2v_relay::traffic::TrafficPlan;

fn config(fault: FaultModelConfig) -> TrialConfig {
    TrialConfig::default()
        .with_name("head_on")
        .with_fault(fault)
        .with_horizon(12.0)
        .with_tick_rate(25.0)
        .with_footprint(VehicleFootprint::centered(5.0, 2.0, 1.5))
        .with_seed(7)
}

fn pair() -> (Arc<SimulatedAgent>, Arc<SimulatedAgent>) {
    let a = Arc::new(SimulatedAgent::stationary(AgentId(1), Vec3::ZERO, 0.0));
    let b = Arc::new(SimulatedAgent::moving(
        AgentId(2),
        Vec3::planar(50.0, 0.0),
        std::f64::consts::PI,
        Vec3::planar(-5.0, 0.0),
    ));
    (a, b)
}

async fn run(fault: FaultModelConfig) -> (TrialOutcome, Arc<SimulatedAgent>, Arc<SimulatedAgent>) {
    let (a, b) = pair();
    let agents: Vec<SharedAgent> = vec![a.clone(), b.clone()];
    let trial = TrialCoordinator::new(config(fault)).unwrap();
    let outcome = trial
        .run(agents, Arc::new(NoObstacles), TrafficPlan::default())
        .await
        .unwrap();
    (outcome, a, b)
}

#[tokio::test(start_paused = true)]
async fn identity_reports_the_collision() {
    let (outcome, a, _) = run(FaultModelConfig::Identity).await;
    let key = PairKey::new(AgentId(1), AgentId(2));

    assert!(outcome.min_distances.get(key).unwrap().abs() < 1e-3);
    assert_eq!(outcome.min_distances.collisions(), vec![key]);
    assert_eq!(outcome.clock_ticks, 121);

    let snapshots = a.perception_snapshots();
    assert!(snapshots.len() > 100);
    assert!(snapshots.iter().all(|s| s.agent_ids() == vec![2]));
}

#[tokio::test(start_paused = true)]
async fn radius_filter_does_not_blind_the_monitor() {
    let (outcome, a, _) = run(FaultModelConfig::Radius { radius: 10.0 }).await;

    assert!(outcome.min_distances.overall().abs() < 1e-3);

    // Far apart at first, so the relay hides B from A until it closes in.
    let snapshots = a.perception_snapshots();
    assert!(snapshots.first().unwrap().agent_ids().is_empty());
    assert!(snapshots.iter().any(|s| s.agent_ids() == vec![2]));
}

#[tokio::test(start_paused = true)]
async fn relay_is_quiet_after_the_trial() {
    let (outcome, a, b) = run(FaultModelConfig::Latency { latency_secs: 0.2 }).await;
    assert!(outcome.min_distances.overall().abs() < 1e-3);

    let seen = a.received().len() + b.received().len();
    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    assert_eq!(a.received().len() + b.received().len(), seen);
}

#[tokio::test(start_paused = true)]
async fn dropping_every_message_still_measures_truth() {
    let (outcome, a, _) = run(FaultModelConfig::Drop { probability: 1.0 }).await;
    assert!(outcome.min_distances.overall().abs() < 1e-3);
    assert!(a.perception_snapshots().iter().all(|s| s.obstacles.is_empty()));
    assert!(outcome.relay.obstacles_dropped > 0);
}
