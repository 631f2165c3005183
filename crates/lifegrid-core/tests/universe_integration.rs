use lifegrid_core::config::EnergyModel;
use lifegrid_core::report::RunReport;
use lifegrid_core::{
    Action, AgentId, Coordinator, DeathCause, Direction, FixedPolicy, FounderSpec,
    PlacementStrategy, Position, SimConfig, WeightedPolicy,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn breeding_config(placement: PlacementStrategy) -> SimConfig {
    SimConfig {
        seed: 7,
        height: 16,
        width: 16,
        initial_population: 8,
        placement,
        run_duration_ms: 150,
        sample_interval_ms: 25,
        ..SimConfig::default()
    }
}

fn breeding_policy() -> WeightedPolicy {
    WeightedPolicy::new([1.0, 1.0, 1.0, 1.0, 1.0, 3.0])
}

fn assert_consistent(report: &RunReport) {
    assert!(report.drained, "agent threads did not drain");
    assert_eq!(report.counts.living, 0);
    assert_eq!(
        (report.counts.living + report.counts.dead) as u64,
        report.counts.allocated
    );
    assert_eq!(report.agents.len() as u64, report.counts.allocated);
    assert_eq!(report.deaths.total(), report.agents.len());
    assert!(report.lineage_violations().is_empty());
    assert!(report.out_of_bounds_positions().is_empty());

    let extent = report.extent();
    let by_id: HashMap<AgentId, _> = report.agents.iter().map(|s| (s.id, s)).collect();
    for agent in &report.agents {
        assert!(agent.death.is_some_and(|at| at >= agent.birth));

        for pair in agent.path.windows(2) {
            let (from, to) = (pair[0].position, pair[1].position);
            assert!(
                Direction::ALL.iter().any(|&d| extent.step(from, d) == to),
                "agent {} jumped from {from} to {to}",
                agent.id
            );
            assert!(pair[0].at < pair[1].at);
        }
        for pair in agent.log.windows(2) {
            assert!(pair[0].at < pair[1].at);
        }

        for parent in &agent.parents {
            let parent = by_id[parent];
            assert_eq!(agent.generation, parent.generation + 1);
            assert!(parent.children.contains(&agent.id));
            assert!(agent.id > parent.id);
        }
        for child in &agent.children {
            assert_eq!(by_id[child].parents, vec![agent.id]);
        }
    }

    for frame in &report.population_map {
        assert_eq!(frame.cells.len(), extent.cell_count());
        for &cell in frame.cells.iter().filter(|&&c| c != 0) {
            assert!(by_id.contains_key(&AgentId(cell - 1)));
        }
    }
}

#[test]
fn breeding_run_keeps_population_consistent() {
    let coordinator = Coordinator::new(breeding_config(PlacementStrategy::Diagonal));
    let universe = Arc::clone(coordinator.universe());

    let observer = thread::spawn(move || {
        let mut violations = Vec::new();
        let mut unbalanced = Vec::new();
        let mut scans = 0;
        while !universe.is_frozen() {
            violations.extend(universe.occupancy_violations());
            let counts = universe.registry().counts();
            if (counts.living + counts.dead) as u64 != counts.allocated {
                unbalanced.push(counts);
            }
            scans += 1;
            thread::sleep(Duration::from_millis(2));
        }
        (violations, unbalanced, scans)
    });

    let report = coordinator
        .run_with(|_| Box::new(breeding_policy()))
        .unwrap();
    let (violations, unbalanced, scans) = observer.join().unwrap();

    assert!(scans > 0);
    assert!(violations.is_empty(), "{violations:?}");
    assert!(unbalanced.is_empty(), "{unbalanced:?}");
    assert_eq!(report.founders, 8);
    assert!(report.births > 0);
    assert_eq!(
        report.births,
        report.agents.iter().filter(|s| !s.parents.is_empty()).count()
    );
    assert!(report.max_generation() >= 1);
    assert_consistent(&report);
}

#[test]
fn random_placement_run_is_consistent() {
    let report = Coordinator::new(breeding_config(PlacementStrategy::Random))
        .run()
        .unwrap();
    assert_eq!(report.founders, 8);
    assert_consistent(&report);
}

#[test]
fn founders_begin_on_distinct_cells() {
    let report = Coordinator::new(breeding_config(PlacementStrategy::Diagonal))
        .run_with(|_| Box::new(FixedPolicy(Action::Idle)))
        .unwrap();
    let starts: HashSet<Position> = report
        .agents
        .iter()
        .filter(|s| s.parents.is_empty())
        .map(|s| s.path[0].position)
        .collect();
    assert_eq!(starts.len(), 8);
    assert_consistent(&report);
}

#[test]
fn converging_founders_resolve_without_hanging() {
    let config = SimConfig {
        height: 3,
        width: 5,
        run_duration_ms: 60,
        sample_interval_ms: 0,
        energy: EnergyModel {
            tick_cost: 0,
            move_failure_cost: 0,
            ..EnergyModel::default()
        },
        ..SimConfig::default()
    };
    let founders = vec![
        FounderSpec::new(Position::new(1, 0), FixedPolicy(Action::Move(Direction::East))),
        FounderSpec::new(Position::new(1, 2), FixedPolicy(Action::Move(Direction::West))),
    ];
    let report = Coordinator::new(config).run_founders(founders).unwrap();

    assert_consistent(&report);
    let successes: usize = report.agents.iter().map(|s| s.successful_actions()).sum();
    assert_eq!(successes, 1);
    let attempts: usize = report.agents.iter().map(|s| s.log.len()).sum();
    assert!(attempts > 2);
    assert!(report
        .agents
        .iter()
        .all(|s| s.cause == Some(DeathCause::Frozen)));

    let last = report.population_map.last().unwrap();
    assert_eq!(last.cells.iter().filter(|&&c| c != 0).count(), 2);
    assert_ne!(last.cells[report.extent().index(Position::new(1, 1))], 0);
}

#[test]
fn starving_founders_die_before_freeze() {
    let config = SimConfig {
        height: 5,
        width: 5,
        run_duration_ms: 100,
        sample_interval_ms: 0,
        energy: EnergyModel {
            tick_cost: 10,
            idle_refund: 0,
            ..EnergyModel::default()
        },
        ..SimConfig::default()
    };
    let founders = vec![
        FounderSpec::new(Position::new(0, 0), FixedPolicy(Action::Idle)).with_energy(30),
        FounderSpec::new(Position::new(2, 2), FixedPolicy(Action::Idle)).with_energy(30),
    ];
    let report = Coordinator::new(config).run_founders(founders).unwrap();

    assert_consistent(&report);
    assert_eq!(report.deaths.starvation, 2);
    for agent in &report.agents {
        assert_eq!(agent.log.len(), 3);
        assert_eq!(agent.final_energy, Some(0));
        assert!(agent.death.is_some_and(|at| at < report.stopped));
    }
    let last = report.population_map.last().unwrap();
    assert!(last.cells.iter().all(|&c| c == 0));
}

#[test]
fn report_serializes_to_json() {
    let report = Coordinator::new(SimConfig {
        initial_population: 3,
        height: 6,
        width: 6,
        run_duration_ms: 30,
        sample_interval_ms: 10,
        ..SimConfig::default()
    })
    .run()
    .unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["height"], 6);
    assert_eq!(json["founders"], 3);
    assert_eq!(json["agents"].as_array().map(Vec::len), Some(report.agents.len()));
}
