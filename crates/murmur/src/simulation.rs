//! Emulated cluster harness.
//!
//! Drives N nodes over an [`EmulatedNetwork`] from one thread, one global
//! tick at a time. Node 1 is the introducer; node `i` starts at tick
//! `(i - 1) * join_stagger`. Optionally crash-stops one node mid-run and
//! records which survivors noticed.

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use murmur_common::{NodeIdentity, Tick};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::ProtocolConfig;
use crate::node::{Node, NodeSnapshot};
use crate::observer::{EventKind, EventLog, MembershipEvent, TracingObserver};
use crate::transport::{EmulatedNetwork, LinkStats};

/// Simulation parameters
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub nodes: u32,
    pub ticks: Tick,
    pub drop_rate: f64,
    /// Ticks between successive node starts
    pub join_stagger: Tick,
    /// Crash-stop (node index, tick)
    pub failure: Option<(u32, Tick)>,
    pub seed: u64,
    pub protocol: ProtocolConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: 10,
            ticks: 700,
            drop_rate: 0.0,
            join_stagger: 1,
            failure: None,
            seed: 42,
            protocol: ProtocolConfig::default(),
        }
    }
}

/// How the cluster reacted to the injected crash
#[derive(Debug, Clone, Serialize)]
pub struct FailureOutcome {
    pub node: NodeIdentity,
    pub failed_at: Tick,
    /// First tick at which each survivor evicted the failed node
    pub detected_by: Vec<(NodeIdentity, Tick)>,
    /// Survivors that never evicted it
    pub missed_by: Vec<NodeIdentity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkReport {
    pub node: NodeIdentity,
    #[serde(flatten)]
    pub stats: LinkStats,
}

/// End-of-run summary
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub started_at: DateTime<Utc>,
    pub ticks: Tick,
    pub seed: u64,
    pub drop_rate: f64,
    /// Every live node's table holds exactly the live node set
    pub converged: bool,
    pub nodes: Vec<NodeSnapshot>,
    pub failure: Option<FailureOutcome>,
    pub network: Vec<LinkReport>,
    pub events: Vec<MembershipEvent>,
}

type SimNode = Node<Arc<EmulatedNetwork>, (TracingObserver, EventLog), StdRng>;

struct Slot {
    node: SimNode,
    start_at: Tick,
    crashed: bool,
}

pub struct Simulation {
    config: SimulationConfig,
    network: Arc<EmulatedNetwork>,
    log: EventLog,
    slots: Vec<Slot>,
    tick: Tick,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        if config.nodes == 0 {
            bail!("simulation needs at least one node");
        }
        if !(0.0..=1.0).contains(&config.drop_rate) {
            bail!("drop rate must be within [0, 1], got {}", config.drop_rate);
        }
        if let Some((index, _)) = config.failure {
            if index == 0 || index > config.nodes {
                bail!("failed node {} is not in 1..={}", index, config.nodes);
            }
        }
        let last_start = u64::from(config.nodes - 1).checked_mul(config.join_stagger);
        if last_start.is_none() {
            bail!(
                "join stagger {} is too large for {} nodes",
                config.join_stagger,
                config.nodes
            );
        }
        config.protocol.validate()?;

        let network = Arc::new(EmulatedNetwork::new(config.drop_rate, config.seed));
        let log = EventLog::new();
        let bootstrap = NodeIdentity::from_index(1);

        let slots = (1..=config.nodes)
            .map(|index| {
                let id = NodeIdentity::from_index(index);
                network.register(id);
                Slot {
                    node: Node::new(
                        id,
                        bootstrap,
                        config.protocol.clone(),
                        network.clone(),
                        (TracingObserver, log.clone()),
                        StdRng::seed_from_u64(config.seed.wrapping_add(u64::from(index))),
                    ),
                    start_at: u64::from(index - 1) * config.join_stagger,
                    crashed: false,
                }
            })
            .collect();

        Ok(Self {
            config,
            network,
            log,
            slots,
            tick: 0,
        })
    }

    /// Advance every live node by one tick
    pub fn step(&mut self) {
        let now = self.tick;
        self.log.set_tick(now);

        if let Some((index, at)) = self.config.failure {
            if at == now {
                self.crash(index);
            }
        }

        for slot in self.slots.iter_mut() {
            if slot.crashed || slot.start_at > now {
                continue;
            }
            if slot.start_at == now {
                slot.node.start();
            }
            slot.node.tick();
        }

        self.tick += 1;
    }

    fn crash(&mut self, index: u32) {
        if let Some(slot) = self.slots.get_mut(index as usize - 1) {
            let id = slot.node.identity();
            slot.crashed = true;
            self.network.fail(id);
            tracing::warn!(node = %id, tick = self.tick, "💥 Node crashed");
        }
    }

    /// Run the configured number of ticks and summarise
    pub fn run(mut self) -> SimulationReport {
        let started_at = Utc::now();
        while self.tick < self.config.ticks {
            self.step();
            if self.tick % 100 == 0 {
                tracing::debug!(
                    tick = self.tick,
                    events = self.log.len(),
                    converged = self.converged(),
                    "Simulation progress"
                );
            }
        }
        self.report(started_at)
    }

    fn live_ids(&self) -> BTreeSet<NodeIdentity> {
        self.slots
            .iter()
            .filter(|s| !s.crashed)
            .map(|s| s.node.identity())
            .collect()
    }

    pub fn converged(&self) -> bool {
        let live = self.live_ids();
        self.slots.iter().filter(|s| !s.crashed).all(|s| {
            s.node.is_joined()
                && s.node.table().iter().map(|e| e.id).collect::<BTreeSet<_>>() == live
        })
    }

    fn failure_outcome(&self) -> Option<FailureOutcome> {
        let (index, failed_at) = self.config.failure?;
        if failed_at >= self.tick {
            return None;
        }
        let failed = NodeIdentity::from_index(index);

        let mut detected_by = Vec::new();
        let mut missed_by = Vec::new();
        for survivor in self.live_ids() {
            let first_removal = self
                .log
                .between(survivor, failed)
                .into_iter()
                .find(|e| e.kind == EventKind::Removed && e.tick >= failed_at);
            match first_removal {
                Some(event) => detected_by.push((survivor, event.tick)),
                None => missed_by.push(survivor),
            }
        }

        Some(FailureOutcome {
            node: failed,
            failed_at,
            detected_by,
            missed_by,
        })
    }

    fn report(&self, started_at: DateTime<Utc>) -> SimulationReport {
        SimulationReport {
            started_at,
            ticks: self.tick,
            seed: self.config.seed,
            drop_rate: self.config.drop_rate,
            converged: self.converged(),
            nodes: self.slots.iter().map(|s| s.node.snapshot()).collect(),
            failure: self.failure_outcome(),
            network: self
                .network
                .all_stats()
                .into_iter()
                .map(|(node, stats)| LinkReport { node, stats })
                .collect(),
            events: self.log.events(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_config() {
        assert!(Simulation::new(SimulationConfig {
            nodes: 0,
            ..Default::default()
        })
        .is_err());
        assert!(Simulation::new(SimulationConfig {
            failure: Some((11, 5)),
            ..Default::default()
        })
        .is_err());
        assert!(Simulation::new(SimulationConfig {
            nodes: 3,
            join_stagger: u64::MAX,
            ..Default::default()
        })
        .is_err());
        assert!(Simulation::new(SimulationConfig {
            drop_rate: 1.5,
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn test_lossless_cluster_converges() {
        let report = Simulation::new(SimulationConfig {
            nodes: 6,
            ticks: 80,
            ..Default::default()
        })
        .unwrap()
        .run();

        assert!(report.converged);
        assert_eq!(report.ticks, 80);
        for node in &report.nodes {
            assert_eq!(node.members.len(), 6);
        }
        assert!(report.events.iter().all(|e| e.kind == EventKind::Added));
    }

    #[test]
    fn test_crash_is_detected_by_every_survivor() {
        let report = Simulation::new(SimulationConfig {
            nodes: 5,
            ticks: 120,
            failure: Some((3, 50)),
            ..Default::default()
        })
        .unwrap()
        .run();

        let outcome = report.failure.unwrap();
        assert_eq!(outcome.node, NodeIdentity::from_index(3));
        assert!(outcome.missed_by.is_empty());
        assert_eq!(outcome.detected_by.len(), 4);
        for (_, tick) in &outcome.detected_by {
            assert!(*tick > 50);
        }
    }

    #[test]
    fn test_tombstones_let_cluster_forget_crashed_node() {
        let protocol = ProtocolConfig {
            tombstone_ticks: 60,
            ..Default::default()
        };
        let report = Simulation::new(SimulationConfig {
            nodes: 5,
            ticks: 160,
            failure: Some((3, 50)),
            protocol,
            ..Default::default()
        })
        .unwrap()
        .run();

        assert!(report.converged);
        let crashed = NodeIdentity::from_index(3);
        for node in report.nodes.iter().filter(|n| n.identity != crashed) {
            assert_eq!(node.members.len(), 4);
            assert!(node.members.iter().all(|m| m.id != crashed));
        }
    }

    #[test]
    fn test_lossy_network_still_joins_everyone() {
        let report = Simulation::new(SimulationConfig {
            nodes: 4,
            ticks: 150,
            drop_rate: 0.1,
            seed: 7,
            protocol: ProtocolConfig {
                join_retry: Some(crate::config::JoinRetryConfig {
                    interval_ticks: 5,
                    max_attempts: 20,
                }),
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap()
        .run();

        assert!(report.nodes.iter().all(|n| n.join_state.is_joined()));
        assert!(report.network.iter().any(|l| l.stats.dropped > 0));
    }
}
