use crate::agent::{ActionRecord, AgentRecord, DeathCause, PathEntry};
use crate::clock::Timestamp;
use crate::position::{Extent, Position};
use crate::registry::{AgentId, PopulationCounts};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

fn default_schema_version() -> u32 {
    1
}

/// Row-major occupancy snapshot: 0 for free cells, `id + 1` otherwise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyFrame {
    pub at: Timestamp,
    pub cells: Vec<u64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeathTally {
    pub starvation: usize,
    pub stillborn: usize,
    pub frozen: usize,
}

impl DeathTally {
    fn record(&mut self, cause: DeathCause) {
        match cause {
            DeathCause::Starvation => self.starvation += 1,
            DeathCause::Stillborn => self.stillborn += 1,
            DeathCause::Frozen => self.frozen += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.starvation + self.stillborn + self.frozen
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: AgentId,
    pub generation: u32,
    pub parents: Vec<AgentId>,
    #[serde(default)]
    pub children: Vec<AgentId>,
    pub birth: Timestamp,
    pub death: Option<Timestamp>,
    pub cause: Option<DeathCause>,
    pub birth_energy: i64,
    /// Absent while the agent is still alive.
    pub final_energy: Option<i64>,
    pub color: [u8; 3],
    #[serde(default)]
    pub log: Vec<ActionRecord>,
    #[serde(default)]
    pub path: Vec<PathEntry>,
}

impl AgentSummary {
    pub fn from_record(record: &AgentRecord) -> Self {
        let death = record.death();
        let history = record.history();
        Self {
            id: record.id(),
            generation: record.generation(),
            parents: record.parents().to_vec(),
            children: history.map(|h| h.children.clone()).unwrap_or_default(),
            birth: record.birth(),
            death: death.map(|d| d.at),
            cause: death.map(|d| d.cause),
            birth_energy: record.birth_energy(),
            final_energy: history.map(|h| h.final_energy),
            color: record.color(),
            log: history.map(|h| h.log.clone()).unwrap_or_default(),
            path: history.map(|h| h.path.clone()).unwrap_or_default(),
        }
    }

    pub fn successful_actions(&self) -> usize {
        self.log.iter().filter(|entry| entry.success).count()
    }
}

/// Summaries in id order.
pub fn summarize(records: &[Arc<AgentRecord>]) -> Vec<AgentSummary> {
    let mut summaries: Vec<AgentSummary> = records
        .par_iter()
        .map(|record| AgentSummary::from_record(record))
        .collect();
    summaries.sort_by_key(|s| s.id);
    summaries
}

/// Everything a finished run produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub seed: u64,
    pub height: usize,
    pub width: usize,
    /// Barrier release.
    pub started: Timestamp,
    /// Freeze signal.
    pub stopped: Timestamp,
    /// Whether every agent thread finished within the drain timeout.
    pub drained: bool,
    pub founders: usize,
    pub births: usize,
    pub counts: PopulationCounts,
    #[serde(default)]
    pub deaths: DeathTally,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub population_map: Vec<OccupancyFrame>,
    pub agents: Vec<AgentSummary>,
}

impl RunReport {
    pub fn extent(&self) -> Extent {
        Extent::new(self.height, self.width)
    }

    pub fn agent(&self, id: AgentId) -> Option<&AgentSummary> {
        self.agents
            .binary_search_by_key(&id, |s| s.id)
            .ok()
            .map(|index| &self.agents[index])
    }

    pub fn max_generation(&self) -> u32 {
        self.agents.iter().map(|s| s.generation).max().unwrap_or(0)
    }

    /// Children whose birth does not come strictly after every parent's.
    pub fn lineage_violations(&self) -> Vec<AgentId> {
        let births: HashMap<AgentId, Timestamp> =
            self.agents.iter().map(|s| (s.id, s.birth)).collect();
        self.agents
            .iter()
            .filter(|child| {
                child.parents.iter().any(|parent| match births.get(parent) {
                    Some(&parent_birth) => child.birth <= parent_birth,
                    None => true,
                })
            })
            .map(|child| child.id)
            .collect()
    }

    /// Path cells outside the grid, with the agent that recorded them.
    pub fn out_of_bounds_positions(&self) -> Vec<(AgentId, Position)> {
        let extent = self.extent();
        self.agents
            .iter()
            .flat_map(|s| {
                s.path
                    .iter()
                    .filter(move |entry| !extent.contains(entry.position))
                    .map(move |entry| (s.id, entry.position))
            })
            .collect()
    }
}

pub(crate) fn tally_deaths(summaries: &[AgentSummary]) -> DeathTally {
    let mut tally = DeathTally::default();
    for cause in summaries.iter().filter_map(|s| s.cause) {
        tally.record(cause);
    }
    tally
}
