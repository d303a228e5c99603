use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use analyzer_api::v1::network::NodePairLatencySummary;
use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::*;

use super::{memory::MemoryStore, RecordStore};
use crate::events::Event;

pub const EVENTS_FILE: &str = "tracer_events.jsonl";
pub const PAIR_SUMMARY_FILE: &str = "network_latency_nodepair_summary.jsonl";
pub const NODE_STATS_FILE: &str = "network_latency_node_stats.jsonl";

lazy_static! {
    static ref SIMULATION_ID: Regex = Regex::new(r"^[0-9a-fA-F]{24}$").unwrap();
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CatalogError {
    #[error("Invalid simulation id {0:?}")]
    InvalidId(String),
    #[error("Simulation {0:?} not found")]
    NotFound(String),
}

pub fn is_valid_simulation_id(id: &str) -> bool {
    SIMULATION_ID.is_match(id)
}

/// Modification time and size of every data file, used to detect changes.
type Signature = Vec<Option<(SystemTime, u64)>>;

/// Immutable snapshot of one simulation's collections.
pub struct Simulation {
    pub id: String,
    pub events: Arc<dyn RecordStore>,
    pub pair_summaries: Vec<NodePairLatencySummary>,
    pub node_stats: Vec<Value>,
    signature: Signature,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("id", &self.id)
            .field("pair_summaries", &self.pair_summaries.len())
            .field("node_stats", &self.node_stats.len())
            .finish()
    }
}

impl Simulation {
    pub fn new(
        id: impl Into<String>,
        events: Vec<Event>,
        pair_summaries: Vec<NodePairLatencySummary>,
        node_stats: Vec<Value>,
    ) -> Self {
        Self {
            id: id.into(),
            events: Arc::new(MemoryStore::new(events)),
            pair_summaries,
            node_stats,
            signature: Signature::default(),
        }
    }

    #[instrument(level = "debug")]
    fn load(id: &str, dir: &Path) -> Result<Self> {
        let events: Vec<Event> = read_jsonl(&dir.join(EVENTS_FILE), |value| {
            Event::decode(value).map_err(anyhow::Error::from)
        })?;
        let pair_summaries: Vec<NodePairLatencySummary> =
            read_jsonl(&dir.join(PAIR_SUMMARY_FILE), deserialize)?;
        let node_stats: Vec<Value> = read_jsonl(&dir.join(NODE_STATS_FILE), Ok)?;

        info!(
            "Loaded simulation {id}: {} events, {} node pair summaries, {} node stats",
            events.len(),
            pair_summaries.len(),
            node_stats.len()
        );

        Ok(Self {
            signature: signature(dir),
            ..Self::new(id, events, pair_summaries, node_stats)
        })
    }
}

fn deserialize<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(anyhow::Error::from)
}

/// Reads one JSON document per line. Missing files are empty, bad lines are skipped.
fn read_jsonl<T>(path: &Path, mut decode: impl FnMut(Value) -> Result<T>) -> Result<Vec<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => {
            return Err(error).with_context(|| format!("Failed opening {}", path.display()))
        }
    };

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed reading {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }

        let record = serde_json::from_str::<Value>(&line)
            .map_err(anyhow::Error::from)
            .and_then(&mut decode);
        match record {
            Ok(record) => records.push(record),
            Err(error) => {
                skipped += 1;
                debug!("Skipping {}:{}: {error}", path.display(), number + 1);
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {skipped} malformed records in {}", path.display());
    }

    Ok(records)
}

fn signature(dir: &Path) -> Signature {
    [EVENTS_FILE, PAIR_SUMMARY_FILE, NODE_STATS_FILE]
        .iter()
        .map(|file| {
            let metadata = std::fs::metadata(dir.join(file)).ok()?;
            Some((metadata.modified().ok()?, metadata.len()))
        })
        .collect()
}

/// Every known simulation, swapped atomically on refresh.
pub struct Catalog {
    root: Option<PathBuf>,
    simulations: ArcSwap<HashMap<String, Arc<Simulation>>>,
}

impl Catalog {
    pub fn from_simulations(simulations: impl IntoIterator<Item = Simulation>) -> Self {
        let simulations = simulations
            .into_iter()
            .map(|simulation| (simulation.id.clone(), Arc::new(simulation)))
            .collect();

        Self {
            root: None,
            simulations: ArcSwap::from_pointee(simulations),
        }
    }

    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let catalog = Self {
            root: Some(root.into()),
            simulations: ArcSwap::from_pointee(HashMap::new()),
        };
        catalog.refresh()?;
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Result<Arc<Simulation>, CatalogError> {
        if !is_valid_simulation_id(id) {
            return Err(CatalogError::InvalidId(id.to_string()));
        }

        self.simulations
            .load()
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.simulations.load().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Rescans the data directory, reloading only simulations whose files changed.
    /// Returns the number of (re)loaded simulations.
    pub fn refresh(&self) -> Result<usize> {
        let Some(root) = &self.root else {
            return Ok(0);
        };

        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                warn!("Data path {} does not exist", root.display());
                return Ok(0);
            }
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("Failed listing {}", root.display()))
            }
        };

        let current = self.simulations.load_full();
        let mut next = HashMap::new();
        let mut loaded = 0;

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(id) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if !path.is_dir() || !is_valid_simulation_id(id) {
                continue;
            }

            if let Some(existing) = current.get(id) {
                if existing.signature == signature(&path) {
                    next.insert(id.to_string(), existing.clone());
                    continue;
                }
            }

            match Simulation::load(id, &path) {
                Ok(simulation) => {
                    loaded += 1;
                    next.insert(id.to_string(), Arc::new(simulation));
                }
                Err(error) => {
                    error!("Failed loading simulation {id}: {error:#}");
                    if let Some(existing) = current.get(id) {
                        next.insert(id.to_string(), existing.clone());
                    }
                }
            }
        }

        let removed = current.keys().filter(|id| !next.contains_key(*id)).count();
        if loaded > 0 || removed > 0 {
            info!(
                "Catalog refreshed: {loaded} loaded, {removed} removed, {} total",
                next.len()
            );
        }

        self.simulations.store(Arc::new(next));
        Ok(loaded)
    }

    pub fn spawn_refresh(self: Arc<Self>, period: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let catalog = self.clone();
                match tokio::task::spawn_blocking(move || catalog.refresh()).await {
                    Ok(Ok(_)) => (),
                    Ok(Err(error)) => error!("Catalog refresh failed: {error:#}"),
                    Err(error) => error!("Catalog refresh task panicked: {error:?}"),
                }
            }
        })
    }
}
