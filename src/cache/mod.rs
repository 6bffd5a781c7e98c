use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::execution::plan::PhysicalPlan;
use crate::planner::LogicalPlan;

/*
    Query plan cache with a GDFS (greedy dual frequency size) eviction
    discipline: every entry carries priority = inflation + frequency / size.
    Accessing an entry bumps its frequency and recomputes the priority;
    evicting one raises the inflation to the evicted priority, so long
    untouched entries age out even against frequently hit small plans.

    The index tuner consumes the cache through QueryPlanCache, which hands
    out a snapshot of all entries ordered by descending priority. Taking
    the snapshot holds the shared lock only while copying the entry list.
*/

#[derive(Debug, Clone)]
pub enum CachedPlan {
    Logical(Arc<LogicalPlan>),
    Physical(Arc<PhysicalPlan>),
}

impl CachedPlan {
    /// GDFS size measure: number of plan nodes.
    pub fn node_count(&self) -> usize {
        match self {
            CachedPlan::Logical(plan) => plan.node_count(),
            CachedPlan::Physical(plan) => plan.operator_count(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntrySnapshot {
    pub query: String,
    pub plan: CachedPlan,
    pub frequency: u64,
    pub priority: f64,
}

/// Read surface the tuner's cache adapter works against. A cache that
/// cannot enumerate its values returns None and the tuner skips the pass.
pub trait QueryPlanCache {
    fn priority_ordered_entries(&self) -> Option<Vec<CacheEntrySnapshot>>;
    fn clear(&self);
}

struct GdfsEntry {
    plan: CachedPlan,
    frequency: u64,
    size: f64,
    priority: f64,
    sequence: u64,
}

struct GdfsState {
    entries: BTreeMap<String, GdfsEntry>,
    inflation: f64,
    sequence_counter: u64,
}

pub struct GdfsPlanCache {
    capacity: usize,
    state: RwLock<GdfsState>,
}

impl GdfsPlanCache {
    pub fn new(capacity: usize) -> GdfsPlanCache {
        assert!(capacity > 0);
        GdfsPlanCache {
            capacity,
            state: RwLock::new(GdfsState {
                entries: BTreeMap::new(),
                inflation: 0.0,
                sequence_counter: 0,
            }),
        }
    }

    pub fn put(&self, query: &str, plan: CachedPlan) {
        let mut state = self.state.write();
        let state = &mut *state;
        if let Some(entry) = state.entries.get_mut(query) {
            entry.frequency += 1;
            entry.priority = state.inflation + entry.frequency as f64 / entry.size;
            return;
        }
        if state.entries.len() >= self.capacity {
            // Evict the minimum priority entry and inflate to its priority
            if let Some(victim) = state
                .entries
                .iter()
                .min_by(|a, b| {
                    a.1.priority
                        .total_cmp(&b.1.priority)
                        .then(a.1.sequence.cmp(&b.1.sequence))
                })
                .map(|(k, _)| k.clone())
            {
                let evicted = state.entries.remove(&victim).unwrap();
                state.inflation = evicted.priority;
            }
        }
        let size = plan.node_count().max(1) as f64;
        let sequence = state.sequence_counter;
        state.sequence_counter += 1;
        let priority = state.inflation + 1.0 / size;
        state.entries.insert(
            query.to_string(),
            GdfsEntry { plan, frequency: 1, size, priority, sequence },
        );
    }

    pub fn get(&self, query: &str) -> Option<CachedPlan> {
        let mut state = self.state.write();
        let inflation = state.inflation;
        state.entries.get_mut(query).map(|entry| {
            entry.frequency += 1;
            entry.priority = inflation + entry.frequency as f64 / entry.size;
            entry.plan.clone()
        })
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }
}

impl QueryPlanCache for GdfsPlanCache {
    fn priority_ordered_entries(&self) -> Option<Vec<CacheEntrySnapshot>> {
        let state = self.state.read();
        let mut snapshot: Vec<(u64, CacheEntrySnapshot)> = state
            .entries
            .iter()
            .map(|(query, entry)| {
                (
                    entry.sequence,
                    CacheEntrySnapshot {
                        query: query.clone(),
                        plan: entry.plan.clone(),
                        frequency: entry.frequency,
                        priority: entry.priority,
                    },
                )
            })
            .collect();
        drop(state);
        // Descending priority, insertion order among equals
        snapshot.sort_by(|a, b| b.1.priority.total_cmp(&a.1.priority).then(a.0.cmp(&b.0)));
        Some(snapshot.into_iter().map(|(_, entry)| entry).collect())
    }

    fn clear(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.inflation = 0.0;
    }
}
