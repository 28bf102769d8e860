//! Execution plan: the validated graph plus everything derived from it
//! before a run starts.

use std::fmt::Write as _;

use serde::Serialize;
use tracing::instrument;

use liftoff_core::SchedulingStrategy;

use crate::critical_path::CriticalPath;
use crate::dag::{GraphError, TaskGraph};
use crate::history::DurationHistory;
use crate::task::{Affinity, SharedTask, TaskId};

/// A validated, analysed task graph
#[derive(Debug)]
pub struct ExecutionPlan {
    graph: TaskGraph,
    path: CriticalPath,
    strategy: SchedulingStrategy,
    keys: Vec<i64>,
    barrier: Vec<bool>,
}

impl ExecutionPlan {
    /// Build the graph, reject cycles and compute dispatch keys and the
    /// barrier set. Observed durations in `history` override estimates.
    #[instrument(skip_all, fields(tasks = tasks.len(), strategy = %strategy))]
    pub fn build(
        tasks: &[SharedTask],
        strategy: SchedulingStrategy,
        history: Option<&DurationHistory>,
    ) -> Result<Self, GraphError> {
        let graph = TaskGraph::build(tasks)?;
        graph.detect_cycle()?;

        let path = CriticalPath::compute(&graph, |node| {
            let estimate = node.task().estimated_cost();
            match history {
                Some(history) => history.cost_or(node.id(), estimate),
                None => estimate,
            }
        });

        let keys = graph
            .nodes()
            .iter()
            .enumerate()
            .map(|(idx, node)| match strategy {
                SchedulingStrategy::CriticalPath => i64::try_from(path.weight(idx)).unwrap_or(i64::MAX),
                SchedulingStrategy::Priority => i64::from(node.task().priority()),
            })
            .collect();

        // Deferred tasks wait for the barrier, so they can never be part of it
        let barrier = graph
            .nodes()
            .iter()
            .enumerate()
            .map(|(idx, node)| {
                let task = node.task();
                !task.is_deferred()
                    && match strategy {
                        SchedulingStrategy::CriticalPath => path.is_critical_blocking(idx),
                        SchedulingStrategy::Priority => task.is_confined(),
                    }
            })
            .collect();

        Ok(Self {
            graph,
            path,
            strategy,
            keys,
            barrier,
        })
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn critical_path(&self) -> &CriticalPath {
        &self.path
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Number of tasks
    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Dispatch key of a node: higher runs first
    pub fn key(&self, idx: usize) -> i64 {
        self.keys[idx]
    }

    /// Whether the starter waits for this node
    pub fn is_barrier(&self, idx: usize) -> bool {
        self.barrier[idx]
    }

    /// Number of nodes the starter waits for
    pub fn barrier_count(&self) -> usize {
        self.barrier.iter().filter(|b| **b).count()
    }

    /// Ids of the nodes the starter waits for
    pub fn barrier_tasks(&self) -> Vec<TaskId> {
        self.ids_where(|idx| self.barrier[idx])
    }

    /// Heaviest dependency chain, dependencies first
    pub fn longest_chain(&self) -> Vec<TaskId> {
        self.path
            .longest_chain()
            .iter()
            .map(|&idx| self.graph.node(idx).id().clone())
            .collect()
    }

    /// Ready roots ordered by descending key, registration order on ties
    pub fn seed_order(&self) -> Vec<usize> {
        let mut roots: Vec<usize> = self.graph.roots().collect();
        roots.sort_by(|a, b| self.keys[*b].cmp(&self.keys[*a]).then(a.cmp(b)));
        roots
    }

    fn ids_where(&self, pred: impl Fn(usize) -> bool) -> Vec<TaskId> {
        (0..self.graph.len())
            .filter(|&idx| pred(idx))
            .map(|idx| self.graph.node(idx).id().clone())
            .collect()
    }

    fn planned(&self, idx: usize) -> PlannedTask {
        let node = self.graph.node(idx);
        let task = node.task();
        PlannedTask {
            id: node.id().clone(),
            affinity: task.affinity(),
            key: self.keys[idx],
            weight: self.path.weight(idx),
            priority: task.priority(),
            critical: task.is_critical(),
            deferred: task.is_deferred(),
            barrier: self.barrier[idx],
            dependencies: task.dependencies().to_vec(),
        }
    }

    /// Render the dependency tree from the roots down through dependents.
    /// Nodes already printed elsewhere are marked with `(↩)`.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        let mut printed = vec![false; self.graph.len()];

        // Pending lines as (node, line prefix, prefix for its children). Each
        // node's children are pushed in reverse so they pop in display order.
        let mut stack: Vec<(usize, String, String)> = self
            .seed_order()
            .into_iter()
            .rev()
            .map(|root| (root, String::new(), String::new()))
            .collect();

        while let Some((idx, prefix, child_prefix)) = stack.pop() {
            let node = self.graph.node(idx);
            if printed[idx] {
                let _ = writeln!(out, "{}{} (↩)", prefix, node.id());
                continue;
            }
            printed[idx] = true;
            let _ = writeln!(out, "{}{} [{}]", prefix, node.id(), self.tags(idx).join(", "));

            let mut children = node.dependents().to_vec();
            children.sort_by(|a, b| self.keys[*b].cmp(&self.keys[*a]).then(a.cmp(b)));
            let last = children.len().saturating_sub(1);
            for (i, child) in children.into_iter().enumerate().rev() {
                let (branch, extend) = if i == last {
                    ("└── ", "    ")
                } else {
                    ("├── ", "│   ")
                };
                stack.push((
                    child,
                    format!("{}{}", child_prefix, branch),
                    format!("{}{}", child_prefix, extend),
                ));
            }
        }
        out
    }

    fn tags(&self, idx: usize) -> Vec<String> {
        let task = self.graph.node(idx).task();
        let mut tags = vec![task.affinity().to_string(), format!("key {}", self.keys[idx])];
        if self.barrier[idx] {
            tags.push("blocking".to_string());
        }
        if task.is_critical() {
            tags.push("critical".to_string());
        }
        if task.is_deferred() {
            tags.push("deferred".to_string());
        }
        tags
    }

    /// Tasks grouped by class, each group sorted by descending key
    pub fn listing(&self) -> TaskListing {
        let mut listing = TaskListing::default();
        for idx in 0..self.graph.len() {
            let planned = self.planned(idx);
            if planned.deferred {
                listing.deferred.push(planned);
            } else if planned.critical {
                listing.critical.push(planned);
            } else {
                listing.normal.push(planned);
            }
        }
        for group in [
            &mut listing.critical,
            &mut listing.normal,
            &mut listing.deferred,
        ] {
            group.sort_by(|a, b| b.key.cmp(&a.key).then_with(|| a.id.cmp(&b.id)));
        }
        listing
    }

    /// Counts per affinity and class
    pub fn statistics(&self) -> TaskStatistics {
        let mut stats = TaskStatistics {
            total: self.graph.len(),
            barrier: self.barrier_count(),
            ..Default::default()
        };
        for node in self.graph.nodes() {
            let task = node.task();
            match task.affinity() {
                Affinity::Confined => stats.confined += 1,
                Affinity::Pooled => stats.pooled += 1,
            }
            if task.is_critical() {
                stats.critical += 1;
            }
            if task.is_deferred() {
                stats.deferred += 1;
            }
        }
        stats
    }

    /// Serializable overview of the plan, tasks in topological order
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            strategy: self.strategy,
            chain_length: self.path.chain_length(),
            longest_chain: self.longest_chain(),
            barrier: self.barrier_tasks(),
            statistics: self.statistics(),
            tasks: self
                .graph
                .topological_order()
                .into_iter()
                .map(|idx| self.planned(idx))
                .collect(),
        }
    }
}

/// One task as planned
#[derive(Debug, Clone, Serialize)]
pub struct PlannedTask {
    pub id: TaskId,
    pub affinity: Affinity,
    pub key: i64,
    pub weight: u64,
    pub priority: i32,
    pub critical: bool,
    pub deferred: bool,
    pub barrier: bool,
    pub dependencies: Vec<TaskId>,
}

/// Tasks grouped into critical, normal and deferred
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskListing {
    pub critical: Vec<PlannedTask>,
    pub normal: Vec<PlannedTask>,
    pub deferred: Vec<PlannedTask>,
}

/// Task counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskStatistics {
    pub total: usize,
    pub confined: usize,
    pub pooled: usize,
    pub critical: usize,
    pub deferred: usize,
    pub barrier: usize,
}

/// Serializable plan overview
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub strategy: SchedulingStrategy,
    pub chain_length: u64,
    pub longest_chain: Vec<TaskId>,
    pub barrier: Vec<TaskId>,
    pub statistics: TaskStatistics,
    pub tasks: Vec<PlannedTask>,
}
