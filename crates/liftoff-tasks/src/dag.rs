//! Task DAG construction and validation

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, instrument, warn};

use crate::task::{SharedTask, TaskId};

/// A node in the task execution DAG
pub struct TaskNode {
    task: SharedTask,
    /// Indices of the tasks this one waits for
    dependencies: Vec<usize>,
    /// Indices of the tasks waiting on this one
    dependents: Vec<usize>,
    /// Dependencies not yet satisfied in the current run
    remaining: AtomicUsize,
}

impl TaskNode {
    fn new(task: SharedTask) -> Self {
        Self {
            task,
            dependencies: Vec::new(),
            dependents: Vec::new(),
            remaining: AtomicUsize::new(0),
        }
    }

    /// Task identifier
    pub fn id(&self) -> &TaskId {
        self.task.id()
    }

    /// The wrapped task
    pub fn task(&self) -> &SharedTask {
        &self.task
    }

    /// Indices of this node's dependencies
    pub fn dependencies(&self) -> &[usize] {
        &self.dependencies
    }

    /// Indices of the nodes that depend on this one
    pub fn dependents(&self) -> &[usize] {
        &self.dependents
    }

    /// Number of dependencies still outstanding
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Record one satisfied dependency. Returns true for exactly one caller:
    /// the one that observed the count reach zero.
    pub(crate) fn satisfy_one(&self) -> bool {
        self.remaining.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

impl std::fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", self.id())
            .field("dependencies", &self.dependencies)
            .field("dependents", &self.dependents)
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// Directed acyclic graph of startup tasks
#[derive(Debug)]
pub struct TaskGraph {
    /// Nodes in registration order
    nodes: Vec<TaskNode>,
    /// Task id to node index
    index: HashMap<TaskId, usize>,
}

impl TaskGraph {
    /// Build the graph from registered tasks.
    ///
    /// A task id registered twice keeps its first registration. A dependency
    /// naming an unknown task fails the whole build.
    #[instrument(skip_all, fields(tasks = tasks.len()))]
    pub fn build(tasks: &[SharedTask]) -> Result<Self, GraphError> {
        let mut nodes: Vec<TaskNode> = Vec::with_capacity(tasks.len());
        let mut index: HashMap<TaskId, usize> = HashMap::with_capacity(tasks.len());

        for task in tasks {
            if index.contains_key(task.id()) {
                warn!(task = %task.id(), "duplicate task registration ignored");
                continue;
            }
            index.insert(task.id().clone(), nodes.len());
            nodes.push(TaskNode::new(task.clone()));
        }

        // Wire up dependencies and reverse edges
        for idx in 0..nodes.len() {
            let task = nodes[idx].task.clone();
            for dep in task.dependencies() {
                let dep_idx = *index
                    .get(dep)
                    .ok_or_else(|| GraphError::UnresolvedDependency {
                        task: task.id().clone(),
                        dependency: dep.clone(),
                    })?;
                nodes[idx].dependencies.push(dep_idx);
                nodes[dep_idx].dependents.push(idx);
                nodes[idx].remaining.fetch_add(1, Ordering::Relaxed);
            }
        }

        let edges: usize = nodes.iter().map(|n| n.dependencies.len()).sum();
        info!(task_count = nodes.len(), edge_count = edges, "task DAG built");

        Ok(Self { nodes, index })
    }

    /// Reject circular dependencies.
    ///
    /// Depth-first search along dependency edges with an explicit stack, so
    /// arbitrarily deep chains are walked without recursion. Each frame holds
    /// a node and a cursor into its dependency list.
    #[instrument(skip_all, fields(node_count = self.nodes.len()))]
    pub fn detect_cycle(&self) -> Result<(), GraphError> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for start in 0..self.nodes.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            marks[start] = Mark::OnStack;
            stack.push((start, 0));

            while let Some(frame) = stack.last_mut() {
                let (idx, cursor) = *frame;
                let Some(&dep) = self.nodes[idx].dependencies.get(cursor) else {
                    marks[idx] = Mark::Done;
                    stack.pop();
                    continue;
                };
                frame.1 += 1;

                match marks[dep] {
                    Mark::Unvisited => {
                        marks[dep] = Mark::OnStack;
                        stack.push((dep, 0));
                    }
                    Mark::OnStack => {
                        let cycle = self.cycle_path(&stack, dep);
                        warn!(cycle = %cycle, "circular dependency detected");
                        return Err(GraphError::Cycle(cycle));
                    }
                    Mark::Done => {}
                }
            }
        }

        debug!("no circular dependencies");
        Ok(())
    }

    /// Names from `closing` up the current DFS path and back to `closing`
    fn cycle_path(&self, stack: &[(usize, usize)], closing: usize) -> String {
        let from = stack.iter().position(|&(idx, _)| idx == closing).unwrap_or(0);
        let mut names: Vec<&str> = stack[from..]
            .iter()
            .map(|&(idx, _)| self.nodes[idx].id().as_str())
            .collect();
        names.push(self.nodes[closing].id().as_str());
        names.join(" -> ")
    }

    /// Topological order (dependencies first) using Kahn's algorithm.
    /// Ties keep registration order. Only meaningful on an acyclic graph.
    pub fn topological_order(&self) -> Vec<usize> {
        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.dependencies.len()).collect();
        let mut queue: VecDeque<usize> = (0..self.nodes.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut sorted = Vec::with_capacity(self.nodes.len());

        while let Some(idx) = queue.pop_front() {
            sorted.push(idx);
            for &dependent in &self.nodes[idx].dependents {
                in_degree[dependent] = in_degree[dependent].saturating_sub(1);
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        sorted
    }

    /// Nodes without dependencies
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.nodes.len()).filter(move |&i| self.nodes[i].dependencies.is_empty())
    }

    /// All nodes in registration order
    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    /// Node at `idx`
    pub fn node(&self, idx: usize) -> &TaskNode {
        &self.nodes[idx]
    }

    /// Index of a task by id
    pub fn index_of(&self, id: &TaskId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Get a node by task id
    pub fn get(&self, id: &TaskId) -> Option<&TaskNode> {
        self.index_of(id).map(|i| &self.nodes[i])
    }

    /// Get the total number of tasks
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the DAG is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// DFS colour of a node during cycle detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Errors during DAG construction. Both are configuration errors raised
/// before any task runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A declared dependency is not registered
    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnresolvedDependency { task: TaskId, dependency: TaskId },

    /// Cyclic dependency detected
    #[error("Circular dependency detected: {0}")]
    Cycle(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskDescriptor;
    use std::sync::Arc;

    fn task(name: &str, deps: &[&str]) -> SharedTask {
        Arc::new(
            TaskDescriptor::new(name)
                .with_dependencies(deps.iter().copied())
                .into_task(|| Ok(())),
        )
    }

    #[test]
    fn test_build_counts_dependencies() {
        let tasks = vec![
            task("logging", &[]),
            task("config", &["logging"]),
            task("ui", &["logging", "config"]),
        ];
        let graph = TaskGraph::build(&tasks).unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.get(&"logging".into()).unwrap().remaining(), 0);
        assert_eq!(graph.get(&"config".into()).unwrap().remaining(), 1);
        assert_eq!(graph.get(&"ui".into()).unwrap().remaining(), 2);
        assert_eq!(graph.node(0).dependents(), &[1, 2]);
    }

    #[test]
    fn test_build_unresolved_dependency() {
        let tasks = vec![task("ui", &["theme"])];
        let err = TaskGraph::build(&tasks).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnresolvedDependency {
                task: "ui".into(),
                dependency: "theme".into(),
            }
        );
    }

    #[test]
    fn test_build_ignores_duplicates() {
        let tasks = vec![task("db", &[]), task("db", &["missing"])];
        let graph = TaskGraph::build(&tasks).unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph.node(0).dependencies().is_empty());
    }

    #[test]
    fn test_detect_cycle_three_nodes() {
        let tasks = vec![task("a", &["b"]), task("b", &["c"]), task("c", &["a"])];
        let graph = TaskGraph::build(&tasks).unwrap();

        match graph.detect_cycle() {
            Err(GraphError::Cycle(path)) => assert_eq!(path, "a -> b -> c -> a"),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_detect_self_cycle() {
        let tasks = vec![task("a", &[]), task("b", &["b"])];
        let graph = TaskGraph::build(&tasks).unwrap();
        assert_eq!(
            graph.detect_cycle(),
            Err(GraphError::Cycle("b -> b".to_string()))
        );
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let tasks = vec![
            task("root", &[]),
            task("left", &["root"]),
            task("right", &["root"]),
            task("join", &["left", "right"]),
        ];
        let graph = TaskGraph::build(&tasks).unwrap();
        assert!(graph.detect_cycle().is_ok());
    }

    #[test]
    fn test_cycle_behind_shared_subgraph() {
        let tasks = vec![
            task("base", &[]),
            task("left", &["base"]),
            task("right", &["base", "loop"]),
            task("loop", &["right"]),
        ];
        let graph = TaskGraph::build(&tasks).unwrap();
        assert_eq!(
            graph.detect_cycle(),
            Err(GraphError::Cycle("right -> loop -> right".to_string()))
        );
    }

    #[test]
    fn test_deep_chain_checked_without_recursion() {
        let depth = 50_000;
        let tasks: Vec<SharedTask> = (0..depth)
            .map(|i| {
                let name = format!("step-{}", i);
                let deps = if i == 0 {
                    Vec::new()
                } else {
                    vec![format!("step-{}", i - 1)]
                };
                Arc::new(
                    TaskDescriptor::new(name.as_str())
                        .with_dependencies(deps.iter().map(String::as_str))
                        .into_task(|| Ok(())),
                ) as SharedTask
            })
            .collect();
        let graph = TaskGraph::build(&tasks).unwrap();

        assert!(graph.detect_cycle().is_ok());
        assert_eq!(graph.topological_order().len(), depth);
    }

    #[test]
    fn test_topological_order() {
        let tasks = vec![
            task("ui", &["config"]),
            task("config", &["logging"]),
            task("logging", &[]),
        ];
        let graph = TaskGraph::build(&tasks).unwrap();
        let order: Vec<&str> = graph
            .topological_order()
            .into_iter()
            .map(|i| graph.node(i).id().as_str())
            .collect();
        assert_eq!(order, vec!["logging", "config", "ui"]);
    }

    #[test]
    fn test_satisfy_one_reaches_zero_once() {
        let tasks = vec![task("a", &[]), task("b", &[]), task("c", &["a", "b"])];
        let graph = TaskGraph::build(&tasks).unwrap();
        let node = graph.node(2);
        assert!(!node.satisfy_one());
        assert!(node.satisfy_one());
        assert_eq!(node.remaining(), 0);
    }

    #[test]
    fn test_roots() {
        let tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &[])];
        let graph = TaskGraph::build(&tasks).unwrap();
        assert_eq!(graph.roots().collect::<Vec<_>>(), vec![0, 2]);
    }
}
