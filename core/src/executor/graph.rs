use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ExecutorError;
use crate::task::{merge_into_input, Task, TaskResult, DEPENDENCY_OUTPUTS_KEY};

/// Dependency graph of one run-set plus readiness bookkeeping.
///
/// Edges are restricted to tasks the manager knows about. A dependency
/// inside the run-set is satisfied once it finishes in this run; a known
/// dependency outside the run-set is satisfied only if it is already
/// terminal, otherwise its dependents can never become ready.
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    /// Run-set members: task_id -> Task
    nodes: HashMap<String, Arc<Task>>,

    /// Known dependencies: task_id -> dependency ids
    edges: HashMap<String, Vec<String>>,

    /// Reverse edges: task_id -> run-set tasks that depend on it
    reverse_edges: HashMap<String, Vec<String>>,

    /// Known dependencies outside the run-set
    external: HashMap<String, Arc<Task>>,

    /// (task_id, dependency) pairs dropped because the dependency is unknown
    ignored: Vec<(String, String)>,

    satisfied: HashSet<String>,
    enqueued: HashSet<String>,

    /// Run-set insertion order (for stable ordering)
    insertion_order: Vec<String>,
}

impl DependencyResolver {
    pub fn new(run_set: &[Arc<Task>], known: &HashMap<String, Arc<Task>>) -> Self {
        let mut nodes = HashMap::new();
        let mut insertion_order = Vec::new();

        for task in run_set {
            if nodes.contains_key(task.id()) {
                warn!(task_id = task.id(), "duplicate task in run-set; keeping the first");
                continue;
            }
            nodes.insert(task.id().to_string(), task.clone());
            insertion_order.push(task.id().to_string());
        }

        let mut edges = HashMap::new();
        let mut reverse_edges: HashMap<String, Vec<String>> = HashMap::new();
        let mut external = HashMap::new();
        let mut ignored = Vec::new();
        let mut satisfied = HashSet::new();

        for task_id in &insertion_order {
            let task = &nodes[task_id];
            let mut deps = Vec::new();

            for dep in task.dependencies() {
                if nodes.contains_key(dep) {
                    reverse_edges
                        .entry(dep.clone())
                        .or_default()
                        .push(task_id.clone());
                } else if let Some(dep_task) = known.get(dep) {
                    if dep_task.status().is_terminal() {
                        satisfied.insert(dep.clone());
                    }
                    external.insert(dep.clone(), dep_task.clone());
                } else {
                    warn!(task_id = %task_id, dependency = %dep, "unknown dependency; ignoring");
                    ignored.push((task_id.clone(), dep.clone()));
                    continue;
                }
                deps.push(dep.clone());
            }

            edges.insert(task_id.clone(), deps);
        }

        Self {
            nodes,
            edges,
            reverse_edges,
            external,
            ignored,
            satisfied,
            enqueued: HashSet::new(),
            insertion_order,
        }
    }

    pub fn len(&self) -> usize {
        self.insertion_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insertion_order.is_empty()
    }

    /// Run-set ids in insertion order.
    pub fn task_ids(&self) -> &[String] {
        &self.insertion_order
    }

    pub fn task(&self, id: &str) -> Option<&Arc<Task>> {
        self.nodes.get(id)
    }

    /// Dependencies of `id` that gate it, in declaration order.
    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ignored_dependencies(&self) -> &[(String, String)] {
        &self.ignored
    }

    /// Tasks with no outstanding dependency, in insertion order. Marks them enqueued.
    pub fn initial_ready(&mut self) -> Vec<String> {
        let ready: Vec<String> = self
            .insertion_order
            .iter()
            .filter(|id| self.is_ready(id))
            .cloned()
            .collect();
        self.enqueued.extend(ready.iter().cloned());
        ready
    }

    /// Records that `id` reached a terminal status and returns the dependents
    /// that just became ready. Success or failure makes no difference.
    pub fn on_finished(&mut self, id: &str) -> Vec<String> {
        self.satisfied.insert(id.to_string());

        let Some(dependents) = self.reverse_edges.get(id) else {
            return Vec::new();
        };

        let mut ready = Vec::new();
        for dependent in dependents {
            if !self.enqueued.contains(dependent) && self.is_ready(dependent) {
                ready.push(dependent.clone());
            }
        }
        self.enqueued.extend(ready.iter().cloned());
        ready
    }

    /// Tasks that were never enqueued, each with the dependencies still
    /// outstanding, in insertion order.
    pub fn unresolved(&self) -> Vec<(String, Vec<String>)> {
        self.insertion_order
            .iter()
            .filter(|id| !self.enqueued.contains(*id))
            .map(|id| {
                let pending = self.edges[id]
                    .iter()
                    .filter(|dep| !self.satisfied.contains(*dep))
                    .cloned()
                    .collect();
                (id.clone(), pending)
            })
            .collect()
    }

    /// `{dep_id: output}` for dependencies that succeeded with a non-empty output.
    pub fn dependency_outputs(
        &self,
        id: &str,
        results: &HashMap<String, TaskResult>,
    ) -> Map<String, Value> {
        let mut outputs = Map::new();
        for dep in self.dependencies_of(id) {
            let result = match results.get(dep) {
                Some(result) => Some(result.clone()),
                None => self.external.get(dep).and_then(|t| t.result()),
            };
            if let Some(output) = result.as_ref().and_then(TaskResult::propagated_output) {
                outputs.insert(dep.clone(), output.clone());
            }
        }
        outputs
    }

    /// Execution input for `id`: its configured input with dependency outputs
    /// merged under `_dependencyOutputs`. `None` means "use the configured input".
    pub fn build_input(&self, id: &str, results: &HashMap<String, TaskResult>) -> Option<Value> {
        let task = self.nodes.get(id)?;
        let outputs = self.dependency_outputs(id, results);
        if outputs.is_empty() {
            return None;
        }
        Some(merge_into_input(
            task.input().clone(),
            DEPENDENCY_OUTPUTS_KEY,
            Value::Object(outputs),
        ))
    }

    /// Fails with the first dependency cycle found inside the run-set.
    pub fn validate(&self) -> Result<(), ExecutorError> {
        match self.detect_cycle() {
            Some(cycle) => Err(ExecutorError::CircularDependency(cycle)),
            None => Ok(()),
        }
    }

    /// Detect circular dependencies inside the run-set using DFS
    ///
    /// Returns the cycle as `a -> b -> a`.
    ///
    /// # Time Complexity
    ///
    /// O(V + E) where V = number of tasks, E = number of dependencies
    pub fn detect_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for task_id in &self.insertion_order {
            if !visited.contains(task_id) && self.dfs_cycle(task_id, &mut visited, &mut stack) {
                return Some(stack.join(" -> "));
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> bool {
        visited.insert(node.to_string());
        stack.push(node.to_string());

        if let Some(dependencies) = self.edges.get(node) {
            for dep in dependencies.iter().filter(|d| self.nodes.contains_key(*d)) {
                if let Some(pos) = stack.iter().position(|x| x == dep) {
                    stack.push(dep.clone());
                    *stack = stack[pos..].to_vec();
                    return true;
                }

                if !visited.contains(dep) && self.dfs_cycle(dep, visited, stack) {
                    return true;
                }
            }
        }

        stack.pop();
        false
    }

    /// Waves the scheduler would dispatch with `concurrency_limit`, assuming
    /// every task finishes. Tasks that can never become ready are absent.
    pub fn preview_waves(&self, concurrency_limit: usize) -> Vec<Vec<String>> {
        let limit = concurrency_limit.max(1);
        let mut sim = self.clone();
        sim.enqueued.clear();

        let mut queue: std::collections::VecDeque<String> = sim.initial_ready().into();
        let mut waves = Vec::new();

        while !queue.is_empty() {
            let take = limit.min(queue.len());
            let wave: Vec<String> = queue.drain(..take).collect();
            for id in &wave {
                queue.extend(sim.on_finished(id));
            }
            waves.push(wave);
        }

        waves
    }

    fn is_ready(&self, id: &str) -> bool {
        self.edges
            .get(id)
            .is_some_and(|deps| deps.iter().all(|dep| self.satisfied.contains(dep)))
    }
}
