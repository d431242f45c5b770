use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    context::Context,
    error::{GraphError, Result},
    task::{NextAction, Task, TaskResult},
};

/// Type alias for edge condition functions
pub type EdgeCondition = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Upper bound on executed steps when a graph is built without an explicit limit
pub const DEFAULT_MAX_STEPS: usize = 32;

/// Outgoing edge of a task
#[derive(Clone)]
enum Edge {
    Direct(String),
    Branch {
        condition: EdgeCondition,
        yes: String,
        no: String,
    },
}

/// One executed step, in execution order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub task_id: String,
    pub status_message: Option<String>,
}

/// Outcome of a full graph run
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Response of the last executed task
    pub response: Option<String>,
    /// Id of the task the run stopped at
    pub final_task_id: String,
    pub steps: Vec<StepRecord>,
}

impl ExecutionResult {
    /// Status messages of the executed steps, skipping steps that reported none
    pub fn status_messages(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter_map(|step| step.status_message.clone())
            .collect()
    }
}

/// An immutable graph of tasks. Build it once with [`GraphBuilder`] and share it
/// across requests; every run gets its own [`Context`].
pub struct Graph {
    pub id: String,
    tasks: HashMap<String, Arc<dyn Task>>,
    edges: HashMap<String, Edge>,
    start_task_id: Option<String>,
    max_steps: usize,
}

impl Graph {
    /// Run from the start task until a task ends the run or has no outgoing edge
    pub async fn execute(&self, context: Context) -> Result<ExecutionResult> {
        let start = self
            .start_task_id
            .clone()
            .ok_or_else(|| GraphError::MissingStartTask(self.id.clone()))?;
        self.execute_from(&start, context).await
    }

    /// Run starting from a specific task
    pub async fn execute_from(&self, task_id: &str, context: Context) -> Result<ExecutionResult> {
        let mut current = task_id.to_string();
        let mut steps = Vec::new();

        loop {
            if steps.len() >= self.max_steps {
                return Err(GraphError::StepLimitExceeded {
                    graph_id: self.id.clone(),
                    limit: self.max_steps,
                });
            }

            let result = self.execute_single_task(&current, context.clone()).await?;
            debug!(graph_id = %self.id, task_id = %current, next_action = ?result.next_action, "task finished");
            steps.push(StepRecord {
                task_id: result.task_id.clone(),
                status_message: result.status_message.clone(),
            });

            let next = match &result.next_action {
                NextAction::End => None,
                NextAction::Continue => self.find_next_task(&current, &context),
                NextAction::GoTo(target_id) => {
                    if !self.tasks.contains_key(target_id) {
                        return Err(GraphError::TaskNotFound(target_id.clone()));
                    }
                    Some(target_id.clone())
                }
            };

            match next {
                Some(next_task_id) => current = next_task_id,
                None => {
                    info!(graph_id = %self.id, task_id = %current, steps = steps.len(), "graph run completed");
                    return Ok(ExecutionResult {
                        response: result.response,
                        final_task_id: current,
                        steps,
                    });
                }
            }
        }
    }

    async fn execute_single_task(&self, task_id: &str, context: Context) -> Result<TaskResult> {
        let task = self
            .tasks
            .get(task_id)
            .ok_or_else(|| GraphError::TaskNotFound(task_id.to_string()))?;

        let mut result = task.run(context).await?;
        result.task_id = task_id.to_string();
        Ok(result)
    }

    /// Resolve the outgoing edge of a task against the current context
    pub fn find_next_task(&self, current_task_id: &str, context: &Context) -> Option<String> {
        match self.edges.get(current_task_id)? {
            Edge::Direct(to) => Some(to.clone()),
            Edge::Branch { condition, yes, no } => {
                if condition(context) {
                    Some(yes.clone())
                } else {
                    Some(no.clone())
                }
            }
        }
    }
}

/// Builder for creating graphs
pub struct GraphBuilder {
    id: String,
    tasks: HashMap<String, Arc<dyn Task>>,
    edges: HashMap<String, Edge>,
    start_task_id: Option<String>,
    max_steps: usize,
}

impl GraphBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: HashMap::new(),
            edges: HashMap::new(),
            start_task_id: None,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Add a task; the first task added is the start task unless overridden
    pub fn add_task(mut self, task: Arc<dyn Task>) -> Self {
        let task_id = task.id().to_string();
        if self.start_task_id.is_none() {
            self.start_task_id = Some(task_id.clone());
        }
        self.tasks.insert(task_id, task);
        self
    }

    /// Add an unconditional edge. A task has at most one outgoing edge; adding
    /// another replaces it.
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.insert(from.into(), Edge::Direct(to.into()));
        self
    }

    /// Add a two-way branch: go to `yes` when the condition holds, `no` otherwise
    pub fn add_conditional_edge<F>(
        mut self,
        from: impl Into<String>,
        condition: F,
        yes: impl Into<String>,
        no: impl Into<String>,
    ) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.edges.insert(
            from.into(),
            Edge::Branch {
                condition: Arc::new(condition),
                yes: yes.into(),
                no: no.into(),
            },
        );
        self
    }

    pub fn set_start_task(mut self, task_id: impl Into<String>) -> Self {
        self.start_task_id = Some(task_id.into());
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn build(self) -> Graph {
        Graph {
            id: self.id,
            tasks: self.tasks,
            edges: self.edges,
            start_task_id: self.start_task_id,
            max_steps: self.max_steps,
        }
    }
}
