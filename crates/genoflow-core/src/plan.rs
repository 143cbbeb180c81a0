//! Typed steps, declared dependencies and the scheduler query.
//!
//! A `Plan` is built once (by the planner or by hand) and is read-only while
//! it runs. Steps are kept in declaration order, which is also the scheduling
//! tie-break. Each step carries a closed `StepAction` so that a malformed step
//! is rejected when the plan is built rather than when it is dispatched.

use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GenoflowError, Result};
use crate::types::JsonMap;

/// The five kinds of work a step can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ToolExecution,
    FileParsing,
    DataValidation,
    KnowledgeQuery,
    ResultAggregation,
}

impl StepKind {
    pub const ALL: [StepKind; 5] = [
        StepKind::ToolExecution,
        StepKind::FileParsing,
        StepKind::DataValidation,
        StepKind::KnowledgeQuery,
        StepKind::ResultAggregation,
    ];

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolExecution => "tool_execution",
            Self::FileParsing => "file_parsing",
            Self::DataValidation => "data_validation",
            Self::KnowledgeQuery => "knowledge_query",
            Self::ResultAggregation => "result_aggregation",
        }
    }
}

impl FromStr for StepKind {
    type Err = GenoflowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| GenoflowError::UnknownStepType(s.to_string()))
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a step does, with exactly the inputs its kind needs.
///
/// String inputs may hold a deferred `${key}` reference that the dispatcher
/// resolves against the run's results map.
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    /// Invoke a named capability with a parameter map.
    ToolExecution {
        tool_name: Option<String>,
        params: JsonMap,
    },
    /// Parse a genomic file picked by extension.
    FileParsing { file_path: String },
    /// Validate a previously stored result; `params` are passed to the validator.
    DataValidation { data_key: String, params: JsonMap },
    /// Query a reference database.
    KnowledgeQuery { database: String, query: Value },
    /// Collect named results into one map.
    ResultAggregation { result_keys: Vec<String> },
}

impl StepAction {
    pub fn kind(&self) -> StepKind {
        match self {
            Self::ToolExecution { .. } => StepKind::ToolExecution,
            Self::FileParsing { .. } => StepKind::FileParsing,
            Self::DataValidation { .. } => StepKind::DataValidation,
            Self::KnowledgeQuery { .. } => StepKind::KnowledgeQuery,
            Self::ResultAggregation { .. } => StepKind::ResultAggregation,
        }
    }

    /// Rebuild an action from its wire representation.
    fn from_wire(
        step_id: &str,
        kind: StepKind,
        tool_name: Option<String>,
        mut parameters: JsonMap,
    ) -> Result<Self> {
        let missing = |parameter: &str| GenoflowError::MissingParameter {
            step: step_id.to_string(),
            parameter: parameter.to_string(),
        };

        let action = match kind {
            StepKind::ToolExecution => Self::ToolExecution {
                tool_name,
                params: parameters,
            },
            StepKind::FileParsing => {
                let file_path = take_string(&mut parameters, "file_path")
                    .ok_or_else(|| missing("file_path"))?;
                Self::FileParsing { file_path }
            }
            StepKind::DataValidation => {
                let data_key = take_string(&mut parameters, "data_key")
                    .ok_or_else(|| missing("data_key"))?;
                Self::DataValidation {
                    data_key,
                    params: parameters,
                }
            }
            StepKind::KnowledgeQuery => {
                let database = take_string(&mut parameters, "database")
                    .ok_or_else(|| missing("database"))?;
                let query = parameters.remove("query").unwrap_or(Value::Null);
                Self::KnowledgeQuery { database, query }
            }
            StepKind::ResultAggregation => {
                let result_keys = match parameters.remove("result_keys") {
                    None | Some(Value::Null) => vec![],
                    Some(Value::Array(items)) => items
                        .into_iter()
                        .map(|item| match item {
                            Value::String(key) => Ok(key),
                            _ => Err(missing("result_keys")),
                        })
                        .collect::<Result<Vec<_>>>()?,
                    Some(_) => return Err(missing("result_keys")),
                };
                Self::ResultAggregation { result_keys }
            }
        };
        Ok(action)
    }
}

fn take_string(parameters: &mut JsonMap, key: &str) -> Option<String> {
    match parameters.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// A single typed unit of work in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireStep", into = "WireStep")]
pub struct Step {
    pub id: String,
    pub description: String,
    pub action: StepAction,
    pub depends_on: Vec<String>,
    pub output_key: Option<String>,
}

impl Step {
    pub fn new(id: impl Into<String>, description: impl Into<String>, action: StepAction) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            action,
            depends_on: vec![],
            output_key: None,
        }
    }

    /// Set the ids this step waits for.
    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// Set the results-map key the output is stored under.
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    pub fn kind(&self) -> StepKind {
        self.action.kind()
    }

    /// Tool, or database, identifier this step addresses.
    pub fn capability_name(&self) -> Option<&str> {
        match &self.action {
            StepAction::ToolExecution { tool_name, .. } => tool_name.as_deref(),
            StepAction::KnowledgeQuery { database, .. } => Some(database),
            _ => None,
        }
    }

    /// Flat parameter map, as it appears on the wire.
    pub fn parameters(&self) -> JsonMap {
        let mut map = JsonMap::new();
        match &self.action {
            StepAction::ToolExecution { params, .. } => map.extend(params.clone()),
            StepAction::FileParsing { file_path } => {
                map.insert("file_path".into(), Value::String(file_path.clone()));
            }
            StepAction::DataValidation { data_key, params } => {
                map.insert("data_key".into(), Value::String(data_key.clone()));
                map.extend(params.clone());
            }
            StepAction::KnowledgeQuery { database, query } => {
                map.insert("database".into(), Value::String(database.clone()));
                map.insert("query".into(), query.clone());
            }
            StepAction::ResultAggregation { result_keys } => {
                map.insert(
                    "result_keys".into(),
                    Value::Array(result_keys.iter().cloned().map(Value::String).collect()),
                );
            }
        }
        map
    }

    fn is_runnable(&self, completed: &HashSet<String>) -> bool {
        !completed.contains(&self.id) && self.depends_on.iter().all(|dep| completed.contains(dep))
    }
}

/// Wire shape of a step as emitted by the planning oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireStep {
    pub step_id: String,
    pub step_type: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub parameters: JsonMap,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
}

impl TryFrom<WireStep> for Step {
    type Error = GenoflowError;

    fn try_from(wire: WireStep) -> Result<Self> {
        let kind: StepKind = wire.step_type.parse()?;
        let action = StepAction::from_wire(&wire.step_id, kind, wire.tool_name, wire.parameters)?;
        Ok(Self {
            id: wire.step_id,
            description: wire.description,
            action,
            depends_on: wire.depends_on,
            output_key: wire.output_key,
        })
    }
}

impl From<Step> for WireStep {
    fn from(step: Step) -> Self {
        let parameters = step.parameters();
        let kind = step.kind();
        let tool_name = match step.action {
            StepAction::ToolExecution { tool_name, .. } => tool_name,
            _ => None,
        };
        Self {
            step_id: step.id,
            step_type: kind.as_str().to_string(),
            description: step.description,
            tool_name,
            parameters,
            depends_on: step.depends_on,
            output_key: step.output_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WirePlan {
    steps: Vec<WireStep>,
    #[serde(default)]
    metadata: JsonMap,
}

/// Outcome of asking the plan what to run next.
#[derive(Debug, Clone, PartialEq)]
pub enum Schedule<'a> {
    /// The first runnable step in declaration order.
    Ready(&'a Step),
    /// Every step has completed.
    Done,
    /// Steps remain but none has its dependencies satisfied.
    Blocked { pending: Vec<&'a str> },
}

/// An ordered, immutable collection of steps for one goal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    goal: String,
    steps: Vec<Step>,
    metadata: JsonMap,
}

impl Plan {
    /// Build a plan, checking that step ids are unique and every dependency
    /// names a step of this plan. Dependency cycles are not checked.
    pub fn new(goal: impl Into<String>, steps: Vec<Step>, metadata: JsonMap) -> Result<Self> {
        let mut ids = HashSet::with_capacity(steps.len());
        for step in &steps {
            if !ids.insert(step.id.as_str()) {
                return Err(GenoflowError::DuplicateStepId(step.id.clone()));
            }
        }
        for step in &steps {
            if let Some(dep) = step.depends_on.iter().find(|dep| !ids.contains(dep.as_str())) {
                return Err(GenoflowError::UnknownDependency {
                    step: step.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        Ok(Self {
            goal: goal.into(),
            steps,
            metadata,
        })
    }

    /// Convert a parsed planning payload (`{"steps": [...], "metadata"?: {...}}`).
    pub fn from_wire(goal: impl Into<String>, payload: Value) -> Result<Self> {
        if !payload.get("steps").is_some_and(Value::is_array) {
            return Err(GenoflowError::Planning(
                "plan payload has no 'steps' array".to_string(),
            ));
        }
        let wire: WirePlan = serde_json::from_value(payload)?;
        let steps = wire
            .steps
            .into_iter()
            .map(Step::try_from)
            .collect::<Result<Vec<_>>>()?;
        Self::new(goal, steps, wire.metadata)
    }

    /// The deterministic single-step plan used when planning fails.
    pub fn fallback(goal: impl Into<String>) -> Self {
        let goal = goal.into();
        let mut params = JsonMap::new();
        params.insert("query".into(), Value::String(goal.clone()));
        let mut metadata = JsonMap::new();
        metadata.insert("fallback".into(), Value::Bool(true));

        let step = Step::new(
            "step_1",
            format!("Process query: {}", goal),
            StepAction::ToolExecution {
                tool_name: None,
                params,
            },
        );

        Self {
            goal,
            steps: vec![step],
            metadata,
        }
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn metadata(&self) -> &JsonMap {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn is_fallback(&self) -> bool {
        self.metadata.get("fallback").and_then(Value::as_bool) == Some(true)
    }

    /// First step, in declaration order, that is not completed and whose
    /// dependencies are all completed.
    ///
    /// `None` covers both "everything is done" and "nothing can run"; use
    /// [`Plan::schedule`] to tell them apart.
    pub fn next_runnable(&self, completed: &HashSet<String>) -> Option<&Step> {
        self.steps.iter().find(|s| s.is_runnable(completed))
    }

    /// Tri-state scheduling query.
    pub fn schedule(&self, completed: &HashSet<String>) -> Schedule<'_> {
        if let Some(step) = self.next_runnable(completed) {
            return Schedule::Ready(step);
        }
        let pending: Vec<&str> = self
            .steps
            .iter()
            .filter(|s| !completed.contains(&s.id))
            .map(|s| s.id.as_str())
            .collect();
        if pending.is_empty() {
            Schedule::Done
        } else {
            Schedule::Blocked { pending }
        }
    }

    /// Numbered list of step descriptions.
    pub fn summary(&self) -> String {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {}", i + 1, s.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
