use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use genoflow_core::config::{AgentConfig, AppConfig};
use genoflow_core::error::{GenoflowError, Result};
use genoflow_core::traits::{CapabilityRegistry, FormatDispatcher, KnowledgeBase, ReasoningOracle, Validator};
use genoflow_core::types::JsonMap;
use genoflow_tools::{FormatRegistry, GenomicValidator, KnowledgeRouter, ToolRegistry};

use crate::dispatcher::Dispatcher;
use crate::execution::{ExecutionLoop, RunStatus};
use crate::planner::Planner;
use crate::reasoning::Reasoner;
use crate::state::{ConversationState, HistoryEntry};

/// One conversation: plans each query, runs the plan and records the report.
pub struct AnalysisAgent {
    state: ConversationState,
    planner: Planner,
    executor: ExecutionLoop,
}

/// Explicit wiring for an [`AnalysisAgent`]; every collaborator must be set.
pub struct AnalysisAgentBuilder {
    oracle: Arc<dyn ReasoningOracle>,
    capabilities: Option<Arc<dyn CapabilityRegistry>>,
    formats: Option<Arc<dyn FormatDispatcher>>,
    validator: Option<Arc<dyn Validator>>,
    knowledge: Option<Arc<dyn KnowledgeBase>>,
    config: AgentConfig,
}

impl AnalysisAgentBuilder {
    pub fn capabilities(mut self, capabilities: Arc<dyn CapabilityRegistry>) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn formats(mut self, formats: Arc<dyn FormatDispatcher>) -> Self {
        self.formats = Some(formats);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn knowledge(mut self, knowledge: Arc<dyn KnowledgeBase>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn agent_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<AnalysisAgent> {
        let dispatcher = Dispatcher::new(
            required(self.capabilities, "capabilities")?,
            required(self.formats, "formats")?,
            required(self.validator, "validator")?,
            required(self.knowledge, "knowledge")?,
        )
        .with_policy(self.config.reference_policy);

        let reasoner = self
            .config
            .enable_reasoning
            .then(|| Reasoner::new(self.oracle.clone(), self.config.result_clip_chars));

        Ok(AnalysisAgent {
            state: ConversationState::new(),
            planner: Planner::new(self.oracle, &self.config),
            executor: ExecutionLoop::new(dispatcher, reasoner, self.config.max_iterations),
        })
    }
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| GenoflowError::Config(format!("missing collaborator: {}", name)))
}

fn status_label(status: &RunStatus) -> &'static str {
    match status {
        RunStatus::Succeeded => "complete",
        RunStatus::FailedAtStep { .. } => "failed",
        RunStatus::IterationLimitReached { .. } => "incomplete",
        RunStatus::Blocked { .. } => "blocked",
    }
}

impl AnalysisAgent {
    pub fn builder(oracle: Arc<dyn ReasoningOracle>) -> AnalysisAgentBuilder {
        AnalysisAgentBuilder {
            oracle,
            capabilities: None,
            formats: None,
            validator: None,
            knowledge: None,
            config: AgentConfig::default(),
        }
    }

    /// Wire the built-in samtools tools, file parsers, genomic validator and
    /// knowledge sources from `config`.
    pub fn from_config(config: &AppConfig, oracle: Arc<dyn ReasoningOracle>) -> Result<Self> {
        Self::builder(oracle)
            .capabilities(Arc::new(ToolRegistry::with_builtins(&config.tools)))
            .formats(Arc::new(FormatRegistry::with_builtins(&config.tools)))
            .validator(Arc::new(GenomicValidator::new(&config.verification)))
            .knowledge(Arc::new(KnowledgeRouter::with_builtins(&config.knowledge)?))
            .agent_config(config.agent.clone())
            .build()
    }

    /// Plan and run `query`, returning the markdown report.
    ///
    /// Planning and step failures are reported in the text, never returned
    /// as errors.
    pub async fn execute(&mut self, query: &str, context: Option<JsonMap>) -> String {
        info!(query = %query, session = %self.state.session_id(), "Executing query");
        self.state.add_user_message(query, None);
        if let Some(context) = context {
            self.state.update_context(context);
        }

        let plan = self.planner.plan(query, &self.state).await;
        let outcome = self.executor.run(&plan, &mut self.state).await;
        let report = outcome.report(&plan);

        let mut metadata = JsonMap::new();
        metadata.insert("status".into(), json!(status_label(&outcome.status)));
        metadata.insert("plan_steps".into(), json!(plan.len()));
        metadata.insert("completed_steps".into(), json!(outcome.completed.len()));
        metadata.insert("fallback_plan".into(), json!(plan.is_fallback()));
        self.state.add_assistant_message(&report, Some(metadata));

        report
    }

    /// Start a fresh conversation.
    pub fn reset(&mut self) {
        self.state.reset();
        info!("Conversation reset");
    }

    pub fn add_context(&mut self, key: impl Into<String>, value: Value) {
        self.state.set_context(key, value);
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn conversation_history(&self) -> Vec<HistoryEntry> {
        self.state.history()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genoflow_core::types::Role;
    use genoflow_test_utils::*;

    fn quiet() -> AgentConfig {
        AgentConfig {
            enable_reasoning: false,
            ..AgentConfig::default()
        }
    }

    fn agent(oracle: Arc<dyn ReasoningOracle>, registry: StaticRegistry) -> AnalysisAgent {
        AnalysisAgent::builder(oracle)
            .capabilities(Arc::new(registry))
            .formats(Arc::new(StaticFormats::new()))
            .validator(Arc::new(StaticValidator::passing()))
            .knowledge(Arc::new(EchoKnowledge))
            .agent_config(quiet())
            .build()
            .unwrap()
    }

    fn stats_plan() -> String {
        fenced_plan(&json!({
            "steps": [{
                "step_id": "step_1",
                "step_type": "tool_execution",
                "description": "Compute alignment statistics",
                "tool_name": "samtools_stats",
                "parameters": {"input_file": "sample.bam"},
                "output_key": "stats"
            }]
        }))
    }

    #[tokio::test]
    async fn test_execute_end_to_end() {
        let oracle = Arc::new(ScriptedOracle::new([stats_plan()]));
        let registry =
            StaticRegistry::new().with(CannedCapability::new("samtools_stats", json!("Total reads: 1000")));
        let mut agent = agent(oracle, registry);

        let report = agent.execute("Count reads in sample.bam", None).await;
        assert!(report.starts_with("# Analysis Complete"));
        assert!(report.contains("### stats"));
        assert!(report.contains("1000"));

        let history = agent.conversation_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].content, report);
        assert_eq!(agent.state().messages()[1].metadata["status"], "complete");
        assert_eq!(agent.state().intermediate_results()["stats"], "Total reads: 1000");
    }

    #[tokio::test]
    async fn test_planning_failure_reports_fallback() {
        let mut agent = agent(Arc::new(FailingOracle), StaticRegistry::new());
        let report = agent.execute("Count reads", None).await;

        assert!(report.starts_with("# Analysis Failed"));
        assert!(report.contains("Failed at step: Process query: Count reads"));
        assert!(report.contains("Error: No tool name specified"));
        assert_eq!(agent.state().messages()[1].metadata["fallback_plan"], true);
        assert_eq!(agent.state().errors().len(), 1);
    }

    #[tokio::test]
    async fn test_context_persists_across_queries() {
        let oracle = Arc::new(ScriptedOracle::new([stats_plan(), stats_plan()]));
        let registry = StaticRegistry::new().with(CannedCapability::new("samtools_stats", json!(1)));
        let mut agent = agent(oracle.clone(), registry);

        agent.add_context("genome", json!("hg38"));
        let extra = json!({"sample": "NA12878"}).as_object().cloned();
        agent.execute("first", extra).await;
        agent.execute("second", None).await;

        assert_eq!(agent.state().context().len(), 2);
        let second_prompt = &oracle.calls()[1][0].content;
        assert!(second_prompt.contains("genome: hg38"));
        assert!(second_prompt.contains("sample: NA12878"));
        assert!(second_prompt.contains("user: first..."));

        agent.reset();
        assert!(agent.conversation_history().is_empty());
        assert!(agent.state().context().is_empty());
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let result = AnalysisAgent::builder(Arc::new(FailingOracle))
            .capabilities(Arc::new(StaticRegistry::new()))
            .formats(Arc::new(StaticFormats::new()))
            .build();
        match result {
            Err(GenoflowError::Config(message)) => assert!(message.contains("validator")),
            _ => panic!("expected a config error"),
        }
    }

    #[test]
    fn test_from_config_wires_builtins() {
        let config = config_from_toml("[agent]\nmax_iterations = 7\n");
        let agent = AnalysisAgent::from_config(&config, Arc::new(FailingOracle)).unwrap();
        assert_eq!(agent.executor.max_iterations(), 7);
        assert!(agent.state().messages().is_empty());
    }
}
