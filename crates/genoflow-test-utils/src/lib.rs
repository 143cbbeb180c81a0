//! Collaborator doubles and fixtures shared by genoflow tests.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde_json::{json, Value};

use genoflow_core::config::AppConfig;
use genoflow_core::error::{GenoflowError, Result};
use genoflow_core::traits::*;
use genoflow_core::types::*;

/// Oracle that replies from a script, one entry per call, and records prompts.
///
/// Once the script is exhausted every call fails with `LlmRequest`.
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedOracle {
    pub fn new<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a reply.
    pub fn then_reply(self, reply: impl Into<String>) -> Self {
        self.push(Ok(reply.into()));
        self
    }

    /// Queue a failing call.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.push(Err(GenoflowError::LlmRequest(message.into())));
        self
    }

    fn push(&self, reply: Result<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Messages received so far, one entry per call.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

impl ReasoningOracle for ScriptedOracle {
    fn complete(&self, messages: Vec<ChatMessage>) -> BoxFuture<'_, Result<Completion>> {
        Box::pin(async move {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(messages);
            }
            let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
            match next {
                Some(reply) => reply.map(Completion::text),
                None => Err(GenoflowError::LlmRequest("script exhausted".into())),
            }
        })
    }
}

/// Oracle that always fails.
pub struct FailingOracle;

impl ReasoningOracle for FailingOracle {
    fn complete(&self, _messages: Vec<ChatMessage>) -> BoxFuture<'_, Result<Completion>> {
        Box::pin(async { Err(GenoflowError::LlmRequest("connection refused".into())) })
    }
}

/// Capability returning a fixed value and counting invocations.
pub struct CannedCapability {
    name: String,
    output: Value,
    invocations: Arc<AtomicUsize>,
    last_params: Arc<Mutex<Option<JsonMap>>>,
}

impl CannedCapability {
    pub fn new(name: impl Into<String>, output: Value) -> Self {
        Self {
            name: name.into(),
            output,
            invocations: Arc::new(AtomicUsize::new(0)),
            last_params: Arc::new(Mutex::new(None)),
        }
    }

    /// Shared invocation counter, readable after the capability is registered.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.invocations.clone()
    }

    /// Shared slot holding the parameters of the latest invocation.
    pub fn last_params(&self) -> Arc<Mutex<Option<JsonMap>>> {
        self.last_params.clone()
    }
}

impl Capability for CannedCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns a canned value"
    }

    fn execute(&self, params: JsonMap) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut slot) = self.last_params.lock() {
                *slot = Some(params);
            }
            Ok(self.output.clone())
        })
    }
}

/// Capability that always fails with `ToolExecution`.
pub struct FailingCapability {
    name: String,
    message: String,
}

impl FailingCapability {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl Capability for FailingCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn execute(&self, _params: JsonMap) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            Err(GenoflowError::ToolExecution {
                tool: self.name.clone(),
                message: self.message.clone(),
            })
        })
    }
}

/// Capability that never finishes within its one-second timeout.
pub struct SlowCapability;

impl Capability for SlowCapability {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "Sleeps past its timeout"
    }

    fn execute(&self, _params: JsonMap) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async {
            futures::future::pending::<()>().await;
            Ok(Value::Null)
        })
    }

    fn timeout_secs(&self) -> u64 {
        1
    }
}

/// In-memory capability registry.
#[derive(Default)]
pub struct StaticRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: impl Capability) -> Self {
        self.capabilities
            .insert(capability.name().to_string(), Arc::new(capability));
        self
    }
}

impl CapabilityRegistry for StaticRegistry {
    fn get_capability(&self, name: &str) -> Result<Arc<dyn Capability>> {
        self.capabilities
            .get(name)
            .cloned()
            .ok_or_else(|| GenoflowError::ToolNotFound(name.to_string()))
    }
}

/// Parser returning a fixed value without touching the filesystem.
pub struct StaticParser {
    file_type: String,
    output: Value,
}

impl StaticParser {
    pub fn new(file_type: impl Into<String>, output: Value) -> Self {
        Self {
            file_type: file_type.into(),
            output,
        }
    }
}

impl FileParser for StaticParser {
    fn file_type(&self) -> &str {
        &self.file_type
    }

    fn parse<'a>(&'a self, _path: &'a Path) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move { Ok(self.output.clone()) })
    }
}

/// Extension-keyed dispatcher over [`StaticParser`]s.
#[derive(Default)]
pub struct StaticFormats {
    parsers: HashMap<String, Arc<dyn FileParser>>,
}

impl StaticFormats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, extension: &str, output: Value) -> Self {
        self.parsers.insert(
            extension.to_string(),
            Arc::new(StaticParser::new(extension, output)),
        );
        self
    }
}

impl FormatDispatcher for StaticFormats {
    fn get_parser(&self, file_path: &str) -> Result<Arc<dyn FileParser>> {
        let ext = Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        self.parsers
            .get(ext)
            .cloned()
            .ok_or_else(|| GenoflowError::UnsupportedFormat(file_path.to_string()))
    }
}

/// Validator returning a fixed outcome.
pub struct StaticValidator {
    outcome: ValidationOutcome,
}

impl StaticValidator {
    pub fn passing() -> Self {
        Self {
            outcome: ValidationOutcome::passed(),
        }
    }

    pub fn failing<S: Into<String>>(errors: impl IntoIterator<Item = S>) -> Self {
        Self {
            outcome: ValidationOutcome::failed(errors.into_iter().map(Into::into).collect()),
        }
    }
}

impl Validator for StaticValidator {
    fn validate(&self, _data: &Value, _params: &JsonMap) -> Result<ValidationOutcome> {
        Ok(self.outcome.clone())
    }
}

/// Knowledge base echoing `{"database", "query"}`; the `offline` database fails.
pub struct EchoKnowledge;

impl KnowledgeBase for EchoKnowledge {
    fn query<'a>(&'a self, database: &'a str, query: &'a Value) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            if database == "offline" {
                return Err(GenoflowError::KnowledgeQuery {
                    database: database.to_string(),
                    message: "service unavailable".into(),
                });
            }
            Ok(json!({ "database": database, "query": query }))
        })
    }
}

/// Wrap a plan payload the way an oracle typically answers.
pub fn fenced_plan(payload: &Value) -> String {
    format!(
        "Here is the workflow:\n\n```json\n{}\n```\n",
        serde_json::to_string_pretty(payload).unwrap_or_default()
    )
}

/// Parse an `AppConfig` from TOML text, panicking on error.
pub fn config_from_toml(text: &str) -> AppConfig {
    match toml::from_str(text) {
        Ok(config) => config,
        Err(e) => panic!("invalid test config: {e}"),
    }
}

/// Write `content` to a named temp file with the given suffix.
pub fn temp_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = match tempfile::Builder::new().suffix(suffix).tempfile() {
        Ok(f) => f,
        Err(e) => panic!("failed to create temp file: {e}"),
    };
    if let Err(e) = file.write_all(content.as_bytes()) {
        panic!("failed to write temp file: {e}");
    }
    file
}
