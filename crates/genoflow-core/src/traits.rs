use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::Result;
use crate::types::*;

/// A chat completion endpoint used for planning and reasoning.
pub trait ReasoningOracle: Send + Sync + 'static {
    /// Send an ordered list of messages and receive the full completion.
    fn complete(&self, messages: Vec<ChatMessage>) -> BoxFuture<'_, Result<Completion>>;
}

/// A named executable action invoked by tool steps.
pub trait Capability: Send + Sync + 'static {
    /// Capability name (matched against a step's tool name).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Execute with already-resolved parameters.
    fn execute(&self, params: JsonMap) -> BoxFuture<'_, Result<Value>>;

    /// Timeout in seconds for one invocation.
    fn timeout_secs(&self) -> u64 {
        300
    }
}

/// Name-keyed lookup of capabilities.
pub trait CapabilityRegistry: Send + Sync + 'static {
    /// Look up a capability, failing with `ToolNotFound` when absent.
    fn get_capability(&self, name: &str) -> Result<Arc<dyn Capability>>;
}

/// Parser for one genomic file format.
pub trait FileParser: Send + Sync + 'static {
    /// Format tag reported in step metadata (e.g. "vcf").
    fn file_type(&self) -> &str;

    fn parse<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Value>>;
}

/// Picks a parser by file extension.
pub trait FormatDispatcher: Send + Sync + 'static {
    /// Fails with `UnsupportedFormat` when the extension is not recognized.
    fn get_parser(&self, file_path: &str) -> Result<Arc<dyn FileParser>>;
}

/// Validation oracle.
pub trait Validator: Send + Sync + 'static {
    fn validate(&self, data: &Value, params: &JsonMap) -> Result<ValidationOutcome>;
}

/// Knowledge base lookups keyed by database name.
pub trait KnowledgeBase: Send + Sync + 'static {
    fn query<'a>(&'a self, database: &'a str, query: &'a Value) -> BoxFuture<'a, Result<Value>>;
}
