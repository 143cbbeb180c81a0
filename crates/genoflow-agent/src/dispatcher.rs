use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use genoflow_core::config::ReferencePolicy;
use genoflow_core::error::{GenoflowError, Result};
use genoflow_core::plan::{Step, StepAction};
use genoflow_core::traits::{CapabilityRegistry, FormatDispatcher, KnowledgeBase, Validator};
use genoflow_core::types::{ExecutionResult, JsonMap};

/// `${name}` → `name`.
fn reference_name(value: &Value) -> Option<&str> {
    value
        .as_str()
        .and_then(|s| s.strip_prefix("${"))
        .and_then(|s| s.strip_suffix('}'))
}

/// Replace a `${name}` string with `results[name]`; anything else, including
/// an unresolvable reference, is returned unchanged.
pub fn resolve_value(value: &Value, results: &JsonMap) -> Value {
    reference_name(value)
        .and_then(|name| results.get(name))
        .unwrap_or(value)
        .clone()
}

/// Apply [`resolve_value`] to every top-level parameter.
pub fn resolve_parameters(params: &JsonMap, results: &JsonMap) -> JsonMap {
    params
        .iter()
        .map(|(k, v)| (k.clone(), resolve_value(v, results)))
        .collect()
}

/// Routes a step to the collaborator for its kind and wraps the outcome in an
/// [`ExecutionResult`]. Collaborator errors never escape.
pub struct Dispatcher {
    capabilities: Arc<dyn CapabilityRegistry>,
    formats: Arc<dyn FormatDispatcher>,
    validator: Arc<dyn Validator>,
    knowledge: Arc<dyn KnowledgeBase>,
    policy: ReferencePolicy,
}

impl Dispatcher {
    pub fn new(
        capabilities: Arc<dyn CapabilityRegistry>,
        formats: Arc<dyn FormatDispatcher>,
        validator: Arc<dyn Validator>,
        knowledge: Arc<dyn KnowledgeBase>,
    ) -> Self {
        Self {
            capabilities,
            formats,
            validator,
            knowledge,
            policy: ReferencePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReferencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ReferencePolicy {
        self.policy
    }

    pub async fn execute_step(&self, step: &Step, results: &JsonMap) -> ExecutionResult {
        info!(step_id = %step.id, kind = %step.kind(), description = %step.description, "Executing step");

        match &step.action {
            StepAction::ToolExecution { tool_name, params } => {
                let Some(tool) = tool_name else {
                    return ExecutionResult::failure("No tool name specified");
                };
                match self.run_tool(&step.id, tool, params, results).await {
                    Ok(output) => ExecutionResult::success(output).with_meta("tool", tool.as_str()),
                    Err(e) => ExecutionResult::failure(format!("Tool execution failed: {}", detail(&e))),
                }
            }
            StepAction::FileParsing { file_path } => {
                match self.parse_file(&step.id, file_path, results).await {
                    Ok((output, file_type)) => {
                        ExecutionResult::success(output).with_meta("file_type", file_type)
                    }
                    Err(e) => ExecutionResult::failure(format!("File parsing failed: {}", detail(&e))),
                }
            }
            StepAction::DataValidation { data_key, params } => {
                let Some(data) = results.get(data_key) else {
                    return ExecutionResult::failure(format!(
                        "Data key '{}' not found in results",
                        data_key
                    ));
                };
                self.validate(&step.id, data, params, results)
            }
            StepAction::KnowledgeQuery { database, query } => {
                match self.query_knowledge(&step.id, database, query, results).await {
                    Ok(output) => {
                        ExecutionResult::success(output).with_meta("database", database.as_str())
                    }
                    Err(e) => ExecutionResult::failure(format!("Knowledge query failed: {}", detail(&e))),
                }
            }
            StepAction::ResultAggregation { result_keys } => {
                debug!(keys = ?result_keys, "Aggregating results");
                let aggregated: JsonMap = result_keys
                    .iter()
                    .filter_map(|key| results.get(key).map(|v| (key.clone(), v.clone())))
                    .collect();
                ExecutionResult::success(Value::Object(aggregated))
            }
        }
    }

    /// Resolve references under the configured policy.
    fn resolve(&self, step_id: &str, params: &JsonMap, results: &JsonMap) -> Result<JsonMap> {
        for value in params.values() {
            self.check_reference(step_id, value, results)?;
        }
        Ok(resolve_parameters(params, results))
    }

    fn check_reference(&self, step_id: &str, value: &Value, results: &JsonMap) -> Result<()> {
        let Some(name) = reference_name(value) else {
            return Ok(());
        };
        if results.contains_key(name) {
            return Ok(());
        }
        match self.policy {
            ReferencePolicy::Strict => Err(GenoflowError::UnresolvedReference(format!("${{{}}}", name))),
            ReferencePolicy::Lenient => {
                warn!(step_id = %step_id, reference = %name, "Unresolved reference left as-is");
                Ok(())
            }
        }
    }

    async fn run_tool(
        &self,
        step_id: &str,
        tool: &str,
        params: &JsonMap,
        results: &JsonMap,
    ) -> Result<Value> {
        let params = self.resolve(step_id, params, results)?;
        let capability = self.capabilities.get_capability(tool)?;
        let timeout_secs = capability.timeout_secs();

        debug!(tool = %tool, "Executing tool");
        match tokio::time::timeout(Duration::from_secs(timeout_secs), capability.execute(params)).await {
            Ok(result) => result,
            Err(_) => Err(GenoflowError::ToolTimeout {
                tool: tool.to_string(),
                timeout_secs,
            }),
        }
    }

    async fn parse_file(
        &self,
        step_id: &str,
        file_path: &str,
        results: &JsonMap,
    ) -> Result<(Value, String)> {
        let raw = Value::String(file_path.to_string());
        self.check_reference(step_id, &raw, results)?;
        let resolved = resolve_value(&raw, results);
        let Some(path) = resolved.as_str() else {
            return Err(GenoflowError::FileParse {
                path: file_path.to_string(),
                message: "file_path did not resolve to a string".to_string(),
            });
        };

        debug!(file_path = %path, "Parsing file");
        let parser = self.formats.get_parser(path)?;
        let output = parser.parse(Path::new(path)).await?;
        Ok((output, parser.file_type().to_string()))
    }

    fn validate(
        &self,
        step_id: &str,
        data: &Value,
        params: &JsonMap,
        results: &JsonMap,
    ) -> ExecutionResult {
        debug!(step_id = %step_id, "Validating data");
        let outcome = self
            .resolve(step_id, params, results)
            .and_then(|params| self.validator.validate(data, &params));

        match outcome {
            Ok(outcome) => {
                let output = json!({ "valid": outcome.valid, "errors": outcome.errors });
                if outcome.valid {
                    ExecutionResult::success(output)
                } else {
                    ExecutionResult {
                        success: false,
                        output,
                        error: Some(format!("Validation failed: {}", outcome.errors.join("; "))),
                        metadata: JsonMap::new(),
                    }
                }
            }
            Err(e) => ExecutionResult::failure(format!("Validation failed: {}", detail(&e))),
        }
    }

    async fn query_knowledge(
        &self,
        step_id: &str,
        database: &str,
        query: &Value,
        results: &JsonMap,
    ) -> Result<Value> {
        let query = match query {
            Value::Object(fields) => Value::Object(self.resolve(step_id, fields, results)?),
            other => {
                self.check_reference(step_id, other, results)?;
                resolve_value(other, results)
            }
        };
        debug!(database = %database, "Querying knowledge base");
        self.knowledge.query(database, &query).await
    }
}

/// Error text without the variant's own prefix when the caller adds one.
fn detail(e: &GenoflowError) -> String {
    match e {
        GenoflowError::ToolExecution { tool, message } => format!("{}: {}", tool, message),
        GenoflowError::KnowledgeQuery { database, message } => format!("{}: {}", database, message),
        GenoflowError::Validation(message) => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genoflow_test_utils::*;
    use proptest::prelude::*;
    use std::sync::atomic::Ordering;

    fn results(value: Value) -> JsonMap {
        value.as_object().cloned().unwrap_or_default()
    }

    fn dispatcher_with(registry: StaticRegistry, validator: StaticValidator) -> Dispatcher {
        Dispatcher::new(
            Arc::new(registry),
            Arc::new(StaticFormats::new().with("vcf", json!({"variant_count": 3}))),
            Arc::new(validator),
            Arc::new(EchoKnowledge),
        )
    }

    fn dispatcher() -> Dispatcher {
        dispatcher_with(
            StaticRegistry::new().with(CannedCapability::new("samtools_stats", json!("Total reads: 1000"))),
            StaticValidator::passing(),
        )
    }

    fn tool_step(tool: Option<&str>, params: Value) -> Step {
        Step::new(
            "step_1",
            "run tool",
            StepAction::ToolExecution {
                tool_name: tool.map(String::from),
                params: results(params),
            },
        )
    }

    #[test]
    fn test_resolve_parameters() {
        let res = results(json!({"k": "v"}));
        assert_eq!(
            resolve_parameters(&results(json!({"x": "${k}"})), &res),
            results(json!({"x": "v"}))
        );
        assert_eq!(
            resolve_parameters(&results(json!({"x": "${missing}"})), &JsonMap::new()),
            results(json!({"x": "${missing}"}))
        );
        assert_eq!(
            resolve_parameters(&results(json!({"x": 5})), &JsonMap::new()),
            results(json!({"x": 5}))
        );
        // only whole-string references resolve
        assert_eq!(
            resolve_value(&json!("prefix ${k}"), &res),
            json!("prefix ${k}")
        );
        // resolved values keep their JSON type
        let res = results(json!({"stats": {"reads": 10}}));
        assert_eq!(resolve_value(&json!("${stats}"), &res), json!({"reads": 10}));
    }

    #[tokio::test]
    async fn test_tool_execution() {
        let cap = CannedCapability::new("samtools_view", json!("ok"));
        let seen = cap.last_params();
        let d = dispatcher_with(StaticRegistry::new().with(cap), StaticValidator::passing());

        let step = tool_step(Some("samtools_view"), json!({"input_file": "${bam}", "header": true}));
        let result = d
            .execute_step(&step, &results(json!({"bam": "/data/sample.bam"})))
            .await;

        assert!(result.success);
        assert_eq!(result.output, json!("ok"));
        assert_eq!(result.metadata["tool"], "samtools_view");
        let params = seen.lock().unwrap().clone().unwrap();
        assert_eq!(params["input_file"], "/data/sample.bam");
        assert_eq!(params["header"], true);
    }

    #[tokio::test]
    async fn test_tool_failures() {
        let d = dispatcher_with(
            StaticRegistry::new().with(FailingCapability::new("bad", "exit code 1: boom")),
            StaticValidator::passing(),
        );

        let none = d.execute_step(&tool_step(None, json!({})), &JsonMap::new()).await;
        assert_eq!(none.error.as_deref(), Some("No tool name specified"));

        let missing = d
            .execute_step(&tool_step(Some("bedtools"), json!({})), &JsonMap::new())
            .await;
        assert!(!missing.success);
        assert_eq!(
            missing.error.as_deref(),
            Some("Tool execution failed: Tool not found: bedtools")
        );

        let failed = d
            .execute_step(&tool_step(Some("bad"), json!({})), &JsonMap::new())
            .await;
        assert_eq!(
            failed.error.as_deref(),
            Some("Tool execution failed: bad: exit code 1: boom")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_timeout() {
        let d = dispatcher_with(StaticRegistry::new().with(SlowCapability), StaticValidator::passing());
        let result = d
            .execute_step(&tool_step(Some("slow"), json!({})), &JsonMap::new())
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timeout after 1s"));
    }

    #[tokio::test]
    async fn test_strict_policy_blocks_collaborator() {
        let cap = CannedCapability::new("samtools_stats", json!("x"));
        let counter = cap.counter();
        let d = dispatcher_with(StaticRegistry::new().with(cap), StaticValidator::passing())
            .with_policy(ReferencePolicy::Strict);

        let step = tool_step(Some("samtools_stats"), json!({"input_file": "${bam}"}));
        let result = d.execute_step(&step, &JsonMap::new()).await;
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Tool execution failed: Unresolved reference: ${bam}")
        );
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        // lenient passes the placeholder through
        let lenient = dispatcher();
        let step = tool_step(Some("samtools_stats"), json!({"input_file": "${bam}"}));
        assert!(lenient.execute_step(&step, &JsonMap::new()).await.success);
    }

    #[tokio::test]
    async fn test_file_parsing() {
        let d = dispatcher();
        let step = Step::new(
            "p",
            "parse",
            StepAction::FileParsing {
                file_path: "${vcf_path}".into(),
            },
        );

        let ok = d
            .execute_step(&step, &results(json!({"vcf_path": "calls.vcf"})))
            .await;
        assert!(ok.success);
        assert_eq!(ok.output["variant_count"], 3);
        assert_eq!(ok.metadata["file_type"], "vcf");

        let unsupported = d
            .execute_step(&step, &results(json!({"vcf_path": "notes.txt"})))
            .await;
        assert_eq!(
            unsupported.error.as_deref(),
            Some("File parsing failed: Unsupported file format: notes.txt")
        );

        let not_a_string = d
            .execute_step(&step, &results(json!({"vcf_path": 42})))
            .await;
        assert!(not_a_string.error.unwrap().contains("did not resolve to a string"));
    }

    #[tokio::test]
    async fn test_data_validation() {
        let step = Step::new(
            "v",
            "validate",
            StepAction::DataValidation {
                data_key: "variants".into(),
                params: results(json!({"check": "variants"})),
            },
        );

        let missing = dispatcher().execute_step(&step, &JsonMap::new()).await;
        assert_eq!(
            missing.error.as_deref(),
            Some("Data key 'variants' not found in results")
        );

        let data = results(json!({"variants": []}));
        let passed = dispatcher().execute_step(&step, &data).await;
        assert!(passed.success);
        assert_eq!(passed.output, json!({"valid": true, "errors": []}));

        let d = dispatcher_with(
            StaticRegistry::new(),
            StaticValidator::failing(["bad ref", "bad alt"]),
        );
        let failed = d.execute_step(&step, &data).await;
        assert!(!failed.success);
        assert_eq!(failed.output["valid"], false);
        assert_eq!(failed.error.as_deref(), Some("Validation failed: bad ref; bad alt"));
    }

    #[tokio::test]
    async fn test_knowledge_query() {
        let step = |db: &str| {
            Step::new(
                "k",
                "lookup",
                StepAction::KnowledgeQuery {
                    database: db.into(),
                    query: json!({"symbol": "${gene}"}),
                },
            )
        };
        let res = results(json!({"gene": "BRCA1"}));

        let ok = dispatcher().execute_step(&step("ensembl"), &res).await;
        assert!(ok.success);
        assert_eq!(ok.output["query"], json!({"symbol": "BRCA1"}));
        assert_eq!(ok.metadata["database"], "ensembl");

        let failed = dispatcher().execute_step(&step("offline"), &res).await;
        assert_eq!(
            failed.error.as_deref(),
            Some("Knowledge query failed: offline: service unavailable")
        );
    }

    #[tokio::test]
    async fn test_result_aggregation_skips_unknown_keys() {
        let step = Step::new(
            "a",
            "aggregate",
            StepAction::ResultAggregation {
                result_keys: vec!["b".into(), "missing".into(), "a".into()],
            },
        );
        let res = results(json!({"a": 1, "b": 2, "c": 3}));
        let out = dispatcher().execute_step(&step, &res).await;
        assert!(out.success);
        let keys: Vec<&String> = out.output.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    proptest! {
        #[test]
        fn resolution_touches_only_known_references(
            keys in proptest::collection::btree_set("[a-z]{1,6}", 1..6),
            literal in "[^$]{0,12}",
        ) {
            let results: JsonMap = keys
                .iter()
                .enumerate()
                .map(|(i, k)| (k.clone(), json!(i)))
                .collect();

            let mut params = JsonMap::new();
            for k in &keys {
                params.insert(format!("ref_{}", k), json!(format!("${{{}}}", k)));
            }
            params.insert("missing".into(), json!("${not-a-result}"));
            params.insert("literal".into(), json!(literal.clone()));

            let resolved = resolve_parameters(&params, &results);
            prop_assert_eq!(resolved.len(), params.len());
            for k in &keys {
                prop_assert_eq!(&resolved[&format!("ref_{}", k)], &results[k]);
            }
            prop_assert_eq!(&resolved["missing"], &json!("${not-a-result}"));
            prop_assert_eq!(&resolved["literal"], &json!(literal));
        }
    }
}
