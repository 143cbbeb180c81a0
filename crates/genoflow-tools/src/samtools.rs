//! samtools wrappers exposed as capabilities.
//!
//! Each command validates its parameters, builds an argv, runs the binary
//! through `tokio::process` and turns stdout into a structured value.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{debug, warn};

use genoflow_core::config::ToolsConfig;
use genoflow_core::error::{GenoflowError, Result};
use genoflow_core::traits::Capability;
use genoflow_core::types::JsonMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamtoolsCommand {
    View,
    Stats,
    Index,
}

impl SamtoolsCommand {
    fn subcommand(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Stats => "stats",
            Self::Index => "index",
        }
    }

    fn tool_name(&self) -> &'static str {
        match self {
            Self::View => "samtools_view",
            Self::Stats => "samtools_stats",
            Self::Index => "samtools_index",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::View => "View and convert SAM/BAM/CRAM files",
            Self::Stats => "Compute statistics for SAM/BAM/CRAM files",
            Self::Index => "Index BAM/CRAM files",
        }
    }
}

pub struct SamtoolsTool {
    command: SamtoolsCommand,
    binary: String,
    timeout_secs: u64,
    working_dir: Option<PathBuf>,
}

impl SamtoolsTool {
    pub fn new(command: SamtoolsCommand, config: &ToolsConfig) -> Self {
        Self {
            command,
            binary: config.samtools_binary.clone(),
            timeout_secs: config.timeout_secs,
            working_dir: config.working_dir.clone(),
        }
    }

    fn error(&self, message: impl Into<String>) -> GenoflowError {
        GenoflowError::ToolExecution {
            tool: self.command.tool_name().to_string(),
            message: message.into(),
        }
    }

    pub(crate) async fn run(&self, args: &[String]) -> Result<String> {
        let binary = find_binary(&self.binary)
            .ok_or_else(|| self.error(format!("{} not found on PATH", self.binary)))?;

        debug!(tool = self.command.tool_name(), args = ?args, "Running samtools");

        let mut cmd = tokio::process::Command::new(binary);
        cmd.args(args).kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let timeout = Duration::from_secs(self.timeout_secs);
        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(self.error(e.to_string())),
            Err(_) => {
                return Err(GenoflowError::ToolTimeout {
                    tool: self.command.tool_name().to_string(),
                    timeout_secs: self.timeout_secs,
                })
            }
        };

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(tool = self.command.tool_name(), code, "samtools exited with error");
            return Err(self.error(format!("exit code {}: {}", code, stderr.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Capability for SamtoolsTool {
    fn name(&self) -> &str {
        self.command.tool_name()
    }

    fn description(&self) -> &str {
        self.command.description()
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    fn execute(&self, params: JsonMap) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let input = validate_input(self.command, &params)?;
            let args = build_args(self.command, &params, &input);
            let stdout = self.run(&args).await?;

            let output = match self.command {
                SamtoolsCommand::View if stdout.is_empty() => {
                    Value::String("Output written to file".into())
                }
                SamtoolsCommand::View => Value::String(stdout),
                SamtoolsCommand::Stats => parse_stats(&stdout),
                SamtoolsCommand::Index => json!({ "index_file": index_path(&params, &input) }),
            };
            Ok(output)
        })
    }
}

/// Check `input_file` is present and exists; index also needs BAM or CRAM.
fn validate_input(command: SamtoolsCommand, params: &JsonMap) -> Result<String> {
    let input = params
        .get("input_file")
        .and_then(Value::as_str)
        .ok_or_else(|| GenoflowError::ToolValidation("input_file parameter is required".into()))?;

    if !Path::new(input).exists() {
        return Err(GenoflowError::ToolValidation(format!(
            "Input file not found: {}",
            input
        )));
    }
    if command == SamtoolsCommand::Index && !(input.ends_with(".bam") || input.ends_with(".cram")) {
        return Err(GenoflowError::ToolValidation(
            "Input file must be BAM or CRAM format".into(),
        ));
    }
    Ok(input.to_string())
}

fn flag(params: &JsonMap, key: &str) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Render a string or number parameter as a command-line value.
fn arg_value(params: &JsonMap, key: &str) -> Option<String> {
    match params.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn push_opt(args: &mut Vec<String>, params: &JsonMap, key: &str, opt: &str) {
    if let Some(value) = arg_value(params, key) {
        args.push(opt.to_string());
        args.push(value);
    }
}

fn build_args(command: SamtoolsCommand, params: &JsonMap, input: &str) -> Vec<String> {
    let mut args = vec![command.subcommand().to_string()];

    match command {
        SamtoolsCommand::View => {
            if flag(params, "output_bam") {
                args.push("-b".into());
            } else if flag(params, "output_cram") {
                args.push("-C".into());
            }
            push_opt(&mut args, params, "output_file", "-o");
            if flag(params, "with_header") {
                args.push("-h".into());
            }
            push_opt(&mut args, params, "min_mapq", "-q");
            push_opt(&mut args, params, "require_flags", "-f");
            push_opt(&mut args, params, "exclude_flags", "-F");
            push_opt(&mut args, params, "threads", "-@");
            args.push(input.to_string());
            // Region must follow the input file
            if let Some(region) = arg_value(params, "region") {
                args.push(region);
            }
        }
        SamtoolsCommand::Stats => {
            if flag(params, "coverage") {
                args.push("-c".into());
            }
            push_opt(&mut args, params, "target_bed", "-t");
            push_opt(&mut args, params, "reference", "-r");
            push_opt(&mut args, params, "threads", "-@");
            args.push(input.to_string());
        }
        SamtoolsCommand::Index => {
            let index_kind = if flag(params, "csi") { "-c" } else { "-b" };
            args.push(index_kind.into());
            push_opt(&mut args, params, "threads", "-@");
            args.push(input.to_string());
            if let Some(out) = arg_value(params, "output_index") {
                args.push(out);
            }
        }
    }

    args
}

fn index_path(params: &JsonMap, input: &str) -> String {
    if let Some(out) = arg_value(params, "output_index") {
        return out;
    }
    let ext = if flag(params, "csi") { "csi" } else { "bai" };
    format!("{}.{}", input, ext)
}

/// Parse the `SN` summary lines of `samtools stats` output.
pub fn parse_stats(stdout: &str) -> Value {
    let mut raw_total_sequences = 0u64;
    let mut reads_mapped = 0u64;
    let mut reads_unmapped = 0u64;
    let mut average_quality = 0.0f64;
    let mut insert_size_average = 0.0f64;
    let mut error_rate = 0.0f64;

    for line in stdout.lines() {
        let mut parts = line.trim().split('\t');
        if parts.next() != Some("SN") {
            continue;
        }
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let key = key.trim().trim_end_matches(':').to_lowercase();
        let value = value.trim();

        if key.contains("raw total sequences") {
            raw_total_sequences = value.parse().unwrap_or(0);
        } else if key.contains("reads mapped") && !key.contains("reads mapped and") {
            reads_mapped = value.parse().unwrap_or(0);
        } else if key.contains("reads unmapped") {
            reads_unmapped = value.parse().unwrap_or(0);
        } else if key.contains("average quality") {
            average_quality = value.parse().unwrap_or(0.0);
        } else if key.contains("insert size average") {
            insert_size_average = value.parse().unwrap_or(0.0);
        } else if key.contains("error rate") {
            error_rate = value.parse().unwrap_or(0.0);
        }
    }

    json!({
        "raw_total_sequences": raw_total_sequences,
        "reads_mapped": reads_mapped,
        "reads_unmapped": reads_unmapped,
        "average_quality": average_quality,
        "insert_size_average": insert_size_average,
        "error_rate": error_rate,
    })
}

/// Resolve a binary name against `PATH`; paths with a separator are checked directly.
pub(crate) fn find_binary(binary: &str) -> Option<PathBuf> {
    let candidate = Path::new(binary);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|full| full.is_file())
}
