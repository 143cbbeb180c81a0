use std::path::Path;

use futures::future::BoxFuture;
use serde_json::{json, Map, Value};

use genoflow_core::config::ToolsConfig;
use genoflow_core::error::{GenoflowError, Result};
use genoflow_core::traits::FileParser;

use crate::samtools::{SamtoolsCommand, SamtoolsTool};

use super::{open_lines, parse_error};

const FLAG_UNMAPPED: u32 = 0x4;

/// Running header and alignment counts for SAM text.
#[derive(Default)]
struct SamSummary {
    version: Option<String>,
    sort_order: Option<String>,
    references: Vec<Value>,
    read_groups: Vec<String>,
    programs: Vec<Value>,
    total: u64,
    mapped: u64,
    unmapped: u64,
}

/// `TAG:value` pairs of a header line.
fn header_tags(line: &str) -> Map<String, Value> {
    line.split('\t')
        .skip(1)
        .filter_map(|field| field.split_once(':'))
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

impl SamSummary {
    fn feed(&mut self, line: &str) -> std::result::Result<(), String> {
        if line.is_empty() {
            return Ok(());
        }
        if line.starts_with('@') {
            let tags = header_tags(line);
            let tag = |key: &str| tags.get(key).and_then(Value::as_str).map(String::from);
            match line.get(..3).unwrap_or(line) {
                "@HD" => {
                    self.version = tag("VN");
                    self.sort_order = tag("SO");
                }
                "@SQ" => {
                    let length = tag("LN").and_then(|l| l.parse::<u64>().ok());
                    self.references.push(json!({ "name": tag("SN"), "length": length }));
                }
                "@RG" => {
                    if let Some(id) = tag("ID") {
                        self.read_groups.push(id);
                    }
                }
                "@PG" => self.programs.push(json!({ "id": tag("ID"), "name": tag("PN") })),
                _ => {}
            }
            return Ok(());
        }

        let mut cols = line.split('\t');
        let flag = cols
            .nth(1)
            .ok_or_else(|| "alignment line has no FLAG column".to_string())?;
        let flag: u32 = flag
            .parse()
            .map_err(|_| format!("invalid FLAG '{}'", flag))?;

        self.total += 1;
        if flag & FLAG_UNMAPPED != 0 {
            self.unmapped += 1;
        } else {
            self.mapped += 1;
        }
        Ok(())
    }

    fn into_value(self, format: &str) -> Value {
        json!({
            "format": format,
            "version": self.version,
            "sort_order": self.sort_order,
            "references": self.references,
            "read_groups": self.read_groups,
            "programs": self.programs,
            "total_alignments": self.total,
            "mapped": self.mapped,
            "unmapped": self.unmapped,
        })
    }
}

/// Plain-text SAM parser.
pub struct SamParser;

impl FileParser for SamParser {
    fn file_type(&self) -> &str {
        "sam"
    }

    fn parse<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let mut lines = open_lines(path).await?;
            let mut summary = SamSummary::default();
            let mut line_no = 0usize;

            while let Some(line) = lines
                .next_line()
                .await
                .map_err(|e| parse_error(path, e.to_string()))?
            {
                line_no += 1;
                summary
                    .feed(line.trim_end())
                    .map_err(|m| parse_error(path, format!("line {}: {}", line_no, m)))?;
            }

            Ok(summary.into_value("SAM"))
        })
    }
}

/// BAM parser; decodes through `samtools view -h`.
pub struct BamParser {
    samtools: SamtoolsTool,
}

impl BamParser {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            samtools: SamtoolsTool::new(SamtoolsCommand::View, config),
        }
    }
}

impl FileParser for BamParser {
    fn file_type(&self) -> &str {
        "bam"
    }

    fn parse<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            if !path.exists() {
                return Err(parse_error(path, "file not found"));
            }
            let args = vec![
                "view".to_string(),
                "-h".to_string(),
                path.display().to_string(),
            ];
            let text = self.samtools.run(&args).await.map_err(|e| match e {
                GenoflowError::ToolExecution { message, .. } => parse_error(path, message),
                other => other,
            })?;

            let mut summary = SamSummary::default();
            for (i, line) in text.lines().enumerate() {
                summary
                    .feed(line)
                    .map_err(|m| parse_error(path, format!("line {}: {}", i + 1, m)))?;
            }
            Ok(summary.into_value("BAM"))
        })
    }
}
