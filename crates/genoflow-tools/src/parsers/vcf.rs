use std::collections::BTreeSet;
use std::path::Path;

use futures::future::BoxFuture;
use serde_json::{json, Map, Value};

use genoflow_core::error::Result;
use genoflow_core::traits::FileParser;

use super::{open_lines, parse_error};

/// Variants included verbatim in the summary.
const VARIANT_SAMPLE: usize = 100;

/// Streaming VCF parser. Summarizes the header and samples the first variants.
pub struct VcfParser;

#[derive(Default)]
struct VcfHeader {
    file_format: String,
    contigs: Vec<String>,
    info_fields: Vec<String>,
    format_fields: Vec<String>,
    samples: Vec<String>,
    metadata: Map<String, Value>,
}

impl VcfHeader {
    fn feed(&mut self, line: &str) {
        if let Some(format) = line.strip_prefix("##fileformat=") {
            self.file_format = format.to_string();
        } else if line.starts_with("##contig=") {
            if let Some(id) = structured_field(line).get("ID") {
                self.contigs.push(id.clone());
            }
        } else if line.starts_with("##INFO=") {
            if let Some(id) = structured_field(line).get("ID") {
                self.info_fields.push(id.clone());
            }
        } else if line.starts_with("##FORMAT=") {
            if let Some(id) = structured_field(line).get("ID") {
                self.format_fields.push(id.clone());
            }
        } else if line.starts_with("#CHROM") {
            self.samples = line.split('\t').skip(9).map(String::from).collect();
        } else if let Some((key, value)) = line.trim_start_matches('#').split_once('=') {
            self.metadata
                .insert(key.to_string(), Value::String(value.to_string()));
        }
    }
}

/// Parse `<key=value,key="quoted, value">` header definitions.
fn structured_field(line: &str) -> std::collections::HashMap<String, String> {
    let mut fields = std::collections::HashMap::new();
    let (Some(start), Some(end)) = (line.find('<'), line.rfind('>')) else {
        return fields;
    };
    if start >= end {
        return fields;
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in line[start + 1..end].chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }

    for part in parts {
        if let Some((key, value)) = part.split_once('=') {
            fields.insert(key.to_string(), value.trim_matches('"').to_string());
        }
    }
    fields
}

fn parse_variant(line: &str, path: &Path, line_no: usize) -> Result<Value> {
    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() < 8 {
        return Err(parse_error(
            path,
            format!("line {}: expected at least 8 columns, found {}", line_no, cols.len()),
        ));
    }
    let pos: u64 = cols[1].parse().map_err(|_| {
        parse_error(path, format!("line {}: invalid position '{}'", line_no, cols[1]))
    })?;
    let qual = match cols[5] {
        "." => Value::Null,
        q => q
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| parse_error(path, format!("line {}: invalid QUAL '{}'", line_no, q)))?,
    };
    let filter: Vec<&str> = match cols[6] {
        "." => vec![],
        f => f.split(';').collect(),
    };

    let id = match cols[2] {
        "." => Value::Null,
        id => Value::from(id),
    };

    Ok(json!({
        "chrom": cols[0],
        "pos": pos,
        "id": id,
        "ref": cols[3],
        "alt": cols[4].split(',').collect::<Vec<_>>(),
        "qual": qual,
        "filter": filter,
    }))
}

impl FileParser for VcfParser {
    fn file_type(&self) -> &str {
        "vcf"
    }

    fn parse<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let mut lines = open_lines(path).await?;
            let mut header = VcfHeader::default();
            let mut variants = Vec::new();
            let mut variant_count = 0usize;
            let mut chromosomes = BTreeSet::new();
            let mut line_no = 0usize;

            while let Some(line) = lines
                .next_line()
                .await
                .map_err(|e| parse_error(path, e.to_string()))?
            {
                line_no += 1;
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                if line.starts_with('#') {
                    header.feed(line);
                    continue;
                }

                let variant = parse_variant(line, path, line_no)?;
                variant_count += 1;
                if let Some(chrom) = variant["chrom"].as_str() {
                    chromosomes.insert(chrom.to_string());
                }
                if variants.len() < VARIANT_SAMPLE {
                    variants.push(variant);
                }
            }

            Ok(json!({
                "format": "VCF",
                "file_format": header.file_format,
                "contigs": header.contigs,
                "info_fields": header.info_fields,
                "format_fields": header.format_fields,
                "samples": header.samples,
                "metadata": header.metadata,
                "variant_count": variant_count,
                "chromosomes": chromosomes,
                "variants": variants,
            }))
        })
    }
}
