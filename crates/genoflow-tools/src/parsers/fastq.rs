use std::path::Path;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use genoflow_core::error::Result;
use genoflow_core::traits::FileParser;

use super::{open_lines, parse_error, round2};

/// Reads sampled for the quality summary.
const READ_SAMPLE: usize = 100;

/// FASTQ parser reporting length, Phred+33 quality and GC content over a read sample.
pub struct FastqParser;

struct Read {
    sequence: String,
    quality: String,
}

impl Read {
    fn average_quality(&self) -> f64 {
        if self.quality.is_empty() {
            return 0.0;
        }
        let total: u64 = self.quality.bytes().map(|q| q.saturating_sub(33) as u64).sum();
        total as f64 / self.quality.len() as f64
    }

    fn gc_content(&self) -> f64 {
        if self.sequence.is_empty() {
            return 0.0;
        }
        let gc = self
            .sequence
            .bytes()
            .filter(|b| matches!(b.to_ascii_uppercase(), b'G' | b'C'))
            .count();
        gc as f64 / self.sequence.len() as f64 * 100.0
    }
}

impl FileParser for FastqParser {
    fn file_type(&self) -> &str {
        "fastq"
    }

    fn parse<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let mut lines = open_lines(path).await?;
            let mut reads = Vec::new();
            let mut record = 0usize;

            while reads.len() < READ_SAMPLE {
                let Some(header) = lines
                    .next_line()
                    .await
                    .map_err(|e| parse_error(path, e.to_string()))?
                else {
                    break;
                };
                if header.trim().is_empty() {
                    continue;
                }
                record += 1;

                let mut body = Vec::with_capacity(3);
                for _ in 0..3 {
                    match lines
                        .next_line()
                        .await
                        .map_err(|e| parse_error(path, e.to_string()))?
                    {
                        Some(line) => body.push(line),
                        None => {
                            return Err(parse_error(
                                path,
                                format!("record {}: truncated FASTQ record", record),
                            ))
                        }
                    }
                }

                if !header.starts_with('@') {
                    return Err(parse_error(
                        path,
                        format!("record {}: header must start with '@'", record),
                    ));
                }
                if !body[1].starts_with('+') {
                    return Err(parse_error(
                        path,
                        format!("record {}: separator line must start with '+'", record),
                    ));
                }
                let sequence = body[0].trim().to_string();
                let quality = body[2].trim().to_string();
                if sequence.len() != quality.len() {
                    return Err(parse_error(
                        path,
                        format!(
                            "record {}: sequence and quality lengths don't match: {} vs {}",
                            record,
                            sequence.len(),
                            quality.len()
                        ),
                    ));
                }
                reads.push(Read { sequence, quality });
            }

            if reads.is_empty() {
                return Ok(json!({ "format": "FASTQ", "is_empty": true }));
            }

            let n = reads.len() as f64;
            let avg_length = reads.iter().map(|r| r.sequence.len() as f64).sum::<f64>() / n;
            let avg_quality = reads.iter().map(Read::average_quality).sum::<f64>() / n;
            let avg_gc = reads.iter().map(Read::gc_content).sum::<f64>() / n;

            Ok(json!({
                "format": "FASTQ",
                "is_empty": false,
                "sample_size": reads.len(),
                "average_read_length": round2(avg_length),
                "average_quality_score": round2(avg_quality),
                "average_gc_content": round2(avg_gc),
            }))
        })
    }
}
