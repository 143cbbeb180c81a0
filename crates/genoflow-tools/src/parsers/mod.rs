//! Genomic file parsers and the extension-keyed format registry.

pub mod fastq;
pub mod sam;
pub mod vcf;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use genoflow_core::config::ToolsConfig;
use genoflow_core::error::{GenoflowError, Result};
use genoflow_core::traits::{FileParser, FormatDispatcher};

pub use fastq::FastqParser;
pub use sam::{BamParser, SamParser};
pub use vcf::VcfParser;

/// Maps lowercase file extensions to parsers.
pub struct FormatRegistry {
    parsers: HashMap<String, Arc<dyn FileParser>>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Register a parser under one or more extensions (without the dot).
    pub fn register(&mut self, extensions: &[&str], parser: Arc<dyn FileParser>) {
        for ext in extensions {
            self.parsers.insert(ext.to_ascii_lowercase(), parser.clone());
        }
    }

    /// VCF, FASTQ, SAM and BAM (through samtools) parsers.
    pub fn with_builtins(config: &ToolsConfig) -> Self {
        let mut registry = Self::new();
        registry.register(&["vcf"], Arc::new(VcfParser));
        registry.register(&["fastq", "fq"], Arc::new(FastqParser));
        registry.register(&["sam"], Arc::new(SamParser));
        registry.register(&["bam"], Arc::new(BamParser::new(config)));
        registry
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.parsers.keys().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatDispatcher for FormatRegistry {
    fn get_parser(&self, file_path: &str) -> Result<Arc<dyn FileParser>> {
        let ext = Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if ext == "gz" || ext == "bgz" {
            return Err(GenoflowError::UnsupportedFormat(format!(
                "compressed input is not supported: {}",
                file_path
            )));
        }

        self.parsers
            .get(&ext)
            .cloned()
            .ok_or_else(|| GenoflowError::UnsupportedFormat(file_path.to_string()))
    }
}

/// Open a text file as an async line stream.
pub(crate) async fn open_lines(path: &Path) -> Result<Lines<BufReader<tokio::fs::File>>> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| parse_error(path, e.to_string()))?;
    Ok(BufReader::new(file).lines())
}

pub(crate) fn parse_error(path: &Path, message: impl Into<String>) -> GenoflowError {
    GenoflowError::FileParse {
        path: path.display().to_string(),
        message: message.into(),
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_by_extension() {
        let registry = FormatRegistry::with_builtins(&ToolsConfig::default());
        assert_eq!(registry.extensions(), vec!["bam", "fastq", "fq", "sam", "vcf"]);
        assert_eq!(registry.get_parser("calls.vcf").unwrap().file_type(), "vcf");
        assert_eq!(registry.get_parser("reads.FQ").unwrap().file_type(), "fastq");
        assert_eq!(registry.get_parser("/data/aln.bam").unwrap().file_type(), "bam");
    }

    #[test]
    fn test_unsupported_extensions() {
        let registry = FormatRegistry::with_builtins(&ToolsConfig::default());
        let err = registry.get_parser("notes.txt").err().unwrap();
        assert!(matches!(err, GenoflowError::UnsupportedFormat(_)));

        let err = registry.get_parser("calls.vcf.gz").err().unwrap();
        assert!(err.to_string().contains("compressed"));

        assert!(registry.get_parser("README").is_err());
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(35.456), 35.46);
        assert_eq!(round2(40.0), 40.0);
    }
}
