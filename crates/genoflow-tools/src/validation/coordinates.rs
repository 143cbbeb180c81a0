use regex::Regex;

use genoflow_core::error::{GenoflowError, Result};

use super::{Finding, Severity};

// Chromosome lengths (bp), UCSC.
const HG38: &[(&str, u64)] = &[
    ("1", 248_956_422), ("2", 242_193_529), ("3", 198_295_559),
    ("4", 190_214_555), ("5", 181_538_259), ("6", 170_805_979),
    ("7", 159_345_973), ("8", 145_138_636), ("9", 138_394_717),
    ("10", 133_797_422), ("11", 135_086_622), ("12", 133_275_309),
    ("13", 114_364_328), ("14", 107_043_718), ("15", 101_991_189),
    ("16", 90_338_345), ("17", 83_257_441), ("18", 80_373_285),
    ("19", 58_617_616), ("20", 64_444_167), ("21", 46_709_983),
    ("22", 50_818_468), ("X", 156_040_895), ("Y", 57_227_415),
    ("M", 16_569),
];

const HG19: &[(&str, u64)] = &[
    ("1", 249_250_621), ("2", 243_199_373), ("3", 198_022_430),
    ("4", 191_154_276), ("5", 180_915_260), ("6", 171_115_067),
    ("7", 159_138_663), ("8", 146_364_022), ("9", 141_213_431),
    ("10", 135_534_747), ("11", 135_006_516), ("12", 133_851_895),
    ("13", 115_169_878), ("14", 107_349_540), ("15", 102_531_392),
    ("16", 90_354_753), ("17", 81_195_210), ("18", 78_077_248),
    ("19", 59_128_983), ("20", 63_025_520), ("21", 48_129_895),
    ("22", 51_304_566), ("X", 155_270_560), ("Y", 59_373_566),
    ("M", 16_571),
];

/// A parsed `chrom:start[-end]` region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub chrom: String,
    pub start: i64,
    pub end: Option<i64>,
}

/// Checks chromosomes and 1-based positions against a reference build.
pub struct CoordinateValidator {
    build: &'static str,
    lengths: &'static [(&'static str, u64)],
    region_pattern: Regex,
}

impl CoordinateValidator {
    /// Accepts hg38, hg19 and their GRCh aliases, case-insensitively.
    pub fn new(genome_build: &str) -> Result<Self> {
        let (build, lengths) = match genome_build.to_ascii_lowercase().as_str() {
            "hg38" | "grch38" => ("hg38", HG38),
            "hg19" | "grch37" => ("hg19", HG19),
            other => {
                return Err(GenoflowError::Validation(format!(
                    "Unknown genome build: {}. Supported builds: hg38, hg19",
                    other
                )))
            }
        };
        let region_pattern = Regex::new(r"^(.+?):(\d+)(?:-(\d+))?$")
            .map_err(|e| GenoflowError::Validation(e.to_string()))?;

        Ok(Self {
            build,
            lengths,
            region_pattern,
        })
    }

    pub fn build(&self) -> &str {
        self.build
    }

    /// `chr1`, `1`, `chrMT` and `MT` all name the same chromosome.
    pub fn normalize_chromosome(chrom: &str) -> String {
        let bare = chrom.trim();
        let bare = bare.strip_prefix("chr").unwrap_or(bare);
        match bare {
            "MT" => "chrM".to_string(),
            other => format!("chr{}", other),
        }
    }

    pub fn chromosome_length(&self, chrom: &str) -> Option<u64> {
        let normalized = Self::normalize_chromosome(chrom);
        let bare = &normalized[3..];
        self.lengths
            .iter()
            .find(|(name, _)| *name == bare)
            .map(|(_, len)| *len)
    }

    pub fn validate_chromosome(&self, chrom: &str) -> Finding {
        if self.chromosome_length(chrom).is_some() {
            Finding::pass(
                Severity::Critical,
                format!("Chromosome {} exists in {}", chrom, self.build),
            )
        } else {
            Finding::fail(
                Severity::Critical,
                format!("Chromosome {} does not exist in {}", chrom, self.build),
            )
        }
    }

    pub fn validate_position(&self, chrom: &str, pos: i64) -> Finding {
        let Some(length) = self.chromosome_length(chrom) else {
            return self.validate_chromosome(chrom);
        };
        if pos < 1 {
            return Finding::fail(
                Severity::Critical,
                format!("Position must be >= 1, got {}", pos),
            );
        }
        if pos as u64 > length {
            return Finding::fail(
                Severity::Critical,
                format!(
                    "Position {} exceeds chromosome {} length ({} bp) in {}",
                    pos, chrom, length, self.build
                ),
            );
        }
        Finding::pass(Severity::Critical, format!("Position {}:{} is valid", chrom, pos))
    }

    pub fn validate_interval(&self, chrom: &str, start: i64, end: i64) -> Finding {
        for pos in [start, end] {
            let finding = self.validate_position(chrom, pos);
            if !finding.valid {
                return finding;
            }
        }
        if start > end {
            return Finding::fail(
                Severity::Critical,
                format!("Start position ({}) must be <= end position ({})", start, end),
            );
        }
        Finding::pass(
            Severity::Critical,
            format!(
                "Interval {}:{}-{} is valid ({} bp)",
                chrom,
                start,
                end,
                end - start + 1
            ),
        )
    }

    pub fn parse_region(&self, region: &str) -> Option<Region> {
        let caps = self.region_pattern.captures(region.trim())?;
        let chrom = caps.get(1)?.as_str().to_string();
        let start = caps.get(2)?.as_str().parse().ok()?;
        let end = match caps.get(3) {
            Some(m) => Some(m.as_str().parse().ok()?),
            None => None,
        };
        Some(Region { chrom, start, end })
    }

    /// Validate a `chrom:pos` or `chrom:start-end` string.
    pub fn validate_region(&self, region: &str) -> Finding {
        match self.parse_region(region) {
            Some(Region {
                chrom,
                start,
                end: Some(end),
            }) => self.validate_interval(&chrom, start, end),
            Some(Region {
                chrom,
                start,
                end: None,
            }) => self.validate_position(&chrom, start),
            None => Finding::fail(
                Severity::Critical,
                format!(
                    "Invalid region format: {} (expected chr:start-end or chr:pos)",
                    region
                ),
            ),
        }
    }
}
