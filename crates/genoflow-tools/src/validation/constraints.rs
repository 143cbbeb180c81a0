use std::str::FromStr;

use genoflow_core::error::{GenoflowError, Result};

use super::{Finding, Severity};

/// A summary statistic with a known plausible range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    GcContent,
    PhredScore,
    Coverage,
    MappingQuality,
    VcfQuality,
    AlleleFrequency,
    ReadLength,
    InsertSize,
}

impl Constraint {
    pub const ALL: [Constraint; 8] = [
        Constraint::GcContent,
        Constraint::PhredScore,
        Constraint::Coverage,
        Constraint::MappingQuality,
        Constraint::VcfQuality,
        Constraint::AlleleFrequency,
        Constraint::ReadLength,
        Constraint::InsertSize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Constraint::GcContent => "gc_content",
            Constraint::PhredScore => "phred_score",
            Constraint::Coverage => "coverage",
            Constraint::MappingQuality => "mapping_quality",
            Constraint::VcfQuality => "vcf_quality",
            Constraint::AlleleFrequency => "allele_frequency",
            Constraint::ReadLength => "read_length",
            Constraint::InsertSize => "insert_size",
        }
    }
}

impl FromStr for Constraint {
    type Err = GenoflowError;

    /// Accepts the names above plus the `mapq`, `qual` and `af` aliases.
    fn from_str(s: &str) -> Result<Self> {
        let name = s.to_ascii_lowercase();
        let alias = match name.as_str() {
            "mapq" => Some(Constraint::MappingQuality),
            "qual" => Some(Constraint::VcfQuality),
            "af" => Some(Constraint::AlleleFrequency),
            _ => None,
        };
        alias
            .or_else(|| Self::ALL.into_iter().find(|c| c.as_str() == name))
            .ok_or_else(|| {
                let available: Vec<&str> = Self::ALL.iter().map(Constraint::as_str).collect();
                GenoflowError::Validation(format!(
                    "Unknown constraint type: {}. Available types: {}",
                    s,
                    available.join(", ")
                ))
            })
    }
}

/// Record fields checked by `check = "constraints"`, with the factor that
/// brings the field into the constraint's unit.
///
/// The FASTQ parser reports GC content as a percentage.
pub const KNOWN_FIELDS: &[(&str, Constraint, f64)] = &[
    ("gc_content", Constraint::GcContent, 1.0),
    ("average_gc_content", Constraint::GcContent, 0.01),
    ("phred_score", Constraint::PhredScore, 1.0),
    ("average_quality_score", Constraint::PhredScore, 1.0),
    ("average_quality", Constraint::PhredScore, 1.0),
    ("coverage", Constraint::Coverage, 1.0),
    ("mean_coverage", Constraint::Coverage, 1.0),
    ("depth", Constraint::Coverage, 1.0),
    ("mapq", Constraint::MappingQuality, 1.0),
    ("mapping_quality", Constraint::MappingQuality, 1.0),
    ("qual", Constraint::VcfQuality, 1.0),
    ("af", Constraint::AlleleFrequency, 1.0),
    ("allele_frequency", Constraint::AlleleFrequency, 1.0),
    ("read_length", Constraint::ReadLength, 1.0),
    ("average_read_length", Constraint::ReadLength, 1.0),
    ("insert_size", Constraint::InsertSize, 1.0),
    ("insert_size_average", Constraint::InsertSize, 1.0),
];

/// Range checks for sequencing summary statistics.
///
/// Values outside the physical range fail at high severity. A fraction
/// given as a percentage fails at medium. Unusual but possible values pass
/// with a low-severity note.
#[derive(Debug, Clone, Default)]
pub struct ConstraintValidator {
    allow_high_phred: bool,
}

impl ConstraintValidator {
    pub fn new(allow_high_phred: bool) -> Self {
        Self { allow_high_phred }
    }

    pub fn validate(&self, constraint: Constraint, value: f64) -> Finding {
        match constraint {
            Constraint::GcContent => validate_fraction("GC content", value),
            Constraint::PhredScore => self.validate_phred_score(value),
            Constraint::Coverage => validate_coverage(value),
            Constraint::MappingQuality => validate_mapping_quality(value),
            Constraint::VcfQuality => validate_vcf_quality(value),
            Constraint::AlleleFrequency => validate_fraction("Allele frequency", value),
            Constraint::ReadLength => validate_read_length(value),
            Constraint::InsertSize => validate_insert_size(value),
        }
    }

    /// Phred scores above 60 fail unless the platform is known to emit them.
    pub fn validate_phred_score(&self, score: f64) -> Finding {
        if score < 0.0 {
            return Finding::fail(
                Severity::High,
                format!("PHRED score cannot be negative. Got {}", score),
            );
        }
        if score > 60.0 && !self.allow_high_phred {
            return Finding::fail(
                Severity::Medium,
                format!("PHRED score {} is unusually high (typically 0-60)", score),
            );
        }
        Finding::pass(Severity::Medium, format!("PHRED score {} is valid", score))
    }
}

fn validate_fraction(label: &str, value: f64) -> Finding {
    if (0.0..=1.0).contains(&value) {
        return Finding::pass(Severity::Medium, format!("{} {:.4} is valid", label, value));
    }
    if (0.0..=100.0).contains(&value) {
        return Finding::fail(
            Severity::Medium,
            format!(
                "{} should be a fraction (0-1), not percentage. Got {} (as a fraction: {:.4})",
                label,
                value,
                value / 100.0
            ),
        );
    }
    Finding::fail(
        Severity::High,
        format!("{} must be between 0 and 1. Got {}", label, value),
    )
}

fn validate_coverage(coverage: f64) -> Finding {
    if coverage < 0.0 {
        return Finding::fail(
            Severity::High,
            format!("Coverage cannot be negative. Got {}", coverage),
        );
    }
    if coverage > 10_000.0 {
        return Finding::pass(
            Severity::Low,
            format!(
                "Coverage {}x is very high (possibly multi-mapping or repetitive region)",
                coverage
            ),
        );
    }
    Finding::pass(Severity::Medium, format!("Coverage {}x is valid", coverage))
}

/// 255 means the mapping quality is unavailable.
fn validate_mapping_quality(mapq: f64) -> Finding {
    if !(0.0..=255.0).contains(&mapq) {
        return Finding::fail(
            Severity::High,
            format!("Mapping quality must be 0-255. Got {}", mapq),
        );
    }
    if mapq == 255.0 {
        return Finding::pass(
            Severity::Low,
            "Mapping quality is 255 (unavailable/not applicable)",
        );
    }
    Finding::pass(Severity::Medium, format!("Mapping quality {} is valid", mapq))
}

fn validate_vcf_quality(qual: f64) -> Finding {
    if qual < 0.0 {
        return Finding::fail(
            Severity::High,
            format!("VCF quality score cannot be negative. Got {}", qual),
        );
    }
    if qual == 0.0 {
        return Finding::pass(
            Severity::Low,
            "VCF quality is 0 (typically means quality unknown)",
        );
    }
    Finding::pass(Severity::Medium, format!("VCF quality {} is valid", qual))
}

fn validate_read_length(length: f64) -> Finding {
    if length <= 0.0 {
        return Finding::fail(
            Severity::High,
            format!("Read length must be positive. Got {}", length),
        );
    }
    let message = if length < 25.0 {
        format!("Read length {} bp is unusually short", length)
    } else if length > 100_000.0 {
        format!("Read length {} bp is very long (possibly long-read sequencing)", length)
    } else {
        format!("Read length {} bp is valid", length)
    };
    Finding::pass(Severity::Low, message)
}

fn validate_insert_size(insert_size: f64) -> Finding {
    if insert_size < 0.0 {
        return Finding::fail(
            Severity::High,
            format!("Insert size cannot be negative. Got {}", insert_size),
        );
    }
    let message = if insert_size < 100.0 {
        format!("Insert size {} bp is very small", insert_size)
    } else if insert_size > 10_000.0 {
        format!("Insert size {} bp is very large", insert_size)
    } else {
        format!("Insert size {} bp is valid", insert_size)
    };
    Finding::pass(Severity::Low, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(constraint: Constraint, value: f64) -> Finding {
        ConstraintValidator::default().validate(constraint, value)
    }

    #[test]
    fn test_gc_content_bounds() {
        assert!(check(Constraint::GcContent, 0.42).valid);
        assert!(check(Constraint::GcContent, 0.0).valid);
        assert!(check(Constraint::GcContent, 1.0).valid);

        let negative = check(Constraint::GcContent, -0.1);
        assert!(!negative.valid);
        assert_eq!(negative.severity, Severity::High);

        let percent = check(Constraint::GcContent, 42.0);
        assert!(!percent.valid);
        assert_eq!(percent.severity, Severity::Medium);
        assert!(percent.message.contains("not percentage"));
        assert!(percent.message.contains("0.4200"));

        let huge = check(Constraint::GcContent, 150.0);
        assert_eq!(huge.severity, Severity::High);
        assert!(huge.message.contains("must be between 0 and 1"));
    }

    #[test]
    fn test_phred_score_bounds() {
        assert!(check(Constraint::PhredScore, 30.0).valid);
        assert!(check(Constraint::PhredScore, 60.0).valid);

        let negative = check(Constraint::PhredScore, -1.0);
        assert!(!negative.valid);
        assert_eq!(negative.severity, Severity::High);

        let high = check(Constraint::PhredScore, 70.0);
        assert!(!high.valid);
        assert_eq!(high.severity, Severity::Medium);
        assert!(ConstraintValidator::new(true).validate_phred_score(70.0).valid);
    }

    #[test]
    fn test_coverage_bounds() {
        assert!(check(Constraint::Coverage, 0.0).valid);
        assert_eq!(check(Constraint::Coverage, 30.0).severity, Severity::Medium);

        let negative = check(Constraint::Coverage, -5.0);
        assert!(!negative.valid);
        assert_eq!(negative.severity, Severity::High);

        let deep = check(Constraint::Coverage, 20_000.0);
        assert!(deep.valid);
        assert_eq!(deep.severity, Severity::Low);
        assert!(deep.message.contains("very high"));
    }

    #[test]
    fn test_mapping_quality_bounds() {
        assert!(check(Constraint::MappingQuality, 0.0).valid);
        assert!(check(Constraint::MappingQuality, 60.0).valid);

        let unavailable = check(Constraint::MappingQuality, 255.0);
        assert!(unavailable.valid);
        assert_eq!(unavailable.severity, Severity::Low);

        assert!(!check(Constraint::MappingQuality, 256.0).valid);
        let negative = check(Constraint::MappingQuality, -1.0);
        assert!(!negative.valid);
        assert_eq!(negative.severity, Severity::High);
    }

    #[test]
    fn test_vcf_quality_bounds() {
        assert!(check(Constraint::VcfQuality, 50.0).valid);

        let unknown = check(Constraint::VcfQuality, 0.0);
        assert!(unknown.valid);
        assert_eq!(unknown.severity, Severity::Low);

        let negative = check(Constraint::VcfQuality, -3.0);
        assert!(!negative.valid);
        assert_eq!(negative.severity, Severity::High);
    }

    #[test]
    fn test_allele_frequency_bounds() {
        assert!(check(Constraint::AlleleFrequency, 0.5).valid);
        assert_eq!(check(Constraint::AlleleFrequency, 50.0).severity, Severity::Medium);
        let out = check(Constraint::AlleleFrequency, -0.2);
        assert!(!out.valid);
        assert_eq!(out.severity, Severity::High);
    }

    #[test]
    fn test_read_length_bounds() {
        assert!(check(Constraint::ReadLength, 150.0).valid);
        assert!(!check(Constraint::ReadLength, 0.0).valid);
        assert_eq!(check(Constraint::ReadLength, -10.0).severity, Severity::High);

        let short = check(Constraint::ReadLength, 20.0);
        assert!(short.valid);
        assert!(short.message.contains("unusually short"));

        let long = check(Constraint::ReadLength, 150_000.0);
        assert!(long.valid);
        assert!(long.message.contains("long-read"));
    }

    #[test]
    fn test_insert_size_bounds() {
        assert!(check(Constraint::InsertSize, 350.0).valid);
        assert!(check(Constraint::InsertSize, 0.0).valid);

        let negative = check(Constraint::InsertSize, -1.0);
        assert!(!negative.valid);
        assert_eq!(negative.severity, Severity::High);

        assert!(check(Constraint::InsertSize, 50.0).message.contains("very small"));
        assert!(check(Constraint::InsertSize, 20_000.0).message.contains("very large"));
    }

    #[test]
    fn test_constraint_names_and_aliases() {
        for constraint in Constraint::ALL {
            assert_eq!(constraint.as_str().parse::<Constraint>().unwrap(), constraint);
        }
        assert_eq!("MAPQ".parse::<Constraint>().unwrap(), Constraint::MappingQuality);
        assert_eq!("qual".parse::<Constraint>().unwrap(), Constraint::VcfQuality);
        assert_eq!("af".parse::<Constraint>().unwrap(), Constraint::AlleleFrequency);

        let err = "ploidy".parse::<Constraint>().unwrap_err().to_string();
        assert!(err.contains("Unknown constraint type: ploidy"));
        assert!(err.contains("insert_size"));
    }
}
