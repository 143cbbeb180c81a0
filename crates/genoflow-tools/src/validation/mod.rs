//! Biological validators: reference coordinates, variant alleles and
//! summary-statistic ranges.

pub mod constraints;
pub mod coordinates;
pub mod variants;

use serde_json::Value;
use tracing::debug;

use genoflow_core::config::VerificationConfig;
use genoflow_core::error::{GenoflowError, Result};
use genoflow_core::traits::Validator;
use genoflow_core::types::{JsonMap, ValidationOutcome};

use constraints::KNOWN_FIELDS;

pub use constraints::{Constraint, ConstraintValidator};
pub use coordinates::{CoordinateValidator, Region};
pub use variants::{classify_variant, VariantClass, VariantValidator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

/// The result of one check.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub valid: bool,
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    pub fn pass(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            valid: true,
            severity,
            message: message.into(),
        }
    }

    pub fn fail(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            severity,
            message: message.into(),
        }
    }

    /// Whether this finding fails validation under the given mode.
    pub fn is_fatal(&self, strict: bool) -> bool {
        !self.valid && (strict || self.severity == Severity::Critical)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    Coordinates,
    Variants,
    /// Range checks; a named constraint applies to bare numbers.
    Constraints(Option<Constraint>),
    Auto,
}

impl Check {
    fn from_params(params: &JsonMap) -> Result<Self> {
        match params.get("check").and_then(Value::as_str) {
            None | Some("auto") => Ok(Check::Auto),
            Some("coordinates") => Ok(Check::Coordinates),
            Some("variants") => Ok(Check::Variants),
            Some("constraints") => {
                let named = params
                    .get("constraint")
                    .and_then(Value::as_str)
                    .map(str::parse::<Constraint>)
                    .transpose()?;
                Ok(Check::Constraints(named))
            }
            Some(other) => Err(GenoflowError::Validation(format!(
                "Unknown check '{}': expected coordinates, variants, constraints or auto",
                other
            ))),
        }
    }
}

/// Validation collaborator for `data_validation` steps.
///
/// `params` may carry `check` (`coordinates`, `variants`, `constraints`,
/// `auto`), `genome_build` and `strict_mode` overrides. Constraint checks
/// also read `constraint` and `allow_high_phred`.
pub struct GenomicValidator {
    config: VerificationConfig,
}

impl GenomicValidator {
    pub fn new(config: &VerificationConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl Validator for GenomicValidator {
    fn validate(&self, data: &Value, params: &JsonMap) -> Result<ValidationOutcome> {
        let check = Check::from_params(params)?;
        let build = params
            .get("genome_build")
            .and_then(Value::as_str)
            .unwrap_or(self.config.genome_build.as_str());
        let strict = params
            .get("strict_mode")
            .and_then(Value::as_bool)
            .unwrap_or(self.config.strict_mode);
        let allow_iupac = params
            .get("allow_iupac")
            .and_then(Value::as_bool)
            .unwrap_or(self.config.allow_iupac);

        let validator = VariantValidator::new(CoordinateValidator::new(build)?, allow_iupac);
        let constraints = ConstraintValidator::new(
            params
                .get("allow_high_phred")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        );
        let records = records(data);
        let labelled = records.len() > 1;

        let mut errors = Vec::new();
        for (i, record) in records.iter().enumerate() {
            for finding in check_record(&validator, &constraints, record, check) {
                if !finding.is_fatal(strict) {
                    continue;
                }
                if labelled {
                    errors.push(format!("record {}: {}", i + 1, finding.message));
                } else {
                    errors.push(finding.message);
                }
            }
        }

        debug!(
            build = %validator.coordinates().build(),
            records = records.len(),
            errors = errors.len(),
            strict,
            "Validation complete"
        );

        if errors.is_empty() {
            Ok(ValidationOutcome::passed())
        } else {
            Ok(ValidationOutcome::failed(errors))
        }
    }
}

/// Flatten the accepted data shapes into individual records.
fn records(data: &Value) -> Vec<&Value> {
    match data {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => match map.get("variants") {
            Some(Value::Array(items)) => items.iter().collect(),
            _ => vec![data],
        },
        other => vec![other],
    }
}

fn check_record(
    validator: &VariantValidator,
    constraints: &ConstraintValidator,
    record: &Value,
    check: Check,
) -> Vec<Finding> {
    if let Check::Constraints(named) = check {
        return check_constraints(constraints, record, named);
    }
    let coordinates = validator.coordinates();
    let map = match record {
        Value::String(region) => {
            if check == Check::Variants {
                return vec![Finding::fail(
                    Severity::Critical,
                    format!("Expected a variant record, got region '{}'", region),
                )];
            }
            return failing(coordinates.validate_region(region));
        }
        Value::Object(map) => map,
        _ => {
            return vec![Finding::fail(
                Severity::Critical,
                "Unsupported record: expected a region string or an object",
            )]
        }
    };

    let is_variant = match check {
        Check::Variants => true,
        Check::Auto => map.contains_key("ref"),
        Check::Coordinates | Check::Constraints(_) => false,
    };
    if is_variant {
        check_variant(validator, map)
    } else {
        check_coordinates(coordinates, map)
    }
}

fn check_coordinates(coordinates: &CoordinateValidator, map: &JsonMap) -> Vec<Finding> {
    if let Some(region) = map.get("region").and_then(Value::as_str) {
        return failing(coordinates.validate_region(region));
    }
    let Some(chrom) = map.get("chrom").and_then(text) else {
        return vec![Finding::fail(
            Severity::Critical,
            "Record has no 'region' or 'chrom' to validate",
        )];
    };
    let start = map.get("start").and_then(integer);
    let end = map.get("end").and_then(integer);
    let pos = map.get("pos").and_then(integer);

    match (start, end, pos) {
        (Some(start), Some(end), _) => failing(coordinates.validate_interval(&chrom, start, end)),
        (_, _, Some(pos)) | (Some(pos), None, None) => {
            failing(coordinates.validate_position(&chrom, pos))
        }
        _ => failing(coordinates.validate_chromosome(&chrom)),
    }
}

fn check_variant(validator: &VariantValidator, map: &JsonMap) -> Vec<Finding> {
    let missing = |field: &str| {
        vec![Finding::fail(
            Severity::Critical,
            format!("Variant record is missing '{}'", field),
        )]
    };
    let Some(chrom) = map.get("chrom").and_then(text) else {
        return missing("chrom");
    };
    let Some(pos) = map.get("pos").and_then(integer) else {
        return missing("pos");
    };
    let Some(reference) = map.get("ref").and_then(Value::as_str) else {
        return missing("ref");
    };
    let alts: Vec<String> = match map.get("alt") {
        Some(Value::String(alt)) => alt.split(',').map(String::from).collect(),
        Some(Value::Array(items)) => items.iter().filter_map(text).collect(),
        _ => return missing("alt"),
    };

    validator.validate_variant(&chrom, pos, reference, &alts)
}

fn check_constraints(
    validator: &ConstraintValidator,
    record: &Value,
    named: Option<Constraint>,
) -> Vec<Finding> {
    if let Some(constraint) = named {
        return match number(record) {
            Some(value) => failing(validator.validate(constraint, value)),
            None => vec![Finding::fail(
                Severity::Critical,
                format!("Expected a number for {}, got {}", constraint.as_str(), record),
            )],
        };
    }
    let Value::Object(map) = record else {
        return vec![Finding::fail(
            Severity::Critical,
            "Constraint checks need an object of statistics or a named 'constraint'",
        )];
    };

    let mut matched = 0;
    let mut findings = Vec::new();
    for (field, constraint, scale) in KNOWN_FIELDS {
        let Some(value) = map.get(*field) else {
            continue;
        };
        matched += 1;
        match (value, number(value)) {
            // missing QUAL and the like
            (Value::Null, _) => {}
            (_, Some(value)) => {
                findings.extend(failing(validator.validate(*constraint, value * scale)))
            }
            (other, None) => findings.push(Finding::fail(
                Severity::High,
                format!("Field '{}' is not numeric: {}", field, other),
            )),
        }
    }
    if matched == 0 {
        return vec![Finding::fail(
            Severity::Medium,
            "Record has no fields with known constraints",
        )];
    }
    findings
}

fn failing(finding: Finding) -> Vec<Finding> {
    if finding.valid {
        vec![]
    } else {
        vec![finding]
    }
}

/// Strings and numbers (e.g. chromosome `1`) as text.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> JsonMap {
        value.as_object().cloned().unwrap_or_default()
    }

    fn validator() -> GenomicValidator {
        GenomicValidator::new(&VerificationConfig::default())
    }

    #[test]
    fn test_region_string() {
        let v = validator();
        let ok = v
            .validate(&json!("chr17:43044295-43125483"), &JsonMap::new())
            .unwrap();
        assert!(ok.valid);

        let bad = v.validate(&json!("chr1:0-10"), &JsonMap::new()).unwrap();
        assert!(!bad.valid);
        assert_eq!(bad.errors, vec!["Position must be >= 1, got 0"]);
    }

    #[test]
    fn test_coordinate_object() {
        let v = validator();
        let out = v
            .validate(
                &json!({"chrom": "chrX", "start": 100, "end": 50}),
                &params(json!({"check": "coordinates"})),
            )
            .unwrap();
        assert!(!out.valid);
        assert!(out.errors[0].contains("must be <= end position"));

        let out = v
            .validate(&json!({"chrom": 1, "pos": "12345"}), &JsonMap::new())
            .unwrap();
        assert!(out.valid);
    }

    #[test]
    fn test_vcf_parser_output_shape() {
        let data = json!({
            "format": "VCF",
            "variants": [
                {"chrom": "chr1", "pos": 12345, "ref": "A", "alt": ["G"]},
                {"chrom": "chr1", "pos": 300000000, "ref": "A", "alt": ["T"]},
                {"chrom": "chr2", "pos": 500, "ref": "C", "alt": ["C"]},
            ]
        });
        let out = validator()
            .validate(&data, &params(json!({"check": "variants"})))
            .unwrap();
        assert!(!out.valid);
        assert_eq!(out.errors.len(), 2);
        assert!(out.errors[0].starts_with("record 2: Position 300000000 exceeds"));
        assert!(out.errors[1].starts_with("record 3: REF and ALT"));
    }

    #[test]
    fn test_non_strict_only_fails_on_critical() {
        let v = GenomicValidator::new(&VerificationConfig {
            strict_mode: false,
            ..Default::default()
        });
        let invalid_bases = json!({"chrom": "chr1", "pos": 10, "ref": "A", "alt": "Z"});
        assert!(v.validate(&invalid_bases, &JsonMap::new()).unwrap().valid);

        let out_of_range = json!({"chrom": "chr1", "pos": 0, "ref": "A", "alt": "G"});
        assert!(!v.validate(&out_of_range, &JsonMap::new()).unwrap().valid);

        // params override the configured mode
        let strict = params(json!({"strict_mode": true}));
        assert!(!v.validate(&invalid_bases, &strict).unwrap().valid);
    }

    #[test]
    fn test_genome_build_override() {
        // chr1 is 248,956,422 bp in hg38 and 249,250,621 bp in hg19
        let data = json!("chr1:249000000");
        let v = validator();
        assert!(!v.validate(&data, &JsonMap::new()).unwrap().valid);
        assert!(
            v.validate(&data, &params(json!({"genome_build": "GRCh37"})))
                .unwrap()
                .valid
        );
        assert!(v
            .validate(&data, &params(json!({"genome_build": "mm10"})))
            .is_err());
    }

    #[test]
    fn test_unknown_check_and_missing_fields() {
        let v = validator();
        assert!(v
            .validate(&json!("chr1:100"), &params(json!({"check": "phasing"})))
            .is_err());

        let out = v
            .validate(
                &json!({"chrom": "chr1", "pos": 10}),
                &params(json!({"check": "variants"})),
            )
            .unwrap();
        assert_eq!(out.errors, vec!["Variant record is missing 'ref'"]);
    }

    #[test]
    fn test_constraints_on_parser_and_stats_output() {
        let v = validator();
        let check = params(json!({"check": "constraints"}));

        // FASTQ summary: GC is reported as a percentage
        let fastq = json!({
            "format": "FASTQ",
            "average_read_length": 150.0,
            "average_quality_score": 35.2,
            "average_gc_content": 42.5,
        });
        assert!(v.validate(&fastq, &check).unwrap().valid);

        let stats = json!({"average_quality": 72.0, "insert_size_average": -4.0});
        let out = v.validate(&stats, &check).unwrap();
        assert_eq!(out.errors.len(), 2);
        assert!(out.errors[0].contains("PHRED score 72 is unusually high"));
        assert!(out.errors[1].contains("Insert size cannot be negative"));

        let relaxed = params(json!({"check": "constraints", "allow_high_phred": true, "strict_mode": false}));
        assert!(v.validate(&json!({"average_quality": 72.0}), &relaxed).unwrap().valid);
    }

    #[test]
    fn test_constraints_over_vcf_variants() {
        let data = json!({
            "format": "VCF",
            "variants": [
                {"chrom": "chr1", "pos": 10, "ref": "A", "alt": ["G"], "qual": 50.0},
                {"chrom": "chr1", "pos": 20, "ref": "A", "alt": ["T"], "qual": null},
                {"chrom": "chr1", "pos": 30, "ref": "C", "alt": ["T"], "qual": -1.0, "af": 35},
            ]
        });
        let out = validator()
            .validate(&data, &params(json!({"check": "constraints"})))
            .unwrap();
        assert_eq!(
            out.errors,
            vec![
                "record 3: VCF quality score cannot be negative. Got -1",
                "record 3: Allele frequency should be a fraction (0-1), not percentage. Got 35 (as a fraction: 0.3500)",
            ]
        );

        // non-strict mode only fails on critical findings
        let lenient = params(json!({"check": "constraints", "strict_mode": false}));
        assert!(validator().validate(&data, &lenient).unwrap().valid);
    }

    #[test]
    fn test_named_constraint_on_bare_values() {
        let v = validator();
        let mapq = params(json!({"check": "constraints", "constraint": "mapq"}));
        assert!(v.validate(&json!([0, 60, 255]), &mapq).unwrap().valid);

        let out = v.validate(&json!([60, 300]), &mapq).unwrap();
        assert_eq!(out.errors, vec!["record 2: Mapping quality must be 0-255. Got 300"]);

        let gc = params(json!({"check": "constraints", "constraint": "gc_content"}));
        assert!(!v.validate(&json!("chr1"), &gc).unwrap().valid);
        assert!(v
            .validate(&json!(0.4), &params(json!({"check": "constraints", "constraint": "ploidy"})))
            .is_err());

        let out = v
            .validate(&json!({"sample": "NA12878"}), &params(json!({"check": "constraints"})))
            .unwrap();
        assert_eq!(out.errors, vec!["Record has no fields with known constraints"]);
    }

    #[test]
    fn test_severity_fatality() {
        let high = Finding::fail(Severity::High, "x");
        assert!(high.is_fatal(true));
        assert!(!high.is_fatal(false));
        assert!(Finding::fail(Severity::Critical, "x").is_fatal(false));
        assert!(!Finding::pass(Severity::Critical, "x").is_fatal(true));
        assert_eq!(Severity::Medium.as_str(), "medium");
    }
}
