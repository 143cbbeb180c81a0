use super::coordinates::CoordinateValidator;
use super::{Finding, Severity};

const DNA_BASES: &str = "ACGTN";
const IUPAC_BASES: &str = "ACGTNMRWSYKVHDB";

/// Variant class by REF/ALT shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantClass {
    Snv,
    Insertion,
    Deletion,
    Mnv,
    Complex,
}

impl VariantClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantClass::Snv => "SNV",
            VariantClass::Insertion => "insertion",
            VariantClass::Deletion => "deletion",
            VariantClass::Mnv => "MNV",
            VariantClass::Complex => "complex",
        }
    }
}

pub fn classify_variant(reference: &str, alt: &str) -> VariantClass {
    let (r, a) = (reference.len(), alt.len());
    if r == 1 && a == 1 {
        VariantClass::Snv
    } else if r > a {
        VariantClass::Deletion
    } else if a > r {
        VariantClass::Insertion
    } else if reference
        .bytes()
        .zip(alt.bytes())
        .all(|(x, y)| !x.eq_ignore_ascii_case(&y))
    {
        VariantClass::Mnv
    } else {
        VariantClass::Complex
    }
}

/// Symbolic (`<DEL>`), spanning-deletion (`*`) and missing alleles carry no bases.
fn is_symbolic(allele: &str) -> bool {
    allele.starts_with('<') || allele == "*" || allele == "."
}

/// REF/ALT sequence checks plus the position check of the wrapped coordinates.
pub struct VariantValidator {
    coordinates: CoordinateValidator,
    allow_iupac: bool,
}

impl VariantValidator {
    pub fn new(coordinates: CoordinateValidator, allow_iupac: bool) -> Self {
        Self {
            coordinates,
            allow_iupac,
        }
    }

    pub fn coordinates(&self) -> &CoordinateValidator {
        &self.coordinates
    }

    pub fn validate_sequence(&self, label: &str, sequence: &str) -> Finding {
        if sequence.is_empty() {
            return Finding::fail(Severity::High, format!("{} allele cannot be empty", label));
        }
        let alphabet = if self.allow_iupac { IUPAC_BASES } else { DNA_BASES };
        let mut invalid: Vec<char> = sequence
            .chars()
            .map(|c| c.to_ascii_uppercase())
            .filter(|c| !alphabet.contains(*c))
            .collect();
        invalid.sort_unstable();
        invalid.dedup();

        if invalid.is_empty() {
            Finding::pass(Severity::High, format!("{} allele is valid", label))
        } else {
            let listed: Vec<String> = invalid.iter().map(char::to_string).collect();
            Finding::fail(
                Severity::High,
                format!(
                    "{} allele contains invalid bases: {}",
                    label,
                    listed.join(", ")
                ),
            )
        }
    }

    /// All failing findings for one variant; empty when it is valid.
    pub fn validate_variant(
        &self,
        chrom: &str,
        pos: i64,
        reference: &str,
        alts: &[String],
    ) -> Vec<Finding> {
        let mut findings = Vec::new();

        let position = self.coordinates.validate_position(chrom, pos);
        if !position.valid {
            findings.push(position);
        }

        let ref_check = self.validate_sequence("REF", reference);
        let ref_ok = ref_check.valid;
        if !ref_ok {
            findings.push(ref_check);
        }

        if alts.is_empty() {
            findings.push(Finding::fail(Severity::High, "ALT allele cannot be empty"));
        }
        for alt in alts.iter().filter(|a| !is_symbolic(a)) {
            let alt_check = self.validate_sequence("ALT", alt);
            if !alt_check.valid {
                findings.push(alt_check);
                continue;
            }
            if ref_ok && alt.eq_ignore_ascii_case(reference) {
                findings.push(Finding::fail(
                    Severity::High,
                    format!("REF and ALT alleles are identical ({})", reference),
                ));
            }
        }
        findings
    }
}
