//! Maps raw cloud API errors to the closed taxonomy in spec.md §4.5.
//!
//! Matching is by substring/regex on cloud-specific codes and messages.
//! This is acknowledged in spec.md §9 as brittle: unclassified errors fall
//! back to `Generic`, and the rules here should be expected to need
//! updating when the cloud provider renames or localizes its error
//! messages.

use regex::Regex;

/// The closed taxonomy of asynchronous cloud provisioning failures
/// (spec.md §4.5 table, left column).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisioningErrorKind {
    LowPriorityCoresQuota,
    RegionalCoresQuota,
    SkuFamilyQuotaExceeded,
    SkuFamilyQuotaZero,
    OverconstrainedZonal,
    OverconstrainedAllocation,
    AllocationFailed,
    ZonalAllocationFailed,
    SkuNotAvailable,
    Generic,
}

/// An error as reported by the cloud SDK/API: a machine-readable code, an
/// HTTP-ish status, and a human message. Both back-ends (VM, managed
/// machine) produce this shape whether the failure surfaced synchronously
/// from a begin-call or asynchronously from LRO polling (spec.md §4.4, §9).
#[derive(Clone, Debug, Default)]
pub struct RawCloudError {
    pub code: Option<String>,
    pub status: Option<u16>,
    pub message: String,
}

impl RawCloudError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: Some(code.into()), status: None, message: message.into() }
    }
}

impl std::fmt::Display for RawCloudError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{code}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RawCloudError {}

pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, err: &RawCloudError) -> ProvisioningErrorKind;
}

struct Rule {
    kind: ProvisioningErrorKind,
    code: Option<Regex>,
    message: Option<Regex>,
}

/// The default classifier, built from the code/message substrings observed
/// in production cloud responses. Order matters: the first matching rule
/// wins, so more specific rules are listed before their more general
/// siblings (e.g. `SkuFamilyQuotaZero` before `SkuFamilyQuotaExceeded`).
pub struct RegexErrorClassifier {
    rules: Vec<Rule>,
}

impl Default for RegexErrorClassifier {
    fn default() -> Self {
        let rule = |kind, code: &str, message: &str| Rule {
            kind,
            code: (!code.is_empty()).then(|| Regex::new(code).expect("static rule regex is valid")),
            message: (!message.is_empty()).then(|| Regex::new(message).expect("static rule regex is valid")),
        };
        Self {
            rules: vec![
                rule(
                    ProvisioningErrorKind::LowPriorityCoresQuota,
                    "^(LowPriorityQuotaExceeded|SkuFamilyLowPriorityQuotaExceeded)$",
                    "(?i)low.?priority.*quota",
                ),
                rule(
                    ProvisioningErrorKind::SkuFamilyQuotaZero,
                    "^SkuFamilyQuotaZero$",
                    "(?i)family.*quota.*is.*0|quota.*zero",
                ),
                rule(
                    ProvisioningErrorKind::SkuFamilyQuotaExceeded,
                    "^(SkuFamilyQuotaExceeded|OperationNotAllowed)$",
                    "(?i)family.*quota.*exceed",
                ),
                rule(
                    ProvisioningErrorKind::RegionalCoresQuota,
                    "^RegionalQuotaExceeded$",
                    "(?i)regional.*quota|total.*regional.*cores",
                ),
                rule(
                    ProvisioningErrorKind::ZonalAllocationFailed,
                    "^ZonalAllocationFailed$",
                    "(?i)zonal.*allocation.*fail",
                ),
                rule(
                    ProvisioningErrorKind::OverconstrainedZonal,
                    "^OverconstrainedZonalAllocationRequest$",
                    "(?i)overconstrained.*zone",
                ),
                rule(
                    ProvisioningErrorKind::OverconstrainedAllocation,
                    "^OverconstrainedAllocationRequest$",
                    "(?i)overconstrained",
                ),
                rule(
                    ProvisioningErrorKind::AllocationFailed,
                    "^AllocationFailed$",
                    "(?i)allocation.*fail",
                ),
                rule(
                    ProvisioningErrorKind::SkuNotAvailable,
                    "^SkuNotAvailable$",
                    "(?i)not available in (location|region)",
                ),
            ],
        }
    }
}

impl ErrorClassifier for RegexErrorClassifier {
    fn classify(&self, err: &RawCloudError) -> ProvisioningErrorKind {
        for rule in &self.rules {
            let code_matches = rule
                .code
                .as_ref()
                .zip(err.code.as_deref())
                .is_some_and(|(re, code)| re.is_match(code));
            let message_matches = rule.message.as_ref().is_some_and(|re| re.is_match(&err.message));
            if code_matches || message_matches {
                return rule.kind;
            }
        }
        ProvisioningErrorKind::Generic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(code: &str, message: &str) -> ProvisioningErrorKind {
        RegexErrorClassifier::default().classify(&RawCloudError::new(code, message))
    }

    #[test]
    fn classifies_low_priority_quota_by_code() {
        assert_eq!(classify("LowPriorityQuotaExceeded", ""), ProvisioningErrorKind::LowPriorityCoresQuota);
    }

    #[test]
    fn classifies_zonal_allocation_failure_by_message() {
        assert_eq!(
            classify("", "Allocation failed due to ZONAL allocation failure in this region"),
            ProvisioningErrorKind::ZonalAllocationFailed
        );
    }

    #[test]
    fn sku_family_quota_zero_takes_priority_over_generic_exceeded() {
        assert_eq!(classify("SkuFamilyQuotaZero", ""), ProvisioningErrorKind::SkuFamilyQuotaZero);
    }

    #[test]
    fn unrecognized_error_falls_back_to_generic() {
        assert_eq!(classify("SomeBrandNewErrorCode", "completely new message text"), ProvisioningErrorKind::Generic);
    }
}
