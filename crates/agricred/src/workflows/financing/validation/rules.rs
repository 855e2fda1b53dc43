use std::sync::OnceLock;

use regex::Regex;

use super::super::domain::{ApplicationDraft, FieldValue, InsurancePolicy};
use super::FieldIssue;

/// Format and cross-field checks attached to a field.
///
/// Rules only run against fields that hold a value; presence is handled
/// separately by [`super::Presence`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRule {
    /// Four letters, a literal `0`, then six alphanumerics.
    IfscFormat,
    GstinFormat,
    PanOrAadhaarFormat,
    MobileFormat,
    /// Text must equal the text held in another field.
    Matches(&'static str),
    MustBeTrue,
    Positive,
    /// Date must not precede the date held in another field.
    NotBefore(&'static str),
    DocumentTypes(&'static [&'static str]),
    MaxDocumentBytes(u64),
    PoliciesComplete,
}

fn ifsc_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z]{4}0[A-Z0-9]{6}$").expect("valid IFSC regex"))
}

fn gstin_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z][1-9A-Z]Z[0-9A-Z]$").expect("valid GSTIN regex")
    })
}

fn pan_or_aadhaar_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:[A-Z]{5}[0-9]{4}[A-Z]|[0-9]{12})$").expect("valid PAN/Aadhaar regex")
    })
}

fn mobile_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?:\+91)?[6-9][0-9]{9}$").expect("valid mobile regex"))
}

/// IFSC check used by both the step rules and ad hoc callers. Case-insensitive.
pub fn is_valid_ifsc(code: &str) -> bool {
    ifsc_pattern().is_match(&code.trim().to_ascii_uppercase())
}

pub fn is_valid_gstin(gstin: &str) -> bool {
    gstin_pattern().is_match(&gstin.trim().to_ascii_uppercase())
}

/// `0 < quantity <= available`.
pub fn quantity_within(quantity: u64, available: u64) -> bool {
    quantity > 0 && quantity <= available
}

/// Compare a document's declared content type against an allow-list,
/// ignoring parameters such as `charset`.
pub fn content_type_allowed(content_type: &str, allowed: &[&str]) -> bool {
    match content_type.trim().parse::<mime::Mime>() {
        Ok(parsed) => allowed
            .iter()
            .any(|candidate| parsed.essence_str().eq_ignore_ascii_case(candidate)),
        Err(_) => false,
    }
}

fn policy_is_complete(policy: &InsurancePolicy) -> bool {
    !policy.policy_name.trim().is_empty()
        && !policy.policy_number.trim().is_empty()
        && !policy.company_name.trim().is_empty()
        && policy.insured_amount > 0
        && policy.validity_from <= policy.validity_to
}

impl FieldRule {
    pub(crate) fn check(
        &self,
        value: &FieldValue,
        draft: &ApplicationDraft,
    ) -> Result<(), FieldIssue> {
        match (self, value) {
            (Self::IfscFormat, FieldValue::Text(text)) => {
                if is_valid_ifsc(text) {
                    Ok(())
                } else {
                    Err(FieldIssue::InvalidFormat("IFSC code"))
                }
            }
            (Self::GstinFormat, FieldValue::Text(text)) => {
                if is_valid_gstin(text) {
                    Ok(())
                } else {
                    Err(FieldIssue::InvalidFormat("GSTIN"))
                }
            }
            (Self::PanOrAadhaarFormat, FieldValue::Text(text)) => {
                if pan_or_aadhaar_pattern().is_match(text.trim()) {
                    Ok(())
                } else {
                    Err(FieldIssue::InvalidFormat("PAN or Aadhaar number"))
                }
            }
            (Self::MobileFormat, FieldValue::Text(text)) => {
                if mobile_pattern().is_match(text.trim()) {
                    Ok(())
                } else {
                    Err(FieldIssue::InvalidFormat("mobile number"))
                }
            }
            (Self::Matches(other), FieldValue::Text(text)) => match draft.text(other) {
                Some(expected) if expected == text => Ok(()),
                _ => Err(FieldIssue::Mismatch(*other)),
            },
            (Self::MustBeTrue, FieldValue::Flag(true)) => Ok(()),
            (Self::MustBeTrue, FieldValue::Flag(false)) => Err(FieldIssue::MustConfirm),
            (Self::Positive, FieldValue::Number(number)) => {
                if *number > 0 {
                    Ok(())
                } else {
                    Err(FieldIssue::MustBePositive)
                }
            }
            (Self::NotBefore(earlier_field), FieldValue::Date(date)) => match draft.date(earlier_field) {
                Some(earlier) if *date < earlier => Err(FieldIssue::DateBefore(*earlier_field)),
                _ => Ok(()),
            },
            (Self::DocumentTypes(allowed), FieldValue::Document(handle)) => {
                if content_type_allowed(&handle.content_type, allowed) {
                    Ok(())
                } else {
                    Err(FieldIssue::UnsupportedDocument {
                        content_type: handle.content_type.clone(),
                    })
                }
            }
            (Self::MaxDocumentBytes(limit), FieldValue::Document(handle)) => {
                if handle.size_bytes <= *limit {
                    Ok(())
                } else {
                    Err(FieldIssue::DocumentTooLarge { limit: *limit })
                }
            }
            (Self::PoliciesComplete, FieldValue::Policies(policies)) => {
                match policies.iter().position(|policy| !policy_is_complete(policy)) {
                    Some(index) => Err(FieldIssue::IncompletePolicy { index }),
                    None => Ok(()),
                }
            }
            // Kind mismatches are rejected when the value is written.
            _ => Ok(()),
        }
    }
}
