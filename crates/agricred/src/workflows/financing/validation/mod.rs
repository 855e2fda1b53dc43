//! Pure field- and step-level validation.
//!
//! `validate_step` walks a step's field checks in declaration order. Each field
//! reports at most one issue: a blank required field reports only that it is
//! required, and format rules never run against blank values.

mod rules;

pub use rules::{content_type_allowed, is_valid_gstin, is_valid_ifsc, quantity_within, FieldRule};

use std::fmt;

use serde::Serialize;

use super::blueprint::StepDefinition;
use super::domain::ApplicationDraft;

/// Whether a field must hold a value before the step can pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Presence {
    Required,
    Optional,
    /// Required unless the named field holds a value.
    RequiredUnless(&'static str),
    /// Required when the named flag is set.
    RequiredWhen(&'static str),
}

/// One field's validation contract within a step.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCheck {
    pub field: &'static str,
    pub presence: Presence,
    pub rules: Vec<FieldRule>,
}

impl FieldCheck {
    pub fn required(field: &'static str) -> Self {
        Self {
            field,
            presence: Presence::Required,
            rules: Vec::new(),
        }
    }

    pub fn optional(field: &'static str) -> Self {
        Self {
            field,
            presence: Presence::Optional,
            rules: Vec::new(),
        }
    }

    pub fn with_presence(mut self, presence: Presence) -> Self {
        self.presence = presence;
        self
    }

    pub fn rule(mut self, rule: FieldRule) -> Self {
        self.rules.push(rule);
        self
    }

    fn is_required(&self, draft: &ApplicationDraft) -> bool {
        match self.presence {
            Presence::Required => true,
            Presence::Optional => false,
            Presence::RequiredUnless(other) => draft.is_blank(other),
            Presence::RequiredWhen(flag) => draft.flag(flag),
        }
    }

    pub(crate) fn evaluate(&self, draft: &ApplicationDraft) -> Option<FieldIssue> {
        let value = match draft.get(self.field) {
            Some(value) if !value.is_blank() => value,
            _ => {
                return self.is_required(draft).then_some(FieldIssue::Required);
            }
        };

        self.rules
            .iter()
            .find_map(|rule| rule.check(value, draft).err())
    }
}

/// Reason a single field failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", content = "detail", rename_all = "snake_case")]
pub enum FieldIssue {
    Required,
    InvalidFormat(&'static str),
    Mismatch(&'static str),
    MustConfirm,
    MustBePositive,
    DateBefore(&'static str),
    UnsupportedDocument { content_type: String },
    DocumentTooLarge { limit: u64 },
    IncompletePolicy { index: usize },
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldIssue::Required => write!(f, "is required"),
            FieldIssue::InvalidFormat(what) => write!(f, "is not a valid {what}"),
            FieldIssue::Mismatch(other) => write!(f, "does not match {other}"),
            FieldIssue::MustConfirm => write!(f, "must be confirmed"),
            FieldIssue::MustBePositive => write!(f, "must be greater than zero"),
            FieldIssue::DateBefore(other) => write!(f, "must not be earlier than {other}"),
            FieldIssue::UnsupportedDocument { content_type } => {
                write!(f, "has unsupported file type {content_type}")
            }
            FieldIssue::DocumentTooLarge { limit } => {
                write!(f, "exceeds the {} MB upload limit", limit / (1024 * 1024))
            }
            FieldIssue::IncompletePolicy { index } => {
                write!(f, "policy #{} is incomplete", index + 1)
            }
        }
    }
}

/// A field paired with the reason it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub issue: FieldIssue,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, issue: FieldIssue) -> Self {
        let field = field.into();
        let message = format!("{field} {issue}");
        Self {
            field,
            issue,
            message,
        }
    }
}

/// Field-level failures for one step. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self
            .errors
            .iter()
            .map(|error| error.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        write!(
            f,
            "{} field(s) failed validation: {}",
            self.errors.len(),
            summary
        )
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub fn for_field(&self, field: &str) -> Vec<&FieldError> {
        self.errors
            .iter()
            .filter(|error| error.field == field)
            .collect()
    }
}

/// Check a draft against one step's field checks.
pub fn validate_step(step: &StepDefinition, draft: &ApplicationDraft) -> Result<(), ValidationError> {
    let errors: Vec<FieldError> = step
        .checks
        .iter()
        .filter_map(|check| {
            check
                .evaluate(draft)
                .map(|issue| FieldError::new(check.field, issue))
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { errors })
    }
}
