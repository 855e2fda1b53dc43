use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use super::domain::{ApplicationDraft, DraftId, DraftStatus, FieldValue, InstrumentType};
use super::schema::field_spec;

/// Hands out identifiers for newly opened drafts.
pub trait DraftIdSource: Send + Sync + fmt::Debug {
    fn next_id(&self) -> DraftId;
}

/// Random v4 UUIDs. Ids are exposed over HTTP, so they must not be guessable.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomDraftIds;

impl DraftIdSource for RandomDraftIds {
    fn next_id(&self) -> DraftId {
        DraftId(format!("draft-{}", Uuid::new_v4().simple()))
    }
}

/// Numbered ids (`{prefix}-000001`, ...) for reproducible runs.
#[derive(Debug)]
pub struct SequentialDraftIds {
    prefix: &'static str,
    next: AtomicU64,
}

impl SequentialDraftIds {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            next: AtomicU64::new(1),
        }
    }
}

impl DraftIdSource for SequentialDraftIds {
    fn next_id(&self) -> DraftId {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        DraftId(format!("{}-{id:06}", self.prefix))
    }
}

/// Error raised when a draft mutation breaks the schema or lifecycle rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("field `{field}` is not part of the {instrument} schema")]
    InvalidField {
        field: String,
        instrument: &'static str,
    },
    #[error("field `{field}` expects a {expected:?} value")]
    TypeMismatch {
        field: String,
        expected: super::domain::FieldKind,
    },
    #[error("field `{0}` is filled in by verification or scoring and cannot be edited")]
    ReadOnly(String),
    #[error("draft {0} has been submitted and can no longer change")]
    Immutable(DraftId),
    #[error("draft status cannot move from {from:?} to {to:?}")]
    StatusRegression { from: DraftStatus, to: DraftStatus },
}

impl ApplicationDraft {
    /// Return a copy of the draft with `field` replaced; nothing else changes.
    pub fn update_field(
        &self,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> Result<ApplicationDraft, DraftError> {
        if self.is_submitted() {
            return Err(DraftError::Immutable(self.id.clone()));
        }

        let spec = field_spec(self.instrument_type, field).ok_or_else(|| {
            DraftError::InvalidField {
                field: field.to_string(),
                instrument: self.instrument_type.label(),
            }
        })?;

        let value = value.into();
        if value.kind() != spec.kind {
            return Err(DraftError::TypeMismatch {
                field: field.to_string(),
                expected: spec.kind,
            });
        }

        let mut next = self.clone();
        next.fields
            .insert(spec.name.to_string(), spec.normalize(value));
        Ok(next)
    }

    /// Return a copy of the draft with the listed fields removed.
    pub fn clear_fields<'a>(
        &self,
        fields: impl IntoIterator<Item = &'a str>,
    ) -> Result<ApplicationDraft, DraftError> {
        if self.is_submitted() {
            return Err(DraftError::Immutable(self.id.clone()));
        }

        let mut next = self.clone();
        for field in fields {
            next.fields.remove(field);
        }
        Ok(next)
    }

    /// Return a copy of the draft carrying `status`, refusing to move backwards.
    pub fn with_status(&self, status: DraftStatus) -> Result<ApplicationDraft, DraftError> {
        if !self.status.can_advance_to(status) {
            return Err(DraftError::StatusRegression {
                from: self.status,
                to: status,
            });
        }

        let mut next = self.clone();
        next.status = status;
        Ok(next)
    }
}

/// Holds at most one draft plus the active step pointer for a single session.
///
/// `epoch` increases every time the held draft is replaced or discarded so
/// late collaborator responses can be matched against the draft they were
/// issued for.
#[derive(Debug)]
pub struct DraftStore {
    ids: Arc<dyn DraftIdSource>,
    current: Option<ApplicationDraft>,
    active_step: usize,
    epoch: u64,
}

impl Default for DraftStore {
    fn default() -> Self {
        Self::with_ids(Arc::new(RandomDraftIds))
    }
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(ids: Arc<dyn DraftIdSource>) -> Self {
        Self {
            ids,
            current: None,
            active_step: 0,
            epoch: 0,
        }
    }

    pub fn init_draft(&mut self, instrument_type: InstrumentType) -> &ApplicationDraft {
        let draft = ApplicationDraft::new(self.ids.next_id(), instrument_type);
        debug!(draft_id = %draft.id, ?instrument_type, "draft initialised");
        self.epoch += 1;
        self.active_step = 0;
        self.current.insert(draft)
    }

    pub fn reset_draft(&mut self) {
        if let Some(draft) = self.current.take() {
            debug!(draft_id = %draft.id, "draft discarded");
        }
        self.epoch += 1;
        self.active_step = 0;
    }

    pub fn current(&self) -> Option<&ApplicationDraft> {
        self.current.as_ref()
    }

    /// Swap in a new version of the held draft. The id must match.
    pub(crate) fn replace(&mut self, draft: ApplicationDraft) {
        debug_assert_eq!(
            self.current.as_ref().map(|current| &current.id),
            Some(&draft.id)
        );
        self.current = Some(draft);
    }

    pub fn active_step(&self) -> usize {
        self.active_step
    }

    pub(crate) fn set_active_step(&mut self, step: usize) {
        self.active_step = step;
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}
