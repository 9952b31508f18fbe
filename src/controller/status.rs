//! Controller-facing state and notifications.
//!
//! [`ProgressSnapshot`] is the read-only view a presentation layer renders.
//! [`ProgressEvent`]s report each action's lifecycle on a subscription
//! channel: one `Started`, zero or more `Status` stage updates, then exactly
//! one `Succeeded` or `Failed`.

use crate::{
    auth::DecryptedMetric,
    errors::Error,
    ledger::transport::TxReceipt,
    types::{CiphertextHandle, MetricKind},
};

/// A user-facing controller action.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    AddStudyMinutes(u32),
    CompleteTask,
    Decrypt(MetricKind),
    Refresh,
}

/// A suspend point inside an action.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Encrypting(MetricKind),
    Submitting,
    Confirming,
    Refreshing,
    Decrypting(MetricKind),
    Loading,
}

impl Stage {
    /// Status text shown while the stage runs.
    pub fn message(&self) -> String {
        match self {
            Stage::Encrypting(MetricKind::StudyMinutes) => "Encrypting study minutes...".into(),
            Stage::Encrypting(MetricKind::TaskCount) => "Encrypting task completion...".into(),
            Stage::Submitting => "Submitting to ledger...".into(),
            Stage::Confirming => "Waiting for confirmation...".into(),
            Stage::Refreshing => "Refreshing progress...".into(),
            Stage::Decrypting(metric) => format!("Decrypting {metric}..."),
            Stage::Loading => "Loading progress...".into(),
        }
    }
}

/// What a successful action produced.
#[derive(Clone, Debug)]
pub enum ActionOutcome {
    /// A write confirmed; the receipt carries its `MetricUpdated` event.
    Written {
        metric: MetricKind,
        receipt: TxReceipt,
    },
    Decrypted(DecryptedMetric),
    Refreshed(ProgressSnapshot),
}

impl ActionOutcome {
    /// Final status text for the action.
    pub fn message(&self) -> String {
        match self {
            ActionOutcome::Written {
                metric: MetricKind::StudyMinutes,
                ..
            } => "Study minutes added successfully!".into(),
            ActionOutcome::Written {
                metric: MetricKind::TaskCount,
                ..
            } => "Task completed successfully!".into(),
            ActionOutcome::Decrypted(d) => match d.metric {
                MetricKind::StudyMinutes => format!("Decrypted study minutes: {} minutes", d.value),
                MetricKind::TaskCount => format!("Decrypted task count: {} tasks", d.value),
            },
            ActionOutcome::Refreshed(_) => "Progress loaded".into(),
        }
    }
}

/// Progress notification.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    Started(Action),
    Status { action: Action, stage: Stage },
    Succeeded { action: Action, outcome: ActionOutcome },
    Failed { action: Action, error: Error },
}

/// Cached view of the account's progress.
///
/// Encrypted fields are `None` while the metric is uninitialized. Decrypted
/// fields are cleared whenever the matching handle changes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProgressSnapshot {
    pub encrypted_study_minutes: Option<CiphertextHandle>,
    pub encrypted_task_count: Option<CiphertextHandle>,
    pub decrypted_study_minutes: Option<u32>,
    pub decrypted_task_count: Option<u32>,
    pub is_initialized: bool,
    pub is_loading: bool,
    pub status_message: Option<String>,
}

impl ProgressSnapshot {
    pub fn encrypted(&self, metric: MetricKind) -> Option<CiphertextHandle> {
        match metric {
            MetricKind::StudyMinutes => self.encrypted_study_minutes,
            MetricKind::TaskCount => self.encrypted_task_count,
        }
    }

    pub fn decrypted(&self, metric: MetricKind) -> Option<u32> {
        match metric {
            MetricKind::StudyMinutes => self.decrypted_study_minutes,
            MetricKind::TaskCount => self.decrypted_task_count,
        }
    }

    /// Stores a handle read from the ledger, dropping a stale plaintext.
    pub(crate) fn set_encrypted(&mut self, metric: MetricKind, handle: Option<CiphertextHandle>) {
        let (slot, plain) = match metric {
            MetricKind::StudyMinutes => (
                &mut self.encrypted_study_minutes,
                &mut self.decrypted_study_minutes,
            ),
            MetricKind::TaskCount => (&mut self.encrypted_task_count, &mut self.decrypted_task_count),
        };
        if *slot != handle {
            *plain = None;
        }
        *slot = handle;
    }

    pub(crate) fn set_decrypted(&mut self, decrypted: &DecryptedMetric) {
        self.set_encrypted(decrypted.metric, Some(decrypted.handle));
        match decrypted.metric {
            MetricKind::StudyMinutes => self.decrypted_study_minutes = Some(decrypted.value),
            MetricKind::TaskCount => self.decrypted_task_count = Some(decrypted.value),
        }
    }
}
