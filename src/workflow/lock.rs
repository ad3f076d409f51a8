// Lock Gate - ShowSet-level hold on new in_progress work

use chrono::{DateTime, Utc};
use std::fmt::Debug;
use tracing::info;

use super::cascade::{force_status, StageReset};
use super::error::WorkflowError;
use crate::permissions::Actor;
use crate::showset::{ShowSet, ShowSetLock, StageName, StageStatus, UnlockRecord};

/// Lifecycle model for the ShowSet lock.
///
/// Implementations mutate the working copy only; the orchestrator commits it.
pub trait LockPolicy: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    fn is_locked(&self, show_set: &ShowSet) -> bool;

    fn lock(&self, show_set: &mut ShowSet, actor: &Actor, now: DateTime<Utc>)
        -> Result<(), WorkflowError>;

    fn unlock(
        &self,
        show_set: &mut ShowSet,
        actor: &Actor,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError>;

    /// Called after every stage status change committed by a transition.
    fn on_status_change(&self, _show_set: &mut ShowSet, _stage: StageName, _status: StageStatus) {}
}

fn unlock_record(actor: &Actor, reason: Option<&str>, now: DateTime<Utc>) -> UnlockRecord {
    UnlockRecord {
        unlocked_at: now,
        unlocked_by: actor.id.clone(),
        reason: reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string),
        rework_pending: true,
    }
}

/// Admin sets and clears lock metadata explicitly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitAdminLock;

impl LockPolicy for ExplicitAdminLock {
    fn name(&self) -> &'static str {
        "explicit"
    }

    fn is_locked(&self, show_set: &ShowSet) -> bool {
        show_set.lock.is_some()
    }

    fn lock(
        &self,
        show_set: &mut ShowSet,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if self.is_locked(show_set) {
            return Err(WorkflowError::validation(format!(
                "showset {} is already locked",
                show_set.id
            )));
        }
        show_set.lock = Some(ShowSetLock {
            locked_at: now,
            locked_by: actor.id.clone(),
        });
        Ok(())
    }

    fn unlock(
        &self,
        show_set: &mut ShowSet,
        actor: &Actor,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if !self.is_locked(show_set) {
            return Err(WorkflowError::validation(format!(
                "showset {} is not locked",
                show_set.id
            )));
        }
        show_set.lock = None;
        show_set.last_unlock = Some(unlock_record(actor, reason, now));
        Ok(())
    }
}

/// The ShowSet is locked while `drawing2d` is complete and no unlock has been
/// recorded since it got there.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImplicitCompletionLock;

impl LockPolicy for ImplicitCompletionLock {
    fn name(&self) -> &'static str {
        "implicit"
    }

    fn is_locked(&self, show_set: &ShowSet) -> bool {
        show_set.status_of(StageName::Drawing2d) == StageStatus::Complete
            && show_set.last_unlock.is_none()
    }

    fn lock(
        &self,
        show_set: &mut ShowSet,
        _actor: &Actor,
        _now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        Err(WorkflowError::validation(format!(
            "showset {} locks automatically when drawing2d completes",
            show_set.id
        )))
    }

    fn unlock(
        &self,
        show_set: &mut ShowSet,
        actor: &Actor,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if !self.is_locked(show_set) {
            return Err(WorkflowError::validation(format!(
                "showset {} is not locked",
                show_set.id
            )));
        }
        if reason.map(str::trim).unwrap_or_default().is_empty() {
            return Err(WorkflowError::validation("an unlock reason is required"));
        }
        show_set.last_unlock = Some(unlock_record(actor, reason, now));
        Ok(())
    }

    fn on_status_change(&self, show_set: &mut ShowSet, stage: StageName, status: StageStatus) {
        if stage == StageName::Drawing2d && status == StageStatus::Complete {
            // Re-completing the final stage re-arms the lock.
            show_set.last_unlock = None;
        }
    }
}

/// Sends each named stage that is currently `complete` to
/// `revision_required`. Other named stages are left alone.
pub fn reset_completed(
    show_set: &mut ShowSet,
    stages: &[StageName],
    actor: &Actor,
    now: DateTime<Utc>,
) -> Vec<StageReset> {
    let mut resets = Vec::new();
    for stage in stages {
        if show_set.status_of(*stage) != StageStatus::Complete {
            continue;
        }
        if let Some(reset) =
            force_status(show_set, *stage, StageStatus::RevisionRequired, actor, now)
        {
            resets.push(reset);
        }
    }
    if !resets.is_empty() {
        info!(
            show_set_id = %show_set.id,
            count = resets.len(),
            "Reset completed stages on unlock"
        );
    }
    resets
}
