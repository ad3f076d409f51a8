// Cascade Engine - forced status resets on stages other than the one acted upon
//
// Downstream cascades run as part of a stage transition and are chosen by a
// `CascadePolicy`. Upstream revision requests and recalls have fixed range
// rules and live here as plain functions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::{info, warn};

use crate::permissions::Actor;
use crate::showset::{ShowSet, StageName, StageStatus};
use crate::versioning::{VersionBump, VersionScheme, VersionTrigger};

/// One forced status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReset {
    pub stage: StageName,
    pub from: StageStatus,
    pub to: StageStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeOutcome {
    pub resets: Vec<StageReset>,
    /// Counter changes applied to cascaded stages (lock-release policy only).
    pub bumps: Vec<VersionBump>,
}

impl CascadeOutcome {
    pub fn is_empty(&self) -> bool {
        self.resets.is_empty() && self.bumps.is_empty()
    }

    pub fn reset_stages(&self) -> Vec<StageName> {
        self.resets.iter().map(|r| r.stage).collect()
    }
}

/// Facts about the transition that triggered a cascade.
#[derive(Debug, Clone, Copy)]
pub struct CascadeContext<'a> {
    pub stage: StageName,
    pub prior: StageStatus,
    pub requested: StageStatus,
    pub scheme: VersionScheme,
    pub actor: &'a Actor,
    pub now: DateTime<Utc>,
}

/// Strategy for the downstream cascade that follows a stage transition.
pub trait CascadePolicy: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Applies the cascade to the working copy and reports what changed.
    fn on_transition(&self, show_set: &mut ShowSet, ctx: &CascadeContext<'_>) -> CascadeOutcome;
}

/// Forces one stage to `status`, stamping the actor. Returns `None` when the
/// stage already had that status.
pub fn force_status(
    show_set: &mut ShowSet,
    stage: StageName,
    status: StageStatus,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Option<StageReset> {
    let record = show_set.stage_mut(stage);
    if record.status == status {
        return None;
    }
    let from = record.status;
    record.status = status;
    record.updated_by = Some(actor.id.clone());
    record.updated_at = Some(now);
    Some(StageReset {
        stage,
        from,
        to: status,
    })
}

/// Review variant: reopening a `complete` stage sends every downstream
/// `complete` stage to `revision_required`. Cascaded stages keep their
/// counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReworkCascade;

impl CascadePolicy for ReworkCascade {
    fn name(&self) -> &'static str {
        "rework"
    }

    fn on_transition(&self, show_set: &mut ShowSet, ctx: &CascadeContext<'_>) -> CascadeOutcome {
        let mut outcome = CascadeOutcome::default();
        if ctx.prior != StageStatus::Complete || ctx.requested != StageStatus::InProgress {
            return outcome;
        }

        for stage in ctx.stage.downstream() {
            if show_set.status_of(stage) != StageStatus::Complete {
                continue;
            }
            if let Some(reset) = force_status(
                show_set,
                stage,
                StageStatus::RevisionRequired,
                ctx.actor,
                ctx.now,
            ) {
                outcome.resets.push(reset);
            }
        }

        if !outcome.resets.is_empty() {
            info!(
                show_set_id = %show_set.id,
                trigger = %ctx.stage,
                reset = ?outcome.reset_stages(),
                "Rework cascade applied"
            );
        }
        outcome
    }
}

/// Revision-required variant: the first `in_progress` transition after an
/// unlock resets every downstream stage to `not_started` and bumps each
/// downstream deliverable once. Ordinary rework does not cascade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockReleaseCascade;

impl CascadePolicy for LockReleaseCascade {
    fn name(&self) -> &'static str {
        "lock_release"
    }

    fn on_transition(&self, show_set: &mut ShowSet, ctx: &CascadeContext<'_>) -> CascadeOutcome {
        let mut outcome = CascadeOutcome::default();
        let pending = show_set
            .last_unlock
            .as_ref()
            .map(|u| u.rework_pending)
            .unwrap_or(false);
        if !pending || ctx.requested != StageStatus::InProgress {
            return outcome;
        }

        let origin_deliverable = ctx.scheme.deliverable_for(ctx.stage);
        let mut bumped = Vec::new();
        for stage in ctx.stage.downstream() {
            if let Some(reset) =
                force_status(show_set, stage, StageStatus::NotStarted, ctx.actor, ctx.now)
            {
                outcome.resets.push(reset);
            }
            let Some(deliverable) = ctx.scheme.deliverable_for(stage) else {
                continue;
            };
            if Some(deliverable) == origin_deliverable || bumped.contains(&deliverable) {
                continue;
            }
            bumped.push(deliverable);
            match show_set.versions.bump(
                deliverable,
                VersionTrigger::LockRelease { origin: ctx.stage },
                &ctx.actor.id,
                ctx.now,
            ) {
                Ok(bump) => outcome.bumps.push(bump),
                Err(e) => warn!(
                    show_set_id = %show_set.id,
                    stage = %stage,
                    error = %e,
                    "Skipping lock-release bump"
                ),
            }
        }

        if let Some(unlock) = show_set.last_unlock.as_mut() {
            unlock.rework_pending = false;
        }

        info!(
            show_set_id = %show_set.id,
            trigger = %ctx.stage,
            reset = ?outcome.reset_stages(),
            bumped = outcome.bumps.len(),
            "Lock-release cascade applied"
        );
        outcome
    }
}

/// Flags `[earliest target, current)` as `revision_required`.
///
/// Every target must sit strictly upstream of `current`; the range is
/// returned on success so callers can report it even where stages were
/// already flagged.
pub fn upstream_revision_span(
    targets: &[StageName],
    current: StageName,
) -> Result<Vec<StageName>, String> {
    let earliest = targets
        .iter()
        .min()
        .copied()
        .ok_or_else(|| "at least one target stage is required".to_string())?;
    if let Some(bad) = targets.iter().find(|t| !t.is_upstream_of(current)) {
        return Err(format!(
            "target stage {bad} is not upstream of current stage {current}"
        ));
    }
    Ok(StageName::span(earliest, current))
}

pub fn apply_upstream_revision(
    show_set: &mut ShowSet,
    span: &[StageName],
    actor: &Actor,
    now: DateTime<Utc>,
) -> Vec<StageReset> {
    span.iter()
        .filter_map(|stage| {
            force_status(show_set, *stage, StageStatus::RevisionRequired, actor, now)
        })
        .collect()
}

/// Resets after a recall: `(target, from]` to `revision_required`, plus every
/// `complete` stage downstream of `from`.
pub fn apply_recall_resets(
    show_set: &mut ShowSet,
    from: StageName,
    target: StageName,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Vec<StageReset> {
    let mut resets = Vec::new();
    for stage in StageName::ALL {
        let in_recall_range = stage > target && stage <= from;
        let completed_downstream =
            stage > from && show_set.status_of(stage) == StageStatus::Complete;
        if !(in_recall_range || completed_downstream) {
            continue;
        }
        if let Some(reset) =
            force_status(show_set, stage, StageStatus::RevisionRequired, actor, now)
        {
            resets.push(reset);
        }
    }
    resets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::Role;
    use crate::showset::{Area, ShowSetId, UnlockRecord};
    use crate::versioning::DeliverableType;

    fn show_set_with(statuses: [StageStatus; 5], scheme: VersionScheme) -> ShowSet {
        let mut show_set = ShowSet::new(
            ShowSetId::new("AB-101"),
            Area::Interior,
            "S01",
            scheme,
            Utc::now(),
        );
        for (stage, status) in StageName::ALL.into_iter().zip(statuses) {
            show_set.stage_mut(stage).status = status;
        }
        show_set
    }

    fn ctx<'a>(
        actor: &'a Actor,
        stage: StageName,
        prior: StageStatus,
        requested: StageStatus,
        scheme: VersionScheme,
    ) -> CascadeContext<'a> {
        CascadeContext {
            stage,
            prior,
            requested,
            scheme,
            actor,
            now: Utc::now(),
        }
    }

    use StageStatus::*;

    #[test]
    fn test_rework_resets_only_completed_downstream() {
        let actor = Actor::new("u1", "Uma", Role::Artist);
        let mut show_set = show_set_with(
            [Complete, Complete, Complete, InProgress, Complete],
            VersionScheme::PerStage,
        );
        let outcome = ReworkCascade.on_transition(
            &mut show_set,
            &ctx(&actor, StageName::Structure, Complete, InProgress, VersionScheme::PerStage),
        );

        assert_eq!(
            outcome.reset_stages(),
            vec![StageName::Integrated, StageName::Drawing2d]
        );
        assert_eq!(show_set.status_of(StageName::Screen), Complete);
        assert_eq!(show_set.status_of(StageName::InBim360), InProgress);
        assert_eq!(show_set.status_of(StageName::Integrated), RevisionRequired);
        assert!(outcome.bumps.is_empty());
        assert!(show_set.versions.history().is_empty());
    }

    #[test]
    fn test_rework_ignores_non_complete_prior() {
        let actor = Actor::new("u1", "Uma", Role::Artist);
        let mut show_set = show_set_with(
            [RevisionRequired, Complete, Complete, Complete, Complete],
            VersionScheme::PerStage,
        );
        let outcome = ReworkCascade.on_transition(
            &mut show_set,
            &ctx(
                &actor,
                StageName::Screen,
                RevisionRequired,
                InProgress,
                VersionScheme::PerStage,
            ),
        );
        assert!(outcome.is_empty());
    }

    #[test]
    fn test_lock_release_requires_pending_unlock() {
        let actor = Actor::new("u1", "Uma", Role::Artist);
        let mut show_set = show_set_with([Complete; 5], VersionScheme::PerStage);
        let outcome = LockReleaseCascade.on_transition(
            &mut show_set,
            &ctx(&actor, StageName::Screen, Complete, InProgress, VersionScheme::PerStage),
        );
        assert!(outcome.is_empty());
    }

    #[test]
    fn test_lock_release_resets_all_downstream_and_bumps_each_once() {
        let actor = Actor::new("u1", "Uma", Role::Artist);
        let mut show_set = show_set_with([Complete; 5], VersionScheme::SharedModel);
        show_set.last_unlock = Some(UnlockRecord {
            unlocked_at: Utc::now(),
            unlocked_by: "admin".to_string(),
            reason: Some("client change".to_string()),
            rework_pending: true,
        });

        let outcome = LockReleaseCascade.on_transition(
            &mut show_set,
            &ctx(
                &actor,
                StageName::Structure,
                Complete,
                InProgress,
                VersionScheme::SharedModel,
            ),
        );

        assert_eq!(
            outcome.reset_stages(),
            vec![StageName::Integrated, StageName::InBim360, StageName::Drawing2d]
        );
        assert!(StageName::Structure
            .downstream()
            .all(|s| show_set.status_of(s) == NotStarted));
        // integrated shares the model counter with the origin and is skipped
        let bumped: Vec<_> = outcome.bumps.iter().map(|b| b.deliverable).collect();
        assert_eq!(bumped, vec![DeliverableType::Drawing2d]);
        assert_eq!(show_set.versions.current(DeliverableType::Model), Some(1));
        assert!(!show_set.last_unlock.as_ref().unwrap().rework_pending);
    }

    #[test]
    fn test_upstream_span_rules() {
        assert_eq!(
            upstream_revision_span(&[StageName::Screen], StageName::Drawing2d).unwrap(),
            vec![
                StageName::Screen,
                StageName::Structure,
                StageName::Integrated,
                StageName::InBim360
            ]
        );
        assert_eq!(
            upstream_revision_span(
                &[StageName::Integrated, StageName::Structure],
                StageName::InBim360
            )
            .unwrap(),
            vec![StageName::Structure, StageName::Integrated]
        );
        assert!(upstream_revision_span(&[StageName::Drawing2d], StageName::Drawing2d).is_err());
        assert!(upstream_revision_span(&[StageName::Screen, StageName::Drawing2d], StageName::Integrated).is_err());
        assert!(upstream_revision_span(&[], StageName::Integrated).is_err());
    }

    #[test]
    fn test_recall_resets_range_and_completed_downstream() {
        let actor = Actor::new("u1", "Eli", Role::Engineer);
        let mut show_set = show_set_with(
            [Complete, Complete, EngineerReview, InProgress, Complete],
            VersionScheme::PerStage,
        );
        let resets = apply_recall_resets(
            &mut show_set,
            StageName::Integrated,
            StageName::Screen,
            &actor,
            Utc::now(),
        );
        let stages: Vec<_> = resets.iter().map(|r| r.stage).collect();
        assert_eq!(
            stages,
            vec![StageName::Structure, StageName::Integrated, StageName::Drawing2d]
        );
        assert_eq!(show_set.status_of(StageName::InBim360), InProgress);
        assert_eq!(show_set.status_of(StageName::Screen), Complete);
    }
}
