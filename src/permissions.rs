// Permission Resolver - maps a caller's role to capabilities and stage rights

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::showset::{StageName, StageStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Artist,
    BimCoordinator,
    /// Restricted reviewer for `engineer_review`.
    Engineer,
    /// Restricted reviewer for `client_review`.
    Client,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Artist => "artist",
            Role::BimCoordinator => "bim_coordinator",
            Role::Engineer => "engineer",
            Role::Client => "client",
            Role::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Role::Admin,
            Role::Manager,
            Role::Artist,
            Role::BimCoordinator,
            Role::Engineer,
            Role::Client,
            Role::Viewer,
        ]
        .into_iter()
        .find(|role| role.as_str() == s)
        .ok_or_else(|| format!("unknown role '{s}'"))
    }
}

/// The caller of a workflow operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: Role,
    /// Individually granted right to edit version counters.
    #[serde(default)]
    pub version_editor: bool,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            version_editor: false,
        }
    }

    pub fn with_version_editor(mut self, granted: bool) -> Self {
        self.version_editor = granted;
        self
    }
}

/// Reviewer roles may only resolve the review status they own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRestriction {
    pub review_status: StageStatus,
    pub allowed: Vec<StageStatus>,
}

impl StatusRestriction {
    pub fn reviewer(review_status: StageStatus) -> Self {
        Self {
            review_status,
            allowed: vec![StageStatus::Complete, StageStatus::RevisionRequired],
        }
    }

    pub fn permits(&self, current: StageStatus, requested: StageStatus) -> bool {
        current == self.review_status && self.allowed.contains(&requested)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSet {
    pub role: Role,
    pub updatable_stages: BTreeSet<StageName>,
    pub manage_show_sets: bool,
    pub manage_links: bool,
    pub manage_locks: bool,
    pub request_revisions: bool,
    pub edit_versions: bool,
    pub restriction: Option<StatusRestriction>,
}

impl PermissionSet {
    pub fn none(role: Role) -> Self {
        Self {
            role,
            updatable_stages: BTreeSet::new(),
            manage_show_sets: false,
            manage_links: false,
            manage_locks: false,
            request_revisions: false,
            edit_versions: false,
            restriction: None,
        }
    }

    pub fn can_update_stage(&self, stage: StageName) -> bool {
        self.updatable_stages.contains(&stage)
    }

    pub fn can_manage_show_sets(&self) -> bool {
        self.manage_show_sets
    }

    pub fn can_manage_links(&self) -> bool {
        self.manage_links
    }

    pub fn can_manage_locks(&self) -> bool {
        self.manage_locks
    }

    pub fn can_request_upstream_revision(&self) -> bool {
        self.request_revisions
    }

    /// Admins always hold the right; other actors need an individual grant.
    pub fn can_edit_versions(&self, actor: &Actor) -> bool {
        self.edit_versions || actor.version_editor
    }

    pub fn restriction(&self) -> Option<&StatusRestriction> {
        self.restriction.as_ref()
    }
}

/// Resolves a role to its permission set.
#[cfg_attr(any(test, feature = "testing"), automock)]
pub trait PermissionResolver: Send + Sync {
    fn resolve(&self, role: Role) -> PermissionSet;
}

/// Built-in role table.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPermissionResolver;

impl PermissionResolver for StaticPermissionResolver {
    fn resolve(&self, role: Role) -> PermissionSet {
        let all_stages: BTreeSet<StageName> = StageName::ALL.into_iter().collect();
        let mut permissions = PermissionSet::none(role);

        match role {
            Role::Admin => {
                permissions.updatable_stages = all_stages;
                permissions.manage_show_sets = true;
                permissions.manage_links = true;
                permissions.manage_locks = true;
                permissions.request_revisions = true;
                permissions.edit_versions = true;
            }
            Role::Manager => {
                permissions.updatable_stages = all_stages;
                permissions.manage_show_sets = true;
                permissions.manage_links = true;
                permissions.request_revisions = true;
            }
            Role::Artist => {
                permissions.updatable_stages = [
                    StageName::Screen,
                    StageName::Structure,
                    StageName::Integrated,
                    StageName::Drawing2d,
                ]
                .into_iter()
                .collect();
                permissions.request_revisions = true;
            }
            Role::BimCoordinator => {
                permissions.updatable_stages =
                    [StageName::Integrated, StageName::InBim360].into_iter().collect();
                permissions.manage_links = true;
                permissions.request_revisions = true;
            }
            Role::Engineer => {
                permissions.updatable_stages = all_stages;
                permissions.request_revisions = true;
                permissions.restriction =
                    Some(StatusRestriction::reviewer(StageStatus::EngineerReview));
            }
            Role::Client => {
                permissions.updatable_stages = all_stages;
                permissions.request_revisions = true;
                permissions.restriction =
                    Some(StatusRestriction::reviewer(StageStatus::ClientReview));
            }
            Role::Viewer => {}
        }

        permissions
    }
}
