//! Record visibility decisions.
//!
//! Everything here is pure: callers load the record and its grants, then ask
//! [`ScopeResolver`] whether the viewer may see it. Invisible records are
//! dropped from results, never reported as errors.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::db::models::{
    Invite, InviteTarget, NeighborhoodGrant, RecordKind, RecordStatus, ResidentMembership,
    ResidentRole, ShareableRecord, VisibilityScope,
};

/// The requesting resident, derived per request from the verified identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Viewer {
    pub user_id: String,
    pub tenant_id: String,
    pub family_unit_id: Option<String>,
    /// Neighborhood of the viewer's assigned lot.
    pub neighborhood_id: Option<String>,
    pub is_tenant_admin: bool,
}

impl From<ResidentMembership> for Viewer {
    fn from(m: ResidentMembership) -> Self {
        Viewer {
            user_id: m.id,
            tenant_id: m.tenant_id,
            family_unit_id: m.family_unit_id,
            neighborhood_id: m.neighborhood_id,
            is_tenant_admin: m.role == ResidentRole::TenantAdmin,
        }
    }
}

impl Viewer {
    /// Owner, or a tenant admin for the kinds admins manage.
    pub fn can_manage(&self, record: &ShareableRecord) -> bool {
        record.tenant_id == self.tenant_id
            && (record.created_by == self.user_id
                || (self.is_tenant_admin && record.kind.admin_manageable()))
    }
}

/// Persisted grant lists attached to one record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordGrants {
    pub neighborhood_ids: BTreeSet<String>,
    pub invitee_ids: BTreeSet<String>,
    pub family_unit_ids: BTreeSet<String>,
}

impl RecordGrants {
    pub fn add_neighborhood(&mut self, grant: NeighborhoodGrant) {
        self.neighborhood_ids.insert(grant.neighborhood_id);
    }

    pub fn add_invite(&mut self, invite: &Invite) {
        match invite.target() {
            Some(InviteTarget::Resident(id)) => {
                self.invitee_ids.insert(id.to_string());
            }
            Some(InviteTarget::FamilyUnit(id)) => {
                self.family_unit_ids.insert(id.to_string());
            }
            None => tracing::warn!("Skipping malformed invite {}", invite.id),
        }
    }
}

/// A record's audience, with the grant sets each scope consults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Community,
    Neighborhood(BTreeSet<String>),
    Private {
        invitees: BTreeSet<String>,
        family_units: BTreeSet<String>,
    },
}

impl Scope {
    pub fn from_record(scope: VisibilityScope, grants: &RecordGrants) -> Self {
        match scope {
            VisibilityScope::Community => Scope::Community,
            VisibilityScope::Neighborhood => Scope::Neighborhood(grants.neighborhood_ids.clone()),
            VisibilityScope::Private => Scope::Private {
                invitees: grants.invitee_ids.clone(),
                family_units: grants.family_unit_ids.clone(),
            },
        }
    }
}

pub struct ScopeResolver;

impl ScopeResolver {
    /// Core decision for a same-tenant viewer. The creator always sees their
    /// own record, whatever the scope says.
    pub fn resolve(viewer: &Viewer, creator_id: &str, scope: &Scope) -> bool {
        if viewer.user_id == creator_id {
            return true;
        }

        match scope {
            Scope::Community => true,
            Scope::Neighborhood(neighborhoods) => viewer
                .neighborhood_id
                .as_ref()
                .map(|n| neighborhoods.contains(n))
                .unwrap_or(false),
            Scope::Private {
                invitees,
                family_units,
            } => {
                invitees.contains(&viewer.user_id)
                    || viewer
                        .family_unit_id
                        .as_ref()
                        .map(|f| family_units.contains(f))
                        .unwrap_or(false)
            }
        }
    }

    pub fn is_visible(viewer: &Viewer, record: &ShareableRecord, grants: &RecordGrants) -> bool {
        if record.tenant_id != viewer.tenant_id {
            return false;
        }

        // Unpublished drafts belong to their author alone.
        if record.status == RecordStatus::Draft && record.created_by != viewer.user_id {
            return false;
        }

        let scope = Scope::from_record(record.visibility_scope, grants);
        Self::resolve(viewer, &record.created_by, &scope)
    }
}

/// Direction of a scope edit, ranked private < neighborhood < community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeChange {
    Expanding,
    Reducing,
    Unchanged,
}

impl ScopeChange {
    pub fn classify(from: VisibilityScope, to: VisibilityScope) -> Self {
        use std::cmp::Ordering;

        match to.breadth().cmp(&from.breadth()) {
            Ordering::Greater => ScopeChange::Expanding,
            Ordering::Less => ScopeChange::Reducing,
            Ordering::Equal => ScopeChange::Unchanged,
        }
    }
}

/// Kinds that accept a scope of `private`.
pub fn allows_private_scope(kind: RecordKind) -> bool {
    !matches!(kind, RecordKind::Announcement)
}
