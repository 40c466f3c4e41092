use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::VisibilityScope;
use crate::error::{AppError, AppResult};

// ============================================================================
// Grant Models
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NeighborhoodGrant {
    pub record_id: String,
    pub neighborhood_id: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Invite {
    pub id: String,
    pub record_id: String,
    pub invitee_id: Option<String>,
    pub family_unit_id: Option<String>,
}

/// The single grant unit an invite row represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteTarget<'a> {
    Resident(&'a str),
    FamilyUnit(&'a str),
}

impl Invite {
    pub fn target(&self) -> Option<InviteTarget<'_>> {
        match (self.invitee_id.as_deref(), self.family_unit_id.as_deref()) {
            (Some(resident), None) => Some(InviteTarget::Resident(resident)),
            (None, Some(family)) => Some(InviteTarget::FamilyUnit(family)),
            _ => None,
        }
    }
}

/// Requested scope together with the grant lists that back it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    pub visibility_scope: VisibilityScope,
    #[serde(default)]
    pub neighborhood_ids: Vec<String>,
    #[serde(default)]
    pub invitee_ids: Vec<String>,
    #[serde(default)]
    pub family_unit_ids: Vec<String>,
}

impl ScopeConfig {
    pub fn community() -> Self {
        ScopeConfig {
            visibility_scope: VisibilityScope::Community,
            neighborhood_ids: Vec::new(),
            invitee_ids: Vec::new(),
            family_unit_ids: Vec::new(),
        }
    }

    /// Reject configurations whose scope has no backing grants.
    pub fn validate(&self) -> AppResult<()> {
        match self.visibility_scope {
            VisibilityScope::Community => Ok(()),
            VisibilityScope::Neighborhood if self.neighborhood_ids.is_empty() => Err(
                AppError::Validation("Select at least one neighborhood".to_string()),
            ),
            VisibilityScope::Private
                if self.invitee_ids.is_empty() && self.family_unit_ids.is_empty() =>
            {
                Err(AppError::Validation(
                    "Invite at least one resident or family".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Drop grant lists that do not apply to the chosen scope, de-duplicating the rest.
    pub fn normalized(mut self) -> Self {
        fn dedup(ids: &mut Vec<String>) {
            ids.retain(|id| !id.trim().is_empty());
            ids.sort();
            ids.dedup();
        }

        match self.visibility_scope {
            VisibilityScope::Community => {
                self.neighborhood_ids.clear();
                self.invitee_ids.clear();
                self.family_unit_ids.clear();
            }
            VisibilityScope::Neighborhood => {
                self.invitee_ids.clear();
                self.family_unit_ids.clear();
            }
            VisibilityScope::Private => {
                self.neighborhood_ids.clear();
            }
        }
        dedup(&mut self.neighborhood_ids);
        dedup(&mut self.invitee_ids);
        dedup(&mut self.family_unit_ids);
        self
    }
}
