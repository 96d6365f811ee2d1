//! Equipment assignment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Links one equipment item to a user or a project for a period of time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub equipment_id: Uuid,
    pub user_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    /// Local user who recorded the assignment
    pub assigned_by: Option<Uuid>,
    pub assigned_at: DateTime<Utc>,
    /// Set when the equipment comes back; open assignments have none
    pub returned_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl Assignment {
    pub fn is_open(&self) -> bool {
        self.returned_at.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_target"))]
pub struct CreateAssignmentRequest {
    pub equipment_id: Uuid,
    pub user_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

fn validate_target(req: &CreateAssignmentRequest) -> Result<(), ValidationError> {
    if req.user_id.is_none() && req.project_id.is_none() {
        let mut err = ValidationError::new("assignment_target");
        err.message = Some("either user_id or project_id is required".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignmentQuery {
    pub equipment_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    /// Only assignments that have not been returned
    #[serde(default)]
    pub open_only: bool,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
