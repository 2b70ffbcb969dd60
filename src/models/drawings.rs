use crate::schema::drawings;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a submitted drawing.
///
/// The automated pipeline drives `processing -> in_review | failed`; human
/// actors drive `submitted | failed -> processing` (assignment) and
/// `in_review -> reviewed` (evaluation).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, diesel_derive_enum::DbEnum,
)]
#[ExistingTypePath = "crate::schema::sql_types::DrawingStatus"]
#[serde(rename_all = "snake_case")]
pub enum DrawingStatus {
    #[db_rename = "submitted"]
    Submitted,
    #[db_rename = "processing"]
    Processing,
    #[db_rename = "in_review"]
    InReview,
    #[db_rename = "failed"]
    Failed,
    #[db_rename = "reviewed"]
    Reviewed,
}

impl DrawingStatus {
    /// Assignment is only accepted for fresh submissions and failed runs.
    /// Re-assigning a `processing` drawing would double-schedule a pipeline
    /// run; `in_review`/`reviewed` drawings are past the automated stage.
    pub fn assignable(self) -> bool {
        matches!(self, Self::Submitted | Self::Failed)
    }

    /// An evaluation can be submitted once the analysis has landed
    /// (`in_review`) and re-submitted afterwards (`reviewed`, last write
    /// wins without a status change).
    pub fn accepts_evaluation(self) -> bool {
        matches!(self, Self::InReview | Self::Reviewed)
    }

    /// No further automated transitions happen from this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Reviewed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Processing => "processing",
            Self::InReview => "in_review",
            Self::Failed => "failed",
            Self::Reviewed => "reviewed",
        }
    }
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = drawings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Drawing {
    pub id: Uuid,
    pub student_id: Uuid,
    pub psychologist_id: Option<Uuid>,
    pub file_path: String,
    pub status: DrawingStatus,
    /// Run-generation token. Incremented on every accepted assignment; a
    /// pipeline run may only commit its terminal transition while the row
    /// still carries the value the run was scheduled with.
    pub run_seq: i32,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = drawings)]
pub struct NewDrawing {
    pub student_id: Uuid,
    pub file_path: String,
    pub status: DrawingStatus,
}
