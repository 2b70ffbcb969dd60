use crate::schema::evaluations;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Psychologist-authored notes for one drawing. One row per drawing;
/// resubmission overwrites the notes (no history kept).
#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = evaluations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Evaluation {
    pub id: Uuid,
    pub drawing_id: Uuid,
    pub psychologist_id: Uuid,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = evaluations)]
pub struct NewEvaluation {
    pub drawing_id: Uuid,
    pub psychologist_id: Uuid,
    pub notes: String,
}

/// The evaluation shape embedded in listing responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationView {
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Evaluation> for EvaluationView {
    fn from(evaluation: &Evaluation) -> Self {
        Self {
            notes: evaluation.notes.clone(),
            created_at: evaluation.created_at,
        }
    }
}
