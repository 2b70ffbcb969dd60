use crate::schema::ai_analyses;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Stored output of one successful pipeline run. Exactly one row per
/// drawing; re-running the pipeline replaces the payload (upsert).
#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = ai_analyses)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AiAnalysis {
    pub id: Uuid,
    pub drawing_id: Uuid,
    pub analysis_data: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = ai_analyses)]
pub struct NewAiAnalysis {
    pub drawing_id: Uuid,
    pub analysis_data: Value,
}
