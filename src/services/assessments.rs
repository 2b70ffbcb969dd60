//! Submission lifecycle: the status state machine, the guarded transitions
//! driven by assignment / pipeline completion / evaluation, and the
//! background analysis job that bridges the pipeline and the store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use diesel::PgConnection;
use diesel::prelude::*;
use diesel::upsert::excluded;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::PgPool;
use crate::errors::AppError;
use crate::models::analyses::{AiAnalysis, NewAiAnalysis};
use crate::models::drawings::{Drawing, DrawingStatus, NewDrawing};
use crate::models::evaluations::{Evaluation, EvaluationView, NewEvaluation};
use crate::models::users::{User, UserPublic, UserRole};
use crate::schema::{ai_analyses, drawings, evaluations, users};
use crate::services::htp::{AnalysisMode, HtpPipeline};

/// Which related records a listing hydrates, mirroring what each role's
/// dashboard shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingScope {
    /// The student's own submissions, with their evaluations.
    Student,
    /// Every submission, with student and assigned psychologist.
    Facilitator,
    /// Submissions assigned to one psychologist, with student and analysis.
    Psychologist,
}

/// One submission as returned by the listing endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentView {
    pub id: Uuid,
    pub file_path: String,
    pub status: DrawingStatus,
    pub submitted_at: DateTime<Utc>,
    pub student: Option<UserPublic>,
    pub psychologist: Option<UserPublic>,
    pub ai_analysis: Option<Value>,
    pub evaluation: Option<EvaluationView>,
}

/// Record a freshly uploaded drawing in the `submitted` state.
#[instrument(skip(pool, file_path), err)]
pub async fn create_drawing(
    pool: &PgPool,
    student_id: Uuid,
    file_path: String,
) -> Result<Drawing, AppError> {
    let conn = pool.get().await?;
    let drawing = conn
        .interact(move |conn| {
            diesel::insert_into(drawings::table)
                .values(&NewDrawing {
                    student_id,
                    file_path,
                    status: DrawingStatus::Submitted,
                })
                .returning(Drawing::as_returning())
                .get_result::<Drawing>(conn)
        })
        .await?
        .map_err(AppError::from)?;
    Ok(drawing)
}

/// Fetch one drawing by id.
pub async fn get_drawing(pool: &PgPool, drawing_id: Uuid) -> Result<Drawing, AppError> {
    let conn = pool.get().await?;
    let drawing = conn
        .interact(move |conn| {
            drawings::table
                .find(drawing_id)
                .select(Drawing::as_select())
                .first::<Drawing>(conn)
                .optional()
        })
        .await?
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound("Drawing not found".to_string()))?;
    Ok(drawing)
}

/// Fetch the stored analysis for one drawing, if any.
pub async fn get_analysis(pool: &PgPool, drawing_id: Uuid) -> Result<Option<AiAnalysis>, AppError> {
    let conn = pool.get().await?;
    let analysis = conn
        .interact(move |conn| {
            ai_analyses::table
                .filter(ai_analyses::drawing_id.eq(drawing_id))
                .select(AiAnalysis::as_select())
                .first::<AiAnalysis>(conn)
                .optional()
        })
        .await?
        .map_err(AppError::from)?;
    Ok(analysis)
}

/// All psychologists, for the facilitator's assignment dropdown.
pub async fn list_psychologists(pool: &PgPool) -> Result<Vec<UserPublic>, AppError> {
    let conn = pool.get().await?;
    let psychologists = conn
        .interact(|conn| {
            users::table
                .filter(users::role.eq(UserRole::Psychologist))
                .order(users::email.asc())
                .select(User::as_select())
                .load::<User>(conn)
        })
        .await?
        .map_err(AppError::from)?;
    Ok(psychologists.iter().map(UserPublic::from).collect())
}

/// Assign a drawing to a psychologist: `submitted | failed -> processing`.
///
/// The status guard lives inside the UPDATE itself, so two concurrent
/// assignments (or an assignment racing a running pipeline) cannot both
/// succeed: re-assigning a `processing` drawing would double-schedule a run.
/// Every accepted assignment bumps `run_seq`, invalidating any still
/// in-flight run for the previous assignment.
#[instrument(skip(pool), err)]
pub async fn assign_drawing(
    pool: &PgPool,
    drawing_id: Uuid,
    psychologist_id: Uuid,
) -> Result<Drawing, AppError> {
    let conn = pool.get().await?;
    let drawing = conn
        .interact(move |conn| -> Result<Drawing, AppError> {
            // The assignee relation is a plain lookup, but assigning to a
            // non-psychologist would strand the submission.
            let assignee = users::table
                .find(psychologist_id)
                .select(User::as_select())
                .first::<User>(conn)
                .optional()?
                .ok_or_else(|| AppError::NotFound("Psychologist not found".to_string()))?;
            if assignee.role != UserRole::Psychologist {
                return Err(AppError::BadRequest(
                    "Assignee is not a psychologist".to_string(),
                ));
            }

            let updated = diesel::update(
                drawings::table.filter(
                    drawings::id.eq(drawing_id).and(
                        drawings::status
                            .eq_any(vec![DrawingStatus::Submitted, DrawingStatus::Failed]),
                    ),
                ),
            )
            .set((
                drawings::psychologist_id.eq(psychologist_id),
                drawings::status.eq(DrawingStatus::Processing),
                drawings::run_seq.eq(drawings::run_seq + 1),
            ))
            .returning(Drawing::as_returning())
            .get_result::<Drawing>(conn)
            .optional()?;

            match updated {
                Some(drawing) => Ok(drawing),
                None => {
                    let current = drawings::table
                        .find(drawing_id)
                        .select(Drawing::as_select())
                        .first::<Drawing>(conn)
                        .optional()?;
                    match current {
                        None => Err(AppError::NotFound("Drawing not found".to_string())),
                        Some(drawing) => Err(AppError::Conflict(format!(
                            "Drawing cannot be assigned while {}",
                            drawing.status.as_str()
                        ))),
                    }
                }
            }
        })
        .await??;
    Ok(drawing)
}

/// Commit a successful pipeline run: `processing -> in_review` plus the
/// analysis upsert, in one transaction, guarded on the run-generation token.
///
/// Returns `false` when the run is stale (the drawing was re-assigned while
/// this run was in flight); nothing is written in that case.
#[instrument(skip(pool, analysis_payload), err)]
pub async fn complete_run(
    pool: &PgPool,
    drawing_id: Uuid,
    run_seq: i32,
    analysis_payload: Value,
) -> Result<bool, AppError> {
    let conn = pool.get().await?;
    let committed = conn
        .interact(move |conn| -> Result<bool, AppError> {
            conn.transaction::<bool, AppError, _>(|conn| {
                let rows = diesel::update(
                    drawings::table.filter(
                        drawings::id
                            .eq(drawing_id)
                            .and(drawings::run_seq.eq(run_seq))
                            .and(drawings::status.eq(DrawingStatus::Processing)),
                    ),
                )
                .set(drawings::status.eq(DrawingStatus::InReview))
                .execute(conn)?;
                if rows == 0 {
                    return Ok(false);
                }

                let new_analysis = NewAiAnalysis {
                    drawing_id,
                    analysis_data: analysis_payload,
                };
                diesel::insert_into(ai_analyses::table)
                    .values(&new_analysis)
                    .on_conflict(ai_analyses::drawing_id)
                    .do_update()
                    .set((
                        ai_analyses::analysis_data.eq(excluded(ai_analyses::analysis_data)),
                        ai_analyses::created_at.eq(diesel::dsl::now),
                    ))
                    .execute(conn)?;
                Ok(true)
            })
        })
        .await??;
    Ok(committed)
}

/// Record a failed pipeline run: `processing -> failed`, guarded on the
/// run-generation token. No analysis is written for a failed attempt.
///
/// Returns `false` when the run is stale.
#[instrument(skip(pool), err)]
pub async fn fail_run(pool: &PgPool, drawing_id: Uuid, run_seq: i32) -> Result<bool, AppError> {
    let conn = pool.get().await?;
    let rows = conn
        .interact(move |conn| {
            diesel::update(
                drawings::table.filter(
                    drawings::id
                        .eq(drawing_id)
                        .and(drawings::run_seq.eq(run_seq))
                        .and(drawings::status.eq(DrawingStatus::Processing)),
                ),
            )
            .set(drawings::status.eq(DrawingStatus::Failed))
            .execute(conn)
        })
        .await?
        .map_err(AppError::from)?;
    Ok(rows > 0)
}

/// Store psychologist notes for a drawing: `in_review -> reviewed` on the
/// first submission, last-write-wins on resubmission with no status change.
///
/// The status precondition rejects evaluations for drawings whose analysis
/// has not landed yet (or whose run failed).
#[instrument(skip(pool, notes), err)]
pub async fn submit_evaluation(
    pool: &PgPool,
    drawing_id: Uuid,
    psychologist_id: Uuid,
    notes: String,
) -> Result<Evaluation, AppError> {
    let conn = pool.get().await?;
    let evaluation = conn
        .interact(move |conn| -> Result<Evaluation, AppError> {
            conn.transaction::<Evaluation, AppError, _>(|conn| {
                let drawing = drawings::table
                    .find(drawing_id)
                    .select(Drawing::as_select())
                    .first::<Drawing>(conn)
                    .optional()?
                    .ok_or_else(|| AppError::NotFound("Drawing not found".to_string()))?;
                if !drawing.status.accepts_evaluation() {
                    return Err(AppError::Conflict(format!(
                        "Drawing is not ready for evaluation while {}",
                        drawing.status.as_str()
                    )));
                }

                let evaluation = diesel::insert_into(evaluations::table)
                    .values(&NewEvaluation {
                        drawing_id,
                        psychologist_id,
                        notes,
                    })
                    .on_conflict(evaluations::drawing_id)
                    .do_update()
                    .set((
                        evaluations::notes.eq(excluded(evaluations::notes)),
                        evaluations::psychologist_id.eq(excluded(evaluations::psychologist_id)),
                    ))
                    .returning(Evaluation::as_returning())
                    .get_result::<Evaluation>(conn)?;

                // First evaluation moves the drawing to `reviewed`; later
                // updates leave the terminal status untouched.
                diesel::update(
                    drawings::table.filter(
                        drawings::id
                            .eq(drawing_id)
                            .and(drawings::status.eq(DrawingStatus::InReview)),
                    ),
                )
                .set(drawings::status.eq(DrawingStatus::Reviewed))
                .execute(conn)?;

                Ok(evaluation)
            })
        })
        .await??;
    Ok(evaluation)
}

/// List submissions for one role's dashboard, hydrated per `scope`.
#[instrument(skip(pool), err)]
pub async fn list_assessments(
    pool: &PgPool,
    scope: ListingScope,
    actor_id: Uuid,
) -> Result<Vec<AssessmentView>, AppError> {
    let conn = pool.get().await?;
    let views = conn
        .interact(move |conn| -> Result<Vec<AssessmentView>, AppError> {
            let rows: Vec<Drawing> = match scope {
                ListingScope::Student => drawings::table
                    .filter(drawings::student_id.eq(actor_id))
                    .order(drawings::submitted_at.desc())
                    .select(Drawing::as_select())
                    .load(conn)?,
                ListingScope::Facilitator => drawings::table
                    .order(drawings::submitted_at.desc())
                    .select(Drawing::as_select())
                    .load(conn)?,
                ListingScope::Psychologist => drawings::table
                    .filter(drawings::psychologist_id.eq(actor_id))
                    .order(drawings::submitted_at.desc())
                    .select(Drawing::as_select())
                    .load(conn)?,
            };
            hydrate_views(conn, rows, scope)
        })
        .await??;
    Ok(views)
}

/// Batch-load the related records each scope embeds, then assemble views.
fn hydrate_views(
    conn: &mut PgConnection,
    rows: Vec<Drawing>,
    scope: ListingScope,
) -> Result<Vec<AssessmentView>, AppError> {
    let drawing_ids: Vec<Uuid> = rows.iter().map(|d| d.id).collect();

    let mut user_ids: HashSet<Uuid> = rows.iter().map(|d| d.student_id).collect();
    if scope == ListingScope::Facilitator {
        user_ids.extend(rows.iter().filter_map(|d| d.psychologist_id));
    }
    let user_ids: Vec<Uuid> = user_ids.into_iter().collect();
    let user_map: HashMap<Uuid, UserPublic> = users::table
        .filter(users::id.eq_any(user_ids))
        .select(User::as_select())
        .load::<User>(conn)?
        .iter()
        .map(|user| (user.id, UserPublic::from(user)))
        .collect();

    let mut analysis_map: HashMap<Uuid, Value> = HashMap::new();
    if scope == ListingScope::Psychologist {
        analysis_map = ai_analyses::table
            .filter(ai_analyses::drawing_id.eq_any(&drawing_ids))
            .select(AiAnalysis::as_select())
            .load::<AiAnalysis>(conn)?
            .into_iter()
            .map(|analysis| (analysis.drawing_id, analysis.analysis_data))
            .collect();
    }

    let mut evaluation_map: HashMap<Uuid, EvaluationView> = HashMap::new();
    if scope == ListingScope::Student {
        evaluation_map = evaluations::table
            .filter(evaluations::drawing_id.eq_any(&drawing_ids))
            .select(Evaluation::as_select())
            .load::<Evaluation>(conn)?
            .iter()
            .map(|evaluation| (evaluation.drawing_id, EvaluationView::from(evaluation)))
            .collect();
    }

    Ok(rows
        .into_iter()
        .map(|drawing| AssessmentView {
            student: user_map.get(&drawing.student_id).cloned(),
            psychologist: drawing
                .psychologist_id
                .and_then(|id| user_map.get(&id).cloned()),
            ai_analysis: analysis_map.remove(&drawing.id),
            evaluation: evaluation_map.remove(&drawing.id),
            id: drawing.id,
            file_path: drawing.file_path,
            status: drawing.status,
            submitted_at: drawing.submitted_at,
        })
        .collect())
}

/// Background pipeline run for one accepted assignment.
///
/// Fire-and-forget: every outcome is recorded through store writes and log
/// records, never returned to the triggering request (which has already
/// responded). Errors here translate into the `failed` status, guarded on
/// `run_seq` so a stale run cannot clobber a newer assignment's state.
pub async fn run_analysis_job(
    pool: PgPool,
    pipeline: Arc<HtpPipeline>,
    mode: AnalysisMode,
    drawing_id: Uuid,
    artifact_ref: String,
    run_seq: i32,
) {
    info!(drawing_id = %drawing_id, run_seq, ?mode, "AI analysis started");

    let outcome = pipeline.run(&artifact_ref, mode).await;

    match outcome {
        Ok(report) => {
            let payload = match serde_json::to_value(&report) {
                Ok(payload) => payload,
                Err(e) => {
                    error!(drawing_id = %drawing_id, error = %e, "failed to serialize analysis result");
                    record_failure(&pool, drawing_id, run_seq).await;
                    return;
                }
            };
            match complete_run(&pool, drawing_id, run_seq, payload).await {
                Ok(true) => {
                    info!(drawing_id = %drawing_id, usage = ?report.usage, "AI analysis completed")
                }
                Ok(false) => {
                    warn!(drawing_id = %drawing_id, run_seq, "discarding stale analysis run")
                }
                Err(e) => {
                    error!(drawing_id = %drawing_id, error = ?e, "failed to store analysis result")
                }
            }
        }
        Err(e) => {
            error!(drawing_id = %drawing_id, error = ?e, "AI analysis failed");
            record_failure(&pool, drawing_id, run_seq).await;
        }
    }
}

async fn record_failure(pool: &PgPool, drawing_id: Uuid, run_seq: i32) {
    match fail_run(pool, drawing_id, run_seq).await {
        Ok(true) => {}
        Ok(false) => warn!(drawing_id = %drawing_id, run_seq, "stale run failed; status left alone"),
        Err(e) => error!(drawing_id = %drawing_id, error = ?e, "failed to record analysis failure"),
    }
}
