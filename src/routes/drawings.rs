use std::ffi::OsStr;
use std::path::Path as FsPath;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum_login::AuthSession;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::users::{User, UserRole};
use crate::services::assessments::{self, ListingScope};
use crate::services::htp::HtpReport;
use crate::services::report_renderer;
use crate::state::AppState;

use crate::auth::user_store::Backend as AuthBackend;
type CurrentAuthSession = AuthSession<AuthBackend>;

pub fn drawing_routes() -> Router<AppState> {
    Router::new()
        .route("/drawings/upload", post(upload_drawing_handler))
        .route("/my-submissions", get(my_submissions_handler))
        .route("/assessments/facilitator", get(facilitator_assessments_handler))
        .route("/assessments/psychologist", get(psychologist_assessments_handler))
        .route("/psychologists", get(list_psychologists_handler))
        .route(
            "/drawings/{drawing_id}/assign/{psychologist_id}",
            put(assign_drawing_handler),
        )
        .route("/drawings/{drawing_id}/evaluate", post(evaluate_handler))
        .route("/drawings/{drawing_id}/report", get(report_handler))
}

/// Pull the logged-in user out of the session and check their role.
fn require_role(auth_session: &CurrentAuthSession, role: UserRole) -> Result<User, AppError> {
    let user = auth_session
        .user
        .clone()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;
    if user.role != role {
        return Err(AppError::Forbidden(format!(
            "Requires the {} role",
            role.as_str()
        )));
    }
    Ok(user)
}

// POST /api/drawings/upload
#[instrument(skip(state, auth_session, multipart), err)]
pub async fn upload_drawing_handler(
    State(state): State<AppState>,
    auth_session: CurrentAuthSession,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let user = require_role(&auth_session, UserRole::Student)?;

    let mut file_data: Option<Bytes> = None;
    let mut filename: Option<String> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            filename = field.file_name().map(ToString::to_string);
            file_data = Some(field.bytes().await?);
            break;
        }
    }
    let data = file_data
        .ok_or_else(|| AppError::BadRequest("Missing 'file' field in upload".to_string()))?;
    if data.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
    }

    // Unique filename to prevent overwrites; keep the original extension.
    let extension = filename
        .as_deref()
        .and_then(|name| FsPath::new(name).extension().and_then(OsStr::to_str))
        .unwrap_or("png");
    let unique_name = format!("{}.{}", Uuid::new_v4(), extension);
    let file_path = FsPath::new(&state.config.upload_storage_path).join(unique_name);
    tokio::fs::write(&file_path, &data).await?;

    let drawing = assessments::create_drawing(
        &state.pool,
        user.id,
        file_path.to_string_lossy().into_owned(),
    )
    .await?;

    info!(drawing_id = %drawing.id, student_id = %user.id, "Drawing uploaded");
    Ok((StatusCode::CREATED, Json(drawing)))
}

// GET /api/my-submissions
#[instrument(skip(state, auth_session), err)]
pub async fn my_submissions_handler(
    State(state): State<AppState>,
    auth_session: CurrentAuthSession,
) -> Result<impl IntoResponse, AppError> {
    let user = require_role(&auth_session, UserRole::Student)?;
    let views = assessments::list_assessments(&state.pool, ListingScope::Student, user.id).await?;
    Ok(Json(views))
}

// GET /api/assessments/facilitator
#[instrument(skip(state, auth_session), err)]
pub async fn facilitator_assessments_handler(
    State(state): State<AppState>,
    auth_session: CurrentAuthSession,
) -> Result<impl IntoResponse, AppError> {
    let user = require_role(&auth_session, UserRole::Facilitator)?;
    let views =
        assessments::list_assessments(&state.pool, ListingScope::Facilitator, user.id).await?;
    Ok(Json(views))
}

// GET /api/assessments/psychologist
#[instrument(skip(state, auth_session), err)]
pub async fn psychologist_assessments_handler(
    State(state): State<AppState>,
    auth_session: CurrentAuthSession,
) -> Result<impl IntoResponse, AppError> {
    let user = require_role(&auth_session, UserRole::Psychologist)?;
    let views =
        assessments::list_assessments(&state.pool, ListingScope::Psychologist, user.id).await?;
    Ok(Json(views))
}

// GET /api/psychologists
#[instrument(skip(state, auth_session), err)]
pub async fn list_psychologists_handler(
    State(state): State<AppState>,
    auth_session: CurrentAuthSession,
) -> Result<impl IntoResponse, AppError> {
    require_role(&auth_session, UserRole::Facilitator)?;
    let psychologists = assessments::list_psychologists(&state.pool).await?;
    Ok(Json(psychologists))
}

// PUT /api/drawings/{drawing_id}/assign/{psychologist_id}
#[instrument(skip(state, auth_session), err)]
pub async fn assign_drawing_handler(
    State(state): State<AppState>,
    auth_session: CurrentAuthSession,
    Path((drawing_id, psychologist_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&auth_session, UserRole::Facilitator)?;

    let drawing = assessments::assign_drawing(&state.pool, drawing_id, psychologist_id).await?;

    // Hand the pipeline run to a background task. The request returns as
    // soon as the `processing` transition has committed; the run records
    // its outcome through the store.
    let pool = state.pool.clone();
    let pipeline = state.pipeline.clone();
    let mode = state.config.analysis_mode;
    let artifact_ref = drawing.file_path.clone();
    let run_seq = drawing.run_seq;
    tokio::spawn(async move {
        assessments::run_analysis_job(pool, pipeline, mode, drawing_id, artifact_ref, run_seq)
            .await;
    });

    info!(drawing_id = %drawing_id, psychologist_id = %psychologist_id, "Drawing assigned, analysis scheduled");
    Ok(Json(drawing))
}

#[derive(Deserialize, Debug)]
pub struct EvaluationPayload {
    pub notes: String,
}

// POST /api/drawings/{drawing_id}/evaluate
#[instrument(skip(state, auth_session, payload), err)]
pub async fn evaluate_handler(
    State(state): State<AppState>,
    auth_session: CurrentAuthSession,
    Path(drawing_id): Path<Uuid>,
    Json(payload): Json<EvaluationPayload>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_role(&auth_session, UserRole::Psychologist)?;
    let evaluation =
        assessments::submit_evaluation(&state.pool, drawing_id, user.id, payload.notes).await?;
    info!(drawing_id = %drawing_id, "Evaluation stored");
    Ok(Json(evaluation))
}

// GET /api/drawings/{drawing_id}/report
#[instrument(skip(state, auth_session), err)]
pub async fn report_handler(
    State(state): State<AppState>,
    auth_session: CurrentAuthSession,
    Path(drawing_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let user = require_role(&auth_session, UserRole::Psychologist)?;

    let drawing = assessments::get_drawing(&state.pool, drawing_id).await?;
    if drawing.psychologist_id != Some(user.id) {
        return Err(AppError::Forbidden(
            "Drawing is not assigned to you".to_string(),
        ));
    }

    let analysis = assessments::get_analysis(&state.pool, drawing_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No analysis available for this drawing".to_string()))?;
    let report: HtpReport = serde_json::from_value(analysis.analysis_data)?;

    let bytes = report_renderer::render_markdown(&report, drawing.id, drawing.submitted_at);
    let headers = [
        (
            header::CONTENT_TYPE,
            "text/markdown; charset=utf-8".to_string(),
        ),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"assessment-{drawing_id}.md\""),
        ),
    ];
    Ok((headers, bytes).into_response())
}
