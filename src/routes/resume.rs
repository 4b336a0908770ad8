use axum::{
    extract::{Path, State},
    Json,
};
use tracing::instrument;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    middleware::UserIdentity,
    models::{
        common::MessageResponse,
        resume::{ResumeResponse, SectionKind, SectionResponse},
    },
};

fn parse_kind(kind: &str) -> Result<SectionKind> {
    SectionKind::from_str(kind)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid resume section: {}", kind)))
}

/// GET /api/v1/resume
///
/// The caller's full resume: every stored section.
#[instrument(skip(state))]
pub async fn get_resume(
    State(state): State<AppState>,
    identity: UserIdentity,
) -> Result<Json<ResumeResponse>> {
    let sections = state.resumes.get_sections(identity.user_id).await?;

    Ok(Json(ResumeResponse {
        sections: sections.into_iter().map(SectionResponse::from).collect(),
    }))
}

/// GET /api/v1/resume/{kind}
#[instrument(skip(state))]
pub async fn get_section(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(kind): Path<String>,
) -> Result<Json<SectionResponse>> {
    let kind = parse_kind(&kind)?;
    let section = state.resumes.get_section(identity.user_id, kind).await?;

    Ok(Json(section.into()))
}

/// PUT /api/v1/resume/{kind}
///
/// Create or replace a section. The body is the section document itself.
#[instrument(skip(state, content))]
pub async fn upsert_section(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(kind): Path<String>,
    Json(content): Json<serde_json::Value>,
) -> Result<Json<SectionResponse>> {
    let kind = parse_kind(&kind)?;
    let section = state
        .resumes
        .upsert_section(identity.user_id, kind, content)
        .await?;

    Ok(Json(section.into()))
}

/// DELETE /api/v1/resume/{kind}
#[instrument(skip(state))]
pub async fn delete_section(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(kind): Path<String>,
) -> Result<Json<MessageResponse>> {
    let kind = parse_kind(&kind)?;
    state.resumes.delete_section(identity.user_id, kind).await?;

    Ok(Json(MessageResponse::new("Section deleted")))
}
