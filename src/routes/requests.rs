use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::models::DesignRequest;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::marketplace::domain::{Amount, RequestId, RequestStatus};
use crate::routes::proposals::ProposalView;
use crate::state::AppState;

// --- Bodies ---

#[derive(Deserialize)]
pub struct CreateRequestBody {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub budget: Amount,
}

#[derive(Deserialize)]
pub struct ListRequestsQuery {
    pub status: Option<RequestStatus>,
}

#[derive(Deserialize)]
pub struct SubmitProposalBody {
    pub price: Amount,
    pub timeline_days: Option<i64>,
    #[serde(default)]
    pub message: String,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/requests", get(list_requests).post(create_request))
        .route("/api/requests/{id}", get(show_request))
        .route(
            "/api/requests/{id}/proposals",
            get(list_proposals).post(submit_proposal),
        )
}

// --- Handlers ---

async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<ListRequestsQuery>,
) -> AppResult<Json<Vec<DesignRequest>>> {
    Ok(Json(state.market.requests(query.status).await?))
}

async fn create_request(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<CreateRequestBody>,
) -> AppResult<(StatusCode, Json<DesignRequest>)> {
    let request = state
        .market
        .post_request(&user.actor(), &body.title, &body.description, body.budget)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn show_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DesignRequest>> {
    Ok(Json(state.market.request(&RequestId::new(id)).await?))
}

async fn list_proposals(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<ProposalView>>> {
    let proposals = state
        .market
        .proposals_for_request(&user.actor(), &RequestId::new(id))
        .await?;
    Ok(Json(proposals.into_iter().map(Into::into).collect()))
}

async fn submit_proposal(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<SubmitProposalBody>,
) -> AppResult<(StatusCode, Json<ProposalView>)> {
    let proposal = state
        .market
        .submit_proposal(
            &user.actor(),
            &RequestId::new(id),
            body.price,
            body.timeline_days,
            &body.message,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(proposal.into())))
}
