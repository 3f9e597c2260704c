use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::models::{CompletionReceipt, DesignProposal, RatingReceipt, Transaction};
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::marketplace::domain::{Amount, ProjectStatus, ProposalId, ProposalStatus};
use crate::state::AppState;

// --- Views ---

/// A proposal plus the two status views derived from its stage.
#[derive(Serialize)]
pub struct ProposalView {
    #[serde(flatten)]
    pub proposal: DesignProposal,
    pub status: ProposalStatus,
    pub project_status: Option<ProjectStatus>,
}

impl From<DesignProposal> for ProposalView {
    fn from(proposal: DesignProposal) -> Self {
        Self {
            status: proposal.stage.status(),
            project_status: proposal.stage.project_status(),
            proposal,
        }
    }
}

#[derive(Serialize)]
pub struct AcceptResponse {
    pub accepted: ProposalView,
    pub rejected: Vec<ProposalView>,
}

#[derive(Serialize)]
pub struct ConfirmResponse {
    pub proposal: ProposalView,
    pub transaction: Transaction,
    pub client_balance: Amount,
    pub designer_balance: Amount,
}

impl From<CompletionReceipt> for ConfirmResponse {
    fn from(receipt: CompletionReceipt) -> Self {
        Self {
            proposal: receipt.proposal.into(),
            transaction: receipt.transaction,
            client_balance: receipt.client_balance,
            designer_balance: receipt.designer_balance,
        }
    }
}

// --- Bodies ---

#[derive(Deserialize)]
pub struct ModelFileBody {
    pub url: String,
}

#[derive(Deserialize)]
pub struct RatingBody {
    pub rating: i64,
    pub comment: Option<String>,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/proposals", get(my_proposals))
        .route("/api/proposals/{id}", get(show))
        .route("/api/proposals/{id}/accept", post(accept))
        .route("/api/proposals/{id}/reject", post(reject))
        .route("/api/proposals/{id}/complete", post(complete))
        .route("/api/proposals/{id}/confirm", post(confirm))
        .route("/api/proposals/{id}/model-files", post(add_model_file))
        .route("/api/proposals/{id}/ratings", post(rate))
}

// --- Handlers ---

async fn my_proposals(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<ProposalView>>> {
    let proposals = state.market.proposals_for_designer(&user.actor()).await?;
    Ok(Json(proposals.into_iter().map(Into::into).collect()))
}

async fn show(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<ProposalView>> {
    let proposal = state
        .market
        .proposal(&user.actor(), &ProposalId::new(id))
        .await?;
    Ok(Json(proposal.into()))
}

async fn accept(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<AcceptResponse>> {
    let outcome = state
        .market
        .accept_proposal(&user.actor(), &ProposalId::new(id))
        .await?;
    Ok(Json(AcceptResponse {
        accepted: outcome.accepted.into(),
        rejected: outcome.rejected.into_iter().map(Into::into).collect(),
    }))
}

async fn reject(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<ProposalView>> {
    let proposal = state
        .market
        .reject_proposal(&user.actor(), &ProposalId::new(id))
        .await?;
    Ok(Json(proposal.into()))
}

async fn complete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<ProposalView>> {
    let proposal = state
        .market
        .mark_completed_by_designer(&user.actor(), &ProposalId::new(id))
        .await?;
    Ok(Json(proposal.into()))
}

async fn confirm(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<ConfirmResponse>> {
    let receipt = state
        .market
        .confirm_completion(&user.actor(), &ProposalId::new(id))
        .await?;
    Ok(Json(receipt.into()))
}

async fn add_model_file(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<ModelFileBody>,
) -> AppResult<Json<ProposalView>> {
    let proposal = state
        .market
        .attach_model_file(&user.actor(), &ProposalId::new(id), &body.url)
        .await?;
    Ok(Json(proposal.into()))
}

async fn rate(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<RatingBody>,
) -> AppResult<(StatusCode, Json<RatingReceipt>)> {
    let receipt = state
        .market
        .rate_designer(&user.actor(), &ProposalId::new(id), body.rating, body.comment)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}
