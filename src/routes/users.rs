use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::session;
use crate::db::models::{Transaction, User};
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::marketplace::domain::{Amount, Role, UserId};
use crate::state::AppState;

// --- Bodies ---

#[derive(Deserialize)]
pub struct RegisterBody {
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub user: User,
    pub token: String,
}

#[derive(Deserialize)]
pub struct DepositBody {
    pub amount: Amount,
}

#[derive(Serialize)]
pub struct DepositResponse {
    pub balance: Amount,
    pub transaction: Transaction,
}

/// What anyone may see about another user.
#[derive(Serialize)]
pub struct PublicProfile {
    pub id: UserId,
    pub display_name: Option<String>,
    pub role: Role,
    pub rating_count: i64,
    pub average_rating: f64,
}

impl From<User> for PublicProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            display_name: user.display_name,
            role: user.role,
            rating_count: user.rating_count,
            average_rating: user.average_rating,
        }
    }
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users", post(register))
        .route("/api/users/{id}", get(profile))
        .route("/api/me", get(me))
        .route("/api/me/deposits", post(deposit))
        .route("/api/me/transactions", get(transactions))
        .route("/api/logout", post(logout))
}

// --- Handlers ---

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let (user, token) = state
        .market
        .sign_up(
            &body.email,
            body.display_name,
            body.role,
            state.config.auth.session_hours,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user, token })))
}

async fn profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PublicProfile>> {
    let user = state.market.user(&UserId::new(id)).await?;
    Ok(Json(user.into()))
}

async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<User>> {
    Ok(Json(state.market.user(&user.id).await?))
}

async fn deposit(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<DepositBody>,
) -> AppResult<Json<DepositResponse>> {
    let (updated, transaction) = state.market.deposit(&user.actor(), body.amount).await?;
    Ok(Json(DepositResponse {
        balance: updated.balance,
        transaction,
    }))
}

async fn transactions(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Transaction>>> {
    Ok(Json(state.market.transactions(&user.actor()).await?))
}

async fn logout(State(state): State<AppState>, user: CurrentUser) -> AppResult<StatusCode> {
    session::delete_session(&state.db, &user.token)?;
    Ok(StatusCode::NO_CONTENT)
}
