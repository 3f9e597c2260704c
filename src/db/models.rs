use serde::{Deserialize, Serialize};

use crate::marketplace::domain::{
    Amount, NotificationKind, ProposalId, ProposalStage, RatingAggregate, RatingScore,
    RequestId, RequestStatus, Role, TransactionKind, UserId,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub balance: Amount,
    pub rating_count: i64,
    pub rating_total: i64,
    pub average_rating: f64,
    pub created_at: String,
}

impl User {
    pub fn rating(&self) -> RatingAggregate {
        RatingAggregate::new(self.rating_count, self.rating_total)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignRequest {
    pub id: RequestId,
    pub client_id: UserId,
    pub title: String,
    pub description: String,
    pub budget: Amount,
    pub status: RequestStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignProposal {
    pub id: ProposalId,
    pub request_id: RequestId,
    pub client_id: UserId,
    pub designer_id: UserId,
    pub price: Amount,
    pub timeline_days: Option<i64>,
    pub message: String,
    pub stage: ProposalStage,
    pub model_files: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub from_user_id: Option<UserId>,
    pub to_user_id: UserId,
    pub proposal_id: Option<ProposalId>,
    pub amount: Amount,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub id: String,
    pub client_id: UserId,
    pub designer_id: UserId,
    pub project_id: ProposalId,
    pub rating: RatingScore,
    pub comment: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub related_id: Option<String>,
    pub read: bool,
    pub created_at: String,
}

// --- Inputs ---

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub starting_balance: Amount,
}

#[derive(Debug, Clone)]
pub struct NewRequest {
    pub client_id: UserId,
    pub title: String,
    pub description: String,
    pub budget: Amount,
}

#[derive(Debug, Clone)]
pub struct NewProposal {
    pub request_id: RequestId,
    pub designer_id: UserId,
    pub price: Amount,
    pub timeline_days: Option<i64>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct NewRating {
    pub client_id: UserId,
    pub project_id: ProposalId,
    pub score: RatingScore,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub related_id: Option<String>,
}

// --- Results of atomic operations ---

/// Everything that changed when a client confirmed a project.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionReceipt {
    pub proposal: DesignProposal,
    pub transaction: Transaction,
    pub client_balance: Amount,
    pub designer_balance: Amount,
}

/// Outcome of accepting one proposal on a request.
#[derive(Debug, Clone, Serialize)]
pub struct AcceptOutcome {
    pub accepted: DesignProposal,
    pub rejected: Vec<DesignProposal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RatingReceipt {
    pub rating: Rating,
    pub rating_count: i64,
    pub rating_total: i64,
    pub average_rating: f64,
}
