// Domain types - Pure, immutable, no side effects
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Money in minor units (cents).
pub type Amount = i64;

/// New types for compile-time safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(pub String);

impl ProposalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Designer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Designer => "designer",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Self::Client),
            "designer" => Ok(Self::Designer),
            "admin" => Ok(Self::Admin),
            other => Err(WorkflowError::UnknownValue(format!("role '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Completed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            other => Err(WorkflowError::UnknownValue(format!(
                "request status '{}'",
                other
            ))),
        }
    }
}

/// Canonical lifecycle of a proposal. The `status` / `project_status` pair
/// seen by clients is derived from this, never stored separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStage {
    /// Submitted, waiting for the client to decide
    Pending,
    /// Client picked another proposal or declined this one
    Rejected,
    /// Accepted, designer is working
    InProgress,
    /// Designer delivered, waiting for the client to confirm and pay
    CompletedByDesigner,
    /// Client confirmed, funds moved
    Completed,
}

/// Overall proposal status view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

/// Workflow stage view of an accepted proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    InProgress,
    CompletedByDesigner,
    Completed,
}

impl ProposalStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Rejected => "rejected",
            Self::InProgress => "in_progress",
            Self::CompletedByDesigner => "completed_by_designer",
            Self::Completed => "completed",
        }
    }

    pub fn status(&self) -> ProposalStatus {
        match self {
            Self::Pending => ProposalStatus::Pending,
            Self::Rejected => ProposalStatus::Rejected,
            Self::InProgress | Self::CompletedByDesigner => ProposalStatus::Accepted,
            Self::Completed => ProposalStatus::Completed,
        }
    }

    pub fn project_status(&self) -> Option<ProjectStatus> {
        match self {
            Self::Pending | Self::Rejected => None,
            Self::InProgress => Some(ProjectStatus::InProgress),
            Self::CompletedByDesigner => Some(ProjectStatus::CompletedByDesigner),
            Self::Completed => Some(ProjectStatus::Completed),
        }
    }

    /// Edges of the workflow graph. Nothing ever moves backwards.
    pub fn can_transition_to(&self, next: ProposalStage) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::Pending, Self::Rejected)
                | (Self::InProgress, Self::CompletedByDesigner)
                | (Self::CompletedByDesigner, Self::Completed)
        )
    }

    /// Model files may be attached only while the work is open.
    pub fn accepts_deliverables(&self) -> bool {
        matches!(self, Self::InProgress | Self::CompletedByDesigner)
    }

    pub fn advance(self, next: ProposalStage) -> Result<Self, WorkflowError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(WorkflowError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Transition: Pending → InProgress
    pub fn accept(self) -> Result<Self, WorkflowError> {
        self.advance(Self::InProgress)
    }

    /// Transition: Pending → Rejected
    pub fn reject(self) -> Result<Self, WorkflowError> {
        self.advance(Self::Rejected)
    }

    /// Transition: InProgress → CompletedByDesigner
    pub fn mark_completed_by_designer(self) -> Result<Self, WorkflowError> {
        self.advance(Self::CompletedByDesigner)
    }

    /// Transition: CompletedByDesigner → Completed
    pub fn confirm(self) -> Result<Self, WorkflowError> {
        self.advance(Self::Completed)
    }
}

impl fmt::Display for ProposalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStage {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "rejected" => Ok(Self::Rejected),
            "in_progress" => Ok(Self::InProgress),
            "completed_by_designer" => Ok(Self::CompletedByDesigner),
            "completed" => Ok(Self::Completed),
            other => Err(WorkflowError::UnknownValue(format!("stage '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    ProjectPayment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::ProjectPayment => "project_payment",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Self::Deposit),
            "project_payment" => Ok(Self::ProjectPayment),
            other => Err(WorkflowError::UnknownValue(format!(
                "transaction type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ProposalReceived,
    ProposalAccepted,
    ProposalRejected,
    ProjectCompletedByDesigner,
    PaymentReceived,
    RatingReceived,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProposalReceived => "proposal_received",
            Self::ProposalAccepted => "proposal_accepted",
            Self::ProposalRejected => "proposal_rejected",
            Self::ProjectCompletedByDesigner => "project_completed_by_designer",
            Self::PaymentReceived => "payment_received",
            Self::RatingReceived => "rating_received",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposal_received" => Ok(Self::ProposalReceived),
            "proposal_accepted" => Ok(Self::ProposalAccepted),
            "proposal_rejected" => Ok(Self::ProposalRejected),
            "project_completed_by_designer" => Ok(Self::ProjectCompletedByDesigner),
            "payment_received" => Ok(Self::PaymentReceived),
            "rating_received" => Ok(Self::RatingReceived),
            other => Err(WorkflowError::UnknownValue(format!(
                "notification type '{}'",
                other
            ))),
        }
    }
}

/// A star rating, always within 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct RatingScore(u8);

impl RatingScore {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self, WorkflowError> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(WorkflowError::InvalidRating(value))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for RatingScore {
    type Error = WorkflowError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RatingScore> for i64 {
    fn from(score: RatingScore) -> Self {
        score.0 as i64
    }
}

/// Running rating totals kept on the designer's user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RatingAggregate {
    pub count: i64,
    pub total: i64,
}

impl RatingAggregate {
    pub fn new(count: i64, total: i64) -> Self {
        Self { count, total }
    }

    pub fn record(self, score: RatingScore) -> Self {
        Self {
            count: self.count + 1,
            total: self.total + score.value() as i64,
        }
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total as f64 / self.count as f64
        }
    }
}

/// Balance check performed before any project payment.
pub fn check_funds(available: Amount, required: Amount) -> Result<(), WorkflowError> {
    if required <= 0 {
        return Err(WorkflowError::InvalidAmount(required));
    }
    if available < required {
        return Err(WorkflowError::InsufficientBalance {
            required,
            available,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowError {
    InvalidTransition {
        from: ProposalStage,
        to: ProposalStage,
    },
    InsufficientBalance {
        required: Amount,
        available: Amount,
    },
    InvalidRating(i64),
    InvalidAmount(Amount),
    UnknownValue(String),
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTransition { from, to } => {
                write!(f, "Cannot move proposal from {} to {}", from, to)
            }
            Self::InsufficientBalance {
                required,
                available,
            } => write!(
                f,
                "Insufficient balance: required {}, available {}",
                required, available
            ),
            Self::InvalidRating(value) => {
                write!(f, "Rating must be between 1 and 5, got {}", value)
            }
            Self::InvalidAmount(value) => write!(f, "Amount must be positive, got {}", value),
            Self::UnknownValue(what) => write!(f, "Unknown {}", what),
        }
    }
}

impl std::error::Error for WorkflowError {}
