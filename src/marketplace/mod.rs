pub mod domain;
pub mod notifications;
pub mod repository;
pub mod service;

pub use domain::{
    Amount, ProjectStatus, ProposalId, ProposalStage, ProposalStatus, RatingAggregate,
    RatingScore, RequestId, RequestStatus, Role, UserId, WorkflowError,
};
pub use repository::{DynMarketRepository, MarketRepository, SqliteMarketRepository};
pub use service::{Actor, MarketError, MarketResult, MarketService};
