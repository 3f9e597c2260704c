use thiserror::Error;

use crate::config::MarketConfig;
use crate::db::models::*;
use crate::marketplace::domain::*;
use crate::marketplace::notifications::Notifier;
use crate::marketplace::repository::{DynMarketRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for MarketError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Workflow(e) => Self::Workflow(e),
            RepositoryError::NotFound(what) => Self::NotFound(what),
            other => Self::Repository(other),
        }
    }
}

pub type MarketResult<T> = Result<T, MarketError>;

/// The user on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    fn require_role(&self, role: Role) -> MarketResult<()> {
        if self.role != role {
            return Err(MarketError::Forbidden(format!(
                "only a {} can do this",
                role.as_str()
            )));
        }
        Ok(())
    }
}

/// Orchestrates the proposal workflow: ownership checks, the atomic store
/// operations and the notifications that follow each transition.
pub struct MarketService {
    repo: DynMarketRepository,
    notifier: Notifier,
    config: MarketConfig,
}

impl MarketService {
    pub fn new(repo: DynMarketRepository, config: MarketConfig) -> Self {
        let notifier = Notifier::new(repo.clone());
        Self {
            repo,
            notifier,
            config,
        }
    }

    pub fn repository(&self) -> &DynMarketRepository {
        &self.repo
    }

    // --- Accounts ---

    pub async fn register(
        &self,
        email: &str,
        display_name: Option<String>,
        role: Role,
    ) -> MarketResult<User> {
        let new_user = self.new_user(email, display_name, role)?;
        let user = self.repo.create_user(new_user).await?;

        tracing::info!("Registered {} {}", user.role.as_str(), user.id);
        Ok(user)
    }

    /// Register and open the first session in one step. Either both exist
    /// afterwards or neither does.
    pub async fn sign_up(
        &self,
        email: &str,
        display_name: Option<String>,
        role: Role,
        session_hours: u64,
    ) -> MarketResult<(User, String)> {
        let new_user = self.new_user(email, display_name, role)?;
        let (user, token) = self.repo.create_account(new_user, session_hours).await?;

        tracing::info!("Signed up {} {}", user.role.as_str(), user.id);
        Ok((user, token))
    }

    fn new_user(
        &self,
        email: &str,
        display_name: Option<String>,
        role: Role,
    ) -> MarketResult<NewUser> {
        let email = email.trim().to_lowercase();
        if !email.contains('@') || email.len() < 3 {
            return Err(MarketError::Validation(format!(
                "'{}' is not an email address",
                email
            )));
        }
        if role == Role::Admin {
            return Err(MarketError::Forbidden(
                "admin accounts cannot be self-registered".to_string(),
            ));
        }

        Ok(NewUser {
            email,
            display_name: display_name.filter(|n| !n.trim().is_empty()),
            role,
            starting_balance: self.config.starting_balance,
        })
    }

    pub async fn user(&self, id: &UserId) -> MarketResult<User> {
        self.repo
            .get_user(id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("user {}", id)))
    }

    pub async fn deposit(&self, actor: &Actor, amount: Amount) -> MarketResult<(User, Transaction)> {
        if amount <= 0 {
            return Err(WorkflowError::InvalidAmount(amount).into());
        }
        if amount > self.config.max_deposit {
            return Err(MarketError::Validation(format!(
                "deposits are limited to {}",
                self.config.max_deposit
            )));
        }

        let (user, transaction) = self.repo.deposit(&actor.id, amount).await?;
        tracing::info!(
            "Deposit of {} for {}, balance now {}",
            amount,
            user.id,
            user.balance
        );
        Ok((user, transaction))
    }

    pub async fn transactions(&self, actor: &Actor) -> MarketResult<Vec<Transaction>> {
        Ok(self.repo.list_transactions(&actor.id).await?)
    }

    // --- Requests ---

    pub async fn post_request(
        &self,
        actor: &Actor,
        title: &str,
        description: &str,
        budget: Amount,
    ) -> MarketResult<DesignRequest> {
        actor.require_role(Role::Client)?;

        let title = title.trim();
        if title.is_empty() {
            return Err(MarketError::Validation("title is required".to_string()));
        }

        let request = self
            .repo
            .create_request(NewRequest {
                client_id: actor.id.clone(),
                title: title.to_string(),
                description: description.trim().to_string(),
                budget,
            })
            .await?;

        tracing::info!("Client {} posted request {}", actor.id, request.id);
        Ok(request)
    }

    pub async fn request(&self, id: &RequestId) -> MarketResult<DesignRequest> {
        self.repo
            .get_request(id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("request {}", id)))
    }

    pub async fn requests(&self, status: Option<RequestStatus>) -> MarketResult<Vec<DesignRequest>> {
        Ok(self.repo.list_requests(status).await?)
    }

    /// The owning client (and admins) see every bid; a designer sees only
    /// their own.
    pub async fn proposals_for_request(
        &self,
        actor: &Actor,
        request_id: &RequestId,
    ) -> MarketResult<Vec<DesignProposal>> {
        let request = self.request(request_id).await?;
        let proposals = self.repo.list_proposals_for_request(&request.id).await?;

        if actor.is_admin() || request.client_id == actor.id {
            return Ok(proposals);
        }

        Ok(proposals
            .into_iter()
            .filter(|p| p.designer_id == actor.id)
            .collect())
    }

    pub async fn proposals_for_designer(&self, actor: &Actor) -> MarketResult<Vec<DesignProposal>> {
        actor.require_role(Role::Designer)?;
        Ok(self.repo.list_proposals_for_designer(&actor.id).await?)
    }

    // --- Proposals ---

    pub async fn submit_proposal(
        &self,
        actor: &Actor,
        request_id: &RequestId,
        price: Amount,
        timeline_days: Option<i64>,
        message: &str,
    ) -> MarketResult<DesignProposal> {
        actor.require_role(Role::Designer)?;
        if let Some(days) = timeline_days {
            if days <= 0 {
                return Err(MarketError::Validation(
                    "timeline must be at least one day".to_string(),
                ));
            }
        }

        let request = self.request(request_id).await?;

        let proposal = self
            .repo
            .create_proposal(NewProposal {
                request_id: request.id.clone(),
                designer_id: actor.id.clone(),
                price,
                timeline_days,
                message: message.trim().to_string(),
            })
            .await?;

        tracing::info!(
            "Designer {} proposed {} on request {}",
            actor.id,
            price,
            request.id
        );
        self.notifier
            .proposal_received(&proposal, &request.title)
            .await;

        Ok(proposal)
    }

    pub async fn proposal(&self, actor: &Actor, id: &ProposalId) -> MarketResult<DesignProposal> {
        let proposal = self.load_proposal(id).await?;
        if !actor.is_admin() && proposal.client_id != actor.id && proposal.designer_id != actor.id
        {
            return Err(MarketError::Forbidden(format!(
                "proposal {} belongs to someone else",
                id
            )));
        }
        Ok(proposal)
    }

    pub async fn accept_proposal(
        &self,
        actor: &Actor,
        id: &ProposalId,
    ) -> MarketResult<AcceptOutcome> {
        let proposal = self.load_proposal(id).await?;
        ensure_client(actor, &proposal)?;
        proposal.stage.accept()?;

        let outcome = self.repo.accept_proposal(id).await?;
        tracing::info!(
            "Proposal {} accepted, {} competing proposals rejected",
            id,
            outcome.rejected.len()
        );

        self.notifier.proposal_accepted(&outcome.accepted).await;
        for rejected in &outcome.rejected {
            self.notifier.proposal_rejected(rejected).await;
        }

        Ok(outcome)
    }

    pub async fn reject_proposal(
        &self,
        actor: &Actor,
        id: &ProposalId,
    ) -> MarketResult<DesignProposal> {
        let proposal = self.load_proposal(id).await?;
        ensure_client(actor, &proposal)?;
        let next = proposal.stage.reject()?;

        let rejected = self.repo.transition_stage(id, proposal.stage, next).await?;
        tracing::info!("Proposal {} rejected", id);
        self.notifier.proposal_rejected(&rejected).await;

        Ok(rejected)
    }

    /// Designer declares the work delivered. No money moves.
    pub async fn mark_completed_by_designer(
        &self,
        actor: &Actor,
        id: &ProposalId,
    ) -> MarketResult<DesignProposal> {
        let proposal = self.load_proposal(id).await?;
        ensure_designer(actor, &proposal)?;
        let next = proposal.stage.mark_completed_by_designer()?;

        let updated = self.repo.transition_stage(id, proposal.stage, next).await?;
        tracing::info!("Proposal {} marked completed by designer", id);
        self.notifier.completed_by_designer(&updated).await;

        Ok(updated)
    }

    /// Client confirms delivery: the project closes and the price moves from
    /// the client's balance to the designer's, all or nothing.
    pub async fn confirm_completion(
        &self,
        actor: &Actor,
        id: &ProposalId,
    ) -> MarketResult<CompletionReceipt> {
        let proposal = self.load_proposal(id).await?;
        ensure_client(actor, &proposal)?;
        proposal.stage.confirm()?;

        let receipt = match self.repo.complete_project(id).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!("Completion of proposal {} failed: {}", id, e);
                return Err(e.into());
            }
        };

        tracing::info!(
            "Proposal {} completed, {} paid from {} to {}",
            id,
            receipt.transaction.amount,
            receipt.proposal.client_id,
            receipt.proposal.designer_id
        );
        self.notifier.payment_received(&receipt.proposal).await;

        Ok(receipt)
    }

    pub async fn attach_model_file(
        &self,
        actor: &Actor,
        id: &ProposalId,
        url: &str,
    ) -> MarketResult<DesignProposal> {
        let url = url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(MarketError::Validation(
                "model file must be an http(s) URL".to_string(),
            ));
        }

        let proposal = self.load_proposal(id).await?;
        ensure_designer(actor, &proposal)?;

        Ok(self.repo.add_model_file(id, url).await?)
    }

    // --- Ratings ---

    pub async fn rate_designer(
        &self,
        actor: &Actor,
        project_id: &ProposalId,
        rating: i64,
        comment: Option<String>,
    ) -> MarketResult<RatingReceipt> {
        actor.require_role(Role::Client)?;
        let score = RatingScore::new(rating)?;

        let comment = comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if let Some(ref text) = comment {
            if text.chars().count() > self.config.max_comment_len {
                return Err(MarketError::Validation(format!(
                    "comment is longer than {} characters",
                    self.config.max_comment_len
                )));
            }
        }

        let project = self.load_proposal(project_id).await?;
        ensure_client(actor, &project)?;

        let receipt = self
            .repo
            .add_rating(NewRating {
                client_id: actor.id.clone(),
                project_id: project.id.clone(),
                score,
                comment,
            })
            .await?;

        tracing::info!(
            "Designer {} rated {} (average {:.2} over {})",
            project.designer_id,
            score.value(),
            receipt.average_rating,
            receipt.rating_count
        );
        self.notifier
            .rating_received(&project.designer_id, project.id.as_str(), score.value())
            .await;

        Ok(receipt)
    }

    // --- Notifications ---

    pub async fn notifications(
        &self,
        actor: &Actor,
        unread_only: bool,
    ) -> MarketResult<Vec<Notification>> {
        Ok(self.repo.list_notifications(&actor.id, unread_only).await?)
    }

    pub async fn unread_count(&self, actor: &Actor) -> MarketResult<i64> {
        Ok(self.repo.unread_notification_count(&actor.id).await?)
    }

    pub async fn mark_read(&self, actor: &Actor, notification_id: &str) -> MarketResult<()> {
        if self
            .repo
            .mark_notification_read(&actor.id, notification_id)
            .await?
        {
            Ok(())
        } else {
            Err(MarketError::NotFound(format!(
                "notification {}",
                notification_id
            )))
        }
    }

    async fn load_proposal(&self, id: &ProposalId) -> MarketResult<DesignProposal> {
        self.repo
            .get_proposal(id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("proposal {}", id)))
    }
}

fn ensure_client(actor: &Actor, proposal: &DesignProposal) -> MarketResult<()> {
    if proposal.client_id != actor.id {
        return Err(MarketError::Forbidden(format!(
            "only the client who posted the request can act on proposal {}",
            proposal.id
        )));
    }
    Ok(())
}

fn ensure_designer(actor: &Actor, proposal: &DesignProposal) -> MarketResult<()> {
    if proposal.designer_id != actor.id {
        return Err(MarketError::Forbidden(format!(
            "only the designer who submitted proposal {} can do this",
            proposal.id
        )));
    }
    Ok(())
}
