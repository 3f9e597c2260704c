use crate::db::models::{DesignProposal, NewNotification};
use crate::marketplace::domain::{Amount, NotificationKind, UserId};
use crate::marketplace::repository::DynMarketRepository;

/// Fire-and-forget notification dispatch.
///
/// A failed write is logged and dropped; callers never see it.
#[derive(Clone)]
pub struct Notifier {
    repo: DynMarketRepository,
}

impl Notifier {
    pub fn new(repo: DynMarketRepository) -> Self {
        Self { repo }
    }

    pub async fn dispatch(&self, notification: NewNotification) {
        let user_id = notification.user_id.clone();
        let kind = notification.kind;

        match self.repo.create_notification(notification).await {
            Ok(created) => {
                tracing::debug!(
                    "Notification {} ({}) sent to {}",
                    created.id,
                    kind.as_str(),
                    user_id
                );
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to send {} notification to {}: {}",
                    kind.as_str(),
                    user_id,
                    e
                );
            }
        }
    }

    pub async fn proposal_received(&self, proposal: &DesignProposal, request_title: &str) {
        self.dispatch(NewNotification {
            user_id: proposal.client_id.clone(),
            title: "New proposal".to_string(),
            message: format!(
                "A designer sent a proposal of {} for \"{}\"",
                format_amount(proposal.price),
                request_title
            ),
            kind: NotificationKind::ProposalReceived,
            related_id: Some(proposal.id.to_string()),
        })
        .await;
    }

    pub async fn proposal_accepted(&self, proposal: &DesignProposal) {
        self.dispatch(NewNotification {
            user_id: proposal.designer_id.clone(),
            title: "Proposal accepted".to_string(),
            message: "Your proposal was accepted. The project is now in progress.".to_string(),
            kind: NotificationKind::ProposalAccepted,
            related_id: Some(proposal.id.to_string()),
        })
        .await;
    }

    pub async fn proposal_rejected(&self, proposal: &DesignProposal) {
        self.dispatch(NewNotification {
            user_id: proposal.designer_id.clone(),
            title: "Proposal declined".to_string(),
            message: "The client went with a different proposal.".to_string(),
            kind: NotificationKind::ProposalRejected,
            related_id: Some(proposal.id.to_string()),
        })
        .await;
    }

    pub async fn completed_by_designer(&self, proposal: &DesignProposal) {
        self.dispatch(NewNotification {
            user_id: proposal.client_id.clone(),
            title: "Project delivered".to_string(),
            message: "Your designer marked the project as completed. Review it and confirm to release payment.".to_string(),
            kind: NotificationKind::ProjectCompletedByDesigner,
            related_id: Some(proposal.id.to_string()),
        })
        .await;
    }

    pub async fn payment_received(&self, proposal: &DesignProposal) {
        self.dispatch(NewNotification {
            user_id: proposal.designer_id.clone(),
            title: "Payment received".to_string(),
            message: format!(
                "The client confirmed completion. {} was added to your balance.",
                format_amount(proposal.price)
            ),
            kind: NotificationKind::PaymentReceived,
            related_id: Some(proposal.id.to_string()),
        })
        .await;
    }

    pub async fn rating_received(&self, designer_id: &UserId, project_id: &str, score: u8) {
        self.dispatch(NewNotification {
            user_id: designer_id.clone(),
            title: "New rating".to_string(),
            message: format!("A client rated your work {} out of 5.", score),
            kind: NotificationKind::RatingReceived,
            related_id: Some(project_id.to_string()),
        })
        .await;
    }
}

fn format_amount(cents: Amount) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    use crate::db::models::*;
    use crate::marketplace::domain::*;
    use crate::marketplace::repository::{MarketRepository, RepositoryError};

    /// Repository whose notification writes always fail.
    struct BrokenStore;

    fn broken() -> RepositoryError {
        RepositoryError::Conflict("store offline".to_string())
    }

    #[async_trait]
    impl MarketRepository for BrokenStore {
        async fn create_user(&self, _: NewUser) -> Result<User, RepositoryError> {
            Err(broken())
        }
        async fn create_account(
            &self,
            _: NewUser,
            _: u64,
        ) -> Result<(User, String), RepositoryError> {
            Err(broken())
        }
        async fn get_user(&self, _: &UserId) -> Result<Option<User>, RepositoryError> {
            Err(broken())
        }
        async fn find_user_by_email(&self, _: &str) -> Result<Option<User>, RepositoryError> {
            Err(broken())
        }
        async fn deposit(
            &self,
            _: &UserId,
            _: Amount,
        ) -> Result<(User, Transaction), RepositoryError> {
            Err(broken())
        }
        async fn create_request(&self, _: NewRequest) -> Result<DesignRequest, RepositoryError> {
            Err(broken())
        }
        async fn get_request(
            &self,
            _: &RequestId,
        ) -> Result<Option<DesignRequest>, RepositoryError> {
            Err(broken())
        }
        async fn list_requests(
            &self,
            _: Option<RequestStatus>,
        ) -> Result<Vec<DesignRequest>, RepositoryError> {
            Err(broken())
        }
        async fn create_proposal(
            &self,
            _: NewProposal,
        ) -> Result<DesignProposal, RepositoryError> {
            Err(broken())
        }
        async fn get_proposal(
            &self,
            _: &ProposalId,
        ) -> Result<Option<DesignProposal>, RepositoryError> {
            Err(broken())
        }
        async fn list_proposals_for_request(
            &self,
            _: &RequestId,
        ) -> Result<Vec<DesignProposal>, RepositoryError> {
            Err(broken())
        }
        async fn list_proposals_for_designer(
            &self,
            _: &UserId,
        ) -> Result<Vec<DesignProposal>, RepositoryError> {
            Err(broken())
        }
        async fn transition_stage(
            &self,
            _: &ProposalId,
            _: ProposalStage,
            _: ProposalStage,
        ) -> Result<DesignProposal, RepositoryError> {
            Err(broken())
        }
        async fn accept_proposal(&self, _: &ProposalId) -> Result<AcceptOutcome, RepositoryError> {
            Err(broken())
        }
        async fn complete_project(
            &self,
            _: &ProposalId,
        ) -> Result<CompletionReceipt, RepositoryError> {
            Err(broken())
        }
        async fn add_model_file(
            &self,
            _: &ProposalId,
            _: &str,
        ) -> Result<DesignProposal, RepositoryError> {
            Err(broken())
        }
        async fn add_rating(&self, _: NewRating) -> Result<RatingReceipt, RepositoryError> {
            Err(broken())
        }
        async fn list_transactions(
            &self,
            _: &UserId,
        ) -> Result<Vec<Transaction>, RepositoryError> {
            Err(broken())
        }
        async fn create_notification(
            &self,
            _: NewNotification,
        ) -> Result<Notification, RepositoryError> {
            Err(broken())
        }
        async fn list_notifications(
            &self,
            _: &UserId,
            _: bool,
        ) -> Result<Vec<Notification>, RepositoryError> {
            Err(broken())
        }
        async fn mark_notification_read(
            &self,
            _: &UserId,
            _: &str,
        ) -> Result<bool, RepositoryError> {
            Err(broken())
        }
        async fn unread_notification_count(&self, _: &UserId) -> Result<i64, RepositoryError> {
            Err(broken())
        }
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(300_00), "$300.00");
        assert_eq!(format_amount(1_05), "$1.05");
        assert_eq!(format_amount(0), "$0.00");
    }

    #[tokio::test]
    async fn test_dispatch_swallows_store_failures() {
        let notifier = Notifier::new(Arc::new(BrokenStore));

        // Must return normally even though the write fails
        notifier
            .dispatch(NewNotification {
                user_id: UserId::new("someone"),
                title: "t".to_string(),
                message: "m".to_string(),
                kind: NotificationKind::PaymentReceived,
                related_id: None,
            })
            .await;
    }
}
