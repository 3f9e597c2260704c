use std::sync::Arc;

use atelier::config::MarketConfig;
use atelier::db;
use atelier::db::models::DesignProposal;
use atelier::marketplace::domain::NotificationKind;
use atelier::marketplace::{
    Actor, MarketError, MarketService, ProjectStatus, ProposalStage, ProposalStatus, RequestStatus,
    Role, SqliteMarketRepository, WorkflowError,
};
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    market: Arc<MarketService>,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let pool = db::create_pool(&dir.path().join("test.db")).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");

    let repo = Arc::new(SqliteMarketRepository::new(pool));
    let market = Arc::new(MarketService::new(repo, MarketConfig::default()));
    Harness { _dir: dir, market }
}

async fn register(market: &MarketService, email: &str, role: Role) -> Actor {
    let user = market.register(email, None, role).await.unwrap();
    Actor::new(user.id, user.role)
}

/// Client posts a request, designer bids `price`, client accepts and the
/// designer delivers. Leaves the proposal in `completed_by_designer`.
async fn delivered_project(
    market: &MarketService,
    client: &Actor,
    designer: &Actor,
    price: i64,
) -> DesignProposal {
    let request = market
        .post_request(client, "Living room refresh", "Scandinavian, warm", price)
        .await
        .unwrap();
    let proposal = market
        .submit_proposal(designer, &request.id, price, Some(14), "Happy to help")
        .await
        .unwrap();
    market.accept_proposal(client, &proposal.id).await.unwrap();
    market
        .mark_completed_by_designer(designer, &proposal.id)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_confirmation_pays_designer_and_closes_project() {
    let h = harness();
    let client = register(&h.market, "client@example.com", Role::Client).await;
    let designer = register(&h.market, "designer@example.com", Role::Designer).await;
    h.market.deposit(&client, 500_00).await.unwrap();

    let proposal = delivered_project(&h.market, &client, &designer, 300_00).await;
    assert_eq!(proposal.stage.status(), ProposalStatus::Accepted);
    assert_eq!(
        proposal.stage.project_status(),
        Some(ProjectStatus::CompletedByDesigner)
    );

    let receipt = h
        .market
        .confirm_completion(&client, &proposal.id)
        .await
        .unwrap();

    assert_eq!(receipt.client_balance, 200_00);
    assert_eq!(receipt.designer_balance, 300_00);
    assert_eq!(receipt.proposal.stage, ProposalStage::Completed);
    assert_eq!(receipt.transaction.amount, 300_00);
    assert_eq!(receipt.transaction.from_user_id.as_ref(), Some(&client.id));
    assert_eq!(receipt.transaction.to_user_id, designer.id);

    // Balances are persisted, not just reported
    assert_eq!(h.market.user(&client.id).await.unwrap().balance, 200_00);
    assert_eq!(h.market.user(&designer.id).await.unwrap().balance, 300_00);

    let request = h.market.request(&proposal.request_id).await.unwrap();
    assert_eq!(request.status, RequestStatus::Completed);

    // Exactly one payment record on the designer's ledger
    let ledger = h.market.transactions(&designer).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].amount, 300_00);

    let notes = h.market.notifications(&designer, true).await.unwrap();
    assert!(notes
        .iter()
        .any(|n| n.kind == NotificationKind::PaymentReceived));
}

#[tokio::test]
async fn test_insufficient_balance_leaves_everything_untouched() {
    let h = harness();
    let client = register(&h.market, "client@example.com", Role::Client).await;
    let designer = register(&h.market, "designer@example.com", Role::Designer).await;
    h.market.deposit(&client, 100_00).await.unwrap();

    let proposal = delivered_project(&h.market, &client, &designer, 300_00).await;

    let err = h
        .market
        .confirm_completion(&client, &proposal.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MarketError::Workflow(WorkflowError::InsufficientBalance {
            required: 30000,
            available: 10000
        })
    ));

    assert_eq!(h.market.user(&client.id).await.unwrap().balance, 100_00);
    assert_eq!(h.market.user(&designer.id).await.unwrap().balance, 0);
    assert!(h.market.transactions(&designer).await.unwrap().is_empty());

    let after = h.market.proposal(&client, &proposal.id).await.unwrap();
    assert_eq!(after.stage, ProposalStage::CompletedByDesigner);

    // Topping up makes the same confirmation succeed
    h.market.deposit(&client, 200_00).await.unwrap();
    let receipt = h
        .market
        .confirm_completion(&client, &proposal.id)
        .await
        .unwrap();
    assert_eq!(receipt.client_balance, 0);
    assert_eq!(receipt.designer_balance, 300_00);
}

#[tokio::test]
async fn test_second_confirmation_is_rejected() {
    let h = harness();
    let client = register(&h.market, "client@example.com", Role::Client).await;
    let designer = register(&h.market, "designer@example.com", Role::Designer).await;
    h.market.deposit(&client, 1_000_00).await.unwrap();

    let proposal = delivered_project(&h.market, &client, &designer, 300_00).await;
    h.market
        .confirm_completion(&client, &proposal.id)
        .await
        .unwrap();

    let err = h
        .market
        .confirm_completion(&client, &proposal.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MarketError::Workflow(WorkflowError::InvalidTransition { .. })
    ));
    assert_eq!(h.market.user(&client.id).await.unwrap().balance, 700_00);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_confirmations_pay_once() {
    let h = harness();
    let client = register(&h.market, "client@example.com", Role::Client).await;
    let designer = register(&h.market, "designer@example.com", Role::Designer).await;
    h.market.deposit(&client, 1_000_00).await.unwrap();

    let proposal = delivered_project(&h.market, &client, &designer, 300_00).await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let market = h.market.clone();
        let client = client.clone();
        let id = proposal.id.clone();
        handles.push(tokio::spawn(async move {
            market.confirm_completion(&client, &id).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(h.market.user(&client.id).await.unwrap().balance, 700_00);
    assert_eq!(h.market.user(&designer.id).await.unwrap().balance, 300_00);
    assert_eq!(h.market.transactions(&designer).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_projects_cannot_overdraw_client() {
    let h = harness();
    let client = register(&h.market, "client@example.com", Role::Client).await;
    let first = register(&h.market, "first@example.com", Role::Designer).await;
    let second = register(&h.market, "second@example.com", Role::Designer).await;
    h.market.deposit(&client, 500_00).await.unwrap();

    let a = delivered_project(&h.market, &client, &first, 300_00).await;
    let b = delivered_project(&h.market, &client, &second, 300_00).await;

    let (ra, rb) = tokio::join!(
        {
            let market = h.market.clone();
            let client = client.clone();
            tokio::spawn(async move { market.confirm_completion(&client, &a.id).await })
        },
        {
            let market = h.market.clone();
            let client = client.clone();
            tokio::spawn(async move { market.confirm_completion(&client, &b.id).await })
        }
    );
    let results = [ra.unwrap(), rb.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(MarketError::Workflow(WorkflowError::InsufficientBalance { .. }))
    )));

    assert_eq!(h.market.user(&client.id).await.unwrap().balance, 200_00);
    let paid = h.market.user(&first.id).await.unwrap().balance
        + h.market.user(&second.id).await.unwrap().balance;
    assert_eq!(paid, 300_00);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ratings_keep_an_exact_aggregate() {
    let h = harness();
    let client = register(&h.market, "client@example.com", Role::Client).await;
    let designer = register(&h.market, "designer@example.com", Role::Designer).await;
    h.market.deposit(&client, 800_00).await.unwrap();

    let scores = [5, 4, 3, 5, 2, 1, 4, 3];
    let mut projects = Vec::new();
    for _ in scores {
        let proposal = delivered_project(&h.market, &client, &designer, 100_00).await;
        h.market
            .confirm_completion(&client, &proposal.id)
            .await
            .unwrap();
        projects.push(proposal.id);
    }

    let mut handles = Vec::new();
    for (id, score) in projects.into_iter().zip(scores) {
        let market = h.market.clone();
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            market.rate_designer(&client, &id, score, None).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let total: i64 = scores.iter().sum();
    let profile = h.market.user(&designer.id).await.unwrap();
    assert_eq!(profile.rating_count, scores.len() as i64);
    assert_eq!(profile.rating_total, total);
    assert!((profile.average_rating - total as f64 / scores.len() as f64).abs() < 1e-9);
}

#[tokio::test]
async fn test_only_the_owning_client_can_confirm() {
    let h = harness();
    let client = register(&h.market, "client@example.com", Role::Client).await;
    let stranger = register(&h.market, "other@example.com", Role::Client).await;
    let designer = register(&h.market, "designer@example.com", Role::Designer).await;
    h.market.deposit(&client, 500_00).await.unwrap();
    h.market.deposit(&stranger, 500_00).await.unwrap();

    let proposal = delivered_project(&h.market, &client, &designer, 300_00).await;

    let err = h
        .market
        .confirm_completion(&stranger, &proposal.id)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::Forbidden(_)));

    let err = h
        .market
        .confirm_completion(&designer, &proposal.id)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::Forbidden(_)));

    assert_eq!(h.market.user(&client.id).await.unwrap().balance, 500_00);
}

#[tokio::test]
async fn test_confirm_before_delivery_is_invalid() {
    let h = harness();
    let client = register(&h.market, "client@example.com", Role::Client).await;
    let designer = register(&h.market, "designer@example.com", Role::Designer).await;
    h.market.deposit(&client, 500_00).await.unwrap();

    let request = h
        .market
        .post_request(&client, "Kitchen", "", 300_00)
        .await
        .unwrap();
    let proposal = h
        .market
        .submit_proposal(&designer, &request.id, 300_00, None, "")
        .await
        .unwrap();
    h.market
        .accept_proposal(&client, &proposal.id)
        .await
        .unwrap();

    let err = h
        .market
        .confirm_completion(&client, &proposal.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MarketError::Workflow(WorkflowError::InvalidTransition { .. })
    ));
    assert_eq!(h.market.user(&client.id).await.unwrap().balance, 500_00);
}

#[tokio::test]
async fn test_ratings_aggregate_across_projects() {
    let h = harness();
    let client = register(&h.market, "client@example.com", Role::Client).await;
    let designer = register(&h.market, "designer@example.com", Role::Designer).await;
    h.market.deposit(&client, 900_00).await.unwrap();

    let mut last = None;
    for score in [5, 4, 3] {
        let proposal = delivered_project(&h.market, &client, &designer, 100_00).await;
        h.market
            .confirm_completion(&client, &proposal.id)
            .await
            .unwrap();
        let receipt = h
            .market
            .rate_designer(&client, &proposal.id, score, Some("Great work".to_string()))
            .await
            .unwrap();
        last = Some(receipt);
    }

    let receipt = last.unwrap();
    assert_eq!(receipt.rating_count, 3);
    assert_eq!(receipt.rating_total, 12);
    assert!((receipt.average_rating - 4.0).abs() < f64::EPSILON);

    let profile = h.market.user(&designer.id).await.unwrap();
    assert_eq!(profile.rating_count, 3);
    assert!((profile.average_rating - 4.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_rating_out_of_range_changes_nothing() {
    let h = harness();
    let client = register(&h.market, "client@example.com", Role::Client).await;
    let designer = register(&h.market, "designer@example.com", Role::Designer).await;
    h.market.deposit(&client, 500_00).await.unwrap();

    let proposal = delivered_project(&h.market, &client, &designer, 300_00).await;
    h.market
        .confirm_completion(&client, &proposal.id)
        .await
        .unwrap();

    for bad in [0, 6] {
        let err = h
            .market
            .rate_designer(&client, &proposal.id, bad, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MarketError::Workflow(WorkflowError::InvalidRating(_))
        ));
    }

    let profile = h.market.user(&designer.id).await.unwrap();
    assert_eq!(profile.rating_count, 0);
    assert_eq!(profile.average_rating, 0.0);
}
