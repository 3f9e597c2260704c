// Repository pattern - isolates all database side effects
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::session;
use crate::db::{self, models::*};
use crate::marketplace::domain::*;
use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

/// Repository trait - all marketplace persistence
#[async_trait]
pub trait MarketRepository: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError>;

    /// Create a user together with its first session. Returns the session token.
    async fn create_account(
        &self,
        user: NewUser,
        session_hours: u64,
    ) -> Result<(User, String), RepositoryError>;

    async fn get_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    /// Atomically credit a user and record the deposit
    async fn deposit(
        &self,
        user_id: &UserId,
        amount: Amount,
    ) -> Result<(User, Transaction), RepositoryError>;

    async fn create_request(&self, request: NewRequest) -> Result<DesignRequest, RepositoryError>;

    async fn get_request(&self, id: &RequestId) -> Result<Option<DesignRequest>, RepositoryError>;

    async fn list_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> Result<Vec<DesignRequest>, RepositoryError>;

    async fn create_proposal(
        &self,
        proposal: NewProposal,
    ) -> Result<DesignProposal, RepositoryError>;

    async fn get_proposal(&self, id: &ProposalId)
        -> Result<Option<DesignProposal>, RepositoryError>;

    async fn list_proposals_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<DesignProposal>, RepositoryError>;

    async fn list_proposals_for_designer(
        &self,
        designer_id: &UserId,
    ) -> Result<Vec<DesignProposal>, RepositoryError>;

    /// Compare-and-set on the stage column
    async fn transition_stage(
        &self,
        id: &ProposalId,
        from: ProposalStage,
        to: ProposalStage,
    ) -> Result<DesignProposal, RepositoryError>;

    /// Accept one proposal and reject every other pending one on its request
    async fn accept_proposal(&self, id: &ProposalId) -> Result<AcceptOutcome, RepositoryError>;

    /// Confirm completion: stage, request status, debit, credit and audit
    /// record in a single transaction
    async fn complete_project(&self, id: &ProposalId)
        -> Result<CompletionReceipt, RepositoryError>;

    async fn add_model_file(
        &self,
        id: &ProposalId,
        url: &str,
    ) -> Result<DesignProposal, RepositoryError>;

    /// Insert a rating and fold it into the designer's aggregate atomically
    async fn add_rating(&self, rating: NewRating) -> Result<RatingReceipt, RepositoryError>;

    async fn list_transactions(&self, user_id: &UserId)
        -> Result<Vec<Transaction>, RepositoryError>;

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, RepositoryError>;

    async fn list_notifications(
        &self,
        user_id: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError>;

    async fn mark_notification_read(
        &self,
        user_id: &UserId,
        notification_id: &str,
    ) -> Result<bool, RepositoryError>;

    async fn unread_notification_count(&self, user_id: &UserId) -> Result<i64, RepositoryError>;
}

/// SQLite implementation
pub struct SqliteMarketRepository {
    pool: DbPool,
}

impl SqliteMarketRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

// --- Row mapping ---

const USER_COLUMNS: &str =
    "id, email, display_name, role, balance, rating_count, rating_total, average_rating, created_at";

const REQUEST_COLUMNS: &str =
    "id, client_id, title, description, budget, status, created_at, updated_at";

const PROPOSAL_COLUMNS: &str = "id, request_id, client_id, designer_id, price, timeline_days, \
     message, stage, created_at, updated_at";

const TRANSACTION_COLUMNS: &str =
    "id, from_user_id, to_user_id, proposal_id, amount, type, status, created_at";

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, title, message, type, related_id, read, created_at";

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = WorkflowError>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: WorkflowError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        email: row.get(1)?,
        display_name: row.get(2)?,
        role: parse_column(row, 3)?,
        balance: row.get(4)?,
        rating_count: row.get(5)?,
        rating_total: row.get(6)?,
        average_rating: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<DesignRequest> {
    Ok(DesignRequest {
        id: RequestId(row.get(0)?),
        client_id: UserId(row.get(1)?),
        title: row.get(2)?,
        description: row.get(3)?,
        budget: row.get(4)?,
        status: parse_column(row, 5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Model files are filled in separately by `load_model_files`.
fn proposal_from_row(row: &Row<'_>) -> rusqlite::Result<DesignProposal> {
    Ok(DesignProposal {
        id: ProposalId(row.get(0)?),
        request_id: RequestId(row.get(1)?),
        client_id: UserId(row.get(2)?),
        designer_id: UserId(row.get(3)?),
        price: row.get(4)?,
        timeline_days: row.get(5)?,
        message: row.get(6)?,
        stage: parse_column(row, 7)?,
        model_files: Vec::new(),
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        from_user_id: row.get::<_, Option<String>>(1)?.map(UserId),
        to_user_id: UserId(row.get(2)?),
        proposal_id: row.get::<_, Option<String>>(3)?.map(ProposalId),
        amount: row.get(4)?,
        kind: parse_column(row, 5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: UserId(row.get(1)?),
        title: row.get(2)?,
        message: row.get(3)?,
        kind: parse_column(row, 4)?,
        related_id: row.get(5)?,
        read: row.get(6)?,
        created_at: row.get(7)?,
    })
}

// --- Connection-level helpers, usable inside a transaction ---

fn load_user(conn: &Connection, id: &UserId) -> Result<Option<User>, RepositoryError> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id.as_str()],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

fn require_user(conn: &Connection, id: &UserId) -> Result<User, RepositoryError> {
    load_user(conn, id)?.ok_or_else(|| RepositoryError::NotFound(format!("user {}", id)))
}

fn load_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, RepositoryError> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
            params![email],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// Check-then-insert; the caller holds the write lock so two registrations
/// for one email cannot both pass the check.
fn insert_user(conn: &Connection, user: &NewUser) -> Result<User, RepositoryError> {
    if user.starting_balance < 0 {
        return Err(WorkflowError::InvalidAmount(user.starting_balance).into());
    }
    if load_user_by_email(conn, &user.email)?.is_some() {
        return Err(RepositoryError::Conflict(format!(
            "email {} already in use",
            user.email
        )));
    }

    let id = UserId::generate();
    conn.execute(
        "INSERT INTO users (id, email, display_name, role, balance, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id.as_str(),
            user.email,
            user.display_name,
            user.role.as_str(),
            user.starting_balance,
            now()
        ],
    )?;

    require_user(conn, &id)
}

fn load_request(conn: &Connection, id: &RequestId) -> Result<Option<DesignRequest>, RepositoryError> {
    let request = conn
        .query_row(
            &format!("SELECT {} FROM design_requests WHERE id = ?1", REQUEST_COLUMNS),
            params![id.as_str()],
            request_from_row,
        )
        .optional()?;
    Ok(request)
}

fn load_model_files(conn: &Connection, id: &ProposalId) -> Result<Vec<String>, RepositoryError> {
    let mut stmt = conn.prepare(
        "SELECT url FROM proposal_model_files WHERE proposal_id = ?1 ORDER BY position",
    )?;
    let files = stmt
        .query_map(params![id.as_str()], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(files)
}

fn load_proposal(
    conn: &Connection,
    id: &ProposalId,
) -> Result<Option<DesignProposal>, RepositoryError> {
    let proposal = conn
        .query_row(
            &format!("SELECT {} FROM design_proposals WHERE id = ?1", PROPOSAL_COLUMNS),
            params![id.as_str()],
            proposal_from_row,
        )
        .optional()?;

    match proposal {
        Some(mut proposal) => {
            proposal.model_files = load_model_files(conn, &proposal.id)?;
            Ok(Some(proposal))
        }
        None => Ok(None),
    }
}

fn require_proposal(conn: &Connection, id: &ProposalId) -> Result<DesignProposal, RepositoryError> {
    load_proposal(conn, id)?.ok_or_else(|| RepositoryError::NotFound(format!("proposal {}", id)))
}

fn load_proposals_where(
    conn: &Connection,
    filter: &str,
    value: &str,
) -> Result<Vec<DesignProposal>, RepositoryError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM design_proposals WHERE {} ORDER BY created_at, id",
        PROPOSAL_COLUMNS, filter
    ))?;
    let mut proposals = stmt
        .query_map(params![value], proposal_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    for proposal in proposals.iter_mut() {
        proposal.model_files = load_model_files(conn, &proposal.id)?;
    }
    Ok(proposals)
}

fn balance_of(conn: &Connection, id: &UserId) -> Result<Amount, RepositoryError> {
    conn.query_row(
        "SELECT balance FROM users WHERE id = ?1",
        params![id.as_str()],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| RepositoryError::NotFound(format!("user {}", id)))
}

fn adjust_balance(conn: &Connection, id: &UserId, delta: Amount) -> Result<(), RepositoryError> {
    let rows = conn.execute(
        "UPDATE users SET balance = balance + ?1 WHERE id = ?2",
        params![delta, id.as_str()],
    )?;
    if rows == 0 {
        return Err(RepositoryError::NotFound(format!("user {}", id)));
    }
    Ok(())
}

/// Move a proposal from `from` to `to`, failing if someone else moved it first.
fn set_stage(
    conn: &Connection,
    id: &ProposalId,
    from: ProposalStage,
    to: ProposalStage,
    at: &str,
) -> Result<(), RepositoryError> {
    let rows = conn.execute(
        "UPDATE design_proposals SET stage = ?1, updated_at = ?2 WHERE id = ?3 AND stage = ?4",
        params![to.as_str(), at, id.as_str(), from.as_str()],
    )?;
    if rows == 0 {
        return Err(RepositoryError::Conflict(format!(
            "proposal {} is no longer {}",
            id, from
        )));
    }
    Ok(())
}

fn has_accepted_proposal(conn: &Connection, request_id: &RequestId) -> Result<bool, RepositoryError> {
    let accepted: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM design_proposals
         WHERE request_id = ?1 AND stage IN ('in_progress', 'completed_by_designer', 'completed')",
        params![request_id.as_str()],
        |row| row.get(0),
    )?;
    Ok(accepted)
}

fn insert_transaction(
    conn: &Connection,
    from: Option<&UserId>,
    to: &UserId,
    proposal: Option<&ProposalId>,
    amount: Amount,
    kind: TransactionKind,
    at: &str,
) -> Result<Transaction, RepositoryError> {
    let transaction = Transaction {
        id: uuid::Uuid::now_v7().to_string(),
        from_user_id: from.cloned(),
        to_user_id: to.clone(),
        proposal_id: proposal.cloned(),
        amount,
        kind,
        status: "completed".to_string(),
        created_at: at.to_string(),
    };

    conn.execute(
        "INSERT INTO transactions (id, from_user_id, to_user_id, proposal_id, amount, type, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            transaction.id,
            transaction.from_user_id.as_ref().map(|u| u.as_str()),
            transaction.to_user_id.as_str(),
            transaction.proposal_id.as_ref().map(|p| p.as_str()),
            transaction.amount,
            transaction.kind.as_str(),
            transaction.status,
            transaction.created_at,
        ],
    )?;

    Ok(transaction)
}

#[async_trait]
impl MarketRepository for SqliteMarketRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let conn = self.pool.get()?;
        db::immediate_transaction(&conn, |conn| insert_user(conn, &user))
    }

    async fn create_account(
        &self,
        user: NewUser,
        session_hours: u64,
    ) -> Result<(User, String), RepositoryError> {
        let conn = self.pool.get()?;

        db::immediate_transaction(&conn, |conn| -> Result<_, RepositoryError> {
            let created = insert_user(conn, &user)?;
            let token = session::insert_session(conn, &created.id, session_hours)?;
            Ok((created, token))
        })
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        load_user(&conn, id)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        load_user_by_email(&conn, email)
    }

    async fn deposit(
        &self,
        user_id: &UserId,
        amount: Amount,
    ) -> Result<(User, Transaction), RepositoryError> {
        if amount <= 0 {
            return Err(WorkflowError::InvalidAmount(amount).into());
        }

        let conn = self.pool.get()?;

        db::immediate_transaction(&conn, |conn| -> Result<_, RepositoryError> {
            adjust_balance(conn, user_id, amount)?;
            let transaction = insert_transaction(
                conn,
                None,
                user_id,
                None,
                amount,
                TransactionKind::Deposit,
                &now(),
            )?;
            let user = require_user(conn, user_id)?;
            Ok((user, transaction))
        })
    }

    async fn create_request(&self, request: NewRequest) -> Result<DesignRequest, RepositoryError> {
        if request.budget < 0 {
            return Err(WorkflowError::InvalidAmount(request.budget).into());
        }

        let conn = self.pool.get()?;

        let id = RequestId::generate();
        let at = now();
        conn.execute(
            "INSERT INTO design_requests (id, client_id, title, description, budget, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?6)",
            params![
                id.as_str(),
                request.client_id.as_str(),
                request.title,
                request.description,
                request.budget,
                at
            ],
        )?;

        load_request(&conn, &id)?
            .ok_or_else(|| RepositoryError::NotFound(format!("request {}", id)))
    }

    async fn get_request(&self, id: &RequestId) -> Result<Option<DesignRequest>, RepositoryError> {
        let conn = self.pool.get()?;
        load_request(&conn, id)
    }

    async fn list_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> Result<Vec<DesignRequest>, RepositoryError> {
        let conn = self.pool.get()?;

        let requests = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM design_requests WHERE status = ?1 ORDER BY created_at DESC, id DESC",
                    REQUEST_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![status.as_str()], request_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM design_requests ORDER BY created_at DESC, id DESC",
                    REQUEST_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], request_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };

        Ok(requests)
    }

    async fn create_proposal(
        &self,
        proposal: NewProposal,
    ) -> Result<DesignProposal, RepositoryError> {
        if proposal.price <= 0 {
            return Err(WorkflowError::InvalidAmount(proposal.price).into());
        }

        let conn = self.pool.get()?;

        db::immediate_transaction(&conn, |conn| -> Result<_, RepositoryError> {
            let request = load_request(conn, &proposal.request_id)?.ok_or_else(|| {
                RepositoryError::NotFound(format!("request {}", proposal.request_id))
            })?;

            if request.status != RequestStatus::Pending {
                return Err(RepositoryError::Conflict(format!(
                    "request {} is already {}",
                    request.id,
                    request.status.as_str()
                )));
            }
            if has_accepted_proposal(conn, &request.id)? {
                return Err(RepositoryError::Conflict(format!(
                    "request {} already has an accepted proposal",
                    request.id
                )));
            }

            let duplicate: bool = conn.query_row(
                "SELECT COUNT(*) > 0 FROM design_proposals WHERE request_id = ?1 AND designer_id = ?2",
                params![request.id.as_str(), proposal.designer_id.as_str()],
                |row| row.get(0),
            )?;
            if duplicate {
                return Err(RepositoryError::Conflict(format!(
                    "designer {} already submitted a proposal for request {}",
                    proposal.designer_id, request.id
                )));
            }

            let id = ProposalId::generate();
            let at = now();
            conn.execute(
                "INSERT INTO design_proposals
                   (id, request_id, client_id, designer_id, price, timeline_days, message, stage, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?8)",
                params![
                    id.as_str(),
                    request.id.as_str(),
                    request.client_id.as_str(),
                    proposal.designer_id.as_str(),
                    proposal.price,
                    proposal.timeline_days,
                    proposal.message,
                    at
                ],
            )?;

            require_proposal(conn, &id)
        })
    }

    async fn get_proposal(
        &self,
        id: &ProposalId,
    ) -> Result<Option<DesignProposal>, RepositoryError> {
        let conn = self.pool.get()?;
        load_proposal(&conn, id)
    }

    async fn list_proposals_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<DesignProposal>, RepositoryError> {
        let conn = self.pool.get()?;
        load_proposals_where(&conn, "request_id = ?1", request_id.as_str())
    }

    async fn list_proposals_for_designer(
        &self,
        designer_id: &UserId,
    ) -> Result<Vec<DesignProposal>, RepositoryError> {
        let conn = self.pool.get()?;
        load_proposals_where(&conn, "designer_id = ?1", designer_id.as_str())
    }

    async fn transition_stage(
        &self,
        id: &ProposalId,
        from: ProposalStage,
        to: ProposalStage,
    ) -> Result<DesignProposal, RepositoryError> {
        from.advance(to)?;

        let conn = self.pool.get()?;

        if let Err(e) = set_stage(&conn, id, from, to, &now()) {
            // Tell a missing row apart from a lost race
            require_proposal(&conn, id)?;
            return Err(e);
        }

        require_proposal(&conn, id)
    }

    async fn accept_proposal(&self, id: &ProposalId) -> Result<AcceptOutcome, RepositoryError> {
        let conn = self.pool.get()?;

        db::immediate_transaction(&conn, |conn| -> Result<_, RepositoryError> {
            let proposal = require_proposal(conn, id)?;
            let next = proposal.stage.accept()?;

            if has_accepted_proposal(conn, &proposal.request_id)? {
                return Err(RepositoryError::Conflict(format!(
                    "request {} already has an accepted proposal",
                    proposal.request_id
                )));
            }

            let at = now();
            set_stage(conn, &proposal.id, proposal.stage, next, &at)?;

            let competing: Vec<ProposalId> = {
                let mut stmt = conn.prepare(
                    "SELECT id FROM design_proposals
                     WHERE request_id = ?1 AND id != ?2 AND stage = 'pending'
                     ORDER BY created_at, id",
                )?;
                let ids = stmt
                    .query_map(
                        params![proposal.request_id.as_str(), proposal.id.as_str()],
                        |row| row.get(0).map(ProposalId),
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                ids
            };

            let mut rejected = Vec::with_capacity(competing.len());
            for other in &competing {
                set_stage(conn, other, ProposalStage::Pending, ProposalStage::Rejected, &at)?;
                rejected.push(require_proposal(conn, other)?);
            }

            Ok(AcceptOutcome {
                accepted: require_proposal(conn, id)?,
                rejected,
            })
        })
    }

    async fn complete_project(
        &self,
        id: &ProposalId,
    ) -> Result<CompletionReceipt, RepositoryError> {
        let conn = self.pool.get()?;

        // ATOMIC TRANSACTION - the stage never advances without the money moving
        db::immediate_transaction(&conn, |conn| -> Result<_, RepositoryError> {
            let proposal = require_proposal(conn, id)?;
            let next = proposal.stage.confirm()?;

            // Read inside the write lock so no concurrent completion can spend
            // the same balance
            let client_balance = balance_of(conn, &proposal.client_id)?;
            check_funds(client_balance, proposal.price)?;

            let at = now();

            // 1. Move the money
            adjust_balance(conn, &proposal.client_id, -proposal.price)?;
            adjust_balance(conn, &proposal.designer_id, proposal.price)?;

            // 2. Audit record
            let transaction = insert_transaction(
                conn,
                Some(&proposal.client_id),
                &proposal.designer_id,
                Some(&proposal.id),
                proposal.price,
                TransactionKind::ProjectPayment,
                &at,
            )?;

            // 3. Close the proposal and its request
            set_stage(conn, &proposal.id, proposal.stage, next, &at)?;
            conn.execute(
                "UPDATE design_requests SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![
                    RequestStatus::Completed.as_str(),
                    at,
                    proposal.request_id.as_str()
                ],
            )?;

            Ok(CompletionReceipt {
                client_balance: balance_of(conn, &proposal.client_id)?,
                designer_balance: balance_of(conn, &proposal.designer_id)?,
                proposal: require_proposal(conn, id)?,
                transaction,
            })
        })
    }

    async fn add_model_file(
        &self,
        id: &ProposalId,
        url: &str,
    ) -> Result<DesignProposal, RepositoryError> {
        let conn = self.pool.get()?;

        db::immediate_transaction(&conn, |conn| -> Result<_, RepositoryError> {
            let proposal = require_proposal(conn, id)?;
            if !proposal.stage.accepts_deliverables() {
                return Err(RepositoryError::Conflict(format!(
                    "proposal {} does not accept model files while {}",
                    id, proposal.stage
                )));
            }

            conn.execute(
                "INSERT INTO proposal_model_files (proposal_id, position, url)
                 VALUES (?1, (SELECT COALESCE(MAX(position) + 1, 0) FROM proposal_model_files WHERE proposal_id = ?1), ?2)",
                params![id.as_str(), url],
            )?;
            conn.execute(
                "UPDATE design_proposals SET updated_at = ?1 WHERE id = ?2",
                params![now(), id.as_str()],
            )?;

            require_proposal(conn, id)
        })
    }

    async fn add_rating(&self, rating: NewRating) -> Result<RatingReceipt, RepositoryError> {
        let conn = self.pool.get()?;

        db::immediate_transaction(&conn, |conn| -> Result<_, RepositoryError> {
            let project = require_proposal(conn, &rating.project_id)?;

            if project.client_id != rating.client_id {
                return Err(RepositoryError::Conflict(format!(
                    "project {} does not belong to client {}",
                    project.id, rating.client_id
                )));
            }
            if project.stage != ProposalStage::Completed {
                return Err(RepositoryError::Conflict(format!(
                    "project {} is {}, only completed projects can be rated",
                    project.id, project.stage
                )));
            }

            let already_rated: bool = conn.query_row(
                "SELECT COUNT(*) > 0 FROM ratings WHERE client_id = ?1 AND project_id = ?2",
                params![rating.client_id.as_str(), project.id.as_str()],
                |row| row.get(0),
            )?;
            if already_rated {
                return Err(RepositoryError::Conflict(format!(
                    "project {} was already rated",
                    project.id
                )));
            }

            let designer = require_user(conn, &project.designer_id)?;
            let aggregate = designer.rating().record(rating.score);

            let record = Rating {
                id: uuid::Uuid::now_v7().to_string(),
                client_id: rating.client_id.clone(),
                designer_id: designer.id.clone(),
                project_id: project.id.clone(),
                rating: rating.score,
                comment: rating.comment.clone(),
                created_at: now(),
            };

            conn.execute(
                "INSERT INTO ratings (id, client_id, designer_id, project_id, rating, comment, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.client_id.as_str(),
                    record.designer_id.as_str(),
                    record.project_id.as_str(),
                    record.rating.value() as i64,
                    record.comment,
                    record.created_at,
                ],
            )?;

            conn.execute(
                "UPDATE users SET rating_count = ?1, rating_total = ?2, average_rating = ?3 WHERE id = ?4",
                params![
                    aggregate.count,
                    aggregate.total,
                    aggregate.average(),
                    designer.id.as_str()
                ],
            )?;

            Ok(RatingReceipt {
                rating: record,
                rating_count: aggregate.count,
                rating_total: aggregate.total,
                average_rating: aggregate.average(),
            })
        })
    }

    async fn list_transactions(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE from_user_id = ?1 OR to_user_id = ?1
             ORDER BY created_at, id",
            TRANSACTION_COLUMNS
        ))?;
        let transactions = stmt
            .query_map(params![user_id.as_str()], transaction_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(transactions)
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, RepositoryError> {
        let conn = self.pool.get()?;

        let record = Notification {
            id: uuid::Uuid::now_v7().to_string(),
            user_id: notification.user_id,
            title: notification.title,
            message: notification.message,
            kind: notification.kind,
            related_id: notification.related_id,
            read: false,
            created_at: now(),
        };

        conn.execute(
            "INSERT INTO notifications (id, user_id, title, message, type, related_id, read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
            params![
                record.id,
                record.user_id.as_str(),
                record.title,
                record.message,
                record.kind.as_str(),
                record.related_id,
                record.created_at,
            ],
        )?;

        Ok(record)
    }

    async fn list_notifications(
        &self,
        user_id: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let conn = self.pool.get()?;

        let filter = if unread_only { "AND read = 0" } else { "" };
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM notifications WHERE user_id = ?1 {} ORDER BY created_at DESC, id DESC",
            NOTIFICATION_COLUMNS, filter
        ))?;
        let notifications = stmt
            .query_map(params![user_id.as_str()], notification_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(notifications)
    }

    async fn mark_notification_read(
        &self,
        user_id: &UserId,
        notification_id: &str,
    ) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;

        let rows = conn.execute(
            "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
            params![notification_id, user_id.as_str()],
        )?;

        Ok(rows > 0)
    }

    async fn unread_notification_count(&self, user_id: &UserId) -> Result<i64, RepositoryError> {
        let conn = self.pool.get()?;

        let count = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read = 0",
            params![user_id.as_str()],
            |row| row.get(0),
        )?;

        Ok(count)
    }
}

/// Type alias for Arc-wrapped repository (for AppState)
pub type DynMarketRepository = Arc<dyn MarketRepository>;
