//! Actor-based concurrency for the ledger
//!
//! All mutations are funneled through a single Tokio task:
//! - One logical writer eliminates lost-update races; two concurrent
//!   redemptions against the same account are applied one after the other,
//!   so a check-then-deduct can never interleave.
//! - Multi-row effects (balance update + transaction append + report row)
//!   commit through a RocksDB `WriteBatch` inside one message.
//! - Reads bypass the actor and go straight to storage.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          Callers (report intake, rewards UI)          │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │   check balance → build rows → Storage WriteBatch    │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::config::PointsConfig;
use crate::types::{
    CatalogEntry, CollectedWaste, Notification, RedeemTarget, Report, ReportStatus, RewardAccount,
    Transaction, TransactionKind, User, UserRole, ALL_POINTS_ENTRY_ID,
};
use crate::{storage::IdCounter, Error, Result, Storage};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
pub enum LedgerMessage {
    /// Register a user
    CreateUser {
        email: String,
        name: String,
        role: UserRole,
        response: oneshot::Sender<Result<User>>,
    },

    /// Get or lazily create a reward account
    GetOrCreateAccount {
        user_id: u64,
        response: oneshot::Sender<Result<RewardAccount>>,
    },

    /// Credit points to an account
    Earn {
        user_id: u64,
        kind: TransactionKind,
        amount: i64,
        description: String,
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Spend points on a catalog entry or the whole balance
    Redeem {
        user_id: u64,
        target: RedeemTarget,
        response: oneshot::Sender<Result<RewardAccount>>,
    },

    /// Spend points for a report submission without creating the report
    Consume {
        user_id: u64,
        cost: i64,
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Submit a report, consuming points
    SubmitReport {
        user_id: u64,
        location: String,
        waste_type: String,
        amount: String,
        response: oneshot::Sender<Result<Report>>,
    },

    /// Pending -> Verified
    VerifyReport {
        report_id: u64,
        response: oneshot::Sender<Result<Report>>,
    },

    /// Pending -> Rejected
    RejectReport {
        report_id: u64,
        response: oneshot::Sender<Result<Report>>,
    },

    /// Verified -> Collected, crediting the collector
    CollectReport {
        report_id: u64,
        collector_id: u64,
        points: i64,
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Add a redeemable catalog entry
    AddCatalogEntry {
        name: String,
        point_cost: i64,
        description: String,
        response: oneshot::Sender<Result<CatalogEntry>>,
    },

    /// Show or hide a catalog entry
    SetCatalogAvailability {
        entry_id: u64,
        available: bool,
        response: oneshot::Sender<Result<CatalogEntry>>,
    },

    /// Mark a notification as read
    MarkNotificationRead {
        user_id: u64,
        notification_id: u64,
        response: oneshot::Sender<Result<()>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes ledger messages
pub struct LedgerActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Point policy
    points: PointsConfig,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        points: PointsConfig,
        mailbox: mpsc::Receiver<LedgerMessage>,
    ) -> Self {
        Self {
            storage,
            points,
            mailbox,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Shutdown => break,
                _ => self.handle_message(msg),
            }
        }
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::CreateUser {
                email,
                name,
                role,
                response,
            } => {
                let _ = response.send(self.create_user(email, name, role));
            }

            LedgerMessage::GetOrCreateAccount { user_id, response } => {
                let _ = response.send(self.get_or_create_account(user_id));
            }

            LedgerMessage::Earn {
                user_id,
                kind,
                amount,
                description,
                response,
            } => {
                let _ = response.send(self.earn(user_id, kind, amount, description));
            }

            LedgerMessage::Redeem {
                user_id,
                target,
                response,
            } => {
                let _ = response.send(self.redeem(user_id, target));
            }

            LedgerMessage::Consume {
                user_id,
                cost,
                response,
            } => {
                let _ = response.send(self.consume(user_id, cost));
            }

            LedgerMessage::SubmitReport {
                user_id,
                location,
                waste_type,
                amount,
                response,
            } => {
                let _ = response.send(self.submit_report(user_id, location, waste_type, amount));
            }

            LedgerMessage::VerifyReport {
                report_id,
                response,
            } => {
                let _ = response.send(self.transition_report(report_id, ReportStatus::Verified));
            }

            LedgerMessage::RejectReport {
                report_id,
                response,
            } => {
                let _ = response.send(self.transition_report(report_id, ReportStatus::Rejected));
            }

            LedgerMessage::CollectReport {
                report_id,
                collector_id,
                points,
                response,
            } => {
                let _ = response.send(self.collect_report(report_id, collector_id, points));
            }

            LedgerMessage::AddCatalogEntry {
                name,
                point_cost,
                description,
                response,
            } => {
                let _ = response.send(self.add_catalog_entry(name, point_cost, description));
            }

            LedgerMessage::SetCatalogAvailability {
                entry_id,
                available,
                response,
            } => {
                let _ = response.send(self.set_catalog_availability(entry_id, available));
            }

            LedgerMessage::MarkNotificationRead {
                user_id,
                notification_id,
                response,
            } => {
                let _ = response.send(self.mark_notification_read(user_id, notification_id));
            }

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    // Mutation handlers. These run one at a time on the writer task, so a
    // load-check-store sequence here is race-free by construction.

    fn create_user(&self, email: String, name: String, role: UserRole) -> Result<User> {
        if self.storage.get_user_by_email(&email)?.is_some() {
            return Err(Error::EmailTaken(email));
        }

        let now = Utc::now();
        let user = User {
            id: self.storage.allocate_id(IdCounter::User)?,
            email,
            name,
            role,
            created_at: now,
        };

        // Organizations start with a bonus grant; the grant counts toward
        // balance and lifetime earned but not the leaderboard.
        let seed = if role == UserRole::Organization && self.points.organization_bonus > 0 {
            let mut account = RewardAccount::new(user.id, now);
            account.balance = self.points.organization_bonus;
            account.lifetime_earned = self.points.organization_bonus;

            let txn = Transaction {
                id: self.storage.allocate_id(IdCounter::Transaction)?,
                user_id: user.id,
                kind: TransactionKind::EarnedBonus,
                amount: self.points.organization_bonus,
                description: "Sign-up bonus for organization account".to_string(),
                created_at: now,
            };

            Some((account, txn))
        } else {
            None
        };

        self.storage
            .put_user_atomic(&user, seed.as_ref().map(|(a, t)| (a, t)))?;

        tracing::info!(user_id = user.id, role = %user.role, "User created");

        Ok(user)
    }

    fn get_or_create_account(&self, user_id: u64) -> Result<RewardAccount> {
        if let Some(account) = self.storage.get_account(user_id)? {
            return Ok(account);
        }

        // User must exist before an account can be hung off it
        self.storage.get_user(user_id)?;

        let account = RewardAccount::new(user_id, Utc::now());
        self.storage.put_account(&account)?;

        tracing::debug!(user_id, "Reward account created");

        Ok(account)
    }

    fn earn(
        &self,
        user_id: u64,
        kind: TransactionKind,
        amount: i64,
        description: String,
    ) -> Result<Transaction> {
        if amount <= 0 {
            return Err(Error::InvalidAmount(amount));
        }
        if !kind.is_earning() {
            return Err(Error::InvalidKind(kind.to_string()));
        }

        let mut account = self.get_or_create_account(user_id)?;
        let now = Utc::now();

        account.balance += amount;
        account.lifetime_earned += amount;
        account.updated_at = now;

        let txn = Transaction {
            id: self.storage.allocate_id(IdCounter::Transaction)?,
            user_id,
            kind,
            amount,
            description,
            created_at: now,
        };

        self.storage.apply_account_mutation(&account, &txn, None)?;

        Ok(txn)
    }

    fn redeem(&self, user_id: u64, target: RedeemTarget) -> Result<RewardAccount> {
        let mut account = self
            .storage
            .get_account(user_id)?
            .ok_or(Error::AccountNotFound(user_id))?;

        let (cost, description) = match target {
            RedeemTarget::AllPoints => {
                if account.balance == 0 {
                    // Nothing to redeem; no mutation, no transaction
                    return Ok(account);
                }
                (
                    account.balance,
                    format!("Redeemed all points: {}", account.balance),
                )
            }
            RedeemTarget::CatalogEntry(ALL_POINTS_ENTRY_ID) => {
                // The synthetic id-0 entry means "redeem everything"
                return self.redeem(user_id, RedeemTarget::AllPoints);
            }
            RedeemTarget::CatalogEntry(entry_id) => {
                let entry = self.storage.get_catalog_entry(entry_id)?;
                if !entry.is_available {
                    return Err(Error::CatalogEntryNotFound(entry_id));
                }
                (entry.point_cost, format!("Redeemed: {}", entry.name))
            }
        };

        if account.balance < cost {
            return Err(Error::InsufficientPoints {
                required: cost,
                available: account.balance,
            });
        }

        let now = Utc::now();
        account.balance -= cost;
        account.updated_at = now;

        let txn = Transaction {
            id: self.storage.allocate_id(IdCounter::Transaction)?,
            user_id,
            kind: TransactionKind::Redeemed,
            amount: cost,
            description,
            created_at: now,
        };

        let notification = Notification {
            id: self.storage.allocate_id(IdCounter::Notification)?,
            user_id,
            message: format!("You've redeemed {} points!", cost),
            kind: "reward".to_string(),
            is_read: false,
            created_at: now,
        };

        self.storage
            .apply_account_mutation(&account, &txn, Some(&notification))?;

        Ok(account)
    }

    fn consume(&self, user_id: u64, cost: i64) -> Result<Transaction> {
        if cost <= 0 {
            return Err(Error::InvalidAmount(cost));
        }

        let mut account = self.get_or_create_account(user_id)?;

        if account.balance < cost {
            return Err(Error::InsufficientPoints {
                required: cost,
                available: account.balance,
            });
        }

        let now = Utc::now();
        account.balance -= cost;
        account.updated_at = now;

        let txn = Transaction {
            id: self.storage.allocate_id(IdCounter::Transaction)?,
            user_id,
            kind: TransactionKind::Redeemed,
            amount: cost,
            description: "Consumed points for reporting activity".to_string(),
            created_at: now,
        };

        self.storage.apply_account_mutation(&account, &txn, None)?;

        Ok(txn)
    }

    fn submit_report(
        &self,
        user_id: u64,
        location: String,
        waste_type: String,
        amount: String,
    ) -> Result<Report> {
        let cost = self.points.report_cost;
        let mut account = self.get_or_create_account(user_id)?;

        if account.balance < cost {
            return Err(Error::InsufficientPoints {
                required: cost,
                available: account.balance,
            });
        }

        let now = Utc::now();
        account.balance -= cost;
        account.updated_at = now;

        let report = Report {
            id: self.storage.allocate_id(IdCounter::Report)?,
            user_id,
            location,
            waste_type,
            amount,
            status: ReportStatus::Pending,
            collector_id: None,
            created_at: now,
            updated_at: now,
        };

        let txn = Transaction {
            id: self.storage.allocate_id(IdCounter::Transaction)?,
            user_id,
            kind: TransactionKind::Redeemed,
            amount: cost,
            description: "Consumed points for reporting activity".to_string(),
            created_at: now,
        };

        let notification = Notification {
            id: self.storage.allocate_id(IdCounter::Notification)?,
            user_id,
            message: format!("You've consumed {} points for reporting an activity!", cost),
            kind: "reward".to_string(),
            is_read: false,
            created_at: now,
        };

        self.storage
            .apply_report_submission(&report, &account, &txn, &notification)?;

        Ok(report)
    }

    fn transition_report(&self, report_id: u64, next: ReportStatus) -> Result<Report> {
        let mut report = self.storage.get_report(report_id)?;

        if !report.status.can_transition_to(next) {
            return Err(Error::InvalidTransition(format!(
                "report {} cannot move {} -> {}",
                report_id, report.status, next
            )));
        }

        report.status = next;
        report.updated_at = Utc::now();
        self.storage.put_report(&report)?;

        tracing::info!(report_id, status = %report.status, "Report transitioned");

        Ok(report)
    }

    fn collect_report(
        &self,
        report_id: u64,
        collector_id: u64,
        points: i64,
    ) -> Result<Transaction> {
        if points <= 0 {
            return Err(Error::InvalidAmount(points));
        }

        let mut report = self.storage.get_report(report_id)?;
        if !report.status.can_transition_to(ReportStatus::Collected) {
            return Err(Error::InvalidTransition(format!(
                "report {} cannot move {} -> {}",
                report_id,
                report.status,
                ReportStatus::Collected
            )));
        }

        let mut account = self.get_or_create_account(collector_id)?;
        let now = Utc::now();

        report.status = ReportStatus::Collected;
        report.collector_id = Some(collector_id);
        report.updated_at = now;

        account.balance += points;
        account.lifetime_earned += points;
        account.updated_at = now;

        let collected = CollectedWaste {
            id: self.storage.allocate_id(IdCounter::Collected)?,
            report_id,
            collector_id,
            collected_at: now,
        };

        let txn = Transaction {
            id: self.storage.allocate_id(IdCounter::Transaction)?,
            user_id: collector_id,
            kind: TransactionKind::EarnedCollect,
            amount: points,
            description: "Points earned for collecting waste".to_string(),
            created_at: now,
        };

        let notification = Notification {
            id: self.storage.allocate_id(IdCounter::Notification)?,
            user_id: collector_id,
            message: format!("You've earned {} points for collecting waste!", points),
            kind: "reward".to_string(),
            is_read: false,
            created_at: now,
        };

        self.storage
            .apply_collection(&report, &collected, &account, &txn, Some(&notification))?;

        Ok(txn)
    }

    fn add_catalog_entry(
        &self,
        name: String,
        point_cost: i64,
        description: String,
    ) -> Result<CatalogEntry> {
        if point_cost <= 0 {
            return Err(Error::InvalidAmount(point_cost));
        }

        let entry = CatalogEntry {
            id: self.storage.allocate_id(IdCounter::Catalog)?,
            name,
            point_cost,
            description,
            is_available: true,
        };

        self.storage.put_catalog_entry(&entry)?;

        Ok(entry)
    }

    fn set_catalog_availability(&self, entry_id: u64, available: bool) -> Result<CatalogEntry> {
        let mut entry = self.storage.get_catalog_entry(entry_id)?;
        entry.is_available = available;
        self.storage.put_catalog_entry(&entry)?;
        Ok(entry)
    }

    fn mark_notification_read(&self, user_id: u64, notification_id: u64) -> Result<()> {
        let mut notification = self.storage.get_notification(user_id, notification_id)?;
        notification.is_read = true;
        self.storage.put_notification(&notification)
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Register a user
    pub async fn create_user(&self, email: String, name: String, role: UserRole) -> Result<User> {
        self.request(|response| LedgerMessage::CreateUser {
            email,
            name,
            role,
            response,
        })
        .await
    }

    /// Get or lazily create a reward account
    pub async fn get_or_create_account(&self, user_id: u64) -> Result<RewardAccount> {
        self.request(|response| LedgerMessage::GetOrCreateAccount { user_id, response })
            .await
    }

    /// Credit points
    pub async fn earn(
        &self,
        user_id: u64,
        kind: TransactionKind,
        amount: i64,
        description: String,
    ) -> Result<Transaction> {
        self.request(|response| LedgerMessage::Earn {
            user_id,
            kind,
            amount,
            description,
            response,
        })
        .await
    }

    /// Spend points
    pub async fn redeem(&self, user_id: u64, target: RedeemTarget) -> Result<RewardAccount> {
        self.request(|response| LedgerMessage::Redeem {
            user_id,
            target,
            response,
        })
        .await
    }

    /// Spend points for a report submission
    pub async fn consume(&self, user_id: u64, cost: i64) -> Result<Transaction> {
        self.request(|response| LedgerMessage::Consume {
            user_id,
            cost,
            response,
        })
        .await
    }

    /// Submit a report
    pub async fn submit_report(
        &self,
        user_id: u64,
        location: String,
        waste_type: String,
        amount: String,
    ) -> Result<Report> {
        self.request(|response| LedgerMessage::SubmitReport {
            user_id,
            location,
            waste_type,
            amount,
            response,
        })
        .await
    }

    /// Pending -> Verified
    pub async fn verify_report(&self, report_id: u64) -> Result<Report> {
        self.request(|response| LedgerMessage::VerifyReport {
            report_id,
            response,
        })
        .await
    }

    /// Pending -> Rejected
    pub async fn reject_report(&self, report_id: u64) -> Result<Report> {
        self.request(|response| LedgerMessage::RejectReport {
            report_id,
            response,
        })
        .await
    }

    /// Verified -> Collected, crediting the collector
    pub async fn collect_report(
        &self,
        report_id: u64,
        collector_id: u64,
        points: i64,
    ) -> Result<Transaction> {
        self.request(|response| LedgerMessage::CollectReport {
            report_id,
            collector_id,
            points,
            response,
        })
        .await
    }

    /// Add a catalog entry
    pub async fn add_catalog_entry(
        &self,
        name: String,
        point_cost: i64,
        description: String,
    ) -> Result<CatalogEntry> {
        self.request(|response| LedgerMessage::AddCatalogEntry {
            name,
            point_cost,
            description,
            response,
        })
        .await
    }

    /// Show or hide a catalog entry
    pub async fn set_catalog_availability(
        &self,
        entry_id: u64,
        available: bool,
    ) -> Result<CatalogEntry> {
        self.request(|response| LedgerMessage::SetCatalogAvailability {
            entry_id,
            available,
            response,
        })
        .await
    }

    /// Mark a notification read
    pub async fn mark_notification_read(&self, user_id: u64, notification_id: u64) -> Result<()> {
        self.request(|response| LedgerMessage::MarkNotificationRead {
            user_id,
            notification_id,
            response,
        })
        .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(storage: Arc<Storage>, points: PointsConfig) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(1000); // Bounded channel for backpressure
    let actor = LedgerActor::new(storage, points, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    fn test_setup() -> (Arc<Storage>, PointsConfig, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let storage = Arc::new(Storage::open(&config).unwrap());
        (storage, config.points, temp_dir)
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (storage, points, _temp) = test_setup();
        let handle = spawn_ledger_actor(storage, points);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_earn_and_account() {
        let (storage, points, _temp) = test_setup();
        let handle = spawn_ledger_actor(storage, points);

        let user = handle
            .create_user("v@example.org".into(), "Vol".into(), UserRole::Volunteer)
            .await
            .unwrap();

        let txn = handle
            .earn(user.id, TransactionKind::EarnedCollect, 30, "collect".into())
            .await
            .unwrap();
        assert_eq!(txn.amount, 30);

        let account = handle.get_or_create_account(user.id).await.unwrap();
        assert_eq!(account.balance, 30);
        assert_eq!(account.lifetime_earned, 30);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_rejects_earn_with_redeemed_kind() {
        let (storage, points, _temp) = test_setup();
        let handle = spawn_ledger_actor(storage, points);

        let user = handle
            .create_user("v@example.org".into(), "Vol".into(), UserRole::Volunteer)
            .await
            .unwrap();

        let result = handle
            .earn(user.id, TransactionKind::Redeemed, 10, "bad".into())
            .await;
        assert!(matches!(result, Err(Error::InvalidKind(_))));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_duplicate_email_rejected() {
        let (storage, points, _temp) = test_setup();
        let handle = spawn_ledger_actor(storage, points);

        handle
            .create_user("v@example.org".into(), "Vol".into(), UserRole::Volunteer)
            .await
            .unwrap();

        let result = handle
            .create_user("v@example.org".into(), "Other".into(), UserRole::Volunteer)
            .await;
        assert!(matches!(result, Err(Error::EmailTaken(_))));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_organization_bonus() {
        let (storage, points, _temp) = test_setup();
        let bonus = points.organization_bonus;
        let handle = spawn_ledger_actor(storage, points);

        let org = handle
            .create_user("org@example.org".into(), "Org".into(), UserRole::Organization)
            .await
            .unwrap();

        let account = handle.get_or_create_account(org.id).await.unwrap();
        assert_eq!(account.balance, bonus);
        assert_eq!(account.lifetime_earned, bonus);

        handle.shutdown().await.unwrap();
    }
}
