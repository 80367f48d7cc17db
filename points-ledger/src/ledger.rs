//! Main ledger orchestration layer
//!
//! This module ties together storage, the single-writer actor and metrics
//! into a high-level API for point accounting.
//!
//! # Example
//!
//! ```no_run
//! use points_ledger::{Config, Ledger};
//! use points_ledger::types::UserRole;
//!
//! #[tokio::main]
//! async fn main() -> points_ledger::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config).await?;
//!
//!     let user = ledger
//!         .create_user("vol@example.org", "Sam", UserRole::Volunteer)
//!         .await?;
//!     let balance = ledger.balance_of(user.id)?;
//!     assert_eq!(balance, 0);
//!
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    metrics::Metrics,
    types::{
        CatalogEntry, CollectedWaste, ImpactStats, LeaderboardEntry, Notification, RedeemTarget,
        Report, ReportStatus, RewardAccount, Transaction, TransactionKind, User, UserRole,
        ALL_POINTS_ENTRY_ID, LEVEL_DIVISOR,
    },
    Config, Error, Result, Storage,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Main ledger interface
///
/// Mutations go through the actor handle; reads hit storage directly so
/// balances and leaderboards always reflect committed state.
pub struct Ledger {
    /// Actor handle for mutations
    handle: LedgerHandle,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Prometheus metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    pub async fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let handle = spawn_ledger_actor(storage.clone(), config.points.clone());

        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;

        Ok(Self {
            handle,
            storage,
            metrics,
            config,
        })
    }

    /// Metrics registry for scraping
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    // User operations

    /// Register a user. Organization accounts are seeded with a sign-up
    /// bonus per `PointsConfig`.
    pub async fn create_user(
        &self,
        email: impl Into<String>,
        name: impl Into<String>,
        role: UserRole,
    ) -> Result<User> {
        let user = self
            .handle
            .create_user(email.into(), name.into(), role)
            .await?;
        self.metrics.record_user_created();
        Ok(user)
    }

    /// Get user by id
    pub fn get_user(&self, user_id: u64) -> Result<User> {
        self.storage.get_user(user_id)
    }

    /// Look up a user by email
    pub fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.storage.get_user_by_email(email)
    }

    // Account operations

    /// Get or lazily create the reward account for a user. Idempotent.
    pub async fn get_or_create_account(&self, user_id: u64) -> Result<RewardAccount> {
        self.handle.get_or_create_account(user_id).await
    }

    /// Credit points to a user's account
    ///
    /// `kind` must be an earning kind and `amount` positive. The balance
    /// update and the transaction append commit atomically.
    pub async fn earn(
        &self,
        user_id: u64,
        kind: TransactionKind,
        amount: i64,
        description: impl Into<String>,
    ) -> Result<Transaction> {
        let txn = self
            .handle
            .earn(user_id, kind, amount, description.into())
            .await?;
        self.metrics.record_transaction(txn.kind);
        Ok(txn)
    }

    /// Redeem points against a catalog entry or the entire balance
    ///
    /// Fails with [`Error::InsufficientPoints`] when the balance is below
    /// the entry cost; no mutation happens in that case.
    pub async fn redeem(&self, user_id: u64, target: RedeemTarget) -> Result<RewardAccount> {
        let result = self.handle.redeem(user_id, target).await;
        match &result {
            Ok(_) => self.metrics.record_transaction(TransactionKind::Redeemed),
            Err(Error::InsufficientPoints { .. }) => self.metrics.record_insufficient_points(),
            Err(_) => {}
        }
        result
    }

    /// Spend the report-submission cost without creating a report row.
    ///
    /// Reporting *spends* points while collecting earns them; the
    /// asymmetry is intentional product policy.
    pub async fn consume_for_report(&self, user_id: u64) -> Result<Transaction> {
        let result = self
            .handle
            .consume(user_id, self.config.points.report_cost)
            .await;
        match &result {
            Ok(txn) => self.metrics.record_transaction(txn.kind),
            Err(Error::InsufficientPoints { .. }) => self.metrics.record_insufficient_points(),
            Err(_) => {}
        }
        result
    }

    /// Current balance for a user; 0 when no account exists yet
    pub fn balance_of(&self, user_id: u64) -> Result<i64> {
        Ok(self
            .storage
            .get_account(user_id)?
            .map(|a| a.balance)
            .unwrap_or(0))
    }

    /// Recompute the balance by folding the user's transactions
    ///
    /// Must always agree with [`Ledger::balance_of`]; the test suite
    /// checks this invariant.
    pub fn recompute_balance(&self, user_id: u64) -> Result<i64> {
        let folded = self
            .storage
            .user_transactions(user_id)?
            .iter()
            .map(Transaction::signed_amount)
            .sum::<i64>();
        Ok(folded.max(0))
    }

    /// Transaction history for a user, newest first
    pub fn transactions_of(&self, user_id: u64, limit: usize) -> Result<Vec<Transaction>> {
        let mut txns = self.storage.user_transactions(user_id)?;
        txns.reverse();
        txns.truncate(limit);
        Ok(txns)
    }

    // Leaderboard and catalog

    /// Ranked lifetime earnings across all users
    ///
    /// Only report and collection earnings count; bonus grants and
    /// redemptions are excluded. Sorted descending by total with ties
    /// broken by ascending user id, so the ordering is deterministic.
    pub fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        let mut totals: HashMap<u64, i64> = HashMap::new();
        for txn in self.storage.all_transactions()? {
            if txn.kind.counts_for_leaderboard() {
                *totals.entry(txn.user_id).or_insert(0) += txn.amount;
            }
        }

        let names: HashMap<u64, String> = self
            .storage
            .users()?
            .into_iter()
            .map(|u| (u.id, u.name))
            .collect();

        let mut entries: Vec<LeaderboardEntry> = totals
            .into_iter()
            .map(|(user_id, total_earned)| LeaderboardEntry {
                user_id,
                user_name: names
                    .get(&user_id)
                    .cloned()
                    .unwrap_or_else(|| "Unknown User".to_string()),
                total_earned,
                level: total_earned / LEVEL_DIVISOR,
            })
            .collect();

        entries.sort_by(|a, b| {
            b.total_earned
                .cmp(&a.total_earned)
                .then(a.user_id.cmp(&b.user_id))
        });

        Ok(entries)
    }

    /// Available catalog entries, prefixed by the synthetic "redeem all
    /// current points" entry whose cost is the caller's live balance.
    pub fn catalog(&self, user_id: u64) -> Result<Vec<CatalogEntry>> {
        let balance = self.balance_of(user_id)?;

        let mut entries = vec![CatalogEntry {
            id: ALL_POINTS_ENTRY_ID,
            name: "Your Points".to_string(),
            point_cost: balance,
            description: "Redeem your earned points".to_string(),
            is_available: true,
        }];

        entries.extend(
            self.storage
                .catalog_entries()?
                .into_iter()
                .filter(|e| e.is_available),
        );

        Ok(entries)
    }

    /// Add a redeemable catalog entry
    pub async fn add_catalog_entry(
        &self,
        name: impl Into<String>,
        point_cost: i64,
        description: impl Into<String>,
    ) -> Result<CatalogEntry> {
        self.handle
            .add_catalog_entry(name.into(), point_cost, description.into())
            .await
    }

    /// Show or hide a catalog entry
    pub async fn set_catalog_availability(
        &self,
        entry_id: u64,
        available: bool,
    ) -> Result<CatalogEntry> {
        self.handle
            .set_catalog_availability(entry_id, available)
            .await
    }

    // Report lifecycle

    /// Submit a waste report, consuming the configured point cost
    pub async fn submit_report(
        &self,
        user_id: u64,
        location: impl Into<String>,
        waste_type: impl Into<String>,
        amount: impl Into<String>,
    ) -> Result<Report> {
        let result = self
            .handle
            .submit_report(user_id, location.into(), waste_type.into(), amount.into())
            .await;
        match &result {
            Ok(_) => {
                self.metrics.record_report_submitted();
                self.metrics.record_transaction(TransactionKind::Redeemed);
            }
            Err(Error::InsufficientPoints { .. }) => self.metrics.record_insufficient_points(),
            Err(_) => {}
        }
        result
    }

    /// Verify a pending report
    pub async fn verify_report(&self, report_id: u64) -> Result<Report> {
        self.handle.verify_report(report_id).await
    }

    /// Reject a pending report (terminal)
    pub async fn reject_report(&self, report_id: u64) -> Result<Report> {
        self.handle.reject_report(report_id).await
    }

    /// Mark a verified report collected, crediting `points` to the
    /// collector atomically with the status change.
    pub async fn collect_report(
        &self,
        report_id: u64,
        collector_id: u64,
        points: i64,
    ) -> Result<Transaction> {
        let txn = self
            .handle
            .collect_report(report_id, collector_id, points)
            .await?;
        self.metrics.record_transaction(txn.kind);
        Ok(txn)
    }

    /// Get a report by id
    pub fn get_report(&self, report_id: u64) -> Result<Report> {
        self.storage.get_report(report_id)
    }

    /// Reports submitted by a user
    pub fn reports_of(&self, user_id: u64) -> Result<Vec<Report>> {
        Ok(self
            .storage
            .reports()?
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .collect())
    }

    /// Reports awaiting verification
    pub fn pending_reports(&self) -> Result<Vec<Report>> {
        Ok(self
            .storage
            .reports()?
            .into_iter()
            .filter(|r| r.status == ReportStatus::Pending)
            .collect())
    }

    /// Most recent reports, newest first
    pub fn recent_reports(&self, limit: usize) -> Result<Vec<Report>> {
        let mut reports = self.storage.reports()?;
        reports.reverse();
        reports.truncate(limit);
        Ok(reports)
    }

    /// Collection records for a collector
    pub fn collected_by(&self, collector_id: u64) -> Result<Vec<CollectedWaste>> {
        Ok(self
            .storage
            .collected_wastes()?
            .into_iter()
            .filter(|c| c.collector_id == collector_id)
            .collect())
    }

    // Notifications

    /// Unread notifications for a user, in append order
    pub fn unread_notifications(&self, user_id: u64) -> Result<Vec<Notification>> {
        Ok(self
            .storage
            .user_notifications(user_id)?
            .into_iter()
            .filter(|n| !n.is_read)
            .collect())
    }

    /// Mark a notification as read
    pub async fn mark_notification_read(&self, user_id: u64, notification_id: u64) -> Result<()> {
        self.handle
            .mark_notification_read(user_id, notification_id)
            .await
    }

    // Aggregates

    /// Platform-wide impact aggregates for the home page
    pub fn impact_stats(&self) -> Result<ImpactStats> {
        let total_points_earned = self
            .storage
            .all_transactions()?
            .iter()
            .filter(|t| t.kind.counts_for_leaderboard())
            .map(|t| t.amount)
            .sum();

        let mut volunteers_engaged = 0u64;
        let mut organizations_engaged = 0u64;
        for user in self.storage.users()? {
            match user.role {
                UserRole::Volunteer => volunteers_engaged += 1,
                UserRole::Organization => organizations_engaged += 1,
            }
        }

        Ok(ImpactStats {
            total_points_earned,
            volunteers_engaged,
            organizations_engaged,
            reports_submitted: self.storage.reports()?.len() as u64,
        })
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}
