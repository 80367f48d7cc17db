//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `ledger_users_total` - Total users registered
//! - `ledger_transactions_total{kind}` - Point transactions by kind
//! - `ledger_insufficient_points_total` - Rejected spends
//! - `ledger_reports_total` - Reports submitted

use crate::types::TransactionKind;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Total users registered
    pub users_total: IntCounter,

    /// Transactions by kind
    pub transactions_total: IntCounterVec,

    /// Spends rejected for insufficient balance
    pub insufficient_points_total: IntCounter,

    /// Reports submitted
    pub reports_total: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let users_total =
            IntCounter::with_opts(Opts::new("ledger_users_total", "Total users registered"))?;
        registry.register(Box::new(users_total.clone()))?;

        let transactions_total = IntCounterVec::new(
            Opts::new("ledger_transactions_total", "Point transactions by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(transactions_total.clone()))?;

        let insufficient_points_total = IntCounter::with_opts(Opts::new(
            "ledger_insufficient_points_total",
            "Spends rejected for insufficient balance",
        ))?;
        registry.register(Box::new(insufficient_points_total.clone()))?;

        let reports_total =
            IntCounter::with_opts(Opts::new("ledger_reports_total", "Reports submitted"))?;
        registry.register(Box::new(reports_total.clone()))?;

        Ok(Self {
            users_total,
            transactions_total,
            insufficient_points_total,
            reports_total,
            registry,
        })
    }

    /// Record a user registration
    pub fn record_user_created(&self) {
        self.users_total.inc();
    }

    /// Record an applied transaction
    pub fn record_transaction(&self, kind: TransactionKind) {
        self.transactions_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    /// Record a spend rejected for insufficient balance
    pub fn record_insufficient_points(&self) {
        self.insufficient_points_total.inc();
    }

    /// Record a report submission
    pub fn record_report_submitted(&self) {
        self.reports_total.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
