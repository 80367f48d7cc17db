//! GreenLoop Points Ledger
//!
//! Point accounting for a volunteer waste-collection platform: accounts,
//! earn/redeem operations, leaderboards and the report lifecycle that
//! drives point flow.
//!
//! # Architecture
//!
//! - **Single Writer**: All mutations serialize through one actor task,
//!   so check-then-deduct sequences cannot interleave
//! - **Append-Only Transactions**: Every balance change pairs with an
//!   immutable transaction record; the balance can always be recomputed
//!   from the transaction log
//! - **Atomic Batches**: Multi-row effects commit through one RocksDB
//!   write batch
//!
//! # Invariants
//!
//! - Balances never go negative
//! - Stored balance equals the fold over the transaction log
//! - Membership level derives from lifetime earnings and never decreases

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use storage::Storage;
pub use types::{
    CatalogEntry, ImpactStats, LeaderboardEntry, Notification, RedeemTarget, Report, ReportStatus,
    RewardAccount, Transaction, TransactionKind, User, UserRole,
};
