//! Tally Core - balance-consistent personal finance tracking
//!
//! This crate follows a hexagonal layout:
//!
//! - **domain**: Users, transactions and value types
//! - **ports**: The `Repository` trait every store implements
//! - **services**: Ledger, transactions, statistics, users, doctor, event log
//! - **adapters**: DuckDB and in-memory stores

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use adapters::duckdb::DuckDbRepository;
use adapters::memory::InMemoryRepository;
use config::Config;
use ports::Repository;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{ApiResponse, Error};
pub use domain::{Registration, Transaction, TransactionDraft, TransactionKind, User, YearMonth};

/// Main context for Tally operations
///
/// Wires one repository into every service. All services share the same
/// owner locks so balance writes stay serialized per user.
pub struct TallyContext {
    pub config: Config,
    pub repository: Arc<dyn Repository>,
    pub ledger: Arc<LedgerService>,
    pub transaction_service: TransactionService,
    pub statistics_service: StatisticsService,
    pub user_service: UserService,
    pub doctor_service: DoctorService,
}

impl TallyContext {
    /// Open the database configured for `tally_dir`, creating it if needed
    pub fn new(tally_dir: &Path) -> Result<Self> {
        let config = Config::load(tally_dir)?;
        std::fs::create_dir_all(tally_dir)?;

        let repository = Arc::new(DuckDbRepository::new(&config.database_path(tally_dir))?);
        Ok(Self::with_repository(config, repository)?)
    }

    /// Context backed by a throwaway in-memory store
    pub fn ephemeral() -> Result<Self> {
        Ok(Self::with_repository(
            Config::default(),
            Arc::new(InMemoryRepository::new()),
        )?)
    }

    /// Build the services around any repository
    pub fn with_repository(
        config: Config,
        repository: Arc<dyn Repository>,
    ) -> domain::result::Result<Self> {
        repository.ensure_schema()?;

        let locks = Arc::new(OwnerLocks::new());
        let ledger = Arc::new(LedgerService::new(Arc::clone(&repository), locks));
        let transaction_service = TransactionService::new(Arc::clone(&repository), Arc::clone(&ledger));
        let statistics_service = StatisticsService::new(Arc::clone(&repository));
        let user_service = UserService::new(Arc::clone(&repository));
        let doctor_service = DoctorService::new(Arc::clone(&repository), Arc::clone(&ledger));

        Ok(Self {
            config,
            repository,
            ledger,
            transaction_service,
            statistics_service,
            user_service,
            doctor_service,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use tempfile::tempdir;

    #[test]
    fn test_context_creates_database() {
        let dir = tempdir().unwrap();
        let ctx = TallyContext::new(dir.path()).unwrap();

        assert!(dir.path().join("tally.duckdb").exists());
        assert!(ctx.user_service.list().unwrap().is_empty());
    }

    #[test]
    fn test_ephemeral_context_round_trip() {
        let ctx = TallyContext::ephemeral().unwrap();
        let registered = ctx
            .user_service
            .register(Registration::new("ada@example.com", "pass1", "Ada"))
            .unwrap();
        let owner = registered.user.id;

        ctx.transaction_service
            .create(TransactionDraft::new(
                TransactionKind::Income,
                "salary",
                Decimal::new(100, 0),
                "2024-03-01",
                owner,
            ))
            .unwrap();

        assert_eq!(ctx.ledger.balance(owner).unwrap(), Decimal::new(100, 0));
        assert!(ctx.doctor_service.run_checks().unwrap().is_healthy());
    }
}
