//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod doctor;
pub mod ledger;
pub mod locks;
pub mod logging;
pub mod migration;
mod statistics;
mod transaction;
mod user;

pub use doctor::{CheckResult, DoctorResult, DoctorService, DoctorSummary};
pub use ledger::{DeletionReceipt, LedgerService, Reconciliation, TransactionReceipt};
pub use locks::OwnerLocks;
pub use logging::{CommandStats, EntryPoint, LogEntry, LogEvent, LogQuery, LogStats, LoggingService};
pub use migration::{MigrationResult, MigrationService, MigrationSet};
pub use statistics::{summarize_month, MonthlyStatistics, StatisticsService};
pub use transaction::TransactionService;
pub use user::{RegisteredUser, UserService};
