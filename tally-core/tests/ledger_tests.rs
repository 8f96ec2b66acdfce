//! Balance consistency tests for tally-core
//!
//! Every scenario runs against both stores: the in-memory adapter and a real
//! DuckDB file in a temp directory. Store failures are injected with a
//! wrapper repository.
//!
//! Run with: cargo test --test ledger_tests -- --nocapture

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use tempfile::TempDir;
use uuid::Uuid;

use tally_core::adapters::duckdb::DuckDbRepository;
use tally_core::adapters::memory::InMemoryRepository;
use tally_core::config::Config;
use tally_core::domain::result::Result;
use tally_core::ports::Repository;
use tally_core::services::ledger::expected_balance;
use tally_core::services::{DeletionReceipt, TransactionReceipt};
use tally_core::{
    ApiResponse, Error, Registration, TallyContext, Transaction, TransactionDraft,
    TransactionKind, User, YearMonth,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn dec(value: i64) -> Decimal {
    Decimal::new(value, 0)
}

/// One context per store kind. The TempDir must outlive the context.
fn contexts() -> Vec<(&'static str, TallyContext, Option<TempDir>)> {
    let memory = TallyContext::with_repository(Config::default(), Arc::new(InMemoryRepository::new()))
        .expect("in-memory context");

    let dir = TempDir::new().unwrap();
    let repo = DuckDbRepository::new(&dir.path().join("test.duckdb")).expect("open duckdb");
    let duck = TallyContext::with_repository(Config::default(), Arc::new(repo)).expect("duckdb context");

    vec![("memory", memory, None), ("duckdb", duck, Some(dir))]
}

fn register(ctx: &TallyContext, email: &str) -> Uuid {
    ctx.user_service
        .register(Registration::new(email, "pass1", "Ada"))
        .expect("register")
        .user
        .id
}

fn draft(owner: Uuid, kind: TransactionKind, amount: Decimal, date: &str) -> TransactionDraft {
    TransactionDraft::new(kind, "misc", amount, date, owner)
}

fn assert_consistent(ctx: &TallyContext, owner: Uuid) {
    let stored = ctx.ledger.balance(owner).unwrap();
    let surviving = ctx.transaction_service.find_all_by_owner(owner).unwrap();
    assert_eq!(stored, expected_balance(&surviving).unwrap(), "balance drifted from records");
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_month_scenario() {
    for (store, ctx, _dir) in contexts() {
        let owner = register(&ctx, "ada@example.com");

        let income = ctx
            .transaction_service
            .create(draft(owner, TransactionKind::Income, dec(100), "2024-03-01"))
            .unwrap();
        assert_eq!(income.user_balance, dec(100), "{store}");

        let expense = ctx
            .transaction_service
            .create(draft(owner, TransactionKind::Expense, dec(40), "2024-03-15"))
            .unwrap();
        assert_eq!(expense.user_balance, dec(60), "{store}");

        let march: YearMonth = "2024-03".parse().unwrap();
        let stats = ctx.statistics_service.statistics_for_month(owner, &march).unwrap();
        assert_eq!(stats.total_income, dec(100), "{store}");
        assert_eq!(stats.total_expense, dec(40), "{store}");
        assert_eq!(stats.transactions.len(), 2, "{store}");

        let removed = ctx.transaction_service.delete(expense.data.id).unwrap();
        assert_eq!(removed.id, expense.data.id);
        assert_eq!(removed.user_balance, dec(100), "{store}");

        let updated = ctx
            .transaction_service
            .replace(
                income.data.id,
                draft(owner, TransactionKind::Income, dec(150), "2024-03-01"),
            )
            .unwrap();
        assert_eq!(updated.user_balance, dec(150), "{store}");
        assert_eq!(ctx.ledger.balance(owner).unwrap(), dec(150), "{store}");
        assert_consistent(&ctx, owner);
    }
}

#[test]
fn test_empty_month_statistics() {
    for (store, ctx, _dir) in contexts() {
        let owner = register(&ctx, "ada@example.com");
        ctx.transaction_service
            .create(draft(owner, TransactionKind::Income, dec(5), "2024-03-01"))
            .unwrap();

        let april: YearMonth = "2024-04".parse().unwrap();
        let stats = ctx.statistics_service.statistics_for_month(owner, &april).unwrap();
        assert!(stats.transactions.is_empty(), "{store}");
        assert_eq!(stats.total_income, Decimal::ZERO, "{store}");
        assert_eq!(stats.total_expense, Decimal::ZERO, "{store}");
    }
}

#[test]
fn test_create_then_delete_restores_balance() {
    for (store, ctx, _dir) in contexts() {
        let owner = register(&ctx, "ada@example.com");
        ctx.transaction_service
            .create(draft(owner, TransactionKind::Income, Decimal::new(1234, 2), "2024-01-01"))
            .unwrap();
        let before = ctx.ledger.balance(owner).unwrap();

        for kind in [TransactionKind::Income, TransactionKind::Expense] {
            let created = ctx
                .transaction_service
                .create(draft(owner, kind, Decimal::new(9999, 2), "2024-01-02"))
                .unwrap();
            ctx.transaction_service.delete(created.data.id).unwrap();
            assert_eq!(ctx.ledger.balance(owner).unwrap(), before, "{store} {kind}");
        }
    }
}

#[test]
fn test_type_change_moves_balance_by_twice_the_amount() {
    for (store, ctx, _dir) in contexts() {
        let owner = register(&ctx, "ada@example.com");
        let created = ctx
            .transaction_service
            .create(draft(owner, TransactionKind::Income, dec(100), "2024-03-01"))
            .unwrap();

        let flipped = ctx
            .transaction_service
            .replace(
                created.data.id,
                draft(owner, TransactionKind::Expense, dec(100), "2024-03-01"),
            )
            .unwrap();

        assert_eq!(flipped.user_balance, dec(-100), "{store}");
        assert_eq!(flipped.data.kind, TransactionKind::Expense);
        assert_consistent(&ctx, owner);
    }
}

#[test]
fn test_oversized_amounts_are_validation_errors() {
    let too_large = Decimal::new(100_000_000_000_000_000, 0);
    let near_limit = Decimal::new(999_999_999_999_999_999, 2);

    for (store, ctx, _dir) in contexts() {
        let owner = register(&ctx, "ada@example.com");

        for amount in [too_large, Decimal::MAX] {
            let err = ctx
                .transaction_service
                .create(draft(owner, TransactionKind::Income, amount, "2024-03-01"))
                .unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{store}: {err}");
            assert_eq!(ApiResponse::<()>::fail(&err).code, 400, "{store}");
        }

        // A valid amount that would push the balance past what the store holds
        let kept = ctx
            .transaction_service
            .create(draft(owner, TransactionKind::Income, near_limit, "2024-03-01"))
            .unwrap();
        let err = ctx
            .transaction_service
            .create(draft(owner, TransactionKind::Income, dec(1), "2024-03-02"))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{store}: {err}");

        let err = ctx
            .transaction_service
            .replace(kept.data.id, draft(owner, TransactionKind::Income, too_large, "2024-03-01"))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{store}: {err}");

        let surviving = ctx.transaction_service.find_all_by_owner(owner).unwrap();
        assert_eq!(surviving, vec![kept.data.clone()], "{store}");
        assert_eq!(ctx.ledger.balance(owner).unwrap(), near_limit, "{store}");
        assert_consistent(&ctx, owner);
    }
}

#[test]
fn test_replace_drops_unsupplied_fields() {
    for (store, ctx, _dir) in contexts() {
        let owner = register(&ctx, "ada@example.com");
        let created = ctx
            .transaction_service
            .create(draft(owner, TransactionKind::Expense, dec(12), "2024-03-01").with_comment("lunch"))
            .unwrap();

        ctx.transaction_service
            .replace(created.data.id, draft(owner, TransactionKind::Expense, dec(12), "2024-03-02"))
            .unwrap();

        let stored = ctx.transaction_service.find_by_id(created.data.id).unwrap();
        assert_eq!(stored.comment, None, "{store}");
        assert_eq!(stored.date, "2024-03-02", "{store}");
    }
}

#[test]
fn test_random_sequences_keep_invariant() {
    for (store, ctx, _dir) in contexts() {
        let owner = register(&ctx, "ada@example.com");
        let mut live: Vec<Uuid> = Vec::new();
        // Deterministic LCG so failures reproduce
        let mut seed: u64 = 0x5eed_1234;
        let mut next = move |bound: u64| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) % bound
        };

        for step in 0..60 {
            let kind = if next(2) == 0 { TransactionKind::Income } else { TransactionKind::Expense };
            let amount = Decimal::new(next(100_000) as i64, 2);

            let op = if live.is_empty() { 0 } else { next(3) };
            match op {
                0 => {
                    let created = ctx
                        .transaction_service
                        .create(draft(owner, kind, amount, "2024-03-01"))
                        .unwrap();
                    live.push(created.data.id);
                }
                1 => {
                    let id = live[next(live.len() as u64) as usize];
                    ctx.transaction_service
                        .replace(id, draft(owner, kind, amount, "2024-03-02"))
                        .unwrap();
                }
                _ => {
                    let id = live.remove(next(live.len() as u64) as usize);
                    ctx.transaction_service.delete(id).unwrap();
                }
            }

            let surviving = ctx.transaction_service.find_all_by_owner(owner).unwrap();
            assert_eq!(surviving.len(), live.len(), "{store} step {step}");
            assert_eq!(
                ctx.ledger.balance(owner).unwrap(),
                expected_balance(&surviving).unwrap(),
                "{store} step {step}"
            );
        }
    }
}

#[test]
fn test_reassigned_transaction_moves_between_users() {
    for (store, ctx, _dir) in contexts() {
        let ada = register(&ctx, "ada@example.com");
        let eve = register(&ctx, "eve@example.com");

        let created = ctx
            .transaction_service
            .create(draft(ada, TransactionKind::Expense, dec(30), "2024-03-01"))
            .unwrap();
        let moved = ctx
            .transaction_service
            .replace(created.data.id, draft(eve, TransactionKind::Income, dec(50), "2024-03-01"))
            .unwrap();

        assert_eq!(moved.user_balance, dec(50), "{store}");
        assert_eq!(ctx.ledger.balance(ada).unwrap(), Decimal::ZERO, "{store}");
        assert_consistent(&ctx, ada);
        assert_consistent(&ctx, eve);
    }
}

#[test]
fn test_missing_records_map_to_not_found_responses() {
    for (store, ctx, _dir) in contexts() {
        let owner = register(&ctx, "ada@example.com");

        let response: ApiResponse<DeletionReceipt> =
            ctx.transaction_service.delete(Uuid::new_v4()).into();
        assert_eq!(response.code, 404, "{store}");
        assert_eq!(response.message.as_deref(), Some("Transaction not found"));

        let response: ApiResponse<Vec<Transaction>> =
            ctx.transaction_service.list_for_user(Uuid::new_v4()).into();
        assert_eq!(response.code, 404, "{store}");

        let response: ApiResponse<TransactionReceipt> = ctx
            .transaction_service
            .create(draft(Uuid::new_v4(), TransactionKind::Income, dec(1), "2024-03-01"))
            .into();
        assert_eq!(response.code, 404, "{store}");
        assert_eq!(ctx.ledger.balance(owner).unwrap(), Decimal::ZERO);
    }
}

// ============================================================================
// Store failures
// ============================================================================

/// Delegates to an in-memory store and fails on demand
///
/// Each write pops the next scripted outcome; an empty script means success.
struct FlakyRepository {
    inner: InMemoryRepository,
    balance_writes: Mutex<VecDeque<bool>>,
    record_writes: Mutex<VecDeque<bool>>,
}

impl FlakyRepository {
    fn new() -> Self {
        Self {
            inner: InMemoryRepository::new(),
            balance_writes: Mutex::new(VecDeque::new()),
            record_writes: Mutex::new(VecDeque::new()),
        }
    }

    fn script_balance_writes(&self, outcomes: &[bool]) {
        *self.balance_writes.lock().unwrap() = outcomes.iter().copied().collect();
    }

    fn script_record_writes(&self, outcomes: &[bool]) {
        *self.record_writes.lock().unwrap() = outcomes.iter().copied().collect();
    }

    fn heal(&self) {
        self.script_balance_writes(&[]);
        self.script_record_writes(&[]);
    }

    fn next_outcome(script: &Mutex<VecDeque<bool>>, what: &str) -> Result<()> {
        match script.lock().unwrap().pop_front() {
            Some(false) => Err(Error::database(format!("injected {what} failure"))),
            _ => Ok(()),
        }
    }
}

const FAIL_ALWAYS: [bool; 16] = [false; 16];

impl Repository for FlakyRepository {
    fn ensure_schema(&self) -> Result<()> {
        self.inner.ensure_schema()
    }
    fn insert_user(&self, user: &User) -> Result<()> {
        self.inner.insert_user(user)
    }
    fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.inner.get_user_by_id(id)
    }
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.inner.get_user_by_email(email)
    }
    fn get_user_by_verification_token(&self, token: &str) -> Result<Option<User>> {
        self.inner.get_user_by_verification_token(token)
    }
    fn get_user_by_token(&self, token: &str) -> Result<Option<User>> {
        self.inner.get_user_by_token(token)
    }
    fn list_users(&self) -> Result<Vec<User>> {
        self.inner.list_users()
    }
    fn mark_verified(&self, id: Uuid) -> Result<bool> {
        self.inner.mark_verified(id)
    }
    fn set_user_token(&self, id: Uuid, token: Option<&str>) -> Result<bool> {
        self.inner.set_user_token(id, token)
    }
    fn get_user_balance(&self, id: Uuid) -> Result<Option<Decimal>> {
        self.inner.get_user_balance(id)
    }
    fn set_user_balance(&self, id: Uuid, balance: Decimal) -> Result<bool> {
        Self::next_outcome(&self.balance_writes, "balance write")?;
        self.inner.set_user_balance(id, balance)
    }
    fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
        Self::next_outcome(&self.record_writes, "insert")?;
        self.inner.insert_transaction(tx)
    }
    fn get_transaction_by_id(&self, id: Uuid) -> Result<Option<Transaction>> {
        self.inner.get_transaction_by_id(id)
    }
    fn get_transactions_by_owner(&self, owner: Uuid) -> Result<Vec<Transaction>> {
        self.inner.get_transactions_by_owner(owner)
    }
    fn get_transactions(&self) -> Result<Vec<Transaction>> {
        self.inner.get_transactions()
    }
    fn replace_transaction(&self, tx: &Transaction) -> Result<bool> {
        Self::next_outcome(&self.record_writes, "replace")?;
        self.inner.replace_transaction(tx)
    }
    fn delete_transaction(&self, id: Uuid) -> Result<bool> {
        Self::next_outcome(&self.record_writes, "delete")?;
        self.inner.delete_transaction(id)
    }
}

fn flaky_context() -> (TallyContext, Arc<FlakyRepository>, Uuid, Transaction) {
    let repo = Arc::new(FlakyRepository::new());
    let ctx = TallyContext::with_repository(Config::default(), repo.clone()).unwrap();
    let owner = register(&ctx, "ada@example.com");
    let seed = ctx
        .transaction_service
        .create(draft(owner, TransactionKind::Income, dec(100), "2024-03-01"))
        .unwrap()
        .data;
    (ctx, repo, owner, seed)
}

#[test]
fn test_failed_balance_write_undoes_create() {
    let (ctx, repo, owner, seed) = flaky_context();
    repo.script_balance_writes(&[false]);

    let err = ctx
        .transaction_service
        .create(draft(owner, TransactionKind::Expense, dec(40), "2024-03-15"))
        .unwrap_err();
    assert!(matches!(err, Error::Database(_)));

    let surviving = ctx.transaction_service.find_all_by_owner(owner).unwrap();
    assert_eq!(surviving, vec![seed]);
    assert_eq!(ctx.ledger.balance(owner).unwrap(), dec(100));
}

#[test]
fn test_failed_balance_write_undoes_replace() {
    let (ctx, repo, owner, seed) = flaky_context();
    repo.script_balance_writes(&[false]);

    ctx.transaction_service
        .replace(seed.id, draft(owner, TransactionKind::Expense, dec(100), "2024-03-01"))
        .unwrap_err();

    assert_eq!(ctx.transaction_service.find_by_id(seed.id).unwrap(), seed);
    assert_eq!(ctx.ledger.balance(owner).unwrap(), dec(100));
}

#[test]
fn test_failed_balance_write_undoes_delete() {
    let (ctx, repo, owner, seed) = flaky_context();
    repo.script_balance_writes(&[false]);

    ctx.transaction_service.delete(seed.id).unwrap_err();

    assert_eq!(ctx.transaction_service.find_by_id(seed.id).unwrap(), seed);
    assert_eq!(ctx.ledger.balance(owner).unwrap(), dec(100));
}

#[test]
fn test_failed_reassignment_restores_both_users() {
    let (ctx, repo, ada, seed) = flaky_context();
    let eve = register(&ctx, "eve@example.com");

    // Old owner's write lands, new owner's write fails
    repo.script_balance_writes(&[true, false]);

    ctx.transaction_service
        .replace(seed.id, draft(eve, TransactionKind::Income, dec(100), "2024-03-01"))
        .unwrap_err();

    assert_eq!(ctx.transaction_service.find_by_id(seed.id).unwrap(), seed);
    assert_eq!(ctx.ledger.balance(ada).unwrap(), dec(100));
    assert_eq!(ctx.ledger.balance(eve).unwrap(), Decimal::ZERO);
}

#[test]
fn test_failed_rollback_falls_back_to_recompute() {
    let (ctx, repo, owner, _) = flaky_context();
    // Insert lands, balance write fails, undo delete fails, recompute lands
    repo.script_record_writes(&[true, false]);
    repo.script_balance_writes(&[false, true]);

    let err = ctx
        .transaction_service
        .create(draft(owner, TransactionKind::Expense, dec(1), "2024-03-02"))
        .unwrap_err();
    assert!(matches!(&err, Error::Database(msg) if msg.contains("recomputed")));

    repo.heal();
    assert_eq!(ctx.transaction_service.find_all_by_owner(owner).unwrap().len(), 2);
    assert_eq!(ctx.ledger.balance(owner).unwrap(), dec(99));
    assert!(ctx.doctor_service.run_checks().unwrap().is_healthy());
}

#[test]
fn test_unrecoverable_failure_names_owner_and_doctor_repairs() {
    let (ctx, repo, owner, _) = flaky_context();
    repo.script_record_writes(&[true, false]);
    repo.script_balance_writes(&FAIL_ALWAYS);

    let err = ctx
        .transaction_service
        .create(draft(owner, TransactionKind::Expense, dec(1), "2024-03-02"))
        .unwrap_err();
    assert!(matches!(&err, Error::Database(msg) if msg.contains(&owner.to_string())));

    repo.heal();
    let report = ctx.doctor_service.run_checks().unwrap();
    assert_eq!(report.checks["balance_drift"].status, "error");

    let repaired = ctx.doctor_service.fix().unwrap();
    assert_eq!(repaired.len(), 1);
    assert_eq!(ctx.ledger.balance(owner).unwrap(), dec(99));
    assert!(ctx.doctor_service.run_checks().unwrap().is_healthy());
}
