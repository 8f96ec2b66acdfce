//! Doctor service - consistency checks and balance repair

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::domain::period::parse_transaction_date;
use crate::domain::result::Result;
use crate::domain::Transaction;
use crate::ports::Repository;
use crate::services::ledger::{expected_balance, LedgerService, Reconciliation};

pub struct DoctorService {
    repository: Arc<dyn Repository>,
    ledger: Arc<LedgerService>,
}

impl DoctorService {
    pub fn new(repository: Arc<dyn Repository>, ledger: Arc<LedgerService>) -> Self {
        Self { repository, ledger }
    }

    /// Run all health checks
    pub fn run_checks(&self) -> Result<DoctorResult> {
        let users = self.repository.list_users()?;
        let transactions = self.repository.get_transactions()?;

        let mut by_owner: HashMap<Uuid, Vec<&Transaction>> = HashMap::new();
        for tx in &transactions {
            by_owner.entry(tx.owner).or_default().push(tx);
        }

        let mut checks = BTreeMap::new();

        // Stored balance vs. the sum of the user's transactions
        let drifted: Vec<serde_json::Value> = users
            .iter()
            .filter_map(|user| {
                // None when the records sum past the storable range
                let expected = by_owner
                    .get(&user.id)
                    .map_or(Some(Decimal::ZERO), |txs| expected_balance(txs.iter().copied()).ok());
                (expected != Some(user.balance)).then(|| {
                    json!({
                        "user_id": user.id,
                        "stored": user.balance,
                        "expected": expected,
                    })
                })
            })
            .collect();
        checks.insert(
            "balance_drift".to_string(),
            CheckResult::from_findings(
                drifted,
                "error",
                "All balances match their transactions".to_string(),
                |n| format!("{n} user(s) have a balance that does not match their transactions"),
            ),
        );

        let known: HashSet<Uuid> = users.iter().map(|u| u.id).collect();
        let orphaned: Vec<serde_json::Value> = transactions
            .iter()
            .filter(|tx| !known.contains(&tx.owner))
            .map(|tx| json!({"transaction_id": tx.id, "owner_id": tx.owner}))
            .collect();
        checks.insert(
            "orphaned_transactions".to_string(),
            CheckResult::from_findings(
                orphaned,
                "error",
                "No orphaned transactions found".to_string(),
                |n| format!("{n} transaction(s) reference missing users"),
            ),
        );

        // These never show up in monthly statistics
        let undated: Vec<serde_json::Value> = transactions
            .iter()
            .filter(|tx| parse_transaction_date(&tx.date).is_none())
            .map(|tx| json!({"transaction_id": tx.id, "date": tx.date}))
            .collect();
        checks.insert(
            "unparseable_dates".to_string(),
            CheckResult::from_findings(
                undated,
                "warning",
                "All transaction dates are readable".to_string(),
                |n| format!("{n} transaction(s) have a date no month can match"),
            ),
        );

        let passed = checks.values().filter(|c| c.status == "pass").count() as i64;
        let warnings = checks.values().filter(|c| c.status == "warning").count() as i64;
        let errors = checks.values().filter(|c| c.status == "error").count() as i64;

        Ok(DoctorResult {
            checks,
            summary: DoctorSummary {
                passed,
                warnings,
                errors,
            },
        })
    }

    /// Reconcile every user and report the ones whose balance changed
    pub fn fix(&self) -> Result<Vec<Reconciliation>> {
        let mut repaired = Vec::new();
        for user in self.repository.list_users()? {
            let outcome = self.ledger.reconcile(user.id)?;
            if outcome.changed() {
                repaired.push(outcome);
            }
        }
        Ok(repaired)
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: BTreeMap<String, CheckResult>,
    pub summary: DoctorSummary,
}

impl DoctorResult {
    pub fn is_healthy(&self) -> bool {
        self.summary.errors == 0
    }
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    fn from_findings(
        findings: Vec<serde_json::Value>,
        severity: &str,
        clean: String,
        describe: impl FnOnce(usize) -> String,
    ) -> Self {
        if findings.is_empty() {
            return Self {
                status: "pass".to_string(),
                message: clean,
                details: None,
            };
        }
        Self {
            status: severity.to_string(),
            message: describe(findings.len()),
            details: Some(findings),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub passed: i64,
    pub warnings: i64,
    pub errors: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryRepository;
    use crate::domain::{TransactionDraft, TransactionKind, User};
    use crate::services::locks::OwnerLocks;

    fn setup() -> (DoctorService, Arc<LedgerService>, Arc<dyn Repository>, Uuid) {
        let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        let user = User::new("ada@example.com", "hash", "Ada", "token");
        repo.insert_user(&user).unwrap();
        let ledger = Arc::new(LedgerService::new(Arc::clone(&repo), Arc::new(OwnerLocks::new())));
        let doctor = DoctorService::new(Arc::clone(&repo), Arc::clone(&ledger));
        (doctor, ledger, repo, user.id)
    }

    #[test]
    fn test_clean_store_passes() {
        let (doctor, ledger, _, owner) = setup();
        ledger
            .create(TransactionDraft::new(TransactionKind::Income, "pay", Decimal::new(100, 0), "2024-03-01", owner))
            .unwrap();

        let result = doctor.run_checks().unwrap();
        assert!(result.is_healthy());
        assert_eq!(result.summary.passed, 3);
    }

    #[test]
    fn test_drift_is_detected_and_fixed() {
        let (doctor, ledger, _, owner) = setup();
        ledger
            .create(TransactionDraft::new(TransactionKind::Income, "pay", Decimal::new(100, 0), "2024-03-01", owner))
            .unwrap();
        ledger.set_balance(owner, Decimal::new(5, 0)).unwrap();

        let result = doctor.run_checks().unwrap();
        assert_eq!(result.checks["balance_drift"].status, "error");

        let repaired = doctor.fix().unwrap();
        assert_eq!(repaired.len(), 1);
        assert_eq!(repaired[0].recomputed, Decimal::new(100, 0));
        assert!(doctor.run_checks().unwrap().is_healthy());
        assert!(doctor.fix().unwrap().is_empty());
    }

    #[test]
    fn test_orphans_and_undated_records() {
        let (doctor, _, repo, owner) = setup();
        let orphan = Transaction::from_draft(
            Uuid::new_v4(),
            TransactionDraft::new(TransactionKind::Expense, "misc", Decimal::ONE, "2024-03-01", Uuid::new_v4()),
        );
        repo.insert_transaction(&orphan).unwrap();
        let undated = Transaction::from_draft(
            Uuid::new_v4(),
            TransactionDraft::new(TransactionKind::Income, "misc", Decimal::ZERO, "soon", owner),
        );
        repo.insert_transaction(&undated).unwrap();

        let result = doctor.run_checks().unwrap();
        assert_eq!(result.checks["orphaned_transactions"].status, "error");
        assert_eq!(result.checks["unparseable_dates"].status, "warning");
        assert_eq!(result.summary.errors, 1);
        assert_eq!(result.summary.warnings, 1);
    }
}
