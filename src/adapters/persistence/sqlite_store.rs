//! SQLite-backed `LedgerStore` via libsql.
//!
//! One database file (`ledger.db`) in the data directory. Every write runs in a
//! transaction that first bumps `groups.version` with a conditional UPDATE, so
//! a stale expected version changes nothing. Splits and foreign-amount
//! snapshots are JSON text; timestamps are Unix milliseconds.

use crate::domain::{
    CurrencyCode, DomainError, Expense, ExpenseId, ExpenseSet, ForeignAmount, Group, GroupId,
    Member, MemberId, Money, SplitMode, Splits,
};
use crate::ports::{LedgerStore, StoredExpense};
use chrono::DateTime;
use libsql::{Connection, Database, Row, Transaction, params};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const GROUPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS groups (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    home_currency TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 0
)"#;

const MEMBERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS members (
    group_id TEXT NOT NULL,
    id TEXT NOT NULL,
    display_name TEXT NOT NULL,
    PRIMARY KEY (group_id, id)
)"#;

const EXPENSES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS expenses (
    id TEXT PRIMARY KEY,
    group_id TEXT NOT NULL,
    payer_id TEXT NOT NULL,
    total INTEGER NOT NULL,
    currency TEXT NOT NULL,
    foreign_json TEXT,
    category TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    split_mode TEXT NOT NULL,
    splits_json TEXT NOT NULL,
    is_settlement INTEGER NOT NULL DEFAULT 0,
    idempotency_key TEXT,
    created_by TEXT NOT NULL,
    created_at INTEGER NOT NULL
)"#;

const EXPENSES_GROUP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_expenses_group ON expenses (group_id, created_at)";

/// NULL keys never collide, so only keyed records are deduplicated.
const EXPENSES_KEY_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS idx_expenses_idempotency ON expenses (group_id, idempotency_key)";

const EXPENSE_COLUMNS: &str = "id, group_id, payer_id, total, currency, foreign_json, category, description, split_mode, splits_json, is_settlement, idempotency_key, created_by, created_at";

fn persistence(e: impl std::fmt::Display) -> DomainError {
    DomainError::Persistence(e.to_string())
}

/// SQLite ledger store. Safe to share via Arc.
pub struct SqliteStore {
    db: Database,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Connect to (or create) `ledger.db` under `base_dir` and ensure the
    /// schema exists. Call once at startup.
    pub async fn connect(base_dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let base = base_dir.as_ref();
        std::fs::create_dir_all(base).map_err(persistence)?;
        let db_path = base.join("ledger.db");
        let path_str = db_path.to_string_lossy();
        let db = libsql::Builder::new_local(path_str.as_ref())
            .build()
            .await
            .map_err(persistence)?;
        let conn = db.connect().map_err(persistence)?;

        // PRAGMA returns a row; query and drain it (execute fails on rows).
        for pragma in ["PRAGMA journal_mode=WAL", "PRAGMA synchronous=NORMAL"] {
            let mut rows = conn
                .query(pragma, ())
                .await
                .map_err(|e| DomainError::Persistence(format!("{pragma} failed: {e}")))?;
            while rows.next().await.map_err(persistence)?.is_some() {}
        }

        for ddl in [
            GROUPS_TABLE,
            MEMBERS_TABLE,
            EXPENSES_TABLE,
            EXPENSES_GROUP_INDEX,
            EXPENSES_KEY_INDEX,
        ] {
            conn.execute(ddl, ()).await.map_err(persistence)?;
        }

        info!(path = %db_path.display(), "SQLite ledger connected with WAL mode");

        Ok(Self { db, db_path })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connection(&self) -> Result<Connection, DomainError> {
        self.db.connect().map_err(persistence)
    }

    /// Insert or update a group and replace its member list. The version is
    /// left alone: membership does not change the expense set.
    pub async fn save_group(&self, group: &Group) -> Result<(), DomainError> {
        let conn = self.connection()?;
        let tx = conn.transaction().await.map_err(persistence)?;
        tx.execute(
            r#"
            INSERT INTO groups (id, owner_id, home_currency, version)
            VALUES (?1, ?2, ?3, 0)
            ON CONFLICT (id) DO UPDATE SET
                owner_id = excluded.owner_id,
                home_currency = excluded.home_currency
            "#,
            params![
                group.id.as_str(),
                group.owner_id.as_str(),
                group.home_currency.as_str()
            ],
        )
        .await
        .map_err(persistence)?;
        tx.execute(
            "DELETE FROM members WHERE group_id = ?1",
            params![group.id.as_str()],
        )
        .await
        .map_err(persistence)?;
        for member in group.members.values() {
            tx.execute(
                "INSERT INTO members (group_id, id, display_name) VALUES (?1, ?2, ?3)",
                params![
                    group.id.as_str(),
                    member.id.as_str(),
                    member.display_name.as_str()
                ],
            )
            .await
            .map_err(persistence)?;
        }
        tx.commit().await.map_err(persistence)?;
        debug!(group_id = %group.id, members = group.members.len(), "Group saved");
        Ok(())
    }

    async fn current_version(conn: &Connection, group_id: &GroupId) -> Result<u64, DomainError> {
        let mut rows = conn
            .query(
                "SELECT version FROM groups WHERE id = ?1",
                params![group_id.as_str()],
            )
            .await
            .map_err(persistence)?;
        match rows.next().await.map_err(persistence)? {
            Some(row) => {
                let version: i64 = row.get(0).map_err(persistence)?;
                Ok(version as u64)
            }
            None => Err(DomainError::NotFound(format!("group {group_id}"))),
        }
    }

    /// Conditional version bump. On a mismatch the transaction is rolled back
    /// and `StaleSnapshot` returned.
    async fn bump_version(
        tx: Transaction,
        group_id: &GroupId,
        expected: Option<u64>,
    ) -> Result<(Transaction, u64), DomainError> {
        let changed = tx
            .execute(
                "UPDATE groups SET version = version + 1 WHERE id = ?1 AND (?2 IS NULL OR version = ?2)",
                params![group_id.as_str(), expected.map(|v| v as i64)],
            )
            .await
            .map_err(persistence)?;

        if changed == 0 {
            let actual = Self::current_version(&tx, group_id).await;
            tx.rollback().await.map_err(persistence)?;
            let actual = actual?;
            return Err(DomainError::StaleSnapshot {
                expected: expected.unwrap_or(actual),
                actual,
            });
        }

        let version = Self::current_version(&tx, group_id).await?;
        Ok((tx, version))
    }

    async fn find_by_key(
        conn: &Connection,
        group_id: &GroupId,
        key: &str,
    ) -> Result<Option<Expense>, DomainError> {
        let sql = format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE group_id = ?1 AND idempotency_key = ?2"
        );
        let mut rows = conn
            .query(&sql, params![group_id.as_str(), key])
            .await
            .map_err(persistence)?;
        match rows.next().await.map_err(persistence)? {
            Some(row) => Ok(Some(row_to_expense(&row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl LedgerStore for SqliteStore {
    async fn fetch_group(&self, group_id: &GroupId) -> Result<Group, DomainError> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT owner_id, home_currency FROM groups WHERE id = ?1",
                params![group_id.as_str()],
            )
            .await
            .map_err(persistence)?;
        let Some(row) = rows.next().await.map_err(persistence)? else {
            return Err(DomainError::NotFound(format!("group {group_id}")));
        };
        let owner_id: String = row.get(0).map_err(persistence)?;
        let home_currency: String = row.get(1).map_err(persistence)?;

        let mut rows = conn
            .query(
                "SELECT id, display_name FROM members WHERE group_id = ?1 ORDER BY id",
                params![group_id.as_str()],
            )
            .await
            .map_err(persistence)?;
        let mut members = BTreeMap::new();
        while let Some(row) = rows.next().await.map_err(persistence)? {
            let id: String = row.get(0).map_err(persistence)?;
            let display_name: String = row.get(1).map_err(persistence)?;
            members.insert(MemberId::from(id.as_str()), Member::new(id, display_name));
        }

        Ok(Group {
            id: group_id.clone(),
            owner_id: MemberId::from(owner_id),
            home_currency: CurrencyCode::new(&home_currency)?,
            members,
        })
    }

    async fn fetch_expenses(&self, group_id: &GroupId) -> Result<ExpenseSet, DomainError> {
        let conn = self.connection()?;
        // Version and rows from one read transaction.
        let tx = conn.transaction().await.map_err(persistence)?;
        let version = Self::current_version(&tx, group_id).await?;

        let sql = format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE group_id = ?1 ORDER BY created_at, rowid"
        );
        let mut rows = tx
            .query(&sql, params![group_id.as_str()])
            .await
            .map_err(persistence)?;
        let mut expenses = Vec::new();
        while let Some(row) = rows.next().await.map_err(persistence)? {
            expenses.push(row_to_expense(&row)?);
        }
        drop(rows);
        tx.commit().await.map_err(persistence)?;

        debug!(group_id = %group_id, count = expenses.len(), version, "Expenses loaded");
        Ok(ExpenseSet { expenses, version })
    }

    async fn insert_expense(
        &self,
        expense: &Expense,
        expected_version: Option<u64>,
    ) -> Result<StoredExpense, DomainError> {
        expense.validate()?;
        let conn = self.connection()?;
        let tx = conn.transaction().await.map_err(persistence)?;

        if let Some(key) = &expense.idempotency_key {
            if let Some(existing) = Self::find_by_key(&tx, &expense.group_id, key).await? {
                let version = Self::current_version(&tx, &expense.group_id).await?;
                tx.commit().await.map_err(persistence)?;
                debug!(group_id = %expense.group_id, key = %key, "Idempotent insert hit existing record");
                return Ok(StoredExpense {
                    expense: existing,
                    version,
                    created: false,
                });
            }
        }

        let (tx, version) = Self::bump_version(tx, &expense.group_id, expected_version).await?;
        let row = ExpenseRow::from_expense(expense)?;
        tx.execute(
            &format!(
                "INSERT INTO expenses ({EXPENSE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                row.id,
                expense.group_id.as_str(),
                expense.payer_id.as_str(),
                expense.total.minor(),
                expense.currency.as_str(),
                row.foreign_json,
                expense.category.as_str(),
                expense.description.as_str(),
                expense.split_mode.as_str(),
                row.splits_json,
                i64::from(expense.is_settlement),
                expense.idempotency_key.clone(),
                expense.created_by.as_str(),
                expense.created_at.timestamp_millis()
            ],
        )
        .await
        .map_err(persistence)?;
        tx.commit().await.map_err(persistence)?;

        Ok(StoredExpense {
            expense: expense.clone(),
            version,
            created: true,
        })
    }

    async fn replace_expense(
        &self,
        expense: &Expense,
        expected_version: Option<u64>,
    ) -> Result<u64, DomainError> {
        expense.validate()?;
        let conn = self.connection()?;
        let tx = conn.transaction().await.map_err(persistence)?;
        let (tx, version) = Self::bump_version(tx, &expense.group_id, expected_version).await?;

        let row = ExpenseRow::from_expense(expense)?;
        let changed = tx
            .execute(
                r#"
                UPDATE expenses SET
                    payer_id = ?3, total = ?4, currency = ?5, foreign_json = ?6,
                    category = ?7, description = ?8, split_mode = ?9, splits_json = ?10
                WHERE id = ?1 AND group_id = ?2
                "#,
                params![
                    row.id,
                    expense.group_id.as_str(),
                    expense.payer_id.as_str(),
                    expense.total.minor(),
                    expense.currency.as_str(),
                    row.foreign_json,
                    expense.category.as_str(),
                    expense.description.as_str(),
                    expense.split_mode.as_str(),
                    row.splits_json
                ],
            )
            .await
            .map_err(persistence)?;
        if changed == 0 {
            tx.rollback().await.map_err(persistence)?;
            return Err(DomainError::NotFound(format!("expense {}", expense.id)));
        }
        tx.commit().await.map_err(persistence)?;
        Ok(version)
    }

    async fn delete_expense(
        &self,
        group_id: &GroupId,
        expense_id: ExpenseId,
        expected_version: Option<u64>,
    ) -> Result<u64, DomainError> {
        let conn = self.connection()?;
        let tx = conn.transaction().await.map_err(persistence)?;
        let (tx, version) = Self::bump_version(tx, group_id, expected_version).await?;

        let changed = tx
            .execute(
                "DELETE FROM expenses WHERE id = ?1 AND group_id = ?2",
                params![expense_id.to_string(), group_id.as_str()],
            )
            .await
            .map_err(persistence)?;
        if changed == 0 {
            tx.rollback().await.map_err(persistence)?;
            return Err(DomainError::NotFound(format!("expense {expense_id}")));
        }
        tx.commit().await.map_err(persistence)?;
        Ok(version)
    }
}

/// Columns that need encoding before they go into SQL.
struct ExpenseRow {
    id: String,
    foreign_json: Option<String>,
    splits_json: String,
}

impl ExpenseRow {
    fn from_expense(expense: &Expense) -> Result<Self, DomainError> {
        let foreign_json = expense
            .foreign
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(persistence)?;
        let splits_json = serde_json::to_string(expense.splits.as_map()).map_err(persistence)?;
        Ok(Self {
            id: expense.id.to_string(),
            foreign_json,
            splits_json,
        })
    }
}

fn row_to_expense(row: &Row) -> Result<Expense, DomainError> {
    let id: String = row.get(0).map_err(persistence)?;
    let group_id: String = row.get(1).map_err(persistence)?;
    let payer_id: String = row.get(2).map_err(persistence)?;
    let total: i64 = row.get(3).map_err(persistence)?;
    let currency: String = row.get(4).map_err(persistence)?;
    let foreign_json: Option<String> = row.get(5).map_err(persistence)?;
    let category: String = row.get(6).map_err(persistence)?;
    let description: String = row.get(7).map_err(persistence)?;
    let split_mode: String = row.get(8).map_err(persistence)?;
    let splits_json: String = row.get(9).map_err(persistence)?;
    let is_settlement: i64 = row.get(10).map_err(persistence)?;
    let idempotency_key: Option<String> = row.get(11).map_err(persistence)?;
    let created_by: String = row.get(12).map_err(persistence)?;
    let created_at: i64 = row.get(13).map_err(persistence)?;

    let total = Money::new(total);
    let shares: BTreeMap<MemberId, Money> =
        serde_json::from_str(&splits_json).map_err(persistence)?;
    let foreign: Option<ForeignAmount> = foreign_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(persistence)?;

    let expense = Expense {
        id: ExpenseId::parse(&id)?,
        group_id: GroupId::from(group_id),
        payer_id: MemberId::from(payer_id),
        total,
        currency: CurrencyCode::new(&currency)?,
        foreign,
        category,
        description,
        split_mode: SplitMode::try_from(split_mode.as_str())?,
        splits: Splits::from_stored(shares, total)?,
        is_settlement: is_settlement != 0,
        idempotency_key,
        created_by: MemberId::from(created_by),
        created_at: DateTime::from_timestamp_millis(created_at).ok_or_else(|| {
            DomainError::Persistence(format!("invalid created_at {created_at} on expense {id}"))
        })?,
    };
    expense.validate()?;
    Ok(expense)
}
