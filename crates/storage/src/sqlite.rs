use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use oficina_core::{
    FinanceEntry, NewProcedure, ProcedureRecord, TransactionKind, TransactionRecord,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::{FinanceRepository, ProcedureRepository, MAX_CANDIDATES};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url {}", database_url))?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `:memory:` is its own database, so keep exactly one alive.
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS procedures (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              equipment TEXT NOT NULL,
              operation TEXT NOT NULL,
              description TEXT,
              photo_urls_json TEXT NOT NULL DEFAULT '[]',
              created_by TEXT,
              created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed creating procedures table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              wa_number TEXT UNIQUE NOT NULL,
              name TEXT,
              created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed creating users table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
              type TEXT NOT NULL DEFAULT 'expense' CHECK (type IN ('expense', 'income')),
              value_cents INTEGER NOT NULL,
              category TEXT,
              note TEXT,
              occurred_on TEXT NOT NULL,
              created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed creating transactions table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tx_user_date ON transactions(user_id, occurred_on)")
            .execute(&self.pool)
            .await?;

        tracing::debug!("sqlite schema ready");
        Ok(())
    }
}

impl ProcedureRepository for SqliteStore {
    async fn find_candidates(
        &self,
        operation: &str,
        equipment: &str,
    ) -> Result<Vec<ProcedureRecord>> {
        // lower() folds ASCII only; stored procedure text is already diacritic-free.
        let rows = sqlx::query(
            r#"
            SELECT id, equipment, operation, description, photo_urls_json, created_by, created_at
            FROM procedures
            WHERE lower(operation) LIKE ?1 ESCAPE '\'
              AND lower(equipment) LIKE ?2 ESCAPE '\'
            ORDER BY created_at DESC, id DESC
            LIMIT ?3
            "#,
        )
        .bind(contains_pattern(operation))
        .bind(contains_pattern(equipment))
        .bind(MAX_CANDIDATES as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(procedure_from_row).collect()
    }

    async fn create_record(&self, procedure: NewProcedure) -> Result<ProcedureRecord> {
        let created_at = Utc::now();
        let photo_urls_json = serde_json::to_string(&procedure.photo_urls)?;

        let result = sqlx::query(
            r#"
            INSERT INTO procedures (equipment, operation, description, photo_urls_json, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&procedure.equipment)
        .bind(&procedure.operation)
        .bind(&procedure.description)
        .bind(photo_urls_json)
        .bind(&procedure.created_by)
        .bind(timestamp(created_at))
        .execute(&self.pool)
        .await
        .context("failed inserting procedure")?;

        Ok(ProcedureRecord {
            id: result.last_insert_rowid(),
            equipment: procedure.equipment,
            operation: procedure.operation,
            description: procedure.description,
            photo_urls: procedure.photo_urls,
            created_by: procedure.created_by,
            created_at,
        })
    }
}

impl FinanceRepository for SqliteStore {
    async fn ensure_user(&self, wa_number: &str, name: Option<&str>) -> Result<i64> {
        sqlx::query(
            r#"
            INSERT INTO users (wa_number, name, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(wa_number) DO UPDATE SET
              name=COALESCE(excluded.name, users.name)
            "#,
        )
        .bind(wa_number)
        .bind(name)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id FROM users WHERE wa_number = ?1")
            .bind(wa_number)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("user {} missing after upsert", wa_number))?;

        Ok(row.get("id"))
    }

    async fn insert_transaction(
        &self,
        user_id: i64,
        entry: &FinanceEntry,
        occurred_on: NaiveDate,
    ) -> Result<TransactionRecord> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO transactions (user_id, type, value_cents, category, note, occurred_on, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(user_id)
        .bind(entry.kind.as_code())
        .bind(entry.value_cents)
        .bind(&entry.category)
        .bind(&entry.note)
        .bind(occurred_on.format(DATE_FORMAT).to_string())
        .bind(timestamp(created_at))
        .execute(&self.pool)
        .await
        .context("failed inserting transaction")?;

        Ok(TransactionRecord {
            id: result.last_insert_rowid(),
            user_id,
            kind: entry.kind,
            value_cents: entry.value_cents,
            category: Some(entry.category.clone()),
            note: entry.note.clone(),
            occurred_on,
            created_at,
        })
    }

    async fn list_transactions(
        &self,
        user_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, type, value_cents, category, note, occurred_on, created_at
            FROM transactions
            WHERE user_id = ?1 AND occurred_on BETWEEN ?2 AND ?3
            ORDER BY occurred_on, id
            "#,
        )
        .bind(user_id)
        .bind(from.format(DATE_FORMAT).to_string())
        .bind(to.format(DATE_FORMAT).to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transaction_from_row).collect()
    }
}

fn procedure_from_row(row: &SqliteRow) -> Result<ProcedureRecord> {
    let photo_urls_json: String = row.get("photo_urls_json");

    Ok(ProcedureRecord {
        id: row.get("id"),
        equipment: row.get("equipment"),
        operation: row.get("operation"),
        description: row.get("description"),
        photo_urls: serde_json::from_str(&photo_urls_json)
            .with_context(|| format!("invalid photo_urls_json {}", photo_urls_json))?,
        created_by: row.get("created_by"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

fn transaction_from_row(row: &SqliteRow) -> Result<TransactionRecord> {
    let kind_code: String = row.get("type");
    let occurred_on: String = row.get("occurred_on");

    Ok(TransactionRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind: TransactionKind::parse(&kind_code)
            .with_context(|| format!("unknown transaction type {}", kind_code))?,
        value_cents: row.get("value_cents"),
        category: row.get("category"),
        note: row.get("note"),
        occurred_on: NaiveDate::parse_from_str(&occurred_on, DATE_FORMAT)
            .with_context(|| format!("invalid occurred_on {}", occurred_on))?,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse()
        .with_context(|| format!("invalid created_at {}", raw))
}

fn contains_pattern(needle: &str) -> String {
    let escaped = needle
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    fn procedure(operation: &str, equipment: &str, photos: usize) -> NewProcedure {
        NewProcedure {
            operation: operation.to_string(),
            equipment: equipment.to_string(),
            description: Some("passo a passo".to_string()),
            photo_urls: (1..=photos).map(|n| format!("https://m/{n}.jpg")).collect(),
            created_by: None,
        }
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("50%_A"), "%50\\%\\_a%");
        assert_eq!(contains_pattern(""), "%%");
    }

    #[tokio::test]
    async fn round_trips_procedure_and_ranks_newest_first() {
        let store = store().await;
        store
            .create_record(procedure("troca de correia", "RRE160HCC TOYOTA", 1))
            .await
            .unwrap();
        let newest = store
            .create_record(procedure("troca de correia", "RRE160HCC TOYOTA", 2))
            .await
            .unwrap();

        let hits = store
            .find_candidates("troca de correia", "rre160hcc toyota")
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, newest.id);
        assert_eq!(hits[0].photo_urls, vec!["https://m/1.jpg", "https://m/2.jpg"]);
    }

    #[tokio::test]
    async fn caps_candidates_and_filters_operation() {
        let store = store().await;
        for _ in 0..7 {
            store
                .create_record(procedure("troca de rolamento", "hyster", 0))
                .await
                .unwrap();
        }
        store
            .create_record(procedure("correia", "hyster", 0))
            .await
            .unwrap();

        assert_eq!(store.find_candidates("", "").await.unwrap().len(), MAX_CANDIDATES);
        let hits = store.find_candidates("rolamento", "").await.unwrap();
        assert!(hits.iter().all(|hit| hit.operation == "troca de rolamento"));
    }

    #[tokio::test]
    async fn corrupt_created_at_is_an_error_not_a_fresh_timestamp() {
        let store = store().await;
        sqlx::query(
            "INSERT INTO procedures (equipment, operation, photo_urls_json, created_at) \
             VALUES ('yale', 'troca de oleo', '[]', 'ontem')",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let error = store.find_candidates("oleo", "yale").await.unwrap_err();
        assert!(error.to_string().contains("invalid created_at ontem"));
    }

    #[tokio::test]
    async fn stores_finance_rows_per_user() {
        let store = store().await;
        let user = store.ensure_user("whatsapp:+5511", Some("Ana")).await.unwrap();
        assert_eq!(store.ensure_user("whatsapp:+5511", None).await.unwrap(), user);

        let entry = FinanceEntry {
            kind: TransactionKind::Income,
            value_cents: 150_000,
            category: "salario".to_string(),
            note: Some("salario".to_string()),
        };
        let day = NaiveDate::from_ymd_opt(2026, 10, 5).unwrap();
        store.insert_transaction(user, &entry, day).await.unwrap();

        let rows = store
            .list_transactions(user, NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(), day)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, TransactionKind::Income);
        assert_eq!(rows[0].occurred_on, day);
    }
}
