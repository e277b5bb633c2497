mod memory;
mod sqlite;

use anyhow::Result;
use chrono::NaiveDate;
use oficina_core::{FinanceEntry, NewProcedure, ProcedureRecord, TransactionRecord};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub use oficina_retrieval::MAX_RESULTS as MAX_CANDIDATES;

pub trait ProcedureRepository: Send + Sync {
    /// Records whose fields contain the given substrings (case-insensitive), newest first,
    /// at most [`MAX_CANDIDATES`]. Empty patterns match everything.
    async fn find_candidates(&self, operation: &str, equipment: &str)
        -> Result<Vec<ProcedureRecord>>;
    async fn create_record(&self, procedure: NewProcedure) -> Result<ProcedureRecord>;
}

pub trait FinanceRepository: Send + Sync {
    /// Returns the user id for a messaging number, creating the user on first contact.
    async fn ensure_user(&self, wa_number: &str, name: Option<&str>) -> Result<i64>;
    async fn insert_transaction(
        &self,
        user_id: i64,
        entry: &FinanceEntry,
        occurred_on: NaiveDate,
    ) -> Result<TransactionRecord>;
    /// Transactions with `from <= occurred_on <= to`, oldest first.
    async fn list_transactions(
        &self,
        user_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TransactionRecord>>;
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Sqlite(_) => "sqlite",
        }
    }
}

impl ProcedureRepository for Store {
    async fn find_candidates(
        &self,
        operation: &str,
        equipment: &str,
    ) -> Result<Vec<ProcedureRecord>> {
        match self {
            Store::Memory(store) => store.find_candidates(operation, equipment).await,
            Store::Sqlite(store) => store.find_candidates(operation, equipment).await,
        }
    }

    async fn create_record(&self, procedure: NewProcedure) -> Result<ProcedureRecord> {
        match self {
            Store::Memory(store) => store.create_record(procedure).await,
            Store::Sqlite(store) => store.create_record(procedure).await,
        }
    }
}

impl FinanceRepository for Store {
    async fn ensure_user(&self, wa_number: &str, name: Option<&str>) -> Result<i64> {
        match self {
            Store::Memory(store) => store.ensure_user(wa_number, name).await,
            Store::Sqlite(store) => store.ensure_user(wa_number, name).await,
        }
    }

    async fn insert_transaction(
        &self,
        user_id: i64,
        entry: &FinanceEntry,
        occurred_on: NaiveDate,
    ) -> Result<TransactionRecord> {
        match self {
            Store::Memory(store) => store.insert_transaction(user_id, entry, occurred_on).await,
            Store::Sqlite(store) => store.insert_transaction(user_id, entry, occurred_on).await,
        }
    }

    async fn list_transactions(
        &self,
        user_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TransactionRecord>> {
        match self {
            Store::Memory(store) => store.list_transactions(user_id, from, to).await,
            Store::Sqlite(store) => store.list_transactions(user_id, from, to).await,
        }
    }
}
