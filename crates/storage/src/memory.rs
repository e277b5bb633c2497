use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use oficina_core::{
    FinanceEntry, NewProcedure, ProcedureIntent, ProcedureRecord, TransactionRecord,
};
use parking_lot::RwLock;

use crate::{FinanceRepository, ProcedureRepository};

#[derive(Clone, Default)]
pub struct MemoryStore {
    procedures: Arc<RwLock<Vec<ProcedureRecord>>>,
    users: Arc<RwLock<HashMap<String, i64>>>,
    transactions: Arc<RwLock<Vec<TransactionRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcedureRepository for MemoryStore {
    async fn find_candidates(
        &self,
        operation: &str,
        equipment: &str,
    ) -> Result<Vec<ProcedureRecord>> {
        let intent = ProcedureIntent::new(operation, equipment);
        Ok(oficina_retrieval::search(&intent, self.procedures.read().iter()))
    }

    async fn create_record(&self, procedure: NewProcedure) -> Result<ProcedureRecord> {
        let mut procedures = self.procedures.write();
        let record = ProcedureRecord {
            id: procedures.len() as i64 + 1,
            equipment: procedure.equipment,
            operation: procedure.operation,
            description: procedure.description,
            photo_urls: procedure.photo_urls,
            created_by: procedure.created_by,
            created_at: Utc::now(),
        };
        procedures.push(record.clone());
        Ok(record)
    }
}

impl FinanceRepository for MemoryStore {
    async fn ensure_user(&self, wa_number: &str, _name: Option<&str>) -> Result<i64> {
        let mut users = self.users.write();
        let next_id = users.len() as i64 + 1;
        Ok(*users.entry(wa_number.to_string()).or_insert(next_id))
    }

    async fn insert_transaction(
        &self,
        user_id: i64,
        entry: &FinanceEntry,
        occurred_on: NaiveDate,
    ) -> Result<TransactionRecord> {
        let mut transactions = self.transactions.write();
        let record = TransactionRecord {
            id: transactions.len() as i64 + 1,
            user_id,
            kind: entry.kind,
            value_cents: entry.value_cents,
            category: Some(entry.category.clone()),
            note: entry.note.clone(),
            occurred_on,
            created_at: Utc::now(),
        };
        transactions.push(record.clone());
        Ok(record)
    }

    async fn list_transactions(
        &self,
        user_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TransactionRecord>> {
        let mut rows = self
            .transactions
            .read()
            .iter()
            .filter(|tx| tx.user_id == user_id && tx.occurred_on >= from && tx.occurred_on <= to)
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| a.occurred_on.cmp(&b.occurred_on).then(a.id.cmp(&b.id)));
        Ok(rows)
    }
}
