use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use oficina_core::composer::{
    finance_entry_reply, finance_summary_reply, help_reply, payment_link_reply,
    unidentified_sender_reply,
};
use oficina_core::{
    classify_message, compose_lookup, compose_registered, fold_diacritics, month_start,
    normalize_text, registration_gate, render, summarize_month, BotReply, ComposedReply,
    FinanceEntry, InboundMessage, IntentExtractor, MessageKind, MonthSummary, NewProcedure,
    ProcedureIntent, ProcedureRecord,
};
use oficina_observability::AppMetrics;
use oficina_storage::{FinanceRepository, ProcedureRepository};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const DEFAULT_PAYMENT_LINK_BASE: &str = "https://pay.oficina.local/checkout";

#[derive(Debug, Clone, Serialize)]
pub struct HandledMessage {
    pub kind: &'static str,
    #[serde(flatten)]
    pub reply: BotReply,
}

#[derive(Clone)]
pub struct MaintenanceAgent<S>
where
    S: ProcedureRepository + FinanceRepository,
{
    extractor: IntentExtractor,
    store: Arc<S>,
    metrics: Arc<AppMetrics>,
    payment_link_base: String,
}

impl<S> MaintenanceAgent<S>
where
    S: ProcedureRepository + FinanceRepository,
{
    pub fn new(
        extractor: IntentExtractor,
        store: Arc<S>,
        metrics: Arc<AppMetrics>,
        payment_link_base: impl Into<String>,
    ) -> Self {
        Self {
            extractor,
            store,
            metrics,
            payment_link_base: payment_link_base.into(),
        }
    }

    pub fn extractor(&self) -> &IntentExtractor {
        &self.extractor
    }

    /// Classifies one inbound message and runs the matching flow.
    #[instrument(skip(self, message), fields(sender = message.sender.as_deref().unwrap_or("anonymous")))]
    pub async fn handle_message(&self, message: InboundMessage) -> Result<HandledMessage> {
        let started = Instant::now();
        self.metrics.inc_message();

        let kind = classify_message(&message);
        let outcome = self.dispatch(&kind, &message).await;
        self.metrics.observe_latency(started.elapsed());
        let reply = outcome?;

        info!(
            kind = kind.label(),
            segments = reply.segments.len(),
            "message handled"
        );

        Ok(HandledMessage {
            kind: kind.label(),
            reply,
        })
    }

    async fn dispatch(&self, kind: &MessageKind, message: &InboundMessage) -> Result<BotReply> {
        Ok(match kind {
            MessageKind::Registration => self.register_from_message(message).await?,
            MessageKind::Query => render(&self.lookup(&message.text).await?),
            MessageKind::FinanceExpense(entry) => self.record_finance_entry(message, entry).await?,
            MessageKind::FinanceSummary => self.summary_reply(message).await?,
            MessageKind::PaymentLink => payment_link_reply(&self.payment_link()),
            MessageKind::Unknown => help_reply(),
        })
    }

    pub fn extract(&self, text: &str) -> ProcedureIntent {
        self.extractor.extract(text)
    }

    /// Free-form intents (CLI, API callers) are normalized the same way extracted ones are.
    pub async fn search(&self, intent: &ProcedureIntent) -> Result<Vec<ProcedureRecord>> {
        self.store
            .find_candidates(
                &normalize_text(&intent.operation),
                &normalize_text(&intent.equipment),
            )
            .await
    }

    /// Query path: an empty intent never reaches the store.
    pub async fn lookup(&self, text: &str) -> Result<ComposedReply> {
        let intent = self.extractor.extract(text);
        if intent.is_empty() {
            return Ok(compose_lookup(&intent, &[]));
        }

        let candidates = self.search(&intent).await?;
        self.metrics.inc_lookup(!candidates.is_empty());
        info!(
            operation = %intent.operation,
            equipment = %intent.equipment,
            hits = candidates.len(),
            "procedure lookup"
        );

        Ok(compose_lookup(&intent, &candidates))
    }

    /// Stored operation is normalized; equipment keeps its casing but loses diacritics.
    pub async fn register_procedure(&self, procedure: NewProcedure) -> Result<ProcedureRecord> {
        let procedure = NewProcedure {
            operation: normalize_text(&procedure.operation),
            equipment: fold_diacritics(&procedure.equipment),
            ..procedure
        };
        let record = self.store.create_record(procedure).await?;
        self.metrics.inc_registration();
        info!(
            id = record.id,
            operation = %record.operation,
            equipment = %record.equipment,
            photos = record.photo_urls.len(),
            "procedure registered"
        );
        Ok(record)
    }

    pub async fn month_summary(&self, sender: &str, as_of: NaiveDate) -> Result<MonthSummary> {
        let user_id = self.store.ensure_user(sender, None).await?;
        let rows = self
            .store
            .list_transactions(user_id, month_start(as_of), as_of)
            .await?;
        Ok(summarize_month(as_of, &rows))
    }

    async fn register_from_message(&self, message: &InboundMessage) -> Result<BotReply> {
        let intent = self.extractor.extract(&message.text);
        if let Some(missing) = registration_gate(&intent) {
            warn!(
                operation = %intent.operation,
                equipment = %intent.equipment,
                "registration without operation or equipment"
            );
            return Ok(render(&missing));
        }

        let description = Some(message.text.trim().to_string()).filter(|text| !text.is_empty());
        let record = self
            .register_procedure(NewProcedure {
                operation: intent.operation,
                equipment: intent.equipment,
                description,
                photo_urls: message.image_urls(),
                created_by: message.sender.clone(),
            })
            .await?;

        Ok(render(&compose_registered(record)))
    }

    async fn record_finance_entry(
        &self,
        message: &InboundMessage,
        entry: &FinanceEntry,
    ) -> Result<BotReply> {
        let Some(sender) = sender_of(message) else {
            return Ok(unidentified_sender_reply());
        };

        let user_id = self.store.ensure_user(sender, None).await?;
        self.store
            .insert_transaction(user_id, entry, Utc::now().date_naive())
            .await?;
        self.metrics.inc_finance_entry();

        Ok(finance_entry_reply(entry))
    }

    async fn summary_reply(&self, message: &InboundMessage) -> Result<BotReply> {
        let Some(sender) = sender_of(message) else {
            return Ok(unidentified_sender_reply());
        };

        let summary = self.month_summary(sender, Utc::now().date_naive()).await?;
        Ok(finance_summary_reply(&summary))
    }

    fn payment_link(&self) -> String {
        format!(
            "{}/{}",
            self.payment_link_base.trim_end_matches('/'),
            Uuid::new_v4().simple()
        )
    }
}

fn sender_of(message: &InboundMessage) -> Option<&str> {
    message
        .sender
        .as_deref()
        .map(str::trim)
        .filter(|sender| !sender.is_empty())
}
