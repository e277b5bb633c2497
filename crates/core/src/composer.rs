use serde::Serialize;

use crate::finance::format_brl;
use crate::models::{
    BotReply, FinanceEntry, MonthSummary, ProcedureIntent, ProcedureRecord, TransactionKind,
};

/// Photos sent back with a found procedure.
pub const MAX_ATTACHMENTS: usize = 5;
pub const PROMPT_EXAMPLE: &str = "troca de rolamento RRE160HCC Toyota";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ComposedReply {
    MissingInfo {
        example: String,
    },
    NoMatch {
        operation: String,
        equipment: String,
    },
    Found {
        record: ProcedureRecord,
        attachment_urls: Vec<String>,
    },
    Registered {
        record: ProcedureRecord,
    },
}

pub fn missing_info() -> ComposedReply {
    ComposedReply::MissingInfo {
        example: PROMPT_EXAMPLE.to_string(),
    }
}

/// Query path. `matches` must already be ranked, best first.
pub fn compose_lookup(intent: &ProcedureIntent, matches: &[ProcedureRecord]) -> ComposedReply {
    if intent.is_empty() {
        return missing_info();
    }

    match matches.first() {
        Some(record) => ComposedReply::Found {
            record: record.clone(),
            attachment_urls: record
                .photo_urls
                .iter()
                .take(MAX_ATTACHMENTS)
                .cloned()
                .collect(),
        },
        None => ComposedReply::NoMatch {
            operation: intent.operation.clone(),
            equipment: intent.equipment.clone(),
        },
    }
}

/// Registration needs both fields; returns the prompt to send when one is missing.
pub fn registration_gate(intent: &ProcedureIntent) -> Option<ComposedReply> {
    if intent.is_complete() {
        None
    } else {
        Some(missing_info())
    }
}

pub fn compose_registered(record: ProcedureRecord) -> ComposedReply {
    ComposedReply::Registered { record }
}

pub fn render(reply: &ComposedReply) -> BotReply {
    match reply {
        ComposedReply::MissingInfo { example } => BotReply::text(format!(
            "Não consegui identificar a operação e o equipamento. Envie algo como: \"{}\".",
            example
        )),
        ComposedReply::NoMatch {
            operation,
            equipment,
        } => BotReply::text(format!(
            "Nenhum procedimento encontrado para \"{}\" em \"{}\". Envie fotos com a descrição para cadastrar.",
            or_dash(operation),
            or_dash(equipment)
        )),
        ComposedReply::Found {
            record,
            attachment_urls,
        } => {
            let mut lines = vec![format!(
                "Procedimento: {} | Equipamento: {}",
                record.operation, record.equipment
            )];
            if let Some(description) = record.description.as_deref().filter(|d| !d.is_empty()) {
                lines.push(description.to_string());
            }
            let mut registered = format!("Registrado em {}", record.created_at.format("%d/%m/%Y"));
            if let Some(author) = record.created_by.as_deref() {
                registered.push_str(&format!(" por {}", author));
            }
            lines.push(registered);
            if !attachment_urls.is_empty() {
                lines.push(format!("Fotos: {}", attachment_urls.len()));
            }

            BotReply::text(lines.join("\n")).with_media(attachment_urls.iter().cloned())
        }
        ComposedReply::Registered { record } => BotReply::text(format!(
            "Procedimento registrado: {} | {} | {} foto(s).",
            record.operation,
            record.equipment,
            record.photo_urls.len()
        )),
    }
}

pub fn finance_entry_reply(entry: &FinanceEntry) -> BotReply {
    let label = match entry.kind {
        TransactionKind::Expense => "Despesa",
        TransactionKind::Income => "Receita",
    };
    BotReply::text(format!(
        "{} registrada: {} em {}.",
        label,
        format_brl(entry.value_cents),
        entry.category
    ))
}

pub fn finance_summary_reply(summary: &MonthSummary) -> BotReply {
    let mut lines = vec![
        format!("Resumo de {}:", summary.month_start.format("%m/%Y")),
        format!("Receitas: {}", format_brl(summary.income_cents)),
        format!("Despesas: {}", format_brl(summary.expense_cents)),
        format!("Saldo: {}", format_brl(summary.balance_cents)),
    ];

    if !summary.by_category.is_empty() {
        lines.push("Por categoria:".to_string());
        lines.extend(
            summary
                .by_category
                .iter()
                .map(|total| format!("- {}: {}", total.category, format_brl(total.value_cents))),
        );
    }

    BotReply::text(lines.join("\n"))
}

pub fn payment_link_reply(url: &str) -> BotReply {
    BotReply::text(format!("Seu link de pagamento: {}", url))
}

pub fn help_reply() -> BotReply {
    BotReply::text(format!(
        "Envie fotos com a descrição para registrar um procedimento, ou pergunte por um procedimento, por exemplo: \"{}\".",
        PROMPT_EXAMPLE
    ))
}

pub fn unidentified_sender_reply() -> BotReply {
    BotReply::text("Não consegui identificar o seu número para registrar finanças.")
}

pub fn transient_failure_reply() -> BotReply {
    BotReply::text("Tivemos um problema temporário. Tente novamente em instantes.")
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::ReplySegment;

    fn record(photos: usize) -> ProcedureRecord {
        ProcedureRecord {
            id: 7,
            equipment: "RRE160HCC toyota".to_string(),
            operation: "troca de rolamento".to_string(),
            description: Some("soltar a roda traseira".to_string()),
            photo_urls: (1..=photos)
                .map(|n| format!("https://media.example/{n}.jpg"))
                .collect(),
            created_by: Some("whatsapp:+5511999990000".to_string()),
            created_at: Utc.with_ymd_and_hms(2026, 3, 4, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn empty_intent_asks_for_more_info() {
        let reply = compose_lookup(&ProcedureIntent::default(), &[record(1)]);
        assert_eq!(reply, missing_info());
    }

    #[test]
    fn no_match_echoes_extracted_fields() {
        let intent = ProcedureIntent::new("correia", "");
        match compose_lookup(&intent, &[]) {
            ComposedReply::NoMatch {
                operation,
                equipment,
            } => {
                assert_eq!(operation, "correia");
                assert_eq!(equipment, "");
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn found_caps_media_in_stored_order() {
        let intent = ProcedureIntent::new("rolamento", "toyota");
        let reply = render(&compose_lookup(&intent, &[record(8)]));

        assert!(matches!(reply.segments[0], ReplySegment::Text { .. }));
        assert!(reply.primary_text().contains("troca de rolamento"));
        assert!(reply.primary_text().contains("04/03/2026"));
        assert_eq!(
            reply.media_urls(),
            (1..=5)
                .map(|n| format!("https://media.example/{n}.jpg"))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn registration_needs_both_fields() {
        assert!(registration_gate(&ProcedureIntent::new("troca de oleo", "")).is_some());
        assert!(registration_gate(&ProcedureIntent::new("", "hyster")).is_some());
        assert!(registration_gate(&ProcedureIntent::new("troca de oleo", "hyster")).is_none());
    }

    #[test]
    fn registered_reply_counts_photos() {
        let reply = render(&compose_registered(record(2)));
        assert_eq!(
            reply.primary_text(),
            "Procedimento registrado: troca de rolamento | RRE160HCC toyota | 2 foto(s)."
        );
        assert!(reply.media_urls().is_empty());
    }
}
