use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::finance::parse_finance_entry;
use crate::models::{InboundMessage, MessageKind};

const PAYMENT_LINK_PHRASES: &[&str] = &["link de pagamento", "pagar assinatura", "assinatura"];
const SUMMARY_PHRASES: &[&str] = &["saldo", "resumo", "extrato", "quanto gastei"];

/// Lowercases, strips diacritics and collapses whitespace. Idempotent.
pub fn normalize_text(input: &str) -> String {
    fold_diacritics(&input.to_lowercase())
}

/// Strips diacritics and collapses whitespace, keeping letter case.
pub fn fold_diacritics(input: &str) -> String {
    let folded = input
        .nfd()
        .filter(|ch| !is_combining_mark(*ch))
        .collect::<String>();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn classify_message(message: &InboundMessage) -> MessageKind {
    if message.has_images() {
        return MessageKind::Registration;
    }

    let normalized = normalize_text(&message.text);
    if normalized.is_empty() {
        return MessageKind::Unknown;
    }

    if contains_any(&normalized, PAYMENT_LINK_PHRASES) {
        return MessageKind::PaymentLink;
    }

    if contains_any(&normalized, SUMMARY_PHRASES) {
        return MessageKind::FinanceSummary;
    }

    if let Some(entry) = parse_finance_entry(&normalized) {
        return MessageKind::FinanceExpense(entry);
    }

    MessageKind::Query
}

pub(crate) fn trim_token(token: &str) -> &str {
    token.trim_matches(|ch: char| matches!(ch, '.' | ',' | ';' | ':' | '!' | '?' | '"' | '\''))
}

fn contains_any(input: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| input.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attachment, TransactionKind};

    #[test]
    fn strips_accents_and_case() {
        assert_eq!(normalize_text("Óleo"), "oleo");
        assert_eq!(normalize_text("oleo"), "oleo");
        assert_eq!(normalize_text("REVISÃO  Preventiva\tçã"), "revisao preventiva ca");
    }

    #[test]
    fn folding_keeps_case() {
        assert_eq!(fold_diacritics("  8FGU25   Toyota Ção "), "8FGU25 Toyota Cao");
        assert_eq!(normalize_text("Ção"), fold_diacritics("ção"));
    }

    #[test]
    fn normalization_is_idempotent() {
        for sample in ["Troca de Óleo", "  Ação  ", "", "RRE160HCC Toyota", "Ǆemal İstanbul"] {
            let once = normalize_text(sample);
            assert_eq!(normalize_text(&once), once);
        }
    }

    #[test]
    fn images_always_mean_registration() {
        let message = InboundMessage::text("saldo").with_attachment(Attachment::image("https://x/1.jpg"));
        assert_eq!(classify_message(&message), MessageKind::Registration);
    }

    #[test]
    fn non_image_attachments_do_not_register() {
        let message = InboundMessage::text("troca de correia hyster").with_attachment(Attachment {
            url: "https://x/manual.pdf".to_string(),
            content_type: "application/pdf".to_string(),
        });
        assert_eq!(classify_message(&message), MessageKind::Query);
    }

    #[test]
    fn routes_finance_and_payment_messages() {
        assert_eq!(
            classify_message(&InboundMessage::text("Qual meu saldo?")),
            MessageKind::FinanceSummary
        );
        assert_eq!(
            classify_message(&InboundMessage::text("me manda o link de pagamento")),
            MessageKind::PaymentLink
        );

        match classify_message(&InboundMessage::text("Gastei 12,50 na padaria")) {
            MessageKind::FinanceExpense(entry) => {
                assert_eq!(entry.kind, TransactionKind::Expense);
                assert_eq!(entry.value_cents, 1250);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn empty_text_is_unknown() {
        assert_eq!(classify_message(&InboundMessage::text("   ")), MessageKind::Unknown);
        assert_eq!(
            classify_message(&InboundMessage::text("rolamento toyota")),
            MessageKind::Query
        );
    }
}
