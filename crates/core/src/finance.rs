use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::intent::{normalize_text, trim_token};
use crate::models::{CategoryTotal, FinanceEntry, MonthSummary, TransactionKind, TransactionRecord};

pub const DEFAULT_CATEGORY: &str = "outros";
/// Largest single entry accepted from a message: R$ 1 bilhão.
pub const MAX_ENTRY_CENTS: i64 = 100_000_000_000;

const EXPENSE_VERBS: &[&str] = &["gastei", "paguei", "comprei", "gasto", "despesa"];
const INCOME_VERBS: &[&str] = &["recebi", "ganhei", "entrada", "receita"];
const CATEGORY_STOPWORDS: &[&str] = &[
    "no", "na", "nos", "nas", "em", "de", "do", "da", "com", "para", "pra", "reais", "real", "o",
    "a", "um", "uma",
];

static AMOUNT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:r\$\s*)?(\d{1,3}(?:\.\d{3})+(?:,\d{1,2})?|\d+(?:[.,]\d{1,2})?)")
        .expect("valid amount regex")
});

/// Parses "gastei 35,90 no mercado" style messages. The verb must open the message.
pub fn parse_finance_entry(text: &str) -> Option<FinanceEntry> {
    let normalized = normalize_text(text);
    let verb = normalized.split_whitespace().next()?;
    let kind = kind_for_verb(verb)?;

    let captures = AMOUNT_PATTERN.captures(&normalized)?;
    let value_cents = parse_amount_cents(captures.get(1)?.as_str())?;
    if value_cents <= 0 || value_cents > MAX_ENTRY_CENTS {
        return None;
    }

    let rest = normalized[captures.get(0)?.end()..].trim();
    let category = rest
        .split_whitespace()
        .map(trim_token)
        .find(|token| !token.is_empty() && !CATEGORY_STOPWORDS.contains(token))
        .unwrap_or(DEFAULT_CATEGORY)
        .to_string();

    Some(FinanceEntry {
        kind,
        value_cents,
        category,
        note: (!rest.is_empty()).then(|| rest.to_string()),
    })
}

fn kind_for_verb(verb: &str) -> Option<TransactionKind> {
    if EXPENSE_VERBS.contains(&verb) {
        Some(TransactionKind::Expense)
    } else if INCOME_VERBS.contains(&verb) {
        Some(TransactionKind::Income)
    } else {
        None
    }
}

/// Accepts `35`, `35,9`, `35.90`, `1.234,56` and `1.234`.
pub fn parse_amount_cents(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let canonical = if raw.contains(',') {
        raw.replace('.', "").replace(',', ".")
    } else if is_thousands_grouped(raw) {
        raw.replace('.', "")
    } else {
        raw.to_string()
    };

    let (whole, fraction) = match canonical.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (canonical.as_str(), ""),
    };
    if whole.is_empty() || fraction.len() > 2 {
        return None;
    }

    let whole = whole.parse::<i64>().ok()?;
    let fraction = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction.parse::<i64>().ok()?,
    };

    whole.checked_mul(100)?.checked_add(fraction)
}

fn is_thousands_grouped(raw: &str) -> bool {
    let mut groups = raw.split('.');
    let head_ok = groups
        .next()
        .map(|head| (1..=3).contains(&head.len()))
        .unwrap_or(false);
    let mut tail = groups.peekable();
    head_ok && tail.peek().is_some() && tail.all(|group| group.len() == 3)
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

/// Month-to-date totals for `as_of`; transactions outside that window are ignored.
pub fn summarize_month(as_of: NaiveDate, transactions: &[TransactionRecord]) -> MonthSummary {
    let start = month_start(as_of);
    let mut expense_cents = 0_i64;
    let mut income_cents = 0_i64;
    let mut counted = 0_usize;
    let mut by_category = BTreeMap::<String, i64>::new();

    for tx in transactions
        .iter()
        .filter(|tx| tx.occurred_on >= start && tx.occurred_on <= as_of)
    {
        counted += 1;
        match tx.kind {
            TransactionKind::Expense => {
                expense_cents = expense_cents.saturating_add(tx.value_cents);
                let category = tx
                    .category
                    .clone()
                    .filter(|category| !category.is_empty())
                    .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
                let total = by_category.entry(category).or_default();
                *total = total.saturating_add(tx.value_cents);
            }
            TransactionKind::Income => income_cents = income_cents.saturating_add(tx.value_cents),
        }
    }

    let mut by_category = by_category
        .into_iter()
        .map(|(category, value_cents)| CategoryTotal {
            category,
            value_cents,
        })
        .collect::<Vec<_>>();
    by_category.sort_by(|a, b| b.value_cents.cmp(&a.value_cents).then(a.category.cmp(&b.category)));

    MonthSummary {
        month_start: start,
        as_of,
        expense_cents,
        income_cents,
        balance_cents: income_cents.saturating_sub(expense_cents),
        transactions: counted,
        by_category,
    }
}

/// Formats cents as Brazilian reais, e.g. `R$ 1.234,56`.
pub fn format_brl(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (idx, digit) in whole.chars().enumerate() {
        if idx > 0 && (whole.len() - idx) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    format!("{}R$ {},{:02}", sign, grouped, cents % 100)
}
