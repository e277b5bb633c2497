pub mod composer;
pub mod extract;
pub mod finance;
pub mod intent;
pub mod models;

pub use composer::{
    compose_lookup, compose_registered, registration_gate, render, ComposedReply, MAX_ATTACHMENTS,
};
pub use extract::{BrandDictionary, IntentExtractor, OperationCatalog, Vocabulary, VocabularyError};
pub use finance::{format_brl, month_start, parse_finance_entry, summarize_month};
pub use intent::{classify_message, fold_diacritics, normalize_text};
pub use models::*;
