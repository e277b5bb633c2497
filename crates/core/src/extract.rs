//! Heuristic `(operation, equipment)` extraction.
//!
//! This is a recall-oriented, precedence-ordered scan, not a parser. The operation catalog
//! is checked in declaration order and the first contained phrase wins, so a phrase that
//! contains another catalog phrase must be declared before it. [`OperationCatalog::new`]
//! enforces that ordering.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::intent::{normalize_text, trim_token};
use crate::models::ProcedureIntent;

/// Messages starting with this prefix get a synthetic operation when no catalog phrase matches.
pub const SYNTHETIC_OPERATION_PREFIX: &str = "troca de ";

const REFERENCE_OPERATIONS: &[&str] = &[
    "troca de rolamento",
    "troca de oleo",
    "troca de filtro",
    "troca de correia",
    "troca de pneu",
    "troca de bateria",
    "troca de mangueira",
    "troca de pastilha",
    "troca de embreagem",
    "regulagem de freio",
    "regulagem de valvula",
    "revisao preventiva",
    "lubrificacao",
    "rolamento",
    "oleo",
    "filtro",
    "correia",
    "pneu",
    "bateria",
    "mangueira",
    "pastilha",
    "embreagem",
    "freio",
    "valvula",
    "motor",
];

const REFERENCE_BRANDS: &[&str] = &[
    "toyota",
    "hyster",
    "yale",
    "clark",
    "still",
    "linde",
    "jungheinrich",
    "crown",
    "hyundai",
    "mitsubishi",
    "komatsu",
    "caterpillar",
    "nissan",
    "heli",
    "doosan",
    "paletrans",
    "skyjack",
    "genie",
    "jlg",
    "byd",
];

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("catalog phrase `{specific}` (#{specific_index}) is shadowed by `{generic}` (#{generic_index}); declare it first")]
    Shadowed {
        generic: String,
        generic_index: usize,
        specific: String,
        specific_index: usize,
    },
    #[error("vocabulary has no {0}")]
    Empty(&'static str),
    #[error("failed reading vocabulary file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid vocabulary file")]
    Json(#[from] serde_json::Error),
}

/// Priority-ordered operation phrases. More specific phrases precede their substrings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationCatalog {
    phrases: Vec<String>,
}

impl OperationCatalog {
    pub fn new<I, S>(phrases: I) -> Result<Self, VocabularyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|phrase| normalize_text(phrase.as_ref()))
            .filter(|phrase| !phrase.is_empty())
            .collect::<Vec<_>>();

        if phrases.is_empty() {
            return Err(VocabularyError::Empty("operations"));
        }

        if let Some((generic_index, specific_index)) = first_shadowed_pair(&phrases) {
            return Err(VocabularyError::Shadowed {
                generic: phrases[generic_index].clone(),
                generic_index,
                specific: phrases[specific_index].clone(),
                specific_index,
            });
        }

        Ok(Self { phrases })
    }

    pub fn reference() -> Self {
        Self {
            phrases: REFERENCE_OPERATIONS
                .iter()
                .map(|phrase| phrase.to_string())
                .collect(),
        }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// First declared phrase contained in `normalized`.
    pub fn detect(&self, normalized: &str) -> Option<&str> {
        self.phrases
            .iter()
            .find(|phrase| normalized.contains(phrase.as_str()))
            .map(String::as_str)
    }
}

/// Returns `(earlier, later)` indices where the later phrase contains the earlier one and
/// could therefore never be selected.
pub fn first_shadowed_pair(phrases: &[String]) -> Option<(usize, usize)> {
    phrases.iter().enumerate().find_map(|(earlier, generic)| {
        phrases
            .iter()
            .enumerate()
            .skip(earlier + 1)
            .find(|(_, specific)| specific.contains(generic.as_str()))
            .map(|(later, _)| (earlier, later))
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrandDictionary {
    brands: BTreeSet<String>,
}

impl BrandDictionary {
    pub fn new<I, S>(brands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            brands: brands
                .into_iter()
                .map(|brand| normalize_text(brand.as_ref()))
                .filter(|brand| !brand.is_empty())
                .collect(),
        }
    }

    pub fn reference() -> Self {
        Self::new(REFERENCE_BRANDS)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.brands.contains(token)
    }

    pub fn len(&self) -> usize {
        self.brands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brands.is_empty()
    }
}

/// On-disk vocabulary replacing the built-in reference tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
    pub operations: Vec<String>,
    pub brands: Vec<String>,
}

impl Vocabulary {
    pub fn from_json_str(raw: &str) -> Result<Self, VocabularyError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, VocabularyError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| VocabularyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn into_extractor(self) -> Result<IntentExtractor, VocabularyError> {
        let catalog = OperationCatalog::new(&self.operations)?;
        let brands = BrandDictionary::new(&self.brands);
        if brands.is_empty() {
            return Err(VocabularyError::Empty("brands"));
        }
        Ok(IntentExtractor::new(catalog, brands))
    }
}

#[derive(Debug, Clone)]
pub struct IntentExtractor {
    catalog: OperationCatalog,
    brands: BrandDictionary,
}

impl IntentExtractor {
    pub fn new(catalog: OperationCatalog, brands: BrandDictionary) -> Self {
        Self { catalog, brands }
    }

    pub fn reference() -> Self {
        Self::new(OperationCatalog::reference(), BrandDictionary::reference())
    }

    pub fn catalog(&self) -> &OperationCatalog {
        &self.catalog
    }

    pub fn brands(&self) -> &BrandDictionary {
        &self.brands
    }

    pub fn extract(&self, raw_text: &str) -> ProcedureIntent {
        let normalized = normalize_text(raw_text);
        let operation = self.detect_operation(&normalized);

        // Equipment is read from what is left once the operation's words are taken out.
        let remainder = if operation.is_empty() {
            normalized.clone()
        } else {
            without_phrase_tokens(&normalized, &operation)
        };
        let equipment = self.detect_equipment(&remainder);

        ProcedureIntent {
            operation: operation.trim().to_string(),
            equipment: equipment.trim().to_string(),
        }
    }

    fn detect_operation(&self, normalized: &str) -> String {
        if let Some(phrase) = self.catalog.detect(normalized) {
            return phrase.to_string();
        }

        match normalized.strip_prefix(SYNTHETIC_OPERATION_PREFIX) {
            Some(rest) => {
                let head = rest.split_whitespace().take(2).collect::<Vec<_>>();
                format!("{}{}", SYNTHETIC_OPERATION_PREFIX, head.join(" "))
            }
            None => String::new(),
        }
    }

    fn detect_equipment(&self, text: &str) -> String {
        let tokens = text
            .split_whitespace()
            .map(trim_token)
            .filter(|token| !token.is_empty())
            .collect::<Vec<_>>();

        if let Some(index) = tokens.iter().position(|token| self.brands.contains(token)) {
            let brand = tokens[index];
            return match index.checked_sub(1).map(|previous| tokens[previous]) {
                Some(model) => format!("{} {}", model.to_uppercase(), brand),
                None => brand.to_string(),
            };
        }

        // No brand anywhere: best-effort guess from the tail of the message.
        let start = tokens.len().saturating_sub(2);
        tokens[start..].join(" ")
    }
}

/// Drops every whitespace token overlapping the first occurrence of `phrase`, so a phrase
/// matched inside a longer word ("pneu" in "pneus") takes the whole word with it.
fn without_phrase_tokens(normalized: &str, phrase: &str) -> String {
    let Some(start) = normalized.find(phrase) else {
        return normalized.to_string();
    };
    let end = start + phrase.len();

    let mut kept = Vec::new();
    let mut offset = 0;
    for token in normalized.split(' ') {
        let token_start = offset;
        let token_end = offset + token.len();
        offset = token_end + 1;
        if token_end <= start || token_start >= end {
            kept.push(token);
        }
    }
    kept.join(" ")
}
