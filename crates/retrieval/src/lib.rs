use std::cmp::Ordering;

use oficina_core::{ProcedureIntent, ProcedureRecord};

/// Upper bound on records returned for one query.
pub const MAX_RESULTS: usize = 5;

/// Both fields must contain the intent's counterpart, ignoring case. Empty intent fields
/// match anything.
pub fn matches(intent: &ProcedureIntent, record: &ProcedureRecord) -> bool {
    contains_ignore_case(&record.operation, &intent.operation)
        && contains_ignore_case(&record.equipment, &intent.equipment)
}

/// Matching records, newest first, at most [`MAX_RESULTS`].
pub fn search<'a, I>(intent: &ProcedureIntent, records: I) -> Vec<ProcedureRecord>
where
    I: IntoIterator<Item = &'a ProcedureRecord>,
{
    search_with_limit(intent, records, MAX_RESULTS)
}

pub fn search_with_limit<'a, I>(
    intent: &ProcedureIntent,
    records: I,
    limit: usize,
) -> Vec<ProcedureRecord>
where
    I: IntoIterator<Item = &'a ProcedureRecord>,
{
    let mut hits = records
        .into_iter()
        .filter(|record| matches(intent, record))
        .collect::<Vec<_>>();

    hits.sort_by(|a, b| recency(b, a));

    hits.into_iter().take(limit).cloned().collect()
}

fn recency(a: &ProcedureRecord, b: &ProcedureRecord) -> Ordering {
    a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    needle.is_empty() || haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn record(id: i64, operation: &str, equipment: &str, minutes: i64) -> ProcedureRecord {
        ProcedureRecord {
            id,
            equipment: equipment.to_string(),
            operation: operation.to_string(),
            description: None,
            photo_urls: Vec::new(),
            created_by: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap()
                + Duration::minutes(minutes),
        }
    }

    #[test]
    fn empty_intent_matches_everything_newest_first() {
        let records = (1..=7)
            .map(|id| record(id, "troca de correia", "hyster", id * 10))
            .collect::<Vec<_>>();

        let hits = search(&ProcedureIntent::default(), &records);

        assert_eq!(hits.len(), MAX_RESULTS);
        assert_eq!(
            hits.iter().map(|hit| hit.id).collect::<Vec<_>>(),
            vec![7, 6, 5, 4, 3]
        );
    }

    #[test]
    fn operation_must_be_contained() {
        let records = vec![record(1, "correia", "RRE160HCC TOYOTA", 0)];
        let intent = ProcedureIntent::new("rolamento", "");
        assert!(search(&intent, &records).is_empty());
    }

    #[test]
    fn both_predicates_are_required_and_case_insensitive() {
        let records = vec![
            record(1, "troca de correia", "RRE160HCC TOYOTA", 0),
            record(2, "troca de correia", "H50FT hyster", 5),
            record(3, "troca de rolamento", "RRE160HCC toyota", 10),
        ];

        let hits = search(&ProcedureIntent::new("Correia", "rre160hcc toyota"), &records);
        assert_eq!(hits.iter().map(|hit| hit.id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn equal_timestamps_prefer_latest_insert() {
        let records = vec![
            record(1, "troca de oleo", "toyota", 0),
            record(2, "troca de oleo", "toyota", 0),
        ];
        let hits = search(&ProcedureIntent::new("oleo", "toyota"), &records);
        assert_eq!(hits[0].id, 2);
    }
}
