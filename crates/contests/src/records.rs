//! Record standings and detection of newly set records.

use chrono::{DateTime, NaiveDate, Utc};
use storage::models::{RecordPair, RecordSnapshot, RecordType, Round};
use storage::traits::ResultsQuery;

use crate::error::Result;

/// Date-granular cutoff for record queries. No date means "now and forever",
/// i.e. the current all-time records.
pub fn record_cutoff(before: Option<DateTime<Utc>>) -> NaiveDate {
    before.map_or(NaiveDate::MAX, |date| date.date_naive())
}

/// Record standing of an event per active record category, considering only
/// results dated strictly before the cutoff day.
///
/// Returns `None` when no record type is active. Categories without any record
/// are reported with the [`RecordPair::NONE`] sentinel.
pub async fn compute_records<Q>(
    query: &Q,
    event_id: &str,
    record_types: &[RecordType],
    before: Option<DateTime<Utc>>,
) -> Result<Option<RecordSnapshot>>
where
    Q: ResultsQuery + ?Sized,
{
    let active: Vec<&RecordType> = record_types.iter().filter(|rt| rt.active).collect();
    if active.is_empty() {
        return Ok(None);
    }

    let cutoff = record_cutoff(before);
    let mut snapshot = RecordSnapshot::new();

    for record_type in active {
        let mut pair = RecordPair::empty();

        let singles = query
            .best_single_before(event_id, &record_type.label, cutoff)
            .await?;
        if let Some(holder) = singles.first() {
            pair.best = holder.best;
        }

        let averages = query
            .best_average_before(event_id, &record_type.label, cutoff)
            .await?;
        if let Some(holder) = averages.first() {
            pair.average = holder.average;
        }

        snapshot.insert(record_type.category, pair);
    }

    Ok(Some(snapshot))
}

/// Labels the results of a batch of same-day rounds that tie or beat the
/// standing in `snapshot`, then moves the standing to the best value of the
/// batch.
///
/// Every result of the batch is judged against the standing from before the
/// batch, so results from the same day never disqualify each other. Returns
/// the number of labels handed out.
pub fn set_same_day_records(
    rounds: &mut [Round],
    snapshot: &mut RecordSnapshot,
    record_types: &[RecordType],
) -> usize {
    let mut labels = 0;

    for record_type in record_types.iter().filter(|rt| rt.active) {
        let standing = snapshot
            .get(&record_type.category)
            .copied()
            .unwrap_or_default();
        let mut updated = standing;

        for result in rounds.iter_mut().flat_map(|round| round.results.iter_mut()) {
            if RecordPair::qualifies(result.best, standing.best) {
                if !result.single_records.contains(&record_type.label) {
                    result.single_records.push(record_type.label.clone());
                    labels += 1;
                }
                if RecordPair::qualifies(result.best, updated.best) {
                    updated.best = result.best;
                }
            }

            if RecordPair::qualifies(result.average, standing.average) {
                if !result.average_records.contains(&record_type.label) {
                    result.average_records.push(record_type.label.clone());
                    labels += 1;
                }
                if RecordPair::qualifies(result.average, updated.average) {
                    updated.average = result.average;
                }
            }
        }

        snapshot.insert(record_type.category, updated);
    }

    labels
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use storage::MemoryStore;
    use storage::models::{
        ContestResult, ParticipantIds, RecordCategory, RoundFormat, RoundType,
    };
    use uuid::Uuid;

    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn world_record() -> RecordType {
        RecordType {
            label: "WR".to_string(),
            category: RecordCategory::World,
            active: true,
        }
    }

    fn result(best: i64, average: i64, day: u32) -> ContestResult {
        ContestResult {
            result_id: Uuid::new_v4(),
            competition_id: "Old2024".to_string(),
            event_id: "333".to_string(),
            round_id: Uuid::new_v4(),
            date: date(day),
            person_ids: ParticipantIds::new(vec![1]),
            ranking: 1,
            attempts: Vec::new(),
            best,
            average,
            single_records: Vec::new(),
            average_records: Vec::new(),
            unpublished: false,
        }
    }

    fn record_result(best: i64, average: i64, day: u32) -> ContestResult {
        let mut result = result(best, average, day);
        result.single_records.push("WR".to_string());
        result.average_records.push("WR".to_string());
        result
    }

    fn round(results: Vec<ContestResult>) -> Round {
        Round {
            round_id: Uuid::new_v4(),
            competition_id: "New2024".to_string(),
            event_id: "333".to_string(),
            date: date(10),
            round_type_id: RoundType::Final,
            format: RoundFormat::Average,
            proceed: None,
            results,
            unpublished: true,
        }
    }

    #[test]
    fn test_cutoff_drops_time_of_day() {
        let before = Utc.with_ymd_and_hms(2024, 3, 2, 23, 59, 0).unwrap();
        assert_eq!(record_cutoff(Some(before)), date(2));
        assert_eq!(record_cutoff(None), NaiveDate::MAX);
    }

    #[tokio::test]
    async fn test_no_active_record_types() {
        let store = MemoryStore::new();
        let mut inactive = world_record();
        inactive.active = false;

        let records = compute_records(&store, "333", &[inactive], None).await.unwrap();
        assert!(records.is_none());
    }

    #[tokio::test]
    async fn test_missing_record_uses_sentinel() {
        let store = MemoryStore::new();
        let records = compute_records(&store, "333", &[world_record()], None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(records[&RecordCategory::World], RecordPair::empty());
    }

    #[tokio::test]
    async fn test_records_before_a_date() {
        let store = MemoryStore::new();
        store.seed_results(vec![record_result(900, 1000, 1), record_result(800, 950, 5)]);

        let before = Utc.with_ymd_and_hms(2024, 3, 5, 18, 0, 0).unwrap();
        let past = compute_records(&store, "333", &[world_record()], Some(before))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(past[&RecordCategory::World], RecordPair { best: 900, average: 1000 });

        let current = compute_records(&store, "333", &[world_record()], None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current[&RecordCategory::World], RecordPair { best: 800, average: 950 });
    }

    #[tokio::test]
    async fn test_compute_records_is_idempotent() {
        let store = MemoryStore::new();
        store.seed_results(vec![record_result(900, 1000, 1)]);

        let first = compute_records(&store, "333", &[world_record()], None).await.unwrap();
        let second = compute_records(&store, "333", &[world_record()], None).await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ties_count_as_records() {
        let mut snapshot = RecordSnapshot::from([(
            RecordCategory::World,
            RecordPair { best: 900, average: 1000 },
        )]);
        let mut rounds = vec![round(vec![result(900, 1001, 10), result(950, 1000, 10)])];

        set_same_day_records(&mut rounds, &mut snapshot, &[world_record()]);

        assert_eq!(rounds[0].results[0].single_records, vec!["WR"]);
        assert!(rounds[0].results[0].average_records.is_empty());
        assert!(rounds[0].results[1].single_records.is_empty());
        assert_eq!(rounds[0].results[1].average_records, vec!["WR"]);
    }

    #[test]
    fn test_same_day_results_are_judged_against_previous_standing() {
        let mut snapshot = RecordSnapshot::from([(
            RecordCategory::World,
            RecordPair { best: 900, average: -1 },
        )]);
        let mut rounds = vec![
            round(vec![result(850, 0, 10)]),
            round(vec![result(880, 0, 10)]),
        ];

        set_same_day_records(&mut rounds, &mut snapshot, &[world_record()]);

        assert_eq!(rounds[0].results[0].single_records, vec!["WR"]);
        assert_eq!(rounds[1].results[0].single_records, vec!["WR"]);
        assert_eq!(snapshot[&RecordCategory::World].best, 850);
    }

    #[test]
    fn test_dnf_never_sets_a_record() {
        let mut snapshot = RecordSnapshot::from([(RecordCategory::World, RecordPair::empty())]);
        let mut rounds = vec![round(vec![result(-1, -1, 10)])];

        let labels = set_same_day_records(&mut rounds, &mut snapshot, &[world_record()]);

        assert_eq!(labels, 0);
        assert_eq!(snapshot[&RecordCategory::World], RecordPair::empty());
    }

    #[test]
    fn test_every_active_category_is_evaluated() {
        let national = RecordType {
            label: "NR".to_string(),
            category: RecordCategory::National,
            active: true,
        };
        let mut snapshot = RecordSnapshot::from([
            (RecordCategory::World, RecordPair { best: 500, average: -1 }),
            (RecordCategory::National, RecordPair { best: 900, average: -1 }),
        ]);
        let mut rounds = vec![round(vec![result(800, 0, 10)])];

        set_same_day_records(&mut rounds, &mut snapshot, &[world_record(), national]);

        assert_eq!(rounds[0].results[0].single_records, vec!["NR"]);
        assert_eq!(snapshot[&RecordCategory::National].best, 800);
        assert_eq!(snapshot[&RecordCategory::World].best, 500);
    }
}
