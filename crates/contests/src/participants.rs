use std::collections::HashSet;

use storage::models::{ContestEvent, Round};

/// Distinct person ids across the results of the given rounds.
/// Team results contribute every member.
pub fn participant_ids<'a>(rounds: impl IntoIterator<Item = &'a Round>) -> HashSet<i32> {
    rounds
        .into_iter()
        .flat_map(|round| round.results.iter())
        .flat_map(|result| result.person_ids.iter())
        .collect()
}

/// Distinct person ids across every round of the given events
pub fn contest_participants(events: &[ContestEvent]) -> HashSet<i32> {
    participant_ids(events.iter().flat_map(|event| event.rounds.iter()))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use storage::models::{ContestResult, ParticipantIds, RoundFormat, RoundType};
    use uuid::Uuid;

    use super::*;

    fn round_with(person_ids: &[&str]) -> Round {
        let round_id = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();

        Round {
            round_id,
            competition_id: "Test2024".to_string(),
            event_id: "333".to_string(),
            date,
            round_type_id: RoundType::Final,
            format: RoundFormat::Average,
            proceed: None,
            results: person_ids
                .iter()
                .map(|ids| ContestResult {
                    result_id: Uuid::new_v4(),
                    competition_id: "Test2024".to_string(),
                    event_id: "333".to_string(),
                    round_id,
                    date,
                    person_ids: ids.parse::<ParticipantIds>().unwrap(),
                    ranking: 1,
                    attempts: Vec::new(),
                    best: 1000,
                    average: 1100,
                    single_records: Vec::new(),
                    average_records: Vec::new(),
                    unpublished: true,
                })
                .collect(),
            unpublished: true,
        }
    }

    #[test]
    fn test_team_results_are_split_and_deduplicated() {
        let rounds = vec![round_with(&["5;9"]), round_with(&["9", "12"])];
        let ids = participant_ids(&rounds);
        assert_eq!(ids, HashSet::from([5, 9, 12]));
    }

    #[test]
    fn test_no_results_means_no_participants() {
        let rounds = vec![round_with(&[])];
        assert!(participant_ids(&rounds).is_empty());
    }
}
