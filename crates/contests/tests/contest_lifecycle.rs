//! End-to-end tests of the contest lifecycle against the in-memory store.
//!
//! Covers creation, structural edits, state transitions, results posting with
//! record detection, and the rollback of failed posts.

use std::sync::Arc;

use chrono::NaiveDate;
use contests::reconcile::RoundChange;
use contests::state::ContestField;
use contests::{ContestService, ContestSettings, ErrorKind, Role, TransitionOutcome};
use storage::MemoryStore;
use storage::dto::contest::{ContestRequest, EventRequest, ResultRequest, RoundRequest};
use storage::models::{
    Attempt, Contest, ContestResult, ContestState, ContestType, EventDefinition, ParticipantIds,
    Person, ProceedRule, ProceedType, RecordCategory, RecordPair, RecordType, Round, RoundFormat,
    RoundType,
};
use storage::traits::{ContestStore, ResultStore};
use uuid::Uuid;

const ID: &str = "Munich2024";

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn setup() -> (Arc<MemoryStore>, ContestService<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());

    for (event_id, rank) in [("333", 10), ("222", 20)] {
        store.add_event(EventDefinition {
            event_id: event_id.to_string(),
            name: event_id.to_string(),
            rank,
        });
    }
    for person_id in [5, 9, 12] {
        store.add_person(Person {
            person_id,
            name: format!("Person {}", person_id),
            country_iso2: "DE".to_string(),
        });
    }
    store.add_record_type(RecordType {
        label: "WR".to_string(),
        category: RecordCategory::World,
        active: true,
    });
    store.add_record_type(RecordType {
        label: "NR".to_string(),
        category: RecordCategory::National,
        active: false,
    });

    let service = ContestService::new(store.clone(), ContestSettings::default());
    (store, service)
}

fn top_eight() -> Option<ProceedRule> {
    Some(ProceedRule {
        kind: ProceedType::Number,
        value: 8,
    })
}

fn round_request(date: NaiveDate, proceed: Option<ProceedRule>) -> RoundRequest {
    RoundRequest {
        round_id: None,
        date,
        round_type_id: if proceed.is_some() {
            RoundType::First
        } else {
            RoundType::Final
        },
        format: RoundFormat::Average,
        proceed,
        results: Vec::new(),
    }
}

fn event_request(event_id: &str, rounds: Vec<RoundRequest>) -> EventRequest {
    EventRequest {
        event_id: event_id.to_string(),
        rounds,
    }
}

fn contest_request(events: Vec<EventRequest>) -> ContestRequest {
    ContestRequest {
        competition_id: ID.to_string(),
        name: "Munich Open 2024".to_string(),
        contest_type: ContestType::Meetup,
        city: "Munich".to_string(),
        venue: "Hall".to_string(),
        address: None,
        country_id: "DE".to_string(),
        latitude: None,
        longitude: None,
        start_date: day(2),
        end_date: None,
        organizers: vec![5],
        contact: None,
        description: None,
        competitor_limit: None,
        main_event_id: "333".to_string(),
        events,
    }
}

/// Request that keeps `round` as it is, carrying the given results
fn posted_round(round: &Round, results: Vec<ResultRequest>) -> RoundRequest {
    RoundRequest {
        round_id: Some(round.round_id),
        date: round.date,
        round_type_id: round.round_type_id,
        format: round.format,
        proceed: round.proceed,
        results,
    }
}

fn result(person_ids: &[i32], values: [i64; 5]) -> ResultRequest {
    ResultRequest {
        person_ids: ParticipantIds::new(person_ids.to_vec()),
        attempts: values.iter().map(|&result| Attempt { result }).collect(),
    }
}

async fn create_single_round_contest(service: &ContestService<MemoryStore>) -> Contest {
    service
        .create_contest(
            &contest_request(vec![event_request("333", vec![round_request(day(2), None)])]),
            1,
        )
        .await
        .unwrap()
}

async fn stored(store: &MemoryStore) -> Contest {
    store.find_contest(ID).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_create_contest_starts_empty() {
    let (store, service) = setup();
    let contest = create_single_round_contest(&service).await;

    assert_eq!(contest.state, ContestState::Created);
    assert_eq!(contest.participants, 0);
    assert_eq!(contest.organizers[0].person_id, 5);

    let stored = stored(&store).await;
    assert_eq!(stored.events.len(), 1);
    assert!(stored.events[0].rounds[0].unpublished);
    assert!(!stored.events[0].has_results());
}

#[tokio::test]
async fn test_create_rejects_invalid_definitions() {
    let (store, service) = setup();
    create_single_round_contest(&service).await;

    let duplicate = service
        .create_contest(
            &contest_request(vec![event_request("333", vec![round_request(day(2), None)])]),
            1,
        )
        .await
        .unwrap_err();
    assert_eq!(duplicate.kind(), ErrorKind::Rejected);

    let mut no_rounds = contest_request(vec![event_request("333", vec![])]);
    no_rounds.competition_id = "Other2024".to_string();
    let error = service.create_contest(&no_rounds, 1).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Rejected);

    let mut too_many = contest_request(vec![event_request(
        "333",
        (0..11)
            .map(|i| round_request(day(2), if i < 10 { top_eight() } else { None }))
            .collect(),
    )]);
    too_many.competition_id = "Other2024".to_string();
    let error = service.create_contest(&too_many, 1).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Rejected);

    let mut no_end_date =
        contest_request(vec![event_request("333", vec![round_request(day(2), None)])]);
    no_end_date.competition_id = "Other2024".to_string();
    no_end_date.contest_type = ContestType::Competition;
    let error = service.create_contest(&no_end_date, 1).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Rejected);

    let mut unknown_event = contest_request(vec![
        event_request("333", vec![round_request(day(2), None)]),
        event_request("magic", vec![round_request(day(2), None)]),
    ]);
    unknown_event.competition_id = "Other2024".to_string();
    let error = service.create_contest(&unknown_event, 1).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Rejected);

    for rejected in [no_rounds, too_many, no_end_date, unknown_event.clone()] {
        assert!(
            store.find_contest(&rejected.competition_id).await.unwrap().is_none(),
            "a rejected definition must not leave a contest behind"
        );
    }

    // Once corrected, the same definition goes through
    unknown_event.events.pop();
    let contest = service.create_contest(&unknown_event, 1).await.unwrap();
    assert_eq!(contest.events.len(), 1);
}

#[tokio::test]
async fn test_posting_to_approved_contest_moves_it_to_ongoing() {
    let (store, service) = setup();
    let contest = create_single_round_contest(&service).await;
    store.force_state(ID, ContestState::Approved).unwrap();

    let round = &contest.events[0].rounds[0];
    let response = service
        .post_results(
            ID,
            &[event_request(
                "333",
                vec![posted_round(
                    round,
                    vec![
                        result(&[5], [1000, 1000, 1000, 1000, 1000]),
                        result(&[9], [1100, 1100, 1100, 1100, 1100]),
                    ],
                )],
            )],
        )
        .await
        .unwrap();

    assert_eq!(response.participants, 2);

    let stored = stored(&store).await;
    assert_eq!(stored.state, ContestState::Ongoing);
    assert_eq!(stored.participants, 2);
    assert_eq!(stored.events[0].rounds[0].results.len(), 2);
}

#[tokio::test]
async fn test_posting_to_created_contest_is_rejected() {
    let (store, service) = setup();
    let contest = create_single_round_contest(&service).await;

    let round = &contest.events[0].rounds[0];
    let error = service
        .post_results(
            ID,
            &[event_request(
                "333",
                vec![posted_round(round, vec![result(&[5], [1000; 5])])],
            )],
        )
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Rejected);
    let stored = stored(&store).await;
    assert_eq!(stored.state, ContestState::Created);
    assert!(store.find_results(ID).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_posting_to_finished_contest_is_rejected() {
    let (store, service) = setup();
    let contest = create_single_round_contest(&service).await;
    store.force_state(ID, ContestState::Finished).unwrap();

    let round = &contest.events[0].rounds[0];
    let error = service
        .post_results(
            ID,
            &[event_request("333", vec![posted_round(round, vec![])])],
        )
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Rejected);
}

#[tokio::test]
async fn test_posting_to_unknown_round_is_rejected_before_deleting() {
    let (store, service) = setup();
    let contest = create_single_round_contest(&service).await;
    store.force_state(ID, ContestState::Approved).unwrap();

    let round = &contest.events[0].rounds[0];
    let post = [event_request(
        "333",
        vec![posted_round(round, vec![result(&[5], [1000; 5])])],
    )];
    service.post_results(ID, &post).await.unwrap();
    let before = store.find_results(ID).await.unwrap();

    let mut stray = posted_round(round, vec![result(&[9], [900; 5])]);
    stray.round_id = Some(Uuid::new_v4());
    let error = service
        .post_results(ID, &[event_request("333", vec![stray])])
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Rejected);
    assert_eq!(store.find_results(ID).await.unwrap(), before);
}

#[tokio::test]
async fn test_results_are_sorted_and_ranked_by_format() {
    let (store, service) = setup();
    let contest = create_single_round_contest(&service).await;
    store.force_state(ID, ContestState::Approved).unwrap();

    let round = &contest.events[0].rounds[0];
    service
        .post_results(
            ID,
            &[event_request(
                "333",
                vec![posted_round(
                    round,
                    vec![
                        result(&[5], [-1, -1, 1000, 1000, 1000]),
                        result(&[9], [1200, 1200, 1200, 1200, 1200]),
                        result(&[12], [900, 1300, 1200, 1200, 1200]),
                    ],
                )],
            )],
        )
        .await
        .unwrap();

    let results = &stored(&store).await.events[0].rounds[0].results;
    let order: Vec<(i32, i32)> = results
        .iter()
        .map(|r| (r.person_ids.as_slice()[0], r.ranking))
        .collect();

    // 12 and 9 share the average, 12 has the better single
    assert_eq!(order, vec![(12, 1), (9, 2), (5, 3)]);
    assert_eq!(results[2].average, -1);
}

#[tokio::test]
async fn test_failed_insert_restores_previous_results() {
    let (store, service) = setup();
    let contest = create_single_round_contest(&service).await;
    store.force_state(ID, ContestState::Approved).unwrap();

    let round = &contest.events[0].rounds[0];
    service
        .post_results(
            ID,
            &[event_request(
                "333",
                vec![posted_round(
                    round,
                    vec![result(&[5], [1000; 5]), result(&[9], [1100; 5])],
                )],
            )],
        )
        .await
        .unwrap();

    let before_results = store.find_results(ID).await.unwrap();
    let before = stored(&store).await;

    store.fail_nth_result_insert(1);
    let error = service
        .post_results(
            ID,
            &[event_request(
                "333",
                vec![posted_round(round, vec![result(&[12], [800; 5])])],
            )],
        )
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Internal);
    assert_eq!(store.find_results(ID).await.unwrap(), before_results);

    let after = stored(&store).await;
    assert_eq!(after.state, before.state);
    assert_eq!(after.participants, before.participants);
}

#[tokio::test]
async fn test_failed_save_leaves_contest_untouched() {
    let (store, service) = setup();
    let contest = create_single_round_contest(&service).await;
    store.force_state(ID, ContestState::Approved).unwrap();

    store.fail_contest_saves(true);
    let round = &contest.events[0].rounds[0];
    let error = service
        .post_results(
            ID,
            &[event_request(
                "333",
                vec![posted_round(round, vec![result(&[5], [1000; 5])])],
            )],
        )
        .await
        .unwrap_err();
    store.clear_faults();

    assert_eq!(error.kind(), ErrorKind::Internal);
    assert!(store.find_results(ID).await.unwrap().is_empty());

    let after = stored(&store).await;
    assert_eq!(after.state, ContestState::Approved);
    assert_eq!(after.participants, 0);
}

#[tokio::test]
async fn test_failed_rollback_still_reports_the_original_error() {
    let (store, service) = setup();
    let contest = create_single_round_contest(&service).await;
    store.force_state(ID, ContestState::Approved).unwrap();

    let round = &contest.events[0].rounds[0];
    let post = [event_request(
        "333",
        vec![posted_round(round, vec![result(&[5], [1000; 5])])],
    )];
    service.post_results(ID, &post).await.unwrap();

    store.fail_all_result_inserts();
    let error = service.post_results(ID, &post).await.unwrap_err();
    store.clear_faults();

    assert_eq!(error.kind(), ErrorKind::Internal);
    assert!(error.to_string().contains("insert_results"));
}

#[tokio::test]
async fn test_records_never_propagate_backward() {
    let (store, service) = setup();

    // Standing world record from an earlier contest
    store.seed_results(vec![ContestResult {
        result_id: Uuid::new_v4(),
        competition_id: "Old2024".to_string(),
        event_id: "333".to_string(),
        round_id: Uuid::new_v4(),
        date: day(1),
        person_ids: ParticipantIds::new(vec![12]),
        ranking: 1,
        attempts: vec![Attempt { result: 900 }; 5],
        best: 900,
        average: 1000,
        single_records: vec!["WR".to_string()],
        average_records: vec!["WR".to_string()],
        unpublished: false,
    }]);

    let mut request = contest_request(vec![event_request(
        "333",
        vec![round_request(day(2), top_eight()), round_request(day(3), None)],
    )]);
    request.contest_type = ContestType::Competition;
    request.end_date = Some(day(3));
    let contest = service.create_contest(&request, 1).await.unwrap();
    store.force_state(ID, ContestState::Approved).unwrap();

    let rounds = &contest.events[0].rounds;
    service
        .post_results(
            ID,
            &[event_request(
                "333",
                vec![
                    posted_round(
                        &rounds[0],
                        vec![
                            result(&[5], [850, 1000, 1000, 1000, 1000]),
                            result(&[9], [880, 1100, 1100, 1100, 1100]),
                        ],
                    ),
                    posted_round(&rounds[1], vec![result(&[5], [870, 990, 990, 990, 990])]),
                ],
            )],
        )
        .await
        .unwrap();

    let stored = stored(&store).await;
    let first = &stored.events[0].rounds[0].results;
    let second = &stored.events[0].rounds[1].results;

    // Both day-one singles beat the old record; the tied average counts too
    assert_eq!(first[0].single_records, vec!["WR"]);
    assert_eq!(first[0].average_records, vec!["WR"]);
    assert_eq!(first[1].single_records, vec!["WR"]);
    assert!(first[1].average_records.is_empty());

    // Day two is judged against day one
    assert!(second[0].single_records.is_empty());
    assert_eq!(second[0].average_records, vec!["WR"]);

    let current = service
        .get_records_for_event("333", &service.active_record_types().await.unwrap(), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current[&RecordCategory::World], RecordPair { best: 850, average: 990 });

    let mod_view = service.get_mod_contest(ID).await.unwrap();
    let at_start = mod_view.records["333"].as_ref().unwrap();
    assert_eq!(at_start[&RecordCategory::World], RecordPair { best: 900, average: 1000 });
}

#[tokio::test]
async fn test_reconcile_keeps_rounds_with_results() {
    let (store, service) = setup();
    let contest = service
        .create_contest(
            &contest_request(vec![event_request(
                "333",
                vec![round_request(day(2), top_eight()), round_request(day(2), None)],
            )]),
            1,
        )
        .await
        .unwrap();
    store.force_state(ID, ContestState::Approved).unwrap();

    let rounds = &contest.events[0].rounds;
    service
        .post_results(
            ID,
            &[event_request(
                "333",
                vec![posted_round(&rounds[0], vec![result(&[5], [1000; 5])])],
            )],
        )
        .await
        .unwrap();

    // Drops the first round, which now holds results
    let mut final_round = posted_round(&rounds[1], Vec::new());
    final_round.proceed = None;
    let report = service
        .update_contest(
            ID,
            &contest_request(vec![event_request("333", vec![final_round])]),
            &[Role::Moderator],
        )
        .await
        .unwrap();

    let events = report.events.unwrap();
    assert_eq!(
        events.round_change(rounds[0].round_id),
        Some(RoundChange::KeptWithResults)
    );

    let stored = stored(&store).await;
    assert_eq!(stored.events[0].rounds.len(), 2);
    assert_eq!(stored.events[0].rounds[0].results.len(), 1);
}

#[tokio::test]
async fn test_update_with_unknown_event_changes_nothing() {
    let (store, service) = setup();
    let contest = service
        .create_contest(
            &contest_request(vec![
                event_request("333", vec![round_request(day(2), None)]),
                event_request("222", vec![round_request(day(2), None)]),
            ]),
            1,
        )
        .await
        .unwrap();

    let kept = contest
        .events
        .iter()
        .find(|e| e.event_id() == "333")
        .unwrap();
    let request = contest_request(vec![
        event_request("333", vec![posted_round(&kept.rounds[0], vec![])]),
        event_request("magic", vec![round_request(day(2), None)]),
    ]);

    let error = service
        .update_contest(ID, &request, &[Role::Admin])
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Rejected);

    let stored = stored(&store).await;
    let ids: Vec<&str> = stored.events.iter().map(|e| e.event_id()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&"222"));
}

#[tokio::test]
async fn test_update_filters_fields_by_state() {
    let (store, service) = setup();
    let contest = create_single_round_contest(&service).await;
    store.force_state(ID, ContestState::Ongoing).unwrap();

    let round = &contest.events[0].rounds[0];
    let mut request =
        contest_request(vec![event_request("333", vec![posted_round(round, vec![])])]);
    request.name = "Renamed Open".to_string();
    request.contact = Some("orga@example.com".to_string());
    request.competition_id = "Renamed2024".to_string();

    let report = service
        .update_contest(ID, &request, &[Role::Moderator])
        .await
        .unwrap();

    assert_eq!(report.applied, vec![ContestField::Contact]);
    assert!(report.skipped.contains(&ContestField::Name));
    assert!(report.skipped.contains(&ContestField::CompetitionId));
    assert!(!report.skipped.contains(&ContestField::Events));

    let stored = stored(&store).await;
    assert_eq!(stored.name, "Munich Open 2024");
    assert_eq!(stored.contact.as_deref(), Some("orga@example.com"));
}

#[tokio::test]
async fn test_admin_may_rename_contest() {
    let (store, service) = setup();
    create_single_round_contest(&service).await;
    store.force_state(ID, ContestState::Published).unwrap();

    let contest = stored(&store).await;
    let round = &contest.events[0].rounds[0];
    let mut request =
        contest_request(vec![event_request("333", vec![posted_round(round, vec![])])]);
    request.competition_id = "Renamed2024".to_string();

    let report = service
        .update_contest(ID, &request, &[Role::Admin])
        .await
        .unwrap();

    assert_eq!(report.applied, vec![ContestField::CompetitionId]);
    assert!(store.find_contest(ID).await.unwrap().is_none());

    let renamed = store.find_contest("Renamed2024").await.unwrap().unwrap();
    assert_eq!(renamed.events[0].rounds[0].round_id, round.round_id);
}

#[tokio::test]
async fn test_restricted_role_transitions() {
    let (store, service) = setup();
    create_single_round_contest(&service).await;

    store.force_state(ID, ContestState::Ongoing).unwrap();
    let outcome = service
        .advance_state(ID, ContestState::Finished, &[Role::Moderator])
        .await
        .unwrap();
    assert!(matches!(outcome, TransitionOutcome::Applied { .. }));
    assert_eq!(stored(&store).await.state, ContestState::Finished);

    store.force_state(ID, ContestState::Approved).unwrap();
    let outcome = service
        .advance_state(ID, ContestState::Ongoing, &[Role::Moderator])
        .await
        .unwrap();
    assert_eq!(
        outcome,
        TransitionOutcome::Ignored {
            current: ContestState::Approved
        }
    );
    assert_eq!(stored(&store).await.state, ContestState::Approved);
}

#[tokio::test]
async fn test_publishing_clears_unpublished_flags() {
    let (store, service) = setup();
    let contest = create_single_round_contest(&service).await;
    store.force_state(ID, ContestState::Approved).unwrap();

    let round = &contest.events[0].rounds[0];
    service
        .post_results(
            ID,
            &[event_request(
                "333",
                vec![posted_round(round, vec![result(&[5], [1000; 5])])],
            )],
        )
        .await
        .unwrap();

    service
        .advance_state(ID, ContestState::Published, &[Role::Admin])
        .await
        .unwrap();

    let stored = stored(&store).await;
    assert_eq!(stored.state, ContestState::Published);
    assert!(!stored.events[0].rounds[0].unpublished);
    assert!(
        store
            .find_results(ID)
            .await
            .unwrap()
            .iter()
            .all(|r| !r.unpublished)
    );
}

#[tokio::test]
async fn test_public_view_hides_unapproved_contests() {
    let (store, service) = setup();
    let contest = create_single_round_contest(&service).await;

    let error = service.get_contest(ID).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert!(service.list_contests(None).await.unwrap().is_empty());
    assert_eq!(service.list_mod_contests(1, &[Role::Moderator]).await.unwrap().len(), 1);
    assert!(service.list_mod_contests(2, &[Role::Moderator]).await.unwrap().is_empty());

    store.force_state(ID, ContestState::Approved).unwrap();
    let round = &contest.events[0].rounds[0];
    service
        .post_results(
            ID,
            &[event_request(
                "333",
                vec![posted_round(round, vec![result(&[5, 9], [1000; 5])])],
            )],
        )
        .await
        .unwrap();

    let data = service.get_contest(ID).await.unwrap();
    let ids: Vec<i32> = data.persons.iter().map(|p| p.person_id).collect();
    assert_eq!(ids, vec![5, 9]);
    assert_eq!(service.list_contests(Some("DE")).await.unwrap().len(), 1);
    assert!(service.list_contests(Some("FR")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_requires_privileged_role() {
    let (store, service) = setup();
    create_single_round_contest(&service).await;

    let error = service
        .delete_contest(ID, &[Role::Moderator])
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Rejected);

    service.delete_contest(ID, &[Role::Admin]).await.unwrap();
    assert!(store.find_contest(ID).await.unwrap().is_none());

    let error = service.delete_contest(ID, &[Role::Admin]).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_concurrent_posts_do_not_mix_results() {
    let (store, service) = setup();
    let contest = create_single_round_contest(&service).await;
    store.force_state(ID, ContestState::Approved).unwrap();
    let service = Arc::new(service);

    let round = &contest.events[0].rounds[0];
    let first = [event_request(
        "333",
        vec![posted_round(round, vec![result(&[5], [1000; 5]), result(&[9], [1100; 5])])],
    )];
    let second = [event_request(
        "333",
        vec![posted_round(round, vec![result(&[12], [900; 5])])],
    )];

    let (a, b) = tokio::join!(service.post_results(ID, &first), service.post_results(ID, &second));
    a.unwrap();
    b.unwrap();

    let count = store.find_results(ID).await.unwrap().len();
    assert!(count == 1 || count == 2);
}
