//! Integration tests for address checks and correction flows

mod helpers;

use std::time::Duration;

use fieldkit_common::events::{CorrectionFlow, EngineEvent, UserDecision};
use fieldkit_common::FieldValue;
use fieldkit_engine::capability::address::{
    ADDRESS_PREDICTIONS, ADDRESS_STATUS, BUILDING_NUMBER, LOCALITY, POSTAL_CODE,
};
use fieldkit_engine::capability::AddressCheckCapability;
use fieldkit_engine::Record;
use helpers::{
    address_record, berlin_prediction, fill_address, page, page_with_config, prediction,
    test_config, FakeRemote, ScriptedPresenter,
};

fn status_of(record: &Record) -> Vec<String> {
    record
        .get(ADDRESS_STATUS)
        .map(|value| value.text_items())
        .unwrap_or_default()
}

fn has(status: &[String], token: &str) -> bool {
    status.iter().any(|t| t == token)
}

fn other_prediction() -> fieldkit_engine::remote::Prediction {
    prediction(&[
        ("country_code", "DE"),
        ("postal_code", "10117"),
        ("locality", "Berlin"),
        ("street_name", "Invalidenstraße"),
        ("building_number", "17"),
    ])
}

#[tokio::test]
async fn test_correct_address_proceeds() {
    let remote = FakeRemote::new();
    remote.push_check(&["A1000"], vec![]);
    let presenter = ScriptedPresenter::new(vec![]);
    let orchestrator = page(remote.clone(), presenter.clone());
    let record = address_record(&orchestrator, 0).await;
    fill_address(&record, &[]).await;

    let outcome = orchestrator.submit().await;

    assert!(outcome.proceed);
    let (id, check) = &outcome.per_record[0];
    assert_eq!(*id, record.id());
    assert_eq!(check.flow, CorrectionFlow::Resume);
    assert_eq!(check.attempt, 1);

    let status = status_of(&record);
    assert_eq!(status[0], "address_correct");
    assert!(has(&status, "locality_correct"));
    assert!(!record.is_changed());
    assert_eq!(presenter.presented(), 0);
}

#[tokio::test]
async fn test_assigned_status_is_normalized_and_derived() {
    let orchestrator = page(FakeRemote::new(), ScriptedPresenter::new(vec![]));
    let record = address_record(&orchestrator, 0).await;
    fill_address(&record, &[(LOCALITY, "Berlinn")]).await;

    record
        .set_field(ADDRESS_STATUS, vec!["A1000".to_string(), "A1100".to_string()])
        .await;
    let status = status_of(&record);
    assert_eq!(status[0], "address_needs_correction");
    assert!(!has(&status, "address_correct"));
    assert!(!has(&status, "A1000"));
    assert!(has(&status, "locality_needs_correction"));
    assert!(has(&status, "postal_code_needs_correction"));

    record
        .set_field(
            ADDRESS_PREDICTIONS,
            FieldValue::List(vec![berlin_prediction().to_field_value()]),
        )
        .await;
    record
        .set_field(ADDRESS_STATUS, vec!["A1100".to_string()])
        .await;
    let status = status_of(&record);
    assert_eq!(status[0], "address_needs_correction");
    assert!(has(&status, "address_minor_correction"));
    assert!(has(&status, "locality_needs_correction"));
    assert!(has(&status, &format!("{}_correct", POSTAL_CODE)));

    record
        .set_field(ADDRESS_STATUS, vec!["address_correct".to_string()])
        .await;
    let status = status_of(&record);
    assert_eq!(status[0], "address_correct");
    assert!(has(&status, "locality_correct"));
    assert!(!has(&status, "address_minor_correction"));
}

#[tokio::test]
async fn test_unchanged_record_reuses_last_outcome() {
    let remote = FakeRemote::new();
    let orchestrator = page(remote.clone(), ScriptedPresenter::new(vec![]));
    let record = address_record(&orchestrator, 0).await;
    fill_address(&record, &[]).await;

    let first = orchestrator.submit().await;
    let second = orchestrator.submit().await;

    assert_eq!(remote.check_count(), 1);
    assert_eq!(first.per_record, second.per_record);

    record.set_field(LOCALITY, "Potsdam").await;
    orchestrator.submit().await;
    assert_eq!(remote.check_count(), 2);
}

#[tokio::test]
async fn test_customer_selects_variant() {
    let remote = FakeRemote::new();
    remote.push_check(&["A1100"], vec![berlin_prediction(), other_prediction()]);
    let presenter = ScriptedPresenter::new(vec![UserDecision::SelectVariant { index: 0 }]);
    let orchestrator = page(remote.clone(), presenter.clone());
    let record = address_record(&orchestrator, 0).await;
    fill_address(&record, &[(LOCALITY, "Berlinn")]).await;
    let mut events = orchestrator.context().events.subscribe();

    let outcome = orchestrator.submit().await;

    assert!(outcome.proceed);
    let check = &outcome.per_record[0].1;
    assert_eq!(check.flow, CorrectionFlow::VariantSelection);
    assert_eq!(check.decision, Some(UserDecision::SelectVariant { index: 0 }));

    {
        let requests = presenter.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].predictions.len(), 2);
        assert_eq!(
            requests[0].input.get(LOCALITY).map(String::as_str),
            Some("Berlinn")
        );
    }

    assert_eq!(record.get_text(LOCALITY), "Berlin");
    let status = status_of(&record);
    assert_eq!(status[0], "address_correct");
    assert!(has(&status, "address_selected_by_customer"));
    assert!(record.get(ADDRESS_PREDICTIONS).unwrap().is_empty());

    let mut opened = false;
    let mut closed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            EngineEvent::PopupOpened { flow, .. } => {
                assert_eq!(flow, CorrectionFlow::VariantSelection);
                opened = true;
            }
            EngineEvent::PopupClosed { .. } => closed = true,
            _ => {}
        }
    }
    assert!(opened && closed);
}

#[tokio::test]
async fn test_missing_building_number_asks_for_edit() {
    let remote = FakeRemote::new();
    remote.push_check(&["A1100"], vec![berlin_prediction()]);
    let presenter = ScriptedPresenter::new(vec![UserDecision::Edit]);
    let orchestrator = page(remote.clone(), presenter.clone());
    let record = address_record(&orchestrator, 0).await;
    fill_address(&record, &[(BUILDING_NUMBER, "")]).await;

    let outcome = orchestrator.submit().await;

    assert!(!outcome.proceed);
    let check = &outcome.per_record[0].1;
    assert_eq!(check.flow, CorrectionFlow::CorrectionWithoutPredictions);
    assert!(!check.resume);
    assert!(has(&status_of(&record), "building_number_is_missing"));
    assert_eq!(record.get_text(LOCALITY), "Berlin");
}

#[tokio::test]
async fn test_minor_correction_applied_on_second_attempt() {
    let remote = FakeRemote::new();
    remote.push_check(&["A1100"], vec![berlin_prediction()]);
    remote.push_check(&["A1100"], vec![berlin_prediction()]);
    let presenter = ScriptedPresenter::new(vec![UserDecision::Edit]);
    let orchestrator = page(remote.clone(), presenter.clone());
    let record = address_record(&orchestrator, 0).await;
    fill_address(&record, &[(LOCALITY, "Berlinn")]).await;

    let first = orchestrator.submit().await;
    assert!(!first.proceed);
    assert_eq!(first.per_record[0].1.flow, CorrectionFlow::VariantSelection);

    record.set_field(LOCALITY, "Berlim").await;
    let second = orchestrator.submit().await;

    assert!(second.proceed);
    let check = &second.per_record[0].1;
    assert_eq!(check.attempt, 2);
    assert_eq!(check.flow, CorrectionFlow::AutoApply);
    assert_eq!(record.get_text(LOCALITY), "Berlin");
    assert!(has(&status_of(&record), "address_selected_automatically"));
    assert_eq!(presenter.presented(), 1);
}

#[tokio::test]
async fn test_not_found_force_confirm() {
    let remote = FakeRemote::new();
    remote.push_check(&["A2000"], vec![]);
    let presenter = ScriptedPresenter::new(vec![UserDecision::ForceConfirm]);
    let orchestrator = page(remote.clone(), presenter.clone());
    let record = address_record(&orchestrator, 0).await;
    fill_address(&record, &[(LOCALITY, "Atlantis")]).await;

    let outcome = orchestrator.submit().await;

    assert!(outcome.proceed);
    assert_eq!(outcome.per_record[0].1.flow, CorrectionFlow::NotFound);
    let status = status_of(&record);
    assert_eq!(status[0], "address_not_found");
    assert!(has(&status, "address_selected_by_customer"));
    assert_eq!(record.get_text(LOCALITY), "Atlantis");
}

#[tokio::test]
async fn test_not_found_with_predictions_blocks_without_popup() {
    let remote = FakeRemote::new();
    remote.push_check(&["A2000"], vec![berlin_prediction()]);
    let presenter = ScriptedPresenter::new(vec![]);
    let orchestrator = page(remote.clone(), presenter.clone());
    let record = address_record(&orchestrator, 0).await;
    fill_address(&record, &[]).await;

    let outcome = orchestrator.submit().await;

    assert!(!outcome.proceed);
    assert_eq!(outcome.per_record[0].1.flow, CorrectionFlow::NoAction);
    assert_eq!(presenter.presented(), 0);
}

#[tokio::test]
async fn test_multiple_variants_without_predictions() {
    let remote = FakeRemote::new();
    remote.push_check(&["A1110"], vec![]);
    let presenter = ScriptedPresenter::new(vec![UserDecision::Edit]);
    let orchestrator = page(remote.clone(), presenter.clone());
    let record = address_record(&orchestrator, 0).await;
    fill_address(&record, &[]).await;

    let outcome = orchestrator.submit().await;

    assert_eq!(
        outcome.per_record[0].1.flow,
        CorrectionFlow::CorrectionWithoutPredictions
    );
    assert_eq!(presenter.presented(), 1);
}

#[tokio::test]
async fn test_remote_failure_blocks_by_default() {
    let remote = FakeRemote::new();
    remote.push_check_failure();
    let orchestrator = page(remote.clone(), ScriptedPresenter::new(vec![]));
    let record = address_record(&orchestrator, 0).await;
    fill_address(&record, &[]).await;

    let outcome = orchestrator.submit().await;

    assert!(!outcome.proceed);
    let check = &outcome.per_record[0].1;
    assert!(check.remote_failed);
    assert_eq!(check.flow, CorrectionFlow::NoAction);
    assert!(!record.is_changed());
}

#[tokio::test]
async fn test_remote_failure_resumes_when_configured() {
    let remote = FakeRemote::new();
    remote.push_check_failure();
    let mut config = test_config();
    config.check.resume_submit_on_failure = true;
    let orchestrator = page_with_config(config, remote.clone(), ScriptedPresenter::new(vec![]));
    let record = address_record(&orchestrator, 0).await;
    fill_address(&record, &[]).await;

    let outcome = orchestrator.submit().await;

    assert!(outcome.proceed);
    assert!(outcome.per_record[0].1.remote_failed);
}

#[tokio::test(start_paused = true)]
async fn test_popups_never_overlap_across_records() {
    let remote = FakeRemote::new();
    remote.push_check(&["A2000"], vec![]);
    remote.push_check(&["A2000"], vec![]);
    let presenter = ScriptedPresenter::holding(
        vec![UserDecision::ForceConfirm, UserDecision::ForceConfirm],
        Duration::from_millis(100),
    );
    let orchestrator = page(remote.clone(), presenter.clone());
    let billing = address_record(&orchestrator, 0).await;
    let shipping = address_record(&orchestrator, 1).await;
    fill_address(&billing, &[]).await;
    fill_address(&shipping, &[]).await;

    let outcome = orchestrator.submit().await;

    assert!(outcome.proceed);
    assert_eq!(presenter.presented(), 2);
    assert_eq!(presenter.max_open(), 1);
    assert!(!orchestrator.context().popups.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_repeated_blur_schedules_single_check() {
    let remote = FakeRemote::new();
    let orchestrator = page(remote.clone(), ScriptedPresenter::new(vec![]));
    let record = address_record(&orchestrator, 0).await;
    fill_address(&record, &[]).await;
    let checker = AddressCheckCapability::checker(&record).unwrap();

    record.notify_blur(LOCALITY);
    tokio::time::sleep(Duration::from_millis(100)).await;
    record.notify_blur(LOCALITY);
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(checker.blur_check_pending());
    assert_eq!(remote.check_count(), 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    orchestrator.context().quiescence.wait_until_quiet().await;

    assert_eq!(remote.check_count(), 1);
    assert_eq!(checker.attempts(), 1);
    assert!(!record.is_changed());
}

#[tokio::test(start_paused = true)]
async fn test_blur_on_clean_record_does_not_check() {
    let remote = FakeRemote::new();
    let orchestrator = page(remote.clone(), ScriptedPresenter::new(vec![]));
    let record = address_record(&orchestrator, 0).await;

    record.notify_blur(LOCALITY);
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(remote.check_count(), 0);
}
