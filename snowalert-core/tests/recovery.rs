//! Restart recovery: replaying a stored document reproduces the schedule
//! without writing anything.

mod common;

use common::{Harness, goettingen_source};
use snowalert_core::{
    AlertName, ChatId, CheckTime, Coordinates, LocationKey, RecoveryError, Timer,
};

const TIMES: &[(u32, u32)] = &[(8, 0), (18, 0)];

async fn populated() -> Harness {
    let h = Harness::with_source(TIMES, goettingen_source());
    h.service.subscribe(ChatId(100), Coordinates::new(51.55, 9.95)).await.unwrap();
    h.service.subscribe(ChatId(100), Coordinates::new(48.1, 11.6)).await.unwrap();
    h.service.subscribe(ChatId(200), Coordinates::new(51.5, 9.9)).await.unwrap();
    h
}

#[tokio::test]
async fn restart_reproduces_schedule_without_flushing() {
    let before = populated().await;
    let document = before.persistence.stored().unwrap();

    let after = Harness::restarted(document.clone(), TIMES, before.source.clone())
        .await
        .unwrap();

    assert_eq!(after.persistence.flush_count(), 0);
    assert_eq!(after.persistence.stored().unwrap(), document);
    assert_eq!(after.timer.names(), before.timer.names());
    assert_eq!(after.service.associations().await, before.service.associations().await);
    assert_eq!(after.service.location_keys().await, before.service.location_keys().await);
    assert_eq!(after.service.document().await, document);
}

#[tokio::test]
async fn recovered_jobs_carry_stored_time_and_context() {
    let before = populated().await;
    let document = before.persistence.stored().unwrap();

    let after = Harness::restarted(document.clone(), TIMES, before.source.clone())
        .await
        .unwrap();

    let jobs = after.timer.jobs();
    assert_eq!(jobs.len(), document.alerts.len());
    for job in jobs {
        let record = &document.alerts[&job.name];
        assert_eq!(job.time, record.time);
        assert_eq!(job.context, record.context);
    }
}

#[tokio::test]
async fn recovering_twice_is_idempotent() {
    let before = populated().await;
    let document = before.persistence.stored().unwrap();
    let after = Harness::restarted(document.clone(), TIMES, before.source.clone())
        .await
        .unwrap();
    let associations = after.service.associations().await;
    let names = after.timer.names();
    let keys = after.service.location_keys().await;

    let report = after.service.recover(&document).await.unwrap();

    assert_eq!(report.locations, 2);
    assert_eq!(report.alerts, 6);
    assert_eq!(after.service.associations().await, associations);
    assert_eq!(after.timer.names(), names);
    assert_eq!(after.service.location_keys().await, keys);
    assert_eq!(after.persistence.flush_count(), 0);
}

#[tokio::test]
async fn association_order_follows_check_times() {
    let before = populated().await;
    let document = before.persistence.stored().unwrap();

    let after = Harness::restarted(document, TIMES, before.source.clone())
        .await
        .unwrap();

    let key = LocationKey::from_coords(51.5, 9.9);
    let expected = vec![
        AlertName::derive(&key, CheckTime::new(8, 0), ChatId(100)),
        AlertName::derive(&key, CheckTime::new(18, 0), ChatId(100)),
    ];
    assert_eq!(after.service.associations().await[&ChatId(100)][&key], expected);
}

#[tokio::test]
async fn unresolvable_city_aborts_startup() {
    let before = populated().await;
    let document = before.persistence.stored().unwrap();
    let source = goettingen_source();
    source.fail_for(Coordinates::new(48.1, 11.6));

    let err = Harness::restarted(document, TIMES, source).await.err().unwrap();

    assert!(matches!(
        err,
        RecoveryError::Location { coords, .. } if coords == Coordinates::new(48.1, 11.6)
    ));
}

#[tokio::test]
async fn replay_accepts_records_register_would_reject() {
    let before = populated().await;
    let mut document = before.persistence.stored().unwrap();
    // association already lists the name the record replays
    document.chats.clear();
    let name = document.alerts.keys().next().cloned().unwrap();
    let record = document.alerts[&name].clone();
    document
        .chats
        .entry(record.context.chat())
        .or_default()
        .insert(record.context.location().clone(), vec![name.clone()]);

    let after = Harness::restarted(document.clone(), TIMES, before.source.clone())
        .await
        .unwrap();

    assert!(after.timer.contains(&name));
    assert_eq!(after.timer.names().len(), document.alerts.len());
    assert_eq!(after.persistence.flush_count(), 0);
}

#[tokio::test]
async fn recovered_service_accepts_cancellation() {
    let before = populated().await;
    let document = before.persistence.stored().unwrap();
    let after = Harness::restarted(document, TIMES, before.source.clone())
        .await
        .unwrap();

    let removed = after
        .service
        .unregister(ChatId(100), Coordinates::new(51.5, 9.9))
        .await
        .unwrap();

    assert_eq!(removed, 2);
    let stored = after.persistence.stored().unwrap();
    assert_eq!(stored.alerts.len(), 4);
    assert_eq!(stored.chats[&ChatId(100)].len(), 1);
    assert_eq!(stored.chats, after.service.associations().await);
}

#[tokio::test]
async fn empty_document_recovers_to_nothing() {
    let after = Harness::restarted(Default::default(), TIMES, goettingen_source())
        .await
        .unwrap();

    assert!(after.timer.names().is_empty());
    assert!(after.service.associations().await.is_empty());
    assert_eq!(after.source.fetch_count(), 0);
}

#[tokio::test]
async fn stored_alert_with_invalid_time_is_skipped() {
    let before = populated().await;
    let mut document = before.persistence.stored().unwrap();
    let name = document.alerts.keys().next().cloned().unwrap();
    document.alerts.get_mut(&name).unwrap().time = CheckTime { hour: 30, minute: 0, second: 0 };

    let after = Harness::restarted(document.clone(), TIMES, before.source.clone())
        .await
        .unwrap();

    assert!(!after.timer.contains(&name));
    assert_eq!(after.timer.names().len(), document.alerts.len() - 1);
    let report = after.service.recover(&document).await.unwrap();
    assert_eq!(report.alerts, document.alerts.len() - 1);
}
