//! Job store behavior over the in-memory backend.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use test_case::test_case;

use quarry_jobstore::{
    Calendar, GroupMatcher, Job, JobCapabilities, JobDataMap, JobDetail, JobKey, JobStore,
    JobStoreConfig, JobStoreError, JobType, JobTypeRegistry, NoOpJob, Trigger, TriggerKey,
    TriggerSchedule, TriggerState,
};
use quarry_store::{ItemStore, MemoryItemStore, TableKind, TableNames};

fn at(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap()
}

#[derive(Default)]
struct Exclusive;

#[async_trait::async_trait]
impl Job for Exclusive {
    async fn execute(&self, _data: &JobDataMap) -> Result<(), String> {
        Ok(())
    }
}

fn registry() -> Arc<JobTypeRegistry> {
    let registry = JobTypeRegistry::new();
    registry.register(exclusive_type());
    Arc::new(registry)
}

fn exclusive_type() -> JobType {
    JobType::of::<Exclusive>(
        "test.Exclusive",
        JobCapabilities {
            persist_job_data_after_execution: false,
            concurrent_execution_disallowed: true,
        },
    )
}

async fn open(instance: &str, store: Arc<dyn ItemStore>) -> JobStore {
    let config = JobStoreConfig::new(TableNames::with_prefix("test_")).with_instance_id(instance);
    let job_store = JobStore::new(store, registry(), config);
    job_store.initialize().await.unwrap();
    job_store
}

async fn fresh() -> JobStore {
    open("node-a", Arc::new(MemoryItemStore::new())).await
}

fn durable_noop(group: &str, name: &str) -> JobDetail {
    JobDetail::new(JobKey::new(group, name), NoOpJob::job_type()).durable(true)
}

fn trigger_for(job: &JobDetail, group: &str, name: &str, fire_at: i64) -> Trigger {
    Trigger::new(
        TriggerKey::new(group, name),
        job.key.clone(),
        at(fire_at),
        TriggerSchedule::once(),
    )
}

#[tokio::test]
async fn test_store_and_retrieve_job_with_trigger() {
    let js = fresh().await;
    let job = durable_noop("G1", "J1").with_description("nightly");
    let trigger = trigger_for(&job, "G1", "T1", 1_000);

    js.store_job(&job, false).await.unwrap();
    js.store_trigger(&trigger, false).await.unwrap();

    let loaded = js.retrieve_job(&job.key).await.unwrap().unwrap();
    assert_eq!(loaded, job);

    let triggers = js.get_triggers_for_job(&job.key).await.unwrap();
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0], trigger);
    assert_eq!(
        js.get_trigger_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Waiting)
    );
}

#[tokio::test]
async fn test_empty_description_survives_round_trip() {
    let js = fresh().await;
    let job = durable_noop("G1", "J1").with_description("");
    js.store_job(&job, false).await.unwrap();

    let loaded = js.retrieve_job(&job.key).await.unwrap().unwrap();
    assert_eq!(loaded.description, Some(String::new()));
    assert_eq!(loaded, job);
}

#[tokio::test]
async fn test_store_jobs_and_triggers_keeps_data_separate() {
    let js = fresh().await;
    let first = durable_noop("G", "A").with_data("owner", json!("alice"));
    let second = durable_noop("G", "B").with_data("owner", json!("bob"));
    let batch = vec![
        (
            first.clone(),
            vec![trigger_for(&first, "G", "A1", 1_000).with_data("slot", json!(1))],
        ),
        (
            second.clone(),
            vec![
                trigger_for(&second, "G", "B1", 1_000),
                trigger_for(&second, "G", "B2", 2_000),
            ],
        ),
    ];

    js.store_jobs_and_triggers(&batch, false).await.unwrap();

    let a = js.retrieve_job(&first.key).await.unwrap().unwrap();
    let b = js.retrieve_job(&second.key).await.unwrap().unwrap();
    assert_eq!(a.job_data.get("owner"), Some(&json!("alice")));
    assert_eq!(b.job_data.get("owner"), Some(&json!("bob")));

    assert_eq!(js.get_triggers_for_job(&first.key).await.unwrap().len(), 1);
    assert_eq!(js.get_triggers_for_job(&second.key).await.unwrap().len(), 2);
    let a1 = js
        .retrieve_trigger(&TriggerKey::new("G", "A1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a1.job_data.get("slot"), Some(&json!(1)));
    assert_eq!(js.number_of_jobs().await.unwrap(), 2);
    assert_eq!(js.number_of_triggers().await.unwrap(), 3);
}

#[tokio::test]
async fn test_store_jobs_and_triggers_rejects_collision_before_writing() {
    let js = fresh().await;
    let existing = durable_noop("G", "B");
    js.store_job(&existing, false).await.unwrap();

    let fresh_job = durable_noop("G", "A");
    let batch = vec![(fresh_job.clone(), vec![]), (existing, vec![])];
    let err = js.store_jobs_and_triggers(&batch, false).await.unwrap_err();

    assert!(matches!(err, JobStoreError::ObjectAlreadyExists(_)));
    assert!(!js.check_job_exists(&fresh_job.key).await.unwrap());
}

#[tokio::test]
async fn test_duplicate_job_without_replace() {
    let js = fresh().await;
    let job = durable_noop("G", "J");
    js.store_job(&job, false).await.unwrap();

    let err = js.store_job(&job, false).await.unwrap_err();
    assert!(matches!(err, JobStoreError::ObjectAlreadyExists(_)));

    let replacement = job.clone().with_description("updated");
    js.store_job(&replacement, true).await.unwrap();
    assert_eq!(js.retrieve_job(&job.key).await.unwrap(), Some(replacement));
}

#[tokio::test]
async fn test_trigger_for_missing_job() {
    let js = fresh().await;
    let ghost = durable_noop("G", "ghost");
    let err = js
        .store_trigger(&trigger_for(&ghost, "G", "T", 1_000), false)
        .await
        .unwrap_err();
    assert!(matches!(err, JobStoreError::JobNotFound(key) if key == "G.ghost"));
}

#[tokio::test]
async fn test_paused_empty_trigger_group_pauses_later_triggers() {
    let js = fresh().await;
    let paused = js
        .pause_triggers(&GroupMatcher::group_equals("G2"))
        .await
        .unwrap();
    assert_eq!(paused, vec!["G2"]);
    assert_eq!(js.get_paused_trigger_groups().await.unwrap(), vec!["G2"]);

    let job = durable_noop("G1", "J1");
    js.store_job(&job, false).await.unwrap();
    let trigger = trigger_for(&job, "G2", "T1", 1_000);
    js.store_trigger(&trigger, false).await.unwrap();

    assert_eq!(
        js.get_trigger_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Paused)
    );
}

#[tokio::test]
async fn test_paused_job_group_pauses_new_triggers() {
    let js = fresh().await;
    js.pause_jobs(&GroupMatcher::group_equals("batch")).await.unwrap();
    assert!(js.is_job_group_paused("batch").await.unwrap());

    let job = durable_noop("batch", "J");
    js.store_job(&job, false).await.unwrap();
    let trigger = trigger_for(&job, "DEFAULT", "T", 1_000);
    js.store_trigger(&trigger, false).await.unwrap();

    assert_eq!(
        js.get_trigger_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Paused)
    );
    assert_eq!(js.get_paused_job_groups().await.unwrap(), vec!["batch"]);
}

#[tokio::test]
async fn test_pause_all_then_resume_all() {
    let js = fresh().await;
    let job = durable_noop("jobs", "J");
    js.store_job(&job, false).await.unwrap();
    for group in ["a", "b"] {
        js.store_trigger(&trigger_for(&job, group, "T", 1_000), false)
            .await
            .unwrap();
    }
    js.pause_jobs(&GroupMatcher::group_equals("jobs")).await.unwrap();

    js.pause_all().await.unwrap();
    assert_eq!(js.get_paused_trigger_groups().await.unwrap(), vec!["a", "b"]);
    assert_eq!(
        js.get_trigger_state(&TriggerKey::new("a", "T")).await.unwrap(),
        Some(TriggerState::Paused)
    );

    js.resume_all().await.unwrap();
    assert!(js.get_paused_trigger_groups().await.unwrap().is_empty());
    assert!(js.get_paused_job_groups().await.unwrap().is_empty());
    for group in ["a", "b"] {
        assert_eq!(
            js.get_trigger_state(&TriggerKey::new(group, "T")).await.unwrap(),
            Some(TriggerState::Waiting)
        );
    }
}

#[tokio::test]
async fn test_pause_and_resume_single_trigger() {
    let js = fresh().await;
    let job = durable_noop("G", "J");
    let trigger = trigger_for(&job, "G", "T", 1_000);
    js.store_job_and_trigger(&job, &trigger).await.unwrap();

    js.pause_trigger(&trigger.key).await.unwrap();
    assert_eq!(
        js.get_trigger_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Paused)
    );
    // Pausing twice is a no-op
    js.pause_trigger(&trigger.key).await.unwrap();

    js.resume_trigger(&trigger.key).await.unwrap();
    assert_eq!(
        js.get_trigger_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Waiting)
    );
    assert_eq!(
        js.get_trigger_state(&TriggerKey::new("G", "missing")).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_removing_last_trigger_removes_non_durable_job() {
    let js = fresh().await;
    let job = durable_noop("G", "J").durable(false);
    let first = trigger_for(&job, "G", "T1", 1_000);
    let second = trigger_for(&job, "G", "T2", 2_000);
    js.store_job(&job, false).await.unwrap();
    js.store_trigger(&first, false).await.unwrap();
    js.store_trigger(&second, false).await.unwrap();

    assert!(js.remove_trigger(&first.key).await.unwrap());
    assert!(js.check_job_exists(&job.key).await.unwrap());

    assert!(js.remove_trigger(&second.key).await.unwrap());
    assert!(!js.check_job_exists(&job.key).await.unwrap());
    assert!(!js.remove_trigger(&second.key).await.unwrap());
}

#[tokio::test]
async fn test_durable_job_outlives_its_triggers() {
    let js = fresh().await;
    let job = durable_noop("G", "J");
    let trigger = trigger_for(&job, "G", "T", 1_000);
    js.store_job_and_trigger(&job, &trigger).await.unwrap();

    js.remove_trigger(&trigger.key).await.unwrap();
    assert!(js.check_job_exists(&job.key).await.unwrap());
}

#[tokio::test]
async fn test_remove_job_takes_its_triggers() {
    let js = fresh().await;
    let job = durable_noop("G", "J");
    let trigger = trigger_for(&job, "G", "T", 1_000);
    js.store_job_and_trigger(&job, &trigger).await.unwrap();

    assert!(js.remove_job(&job.key).await.unwrap());
    assert!(!js.check_trigger_exists(&trigger.key).await.unwrap());
    assert!(!js.remove_job(&job.key).await.unwrap());
    assert!(!js.remove_jobs(&[job.key.clone()]).await.unwrap());
}

#[tokio::test]
async fn test_replace_trigger_must_keep_job() {
    let js = fresh().await;
    let job = durable_noop("G", "J");
    let other = durable_noop("G", "other");
    let trigger = trigger_for(&job, "G", "T", 1_000);
    js.store_job(&other, false).await.unwrap();
    js.store_job_and_trigger(&job, &trigger).await.unwrap();

    let wrong = trigger_for(&other, "G", "T2", 5_000);
    let err = js.replace_trigger(&trigger.key, &wrong).await.unwrap_err();
    assert!(matches!(err, JobStoreError::InvalidArgument(_)));

    let replacement = trigger_for(&job, "G", "T2", 5_000);
    assert!(js.replace_trigger(&trigger.key, &replacement).await.unwrap());
    assert!(!js.check_trigger_exists(&trigger.key).await.unwrap());
    assert_eq!(
        js.retrieve_trigger(&replacement.key).await.unwrap(),
        Some(replacement)
    );
}

#[tokio::test]
async fn test_calendar_in_use_cannot_be_removed() {
    let js = fresh().await;
    let calendar = Calendar::new("holidays", json!({"excluded": ["2026-12-25"]}));
    js.store_calendar(&calendar, false).await.unwrap();
    assert!(matches!(
        js.store_calendar(&calendar, false).await.unwrap_err(),
        JobStoreError::ObjectAlreadyExists(_)
    ));

    let job = durable_noop("G", "J");
    let trigger = trigger_for(&job, "G", "T", 1_000).with_calendar("holidays");
    js.store_job_and_trigger(&job, &trigger).await.unwrap();

    let err = js.remove_calendar("holidays").await.unwrap_err();
    assert!(matches!(
        err,
        JobStoreError::CalendarInUse { ref calendar, ref trigger } if calendar == "holidays" && trigger == "G.T"
    ));

    js.remove_trigger(&trigger.key).await.unwrap();
    assert!(js.remove_calendar("holidays").await.unwrap());
    assert!(!js.calendar_exists("holidays").await.unwrap());
    assert_eq!(js.number_of_calendars().await.unwrap(), 0);
}

#[tokio::test]
async fn test_calendar_round_trip() {
    let js = fresh().await;
    js.store_calendar(&Calendar::new("b", json!({"days": [1, 2]})), false)
        .await
        .unwrap();
    js.store_calendar(&Calendar::new("a", json!(null)), false)
        .await
        .unwrap();

    assert_eq!(js.get_calendar_names().await.unwrap(), vec!["a", "b"]);
    let loaded = js.retrieve_calendar("b").await.unwrap().unwrap();
    assert_eq!(loaded.definition, json!({"days": [1, 2]}));
}

#[test_case(GroupMatcher::Anything, &["alpha.J", "alphabet.J", "beta.J"] ; "anything")]
#[test_case(GroupMatcher::group_equals("alpha"), &["alpha.J"] ; "equals")]
#[test_case(GroupMatcher::StartsWith("alpha".into()), &["alpha.J", "alphabet.J"] ; "starts with")]
#[test_case(GroupMatcher::EndsWith("ta".into()), &["beta.J"] ; "ends with")]
#[test_case(GroupMatcher::Contains("ph".into()), &["alpha.J", "alphabet.J"] ; "contains")]
#[tokio::test]
async fn test_job_keys_by_matcher(matcher: GroupMatcher, expected: &[&str]) {
    let js = fresh().await;
    for group in ["beta", "alphabet", "alpha"] {
        js.store_job(&durable_noop(group, "J"), false).await.unwrap();
    }

    let keys: Vec<String> = js
        .get_job_keys(&matcher)
        .await
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(keys, expected);
    assert_eq!(
        js.get_job_group_names().await.unwrap(),
        vec!["alpha", "alphabet", "beta"]
    );
}

#[tokio::test]
async fn test_trigger_keys_and_groups() {
    let js = fresh().await;
    let job = durable_noop("G", "J");
    js.store_job(&job, false).await.unwrap();
    js.store_trigger(&trigger_for(&job, "y", "T2", 1_000), false).await.unwrap();
    js.store_trigger(&trigger_for(&job, "x", "T1", 1_000), false).await.unwrap();

    assert_eq!(js.get_trigger_group_names().await.unwrap(), vec!["x", "y"]);
    assert_eq!(
        js.get_trigger_keys(&GroupMatcher::group_equals("y")).await.unwrap(),
        vec![TriggerKey::new("y", "T2")]
    );
}

#[tokio::test]
async fn test_acquire_and_release() {
    let js = fresh().await;
    let job = durable_noop("G", "J");
    let trigger = trigger_for(&job, "G", "T", 1_000);
    js.store_job_and_trigger(&job, &trigger).await.unwrap();

    let acquired = js
        .acquire_next_triggers(at(1_000), 5, TimeDelta::zero())
        .await
        .unwrap();
    assert_eq!(acquired, vec![trigger.clone()]);
    assert_eq!(
        js.get_trigger_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Acquired)
    );

    // Already acquired, nothing left
    assert!(
        js.acquire_next_triggers(at(1_000), 5, TimeDelta::zero())
            .await
            .unwrap()
            .is_empty()
    );

    assert!(js.release_acquired_trigger(&trigger.key).await.unwrap());
    assert!(!js.release_acquired_trigger(&trigger.key).await.unwrap());
    assert_eq!(
        js.get_trigger_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Waiting)
    );
}

#[tokio::test]
async fn test_paused_triggers_are_not_acquired() {
    let js = fresh().await;
    let job = durable_noop("G", "J");
    let trigger = trigger_for(&job, "G", "T", 1_000);
    js.store_job_and_trigger(&job, &trigger).await.unwrap();
    js.pause_job(&job.key).await.unwrap();

    assert!(
        js.acquire_next_triggers(at(5_000), 5, TimeDelta::zero())
            .await
            .unwrap()
            .is_empty()
    );

    js.resume_job(&job.key).await.unwrap();
    assert_eq!(
        js.acquire_next_triggers(at(5_000), 5, TimeDelta::zero())
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_exclusive_job_acquired_once_per_batch() {
    let js = fresh().await;
    let job = JobDetail::new(JobKey::new("G", "exclusive"), exclusive_type()).durable(true);
    js.store_job(&job, false).await.unwrap();
    js.store_trigger(&trigger_for(&job, "G", "T1", 1_000), false).await.unwrap();
    js.store_trigger(&trigger_for(&job, "G", "T2", 1_000), false).await.unwrap();

    let acquired = js
        .acquire_next_triggers(at(1_000), 5, TimeDelta::zero())
        .await
        .unwrap();
    assert_eq!(acquired.len(), 1);
    assert_eq!(acquired[0].key, TriggerKey::new("G", "T1"));
}

#[tokio::test]
async fn test_release_ignores_other_instances_claims() {
    let store: Arc<dyn ItemStore> = Arc::new(MemoryItemStore::new());
    let a = open("node-a", Arc::clone(&store)).await;
    let b = open("node-b", store).await;
    let job = durable_noop("G", "J");
    let trigger = trigger_for(&job, "G", "T", 1_000);
    a.store_job_and_trigger(&job, &trigger).await.unwrap();

    assert_eq!(
        a.acquire_next_triggers(at(1_000), 1, TimeDelta::zero())
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(!b.release_acquired_trigger(&trigger.key).await.unwrap());
    assert!(
        b.acquire_next_triggers(at(1_000), 1, TimeDelta::zero())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_restart_releases_own_claims() {
    let store: Arc<dyn ItemStore> = Arc::new(MemoryItemStore::new());
    let before = open("node-a", Arc::clone(&store)).await;
    let job = durable_noop("G", "J");
    let trigger = trigger_for(&job, "G", "T", 1_000);
    before.store_job_and_trigger(&job, &trigger).await.unwrap();
    before
        .acquire_next_triggers(at(1_000), 1, TimeDelta::zero())
        .await
        .unwrap();

    let after = open("node-a", store).await;
    assert_eq!(after.scheduler_started().await.unwrap(), 1);
    assert_eq!(
        after.get_trigger_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Waiting)
    );

    let instances = after.scheduler_instances().await.unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].instance_id, "node-a");

    after.scheduler_shutdown().await.unwrap();
    assert!(after.scheduler_instances().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_clear_all_scheduling_data() {
    let store = Arc::new(MemoryItemStore::new());
    let js = open("node-a", store.clone()).await;
    let job = durable_noop("G", "J");
    js.store_job_and_trigger(&job, &trigger_for(&job, "G", "T", 1_000))
        .await
        .unwrap();
    js.store_calendar(&Calendar::new("c", json!({})), false)
        .await
        .unwrap();
    js.pause_all().await.unwrap();

    js.clear_all_scheduling_data().await.unwrap();

    assert_eq!(js.number_of_jobs().await.unwrap(), 0);
    assert_eq!(js.number_of_triggers().await.unwrap(), 0);
    assert_eq!(js.number_of_calendars().await.unwrap(), 0);
    assert!(js.get_paused_trigger_groups().await.unwrap().is_empty());

    let tables = TableNames::with_prefix("test_");
    assert_eq!(store.item_count(tables.name(TableKind::JobGroup)), Some(0));
    assert_eq!(store.item_count(tables.name(TableKind::TriggerGroup)), Some(0));
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let store: Arc<dyn ItemStore> = Arc::new(MemoryItemStore::new());
    let first = open("node-a", Arc::clone(&store)).await;
    let report = first.initialize().await.unwrap();
    assert!(report.created.is_empty());
    assert_eq!(report.existing.len(), 6);
}
