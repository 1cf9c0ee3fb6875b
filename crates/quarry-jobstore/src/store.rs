//! The job store facade.
//!
//! Translates scheduler calls into repository operations. All state lives in
//! the backing store; the facade keeps nothing between calls, so any number
//! of scheduler instances can share one set of tables.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use quarry_store::{
    ATTR_GROUP, ATTR_NAME, AttributeValue, BootstrapReport, Bootstrapper, Condition,
    ConditionalWrite, DynamoEntity, Item, ItemStore, RecordError, Repository, TableKind, codec,
    validate_key,
};
use tracing::{debug, info, instrument, warn};

use crate::entities::{
    self, ATTR_ACQUIRED_BY, ATTR_CALENDAR_NAME, ATTR_CONCURRENT_EXECUTION_DISALLOWED,
    ATTR_DURABLE, ATTR_JOB_GROUP, ATTR_JOB_NAME, ATTR_NEXT_FIRE_TIME, ATTR_STATE, JobGroup,
    StoredTrigger, TriggerGroup,
};
use crate::{
    Calendar, GroupMatcher, GroupState, JobDetail, JobKey, JobStoreConfig, JobStoreError,
    JobTypeResolver, SchedulerInstance, Trigger, TriggerKey, TriggerState,
};

/// A job together with the triggers to store for it.
pub type JobWithTriggers = (JobDetail, Vec<Trigger>);

fn state_value(state: &str) -> AttributeValue {
    codec::encode_string(state)
}

fn group_filter(matcher: &GroupMatcher, attribute: &str) -> Option<Condition> {
    matcher
        .exact()
        .map(|group| Condition::new().equals(attribute, codec::encode_string(group)))
}

/// Compare-and-swap guard on the mutable parts of a trigger as last read.
fn observed(stored: &StoredTrigger) -> Condition {
    let mut condition = Condition::new().equals(ATTR_STATE, state_value(stored.state.as_str()));
    // NULL attributes cannot be compared with `=`
    if let Some(next_fire) = stored.trigger.next_fire_time {
        condition = condition.equals(ATTR_NEXT_FIRE_TIME, codec::encode_timestamp(next_fire));
    }
    match &stored.acquired_by {
        Some(owner) => condition.equals(ATTR_ACQUIRED_BY, codec::encode_string(owner)),
        None => condition.not_exists(ATTR_ACQUIRED_BY),
    }
}

fn key_of(item: &Item, kind: TableKind) -> Item {
    kind.key_schema()
        .attributes()
        .filter_map(|attribute| {
            item.get(attribute)
                .map(|value| (attribute.to_string(), value.clone()))
        })
        .collect()
}

/// Keys of group/name items whose group matches.
fn matching_keys(items: &[Item], matcher: &GroupMatcher) -> Result<Vec<(String, String)>, RecordError> {
    let mut keys = Vec::with_capacity(items.len());
    for item in items {
        let (group, name) = entities::read_group_name(item)?;
        if matcher.is_match(&group) {
            keys.push((group, name));
        }
    }
    keys.sort();
    Ok(keys)
}

/// Union of groups with a marker record and groups with members.
fn collect_groups(
    markers: &[Item],
    members: &[Item],
    matcher: &GroupMatcher,
    include_exact: bool,
) -> Result<Vec<String>, RecordError> {
    let mut names = BTreeSet::new();
    for item in markers {
        names.insert(codec::required_string(item, ATTR_NAME)?);
    }
    for item in members {
        names.insert(codec::required_string(item, ATTR_GROUP)?);
    }
    if include_exact {
        if let Some(group) = matcher.exact() {
            names.insert(group.to_string());
        }
    }
    Ok(names.into_iter().filter(|n| matcher.is_match(n)).collect())
}

async fn clear_table<T: DynamoEntity>(repo: &Repository<T>) -> Result<usize, JobStoreError> {
    let items = repo.scan_items(None).await?;
    for item in &items {
        repo.delete(&key_of(item, T::TABLE)).await?;
    }
    Ok(items.len())
}

/// DynamoDB-backed job store.
pub struct JobStore {
    config: JobStoreConfig,
    store: Arc<dyn ItemStore>,
    jobs: Repository<JobDetail>,
    triggers: Repository<StoredTrigger>,
    job_groups: Repository<JobGroup>,
    trigger_groups: Repository<TriggerGroup>,
    schedulers: Repository<SchedulerInstance>,
    calendars: Repository<Calendar>,
}

impl JobStore {
    pub fn new(
        store: Arc<dyn ItemStore>,
        resolver: Arc<dyn JobTypeResolver>,
        config: JobStoreConfig,
    ) -> Self {
        let tables = &config.tables;
        let jobs = Repository::with_factory(Arc::clone(&store), tables, JobDetail::decoder(resolver));
        let triggers = Repository::new(Arc::clone(&store), tables);
        let job_groups = Repository::new(Arc::clone(&store), tables);
        let trigger_groups = Repository::new(Arc::clone(&store), tables);
        let schedulers = Repository::new(Arc::clone(&store), tables);
        let calendars = Repository::new(Arc::clone(&store), tables);

        Self {
            config,
            store,
            jobs,
            triggers,
            job_groups,
            trigger_groups,
            schedulers,
            calendars,
        }
    }

    pub fn config(&self) -> &JobStoreConfig {
        &self.config
    }

    pub fn instance_id(&self) -> &str {
        &self.config.instance_id
    }

    async fn item_exists(&self, table: &str, key: &Item) -> Result<bool, JobStoreError> {
        validate_key(key)?;
        Ok(self.store.get_item(table, key).await?.is_some())
    }

    // ========== Lifecycle ==========

    /// Provision the tables. Safe to call on every start.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<BootstrapReport, JobStoreError> {
        let report = Bootstrapper::new(Arc::clone(&self.store), self.config.tables.clone())
            .bootstrap()
            .await?;
        info!(
            created = report.created.len(),
            existing = report.existing.len(),
            "job store initialized"
        );
        Ok(report)
    }

    /// Check in and release any triggers this instance left acquired.
    /// Returns how many were released.
    #[instrument(skip(self), fields(instance = %self.config.instance_id))]
    pub async fn scheduler_started(&self) -> Result<usize, JobStoreError> {
        self.check_in().await?;

        let filter = Condition::new()
            .equals(ATTR_STATE, state_value(TriggerState::Acquired.as_str()))
            .equals(ATTR_ACQUIRED_BY, codec::encode_string(&self.config.instance_id));
        let orphaned = self.triggers.scan(Some(&filter)).await?;

        let mut released = 0;
        for stored in orphaned {
            if self.release_acquired_trigger(&stored.trigger.key).await? {
                released += 1;
            }
        }

        info!(released, "scheduler started");
        Ok(released)
    }

    /// Record that this instance is alive.
    pub async fn check_in(&self) -> Result<SchedulerInstance, JobStoreError> {
        let instance = SchedulerInstance {
            instance_id: self.config.instance_id.clone(),
            last_checkin: Utc::now(),
            checkin_interval_ms: i64::try_from(self.config.checkin_interval.as_millis())
                .unwrap_or(i64::MAX),
        };
        self.schedulers.store(&instance).await?;
        debug!(instance = %instance.instance_id, "checked in");
        Ok(instance)
    }

    #[instrument(skip(self), fields(instance = %self.config.instance_id))]
    pub async fn scheduler_shutdown(&self) -> Result<(), JobStoreError> {
        self.schedulers
            .delete(&entities::instance_key(&self.config.instance_id))
            .await?;
        info!("scheduler shut down");
        Ok(())
    }

    pub async fn scheduler_instances(&self) -> Result<Vec<SchedulerInstance>, JobStoreError> {
        let mut instances = self.schedulers.scan(None).await?;
        instances.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        Ok(instances)
    }

    /// Delete every job, trigger, calendar and group marker.
    #[instrument(skip(self))]
    pub async fn clear_all_scheduling_data(&self) -> Result<(), JobStoreError> {
        let triggers = clear_table(&self.triggers).await?;
        let jobs = clear_table(&self.jobs).await?;
        let calendars = clear_table(&self.calendars).await?;
        clear_table(&self.trigger_groups).await?;
        clear_table(&self.job_groups).await?;
        info!(triggers, jobs, calendars, "cleared scheduling data");
        Ok(())
    }

    // ========== Jobs ==========

    #[instrument(skip(self, job), fields(job = %job.key))]
    pub async fn store_job(&self, job: &JobDetail, replace_existing: bool) -> Result<(), JobStoreError> {
        if replace_existing {
            self.jobs.store(job).await?;
        } else if self
            .jobs
            .store_conditional(job, &Condition::item_absent(ATTR_NAME))
            .await?
            .is_conflict()
        {
            return Err(JobStoreError::ObjectAlreadyExists(format!("job {}", job.key)));
        }

        self.ensure_job_group(&job.key.group).await?;
        debug!("stored job");
        Ok(())
    }

    pub async fn retrieve_job(&self, key: &JobKey) -> Result<Option<JobDetail>, JobStoreError> {
        Ok(self.jobs.load(&entities::job_key(key)).await?)
    }

    /// Remove a job and all of its triggers. Returns whether the job existed.
    #[instrument(skip(self), fields(job = %key))]
    pub async fn remove_job(&self, key: &JobKey) -> Result<bool, JobStoreError> {
        for trigger in self.get_triggers_for_job(key).await? {
            self.triggers.delete(&entities::trigger_key(&trigger.key)).await?;
        }

        let item_key = entities::job_key(key);
        let existed = self.item_exists(self.jobs.table_name(), &item_key).await?;
        self.jobs.delete(&item_key).await?;
        if existed {
            debug!("removed job");
        }
        Ok(existed)
    }

    /// Returns whether every job existed.
    pub async fn remove_jobs(&self, keys: &[JobKey]) -> Result<bool, JobStoreError> {
        let mut all_found = true;
        for key in keys {
            all_found &= self.remove_job(key).await?;
        }
        Ok(all_found)
    }

    pub async fn check_job_exists(&self, key: &JobKey) -> Result<bool, JobStoreError> {
        self.item_exists(self.jobs.table_name(), &entities::job_key(key))
            .await
    }

    pub async fn get_job_keys(&self, matcher: &GroupMatcher) -> Result<Vec<JobKey>, JobStoreError> {
        let items = self
            .jobs
            .scan_items(group_filter(matcher, ATTR_GROUP).as_ref())
            .await?;
        Ok(matching_keys(&items, matcher)?
            .into_iter()
            .map(|(group, name)| JobKey::new(group, name))
            .collect())
    }

    pub async fn get_job_group_names(&self) -> Result<Vec<String>, JobStoreError> {
        let items = self.jobs.scan_items(None).await?;
        Ok(collect_groups(&[], &items, &GroupMatcher::Anything, false)?)
    }

    pub async fn number_of_jobs(&self) -> Result<usize, JobStoreError> {
        Ok(self.jobs.scan_items(None).await?.len())
    }

    async fn ensure_job_group(&self, group: &str) -> Result<(), JobStoreError> {
        self.job_groups
            .store_conditional(
                &JobGroup::new(group, GroupState::Active),
                &Condition::item_absent(ATTR_NAME),
            )
            .await?;
        Ok(())
    }

    // ========== Triggers ==========

    /// Store a trigger for an existing job. The trigger starts `Paused` when
    /// its group or its job's group is paused.
    #[instrument(skip(self, trigger), fields(trigger = %trigger.key, job = %trigger.job_key))]
    pub async fn store_trigger(
        &self,
        trigger: &Trigger,
        replace_existing: bool,
    ) -> Result<(), JobStoreError> {
        if !self.check_job_exists(&trigger.job_key).await? {
            return Err(JobStoreError::JobNotFound(trigger.job_key.to_string()));
        }

        let paused = self.is_trigger_group_paused(&trigger.key.group).await?
            || self.is_job_group_paused(&trigger.job_key.group).await?;
        let state = if paused {
            TriggerState::Paused
        } else {
            TriggerState::Waiting
        };
        let stored = StoredTrigger::new(trigger.clone(), state);

        if replace_existing {
            self.triggers.store(&stored).await?;
        } else if self
            .triggers
            .store_conditional(&stored, &Condition::item_absent(ATTR_NAME))
            .await?
            .is_conflict()
        {
            return Err(JobStoreError::ObjectAlreadyExists(format!(
                "trigger {}",
                trigger.key
            )));
        }

        self.ensure_trigger_group(&trigger.key.group).await?;
        debug!(%state, "stored trigger");
        Ok(())
    }

    pub async fn store_job_and_trigger(
        &self,
        job: &JobDetail,
        trigger: &Trigger,
    ) -> Result<(), JobStoreError> {
        self.store_job(job, false).await?;
        self.store_trigger(trigger, false).await
    }

    /// Store several jobs with their triggers, item by item.
    ///
    /// Not atomic: a failure part way leaves earlier items stored. Without
    /// `replace_existing`, every key is checked up front so a collision is
    /// reported before anything is written.
    #[instrument(skip(self, batch), fields(jobs = batch.len()))]
    pub async fn store_jobs_and_triggers(
        &self,
        batch: &[JobWithTriggers],
        replace_existing: bool,
    ) -> Result<(), JobStoreError> {
        if !replace_existing {
            for (job, triggers) in batch {
                if self.check_job_exists(&job.key).await? {
                    return Err(JobStoreError::ObjectAlreadyExists(format!("job {}", job.key)));
                }
                for trigger in triggers {
                    if self.check_trigger_exists(&trigger.key).await? {
                        return Err(JobStoreError::ObjectAlreadyExists(format!(
                            "trigger {}",
                            trigger.key
                        )));
                    }
                }
            }
        }

        for (job, triggers) in batch {
            self.store_job(job, replace_existing).await?;
            for trigger in triggers {
                self.store_trigger(trigger, replace_existing).await?;
            }
        }

        info!("stored jobs and triggers");
        Ok(())
    }

    pub async fn retrieve_trigger(&self, key: &TriggerKey) -> Result<Option<Trigger>, JobStoreError> {
        Ok(self
            .triggers
            .load(&entities::trigger_key(key))
            .await?
            .map(|stored| stored.trigger))
    }

    /// Remove a trigger. A non-durable job left without triggers is removed
    /// with it. Returns whether the trigger existed.
    #[instrument(skip(self), fields(trigger = %key))]
    pub async fn remove_trigger(&self, key: &TriggerKey) -> Result<bool, JobStoreError> {
        let item_key = entities::trigger_key(key);
        let Some(stored) = self.triggers.load(&item_key).await? else {
            return Ok(false);
        };
        self.triggers.delete(&item_key).await?;

        let job_key = &stored.trigger.job_key;
        let job_item_key = entities::job_key(job_key);
        if let Some(job) = self.store.get_item(self.jobs.table_name(), &job_item_key).await? {
            let durable = codec::required_bool(&job, ATTR_DURABLE)?;
            // Scans may lag the delete above, so ignore this trigger if it shows up
            let orphaned = !self
                .get_triggers_for_job(job_key)
                .await?
                .iter()
                .any(|t| t.key != *key);
            if !durable && orphaned {
                self.jobs.delete(&job_item_key).await?;
                debug!(job = %job_key, "removed non-durable job with no triggers");
            }
        }

        Ok(true)
    }

    /// Replace a trigger with one for the same job. Returns false if no
    /// trigger was stored under `key`.
    #[instrument(skip(self, replacement), fields(trigger = %key))]
    pub async fn replace_trigger(
        &self,
        key: &TriggerKey,
        replacement: &Trigger,
    ) -> Result<bool, JobStoreError> {
        let item_key = entities::trigger_key(key);
        let Some(old) = self.triggers.load(&item_key).await? else {
            return Ok(false);
        };

        if old.trigger.job_key != replacement.job_key {
            return Err(JobStoreError::InvalidArgument(format!(
                "replacement for {} must reference job {}, not {}",
                key, old.trigger.job_key, replacement.job_key
            )));
        }

        self.triggers.delete(&item_key).await?;
        self.store_trigger(replacement, true).await?;
        Ok(true)
    }

    pub async fn check_trigger_exists(&self, key: &TriggerKey) -> Result<bool, JobStoreError> {
        self.item_exists(self.triggers.table_name(), &entities::trigger_key(key))
            .await
    }

    pub async fn get_triggers_for_job(&self, key: &JobKey) -> Result<Vec<Trigger>, JobStoreError> {
        let filter = Condition::new()
            .equals(ATTR_JOB_GROUP, codec::encode_string(&key.group))
            .equals(ATTR_JOB_NAME, codec::encode_string(&key.name));
        let mut triggers: Vec<Trigger> = self
            .triggers
            .scan(Some(&filter))
            .await?
            .into_iter()
            .map(|stored| stored.trigger)
            .collect();
        triggers.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(triggers)
    }

    /// `None` when no trigger is stored under `key`.
    pub async fn get_trigger_state(
        &self,
        key: &TriggerKey,
    ) -> Result<Option<TriggerState>, JobStoreError> {
        let item_key = entities::trigger_key(key);
        validate_key(&item_key)?;
        match self.store.get_item(self.triggers.table_name(), &item_key).await? {
            Some(item) => Ok(Some(entities::decode_state(&item)?)),
            None => Ok(None),
        }
    }

    pub async fn get_trigger_keys(
        &self,
        matcher: &GroupMatcher,
    ) -> Result<Vec<TriggerKey>, JobStoreError> {
        let items = self
            .triggers
            .scan_items(group_filter(matcher, ATTR_GROUP).as_ref())
            .await?;
        Ok(matching_keys(&items, matcher)?
            .into_iter()
            .map(|(group, name)| TriggerKey::new(group, name))
            .collect())
    }

    pub async fn get_trigger_group_names(&self) -> Result<Vec<String>, JobStoreError> {
        let items = self.triggers.scan_items(None).await?;
        Ok(collect_groups(&[], &items, &GroupMatcher::Anything, false)?)
    }

    pub async fn number_of_triggers(&self) -> Result<usize, JobStoreError> {
        Ok(self.triggers.scan_items(None).await?.len())
    }

    async fn ensure_trigger_group(&self, group: &str) -> Result<(), JobStoreError> {
        self.trigger_groups
            .store_conditional(
                &TriggerGroup::new(group, GroupState::Active),
                &Condition::item_absent(ATTR_NAME),
            )
            .await?;
        Ok(())
    }

    /// Read-modify-write a trigger until `next` is applied against an
    /// unchanged item. `next` returning `None` means no change is needed.
    /// Returns the written trigger, or `None` if nothing was written.
    async fn transition_trigger<F>(
        &self,
        key: &TriggerKey,
        next: F,
    ) -> Result<Option<StoredTrigger>, JobStoreError>
    where
        F: Fn(&StoredTrigger) -> Option<StoredTrigger> + Send + Sync,
    {
        let item_key = entities::trigger_key(key);
        for attempt in 1..=self.config.max_update_attempts {
            let Some(current) = self.triggers.load(&item_key).await? else {
                return Ok(None);
            };
            let Some(updated) = next(&current) else {
                return Ok(None);
            };

            match self
                .triggers
                .store_conditional(&updated, &observed(&current))
                .await?
            {
                ConditionalWrite::Stored { .. } => {
                    debug!(trigger = %key, from = %current.state, to = %updated.state, "trigger state changed");
                    return Ok(Some(updated));
                }
                ConditionalWrite::Conflict { .. } => {
                    warn!(trigger = %key, attempt, "trigger changed concurrently, retrying");
                }
            }
        }
        Err(JobStoreError::Contention(format!("trigger {}", key)))
    }

    // ========== Pause state ==========

    pub async fn pause_trigger(&self, key: &TriggerKey) -> Result<(), JobStoreError> {
        self.transition_trigger(key, |stored| {
            stored.state.paused().map(|state| stored.with_state(state))
        })
        .await?;
        Ok(())
    }

    pub async fn resume_trigger(&self, key: &TriggerKey) -> Result<(), JobStoreError> {
        self.transition_trigger(key, |stored| {
            stored.state.resumed().map(|state| stored.with_state(state))
        })
        .await?;
        Ok(())
    }

    async fn matching_trigger_groups(
        &self,
        matcher: &GroupMatcher,
        include_exact: bool,
    ) -> Result<Vec<String>, JobStoreError> {
        let markers = self
            .trigger_groups
            .scan_items(group_filter(matcher, ATTR_NAME).as_ref())
            .await?;
        let members = self
            .triggers
            .scan_items(group_filter(matcher, ATTR_GROUP).as_ref())
            .await?;
        Ok(collect_groups(&markers, &members, matcher, include_exact)?)
    }

    /// Pause every trigger in the matching groups and mark the groups paused.
    /// An exact group name is marked even if it has no triggers yet, so
    /// triggers added to it later start paused. Returns the paused groups.
    #[instrument(skip(self))]
    pub async fn pause_triggers(&self, matcher: &GroupMatcher) -> Result<Vec<String>, JobStoreError> {
        let groups = self.matching_trigger_groups(matcher, true).await?;
        for group in &groups {
            self.trigger_groups
                .store(&TriggerGroup::new(group.as_str(), GroupState::Paused))
                .await?;
            for key in self.get_trigger_keys(&GroupMatcher::group_equals(group.as_str())).await? {
                self.pause_trigger(&key).await?;
            }
        }
        info!(?groups, "paused trigger groups");
        Ok(groups)
    }

    /// Resume every trigger in the matching groups. Returns the resumed groups.
    #[instrument(skip(self))]
    pub async fn resume_triggers(&self, matcher: &GroupMatcher) -> Result<Vec<String>, JobStoreError> {
        let groups = self.matching_trigger_groups(matcher, false).await?;
        for group in &groups {
            self.trigger_groups
                .store(&TriggerGroup::new(group.as_str(), GroupState::Active))
                .await?;
            for key in self.get_trigger_keys(&GroupMatcher::group_equals(group.as_str())).await? {
                self.resume_trigger(&key).await?;
            }
        }
        info!(?groups, "resumed trigger groups");
        Ok(groups)
    }

    pub async fn get_paused_trigger_groups(&self) -> Result<Vec<String>, JobStoreError> {
        let filter = Condition::new().equals(ATTR_STATE, state_value(GroupState::Paused.as_str()));
        let mut names: Vec<String> = self
            .trigger_groups
            .scan(Some(&filter))
            .await?
            .into_iter()
            .map(|group| group.name)
            .collect();
        names.sort();
        Ok(names)
    }

    pub async fn is_trigger_group_paused(&self, group: &str) -> Result<bool, JobStoreError> {
        Ok(self
            .trigger_groups
            .load(&entities::name_key(group))
            .await?
            .is_some_and(|g| g.state == GroupState::Paused))
    }

    /// Pause every trigger of a job.
    pub async fn pause_job(&self, key: &JobKey) -> Result<(), JobStoreError> {
        for trigger in self.get_triggers_for_job(key).await? {
            self.pause_trigger(&trigger.key).await?;
        }
        Ok(())
    }

    pub async fn resume_job(&self, key: &JobKey) -> Result<(), JobStoreError> {
        for trigger in self.get_triggers_for_job(key).await? {
            self.resume_trigger(&trigger.key).await?;
        }
        Ok(())
    }

    async fn matching_job_groups(
        &self,
        matcher: &GroupMatcher,
        include_exact: bool,
    ) -> Result<Vec<String>, JobStoreError> {
        let markers = self
            .job_groups
            .scan_items(group_filter(matcher, ATTR_NAME).as_ref())
            .await?;
        let members = self
            .jobs
            .scan_items(group_filter(matcher, ATTR_GROUP).as_ref())
            .await?;
        Ok(collect_groups(&markers, &members, matcher, include_exact)?)
    }

    /// Pause the triggers of every job in the matching groups and mark the
    /// groups paused. Returns the paused groups.
    #[instrument(skip(self))]
    pub async fn pause_jobs(&self, matcher: &GroupMatcher) -> Result<Vec<String>, JobStoreError> {
        let groups = self.matching_job_groups(matcher, true).await?;
        for group in &groups {
            self.job_groups
                .store(&JobGroup::new(group.as_str(), GroupState::Paused))
                .await?;
            for key in self.get_job_keys(&GroupMatcher::group_equals(group.as_str())).await? {
                self.pause_job(&key).await?;
            }
        }
        info!(?groups, "paused job groups");
        Ok(groups)
    }

    #[instrument(skip(self))]
    pub async fn resume_jobs(&self, matcher: &GroupMatcher) -> Result<Vec<String>, JobStoreError> {
        let groups = self.matching_job_groups(matcher, false).await?;
        for group in &groups {
            self.job_groups
                .store(&JobGroup::new(group.as_str(), GroupState::Active))
                .await?;
            for key in self.get_job_keys(&GroupMatcher::group_equals(group.as_str())).await? {
                self.resume_job(&key).await?;
            }
        }
        info!(?groups, "resumed job groups");
        Ok(groups)
    }

    pub async fn get_paused_job_groups(&self) -> Result<Vec<String>, JobStoreError> {
        let filter = Condition::new().equals(ATTR_STATE, state_value(GroupState::Paused.as_str()));
        let mut names: Vec<String> = self
            .job_groups
            .scan(Some(&filter))
            .await?
            .into_iter()
            .map(|group| group.name)
            .collect();
        names.sort();
        Ok(names)
    }

    pub async fn is_job_group_paused(&self, group: &str) -> Result<bool, JobStoreError> {
        Ok(self
            .job_groups
            .load(&entities::name_key(group))
            .await?
            .is_some_and(|g| g.state == GroupState::Paused))
    }

    /// Pause every known trigger group.
    pub async fn pause_all(&self) -> Result<(), JobStoreError> {
        self.pause_triggers(&GroupMatcher::Anything).await?;
        Ok(())
    }

    /// Resume every trigger group and clear every job group pause marker.
    pub async fn resume_all(&self) -> Result<(), JobStoreError> {
        self.resume_triggers(&GroupMatcher::Anything).await?;
        for group in self.get_paused_job_groups().await? {
            self.job_groups
                .store(&JobGroup::new(group, GroupState::Active))
                .await?;
        }
        Ok(())
    }

    // ========== Calendars ==========

    #[instrument(skip(self, calendar), fields(calendar = %calendar.name))]
    pub async fn store_calendar(
        &self,
        calendar: &Calendar,
        replace_existing: bool,
    ) -> Result<(), JobStoreError> {
        if replace_existing {
            self.calendars.store(calendar).await?;
        } else if self
            .calendars
            .store_conditional(calendar, &Condition::item_absent(ATTR_NAME))
            .await?
            .is_conflict()
        {
            return Err(JobStoreError::ObjectAlreadyExists(format!(
                "calendar {}",
                calendar.name
            )));
        }
        debug!("stored calendar");
        Ok(())
    }

    pub async fn retrieve_calendar(&self, name: &str) -> Result<Option<Calendar>, JobStoreError> {
        Ok(self.calendars.load(&entities::name_key(name)).await?)
    }

    /// Remove a calendar no trigger references. Returns whether it existed.
    #[instrument(skip(self))]
    pub async fn remove_calendar(&self, name: &str) -> Result<bool, JobStoreError> {
        let filter = Condition::new().equals(ATTR_CALENDAR_NAME, codec::encode_string(name));
        let referencing = self.triggers.scan_items(Some(&filter)).await?;
        if let Some(item) = referencing.first() {
            let (group, trigger) = entities::read_group_name(item)?;
            return Err(JobStoreError::CalendarInUse {
                calendar: name.to_string(),
                trigger: TriggerKey::new(group, trigger).to_string(),
            });
        }

        let key = entities::name_key(name);
        let existed = self.item_exists(self.calendars.table_name(), &key).await?;
        self.calendars.delete(&key).await?;
        Ok(existed)
    }

    pub async fn calendar_exists(&self, name: &str) -> Result<bool, JobStoreError> {
        self.item_exists(self.calendars.table_name(), &entities::name_key(name))
            .await
    }

    pub async fn get_calendar_names(&self) -> Result<Vec<String>, JobStoreError> {
        let mut names = self
            .calendars
            .scan_items(None)
            .await?
            .iter()
            .map(|item| codec::required_string(item, ATTR_NAME))
            .collect::<Result<Vec<_>, _>>()?;
        names.sort();
        Ok(names)
    }

    pub async fn number_of_calendars(&self) -> Result<usize, JobStoreError> {
        Ok(self.calendars.scan_items(None).await?.len())
    }

    // ========== Acquisition ==========

    async fn job_disallows_concurrency(&self, key: &JobKey) -> Result<bool, JobStoreError> {
        let item = self
            .store
            .get_item(self.jobs.table_name(), &entities::job_key(key))
            .await?;
        Ok(match item {
            Some(item) => match item.get(ATTR_CONCURRENT_EXECUTION_DISALLOWED) {
                Some(_) => codec::required_bool(&item, ATTR_CONCURRENT_EXECUTION_DISALLOWED)?,
                None => false,
            },
            None => false,
        })
    }

    /// Claim up to `max_count` waiting triggers due by
    /// `no_later_than + time_window`, earliest first and then by descending
    /// priority. Each claim is a compare-and-swap, so a trigger another
    /// instance claimed first is skipped. At most one trigger is claimed per
    /// job whose type disallows concurrent execution.
    #[instrument(skip(self), fields(instance = %self.config.instance_id))]
    pub async fn acquire_next_triggers(
        &self,
        no_later_than: DateTime<Utc>,
        max_count: usize,
        time_window: TimeDelta,
    ) -> Result<Vec<Trigger>, JobStoreError> {
        if max_count == 0 {
            return Ok(Vec::new());
        }

        let horizon = no_later_than
            .checked_add_signed(time_window)
            .ok_or_else(|| {
                JobStoreError::InvalidArgument(format!(
                    "acquisition window {} past {} is out of range",
                    time_window, no_later_than
                ))
            })?;
        let filter = Condition::new().equals(ATTR_STATE, state_value(TriggerState::Waiting.as_str()));
        let mut candidates: Vec<StoredTrigger> = self
            .triggers
            .scan(Some(&filter))
            .await?
            .into_iter()
            .filter(|s| s.trigger.next_fire_time.is_some_and(|t| t <= horizon))
            .collect();
        candidates.sort_by(|a, b| {
            a.trigger
                .next_fire_time
                .cmp(&b.trigger.next_fire_time)
                .then_with(|| b.trigger.priority.cmp(&a.trigger.priority))
                .then_with(|| a.trigger.key.cmp(&b.trigger.key))
        });

        let mut acquired = Vec::new();
        let mut exclusive: HashMap<JobKey, bool> = HashMap::new();
        let mut claimed_jobs: HashSet<JobKey> = HashSet::new();

        for candidate in candidates {
            if acquired.len() >= max_count {
                break;
            }

            let job_key = candidate.trigger.job_key.clone();
            let disallowed = match exclusive.get(&job_key) {
                Some(disallowed) => *disallowed,
                None => {
                    let disallowed = self.job_disallows_concurrency(&job_key).await?;
                    exclusive.insert(job_key.clone(), disallowed);
                    disallowed
                }
            };
            if disallowed && claimed_jobs.contains(&job_key) {
                debug!(trigger = %candidate.trigger.key, job = %job_key, "job already claimed in this batch");
                continue;
            }

            let claim = candidate.acquired(&self.config.instance_id);
            match self.triggers.store_conditional(&claim, &observed(&candidate)).await? {
                ConditionalWrite::Stored { .. } => {
                    debug!(trigger = %claim.trigger.key, "acquired trigger");
                    claimed_jobs.insert(job_key);
                    acquired.push(claim.trigger);
                }
                ConditionalWrite::Conflict { .. } => {
                    debug!(trigger = %claim.trigger.key, "trigger claimed elsewhere, skipping");
                }
            }
        }

        if !acquired.is_empty() {
            info!(count = acquired.len(), "acquired triggers");
        }
        Ok(acquired)
    }

    /// Return a trigger this instance acquired to `Waiting`. Returns whether
    /// a claim held by this instance was released.
    #[instrument(skip(self), fields(trigger = %key))]
    pub async fn release_acquired_trigger(&self, key: &TriggerKey) -> Result<bool, JobStoreError> {
        let instance_id = self.config.instance_id.as_str();
        let released = self
            .transition_trigger(key, |stored| {
                let held_here = stored.state == TriggerState::Acquired
                    && stored.acquired_by.as_deref() == Some(instance_id);
                held_here.then(|| stored.with_state(TriggerState::Waiting))
            })
            .await?;
        Ok(released.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JobTypeRegistry, NoOpJob, TriggerSchedule};
    use quarry_store::{MemoryItemStore, TableNames};

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    async fn job_store(instance: &str, store: Arc<dyn ItemStore>) -> JobStore {
        let config = JobStoreConfig::new(TableNames::new()).with_instance_id(instance);
        let job_store = JobStore::new(store, Arc::new(JobTypeRegistry::new()), config);
        job_store.initialize().await.unwrap();
        job_store
    }

    fn trigger(group: &str, name: &str, job: &JobKey, fire_at: i64) -> Trigger {
        Trigger::new(
            TriggerKey::new(group, name),
            job.clone(),
            at(fire_at),
            TriggerSchedule::once(),
        )
    }

    #[test]
    fn test_collect_groups_union_and_exact() {
        let marker: Item = entities::name_key("paused-only");
        let member: Item = entities::job_key(&JobKey::new("busy", "j"));
        let groups = collect_groups(
            &[marker],
            &[member],
            &GroupMatcher::Anything,
            false,
        )
        .unwrap();
        assert_eq!(groups, vec!["busy", "paused-only"]);

        let groups = collect_groups(&[], &[], &GroupMatcher::group_equals("new"), true).unwrap();
        assert_eq!(groups, vec!["new"]);
    }

    #[test]
    fn test_observed_guard_tracks_owner() {
        let job = JobKey::named("j");
        let stored = StoredTrigger::new(trigger("g", "t", &job, 1_000), TriggerState::Waiting);
        let compiled = observed(&stored).compile();
        assert!(compiled.expression.ends_with("attribute_not_exists(#a2)"));

        let compiled = observed(&stored.acquired("node-a")).compile();
        assert_eq!(compiled.values.len(), 3);
    }

    #[tokio::test]
    async fn test_acquire_orders_by_time_then_priority() {
        let store: Arc<dyn ItemStore> = Arc::new(MemoryItemStore::new());
        let js = job_store("node-a", store).await;
        let job = JobKey::new("G", "J");
        js.store_job(&JobDetail::new(job.clone(), NoOpJob::job_type()).durable(true), false)
            .await
            .unwrap();

        js.store_trigger(&trigger("G", "late", &job, 3_000), false).await.unwrap();
        js.store_trigger(&trigger("G", "low", &job, 1_000).with_priority(1), false)
            .await
            .unwrap();
        js.store_trigger(&trigger("G", "high", &job, 1_000).with_priority(9), false)
            .await
            .unwrap();
        js.store_trigger(&trigger("G", "future", &job, 60_000), false)
            .await
            .unwrap();

        let acquired = js
            .acquire_next_triggers(at(2_000), 10, TimeDelta::milliseconds(1_000))
            .await
            .unwrap();
        let names: Vec<_> = acquired.iter().map(|t| t.key.name.as_str()).collect();
        assert_eq!(names, vec!["high", "low", "late"]);

        assert_eq!(
            js.get_trigger_state(&TriggerKey::new("G", "future")).await.unwrap(),
            Some(TriggerState::Waiting)
        );
    }

    #[tokio::test]
    async fn test_acquire_rejects_out_of_range_window() {
        let store: Arc<dyn ItemStore> = Arc::new(MemoryItemStore::new());
        let js = job_store("node-a", store).await;

        let err = js
            .acquire_next_triggers(DateTime::<Utc>::MAX_UTC, 1, TimeDelta::days(1))
            .await
            .unwrap_err();
        assert!(matches!(err, JobStoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_two_instances_never_share_a_trigger() {
        let store: Arc<dyn ItemStore> = Arc::new(MemoryItemStore::new());
        let a = job_store("node-a", Arc::clone(&store)).await;
        let b = job_store("node-b", store).await;
        let job = JobKey::new("G", "J");
        a.store_job(&JobDetail::new(job.clone(), NoOpJob::job_type()).durable(true), false)
            .await
            .unwrap();
        for i in 0..6 {
            a.store_trigger(&trigger("G", &format!("t{}", i), &job, 1_000), false)
                .await
                .unwrap();
        }

        let (from_a, from_b) = tokio::join!(
            a.acquire_next_triggers(at(1_000), 6, TimeDelta::zero()),
            b.acquire_next_triggers(at(1_000), 6, TimeDelta::zero()),
        );
        let mut all: Vec<TriggerKey> = from_a
            .unwrap()
            .into_iter()
            .chain(from_b.unwrap())
            .map(|t| t.key)
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
        assert_eq!(total, 6);
    }
}
