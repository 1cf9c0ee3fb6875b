use std::sync::Arc;

use quarry_store::{
    ATTR_GROUP, ATTR_NAME, DynamoEntity, Item, RecordError, RecordFactory, TableKind, codec,
};

use super::{ATTR_CONCURRENT_EXECUTION_DISALLOWED, ATTR_DURABLE};
use crate::{JobDetail, JobKey, JobTypeResolver};

const ATTR_DESCRIPTION: &str = "Description";
const ATTR_JOB_TYPE: &str = "JobType";
const ATTR_JOB_DATA: &str = "JobDataMap";
const ATTR_REQUESTS_RECOVERY: &str = "RequestsRecovery";
const ATTR_PERSIST_JOB_DATA: &str = "PersistJobDataAfterExecution";

impl DynamoEntity for JobDetail {
    const TABLE: TableKind = TableKind::Job;

    fn key(&self) -> Item {
        super::job_key(&self.key)
    }

    fn to_record(&self) -> Result<Item, RecordError> {
        let mut item = self.key();
        item.insert(
            ATTR_DESCRIPTION.into(),
            codec::encode_optional_string(self.description.as_deref()),
        );
        item.insert(
            ATTR_JOB_TYPE.into(),
            codec::encode_string(self.job_type.descriptor()),
        );
        item.insert(
            ATTR_JOB_DATA.into(),
            codec::encode_map(ATTR_JOB_DATA, &self.job_data)?,
        );
        item.insert(ATTR_DURABLE.into(), codec::encode_bool(self.durable));
        item.insert(
            ATTR_REQUESTS_RECOVERY.into(),
            codec::encode_bool(self.requests_recovery),
        );
        item.insert(
            ATTR_PERSIST_JOB_DATA.into(),
            codec::encode_bool(self.persist_job_data_after_execution()),
        );
        item.insert(
            ATTR_CONCURRENT_EXECUTION_DISALLOWED.into(),
            codec::encode_bool(self.concurrent_execution_disallowed()),
        );
        Ok(item)
    }
}

impl JobDetail {
    /// Decode a job record, resolving its job type through `resolver`.
    pub fn decode(record: &Item, resolver: &dyn JobTypeResolver) -> Result<Self, RecordError> {
        let descriptor = codec::required_string(record, ATTR_JOB_TYPE)?;
        let job_type = resolver
            .resolve(&descriptor)
            .ok_or(RecordError::UnresolvedJobType(descriptor))?;

        Ok(Self {
            key: JobKey::new(
                codec::required_string(record, ATTR_GROUP)?,
                codec::required_string(record, ATTR_NAME)?,
            ),
            description: codec::optional_string(record, ATTR_DESCRIPTION)?,
            job_type,
            job_data: codec::required_map(record, ATTR_JOB_DATA)?,
            durable: codec::required_bool(record, ATTR_DURABLE)?,
            requests_recovery: codec::required_bool(record, ATTR_REQUESTS_RECOVERY)?,
        })
    }

    /// Record factory bound to a resolver, for use with
    /// [`Repository::with_factory`](quarry_store::Repository::with_factory).
    pub fn decoder(resolver: Arc<dyn JobTypeResolver>) -> RecordFactory<JobDetail> {
        Arc::new(move |record| JobDetail::decode(record, resolver.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JobCapabilities, JobType, JobTypeRegistry, NoOpJob};
    use pretty_assertions::assert_eq;
    use quarry_store::AttributeValue;
    use serde_json::json;

    #[test]
    fn test_job_record_round_trip() {
        let registry = JobTypeRegistry::new();
        let job = JobDetail::new(JobKey::new("G1", "J1"), NoOpJob::job_type())
            .with_data("count", json!(3))
            .with_data("nested", json!({"a": "b", "flag": true}))
            .durable(true);

        let record = job.to_record().unwrap();
        assert_eq!(record.get("Description"), Some(&AttributeValue::Null(true)));
        assert_eq!(
            record.get("JobType"),
            Some(&AttributeValue::S("quarry.NoOpJob".into()))
        );
        assert_eq!(record.get("Durable"), Some(&AttributeValue::Bool(true)));

        let decoded = JobDetail::decode(&record, &registry).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn test_empty_description_is_not_null() {
        let registry = JobTypeRegistry::new();
        let job = JobDetail::new(JobKey::new("G1", "J1"), NoOpJob::job_type()).with_description("");

        let record = job.to_record().unwrap();
        assert_eq!(record.get("Description"), Some(&AttributeValue::S(String::new())));

        let decoded = JobDetail::decode(&record, &registry).unwrap();
        assert_eq!(decoded.description, Some(String::new()));
        assert_eq!(decoded, job);
    }

    #[test]
    fn test_capability_flags_follow_job_type() {
        #[derive(Default)]
        struct Exclusive;

        #[async_trait::async_trait]
        impl crate::Job for Exclusive {
            async fn execute(&self, _data: &crate::JobDataMap) -> Result<(), String> {
                Ok(())
            }
        }

        let job_type = JobType::of::<Exclusive>(
            "test.Exclusive",
            JobCapabilities {
                persist_job_data_after_execution: true,
                concurrent_execution_disallowed: true,
            },
        );
        let record = JobDetail::new(JobKey::named("x"), job_type)
            .to_record()
            .unwrap();
        assert_eq!(
            record.get("PersistJobDataAfterExecution"),
            Some(&AttributeValue::Bool(true))
        );
        assert_eq!(
            record.get("ConcurrentExecutionDisallowed"),
            Some(&AttributeValue::Bool(true))
        );

        // Stored flags are ignored on load; the resolved type decides.
        let registry = JobTypeRegistry::new();
        registry.register(JobType::of::<Exclusive>(
            "test.Exclusive",
            JobCapabilities::default(),
        ));
        let decoded = JobDetail::decode(&record, &registry).unwrap();
        assert!(!decoded.concurrent_execution_disallowed());
    }

    #[test]
    fn test_unresolved_job_type_is_structural_error() {
        let job = JobDetail::new(JobKey::new("G", "J"), NoOpJob::job_type());
        let mut record = job.to_record().unwrap();
        record.insert("JobType".into(), AttributeValue::S("gone.Job".into()));

        let err = JobDetail::decode(&record, &JobTypeRegistry::new()).unwrap_err();
        assert_eq!(err, RecordError::UnresolvedJobType("gone.Job".into()));
    }

    #[test]
    fn test_missing_required_attribute() {
        let job = JobDetail::new(JobKey::new("G", "J"), NoOpJob::job_type());
        let mut record = job.to_record().unwrap();
        record.remove("Durable");

        let err = JobDetail::decode(&record, &JobTypeRegistry::new()).unwrap_err();
        assert_eq!(err, RecordError::MissingAttribute("Durable".into()));
    }

    #[test]
    fn test_array_in_job_data_rejected() {
        let job = JobDetail::new(JobKey::new("G", "J"), NoOpJob::job_type())
            .with_data("list", json!([1, 2]));
        let err = job.to_record().unwrap_err();
        assert!(matches!(err, RecordError::UnsupportedValue { .. }));
    }
}
