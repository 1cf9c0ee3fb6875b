//! Executable job types and their resolution from stored descriptors.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::JobDataMap;

/// Descriptor under which [`NoOpJob`] is registered.
pub const NOOP_JOB_TYPE: &str = "quarry.NoOpJob";

/// A unit of executable work.
#[async_trait]
pub trait Job: Send + Sync {
    async fn execute(&self, data: &JobDataMap) -> Result<(), String>;
}

/// Execution traits declared by a job type. Stored alongside each job but
/// always taken from the type on load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCapabilities {
    pub persist_job_data_after_execution: bool,
    pub concurrent_execution_disallowed: bool,
}

/// Builds a fresh job instance per execution.
pub type JobFactory = Arc<dyn Fn() -> Box<dyn Job> + Send + Sync>;

/// A job implementation known by a stable string descriptor.
#[derive(Clone)]
pub struct JobType {
    descriptor: String,
    capabilities: JobCapabilities,
    factory: JobFactory,
}

impl JobType {
    pub fn new(
        descriptor: impl Into<String>,
        capabilities: JobCapabilities,
        factory: impl Fn() -> Box<dyn Job> + Send + Sync + 'static,
    ) -> Self {
        Self {
            descriptor: descriptor.into(),
            capabilities,
            factory: Arc::new(factory),
        }
    }

    /// Job type for a `Default`-constructible implementation.
    pub fn of<J: Job + Default + 'static>(
        descriptor: impl Into<String>,
        capabilities: JobCapabilities,
    ) -> Self {
        Self::new(descriptor, capabilities, || Box::new(J::default()))
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn capabilities(&self) -> JobCapabilities {
        self.capabilities
    }

    pub fn instantiate(&self) -> Box<dyn Job> {
        (self.factory)()
    }
}

impl fmt::Debug for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobType")
            .field("descriptor", &self.descriptor)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl PartialEq for JobType {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor && self.capabilities == other.capabilities
    }
}

/// Maps a stored descriptor back to an executable job type.
pub trait JobTypeResolver: Send + Sync {
    fn resolve(&self, descriptor: &str) -> Option<JobType>;
}

/// Resolver backed by an explicit registration table.
pub struct JobTypeRegistry {
    types: DashMap<String, JobType>,
}

impl JobTypeRegistry {
    /// Registry holding only [`NoOpJob`].
    pub fn new() -> Self {
        let registry = Self {
            types: DashMap::new(),
        };
        registry.register(NoOpJob::job_type());
        registry
    }

    /// Add or replace a job type under its descriptor.
    pub fn register(&self, job_type: JobType) {
        self.types.insert(job_type.descriptor.clone(), job_type);
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for JobTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTypeResolver for JobTypeRegistry {
    fn resolve(&self, descriptor: &str) -> Option<JobType> {
        self.types.get(descriptor).map(|entry| entry.value().clone())
    }
}

/// Does nothing. Useful for triggers that only mark time.
#[derive(Debug, Default)]
pub struct NoOpJob;

impl NoOpJob {
    pub fn job_type() -> JobType {
        JobType::of::<NoOpJob>(NOOP_JOB_TYPE, JobCapabilities::default())
    }
}

#[async_trait]
impl Job for NoOpJob {
    async fn execute(&self, _data: &JobDataMap) -> Result<(), String> {
        Ok(())
    }
}
