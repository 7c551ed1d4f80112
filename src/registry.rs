mod descriptor;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

pub use descriptor::{JobDescriptor, StepDescriptor, load_job_modules};

use crate::jobs::{StepCatalog, StepRunner};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown job: {0}")]
    UnknownJob(String),
    #[error("duplicate job name: {0}")]
    DuplicateJob(String),
    #[error("job {job} references unknown step runner kind {kind}")]
    UnknownRunner { job: String, kind: String },
    #[error("failed to build step runner {kind} for job {job}")]
    RunnerBuild {
        job: String,
        kind: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to read job descriptor {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse job descriptor {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A named step bound to its executable runner.
pub struct JobStep {
    name: String,
    runner: Arc<dyn StepRunner>,
}

impl std::fmt::Debug for JobStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStep").field("name", &self.name).finish()
    }
}

impl JobStep {
    #[must_use]
    pub fn new(name: impl Into<String>, runner: Arc<dyn StepRunner>) -> Self {
        Self {
            name: name.into(),
            runner,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn runner(&self) -> &dyn StepRunner {
        self.runner.as_ref()
    }
}

/// An executable job definition: a name plus its internal step graph.
/// Immutable after registry construction.
#[derive(Debug)]
pub struct JobDefinition {
    name: String,
    steps: Vec<JobStep>,
}

impl JobDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>, steps: Vec<JobStep>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn steps(&self) -> &[JobStep] {
        &self.steps
    }
}

/// Name-to-definition lookup table, built once at startup and read
/// concurrently without synchronization afterwards.
pub struct JobRegistry {
    jobs: HashMap<String, Arc<JobDefinition>>,
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.jobs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl JobRegistry {
    /// Load descriptors from `paths` and bind each step to a runner from the
    /// catalog. Duplicate names, unknown runner kinds, and unreadable
    /// descriptors are all fatal startup errors.
    pub fn load(paths: &[String], catalog: &StepCatalog) -> Result<Self, RegistryError> {
        let descriptors = load_job_modules(paths)?;
        Self::from_descriptors(&descriptors, catalog)
    }

    pub fn from_descriptors(
        descriptors: &[JobDescriptor],
        catalog: &StepCatalog,
    ) -> Result<Self, RegistryError> {
        let mut definitions = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let mut steps = Vec::with_capacity(descriptor.steps.len());
            for step in &descriptor.steps {
                let runner = catalog
                    .instantiate(&step.runner, &step.options)
                    .ok_or_else(|| RegistryError::UnknownRunner {
                        job: descriptor.name.clone(),
                        kind: step.runner.clone(),
                    })?
                    .map_err(|source| RegistryError::RunnerBuild {
                        job: descriptor.name.clone(),
                        kind: step.runner.clone(),
                        source,
                    })?;
                steps.push(JobStep::new(step.name.clone(), runner));
            }
            definitions.push(JobDefinition::new(descriptor.name.clone(), steps));
        }
        Self::from_definitions(definitions)
    }

    pub fn from_definitions(definitions: Vec<JobDefinition>) -> Result<Self, RegistryError> {
        let mut jobs = HashMap::with_capacity(definitions.len());
        for definition in definitions {
            let name = definition.name().to_string();
            if jobs.insert(name.clone(), Arc::new(definition)).is_some() {
                return Err(RegistryError::DuplicateJob(name));
            }
        }
        Ok(Self { jobs })
    }

    /// Resolve a request's job name to its executable definition.
    pub fn resolve(&self, name: &str) -> Result<Arc<JobDefinition>, RegistryError> {
        self.jobs
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownJob(name.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Registered names, sorted for stable logging.
    #[must_use]
    pub fn job_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.jobs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
