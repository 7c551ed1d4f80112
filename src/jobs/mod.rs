pub mod point_add;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::exit_status::StepExecution;
use crate::queue::JobParameters;

/// An executable step inside a job definition.
///
/// Runners report record counters through [`StepExecution`]; a returned
/// error is an unhandled fault and classifies the whole job as failed. The
/// internal read/transform/write pipeline of a runner is deliberately its
/// own concern.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(&self, step_name: &str, parameters: &JobParameters) -> Result<StepExecution>;
}

type RunnerFactory =
    Box<dyn Fn(&serde_yaml::Value) -> Result<Arc<dyn StepRunner>> + Send + Sync>;

/// Startup-registered mapping from a descriptor's runner kind to a factory
/// that builds the runner from its per-step options.
#[derive(Default)]
pub struct StepCatalog {
    factories: HashMap<String, RunnerFactory>,
}

impl StepCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&serde_yaml::Value) -> Result<Arc<dyn StepRunner>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    pub(crate) fn instantiate(
        &self,
        kind: &str,
        options: &serde_yaml::Value,
    ) -> Option<Result<Arc<dyn StepRunner>>> {
        self.factories.get(kind).map(|factory| factory(options))
    }
}
