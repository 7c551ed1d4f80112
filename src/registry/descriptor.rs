use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::RegistryError;

/// Externally declared job module: a name plus its ordered step graph.
///
/// One descriptor per YAML file:
///
/// ```yaml
/// name: jobPointAddChunk
/// steps:
///   - name: pointAddStep
///     runner: point_add_chunk
///     options:
///       chunk_size: 10
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobDescriptor {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<StepDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepDescriptor {
    pub name: String,
    pub runner: String,
    #[serde(default)]
    pub options: serde_yaml::Value,
}

/// Load every declared job module descriptor. Any read or parse failure is
/// fatal to startup.
pub fn load_job_modules(paths: &[String]) -> Result<Vec<JobDescriptor>, RegistryError> {
    let mut descriptors = Vec::with_capacity(paths.len());
    for path in paths {
        descriptors.push(load_descriptor(Path::new(path))?);
    }
    Ok(descriptors)
}

fn load_descriptor(path: &Path) -> Result<JobDescriptor, RegistryError> {
    let raw = fs::read_to_string(path).map_err(|source| RegistryError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_yaml::from_str(&raw).map_err(|source| RegistryError::Parse {
        path: path.display().to_string(),
        source,
    })
}
