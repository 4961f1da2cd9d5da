//! Job configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl MigrationJob {
    /// Load a job from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a job from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let job: MigrationJob = serde_yaml::from_str(yaml)?;
        job.validate()?;
        Ok(job)
    }

    /// Validate the job.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}
