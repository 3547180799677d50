//! `validate-policy` CLI command: parses and validates a policy document
//! without starting the pipeline, reporting the first failure found.

use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::policy::FilePolicyRepository;
use phoenix_domain::PhoenixError;
use std::path::Path;
use std::sync::Arc;

pub fn validate_policy_file(path: impl AsRef<Path>) -> Result<(), PhoenixError> {
    let metrics = Arc::new(MetricsService::new()?);
    FilePolicyRepository::load(path.as_ref(), metrics).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nonexistent_file() {
        assert!(validate_policy_file("/nonexistent/phoenix-policy.yaml").is_err());
    }
}
