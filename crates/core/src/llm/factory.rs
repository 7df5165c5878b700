// crates/core/src/llm/factory.rs
//! Service factory: creates a ClassificationService from configuration.

use std::sync::Arc;

use crate::config::{Backend, EnrichConfig};

use super::anthropic_batch::{AnthropicBatchService, BATCH_SERVICE_NAME};
use super::anthropic_messages::{AnthropicMessagesService, MESSAGES_SERVICE_NAME};
use super::provider::ClassificationService;
use super::types::ServiceError;

/// Create the classification service for the configured backend.
pub fn create_service(
    config: &EnrichConfig,
    api_key: &str,
) -> Result<Arc<dyn ClassificationService>, ServiceError> {
    Ok(match config.backend {
        Backend::Batch => Arc::new(AnthropicBatchService::new(config, api_key)?),
        Backend::Sync => Arc::new(AnthropicMessagesService::new(config, api_key)?),
    })
}

/// Service name a backend records on its jobs.
pub fn service_name(backend: Backend) -> &'static str {
    match backend {
        Backend::Batch => BATCH_SERVICE_NAME,
        Backend::Sync => MESSAGES_SERVICE_NAME,
    }
}

/// Backend that owns jobs recorded under `name`, if known.
pub fn backend_for_service(name: &str) -> Option<Backend> {
    match name {
        BATCH_SERVICE_NAME => Some(Backend::Batch),
        MESSAGES_SERVICE_NAME => Some(Backend::Sync),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_service_matches_backend() {
        for backend in [Backend::Batch, Backend::Sync] {
            let config = EnrichConfig {
                backend,
                ..EnrichConfig::default()
            };
            let service = create_service(&config, "k").unwrap();
            assert_eq!(service.name(), service_name(backend));
            assert_eq!(backend_for_service(service.name()), Some(backend));
            assert_eq!(service.model(), config.model);
        }
        assert_eq!(backend_for_service("claude-cli"), None);
    }
}
