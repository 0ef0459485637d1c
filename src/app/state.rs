//! Application state management.
//!
//! This module provides the shared application state that is
//! accessible to all request handlers via Axum's State extractor.

use std::sync::Arc;

use secrecy::SecretString;

use crate::infra::PrometheusHandle;

use super::service::TransferDomainService;

/// Shared application state for the Axum web server.
///
/// All contained types are wrapped in `Arc` or are cheap to clone, making
/// `AppState` safe to share across async tasks.
#[derive(Clone)]
pub struct AppState {
    /// The service containing the transfer-domain use cases.
    pub service: Arc<TransferDomainService>,

    /// API key required on mutating routes; `None` disables the check.
    pub api_auth_key: Option<SecretString>,

    /// Prometheus handle rendered by `GET /metrics`, when a recorder is installed.
    pub metrics_handle: Option<Arc<PrometheusHandle>>,
}

impl AppState {
    #[must_use]
    pub fn new(service: Arc<TransferDomainService>) -> Self {
        Self {
            service,
            api_auth_key: None,
            metrics_handle: None,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, key: SecretString) -> Self {
        self.api_auth_key = Some(key);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, handle: Arc<PrometheusHandle>) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
