//! Transfer Domain
//!
//! Builds, validates, encodes and submits DeFiChain transfer-domain
//! transactions, which move token balances between the native UTXO
//! ledger (DVM) and the EVM state.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                   API Layer                  │
//! │  HTTP handlers, routing, request validation  │
//! ├─────────────────────────────────────────────┤
//! │               Application Layer              │
//! │ Precondition checks, assembly, submission    │
//! ├─────────────────────────────────────────────┤
//! │                 Domain Layer                 │
//! │  Types, wire codec, addresses, errors, traits│
//! ├─────────────────────────────────────────────┤
//! │             Infrastructure Layer             │
//! │   defid JSON-RPC client, tracing, metrics    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Balances, coins, keys and broadcast sit behind the traits in
//! [`domain::traits`], so the service runs against a node or against
//! the in-memory ledger in `test_utils`.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use transfer_domain::api::create_router;
//! use transfer_domain::app::{AppState, TransferDomainService};
//! use transfer_domain::config::AppConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let node = Arc::new(config.defid_client()?);
//!     let service = TransferDomainService::new(
//!         node.clone(),
//!         node.clone(),
//!         node.clone(),
//!         node,
//!         config.service_settings(),
//!     );
//!     let router = create_router(Arc::new(AppState::new(Arc::new(service))));
//!     let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod infra;

// Test utilities are available in tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
