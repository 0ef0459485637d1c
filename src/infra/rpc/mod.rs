//! JSON-RPC access to a DeFiChain node.

pub mod client;
pub mod defid;

pub use client::{JsonRpcClient, RpcClientConfig, RpcCredentials};
pub use defid::{DEFAULT_FALLBACK_FEE_RATE, DefidClient, MAX_FALLBACK_FEE_RATE};
