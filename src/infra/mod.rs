//! Infrastructure layer implementations.

pub mod observability;
pub mod rpc;

pub use observability::{
    LogFormat, PrometheusHandle, init_metrics, init_metrics_handle, init_tracing,
};
pub use rpc::{DefidClient, JsonRpcClient, RpcClientConfig, RpcCredentials};
