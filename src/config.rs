//! Process configuration read from environment variables.
//!
//! `.env` files are loaded by `main` through `dotenvy` before
//! [`AppConfig::from_env`] runs.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::app::ServiceSettings;
use crate::domain::{Amount, ConfigError, Network};
use crate::infra::{
    DefidClient, JsonRpcClient, LogFormat, RpcClientConfig, RpcCredentials,
    rpc::{DEFAULT_FALLBACK_FEE_RATE, MAX_FALLBACK_FEE_RATE},
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub defid_rpc_url: String,
    pub defid_rpc_user: Option<String>,
    pub defid_rpc_password: Option<SecretString>,
    pub evm_rpc_url: Option<String>,
    pub network: Network,
    pub bind_addr: SocketAddr,
    pub api_auth_key: Option<SecretString>,
    pub rpc: RpcClientConfig,
    pub submit_timeout: Duration,
    pub lookup_timeout: Duration,
    pub fallback_fee_rate: Amount,
    pub rate_limit_rps: u32,
    pub rate_limit_burst: u32,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which returns `None` for
    /// unset keys. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let defid_rpc_url = get("DEFID_RPC_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DEFID_RPC_URL".to_string()))?;

        let defaults = RpcClientConfig::default();
        let rpc = RpcClientConfig {
            timeout: parse_or(&get, "RPC_TIMEOUT_SECS", defaults.timeout.as_secs())
                .map(Duration::from_secs)?,
            max_retries: parse_or(&get, "RPC_MAX_RETRIES", defaults.max_retries)?,
            retry_delay: defaults.retry_delay,
        };
        let service = ServiceSettings::default();

        let fallback_fee_rate = match get("FALLBACK_FEE_RATE") {
            Some(raw) => raw.parse::<Amount>().map_err(|e| ConfigError::InvalidValue {
                key: "FALLBACK_FEE_RATE".to_string(),
                message: e.to_string(),
            })?,
            None => Amount::from_units(DEFAULT_FALLBACK_FEE_RATE)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?,
        };
        if fallback_fee_rate.units() > MAX_FALLBACK_FEE_RATE {
            return Err(ConfigError::InvalidValue {
                key: "FALLBACK_FEE_RATE".to_string(),
                message: format!("{fallback_fee_rate} exceeds 1 DFI per kvB"),
            });
        }

        Ok(Self {
            defid_rpc_url,
            defid_rpc_user: get("DEFID_RPC_USER"),
            defid_rpc_password: get("DEFID_RPC_PASSWORD").map(SecretString::from),
            evm_rpc_url: get("EVM_RPC_URL"),
            network: parse_or(&get, "NETWORK", Network::Mainnet)?,
            bind_addr: parse_or(&get, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            api_auth_key: get("API_AUTH_KEY").map(SecretString::from),
            rpc,
            submit_timeout: parse_or(&get, "SUBMIT_TIMEOUT_SECS", service.submit_timeout.as_secs())
                .map(Duration::from_secs)?,
            lookup_timeout: parse_or(&get, "LOOKUP_TIMEOUT_SECS", service.lookup_timeout.as_secs())
                .map(Duration::from_secs)?,
            fallback_fee_rate,
            rate_limit_rps: parse_or(&get, "RATE_LIMIT_RPS", 10)?,
            rate_limit_burst: parse_or(&get, "RATE_LIMIT_BURST", 20)?,
            log_format: parse_or(&get, "LOG_FORMAT", LogFormat::Pretty)?,
        })
    }

    #[must_use]
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            network: self.network,
            submit_timeout: self.submit_timeout,
            lookup_timeout: self.lookup_timeout,
        }
    }

    /// Build the node client described by this configuration.
    pub fn defid_client(&self) -> Result<DefidClient, crate::domain::AppError> {
        let credentials = match (&self.defid_rpc_user, &self.defid_rpc_password) {
            (Some(user), Some(password)) => Some(RpcCredentials {
                user: user.clone(),
                password: password.clone(),
            }),
            _ => None,
        };
        let rpc = JsonRpcClient::new(&self.defid_rpc_url, credentials.clone(), self.rpc.clone())?;
        let mut client =
            DefidClient::new(rpc, self.network).with_fallback_fee_rate(self.fallback_fee_rate);
        if let Some(url) = &self.evm_rpc_url {
            client = client.with_evm_rpc(JsonRpcClient::new(url, credentials, self.rpc.clone())?);
        }
        Ok(client)
    }
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
