use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

use peerbeam_gateway::RejoinPolicy;
use peerbeam_gateway::connection::HEARTBEAT_INTERVAL;

/// Relay process settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rejoin_policy: RejoinPolicy,
    pub heartbeat_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3030,
            rejoin_policy: RejoinPolicy::Replace,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys fall back to defaults;
    /// set-but-invalid keys are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let host = lookup("PEERBEAM_HOST").unwrap_or(defaults.host);
        let port = match lookup("PEERBEAM_PORT") {
            Some(v) => v.parse().with_context(|| format!("PEERBEAM_PORT={v:?} is not a port"))?,
            None => defaults.port,
        };
        let rejoin_policy = match lookup("PEERBEAM_REJOIN_POLICY") {
            Some(v) => v.parse().map_err(anyhow::Error::msg).context("PEERBEAM_REJOIN_POLICY")?,
            None => defaults.rejoin_policy,
        };
        let heartbeat_interval = match lookup("PEERBEAM_HEARTBEAT_SECS") {
            Some(v) => {
                let secs: u64 = v
                    .parse()
                    .with_context(|| format!("PEERBEAM_HEARTBEAT_SECS={v:?} is not a number"))?;
                anyhow::ensure!(secs > 0, "PEERBEAM_HEARTBEAT_SECS must be at least 1");
                Duration::from_secs(secs)
            }
            None => defaults.heartbeat_interval,
        };

        Ok(Self {
            host,
            port,
            rejoin_policy,
            heartbeat_interval,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}
