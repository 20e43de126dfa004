use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context;

use crate::executor::{CommandAllowList, ExecutorConfig};

const DEFAULT_MSCS_PATH: &str = "/usr/local/bin/mscs";
const DEFAULT_WORLDS_ROOT: &str = "/opt/mscs/worlds";
const DEFAULT_PROPERTIES_PATH: &str = "./server.properties";
const DEFAULT_ADDR: &str = "0.0.0.0:8080";

const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_CACHE_SWEEP_MS: u64 = 60_000;

pub(crate) fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<u64>().ok())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn command_timeout() -> Duration {
    Duration::from_millis(
        env_u64("MSCS_COMMAND_TIMEOUT_MS")
            .map(|v| v.clamp(1000, 10 * 60 * 1000))
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT_MS),
    )
}

pub fn cache_sweep_interval() -> Duration {
    Duration::from_millis(
        env_u64("MSCS_CACHE_SWEEP_MS")
            .map(|v| v.clamp(1000, 60 * 60 * 1000))
            .unwrap_or(DEFAULT_CACHE_SWEEP_MS),
    )
}

/// Everything the agent needs at startup, resolved once from the environment.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub executor: ExecutorConfig,
    pub worlds_root: PathBuf,
    pub properties_path: PathBuf,
    pub cache_sweep_interval: Duration,
    pub listen_addr: SocketAddr,
    pub log_dir: Option<PathBuf>,
}

impl AgentConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let raw_addr = env_string("MSCS_AGENT_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let listen_addr: SocketAddr = raw_addr
            .parse()
            .with_context(|| format!("invalid MSCS_AGENT_ADDR: {raw_addr}"))?;

        let executable = env_string("MSCS_PATH").unwrap_or_else(|| DEFAULT_MSCS_PATH.to_string());

        Ok(Self {
            executor: ExecutorConfig {
                executable: PathBuf::from(executable),
                allowed: CommandAllowList::default(),
                timeout: command_timeout(),
            },
            worlds_root: PathBuf::from(
                env_string("MSCS_WORLDS_ROOT").unwrap_or_else(|| DEFAULT_WORLDS_ROOT.to_string()),
            ),
            properties_path: PathBuf::from(
                env_string("MSCS_PROPERTIES_PATH")
                    .unwrap_or_else(|| DEFAULT_PROPERTIES_PATH.to_string()),
            ),
            cache_sweep_interval: cache_sweep_interval(),
            listen_addr,
            log_dir: env_string("MSCS_LOG_DIR").map(PathBuf::from),
        })
    }
}
