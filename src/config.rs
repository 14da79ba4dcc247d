// Copyright 2025 chenjjiaa
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use ethers::prelude::LocalWallet;
use std::str::FromStr;

pub const DEFAULT_RPC_URL: &str = "https://api.harmony.one";
/// Harmony mainnet, shard 0.
pub const DEFAULT_CHAIN_ID: u64 = 1_666_600_000;

#[derive(Clone)]
pub struct Config {
    pub log_level: String,
    pub rpc_url: String,
    pub chain_id: u64,
    pub private_key: Option<String>,
    pub server_host: String,
    /// 0 selects stdio transport.
    pub server_port: u16,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("log_level", &self.log_level)
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .finish()
    }
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let chain_id = match lookup("CHAIN_ID") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("Invalid CHAIN_ID: {}", raw))?,
            None => DEFAULT_CHAIN_ID,
        };

        let server_port = match lookup("SERVER_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("Invalid SERVER_PORT: {}", raw))?,
            None => 0,
        };

        Ok(Self {
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            rpc_url: lookup("ETH_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            chain_id,
            private_key: lookup("PRIVATE_KEY").filter(|key| !key.trim().is_empty()),
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            server_port,
        })
    }

    /// The signing wallet, if a key is configured.
    pub fn wallet(&self) -> Result<Option<LocalWallet>> {
        self.private_key
            .as_deref()
            .map(|key| {
                LocalWallet::from_str(key.trim().trim_start_matches("0x"))
                    .context("Invalid PRIVATE_KEY")
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_target_harmony_over_stdio() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(config.chain_id, DEFAULT_CHAIN_ID);
        assert_eq!(config.server_port, 0);
        assert_eq!(config.log_level, "info");
        assert!(config.wallet().unwrap().is_none());
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(config_from(&[("SERVER_PORT", "http")]).is_err());
        assert!(config_from(&[("CHAIN_ID", "-1")]).is_err());
    }

    #[test]
    fn blank_key_is_no_key() {
        let config = config_from(&[("PRIVATE_KEY", "  ")]).unwrap();
        assert!(config.private_key.is_none());
    }

    #[test]
    fn parses_prefixed_key_and_redacts_it() {
        let key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let config = config_from(&[("PRIVATE_KEY", key)]).unwrap();
        assert!(config.wallet().unwrap().is_some());
        assert!(!format!("{:?}", config).contains("ac0974"));
    }

    #[test]
    fn garbage_key_is_an_error() {
        let config = config_from(&[("PRIVATE_KEY", "not-a-key")]).unwrap();
        assert!(config.wallet().is_err());
    }
}
