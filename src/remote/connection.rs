use std::time::{Duration, Instant};

use serde_json::json;

use crate::error::AddressBookError;
use crate::shared::rpc::{parse_hex_u64, rpc_string};

pub const PROBE_TIMEOUT_MS: u64 = 8_000;

pub const DEFAULT_PROFILE_RPC_URLS: &[&str] = &[
    "https://rpc.mainnet.lukso.network",
    "https://42.rpc.thirdweb.com",
    "https://lukso.drpc.org",
];

/// A reachable endpoint, valid for the operation that resolved it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcConnection {
    pub url: String,
    pub chain_id: u64,
}

#[derive(Debug, Clone)]
pub struct EndpointResolver {
    candidates: Vec<String>,
    probe_timeout: Duration,
}

impl Default for EndpointResolver {
    fn default() -> Self {
        Self::new(
            DEFAULT_PROFILE_RPC_URLS
                .iter()
                .map(|url| (*url).to_string())
                .collect(),
        )
    }
}

impl EndpointResolver {
    pub fn new(candidates: Vec<String>) -> Self {
        Self {
            candidates,
            probe_timeout: Duration::from_millis(PROBE_TIMEOUT_MS),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Probe candidates in order with `eth_chainId`; the first answer wins.
    pub fn resolve(&self) -> Result<RpcConnection, AddressBookError> {
        self.resolve_with(probe_chain_id)
    }

    pub fn resolve_with<F>(&self, mut probe: F) -> Result<RpcConnection, AddressBookError>
    where
        F: FnMut(&str, Duration) -> Result<u64, String>,
    {
        let mut last_error = "no candidate endpoints configured".to_string();
        for (idx, url) in self.candidates.iter().enumerate() {
            let started_at = Instant::now();
            match probe(url, self.probe_timeout) {
                Ok(chain_id) => {
                    log::debug!(
                        "[AddressBook/Rpc] using endpoint #{} {} chainId={} probeMs={}",
                        idx,
                        url,
                        chain_id,
                        started_at.elapsed().as_millis()
                    );
                    return Ok(RpcConnection {
                        url: url.clone(),
                        chain_id,
                    });
                }
                Err(err) => {
                    log::warn!(
                        "[AddressBook/Rpc] endpoint #{} {} unavailable after {}ms: {}",
                        idx,
                        url,
                        started_at.elapsed().as_millis(),
                        err
                    );
                    last_error = err;
                }
            }
        }
        Err(AddressBookError::NoEndpointAvailable {
            attempted: self.candidates.len(),
            last_error,
        })
    }
}

fn probe_chain_id(url: &str, timeout: Duration) -> Result<u64, String> {
    let chain_id = rpc_string(url, "eth_chainId", json!([]), timeout)?;
    parse_hex_u64(&chain_id)
}
