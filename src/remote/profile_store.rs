use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use alloy_primitives::{Bytes, B256};
use alloy_sol_types::{sol, SolCall, SolValue};
use serde_json::json;

use super::connection::EndpointResolver;
use crate::error::AddressBookError;
use crate::local_store::lock;
use crate::shared::address::normalize_address;
use crate::shared::config::u64_env;
use crate::shared::rpc::{eth_call, rpc_call, RPC_TIMEOUT_SECS};
use crate::signer::SigningCapability;

const DEFAULT_RECEIPT_POLL_TIMEOUT_SECS: u64 = 45;
const RECEIPT_POLL_INTERVAL_MS: u64 = 1_250;

sol! {
    function getData(bytes32 dataKey) view returns (bytes dataValue);
    function setData(bytes32 dataKey, bytes dataValue);
}

/// Key-value record attached to a profile address.
pub trait ProfileStore: Send + Sync {
    /// Raw value under `key`; an unset key reads as empty bytes.
    fn get_data(&self, profile: &str, key: B256) -> Result<Vec<u8>, AddressBookError>;

    /// Write `value` under `key` and wait for confirmation; returns the tx hash.
    fn set_data(
        &self,
        profile: &str,
        key: B256,
        value: &[u8],
        signer: &SigningCapability,
    ) -> Result<String, AddressBookError>;
}

/// ERC725Y `getData`/`setData` over JSON-RPC.
pub struct RpcProfileStore {
    resolver: EndpointResolver,
    call_timeout: Duration,
    receipt_timeout: Duration,
}

impl RpcProfileStore {
    pub fn new(resolver: EndpointResolver) -> Self {
        Self {
            resolver,
            call_timeout: Duration::from_secs(RPC_TIMEOUT_SECS),
            receipt_timeout: Duration::from_secs(receipt_poll_timeout_secs()),
        }
    }

    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    pub fn resolver(&self) -> &EndpointResolver {
        &self.resolver
    }
}

impl ProfileStore for RpcProfileStore {
    fn get_data(&self, profile: &str, key: B256) -> Result<Vec<u8>, AddressBookError> {
        let conn = self.resolver.resolve()?;
        let calldata = getDataCall { dataKey: key }.abi_encode();
        let output = eth_call(&conn.url, profile, &calldata, self.call_timeout)
            .map_err(AddressBookError::RemoteReadFailure)?;
        if output.is_empty() {
            // Not a contract (or no code yet): nothing stored.
            return Ok(Vec::new());
        }
        let value = Bytes::abi_decode(&output).map_err(|e| {
            AddressBookError::MalformedRemoteData(format!("getData decode failed: {e}"))
        })?;
        Ok(value.to_vec())
    }

    fn set_data(
        &self,
        profile: &str,
        key: B256,
        value: &[u8],
        signer: &SigningCapability,
    ) -> Result<String, AddressBookError> {
        let conn = self.resolver.resolve()?;
        let calldata = setDataCall {
            dataKey: key,
            dataValue: Bytes::copy_from_slice(value),
        }
        .abi_encode();

        let tx_hash = signer
            .send_call(&conn.url, conn.chain_id, profile, &calldata, self.call_timeout)
            .map_err(AddressBookError::TransactionFailure)?;
        log::info!(
            "[AddressBook/Remote] setData submitted: profile={} txHash={} signer={:?} bytes={}",
            profile,
            tx_hash,
            signer.kind(),
            value.len()
        );

        await_receipt(&conn.url, &tx_hash, self.call_timeout, self.receipt_timeout)?;
        Ok(tx_hash)
    }
}

fn receipt_poll_timeout_secs() -> u64 {
    u64_env("HEAVEN_ADDRESS_BOOK_RECEIPT_TIMEOUT_SECS").unwrap_or(DEFAULT_RECEIPT_POLL_TIMEOUT_SECS)
}

fn await_receipt(
    rpc_url: &str,
    tx_hash: &str,
    call_timeout: Duration,
    receipt_timeout: Duration,
) -> Result<(), AddressBookError> {
    let started_at = Instant::now();
    let mut logged_retry_error = false;
    loop {
        match rpc_call(
            rpc_url,
            "eth_getTransactionReceipt",
            json!([tx_hash]),
            call_timeout,
        ) {
            Ok(receipt) if !receipt.is_null() => {
                let status = receipt
                    .get("status")
                    .and_then(|v| v.as_str())
                    .unwrap_or("-");
                let block_number = receipt
                    .get("blockNumber")
                    .and_then(|v| v.as_str())
                    .unwrap_or("-");
                if status.eq_ignore_ascii_case("0x0") {
                    return Err(AddressBookError::TransactionFailure(format!(
                        "transaction {tx_hash} reverted in block {block_number}"
                    )));
                }
                log::info!(
                    "[AddressBook/Remote] receipt confirmed: txHash={} status={} block={} \
                     elapsedMs={}",
                    tx_hash,
                    status,
                    block_number,
                    started_at.elapsed().as_millis()
                );
                return Ok(());
            }
            Ok(_) => {}
            Err(err) => {
                if !logged_retry_error {
                    log::warn!(
                        "[AddressBook/Remote] receipt poll transient error: txHash={} err={}",
                        tx_hash,
                        err
                    );
                    logged_retry_error = true;
                }
            }
        }
        if started_at.elapsed() >= receipt_timeout {
            return Err(AddressBookError::TransactionFailure(format!(
                "no receipt for {tx_hash} after {}s",
                receipt_timeout.as_secs()
            )));
        }
        std::thread::sleep(Duration::from_millis(RECEIPT_POLL_INTERVAL_MS));
    }
}

/// In-memory profile store for tests and offline runs.
#[derive(Default)]
pub struct MemoryProfileStore {
    records: Mutex<HashMap<(String, B256), Vec<u8>>>,
    unreachable: Mutex<bool>,
    reject_writes: Mutex<bool>,
    writes: Mutex<usize>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, profile: &str, key: B256, value: impl Into<Vec<u8>>) {
        lock(&self.records).insert((normalize_address(profile), key), value.into());
    }

    pub fn value(&self, profile: &str, key: B256) -> Option<Vec<u8>> {
        lock(&self.records)
            .get(&(normalize_address(profile), key))
            .cloned()
    }

    /// Simulate every endpoint being down.
    pub fn set_unreachable(&self, unreachable: bool) {
        *lock(&self.unreachable) = unreachable;
    }

    /// Simulate reverted transactions.
    pub fn set_reject_writes(&self, reject: bool) {
        *lock(&self.reject_writes) = reject;
    }

    pub fn write_count(&self) -> usize {
        *lock(&self.writes)
    }

    fn check_reachable(&self) -> Result<(), AddressBookError> {
        if *lock(&self.unreachable) {
            return Err(AddressBookError::NoEndpointAvailable {
                attempted: 1,
                last_error: "memory profile store marked unreachable".to_string(),
            });
        }
        Ok(())
    }
}

impl ProfileStore for MemoryProfileStore {
    fn get_data(&self, profile: &str, key: B256) -> Result<Vec<u8>, AddressBookError> {
        self.check_reachable()?;
        Ok(self.value(profile, key).unwrap_or_default())
    }

    fn set_data(
        &self,
        profile: &str,
        key: B256,
        value: &[u8],
        _signer: &SigningCapability,
    ) -> Result<String, AddressBookError> {
        self.check_reachable()?;
        if *lock(&self.reject_writes) {
            return Err(AddressBookError::TransactionFailure(
                "transaction reverted".to_string(),
            ));
        }
        self.put(profile, key, value.to_vec());
        let mut writes = lock(&self.writes);
        *writes += 1;
        Ok(format!("0x{:064x}", *writes))
    }
}
