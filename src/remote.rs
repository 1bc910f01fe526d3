//! Reader/writer for the address book mirrored on the owner's profile.
//!
//! Reads degrade to "nothing found" when the stored value is missing or
//! malformed; only an unreachable network is reported as an error.

use std::sync::Arc;

use alloy_primitives::{keccak256, B256};
use serde_json::Value;

mod connection;
mod profile_store;

pub use connection::{EndpointResolver, RpcConnection, DEFAULT_PROFILE_RPC_URLS, PROBE_TIMEOUT_MS};
pub use profile_store::{MemoryProfileStore, ProfileStore, RpcProfileStore};

use crate::error::AddressBookError;
use crate::model::AddressBookData;
use crate::shared::address::{abbreviate_address, normalize_address};
use crate::signer::SigningCapability;

pub const ADDRESS_BOOK_KEY_NAME: &str = "AddressBook";
pub const FOLLOWERS_KEY_NAME: &str = "Followers";

pub fn address_book_key() -> B256 {
    keccak256(ADDRESS_BOOK_KEY_NAME.as_bytes())
}

pub fn followers_key() -> B256 {
    keccak256(FOLLOWERS_KEY_NAME.as_bytes())
}

#[derive(Clone)]
pub struct RemoteProfile {
    store: Arc<dyn ProfileStore>,
}

impl RemoteProfile {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    pub fn over_rpc(resolver: EndpointResolver) -> Self {
        Self::new(Arc::new(RpcProfileStore::new(resolver)))
    }

    /// `Ok(None)` when the field is unset.
    pub fn read_profile_field(
        &self,
        owner: &str,
        key: B256,
    ) -> Result<Option<Vec<u8>>, AddressBookError> {
        let owner = normalize_address(owner);
        let value = self.store.get_data(&owner, key)?;
        if value.is_empty() {
            return Ok(None);
        }
        Ok(Some(value))
    }

    pub fn get_address_book(
        &self,
        owner: &str,
    ) -> Result<Option<AddressBookData>, AddressBookError> {
        let raw = match self.read_profile_field(owner, address_book_key()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(None),
            Err(AddressBookError::MalformedRemoteData(msg)) => {
                log::warn!("[AddressBook/Remote] address book field unreadable: {msg}");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        match decode_address_book(&raw) {
            Ok(data) => Ok(Some(data)),
            Err(err) => {
                log::warn!(
                    "[AddressBook/Remote] treating remote address book as absent for owner={}: {}",
                    abbreviate_address(owner),
                    err
                );
                Ok(None)
            }
        }
    }

    /// Lower-cased follower addresses; any failure reads as no followers.
    pub fn get_followers(&self, owner: &str) -> Vec<String> {
        match self.try_get_followers(owner) {
            Ok(followers) => followers,
            Err(err) => {
                log::warn!(
                    "[AddressBook/Remote] followers unavailable for owner={}: {}",
                    abbreviate_address(owner),
                    err
                );
                Vec::new()
            }
        }
    }

    pub fn try_get_followers(&self, owner: &str) -> Result<Vec<String>, AddressBookError> {
        let Some(raw) = self.read_profile_field(owner, followers_key())? else {
            return Ok(Vec::new());
        };
        Ok(decode_followers(&raw))
    }

    /// Publish `data`; `false` on any failure.
    pub fn set_address_book(
        &self,
        owner: &str,
        data: &AddressBookData,
        signer: &SigningCapability,
    ) -> bool {
        match self.submit_address_book(owner, data, signer) {
            Ok(_) => true,
            Err(err) => {
                log::warn!("[AddressBook/Remote] backup failed: {err}");
                false
            }
        }
    }

    /// Same as [`Self::set_address_book`] but keeps the failure reason.
    pub fn submit_address_book(
        &self,
        owner: &str,
        data: &AddressBookData,
        signer: &SigningCapability,
    ) -> Result<String, AddressBookError> {
        let owner = normalize_address(owner);
        let json = data.to_json().map_err(AddressBookError::TransactionFailure)?;
        let tx_hash = self
            .store
            .set_data(&owner, address_book_key(), json.as_bytes(), signer)?;
        log::info!(
            "[AddressBook/Remote] backup confirmed: owner={} entries={} digest={} txHash={}",
            abbreviate_address(&owner),
            data.len(),
            &data.content_digest()[..12],
            tx_hash
        );
        Ok(tx_hash)
    }
}

fn decode_address_book(raw: &[u8]) -> Result<AddressBookData, AddressBookError> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| AddressBookError::MalformedRemoteData(format!("not UTF-8: {e}")))?;
    AddressBookData::from_json(text).map_err(AddressBookError::MalformedRemoteData)
}

fn decode_followers(raw: &[u8]) -> Vec<String> {
    let Ok(text) = std::str::from_utf8(raw) else {
        log::warn!("[AddressBook/Remote] followers record is not UTF-8");
        return Vec::new();
    };
    let parsed = match serde_json::from_str::<Value>(text) {
        Ok(parsed) => parsed,
        Err(err) => {
            log::warn!("[AddressBook/Remote] followers record is not JSON: {err}");
            return Vec::new();
        }
    };
    let Some(items) = parsed.get("followers").and_then(Value::as_array) else {
        log::warn!("[AddressBook/Remote] followers record has no followers array");
        return Vec::new();
    };
    let mut followers = Vec::with_capacity(items.len());
    for item in items {
        let Some(addr) = item.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        let addr = normalize_address(addr);
        if !followers.contains(&addr) {
            followers.push(addr);
        }
    }
    followers
}
