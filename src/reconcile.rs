//! Merges the local address book with the profile mirror and the followers
//! record, and judges whether the mirror is a usable backup.
//!
//! Precedence: local baseline, then strictly newer remote entries, then
//! followers for addresses nobody has named yet. A source that cannot be
//! reached contributes nothing; reconciliation itself never fails.

use std::sync::Arc;

use crate::error::AddressBookError;
use crate::legacy::import_legacy;
use crate::local_store::LocalStore;
use crate::model::{system_clock, AddressBookData, AddressBookEntry, Clock, EntrySource};
use crate::remote::RemoteProfile;
use crate::shared::address::{abbreviate_address, hex_prefix, is_evm_address};
use crate::signer::SigningCapability;

pub const BACKUP_STALENESS_MS: i64 = 24 * 60 * 60 * 1000;
pub const FOLLOWER_NAME_PREFIX: &str = "Follower-";
const FOLLOWER_NAME_HEX_CHARS: usize = 6;

#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub data: AddressBookData,
    pub adopted_remote: usize,
    pub added_followers: usize,
    pub remote_error: Option<AddressBookError>,
    pub followers_error: Option<AddressBookError>,
}

impl ReconcileReport {
    /// The network error to surface, if every endpoint was down.
    pub fn unreachable(&self) -> Option<&AddressBookError> {
        [self.remote_error.as_ref(), self.followers_error.as_ref()]
            .into_iter()
            .flatten()
            .find(|err| matches!(err, AddressBookError::NoEndpointAvailable { .. }))
    }
}

pub fn follower_name(address: &str) -> String {
    format!(
        "{FOLLOWER_NAME_PREFIX}{}",
        hex_prefix(address, FOLLOWER_NAME_HEX_CHARS)
    )
}

/// Adopt remote entries that are unknown locally or strictly newer.
/// Ties keep the local entry.
pub fn merge_remote(local: &mut AddressBookData, remote: &AddressBookData) -> usize {
    let mut adopted = 0;
    for (key, remote_entry) in &remote.entries {
        let newer = match local.entries.get(key) {
            None => true,
            Some(existing) => remote_entry.timestamp > existing.timestamp,
        };
        if newer {
            local.upsert(AddressBookEntry {
                source: EntrySource::UpMetadata,
                ..remote_entry.clone()
            });
            adopted += 1;
        }
    }
    adopted
}

/// Name followers nobody has named yet; existing entries are never touched.
pub fn merge_followers(local: &mut AddressBookData, followers: &[String], now: i64) -> usize {
    let mut added = 0;
    for follower in followers {
        if !is_evm_address(follower) {
            log::debug!("[AddressBook] skipping follower that is not an address: {follower}");
            continue;
        }
        if local.contains(follower) {
            continue;
        }
        local.upsert(AddressBookEntry::new(
            follower,
            &follower_name(follower),
            now,
            EntrySource::UpFollowers,
        ));
        added += 1;
    }
    added
}

/// Heuristic freshness check; compares counts and age, not contents.
pub fn backup_verdict(local: &AddressBookData, remote: Option<&AddressBookData>, now: i64) -> bool {
    if local.is_empty() {
        return true;
    }
    let Some(remote) = remote else {
        return false;
    };
    if remote.len() < local.len() {
        return false;
    }
    now.saturating_sub(remote.last_synced) <= BACKUP_STALENESS_MS
}

pub struct ReconciliationEngine {
    store: Arc<dyn LocalStore>,
    remote: RemoteProfile,
    clock: Clock,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn LocalStore>, remote: RemoteProfile) -> Self {
        Self {
            store,
            remote,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> i64 {
        (self.clock)()
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    pub fn remote(&self) -> &RemoteProfile {
        &self.remote
    }

    /// Stored record with global legacy names folded in.
    pub fn load_local(&self) -> AddressBookData {
        import_legacy(self.store.as_ref(), self.now())
    }

    pub fn reconcile(&self, owner: &str) -> AddressBookData {
        self.reconcile_with_report(owner).data
    }

    pub fn reconcile_with_report(&self, owner: &str) -> ReconcileReport {
        let mut data = import_legacy(self.store.as_ref(), self.now());
        let local_count = data.len();

        let (adopted_remote, remote_error) = match self.remote.get_address_book(owner) {
            Ok(Some(remote)) => (merge_remote(&mut data, &remote), None),
            Ok(None) => (0, None),
            Err(err) => {
                log::warn!(
                    "[AddressBook] remote address book skipped for owner={}: {}",
                    abbreviate_address(owner),
                    err
                );
                (0, Some(err))
            }
        };

        let now = self.now();
        let (added_followers, followers_error) = match self.remote.try_get_followers(owner) {
            Ok(followers) => (merge_followers(&mut data, &followers, now), None),
            Err(err) => {
                log::warn!(
                    "[AddressBook] followers skipped for owner={}: {}",
                    abbreviate_address(owner),
                    err
                );
                (0, Some(err))
            }
        };

        data.touch(now);
        self.store.save(&data);

        log::info!(
            "[AddressBook] reconciled owner={} local={} adoptedRemote={} \
             addedFollowers={} total={}",
            abbreviate_address(owner),
            local_count,
            adopted_remote,
            added_followers,
            data.len()
        );

        ReconcileReport {
            data,
            adopted_remote,
            added_followers,
            remote_error,
            followers_error,
        }
    }

    pub fn is_backed_up(&self, owner: &str) -> bool {
        let local = self.store.load();
        if local.is_empty() {
            return true;
        }
        let remote = match self.remote.get_address_book(owner) {
            Ok(remote) => remote,
            Err(err) => {
                log::warn!("[AddressBook] backup status unknown, treating as not backed up: {err}");
                return false;
            }
        };
        backup_verdict(&local, remote.as_ref(), self.now())
    }

    /// Replace the local record with the remote one, without merging.
    pub fn restore(&self, owner: &str) -> Result<AddressBookData, AddressBookError> {
        let mut data = self
            .remote
            .get_address_book(owner)?
            .ok_or(AddressBookError::NoBackupFound)?;
        data.touch(self.now());
        self.store.save(&data);
        log::info!(
            "[AddressBook] restored owner={} entries={} digest={}",
            abbreviate_address(owner),
            data.len(),
            &data.content_digest()[..12]
        );
        Ok(data)
    }

    /// Stamp a copy of `data` and publish it. Nothing is written locally.
    pub fn publish(
        &self,
        owner: &str,
        data: &AddressBookData,
        signer: &SigningCapability,
    ) -> Result<AddressBookData, AddressBookError> {
        let mut data = data.clone();
        data.touch(self.now());
        self.remote.submit_address_book(owner, &data, signer)?;
        Ok(data)
    }

    /// [`Self::publish`], then persist the stamped copy. A failed submit
    /// leaves the local record untouched.
    pub fn backup(
        &self,
        owner: &str,
        data: &AddressBookData,
        signer: &SigningCapability,
    ) -> Result<AddressBookData, AddressBookError> {
        let published = self.publish(owner, data, signer)?;
        self.store.save(&published);
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "0xaa00000000000000000000000000000000000001";
    const B: &str = "0xbb00000000000000000000000000000000000002";

    fn book(entries: &[(&str, &str, i64)], last_synced: i64) -> AddressBookData {
        let mut data = AddressBookData::default();
        for (addr, name, ts) in entries {
            data.upsert(AddressBookEntry::new(addr, name, *ts, EntrySource::Local));
        }
        data.last_synced = last_synced;
        data
    }

    #[test]
    fn follower_names_use_first_six_hex_chars() {
        assert_eq!(follower_name(A), "Follower-aa0000");
    }

    #[test]
    fn tie_keeps_local() {
        let mut local = book(&[(A, "A", 100)], 0);
        let remote = book(&[(A, "B", 100)], 0);
        assert_eq!(merge_remote(&mut local, &remote), 0);
        assert_eq!(local.get(A).map(|e| e.name.as_str()), Some("A"));
    }

    #[test]
    fn strictly_newer_remote_wins() {
        let mut local = book(&[(A, "A", 100)], 0);
        let remote = book(&[(A, "B", 101)], 0);
        assert_eq!(merge_remote(&mut local, &remote), 1);
        let entry = local.get(A).expect("entry");
        assert_eq!(entry.name, "B");
        assert_eq!(entry.timestamp, 101);
        assert_eq!(entry.source, EntrySource::UpMetadata);
    }

    #[test]
    fn older_remote_never_regresses_timestamp() {
        let mut local = book(&[(A, "A", 200)], 0);
        let remote = book(&[(A, "B", 150)], 0);
        merge_remote(&mut local, &remote);
        assert_eq!(local.get(A).map(|e| e.timestamp), Some(200));
    }

    #[test]
    fn followers_fill_gaps_only() {
        let mut local = book(&[(A, "Alice", 1)], 0);
        let added = merge_followers(
            &mut local,
            &[A.to_string(), B.to_string(), "not-an-address".to_string()],
            500,
        );
        assert_eq!(added, 1);
        assert_eq!(local.get(A).map(|e| e.name.as_str()), Some("Alice"));
        let follower = local.get(B).expect("follower added");
        assert_eq!(follower.name, "Follower-bb0000");
        assert_eq!(follower.timestamp, 500);
        assert_eq!(follower.source, EntrySource::UpFollowers);
    }

    #[test]
    fn empty_local_is_vacuously_backed_up() {
        assert!(backup_verdict(&AddressBookData::default(), None, 0));
    }

    #[test]
    fn verdict_requires_remote_with_enough_entries() {
        let local = book(&[(A, "A", 1), (B, "B", 1)], 0);
        assert!(!backup_verdict(&local, None, 10));
        let smaller = book(&[(A, "A", 1)], 10);
        assert!(!backup_verdict(&local, Some(&smaller), 10));
        let same = book(&[(A, "A", 1), (B, "B", 1)], 10);
        assert!(backup_verdict(&local, Some(&same), 10));
    }

    #[test]
    fn staleness_threshold_is_24_hours() {
        let hour = 60 * 60 * 1000;
        let now = 1_000 * hour;
        let local = book(&[(A, "A", 1)], 0);
        let stale = book(&[(A, "A", 1)], now - 25 * hour);
        let fresh = book(&[(A, "A", 1)], now - 23 * hour);
        assert!(!backup_verdict(&local, Some(&stale), now));
        assert!(backup_verdict(&local, Some(&fresh), now));
    }
}
