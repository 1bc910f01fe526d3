//! On-device persistence for the address book.
//!
//! Reads fail soft to the empty record and writes are best effort: a broken
//! data directory must never interrupt the caller.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::AddressBookError;
use crate::model::AddressBookData;
use crate::shared::address::{abbreviate_address, parse_evm_address};
use crate::shared::config::non_empty_env;

const APP_DIR: &str = "heaven-address-book";
const ADDRESS_BOOK_PREFIX: &str = "address-book";
const LEGACY_NAMES_PREFIX: &str = "custom-names";

pub trait LocalStore: Send + Sync {
    /// Missing or malformed data yields the empty record.
    fn load(&self) -> AddressBookData;

    /// Failures are logged, never returned.
    fn save(&self, data: &AddressBookData);

    /// Legacy `key -> name` table; keys may carry a `_<conversation>` suffix.
    fn load_legacy_names(&self) -> BTreeMap<String, String>;
}

pub fn app_data_dir() -> PathBuf {
    if let Some(dir) = non_empty_env("HEAVEN_ADDRESS_BOOK_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// JSON files under the app data directory, one pair per owner wallet.
pub struct FileStore {
    owner: String,
    address_book_path: PathBuf,
    legacy_path: PathBuf,
}

impl FileStore {
    pub fn for_owner(owner_address: &str) -> Result<Self, AddressBookError> {
        Self::in_dir(&app_data_dir(), owner_address)
    }

    pub fn in_dir(dir: &Path, owner_address: &str) -> Result<Self, AddressBookError> {
        let owner = parse_evm_address(owner_address)
            .map_err(|_| AddressBookError::InvalidAddress(owner_address.trim().to_string()))?;
        Ok(Self {
            address_book_path: dir.join(format!("{ADDRESS_BOOK_PREFIX}-{owner}.json")),
            legacy_path: dir.join(format!("{LEGACY_NAMES_PREFIX}-{owner}.json")),
            owner,
        })
    }

    pub fn path(&self) -> &Path {
        &self.address_book_path
    }

    pub fn legacy_path(&self) -> &Path {
        &self.legacy_path
    }

    fn write(&self, data: &AddressBookData) -> Result<(), String> {
        if let Some(parent) = self.address_book_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                format!("failed creating address book dir ({}): {e}", parent.display())
            })?;
        }
        let json = serde_json::to_string_pretty(data)
            .map_err(|e| format!("failed encoding address book: {e}"))?;
        std::fs::write(&self.address_book_path, json).map_err(|e| {
            format!(
                "failed writing address book ({}): {e}",
                self.address_book_path.display()
            )
        })
    }
}

impl LocalStore for FileStore {
    fn load(&self) -> AddressBookData {
        let Ok(text) = std::fs::read_to_string(&self.address_book_path) else {
            log::info!(
                "[AddressBook] no local record for owner={} path={}",
                abbreviate_address(&self.owner),
                self.address_book_path.display()
            );
            return AddressBookData::default();
        };
        match AddressBookData::from_json(&text) {
            Ok(data) => {
                log::debug!(
                    "[AddressBook] loaded local record owner={} entries={} lastSynced={}",
                    abbreviate_address(&self.owner),
                    data.len(),
                    data.last_synced
                );
                data
            }
            Err(err) => {
                log::warn!(
                    "[AddressBook] ignoring malformed local record at {}: {}",
                    self.address_book_path.display(),
                    err
                );
                AddressBookData::default()
            }
        }
    }

    fn save(&self, data: &AddressBookData) {
        match self.write(data) {
            Ok(()) => log::debug!(
                "[AddressBook] persisted owner={} entries={} path={}",
                abbreviate_address(&self.owner),
                data.len(),
                self.address_book_path.display()
            ),
            Err(err) => log::warn!("[AddressBook] {}", AddressBookError::PersistenceFailure(err)),
        }
    }

    fn load_legacy_names(&self) -> BTreeMap<String, String> {
        let Ok(text) = std::fs::read_to_string(&self.legacy_path) else {
            return BTreeMap::new();
        };
        match serde_json::from_str::<BTreeMap<String, String>>(&text) {
            Ok(names) => names,
            Err(err) => {
                log::warn!(
                    "[AddressBook] ignoring malformed legacy names at {}: {}",
                    self.legacy_path.display(),
                    err
                );
                BTreeMap::new()
            }
        }
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<Option<AddressBookData>>,
    legacy: Mutex<BTreeMap<String, String>>,
    fail_writes: Mutex<bool>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: AddressBookData) -> Self {
        let store = Self::default();
        *lock(&store.data) = Some(data);
        store
    }

    pub fn set_legacy_names<I, K, V>(&self, names: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        *lock(&self.legacy) = names
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
    }

    /// Make subsequent saves fail (and be dropped).
    pub fn set_fail_writes(&self, fail: bool) {
        *lock(&self.fail_writes) = fail;
    }

    pub fn save_count(&self) -> usize {
        *lock(&self.saves)
    }

    pub fn snapshot(&self) -> Option<AddressBookData> {
        lock(&self.data).clone()
    }
}

impl LocalStore for MemoryStore {
    fn load(&self) -> AddressBookData {
        lock(&self.data).clone().unwrap_or_default()
    }

    fn save(&self, data: &AddressBookData) {
        if *lock(&self.fail_writes) {
            log::warn!(
                "[AddressBook] {}",
                AddressBookError::PersistenceFailure("memory store rejects writes".to_string())
            );
            return;
        }
        *lock(&self.data) = Some(data.clone());
        *lock(&self.saves) += 1;
    }

    fn load_legacy_names(&self) -> BTreeMap<String, String> {
        lock(&self.legacy).clone()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
