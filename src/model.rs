use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::shared::address::normalize_address;

pub const SCHEMA_VERSION: &str = "1.0";
pub const DEFAULT_ENTRY_NAME: &str = "Unnamed";

/// Milliseconds since the unix epoch.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn system_clock() -> Clock {
    Arc::new(now_millis)
}

/// Where an entry's current name came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntrySource {
    #[default]
    Local,
    UpMetadata,
    UpFollowers,
    /// Tags written by other clients are kept as-is.
    #[serde(untagged)]
    Other(String),
}

impl EntrySource {
    pub fn as_str(&self) -> &str {
        match self {
            EntrySource::Local => "local",
            EntrySource::UpMetadata => "up-metadata",
            EntrySource::UpFollowers => "up-followers",
            EntrySource::Other(tag) => tag.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBookEntry {
    pub address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub source: EntrySource,
}

impl AddressBookEntry {
    pub fn new(address: &str, name: &str, timestamp: i64, source: EntrySource) -> Self {
        Self {
            address: normalize_address(address),
            name: coerce_name(name),
            timestamp,
            source,
        }
    }

    pub fn key(&self) -> String {
        normalize_address(&self.address)
    }
}

pub fn coerce_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        DEFAULT_ENTRY_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

fn default_version() -> String {
    SCHEMA_VERSION.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressBookData {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub entries: BTreeMap<String, AddressBookEntry>,
    #[serde(default)]
    pub last_synced: i64,
}

impl Default for AddressBookData {
    fn default() -> Self {
        Self {
            version: default_version(),
            entries: BTreeMap::new(),
            last_synced: 0,
        }
    }
}

impl AddressBookData {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, address: &str) -> Option<&AddressBookEntry> {
        self.entries.get(&normalize_address(address))
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries.contains_key(&normalize_address(address))
    }

    /// Insert or replace, keyed by the entry's normalized address.
    pub fn upsert(&mut self, entry: AddressBookEntry) {
        let key = entry.key();
        let entry = AddressBookEntry {
            address: key.clone(),
            name: coerce_name(&entry.name),
            ..entry
        };
        self.entries.insert(key, entry);
    }

    pub fn remove(&mut self, address: &str) -> Option<AddressBookEntry> {
        self.entries.remove(&normalize_address(address))
    }

    /// Advance `last_synced` to `now`; never moves it backwards.
    pub fn touch(&mut self, now: i64) {
        self.last_synced = self.last_synced.max(now);
    }

    /// Re-key every entry by its lower-cased address and coerce blank names.
    /// When two entries collapse to the same key the newer timestamp wins.
    pub fn normalized(self) -> Self {
        let mut entries: BTreeMap<String, AddressBookEntry> = BTreeMap::new();
        for (key, mut entry) in self.entries {
            let raw_address = if entry.address.trim().is_empty() {
                key.as_str()
            } else {
                entry.address.as_str()
            };
            let address = normalize_address(raw_address);
            entry.address = address.clone();
            entry.name = coerce_name(&entry.name);
            match entries.get(&address) {
                Some(existing) if existing.timestamp >= entry.timestamp => {}
                _ => {
                    entries.insert(address, entry);
                }
            }
        }
        let version = if self.version.trim().is_empty() {
            default_version()
        } else {
            self.version
        };
        Self {
            version,
            entries,
            last_synced: self.last_synced.max(0),
        }
    }

    /// Entries sorted by display name, then address.
    pub fn sorted_entries(&self) -> Vec<AddressBookEntry> {
        let mut out = self.entries.values().cloned().collect::<Vec<_>>();
        out.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.address.cmp(&b.address))
        });
        out
    }

    /// SHA-256 over the canonical entry list, ignoring `last_synced`.
    pub fn content_digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, entry) in &self.entries {
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            hasher.update(entry.name.as_bytes());
            hasher.update([0u8]);
            hasher.update(entry.timestamp.to_be_bytes());
            hasher.update(entry.source.as_str().as_bytes());
            hasher.update([0xffu8]);
        }
        hex::encode(hasher.finalize())
    }

    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|e| format!("Failed to serialize address book: {e}"))
    }

    pub fn from_json(text: &str) -> Result<Self, String> {
        serde_json::from_str::<Self>(text)
            .map(Self::normalized)
            .map_err(|e| format!("Failed to parse address book: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0xAbCdEf0000000000000000000000000000000001";

    #[test]
    fn empty_default_has_version_and_zero_sync() {
        let data = AddressBookData::default();
        assert_eq!(data.version, "1.0");
        assert!(data.is_empty());
        assert_eq!(data.last_synced, 0);
    }

    #[test]
    fn blank_names_become_sentinel() {
        let entry = AddressBookEntry::new(ADDR, "   ", 5, EntrySource::Local);
        assert_eq!(entry.name, DEFAULT_ENTRY_NAME);
        assert_eq!(entry.address, ADDR.to_lowercase());
    }

    #[test]
    fn parse_rekeys_mixed_case_entries() {
        let json = format!(
            r#"{{"version":"1.0","entries":{{"{ADDR}":{{"address":"{ADDR}","name":"","timestamp":10,"source":"up-metadata"}}}},"lastSynced":7}}"#
        );
        let data = AddressBookData::from_json(&json).expect("parse");
        let key = ADDR.to_lowercase();
        let entry = data.entries.get(&key).expect("entry under lower-case key");
        assert_eq!(entry.address, key);
        assert_eq!(entry.name, DEFAULT_ENTRY_NAME);
        assert_eq!(entry.source, EntrySource::UpMetadata);
        assert_eq!(data.last_synced, 7);
    }

    #[test]
    fn unknown_source_tags_survive_a_round_trip() {
        let json = r#"{"entries":{"0x01":{"address":"0x01","name":"x","timestamp":1,"source":"ens"}}}"#;
        let data = AddressBookData::from_json(json).expect("parse");
        let entry = data.get("0x01").expect("entry");
        assert_eq!(entry.source, EntrySource::Other("ens".to_string()));
        let encoded = data.to_json().expect("encode");
        assert!(encoded.contains(r#""source":"ens""#));
        assert!(encoded.contains(r#""lastSynced":0"#));
    }

    #[test]
    fn colliding_keys_keep_newest() {
        let mut data = AddressBookData::default();
        data.entries.insert(
            ADDR.to_string(),
            AddressBookEntry {
                address: ADDR.to_string(),
                name: "old".into(),
                timestamp: 1,
                source: EntrySource::Local,
            },
        );
        data.entries.insert(
            ADDR.to_lowercase(),
            AddressBookEntry {
                address: ADDR.to_lowercase(),
                name: "new".into(),
                timestamp: 2,
                source: EntrySource::Local,
            },
        );
        let data = data.normalized();
        assert_eq!(data.len(), 1);
        assert_eq!(data.get(ADDR).map(|e| e.name.as_str()), Some("new"));
    }

    #[test]
    fn touch_never_moves_backwards() {
        let mut data = AddressBookData::default();
        data.touch(100);
        data.touch(50);
        assert_eq!(data.last_synced, 100);
    }

    #[test]
    fn digest_ignores_last_synced() {
        let mut a = AddressBookData::default();
        a.upsert(AddressBookEntry::new(ADDR, "alice", 1, EntrySource::Local));
        let mut b = a.clone();
        b.touch(999);
        assert_eq!(a.content_digest(), b.content_digest());
        b.upsert(AddressBookEntry::new(ADDR, "bob", 1, EntrySource::Local));
        assert_ne!(a.content_digest(), b.content_digest());
    }
}
