use crate::local_store::LocalStore;
use crate::model::{AddressBookData, AddressBookEntry, EntrySource};
use crate::shared::address::{is_evm_address, normalize_address};

/// Legacy keys of the form `<address>_<conversationId>` name a peer inside one
/// conversation only.
pub const CONVERSATION_SEPARATOR: char = '_';

pub fn is_conversation_scoped(key: &str) -> bool {
    key.contains(CONVERSATION_SEPARATOR)
}

/// Fold global legacy names into the stored address book and return it.
///
/// Only addresses missing from the current record are imported, so repeated
/// runs leave the record unchanged.
pub fn import_legacy(store: &dyn LocalStore, now: i64) -> AddressBookData {
    let mut data = store.load();
    let legacy = store.load_legacy_names();
    if legacy.is_empty() {
        return data;
    }

    let mut imported = 0usize;
    let mut scoped = 0usize;
    for (key, name) in legacy {
        if is_conversation_scoped(&key) {
            scoped += 1;
            continue;
        }
        let address = normalize_address(&key);
        if !is_evm_address(&address) {
            log::debug!("[AddressBook] skipping legacy key that is not an address: {key}");
            continue;
        }
        if data.contains(&address) {
            continue;
        }
        data.upsert(AddressBookEntry::new(&address, &name, now, EntrySource::Local));
        imported += 1;
    }

    if imported > 0 {
        store.save(&data);
        log::info!(
            "[AddressBook] imported {} legacy names (skipped {} conversation-scoped)",
            imported,
            scoped
        );
    }
    data
}
