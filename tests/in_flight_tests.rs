use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use alloy_primitives::B256;
use heaven_address_book::remote::address_book_key;
use heaven_address_book::{
    AddressBookData, AddressBookEntry, AddressBookError, AddressBookService, EntrySource,
    LocalStore, MemoryProfileStore, MemoryStore, ProfileStore, ReconciliationEngine,
    RemoteProfile, SigningCapability,
};

const OWNER: &str = "0x0000000000000000000000000000000000000a11";
const ADDR: &str = "0xabc0000000000000000000000000000000000001";
const OTHER: &str = "0xdef0000000000000000000000000000000000002";
const THIRD: &str = "0x3330000000000000000000000000000000000003";
const NOW: i64 = 1_700_000_000_000;

#[derive(Default)]
struct GateState {
    open: bool,
    waiting: usize,
}

/// Holds every profile call until the test opens it.
#[derive(Default)]
struct Gate {
    state: Mutex<GateState>,
    cv: Condvar,
}

impl Gate {
    fn pass(&self) {
        let mut state = self.state.lock().expect("gate lock");
        state.waiting += 1;
        self.cv.notify_all();
        while !state.open {
            state = self.cv.wait(state).expect("gate wait");
        }
        state.waiting -= 1;
    }

    fn wait_for_caller(&self) {
        let state = self.state.lock().expect("gate lock");
        let (state, timeout) = self
            .cv
            .wait_timeout_while(state, Duration::from_secs(5), |s| s.waiting == 0)
            .expect("gate wait");
        assert!(!timeout.timed_out(), "no profile call reached the gate");
        drop(state);
    }

    fn open(&self) {
        self.state.lock().expect("gate lock").open = true;
        self.cv.notify_all();
    }
}

struct GatedProfileStore {
    inner: Arc<MemoryProfileStore>,
    gate: Arc<Gate>,
}

impl ProfileStore for GatedProfileStore {
    fn get_data(&self, profile: &str, key: B256) -> Result<Vec<u8>, AddressBookError> {
        self.gate.pass();
        self.inner.get_data(profile, key)
    }

    fn set_data(
        &self,
        profile: &str,
        key: B256,
        value: &[u8],
        signer: &SigningCapability,
    ) -> Result<String, AddressBookError> {
        self.gate.pass();
        self.inner.set_data(profile, key, value, signer)
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    profile: Arc<MemoryProfileStore>,
    gate: Arc<Gate>,
    service: AddressBookService,
}

fn fixture(store: MemoryStore) -> Fixture {
    let store = Arc::new(store);
    let profile = Arc::new(MemoryProfileStore::new());
    let gate = Arc::new(Gate::default());
    let gated = GatedProfileStore {
        inner: profile.clone(),
        gate: gate.clone(),
    };
    let clock = Arc::new(AtomicI64::new(NOW));
    let engine = ReconciliationEngine::new(store.clone(), RemoteProfile::new(Arc::new(gated)))
        .with_clock(Arc::new(move || clock.load(Ordering::SeqCst)));
    let service = AddressBookService::new(engine);
    service
        .connect(OWNER, Some(SigningCapability::ephemeral()))
        .expect("connect");
    Fixture {
        store,
        profile,
        gate,
        service,
    }
}

fn one_entry() -> MemoryStore {
    let mut data = AddressBookData::default();
    data.upsert(AddressBookEntry::new(ADDR, "Alice", 10, EntrySource::Local));
    MemoryStore::with_data(data)
}

fn published(profile: &MemoryProfileStore) -> AddressBookData {
    let raw = profile
        .value(OWNER, address_book_key())
        .expect("address book published");
    AddressBookData::from_json(std::str::from_utf8(&raw).expect("utf-8")).expect("decode")
}

#[test]
fn edit_during_backup_is_kept_and_leaves_book_unbacked() {
    let f = fixture(one_entry());

    let ok = std::thread::scope(|s| {
        let backup = s.spawn(|| smol::block_on(f.service.backup()));
        f.gate.wait_for_caller();
        assert!(f.service.is_backing_up());

        f.service.add(OTHER, "Bob").expect("add");

        f.gate.open();
        backup.join().expect("backup thread")
    });

    assert!(ok);
    assert!(!f.service.is_backing_up());
    assert!(!f.service.is_backed_up());
    assert!(!published(&f.profile).contains(OTHER));

    let stored = f.store.load();
    assert!(stored.contains(ADDR));
    assert_eq!(stored.get(OTHER).map(|e| e.name.as_str()), Some("Bob"));
    assert_eq!(stored, f.service.data());
}

#[test]
fn backup_without_concurrent_edits_is_backed_up() {
    let f = fixture(one_entry());
    f.gate.open();

    assert!(smol::block_on(f.service.backup()));

    assert!(f.service.is_backed_up());
    assert_eq!(
        published(&f.profile).content_digest(),
        f.service.data().content_digest()
    );
    assert_eq!(f.store.load(), f.service.data());
}

#[test]
fn edits_during_sync_survive_the_merge() {
    let f = fixture(one_entry());

    let result = std::thread::scope(|s| {
        let sync = s.spawn(|| smol::block_on(f.service.sync()));
        f.gate.wait_for_caller();
        assert!(f.service.is_syncing());

        assert!(f.service.remove(ADDR));
        f.service.add(OTHER, "Bob").expect("add");

        f.gate.open();
        sync.join().expect("sync thread")
    });

    let data = result.expect("sync");
    assert!(!f.service.is_syncing());
    assert!(!data.contains(ADDR));
    assert!(data.contains(OTHER));
    assert!(!f.service.is_backed_up());
    assert_eq!(f.store.load(), f.service.data());
    assert_eq!(f.service.data(), data);
}

#[test]
fn edits_during_restore_are_reapplied_on_top() {
    let f = fixture(one_entry());
    let mut remote = AddressBookData::default();
    remote.upsert(AddressBookEntry::new(OTHER, "Remote", 5, EntrySource::Local));
    remote.touch(NOW - 1_000);
    f.profile
        .put(OWNER, address_book_key(), remote.to_json().expect("encode"));

    let result = std::thread::scope(|s| {
        let restore = s.spawn(|| smol::block_on(f.service.restore()));
        f.gate.wait_for_caller();
        assert!(f.service.is_restoring());

        f.service.add(THIRD, "Carol").expect("add");

        f.gate.open();
        restore.join().expect("restore thread")
    });

    let data = result.expect("restore");
    assert!(!f.service.is_restoring());
    assert!(!data.contains(ADDR));
    assert!(data.contains(OTHER));
    assert_eq!(data.get(THIRD).map(|e| e.name.as_str()), Some("Carol"));
    assert!(!f.service.is_backed_up());
    assert_eq!(f.store.load(), data);
}

#[test]
fn legacy_names_are_visible_before_first_sync() {
    let store = MemoryStore::new();
    store.set_legacy_names([
        (ADDR.to_string(), "Legacy".to_string()),
        (format!("{OTHER}_conv1"), "Scoped".to_string()),
    ]);
    let f = fixture(store);

    assert_eq!(
        f.service.get(ADDR).map(|e| e.name),
        Some("Legacy".to_string())
    );
    assert!(f.service.get(OTHER).is_none());
    assert!(!f.service.is_backed_up());
    assert!(f.store.load().contains(ADDR));
}
