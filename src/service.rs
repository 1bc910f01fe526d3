//! Caller-facing address book API.
//!
//! Keeps the current record in memory, tracks pending/error state for each
//! operation, and runs network-bound work on the blocking pool so awaiting
//! callers yield instead of stalling their executor. `add`/`remove` calls made
//! while such an operation is in flight are journaled and re-applied when it
//! completes, so its result never overwrites them.

use std::sync::{Arc, Mutex};

use crate::error::AddressBookError;
use crate::local_store::lock;
use crate::model::{AddressBookData, AddressBookEntry, EntrySource};
use crate::reconcile::ReconciliationEngine;
use crate::shared::address::{abbreviate_address, parse_evm_address};
use crate::signer::SigningCapability;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Sync,
    Backup,
    Restore,
    Add,
    Remove,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationState {
    pub pending: bool,
    pub last_error: Option<String>,
}

/// A local mutation made while a sync, backup or restore was in flight.
#[derive(Debug, Clone)]
enum LocalEdit {
    Upsert(AddressBookEntry),
    Remove(String),
}

#[derive(Debug, Default)]
struct ServiceState {
    data: AddressBookData,
    is_backed_up: bool,
    sync: OperationState,
    backup: OperationState,
    restore: OperationState,
    add: OperationState,
    remove: OperationState,
    in_flight: usize,
    edits: Vec<LocalEdit>,
}

impl ServiceState {
    fn op(&mut self, op: Operation) -> &mut OperationState {
        match op {
            Operation::Sync => &mut self.sync,
            Operation::Backup => &mut self.backup,
            Operation::Restore => &mut self.restore,
            Operation::Add => &mut self.add,
            Operation::Remove => &mut self.remove,
        }
    }

    fn record(&mut self, edit: LocalEdit) {
        if self.in_flight > 0 {
            self.edits.push(edit);
        }
    }

    /// Re-apply edits recorded since `since` on top of `data`; `true` if any.
    fn replay_edits(&mut self, since: usize) -> bool {
        let edits = self.edits.get(since..).unwrap_or_default().to_vec();
        for edit in &edits {
            match edit {
                LocalEdit::Upsert(entry) => self.data.upsert(entry.clone()),
                LocalEdit::Remove(address) => {
                    self.data.remove(address);
                }
            }
        }
        !edits.is_empty()
    }
}

#[derive(Clone)]
struct WalletSession {
    owner: String,
    signer: Option<SigningCapability>,
}

pub struct AddressBookService {
    engine: Arc<ReconciliationEngine>,
    session: Mutex<Option<WalletSession>>,
    state: Mutex<ServiceState>,
}

impl AddressBookService {
    pub fn new(engine: ReconciliationEngine) -> Self {
        let data = engine.load_local();
        let state = ServiceState {
            is_backed_up: data.is_empty(),
            data,
            ..ServiceState::default()
        };
        Self {
            engine: Arc::new(engine),
            session: Mutex::new(None),
            state: Mutex::new(state),
        }
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    /// Bind the profile owner and, optionally, the signer used for backups.
    pub fn connect(
        &self,
        owner: &str,
        signer: Option<SigningCapability>,
    ) -> Result<(), AddressBookError> {
        let owner = parse_evm_address(owner)
            .map_err(|_| AddressBookError::InvalidAddress(owner.trim().to_string()))?;
        log::info!(
            "[AddressBook] wallet connected: owner={} signer={:?}",
            abbreviate_address(&owner),
            signer.as_ref().map(SigningCapability::kind)
        );
        *lock(&self.session) = Some(WalletSession { owner, signer });
        Ok(())
    }

    pub fn disconnect(&self) {
        *lock(&self.session) = None;
    }

    pub fn owner(&self) -> Option<String> {
        lock(&self.session).as_ref().map(|s| s.owner.clone())
    }

    pub async fn sync(&self) -> Result<AddressBookData, AddressBookError> {
        let owner = self.session_for(Operation::Sync)?.owner;
        let since = self.begin(Operation::Sync);

        let engine = Arc::clone(&self.engine);
        let (report, backed_up) = smol::unblock(move || {
            let report = engine.reconcile_with_report(&owner);
            let backed_up = match report.unreachable() {
                Some(_) => None,
                None => Some(engine.is_backed_up(&owner)),
            };
            (report, backed_up)
        })
        .await;

        let mut state = lock(&self.state);
        state.data = report.data.clone();
        let edited = self.reapply_edits(&mut state, since);
        if let Some(backed_up) = backed_up {
            state.is_backed_up = backed_up && !edited;
        }
        if let Some(err) = report.unreachable() {
            let err = err.clone();
            Self::complete(&mut state, Operation::Sync, Some(&err));
            return Err(err);
        }
        Self::complete(&mut state, Operation::Sync, None);
        Ok(state.data.clone())
    }

    /// `false` on any failure; the reason is kept in [`Self::backup_error`].
    pub async fn backup(&self) -> bool {
        let session = match self.session_for(Operation::Backup) {
            Ok(session) => session,
            Err(_) => return false,
        };
        let Some(signer) = session.signer else {
            let mut state = lock(&self.state);
            Self::finish(
                &mut state,
                Operation::Backup,
                Some(&AddressBookError::WalletNotConnected),
            );
            return false;
        };
        let since = self.begin(Operation::Backup);

        let engine = Arc::clone(&self.engine);
        let data = lock(&self.state).data.clone();
        let owner = session.owner;
        let result = smol::unblock(move || engine.publish(&owner, &data, &signer)).await;

        let mut state = lock(&self.state);
        match result {
            Ok(published) => {
                let edited = state.edits.len() > since
                    || state.data.content_digest() != published.content_digest();
                state.data.touch(published.last_synced);
                self.engine.store().save(&state.data);
                if edited {
                    log::info!(
                        "[AddressBook] address book changed during backup; still not backed up"
                    );
                }
                state.is_backed_up = !edited;
                Self::complete(&mut state, Operation::Backup, None);
                true
            }
            Err(err) => {
                Self::complete(&mut state, Operation::Backup, Some(&err));
                false
            }
        }
    }

    /// Replace the local record with the remote one.
    pub async fn restore(&self) -> Result<AddressBookData, AddressBookError> {
        let owner = self.session_for(Operation::Restore)?.owner;
        let since = self.begin(Operation::Restore);

        let engine = Arc::clone(&self.engine);
        let result = smol::unblock(move || engine.restore(&owner)).await;

        let mut state = lock(&self.state);
        match result {
            Ok(data) => {
                state.data = data;
                let edited = self.reapply_edits(&mut state, since);
                state.is_backed_up = !edited;
                Self::complete(&mut state, Operation::Restore, None);
                Ok(state.data.clone())
            }
            Err(err) => {
                Self::complete(&mut state, Operation::Restore, Some(&err));
                Err(err)
            }
        }
    }

    /// Re-evaluate the backup verdict against the remote copy.
    pub async fn refresh_backup_status(&self) -> bool {
        let Some(owner) = self.owner() else {
            return self.is_backed_up();
        };
        let engine = Arc::clone(&self.engine);
        let backed_up = smol::unblock(move || engine.is_backed_up(&owner)).await;
        lock(&self.state).is_backed_up = backed_up;
        backed_up
    }

    /// Write-through insert or rename; invalidates the backup verdict.
    pub fn add(&self, address: &str, name: &str) -> Result<AddressBookEntry, AddressBookError> {
        let mut state = lock(&self.state);
        let address = match parse_evm_address(address) {
            Ok(address) => address,
            Err(_) => {
                let err = AddressBookError::InvalidAddress(address.trim().to_string());
                Self::finish(&mut state, Operation::Add, Some(&err));
                return Err(err);
            }
        };
        let now = self.engine.now();
        let entry = AddressBookEntry::new(&address, name, now, EntrySource::Local);
        state.data.upsert(entry.clone());
        state.record(LocalEdit::Upsert(entry.clone()));
        state.data.touch(now);
        self.engine.store().save(&state.data);
        state.is_backed_up = false;
        Self::finish(&mut state, Operation::Add, None);
        Ok(entry)
    }

    /// Write-through delete; `false` when the address was not present.
    pub fn remove(&self, address: &str) -> bool {
        let mut state = lock(&self.state);
        if state.data.remove(address).is_none() {
            Self::finish(&mut state, Operation::Remove, None);
            return false;
        }
        state.record(LocalEdit::Remove(address.to_string()));
        let now = self.engine.now();
        state.data.touch(now);
        self.engine.store().save(&state.data);
        state.is_backed_up = false;
        Self::finish(&mut state, Operation::Remove, None);
        true
    }

    pub fn get(&self, address: &str) -> Option<AddressBookEntry> {
        lock(&self.state).data.get(address).cloned()
    }

    /// Entries sorted by name, then address.
    pub fn entries(&self) -> Vec<AddressBookEntry> {
        lock(&self.state).data.sorted_entries()
    }

    pub fn data(&self) -> AddressBookData {
        lock(&self.state).data.clone()
    }

    pub fn is_backed_up(&self) -> bool {
        lock(&self.state).is_backed_up
    }

    pub fn is_syncing(&self) -> bool {
        lock(&self.state).sync.pending
    }

    pub fn is_backing_up(&self) -> bool {
        lock(&self.state).backup.pending
    }

    pub fn is_restoring(&self) -> bool {
        lock(&self.state).restore.pending
    }

    pub fn operation(&self, op: Operation) -> OperationState {
        lock(&self.state).op(op).clone()
    }

    pub fn sync_error(&self) -> Option<String> {
        self.operation(Operation::Sync).last_error
    }

    pub fn backup_error(&self) -> Option<String> {
        self.operation(Operation::Backup).last_error
    }

    pub fn restore_error(&self) -> Option<String> {
        self.operation(Operation::Restore).last_error
    }

    pub fn add_error(&self) -> Option<String> {
        self.operation(Operation::Add).last_error
    }

    pub fn remove_error(&self) -> Option<String> {
        self.operation(Operation::Remove).last_error
    }

    fn session_for(&self, op: Operation) -> Result<WalletSession, AddressBookError> {
        match lock(&self.session).clone() {
            Some(session) => Ok(session),
            None => {
                let err = AddressBookError::WalletNotConnected;
                Self::finish(&mut lock(&self.state), op, Some(&err));
                Err(err)
            }
        }
    }

    /// Mark `op` pending; returns the journal position edits are counted from.
    fn begin(&self, op: Operation) -> usize {
        let mut state = lock(&self.state);
        state.in_flight += 1;
        let slot = state.op(op);
        slot.pending = true;
        slot.last_error = None;
        state.edits.len()
    }

    /// Put back local edits made while the operation ran, and persist them.
    fn reapply_edits(&self, state: &mut ServiceState, since: usize) -> bool {
        if !state.replay_edits(since) {
            return false;
        }
        state.data.touch(self.engine.now());
        self.engine.store().save(&state.data);
        log::info!(
            "[AddressBook] re-applied {} local edit(s) made during the operation",
            state.edits.len() - since
        );
        true
    }

    fn complete(state: &mut ServiceState, op: Operation, err: Option<&AddressBookError>) {
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            state.edits.clear();
        }
        Self::finish(state, op, err);
    }

    fn finish(state: &mut ServiceState, op: Operation, err: Option<&AddressBookError>) {
        let slot = state.op(op);
        slot.pending = false;
        slot.last_error = err.map(|err| {
            log::warn!("[AddressBook] {:?} failed: {}", op, err);
            err.user_message()
        });
    }
}
