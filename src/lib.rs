//! Address book for the Heaven chat client.
//!
//! Keeps a per-wallet `address -> name` book in sync across the local cache,
//! the address book mirrored on the owner's on-chain profile, and the
//! profile's followers record.

pub mod config;
pub mod error;
pub mod legacy;
pub mod local_store;
pub mod model;
pub mod reconcile;
pub mod remote;
pub mod service;
pub mod shared;
pub mod signer;

pub use config::AddressBookConfig;
pub use error::AddressBookError;
pub use local_store::{FileStore, LocalStore, MemoryStore};
pub use model::{AddressBookData, AddressBookEntry, Clock, EntrySource};
pub use reconcile::{ReconcileReport, ReconciliationEngine};
pub use remote::{
    EndpointResolver, MemoryProfileStore, ProfileStore, RemoteProfile, RpcProfileStore,
};
pub use service::{AddressBookService, Operation, OperationState};
pub use signer::{SignerKind, SigningCapability};
