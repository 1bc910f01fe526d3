use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressBookError {
    /// Every candidate RPC endpoint failed or timed out.
    NoEndpointAvailable { attempted: usize, last_error: String },
    MalformedRemoteData(String),
    /// The endpoint answered the probe but the profile read itself failed.
    RemoteReadFailure(String),
    PersistenceFailure(String),
    TransactionFailure(String),
    WalletNotConnected,
    NoBackupFound,
    InvalidAddress(String),
}

impl AddressBookError {
    /// Short message suitable for a status line.
    pub fn user_message(&self) -> String {
        match self {
            AddressBookError::NoEndpointAvailable { .. } => {
                "Could not reach the profile network. Try again later.".to_string()
            }
            AddressBookError::MalformedRemoteData(_) => {
                "The on-chain address book could not be read.".to_string()
            }
            AddressBookError::RemoteReadFailure(_) => {
                "The profile network returned an error. Try again later.".to_string()
            }
            AddressBookError::PersistenceFailure(_) => {
                "The address book could not be saved on this device.".to_string()
            }
            AddressBookError::TransactionFailure(msg) => format!("Backup failed: {msg}"),
            AddressBookError::WalletNotConnected => "Connect a wallet first.".to_string(),
            AddressBookError::NoBackupFound => "No address book backup found.".to_string(),
            AddressBookError::InvalidAddress(addr) => format!("Invalid address: {addr}"),
        }
    }
}

impl fmt::Display for AddressBookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressBookError::NoEndpointAvailable {
                attempted,
                last_error,
            } => write!(
                f,
                "no RPC endpoint available ({attempted} tried, last error: {last_error})"
            ),
            AddressBookError::MalformedRemoteData(msg) => write!(f, "malformed remote data: {msg}"),
            AddressBookError::RemoteReadFailure(msg) => write!(f, "remote read failed: {msg}"),
            AddressBookError::PersistenceFailure(msg) => write!(f, "persistence failure: {msg}"),
            AddressBookError::TransactionFailure(msg) => write!(f, "transaction failure: {msg}"),
            AddressBookError::WalletNotConnected => write!(f, "wallet not connected"),
            AddressBookError::NoBackupFound => write!(f, "no remote address book found"),
            AddressBookError::InvalidAddress(addr) => write!(f, "invalid address: {addr}"),
        }
    }
}

impl std::error::Error for AddressBookError {}
