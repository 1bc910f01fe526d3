//! Wallet signing capability, selected once when a wallet connects.
//!
//! - `Standard`: a wallet key held by this process.
//! - `ProfileProvider`: an external provider (node or extension bridge) that
//!   holds the profile controller key and signs on `eth_sendTransaction`.
//! - `Ephemeral`: a throwaway session key generated at connect time.

use std::str::FromStr;
use std::time::Duration;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address as EthersAddress, Bytes as EthersBytes, TransactionRequest};
use serde_json::json;

use crate::shared::address::parse_evm_address;
use crate::shared::rpc::{parse_hex_bytes, parse_hex_u128, parse_hex_u64, rpc_string};

const GAS_LIMIT_BUFFER_NUMERATOR: u64 = 12;
const GAS_LIMIT_BUFFER_DENOMINATOR: u64 = 10;
const GAS_LIMIT_FLOOR: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerKind {
    Standard,
    ProfileProvider,
    Ephemeral,
}

#[derive(Clone)]
pub enum SigningCapability {
    Standard(LocalWallet),
    ProfileProvider { provider_url: String, account: String },
    Ephemeral(LocalWallet),
}

impl std::fmt::Debug for SigningCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCapability")
            .field("kind", &self.kind())
            .field("address", &self.address())
            .finish()
    }
}

impl SigningCapability {
    pub fn from_private_key(private_key_hex: &str) -> Result<Self, String> {
        let clean = private_key_hex.trim().trim_start_matches("0x").trim_start_matches("0X");
        let wallet = LocalWallet::from_str(clean).map_err(|e| format!("Invalid private key: {e}"))?;
        Ok(Self::Standard(wallet))
    }

    pub fn profile_provider(provider_url: &str, account: &str) -> Result<Self, String> {
        let provider_url = provider_url.trim();
        if provider_url.is_empty() {
            return Err("Profile provider URL is empty".to_string());
        }
        Ok(Self::ProfileProvider {
            provider_url: provider_url.to_string(),
            account: parse_evm_address(account)?,
        })
    }

    pub fn ephemeral() -> Self {
        Self::Ephemeral(LocalWallet::new(&mut rand::thread_rng()))
    }

    pub fn kind(&self) -> SignerKind {
        match self {
            SigningCapability::Standard(_) => SignerKind::Standard,
            SigningCapability::ProfileProvider { .. } => SignerKind::ProfileProvider,
            SigningCapability::Ephemeral(_) => SignerKind::Ephemeral,
        }
    }

    /// Lower-cased 0x address of the signing account.
    pub fn address(&self) -> String {
        match self {
            SigningCapability::Standard(wallet) | SigningCapability::Ephemeral(wallet) => {
                format!("{:#x}", wallet.address())
            }
            SigningCapability::ProfileProvider { account, .. } => account.clone(),
        }
    }

    /// EIP-191 personal signature over `data`, 65 bytes (r, s, v).
    pub fn sign(&self, data: &[u8], timeout: Duration) -> Result<Vec<u8>, String> {
        let sig_bytes = match self {
            SigningCapability::Standard(wallet) | SigningCapability::Ephemeral(wallet) => {
                let hash = ethers::utils::hash_message(data);
                wallet
                    .sign_hash(hash)
                    .map_err(|e| format!("personal sign failed: {e}"))?
                    .to_vec()
            }
            SigningCapability::ProfileProvider {
                provider_url,
                account,
            } => {
                let hex_sig = rpc_string(
                    provider_url,
                    "personal_sign",
                    json!([format!("0x{}", hex::encode(data)), account]),
                    timeout,
                )?;
                parse_hex_bytes(&hex_sig)?
            }
        };
        if sig_bytes.len() != 65 {
            return Err(format!(
                "Signer returned invalid signature length: expected 65, got {}",
                sig_bytes.len()
            ));
        }
        Ok(sig_bytes)
    }

    /// Submit a contract call and return its transaction hash.
    ///
    /// `rpc_url`/`chain_id` come from the resolved connection; the provider
    /// variant ignores them and submits through its own endpoint.
    pub fn send_call(
        &self,
        rpc_url: &str,
        chain_id: u64,
        to: &str,
        calldata: &[u8],
        timeout: Duration,
    ) -> Result<String, String> {
        match self {
            SigningCapability::Standard(wallet) | SigningCapability::Ephemeral(wallet) => {
                let raw_tx = sign_call_locally(wallet, rpc_url, chain_id, to, calldata, timeout)?;
                rpc_string(rpc_url, "eth_sendRawTransaction", json!([raw_tx]), timeout)
            }
            SigningCapability::ProfileProvider {
                provider_url,
                account,
            } => rpc_string(
                provider_url,
                "eth_sendTransaction",
                json!([{
                    "from": account,
                    "to": to,
                    "data": format!("0x{}", hex::encode(calldata)),
                }]),
                timeout,
            ),
        }
    }
}

fn sign_call_locally(
    wallet: &LocalWallet,
    rpc_url: &str,
    chain_id: u64,
    to: &str,
    calldata: &[u8],
    timeout: Duration,
) -> Result<String, String> {
    let from = format!("{:#x}", wallet.address());
    let to_address: EthersAddress = to
        .trim()
        .parse()
        .map_err(|e| format!("Invalid target address ({to}): {e}"))?;
    let data_hex = format!("0x{}", hex::encode(calldata));

    let nonce = parse_hex_u64(&rpc_string(
        rpc_url,
        "eth_getTransactionCount",
        json!([from, "pending"]),
        timeout,
    )?)?;
    let gas_price = parse_hex_u128(&rpc_string(rpc_url, "eth_gasPrice", json!([]), timeout)?)?;
    let estimated_gas = parse_hex_u64(&rpc_string(
        rpc_url,
        "eth_estimateGas",
        json!([{ "from": from, "to": to, "data": data_hex }]),
        timeout,
    )?)?;
    let gas_limit = (estimated_gas.saturating_mul(GAS_LIMIT_BUFFER_NUMERATOR)
        / GAS_LIMIT_BUFFER_DENOMINATOR)
        .max(GAS_LIMIT_FLOOR);

    let request = TransactionRequest::new()
        .from(wallet.address())
        .to(to_address)
        .data(EthersBytes::from(calldata.to_vec()))
        .nonce(nonce)
        .gas(gas_limit)
        .gas_price(gas_price)
        .chain_id(chain_id);
    let tx: TypedTransaction = request.into();

    let signature = wallet
        .clone()
        .with_chain_id(chain_id)
        .sign_transaction_sync(&tx)
        .map_err(|e| format!("Failed to sign transaction: {e}"))?;
    let raw = tx.rlp_signed(&signature);

    log::debug!(
        "[AddressBook/Signer] signed tx from={} to={} nonce={} gas={} gasPrice={} chainId={}",
        from,
        to,
        nonce,
        gas_limit,
        gas_price,
        chain_id
    );
    Ok(format!("0x{}", hex::encode(raw.as_ref())))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key (anvil/hardhat account #0).
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    #[test]
    fn standard_signer_reports_lowercase_address() {
        let signer = SigningCapability::from_private_key(DEV_KEY).expect("key");
        assert_eq!(signer.kind(), SignerKind::Standard);
        assert_eq!(signer.address(), DEV_ADDRESS);
    }

    #[test]
    fn local_personal_sign_is_65_bytes() {
        let signer = SigningCapability::ephemeral();
        let sig = signer
            .sign(b"address book", Duration::from_secs(1))
            .expect("sign");
        assert_eq!(sig.len(), 65);
        assert_eq!(signer.kind(), SignerKind::Ephemeral);
    }

    #[test]
    fn provider_requires_valid_account() {
        assert!(SigningCapability::profile_provider("http://localhost:8545", "nope").is_err());
        assert!(SigningCapability::profile_provider("  ", DEV_ADDRESS).is_err());
        let signer =
            SigningCapability::profile_provider("http://localhost:8545", DEV_ADDRESS).expect("ok");
        assert_eq!(signer.address(), DEV_ADDRESS);
        assert_eq!(signer.kind(), SignerKind::ProfileProvider);
    }

    #[test]
    fn bad_private_key_is_rejected() {
        assert!(SigningCapability::from_private_key("0x1234").is_err());
    }
}
