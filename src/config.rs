use std::path::PathBuf;
use std::time::Duration;

use crate::remote::{EndpointResolver, DEFAULT_PROFILE_RPC_URLS};
use crate::shared::config::{list_env, non_empty_env, u64_env};

/// Runtime settings gathered from the environment (after `.env`, if any).
#[derive(Debug, Clone, Default)]
pub struct AddressBookConfig {
    pub rpc_urls: Vec<String>,
    pub data_dir: Option<PathBuf>,
    pub receipt_timeout: Option<Duration>,
    pub private_key: Option<String>,
    pub provider_url: Option<String>,
    pub provider_account: Option<String>,
}

impl AddressBookConfig {
    pub fn from_env() -> Self {
        Self {
            rpc_urls: list_env("HEAVEN_PROFILE_RPC_URLS").unwrap_or_else(|| {
                DEFAULT_PROFILE_RPC_URLS
                    .iter()
                    .map(|url| (*url).to_string())
                    .collect()
            }),
            data_dir: non_empty_env("HEAVEN_ADDRESS_BOOK_DIR").map(PathBuf::from),
            receipt_timeout: u64_env("HEAVEN_ADDRESS_BOOK_RECEIPT_TIMEOUT_SECS")
                .map(Duration::from_secs),
            private_key: non_empty_env("HEAVEN_ADDRESS_BOOK_PRIVATE_KEY"),
            provider_url: non_empty_env("HEAVEN_PROFILE_PROVIDER_URL"),
            provider_account: non_empty_env("HEAVEN_PROFILE_PROVIDER_ACCOUNT"),
        }
    }

    pub fn resolver(&self) -> EndpointResolver {
        if self.rpc_urls.is_empty() {
            EndpointResolver::default()
        } else {
            EndpointResolver::new(self.rpc_urls.clone())
        }
    }
}
