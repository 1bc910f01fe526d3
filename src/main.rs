use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use heaven_address_book::shared::address::abbreviate_address;
use heaven_address_book::{
    AddressBookConfig, AddressBookEntry, AddressBookService, FileStore, ReconciliationEngine,
    RemoteProfile, RpcProfileStore, SigningCapability,
};

#[derive(Debug, Clone, Parser)]
#[command(name = "heaven-address-book")]
#[command(about = "Heaven address book: local names synced with the on-chain profile")]
struct Args {
    /// Profile (owner) address whose address book is managed.
    #[arg(long, env = "HEAVEN_ADDRESS_BOOK_OWNER")]
    owner: String,

    /// Signer used for backups; `auto` picks key, then provider, then none.
    #[arg(long, value_enum, default_value_t = SignerChoice::Auto)]
    signer: SignerChoice,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SignerChoice {
    Auto,
    Standard,
    Provider,
    Ephemeral,
    None,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Print every entry.
    List,
    /// Print one entry.
    Get { address: String },
    /// Add or rename an entry.
    Add { address: String, name: String },
    /// Delete an entry.
    Remove { address: String },
    /// Merge local, profile and followers data.
    Sync,
    /// Publish the local address book to the profile.
    Backup,
    /// Replace the local address book with the profile copy.
    Restore,
    /// Show whether the profile copy is a current backup.
    Status,
}

fn build_signer(
    choice: SignerChoice,
    config: &AddressBookConfig,
) -> Result<Option<SigningCapability>> {
    let provider = || -> Result<SigningCapability> {
        let url = config
            .provider_url
            .as_deref()
            .ok_or_else(|| anyhow!("HEAVEN_PROFILE_PROVIDER_URL is not set"))?;
        let account = config
            .provider_account
            .as_deref()
            .ok_or_else(|| anyhow!("HEAVEN_PROFILE_PROVIDER_ACCOUNT is not set"))?;
        SigningCapability::profile_provider(url, account).map_err(|e| anyhow!(e))
    };
    let standard = || -> Result<SigningCapability> {
        let key = config
            .private_key
            .as_deref()
            .ok_or_else(|| anyhow!("HEAVEN_ADDRESS_BOOK_PRIVATE_KEY is not set"))?;
        SigningCapability::from_private_key(key).map_err(|e| anyhow!(e))
    };

    let signer = match choice {
        SignerChoice::None => None,
        SignerChoice::Standard => Some(standard()?),
        SignerChoice::Provider => Some(provider()?),
        SignerChoice::Ephemeral => Some(SigningCapability::ephemeral()),
        SignerChoice::Auto => {
            if config.private_key.is_some() {
                Some(standard()?)
            } else if config.provider_url.is_some() {
                Some(provider()?)
            } else {
                None
            }
        }
    };
    Ok(signer)
}

fn print_entry(entry: &AddressBookEntry) {
    println!(
        "{}  {:<24}  {:<12}  {}",
        entry.address,
        entry.name,
        entry.source.as_str(),
        chrono::DateTime::from_timestamp_millis(entry.timestamp)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| entry.timestamp.to_string())
    );
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = AddressBookConfig::from_env();

    let store = match config.data_dir.as_deref() {
        Some(dir) => FileStore::in_dir(dir, &args.owner),
        None => FileStore::for_owner(&args.owner),
    }
    .context("invalid --owner")?;
    log::debug!("[AddressBook] local record at {}", store.path().display());

    let mut profile_store = RpcProfileStore::new(config.resolver());
    if let Some(timeout) = config.receipt_timeout {
        profile_store = profile_store.with_receipt_timeout(timeout);
    }
    let engine = ReconciliationEngine::new(
        Arc::new(store),
        RemoteProfile::new(Arc::new(profile_store)),
    );
    let service = AddressBookService::new(engine);
    service
        .connect(&args.owner, build_signer(args.signer, &config)?)
        .context("invalid --owner")?;

    match args.command {
        Command::List => {
            let entries = service.entries();
            for entry in &entries {
                print_entry(entry);
            }
            println!("{} entries", entries.len());
        }
        Command::Get { address } => match service.get(&address) {
            Some(entry) => print_entry(&entry),
            None => bail!("no entry for {address}"),
        },
        Command::Add { address, name } => {
            let entry = service.add(&address, &name)?;
            print_entry(&entry);
        }
        Command::Remove { address } => {
            if !service.remove(&address) {
                bail!("no entry for {address}");
            }
            println!("removed {}", abbreviate_address(&address));
        }
        Command::Sync => {
            let data = service.sync().await?;
            println!(
                "synced {} entries (backed up: {})",
                data.len(),
                service.is_backed_up()
            );
        }
        Command::Backup => {
            if !service.backup().await {
                bail!(
                    "{}",
                    service
                        .backup_error()
                        .unwrap_or_else(|| "backup failed".to_string())
                );
            }
            println!("backed up {} entries", service.data().len());
        }
        Command::Restore => {
            let data = service.restore().await?;
            println!("restored {} entries", data.len());
        }
        Command::Status => {
            let backed_up = service.refresh_backup_status().await;
            let data = service.data();
            println!(
                "entries={} lastSynced={} backedUp={}",
                data.len(),
                data.last_synced,
                backed_up
            );
        }
    }
    Ok(())
}
