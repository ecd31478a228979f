use anyhow::{bail, Context, Result};
use beacon::config::Config;
use beacon::models::{Collect, Site, SiteSettings};
use beacon::storage::{SqliteStorage, Storage, StorageError};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "beacon-admin")]
#[command(about = "Beacon site management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a site answering on a host
    AddSite {
        host: String,
        /// Don't store visitor locations
        #[arg(long)]
        no_location: bool,
        /// Store only the country, not the region
        #[arg(long)]
        no_region: bool,
        /// Don't store visitor languages
        #[arg(long)]
        no_language: bool,
    },
    /// Stop counting hits from an IP address
    IgnoreIp { host: String, ip: String },
    /// Remove an IP address from the ignore list
    UnignoreIp { host: String, ip: String },
    /// Toggle collection of optional hit fields
    Collect {
        host: String,
        field: CollectField,
        state: Toggle,
    },
    /// List all sites
    List,
    /// Show the number of stored hits for a site
    Stats { host: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum CollectField {
    Location,
    Region,
    Language,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

async fn find_site(storage: &dyn Storage, host: &str) -> Result<Site> {
    let host = host.to_lowercase();
    storage
        .get_site_by_host(&host)
        .await?
        .with_context(|| format!("no site for host '{host}'"))
}

fn onoff(v: bool) -> &'static str {
    if v {
        "on"
    } else {
        "off"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let storage =
        SqliteStorage::new(&config.database.url, config.database.max_connections).await?;

    // Ensure database is initialized
    storage.init().await?;

    match cli.command {
        Commands::AddSite {
            host,
            no_location,
            no_region,
            no_language,
        } => {
            let host = host.to_lowercase();
            let settings = SiteSettings {
                ignore_ips: Vec::new(),
                collect: Collect {
                    location: !no_location,
                    location_region: !no_location && !no_region,
                    language: !no_language,
                },
            };

            match storage.create_site(&host, &settings).await {
                Ok(site) => println!("✓ Created site {} for host '{}'", site.id, site.host),
                Err(StorageError::Conflict) => bail!("a site for host '{host}' already exists"),
                Err(StorageError::Other(e)) => return Err(e),
            }
        }
        Commands::IgnoreIp { host, ip } => {
            let mut site = find_site(&storage, &host).await?;
            if site.settings.ignored_ip(&ip).is_some() {
                println!("⚠ '{}' is already ignored for '{}'", ip, site.host);
            } else {
                site.settings.ignore_ips.push(ip.clone());
                storage.update_settings(site.id, &site.settings).await?;
                println!("✓ Ignoring hits from '{}' on '{}'", ip, site.host);
            }
        }
        Commands::UnignoreIp { host, ip } => {
            let mut site = find_site(&storage, &host).await?;
            let before = site.settings.ignore_ips.len();
            site.settings.ignore_ips.retain(|i| i != &ip);

            if site.settings.ignore_ips.len() == before {
                println!("⚠ '{}' was not ignored for '{}'", ip, site.host);
            } else {
                storage.update_settings(site.id, &site.settings).await?;
                println!("✓ No longer ignoring '{}' on '{}'", ip, site.host);
            }
        }
        Commands::Collect { host, field, state } => {
            let mut site = find_site(&storage, &host).await?;
            let on = matches!(state, Toggle::On);
            let collect = &mut site.settings.collect;

            match field {
                CollectField::Location => {
                    collect.location = on;
                    if !on {
                        collect.location_region = false;
                    }
                }
                CollectField::Region => {
                    if on && !collect.location {
                        bail!("enable location collection before region");
                    }
                    collect.location_region = on;
                }
                CollectField::Language => collect.language = on,
            }

            storage.update_settings(site.id, &site.settings).await?;
            println!("✓ Updated collection settings for '{}'", site.host);
        }
        Commands::List => {
            let sites = storage.list_sites().await?;
            if sites.is_empty() {
                println!("No sites found.");
            } else {
                println!(
                    "{:<6} {:<40} {:<9} {:<7} {:<9} {}",
                    "ID", "Host", "Location", "Region", "Language", "Ignored IPs"
                );
                println!("{}", "-".repeat(90));
                for site in sites {
                    let c = site.settings.collect;
                    println!(
                        "{:<6} {:<40} {:<9} {:<7} {:<9} {}",
                        site.id,
                        site.host,
                        onoff(c.location),
                        onoff(c.location_region),
                        onoff(c.language),
                        site.settings.ignore_ips.join(", ")
                    );
                }
            }
        }
        Commands::Stats { host } => {
            let site = find_site(&storage, &host).await?;
            let hits = storage.count_hits(site.id).await?;
            println!("{}: {} hits", site.host, hits);
        }
    }

    Ok(())
}
