use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Deserialize;

use proxywall::config::{resolve_config, Overrides, Role};
use proxywall::registry::{self, Backend, BackendUrl, Endpoint, NetworkScope};

#[derive(Parser)]
#[command(name = "proxywall-client")]
#[command(about = "Inspect and edit proxywall registry entries", long_about = None)]
struct Cli {
    /// TOML configuration file; only its registry section is used.
    #[arg(short, long, env = "PROXYWALL_CONFIG")]
    config: Option<PathBuf>,

    /// Registry backend URL, e.g. etcd://127.0.0.1:2379/proxywall
    #[arg(short, long, env = "PROXYWALL_BACKEND")]
    backend: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List records, optionally only those under a domain
    Ls {
        prefix: Option<String>,
    },
    /// Register the endpoints described in a JSON file
    Add {
        file: PathBuf,
    },
    /// Unregister the endpoints described in a JSON file
    Rm {
        file: PathBuf,
    },
}

/// `{ "name": "api.example.com", "endpoints": [ { "id": ..., "address": ..., "port": ... } ] }`
#[derive(Debug, Deserialize)]
struct RecordFile {
    name: String,
    #[serde(default)]
    ttl: Option<u64>,
    endpoints: Vec<Endpoint>,
}

fn read_record_file(path: &Path) -> Result<RecordFile, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let record: RecordFile = serde_json::from_str(&content)?;
    for endpoint in &record.endpoints {
        endpoint.validate()?;
    }
    Ok(record)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let overrides = Overrides {
        backend: cli.backend.clone(),
        ..Default::default()
    };
    let config = resolve_config(cli.config.as_deref(), &overrides, Role::Client)?;
    let registry_url = config.registry.url.as_deref().ok_or("registry.url is required")?;

    // Administrative reads see every network.
    let url = BackendUrl::parse(registry_url)?;
    let backend = registry::connect(&url, NetworkScope::Any).await?;

    match cli.command {
        Commands::Ls { prefix } => {
            let records = backend.lookall(prefix.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Add { file } => {
            let record = read_record_file(&file)?;
            register_all(backend.as_ref(), &record).await?;
            println!("OK.");
        }
        Commands::Rm { file } => {
            let record = read_record_file(&file)?;
            for endpoint in &record.endpoints {
                backend.unregister(&record.name, &endpoint.id).await?;
            }
            println!("OK.");
        }
    }

    Ok(())
}

async fn register_all(backend: &dyn Backend, record: &RecordFile) -> Result<(), Box<dyn std::error::Error>> {
    for endpoint in &record.endpoints {
        backend.register(&record.name, endpoint, record.ttl).await?;
    }
    Ok(())
}
