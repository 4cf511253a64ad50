use catalog_tonic_client::{
    AuthAgent, Credentials, LaptopClient, auth::DEFAULT_AUTH_METHODS,
};
use catalog_tonic_core::proto::{Cpu, Filter, Laptop, Memory, memory::Unit};
use clap::{Parser, Subcommand};
use core::time::Duration;
use std::path::PathBuf;
use tonic::transport::Channel;
use tracing_subscriber::EnvFilter;

/// Command line client for the catalog service.
#[derive(Parser, Debug)]
#[command(name = "catalog-tonic-client", version, about)]
struct ClientArgs {
    /// Server endpoint.
    ///
    /// Environment variable: `SERVER_URL`
    #[arg(long, env = "SERVER_URL", default_value = "http://127.0.0.1:50051")]
    server_url: String,

    /// Environment variable: `CATALOG_USERNAME`
    #[arg(long, env = "CATALOG_USERNAME", default_value = "admin1")]
    username: String,

    /// Environment variable: `CATALOG_PASSWORD`
    #[arg(long, env = "CATALOG_PASSWORD", default_value = "secret", hide_env_values = true)]
    password: String,

    /// Seconds between token refreshes.
    ///
    /// Environment variable: `REFRESH_SECS`
    #[arg(long, env = "REFRESH_SECS", default_value_t = 30)]
    refresh_secs: u64,

    /// Seconds before retrying a failed refresh.
    ///
    /// Environment variable: `RETRY_SECS`
    #[arg(long, env = "RETRY_SECS", default_value_t = 1)]
    retry_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a laptop to the catalog and print its id.
    Create {
        /// Laptop id (UUID). Generated by the server when omitted.
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        brand: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        price: f64,
        #[arg(long, default_value_t = 4)]
        cores: u32,
        #[arg(long, default_value_t = 2.5)]
        ghz: f64,
        #[arg(long, default_value_t = 8)]
        ram_gb: u64,
    },
    /// Stream every laptop matching the filter.
    Search {
        #[arg(long, default_value_t = f64::MAX)]
        max_price: f64,
        #[arg(long, default_value_t = 0)]
        min_cores: u32,
        #[arg(long, default_value_t = 0.0)]
        min_ghz: f64,
        #[arg(long, default_value_t = 0)]
        min_ram_gb: u64,
    },
    /// Upload an image for a laptop.
    Upload { laptop_id: String, path: PathBuf },
    /// Rate a laptop once per score, on a single stream.
    Rate {
        laptop_id: String,
        #[arg(required = true)]
        scores: Vec<f64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = ClientArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .compact()
        .init();

    let channel = Channel::from_shared(args.server_url.clone())?
        .connect()
        .await?;
    let agent = AuthAgent::spawn(
        channel.clone(),
        Credentials {
            username: args.username,
            password: args.password,
        },
        Duration::from_secs(args.refresh_secs),
        Duration::from_secs(args.retry_secs),
        DEFAULT_AUTH_METHODS,
    )
    .await?;
    let mut client = LaptopClient::new(channel, &agent);

    match args.command {
        Command::Create {
            id,
            brand,
            name,
            price,
            cores,
            ghz,
            ram_gb,
        } => {
            let laptop = Laptop {
                id: id.unwrap_or_default(),
                brand,
                name,
                cpu: Some(Cpu {
                    number_cores: cores,
                    number_threads: cores.saturating_mul(2),
                    min_ghz: ghz,
                    max_ghz: ghz,
                    ..Default::default()
                }),
                ram: Some(Memory::new(ram_gb, Unit::Gigabyte)),
                price_usd: price,
                ..Default::default()
            };
            println!("{}", client.create_laptop(laptop).await?);
        }
        Command::Search {
            max_price,
            min_cores,
            min_ghz,
            min_ram_gb,
        } => {
            let filter = Filter {
                max_price_usd: max_price,
                min_cpu_cores: min_cores,
                min_cpu_ghz: min_ghz,
                min_ram: Some(Memory::new(min_ram_gb, Unit::Gigabyte)),
            };
            for laptop in client.search_laptop(filter).await? {
                println!(
                    "{}\t{} {}\t${:.2}",
                    laptop.id, laptop.brand, laptop.name, laptop.price_usd
                );
            }
        }
        Command::Upload { laptop_id, path } => {
            let resp = client.upload_image(&laptop_id, &path).await?;
            println!("{}\t{} bytes", resp.id, resp.size);
        }
        Command::Rate { laptop_id, scores } => {
            let ratings: Vec<_> = scores.into_iter().map(|s| (laptop_id.clone(), s)).collect();
            for resp in client.rate_laptop(ratings).await? {
                println!(
                    "{}\trated {} times\taverage {:.2}",
                    resp.laptop_id, resp.rated_count, resp.average_score
                );
            }
        }
    }

    agent.shutdown().await;
    Ok(())
}
