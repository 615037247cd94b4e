//! plcwatch binary: PLC data collection service with a web control API.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use clap::{Args, Parser, Subcommand};
use plcwatch::{
    AddressMap, AppState, CollectorService, InfluxStore, PlcConfig, Reading, S7Client, StoreConfig,
    TimeSeriesStore, WebConfig, DEFAULT_INTERVAL_SECS, DEFAULT_WEB_PORT,
};
use rand::Rng;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "plcwatch")]
#[command(about = "PLC data collection service")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Polls a Siemens S7 PLC, stores readings in InfluxDB, \
and serves a web control API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Web server bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Web server port
    #[arg(short, long, default_value_t = DEFAULT_WEB_PORT)]
    port: u16,

    /// PLC IP address or hostname
    #[arg(long, default_value = "192.168.0.1")]
    plc_host: String,

    /// PLC ISO-on-TCP port
    #[arg(long, default_value_t = 102)]
    plc_port: u16,

    /// PLC rack number
    #[arg(long, default_value_t = 0)]
    rack: u16,

    /// PLC slot number
    #[arg(long, default_value_t = 1)]
    slot: u16,

    /// InfluxDB base URL
    #[arg(long, default_value = "http://localhost:8086")]
    influx_url: String,

    /// InfluxDB database name
    #[arg(long, default_value = "plc_data")]
    database: String,

    /// Collection interval in seconds
    #[arg(short, long, default_value_t = DEFAULT_INTERVAL_SECS)]
    interval: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server and collection service (default)
    Serve(ServeArgs),

    /// Run a single collection cycle and print the reading
    Read,

    /// Insert synthetic readings for dashboard testing
    Seed(SeedArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Start collecting immediately instead of waiting for ?action=start
    #[arg(long)]
    autostart: bool,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,
}

#[derive(Args)]
struct SeedArgs {
    /// Number of readings to insert
    #[arg(long, default_value_t = 1)]
    count: u32,

    /// Minutes between consecutive readings, counting back from now
    #[arg(long, default_value_t = 10)]
    spacing_mins: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;
    print_banner();

    match &cli.command {
        Some(Commands::Serve(args)) => serve_command(&cli, args).await?,
        Some(Commands::Read) => read_command(&cli).await?,
        Some(Commands::Seed(args)) => seed_command(&cli, args).await?,
        None => {
            let serve_args = ServeArgs {
                autostart: false,
                no_cors: false,
            };
            serve_command(&cli, &serve_args).await?;
        }
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn print_banner() {
    println!("plcwatch - PLC data collection service");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}

fn plc_config(cli: &Cli) -> PlcConfig {
    PlcConfig::new(cli.plc_host.clone())
        .with_port(cli.plc_port)
        .with_rack_slot(cli.rack, cli.slot)
}

fn store_config(cli: &Cli) -> StoreConfig {
    StoreConfig::new(cli.influx_url.clone()).with_database(cli.database.clone())
}

fn build_service(cli: &Cli) -> anyhow::Result<(Arc<CollectorService>, Arc<InfluxStore>)> {
    let client = Arc::new(S7Client::new(plc_config(cli)));
    let store = Arc::new(InfluxStore::new(store_config(cli))?);
    let service = Arc::new(CollectorService::new(
        client,
        store.clone(),
        AddressMap::s7_1200_default(),
    ));
    Ok((service, store))
}

async fn serve_command(cli: &Cli, args: &ServeArgs) -> anyhow::Result<()> {
    info!("starting plcwatch...");

    let (service, store) = build_service(cli)?;
    info!(
        plc = %format!("{}:{}", cli.plc_host, cli.plc_port),
        influx = %cli.influx_url,
        "collection service initialized"
    );

    if args.autostart {
        let reply = service.clone().start(cli.interval);
        info!(message = %reply.message, "autostart");
    }

    let web_config = WebConfig::new(&cli.host, cli.port).with_cors(!args.no_cors);
    let state = AppState {
        service,
        store: store as Arc<dyn TimeSeriesStore>,
    };

    plcwatch::start_web_server(web_config, state).await?;
    Ok(())
}

async fn read_command(cli: &Cli) -> anyhow::Result<()> {
    let (service, _store) = build_service(cli)?;

    match service.read_now().await {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("read failed: {e}");
            std::process::exit(1);
        }
    }
}

async fn seed_command(cli: &Cli, args: &SeedArgs) -> anyhow::Result<()> {
    let store = InfluxStore::new(store_config(cli))?;

    for i in 0..args.count {
        let timestamp = Utc::now() - ChronoDuration::minutes(i as i64 * args.spacing_mins);
        let reading = sample_reading(timestamp);
        store.write(&reading).await?;
    }

    println!(
        "inserted {} synthetic readings, {} minutes apart",
        args.count, args.spacing_mins
    );
    Ok(())
}

/// A plausible synthetic reading: room temperatures, indoor humidity,
/// moderate airflow.
fn sample_reading(timestamp: chrono::DateTime<Utc>) -> Reading {
    let mut rng = rand::thread_rng();
    let mut channels = Vec::with_capacity(13);
    for i in 1..=10 {
        channels.push((format!("T{i}"), rng.gen_range(18.0..32.0)));
    }
    channels.push(("H1".to_string(), rng.gen_range(40.0..60.0)));
    channels.push(("H2".to_string(), rng.gen_range(45.0..60.0)));
    channels.push(("Air_Speed".to_string(), rng.gen_range(5.0..15.0)));
    Reading {
        timestamp,
        channels,
    }
}
