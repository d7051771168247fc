mod config;
mod output;

use anyhow::{Context, Result};
use cellular_core::{NetworkInterface, RunMode, Socket, TransportKind};
use clap::{Args, Parser, Subcommand};
use events::EventBus;
use host_net::{HostNetwork, HostSocket};
use orchestrator::{AsyncOrchestrator, BlockingRunner, EchoConfig, RunReport, SteppedRunner};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::DEFAULT_CONFIG_FILE;

const PRINTER_DRAIN: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "cellular-echo")]
#[command(about = "Bring up a cellular link, run an echo transaction, disconnect", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, send the echo payload, disconnect
    Run(RunArgs),
    /// Write a default config file
    Init {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// TOML config file; defaults to ./cellular-echo.toml when present
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// blocking, stepped or async
    #[arg(short, long)]
    mode: Option<RunMode>,

    /// udp, tcp or nonip
    #[arg(short, long)]
    transport: Option<TransportKind>,

    /// Echo server hostname
    #[arg(long)]
    host: Option<String>,

    /// Echo server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Connect retries after the first attempt
    #[arg(short, long)]
    retries: Option<u32>,

    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Bytes to send and expect back
    #[arg(long)]
    payload: Option<String>,

    #[arg(long)]
    apn: Option<String>,

    #[arg(long)]
    sim_pin: Option<String>,
}

impl RunArgs {
    fn apply(&self, config: &mut EchoConfig) {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(transport) = self.transport {
            config.transport = transport;
        }
        if let Some(ref host) = self.host {
            config.hostname = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(retries) = self.retries {
            config.max_retries = retries;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(ref payload) = self.payload {
            config.payload = payload.clone();
        }
        if self.apn.is_some() {
            config.cellular.apn = self.apn.clone();
        }
        if self.sim_pin.is_some() {
            config.cellular.sim_pin = self.sim_pin.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { path, force }) => {
            init_config(path, force).await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Run(args)) => run(args).await,
        None => run(RunArgs::default()).await,
    }
}

async fn init_config(path: PathBuf, force: bool) -> Result<()> {
    if config::write_default(&path, force).await? {
        println!("Wrote default config to {}", path.display());
    } else {
        println!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    Ok(())
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    init_tracing();

    let mut config = config::load(args.config.as_deref()).await?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    tracing::info!(
        mode = %config.mode,
        transport = %config.transport,
        host = %config.hostname,
        port = config.port,
        "Starting echo run"
    );

    let bus = EventBus::new();
    let printer = output::spawn_printer(&bus);

    let net: Arc<dyn NetworkInterface> = Arc::new(HostNetwork::new());
    let socket: Box<dyn Socket> = Box::new(HostSocket::new(config.transport));
    let report = execute(net, socket, config, bus).await?;

    if tokio::time::timeout(PRINTER_DRAIN, printer).await.is_err() {
        tracing::warn!("Status printer did not finish");
    }

    Ok(ExitCode::from(report.exit_code() as u8))
}

async fn execute(
    net: Arc<dyn NetworkInterface>,
    socket: Box<dyn Socket>,
    config: EchoConfig,
    bus: EventBus,
) -> Result<RunReport> {
    let report = match config.mode {
        RunMode::Blocking => {
            let runner = BlockingRunner::new(net, socket, config).with_event_bus(bus);
            tokio::task::spawn_blocking(move || runner.run())
                .await
                .context("Blocking worker failed")?
        }
        RunMode::Stepped => {
            SteppedRunner::new(net, socket, config)
                .with_event_bus(bus)
                .run()
                .await
        }
        RunMode::Async => {
            let mut orchestrator = AsyncOrchestrator::new(net, socket, config).with_event_bus(bus);
            orchestrator.run().await
        }
    };
    Ok(report)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cellular_echo=info,orchestrator=info,host_net=info".into()),
        )
        .init();
}
