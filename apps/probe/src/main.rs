#![warn(clippy::all)]

use std::path::PathBuf;
use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use logger::init_tracing;
use uppe_probe::control_plane::{ControlPlane, HttpControlPlane};
use uppe_probe::monitoring::{CheckerRegistry, CycleOutcome, Dispatcher, Trigger};
use uppe_probe::{Config, ProbeMetrics, routes};

#[derive(Debug, Parser)]
#[command(version, about = "Uppe probe worker")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single dispatch cycle and exit
    #[arg(long)]
    once: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    if cli.print_config {
        println!("{config}");
        return Ok(());
    }

    let metrics = Arc::new(ProbeMetrics::new());
    let control_plane: Arc<dyn ControlPlane> = Arc::new(
        HttpControlPlane::new(&config.control_plane, &config.reporting)
            .context("Failed to build control-plane client")?,
    );
    let registry =
        Arc::new(CheckerRegistry::from_config(&config).context("Failed to build checkers")?);
    let dispatcher = Arc::new(Dispatcher::new(control_plane, registry, metrics.clone(), &config));

    if cli.once {
        return match dispatcher.run_cycle().await {
            CycleOutcome::FetchFailed => anyhow::bail!("Could not fetch monitors"),
            outcome => {
                info!("Single cycle finished: {:?}", outcome);
                Ok(())
            }
        };
    }

    info!(
        "Probe {} reporting to {}",
        config.control_plane.probe_name, config.control_plane.server_url
    );
    let trigger = Trigger::new(dispatcher, &config.schedule).start();

    let addr = (config.status_server.bind.as_str(), config.status_server.port);
    info!("Status server listening on {}:{}", addr.0, addr.1);

    let metrics = web::Data::from(metrics);
    HttpServer::new(move || App::new().app_data(metrics.clone()).configure(routes::routes))
        .bind(addr)?
        .run()
        .await?;

    trigger.abort();
    Ok(())
}
