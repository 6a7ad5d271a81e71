//! fsav-scan: scan files through a running fsavd.

mod cli;

use std::process::ExitCode;

use clap::Parser;
use eyre::WrapErr;
use fsav_client::Client;
use fsav_core::{Config, ScanResult};
use futures_util::future::join_all;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FSAV_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = cli::Cli::parse();

    match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fsav-scan: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &cli::Cli) -> eyre::Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    debug!(?config, "scan options");

    let client = Client::builder(&cli.socket)
        .connect_timeout(cli.connect_timeout())
        .cmd_timeout(cli.cmd_timeout())
        .conn_retries(cli.retries)
        .conn_sleep(cli.retry_sleep())
        .config(config)
        .connect()
        .await
        .wrap_err_with(|| format!("cannot start session on {}", cli.socket.display()))?;

    info!(files = cli.files.len(), "scanning");
    let scans = cli.files.iter().map(|file| {
        let client = &client;
        async move { (file, client.scan(file).await) }
    });
    let results = join_all(scans).await;

    let mut code = ExitCode::SUCCESS;
    for (file, result) in results {
        match result {
            Ok(r) => {
                if r.infected {
                    code = ExitCode::FAILURE;
                }
                print_result(&r, cli.json)?;
            }
            Err(e) => {
                warn!(file = file.as_str(), %e, "scan failed");
                eprintln!("fsav-scan: {file}: {e}");
                code = ExitCode::FAILURE;
            }
        }
    }

    client.close().await?;
    Ok(code)
}

fn print_result(r: &ScanResult, json: bool) -> eyre::Result<()> {
    if json {
        println!("{}", serde_json::to_string(r)?);
        return Ok(());
    }

    println!("Scan:\t\t{}", r.filename);
    println!("aname\t\t=>\t{}", r.archive_item());
    println!("status\t\t=>\t{}", r.status());
    println!("signature\t=>\t{}", r.signature());
    println!("infected\t=>\t{}", r.infected);
    Ok(())
}
