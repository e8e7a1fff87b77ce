use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use links::cli::{Cli, Commands, ConfigCommands};
use links::config::{self, Config, ShowFormat};
use links::{HttpClient, Inspector, Printer, VisitedSet};

const TO_PRINT_BUFFER: usize = 1024;

#[tokio::main]
async fn main() -> ExitCode {
    links::logging::init();

    let cli = Cli::parse();
    let cfg_file = cli.config.as_deref();

    let result = match cli.command {
        Commands::Inspect {
            host,
            path,
            skipok,
            out,
        } => run_inspect(cfg_file, host, &path, skipok, out).await,

        Commands::Config { command } => match command {
            ConfigCommands::Show { out } => {
                let format = if out == "json" {
                    ShowFormat::Json
                } else {
                    ShowFormat::Yaml
                };
                config::show(cfg_file, format).map_err(Into::into)
            }
            ConfigCommands::Set { key, value } => {
                config::set(cfg_file, &key, &value).map_err(Into::into)
            }
        },

        Commands::Version => {
            println!(
                "links, version: {}, built: {}",
                env!("CARGO_PKG_VERSION"),
                option_env!("LINKS_BUILD_TIME").unwrap_or("unknown"),
            );
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Wire the pipeline and run a crawl. Fetch failures are absorbed into the
/// result set; only configuration problems produce a non-zero exit.
async fn run_inspect(
    cfg_file: Option<&Path>,
    host: String,
    start_path: &str,
    skipok: bool,
    out: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut cfg = Config::load(cfg_file).map_err(|e| format!("cannot load configuration: {e}"))?;

    cfg.inspector.host = host;
    if skipok {
        cfg.printer.skip_ok = true;
    }
    if let Some(out) = out {
        cfg.printer.output_format = out;
    }
    cfg.validate()
        .map_err(|e| format!("cannot load configuration: {e}"))?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let visited = Arc::new(VisitedSet::new());
    let (to_print_tx, to_print_rx) = mpsc::channel(TO_PRINT_BUFFER);
    let (done_inspecting_tx, done_inspecting_rx) = mpsc::channel(1);
    let (done_printing_tx, mut done_printing_rx) = mpsc::channel(1);

    let client = HttpClient::new(&cfg.inspector)
        .map_err(|e| format!("cannot initialize inspector: {e}"))?;
    let inspector = Inspector::new(&cfg.inspector, client, Arc::clone(&visited), to_print_tx)
        .map_err(|e| format!("cannot initialize inspector: {e}"))?;

    let _printer_task = Printer::new(cfg.printer.clone(), visited).spawn(
        to_print_rx,
        done_inspecting_rx,
        done_printing_tx,
    );

    inspector
        .inspect(cancel, start_path, done_inspecting_tx)
        .await;

    // The printer finalizes even after an interrupt; wait for it to flush.
    done_printing_rx.recv().await;

    Ok(())
}

/// Cancel the crawl on interrupt or SIGTERM.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        cancel.cancel();
    });
}
