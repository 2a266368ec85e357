use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use img_upgr::cli::{self, RunArgs};
use img_upgr::config::{self, Config};
use img_upgr::{logging, ui};

#[derive(Parser)]
#[command(
    name = "img-upgr",
    about = "Check docker-compose images for newer tags and open merge requests",
    version
)]
struct Args {
    #[arg(short, long, global = true, help = "Custom configuration file path")]
    config: Option<String>,

    #[arg(short, long, global = true, help = "Enable debug output")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Only print errors")]
    quiet: bool,

    #[arg(long, global = true, help = "Log level (DEBUG, INFO, WARN, ERROR, FATAL)")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a compose file or directory for image updates
    Check {
        /// File or directory to check (default: docker-compose.yml)
        path: Option<PathBuf>,

        #[arg(long, help = "Report updates without creating merge requests")]
        dry_run: bool,

        #[arg(short, long, help = "Output format: text, json or yaml")]
        output: Option<String>,
    },

    /// Clone the configured repository and scan it for image updates
    Scan {
        /// Directory inside the repository (default: IMG_UPGR_SCANDIR or the root)
        dir: Option<PathBuf>,

        #[arg(long, help = "Create a merge request for each update")]
        create_mr: bool,

        #[arg(long, help = "Branch the merge requests target")]
        target_branch: Option<String>,
    },

    /// Print version information
    Version,
}

fn version_info() -> String {
    format!("img-upgr {}", env!("CARGO_PKG_VERSION"))
}

/// Cancel the run on Ctrl-C or SIGTERM
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    warn!("received shutdown signal, cancelling");
    cancel.cancel();
}

fn load_config(args: &Args) -> Config {
    let mut config = match config::load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            ui::display_error(&format!("Error loading config: {}", e));
            std::process::exit(1);
        }
    };
    config.apply_env();

    if args.verbose {
        config.verbose = true;
    }
    if args.quiet {
        config.quiet = true;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    config
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let (config, run_args) = match &args.command {
        Command::Version => {
            println!("{}", version_info());
            return;
        }
        Command::Check {
            path,
            dry_run,
            output,
        } => {
            let mut config = load_config(&args);
            config.dry_run |= *dry_run;
            if let Some(output) = output {
                config.output_format = output.clone();
            }
            let run_args = RunArgs::check(path.clone(), &config);
            (config, run_args)
        }
        Command::Scan {
            dir,
            create_mr,
            target_branch,
        } => {
            let mut config = load_config(&args);
            config.create_mr |= *create_mr;
            if target_branch.is_some() {
                config.target_branch = target_branch.clone();
            }
            let run_args = RunArgs::scan(dir.clone(), &config);
            (config, run_args)
        }
    };

    logging::init_tracing(&config);

    let run_args = match run_args {
        Ok(run_args) => run_args,
        Err(e) => {
            ui::display_error(&format!("{:#}", e));
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    match cli::run(&run_args, &config, &cancel).await {
        Ok(summary) => {
            if !config.quiet {
                ui::display_summary(&summary);
            }
            if summary.cancelled {
                std::process::exit(1);
            }
        }
        Err(e) => {
            ui::display_error(&format!("{:#}", e));
            std::process::exit(1);
        }
    }
}
