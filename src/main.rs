use clap::{Parser, Subcommand};
use tracing::{error, info};

use finbert_collector::collector::Collector;
use finbert_collector::config::CollectorConfig;
use finbert_collector::dedup::SeenStore;
use finbert_collector::logging::init_logging;
use finbert_collector::metrics::METRICS;
use finbert_collector::server::MetricsServer;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one collection pass: fetch, deduplicate, classify, append
    Collect,
    /// Print statistics about the dedup store
    Stats,
}

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    let cli = Cli::parse();

    if let Err(e) = init_logging("info") {
        eprintln!("failed to initialize logging: {e}");
        return e.exit_code();
    }

    let config = match CollectorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration rejected");
            METRICS.record_error(&e);
            return e.exit_code();
        }
    };

    METRICS.set_build_info(
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_COMMIT").unwrap_or("unknown"),
        option_env!("BUILD_DATE").unwrap_or("unknown"),
    );

    match cli.command.unwrap_or(Commands::Collect) {
        Commands::Collect => collect(config).await,
        Commands::Stats => stats(&config),
    }
}

async fn collect(config: CollectorConfig) -> i32 {
    if config.enable_metrics {
        match MetricsServer::bind(config.metrics_port).await {
            Ok(server) => {
                tokio::spawn(server.serve());
            }
            Err(e) => {
                error!(error = %e, "metrics endpoint failed to start");
                return e.exit_code();
            }
        }
    } else {
        info!("metrics endpoint disabled");
    }

    let collector = match Collector::init(config).await {
        Ok(collector) => collector,
        Err(e) => {
            error!(error = %e, "pipeline initialization failed");
            METRICS.record_error(&e);
            METRICS.mark_unhealthy();
            return e.exit_code();
        }
    };

    match collector.run().await {
        Ok(summary) => {
            info!(
                run_id = %summary.run_id,
                processed = summary.processed,
                "collection completed"
            );
            0
        }
        Err(e) => {
            error!(error = %e, "collection failed");
            e.exit_code()
        }
    }
}

fn stats(config: &CollectorConfig) -> i32 {
    let store = match SeenStore::open(&config.dedup_db_path, config.dedup_capacity) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "failed to open dedup store");
            return e.exit_code();
        }
    };

    match store.stats() {
        Ok(stats) => {
            info!(
                total_ids = stats.total_ids,
                oldest_first_seen = ?stats.oldest_first_seen,
                newest_first_seen = ?stats.newest_first_seen,
                filter_capacity = stats.filter_capacity,
                "dedup store statistics"
            );
            0
        }
        Err(e) => {
            error!(error = %e, "failed to read dedup statistics");
            e.exit_code()
        }
    }
}
