use std::time::Instant;

use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

mod api;
mod cli;
mod errors;
mod summary;
mod transfer;

#[tokio::main]
async fn main() {
    let start = Instant::now();

    // Parse command line arguments
    let args = cli::parse_args();

    init_logging(&args.fmt);

    // Failures are reported through log lines; the process exits zero in
    // all paths after logging the elapsed wall-clock time.
    match cli::process_args(&args) {
        Ok(config) => {
            if let Err(e) = transfer::run(&config).await {
                error!("Operation failed: {}", e);
            }
        }
        Err(e) => {
            error!("Error processing arguments: {}", e);
        }
    }

    info!("{:.2}s elapsed", start.elapsed().as_secs_f64());
}

fn init_logging(fmt: &str) {
    let builder = FmtSubscriber::builder().with_max_level(Level::INFO);
    if fmt == "text" {
        tracing::subscriber::set_global_default(builder.finish())
            .expect("Failed to set tracing subscriber");
    } else {
        tracing::subscriber::set_global_default(builder.json().finish())
            .expect("Failed to set tracing subscriber");
    }
}
