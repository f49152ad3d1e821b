use clap::Parser;

use backoffice::cli::{output, Cli};
use backoffice::config::CONFIG;
use backoffice::logging::init_tracing;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing(&CONFIG.log_level, CONFIG.log_json);

    let cli = Cli::parse();
    if let Err(e) = cli.run().await {
        output::failure(format!("{:#}", e));
        std::process::exit(1);
    }
}
