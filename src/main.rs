use gitlab_token_manager::cli;
use tracing::error;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
