mod cli;

use plugrun::PlugrunError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize logging on stderr so plugin output on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run().await {
        let code = e
            .downcast_ref::<PlugrunError>()
            .map(PlugrunError::exit_code)
            .unwrap_or(1);
        eprintln!("Error: {:#}", e);
        std::process::exit(code);
    }
}
