//! FraudGuard binary

use clap::Parser;

use fraudguard::cli::{exit_code, init_tracing, run, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let guard = match init_tracing(cli.log_format, cli.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(fraudguard::cli::EXIT_FAILURE);
        }
    };

    let result = run(cli).await;
    if let Err(ref e) = result {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e);
    }

    let code = exit_code(&result);
    drop(guard);
    std::process::exit(code);
}
