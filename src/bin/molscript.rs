/// Molscript command line
///
/// Runs or checks compiled scripts against a scene loaded from JSON.

use molscript_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
