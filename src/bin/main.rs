//! Binary entrypoint for the orbitask tool

#[tokio::main]
async fn main() {
    if let Err(e) = orbitask::cli::run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
