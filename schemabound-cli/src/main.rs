#[tokio::main]
async fn main() {
    if let Err(err) = schemabound_cli::cli::run().await {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}
