#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = avalia_rust::run().await {
        eprintln!("avalia-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
