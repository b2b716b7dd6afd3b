#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = avalia_rust::run_worker().await {
        eprintln!("avalia-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
