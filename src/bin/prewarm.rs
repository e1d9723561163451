#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = physexam::run_prewarm().await {
        eprintln!("physexam-prewarm fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
