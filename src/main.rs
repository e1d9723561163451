#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = physexam::run().await {
        eprintln!("physexam fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
