#[tokio::main]
async fn main() -> anyhow::Result<()> {
    review_popup::logging::init();

    review_popup::run().await.map_err(|err| {
        tracing::error!(error = %err, "review popup exited with error");
        anyhow::anyhow!("review popup failed: {err}")
    })
}
