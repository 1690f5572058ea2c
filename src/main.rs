#[tokio::main]
async fn main() -> anyhow::Result<()> {
    admin_engine::run_server().await
}
