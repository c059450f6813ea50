#[tokio::main]
async fn main() -> anyhow::Result<()> {
    neb_lib::run().await
}
