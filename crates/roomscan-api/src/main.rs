use anyhow::Context;
use roomscan_api::{setup, telemetry};
use roomscan_core::Config;

// Use mimalloc as the global allocator for lower fragmentation in long-running containers.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Telemetry first so configuration fallback warnings are visible.
    Config::load_dotenv();
    telemetry::init_telemetry().context("Failed to initialize telemetry")?;
    let config = Config::from_env()?;

    let (services, router) = setup::initialize_app(&config).await?;
    setup::server::start_server(&config, router, services).await?;

    Ok(())
}
