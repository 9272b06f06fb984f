//! # Capabilities Controller
//!
//! Watches `Backend`, `Product` and `Application` resources and syncs them to 3scale.
//!
//! See the [README.md](../README.md) for configuration and usage.

use anyhow::Result;
use capabilities_controller::runtime::initialization::initialize;
use capabilities_controller::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    run_watch_loop(
        init_result.backends,
        init_result.products,
        init_result.applications,
        init_result.reconciler,
        init_result.server_state,
    )
    .await
}
