pub mod config;
pub mod export; // Report download + rasterized snapshot
pub mod fetch; // Entity-scoped fetch cells
pub mod gateway; // Analysis service contracts
pub mod models;
pub mod session; // Cooperative driver
pub mod view; // Render-ready projection
pub mod workflow; // Submission / analysis state machine

pub use config::ClientConfig;
pub use session::{Session, SessionEvent};
pub use workflow::{Phase, Workflow, WorkflowError};

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// Filter comes from `RUST_LOG`, falling back to
/// [`config::default_log_filter`]. Calling it again is a no-op.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);
    }
}
