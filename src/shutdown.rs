//! Ctrl-C handling.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Token that is cancelled on the first Ctrl-C.
///
/// A running comparison stops enumerating, lets in-flight lookups finish
/// and reports partial counts.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    info!("Received interrupt signal (Ctrl+C), stopping comparison");
                    child.cancel();
                }
                Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
            },
            _ = child.cancelled() => {}
        }
    });

    token
}
