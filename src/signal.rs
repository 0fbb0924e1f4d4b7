//! Interrupt handling.
//!
//! Ctrl-C is awaited on a dedicated thread running a small current-thread
//! Tokio runtime; when it arrives the accept loop is told to stop.

use crate::server::ShutdownHandle;
use std::io;
use std::thread;
use tracing::{error, info};

/// Spawn the thread that turns an interrupt into a server shutdown.
pub fn spawn_interrupt_listener(shutdown: ShutdownHandle) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("signal".to_string())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Interrupt received");
                        shutdown.trigger();
                    }
                    Err(e) => error!(error = %e, "Failed to listen for interrupt"),
                }
            });
        })?;

    Ok(())
}
