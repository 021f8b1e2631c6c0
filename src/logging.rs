//! Process-wide tracing setup.
//!
//! The runtime logs module lifecycle transitions and worker faults through
//! `tracing`; this just wires up a default subscriber the way the teacher's
//! `main.rs` does (`FmtSubscriber` at `INFO`), so an embedding program gets
//! readable output with zero configuration if it doesn't install its own.

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install a default `tracing` subscriber at `INFO`. Idempotent: a second
/// call after a subscriber is already installed is a harmless no-op.
pub fn init_default_subscriber() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
