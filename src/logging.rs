//! One-time `tracing` subscriber initialization (§6.2). The only logging
//! sink this core wires up; anything downstream is an external
//! collaborator per §1.

use tracing_subscriber::EnvFilter;

pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
