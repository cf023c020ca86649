//=====================================================
// File: logging.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Tracing setup for SolvraRepair binaries
// Objective: Install one compact subscriber filtered through RUST_LOG
//=====================================================

use std::sync::OnceLock;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

static INIT: OnceLock<()> = OnceLock::new();

/// Initialize tracing once. `verbose` lowers the default level to debug;
/// `RUST_LOG` directives still win. Events go to stderr so traced program
/// output on stdout stays clean.
pub fn init(component: &str, verbose: bool) {
    INIT.get_or_init(|| {
        let level = if verbose { Level::DEBUG } else { Level::WARN };
        let filter = EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy();
        let _ = SubscriberBuilder::default()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .try_init();
    });
    tracing::debug!(component, "tracing initialised");
}

//=====================================================
// End of file
//=====================================================
