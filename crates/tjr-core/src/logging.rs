use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize logging/tracing for the relay.
///
/// `json` switches the fmt layer to one JSON object per line.
pub fn init(service_name: &str, json: bool) -> Result<()> {
    // Default: info for our crates, warn for everything else.
    // Can be overridden with `RUST_LOG`.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,tjr_core=info,tjr_telegram=info,tjr_xmpp=info,{service_name}=info"
        ))
    });

    let builder = fmt().with_env_filter(filter).with_target(false);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.with_ansi(true).try_init()
    };

    installed.map_err(|e| Error::External(format!("failed to install tracing subscriber: {e}")))
}
