//! # provstore
//!
//! Command-line tools over the provstore persistence layer.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │          apps/provstore (THE BINARY)          │
//! │                                               │
//! │   ┌──────────────┐      ┌─────────────────┐   │
//! │   │  CLI (clap)  │─────▶│  config (toml)  │   │
//! │   └──────┬───────┘      └─────────────────┘   │
//! │          ▼                                    │
//! │   ┌────────────────┐                          │
//! │   │ provstore-core │                          │
//! │   │  (THE LOGIC)   │                          │
//! │   └────────────────┘                          │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! provstore --config provstore.toml counter increment --type br --prefix 060
//! provstore resolve --iri https://w3id.org/oc/meta/br/0601500
//! provstore diff --previous old.nq --current new.nq --graph https://w3id.org/oc/meta/br/
//! provstore --config provstore.toml replay
//! ```

use clap::Parser;
use provstore::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // PROVSTORE_LOG_FORMAT=json switches to machine-parseable output.
    let log_format = std::env::var("PROVSTORE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "provstore=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        eprintln!("provstore v{}", env!("CARGO_PKG_VERSION"));
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
