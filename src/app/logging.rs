// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use std::str::FromStr;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn setup_logging(log_level: &str, json_format: bool) {
    // A bare level like "debug" would also open the floodgates on the
    // HTTP and database internals, so those get pinned down. Anything
    // that already reads as a directive list goes to EnvFilter untouched.
    let requested = log_level.trim();
    let directives = if requested.contains(',') || requested.contains('=') {
        requested.to_string()
    } else {
        format!(
            "{requested},h2=info,hyper=info,hyper_util=info,reqwest=info,sqlx=warn"
        )
    };
    let filter = EnvFilter::from_str(&directives).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json_format {
        let json_layer = fmt::layer()
            .json()
            .with_target(false)
            .with_current_span(true);
        registry.with(json_layer).init();
    } else {
        let console_layer = fmt::layer().with_target(true).compact();
        registry.with(console_layer).init();
    }

    tracing::info!(
        filter = %directives,
        format = if json_format { "json" } else { "compact" },
        "logging initialized"
    );
}
