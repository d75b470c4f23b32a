//! Logging initialization.

use std::env;
use std::io::{self, IsTerminal};

use log::LevelFilter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output and verbosity options for logging setup.
#[derive(Debug, Clone, Copy)]
pub struct LogOptions {
    pub level: LevelFilter,
    pub json: bool,
    pub no_color: bool,
    pub diagnostics: bool,
}

/// Install the tracing subscriber and the log-crate bridge.
///
/// An explicit `RUST_LOG` wins over the computed default filter.
pub fn init_logging(opts: LogOptions) {
    if opts.level == LevelFilter::Off {
        log::set_max_level(LevelFilter::Off);
        return;
    }

    let level = match opts.level {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("advsr={level},tower_http={level}")));

    // JSON output for machine consumption, pretty format otherwise
    if opts.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .ok();
    } else {
        let disable_color =
            opts.no_color || env::var_os("NO_COLOR").is_some() || !io::stderr().is_terminal();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(!disable_color)
                    .with_target(opts.diagnostics)
                    .with_file(opts.diagnostics)
                    .with_line_number(opts.diagnostics),
            )
            .try_init()
            .ok();
    }

    // Also init env_logger for compatibility with log crate users
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.filter_level(opts.level);
    builder.try_init().ok();
}
