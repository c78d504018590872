// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracing subscriber setup for the brickrun binary.

use std::io;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::RuntimeConfig;

/// Configuration for telemetry initialization.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Level used when RUST_LOG is not set.
    pub default_level: Level,

    /// Log brick spans as they open and close.
    pub include_span_events: bool,

    /// Whether to include file/line information.
    pub include_file_line: bool,

    /// Whether to use ANSI colors in output.
    pub ansi_colors: bool,

    /// Whether to use compact log format.
    pub compact: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            include_span_events: false,
            include_file_line: false,
            ansi_colors: true,
            compact: true,
        }
    }
}

impl TelemetryConfig {
    /// Verbose output with span events, used by `--debug`.
    pub fn development() -> Self {
        Self {
            default_level: Level::DEBUG,
            include_span_events: true,
            include_file_line: true,
            ansi_colors: true,
            compact: false,
        }
    }

    /// Pick the subscriber setup for a run from the merged runtime config.
    pub fn for_runtime(config: &RuntimeConfig, debug: bool) -> Self {
        if debug {
            Self::development()
        } else {
            Self::default()
                .with_level_name(&config.log_level)
                .with_ansi(false)
        }
    }

    /// Set the default level from a configured name (`trace` ... `error`).
    ///
    /// Unknown names leave the level unchanged.
    pub fn with_level_name(mut self, name: &str) -> Self {
        if let Ok(level) = name.trim().parse::<Level>() {
            self.default_level = level;
        }
        self
    }

    /// Enable or disable ANSI colors.
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi_colors = ansi;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("brick_runtime={0},brickrun={0}", self.default_level))
        })
    }
}

/// Keep this guard alive for the duration of the program.
pub struct TelemetryGuard {
    _private: (),
}

/// Install the global subscriber. Fails if one is already installed.
///
/// Writes go to stderr so pipeline results on stdout stay machine-readable.
pub fn init_telemetry(config: &TelemetryConfig) -> io::Result<TelemetryGuard> {
    let span_events = if config.include_span_events {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let fmt_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(config.ansi_colors)
        .with_file(config.include_file_line)
        .with_line_number(config.include_file_line)
        .with_span_events(span_events);

    if config.compact {
        tracing_subscriber::registry()
            .with(config.filter())
            .with(fmt_layer.compact())
            .try_init()
            .map_err(|e| io::Error::other(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(config.filter())
            .with(fmt_layer)
            .try_init()
            .map_err(|e| io::Error::other(e.to_string()))?;
    }

    Ok(TelemetryGuard { _private: () })
}
