//! # Logging module
//!
//! This module provides logging facilities and helpers

use std::io;

use tracing::Level;

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to set global default subscriber, {0}")]
    GlobalDefaultSubscriber(tracing::subscriber::SetGlobalDefaultError),
}

// -----------------------------------------------------------------------------
// helpers

pub const fn level(verbosity: usize) -> Level {
    match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

// Diagnostics go to the standard error, the reconciliation report owns the
// standard output.
pub fn initialize(verbosity: usize) -> Result<(), Error> {
    tracing::subscriber::set_global_default(
        tracing_subscriber::fmt()
            .with_max_level(level(verbosity))
            .with_writer(io::stderr)
            .with_target(true)
            .finish(),
    )
    .map_err(Error::GlobalDefaultSubscriber)
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::level;

    #[test]
    fn level_should_map_verbosity_occurrences() {
        assert_eq!(Level::ERROR, level(0));
        assert_eq!(Level::WARN, level(1));
        assert_eq!(Level::INFO, level(2));
        assert_eq!(Level::DEBUG, level(3));
        assert_eq!(Level::TRACE, level(4));
        assert_eq!(Level::TRACE, level(42));
    }
}
