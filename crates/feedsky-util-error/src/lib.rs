//! Helpers for rendering errors in log lines.
//!
//! `tracing` fields only show the outermost `Display` of an error, which for
//! snafu context errors is usually just "Failed to ...". [`FmtCompact`] walks
//! the whole `source()` chain and joins it on a single line.

use std::{error, fmt};

/// Displays an error followed by all its sources, separated by `: `.
pub struct ErrorChain<'e>(&'e (dyn error::Error + 'e));

impl fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;

        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, ": {err}")?;
            source = err.source();
        }

        Ok(())
    }
}

pub trait FmtCompact<'a> {
    type Report: fmt::Display + 'a;
    fn fmt_compact(self) -> Self::Report;
}

impl<'e, E> FmtCompact<'e> for &'e E
where
    E: error::Error,
{
    type Report = ErrorChain<'e>;

    fn fmt_compact(self) -> Self::Report {
        ErrorChain(self)
    }
}
