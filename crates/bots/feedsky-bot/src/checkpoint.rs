//! The only persistent state: when the last processed entry was published.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use snafu::{ResultExt as _, Snafu};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, UtcOffset};
use tracing::debug;

pub const DEFAULT_CHECKPOINT_FILE: &str = ".timestamp";

const LOG_TARGET: &str = "feedsky_bot::checkpoint";

#[derive(Debug, Snafu)]
pub enum CheckpointError {
    #[snafu(display("Checkpoint file {} does not exist", path.display()))]
    Missing { path: PathBuf },
    #[snafu(display("Checkpoint file {} I/O error", path.display()))]
    Io { path: PathBuf, source: io::Error },
    #[snafu(display("Invalid checkpoint timestamp {raw:?}"))]
    Parse {
        raw: String,
        source: time::error::Parse,
    },
    #[snafu(display("Can't format checkpoint timestamp"))]
    Format { source: time::error::Format },
}

pub type CheckpointResult<T> = std::result::Result<T, CheckpointError>;

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the checkpoint. A missing file is an error, there is no default.
    pub async fn read(&self) -> CheckpointResult<OffsetDateTime> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return MissingSnafu { path: &self.path }.fail();
            }
            Err(err) => return Err(err).context(IoSnafu { path: &self.path }),
        };

        let ts = parse_checkpoint(raw.trim())?;
        debug!(target: LOG_TARGET, path = %self.path.display(), %ts, "Read checkpoint");
        Ok(ts)
    }

    /// Replace the checkpoint.
    ///
    /// Writes a sibling temporary file and renames it over the old one, so
    /// readers only ever see the old or the new timestamp.
    pub async fn write(&self, ts: OffsetDateTime) -> CheckpointResult<()> {
        let formatted = format_checkpoint(ts)?;
        let tmp_path = self.tmp_path();

        tokio::fs::write(&tmp_path, format!("{formatted}\n"))
            .await
            .context(IoSnafu { path: &tmp_path })?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .context(IoSnafu { path: &self.path })?;

        debug!(target: LOG_TARGET, path = %self.path.display(), ts = %formatted, "Wrote checkpoint");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("checkpoint"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Accepts RFC 3339 (what we write, and what `Date.toISOString()` produces)
/// and falls back to the more lenient ISO 8601 parser.
pub fn parse_checkpoint(raw: &str) -> CheckpointResult<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(raw, &Iso8601::DEFAULT))
        .context(ParseSnafu { raw })
}

pub fn format_checkpoint(ts: OffsetDateTime) -> CheckpointResult<String> {
    ts.to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .context(FormatSnafu)
}
