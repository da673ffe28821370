//! Append-only log of vendor fetch failures.
//!
//! One line per failure, tab separated:
//!
//! ```text
//! 1729300000	503	https://st.kp.yandex.net/images/film_big/1.jpg
//! 1729300042	connection error: dns error	https://...
//! ```
//!
//! Operators read and clear it through the admin endpoints.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Default log location, relative to the working directory.
pub const DEFAULT_FAILED_URLS_PATH: &str = "failed_urls.txt";

/// File-backed failure log. Writes are serialized within the process.
pub struct FailedUrlLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FailedUrlLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one failure. `reason` is a status code or error description.
    pub async fn record(&self, url: &str, reason: &str) -> io::Result<()> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let line = format!("{}\t{}\t{}\n", timestamp, single_line(reason), single_line(url));

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// The whole log, or `None` if nothing has been recorded yet.
    pub async fn read(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Empty the log, keeping the file.
    pub async fn clear(&self) -> io::Result<()> {
        let _guard = self.write_lock.lock().await;
        fs::write(&self.path, b"").await
    }
}

/// Keep one record per line.
fn single_line(s: &str) -> String {
    s.replace(['\n', '\r', '\t'], " ")
}
