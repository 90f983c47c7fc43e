//! Persistence targets for captured artifacts.
//!
//! The primary sink is a linked directory written with create-or-overwrite
//! semantics. The fallback sink delivers into a downloads directory and,
//! like a browser download, resolves name collisions by suffixing.

use crate::error::SinkError;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument, warn};

/// Where an artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    /// Which sink stored it
    pub sink: SinkKind,
    /// Final location, after any collision suffixing
    pub path: PathBuf,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Primary,
    Fallback,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::Primary => "primary",
            SinkKind::Fallback => "fallback",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A target that accepts encoded artifact bytes under a filename.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn deliver(&self, filename: &str, bytes: &[u8]) -> Result<ArtifactRef, SinkError>;

    fn describe(&self) -> String;
}

/// Primary sink: a directory the operator linked for direct saves.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactSink for DirectorySink {
    #[instrument(skip(self, bytes), fields(root = %self.root.display()))]
    async fn deliver(&self, filename: &str, bytes: &[u8]) -> Result<ArtifactRef, SinkError> {
        // The handle only grants access to an existing location.
        if !fs::try_exists(&self.root).await.unwrap_or(false) {
            return Err(SinkError::Revoked(format!(
                "{} is no longer reachable",
                self.root.display()
            )));
        }

        let path = self.root.join(sanitize_filename(filename));
        fs::write(&path, bytes).await.map_err(|source| SinkError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), size_bytes = bytes.len(), "Artifact written to directory");
        Ok(ArtifactRef {
            sink: SinkKind::Primary,
            path,
            size_bytes: bytes.len(),
        })
    }

    fn describe(&self) -> String {
        format!("directory:{}", self.root.display())
    }
}

/// Fallback sink: hands the bytes to the user through a downloads directory.
#[derive(Debug, Clone)]
pub struct DownloadSink {
    dir: PathBuf,
}

impl DownloadSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ArtifactSink for DownloadSink {
    #[instrument(skip(self, bytes), fields(dir = %self.dir.display()))]
    async fn deliver(&self, filename: &str, bytes: &[u8]) -> Result<ArtifactRef, SinkError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SinkError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let filename = sanitize_filename(filename);
        let mut attempt = 0u32;
        loop {
            let path = self.dir.join(suffixed(&filename, attempt));
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    if let Err(source) = fill_new_file(file, &path, bytes).await {
                        return Err(SinkError::Io { path, source });
                    }

                    debug!(path = %path.display(), size_bytes = bytes.len(), "Artifact delivered");
                    return Ok(ArtifactRef {
                        sink: SinkKind::Fallback,
                        path,
                        size_bytes: bytes.len(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => return Err(SinkError::Io { path, source }),
            }
        }
    }

    fn describe(&self) -> String {
        format!("downloads:{}", self.dir.display())
    }
}

/// Write `bytes` into a file just created at `path`, removing it on failure
/// so no truncated artifact is left behind.
async fn fill_new_file<W>(mut file: W, path: &Path, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        file.write_all(bytes).await?;
        file.flush().await
    }
    .await;

    if let Err(e) = written {
        drop(file);
        if let Err(remove) = fs::remove_file(path).await {
            warn!(path = %path.display(), error = %remove, "Failed to remove partial artifact");
        }
        return Err(e);
    }
    Ok(())
}

/// `name.png`, `name (1).png`, `name (2).png`, ...
fn suffixed(filename: &str, attempt: u32) -> String {
    if attempt == 0 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, ext)) => format!("{} ({}).{}", stem, attempt, ext),
        None => format!("{} ({})", filename, attempt),
    }
}

/// Keep filenames inside the sink root.
fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}
