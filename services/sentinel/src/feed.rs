//! Line-oriented snapshot feed.
//!
//! Each line is either a JSON snapshot object or an operator command
//! prefixed with `:` (`:camera on`, `:camera off`, `:link <dir>`, `:unlink`).
//! Both kinds travel on one channel so a command takes effect before the
//! snapshots that follow it. A snapshot line that cannot be decoded is still
//! reduced as an empty snapshot; unknown commands are logged and skipped.

use crate::session::SessionCommand;
use crate::state::PartialSnapshot;
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(#[from] serde_json::Error),

    #[error("Malformed snapshot: expected a JSON object")]
    NotAnObject,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

/// One parsed feed line.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    Snapshot(PartialSnapshot),
    Command(SessionCommand),
}

/// Statistics for one feed run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeedStats {
    /// Snapshots forwarded, malformed ones included
    pub snapshots: u64,
    pub commands: u64,
    /// Snapshot lines that were not a JSON object
    pub malformed: u64,
    /// Unknown commands
    pub rejected: u64,
}

/// Parse a single non-blank line.
pub fn parse_line(line: &str) -> Result<FeedItem, FeedError> {
    let line = line.trim();
    if let Some(command) = line.strip_prefix(':') {
        return parse_command(command.trim()).map(FeedItem::Command);
    }
    parse_snapshot(line).map(FeedItem::Snapshot)
}

/// Decode a snapshot object, dropping only the fields with invalid values.
pub fn parse_snapshot(line: &str) -> Result<PartialSnapshot, FeedError> {
    let Value::Object(fields) = serde_json::from_str::<Value>(line)? else {
        return Err(FeedError::NotAnObject);
    };

    let (snapshot, rejected) = PartialSnapshot::from_fields(fields);
    if !rejected.is_empty() {
        warn!(fields = ?rejected, "Dropped snapshot fields with invalid values");
    }
    Ok(snapshot)
}

fn parse_command(command: &str) -> Result<SessionCommand, FeedError> {
    let (verb, rest) = match command.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (command, ""),
    };

    match (verb, rest) {
        ("camera", "on") => Ok(SessionCommand::StartCamera),
        ("camera", "off") => Ok(SessionCommand::StopCamera),
        ("link", dir) if !dir.is_empty() => Ok(SessionCommand::LinkDirectory(PathBuf::from(dir))),
        ("unlink", "") => Ok(SessionCommand::UnlinkDirectory),
        _ => Err(FeedError::UnknownCommand(command.to_string())),
    }
}

/// Read `reader` to the end, forwarding every item in line order.
///
/// Returns early if the receiver is gone.
pub async fn run_feed<R>(reader: R, items: mpsc::Sender<FeedItem>) -> std::io::Result<FeedStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = FeedStats::default();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let item = match parse_line(&line) {
            Ok(item) => item,
            Err(FeedError::UnknownCommand(command)) => {
                stats.rejected += 1;
                warn!(command = %command, "Skipping unknown command");
                continue;
            }
            Err(e) => {
                stats.malformed += 1;
                warn!(error = %e, "Reducing malformed line as an empty snapshot");
                FeedItem::Snapshot(PartialSnapshot::default())
            }
        };

        match &item {
            FeedItem::Snapshot(_) => stats.snapshots += 1,
            FeedItem::Command(_) => stats.commands += 1,
        }
        if items.send(item).await.is_err() {
            debug!("Feed receiver dropped, stopping feed");
            break;
        }
    }

    info!(
        snapshots = stats.snapshots,
        commands = stats.commands,
        malformed = stats.malformed,
        rejected = stats.rejected,
        "Feed finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SensorState;

    #[test]
    fn test_parse_snapshot_line() {
        match parse_line(r#"{"pir": "ACTIVE", "online": true}"#).unwrap() {
            FeedItem::Snapshot(s) => {
                assert_eq!(s.pir, Some(SensorState::Active));
                assert_eq!(s.online, Some(true));
            }
            other => panic!("Expected snapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_line(":camera on").unwrap(),
            FeedItem::Command(SessionCommand::StartCamera)
        );
        assert_eq!(
            parse_line(": camera off").unwrap(),
            FeedItem::Command(SessionCommand::StopCamera)
        );
        assert_eq!(
            parse_line(":link /srv/evidence").unwrap(),
            FeedItem::Command(SessionCommand::LinkDirectory(PathBuf::from("/srv/evidence")))
        );
        assert_eq!(
            parse_line(":unlink").unwrap(),
            FeedItem::Command(SessionCommand::UnlinkDirectory)
        );
        assert!(matches!(
            parse_line(":link"),
            Err(FeedError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_non_object_lines_are_malformed() {
        assert!(matches!(
            parse_line("{not json"),
            Err(FeedError::MalformedSnapshot(_))
        ));
        assert!(matches!(parse_line("[1, 2]"), Err(FeedError::NotAnObject)));
    }

    #[test]
    fn test_invalid_field_keeps_rest_of_snapshot() {
        match parse_line(r#"{"pir": "ACTIVE", "smoke": "high"}"#).unwrap() {
            FeedItem::Snapshot(s) => {
                assert_eq!(s.pir, Some(SensorState::Active));
                assert_eq!(s.smoke, None);
            }
            other => panic!("Expected snapshot, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_feed_keeps_line_order() {
        let input = b"{\"online\": true}\n\n:camera on\ngarbage\n:reboot\n{\"pir\": \"ACTIVE\"}\n";
        let (tx, mut rx) = mpsc::channel(8);

        let stats = run_feed(&input[..], tx).await.unwrap();

        assert_eq!(
            stats,
            FeedStats {
                snapshots: 3,
                commands: 1,
                malformed: 1,
                rejected: 1,
            }
        );
        assert_eq!(
            rx.recv().await,
            Some(FeedItem::Snapshot(PartialSnapshot::default().with_online(true)))
        );
        assert_eq!(rx.recv().await, Some(FeedItem::Command(SessionCommand::StartCamera)));
        assert_eq!(rx.recv().await, Some(FeedItem::Snapshot(PartialSnapshot::default())));
        assert_eq!(
            rx.recv().await,
            Some(FeedItem::Snapshot(PartialSnapshot::default().with_pir(SensorState::Active)))
        );
        assert!(rx.recv().await.is_none());
    }
}
