use crate::invariants::{FileId, Timestamp};

/// One parsed access-log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLogLine {
    pub remote_addr: String,
    pub timestamp: Timestamp,
    pub method: String,
    pub path: String,
    pub protocol: Option<String>,
    pub status: u16,
    pub bytes: u64,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
}

/// A successful request for a file matching the configured criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadEvent {
    pub file: FileId,
    pub timestamp: Timestamp,
}
