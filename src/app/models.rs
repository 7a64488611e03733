use std::path::PathBuf;

use serde::Serialize;

/// One table and its exact row count at the moment it was counted.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    pub row_count: u64,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotFound,
    PermissionDenied,
    Timeout,
}

impl SkipReason {
    pub fn describe(self) -> &'static str {
        match self {
            Self::NotFound => "dropped before it could be counted",
            Self::PermissionDenied => "permission denied",
            Self::Timeout => "count timed out",
        }
    }
}

/// A table listed by the catalog but left out of the report.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SkippedTable {
    pub name: String,
    pub reason: SkipReason,
}

// Separates the "Scanning" phase from the "Formatting" phase.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub schema: String,
    pub tables: Vec<TableDescriptor>,
    pub skipped: Vec<SkippedTable>,
}

impl Report {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }

    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.row_count).sum()
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct ServerInfo {
    pub database: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub version: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct ConnectionCheck {
    pub server: ServerInfo,
    pub report: Report,
}

#[derive(Serialize, Debug, Clone)]
pub struct SetupOutcome {
    pub database: String,
    pub created: bool,
    pub server: ServerInfo,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct NotebookStatus {
    pub name: String,
    /// Zero when the file does not exist.
    pub size_bytes: u64,
    pub ready: bool,
}

#[derive(Serialize, Debug, Clone)]
pub struct ProjectStatus {
    pub directory: PathBuf,
    pub notebooks: Vec<NotebookStatus>,
    pub visualizations: Vec<String>,
    pub report: Report,
}
