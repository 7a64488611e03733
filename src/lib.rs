pub mod app;

// Re-export useful types for library users
pub use app::config::{AppConfig, DbSettings, QueryTimeouts};
pub use app::error::{QueryPhase, ReportError};
pub use app::formatter::{OutputGenerator, group_thousands};
pub use app::inspector::{Inspector, count_query, quote_identifier};
pub use app::models::{Report, SkipReason, SkippedTable, TableDescriptor};
pub use app::{connect, generate_report};
