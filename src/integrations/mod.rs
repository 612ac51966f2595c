//! Enterprise exports to Monday.com, Smartsheet, Google Sheets and
//! Microsoft 365, with per-user tokens encrypted at rest.

mod client;
pub mod handlers;
mod oauth;
mod platforms;
mod service;
mod vault;

pub use client::{ExportResult, HttpExporter, PlatformExporter};
pub use oauth::PlatformAuthorizer;
pub use platforms::Platform;
pub use service::{ConnectionStatus, IntegrationService};
pub use vault::{SealedToken, TokenVault};
