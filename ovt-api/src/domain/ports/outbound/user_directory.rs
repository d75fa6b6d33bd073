//! User directory port (outbound).
//!
//! Narrow read contract over the user/settings store: the scheduler only
//! needs timezone names and per-report opt-ins, never full user rows.

use async_trait::async_trait;

use crate::domain::{
    models::{ReportKind, ReportRecipient},
    LedgerError,
};

#[async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    /// Every distinct IANA timezone name configured by at least one user.
    async fn all_time_zone_names(&self) -> Result<Vec<String>, LedgerError>;

    /// Users whose stored timezone is one of `zones` and whose opt-in flag
    /// for `kind` is enabled.
    async fn report_recipients(
        &self,
        kind: ReportKind,
        zones: &[String],
    ) -> Result<Vec<ReportRecipient>, LedgerError>;
}
