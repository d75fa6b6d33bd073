//! Mail transport port (outbound).

use async_trait::async_trait;

use crate::domain::{
    models::{PeriodReport, ReportRecipient},
    LedgerError,
};

/// Outbound port for report delivery.
///
/// The transport receives a fully assembled report context; template
/// rendering is the collaborator's concern.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(
        &self,
        recipient: &ReportRecipient,
        report: &PeriodReport,
    ) -> Result<(), LedgerError>;
}
