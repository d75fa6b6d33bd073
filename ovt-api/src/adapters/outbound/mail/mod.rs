use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::config::MailSettings;
use crate::domain::{
    models::{format_signed_minutes, PeriodReport, ReportRecipient},
    ports::outbound::Mailer,
    LedgerError,
};

/// Mail delivery through an HTTP transactional-mail API.
pub struct HttpMailer {
    client: Client,
    endpoint: String,
    api_token: String,
    sender: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MailPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: String,
    text_body: String,
    #[serde(flatten)]
    report: &'a PeriodReport,
}

impl HttpMailer {
    pub fn new(settings: &MailSettings) -> Self {
        Self {
            client: Client::new(),
            endpoint: settings.endpoint.clone(),
            api_token: settings.api_token.clone(),
            sender: settings.sender.clone(),
        }
    }

    fn render_text(recipient: &ReportRecipient, report: &PeriodReport) -> String {
        let mut lines = vec![
            format!("Hi {},", recipient.username),
            String::new(),
            format!(
                "Net total this period: {}",
                format_signed_minutes(report.statistics.total_duration)
            ),
            format!(
                "Overtime: {} entries, {}",
                report.statistics.overtime_count,
                format_signed_minutes(report.statistics.overtime_duration)
            ),
            format!(
                "Recovery: {} entries, {}",
                report.statistics.recovery_count,
                format_signed_minutes(-report.statistics.recovery_duration)
            ),
            format!(
                "Year-to-date balance: {}",
                format_signed_minutes(report.balance)
            ),
        ];

        if !report.records.is_empty() {
            lines.push(String::new());
            lines.push("Entries:".to_string());
            for record in &report.records {
                let note = record.note.as_deref().unwrap_or("");
                lines.push(format!(
                    "  {} {:>8} {} {}",
                    record.date,
                    format_signed_minutes(record.signed_duration()),
                    record.kind,
                    note
                ));
            }
        }

        lines.join("\n")
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(
        &self,
        recipient: &ReportRecipient,
        report: &PeriodReport,
    ) -> Result<(), LedgerError> {
        let payload = MailPayload {
            from: &self.sender,
            to: recipient.email.as_str(),
            subject: report.subject(),
            text_body: Self::render_text(recipient, report),
            report,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| LedgerError::Mail(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::Mail(format!(
                "mail API returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
