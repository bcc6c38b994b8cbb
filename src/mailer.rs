use anyhow::Result;
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::report::EmailReport;

/// Delivery boundary for the assembled report, so the run driver can be
/// tested without a mail server.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver(&self, recipients: &[String], report: &EmailReport) -> Result<()>;
}

/// SMTP delivery via lettre. Port 465 uses implicit TLS; everything else
/// goes through STARTTLS.
#[derive(Clone)]
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl Mailer {
    pub fn new(host: &str, port: u16, user: String, pass: String, from: &str) -> Result<Self> {
        let builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
        };
        let transport = builder
            .port(port)
            .credentials(Credentials::new(user, pass))
            .build();

        Ok(Self {
            transport,
            from: from.parse()?,
        })
    }
}

#[async_trait]
impl ReportSink for Mailer {
    async fn deliver(&self, recipients: &[String], report: &EmailReport) -> Result<()> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(report.subject.clone());
        for recipient in recipients {
            builder = builder.to(recipient.parse::<Mailbox>()?);
        }

        let message = builder.multipart(MultiPart::alternative_plain_html(
            report.text.clone(),
            report.html.clone(),
        ))?;

        self.transport.send(message).await?;
        Ok(())
    }
}
