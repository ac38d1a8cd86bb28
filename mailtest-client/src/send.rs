//! Outbound test mail.
//!
//! The sender speaks real SMTP to the relay through a pooled lettre
//! transport, the same way application code under test would. Messages
//! are assembled by hand so arbitrary `X-MailTest-Prop-*` headers can
//! ride along.

use lettre::{
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    address::Envelope,
    transport::smtp::PoolConfig,
};
use mailtest_common::{config::Config, internal};

use crate::error::ClientError;

/// A message to push through the relay.
///
/// [`TestMail::default`] is a fully-formed message with a plain-text
/// part, an HTML part carrying a `data-testid="cta-link"` anchor, and a
/// pair of custom property headers, so most tests only override the
/// recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestMail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
    /// Extra headers, sent verbatim. Property headers use the
    /// `X-MailTest-Prop-` prefix.
    pub headers: Vec<(String, String)>,
}

impl Default for TestMail {
    fn default() -> Self {
        Self {
            from: "from@example.com".to_string(),
            to: vec!["to@example.com".to_string()],
            subject: "Hi, Subject here!".to_string(),
            text: "Hello! This is a test message.".to_string(),
            html: concat!(
                "<html><body>",
                "<p>Hello! This is a test message.</p>",
                r#"<a data-testid="cta-link" href="https://example.com/cta">Click me</a>"#,
                "</body></html>",
            )
            .to_string(),
            headers: vec![
                ("X-MailTest-Prop-Foo".to_string(), "bar".to_string()),
                ("X-MailTest-Prop-Bar".to_string(), "baz".to_string()),
                ("X-MailTest-Null-Baz".to_string(), "foo".to_string()),
            ],
        }
    }
}

impl TestMail {
    /// The default message readdressed to a single recipient.
    #[must_use]
    pub fn to(recipient: impl Into<String>) -> Self {
        Self {
            to: vec![recipient.into()],
            ..Self::default()
        }
    }

    /// Attach a custom property, readable on the receiving side via
    /// `Email::field`.
    #[must_use]
    pub fn with_property(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .push((format!("X-MailTest-Prop-{name}"), value.into()));
        self
    }

    /// Assemble the raw RFC 5322 message. Two non-empty bodies become a
    /// `multipart/alternative`, one becomes a single-part message.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();

        out.push_str(&format!("From: {}\r\n", self.from));
        out.push_str(&format!("To: {}\r\n", self.to.join(", ")));
        out.push_str(&format!("Subject: {}\r\n", self.subject));
        for (name, value) in &self.headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("MIME-Version: 1.0\r\n");

        match (self.text.is_empty(), self.html.is_empty()) {
            (false, false) => {
                let boundary = format!("mailtest-{:016x}", rand::random::<u64>());
                out.push_str(&format!(
                    "Content-Type: multipart/alternative; boundary=\"{boundary}\"\r\n\r\n"
                ));
                out.push_str(&format!("--{boundary}\r\n"));
                out.push_str("Content-Type: text/plain; charset=utf-8\r\n\r\n");
                out.push_str(&self.text);
                out.push_str(&format!("\r\n--{boundary}\r\n"));
                out.push_str("Content-Type: text/html; charset=utf-8\r\n\r\n");
                out.push_str(&self.html);
                out.push_str(&format!("\r\n--{boundary}--\r\n"));
            }
            (false, true) => {
                out.push_str("Content-Type: text/plain; charset=utf-8\r\n\r\n");
                out.push_str(&self.text);
                out.push_str("\r\n");
            }
            (true, _) => {
                out.push_str("Content-Type: text/html; charset=utf-8\r\n\r\n");
                out.push_str(&self.html);
                out.push_str("\r\n");
            }
        }

        out.into_bytes()
    }

    fn envelope(&self) -> Result<Envelope, ClientError> {
        let from = self.from.parse()?;
        let to = self
            .to
            .iter()
            .map(|recipient| recipient.parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Envelope::new(Some(from), to)?)
    }
}

/// A pooled SMTP connection to the relay.
pub struct MailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    port: u16,
}

impl MailSender {
    /// A sender pointed at the relay's SMTP port, with the pool sized
    /// per the configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous("127.0.0.1")
            .port(config.smtp_port())
            .pool_config(PoolConfig::new().max_size(config.pool_size()))
            .build();

        Self {
            transport,
            port: config.smtp_port(),
        }
    }

    /// Submit one message. Resolves once the relay has accepted it;
    /// delivery to listeners happens after that, asynchronously.
    pub async fn send(&self, mail: &TestMail) -> Result<(), ClientError> {
        let envelope = mail.envelope()?;
        self.transport.send_raw(&envelope, &mail.to_bytes()).await?;
        internal!(
            level = DEBUG,
            "submitted mail for {:?} via port {}",
            mail.to,
            self.port
        );
        Ok(())
    }
}
