/// Sender/recipient metadata of one SMTP transaction, distinct from the
/// parsed message body. Built once per inbound message from session
/// state; immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    from: String,
    recipients: Vec<String>,
}

impl Envelope {
    #[must_use]
    pub fn new(from: impl Into<String>, recipients: Vec<String>) -> Self {
        Self {
            from: from.into(),
            recipients,
        }
    }

    /// The reverse-path given in MAIL FROM, or empty when absent.
    #[inline]
    #[must_use]
    pub fn from(&self) -> &str {
        &self.from
    }

    /// The forward-paths given in RCPT TO, in the order received.
    #[inline]
    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }
}
