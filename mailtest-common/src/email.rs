//! Decoding of raw mail bytes into a structured [`Email`] record.
//!
//! Decoding is a total function: malformed input never fails, missing
//! fields degrade to empty strings or empty lists. The only signal for
//! anything unusual is a logged warning when a custom property header
//! is skipped.

use std::collections::HashMap;

use mailparse::{MailAddr, MailHeaderMap, ParsedMail};
use tracing::warn;

use crate::PROP_HEADER_PREFIX;

/// Field names of the base record. Custom properties may not shadow
/// these.
const RESERVED_FIELDS: [&str; 5] = ["subject", "to", "from", "html", "text"];

/// A decoded email, immutable once constructed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Email {
    pub subject: String,
    pub to: Vec<String>,
    pub from: String,
    pub html: String,
    pub text: String,
    /// Values extracted from `X-MailTest-Prop-<name>` headers, keyed by
    /// the lower-cased name with the marker stripped.
    pub properties: HashMap<String, String>,
}

impl Email {
    /// Decode raw message bytes.
    ///
    /// Decoding the same bytes twice yields field-for-field identical
    /// records; nothing here depends on ambient state.
    #[must_use]
    pub fn decode(raw: &[u8]) -> Self {
        let Ok(parsed) = mailparse::parse_mail(raw) else {
            warn!("unparseable message, decoding to an empty email");
            return Self::default();
        };

        let mut email = Self {
            subject: parsed
                .headers
                .get_first_value("Subject")
                .unwrap_or_default(),
            to: addresses(&parsed, "To"),
            from: addresses(&parsed, "From").into_iter().next().unwrap_or_default(),
            ..Self::default()
        };

        collect_bodies(&parsed, &mut email);
        collect_properties(&parsed, &mut email.properties);

        email
    }

    /// Look up a field by name, the way a filter sees the record:
    /// base fields first, then custom properties.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "subject" => Some(&self.subject),
            "from" => Some(&self.from),
            "html" => Some(&self.html),
            "text" => Some(&self.text),
            _ => self.properties.get(name).map(String::as_str),
        }
    }
}

/// Flatten an address header (including groups) into plain address
/// strings. Absent or unparseable headers become an empty list.
fn addresses(parsed: &ParsedMail, header: &str) -> Vec<String> {
    parsed
        .headers
        .get_all_headers(header)
        .into_iter()
        .filter_map(|header| mailparse::addrparse_header(header).ok())
        .flat_map(|list| {
            list.iter()
                .flat_map(|addr| match addr {
                    MailAddr::Single(single) => vec![single.addr.clone()],
                    MailAddr::Group(group) => {
                        group.addrs.iter().map(|single| single.addr.clone()).collect()
                    }
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Walk the MIME tree and take the first text/html and text/plain
/// bodies found. A bare non-multipart message counts as its own part.
fn collect_bodies(part: &ParsedMail, email: &mut Email) {
    match part.ctype.mimetype.as_str() {
        "text/html" if email.html.is_empty() => {
            email.html = part.get_body().unwrap_or_default();
        }
        "text/plain" if email.text.is_empty() => {
            email.text = part.get_body().unwrap_or_default();
        }
        _ => {}
    }

    for subpart in &part.subparts {
        collect_bodies(subpart, email);
    }
}

fn collect_properties(parsed: &ParsedMail, properties: &mut HashMap<String, String>) {
    for header in &parsed.headers {
        let key = header.get_key().to_lowercase();
        let Some(name) = key.strip_prefix(PROP_HEADER_PREFIX) else {
            continue;
        };

        if name.is_empty() {
            warn!("skipping property header '{}': empty property name", header.get_key());
            continue;
        }

        if RESERVED_FIELDS.contains(&name) || properties.contains_key(name) {
            warn!("duplicate prop detected, skipping: {}", header.get_key());
            continue;
        }

        properties.insert(name.to_string(), header.get_value());
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const SIMPLE: &[u8] = b"From: Sender <sender@example.com>\r\n\
To: one@example.com, Two <two@example.com>\r\n\
Subject: Hi\r\n\
X-MailTest-Prop-Foo: bar\r\n\
\r\n\
plain body\r\n";

    #[test]
    fn decodes_addresses_and_subject() {
        let email = Email::decode(SIMPLE);

        assert_eq!(email.subject, "Hi");
        assert_eq!(email.from, "sender@example.com");
        assert_eq!(email.to, vec!["one@example.com", "two@example.com"]);
        assert_eq!(email.text.trim_end(), "plain body");
        assert_eq!(email.html, "");
    }

    #[test]
    fn decoding_is_pure() {
        assert_eq!(Email::decode(SIMPLE), Email::decode(SIMPLE));
    }

    #[test]
    fn custom_property_round_trip() {
        let email = Email::decode(SIMPLE);
        assert_eq!(email.properties.get("foo").map(String::as_str), Some("bar"));
    }

    #[test]
    fn property_colliding_with_base_field_is_dropped() {
        let raw = b"To: a@example.com\r\n\
X-MailTest-Prop-Subject: smuggled\r\n\
Subject: real\r\n\
\r\n\
body\r\n";
        let email = Email::decode(raw);

        assert_eq!(email.subject, "real");
        assert!(!email.properties.contains_key("subject"));
    }

    #[test]
    fn duplicate_property_keeps_first() {
        let raw = b"To: a@example.com\r\n\
X-MailTest-Prop-Foo: first\r\n\
X-MailTest-Prop-foo: second\r\n\
\r\n\
body\r\n";
        let email = Email::decode(raw);

        assert_eq!(email.properties.get("foo").map(String::as_str), Some("first"));
    }

    #[test]
    fn empty_property_name_is_dropped() {
        let raw = b"To: a@example.com\r\n\
X-MailTest-Prop-: nothing\r\n\
\r\n\
body\r\n";
        let email = Email::decode(raw);

        assert!(email.properties.is_empty());
    }

    #[test]
    fn marker_is_case_insensitive() {
        let raw = b"To: a@example.com\r\n\
x-MAILTEST-prop-Token: abc123\r\n\
\r\n\
body\r\n";
        let email = Email::decode(raw);

        assert_eq!(
            email.properties.get("token").map(String::as_str),
            Some("abc123")
        );
    }

    #[test]
    fn unrelated_headers_are_ignored() {
        let raw = b"To: a@example.com\r\n\
X-MailTest-Null-Baz: foo\r\n\
\r\n\
body\r\n";
        let email = Email::decode(raw);

        assert!(email.properties.is_empty());
    }

    #[test]
    fn missing_fields_degrade_to_empty() {
        let email = Email::decode(b"\r\n");

        assert_eq!(email.subject, "");
        assert_eq!(email.from, "");
        assert!(email.to.is_empty());
    }

    #[test]
    fn multipart_alternative_bodies() {
        let raw = b"From: s@example.com\r\n\
To: r@example.com\r\n\
Subject: multi\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"sep\"\r\n\
\r\n\
--sep\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
plain part\r\n\
--sep\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>html part</p>\r\n\
--sep--\r\n";
        let email = Email::decode(raw);

        assert_eq!(email.text.trim_end(), "plain part");
        assert_eq!(email.html.trim_end(), "<p>html part</p>");
    }

    #[test]
    fn field_lookup_covers_properties() {
        let email = Email::decode(SIMPLE);

        assert_eq!(email.field("subject"), Some("Hi"));
        assert_eq!(email.field("foo"), Some("bar"));
        assert_eq!(email.field("missing"), None);
    }
}
