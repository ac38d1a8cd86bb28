//! Parsing of inbound SMTP command lines.

use core::fmt::{self, Display, Formatter};

/// A single SMTP command, as received from a sender.
///
/// AUTH and STARTTLS are deliberately not part of the accepted set;
/// the relay takes unauthenticated, unencrypted submissions only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Helo(String),
    Ehlo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    Rset,
    Noop,
    Quit,
    /// A syntactically recognisable command the relay does not offer.
    Unsupported(String),
    /// Anything else.
    Invalid(String),
}

impl Command {
    /// Parse one command line, without its trailing CRLF.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (verb, rest) = line
            .split_once(' ')
            .map_or((line, ""), |(verb, rest)| (verb, rest.trim()));

        match verb.to_ascii_uppercase().as_str() {
            "HELO" => Self::Helo(rest.to_string()),
            "EHLO" => Self::Ehlo(rest.to_string()),
            "MAIL" => Self::path(rest, "FROM:").map_or_else(
                || Self::Invalid(line.to_string()),
                Self::MailFrom,
            ),
            "RCPT" => Self::path(rest, "TO:")
                .map_or_else(|| Self::Invalid(line.to_string()), Self::RcptTo),
            "DATA" => Self::Data,
            "RSET" => Self::Rset,
            "NOOP" => Self::Noop,
            "QUIT" => Self::Quit,
            "AUTH" | "STARTTLS" => Self::Unsupported(verb.to_ascii_uppercase()),
            _ => Self::Invalid(line.to_string()),
        }
    }

    /// Extract the address from a `FROM:<path>` / `TO:<path>` argument.
    /// ESMTP parameters after the path are accepted and discarded. The
    /// address itself is kept raw; namespace matching is case-sensitive
    /// on whatever the sender supplied.
    fn path(rest: &str, marker: &str) -> Option<String> {
        let rest = rest.trim();
        let head = rest.get(..marker.len())?;
        if !head.eq_ignore_ascii_case(marker) {
            return None;
        }

        let path = rest[marker.len()..].trim();
        let path = path.split_whitespace().next().unwrap_or(path);

        let address = path
            .strip_prefix('<')
            .and_then(|path| path.strip_suffix('>'))
            .unwrap_or(path);

        Some(address.to_string())
    }
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(id) => write!(fmt, "HELO {id}"),
            Self::Ehlo(id) => write!(fmt, "EHLO {id}"),
            Self::MailFrom(address) => write!(fmt, "MAIL FROM:<{address}>"),
            Self::RcptTo(address) => write!(fmt, "RCPT TO:<{address}>"),
            Self::Data => fmt.write_str("DATA"),
            Self::Rset => fmt.write_str("RSET"),
            Self::Noop => fmt.write_str("NOOP"),
            Self::Quit => fmt.write_str("QUIT"),
            Self::Unsupported(verb) => write!(fmt, "{verb}"),
            Self::Invalid(line) => write!(fmt, "{line}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_the_basic_verbs() {
        assert_eq!(
            Command::parse("HELO client.example.com"),
            Command::Helo("client.example.com".to_string())
        );
        assert_eq!(Command::parse("DATA"), Command::Data);
        assert_eq!(Command::parse("QUIT"), Command::Quit);
        assert_eq!(Command::parse("rset"), Command::Rset);
        assert_eq!(Command::parse("NOOP"), Command::Noop);
    }

    #[test]
    fn extracts_bracketed_paths() {
        assert_eq!(
            Command::parse("MAIL FROM:<sender@example.com>"),
            Command::MailFrom("sender@example.com".to_string())
        );
        assert_eq!(
            Command::parse("RCPT TO:<w1user@example.com>"),
            Command::RcptTo("w1user@example.com".to_string())
        );
    }

    #[test]
    fn accepts_unbracketed_paths_and_parameters() {
        assert_eq!(
            Command::parse("MAIL FROM: sender@example.com"),
            Command::MailFrom("sender@example.com".to_string())
        );
        assert_eq!(
            Command::parse("MAIL FROM:<sender@example.com> SIZE=1024"),
            Command::MailFrom("sender@example.com".to_string())
        );
    }

    #[test]
    fn preserves_address_case() {
        assert_eq!(
            Command::parse("RCPT TO:<W1User@Example.Com>"),
            Command::RcptTo("W1User@Example.Com".to_string())
        );
    }

    #[test]
    fn rejects_disabled_commands() {
        assert_eq!(
            Command::parse("AUTH LOGIN"),
            Command::Unsupported("AUTH".to_string())
        );
        assert_eq!(
            Command::parse("STARTTLS"),
            Command::Unsupported("STARTTLS".to_string())
        );
    }

    #[test]
    fn anything_else_is_invalid() {
        assert_eq!(
            Command::parse("VRFY someone"),
            Command::Invalid("VRFY someone".to_string())
        );
        assert_eq!(
            Command::parse("MAIL TO:<x@y>"),
            Command::Invalid("MAIL TO:<x@y>".to_string())
        );
    }
}
