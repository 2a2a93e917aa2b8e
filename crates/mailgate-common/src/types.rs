//! Common types for Mailgate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for messages in flight
pub type MessageId = Uuid;

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Parse an email address, accepting the `<user@domain>` envelope form.
    ///
    /// The domain is normalized to lowercase.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().trim_start_matches('<').trim_end_matches('>');
        let at = s.rfind('@')?;
        let (local, domain) = (&s[..at], &s[at + 1..]);
        if local.is_empty() || domain.is_empty() {
            return None;
        }
        Some(Self::new(local, domain.to_lowercase()))
    }

    /// Returns true for the null reverse-path (`<>` or an empty MAIL FROM)
    pub fn is_null_sender(s: &str) -> bool {
        let s = s.trim();
        s.is_empty() || s == "<>"
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Validation("Invalid email address".to_string()))
    }
}

/// Connection-level facts about the SMTP session a message arrived on
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnInfo {
    /// Remote address, absent for locally generated messages
    pub client_ip: Option<IpAddr>,
    /// HELO/EHLO hostname
    pub helo: Option<String>,
    /// Whether the session negotiated TLS
    #[serde(default)]
    pub tls: bool,
    /// Whether the client authenticated
    #[serde(default)]
    pub authenticated: bool,
}

/// Metadata of a single message, immutable once the pipeline has created it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsgMetadata {
    pub id: MessageId,
    pub conn: Option<ConnInfo>,
    /// Envelope sender as given by the client
    pub original_from: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl MsgMetadata {
    /// Create metadata for a new message with a fresh identifier
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            conn: None,
            original_from: None,
            received_at: Utc::now(),
        }
    }

    /// Attach connection info
    pub fn with_conn(mut self, conn: ConnInfo) -> Self {
        self.conn = Some(conn);
        self
    }

    /// Set the envelope sender
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.original_from = Some(from.into());
        self
    }

    /// Remote IP of the originating connection, if any
    pub fn client_ip(&self) -> Option<IpAddr> {
        self.conn.as_ref().and_then(|c| c.client_ip)
    }
}

impl Default for MsgMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Message header, kept in wire order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    fields: Vec<(String, String)>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// First value of a field, matched case-insensitively
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a field, in order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Message body buffer.
///
/// Cloning is cheap, the bytes are shared.
#[derive(Debug, Clone, Default)]
pub struct Body {
    data: Arc<[u8]>,
}

impl Body {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<u8>> for Body {
    fn from(data: Vec<u8>) -> Self {
        Self { data: data.into() }
    }
}

impl From<&str> for Body {
    fn from(data: &str) -> Self {
        Self {
            data: data.as_bytes().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_email_address() {
        let addr = EmailAddress::parse("<User@Example.COM>").unwrap();
        assert_eq!(addr.local, "User");
        assert_eq!(addr.domain, "example.com");
        assert_eq!(addr.to_string(), "User@example.com");

        assert!(EmailAddress::parse("nodomain").is_none());
        assert!(EmailAddress::parse("@example.com").is_none());
        assert!(EmailAddress::parse("").is_none());
    }

    #[test]
    fn test_null_sender() {
        assert!(EmailAddress::is_null_sender("<>"));
        assert!(EmailAddress::is_null_sender(""));
        assert!(!EmailAddress::is_null_sender("a@b.c"));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut header = Header::new();
        header.add("Received", "from a");
        header.add("Subject", "hello");
        header.add("received", "from b");

        assert_eq!(header.get("SUBJECT"), Some("hello"));
        assert_eq!(header.get_all("Received").collect::<Vec<_>>(), vec!["from a", "from b"]);
        assert_eq!(header.len(), 3);
    }

    #[test]
    fn test_metadata_ids_are_unique() {
        let a = MsgMetadata::new();
        let b = MsgMetadata::new();
        assert_ne!(a.id, b.id);
        assert!(a.client_ip().is_none());
    }
}
