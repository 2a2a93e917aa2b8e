//! DNS resolver used by checks
//!
//! Checks only see the [`Resolver`] trait. [`DnsResolver`] backs it with
//! trust-dns in production; tests substitute fakes.

use async_trait::async_trait;
use mailgate_common::config::DnsConfig;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::TokioAsyncResolver;

/// Lookup failure as seen by a check
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The name exists but has no records of the requested type, or does not exist
    #[error("no records found for {0}")]
    NotFound(String),

    /// Timeout, SERVFAIL, network error and similar
    #[error("DNS lookup failed for {name}: {reason}")]
    Failed { name: String, reason: String },
}

impl ResolveError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolveError::NotFound(_))
    }

    fn from_trust_dns(name: &str, err: trust_dns_resolver::error::ResolveError) -> Self {
        match err.kind() {
            ResolveErrorKind::NoRecordsFound { .. } => ResolveError::NotFound(name.to_string()),
            _ => ResolveError::Failed {
                name: name.to_string(),
                reason: err.to_string(),
            },
        }
    }
}

/// MX record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxRecord {
    pub preference: u16,
    /// Exchange host, without the trailing dot
    pub exchange: String,
}

/// DNS lookups available to checks
#[async_trait]
pub trait Resolver: Send + Sync {
    /// MX records of `domain`, sorted by preference
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, ResolveError>;

    /// TXT records of `domain`, each with its character-strings concatenated
    async fn lookup_txt(&self, domain: &str) -> Result<Vec<String>, ResolveError>;

    /// A and AAAA records of `host`
    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError>;

    /// PTR names of `ip`, without the trailing dot
    async fn lookup_ptr(&self, ip: IpAddr) -> Result<Vec<String>, ResolveError>;
}

/// trust-dns backed resolver
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
}

impl DnsResolver {
    /// Build a resolver from the `[dns]` section
    pub fn from_config(config: &DnsConfig) -> mailgate_common::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);

        let resolver = if config.system {
            let (resolver_config, mut opts) = trust_dns_resolver::system_conf::read_system_conf()
                .map_err(|e| {
                    mailgate_common::Error::Dns(format!("Failed to read system resolver config: {}", e))
                })?;
            opts.timeout = timeout;
            TokioAsyncResolver::tokio(resolver_config, opts)
        } else {
            if config.nameservers.is_empty() {
                return Err(mailgate_common::Error::Config(
                    "dns: nameservers must not be empty when system = false".to_string(),
                ));
            }

            let mut group = NameServerConfigGroup::new();
            for ns in &config.nameservers {
                let addr = parse_nameserver(ns).ok_or_else(|| {
                    mailgate_common::Error::Config(format!("dns: invalid nameserver '{}'", ns))
                })?;
                group.merge(NameServerConfigGroup::from_ips_clear(&[addr.ip()], addr.port(), true));
            }
            let resolver_config = ResolverConfig::from_parts(None, Vec::new(), group);

            let mut opts = ResolverOpts::default();
            opts.timeout = timeout;
            TokioAsyncResolver::tokio(resolver_config, opts)
        };

        Ok(Self { resolver })
    }

    /// Wrap an existing trust-dns resolver
    pub fn with_resolver(resolver: TokioAsyncResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Resolver for DnsResolver {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, ResolveError> {
        let lookup = self
            .resolver
            .mx_lookup(domain)
            .await
            .map_err(|e| ResolveError::from_trust_dns(domain, e))?;

        let mut records: Vec<MxRecord> = lookup
            .iter()
            .map(|mx| MxRecord {
                preference: mx.preference(),
                exchange: trim_root(&mx.exchange().to_string()),
            })
            .collect();
        records.sort_by_key(|mx| mx.preference);

        debug!("MX lookup for {}: {} record(s)", domain, records.len());
        Ok(records)
    }

    async fn lookup_txt(&self, domain: &str) -> Result<Vec<String>, ResolveError> {
        let lookup = self
            .resolver
            .txt_lookup(domain)
            .await
            .map_err(|e| ResolveError::from_trust_dns(domain, e))?;

        Ok(lookup
            .iter()
            .map(|record| {
                record
                    .txt_data()
                    .iter()
                    .map(|d| String::from_utf8_lossy(d))
                    .collect::<String>()
            })
            .collect())
    }

    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        let lookup = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|e| ResolveError::from_trust_dns(host, e))?;

        Ok(lookup.iter().collect())
    }

    async fn lookup_ptr(&self, ip: IpAddr) -> Result<Vec<String>, ResolveError> {
        let lookup = self
            .resolver
            .reverse_lookup(ip)
            .await
            .map_err(|e| ResolveError::from_trust_dns(&ip.to_string(), e))?;

        Ok(lookup
            .iter()
            .map(|name| trim_root(&name.to_string()))
            .collect())
    }
}

fn trim_root(name: &str) -> String {
    name.trim_end_matches('.').to_string()
}

/// Accepts `ip` (port 53) or `ip:port` / `[v6]:port`
fn parse_nameserver(s: &str) -> Option<SocketAddr> {
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Some(addr);
    }
    s.parse::<IpAddr>().ok().map(|ip| SocketAddr::new(ip, 53))
}
