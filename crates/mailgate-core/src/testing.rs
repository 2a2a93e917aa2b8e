//! Resolver doubles for check tests

use crate::dns::{MxRecord, ResolveError, Resolver};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory resolver that counts every lookup.
///
/// Names without a configured answer resolve to [`ResolveError::NotFound`].
#[derive(Default)]
pub struct SpyResolver {
    mx: HashMap<String, Vec<MxRecord>>,
    txt: HashMap<String, Vec<String>>,
    ip: HashMap<String, Vec<IpAddr>>,
    ptr: HashMap<IpAddr, Vec<String>>,
    failing: HashMap<String, String>,
    calls: Arc<AtomicUsize>,
}

impl SpyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mx(mut self, domain: &str, exchange: &str) -> Self {
        self.mx.entry(domain.to_string()).or_default().push(MxRecord {
            preference: 10,
            exchange: exchange.to_string(),
        });
        self
    }

    pub fn with_txt(mut self, domain: &str, txt: &str) -> Self {
        self.txt
            .entry(domain.to_string())
            .or_default()
            .push(txt.to_string());
        self
    }

    pub fn with_ip(mut self, host: &str, ip: IpAddr) -> Self {
        self.ip.entry(host.to_string()).or_default().push(ip);
        self
    }

    pub fn with_ptr(mut self, ip: IpAddr, name: &str) -> Self {
        self.ptr.entry(ip).or_default().push(name.to_string());
        self
    }

    /// Every lookup of `name` fails with a server error
    pub fn with_failure(mut self, name: &str, reason: &str) -> Self {
        self.failing.insert(name.to_string(), reason.to_string());
        self
    }

    /// Shared handle to the lookup counter, usable after the resolver is moved
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self, name: &str) -> Result<(), ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failing.get(name) {
            Some(reason) => Err(ResolveError::Failed {
                name: name.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

fn answer<K, V>(map: &HashMap<K, Vec<V>>, key: &K, name: &str) -> Result<Vec<V>, ResolveError>
where
    K: std::hash::Hash + Eq,
    V: Clone,
{
    map.get(key)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| ResolveError::NotFound(name.to_string()))
}

#[async_trait]
impl Resolver for SpyResolver {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, ResolveError> {
        self.record(domain)?;
        answer(&self.mx, &domain.to_string(), domain)
    }

    async fn lookup_txt(&self, domain: &str) -> Result<Vec<String>, ResolveError> {
        self.record(domain)?;
        answer(&self.txt, &domain.to_string(), domain)
    }

    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        self.record(host)?;
        answer(&self.ip, &host.to_string(), host)
    }

    async fn lookup_ptr(&self, ip: IpAddr) -> Result<Vec<String>, ResolveError> {
        let name = ip.to_string();
        self.record(&name)?;
        answer(&self.ptr, &ip, &name)
    }
}

/// Resolver whose every lookup hangs for `delay` before failing.
///
/// It ignores cancellation itself; stage functions are expected to race it
/// against their context's cancellation token.
pub struct SlowResolver {
    delay: Duration,
    started: Arc<AtomicUsize>,
}

impl SlowResolver {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of lookups that have started
    pub fn started(&self) -> Arc<AtomicUsize> {
        self.started.clone()
    }

    async fn stall(&self, name: &str) -> ResolveError {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        ResolveError::Failed {
            name: name.to_string(),
            reason: "timed out".to_string(),
        }
    }
}

#[async_trait]
impl Resolver for SlowResolver {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, ResolveError> {
        Err(self.stall(domain).await)
    }

    async fn lookup_txt(&self, domain: &str) -> Result<Vec<String>, ResolveError> {
        Err(self.stall(domain).await)
    }

    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        Err(self.stall(host).await)
    }

    async fn lookup_ptr(&self, ip: IpAddr) -> Result<Vec<String>, ResolveError> {
        Err(self.stall(&ip.to_string()).await)
    }
}
