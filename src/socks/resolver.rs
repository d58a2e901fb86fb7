//! Destination name resolution
//!
//! The session only sees the [`Resolver`] trait. [`SystemResolver`] wraps the
//! operating system's resolver, [`StaticResolver`] serves a fixed table, and
//! [`HostsResolver`] layers a static table over another resolver.

use crate::error::ResolveError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::trace;

/// Resolve a domain name to an ordered list of addresses.
///
/// Implementations must not return an empty list on success; callers treat
/// an empty list the same as [`ResolveError::NoAddresses`] regardless.
#[async_trait]
pub trait Resolver: Send + Sync + Debug {
    /// Look up `name`, preserving the resolver's result order
    async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>, ResolveError>;
}

/// System DNS via `getaddrinfo` on tokio's blocking pool
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>, ResolveError> {
        let addrs: Vec<IpAddr> = tokio::net::lookup_host((name, 0))
            .await
            .map_err(|source| ResolveError::Lookup {
                name: name.to_string(),
                source,
            })?
            .map(|addr| addr.ip())
            .collect();

        if addrs.is_empty() {
            return Err(ResolveError::NoAddresses(name.to_string()));
        }

        trace!("Resolved {} to {:?}", name, addrs);
        Ok(addrs)
    }
}

/// Fixed name table, matched case-insensitively
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the addresses for `name`
    pub fn insert(&mut self, name: &str, addrs: Vec<IpAddr>) {
        self.entries.insert(name.to_ascii_lowercase(), addrs);
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with_entry(mut self, name: &str, addrs: Vec<IpAddr>) -> Self {
        self.insert(name, addrs);
        self
    }

    /// Look up a name without going through the async trait
    pub fn get(&self, name: &str) -> Option<&[IpAddr]> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|addrs| addrs.as_slice())
    }

    /// Number of configured names
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no names are configured
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<HashMap<String, Vec<IpAddr>>> for StaticResolver {
    fn from(map: HashMap<String, Vec<IpAddr>>) -> Self {
        let mut resolver = StaticResolver::new();
        for (name, addrs) in map {
            resolver.insert(&name, addrs);
        }
        resolver
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>, ResolveError> {
        match self.get(name) {
            Some(addrs) if !addrs.is_empty() => Ok(addrs.to_vec()),
            _ => Err(ResolveError::NoAddresses(name.to_string())),
        }
    }
}

/// Static overrides consulted before a fallback resolver
#[derive(Debug, Clone)]
pub struct HostsResolver {
    hosts: StaticResolver,
    fallback: Arc<dyn Resolver>,
}

impl HostsResolver {
    /// Layer `hosts` over `fallback`
    pub fn new(hosts: StaticResolver, fallback: Arc<dyn Resolver>) -> Self {
        HostsResolver { hosts, fallback }
    }
}

#[async_trait]
impl Resolver for HostsResolver {
    async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>, ResolveError> {
        if let Some(addrs) = self.hosts.get(name) {
            if !addrs.is_empty() {
                trace!("Resolved {} from static hosts", name);
                return Ok(addrs.to_vec());
            }
        }
        self.fallback.resolve(name).await
    }
}
