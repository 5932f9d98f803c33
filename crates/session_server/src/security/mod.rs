//! Built-in admission gates.
//!
//! Each gate is an ordinary `CONNECTION_REQUEST` subscriber. Only the
//! [`CapacityGate`] ever votes to allow; the others can only deny. A registry
//! with no gates installed refuses everything.

use crate::config::ServerConfig;
use crate::connection::{registry::RegistryInner, AdmissionRequest, ConnectionRegistry};
use crate::error::ErrorDescriptor;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};

pub mod rate_limiter;

pub use rate_limiter::RateLimiter;

/// Allows attempts while the live set is below `max_connections`.
///
/// Past the limit it stays silent, which leaves the default `Server Full`
/// verdict in place.
#[derive(Debug, Clone)]
pub struct CapacityGate {
    max_connections: usize,
}

impl CapacityGate {
    pub fn new(max_connections: usize) -> Self {
        Self { max_connections }
    }

    pub fn install(self, registry: &ConnectionRegistry) {
        let weak: Weak<RegistryInner> = registry.downgrade();
        registry.on_connection_request(move |request| {
            let Some(registry) = ConnectionRegistry::upgrade(&weak) else {
                return;
            };
            let live = registry.len();
            if live < self.max_connections {
                request.allow();
            } else {
                debug!("Capacity reached ({}/{}), not allowing", live, self.max_connections);
            }
        });
    }
}

/// Denies attempts from banned addresses.
#[derive(Debug, Clone, Default)]
pub struct IpBanGate {
    banned: HashSet<IpAddr>,
}

impl IpBanGate {
    pub fn new(banned: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            banned: banned.into_iter().collect(),
        }
    }

    pub fn is_banned(&self, ip: IpAddr) -> bool {
        self.banned.contains(&ip)
    }

    pub fn install(self, registry: &ConnectionRegistry) {
        registry.on_connection_request(move |request| {
            if let Some(ip) = remote_ip(request) {
                if self.is_banned(ip) {
                    info!("🛡️ Refusing banned address {}", ip);
                    let _ = request.deny(ErrorDescriptor::banned());
                }
            }
        });
    }
}

/// Denies attempts from addresses that exhausted their token bucket.
#[derive(Debug, Clone)]
pub struct RateLimitGate {
    limiter: Arc<RateLimiter>,
}

impl RateLimitGate {
    /// `max_attempts` tokens per address, one regained every
    /// `window / max_attempts`.
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        let refill_interval = window / max_attempts.max(1);
        Self {
            limiter: Arc::new(RateLimiter::new(max_attempts, refill_interval)),
        }
    }

    pub fn limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }

    pub fn install(self, registry: &ConnectionRegistry) {
        registry.on_connection_request(move |request| {
            if let Some(ip) = remote_ip(request) {
                if !self.limiter.check_rate_limit(ip) {
                    debug!("Rate limit exceeded for {}", ip);
                    let _ = request.deny(ErrorDescriptor::rate_limited());
                }
            }
        });
    }
}

/// Installs the gates described by `config`, capacity first.
///
/// Returns the rate limiter when rate limiting is enabled so the caller can
/// prune it periodically.
pub fn install_gates(registry: &ConnectionRegistry, config: &ServerConfig) -> Option<Arc<RateLimiter>> {
    CapacityGate::new(config.max_connections).install(registry);

    if !config.security.banned_ips.is_empty() {
        IpBanGate::new(config.security.banned_ips.iter().copied()).install(registry);
    }

    if config.security.enable_rate_limiting {
        let gate = RateLimitGate::new(
            config.security.max_attempts_per_minute,
            Duration::from_secs(60),
        );
        let limiter = gate.limiter();
        gate.install(registry);
        return Some(limiter);
    }
    None
}

fn remote_ip(request: &AdmissionRequest) -> Option<IpAddr> {
    request
        .connection()
        .and_then(|connection| connection.remote_addr())
        .map(|addr| addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::RegistryEvent;
    use crate::test_support::MockTransport;

    #[test]
    fn test_capacity_gate_admits_up_to_limit() {
        let registry = ConnectionRegistry::new();
        CapacityGate::new(2).install(&registry);

        assert!(registry.on_connection_attempt(MockTransport::new()).is_approved());
        assert!(registry.on_connection_attempt(MockTransport::new()).is_approved());

        let socket = MockTransport::new();
        let admission = registry.on_connection_attempt(socket.clone());
        assert_eq!(admission.denied(), Some(&ErrorDescriptor::server_full()));
        assert_eq!(socket.closes(), vec![ErrorDescriptor::server_full()]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_capacity_frees_up_after_disconnect() {
        let registry = ConnectionRegistry::new();
        CapacityGate::new(1).install(&registry);

        let first = registry.on_connection_attempt(MockTransport::new()).approved().unwrap();
        assert!(!registry.on_connection_attempt(MockTransport::new()).is_approved());

        first.disconnect(ErrorDescriptor::session_terminated()).unwrap();
        assert!(registry.on_connection_attempt(MockTransport::new()).is_approved());
    }

    #[test]
    fn test_ban_gate_overrides_capacity() {
        let registry = ConnectionRegistry::new();
        CapacityGate::new(10).install(&registry);
        IpBanGate::new(["10.0.0.66".parse().unwrap()]).install(&registry);

        let banned = MockTransport::from_addr("10.0.0.66:5000");
        assert_eq!(
            registry.on_connection_attempt(banned.clone()).denied(),
            Some(&ErrorDescriptor::banned())
        );
        assert_eq!(banned.closes(), vec![ErrorDescriptor::banned()]);

        let welcome = MockTransport::from_addr("10.0.0.7:5000");
        assert!(registry.on_connection_attempt(welcome).is_approved());
    }

    #[test]
    fn test_rate_limit_gate() {
        let registry = ConnectionRegistry::new();
        CapacityGate::new(10).install(&registry);
        RateLimitGate::new(2, Duration::from_secs(60)).install(&registry);

        for _ in 0..2 {
            let socket = MockTransport::from_addr("192.168.1.9:4000");
            assert!(registry.on_connection_attempt(socket).is_approved());
        }
        let socket = MockTransport::from_addr("192.168.1.9:4001");
        assert_eq!(
            registry.on_connection_attempt(socket).denied(),
            Some(&ErrorDescriptor::rate_limited())
        );
    }

    #[test]
    fn test_install_gates_from_config() {
        let registry = ConnectionRegistry::new();
        let mut config = ServerConfig::default();
        config.security.banned_ips = vec!["127.0.0.2".parse().unwrap()];

        let limiter = install_gates(&registry, &config);

        assert!(limiter.is_some());
        assert_eq!(registry.handler_count(RegistryEvent::ConnectionRequest), 3);

        config.security = Default::default();
        config.security.enable_rate_limiting = false;
        let registry = ConnectionRegistry::new();
        assert!(install_gates(&registry, &config).is_none());
        assert_eq!(registry.handler_count(RegistryEvent::ConnectionRequest), 1);
    }
}
