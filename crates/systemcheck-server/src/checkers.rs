//! Built-in probes for configured systems.

use crate::config::ProbeSettings;
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use systemcheck::{CheckerProbe, HealthChecker, ProbeError, Registry, SystemConfig};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// TCP connect checker
pub struct TcpChecker {
    address: String,
    timeout_duration: Duration,
}

impl TcpChecker {
    pub fn new(address: impl Into<String>, timeout_duration: Duration) -> Self {
        Self {
            address: address.into(),
            timeout_duration,
        }
    }
}

#[async_trait]
impl HealthChecker for TcpChecker {
    async fn check(&self) -> Result<(), ProbeError> {
        let start = Instant::now();

        match timeout(self.timeout_duration, TcpStream::connect(self.address.as_str())).await {
            Ok(Ok(_stream)) => {
                debug!(address = %self.address, duration_ms = start.elapsed().as_millis(), "TCP check successful");
                Ok(())
            }
            Ok(Err(e)) => Err(ProbeError::new(format!("connect to {} failed: {}", self.address, e))),
            Err(_) => Err(ProbeError::new(format!(
                "connect to {} timed out after {:?}",
                self.address, self.timeout_duration
            ))),
        }
    }

    fn name(&self) -> &str {
        "tcp"
    }
}

/// HTTP request checker
pub struct HttpChecker {
    url: String,
    method: reqwest::Method,
    expected_codes: Vec<u16>,
    body_contains: Option<String>,
    timeout_duration: Duration,
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new(
        url: impl Into<String>,
        method: reqwest::Method,
        expected_codes: Vec<u16>,
        body_contains: Option<String>,
        timeout_duration: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout_duration).build()?;

        Ok(Self {
            url: url.into(),
            method,
            expected_codes,
            body_contains,
            timeout_duration,
            client,
        })
    }

    fn status_accepted(&self, status: u16) -> bool {
        if self.expected_codes.is_empty() {
            (200..300).contains(&status)
        } else {
            self.expected_codes.contains(&status)
        }
    }
}

#[async_trait]
impl HealthChecker for HttpChecker {
    async fn check(&self) -> Result<(), ProbeError> {
        let start = Instant::now();
        let request = self.client.request(self.method.clone(), &self.url);

        let response = match timeout(self.timeout_duration, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(ProbeError::new(format!("HTTP request failed: {}", e))),
            Err(_) => return Err(ProbeError::new(format!("HTTP request to {} timed out", self.url))),
        };

        let status = response.status().as_u16();
        if !self.status_accepted(status) {
            return Err(ProbeError::new(format!("Unexpected status code: {}", status)));
        }

        if let Some(needle) = &self.body_contains {
            let body = response
                .text()
                .await
                .map_err(|e| ProbeError::new(format!("Failed to read response body: {}", e)))?;
            if !body.contains(needle.as_str()) {
                return Err(ProbeError::new(format!("Response body does not contain {:?}", needle)));
            }
        }

        debug!(url = %self.url, status, duration_ms = start.elapsed().as_millis(), "HTTP check successful");
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Hostname resolution checker, using the system resolver
pub struct DnsChecker {
    query: String,
    expected_ips: Vec<IpAddr>,
    timeout_duration: Duration,
}

impl DnsChecker {
    pub fn new(query: impl Into<String>, expected_ips: Vec<IpAddr>, timeout_duration: Duration) -> Self {
        Self {
            query: query.into(),
            expected_ips,
            timeout_duration,
        }
    }

    fn evaluate(&self, resolved: &[IpAddr]) -> Result<(), ProbeError> {
        if resolved.is_empty() {
            return Err(ProbeError::new(format!("{} resolved to no addresses", self.query)));
        }
        if !self.expected_ips.is_empty() && !self.expected_ips.iter().any(|ip| resolved.contains(ip)) {
            return Err(ProbeError::new(format!(
                "{} resolved to {:?}, none of the expected {:?}",
                self.query, resolved, self.expected_ips
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl HealthChecker for DnsChecker {
    async fn check(&self) -> Result<(), ProbeError> {
        let lookup = tokio::net::lookup_host(format!("{}:0", self.query));

        match timeout(self.timeout_duration, lookup).await {
            Ok(Ok(addrs)) => {
                let resolved: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
                self.evaluate(&resolved)?;
                debug!(query = %self.query, count = resolved.len(), "DNS check successful");
                Ok(())
            }
            Ok(Err(e)) => Err(ProbeError::new(format!("DNS lookup failed: {}", e))),
            Err(_) => Err(ProbeError::new(format!("DNS lookup of {} timed out", self.query))),
        }
    }

    fn name(&self) -> &str {
        "dns"
    }
}

/// Register `name` with the checker described by `probe`.
pub fn register_system(
    registry: &Registry,
    name: &str,
    config: SystemConfig,
    probe: &ProbeSettings,
) -> systemcheck::Result<()> {
    match probe {
        ProbeSettings::Tcp { address, timeout } => registry.register(
            name,
            config,
            CheckerProbe::new(TcpChecker::new(address.clone(), *timeout)),
        ),
        ProbeSettings::Http {
            url,
            method,
            expected_codes,
            body_contains,
            timeout,
        } => {
            let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
                .map_err(|e| systemcheck::RegistryError::config(format!("invalid HTTP method: {}", e)))?;
            let checker = HttpChecker::new(url.clone(), method, expected_codes.clone(), body_contains.clone(), *timeout)
                .map_err(|e| systemcheck::RegistryError::config(format!("failed to build HTTP client: {}", e)))?;
            registry.register(name, config, CheckerProbe::new(checker))
        }
        ProbeSettings::Dns {
            query,
            expected_ips,
            timeout,
        } => registry.register(
            name,
            config,
            CheckerProbe::new(DnsChecker::new(query.clone(), expected_ips.clone(), *timeout)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_checker_succeeds_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let checker = TcpChecker::new(addr.to_string(), Duration::from_secs(1));
        assert!(checker.check().await.is_ok());
    }

    #[tokio::test]
    async fn test_tcp_checker_fails_when_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let checker = TcpChecker::new(addr.to_string(), Duration::from_millis(500));
        let err = checker.check().await.unwrap_err();
        assert!(err.message().contains(&addr.to_string()));
    }

    #[tokio::test]
    async fn test_http_checker_fails_without_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let checker = HttpChecker::new(
            format!("http://{}/health", addr),
            reqwest::Method::GET,
            vec![200],
            None,
            Duration::from_millis(500),
        )
        .unwrap();
        assert!(checker.check().await.is_err());
    }

    #[test]
    fn test_http_status_acceptance() {
        let any_2xx = HttpChecker::new("http://localhost/", reqwest::Method::GET, vec![], None, Duration::from_secs(1))
            .unwrap();
        assert!(any_2xx.status_accepted(204));
        assert!(!any_2xx.status_accepted(301));

        let explicit = HttpChecker::new(
            "http://localhost/",
            reqwest::Method::GET,
            vec![200, 301],
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(explicit.status_accepted(301));
        assert!(!explicit.status_accepted(204));
    }

    #[test]
    fn test_dns_evaluation() {
        let any = DnsChecker::new("db.internal", vec![], Duration::from_secs(1));
        assert!(any.evaluate(&[]).is_err());
        assert!(any.evaluate(&["10.0.0.1".parse().unwrap()]).is_ok());

        let pinned = DnsChecker::new("db.internal", vec!["10.0.0.2".parse().unwrap()], Duration::from_secs(1));
        assert!(pinned.evaluate(&["10.0.0.1".parse().unwrap()]).is_err());
        assert!(pinned
            .evaluate(&["10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap()])
            .is_ok());
    }

    #[tokio::test]
    async fn test_dns_checker_localhost() {
        let checker = DnsChecker::new("localhost", vec![], Duration::from_secs(2));
        assert!(checker.check().await.is_ok());
    }

    #[tokio::test]
    async fn test_register_system_from_settings() {
        let registry = Registry::new();
        let probe = ProbeSettings::Tcp {
            address: "127.0.0.1:1".to_string(),
            timeout: Duration::from_millis(100),
        };

        register_system(&registry, "db", SystemConfig::new(Duration::from_secs(60)), &probe).unwrap();
        assert!(registry.contains("db"));
        registry.shutdown();
    }
}
