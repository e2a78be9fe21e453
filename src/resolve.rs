use crate::error::ResolveError;
use async_trait::async_trait;
use tokio::net::lookup_host;
use tracing::debug;

/// Turns a service name into a reachable address
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, service_name: &str) -> Result<String, ResolveError>;
}

/// Resolver backed by the system DNS (container network service names)
#[derive(Debug, Default, Clone)]
pub struct DnsResolver;

#[async_trait]
impl AddressResolver for DnsResolver {
    async fn resolve(&self, service_name: &str) -> Result<String, ResolveError> {
        let mut addresses =
            lookup_host((service_name, 0))
                .await
                .map_err(|e| ResolveError::Lookup {
                    service: service_name.to_string(),
                    details: e.to_string(),
                })?;

        let address = addresses
            .next()
            .map(|addr| addr.ip().to_string())
            .ok_or_else(|| ResolveError::NotFound {
                service: service_name.to_string(),
            })?;

        debug!("Resolved {} to {}", service_name, address);
        Ok(address)
    }
}
