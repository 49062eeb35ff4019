//! URL Validator (§4.1) and Normalizer (§4.2) for the SneakDex crawler.

pub mod normalize;
pub mod validator;

pub use normalize::normalize;
pub use validator::{UrlValidator, ValidatorConfig};

/// Resolves a hostname to its IP addresses using the system resolver,
/// the default `resolve` callback passed to [`UrlValidator::validate`]
/// in production.
pub async fn system_resolve(host: String) -> std::io::Result<Vec<std::net::IpAddr>> {
    use tokio::net::lookup_host;
    let addrs = lookup_host((host.as_str(), 80))
        .await?
        .map(|socket_addr| socket_addr.ip())
        .collect();
    Ok(addrs)
}
