//! MQTT broker addressing and transport selection.

use anyhow::{anyhow, Context, Result};
use rumqttc::Transport;
use std::path::Path;

/// MQTT endpoint parsed from a broker address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

impl MqttEndpoint {
    /// Build the rumqttc transport for this endpoint.
    ///
    /// Plain endpoints use TCP. TLS endpoints trust `ca_path` when given and
    /// the platform's native root certificates otherwise. A CA path on a plain
    /// endpoint is a configuration error.
    pub fn transport(&self, ca_path: Option<&Path>) -> Result<Transport> {
        match (self.use_tls, ca_path) {
            (false, None) => Ok(Transport::tcp()),
            (false, Some(_)) => Err(anyhow!(
                "MQTT TLS CA provided but {}:{} is not a TLS endpoint (use mqtts://)",
                self.host,
                self.port
            )),
            (true, None) => Ok(Transport::tls_with_default_config()),
            (true, Some(path)) => {
                let ca = std::fs::read(path)
                    .with_context(|| format!("failed to read MQTT TLS CA '{}'", path.display()))?;
                Ok(Transport::tls(ca, None, None))
            }
        }
    }
}

impl std::fmt::Display for MqttEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = if self.use_tls { "mqtts" } else { "mqtt" };
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", scheme, self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", scheme, self.host, self.port)
        }
    }
}

/// Parse an MQTT endpoint from an address string.
///
/// Supports formats:
/// - `host:port` (plain TCP)
/// - `mqtt://host:port` / `tcp://host:port` (plain TCP)
/// - `mqtts://host:port` / `ssl://host:port` (TLS)
/// - `[ipv6]:port` (IPv6 with brackets)
pub fn parse_mqtt_endpoint(addr: &str) -> Result<MqttEndpoint> {
    let mut use_tls = false;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }

    let (host, port) = split_host_port(remainder)?;
    if host.is_empty() {
        return Err(anyhow!("missing MQTT host in {}", addr));
    }
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    // Handle IPv6 addresses in brackets: [::1]:1883
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port
            .parse()
            .with_context(|| format!("invalid MQTT port in {}", addr))?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    let port: u16 = port
        .parse()
        .with_context(|| format!("invalid MQTT port in {}", addr))?;
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_endpoint_plain() {
        let ep = parse_mqtt_endpoint("127.0.0.1:1883").unwrap();
        assert_eq!(ep.host, "127.0.0.1");
        assert_eq!(ep.port, 1883);
        assert!(!ep.use_tls);
    }

    #[test]
    fn parse_endpoint_mqtts_scheme() {
        let ep = parse_mqtt_endpoint("mqtts://broker.example.com:8883").unwrap();
        assert_eq!(ep.host, "broker.example.com");
        assert_eq!(ep.port, 8883);
        assert!(ep.use_tls);
        assert_eq!(ep.to_string(), "mqtts://broker.example.com:8883");
    }

    #[test]
    fn parse_endpoint_ipv6() {
        let ep = parse_mqtt_endpoint("[::1]:1883").unwrap();
        assert_eq!(ep.host, "::1");
        assert_eq!(ep.port, 1883);
        assert_eq!(ep.to_string(), "mqtt://[::1]:1883");
    }

    #[test]
    fn parse_endpoint_rejects_garbage() {
        assert!(parse_mqtt_endpoint("broker").is_err());
        assert!(parse_mqtt_endpoint("ws://broker:80").is_err());
        assert!(parse_mqtt_endpoint("broker:notaport").is_err());
        assert!(parse_mqtt_endpoint(":1883").is_err());
    }

    #[test]
    fn ca_on_plain_endpoint_is_rejected() {
        let ep = parse_mqtt_endpoint("127.0.0.1:1883").unwrap();
        assert!(ep.transport(Some(Path::new("/tmp/ca.pem"))).is_err());
        assert!(ep.transport(None).is_ok());
    }

    #[test]
    fn missing_ca_file_is_reported() {
        let ep = parse_mqtt_endpoint("mqtts://127.0.0.1:8883").unwrap();
        let err = ep
            .transport(Some(Path::new("/nonexistent/ca.pem")))
            .err()
            .expect("transport must fail");
        assert!(err.to_string().contains("CA"));
    }
}
