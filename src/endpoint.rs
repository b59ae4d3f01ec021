use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// A network address in one of the forms a path can report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Endpoint {
    HostPort {
        host: String,
        port: u16,
    },
    Service {
        name: String,
        service_type: String,
        domain: String,
    },
    Unix {
        path: String,
    },
    Url {
        url: String,
    },
    Opaque {
        description: String,
    },
}

impl Endpoint {
    pub fn host_port(host: impl Into<String>, port: u16) -> Self {
        Endpoint::HostPort {
            host: host.into(),
            port,
        }
    }
}

impl From<IpAddr> for Endpoint {
    fn from(addr: IpAddr) -> Self {
        Endpoint::host_port(addr.to_string(), 0)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::HostPort { host, port } => {
                // Scoped addresses (`fe80::1%wlan0`) still need brackets.
                let addr = host.split_once('%').map_or(host.as_str(), |(addr, _)| addr);
                if addr.parse::<std::net::Ipv6Addr>().is_ok() {
                    write!(f, "[{}]:{}", host, port)
                } else {
                    write!(f, "{}:{}", host, port)
                }
            }
            Endpoint::Service {
                name,
                service_type,
                domain,
            } => {
                let parts = [name, service_type, domain]
                    .into_iter()
                    .map(|p| p.trim_matches('.'))
                    .filter(|p| !p.is_empty())
                    .collect::<Vec<_>>();
                write!(f, "{}", parts.join("."))
            }
            Endpoint::Unix { path } => write!(f, "unix:{}", path),
            Endpoint::Url { url } => write!(f, "{}", url),
            Endpoint::Opaque { description } => write!(f, "opaque({})", description),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_port() {
        assert_eq!(Endpoint::host_port("192.168.1.1", 0).to_string(), "192.168.1.1:0");
        assert_eq!(Endpoint::host_port("example.com", 443).to_string(), "example.com:443");
        assert_eq!(Endpoint::host_port("fe80::1", 53).to_string(), "[fe80::1]:53");
    }

    #[test]
    fn test_host_port_scoped_ipv6() {
        assert_eq!(
            Endpoint::host_port("fe80::1%wlan0", 5353).to_string(),
            "[fe80::1%wlan0]:5353"
        );
        // Not an address once the zone is stripped.
        assert_eq!(Endpoint::host_port("printer%lan", 631).to_string(), "printer%lan:631");
    }

    #[test]
    fn test_service() {
        let ep = Endpoint::Service {
            name: "Printer".to_string(),
            service_type: "_ipp._tcp".to_string(),
            domain: "local.".to_string(),
        };
        assert_eq!(ep.to_string(), "Printer._ipp._tcp.local");

        let no_domain = Endpoint::Service {
            name: "Speaker".to_string(),
            service_type: "_raop._tcp.".to_string(),
            domain: String::new(),
        };
        assert_eq!(no_domain.to_string(), "Speaker._raop._tcp");
    }

    #[test]
    fn test_variants_render_distinctly() {
        let unix = Endpoint::Unix {
            path: "/run/app.sock".to_string(),
        };
        let url = Endpoint::Url {
            url: "https://example.com/".to_string(),
        };
        let opaque = Endpoint::Opaque {
            description: "nan0".to_string(),
        };
        assert_eq!(unix.to_string(), "unix:/run/app.sock");
        assert_eq!(url.to_string(), "https://example.com/");
        assert_eq!(opaque.to_string(), "opaque(nan0)");
    }

    #[test]
    fn test_parse_tagged() {
        let ep: Endpoint = toml::from_str(
            r#"
            kind = "host_port"
            host = "10.0.0.1"
            port = 8080
            "#,
        )
        .unwrap();
        assert_eq!(ep, Endpoint::host_port("10.0.0.1", 8080));
    }
}
