//! Network path snapshots as delivered by a [`PathMonitor`](crate::monitor::PathMonitor).
//!
//! Every value here is an immutable snapshot. Observers replace them wholesale
//! on each update and never patch individual fields.

use crate::endpoint::Endpoint;
use crate::interface::Interface;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PathStatus {
    Satisfied,
    #[default]
    Unsatisfied,
    RequiresConnection,
}

/// Why a path is unsatisfied. Only meaningful alongside [`PathStatus::Unsatisfied`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnsatisfiedReason {
    #[default]
    None,
    CellularDenied,
    WifiDenied,
    LocalNetworkDenied,
    VpnInactive,
}

impl fmt::Display for UnsatisfiedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnsatisfiedReason::None => "None",
            UnsatisfiedReason::CellularDenied => "Cellular data denied",
            UnsatisfiedReason::WifiDenied => "Wi-Fi denied",
            UnsatisfiedReason::LocalNetworkDenied => "Local network access denied",
            UnsatisfiedReason::VpnInactive => "VPN inactive",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkQuality {
    #[default]
    Unknown,
    Minimal,
    Moderate,
    Good,
}

impl LinkQuality {
    pub fn label(self) -> &'static str {
        match self {
            LinkQuality::Unknown => "unknown",
            LinkQuality::Minimal => "minimal",
            LinkQuality::Moderate => "moderate",
            LinkQuality::Good => "good",
        }
    }

    /// Maps a normalized signal ratio (0.0..=1.0) to a coarse class.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 0.7 {
            LinkQuality::Good
        } else if ratio >= 0.4 {
            LinkQuality::Moderate
        } else if ratio > 0.0 {
            LinkQuality::Minimal
        } else {
            LinkQuality::Unknown
        }
    }
}

/// Next-hop address owned by a specific interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gateway {
    pub endpoint: Endpoint,
    #[serde(default)]
    pub interface: Option<String>,
}

impl Gateway {
    pub fn new(endpoint: Endpoint, interface: impl Into<String>) -> Self {
        Self {
            endpoint,
            interface: Some(interface.into()),
        }
    }

    pub fn belongs_to(&self, interface: &Interface) -> bool {
        self.interface.as_deref() == Some(interface.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PathSnapshot {
    pub status: PathStatus,
    pub unsatisfied_reason: UnsatisfiedReason,
    pub interfaces: Vec<Interface>,
    pub gateways: Vec<Gateway>,
    pub supports_ipv4: bool,
    pub supports_ipv6: bool,
    pub supports_dns: bool,
    pub is_constrained: bool,
    pub is_user_constrained: bool,
    pub is_expensive: bool,
    pub link_quality: LinkQuality,
    pub local_endpoint: Option<Endpoint>,
    pub remote_endpoint: Option<Endpoint>,
}

impl PathSnapshot {
    pub fn gateways_for<'a>(&'a self, interface: &'a Interface) -> impl Iterator<Item = &'a Gateway> {
        self.gateways.iter().filter(move |g| g.belongs_to(interface))
    }
}

/// Traffic priority classes a peer performance report is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficClass {
    Background,
    BestEffort,
    InteractiveVideo,
    InteractiveVoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PerformanceReport {
    pub signal_strength: Option<f64>,
    #[serde(with = "duration_ms::option")]
    pub transmit_latency: Option<Duration>,
}

/// The same path seen over a short-range peer-to-peer wireless link (Wi-Fi Aware).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerPathSnapshot {
    pub endpoint: Endpoint,
    #[serde(default)]
    pub performance: BTreeMap<TrafficClass, PerformanceReport>,
    #[serde(with = "duration_ms", default)]
    pub active_duration: Duration,
}

impl PeerPathSnapshot {
    pub fn report(&self, class: TrafficClass) -> Option<&PerformanceReport> {
        self.performance.get(&class)
    }
}

/// Serializes a [`Duration`] as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => s.serialize_some(&(d.as_millis() as u64)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::InterfaceType;

    #[test]
    fn test_gateways_for() {
        let wifi = Interface::new("en0", InterfaceType::Wifi, 4);
        let lo = Interface::new("lo0", InterfaceType::Loopback, 1);
        let path = PathSnapshot {
            interfaces: vec![wifi.clone(), lo.clone()],
            gateways: vec![
                Gateway::new(Endpoint::host_port("192.168.1.1", 0), "en0"),
                Gateway {
                    endpoint: Endpoint::host_port("10.0.0.1", 0),
                    interface: None,
                },
            ],
            ..Default::default()
        };
        assert_eq!(path.gateways_for(&wifi).count(), 1);
        assert_eq!(path.gateways_for(&lo).count(), 0);
    }

    #[test]
    fn test_link_quality_from_ratio() {
        assert_eq!(LinkQuality::from_ratio(0.9), LinkQuality::Good);
        assert_eq!(LinkQuality::from_ratio(0.5), LinkQuality::Moderate);
        assert_eq!(LinkQuality::from_ratio(0.1), LinkQuality::Minimal);
        assert_eq!(LinkQuality::from_ratio(0.0), LinkQuality::Unknown);
    }

    #[test]
    fn test_parse_snapshot_defaults() {
        let path: PathSnapshot = toml::from_str(
            r#"
            status = "satisfied"
            supports_ipv4 = true
            link_quality = "good"

            [[interfaces]]
            name = "en0"
            type = "wifi"

            [[gateways]]
            interface = "en0"
            endpoint = { kind = "host_port", host = "192.168.1.1", port = 0 }
            "#,
        )
        .unwrap();
        assert_eq!(path.status, PathStatus::Satisfied);
        assert_eq!(path.unsatisfied_reason, UnsatisfiedReason::None);
        assert_eq!(path.interfaces[0].kind, InterfaceType::Wifi);
        assert_eq!(path.gateways.len(), 1);
        assert!(path.local_endpoint.is_none());
        assert!(!path.supports_ipv6);
    }

    #[test]
    fn test_parse_peer() {
        let peer: PeerPathSnapshot = toml::from_str(
            r#"
            active_duration = 65000
            endpoint = { kind = "opaque", description = "aware-peer" }

            [performance.best_effort]
            signal_strength = -48.5
            transmit_latency = 12
            "#,
        )
        .unwrap();
        let report = peer.report(TrafficClass::BestEffort).unwrap();
        assert_eq!(report.signal_strength, Some(-48.5));
        assert_eq!(report.transmit_latency, Some(Duration::from_millis(12)));
        assert_eq!(peer.active_duration, Duration::from_secs(65));
        assert!(peer.report(TrafficClass::Background).is_none());
    }
}
