//! Path monitor backed by Linux procfs and sysfs.
//!
//! The kernel has no push notification we can consume without netlink, so the
//! monitor polls and only emits when the derived snapshot actually changed.

use crate::config::SystemConfig;
use crate::endpoint::Endpoint;
use crate::interface::{InterfaceType, LinkInfo, OperState, parse_dev_type, parse_flags};
use crate::monitor::{LookupError, MonitorError, PathMonitor, SNAPSHOT_CHANNEL_CAPACITY};
use crate::path::{Gateway, LinkQuality, PathSnapshot, PathStatus, PeerPathSnapshot, UnsatisfiedReason};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const RTF_UP: u32 = 0x0001;
const RTF_GATEWAY: u32 = 0x0002;
const RTF_REJECT: u32 = 0x0200;

/// Maximum link value the kernel reports in `/proc/net/wireless`.
const WIRELESS_LINK_MAX: f64 = 70.0;

/// Where the monitor reads kernel state from.
#[derive(Debug, Clone)]
pub struct SystemPaths {
    pub sys_class_net: PathBuf,
    pub proc_net: PathBuf,
    pub resolv_conf: PathBuf,
}

impl Default for SystemPaths {
    fn default() -> Self {
        Self {
            sys_class_net: PathBuf::from("/sys/class/net"),
            proc_net: PathBuf::from("/proc/net"),
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Route {
    pub iface: String,
    pub destination: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub flags: u32,
    pub metric: u32,
}

impl Ipv4Route {
    pub fn is_default(&self) -> bool {
        self.destination.is_unspecified()
            && self.mask.is_unspecified()
            && self.flags & RTF_UP != 0
            && self.flags & RTF_REJECT == 0
    }

    pub fn has_gateway(&self) -> bool {
        self.flags & RTF_GATEWAY != 0 && !self.gateway.is_unspecified()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Route {
    pub iface: String,
    pub prefix_len: u8,
    pub gateway: Ipv6Addr,
    pub flags: u32,
    pub metric: u32,
}

impl Ipv6Route {
    pub fn is_default(&self) -> bool {
        self.prefix_len == 0 && self.flags & RTF_UP != 0 && self.flags & RTF_REJECT == 0
    }

    pub fn has_gateway(&self) -> bool {
        !self.gateway.is_unspecified()
    }
}

/// Everything read from the kernel in one poll.
#[derive(Debug, Clone, Default)]
pub struct SystemFacts {
    pub links: Vec<LinkInfo>,
    pub ipv4_routes: Vec<Ipv4Route>,
    pub ipv6_routes: Vec<Ipv6Route>,
    /// Interfaces holding at least one global-scope IPv6 address.
    pub global_ipv6: Vec<String>,
    pub nameservers: usize,
    /// Raw `/proc/net/wireless` link values by interface.
    pub wireless_link: HashMap<String, f64>,
}

/// Parses `/proc/net/route`. Addresses are host-order hex.
pub fn parse_ipv4_routes(content: &str) -> Vec<Ipv4Route> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let f: Vec<&str> = line.split_whitespace().collect();
            if f.len() < 8 {
                return None;
            }
            let addr = |s: &str| {
                u32::from_str_radix(s, 16)
                    .ok()
                    .map(|v| Ipv4Addr::from(v.to_le_bytes()))
            };
            Some(Ipv4Route {
                iface: f[0].to_string(),
                destination: addr(f[1])?,
                gateway: addr(f[2])?,
                flags: u32::from_str_radix(f[3], 16).ok()?,
                metric: f[6].parse().ok()?,
                mask: addr(f[7])?,
            })
        })
        .collect()
}

/// Parses `/proc/net/ipv6_route`.
pub fn parse_ipv6_routes(content: &str) -> Vec<Ipv6Route> {
    content
        .lines()
        .filter_map(|line| {
            let f: Vec<&str> = line.split_whitespace().collect();
            if f.len() < 10 {
                return None;
            }
            Some(Ipv6Route {
                iface: f[9].to_string(),
                prefix_len: u8::from_str_radix(f[1], 16).ok()?,
                gateway: parse_ipv6_hex(f[4])?,
                metric: u32::from_str_radix(f[5], 16).ok()?,
                flags: u32::from_str_radix(f[8], 16).ok()?,
            })
        })
        .collect()
}

fn parse_ipv6_hex(s: &str) -> Option<Ipv6Addr> {
    if s.len() != 32 {
        return None;
    }
    u128::from_str_radix(s, 16).ok().map(Ipv6Addr::from)
}

/// Names of interfaces with a global-scope address in `/proc/net/if_inet6`.
pub fn parse_global_ipv6(content: &str) -> Vec<String> {
    let mut names: Vec<String> = content
        .lines()
        .filter_map(|line| {
            let f: Vec<&str> = line.split_whitespace().collect();
            (f.len() >= 6 && f[3] == "00").then(|| f[5].to_string())
        })
        .collect();
    names.sort_unstable();
    names.dedup();
    names
}

pub fn parse_nameservers(content: &str) -> usize {
    content
        .lines()
        .map(str::trim_start)
        .filter(|l| l.starts_with("nameserver"))
        .filter(|l| l.split_whitespace().nth(1).is_some())
        .count()
}

/// Parses `/proc/net/wireless` into interface -> link value.
pub fn parse_wireless(content: &str) -> HashMap<String, f64> {
    content
        .lines()
        .skip(2)
        .filter_map(|line| {
            let (name, rest) = line.split_once(':')?;
            let link = rest.split_whitespace().nth(1)?;
            let value = link.trim_end_matches('.').parse().ok()?;
            Some((name.trim().to_string(), value))
        })
        .collect()
}

fn read_optional(path: &Path) -> io::Result<String> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e),
    }
}

fn read_link(dir: &Path, name: String) -> io::Result<LinkInfo> {
    let read = |file: &str| read_optional(&dir.join(file));
    Ok(LinkInfo {
        index: read("ifindex")?.trim().parse().unwrap_or(0),
        arp_type: read("type")?.trim().parse().unwrap_or(0),
        flags: parse_flags(&read("flags")?).unwrap_or(0),
        oper_state: OperState::parse(&read("operstate")?),
        wireless: dir.join("wireless").exists() || dir.join("phy80211").exists(),
        dev_type: parse_dev_type(&read("uevent")?),
        name,
    })
}

/// Reads one consistent-enough view of the kernel network state.
pub fn read_facts(paths: &SystemPaths) -> io::Result<SystemFacts> {
    let mut links = Vec::new();
    for entry in std::fs::read_dir(&paths.sys_class_net)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        links.push(read_link(&entry.path(), name)?);
    }
    links.sort_by_key(|l| l.index);

    Ok(SystemFacts {
        links,
        ipv4_routes: parse_ipv4_routes(&read_optional(&paths.proc_net.join("route"))?),
        ipv6_routes: parse_ipv6_routes(&read_optional(&paths.proc_net.join("ipv6_route"))?),
        global_ipv6: parse_global_ipv6(&read_optional(&paths.proc_net.join("if_inet6"))?),
        nameservers: parse_nameservers(&read_optional(&paths.resolv_conf)?),
        wireless_link: parse_wireless(&read_optional(&paths.proc_net.join("wireless"))?),
    })
}

/// Derives a path snapshot from raw kernel facts.
pub fn build_snapshot(facts: &SystemFacts, settings: &SystemConfig) -> PathSnapshot {
    let available: Vec<&LinkInfo> = facts.links.iter().filter(|l| l.is_available()).collect();
    let is_available = |name: &str| available.iter().any(|l| l.name == name);

    let mut v4_defaults: Vec<&Ipv4Route> = facts
        .ipv4_routes
        .iter()
        .filter(|r| r.is_default() && is_available(&r.iface))
        .collect();
    v4_defaults.sort_by_key(|r| r.metric);

    let mut v6_defaults: Vec<&Ipv6Route> = facts
        .ipv6_routes
        .iter()
        .filter(|r| r.is_default() && is_available(&r.iface))
        .collect();
    v6_defaults.sort_by_key(|r| r.metric);

    let has_v4 = !v4_defaults.is_empty();
    let has_v6 = v6_defaults
        .iter()
        .any(|r| facts.global_ipv6.contains(&r.iface));

    let mut gateways: Vec<Gateway> = Vec::new();
    let v4_gateways = v4_defaults
        .iter()
        .filter(|r| r.has_gateway())
        .map(|r| (IpAddr::V4(r.gateway), r.iface.as_str()));
    let v6_gateways = v6_defaults
        .iter()
        .filter(|r| r.has_gateway())
        .map(|r| (IpAddr::V6(r.gateway), r.iface.as_str()));
    for (addr, iface) in v4_gateways.chain(v6_gateways) {
        let gw = Gateway::new(Endpoint::from(addr), iface);
        if !gateways.contains(&gw) {
            gateways.push(gw);
        }
    }

    let status = if has_v4 || has_v6 {
        PathStatus::Satisfied
    } else if facts
        .links
        .iter()
        .any(|l| l.is_dormant() && l.classify() != InterfaceType::Loopback)
    {
        PathStatus::RequiresConnection
    } else {
        PathStatus::Unsatisfied
    };

    let primary = v4_defaults
        .first()
        .map(|r| r.iface.as_str())
        .or_else(|| v6_defaults.first().map(|r| r.iface.as_str()))
        .and_then(|name| available.iter().find(|l| l.name == name));

    let mut snapshot = PathSnapshot {
        status,
        unsatisfied_reason: UnsatisfiedReason::None,
        interfaces: available.iter().map(|l| l.to_interface()).collect(),
        gateways,
        supports_ipv4: has_v4,
        supports_ipv6: has_v6,
        supports_dns: status == PathStatus::Satisfied && facts.nameservers > 0,
        is_user_constrained: settings.low_data_mode,
        ..Default::default()
    };

    if let Some(primary) = primary {
        let kind = primary.classify();
        snapshot.is_expensive =
            kind == InterfaceType::Cellular || settings.metered_interfaces.contains(&primary.name);
        snapshot.is_constrained = settings.constrained_interfaces.contains(&primary.name);
        if kind == InterfaceType::Wifi {
            if let Some(link) = facts.wireless_link.get(&primary.name) {
                snapshot.link_quality = LinkQuality::from_ratio(link / WIRELESS_LINK_MAX);
            }
        }
    }

    snapshot
}

pub struct SystemMonitor {
    paths: SystemPaths,
    settings: SystemConfig,
    poll_interval: Duration,
}

impl SystemMonitor {
    pub fn new(settings: SystemConfig, poll_interval: Duration) -> Self {
        Self {
            paths: SystemPaths::default(),
            settings,
            poll_interval,
        }
    }
}

/// Reads and derives one snapshot off the async runtime.
async fn poll_snapshot(paths: &SystemPaths, settings: &SystemConfig) -> Option<PathSnapshot> {
    let paths = paths.clone();
    match tokio::task::spawn_blocking(move || read_facts(&paths)).await {
        Ok(Ok(facts)) => Some(build_snapshot(&facts, settings)),
        Ok(Err(e)) => {
            warn!(error = %e, "Failed to read network state");
            None
        }
        Err(e) => {
            warn!(error = %e, "Network state reader panicked");
            None
        }
    }
}

impl PathMonitor for SystemMonitor {
    fn subscribe(&self) -> Result<mpsc::Receiver<PathSnapshot>, MonitorError> {
        // Only probes that sysfs is there; every actual read runs on the blocking pool.
        std::fs::metadata(&self.paths.sys_class_net)?;
        let (tx, rx) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);

        let paths = self.paths.clone();
        let settings = self.settings.clone();
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            info!(interval_ms = poll_interval.as_millis() as u64, "System path polling started");
            let mut last: Option<PathSnapshot> = None;
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = tx.closed() => {
                        debug!("Path subscriber went away, stopping poll");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(snapshot) = poll_snapshot(&paths, &settings).await else {
                            continue;
                        };
                        if last.as_ref() == Some(&snapshot) {
                            continue;
                        }
                        debug!(status = ?snapshot.status, interfaces = snapshot.interfaces.len(), "Network path changed");
                        if tx.send(snapshot.clone()).await.is_err() {
                            break;
                        }
                        last = Some(snapshot);
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn peer_path(&self, _path: PathSnapshot) -> Result<PeerPathSnapshot, LookupError> {
        Err(LookupError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTE: &str = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
wlan0\t00000000\t0101A8C0\t0003\t0\t0\t600\t00000000\t0\t0\t0
wlan0\t0001A8C0\t00000000\t0001\t0\t0\t600\t00FFFFFF\t0\t0\t0
";

    const IPV6_ROUTE: &str = "\
00000000000000000000000000000000 00 00000000000000000000000000000000 00 fe800000000000000000000000000001 00000064 00000001 00000000 00000003 wlan0
00000000000000000000000000000000 00 00000000000000000000000000000000 00 00000000000000000000000000000000 ffffffff 00000001 00000000 00200200 lo
";

    const IF_INET6: &str = "\
00000000000000000000000000000001 01 80 10 80 lo
20010db8000000000000000000000042 03 40 00 00 wlan0
fe800000000000000000000000000042 03 40 20 80 wlan0
";

    const WIRELESS: &str = "\
Inter-| sta-|   Quality        |   Discarded packets               | Missed | WE
 face | tus | link level noise |  nwid  crypt   frag  retry   misc | beacon | 22
 wlan0: 0000   56.  -54.  -256        0      0      0      0      0        0
";

    fn link(name: &str, index: u32, arp_type: u16, wireless: bool) -> LinkInfo {
        LinkInfo {
            name: name.to_string(),
            index,
            arp_type,
            flags: 0x1003,
            oper_state: if arp_type == 772 { OperState::Unknown } else { OperState::Up },
            wireless,
            dev_type: None,
        }
    }

    fn wifi_facts() -> SystemFacts {
        SystemFacts {
            links: vec![link("lo", 1, 772, false), link("wlan0", 3, 1, true)],
            ipv4_routes: parse_ipv4_routes(ROUTE),
            ipv6_routes: parse_ipv6_routes(IPV6_ROUTE),
            global_ipv6: parse_global_ipv6(IF_INET6),
            nameservers: parse_nameservers("# generated\nnameserver 127.0.0.53\noptions edns0\n"),
            wireless_link: parse_wireless(WIRELESS),
        }
    }

    #[test]
    fn test_parse_ipv4_routes() {
        let routes = parse_ipv4_routes(ROUTE);
        assert_eq!(routes.len(), 2);
        assert!(routes[0].is_default());
        assert!(routes[0].has_gateway());
        assert_eq!(routes[0].gateway, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(routes[0].metric, 600);
        assert!(!routes[1].is_default());
        assert_eq!(routes[1].destination, Ipv4Addr::new(192, 168, 1, 0));
    }

    #[test]
    fn test_parse_ipv6_routes() {
        let routes = parse_ipv6_routes(IPV6_ROUTE);
        assert_eq!(routes.len(), 2);
        assert!(routes[0].is_default());
        assert_eq!(routes[0].gateway, "fe80::1".parse::<Ipv6Addr>().unwrap());
        // The kernel's unreachable default on lo is a reject route.
        assert!(!routes[1].is_default());
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse_global_ipv6(IF_INET6), vec!["wlan0".to_string()]);
        assert_eq!(parse_nameservers("nameserver 1.1.1.1\nnameserver 8.8.8.8\n"), 2);
        assert_eq!(parse_nameservers("nameserver\n# nameserver 1.1.1.1\n"), 0);
        assert_eq!(parse_wireless(WIRELESS).get("wlan0"), Some(&56.0));
    }

    #[test]
    fn test_build_snapshot_wifi() {
        let snapshot = build_snapshot(&wifi_facts(), &SystemConfig::default());
        assert_eq!(snapshot.status, PathStatus::Satisfied);
        assert_eq!(snapshot.interfaces.len(), 2);
        assert_eq!(snapshot.interfaces[1].kind, InterfaceType::Wifi);
        assert!(snapshot.supports_ipv4);
        assert!(snapshot.supports_ipv6);
        assert!(snapshot.supports_dns);
        assert!(!snapshot.is_expensive);
        assert_eq!(snapshot.link_quality, LinkQuality::Good);
        assert_eq!(snapshot.gateways.len(), 2);
        assert!(snapshot.gateways.iter().all(|g| g.interface.as_deref() == Some("wlan0")));
        assert_eq!(snapshot.gateways[0].endpoint.to_string(), "192.168.1.1:0");
    }

    #[test]
    fn test_build_snapshot_settings() {
        let settings = SystemConfig {
            metered_interfaces: vec!["wlan0".to_string()],
            constrained_interfaces: vec!["wlan0".to_string()],
            low_data_mode: true,
        };
        let snapshot = build_snapshot(&wifi_facts(), &settings);
        assert!(snapshot.is_expensive);
        assert!(snapshot.is_constrained);
        assert!(snapshot.is_user_constrained);
    }

    #[test]
    fn test_build_snapshot_dormant() {
        let mut facts = wifi_facts();
        facts.links[1].oper_state = OperState::Dormant;
        let snapshot = build_snapshot(&facts, &SystemConfig::default());
        assert_eq!(snapshot.status, PathStatus::RequiresConnection);
        assert_eq!(snapshot.interfaces.len(), 1);
        assert!(snapshot.gateways.is_empty());
        assert!(!snapshot.supports_dns);
        assert_eq!(snapshot.link_quality, LinkQuality::Unknown);
    }

    #[test]
    fn test_build_snapshot_offline() {
        let facts = SystemFacts {
            links: vec![link("lo", 1, 772, false)],
            ..Default::default()
        };
        let snapshot = build_snapshot(&facts, &SystemConfig::default());
        assert_eq!(snapshot.status, PathStatus::Unsatisfied);
        assert_eq!(snapshot.unsatisfied_reason, UnsatisfiedReason::None);
    }

    fn monitor_at(root: &Path) -> SystemMonitor {
        SystemMonitor {
            paths: SystemPaths {
                sys_class_net: root.join("class/net"),
                proc_net: root.join("proc/net"),
                resolv_conf: root.join("resolv.conf"),
            },
            settings: SystemConfig::default(),
            poll_interval: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_subscribe_without_sysfs() {
        let root = tempfile::tempdir().unwrap();
        let monitor = monitor_at(root.path());
        assert!(matches!(monitor.subscribe(), Err(MonitorError::Io(_))));
    }

    #[tokio::test]
    async fn test_subscribe_emits_first_poll() {
        let root = tempfile::tempdir().unwrap();
        let lo = root.path().join("class/net/lo");
        std::fs::create_dir_all(&lo).unwrap();
        std::fs::write(lo.join("type"), "772\n").unwrap();
        std::fs::write(lo.join("flags"), "0x9\n").unwrap();
        std::fs::write(lo.join("operstate"), "unknown\n").unwrap();
        std::fs::write(lo.join("ifindex"), "1\n").unwrap();

        let monitor = monitor_at(root.path());
        let mut rx = monitor.subscribe().unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.status, PathStatus::Unsatisfied);
        assert_eq!(first.interfaces.len(), 1);
        assert_eq!(first.interfaces[0].kind, InterfaceType::Loopback);

        // Unchanged state is not re-emitted.
        let next = tokio::time::timeout(Duration::from_millis(1500), rx.recv()).await;
        assert!(next.is_err());
    }
}
