use serde::{Deserialize, Serialize};
use std::fmt;

const ARPHRD_ETHER: u16 = 1;
const ARPHRD_RAWIP: u16 = 519;
const ARPHRD_LOOPBACK: u16 = 772;
const ARPHRD_IEEE80211: u16 = 801;

/// IFF_UP from `<net/if.h>`.
pub const IFF_UP: u32 = 0x1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceType {
    #[default]
    Other,
    Wifi,
    Cellular,
    WiredEthernet,
    Loopback,
}

impl InterfaceType {
    pub fn label(self) -> &'static str {
        match self {
            InterfaceType::Other => "Other",
            InterfaceType::Wifi => "Wifi",
            InterfaceType::Cellular => "cellular",
            InterfaceType::WiredEthernet => "Wired Ethernet",
            InterfaceType::Loopback => "Loopback",
        }
    }
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: InterfaceType,
    #[serde(default)]
    pub index: u32,
}

impl Interface {
    pub fn new(name: impl Into<String>, kind: InterfaceType, index: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            index,
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.kind)
    }
}

/// Link state as reported by `/sys/class/net/<if>/operstate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperState {
    Up,
    Down,
    Dormant,
    Unknown,
}

impl OperState {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "up" => OperState::Up,
            "dormant" => OperState::Dormant,
            "unknown" => OperState::Unknown,
            _ => OperState::Down,
        }
    }
}

/// Raw facts about one kernel link, gathered from sysfs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub name: String,
    pub index: u32,
    pub arp_type: u16,
    pub flags: u32,
    pub oper_state: OperState,
    pub wireless: bool,
    pub dev_type: Option<String>,
}

impl LinkInfo {
    pub fn classify(&self) -> InterfaceType {
        if self.arp_type == ARPHRD_LOOPBACK {
            return InterfaceType::Loopback;
        }
        if self.wireless || self.arp_type == ARPHRD_IEEE80211 || self.dev_type.as_deref() == Some("wlan")
        {
            return InterfaceType::Wifi;
        }
        if self.dev_type.as_deref() == Some("wwan")
            || self.name.starts_with("wwan")
            || self.arp_type == ARPHRD_RAWIP
        {
            return InterfaceType::Cellular;
        }
        // Tunnels and virtual bridges report ARPHRD_ETHER too.
        if self.arp_type == ARPHRD_ETHER && self.dev_type.is_none() {
            return InterfaceType::WiredEthernet;
        }
        InterfaceType::Other
    }

    pub fn is_up(&self) -> bool {
        self.flags & IFF_UP != 0
    }

    /// Up and carrying traffic.
    pub fn is_available(&self) -> bool {
        self.is_up() && matches!(self.oper_state, OperState::Up | OperState::Unknown)
    }

    /// Up but waiting on something (usually wifi authentication).
    pub fn is_dormant(&self) -> bool {
        self.is_up() && self.oper_state == OperState::Dormant
    }

    pub fn to_interface(&self) -> Interface {
        Interface::new(self.name.clone(), self.classify(), self.index)
    }
}

/// Pulls `DEVTYPE=` out of a sysfs `uevent` file.
pub fn parse_dev_type(uevent: &str) -> Option<String> {
    uevent
        .lines()
        .find_map(|l| l.strip_prefix("DEVTYPE="))
        .map(|v| v.trim().to_string())
}

/// Parses a sysfs `flags` value such as `0x1003`.
pub fn parse_flags(s: &str) -> Option<u32> {
    let s = s.trim();
    let hex = s.strip_prefix("0x").unwrap_or(s);
    u32::from_str_radix(hex, 16).ok()
}
