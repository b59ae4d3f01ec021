//! Turns the current [`PathState`] into titled sections of display rows.
//!
//! Everything here is pure. Absent optional values render as fallback text;
//! rows are never dropped.

use crate::interface::InterfaceType;
use crate::path::{PathSnapshot, PathStatus, PeerPathSnapshot, TrafficClass, UnsatisfiedReason};
use crate::state::PathState;
use serde::Serialize;
use std::fmt::Write as _;
use std::time::Duration;

pub const NO_GATEWAYS: &str = "No gateways configured for the interface.";
pub const NO_INTERFACES: &str = "No interfaces available.";
pub const NO_LOCAL_ENDPOINT: &str = "No local endpoint";
pub const NO_REMOTE_ENDPOINT: &str = "No remote endpoint";
pub const NOT_WIFI_AWARE: &str = "Path is not over Wi-Fi Aware.";

const UNKNOWN: &str = "(unknown)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Row {
    Field {
        label: String,
        subtitle: Option<String>,
        value: String,
    },
    /// Navigable sub-list.
    Link { title: String, entries: Vec<String> },
    Message(String),
}

impl Row {
    fn field(label: &str, value: impl Into<String>) -> Self {
        Row::Field {
            label: label.to_string(),
            subtitle: None,
            value: value.into(),
        }
    }

    fn field_with_subtitle(label: &str, subtitle: &str, value: impl Into<String>) -> Self {
        Row::Field {
            label: label.to_string(),
            subtitle: Some(subtitle.to_string()),
            value: value.into(),
        }
    }

    fn flag(label: &str, value: bool) -> Self {
        Row::field(label, value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub title: String,
    pub rows: Vec<Row>,
}

impl Section {
    fn new(title: &str, rows: Vec<Row>) -> Self {
        Self {
            title: title.to_string(),
            rows,
        }
    }
}

pub fn status_text(status: PathStatus, reason: UnsatisfiedReason) -> String {
    match status {
        PathStatus::Satisfied => "Available".to_string(),
        PathStatus::RequiresConnection => "Connecting".to_string(),
        PathStatus::Unsatisfied if reason == UnsatisfiedReason::None => "Not available".to_string(),
        PathStatus::Unsatisfied => format!("Not available: {}", reason),
    }
}

/// Distinct interface type labels in order of first appearance.
pub fn interface_types_text(path: &PathSnapshot) -> String {
    let mut kinds: Vec<InterfaceType> = Vec::new();
    for iface in &path.interfaces {
        if !kinds.contains(&iface.kind) {
            kinds.push(iface.kind);
        }
    }
    kinds
        .iter()
        .map(|k| k.label())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn interface_rows(path: &PathSnapshot) -> Vec<Row> {
    if path.interfaces.is_empty() {
        return vec![Row::Message(NO_INTERFACES.to_string())];
    }
    path.interfaces
        .iter()
        .map(|iface| {
            let mut entries: Vec<String> = path
                .gateways_for(iface)
                .map(|g| g.endpoint.to_string())
                .collect();
            if entries.is_empty() {
                entries.push(NO_GATEWAYS.to_string());
            }
            Row::Link {
                title: iface.to_string(),
                entries,
            }
        })
        .collect()
}

pub fn performance_text(peer: &PeerPathSnapshot) -> String {
    let report = peer.report(TrafficClass::BestEffort);
    let signal = report
        .and_then(|r| r.signal_strength)
        .map(|s| format!("{:.2}", s))
        .unwrap_or_else(|| UNKNOWN.to_string());
    let latency = report
        .and_then(|r| r.transmit_latency)
        .map(|l| format!("{:.2} ms", l.as_secs_f64() * 1000.0))
        .unwrap_or_else(|| UNKNOWN.to_string());
    format!("Signal Strength: {}\nTransmit Latency: {}", signal, latency)
}

/// Whole-second humantime rendering, e.g. `1h 2m 3s`.
pub fn duration_text(d: Duration) -> String {
    if d.as_secs() == 0 {
        return "0s".to_string();
    }
    humantime::format_duration(Duration::from_secs(d.as_secs())).to_string()
}

fn peer_rows(peer: Option<&PeerPathSnapshot>) -> Vec<Row> {
    match peer {
        Some(peer) => vec![
            Row::field("Endpoint", peer.endpoint.to_string()),
            Row::field("Performance", performance_text(peer)),
            Row::field("Active Duration", duration_text(peer.active_duration)),
        ],
        None => vec![Row::Message(NOT_WIFI_AWARE.to_string())],
    }
}

pub fn present(state: &PathState) -> Vec<Section> {
    let path = &state.path;
    vec![
        Section::new(
            "Status",
            vec![
                Row::field("Status", status_text(path.status, path.unsatisfied_reason)),
                Row::field("Interface Types", interface_types_text(path)),
            ],
        ),
        Section::new("Interfaces", interface_rows(path)),
        Section::new(
            "Capabilities",
            vec![
                Row::flag("Supports IPv4", path.supports_ipv4),
                Row::flag("Supports IPv6", path.supports_ipv6),
                Row::flag("Supports DNS", path.supports_dns),
                Row::field_with_subtitle("Constrained", "Low Data Mode", path.is_constrained.to_string()),
                Row::flag("User Constrained", path.is_user_constrained),
                Row::field_with_subtitle("Expensive", "Metered path", path.is_expensive.to_string()),
                Row::field("Link Quality", path.link_quality.label()),
            ],
        ),
        Section::new(
            "Endpoints",
            vec![
                Row::field(
                    "Local Endpoint",
                    path.local_endpoint
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| NO_LOCAL_ENDPOINT.to_string()),
                ),
                Row::field(
                    "Remote Endpoint",
                    path.remote_endpoint
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| NO_REMOTE_ENDPOINT.to_string()),
                ),
            ],
        ),
        Section::new("Wi-Fi Aware", peer_rows(state.peer.as_ref())),
    ]
}

/// Plain-text rendering of presented sections.
pub fn render_text(sections: &[Section]) -> String {
    let mut out = String::new();
    for (i, section) in sections.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "{}", section.title);
        for row in &section.rows {
            match row {
                Row::Field {
                    label,
                    subtitle,
                    value,
                } => {
                    let label = match subtitle {
                        Some(sub) => format!("{} ({})", label, sub),
                        None => label.clone(),
                    };
                    let mut lines = value.lines();
                    let _ = writeln!(out, "  {}: {}", label, lines.next().unwrap_or_default());
                    let indent = " ".repeat(label.len() + 4);
                    for line in lines {
                        let _ = writeln!(out, "{}{}", indent, line);
                    }
                }
                Row::Link { title, entries } => {
                    let _ = writeln!(out, "  {}", title);
                    for entry in entries {
                        let _ = writeln!(out, "    {}", entry);
                    }
                }
                Row::Message(text) => {
                    let _ = writeln!(out, "  {}", text);
                }
            }
        }
    }
    out
}
