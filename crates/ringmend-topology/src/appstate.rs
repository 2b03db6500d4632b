//! Gossip application state decoding.
//!
//! Nodes report their metadata as `(tag, value)` pairs. Tags form a
//! closed, versioned set; this module maps each known tag to a typed
//! field and skips unknown tags explicitly rather than guessing.

use std::collections::BTreeMap;
use std::fmt;

use ringmend_gateway::AppStateEntry;
use tracing::debug;

use crate::error::{TopologyError, TopologyResult};

/// Known application state tags, numbered as the node reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AppStateTag {
    Status,
    Load,
    Schema,
    Dc,
    Rack,
    ReleaseVersion,
    RemovalCoordinator,
    InternalIp,
    RpcAddress,
    Severity,
    NetVersion,
    X11Padding,
    HostId,
    Tokens,
    SupportedFeatures,
    CacheHitrates,
    SchemaTablesVersion,
    RpcReady,
    ViewBacklog,
}

impl AppStateTag {
    pub const ALL: [AppStateTag; 19] = [
        AppStateTag::Status,
        AppStateTag::Load,
        AppStateTag::Schema,
        AppStateTag::Dc,
        AppStateTag::Rack,
        AppStateTag::ReleaseVersion,
        AppStateTag::RemovalCoordinator,
        AppStateTag::InternalIp,
        AppStateTag::RpcAddress,
        AppStateTag::Severity,
        AppStateTag::NetVersion,
        AppStateTag::X11Padding,
        AppStateTag::HostId,
        AppStateTag::Tokens,
        AppStateTag::SupportedFeatures,
        AppStateTag::CacheHitrates,
        AppStateTag::SchemaTablesVersion,
        AppStateTag::RpcReady,
        AppStateTag::ViewBacklog,
    ];

    /// Map a numeric tag. `None` for tags this release does not know.
    pub fn from_code(code: i64) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn name(self) -> &'static str {
        match self {
            AppStateTag::Status => "status",
            AppStateTag::Load => "load",
            AppStateTag::Schema => "schema",
            AppStateTag::Dc => "dc",
            AppStateTag::Rack => "rack",
            AppStateTag::ReleaseVersion => "release_version",
            AppStateTag::RemovalCoordinator => "removal_coordinator",
            AppStateTag::InternalIp => "internal_ip",
            AppStateTag::RpcAddress => "rpc_address",
            AppStateTag::Severity => "severity",
            AppStateTag::NetVersion => "net_version",
            AppStateTag::X11Padding => "x_11_padding",
            AppStateTag::HostId => "host_id",
            AppStateTag::Tokens => "tokens",
            AppStateTag::SupportedFeatures => "supported_features",
            AppStateTag::CacheHitrates => "cache_hitrates",
            AppStateTag::SchemaTablesVersion => "schema_tables_version",
            AppStateTag::RpcReady => "rpc_ready",
            AppStateTag::ViewBacklog => "view_backlog",
        }
    }
}

impl fmt::Display for AppStateTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded application state of one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationState {
    /// First comma-separated segment of the raw status, e.g. `NORMAL`.
    pub status: String,
    /// On-disk load in bytes; 0 when not reported.
    pub load: u64,
    /// Owned tokens in reported order.
    pub tokens: Vec<String>,
    pub dc: Option<String>,
    pub rack: Option<String>,
    pub release_version: Option<String>,
    pub supported_features: Vec<String>,
    pub cache_hitrates: Vec<String>,
    /// Every recognized tag with its raw value.
    raw: BTreeMap<AppStateTag, String>,
    /// Numeric tags that were skipped.
    ignored: Vec<i64>,
}

impl ApplicationState {
    pub fn parse(endpoint: &str, entries: &[AppStateEntry]) -> TopologyResult<Self> {
        let mut raw = BTreeMap::new();
        let mut ignored = Vec::new();

        for entry in entries {
            match AppStateTag::from_code(entry.application_state) {
                Some(tag) => {
                    raw.insert(tag, entry.value.clone());
                }
                None => {
                    debug!(%endpoint, tag = entry.application_state, "ignoring unknown application state tag");
                    ignored.push(entry.application_state);
                }
            }
        }

        let required = |tag: AppStateTag| {
            raw.get(&tag).ok_or_else(|| TopologyError::FieldNotPresent {
                endpoint: endpoint.to_string(),
                field: tag.name(),
            })
        };

        let status = required(AppStateTag::Status)?
            .split(',')
            .next()
            .unwrap_or_default()
            .to_string();
        let tokens = split_list(required(AppStateTag::Tokens)?, ';');

        let load = match raw.get(&AppStateTag::Load) {
            Some(value) => parse_load(value).ok_or_else(|| TopologyError::InvalidField {
                endpoint: endpoint.to_string(),
                field: AppStateTag::Load.name(),
                value: value.clone(),
            })?,
            None => 0,
        };

        Ok(Self {
            status,
            load,
            tokens,
            dc: raw.get(&AppStateTag::Dc).cloned(),
            rack: raw.get(&AppStateTag::Rack).cloned(),
            release_version: raw.get(&AppStateTag::ReleaseVersion).cloned(),
            supported_features: raw
                .get(&AppStateTag::SupportedFeatures)
                .map(|v| split_list(v, ','))
                .unwrap_or_default(),
            cache_hitrates: raw
                .get(&AppStateTag::CacheHitrates)
                .map(|v| split_list(v, ';'))
                .unwrap_or_default(),
            raw,
            ignored,
        })
    }

    /// Raw value of any known tag.
    pub fn raw(&self, tag: AppStateTag) -> Option<&str> {
        self.raw.get(&tag).map(String::as_str)
    }

    pub fn ignored_tags(&self) -> &[i64] {
        &self.ignored
    }
}

/// Loads are reported as floating point byte counts.
fn parse_load(value: &str) -> Option<u64> {
    let bytes: f64 = value.trim().parse().ok()?;
    if bytes.is_finite() && bytes >= 0.0 {
        Some(bytes.trunc() as u64)
    } else {
        None
    }
}

fn split_list(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tag: i64, value: &str) -> AppStateEntry {
        AppStateEntry {
            application_state: tag,
            value: value.to_string(),
        }
    }

    fn full_state() -> Vec<AppStateEntry> {
        vec![
            entry(0, "NORMAL,-9223372036854775808"),
            entry(1, "1.5368E9"),
            entry(3, "dc1"),
            entry(4, "rack1"),
            entry(5, "3.0.8"),
            entry(13, "-9223372036854775808;-3074457345618258603;3074457345618258602"),
            entry(14, "CDC,LWT,UDF"),
            entry(15, "ks1.t1:0.5;ks1.t2:0.25"),
        ]
    }

    #[test]
    fn every_code_round_trips_through_the_closed_set() {
        for (i, tag) in AppStateTag::ALL.iter().enumerate() {
            assert_eq!(AppStateTag::from_code(i as i64), Some(*tag));
            assert_eq!(tag.code(), i as i64);
        }
        assert_eq!(AppStateTag::from_code(19), None);
        assert_eq!(AppStateTag::from_code(-1), None);
    }

    #[test]
    fn parses_documented_fields() {
        let state = ApplicationState::parse("10.0.0.1", &full_state()).unwrap();
        assert_eq!(state.status, "NORMAL");
        assert_eq!(state.load, 1_536_800_000);
        assert_eq!(state.tokens.len(), 3);
        assert_eq!(state.tokens[0], "-9223372036854775808");
        assert_eq!(state.dc.as_deref(), Some("dc1"));
        assert_eq!(state.rack.as_deref(), Some("rack1"));
        assert_eq!(state.release_version.as_deref(), Some("3.0.8"));
        assert_eq!(state.supported_features, vec!["CDC", "LWT", "UDF"]);
        assert_eq!(state.cache_hitrates, vec!["ks1.t1:0.5", "ks1.t2:0.25"]);
        assert_eq!(state.raw(AppStateTag::Status), Some("NORMAL,-9223372036854775808"));
    }

    #[test]
    fn status_without_comma_is_kept_whole() {
        let state =
            ApplicationState::parse("10.0.0.1", &[entry(0, "shutdown"), entry(13, "1")]).unwrap();
        assert_eq!(state.status, "shutdown");
    }

    #[test]
    fn missing_load_defaults_to_zero() {
        let state =
            ApplicationState::parse("10.0.0.1", &[entry(0, "NORMAL,1"), entry(13, "1")]).unwrap();
        assert_eq!(state.load, 0);
        assert!(state.dc.is_none());
        assert!(state.supported_features.is_empty());
    }

    #[test]
    fn missing_tokens_is_field_not_present() {
        let err = ApplicationState::parse("10.0.0.9", &[entry(0, "NORMAL,1")]).unwrap_err();
        match err {
            TopologyError::FieldNotPresent { endpoint, field } => {
                assert_eq!(endpoint, "10.0.0.9");
                assert_eq!(field, "tokens");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_status_is_field_not_present() {
        let err = ApplicationState::parse("10.0.0.9", &[entry(13, "1")]).unwrap_err();
        assert!(matches!(err, TopologyError::FieldNotPresent { field: "status", .. }));
    }

    #[test]
    fn unknown_tags_are_skipped_not_mismapped() {
        let mut entries = full_state();
        entries.push(entry(42, "mystery"));
        let state = ApplicationState::parse("10.0.0.1", &entries).unwrap();
        assert_eq!(state.ignored_tags(), &[42]);
        assert_eq!(state.dc.as_deref(), Some("dc1"));
    }

    #[test]
    fn garbage_load_is_invalid() {
        let err = ApplicationState::parse(
            "10.0.0.1",
            &[entry(0, "NORMAL"), entry(1, "lots"), entry(13, "1")],
        )
        .unwrap_err();
        assert!(matches!(err, TopologyError::InvalidField { field: "load", .. }));
    }
}
