//! Shared vocabulary for the ringmend workspace.
//!
//! Every other crate depends on this one for the error taxonomy
//! ([`ErrorClass`]), the repair status vocabulary ([`RepairStatus`]),
//! token ranges, and the tunable [`Settings`].

pub mod error;
pub mod range;
pub mod settings;
pub mod status;

pub use error::{Classify, ErrorClass};
pub use range::TokenRange;
pub use settings::{
    ChannelSettings, RepairSettings, Settings, SettingsError, TunnelSettings, parse_duration,
};
pub use status::RepairStatus;
