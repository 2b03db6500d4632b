pub mod repair;
pub mod status;
pub mod version;
