pub mod apply;
pub mod attributes;
pub mod bootorder;
pub mod cli;
pub mod config;
pub mod orchestrate;
pub mod reboot;
pub mod reconcile;
pub mod redfish;
pub mod validation;

pub use orchestrate::Orchestrator;

/// Version as provided by environment variables at build time
pub const BOOTCTL_VERSION: &str = match option_env!("BOOTCTL_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};
