use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

use bootctl_api::constants::{REBOOT_WAIT_TIMEOUT_SECS, TARGET_CATALOG_PATH_DEFAULT};

use crate::{bootorder::BootClass, BOOTCTL_VERSION};

#[derive(Parser, Debug)]
#[clap(version = BOOTCTL_VERSION)]
pub struct Cli {
    /// Logging verbosity [OFF, ERROR, WARN, INFO, DEBUG, TRACE]
    #[arg(global = true, short, long, default_value_t = LevelFilter::Info)]
    pub verbosity: LevelFilter,

    /// Path to the iSCSI target catalog
    #[arg(global = true, long, default_value = TARGET_CATALOG_PATH_DEFAULT)]
    pub catalog: PathBuf,

    /// Path to save an eventual fatal error
    #[arg(global = true, short, long)]
    pub error: Option<PathBuf>,

    /// Emit session milestones as JSON trace events on stderr
    #[arg(global = true, long)]
    pub trace: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

/// Out-of-band controller to talk to
#[derive(Args, Debug, Clone)]
pub struct ControllerArgs {
    /// Controller address, a host name or URL
    #[arg(short, long)]
    pub server: String,

    /// Controller user name
    #[arg(short, long)]
    pub user: String,

    /// Controller password
    #[arg(short, long)]
    pub password: String,

    /// Verify the controller's TLS certificate
    #[arg(long)]
    pub verify_tls: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Configure a NIC to boot from a catalog target
    #[clap(name = "configure-target")]
    ConfigureTarget {
        #[command(flatten)]
        controller: ControllerArgs,

        /// NIC device function id, e.g. NIC.Integrated.1-1-1
        #[arg(short, long)]
        nic: String,

        /// Name of the primary target in the catalog
        #[arg(short, long)]
        target: String,

        /// Name of a second catalog target for multipath boot
        #[arg(long)]
        secondary_target: Option<String>,

        /// Custom initiator IQN
        #[arg(long)]
        initiator_name: Option<String>,

        /// Default gateway override
        #[arg(long)]
        gateway: Option<String>,

        /// Stage the changes for the next reboot instead of restarting now
        #[arg(long)]
        no_reboot: bool,

        /// Write attributes to the device function instead of its settings
        /// resource
        #[arg(long)]
        direct_api: bool,

        /// After restarting, wait for the server to power back on before
        /// validating
        #[arg(long)]
        wait: bool,

        /// Seconds to wait for the server with --wait
        #[arg(long, default_value_t = REBOOT_WAIT_TIMEOUT_SECS)]
        wait_timeout: u64,
    },

    /// Put the first device of a class at the front of the boot order
    #[clap(name = "set-boot-order")]
    SetBootOrder {
        #[command(flatten)]
        controller: ControllerArgs,

        /// Device class: iscsi, hdd, pxe, cd, usb, bios, floppy, virtualCD, http
        #[arg(short, long, default_value = "iscsi")]
        first_boot_class: BootClass,

        /// Don't reboot after changing the boot order
        #[arg(long)]
        no_reboot: bool,
    },

    /// Disable iSCSI boot on every NIC except the primary one
    #[clap(name = "disable-redundant")]
    DisableRedundant {
        #[command(flatten)]
        controller: ControllerArgs,

        /// NIC that keeps its iSCSI boot configuration
        #[arg(long, required_unless_present = "list_only")]
        primary_nic: Option<String>,

        /// Only print the iSCSI state of each NIC
        #[arg(long)]
        list_only: bool,

        /// Power the server on if it is off when rebooting
        #[arg(long)]
        force: bool,

        /// Stage the changes for the next reboot
        #[arg(long)]
        no_reboot: bool,
    },

    /// Check a NIC's iSCSI boot configuration
    Validate {
        #[command(flatten)]
        controller: ControllerArgs,

        /// NIC device function id
        #[arg(short, long)]
        nic: String,

        /// IQN the primary target is expected to have
        #[arg(long)]
        expected_iqn: Option<String>,
    },

    /// Reset BIOS settings to factory defaults
    #[clap(name = "reset-to-defaults")]
    ResetToDefaults {
        #[command(flatten)]
        controller: ControllerArgs,

        /// Don't reboot to apply the defaults
        #[arg(long)]
        no_reboot: bool,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::ConfigureTarget { .. } => "configure-target",
            Commands::SetBootOrder { .. } => "set-boot-order",
            Commands::DisableRedundant { .. } => "disable-redundant",
            Commands::Validate { .. } => "validate",
            Commands::ResetToDefaults { .. } => "reset-to-defaults",
        }
    }

    pub fn controller(&self) -> &ControllerArgs {
        match self {
            Commands::ConfigureTarget { controller, .. }
            | Commands::SetBootOrder { controller, .. }
            | Commands::DisableRedundant { controller, .. }
            | Commands::Validate { controller, .. }
            | Commands::ResetToDefaults { controller, .. } => controller,
        }
    }
}

impl Display for Commands {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.name())
    }
}
