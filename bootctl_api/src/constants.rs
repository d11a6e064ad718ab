// Controller resource constants

/// Default computer system id exposed by the controller.
pub const DEFAULT_SYSTEM_ID: &str = "System.Embedded.1";

/// Default manager (controller) id.
pub const DEFAULT_MANAGER_ID: &str = "iDRAC.Embedded.1";

/// Default chassis id that owns the network adapters.
pub const DEFAULT_CHASSIS_ID: &str = "System.Embedded.1";

/// Root of the Redfish service.
pub const REDFISH_ROOT: &str = "/redfish/v1";

/// Key the controller expects the apply-time directive under.
pub const SETTINGS_APPLY_TIME_KEY: &str = "@Redfish.SettingsApplyTime";

/// Attribute object carrying the iSCSI boot settings of a device function.
pub const ISCSI_BOOT_SECTION: &str = "iSCSIBoot";

// Boot order constants

/// Slot used for iSCSI boot when the boot order gives no usable answer.
pub const DEFAULT_ISCSI_BOOT_SLOT: &str = "Boot0004";

// Firmware constants

/// Oldest controller firmware known to accept every iSCSI boot attribute.
pub const MIN_KNOWN_GOOD_FIRMWARE: &str = "4.40.00.00";

// Target catalog constants

/// Default path of the target catalog.
pub const TARGET_CATALOG_PATH_DEFAULT: &str = "/etc/iscsi-bootctl/targets.yaml";

/// Default iSCSI TCP port.
pub const DEFAULT_ISCSI_PORT: u16 = 3260;

// Timing constants

/// Default time to wait for a server to come back after a reset, in seconds.
pub const REBOOT_WAIT_TIMEOUT_SECS: u64 = 600;

/// Default interval between power state polls, in seconds.
pub const REBOOT_POLL_INTERVAL_SECS: u64 = 15;

/// Default timeout of a single controller request, in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 60;
