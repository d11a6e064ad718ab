//! Translates target descriptors into the ordered attribute groups written to a
//! NIC's iSCSI boot settings.
//!
//! The firmware enforces write dependencies between attributes (target fields
//! are rejected until the basic networking fields are committed), so groups
//! are always produced, and must be applied, in this order:
//!
//! 1. `basic`
//! 2. `primary-target`
//! 3. `chap` (primary target uses CHAP)
//! 4. `initiator-identity` (custom initiator name)
//! 5. `gateway` (gateway override)
//! 6. `secondary-target` and `secondary-chap` (multipath)

use serde_json::{json, Map, Value};

use bootctl_api::{catalog::TargetDescriptor, constants::ISCSI_BOOT_SECTION};

/// Names of the attribute groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum GroupKind {
    Basic,
    PrimaryTarget,
    Chap,
    InitiatorIdentity,
    Gateway,
    SecondaryTarget,
    SecondaryChap,
    /// Clears the iSCSI boot section; only used when disabling a NIC.
    Disable,
}

/// A named partial map of iSCSI boot attributes written in one request.
#[derive(Clone, Debug, PartialEq)]
pub struct BootAttributeGroup {
    pub kind: GroupKind,
    pub attributes: Map<String, Value>,
}

impl BootAttributeGroup {
    fn new(kind: GroupKind) -> Self {
        Self {
            kind,
            attributes: Map::new(),
        }
    }

    fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Group that clears the NIC's iSCSI boot section.
    pub fn disable() -> Self {
        Self::new(GroupKind::Disable)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Request body for this group, nested under the iSCSI boot section.
    pub fn to_patch(&self) -> Value {
        json!({ ISCSI_BOOT_SECTION: self.attributes })
    }
}

/// Optional inputs next to the primary target.
#[derive(Clone, Debug, Default)]
pub struct BuildOptions<'a> {
    /// Second target for multipath boot.
    pub secondary: Option<&'a TargetDescriptor>,

    /// Custom initiator IQN.
    pub initiator_name: Option<&'a str>,

    /// Default gateway override.
    pub gateway: Option<&'a str>,
}

/// Produces the ordered attribute groups for `primary`. Pure and
/// deterministic; groups without applicable fields are left out.
pub fn build_attribute_groups(
    primary: &TargetDescriptor,
    options: &BuildOptions,
) -> Vec<BootAttributeGroup> {
    let mut basic = BootAttributeGroup::new(GroupKind::Basic)
        .with("IPAddressType", "IPv4")
        .with("IPMaskDNSViaDHCP", true)
        .with("TargetInfoViaDHCP", false)
        .with("AuthenticationMethod", "None");
    if options.secondary.is_some() {
        basic = basic.with("MultipleConnectionsEnabled", true);
    }

    let mut groups = vec![
        basic,
        BootAttributeGroup::new(GroupKind::PrimaryTarget)
            .with("PrimaryTargetName", primary.iqn.as_str())
            .with("PrimaryTargetIPAddress", primary.ip.as_str())
            .with("PrimaryTargetTCPPort", primary.port)
            .with("PrimaryLUN", primary.lun),
    ];

    groups.extend(chap_group(GroupKind::Chap, primary));

    if let Some(name) = options.initiator_name.filter(|name| !name.is_empty()) {
        groups.push(
            BootAttributeGroup::new(GroupKind::InitiatorIdentity).with("InitiatorName", name),
        );
    }

    if let Some(gateway) = options.gateway.filter(|gateway| !gateway.is_empty()) {
        groups.push(
            BootAttributeGroup::new(GroupKind::Gateway).with("InitiatorDefaultGateway", gateway),
        );
    }

    if let Some(secondary) = options.secondary {
        groups.push(
            BootAttributeGroup::new(GroupKind::SecondaryTarget)
                .with("SecondaryTargetName", secondary.iqn.as_str())
                .with("SecondaryTargetIPAddress", secondary.ip.as_str())
                .with("SecondaryTargetTCPPort", secondary.port)
                .with("SecondaryLUN", secondary.lun),
        );
        groups.extend(chap_group(GroupKind::SecondaryChap, secondary));
    }

    groups.retain(|group| !group.attributes.is_empty());
    groups
}

// The function holds a single CHAP identity, so the secondary target's
// credentials land in the same keys.
fn chap_group(kind: GroupKind, target: &TargetDescriptor) -> Option<BootAttributeGroup> {
    let (username, secret) = target.chap_credentials()?;
    Some(
        BootAttributeGroup::new(kind)
            .with("AuthenticationMethod", "CHAP")
            .with("CHAPUsername", username)
            .with("CHAPSecret", secret),
    )
}
