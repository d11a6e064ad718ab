//! Resolves a logical boot device request against the free-text boot slot
//! enumeration the firmware exposes.
//!
//! Each slot label is classified by an ordered list of pattern rules; the
//! first rule that matches wins. Firmware format drift is handled by adding
//! rules, not by changing the resolution logic.

use anyhow::{Context, Error};
use log::{debug, warn};
use regex::Regex;

use bootctl_api::constants::DEFAULT_ISCSI_BOOT_SLOT;

/// Class of a boot device inferred from its label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BootClass {
    Iscsi,
    Hdd,
    Pxe,
    Cd,
    Usb,
    Bios,
    Floppy,
    #[strum(to_string = "virtualCD")]
    VirtualCd,
    Http,
    Unknown,
}

/// One boot slot as enumerated by the firmware.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootDevice {
    /// Slot identifier, e.g. `Boot0004`.
    pub slot_id: String,

    /// Label exactly as the firmware reported it.
    pub raw_label: String,

    pub inferred_class: BootClass,
}

/// How a resolution departed from an exact class match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fallback {
    /// A generic network boot slot stood in for iSCSI.
    PxeSubstitute,

    /// Nothing suitable was found; the first slot was taken as a last resort.
    FirstSlot,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub device: BootDevice,

    /// Set when the slot was picked by a fallback rule.
    pub fallback: Option<Fallback>,
}

impl Resolution {
    pub fn slot_id(&self) -> &str {
        &self.device.slot_id
    }
}

/// A label pattern and the class it implies.
#[derive(Clone, Debug)]
pub struct ClassificationRule {
    pub class: BootClass,
    pub pattern: Regex,
}

// Specific classes come before the generic ones they overlap with: "Virtual
// CD" before "CD", "iSCSI ... NIC" and "HTTP ... NIC" before PXE/network.
const DEFAULT_RULES: &[(BootClass, &str)] = &[
    (BootClass::Iscsi, r"iscsi"),
    (BootClass::Iscsi, r"\biqn\.\d{4}-\d{2}\."),
    (BootClass::VirtualCd, r"virtual\s*(cd|dvd|optical|media)"),
    (BootClass::VirtualCd, r"\bvcd\b"),
    (BootClass::Floppy, r"floppy"),
    (BootClass::Usb, r"\busb\b"),
    (BootClass::Usb, r"flash\s*drive|removable"),
    (BootClass::Http, r"\bhttps?\b"),
    (BootClass::Pxe, r"\bpxe"),
    (BootClass::Pxe, r"\bnic\b|network|ethernet|\blan\b"),
    (BootClass::Cd, r"\bcd\b|cd-?rom|dvd|optical"),
    (
        BootClass::Hdd,
        r"hard\s*(drive|disk)|\bhdd\b|\bssd\b|nvme|\bdisk\b|\braid\b|\bboss\b|\bsata\b|\bsas\b",
    ),
    (BootClass::Bios, r"\bbios\b|uiapp|(efi|internal)\s*shell|\bsetup\b"),
];

pub struct BootOrderResolver {
    rules: Vec<ClassificationRule>,
    slot_pattern: Regex,
}

impl BootOrderResolver {
    /// Resolver with the built-in classification rules.
    pub fn new() -> Result<Self, Error> {
        let rules = DEFAULT_RULES
            .iter()
            .map(|(class, pattern)| rule(*class, pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Self::with_rules(rules)
    }

    /// Resolver with a custom ordered rule list.
    pub fn with_rules(rules: Vec<ClassificationRule>) -> Result<Self, Error> {
        Ok(Self {
            rules,
            // `Boot0001: label`, `Boot0001* label` (efibootmgr) or a bare id
            slot_pattern: Regex::new(r"^\s*(Boot[0-9A-Fa-f]{4})\*?(?:\s*[:=-]\s*|\s+|$)(.*)$")
                .context("Failed to compile boot slot pattern")?,
        })
    }

    /// Adds a rule consulted before all existing ones.
    pub fn with_rule(mut self, class: BootClass, pattern: &str) -> Result<Self, Error> {
        self.rules.insert(0, rule(class, pattern)?);
        Ok(self)
    }

    /// Class of a label: the class of the first matching rule.
    pub fn classify(&self, label: &str) -> BootClass {
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(label))
            .map(|rule| rule.class)
            .unwrap_or(BootClass::Unknown)
    }

    /// Parses the boot slot enumeration. Lines that don't name a slot are
    /// ignored; a slot listed twice keeps its first entry.
    pub fn parse(&self, boot_order_text: &str) -> Vec<BootDevice> {
        let mut devices: Vec<BootDevice> = Vec::new();
        for line in boot_order_text.lines() {
            let Some(captures) = self.slot_pattern.captures(line) else {
                continue;
            };
            let slot_id = captures[1].to_string();
            if devices.iter().any(|device| device.slot_id == slot_id) {
                continue;
            }
            let raw_label = captures
                .get(2)
                .map(|label| label.as_str().trim().to_string())
                .unwrap_or_default();
            let inferred_class = self.classify(&raw_label);
            devices.push(BootDevice {
                slot_id,
                raw_label,
                inferred_class,
            });
        }
        devices
    }

    /// Resolves `requested` to a concrete slot. Returns `None` only when no
    /// slot of the requested class exists and no fallback applies; never fails.
    ///
    /// For iSCSI, when no slot is classified as iSCSI, the first PXE slot is
    /// returned instead, and failing that the first slot overall. Both
    /// substitutions are flagged on the result.
    pub fn resolve(&self, boot_order_text: &str, requested: BootClass) -> Option<Resolution> {
        let devices = self.parse(boot_order_text);
        debug!("Parsed boot devices: {devices:#?}");

        if let Some(device) = devices.iter().find(|d| d.inferred_class == requested) {
            return Some(Resolution {
                device: device.clone(),
                fallback: None,
            });
        }

        if requested != BootClass::Iscsi {
            return None;
        }

        if let Some(device) = devices.iter().find(|d| d.inferred_class == BootClass::Pxe) {
            warn!(
                "[boot-order-fallback] No iSCSI boot slot found; substituting network boot slot {} ('{}'). Some firmware only exposes iSCSI boot as a generic network entry",
                device.slot_id, device.raw_label
            );
            return Some(Resolution {
                device: device.clone(),
                fallback: Some(Fallback::PxeSubstitute),
            });
        }

        let first = devices.into_iter().next()?;
        warn!(
            "[boot-order-fallback] No iSCSI or network boot slot found; falling back to first slot {} ('{}'). This is a last resort and may not be the intended device",
            first.slot_id, first.raw_label
        );
        Some(Resolution {
            device: first,
            fallback: Some(Fallback::FirstSlot),
        })
    }

    /// Like [`resolve`](Self::resolve), but an unresolved iSCSI request
    /// yields the default iSCSI slot.
    pub fn resolve_slot(&self, boot_order_text: &str, requested: BootClass) -> Option<String> {
        match self.resolve(boot_order_text, requested) {
            Some(resolution) => Some(resolution.device.slot_id),
            None if requested == BootClass::Iscsi => {
                warn!(
                    "[boot-order-fallback] No boot order data; using default iSCSI slot {DEFAULT_ISCSI_BOOT_SLOT}"
                );
                Some(DEFAULT_ISCSI_BOOT_SLOT.to_string())
            }
            None => None,
        }
    }
}

fn rule(class: BootClass, pattern: &str) -> Result<ClassificationRule, Error> {
    Ok(ClassificationRule {
        class,
        pattern: Regex::new(&format!("(?i){pattern}"))
            .with_context(|| format!("Invalid classification pattern '{pattern}'"))?,
    })
}

/// Moves `first` to the front of `order`, adding it if absent.
pub fn promote(order: &[String], first: &str) -> Vec<String> {
    std::iter::once(first.to_string())
        .chain(order.iter().filter(|slot| *slot != first).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::str::FromStr;

    use indoc::indoc;

    fn resolver() -> BootOrderResolver {
        BootOrderResolver::new().unwrap()
    }

    #[test]
    fn test_classify() {
        let resolver = resolver();
        let cases = [
            ("Hard Drive C:", BootClass::Hdd),
            ("PXE Device 1: Integrated NIC 1 Port 1 Partition 1", BootClass::Pxe),
            ("Virtual CD", BootClass::VirtualCd),
            ("Virtual Floppy Drive", BootClass::Floppy),
            ("iSCSI Device 1: NIC.Integrated.1-1-1", BootClass::Iscsi),
            ("UEFI HTTP Device 1: Integrated NIC 1 Port 1", BootClass::Http),
            ("Front USB 1: Flash Disk", BootClass::Usb),
            ("Embedded SATA Port Optical Drive E: DVD-ROM", BootClass::Cd),
            ("Integrated RAID Controller 1: Ubuntu", BootClass::Hdd),
            ("UEFI Internal Shell", BootClass::Bios),
            ("Something Else", BootClass::Unknown),
        ];
        for (label, class) in cases {
            assert_eq!(resolver.classify(label), class, "label '{label}'");
        }
    }

    #[test]
    fn test_parse_formats() {
        let text = indoc! {"
            BootCurrent: 0001
            BootOrder: 0001,0000
            Boot0001: Hard Drive C:
            Boot0002* PXE Device 1
            Boot0003
            Boot0001: Duplicate entry
        "};
        let devices = resolver().parse(text);
        assert_eq!(
            devices,
            vec![
                BootDevice {
                    slot_id: "Boot0001".into(),
                    raw_label: "Hard Drive C:".into(),
                    inferred_class: BootClass::Hdd,
                },
                BootDevice {
                    slot_id: "Boot0002".into(),
                    raw_label: "PXE Device 1".into(),
                    inferred_class: BootClass::Pxe,
                },
                BootDevice {
                    slot_id: "Boot0003".into(),
                    raw_label: String::new(),
                    inferred_class: BootClass::Unknown,
                },
            ]
        );
    }

    #[test]
    fn test_resolve_exact_iscsi() {
        let text = "Boot0001: PXE Device 1\nBoot0004: iSCSI Device 1\nBoot0005: Hard Drive C:";
        let resolution = resolver().resolve(text, BootClass::Iscsi).unwrap();
        assert_eq!(resolution.slot_id(), "Boot0004");
        assert_eq!(resolution.fallback, None);
    }

    #[test]
    fn test_resolve_pxe_substitute() {
        let text = "Boot0001: Hard Drive C:\nBoot0002: PXE Device 1\nBoot0003: Virtual CD";
        let resolution = resolver().resolve(text, BootClass::Iscsi).unwrap();
        assert_eq!(resolution.slot_id(), "Boot0002");
        assert_eq!(resolution.fallback, Some(Fallback::PxeSubstitute));
    }

    #[test]
    fn test_resolve_first_slot_last_resort() {
        let text = "Boot0007: Hard Drive C:\nBoot0003: Virtual CD";
        let resolution = resolver().resolve(text, BootClass::Iscsi).unwrap();
        assert_eq!(resolution.slot_id(), "Boot0007");
        assert_eq!(resolution.fallback, Some(Fallback::FirstSlot));
    }

    #[test]
    fn test_resolve_other_classes_have_no_fallback() {
        let text = "Boot0001: Hard Drive C:\nBoot0002: PXE Device 1";
        let resolver = resolver();
        assert_eq!(
            resolver.resolve(text, BootClass::Pxe).unwrap().slot_id(),
            "Boot0002"
        );
        assert_eq!(resolver.resolve(text, BootClass::Cd), None);
        assert_eq!(resolver.resolve_slot(text, BootClass::Cd), None);
    }

    #[test]
    fn test_resolve_empty_uses_default_slot() {
        let resolver = resolver();
        assert_eq!(resolver.resolve("", BootClass::Iscsi), None);
        assert_eq!(
            resolver.resolve_slot("", BootClass::Iscsi).as_deref(),
            Some("Boot0004")
        );
    }

    #[test]
    fn test_custom_rule_takes_precedence() {
        let resolver = resolver()
            .with_rule(BootClass::Iscsi, r"storage\s*lan")
            .unwrap();
        let text = "Boot0001: PXE Device 1\nBoot0009: Storage LAN Boot";
        let resolution = resolver.resolve(text, BootClass::Iscsi).unwrap();
        assert_eq!(resolution.slot_id(), "Boot0009");
        assert_eq!(resolution.fallback, None);

        assert!(BootOrderResolver::new()
            .unwrap()
            .with_rule(BootClass::Pxe, "(")
            .is_err());
    }

    #[test]
    fn test_parse_class_names() {
        assert_eq!(BootClass::from_str("iscsi").unwrap(), BootClass::Iscsi);
        assert_eq!(BootClass::from_str("virtualCD").unwrap(), BootClass::VirtualCd);
        assert_eq!(BootClass::from_str("PXE").unwrap(), BootClass::Pxe);
        assert_eq!(BootClass::VirtualCd.to_string(), "virtualCD");
        BootClass::from_str("tape").unwrap_err();
    }

    #[test]
    fn test_promote() {
        let order: Vec<String> = ["Boot0001", "Boot0002", "Boot0004"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            promote(&order, "Boot0004"),
            vec!["Boot0004", "Boot0001", "Boot0002"]
        );
        assert_eq!(
            promote(&order, "Boot0009"),
            vec!["Boot0009", "Boot0001", "Boot0002", "Boot0004"]
        );
    }
}
