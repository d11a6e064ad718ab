use anyhow::{Context, Error};
use log::debug;
use serde_json::Value;

use super::{dump, fetch_json, RedfishTransport, ResourceLayout};

/// Enumerates the ids of all network device functions, adapter by adapter, in
/// the order the controller lists them.
pub fn discover_nics(
    transport: &dyn RedfishTransport,
    layout: &ResourceLayout,
) -> Result<Vec<String>, Error> {
    let adapters = fetch_json(transport, &layout.network_adapters())
        .context("Failed to list network adapters")?;

    let mut nics = Vec::new();
    for adapter in member_links(&adapters) {
        let functions = fetch_json(transport, &format!("{adapter}/NetworkDeviceFunctions"))
            .with_context(|| format!("Failed to list device functions of '{adapter}'"))?;
        for function in member_links(&functions) {
            if let Some(id) = function.trim_end_matches('/').rsplit('/').next() {
                nics.push(id.to_string());
            }
        }
    }

    debug!("Discovered NICs: {nics:?}");
    Ok(nics)
}

fn member_links(collection: &Value) -> Vec<String> {
    collection
        .get("Members")
        .and_then(Value::as_array)
        .map(|members| {
            members
                .iter()
                .filter_map(|member| member.get("@odata.id")?.as_str())
                .map(|link| link.trim_end_matches('/').to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Reads a NIC's device function and returns its flattened property dump.
pub fn nic_properties(
    transport: &dyn RedfishTransport,
    layout: &ResourceLayout,
    nic_id: &str,
) -> Result<String, Error> {
    let resource = fetch_json(transport, &layout.nic(nic_id))
        .with_context(|| format!("Failed to read NIC '{nic_id}'"))?;
    Ok(dump::render_properties(&resource))
}

/// Like [`nic_properties`], for the NIC's `/Settings` resource that holds
/// changes pending the next reset.
pub fn nic_staged_properties(
    transport: &dyn RedfishTransport,
    layout: &ResourceLayout,
    nic_id: &str,
) -> Result<String, Error> {
    let resource = fetch_json(transport, &layout.nic_settings(nic_id))
        .with_context(|| format!("Failed to read staged settings of NIC '{nic_id}'"))?;
    Ok(dump::render_properties(&resource))
}
