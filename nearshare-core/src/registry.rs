//! Device registry
//!
//! Keeps exactly one authoritative, deduplicated list of peer devices,
//! keyed by device id. Status updates from the engine either remove a
//! device (status 0) or insert-or-replace it wholesale (status 1).
//! There is no partial-field merge, so the list never shows a device
//! stitched together from two different snapshots.
//!
//! Every mutation publishes the complete resulting list plus the delta
//! (added/removed ids) to all subscribers. Consecutive mutations are
//! published individually, never coalesced.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Device is not currently reachable
pub const DEVICE_OFFLINE: u8 = 0;
/// Device is online and accepting transfers
pub const DEVICE_ONLINE: u8 = 1;

/// Snapshot of one peer device as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    /// Reachable endpoint, `host:port`
    pub ip_addr: String,
    /// 0 = offline, 1 = online
    pub status: u8,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub source_port_type: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub time_stamp: i64,
}

/// Ids added and removed by one registry mutation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl DeviceDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Full resulting list plus the delta for one mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceListUpdate {
    pub devices: Vec<Device>,
    pub delta: DeviceDelta,
}

struct RegistryState {
    devices: HashMap<String, Device>,
    subscribers: Vec<mpsc::UnboundedSender<DeviceListUpdate>>,
}

/// Authoritative device list, serialized behind a single mutex
pub struct DeviceRegistry {
    state: Mutex<RegistryState>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                devices: HashMap::new(),
                subscribers: Vec::new(),
            }),
        }
    }

    /// Subscribe to list updates. Each mutation delivers the complete
    /// resulting list plus its delta; dead receivers are pruned on the
    /// next publish.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<DeviceListUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().expect("device registry poisoned");
        state.subscribers.push(tx);
        rx
    }

    /// Apply one add/update/remove notification from the engine
    ///
    /// Status 0 removes the device (absent is a no-op, logged). Status 1
    /// inserts or replaces the stored snapshot wholesale, preferring the
    /// newest payload's field values.
    pub fn apply_update(&self, device: Device) {
        let mut state = self.state.lock().expect("device registry poisoned");
        let mut delta = DeviceDelta::default();

        if device.status == DEVICE_OFFLINE {
            if state.devices.remove(&device.id).is_some() {
                info!("Device {} went offline, removed", device.id);
                delta.removed.push(device.id.clone());
            } else {
                warn!("Offline notification for unknown device {}", device.id);
                return;
            }
        } else {
            let id = device.id.clone();
            if state.devices.insert(id.clone(), device).is_none() {
                info!("Device {} added to registry", id);
                delta.added.push(id);
            } else {
                debug!("Device {} snapshot replaced", id);
            }
        }

        Self::publish(&mut state, delta);
    }

    /// Replace the whole registry with `list` in one atomic step
    ///
    /// Used on reconnect/recovery. Subscribers observe a single update
    /// whose delta is the diff against the previous snapshot, not a
    /// full reset.
    pub fn reconcile_full_list(&self, list: Vec<Device>) {
        let mut state = self.state.lock().expect("device registry poisoned");

        let mut next: HashMap<String, Device> = HashMap::with_capacity(list.len());
        for device in list {
            if device.status == DEVICE_OFFLINE {
                debug!("Skipping offline device {} in full list", device.id);
                continue;
            }
            next.insert(device.id.clone(), device);
        }

        let mut delta = DeviceDelta::default();
        for id in next.keys() {
            if !state.devices.contains_key(id) {
                delta.added.push(id.clone());
            }
        }
        for id in state.devices.keys() {
            if !next.contains_key(id) {
                delta.removed.push(id.clone());
            }
        }
        delta.added.sort();
        delta.removed.sort();

        info!(
            "Reconciled device list: {} devices ({} added, {} removed)",
            next.len(),
            delta.added.len(),
            delta.removed.len()
        );

        state.devices = next;
        Self::publish(&mut state, delta);
    }

    /// Read-only copy of the current list, ordered by device id
    pub fn snapshot(&self) -> Vec<Device> {
        let state = self.state.lock().expect("device registry poisoned");
        Self::ordered(&state.devices)
    }

    pub fn get(&self, device_id: &str) -> Option<Device> {
        let state = self.state.lock().expect("device registry poisoned");
        state.devices.get(device_id).cloned()
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock().expect("device registry poisoned");
        state.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ordered(devices: &HashMap<String, Device>) -> Vec<Device> {
        let mut list: Vec<_> = devices.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    fn publish(state: &mut RegistryState, delta: DeviceDelta) {
        let update = DeviceListUpdate {
            devices: Self::ordered(&state.devices),
            delta,
        };
        state
            .subscribers
            .retain(|tx| tx.send(update.clone()).is_ok());
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, status: u8, name: &str) -> Device {
        Device {
            id: id.to_string(),
            ip_addr: "192.168.1.20:4411".into(),
            status,
            platform: "macos".into(),
            device_name: name.into(),
            source_port_type: "wifi".into(),
            version: "1.4".into(),
            time_stamp: 1000,
        }
    }

    #[test]
    fn test_remove_then_add_leaves_one_entry() {
        let registry = DeviceRegistry::new();
        registry.apply_update(device("d1", DEVICE_ONLINE, "Old name"));
        registry.apply_update(device("d1", DEVICE_OFFLINE, ""));
        registry.apply_update(device("d1", DEVICE_ONLINE, "Mac"));

        let list = registry.snapshot();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].device_name, "Mac");
    }

    #[test]
    fn test_update_replaces_snapshot_wholesale() {
        let registry = DeviceRegistry::new();
        registry.apply_update(device("d1", DEVICE_ONLINE, "Mac"));

        let mut replacement = device("d1", DEVICE_ONLINE, "MacBook");
        replacement.version = "2.0".into();
        registry.apply_update(replacement);

        let stored = registry.get("d1").unwrap();
        assert_eq!(stored.device_name, "MacBook");
        assert_eq!(stored.version, "2.0");
    }

    #[test]
    fn test_remove_absent_device_is_a_no_op() {
        let registry = DeviceRegistry::new();
        let mut rx = registry.subscribe();

        registry.apply_update(device("ghost", DEVICE_OFFLINE, ""));

        assert!(registry.is_empty());
        assert!(rx.try_recv().is_err(), "no publish for a no-op removal");
    }

    #[test]
    fn test_add_then_remove_emits_two_updates() {
        let registry = DeviceRegistry::new();
        let mut rx = registry.subscribe();

        registry.apply_update(device("d1", DEVICE_ONLINE, "Mac"));
        registry.apply_update(device("d1", DEVICE_OFFLINE, ""));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.delta.added, vec!["d1".to_string()]);
        assert_eq!(first.devices.len(), 1);

        let second = rx.try_recv().unwrap();
        assert_eq!(second.delta.removed, vec!["d1".to_string()]);
        assert!(second.devices.is_empty());

        assert!(registry.is_empty());
    }

    #[test]
    fn test_reconcile_emits_diff_not_reset() {
        let registry = DeviceRegistry::new();
        registry.apply_update(device("d1", DEVICE_ONLINE, "Mac"));
        registry.apply_update(device("d2", DEVICE_ONLINE, "Tablet"));

        let mut rx = registry.subscribe();
        registry.reconcile_full_list(vec![
            device("d2", DEVICE_ONLINE, "Tablet"),
            device("d3", DEVICE_ONLINE, "Phone"),
        ]);

        let update = rx.try_recv().unwrap();
        assert_eq!(update.delta.added, vec!["d3".to_string()]);
        assert_eq!(update.delta.removed, vec!["d1".to_string()]);
        assert_eq!(update.devices.len(), 2);
    }

    #[test]
    fn test_reconcile_skips_offline_entries() {
        let registry = DeviceRegistry::new();
        registry.reconcile_full_list(vec![
            device("d1", DEVICE_ONLINE, "Mac"),
            device("d2", DEVICE_OFFLINE, "Gone"),
        ]);

        assert_eq!(registry.len(), 1);
        assert!(registry.get("d2").is_none());
    }
}
