//! Set of known devices.

use crate::{
    AoeAddress, EthernetAddress, InitiatorConfig, Interface, Timeouts, device::Device, fmt,
};
use alloc::{sync::Arc, vec::Vec};

/// Every AoE target the initiator has heard from.
///
/// Lookups take a read lock and clone out an `Arc<Device>` so callers never hold the registry lock
/// while working on a device.
#[derive(Debug, Default)]
pub(crate) struct DeviceRegistry {
    devices: spin::RwLock<Vec<Arc<Device>>>,
}

impl DeviceRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Find a device by its AoE address.
    pub(crate) fn find(&self, address: AoeAddress) -> Option<Arc<Device>> {
        self.devices
            .read()
            .iter()
            .find(|device| device.address() == address)
            .cloned()
    }

    /// Find the first device whose target MAC is `mac`.
    pub(crate) fn find_by_mac(&self, mac: EthernetAddress) -> Option<Arc<Device>> {
        self.devices
            .read()
            .iter()
            .find(|device| device.lock().mac == mac)
            .cloned()
    }

    /// Find the device at `address` that was last heard from `mac`.
    ///
    /// A single target MAC can serve many shelf/slot addresses, so responses are routed on both.
    pub(crate) fn find_by_mac_and_address(
        &self,
        mac: EthernetAddress,
        address: AoeAddress,
    ) -> Option<Arc<Device>> {
        self.find(address)
            .filter(|device| device.lock().mac == mac)
    }

    /// Return the device at `address`, creating it if this is the first time it has been seen.
    ///
    /// The second element of the returned tuple is `true` if the device was created.
    pub(crate) fn register(
        &self,
        address: AoeAddress,
        mac: EthernetAddress,
        netif: &Arc<Interface>,
        nframes: u16,
        config: &InitiatorConfig,
        timeouts: Timeouts,
    ) -> (Arc<Device>, bool) {
        if let Some(device) = self.find(address) {
            return (device, false);
        }

        let mut devices = self.devices.write();

        // Another thread may have registered it between the two locks.
        if let Some(device) = devices.iter().find(|device| device.address() == address) {
            return (Arc::clone(device), false);
        }

        let device = Arc::new(Device::new(
            address,
            mac,
            Arc::clone(netif),
            nframes,
            config,
            timeouts,
        ));

        devices.push(Arc::clone(&device));

        (device, true)
    }

    /// Remove the device at `address`.
    pub(crate) fn remove(&self, address: AoeAddress) -> Option<Arc<Device>> {
        let mut devices = self.devices.write();

        let idx = devices
            .iter()
            .position(|device| device.address() == address)?;

        fmt::debug!("{}: removed from registry", address);

        Some(devices.swap_remove(idx))
    }

    /// Remove every device.
    pub(crate) fn clear(&self) -> Vec<Arc<Device>> {
        core::mem::take(&mut *self.devices.write())
    }

    /// A copy of the current device list.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Device>> {
        self.devices.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: EthernetAddress = EthernetAddress([0x00, 0x10, 0x04, 0x00, 0x00, 0x01]);
    const OTHER: EthernetAddress = EthernetAddress([0x00, 0x10, 0x04, 0x00, 0x00, 0x02]);

    fn netif() -> Arc<Interface> {
        Arc::new(Interface::new("test0", EthernetAddress([2, 0, 0, 0, 0, 1]), 1500).unwrap())
    }

    #[test]
    fn register_is_idempotent() {
        crate::test_logger();

        let registry = DeviceRegistry::new();
        let netif = netif();
        let config = InitiatorConfig::default();

        let (a, created) = registry.register(
            AoeAddress::new(1, 1),
            TARGET,
            &netif,
            4,
            &config,
            Timeouts::default(),
        );

        assert!(created);

        let (b, created) = registry.register(
            AoeAddress::new(1, 1),
            TARGET,
            &netif,
            4,
            &config,
            Timeouts::default(),
        );

        assert!(!created);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn lookups() {
        crate::test_logger();

        let registry = DeviceRegistry::new();
        let netif = netif();
        let config = InitiatorConfig::default();

        for minor in 0..3 {
            registry.register(
                AoeAddress::new(0, minor),
                TARGET,
                &netif,
                4,
                &config,
                Timeouts::default(),
            );
        }

        assert!(registry.find(AoeAddress::new(0, 2)).is_some());
        assert!(registry.find(AoeAddress::new(0, 3)).is_none());
        assert!(registry.find_by_mac(TARGET).is_some());
        assert!(registry.find_by_mac(OTHER).is_none());

        assert!(
            registry
                .find_by_mac_and_address(TARGET, AoeAddress::new(0, 1))
                .is_some()
        );
        assert!(
            registry
                .find_by_mac_and_address(OTHER, AoeAddress::new(0, 1))
                .is_none()
        );

        assert!(registry.remove(AoeAddress::new(0, 1)).is_some());
        assert!(registry.remove(AoeAddress::new(0, 1)).is_none());
        assert_eq!(registry.snapshot().len(), 2);
        assert_eq!(registry.clear().len(), 2);
        assert!(registry.snapshot().is_empty());
    }
}
