use crate::{
    AoeAddress, AoeHeader, AoeRx, AoeTx, BlockDevice, ConfigHeader, DeviceInfo, EthernetAddress,
    InitiatorConfig, Interface, NPERSHELF, ReceiveAction, Timeouts,
    command::Command,
    device::{ConfigOutcome, DeviceFlags, Response},
    discovery::DiscoveryTimer,
    error::Error,
    fmt,
    registry::DeviceRegistry,
    timeouts::micros,
};
use alloc::{collections::VecDeque, sync::Arc, vec::Vec};
use aoecrab_wire::AoeWireRead;
use core::sync::atomic::{AtomicBool, Ordering};

/// The AoE initiator.
///
/// Owns the device registry and the network interfaces AoE traffic flows over. Frames are moved
/// on and off the wire by the [`AoeTx`]/[`AoeRx`] pair returned from
/// [`add_interface`](Initiator::add_interface), and [`run_timers`](Initiator::run_timers) must be
/// called every [`Timeouts::tick`] to drive retransmission and discovery.
///
/// Time is read from the `clock` given to [`new`](Initiator::new), a monotonic microsecond counter.
#[doc(alias = "Client")]
#[derive(Debug)]
pub struct Initiator {
    registry: DeviceRegistry,
    interfaces: spin::RwLock<Vec<Arc<Interface>>>,
    /// Identified devices waiting for their block device.
    pending_disks: spin::Mutex<VecDeque<AoeAddress>>,
    discovery: DiscoveryTimer,
    pub(crate) config: InitiatorConfig,
    pub(crate) timeouts: Timeouts,
    clock: fn() -> u64,
    exit_flag: AtomicBool,
}

impl Initiator {
    /// Create a new initiator with no interfaces.
    pub fn new(config: InitiatorConfig, timeouts: Timeouts, clock: fn() -> u64) -> Self {
        Self {
            registry: DeviceRegistry::new(),
            interfaces: spin::RwLock::new(Vec::new()),
            pending_disks: spin::Mutex::new(VecDeque::new()),
            discovery: DiscoveryTimer::new(micros(timeouts.discovery)),
            config,
            timeouts,
            clock,
            exit_flag: AtomicBool::new(false),
        }
    }

    pub(crate) fn now(&self) -> u64 {
        (self.clock)()
    }

    /// Timeouts this initiator was created with.
    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Start using a network interface for AoE.
    ///
    /// Returns the TX and RX adapters that must be driven for this interface, e.g. with
    /// [`tx_rx_task`](crate::std::tx_rx_task).
    pub fn add_interface(
        &self,
        name: &str,
        mac: EthernetAddress,
        mtu: usize,
    ) -> Result<(AoeTx<'_>, AoeRx<'_>), Error> {
        if self.should_exit() {
            return Err(Error::ShuttingDown);
        }

        let netif = Arc::new(Interface::new(name, mac, mtu)?);

        fmt::info!("Using {} ({}) with MTU {}", name, mac, mtu);

        self.interfaces.write().push(Arc::clone(&netif));

        Ok((AoeTx::new(self, Arc::clone(&netif)), AoeRx::new(self, netif)))
    }

    fn interfaces(&self) -> Vec<Arc<Interface>> {
        self.interfaces.read().clone()
    }

    /// Broadcast a config query for every shelf and slot on every interface.
    pub fn discover(&self) {
        self.query(AoeAddress::BROADCAST);
    }

    /// Ask the target at `major`.`minor` to report its config again. A response re-identifies
    /// the device if it is not open.
    pub fn revalidate(&self, major: u16, minor: u8) {
        self.query(AoeAddress::new(major, minor));
    }

    fn query(&self, address: AoeAddress) {
        if self.should_exit() {
            return;
        }

        for netif in self.interfaces() {
            fmt::debug!("Config query for {} on {}", address, netif.name());

            netif.enqueue([Command::ConfigQuery.frame(
                EthernetAddress::BROADCAST,
                netif.mac(),
                address,
                0,
            )]);
        }
    }

    /// Scan every device for frames due for retransmission.
    pub fn tick(&self) {
        let now = self.now();

        for device in self.registry.snapshot() {
            device.with_state(|state| state.rexmit_scan(now));
        }
    }

    /// Run everything that must happen periodically: retransmission, discovery when due, and
    /// block device creation for newly identified devices.
    ///
    /// Call every [`Timeouts::tick`].
    pub fn run_timers(&self) {
        if self.should_exit() {
            return;
        }

        self.tick();

        if self.discovery.due(self.now()) {
            self.discover();
        }

        self.process_pending_disks();
    }

    /// Create block devices for devices that have been identified since the last call. Each device
    /// is brought up once its block device exists.
    ///
    /// Returns the number of block devices created.
    pub fn process_pending_disks(&self) -> usize {
        let mut created = 0;

        loop {
            let Some(address) = self.pending_disks.lock().pop_front() else {
                break;
            };

            let Some(device) = self.registry.find(address) else {
                continue;
            };

            let mut state = device.lock();

            if !state.flags.contains(DeviceFlags::DISK_PENDING)
                || state.flags.contains(DeviceFlags::TKILL)
            {
                continue;
            }

            state.flags.remove(DeviceFlags::DISK_PENDING);
            state.flags.insert(DeviceFlags::DISK);

            created += 1;

            // Downed since it was identified. The next IDENTIFY brings it up.
            if state.sectors == 0 {
                fmt::warn!("etherd/{}: no capacity, leaving down", address);

                continue;
            }

            state.flags.insert(DeviceFlags::UP);

            fmt::info!(
                "etherd/{}: {} sectors on {}",
                address,
                state.sectors,
                state.netif.name()
            );
        }

        created
    }

    pub(crate) fn handle_config_response(
        &self,
        netif: &Arc<Interface>,
        src: EthernetAddress,
        header: AoeHeader,
        body: &[u8],
    ) -> Result<ReceiveAction, Error> {
        let config = ConfigHeader::unpack_from_slice(body).inspect_err(|&e| {
            fmt::error!("Failed to parse config header: {}", e);
        })?;

        if header.major == 0xffff {
            fmt::error!(
                "Warning: shelf address is all ones. Check shelf dip switches on {}",
                src
            );

            return Ok(ReceiveAction::Ignored);
        }

        if u32::from(header.minor) >= NPERSHELF {
            fmt::error!(
                "e{}.{}: AoE device minor number too large, NPERSHELF is {}",
                header.major,
                header.minor,
                NPERSHELF
            );

            return Ok(ReceiveAction::Ignored);
        }

        let address = AoeAddress::new(header.major, header.minor);

        let (device, created) = self.registry.register(
            address,
            src,
            netif,
            self.config.frames_for(config.buffer_count),
            &self.config,
            self.timeouts,
        );

        if created {
            fmt::info!(
                "{}: discovered at {} on {}, buffer count {}",
                address,
                src,
                netif.name(),
                config.buffer_count
            );
        }

        let now = self.now();

        match device.with_state(|state| state.on_config(netif, src, &config, now)) {
            ConfigOutcome::Identifying => fmt::debug!("{}: identifying", address),
            ConfigOutcome::Busy => {
                fmt::debug!("{}: frames outstanding, identify deferred", address)
            }
            ConfigOutcome::Refreshed => (),
        }

        Ok(ReceiveAction::Processed)
    }

    pub(crate) fn handle_ata_response(
        &self,
        src: EthernetAddress,
        header: AoeHeader,
        body: &[u8],
    ) -> Result<ReceiveAction, Error> {
        let address = AoeAddress::new(header.major, header.minor);

        let Some(device) = self.registry.find_by_mac_and_address(src, address) else {
            fmt::debug!("Response from unknown device {} at {}", address, src);

            return Ok(ReceiveAction::Ignored);
        };

        let response = Response {
            header,
            payload: body.to_vec(),
        };

        if device.deliver(response, self.now()) {
            self.pending_disks.lock().push_back(address);
        }

        Ok(ReceiveAction::Processed)
    }

    /// Get a handle to the block device of the target at `major`.`minor`.
    ///
    /// Returns `None` until the target has been identified and its block device created by
    /// [`process_pending_disks`](Initiator::process_pending_disks).
    pub fn block_device(&self, major: u16, minor: u8) -> Option<BlockDevice> {
        let device = self.registry.find(AoeAddress::new(major, minor))?;

        let has_disk = device.lock().flags.contains(DeviceFlags::DISK);

        has_disk.then(|| BlockDevice::new(device, self.clock))
    }

    /// A snapshot of every known device.
    pub fn devices(&self) -> Vec<DeviceInfo> {
        let mut devices = self
            .registry
            .snapshot()
            .iter()
            .map(|device| device.lock().info())
            .collect::<Vec<_>>();

        devices.sort_by_key(|info| info.address);

        devices
    }

    /// The first device whose target has MAC address `mac`.
    pub fn find_by_mac(&self, mac: EthernetAddress) -> Option<DeviceInfo> {
        self.registry
            .find_by_mac(mac)
            .map(|device| device.lock().info())
    }

    /// Forget the device at `major`.`minor`, failing anything it still has in flight.
    ///
    /// Fails with [`Error::Busy`] if the device is open.
    pub fn remove_device(&self, major: u16, minor: u8) -> Result<(), Error> {
        let address = AoeAddress::new(major, minor);

        let device = self
            .registry
            .find(address)
            .ok_or(Error::UnknownDevice { major, minor })?;

        device.with_state(|state| {
            if state.open_count > 0 {
                return Err(Error::Busy);
            }

            state.teardown();

            Ok(())
        })?;

        self.registry.remove(address);

        Ok(())
    }

    /// Stop discovery, tear down every device and ask the TX/RX tasks to exit.
    ///
    /// Every request still queued or in flight fails with [`Error::Io`].
    pub fn shutdown(&self) {
        fmt::debug!("Shutting down initiator");

        self.exit_flag.store(true, Ordering::Release);
        self.discovery.kill();

        for device in self.registry.clear() {
            device.with_state(|state| state.teardown());
        }

        self.pending_disks.lock().clear();

        for netif in self.interfaces() {
            netif.wake();
        }
    }

    /// Returns `true` once [`shutdown`](Initiator::shutdown) has been called.
    pub fn should_exit(&self) -> bool {
        self.exit_flag.load(Ordering::Acquire)
    }
}
