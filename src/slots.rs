//! Device slot manager
//!
//! Assigns each opened gamepad one of the four protocol slots, filters
//! devices by name and queues devices that arrive while every slot is taken.
//!
//! ## Lifecycle
//! - `try_open`: slot table full -> device id queued; hardware open failure or
//!   filter mismatch -> no slot; otherwise lowest free slot.
//! - `close`: frees the slot, then retries every queued device id in arrival
//!   order. The first one that opens takes over the freed slot.
//!
//! None of the rejections are errors. They are expected, recoverable outcomes.

use regex::Regex;
use std::collections::{HashMap, VecDeque};

use crate::gamepad::{GamepadState, SlotTable, SLOT_COUNT};
use crate::input::{GamepadBackend, GamepadDevice, MotionSensors};

// ============================================================================
// Device handle
// ============================================================================

/// An open device bound to a slot
///
/// Owns the backend device. Dropping the handle releases it, so a device is
/// closed exactly once whether it is removed, rejected or the process exits.
pub struct DeviceHandle<D: GamepadDevice> {
    device_id: u32,
    slot: u8,
    name: String,
    motion: MotionSensors,
    sensors_enabled: bool,
    device: D,
}

impl<D: GamepadDevice> DeviceHandle<D> {
    fn new(device_id: u32, slot: u8, device: D) -> Self {
        Self {
            device_id,
            slot,
            name: device.name().to_string(),
            motion: device.motion_sensors(),
            sensors_enabled: false,
            device,
        }
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn motion(&self) -> MotionSensors {
        self.motion
    }

    pub fn sensors_enabled(&self) -> bool {
        self.sensors_enabled
    }

    /// Set motion reporting, `None` toggles the current state
    ///
    /// Returns the resulting state. Devices without motion sensors stay off.
    pub fn change_sensor_state(&mut self, enable: Option<bool>) -> bool {
        if !self.motion.is_supported() {
            return false;
        }

        let target = enable.unwrap_or(!self.sensors_enabled);
        if target == self.sensors_enabled {
            return self.sensors_enabled;
        }

        if self.device.set_sensors_enabled(target) {
            self.sensors_enabled = target;
            tracing::info!(
                device_id = self.device_id,
                slot = self.slot,
                name = %self.name,
                enabled = target,
                "Motion sensors switched"
            );
        } else {
            tracing::warn!(
                device_id = self.device_id,
                name = %self.name,
                enabled = target,
                "Device refused motion sensor change"
            );
        }
        self.sensors_enabled
    }
}

impl<D: GamepadDevice> Drop for DeviceHandle<D> {
    fn drop(&mut self) {
        tracing::info!(
            device_id = self.device_id,
            slot = self.slot,
            name = %self.name,
            "Stopped watching gamepad"
        );
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Outcome of [`DeviceManager::close`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosedSlot {
    pub slot: u8,
    /// Queued device that took over the slot
    pub successor: Option<u32>,
}

/// Owns the slot table and every open device handle
pub struct DeviceManager<B: GamepadBackend> {
    backend: B,
    filter: Regex,
    slots: SlotTable,
    handles: HashMap<u32, DeviceHandle<B::Device>>,
    pending: VecDeque<u32>,
}

impl<B: GamepadBackend> DeviceManager<B> {
    /// `filter` is matched against device names, build it case-insensitive
    pub fn new(backend: B, filter: Regex) -> Self {
        Self {
            backend,
            filter,
            slots: SlotTable::new(),
            handles: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Device ids waiting for a free slot, oldest first
    pub fn pending(&self) -> impl Iterator<Item = u32> + '_ {
        self.pending.iter().copied()
    }

    pub fn open_count(&self) -> usize {
        self.handles.len()
    }

    pub fn handle(&self, device_id: u32) -> Option<&DeviceHandle<B::Device>> {
        self.handles.get(&device_id)
    }

    /// Slot a device currently occupies
    pub fn slot_of(&self, device_id: u32) -> Option<u8> {
        self.handles.get(&device_id).map(DeviceHandle::slot)
    }

    /// First free slot index
    pub fn find_free_slot(&self) -> Option<u8> {
        self.slots.find_free_slot()
    }

    /// Mutable state of the slot an open device occupies
    pub fn state_mut(&mut self, device_id: u32) -> Option<(u8, &mut GamepadState)> {
        let slot = self.slot_of(device_id)?;
        self.slots.get_mut(slot).map(|state| (slot, state))
    }

    /// Try to give a device a slot
    pub fn try_open(&mut self, device_id: u32) -> Option<u8> {
        if self.handles.contains_key(&device_id) {
            tracing::debug!(device_id, "Gamepad already open");
            return self.slot_of(device_id);
        }

        self.pending.retain(|&id| id != device_id);
        if self.handles.len() >= SLOT_COUNT {
            tracing::info!(device_id, "All slots taken, gamepad queued");
            self.pending.push_back(device_id);
            return None;
        }

        let slot = self.find_free_slot()?;

        let device = match self.backend.open(device_id) {
            Ok(device) => device,
            Err(e) => {
                tracing::info!(device_id, error = %e, "Failed to start watching gamepad");
                return None;
            }
        };

        if !self.filter.is_match(device.name()) {
            tracing::info!(
                device_id,
                name = %device.name(),
                filter = %self.filter.as_str(),
                "Gamepad name does not match filter, ignoring"
            );
            return None;
        }

        let handle = DeviceHandle::new(device_id, slot, device);
        tracing::info!(
            device_id,
            slot,
            name = %handle.name(),
            motion = handle.motion().is_supported(),
            "Watching gamepad"
        );

        self.slots[slot] = Some(GamepadState::with_sensor_support(
            handle.motion().is_supported(),
        ));
        self.handles.insert(device_id, handle);
        Some(slot)
    }

    /// Release a device and hand its slot to a queued one
    ///
    /// Returns the freed slot and the queued device now occupying it, `None`
    /// if the device held no slot.
    pub fn close(&mut self, device_id: u32) -> Option<ClosedSlot> {
        self.pending.retain(|&id| id != device_id);

        let handle = self.handles.remove(&device_id)?;
        let slot = handle.slot();
        self.slots[slot] = None;
        drop(handle);

        let mut successor = None;
        let waiting = std::mem::take(&mut self.pending);
        for pending_id in waiting {
            if let Some(new_slot) = self.try_open(pending_id) {
                debug_assert_eq!(new_slot, slot, "queued gamepad must reuse the freed slot");
                tracing::info!(device_id = pending_id, slot = new_slot, "Queued gamepad took freed slot");
                successor = Some(pending_id);
            }
        }

        Some(ClosedSlot { slot, successor })
    }

    /// Change motion reporting for one device, `None` toggles
    pub fn change_sensor_state(&mut self, device_id: u32, enable: Option<bool>) -> Option<bool> {
        self.handles
            .get_mut(&device_id)
            .map(|handle| handle.change_sensor_state(enable))
    }

    /// Switch motion reporting for every open device
    pub fn change_sensor_state_for_all(&mut self, enable: bool) {
        for handle in self.handles.values_mut() {
            handle.change_sensor_state(Some(enable));
        }
    }

    /// Close every device, used on shutdown
    pub fn close_all(&mut self) {
        self.pending.clear();
        for (_, handle) in self.handles.drain() {
            self.slots[handle.slot()] = None;
        }
    }
}

// ============================================================================
// Test backend
// ============================================================================
