//! Orchestration loop
//!
//! One task owns the slot table, the device handles and the subscription
//! registry. Device events arrive over a channel, datagrams over the socket,
//! and nothing else touches that state.
//!
//! Per iteration:
//! 1. drain every queued device event, collecting changed slots
//! 2. flush the changed slots to their subscribers in one batch
//! 3. wait for a datagram, a device event, the sensor policy tick or 1 ms

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::MissedTickBehavior;

use crate::clients::ActiveClients;
use crate::input::{DeviceEvent, GamepadBackend, InputKind};
use crate::normalize::{self, SensorToggleCombo};
use crate::server::{DatagramSocket, MotionServer, MAX_DATAGRAM_SIZE};
use crate::slots::DeviceManager;

/// How often the sensor auto-toggle policy runs
pub const SENSOR_POLICY_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound of one idle wait
pub const IDLE_WAIT: Duration = Duration::from_millis(1);

/// Behaviour switches for the loop
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Turn motion sensors off while nobody subscribes
    pub sensor_auto_toggle: bool,
    pub sensor_toggle_combo: SensorToggleCombo,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            sensor_auto_toggle: true,
            sensor_toggle_combo: SensorToggleCombo::default(),
        }
    }
}

pub struct MotionService<B: GamepadBackend, S: DatagramSocket> {
    devices: DeviceManager<B>,
    clients: ActiveClients,
    server: MotionServer<S>,
    options: ServiceOptions,
    /// Changed slots not yet flushed, with the event timestamp that last changed them
    changed: BTreeMap<u8, Option<u64>>,
}

impl<B: GamepadBackend, S: DatagramSocket> MotionService<B, S> {
    pub fn new(devices: DeviceManager<B>, server: MotionServer<S>, options: ServiceOptions) -> Self {
        Self {
            devices,
            clients: ActiveClients::new(),
            server,
            options,
            changed: BTreeMap::new(),
        }
    }

    pub fn devices(&self) -> &DeviceManager<B> {
        &self.devices
    }

    pub fn clients_mut(&mut self) -> &mut ActiveClients {
        &mut self.clients
    }

    /// Run until `shutdown` flips or its sender goes away
    pub async fn run(mut self, mut events: mpsc::Receiver<DeviceEvent>, mut shutdown: watch::Receiver<bool>) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut events_open = true;

        let mut policy = tokio::time::interval(SENSOR_POLICY_INTERVAL);
        policy.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(server_id = self.server.server_id(), "Motion service running");

        loop {
            while events_open {
                match events.try_recv() {
                    Ok(event) => self.handle_event(event).await,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        tracing::warn!("Device event source closed");
                        events_open = false;
                    }
                }
            }
            self.flush().await;

            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("Motion service stopping");
                    break;
                }
                _ = policy.tick() => {
                    self.apply_sensor_policy();
                }
                result = self.server.recv_from(&mut buf) => {
                    match result {
                        Ok((len, from)) => {
                            self.server
                                .handle_datagram(&buf[..len], from, self.devices.slots(), &mut self.clients)
                                .await;
                        }
                        Err(e) => tracing::warn!(error = %e, "Failed to receive datagram"),
                    }
                }
                Some(event) = events.recv(), if events_open => {
                    self.handle_event(event).await;
                }
                _ = tokio::time::sleep(IDLE_WAIT) => {}
            }
        }

        self.devices.close_all();
    }

    /// Apply one device event, recording which slot changed
    pub async fn handle_event(&mut self, event: DeviceEvent) {
        match event.kind {
            InputKind::Added => self.device_added(event.device_id),
            InputKind::Removed => {
                if let Some(closed) = self.devices.close(event.device_id) {
                    if let Some(successor) = closed.successor {
                        self.apply_sensors_on_open(successor);
                    }
                    self.changed.insert(closed.slot, None);
                }
            }
            kind => {
                let Some(slot) = self.devices.slot_of(event.device_id) else {
                    return;
                };

                // A new frame for a slot still waiting to be sent: send the
                // pending one first so it is not coalesced away
                if let Some(Some(marker)) = self.changed.get(&slot) {
                    if *marker != event.timestamp {
                        self.changed.remove(&slot);
                        self.flush_slots(&[slot].into_iter().collect()).await;
                    }
                }

                let Some((_, state)) = self.devices.state_mut(event.device_id) else {
                    return;
                };
                if !normalize::apply(state, &kind) {
                    return;
                }
                self.changed.insert(slot, Some(event.timestamp));

                if let InputKind::Button { button, pressed } = kind {
                    if self.options.sensor_toggle_combo.is_triggered(state, button, pressed) {
                        tracing::info!(device_id = event.device_id, slot, "Sensor toggle combination pressed");
                        self.devices.change_sensor_state(event.device_id, None);
                    }
                }
            }
        }
    }

    fn device_added(&mut self, device_id: u32) {
        let Some(slot) = self.devices.try_open(device_id) else {
            return;
        };

        self.apply_sensors_on_open(device_id);
        self.changed.insert(slot, None);
    }

    /// Freshly opened devices report motion only if someone may listen
    fn apply_sensors_on_open(&mut self, device_id: u32) {
        let enable = !self.options.sensor_auto_toggle || self.clients.has_active_clients();
        self.devices.change_sensor_state(device_id, Some(enable));
    }

    /// Send every pending slot change
    pub async fn flush(&mut self) {
        if self.changed.is_empty() {
            return;
        }
        let slots: BTreeSet<u8> = std::mem::take(&mut self.changed).into_keys().collect();
        self.flush_slots(&slots).await;
    }

    async fn flush_slots(&mut self, slots: &BTreeSet<u8>) {
        self.server
            .send_pad_data(self.devices.slots(), &mut self.clients, slots)
            .await;
    }

    /// Match sensor reporting to whether anyone is listening
    pub fn apply_sensor_policy(&mut self) {
        if !self.options.sensor_auto_toggle {
            return;
        }
        let enable = self.clients.has_active_clients();
        tracing::debug!(enable, "Applying sensor auto-toggle policy");
        self.devices.change_sensor_state_for_all(enable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Axis, Button};
    use crate::protocol::{decode_response, encode_request, PadDataRequest, Request, Response};
    use crate::slots::fake::{any_name, FakeBackend};
    use std::net::SocketAddr;
    use tokio::net::UdpSocket;

    const CLIENT_ID: u32 = 0x0BAD_CAFE;

    async fn service_with(ids: &[u32], options: ServiceOptions) -> (MotionService<FakeBackend, UdpSocket>, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let devices = DeviceManager::new(FakeBackend::with_devices(ids), any_name());
        let service = MotionService::new(devices, MotionServer::new(socket, 77), options);
        (service, addr)
    }

    fn subscribe_all(service: &mut MotionService<FakeBackend, UdpSocket>, client: SocketAddr) {
        service
            .clients_mut()
            .update_request(client, CLIENT_ID, &BTreeSet::new());
    }

    fn button(device_id: u32, timestamp: u64, button: Button, pressed: bool) -> DeviceEvent {
        DeviceEvent::new(device_id, timestamp, InputKind::Button { button, pressed })
    }

    async fn receive_pad_data(client: &UdpSocket) -> Option<crate::protocol::PadDataResponse> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let (len, _) = tokio::time::timeout(Duration::from_millis(100), client.recv_from(&mut buf))
            .await
            .ok()?
            .ok()?;
        match decode_response(&buf[..len])?.message {
            Response::PadData(pad) => Some(pad),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_end_to_end_first_press() {
        let (service, server_addr) = service_with(&[1], ServiceOptions::default()).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (event_tx, event_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scenario = async {
            let request = encode_request(CLIENT_ID, &Request::PadData(PadDataRequest::default()));
            client.send_to(&request, server_addr).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;

            event_tx.send(DeviceEvent::new(1, 10, InputKind::Added)).await.unwrap();
            event_tx.send(button(1, 20, Button::A, true)).await.unwrap();

            let pad = receive_pad_data(&client).await.expect("pad data for slot 0");
            assert_eq!(pad.port.slot, 0);
            assert_eq!(pad.packet_counter, 0);
            let report = pad.report.expect("slot 0 is occupied");
            assert_eq!(report.buttons_b & 0x40, 0x40);

            assert!(receive_pad_data(&client).await.is_none(), "no other slot reported");
            shutdown_tx.send(true).unwrap();
        };

        tokio::join!(service.run(event_rx, shutdown_rx), scenario);
    }

    #[tokio::test]
    async fn test_events_in_one_frame_are_batched() {
        let (mut service, _) = service_with(&[1], ServiceOptions::default()).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        subscribe_all(&mut service, client.local_addr().unwrap());

        service.handle_event(DeviceEvent::new(1, 1, InputKind::Added)).await;
        service.handle_event(button(1, 5, Button::A, true)).await;
        service.handle_event(button(1, 5, Button::B, true)).await;
        service.flush().await;

        let pad = receive_pad_data(&client).await.unwrap();
        assert_eq!(pad.packet_counter, 0);
        assert_eq!(pad.report.unwrap().buttons_b & 0x60, 0x60);
        assert!(receive_pad_data(&client).await.is_none());
    }

    #[tokio::test]
    async fn test_new_frame_flushes_pending_slot() {
        let (mut service, _) = service_with(&[1], ServiceOptions::default()).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        subscribe_all(&mut service, client.local_addr().unwrap());

        service.handle_event(DeviceEvent::new(1, 1, InputKind::Added)).await;
        service.handle_event(button(1, 5, Button::A, true)).await;
        // Different frame for the same slot before the batch is flushed
        service
            .handle_event(DeviceEvent::new(1, 6, InputKind::Axis { axis: Axis::TriggerRight, value: 32767 }))
            .await;

        let first = receive_pad_data(&client).await.unwrap();
        assert_eq!(first.packet_counter, 0);
        assert_eq!(first.report.unwrap().triggers[0], 0, "sent before the trigger applied");

        service.flush().await;
        let second = receive_pad_data(&client).await.unwrap();
        assert_eq!(second.packet_counter, 1);
        assert_eq!(second.report.unwrap().triggers[0], 255);
    }

    #[tokio::test]
    async fn test_unchanged_event_sends_nothing() {
        let (mut service, _) = service_with(&[1], ServiceOptions::default()).await;
        service.handle_event(DeviceEvent::new(1, 1, InputKind::Added)).await;
        service.flush().await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        subscribe_all(&mut service, client.local_addr().unwrap());

        service.handle_event(button(1, 2, Button::A, false)).await;
        service.flush().await;
        assert!(receive_pad_data(&client).await.is_none());
    }

    #[tokio::test]
    async fn test_events_from_unknown_devices_are_ignored() {
        let (mut service, _) = service_with(&[1], ServiceOptions::default()).await;
        service.handle_event(button(42, 1, Button::A, true)).await;
        assert!(service.changed.is_empty());
    }

    #[tokio::test]
    async fn test_removal_reports_empty_slot() {
        let (mut service, _) = service_with(&[1], ServiceOptions::default()).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        service.handle_event(DeviceEvent::new(1, 1, InputKind::Added)).await;
        service.flush().await;
        subscribe_all(&mut service, client.local_addr().unwrap());

        service.handle_event(DeviceEvent::new(1, 2, InputKind::Removed)).await;
        service.flush().await;

        let pad = receive_pad_data(&client).await.unwrap();
        assert_eq!(pad.port.slot, 0);
        assert!(pad.report.is_none());
    }

    #[tokio::test]
    async fn test_sensors_follow_client_presence_on_open() {
        let (mut service, _) = service_with(&[1, 2], ServiceOptions::default()).await;
        service.handle_event(DeviceEvent::new(1, 1, InputKind::Added)).await;
        assert!(!service.devices().handle(1).unwrap().sensors_enabled());

        subscribe_all(&mut service, "127.0.0.1:9".parse().unwrap());
        service.handle_event(DeviceEvent::new(2, 2, InputKind::Added)).await;
        assert!(service.devices().handle(2).unwrap().sensors_enabled());

        service.apply_sensor_policy();
        assert!(service.devices().handle(1).unwrap().sensors_enabled());
    }

    #[tokio::test]
    async fn test_sensors_on_when_auto_toggle_disabled() {
        let options = ServiceOptions {
            sensor_auto_toggle: false,
            ..ServiceOptions::default()
        };
        let (mut service, _) = service_with(&[1], options).await;
        service.handle_event(DeviceEvent::new(1, 1, InputKind::Added)).await;
        assert!(service.devices().handle(1).unwrap().sensors_enabled());

        // Policy does nothing without auto-toggle
        service.apply_sensor_policy();
        assert!(service.devices().handle(1).unwrap().sensors_enabled());
    }

    #[tokio::test]
    async fn test_combo_toggles_sensors() {
        let options = ServiceOptions {
            sensor_auto_toggle: false,
            ..ServiceOptions::default()
        };
        let (mut service, _) = service_with(&[1], options).await;
        service.handle_event(DeviceEvent::new(1, 1, InputKind::Added)).await;
        assert!(service.devices().handle(1).unwrap().sensors_enabled());

        for (i, b) in [Button::A, Button::Y, Button::DpadUp, Button::DpadDown].into_iter().enumerate() {
            service.handle_event(button(1, 10 + i as u64, b, true)).await;
        }
        assert!(!service.devices().handle(1).unwrap().sensors_enabled());

        // Repeating the last press without releasing it is not a change
        service.handle_event(button(1, 20, Button::DpadDown, true)).await;
        assert!(!service.devices().handle(1).unwrap().sensors_enabled());
    }

    #[tokio::test]
    async fn test_queued_device_gets_sensors_when_taking_slot() {
        let options = ServiceOptions {
            sensor_auto_toggle: false,
            ..ServiceOptions::default()
        };
        let (mut service, _) = service_with(&[1, 2, 3, 4, 5], options).await;
        for id in 1..=5 {
            service.handle_event(DeviceEvent::new(id, u64::from(id), InputKind::Added)).await;
        }
        assert_eq!(service.devices().slot_of(5), None);

        service.handle_event(DeviceEvent::new(1, 10, InputKind::Removed)).await;
        let handle = service.devices().handle(5).expect("queued gamepad opened");
        assert_eq!(handle.slot(), 0);
        assert!(handle.sensors_enabled());
    }

    #[tokio::test]
    async fn test_queued_device_follows_clients_when_taking_slot() {
        let (mut service, _) = service_with(&[1, 2, 3, 4, 5], ServiceOptions::default()).await;
        for id in 1..=5 {
            service.handle_event(DeviceEvent::new(id, u64::from(id), InputKind::Added)).await;
        }
        subscribe_all(&mut service, "127.0.0.1:9".parse().unwrap());

        service.handle_event(DeviceEvent::new(2, 10, InputKind::Removed)).await;
        assert!(service.devices().handle(5).unwrap().sensors_enabled());
    }

    #[tokio::test]
    async fn test_queued_device_reported_in_freed_slot() {
        let (service, server_addr) = service_with(&[1, 2, 3, 4, 5], ServiceOptions::default()).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (event_tx, event_rx) = mpsc::channel(32);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scenario = async {
            for id in 1..=5 {
                event_tx.send(DeviceEvent::new(id, u64::from(id), InputKind::Added)).await.unwrap();
            }
            // Let the loop open the devices before anyone subscribes
            tokio::time::sleep(Duration::from_millis(50)).await;

            let request = encode_request(CLIENT_ID, &Request::PadData(PadDataRequest { by_slot: Some(2), by_mac: None }));
            client.send_to(&request, server_addr).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;

            event_tx.send(DeviceEvent::new(3, 20, InputKind::Removed)).await.unwrap();
            event_tx.send(button(5, 30, Button::X, true)).await.unwrap();

            // Handover and press may land in one flush or two
            let mut counters = Vec::new();
            let mut pressed = false;
            while let Some(pad) = receive_pad_data(&client).await {
                assert_eq!(pad.port.slot, 2);
                let report = pad.report.expect("queued gamepad occupies slot 2");
                counters.push(pad.packet_counter);
                pressed = report.buttons_b & 0x80 == 0x80;
            }
            assert!(pressed, "last report carries the new gamepad's X press");
            assert_eq!(counters, (0..counters.len() as u32).collect::<Vec<_>>());
            shutdown_tx.send(true).unwrap();
        };

        tokio::join!(service.run(event_rx, shutdown_rx), scenario);
    }

    #[tokio::test]
    async fn test_shutdown_closes_devices() {
        let (mut service, _) = service_with(&[1], ServiceOptions::default()).await;
        let log = service.devices.backend_mut().log.clone();
        let (event_tx, event_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        event_tx.send(DeviceEvent::new(1, 1, InputKind::Added)).await.unwrap();
        drop(shutdown_tx);
        service.run(event_rx, shutdown_rx).await;

        assert_eq!(log.borrow().opened, vec![1]);
        assert_eq!(log.borrow().closed, vec![1]);
    }
}
