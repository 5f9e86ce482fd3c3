//! UDP side of the motion server
//!
//! Answers version and port list requests straight away, records pad data
//! subscriptions and pushes pad data to subscribers. One socket serves both
//! roles. Transport errors are logged and never stop the server.

use std::collections::BTreeSet;
use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use uuid::Uuid;

use crate::clients::ActiveClients;
use crate::gamepad::SlotTable;
use crate::protocol::{
    decode_request, encode_list_ports_responses, encode_pad_data_response, encode_version_response, Request,
};

/// Port clients expect by default
pub const DEFAULT_PORT: u16 = 26760;

/// Receive buffer size, comfortably above any valid request
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Random non-zero id identifying this server run
pub fn generate_server_id() -> u32 {
    let bytes = Uuid::new_v4().into_bytes();
    let id = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if id == 0 {
        1
    } else {
        id
    }
}

/// Datagram transport the server runs on
#[allow(async_fn_in_trait)]
pub trait DatagramSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;
}

impl DatagramSocket for UdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, target).await
    }
}

pub struct MotionServer<S> {
    socket: S,
    server_id: u32,
}

impl<S: DatagramSocket> MotionServer<S> {
    pub fn new(socket: S, server_id: u32) -> Self {
        Self { socket, server_id }
    }

    pub fn server_id(&self) -> u32 {
        self.server_id
    }

    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    /// Best-effort send, failures only affect the one target
    async fn send(&self, packet: &[u8], target: SocketAddr) {
        if let Err(e) = self.socket.send_to(packet, target).await {
            tracing::warn!(%target, error = %e, "Failed to send datagram");
        }
    }

    /// Act on one inbound datagram, invalid ones are dropped silently
    pub async fn handle_datagram(
        &self,
        data: &[u8],
        from: SocketAddr,
        slots: &SlotTable,
        clients: &mut ActiveClients,
    ) {
        let Some(packet) = decode_request(data) else {
            tracing::trace!(%from, size = data.len(), "Ignoring invalid datagram");
            return;
        };

        match packet.message {
            Request::Version => {
                self.send(&encode_version_response(self.server_id), from).await;
            }
            Request::ListPorts(request) => {
                for response in encode_list_ports_responses(self.server_id, &request.slots, slots) {
                    self.send(&response, from).await;
                }
            }
            Request::PadData(request) => {
                clients.update_request(from, packet.sender_id, &request.requested_slots());
            }
        }
    }

    /// Push the current state of every changed slot to its subscribers
    pub async fn send_pad_data(&self, slots: &SlotTable, clients: &mut ActiveClients, changed: &BTreeSet<u8>) {
        if changed.is_empty() {
            return;
        }

        for (slot, subscribers) in clients.relevant_endpoints(changed) {
            let state = slots.get(slot);
            for subscriber in subscribers {
                let packet = encode_pad_data_response(self.server_id, slot, state, subscriber.packet_counter);
                self.send(&packet, subscriber.key.endpoint).await;
            }
        }
    }
}
