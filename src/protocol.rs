//! DSU motion-data wire protocol
//!
//! Binary, little-endian, fixed layout. Every packet starts with a 16 byte
//! header:
//!
//! ```text
//! 0..4    magic        "DSUC" (client -> server) / "DSUS" (server -> client)
//! 4..6    version      u16, always 1001
//! 6..8    length       u16, bytes following the header (message type + body)
//! 8..12   crc32        CRC-32/IEEE over the packet with this field zeroed
//! 12..16  sender id    client id in requests, server session id in responses
//! 16..20  message type u32
//! 20..    body
//! ```
//!
//! Decoding fails closed: any validation error yields `None` and the caller
//! drops the datagram. Reads never go past the length declared in the header.

use std::collections::BTreeSet;

use crate::gamepad::{BatteryLevel, GamepadState, SlotTable, Touch, SLOT_COUNT};

// ============================================================================
// Constants
// ============================================================================

pub const PROTOCOL_VERSION: u16 = 1001;

pub const CLIENT_MAGIC: [u8; 4] = *b"DSUC";

pub const SERVER_MAGIC: [u8; 4] = *b"DSUS";

/// Header size, the length field counts everything after it
pub const HEADER_LEN: usize = 16;

const CRC_OFFSET: usize = 8;

/// Size of the per-slot device header in port and pad data messages
pub const PORT_INFO_LEN: usize = 11;

/// Body size of a pad data response, excluding the message type
pub const PAD_DATA_BODY_LEN: usize = 80;

/// Largest ListPorts request slot count
const MAX_LIST_PORTS: i32 = SLOT_COUNT as i32;

/// Registration flag: pad data requested by slot index
pub const REGISTER_BY_SLOT: u8 = 0x01;

/// Registration flag: pad data requested by device address
pub const REGISTER_BY_MAC: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageType {
    Version = 0x100000,
    ListPorts = 0x100001,
    PadData = 0x100002,
}

impl MessageType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x100000 => Some(MessageType::Version),
            0x100001 => Some(MessageType::ListPorts),
            0x100002 => Some(MessageType::PadData),
            _ => None,
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

/// A decoded packet and the id of whoever sent it
#[derive(Debug, Clone, PartialEq)]
pub struct Packet<T> {
    pub sender_id: u32,
    pub message: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPortsRequest {
    pub slots: BTreeSet<u8>,
}

/// Pad data subscription request
///
/// Both addressing modes may be set at once, the client then subscribes to
/// the union. Neither set means every slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PadDataRequest {
    pub by_slot: Option<u8>,
    pub by_mac: Option<u8>,
}

impl PadDataRequest {
    /// Slots this request refreshes, empty means all of them
    pub fn requested_slots(&self) -> BTreeSet<u8> {
        self.by_slot.into_iter().chain(self.by_mac).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Version,
    ListPorts(ListPortsRequest),
    PadData(PadDataRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    Disconnected = 0x00,
    Reserved = 0x01,
    Connected = 0x02,
}

/// Motion capability advertised for a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceModel {
    NotApplicable = 0x00,
    PartialGyro = 0x01,
    FullGyro = 0x02,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionType {
    NotApplicable = 0x00,
    Usb = 0x01,
    Bluetooth = 0x02,
}

/// Per-slot device header shared by port info and pad data responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortInfo {
    pub slot: u8,
    pub state: SlotState,
    pub model: DeviceModel,
    pub connection: ConnectionType,
    /// Pseudo address, the slot index sits in the last byte
    pub mac: [u8; 6],
    pub battery: BatteryLevel,
}

impl PortInfo {
    /// Describe a slot as clients see it
    pub fn from_slot(slot: u8, state: Option<&GamepadState>) -> Self {
        let mac = [0, 0, 0, 0, 0, slot];
        match state {
            Some(state) => PortInfo {
                slot,
                state: SlotState::Connected,
                model: if state.sensor.timestamp != 0 {
                    DeviceModel::FullGyro
                } else {
                    DeviceModel::NotApplicable
                },
                connection: if state.battery == BatteryLevel::Wired {
                    ConnectionType::Usb
                } else {
                    ConnectionType::Bluetooth
                },
                mac,
                battery: state.battery,
            },
            None => PortInfo {
                slot,
                state: SlotState::Disconnected,
                model: DeviceModel::NotApplicable,
                connection: ConnectionType::NotApplicable,
                mac,
                battery: BatteryLevel::Unknown,
            },
        }
    }
}

/// Button and motion payload of a pad data response, in wire terms
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PadReport {
    /// dpad left, down, right, up, start, R3, L3, back (bit 7..0)
    pub buttons_a: u8,
    /// X, A, B, Y, R1, L1, R2 at max, L2 at max (bit 7..0)
    pub buttons_b: u8,
    pub guide: bool,
    pub touchpad_pressed: bool,
    pub left_stick: [u8; 2],
    pub right_stick: [u8; 2],
    /// left, down, right, up as 0x00/0xFF
    pub dpad: [u8; 4],
    /// X, A, B, Y as 0x00/0xFF
    pub face: [u8; 4],
    /// right, left as 0x00/0xFF
    pub shoulders: [u8; 2],
    /// right, left
    pub triggers: [u8; 2],
    pub touches: [Touch; 2],
    pub motion_timestamp: u64,
    pub accel: [f32; 3],
    /// pitch, yaw, roll
    pub gyro: [f32; 3],
}

fn analog(pressed: bool) -> u8 {
    if pressed {
        0xFF
    } else {
        0x00
    }
}

fn bits(flags: [bool; 8]) -> u8 {
    flags
        .iter()
        .fold(0u8, |acc, &set| (acc << 1) | u8::from(set))
}

impl PadReport {
    pub fn from_state(state: &GamepadState) -> Self {
        let buttons_a = bits([
            state.dpad.left,
            state.dpad.down,
            state.dpad.right,
            state.dpad.up,
            state.special.start,
            state.right_stick.pressed,
            state.left_stick.pressed,
            state.special.back,
        ]);
        let buttons_b = bits([
            state.face.x,
            state.face.a,
            state.face.b,
            state.face.y,
            state.shoulder.right,
            state.shoulder.left,
            state.trigger.right == u8::MAX,
            state.trigger.left == u8::MAX,
        ]);

        PadReport {
            buttons_a,
            buttons_b,
            guide: state.special.guide,
            touchpad_pressed: state.touchpad.pressed,
            left_stick: [state.left_stick.x, state.left_stick.y],
            right_stick: [state.right_stick.x, state.right_stick.y],
            dpad: [
                analog(state.dpad.left),
                analog(state.dpad.down),
                analog(state.dpad.right),
                analog(state.dpad.up),
            ],
            face: [
                analog(state.face.x),
                analog(state.face.a),
                analog(state.face.b),
                analog(state.face.y),
            ],
            shoulders: [analog(state.shoulder.right), analog(state.shoulder.left)],
            triggers: [state.trigger.right, state.trigger.left],
            touches: [state.touchpad.first_touch, state.touchpad.second_touch],
            motion_timestamp: state.sensor.timestamp,
            accel: [state.sensor.accel.x, state.sensor.accel.y, state.sensor.accel.z],
            gyro: [state.sensor.gyro.pitch, state.sensor.gyro.yaw, state.sensor.gyro.roll],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PadDataResponse {
    pub port: PortInfo,
    pub packet_counter: u32,
    /// `None` when the slot is empty
    pub report: Option<PadReport>,
}

impl PadDataResponse {
    pub fn from_slot(slot: u8, state: Option<&GamepadState>, packet_counter: u32) -> Self {
        PadDataResponse {
            port: PortInfo::from_slot(slot, state),
            packet_counter,
            report: state.map(PadReport::from_state),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Version { protocol_version: u16 },
    PortInfo(PortInfo),
    PadData(PadDataResponse),
}

// ============================================================================
// Byte helpers
// ============================================================================

/// Bounds-checked little-endian cursor
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.pos.checked_add(N)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;
        bytes.try_into().ok()
    }

    fn u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn u16(&mut self) -> Option<u16> {
        self.take().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn i32(&mut self) -> Option<i32> {
        self.take().map(i32::from_le_bytes)
    }

    fn u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn f32(&mut self) -> Option<f32> {
        self.take().map(f32::from_le_bytes)
    }
}

#[derive(Default)]
struct Writer {
    data: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, value: u8) {
        self.data.push(value);
    }

    fn u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    fn i32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    fn f32(&mut self, value: f32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    fn bytes(&mut self, value: &[u8]) {
        self.data.extend_from_slice(value);
    }

    fn pad_to(&mut self, len: usize) {
        if self.data.len() < len {
            self.data.resize(len, 0);
        }
    }
}

// ============================================================================
// Framing
// ============================================================================

/// CRC-32 of a packet with its checksum field treated as zero
pub fn packet_crc(packet: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&packet[..CRC_OFFSET]);
    hasher.update(&[0u8; 4]);
    hasher.update(&packet[CRC_OFFSET + 4..]);
    hasher.finalize()
}

fn finalize_packet(magic: [u8; 4], sender_id: u32, message_type: MessageType, body: &[u8]) -> Vec<u8> {
    let mut writer = Writer::default();
    writer.bytes(&magic);
    writer.u16(PROTOCOL_VERSION);
    writer.u16((body.len() + 4) as u16);
    writer.u32(0);
    writer.u32(sender_id);
    writer.u32(message_type as u32);
    writer.bytes(body);

    let mut packet = writer.data;
    let crc = packet_crc(&packet);
    packet[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
    packet
}

/// Validate framing and return sender id, raw message type and body
fn open_packet(data: &[u8], magic: [u8; 4]) -> Option<(u32, u32, &[u8])> {
    let mut header = Reader::new(data);

    if header.take::<4>()? != magic {
        tracing::trace!(size = data.len(), "Dropping packet with foreign magic");
        return None;
    }

    let version = header.u16()?;
    if version != PROTOCOL_VERSION {
        tracing::trace!(version, expected = PROTOCOL_VERSION, "Dropping packet with unsupported version");
        return None;
    }

    let length = header.u16()? as usize;
    let total = HEADER_LEN + length;
    if length < 4 || data.len() < total {
        tracing::trace!(declared = total, received = data.len(), "Dropping packet with size mismatch");
        return None;
    }

    let packet = &data[..total];
    let crc = header.u32()?;
    let calculated = packet_crc(packet);
    if crc != calculated {
        tracing::trace!(crc, calculated, "Dropping packet with crc32 mismatch");
        return None;
    }

    let sender_id = header.u32()?;
    let message_type = u32::from_le_bytes(packet[HEADER_LEN..HEADER_LEN + 4].try_into().ok()?);
    Some((sender_id, message_type, &packet[HEADER_LEN + 4..]))
}

// ============================================================================
// Requests
// ============================================================================

fn decode_list_ports(body: &[u8]) -> Option<ListPortsRequest> {
    let mut reader = Reader::new(body);
    let count = reader.i32()?;
    if !(0..=MAX_LIST_PORTS).contains(&count) {
        tracing::trace!(count, "Dropping port list request with invalid count");
        return None;
    }

    let mut slots = BTreeSet::new();
    for _ in 0..count {
        let slot = reader.u8()?;
        if slot as usize >= SLOT_COUNT {
            tracing::trace!(slot, "Dropping port list request with invalid slot");
            return None;
        }
        slots.insert(slot);
    }
    Some(ListPortsRequest { slots })
}

fn decode_pad_data(body: &[u8]) -> Option<PadDataRequest> {
    let mut reader = Reader::new(body);
    let flags = reader.u8()?;
    let slot = reader.u8()?;
    let mac_first = reader.u8()?;

    let mut request = PadDataRequest::default();
    if flags & REGISTER_BY_SLOT != 0 {
        if slot as usize >= SLOT_COUNT {
            tracing::trace!(slot, "Dropping pad data request with invalid slot");
            return None;
        }
        request.by_slot = Some(slot);
    }

    // The first address byte is the secondary slot index, the rest of the
    // address is not interpreted
    if flags & REGISTER_BY_MAC != 0 && (mac_first as usize) < SLOT_COUNT {
        request.by_mac = Some(mac_first);
    }
    Some(request)
}

/// Decode a client datagram
pub fn decode_request(data: &[u8]) -> Option<Packet<Request>> {
    let (sender_id, message_type, body) = open_packet(data, CLIENT_MAGIC)?;

    let message = match MessageType::from_u32(message_type) {
        Some(MessageType::Version) => Request::Version,
        Some(MessageType::ListPorts) => Request::ListPorts(decode_list_ports(body)?),
        Some(MessageType::PadData) => Request::PadData(decode_pad_data(body)?),
        None => {
            tracing::trace!(client_id = sender_id, message_type, "Dropping unhandled message type");
            return None;
        }
    };

    tracing::trace!(client_id = sender_id, ?message, "Decoded client request");
    Some(Packet { sender_id, message })
}

/// Encode a client request
pub fn encode_request(client_id: u32, request: &Request) -> Vec<u8> {
    let mut body = Writer::default();
    let message_type = match request {
        Request::Version => MessageType::Version,
        Request::ListPorts(list) => {
            body.i32(list.slots.len() as i32);
            for &slot in &list.slots {
                body.u8(slot);
            }
            MessageType::ListPorts
        }
        Request::PadData(pad) => {
            let mut flags = 0;
            if pad.by_slot.is_some() {
                flags |= REGISTER_BY_SLOT;
            }
            if pad.by_mac.is_some() {
                flags |= REGISTER_BY_MAC;
            }
            body.u8(flags);
            body.u8(pad.by_slot.unwrap_or(0));
            body.bytes(&[pad.by_mac.unwrap_or(0), 0, 0, 0, 0, 0]);
            MessageType::PadData
        }
    };
    finalize_packet(CLIENT_MAGIC, client_id, message_type, &body.data)
}

// ============================================================================
// Responses
// ============================================================================

fn write_port_info(writer: &mut Writer, port: &PortInfo) {
    writer.u8(port.slot);
    writer.u8(port.state as u8);
    writer.u8(port.model as u8);
    writer.u8(port.connection as u8);
    writer.bytes(&port.mac);
    writer.u8(port.battery.as_byte());
}

fn read_port_info(reader: &mut Reader<'_>) -> Option<PortInfo> {
    let slot = reader.u8()?;
    let state = match reader.u8()? {
        0x00 => SlotState::Disconnected,
        0x01 => SlotState::Reserved,
        0x02 => SlotState::Connected,
        _ => return None,
    };
    let model = match reader.u8()? {
        0x00 => DeviceModel::NotApplicable,
        0x01 => DeviceModel::PartialGyro,
        0x02 => DeviceModel::FullGyro,
        _ => return None,
    };
    let connection = match reader.u8()? {
        0x00 => ConnectionType::NotApplicable,
        0x01 => ConnectionType::Usb,
        0x02 => ConnectionType::Bluetooth,
        _ => return None,
    };
    let mac = reader.take::<6>()?;
    let battery = BatteryLevel::from_byte(reader.u8()?);

    Some(PortInfo {
        slot,
        state,
        model,
        connection,
        mac,
        battery,
    })
}

fn write_touch(writer: &mut Writer, touch: &Touch) {
    writer.u8(u8::from(touch.touched));
    writer.u8(touch.id);
    writer.u16(touch.x);
    writer.u16(touch.y);
}

fn read_touch(reader: &mut Reader<'_>) -> Option<Touch> {
    Some(Touch {
        touched: reader.u8()? != 0,
        id: reader.u8()?,
        x: reader.u16()?,
        y: reader.u16()?,
    })
}

fn write_pad_report(writer: &mut Writer, report: &PadReport) {
    writer.u8(report.buttons_a);
    writer.u8(report.buttons_b);
    writer.u8(u8::from(report.guide));
    writer.u8(u8::from(report.touchpad_pressed));
    writer.bytes(&report.left_stick);
    writer.bytes(&report.right_stick);
    writer.bytes(&report.dpad);
    writer.bytes(&report.face);
    writer.bytes(&report.shoulders);
    writer.bytes(&report.triggers);
    for touch in &report.touches {
        write_touch(writer, touch);
    }
    writer.u64(report.motion_timestamp);
    for value in report.accel.iter().chain(report.gyro.iter()) {
        writer.f32(*value);
    }
}

fn read_pad_report(reader: &mut Reader<'_>) -> Option<PadReport> {
    Some(PadReport {
        buttons_a: reader.u8()?,
        buttons_b: reader.u8()?,
        guide: reader.u8()? != 0,
        touchpad_pressed: reader.u8()? != 0,
        left_stick: reader.take()?,
        right_stick: reader.take()?,
        dpad: reader.take()?,
        face: reader.take()?,
        shoulders: reader.take()?,
        triggers: reader.take()?,
        touches: [read_touch(reader)?, read_touch(reader)?],
        motion_timestamp: reader.u64()?,
        accel: [reader.f32()?, reader.f32()?, reader.f32()?],
        gyro: [reader.f32()?, reader.f32()?, reader.f32()?],
    })
}

/// Encode a server response
pub fn encode_response(server_id: u32, response: &Response) -> Vec<u8> {
    let mut body = Writer::default();
    let message_type = match response {
        Response::Version { protocol_version } => {
            body.u32(u32::from(*protocol_version));
            MessageType::Version
        }
        Response::PortInfo(port) => {
            write_port_info(&mut body, port);
            body.u8(0x00);
            MessageType::ListPorts
        }
        Response::PadData(pad) => {
            write_port_info(&mut body, &pad.port);
            body.u8(u8::from(pad.report.is_some()));
            body.u32(pad.packet_counter);
            if let Some(report) = &pad.report {
                write_pad_report(&mut body, report);
            }
            body.pad_to(PAD_DATA_BODY_LEN);
            MessageType::PadData
        }
    };
    finalize_packet(SERVER_MAGIC, server_id, message_type, &body.data)
}

/// Decode a server datagram
pub fn decode_response(data: &[u8]) -> Option<Packet<Response>> {
    let (sender_id, message_type, body) = open_packet(data, SERVER_MAGIC)?;
    let mut reader = Reader::new(body);

    let message = match MessageType::from_u32(message_type)? {
        MessageType::Version => Response::Version {
            protocol_version: u16::try_from(reader.u32()?).ok()?,
        },
        MessageType::ListPorts => {
            let port = read_port_info(&mut reader)?;
            reader.u8()?;
            Response::PortInfo(port)
        }
        MessageType::PadData => {
            let port = read_port_info(&mut reader)?;
            let has_data = reader.u8()? != 0;
            let packet_counter = reader.u32()?;
            let report = if has_data {
                Some(read_pad_report(&mut reader)?)
            } else {
                None
            };
            Response::PadData(PadDataResponse {
                port,
                packet_counter,
                report,
            })
        }
    };
    Some(Packet { sender_id, message })
}

/// Version response datagram
pub fn encode_version_response(server_id: u32) -> Vec<u8> {
    encode_response(
        server_id,
        &Response::Version {
            protocol_version: PROTOCOL_VERSION,
        },
    )
}

/// One port info datagram per requested slot, in slot order
pub fn encode_list_ports_responses(server_id: u32, requested: &BTreeSet<u8>, slots: &SlotTable) -> Vec<Vec<u8>> {
    requested
        .iter()
        .filter(|&&slot| (slot as usize) < SLOT_COUNT)
        .map(|&slot| encode_response(server_id, &Response::PortInfo(PortInfo::from_slot(slot, slots.get(slot)))))
        .collect()
}

/// Pad data datagram for one slot and subscriber
pub fn encode_pad_data_response(server_id: u32, slot: u8, state: Option<&GamepadState>, packet_counter: u32) -> Vec<u8> {
    encode_response(
        server_id,
        &Response::PadData(PadDataResponse::from_slot(slot, state, packet_counter)),
    )
}
