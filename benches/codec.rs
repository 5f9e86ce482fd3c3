//! Codec benchmarks
//!
//! Pad data is encoded once per changed slot per subscriber, so this is the
//! hot path of the server.

use std::collections::BTreeSet;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use padmotiond::gamepad::{GamepadState, SlotTable};
use padmotiond::protocol::{
    decode_request, encode_list_ports_responses, encode_pad_data_response, encode_request,
    ListPortsRequest, PadDataRequest, Request,
};

fn sample_state() -> GamepadState {
    let mut state = GamepadState::with_sensor_support(true);
    state.face.a = true;
    state.left_stick.x = 200;
    state.right_stick.y = 17;
    state.touchpad.first_touch.touched = true;
    state.touchpad.first_touch.x = 1200;
    state.sensor.timestamp = 1_000_000;
    state.sensor.accel.y = -1.0;
    state.sensor.gyro.pitch = 12.5;
    state
}

fn bench_pad_data(c: &mut Criterion) {
    let state = sample_state();
    c.bench_function("encode_pad_data_response", |b| {
        b.iter(|| encode_pad_data_response(black_box(0xDEAD_BEEF), 0, Some(black_box(&state)), black_box(42)))
    });
}

fn bench_requests(c: &mut Criterion) {
    let pad_data = encode_request(
        7,
        &Request::PadData(PadDataRequest {
            by_slot: Some(1),
            by_mac: None,
        }),
    );
    c.bench_function("decode_pad_data_request", |b| b.iter(|| decode_request(black_box(&pad_data))));

    let list_ports = encode_request(
        7,
        &Request::ListPorts(ListPortsRequest {
            slots: [0, 1, 2, 3].into_iter().collect(),
        }),
    );
    c.bench_function("decode_list_ports_request", |b| b.iter(|| decode_request(black_box(&list_ports))));

    let slots = SlotTable::new();
    let requested: BTreeSet<u8> = [0, 1, 2, 3].into_iter().collect();
    c.bench_function("encode_list_ports_responses", |b| {
        b.iter(|| encode_list_ports_responses(black_box(1), &requested, &slots))
    });
}

criterion_group!(benches, bench_pad_data, bench_requests);
criterion_main!(benches);
