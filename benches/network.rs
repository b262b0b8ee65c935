use criterion::{Criterion, Throughput};
use iotconnect::network::application::mqtt::{Client, Options, QoS};
use iotconnect::network::error::Error;
use iotconnect::network::{Close, Connection, Read, Write};
use std::collections::VecDeque;
use std::hint::black_box;

/// Discards writes and replays queued bytes.
#[derive(Default)]
struct Loopback {
    inbound: VecDeque<u8>,
}

impl Read for Loopback {
    type Error = Error;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let len = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..len)) {
            *slot = byte;
        }
        Ok(len)
    }
}

impl Write for Loopback {
    type Error = Error;
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Close for Loopback {
    type Error = Error;
    fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Connection for Loopback {}

fn connected(inbound: &[u8]) -> Client<Loopback> {
    let mut conn = Loopback::default();
    conn.inbound.extend([0x20, 0x02, 0x00, 0x00]);
    conn.inbound.extend(inbound.iter().copied());
    let opts = Options {
        client_id: "bench-client",
        keep_alive_seconds: 60,
        clean_session: true,
        username: None,
        password: None,
    };
    Client::connect(conn, &opts).unwrap()
}

pub fn bench_publish(c: &mut Criterion) {
    let payload = br#"{"d":[{"d":{"temperature":21.5,"humidity":40}}],"dt":"2024-01-01T00:00:00.000Z"}"#;
    let mut client = connected(&[]);

    let mut group = c.benchmark_group("mqtt_publish");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("qos0", |b| {
        b.iter(|| {
            client
                .publish(black_box("devices/c1/messages/events/"), black_box(payload), QoS::AtMostOnce)
                .unwrap()
        })
    });
    group.bench_function("qos1", |b| {
        b.iter(|| {
            client
                .publish(black_box("devices/c1/messages/events/"), black_box(payload), QoS::AtLeastOnce)
                .unwrap()
        })
    });
    group.finish();
}

pub fn bench_next_packet(c: &mut Criterion) {
    let topic = b"devices/c1/messages/devicebound/";
    let payload = br#"{"ct":0,"cmd":"reboot","ack":"a1"}"#;
    let mut packet = vec![0x30, (2 + topic.len() + payload.len()) as u8, 0x00, topic.len() as u8];
    packet.extend_from_slice(topic);
    packet.extend_from_slice(payload);

    c.bench_function("mqtt_next_packet", |b| {
        b.iter_batched(
            || connected(&packet),
            |mut client| client.next_packet().unwrap(),
            criterion::BatchSize::SmallInput,
        )
    });
}
