use criterion::{criterion_group, criterion_main};

mod auth;
mod network;

criterion_group!(
    benches,
    auth::bench_sas_token,
    bootstrap::bench_parse_discovery,
    bootstrap::bench_sync_body,
    bootstrap::bench_decode_c2d,
    network::bench_publish,
    network::bench_next_packet
);
criterion_main!(benches);
