use base64ct::{Base64, Encoding};
use criterion::{Criterion, Throughput};
use iotconnect::auth::{derive_sas_token, sign_sas_token};
use iotconnect::clock::Clock;
use rand::Rng;
use std::hint::black_box;

struct FixedClock(u64);

impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        self.0
    }
}

fn random_key(len: usize) -> String {
    let mut key = vec![0u8; len];
    rand::thread_rng().fill(&mut key[..]);
    Base64::encode_string(&key)
}

pub fn bench_sas_token(c: &mut Criterion) {
    let mut group = c.benchmark_group("sas_token");
    group.throughput(Throughput::Elements(1));

    for len in [16, 32, 64] {
        let key = random_key(len);
        group.bench_function(format!("sign/{}-byte key", len), |b| {
            b.iter(|| {
                sign_sas_token(
                    black_box("iotc-hub.azure-devices.net"),
                    black_box("cpid-device-01"),
                    black_box(&key),
                    black_box(1_700_000_060),
                )
                .unwrap()
            })
        });
    }

    let key = random_key(32);
    let clock = FixedClock(1_700_000_000_000);
    group.bench_function("derive", |b| {
        b.iter(|| {
            derive_sas_token(
                black_box("iotc-hub.azure-devices.net"),
                black_box("cpid-device-01"),
                &key,
                60,
                &clock,
            )
            .unwrap()
        })
    });

    group.finish();
}
