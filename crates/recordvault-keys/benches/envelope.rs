use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use recordvault_keys::{KeyManager, OsCryptoProvider, X25519StaticSecret};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

fn bench_envelope(c: &mut Criterion) {
    let km = KeyManager::new(Arc::new(OsCryptoProvider));
    let key = km.generate_data_key().unwrap();

    let mut group = c.benchmark_group("envelope");
    for size in [1024usize, 65536, 1048576] {
        let data = make_data(size);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("encrypt", size), &data, |b, data| {
            b.iter(|| km.encrypt(black_box(&key), black_box(data)).unwrap())
        });

        let sealed = km.encrypt(&key, &data).unwrap();
        group.bench_with_input(BenchmarkId::new("decrypt", size), &sealed, |b, sealed| {
            b.iter(|| km.decrypt(black_box(&key), black_box(sealed)).unwrap())
        });
    }
    group.finish();
}

fn bench_wrap(c: &mut Criterion) {
    let km = KeyManager::new(Arc::new(OsCryptoProvider));
    let key = km.generate_data_key().unwrap();
    let grantee = X25519StaticSecret::generate();
    let public = grantee.public_key();

    c.bench_function("wrap_for_principal", |b| {
        b.iter(|| km.wrap_for_principal(black_box(&key), black_box(&public)).unwrap())
    });

    let wrapped = km.wrap_for_principal(&key, &public).unwrap();
    c.bench_function("unwrap", |b| {
        b.iter(|| KeyManager::unwrap(black_box(&wrapped), black_box(&grantee)).unwrap())
    });
}

criterion_group!(benches, bench_envelope, bench_wrap);
criterion_main!(benches);
