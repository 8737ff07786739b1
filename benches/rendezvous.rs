//! Rendezvous round-trip benchmarks
//!
//! Measures a full connect + handshake + exchange against a local server,
//! per trust mode and dispatch strategy.
//!
//! Run with: cargo bench --bench rendezvous

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::thread;
use std::time::Duration;
use tls_rendezvous::client;
use tls_rendezvous::server::{Server, ServerOptions, Strategy};
use tls_rendezvous::tls::TrustConfig;

#[path = "../tests/common/pki.rs"]
mod pki;

use pki::Pki;

fn bench_round_trip(c: &mut Criterion) {
    let pki = Pki::generate();
    let mut group = c.benchmark_group("round_trip");
    group.measurement_time(Duration::from_secs(10));

    let modes = [
        (
            "server_only",
            TrustConfig::server("127.0.0.1", 0, &pki.ca_server.cert, &pki.ca_server.key),
            None,
        ),
        (
            "mutual",
            TrustConfig::server("127.0.0.1", 0, &pki.ca_server.cert, &pki.ca_server.key)
                .require_peer_cert(&pki.ca.cert),
            Some(&pki.ca_client),
        ),
    ];

    for (mode, server_cfg, identity) in modes {
        for strategy in [Strategy::Multiplexed, Strategy::ThreadPerConnection] {
            let server = Server::bind(&server_cfg, ServerOptions::default().strategy(strategy))
                .expect("bind");
            let port = server.local_addr().port();
            let shutdown = server.shutdown_handle();
            let running = thread::spawn(move || server.run());

            let mut client_cfg = TrustConfig::client("127.0.0.1", port).trust_anchor(&pki.ca.cert);
            if let Some(id) = identity {
                client_cfg = client_cfg.identity(&id.cert, &id.key);
            }

            group.bench_with_input(
                BenchmarkId::new(mode, strategy.as_str()),
                &client_cfg,
                |b, cfg| {
                    b.iter(|| {
                        let report = client::request(cfg, "bench.example").expect("request");
                        black_box(report.reply);
                    });
                },
            );

            shutdown.trigger();
            running.join().expect("server thread").expect("server run");
        }
    }

    group.finish();
}

criterion_group!(benches, bench_round_trip);
criterion_main!(benches);
