//! Reply dispatch benchmark: one background-poll completion offered to
//! every register of a bank.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use hmi_common::device::{RegisterConfig, RegisterKind, WriteModeKind};
use hmi_modbus::{
    Completion, Function, Payload, RegisterBank, Request, RequestId, RequestIssuer,
    TransportError,
};

/// Issuer that never reaches a device.
#[derive(Debug, Clone, Copy)]
struct Null;

impl RequestIssuer for Null {
    fn issue_read(&self, _f: Function, _a: u16, _n: u16) -> Result<RequestId, TransportError> {
        Ok(RequestId(0))
    }

    fn issue_write(&self, _f: Function, _a: u16, _p: Payload) -> Result<RequestId, TransportError> {
        Ok(RequestId(0))
    }
}

fn bank(registers: u16) -> RegisterBank<Null> {
    let configs: Vec<RegisterConfig> = (0..registers)
        .map(|i| RegisterConfig {
            name: format!("r{i}"),
            kind: RegisterKind::Int,
            address: i,
            encoding: None,
            write_mode: WriteModeKind::Postponed,
            write_delay_ms: 0,
            read_on_write: true,
            initial: None,
        })
        .collect();
    let mut bank = RegisterBank::from_config(&configs).unwrap();
    bank.attach(Null);
    bank
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("bank_dispatch");

    for n in [8u16, 64, 125] {
        let mut bank = bank(n);
        let mut tick = 0u16;
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                tick = tick.wrapping_add(1);
                let completion = Completion {
                    request: Request {
                        id: RequestId(u64::from(tick)),
                        function: Function::ReadHoldingRegisters,
                        address: 0,
                        amount: n,
                        payload: Payload::None,
                    },
                    success: true,
                    payload: Payload::Words(vec![tick; usize::from(n)]),
                };
                bank.dispatch(black_box(&completion));
                black_box(bank.drain_events());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
