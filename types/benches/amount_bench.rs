use bounty_types::{Amount, BasisPoints};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_parse_and_render(c: &mut Criterion) {
    c.bench_function("amount_parse", |b| {
        b.iter(|| Amount::parse(black_box("12345.678901234567890123")).ok())
    });
    let amount = Amount::parse("12345.6789").unwrap();
    c.bench_function("amount_render", |b| b.iter(|| black_box(amount).to_string()));
}

fn bench_fee_split(c: &mut Criterion) {
    let gross = Amount::parse("987654321.123456789").unwrap();
    let bps = BasisPoints::new(275).unwrap();
    c.bench_function("amount_split_bps", |b| {
        b.iter(|| black_box(gross).split_bps(black_box(bps)))
    });
}

criterion_group!(benches, bench_parse_and_render, bench_fee_split);
criterion_main!(benches);
