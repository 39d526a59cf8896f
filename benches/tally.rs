//! Identity Tally Benchmarks
//!
//! Folding search hits into the tally and classifying the result for deployments with many
//! configured users and groups spread across several directories.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use fncm_prereq::config::{Identity, DEFAULT_USER_FILTER};
use fncm_prereq::ldap::render_filter;
use fncm_prereq::IdentityTally;

fn identities(count: usize) -> Vec<Identity> {
    (0..count)
        .map(|i| if i % 4 == 0 { Identity::group(format!("group{i}")) } else { Identity::user(format!("user{i}")) })
        .collect()
}

fn bench_fold_hits(c: &mut Criterion) {
    let directories = ["LDAP", "LDAP2", "LDAP3"];
    let mut group = c.benchmark_group("tally_fold");

    for size in [10, 100, 500] {
        let identities = identities(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &identities, |b, identities| {
            b.iter(|| {
                let tally = directories.iter().fold(IdentityTally::new(identities), |tally, directory| {
                    identities
                        .iter()
                        .step_by(2)
                        .fold(tally, |tally, identity| tally.with_hit(&identity.name, directory))
                });
                black_box(tally.warnings().len())
            });
        });
    }
    group.finish();
}

fn bench_render_filter(c: &mut Criterion) {
    c.bench_function("render_user_filter", |b| {
        b.iter(|| render_filter(black_box(DEFAULT_USER_FILTER), black_box("o'brien (contractor)*")));
    });
}

criterion_group!(benches, bench_fold_hits, bench_render_filter);
criterion_main!(benches);
