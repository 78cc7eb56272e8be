use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::{Duration, Utc};
use marquee_core::{CampaignId, TenantId};
use marquee_infra::{InMemoryAuditSink, InMemoryJobStore, JobStore, PublishingOrchestrator};
use marquee_publishing::{AdapterRegistry, Channel, PublishingJob};
use std::sync::Arc;

fn pending_job(tenant_id: TenantId, campaign_id: CampaignId, age_secs: i64) -> PublishingJob {
    PublishingJob::new(
        tenant_id,
        campaign_id,
        Channel::new("Instagram").unwrap(),
        Utc::now() - Duration::seconds(age_secs),
    )
    .with_copy(None, "Spring is here.", vec!["#spring".to_string()])
}

fn bench_claim_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("job_claim_latency");

    group.bench_function("insert_then_claim", |b| {
        let store = InMemoryJobStore::new();
        let tenant_id = TenantId::new();
        let campaign_id = CampaignId::new();
        b.iter(|| {
            let job = pending_job(tenant_id, campaign_id, 0);
            let id = store.insert(job).unwrap();
            black_box(store.try_claim(tenant_id, id, Utc::now()).unwrap());
        });
    });

    group.finish();
}

fn bench_pending_listing(c: &mut Criterion) {
    let mut group = c.benchmark_group("pending_listing");

    for queue_depth in [100usize, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*queue_depth as u64));
        group.bench_with_input(
            BenchmarkId::new("list_pending_batch_10", queue_depth),
            queue_depth,
            |b, &depth| {
                let store = InMemoryJobStore::new();
                let tenant_id = TenantId::new();
                let campaign_id = CampaignId::new();
                for i in 0..depth {
                    store.insert(pending_job(tenant_id, campaign_id, i as i64)).unwrap();
                }

                b.iter(|| black_box(store.list_pending(None, Utc::now(), 10).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_process_approval_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_job");

    group.bench_function("manual_package_generation", |b| {
        let store = Arc::new(InMemoryJobStore::new());
        let orchestrator = PublishingOrchestrator::new(
            store.clone(),
            Arc::new(AdapterRegistry::new()),
            Arc::new(InMemoryAuditSink::new()),
        )
        .with_job_timeout(None);
        let tenant_id = TenantId::new();
        let campaign_id = CampaignId::new();

        b.iter(|| {
            let id = store.insert(pending_job(tenant_id, campaign_id, 0)).unwrap();
            black_box(orchestrator.process_job(tenant_id, id, None).unwrap());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_claim_latency,
    bench_pending_listing,
    bench_process_approval_path
);
criterion_main!(benches);
