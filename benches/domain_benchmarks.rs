use coria_backend::domain::signature::{canonical_json, sign, verify};
use coria_backend::domain::{CreatePaymentRequest, PaymentKind};
use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::json;
use std::hint::black_box;
use uuid::Uuid;
use validator::Validate;

const SECRET: &[u8] = b"bench-webhook-secret";

fn bench_webhook_signature(c: &mut Criterion) {
    let payload = json!([{
        "signature": "5VERv8NMvzbJMEkV8xnrLkEaWRtSz9CosKDYjCJjBRnbJLgp8uirBgmQpjKhoR4tjF3ZpRzrFmBV6UjKdiSZkQUW",
        "transactionError": null,
        "nativeTransfers": [
            { "fromUserAccount": "payer", "toUserAccount": "pool", "amount": 1_000_000_000u64 }
        ],
        "timestamp": 1_700_000_000u64,
        "type": "TRANSFER"
    }]);
    let signature = sign(&payload, SECRET);

    c.bench_function("canonical_json", |b| {
        b.iter(|| canonical_json(black_box(&payload)))
    });
    c.bench_function("sign_webhook", |b| {
        b.iter(|| sign(black_box(&payload), SECRET))
    });
    c.bench_function("verify_webhook", |b| {
        b.iter(|| verify(black_box(&payload), black_box(&signature), SECRET))
    });
}

fn bench_validation(c: &mut Criterion) {
    let request = CreatePaymentRequest::new(
        Uuid::new_v4(),
        PaymentKind::Donation,
        10_500_000_000,
        "bench-key",
    );

    c.bench_function("validate_payment_request", |b| {
        b.iter(|| {
            let _ = black_box(&request).validate();
        })
    });
}

criterion_group!(benches, bench_webhook_signature, bench_validation);
criterion_main!(benches);
