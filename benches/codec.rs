use criterion::{criterion_group, criterion_main, Criterion};

use echomail::{build_forest, Envelope, Message};

const SENDER: &str = "MZLQ74C2EB2AIMEE2SWKSQUT54DHKMG55FH7J2JLRWCFSJJ6W54Q";

fn sample_envelope(n: usize, reply_to: Option<&str>) -> Envelope {
    let reply = reply_to
        .map(|id| format!("ReplyTo: {id}\n"))
        .unwrap_or_default();
    let body = format!(
        "```Echomail\nSender: {SENDER}\nGroup: bench\nSubj: Message {n}\n\
         Date: 2024-01-01 00:00:00\n{reply}```\n{}\n",
        "Lorem ipsum dolor sit amet. ".repeat(40)
    );
    let mut envelope = Envelope::with_body(body);
    envelope.insert("attachment.bin", vec![0xA5u8; 64 * 1024]);
    envelope
}

fn bench_codec(c: &mut Criterion) {
    let envelope = sample_envelope(0, None);
    let bytes = envelope.write().unwrap();

    c.bench_function("envelope_write", |b| b.iter(|| envelope.write().unwrap()));
    c.bench_function("envelope_read", |b| b.iter(|| Envelope::read(&bytes).unwrap()));
}

fn bench_forest(c: &mut Criterion) {
    let mut messages: Vec<Message> = Vec::new();
    for n in 0..1000 {
        let parent = (n % 10 != 0).then(|| messages[n - 1].msg_id.clone());
        let msg = sample_envelope(n, parent.as_deref()).parse().unwrap();
        messages.push(msg);
    }

    c.bench_function("build_forest_1000", |b| b.iter(|| build_forest(&messages)));
}

criterion_group!(benches, bench_codec, bench_forest);
criterion_main!(benches);
