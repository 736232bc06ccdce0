//! Benchmark: explode, typed parse (lenient and strict) and render of a bank response
//! carrying an encrypted envelope, response codes, balances and a binary statement.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fints3::{explode_segments, serialize_segments, ParseMode, Parser, Registry};

fn sample_response(statements: usize) -> Vec<u8> {
    let mut inner: Vec<u8> = Vec::new();
    inner.extend_from_slice(
        b"HNSHK:2:4+PIN:1+999+4711+1+1+2::sysid+1+1:20240301:120000+1:999:1+6:10:16+280:12345678:user1:S:0:0'",
    );
    inner.extend_from_slice(b"HIRMG:3:2+0010::Nachricht entgegengenommen'");
    inner.extend_from_slice(b"HIRMS:4:2:3+0020::Auftrag ausgef?:uhrt+3040::Weitere Umsaetze:TD-1'");
    inner.extend_from_slice(
        b"HISAL:5:7:3+DE02120300000000202051:BYLADEM1001:1234567::280:12345678+Girokonto+EUR+C:1234,56:EUR:20240301'",
    );
    let statement = "-\r\n:20:STARTUMS\r\n:25:12345678/1234567\r\n:61:2403010301DR12,50NMSCNONREF\r\n".repeat(statements);
    inner.extend_from_slice(format!("HIKAZ:6:7:3+@{}@", statement.len()).as_bytes());
    inner.extend_from_slice(statement.as_bytes());
    inner.extend_from_slice(b"'HNSHA:7:2+4711'");

    let mut body = b"HNVSK:998:3+PIN:1+998+1+2::sysid+1:20240301:120000+2:2:13:@8@00000000:5:1+280:12345678:user1:V:0:0+0'".to_vec();
    body.extend_from_slice(format!("HNVSD:999:1+@{}@", inner.len()).as_bytes());
    body.extend_from_slice(&inner);
    body.extend_from_slice(b"'HNHBS:8:1+2'");

    let head_len = "HNHBK:1:3+000000000000+300+DLG-1+2+DLG-1:2'".len();
    let mut message = format!("HNHBK:1:3+{:012}+300+DLG-1+2+DLG-1:2'", head_len + body.len()).into_bytes();
    message.extend_from_slice(&body);
    message
}

fn bench_parse_message(c: &mut Criterion) {
    let registry = Registry::builtin();
    let lenient = Parser::new(registry.clone(), ParseMode::Lenient);
    let strict = Parser::new(registry, ParseMode::Strict);

    for statements in [1usize, 200] {
        let raw = sample_response(statements);
        let parsed = lenient.parse_message(&raw).expect("parse sample");
        eprintln!(
            "parse_message: {} bytes, {} segments, {} diagnostics",
            raw.len(),
            parsed.all_segments().count(),
            parsed.diagnostics.len()
        );

        c.bench_function(&format!("explode_{}", statements), |b| {
            b.iter(|| explode_segments(black_box(&raw)).map(|s| s.len()))
        });
        c.bench_function(&format!("parse_lenient_{}", statements), |b| {
            b.iter(|| lenient.parse_message(black_box(&raw)).map(|m| m.segments.len()))
        });
        c.bench_function(&format!("parse_strict_{}", statements), |b| {
            b.iter(|| strict.parse_message(black_box(&raw)).map(|m| m.segments.len()))
        });
        c.bench_function(&format!("render_{}", statements), |b| {
            b.iter(|| serialize_segments(black_box(&parsed.segments)).map(|v| v.len()))
        });
    }
}

criterion_group!(benches, bench_parse_message);
criterion_main!(benches);
