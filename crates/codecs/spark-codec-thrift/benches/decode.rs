use std::hint::black_box;

use bytes::{Bytes, BytesMut};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use spark_codec_thrift::{
    ByteWindow, DecoderConfig, Encoder, Field, MessageType, ThriftDecoder, TypeTag, Value,
    WireEncoding,
};

/// 构造一条带嵌套结构体、字符串列表与映射的调用消息。
fn sample_message(encoding: WireEncoding) -> Vec<u8> {
    let inner = Value::Struct(vec![
        Field::new(1, Value::I32(42)),
        Field::new(2, Value::Binary(Bytes::from_static(b"spark-codec-thrift"))),
        Field::new(3, Value::Double(1.5)),
    ]);
    let body = Value::Struct(vec![
        Field::new(1, Value::I64(1_700_000_000_000)),
        Field::new(2, inner),
        Field::new(
            3,
            Value::List {
                elem: TypeTag::Binary,
                items: (0..64)
                    .map(|i| Value::Binary(Bytes::from(format!("item-{i}"))))
                    .collect(),
            },
        ),
        Field::new(
            4,
            Value::Map {
                types: Some((TypeTag::I32, TypeTag::Bool)),
                entries: (0..32).map(|i| (Value::I32(i), Value::Bool(i % 2 == 0))).collect(),
            },
        ),
    ]);
    let mut out = BytesMut::new();
    Encoder::new(encoding).message(MessageType::Call, 1, "submit", &body, &mut out);
    out.to_vec()
}

/// 通用解码吞吐：严格二进制与紧凑协议各一组。
///
/// 输出中的 `thrpt` 以输入字节计，便于与抓包速率直接比较。
fn bench_decode_message(c: &mut Criterion) {
    let decoder = ThriftDecoder::new(DecoderConfig::default());
    let mut group = c.benchmark_group("decode_message");
    for encoding in [WireEncoding::BinaryStrict, WireEncoding::Compact] {
        let bytes = sample_message(encoding);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_function(encoding.as_str(), |b| {
            b.iter(|| {
                let window = ByteWindow::new(black_box(&bytes));
                black_box(decoder.decode_message(&window, 0))
            })
        });
    }
    group.finish();
}

criterion_group!(thrift_benches, bench_decode_message);
criterion_main!(thrift_benches);
