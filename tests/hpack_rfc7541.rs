//! HPACK の仕様例に基づくテスト (RFC 7541 Appendix C)
//!
//! エンコーダとデコーダをワイヤ上の実バイト列で検証します。

mod common;

use common::hex_to_bytes;
use h2codec::hpack::{HpackDecoder, HpackEncoder};

// ====================
// デコード (Appendix C.2 / C.3 / C.4)
// ====================

#[test]
fn c21_literal_header_with_indexing() {
    let buffer = hex_to_bytes("400a 6375 7374 6f6d 2d6b 6579 0d63 7573 746f 6d2d 6865 6164 6572");
    let mut decoder = HpackDecoder::new(4096);

    let block = decoder.decode(&buffer).unwrap();
    assert_eq!(block.consumed, buffer.len());
    assert_eq!(block.fields.len(), 1);
    assert_eq!(block.fields[0].name, b"custom-key");
    assert_eq!(block.fields[0].value, b"custom-header");

    let entry = decoder.dynamic_table().get(0).unwrap();
    assert_eq!(entry.name, b"custom-key");
    assert_eq!(entry.value, b"custom-header");
    assert_eq!(entry.size(), 55);
    assert_eq!(decoder.dynamic_table().size(), 55);
}

#[test]
fn c22_literal_header_without_indexing() {
    let buffer = hex_to_bytes("040c 2f73 616d 706c 652f 7061 7468");
    let mut decoder = HpackDecoder::new(4096);

    let block = decoder.decode(&buffer).unwrap();
    assert_eq!(block.fields.len(), 1);
    assert_eq!(block.fields[0].name, b":path");
    assert_eq!(block.fields[0].value, b"/sample/path");
    assert!(block.fields[0].allow_indexing);
    assert!(decoder.dynamic_table().is_empty());
}

#[test]
fn c23_literal_header_never_indexed() {
    let buffer = hex_to_bytes("1008 7061 7373 776f 7264 0673 6563 7265 74");
    let mut decoder = HpackDecoder::new(4096);

    let block = decoder.decode(&buffer).unwrap();
    assert_eq!(block.fields.len(), 1);
    assert_eq!(block.fields[0].name, b"password");
    assert_eq!(block.fields[0].value, b"secret");
    // Never Indexed はインデックス禁止マーカー付きでデコードされる
    assert!(!block.fields[0].allow_indexing);
    // 動的テーブルは空のまま
    assert!(decoder.dynamic_table().is_empty());
}

#[test]
fn c24_indexed_header_field() {
    let mut decoder = HpackDecoder::new(4096);

    let block = decoder.decode(&hex_to_bytes("82")).unwrap();
    assert_eq!(block.fields[0].name, b":method");
    assert_eq!(block.fields[0].value, b"GET");
    assert!(block.fields[0].allow_indexing);
    assert!(decoder.dynamic_table().is_empty());
}

/// Appendix C.3: Huffman なしの連続リクエスト
#[test]
fn c3_requests_without_huffman() {
    let mut decoder = HpackDecoder::new(4096);

    // C.3.1
    let block = decoder
        .decode(&hex_to_bytes(
            "8286 8441 0f77 7777 2e65 7861 6d70 6c65 2e63 6f6d",
        ))
        .unwrap();
    let expected: [(&[u8], &[u8]); 4] = [
        (b":method", b"GET"),
        (b":scheme", b"http"),
        (b":path", b"/"),
        (b":authority", b"www.example.com"),
    ];
    assert_eq!(block.fields.len(), 4);
    for (field, (name, value)) in block.fields.iter().zip(expected) {
        assert_eq!(field.name, name);
        assert_eq!(field.value, value);
    }
    assert_eq!(decoder.dynamic_table().get(0).unwrap().name, b":authority");

    // C.3.2
    let block = decoder
        .decode(&hex_to_bytes("8286 84be 5808 6e6f 2d63 6163 6865"))
        .unwrap();
    assert_eq!(block.fields.len(), 5);
    assert_eq!(block.fields[3].name, b":authority");
    assert_eq!(block.fields[3].value, b"www.example.com");
    assert_eq!(block.fields[4].name, b"cache-control");
    assert_eq!(block.fields[4].value, b"no-cache");
    assert_eq!(decoder.dynamic_table().get(0).unwrap().name, b"cache-control");
    assert_eq!(
        decoder.dynamic_table().get(1).unwrap().name,
        b":authority"
    );

    // C.3.3
    let block = decoder
        .decode(&hex_to_bytes(
            "8287 85bf 400a 6375 7374 6f6d 2d6b 6579 0c63 7573 746f 6d2d 7661 6c75 65",
        ))
        .unwrap();
    assert_eq!(block.fields.len(), 5);
    assert_eq!(block.fields[1].value, b"https");
    assert_eq!(block.fields[2].value, b"/index.html");
    assert_eq!(block.fields[3].name, b":authority");
    assert_eq!(block.fields[4].name, b"custom-key");
    assert_eq!(block.fields[4].value, b"custom-value");
    assert_eq!(decoder.dynamic_table().len(), 3);
    assert_eq!(decoder.dynamic_table().get(0).unwrap().name, b"custom-key");
}

/// Appendix C.4: Huffman 符号化された連続リクエスト
#[test]
fn c4_requests_with_huffman() {
    let mut decoder = HpackDecoder::new(4096);

    // C.4.1
    let block = decoder
        .decode(&hex_to_bytes("8286 8441 8cf1 e3c2 e5f2 3a6b a0ab 90f4 ff"))
        .unwrap();
    assert_eq!(block.fields.len(), 4);
    assert_eq!(block.fields[0].value, b"GET");
    assert_eq!(block.fields[3].name, b":authority");
    assert_eq!(block.fields[3].value, b"www.example.com");
    assert_eq!(decoder.dynamic_table().get(0).unwrap().value, b"www.example.com");

    // C.4.2
    let block = decoder
        .decode(&hex_to_bytes("8286 84be 5886 a8eb 1064 9cbf"))
        .unwrap();
    assert_eq!(block.fields.len(), 5);
    assert_eq!(block.fields[4].name, b"cache-control");
    assert_eq!(block.fields[4].value, b"no-cache");

    // C.4.3
    let block = decoder
        .decode(&hex_to_bytes(
            "8287 85bf 4088 25a8 49e9 5ba9 7d7f 8925 a849 e95b b8e8 b4bf",
        ))
        .unwrap();
    assert_eq!(block.fields.len(), 5);
    assert_eq!(block.fields[4].name, b"custom-key");
    assert_eq!(block.fields[4].value, b"custom-value");
}

// ====================
// エンコード (C.4 のバイト列を再現)
// ====================

#[test]
fn encode_first_request_matches_c41() {
    let mut encoder = HpackEncoder::new(8192);
    let mut buf = Vec::new();

    encoder.encode(&mut buf, b":method", b"GET");
    encoder.encode(&mut buf, b":scheme", b"http");
    encoder.encode(&mut buf, b":path", b"/");
    encoder.encode(&mut buf, b":authority", b"www.example.com");

    assert_eq!(
        buf,
        hex_to_bytes("8286 8441 8cf1 e3c2 e5f2 3a6b a0ab 90f4 ff")
    );
}

#[test]
fn encode_second_request_uses_dynamic_index() {
    let mut encoder = HpackEncoder::new(8192);
    let mut buf = Vec::new();
    encoder.encode(&mut buf, b":method", b"GET");
    encoder.encode(&mut buf, b":scheme", b"http");
    encoder.encode(&mut buf, b":path", b"/");
    encoder.encode(&mut buf, b":authority", b"www.example.com");

    // 2 番目のリクエスト: :authority は動的テーブルの完全一致になり
    // 1 バイトのインデックス表現 0xBE になる
    buf.clear();
    encoder.encode(&mut buf, b":authority", b"www.example.com");
    assert_eq!(buf, vec![0xBE]);

    buf.clear();
    encoder.encode(&mut buf, b"cache-control", b"no-cache");
    assert_eq!(buf, hex_to_bytes("5886 a8eb 1064 9cbf"));
}

#[test]
fn encode_third_request_matches_c43() {
    let mut encoder = HpackEncoder::new(8192);
    let mut buf = Vec::new();

    // C.4.1 と C.4.2 を通してテーブルを作る
    encoder.encode(&mut buf, b":method", b"GET");
    encoder.encode(&mut buf, b":scheme", b"http");
    encoder.encode(&mut buf, b":path", b"/");
    encoder.encode(&mut buf, b":authority", b"www.example.com");
    encoder.encode(&mut buf, b"cache-control", b"no-cache");

    // 3 番目のリクエスト全体が C.4.3 のバイト列になる
    buf.clear();
    encoder.encode(&mut buf, b":method", b"GET");
    encoder.encode(&mut buf, b":scheme", b"https");
    encoder.encode(&mut buf, b":path", b"/index.html");
    encoder.encode(&mut buf, b":authority", b"www.example.com");
    encoder.encode(&mut buf, b"custom-key", b"custom-value");

    assert_eq!(
        buf,
        hex_to_bytes("8287 85bf 4088 25a8 49e9 5ba9 7d7f 8925 a849 e95b b8e8 b4bf")
    );
}

// ====================
// エンコーダとデコーダの結合
// ====================

#[test]
fn encoder_decoder_stay_in_sync() {
    let mut encoder = HpackEncoder::new(4096);
    let mut decoder = HpackDecoder::new(4096);

    let requests: &[&[(&[u8], &[u8])]] = &[
        &[
            (b":method", b"GET"),
            (b":path", b"/"),
            (b"x-trace-id", b"trace-1"),
        ],
        &[
            (b":method", b"GET"),
            (b":path", b"/"),
            (b"x-trace-id", b"trace-1"), // 再利用 → 動的インデックス
        ],
        &[
            (b":method", b"POST"),
            (b":path", b"/submit"),
            (b"x-trace-id", b"trace-2"), // 名前のみ一致
        ],
    ];

    for request in requests {
        let mut buf = Vec::new();
        for &(name, value) in request.iter() {
            encoder.encode(&mut buf, name, value);
        }
        let block = decoder.decode(&buf).unwrap();
        assert_eq!(block.consumed, buf.len());
        assert_eq!(block.fields.len(), request.len());
        for (field, &(name, value)) in block.fields.iter().zip(request.iter()) {
            assert_eq!(field.name, name);
            assert_eq!(field.value, value);
        }
    }

    // 両側の動的テーブルが同一内容を持つ
    assert_eq!(
        encoder.dynamic_table().len(),
        decoder.dynamic_table().len()
    );
    for i in 0..encoder.dynamic_table().len() {
        assert_eq!(
            encoder.dynamic_table().get(i).unwrap(),
            decoder.dynamic_table().get(i).unwrap()
        );
    }
}

#[test]
fn sensitive_fields_never_reach_the_table() {
    let mut encoder = HpackEncoder::new(4096);
    let mut decoder = HpackDecoder::new(4096);

    let mut buf = Vec::new();
    encoder.encode_sensitive(&mut buf, b"authorization", b"Bearer token123");
    encoder.encode(&mut buf, b":method", b"GET");

    let block = decoder.decode(&buf).unwrap();
    assert_eq!(block.fields.len(), 2);
    assert!(!block.fields[0].allow_indexing);
    assert!(block.fields[1].allow_indexing);

    assert!(encoder.dynamic_table().is_empty());
    assert!(decoder.dynamic_table().is_empty());
}

#[test]
fn table_size_update_synchronizes() {
    let mut encoder = HpackEncoder::new(4096);
    let mut decoder = HpackDecoder::new(4096);

    encoder.set_max_table_size(1024).unwrap();

    let mut buf = Vec::new();
    encoder.encode(&mut buf, b"x-header", b"value");

    // ブロック先頭のサイズ更新でデコードが打ち切られ、残りから再開
    let first = decoder.decode(&buf).unwrap();
    assert_eq!(first.table_size_update, Some(1024));
    assert!(first.fields.is_empty());

    let rest = decoder.decode(&buf[first.consumed..]).unwrap();
    assert_eq!(rest.fields.len(), 1);
    assert_eq!(rest.fields[0].name, b"x-header");
    assert_eq!(decoder.dynamic_table().max_size(), 1024);
}

#[test]
fn long_header_values_roundtrip() {
    // 4KB までの印字可能 ASCII をラウンドトリップ
    let mut encoder = HpackEncoder::new(65536);
    let mut decoder = HpackDecoder::new(65536);

    let printable: Vec<u8> = (0x20u8..0x7f).collect();
    let mut value = Vec::new();
    while value.len() < 4096 {
        value.extend_from_slice(&printable);
    }
    value.truncate(4096);

    let mut buf = Vec::new();
    encoder.encode(&mut buf, b"x-large", &value);

    let block = decoder.decode(&buf).unwrap();
    assert_eq!(block.fields[0].value, value);
}
