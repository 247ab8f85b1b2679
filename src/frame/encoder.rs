//! # HTTP/2 フレームエンコーダ
//!
//! タイプ別のフレームをワイヤ形式に直列化します。
//! HEADERS / PUSH_PROMISE のヘッダーブロックは HPACK エンコーダで
//! 符号化し、max_frame_size を超える場合は HEADERS + CONTINUATION に
//! 分割して END_HEADERS を最後のチャンクにのみ設定します。

use std::collections::HashMap;

use crate::error::{Http2Error, Http2ErrorCode, Http2Result};
use crate::hpack::HpackEncoder;
use crate::settings::SettingsUpdate;

use super::types::{Frame, FrameFlags, FrameHeader, FrameType, HeaderList, PrioritySpec};

/// 拡張フレームエンコーダ
///
/// 未知のフレームタイプに対して登録できます。
pub trait ExtensionEncoder {
    /// フレームをエンコード
    fn encode(&self, frame: &Frame) -> Http2Result<Vec<u8>>;
}

/// フレームエンコーダ
///
/// コネクションごとに 1 インスタンス。送信方向の HPACK エンコーダを
/// 所有するため、フレームは生成順に直列化する必要があります。
pub struct FrameEncoder {
    /// 最大フレームサイズ
    max_frame_size: u32,
    /// HPACK エンコーダ (送信方向)
    hpack: HpackEncoder,
    /// 拡張フレームエンコーダ (タイプ → エンコーダ)
    extensions: HashMap<u8, Box<dyn ExtensionEncoder>>,
}

impl FrameEncoder {
    /// 新しいエンコーダを作成
    pub fn new(max_frame_size: u32, header_table_size: usize) -> Self {
        Self {
            max_frame_size,
            hpack: HpackEncoder::new(header_table_size),
            extensions: HashMap::new(),
        }
    }

    /// 最大フレームサイズを設定
    pub fn set_max_frame_size(&mut self, size: u32) {
        self.max_frame_size = size;
    }

    /// 拡張エンコーダを登録
    pub fn register_extension(&mut self, frame_type: u8, encoder: Box<dyn ExtensionEncoder>) {
        self.extensions.insert(frame_type, encoder);
    }

    /// HPACK エンコーダへの参照 (テスト・診断用)
    pub fn hpack(&self) -> &HpackEncoder {
        &self.hpack
    }

    /// HPACK エンコーダへの可変参照
    pub fn hpack_mut(&mut self) -> &mut HpackEncoder {
        &mut self.hpack
    }

    /// DATA フレームをエンコード
    pub fn encode_data(&self, stream_id: u32, data: &[u8], end_stream: bool) -> Vec<u8> {
        let mut flags = 0u8;
        if end_stream {
            flags |= FrameFlags::END_STREAM;
        }

        let header = FrameHeader::new(FrameType::Data, flags, stream_id, data.len() as u32);

        let mut buf = Vec::with_capacity(FrameHeader::SIZE + data.len());
        let mut header_buf = [0u8; 9];
        header.encode(&mut header_buf);
        buf.extend_from_slice(&header_buf);
        buf.extend_from_slice(data);
        buf
    }

    /// HEADERS フレームをエンコード (必要なら CONTINUATION に分割)
    ///
    /// ヘッダーごとの表現形式はエントリのフラグで決まります:
    /// `sensitive` → Never Indexed、`allow_indexing` が false →
    /// インデックス更新なし、それ以外 → インデックス更新あり。
    pub fn encode_headers(
        &mut self,
        stream_id: u32,
        fields: &HeaderList,
        end_stream: bool,
        priority: Option<PrioritySpec>,
    ) -> Vec<u8> {
        let block = self.encode_header_block(fields);
        let priority_len = if priority.is_some() { 5u32 } else { 0 };

        // 最初のフレームに収まるブロックサイズ
        let first_capacity = self.max_frame_size.saturating_sub(priority_len) as usize;
        let first_chunk_len = block.len().min(first_capacity);
        let end_headers = first_chunk_len == block.len();

        let mut flags = 0u8;
        if end_stream {
            flags |= FrameFlags::END_STREAM;
        }
        if end_headers {
            flags |= FrameFlags::END_HEADERS;
        }
        if priority.is_some() {
            flags |= FrameFlags::PRIORITY;
        }

        let length = priority_len + first_chunk_len as u32;
        let header = FrameHeader::new(FrameType::Headers, flags, stream_id, length);

        let mut buf = Vec::with_capacity(FrameHeader::SIZE + length as usize);
        let mut header_buf = [0u8; 9];
        header.encode(&mut header_buf);
        buf.extend_from_slice(&header_buf);

        if let Some(p) = priority {
            let dep = if p.exclusive {
                p.dependency | 0x8000_0000
            } else {
                p.dependency
            };
            buf.extend_from_slice(&dep.to_be_bytes());
            buf.push(p.weight);
        }

        buf.extend_from_slice(&block[..first_chunk_len]);

        // 残りを CONTINUATION で送出
        self.append_continuations(&mut buf, stream_id, &block[first_chunk_len..]);
        buf
    }

    /// PUSH_PROMISE フレームをエンコード (必要なら CONTINUATION に分割)
    pub fn encode_push_promise(
        &mut self,
        stream_id: u32,
        promised_stream_id: u32,
        fields: &HeaderList,
    ) -> Vec<u8> {
        let block = self.encode_header_block(fields);

        let first_capacity = self.max_frame_size.saturating_sub(4) as usize;
        let first_chunk_len = block.len().min(first_capacity);
        let end_headers = first_chunk_len == block.len();

        let flags = if end_headers { FrameFlags::END_HEADERS } else { 0 };
        let length = 4 + first_chunk_len as u32;
        let header = FrameHeader::new(FrameType::PushPromise, flags, stream_id, length);

        let mut buf = Vec::with_capacity(FrameHeader::SIZE + length as usize);
        let mut header_buf = [0u8; 9];
        header.encode(&mut header_buf);
        buf.extend_from_slice(&header_buf);
        buf.extend_from_slice(&(promised_stream_id & 0x7FFF_FFFF).to_be_bytes());
        buf.extend_from_slice(&block[..first_chunk_len]);

        self.append_continuations(&mut buf, stream_id, &block[first_chunk_len..]);
        buf
    }

    /// ヘッダーリストを HPACK ブロックに符号化
    fn encode_header_block(&mut self, fields: &HeaderList) -> Vec<u8> {
        let mut block = Vec::with_capacity(fields.len() * 32);
        for entry in fields {
            if entry.sensitive {
                self.hpack.encode_sensitive(&mut block, &entry.name, &entry.value);
            } else if !entry.allow_indexing {
                self.hpack
                    .encode_without_indexing(&mut block, &entry.name, &entry.value);
            } else {
                self.hpack.encode(&mut block, &entry.name, &entry.value);
            }
        }
        block
    }

    /// 残りのブロックを CONTINUATION フレーム列として追記
    ///
    /// END_HEADERS は最後のチャンクにのみ設定されます。
    fn append_continuations(&self, buf: &mut Vec<u8>, stream_id: u32, mut rest: &[u8]) {
        let chunk_size = self.max_frame_size as usize;
        while !rest.is_empty() {
            let take = rest.len().min(chunk_size);
            let last = take == rest.len();
            let flags = if last { FrameFlags::END_HEADERS } else { 0 };

            let header =
                FrameHeader::new(FrameType::Continuation, flags, stream_id, take as u32);
            let mut header_buf = [0u8; 9];
            header.encode(&mut header_buf);
            buf.extend_from_slice(&header_buf);
            buf.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
        }
    }

    /// SETTINGS フレームをエンコード
    pub fn encode_settings(&self, settings: &SettingsUpdate, ack: bool) -> Vec<u8> {
        let flags = if ack { FrameFlags::ACK } else { 0 };
        let payload = if ack { Vec::new() } else { settings.encode() };

        let header = FrameHeader::new(FrameType::Settings, flags, 0, payload.len() as u32);

        let mut buf = Vec::with_capacity(FrameHeader::SIZE + payload.len());
        let mut header_buf = [0u8; 9];
        header.encode(&mut header_buf);
        buf.extend_from_slice(&header_buf);
        buf.extend_from_slice(&payload);
        buf
    }

    /// SETTINGS ACK フレームをエンコード
    pub fn encode_settings_ack(&self) -> Vec<u8> {
        self.encode_settings(&SettingsUpdate::new(), true)
    }

    /// WINDOW_UPDATE フレームをエンコード
    pub fn encode_window_update(&self, stream_id: u32, increment: u32) -> Vec<u8> {
        let header = FrameHeader::new(FrameType::WindowUpdate, 0, stream_id, 4);

        let mut buf = Vec::with_capacity(FrameHeader::SIZE + 4);
        let mut header_buf = [0u8; 9];
        header.encode(&mut header_buf);
        buf.extend_from_slice(&header_buf);
        buf.extend_from_slice(&(increment & 0x7FFF_FFFF).to_be_bytes());
        buf
    }

    /// PING フレームをエンコード
    pub fn encode_ping(&self, data: &[u8; 8], ack: bool) -> Vec<u8> {
        let flags = if ack { FrameFlags::ACK } else { 0 };
        let header = FrameHeader::new(FrameType::Ping, flags, 0, 8);

        let mut buf = Vec::with_capacity(FrameHeader::SIZE + 8);
        let mut header_buf = [0u8; 9];
        header.encode(&mut header_buf);
        buf.extend_from_slice(&header_buf);
        buf.extend_from_slice(data);
        buf
    }

    /// RST_STREAM フレームをエンコード
    pub fn encode_rst_stream(&self, stream_id: u32, error_code: Http2ErrorCode) -> Vec<u8> {
        let header = FrameHeader::new(FrameType::RstStream, 0, stream_id, 4);

        let mut buf = Vec::with_capacity(FrameHeader::SIZE + 4);
        let mut header_buf = [0u8; 9];
        header.encode(&mut header_buf);
        buf.extend_from_slice(&header_buf);
        buf.extend_from_slice(&(error_code as u32).to_be_bytes());
        buf
    }

    /// GOAWAY フレームをエンコード
    pub fn encode_goaway(
        &self,
        last_stream_id: u32,
        error_code: Http2ErrorCode,
        debug_data: &[u8],
    ) -> Vec<u8> {
        let length = 8 + debug_data.len() as u32;
        let header = FrameHeader::new(FrameType::GoAway, 0, 0, length);

        let mut buf = Vec::with_capacity(FrameHeader::SIZE + length as usize);
        let mut header_buf = [0u8; 9];
        header.encode(&mut header_buf);
        buf.extend_from_slice(&header_buf);
        buf.extend_from_slice(&(last_stream_id & 0x7FFF_FFFF).to_be_bytes());
        buf.extend_from_slice(&(error_code as u32).to_be_bytes());
        buf.extend_from_slice(debug_data);
        buf
    }

    /// PRIORITY フレームをエンコード
    pub fn encode_priority(&self, stream_id: u32, priority: PrioritySpec) -> Vec<u8> {
        let header = FrameHeader::new(FrameType::Priority, 0, stream_id, 5);

        let mut buf = Vec::with_capacity(FrameHeader::SIZE + 5);
        let mut header_buf = [0u8; 9];
        header.encode(&mut header_buf);
        buf.extend_from_slice(&header_buf);

        let dep = if priority.exclusive {
            priority.dependency | 0x8000_0000
        } else {
            priority.dependency
        };
        buf.extend_from_slice(&dep.to_be_bytes());
        buf.push(priority.weight);
        buf
    }

    /// Frame 型からエンコード
    pub fn encode(&mut self, frame: &Frame) -> Http2Result<Vec<u8>> {
        match frame {
            Frame::Data {
                stream_id,
                end_stream,
                data,
            } => Ok(self.encode_data(*stream_id, data, *end_stream)),
            Frame::Headers {
                stream_id,
                end_stream,
                priority,
                fields,
            } => Ok(self.encode_headers(*stream_id, fields, *end_stream, *priority)),
            Frame::Priority {
                stream_id,
                priority,
            } => Ok(self.encode_priority(*stream_id, *priority)),
            Frame::RstStream {
                stream_id,
                error_code,
            } => Ok(self.encode_rst_stream(*stream_id, *error_code)),
            Frame::Settings { ack, settings } => Ok(self.encode_settings(settings, *ack)),
            Frame::PushPromise {
                stream_id,
                promised_stream_id,
                fields,
            } => Ok(self.encode_push_promise(*stream_id, *promised_stream_id, fields)),
            Frame::Ping { ack, data } => Ok(self.encode_ping(data, *ack)),
            Frame::GoAway {
                last_stream_id,
                error_code,
                debug_data,
            } => Ok(self.encode_goaway(*last_stream_id, *error_code, debug_data)),
            Frame::WindowUpdate {
                stream_id,
                increment,
            } => Ok(self.encode_window_update(*stream_id, *increment)),
            Frame::Continuation {
                stream_id,
                end_headers,
                header_block,
            } => {
                let flags = if *end_headers { FrameFlags::END_HEADERS } else { 0 };
                let header = FrameHeader::new(
                    FrameType::Continuation,
                    flags,
                    *stream_id,
                    header_block.len() as u32,
                );
                let mut buf = Vec::with_capacity(FrameHeader::SIZE + header_block.len());
                let mut header_buf = [0u8; 9];
                header.encode(&mut header_buf);
                buf.extend_from_slice(&header_buf);
                buf.extend_from_slice(header_block);
                Ok(buf)
            }
            Frame::Unknown { frame_type, .. } => match self.extensions.get(frame_type) {
                Some(ext) => ext.encode(frame),
                None => Err(Http2Error::InvalidFrame(format!(
                    "No encoder registered for frame type 0x{:02x}",
                    frame_type
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::types::HeaderEntry;

    #[test]
    fn test_encode_data() {
        let encoder = FrameEncoder::new(16384, 4096);
        let data = b"Hello, World!";
        let frame = encoder.encode_data(1, data, true);

        assert_eq!(frame.len(), 9 + data.len());
        let header = FrameHeader::decode(frame[..9].try_into().unwrap());
        assert_eq!(header.frame_type, FrameType::Data as u8);
        assert_eq!(header.stream_id, 1);
        assert_eq!(header.length, data.len() as u32);
        assert!(header.is_end_stream());
    }

    #[test]
    fn test_encode_settings() {
        let encoder = FrameEncoder::new(16384, 4096);
        let mut update = SettingsUpdate::new();
        update.set(0x1, 4096);
        update.set(0x3, 100);
        let frame = encoder.encode_settings(&update, false);

        assert_eq!(frame.len(), 9 + 12); // 2 settings × 6 bytes
        let header = FrameHeader::decode(frame[..9].try_into().unwrap());
        assert_eq!(header.frame_type, FrameType::Settings as u8);
        assert!(!header.is_ack());
        assert_eq!(header.stream_id, 0);
    }

    #[test]
    fn test_encode_settings_ack() {
        let encoder = FrameEncoder::new(16384, 4096);
        let frame = encoder.encode_settings_ack();

        assert_eq!(frame.len(), 9); // ヘッダーのみ
        let header = FrameHeader::decode(frame[..9].try_into().unwrap());
        assert!(header.is_ack());
        assert_eq!(header.length, 0);
    }

    #[test]
    fn test_encode_headers_single_frame() {
        let mut encoder = FrameEncoder::new(16384, 4096);
        let mut fields = HeaderList::new();
        fields.push(HeaderEntry::new(":status", "200"));

        let frame = encoder.encode_headers(1, &fields, true, None);
        let header = FrameHeader::decode(frame[..9].try_into().unwrap());
        assert_eq!(header.frame_type, FrameType::Headers as u8);
        assert!(header.is_end_headers());
        assert!(header.is_end_stream());
        // :status 200 は静的テーブルのインデックス 8
        assert_eq!(frame[9], 0x88);
    }

    #[test]
    fn test_encode_headers_split_into_continuation() {
        let mut encoder = FrameEncoder::new(4, 4096);
        let mut fields = HeaderList::new();
        fields.push(HeaderEntry::new("x-long-header", "abcdefghijklmnop"));

        let bytes = encoder.encode_headers(1, &fields, false, None);

        // 最初のフレームは HEADERS、END_HEADERS なし
        let first = FrameHeader::decode(bytes[..9].try_into().unwrap());
        assert_eq!(first.frame_type, FrameType::Headers as u8);
        assert!(!first.is_end_headers());
        assert_eq!(first.length, 4);

        // フレーム列を歩いて最後が END_HEADERS 付き CONTINUATION であること
        let mut pos = 0;
        let mut last_header = first;
        while pos < bytes.len() {
            let h = FrameHeader::decode(bytes[pos..pos + 9].try_into().unwrap());
            assert!(h.length <= 4);
            pos += 9 + h.length as usize;
            last_header = h;
        }
        assert_eq!(pos, bytes.len());
        assert_eq!(last_header.frame_type, FrameType::Continuation as u8);
        assert!(last_header.is_end_headers());
    }

    #[test]
    fn test_encode_headers_with_priority() {
        let mut encoder = FrameEncoder::new(16384, 4096);
        let mut fields = HeaderList::new();
        fields.push(HeaderEntry::new(":status", "200"));

        let priority = PrioritySpec {
            dependency: 3,
            exclusive: true,
            weight: 255,
        };
        let frame = encoder.encode_headers(1, &fields, false, Some(priority));

        let header = FrameHeader::decode(frame[..9].try_into().unwrap());
        assert!(header.is_priority());
        assert_eq!(header.length, 5 + 1);
        let dep = u32::from_be_bytes(frame[9..13].try_into().unwrap());
        assert_eq!(dep & 0x8000_0000, 0x8000_0000);
        assert_eq!(dep & 0x7FFF_FFFF, 3);
        assert_eq!(frame[13], 255);
    }

    #[test]
    fn test_encode_sensitive_entry_uses_never_indexed() {
        let mut encoder = FrameEncoder::new(16384, 4096);
        let mut fields = HeaderList::new();
        fields.push(HeaderEntry::sensitive("password", "secret"));

        let frame = encoder.encode_headers(1, &fields, true, None);
        // 表現バイトは 0001xxxx
        assert_eq!(frame[9] & 0xF0, 0x10);
        // 動的テーブルには追加されない
        assert!(encoder.hpack().dynamic_table().is_empty());
    }

    #[test]
    fn test_encode_goaway() {
        let encoder = FrameEncoder::new(16384, 4096);
        let debug = b"goodbye";
        let frame = encoder.encode_goaway(100, Http2ErrorCode::NoError, debug);

        assert_eq!(frame.len(), 9 + 8 + debug.len());
        let header = FrameHeader::decode(frame[..9].try_into().unwrap());
        assert_eq!(header.frame_type, FrameType::GoAway as u8);
        assert_eq!(header.stream_id, 0);
    }

    #[test]
    fn test_encode_window_update() {
        let encoder = FrameEncoder::new(16384, 4096);
        let frame = encoder.encode_window_update(1, 65535);

        assert_eq!(frame.len(), 9 + 4);
        let header = FrameHeader::decode(frame[..9].try_into().unwrap());
        assert_eq!(header.frame_type, FrameType::WindowUpdate as u8);
        assert_eq!(header.stream_id, 1);
    }

    #[test]
    fn test_encode_unknown_without_extension_fails() {
        let mut encoder = FrameEncoder::new(16384, 4096);
        let frame = Frame::Unknown {
            frame_type: 0xfe,
            flags: 0,
            stream_id: 1,
            payload: vec![1, 2, 3],
        };
        assert!(encoder.encode(&frame).is_err());
    }
}
