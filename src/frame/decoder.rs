//! # HTTP/2 フレームデコーダ
//!
//! 9 バイトのフレームヘッダーとタイプ別ペイロードを解析します。
//! HEADERS / PUSH_PROMISE / CONTINUATION のヘッダーブロック断片は
//! END_HEADERS が揃うまでコネクション単位の再組立スロットに蓄積し、
//! 完成したブロックを HPACK デコーダに委譲します (RFC 7540
//! Section 4.3: ヘッダーブロックは他ストリームのフレームと交差
//! できないため、スロットは 1 つで足ります)。

use std::collections::HashMap;

use crate::error::{Http2Error, Http2ErrorCode, Http2Result};
use crate::hpack::HpackDecoder;
use crate::settings::SettingsUpdate;

use super::types::{Frame, FrameHeader, FrameType, HeaderList, PrioritySpec};

/// 拡張フレームデコーダ
///
/// 未知のフレームタイプに対して登録できます。未登録のタイプは
/// ペイロードを読み捨てて無視します。
pub trait ExtensionDecoder {
    /// フレームをデコード
    fn decode(&self, header: &FrameHeader, payload: &[u8]) -> Http2Result<Frame>;
}

/// デコードの進行状態
#[derive(Debug)]
pub enum Decoded {
    /// 入力不足。バッファ全体で最低このバイト数が必要
    Incomplete(usize),
    /// フレームを消費したが、返すものはまだ無い
    /// (END_HEADERS 待ちの断片、または無視された未知フレーム)
    Pending(usize),
    /// フレームが完成した (消費バイト数付き)
    Frame(Frame, usize),
}

/// 再組立中のヘッダーブロックの種別
enum PendingKind {
    Headers {
        end_stream: bool,
        priority: Option<PrioritySpec>,
    },
    PushPromise {
        promised_stream_id: u32,
    },
}

/// 再組立中のヘッダーブロック
///
/// HEADERS / PUSH_PROMISE が END_HEADERS なしで届いた時点で作られ、
/// END_HEADERS 付きの CONTINUATION で消費されます。
///
/// HPACK の表現はフレーム境界をまたいで分割され得るため、断片は
/// 生のバイト列のまま蓄積し、ブロックが完成してから一度だけ
/// デコードします。
struct PendingHeaderBlock {
    /// 対象ストリーム ID
    stream_id: u32,
    /// フレーム種別と固有フィールド
    kind: PendingKind,
    /// 蓄積された断片 (生バイト)
    block: Vec<u8>,
}

/// フレームデコーダ
///
/// コネクションごとに 1 インスタンス。HPACK デコーダと再組立スロットを
/// 所有するため、フレームは受信順に逐次デコードする必要があります。
pub struct FrameDecoder {
    /// 最大フレームサイズ
    max_frame_size: u32,
    /// ヘッダーブロックの累積サイズ上限
    max_header_block_size: usize,
    /// HPACK デコーダ (受信方向)
    hpack: HpackDecoder,
    /// 再組立スロット (コネクションに 1 つ)
    pending: Option<PendingHeaderBlock>,
    /// 拡張フレームデコーダ (タイプ → デコーダ)
    extensions: HashMap<u8, Box<dyn ExtensionDecoder>>,
    /// 直近に受信した Dynamic Table Size Update
    last_table_size_update: Option<usize>,
}

impl FrameDecoder {
    /// 新しいデコーダを作成
    pub fn new(max_frame_size: u32, header_table_size: usize) -> Self {
        Self {
            max_frame_size,
            max_header_block_size: crate::settings::defaults::MAX_HEADER_BLOCK_SIZE,
            hpack: HpackDecoder::new(header_table_size),
            pending: None,
            extensions: HashMap::new(),
            last_table_size_update: None,
        }
    }

    /// 最大フレームサイズを設定
    pub fn set_max_frame_size(&mut self, size: u32) {
        self.max_frame_size = size;
    }

    /// 最大フレームサイズを取得
    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    /// SETTINGS で合意した HPACK テーブルサイズ上限を更新
    pub fn set_max_table_size(&mut self, size: usize) {
        self.hpack.set_max_table_size(size);
    }

    /// 拡張デコーダを登録
    pub fn register_extension(&mut self, frame_type: u8, decoder: Box<dyn ExtensionDecoder>) {
        self.extensions.insert(frame_type, decoder);
    }

    /// HPACK デコーダへの参照 (テスト・診断用)
    pub fn hpack(&self) -> &HpackDecoder {
        &self.hpack
    }

    /// 直近の Dynamic Table Size Update 通知を取り出す
    pub fn take_table_size_update(&mut self) -> Option<usize> {
        self.last_table_size_update.take()
    }

    /// バッファ先頭のフレームを 1 つデコード
    ///
    /// 入力が足りない場合は `Decoded::Incomplete` で必要バイト数を返し、
    /// 呼び出し側 (トランスポート層) が追加受信してから再呼び出しします。
    pub fn decode(&mut self, buf: &[u8]) -> Http2Result<Decoded> {
        if buf.len() < FrameHeader::SIZE {
            return Ok(Decoded::Incomplete(FrameHeader::SIZE));
        }

        let header_bytes: [u8; 9] = buf[..9].try_into().unwrap();
        let header = FrameHeader::decode(&header_bytes);

        if header.length > self.max_frame_size {
            return Err(Http2Error::FrameTooLarge(
                header.length as usize,
                self.max_frame_size as usize,
            ));
        }

        let total = FrameHeader::SIZE + header.length as usize;
        if buf.len() < total {
            return Ok(Decoded::Incomplete(total));
        }

        let payload = &buf[FrameHeader::SIZE..total];

        // RFC 7540 Section 4.3: 再組立中は同一ストリームの CONTINUATION
        // 以外のフレームを受信してはならない
        if let Some(pending) = &self.pending {
            let is_continuation = header.frame_type == FrameType::Continuation as u8;
            if !is_continuation {
                return Err(Http2Error::protocol_error(
                    "Expected CONTINUATION frame during header block",
                ));
            }
            if header.stream_id != pending.stream_id {
                return Err(Http2Error::protocol_error(format!(
                    "CONTINUATION for stream {} while stream {} is assembling",
                    header.stream_id, pending.stream_id
                )));
            }
        }

        let frame = match FrameType::from_u8(header.frame_type) {
            Some(FrameType::Data) => Some(self.decode_data(&header, payload)?),
            Some(FrameType::Headers) => self.decode_headers(&header, payload)?,
            Some(FrameType::Priority) => Some(self.decode_priority(&header, payload)?),
            Some(FrameType::RstStream) => Some(self.decode_rst_stream(&header, payload)?),
            Some(FrameType::Settings) => Some(self.decode_settings(&header, payload)?),
            Some(FrameType::PushPromise) => self.decode_push_promise(&header, payload)?,
            Some(FrameType::Ping) => Some(self.decode_ping(&header, payload)?),
            Some(FrameType::GoAway) => Some(self.decode_goaway(&header, payload)?),
            Some(FrameType::WindowUpdate) => Some(self.decode_window_update(&header, payload)?),
            Some(FrameType::Continuation) => self.decode_continuation(&header, payload)?,
            None => {
                // 未知のタイプは登録済みの拡張デコーダへ、無ければ無視
                match self.extensions.get(&header.frame_type) {
                    Some(ext) => Some(ext.decode(&header, payload)?),
                    None => {
                        ftlog::debug!(
                            "Ignoring unknown frame type 0x{:02x} ({} bytes)",
                            header.frame_type,
                            header.length
                        );
                        None
                    }
                }
            }
        };

        match frame {
            Some(frame) => Ok(Decoded::Frame(frame, total)),
            None => Ok(Decoded::Pending(total)),
        }
    }

    /// DATA フレームをデコード
    fn decode_data(&self, header: &FrameHeader, payload: &[u8]) -> Http2Result<Frame> {
        if header.stream_id == 0 {
            return Err(Http2Error::protocol_error("DATA frame with stream ID 0"));
        }

        let (data, _pad_length) = extract_padding(header, payload)?;

        Ok(Frame::Data {
            stream_id: header.stream_id,
            end_stream: header.is_end_stream(),
            data: data.to_vec(),
        })
    }

    /// HEADERS フレームをデコード
    ///
    /// END_HEADERS が無い場合は再組立スロットに登録して None を返します。
    fn decode_headers(&mut self, header: &FrameHeader, payload: &[u8]) -> Http2Result<Option<Frame>> {
        if header.stream_id == 0 {
            return Err(Http2Error::protocol_error("HEADERS frame with stream ID 0"));
        }

        let (data, _pad_length) = extract_padding(header, payload)?;

        let (priority, header_block) = if header.is_priority() {
            if data.len() < 5 {
                return Err(Http2Error::frame_size_error("HEADERS priority too short"));
            }
            (Some(decode_priority_spec(&data[..5])), &data[5..])
        } else {
            (None, data)
        };

        if header_block.len() > self.max_header_block_size {
            return Err(Http2Error::connection_error(
                Http2ErrorCode::EnhanceYourCalm,
                "Header block size limit exceeded",
            ));
        }

        let pending = PendingHeaderBlock {
            stream_id: header.stream_id,
            kind: PendingKind::Headers {
                end_stream: header.is_end_stream(),
                priority,
            },
            block: header_block.to_vec(),
        };

        if header.is_end_headers() {
            self.finalize(pending).map(Some)
        } else {
            self.pending = Some(pending);
            Ok(None)
        }
    }

    /// PUSH_PROMISE フレームをデコード
    ///
    /// PUSH_PROMISE は送信元ストリームに紐付くため、ストリーム ID は
    /// 0 であってはならない (RFC 7540 Section 6.6)。
    fn decode_push_promise(
        &mut self,
        header: &FrameHeader,
        payload: &[u8],
    ) -> Http2Result<Option<Frame>> {
        if header.stream_id == 0 {
            return Err(Http2Error::protocol_error(
                "PUSH_PROMISE frame with stream ID 0",
            ));
        }

        let (data, _pad_length) = extract_padding(header, payload)?;

        if data.len() < 4 {
            return Err(Http2Error::frame_size_error("PUSH_PROMISE too short"));
        }

        let promised_stream_id =
            u32::from_be_bytes([data[0], data[1], data[2], data[3]]) & 0x7FFF_FFFF;
        let header_block = &data[4..];

        if header_block.len() > self.max_header_block_size {
            return Err(Http2Error::connection_error(
                Http2ErrorCode::EnhanceYourCalm,
                "Header block size limit exceeded",
            ));
        }

        let pending = PendingHeaderBlock {
            stream_id: header.stream_id,
            kind: PendingKind::PushPromise { promised_stream_id },
            block: header_block.to_vec(),
        };

        if header.is_end_headers() {
            self.finalize(pending).map(Some)
        } else {
            self.pending = Some(pending);
            Ok(None)
        }
    }

    /// CONTINUATION フレームをデコード
    ///
    /// 対応する再組立スロットが無ければプロトコルエラーです。
    fn decode_continuation(
        &mut self,
        header: &FrameHeader,
        payload: &[u8],
    ) -> Http2Result<Option<Frame>> {
        if header.stream_id == 0 {
            return Err(Http2Error::protocol_error(
                "CONTINUATION frame with stream ID 0",
            ));
        }

        // ストリーム ID の照合は decode() で済んでいる
        let mut pending = self
            .pending
            .take()
            .ok_or_else(|| Http2Error::protocol_error("Unexpected CONTINUATION"))?;

        pending.block.extend_from_slice(payload);
        if pending.block.len() > self.max_header_block_size {
            return Err(Http2Error::connection_error(
                Http2ErrorCode::EnhanceYourCalm,
                "Cumulative header block size limit exceeded",
            ));
        }

        if header.is_end_headers() {
            self.finalize(pending).map(Some)
        } else {
            self.pending = Some(pending);
            Ok(None)
        }
    }

    /// 完成したブロックをデコードしてフレームにする
    fn finalize(&mut self, pending: PendingHeaderBlock) -> Http2Result<Frame> {
        let mut fields = HeaderList::new();
        self.decode_header_block(&pending.block, &mut fields)?;

        Ok(match pending.kind {
            PendingKind::Headers {
                end_stream,
                priority,
            } => Frame::Headers {
                stream_id: pending.stream_id,
                end_stream,
                priority,
                fields,
            },
            PendingKind::PushPromise { promised_stream_id } => Frame::PushPromise {
                stream_id: pending.stream_id,
                promised_stream_id,
                fields,
            },
        })
    }

    /// ヘッダーブロックを HPACK デコーダに通す
    ///
    /// Dynamic Table Size Update で処理が打ち切られた場合は残りから
    /// 再開し、通知を記録します。
    fn decode_header_block(&mut self, block: &[u8], fields: &mut HeaderList) -> Http2Result<()> {
        let mut pos = 0;
        while pos < block.len() {
            let decoded = self.hpack.decode(&block[pos..]).map_err(|e| {
                ftlog::warn!("HPACK decode error: {}", e);
                Http2Error::HpackDecode(e)
            })?;
            pos += decoded.consumed;

            for field in decoded.fields {
                fields.push(field.into());
            }

            if let Some(size) = decoded.table_size_update {
                ftlog::debug!("Dynamic table size update: {} bytes", size);
                self.last_table_size_update = Some(size);
            }
        }
        Ok(())
    }

    /// PRIORITY フレームをデコード
    fn decode_priority(&self, header: &FrameHeader, payload: &[u8]) -> Http2Result<Frame> {
        if header.stream_id == 0 {
            return Err(Http2Error::protocol_error("PRIORITY frame with stream ID 0"));
        }

        if payload.len() != 5 {
            return Err(Http2Error::frame_size_error("PRIORITY frame must be 5 bytes"));
        }

        Ok(Frame::Priority {
            stream_id: header.stream_id,
            priority: decode_priority_spec(payload),
        })
    }

    /// RST_STREAM フレームをデコード
    fn decode_rst_stream(&self, header: &FrameHeader, payload: &[u8]) -> Http2Result<Frame> {
        if header.stream_id == 0 {
            return Err(Http2Error::protocol_error("RST_STREAM frame with stream ID 0"));
        }

        if payload.len() != 4 {
            return Err(Http2Error::frame_size_error("RST_STREAM frame must be 4 bytes"));
        }

        let code = u32::from_be_bytes(payload.try_into().unwrap());

        Ok(Frame::RstStream {
            stream_id: header.stream_id,
            error_code: Http2ErrorCode::from_u32(code),
        })
    }

    /// SETTINGS フレームをデコード
    fn decode_settings(&self, header: &FrameHeader, payload: &[u8]) -> Http2Result<Frame> {
        if header.stream_id != 0 {
            return Err(Http2Error::protocol_error(
                "SETTINGS frame with non-zero stream ID",
            ));
        }

        if header.is_ack() {
            if !payload.is_empty() {
                return Err(Http2Error::frame_size_error("SETTINGS ACK must be empty"));
            }
            return Ok(Frame::Settings {
                ack: true,
                settings: SettingsUpdate::new(),
            });
        }

        if payload.len() % 6 != 0 {
            return Err(Http2Error::frame_size_error(
                "SETTINGS payload must be multiple of 6",
            ));
        }

        Ok(Frame::Settings {
            ack: false,
            settings: SettingsUpdate::decode(payload),
        })
    }

    /// PING フレームをデコード
    fn decode_ping(&self, header: &FrameHeader, payload: &[u8]) -> Http2Result<Frame> {
        if header.stream_id != 0 {
            return Err(Http2Error::protocol_error(
                "PING frame with non-zero stream ID",
            ));
        }

        if payload.len() != 8 {
            return Err(Http2Error::frame_size_error("PING frame must be 8 bytes"));
        }

        let mut data = [0u8; 8];
        data.copy_from_slice(payload);

        Ok(Frame::Ping {
            ack: header.is_ack(),
            data,
        })
    }

    /// GOAWAY フレームをデコード
    fn decode_goaway(&self, header: &FrameHeader, payload: &[u8]) -> Http2Result<Frame> {
        if header.stream_id != 0 {
            return Err(Http2Error::protocol_error(
                "GOAWAY frame with non-zero stream ID",
            ));
        }

        if payload.len() < 8 {
            return Err(Http2Error::frame_size_error("GOAWAY frame too short"));
        }

        let last_stream_id =
            u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7FFF_FFFF;
        let error_code = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);

        Ok(Frame::GoAway {
            last_stream_id,
            error_code: Http2ErrorCode::from_u32(error_code),
            debug_data: payload[8..].to_vec(),
        })
    }

    /// WINDOW_UPDATE フレームをデコード
    fn decode_window_update(&self, header: &FrameHeader, payload: &[u8]) -> Http2Result<Frame> {
        if payload.len() != 4 {
            return Err(Http2Error::frame_size_error(
                "WINDOW_UPDATE frame must be 4 bytes",
            ));
        }

        let increment = u32::from_be_bytes(payload.try_into().unwrap()) & 0x7FFF_FFFF;

        if increment == 0 {
            return Err(Http2Error::protocol_error(
                "WINDOW_UPDATE increment must be non-zero",
            ));
        }

        Ok(Frame::WindowUpdate {
            stream_id: header.stream_id,
            increment,
        })
    }
}

/// パディングを取り除く (PADDED フラグ時)
fn extract_padding<'a>(header: &FrameHeader, payload: &'a [u8]) -> Http2Result<(&'a [u8], usize)> {
    if !header.is_padded() {
        return Ok((payload, 0));
    }

    if payload.is_empty() {
        return Err(Http2Error::protocol_error("PADDED frame has no pad length"));
    }

    let pad_length = payload[0] as usize;
    if pad_length >= payload.len() {
        return Err(Http2Error::protocol_error("Pad length exceeds payload"));
    }

    let data_end = payload.len() - pad_length;
    Ok((&payload[1..data_end], pad_length))
}

/// Priority spec をデコード (排他ビット + 31 ビット依存 + 重み)
fn decode_priority_spec(data: &[u8]) -> PrioritySpec {
    let first_word = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    PrioritySpec {
        exclusive: first_word & 0x8000_0000 != 0,
        dependency: first_word & 0x7FFF_FFFF,
        weight: data[4],
    }
}
