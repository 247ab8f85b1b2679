//! # HTTP/2 コネクション (トランスポート境界)
//!
//! monoio のバイトストリームとフレームコーデックを接続する薄い
//! ラッパーです。コーデック本体は純粋にメモリ上で動作し、入力が
//! 足りないときだけここで追加受信を待ちます。ソケットや TLS の確立、
//! ストリーム多重化やフロー制御の管理は上位の協調コンポーネントの
//! 責務です。

use std::io;

use monoio::io::{AsyncReadRent, AsyncWriteRentExt};

use crate::error::{Http2Error, Http2Result};
use crate::frame::{Decoded, Frame, FrameDecoder, FrameEncoder, HeaderList, PrioritySpec};
use crate::settings::{defaults, Http2Settings, SettingsId};

/// HTTP/2 コネクションプリフェース
pub const CONNECTION_PREFACE: &[u8] = defaults::CONNECTION_PREFACE;

/// HTTP/2 コネクション
///
/// コーデックの状態 (HPACK テーブル、再組立スロット) を共有するため、
/// 1 コネクションにつき 1 インスタンスを単一の論理オーナーが逐次
/// 操作します。内部ロックはありません。
pub struct Http2Connection<S> {
    /// トランスポートストリーム
    stream: S,
    /// ローカル設定
    local_settings: Http2Settings,
    /// リモート設定
    remote_settings: Http2Settings,
    /// フレームデコーダ (受信方向の HPACK を所有)
    decoder: FrameDecoder,
    /// フレームエンコーダ (送信方向の HPACK を所有)
    encoder: FrameEncoder,
    /// SETTINGS ACK 待ち
    settings_ack_pending: bool,
    /// 読み込みバッファ
    read_buf: Vec<u8>,
    /// バッファ内の有効データ開始位置
    buf_start: usize,
    /// バッファ内の有効データ終了位置
    buf_end: usize,
}

impl<S> Http2Connection<S>
where
    S: AsyncReadRent + AsyncWriteRentExt + Unpin,
{
    /// 新しいコネクションを作成
    pub fn new(stream: S, settings: Http2Settings) -> Self {
        let decoder = FrameDecoder::new(
            settings.max_frame_size,
            settings.header_table_size as usize,
        );
        let encoder = FrameEncoder::new(
            defaults::MAX_FRAME_SIZE,
            defaults::HEADER_TABLE_SIZE as usize,
        );

        Self {
            stream,
            local_settings: settings,
            remote_settings: Http2Settings::default(),
            decoder,
            encoder,
            settings_ack_pending: false,
            read_buf: vec![0u8; 65536],
            buf_start: 0,
            buf_end: 0,
        }
    }

    /// ローカル設定への参照
    pub fn local_settings(&self) -> &Http2Settings {
        &self.local_settings
    }

    /// リモート設定への参照
    pub fn remote_settings(&self) -> &Http2Settings {
        &self.remote_settings
    }

    /// 送信した SETTINGS の ACK 待ちかどうか
    pub fn settings_ack_pending(&self) -> bool {
        self.settings_ack_pending
    }

    /// サーバー側ハンドシェイク
    ///
    /// 1. クライアントプリフェースをバイト単位で検証
    /// 2. ローカル SETTINGS を送信
    /// (クライアント SETTINGS の ACK は受信ループで行う)
    pub async fn handshake(&mut self) -> Http2Result<()> {
        self.expect_preface().await?;
        self.send_settings().await?;
        Ok(())
    }

    /// クライアント側ハンドシェイク
    ///
    /// プリフェースとローカル SETTINGS を送信します。
    pub async fn client_handshake(&mut self) -> Http2Result<()> {
        self.write_all(CONNECTION_PREFACE).await?;
        self.send_settings().await?;
        Ok(())
    }

    /// クライアントプリフェースを確認
    async fn expect_preface(&mut self) -> Http2Result<()> {
        let preface_len = CONNECTION_PREFACE.len();

        while self.buf_end - self.buf_start < preface_len {
            self.read_more().await?;
        }

        let received = &self.read_buf[self.buf_start..self.buf_start + preface_len];
        if received != CONNECTION_PREFACE {
            ftlog::error!("Invalid preface received: {:?}", received);
            return Err(Http2Error::InvalidPreface);
        }

        self.buf_start += preface_len;
        Ok(())
    }

    /// ローカル SETTINGS フレームを送信
    async fn send_settings(&mut self) -> Http2Result<()> {
        let update = self.local_settings.to_update();
        let frame = self.encoder.encode_settings(&update, false);
        self.write_all(&frame).await?;
        self.settings_ack_pending = true;
        Ok(())
    }

    /// フレームを 1 つ読み込む
    ///
    /// デコーダが入力不足を報告したらトランスポートから追加受信し、
    /// 完成フレームが得られるまで繰り返します。
    pub async fn read_frame(&mut self) -> Http2Result<Frame> {
        loop {
            let available = &self.read_buf[self.buf_start..self.buf_end];
            match self.decoder.decode(available)? {
                Decoded::Frame(frame, consumed) => {
                    self.advance(consumed);
                    return Ok(frame);
                }
                Decoded::Pending(consumed) => {
                    self.advance(consumed);
                }
                Decoded::Incomplete(needed) => {
                    while self.buf_end - self.buf_start < needed {
                        self.read_more().await?;
                    }
                }
            }
        }
    }

    /// 消費分だけバッファを前進させる
    fn advance(&mut self, consumed: usize) {
        self.buf_start += consumed;
        if self.buf_start > 32768 {
            self.compact_buffer();
        }
    }

    /// 制御フレームの定型応答
    ///
    /// SETTINGS の適用と ACK、PING のエコーを行います。その他の
    /// フレームには何もしません。
    pub async fn process_control_frame(&mut self, frame: &Frame) -> Http2Result<()> {
        match frame {
            Frame::Settings { ack: true, .. } => {
                self.settings_ack_pending = false;
            }
            Frame::Settings {
                ack: false,
                settings,
            } => {
                self.remote_settings.apply(settings)?;

                // RFC 7540 Section 6.5.2: HEADER_TABLE_SIZE は送受両方向の
                // HPACK テーブルに反映する
                if let Some(size) = settings.get(SettingsId::HeaderTableSize as u16) {
                    self.encoder
                        .hpack_mut()
                        .set_max_table_size(size as usize)
                        .map_err(|e| Http2Error::HpackEncode(e.to_string()))?;
                    self.decoder.set_max_table_size(size as usize);
                }
                // MAX_FRAME_SIZE は相手の受信上限なので送信側にのみ反映。
                // 自分の受信上限 (decoder) は local_settings のまま。
                if let Some(size) = settings.get(SettingsId::MaxFrameSize as u16) {
                    self.encoder.set_max_frame_size(size);
                }

                let ack = self.encoder.encode_settings_ack();
                self.write_all(&ack).await?;
            }
            Frame::Ping { ack: false, data } => {
                let pong = self.encoder.encode_ping(data, true);
                self.write_all(&pong).await?;
            }
            Frame::GoAway {
                last_stream_id,
                error_code,
                ..
            } => {
                ftlog::info!(
                    "GOAWAY received: last_stream_id={}, error={}",
                    last_stream_id,
                    error_code
                );
            }
            _ => {}
        }
        Ok(())
    }

    /// HEADERS (+ CONTINUATION) を送信
    pub async fn send_headers(
        &mut self,
        stream_id: u32,
        fields: &HeaderList,
        end_stream: bool,
        priority: Option<PrioritySpec>,
    ) -> Http2Result<()> {
        let bytes = self
            .encoder
            .encode_headers(stream_id, fields, end_stream, priority);
        self.write_all(&bytes).await
    }

    /// DATA を送信
    pub async fn send_data(
        &mut self,
        stream_id: u32,
        data: &[u8],
        end_stream: bool,
    ) -> Http2Result<()> {
        let bytes = self.encoder.encode_data(stream_id, data, end_stream);
        self.write_all(&bytes).await
    }

    /// 任意のフレームを送信
    pub async fn write_frame(&mut self, frame: &Frame) -> Http2Result<()> {
        let bytes = self.encoder.encode(frame)?;
        self.write_all(&bytes).await
    }

    /// 追加データを読み込み
    async fn read_more(&mut self) -> Http2Result<()> {
        // バッファが不足している場合は拡張
        if self.buf_end >= self.read_buf.len() {
            if self.buf_start > 0 {
                self.compact_buffer();
            } else {
                let min_capacity =
                    self.decoder.max_frame_size() as usize + crate::frame::FrameHeader::SIZE + 1024;
                let new_capacity = std::cmp::max(self.read_buf.len() * 2, min_capacity);
                self.read_buf.resize(new_capacity, 0);
            }
        }

        // monoio はバッファの所有権を要求するため、末尾部分を切り出して
        // 読み込みに渡し、終わったら結合し直す
        let mut full_buf = std::mem::take(&mut self.read_buf);
        let tail_buf = full_buf.split_off(self.buf_end);

        let (result, returned_tail) = self.stream.read(tail_buf).await;

        full_buf.extend_from_slice(&returned_tail);
        self.read_buf = full_buf;

        match result {
            Ok(0) => Err(Http2Error::ConnectionClosed),
            Ok(n) => {
                self.buf_end += n;
                Ok(())
            }
            Err(e) => Err(Http2Error::Io(e)),
        }
    }

    /// バッファをコンパクト化
    fn compact_buffer(&mut self) {
        if self.buf_start > 0 {
            let remaining = self.buf_end - self.buf_start;
            self.read_buf.copy_within(self.buf_start..self.buf_end, 0);
            self.buf_start = 0;
            self.buf_end = remaining;
        }
    }

    /// データを送信
    async fn write_all(&mut self, data: &[u8]) -> Http2Result<()> {
        let mut offset = 0;
        while offset < data.len() {
            let buf = data[offset..].to_vec();
            let buf_len = buf.len();
            let (result, _) = self.stream.write_all(buf).await;
            match result {
                Ok(_) => {
                    // monoio の write_all は成功時に全データ書き込みを保証
                    offset += buf_len;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(Http2Error::Io(e)),
            }
        }
        Ok(())
    }
}
