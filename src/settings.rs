//! # HTTP/2 設定 (SETTINGS)
//!
//! RFC 7540 Section 6.5 で定義された SETTINGS パラメータと、
//! コネクションプリフェースなどのプロトコル定数を管理します。

use crate::error::{Http2Error, Http2ErrorCode, Http2Result};

/// SETTINGS パラメータ ID (RFC 7540 Section 6.5.2)
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsId {
    /// ヘッダー圧縮テーブルサイズ
    HeaderTableSize = 0x1,
    /// サーバープッシュ有効化
    EnablePush = 0x2,
    /// 最大同時ストリーム数
    MaxConcurrentStreams = 0x3,
    /// 初期ウィンドウサイズ
    InitialWindowSize = 0x4,
    /// 最大フレームサイズ
    MaxFrameSize = 0x5,
    /// 最大ヘッダーリストサイズ
    MaxHeaderListSize = 0x6,
}

impl SettingsId {
    /// u16 から SettingsId を作成
    pub fn from_u16(val: u16) -> Option<Self> {
        match val {
            0x1 => Some(Self::HeaderTableSize),
            0x2 => Some(Self::EnablePush),
            0x3 => Some(Self::MaxConcurrentStreams),
            0x4 => Some(Self::InitialWindowSize),
            0x5 => Some(Self::MaxFrameSize),
            0x6 => Some(Self::MaxHeaderListSize),
            _ => None, // 未知の ID は無視
        }
    }
}

/// デフォルト値 (RFC 7540 Section 6.5.2)
pub mod defaults {
    /// ヘッダーテーブルサイズ: 4096 bytes
    pub const HEADER_TABLE_SIZE: u32 = 4096;
    /// 最大同時ストリーム数: 無制限 (実装では 100 を使用)
    pub const MAX_CONCURRENT_STREAMS: u32 = 100;
    /// 初期ウィンドウサイズ: 65535 bytes
    pub const INITIAL_WINDOW_SIZE: u32 = 65535;
    /// 最大フレームサイズ: 16384 bytes (最小値、RFC 7540 要件)
    pub const MAX_FRAME_SIZE: u32 = 16384;
    /// 最大フレームサイズ上限: 16777215 bytes (2^24 - 1)
    pub const MAX_FRAME_SIZE_UPPER_LIMIT: u32 = 16777215;
    /// 最大ヘッダーリストサイズ: 無制限 (実装では 16KB を使用)
    pub const MAX_HEADER_LIST_SIZE: u32 = 16384;
    /// コネクションプリフェース
    pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";
    /// HEADERS + CONTINUATION の累積ヘッダーブロックサイズ上限
    pub const MAX_HEADER_BLOCK_SIZE: usize = 65536;
}

/// HTTP/2 コネクション設定
#[derive(Debug, Clone)]
pub struct Http2Settings {
    /// ヘッダー圧縮テーブルサイズ (bytes)
    pub header_table_size: u32,
    /// サーバープッシュ有効化
    pub enable_push: bool,
    /// 最大同時ストリーム数
    pub max_concurrent_streams: u32,
    /// 初期ウィンドウサイズ (bytes)
    pub initial_window_size: u32,
    /// 最大フレームサイズ (bytes)
    pub max_frame_size: u32,
    /// 最大ヘッダーリストサイズ (bytes)
    pub max_header_list_size: u32,
    /// 累積ヘッダーブロックサイズ上限 (bytes)
    pub max_header_block_size: usize,
}

impl Default for Http2Settings {
    fn default() -> Self {
        Self {
            header_table_size: defaults::HEADER_TABLE_SIZE,
            enable_push: false, // このコーデックはサーバープッシュを送信しない
            max_concurrent_streams: defaults::MAX_CONCURRENT_STREAMS,
            initial_window_size: defaults::INITIAL_WINDOW_SIZE,
            max_frame_size: defaults::MAX_FRAME_SIZE,
            max_header_list_size: defaults::MAX_HEADER_LIST_SIZE,
            max_header_block_size: defaults::MAX_HEADER_BLOCK_SIZE,
        }
    }
}

impl Http2Settings {
    /// 新しい設定を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// SETTINGS フレームで広告するパラメータ一覧
    pub fn to_update(&self) -> SettingsUpdate {
        let mut update = SettingsUpdate::new();
        update.set(SettingsId::HeaderTableSize as u16, self.header_table_size);
        update.set(SettingsId::EnablePush as u16, self.enable_push as u32);
        update.set(
            SettingsId::MaxConcurrentStreams as u16,
            self.max_concurrent_streams,
        );
        update.set(SettingsId::InitialWindowSize as u16, self.initial_window_size);
        update.set(SettingsId::MaxFrameSize as u16, self.max_frame_size);
        update.set(SettingsId::MaxHeaderListSize as u16, self.max_header_list_size);
        update
    }

    /// 受信した SETTINGS パラメータを適用
    ///
    /// RFC 7540 Section 6.5.2 の値域検証を行い、違反時はコネクションエラーを
    /// 返します。未知の ID は無視します。
    pub fn apply(&mut self, update: &SettingsUpdate) -> Http2Result<()> {
        for &(id, value) in update.iter() {
            match SettingsId::from_u16(id) {
                Some(SettingsId::HeaderTableSize) => {
                    self.header_table_size = value;
                }
                Some(SettingsId::EnablePush) => {
                    if value > 1 {
                        return Err(Http2Error::protocol_error("ENABLE_PUSH must be 0 or 1"));
                    }
                    self.enable_push = value == 1;
                }
                Some(SettingsId::MaxConcurrentStreams) => {
                    self.max_concurrent_streams = value;
                }
                Some(SettingsId::InitialWindowSize) => {
                    if value > 0x7FFF_FFFF {
                        return Err(Http2Error::connection_error(
                            Http2ErrorCode::FlowControlError,
                            "INITIAL_WINDOW_SIZE too large",
                        ));
                    }
                    self.initial_window_size = value;
                }
                Some(SettingsId::MaxFrameSize) => {
                    if value < defaults::MAX_FRAME_SIZE
                        || value > defaults::MAX_FRAME_SIZE_UPPER_LIMIT
                    {
                        return Err(Http2Error::protocol_error(format!(
                            "MAX_FRAME_SIZE must be between {} and {}",
                            defaults::MAX_FRAME_SIZE,
                            defaults::MAX_FRAME_SIZE_UPPER_LIMIT
                        )));
                    }
                    self.max_frame_size = value;
                }
                Some(SettingsId::MaxHeaderListSize) => {
                    self.max_header_list_size = value;
                }
                None => {
                    // 未知の設定は無視 (RFC 7540 Section 6.5)
                }
            }
        }
        Ok(())
    }
}

/// SETTINGS フレームが運ぶパラメータ集合
///
/// ID → 値のマップ。同じ ID が複数回現れた場合は後勝ち
/// (RFC 7540 Section 6.5.2)。挿入順は保持します。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    entries: Vec<(u16, u32)>,
}

impl SettingsUpdate {
    /// 空のパラメータ集合を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// パラメータを設定 (既存の同一 ID は上書き)
    pub fn set(&mut self, id: u16, value: u32) {
        for entry in self.entries.iter_mut() {
            if entry.0 == id {
                entry.1 = value;
                return;
            }
        }
        self.entries.push((id, value));
    }

    /// パラメータを取得
    pub fn get(&self, id: u16) -> Option<u32> {
        self.entries.iter().find(|e| e.0 == id).map(|e| e.1)
    }

    /// パラメータの数
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 空かどうか
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (id, value) ペアのイテレータ
    pub fn iter(&self) -> std::slice::Iter<'_, (u16, u32)> {
        self.entries.iter()
    }

    /// SETTINGS フレームのペイロードにエンコード (6 bytes/エントリ)
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.entries.len() * 6);
        for &(id, value) in &self.entries {
            buf.extend_from_slice(&id.to_be_bytes());
            buf.extend_from_slice(&value.to_be_bytes());
        }
        buf
    }

    /// SETTINGS フレームのペイロードからデコード
    ///
    /// 呼び出し側でペイロード長が 6 の倍数であることを検証済みであること。
    pub fn decode(payload: &[u8]) -> Self {
        let mut update = Self::new();
        for chunk in payload.chunks_exact(6) {
            let id = u16::from_be_bytes([chunk[0], chunk[1]]);
            let value = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);
            update.set(id, value);
        }
        update
    }
}
