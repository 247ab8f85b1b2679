//! # サーバー設定
//!
//! デモサーバー用の `config.toml` を読み込みます。ファイルが無ければ
//! デフォルト値で起動します。

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::settings::{defaults, Http2Settings};

/// サーバー設定
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// 待ち受けアドレス
    #[serde(default = "default_listen")]
    pub listen: String,
    /// HTTP/2 設定
    #[serde(default)]
    pub http2: Http2Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            http2: Http2Config::default(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

/// HTTP/2 関連の設定項目
#[derive(Debug, Clone, Deserialize)]
pub struct Http2Config {
    /// ヘッダー圧縮テーブルサイズ (bytes)
    #[serde(default = "default_header_table_size")]
    pub header_table_size: u32,
    /// 最大フレームサイズ (bytes)
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: u32,
    /// 最大同時ストリーム数
    #[serde(default = "default_max_concurrent_streams")]
    pub max_concurrent_streams: u32,
    /// 最大ヘッダーリストサイズ (bytes)
    #[serde(default = "default_max_header_list_size")]
    pub max_header_list_size: u32,
}

impl Default for Http2Config {
    fn default() -> Self {
        Self {
            header_table_size: default_header_table_size(),
            max_frame_size: default_max_frame_size(),
            max_concurrent_streams: default_max_concurrent_streams(),
            max_header_list_size: default_max_header_list_size(),
        }
    }
}

fn default_header_table_size() -> u32 {
    defaults::HEADER_TABLE_SIZE
}

fn default_max_frame_size() -> u32 {
    defaults::MAX_FRAME_SIZE
}

fn default_max_concurrent_streams() -> u32 {
    defaults::MAX_CONCURRENT_STREAMS
}

fn default_max_header_list_size() -> u32 {
    defaults::MAX_HEADER_LIST_SIZE
}

impl Config {
    /// 設定ファイルを読み込む
    pub fn load(path: &Path) -> Result<Self, String> {
        let config_str = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        toml::from_str(&config_str).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
    }

    /// HTTP/2 コネクション設定へ変換
    pub fn to_http2_settings(&self) -> Http2Settings {
        Http2Settings {
            header_table_size: self.http2.header_table_size,
            max_frame_size: self.http2.max_frame_size,
            max_concurrent_streams: self.http2.max_concurrent_streams,
            max_header_list_size: self.http2.max_header_list_size,
            ..Http2Settings::default()
        }
    }
}
