//! # h2codec
//!
//! HTTP/2 のフレーム層コーデック (RFC 7540 Section 4-6) と
//! HPACK ヘッダー圧縮 (RFC 7541) の実装。
//!
//! ## 構成
//!
//! ```text
//!   トランスポート (monoio バイトストリーム)
//!        |
//!   +----v-----------+
//!   | connection     |  受信バッファ管理 / プリフェース / ハンドシェイク
//!   +----v-----------+
//!   | frame          |  9 バイトヘッダー + タイプ別ペイロード、
//!   |                |  CONTINUATION 再組立
//!   +----v-----------+
//!   | hpack          |  静的/動的テーブル、Huffman、整数コーデック
//!   +----------------+
//! ```
//!
//! コーデック本体 (`frame`, `hpack`) は純粋にメモリ上で動作し、
//! I/O には一切触れません。`connection` はデコーダが入力不足を
//! 報告したときにだけトランスポートを待つ薄いラッパーです。
//!
//! 1 コネクションのフレームは受信順・生成順に逐次処理する必要が
//! あります。HPACK の動的テーブルと CONTINUATION 再組立スロットが
//! コネクション単位の順序依存の状態だからです。Huffman のデコード
//! ツリーと静的テーブルは一度だけ構築され、読み取り専用で全
//! コネクションから共有されます。

pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod hpack;
pub mod settings;

pub use connection::{Http2Connection, CONNECTION_PREFACE};
pub use error::{Http2Error, Http2ErrorCode, Http2Result};
pub use frame::{Frame, FrameDecoder, FrameEncoder, HeaderEntry, HeaderList};
pub use hpack::{DecodedHeader, HpackDecoder, HpackEncoder};
pub use settings::{Http2Settings, SettingsUpdate};
