//! # HPACK エンコーダ (RFC 7541)
//!
//! HTTP ヘッダーを HPACK 形式でエンコードします。
//!
//! 表現形式の異なる 3 つの操作を公開します:
//!
//! - `encode`: インデックス更新あり (Section 6.1 / 6.2.1)
//! - `encode_without_indexing`: インデックス更新なし (Section 6.2.2)
//! - `encode_sensitive`: インデックス禁止 (Section 6.2.3)
//!
//! 文字列リテラルは常に Huffman 符号化し、H ビット付きの長さ
//! プレフィックスを前置します。

use super::table::{DynamicTable, StaticTable, TableMatch};
use super::{encode_integer, huffman, HpackResult};

/// HPACK エンコーダ
pub struct HpackEncoder {
    /// 動的テーブル
    dynamic_table: DynamicTable,
    /// 動的テーブルサイズの変更保留
    pending_table_size_update: Option<usize>,
}

impl HpackEncoder {
    /// 新しいエンコーダを作成
    pub fn new(max_table_size: usize) -> Self {
        Self {
            dynamic_table: DynamicTable::new(max_table_size),
            pending_table_size_update: None,
        }
    }

    /// 動的テーブルの最大サイズを変更
    ///
    /// 変更は次のヘッダーブロック先頭で Dynamic Table Size Update
    /// (Section 6.3) としてピアに通知されます。
    pub fn set_max_table_size(&mut self, size: usize) -> HpackResult<()> {
        self.dynamic_table.resize(size)?;
        self.pending_table_size_update = Some(size);
        Ok(())
    }

    /// 動的テーブルへの参照を取得
    pub fn dynamic_table(&self) -> &DynamicTable {
        &self.dynamic_table
    }

    /// ヘッダーをエンコード (インデックス更新あり)
    ///
    /// 名前と値の完全一致があればインデックス表現 (`1xxxxxxx`)、
    /// 名前のみ一致なら Incremental Indexing のインデックス名表現
    /// (`01xxxxxx`)、どちらも無ければ新規名表現 (`01000000`) を出力し、
    /// リテラル表現の場合はペアを動的テーブルに追加します。
    pub fn encode(&mut self, buf: &mut Vec<u8>, name: &[u8], value: &[u8]) {
        self.flush_pending_size_update(buf);

        match self.lookup(name, value) {
            Some(ref m) if m.value == value => {
                // Indexed Header Field (Section 6.1)
                //   0   1   2   3   4   5   6   7
                // +---+---+---+---+---+---+---+---+
                // | 1 |        Index (7+)         |
                // +---+---------------------------+
                encode_integer(buf, m.index, 7, 0x80);
            }
            Some(m) => {
                // Literal Header Field with Incremental Indexing - Indexed Name
                //   0   1   2   3   4   5   6   7
                // +---+---+---+---+---+---+---+---+
                // | 0 | 1 |      Index (6+)       |
                // +---+---+-----------------------+
                encode_integer(buf, m.index, 6, 0x40);
                encode_string(buf, value);
                self.dynamic_table.append(name, value);
            }
            None => {
                // Literal Header Field with Incremental Indexing - New Name
                buf.push(0x40);
                encode_string(buf, name);
                encode_string(buf, value);
                self.dynamic_table.append(name, value);
            }
        }
    }

    /// ヘッダーをエンコード (インデックス更新なし、Section 6.2.2)
    ///
    /// 動的テーブルには追加しません。
    pub fn encode_without_indexing(&mut self, buf: &mut Vec<u8>, name: &[u8], value: &[u8]) {
        self.flush_pending_size_update(buf);

        match self.lookup(name, value) {
            Some(m) => {
                //   0   1   2   3   4   5   6   7
                // +---+---+---+---+---+---+---+---+
                // | 0 | 0 | 0 | 0 |  Index (4+)   |
                // +---+---+-----------------------+
                encode_integer(buf, m.index, 4, 0x00);
            }
            None => {
                buf.push(0x00);
                encode_string(buf, name);
            }
        }

        encode_string(buf, value);
    }

    /// 機密ヘッダーをエンコード (インデックス禁止、Section 6.2.3)
    ///
    /// 動的テーブルには追加せず、中継するデコーダにも「インデックス禁止・
    /// ログ出力禁止」のマーカーを伝播させる表現を使用します。
    pub fn encode_sensitive(&mut self, buf: &mut Vec<u8>, name: &[u8], value: &[u8]) {
        self.flush_pending_size_update(buf);

        match self.lookup(name, value) {
            Some(m) => {
                //   0   1   2   3   4   5   6   7
                // +---+---+---+---+---+---+---+---+
                // | 0 | 0 | 0 | 1 |  Index (4+)   |
                // +---+---+-----------------------+
                encode_integer(buf, m.index, 4, 0x10);
            }
            None => {
                buf.push(0x10);
                encode_string(buf, name);
            }
        }

        encode_string(buf, value);
    }

    /// テーブル検索
    ///
    /// 動的テーブルを先に探します。静的テーブルが値を持てない名前
    /// (具体的な `:authority` など) を動的テーブルが保持し得るためです。
    /// 名前がテーブルの最大サイズ以上に長いエントリはインデックスを
    /// 使用しません。
    fn lookup(&self, name: &[u8], value: &[u8]) -> Option<TableMatch> {
        let m = self
            .dynamic_table
            .find(name, Some(value))
            .or_else(|| StaticTable::find(name, Some(value)))?;

        if m.name.len() >= self.dynamic_table.max_size() {
            return None;
        }
        Some(m)
    }

    /// 保留中のテーブルサイズ更新をブロック先頭で出力
    fn flush_pending_size_update(&mut self, buf: &mut Vec<u8>) {
        if let Some(size) = self.pending_table_size_update.take() {
            // Dynamic Table Size Update (Section 6.3)
            //   0   1   2   3   4   5   6   7
            // +---+---+---+---+---+---+---+---+
            // | 0 | 0 | 1 |   Max size (5+)   |
            // +---+---------------------------+
            encode_integer(buf, size, 5, 0x20);
        }
    }
}

impl Default for HpackEncoder {
    fn default() -> Self {
        Self::new(4096)
    }
}

/// 文字列リテラルをエンコード
///
/// ```text
///   0   1   2   3   4   5   6   7
/// +---+---------------------------+
/// | H |     String Length (7+)    |
/// +---+---------------------------+
/// |  String Data (Length octets)  |
/// +-------------------------------+
/// ```
///
/// 常に Huffman 符号化 (H=1)。長さを先に求める 2 パス方式です。
fn encode_string(buf: &mut Vec<u8>, s: &[u8]) {
    let octets = huffman::huffman_encoded_len(s);
    encode_integer(buf, octets, 7, 0x80);
    buf.extend(huffman::huffman_encode(s));
}
