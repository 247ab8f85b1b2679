//! # HPACK デコーダ (RFC 7541)
//!
//! HPACK 形式でエンコードされたヘッダーブロックをデコードします。
//!
//! デコード結果は所有権を持つ不変の `DecodedHeader` 値の列として
//! 返されます。1 フィールドにつき必ず 1 つの値が生成され、後続の
//! デコードで書き換えられることはありません。

use super::huffman::DecodeTree;
use super::table::{get_indexed, DynamicTable};
use super::{decode_integer, huffman, HpackError, HpackResult};

/// デコードされたヘッダーフィールド
///
/// `allow_indexing` が false のフィールド (Never Indexed, Section 6.2.3)
/// は、再エンコード時にもインデックスを使用してはならず、ログにも
/// 残すべきではありません。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHeader {
    /// ヘッダー名
    pub name: Vec<u8>,
    /// ヘッダー値
    pub value: Vec<u8>,
    /// インデックス使用可否 (false = Never Indexed)
    pub allow_indexing: bool,
}

/// ヘッダーブロックのデコード結果
#[derive(Debug, PartialEq, Eq)]
pub struct BlockDecode {
    /// デコードされたフィールド (出現順)
    pub fields: Vec<DecodedHeader>,
    /// Dynamic Table Size Update を処理した場合の新サイズ
    ///
    /// サイズ更新はヘッダーブロックの先頭にのみ現れるため、検出した
    /// 時点でテーブルに適用し、現在のバッファの処理を打ち切ります。
    /// 呼び出し側は `consumed` 以降から再開できます。
    pub table_size_update: Option<usize>,
    /// 消費したバイト数
    pub consumed: usize,
}

/// HPACK デコーダ
pub struct HpackDecoder {
    /// 動的テーブル
    dynamic_table: DynamicTable,
    /// SETTINGS で合意したテーブルサイズ上限
    max_table_size: usize,
    /// Huffman デコードツリー (不変・共有)
    tree: &'static DecodeTree,
}

impl HpackDecoder {
    /// 新しいデコーダを作成
    pub fn new(max_table_size: usize) -> Self {
        Self::with_tree(max_table_size, huffman::decode_tree())
    }

    /// デコードツリーを指定してデコーダを作成
    pub fn with_tree(max_table_size: usize, tree: &'static DecodeTree) -> Self {
        Self {
            dynamic_table: DynamicTable::new(max_table_size),
            max_table_size,
            tree,
        }
    }

    /// SETTINGS で合意したテーブルサイズ上限を変更
    ///
    /// 実際の縮小はヘッダーブロック内のサイズ更新命令で行われます。
    pub fn set_max_table_size(&mut self, size: usize) {
        self.max_table_size = size;
    }

    /// 動的テーブルへの参照を取得
    pub fn dynamic_table(&self) -> &DynamicTable {
        &self.dynamic_table
    }

    /// ヘッダーブロックをデコード
    ///
    /// 入力を使い切るか、Dynamic Table Size Update に遭遇するまで
    /// フィールドをデコードします。
    pub fn decode(&mut self, buf: &[u8]) -> HpackResult<BlockDecode> {
        let mut fields = Vec::new();
        let mut pos = 0;

        while pos < buf.len() {
            let first_byte = buf[pos];

            if first_byte & 0x80 != 0 {
                // Indexed Header Field (Section 6.1)
                let (index, consumed) = decode_integer(&buf[pos..], 7)?;
                pos += consumed;

                // インデックス 0 はプロトコルエラー
                let (name, value) = get_indexed(&self.dynamic_table, index)?;
                fields.push(DecodedHeader {
                    name,
                    value,
                    allow_indexing: true,
                });
            } else if first_byte & 0x40 != 0 {
                // Literal Header Field with Incremental Indexing (Section 6.2.1)
                let (index, consumed) = decode_integer(&buf[pos..], 6)?;
                pos += consumed;

                let name = self.read_name(buf, &mut pos, index)?;
                let value = self.read_string(buf, &mut pos)?;

                // デコードと同時に動的テーブルへ追加
                self.dynamic_table.append(&name, &value);
                fields.push(DecodedHeader {
                    name,
                    value,
                    allow_indexing: true,
                });
            } else if first_byte & 0x20 != 0 {
                // Dynamic Table Size Update (Section 6.3)
                let (size, consumed) = decode_integer(&buf[pos..], 5)?;
                pos += consumed;

                if size > self.max_table_size {
                    return Err(HpackError::InvalidEncoding(format!(
                        "table size update {} exceeds limit {}",
                        size, self.max_table_size
                    )));
                }
                self.dynamic_table.resize(size)?;

                // サイズ更新はブロック先頭にのみ現れる。通知を返して
                // 現在のバッファの処理を打ち切る。
                return Ok(BlockDecode {
                    fields,
                    table_size_update: Some(size),
                    consumed: pos,
                });
            } else if first_byte & 0x10 != 0 {
                // Literal Header Field Never Indexed (Section 6.2.3)
                let (index, consumed) = decode_integer(&buf[pos..], 4)?;
                pos += consumed;

                let name = self.read_name(buf, &mut pos, index)?;
                let value = self.read_string(buf, &mut pos)?;

                // 動的テーブルには追加しない
                fields.push(DecodedHeader {
                    name,
                    value,
                    allow_indexing: false,
                });
            } else {
                // Literal Header Field without Indexing (Section 6.2.2)
                let (index, consumed) = decode_integer(&buf[pos..], 4)?;
                pos += consumed;

                let name = self.read_name(buf, &mut pos, index)?;
                let value = self.read_string(buf, &mut pos)?;

                // 動的テーブルには追加しない
                fields.push(DecodedHeader {
                    name,
                    value,
                    allow_indexing: true,
                });
            }
        }

        Ok(BlockDecode {
            fields,
            table_size_update: None,
            consumed: pos,
        })
    }

    /// 名前を読み取る (インデックス参照またはリテラル)
    fn read_name(&self, buf: &[u8], pos: &mut usize, index: usize) -> HpackResult<Vec<u8>> {
        if index > 0 {
            let (name, _) = get_indexed(&self.dynamic_table, index)?;
            Ok(name)
        } else {
            self.read_string(buf, pos)
        }
    }

    /// 文字列リテラルを読み取る
    ///
    /// H フラグ付きの 7 ビット長プレフィックスに続くバイト列。
    /// Huffman フラグがあればツリーでデコードし、無ければそのまま
    /// (Latin-1 のバイト列として) コピーします。
    fn read_string(&self, buf: &[u8], pos: &mut usize) -> HpackResult<Vec<u8>> {
        let rest = &buf[*pos..];
        if rest.is_empty() {
            return Err(HpackError::BufferUnderrun);
        }

        let is_huffman = rest[0] & 0x80 != 0;
        let (length, consumed) = decode_integer(rest, 7)?;

        // 宣言された長さが残り入力を超えていたら圧縮エラー
        if consumed + length > rest.len() {
            return Err(HpackError::BufferUnderrun);
        }

        let data = &rest[consumed..consumed + length];
        *pos += consumed + length;

        if is_huffman {
            self.tree.decode(data)
        } else {
            Ok(data.to_vec())
        }
    }
}

impl Default for HpackDecoder {
    fn default() -> Self {
        Self::new(4096)
    }
}
