//! # HPACK テーブル (RFC 7541 Section 2)
//!
//! 静的テーブル (Appendix A) と動的テーブルを実装します。
//!
//! インデックス空間は統合されており、1-61 が静的テーブル、62 以降が
//! 動的テーブル (62 + k が動的テーブルの 0 始まりインデックス k) を指します。

use std::collections::VecDeque;

use super::{HpackError, HpackResult};

/// HTTP ヘッダーフィールド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    /// ヘッダー名
    pub name: Vec<u8>,
    /// ヘッダー値
    pub value: Vec<u8>,
}

impl HeaderField {
    /// 新しいヘッダーフィールドを作成
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// エントリサイズ (RFC 7541 Section 4.1)
    /// サイズ = name.len() + value.len() + 32
    #[inline]
    pub fn size(&self) -> usize {
        self.name.len() + self.value.len() + 32
    }

    /// 名前が一致するか
    #[inline]
    pub fn name_eq(&self, other: &[u8]) -> bool {
        self.name == other
    }

    /// 名前と値が一致するか
    #[inline]
    pub fn eq_field(&self, name: &[u8], value: &[u8]) -> bool {
        self.name == name && self.value == value
    }
}

/// テーブル検索の結果
///
/// エンコーダがそのまま使える統合インデックスを持ちます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMatch {
    /// 統合インデックス空間でのインデックス (静的: 1-61, 動的: 62+)
    pub index: usize,
    /// エントリの名前
    pub name: Vec<u8>,
    /// エントリの値
    pub value: Vec<u8>,
}

/// 静的テーブル (RFC 7541 Appendix A)
pub struct StaticTable;

impl StaticTable {
    /// 静的テーブルのエントリ数
    pub const SIZE: usize = 61;

    /// 静的テーブルエントリ (1-indexed)
    /// (名前, 値)
    const ENTRIES: [(&'static [u8], &'static [u8]); 61] = [
        (b":authority", b""),
        (b":method", b"GET"),
        (b":method", b"POST"),
        (b":path", b"/"),
        (b":path", b"/index.html"),
        (b":scheme", b"http"),
        (b":scheme", b"https"),
        (b":status", b"200"),
        (b":status", b"204"),
        (b":status", b"206"),
        (b":status", b"304"),
        (b":status", b"400"),
        (b":status", b"404"),
        (b":status", b"500"),
        (b"accept-charset", b""),
        (b"accept-encoding", b"gzip, deflate"),
        (b"accept-language", b""),
        (b"accept-ranges", b""),
        (b"accept", b""),
        (b"access-control-allow-origin", b""),
        (b"age", b""),
        (b"allow", b""),
        (b"authorization", b""),
        (b"cache-control", b""),
        (b"content-disposition", b""),
        (b"content-encoding", b""),
        (b"content-language", b""),
        (b"content-length", b""),
        (b"content-location", b""),
        (b"content-range", b""),
        (b"content-type", b""),
        (b"cookie", b""),
        (b"date", b""),
        (b"etag", b""),
        (b"expect", b""),
        (b"expires", b""),
        (b"from", b""),
        (b"host", b""),
        (b"if-match", b""),
        (b"if-modified-since", b""),
        (b"if-none-match", b""),
        (b"if-range", b""),
        (b"if-unmodified-since", b""),
        (b"last-modified", b""),
        (b"link", b""),
        (b"location", b""),
        (b"max-forwards", b""),
        (b"proxy-authenticate", b""),
        (b"proxy-authorization", b""),
        (b"range", b""),
        (b"referer", b""),
        (b"refresh", b""),
        (b"retry-after", b""),
        (b"server", b""),
        (b"set-cookie", b""),
        (b"strict-transport-security", b""),
        (b"transfer-encoding", b""),
        (b"user-agent", b""),
        (b"vary", b""),
        (b"via", b""),
        (b"www-authenticate", b""),
    ];

    /// インデックスでエントリを取得 (1-indexed)
    #[inline]
    pub fn get(index: usize) -> Option<(&'static [u8], &'static [u8])> {
        if index == 0 || index > Self::SIZE {
            return None;
        }
        let (name, value) = Self::ENTRIES[index - 1];
        Some((name, value))
    }

    /// 名前 (と任意で値) が一致するエントリを検索
    ///
    /// `wanted_value` がある場合は名前と値の完全一致を優先し、無ければ
    /// 名前のみ一致する最初のエントリにフォールバックします。
    pub fn find(name: &[u8], wanted_value: Option<&[u8]>) -> Option<TableMatch> {
        let mut name_only: Option<usize> = None;

        for (i, (n, v)) in Self::ENTRIES.iter().enumerate() {
            if *n != name {
                continue;
            }
            if let Some(wanted) = wanted_value {
                if *v == wanted {
                    return Some(TableMatch {
                        index: i + 1,
                        name: n.to_vec(),
                        value: v.to_vec(),
                    });
                }
                if name_only.is_none() {
                    name_only = Some(i);
                }
            } else {
                return Some(TableMatch {
                    index: i + 1,
                    name: n.to_vec(),
                    value: v.to_vec(),
                });
            }
        }

        name_only.map(|i| {
            let (n, v) = Self::ENTRIES[i];
            TableMatch {
                index: i + 1,
                name: n.to_vec(),
                value: v.to_vec(),
            }
        })
    }
}

/// 動的テーブル (RFC 7541 Section 2.3.2)
///
/// エントリは新しいものが先頭 (インデックス 0 = 最新)。エンコーダ側と
/// デコーダ側で 1 インスタンスずつ持ち、プロトコル上は両端で完全に同期
/// して変化します (構造的には強制されない、プロトコルが依存する不変条件)。
pub struct DynamicTable {
    /// エントリ (新しいものが先頭)
    entries: VecDeque<HeaderField>,
    /// 現在のサイズ (bytes)
    size: usize,
    /// 最大サイズ (bytes)
    max_size: usize,
}

impl DynamicTable {
    /// 新しい動的テーブルを作成
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            size: 0,
            max_size,
        }
    }

    /// 現在のエントリ数
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// テーブルが空かどうか
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 現在のサイズ (bytes)
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// 最大サイズ (bytes)
    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// 最大サイズを変更 (RFC 7541 Section 4.3)
    ///
    /// 縮小時は末尾 (最古) のエントリから削除します。
    pub fn resize(&mut self, new_max: usize) -> HpackResult<()> {
        if new_max == 0 {
            return Err(HpackError::InvalidArgument("table size must be positive"));
        }

        while self.size > new_max {
            if let Some(old) = self.entries.pop_back() {
                self.size -= old.size();
            }
        }
        self.max_size = new_max;
        Ok(())
    }

    /// エントリを追加 (RFC 7541 Section 4.4)
    ///
    /// 新しいエントリが収まるまで末尾から削除してから先頭に追加します。
    /// エントリ単体が max_size を超える場合、挿入即退去となり
    /// テーブルは空になります。
    pub fn append(&mut self, name: &[u8], value: &[u8]) -> HeaderField {
        let entry = HeaderField::new(name, value);
        let entry_size = entry.size();

        // 容量確保のために古いエントリを削除
        while self.size + entry_size > self.max_size && !self.entries.is_empty() {
            if let Some(old) = self.entries.pop_back() {
                self.size -= old.size();
            }
        }

        if entry_size > self.max_size {
            // 挿入直後に自分自身が退去される
            self.entries.clear();
            self.size = 0;
            return entry;
        }

        self.entries.push_front(entry.clone());
        self.size += entry_size;
        entry
    }

    /// インデックスでエントリを取得 (0-indexed, 最新が 0)
    pub fn get(&self, index: usize) -> HpackResult<&HeaderField> {
        self.entries
            .get(index)
            .ok_or(HpackError::IndexOutOfRange(index))
    }

    /// 名前 (と任意で値) が一致するエントリを検索
    ///
    /// `wanted_value` がある場合は名前と値の完全一致を優先し、無ければ
    /// 名前のみ一致する最初のエントリにフォールバックします。
    /// 結果は統合インデックス (62 + 位置) を持ちます。
    pub fn find(&self, name: &[u8], wanted_value: Option<&[u8]>) -> Option<TableMatch> {
        let mut name_only: Option<usize> = None;

        for (i, entry) in self.entries.iter().enumerate() {
            if !entry.name_eq(name) {
                continue;
            }
            if let Some(wanted) = wanted_value {
                if entry.value == wanted {
                    return Some(self.match_at(i));
                }
                if name_only.is_none() {
                    name_only = Some(i);
                }
            } else {
                return Some(self.match_at(i));
            }
        }

        name_only.map(|i| self.match_at(i))
    }

    fn match_at(&self, position: usize) -> TableMatch {
        let entry = &self.entries[position];
        TableMatch {
            index: StaticTable::SIZE + 1 + position,
            name: entry.name.clone(),
            value: entry.value.clone(),
        }
    }

    /// テーブルをクリア
    pub fn clear(&mut self) {
        self.entries.clear();
        self.size = 0;
    }
}

/// 統合インデックスアクセス (静的 + 動的テーブル)
///
/// インデックス 1-61: 静的テーブル
/// インデックス 62+: 動的テーブル (62 + k → 動的インデックス k)
pub fn get_indexed(dynamic_table: &DynamicTable, index: usize) -> HpackResult<(Vec<u8>, Vec<u8>)> {
    if index == 0 {
        return Err(HpackError::IndexOutOfRange(0));
    }

    if index <= StaticTable::SIZE {
        let (name, value) = StaticTable::get(index).ok_or(HpackError::IndexOutOfRange(index))?;
        Ok((name.to_vec(), value.to_vec()))
    } else {
        let dynamic_index = index - StaticTable::SIZE - 1;
        let entry = dynamic_table
            .get(dynamic_index)
            .map_err(|_| HpackError::IndexOutOfRange(index))?;
        Ok((entry.name.clone(), entry.value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_table_get() {
        // Index 1: :authority
        let (name, value) = StaticTable::get(1).unwrap();
        assert_eq!(name, b":authority");
        assert_eq!(value, b"");

        // Index 2: :method GET
        let (name, value) = StaticTable::get(2).unwrap();
        assert_eq!(name, b":method");
        assert_eq!(value, b"GET");

        // Index 61: www-authenticate
        let (name, value) = StaticTable::get(61).unwrap();
        assert_eq!(name, b"www-authenticate");
        assert_eq!(value, b"");

        // Invalid indices
        assert!(StaticTable::get(0).is_none());
        assert!(StaticTable::get(62).is_none());
    }

    #[test]
    fn test_static_table_find() {
        let m = StaticTable::find(b":method", Some(b"GET")).unwrap();
        assert_eq!(m.index, 2);
        assert_eq!(m.value, b"GET");

        let m = StaticTable::find(b":method", Some(b"POST")).unwrap();
        assert_eq!(m.index, 3);

        // 値が一致しない場合は名前のみの最初のエントリにフォールバック
        let m = StaticTable::find(b":method", Some(b"PUT")).unwrap();
        assert_eq!(m.index, 2);

        let m = StaticTable::find(b":method", None).unwrap();
        assert_eq!(m.index, 2);

        assert!(StaticTable::find(b"x-custom", Some(b"1")).is_none());
    }

    #[test]
    fn test_dynamic_table_append_and_get() {
        let mut table = DynamicTable::new(4096);

        table.append(b"custom-header", b"custom-value");
        assert_eq!(table.len(), 1);

        let entry = table.get(0).unwrap();
        assert_eq!(entry.name, b"custom-header");
        assert_eq!(entry.value, b"custom-value");

        // 最新が 0 になる
        table.append(b"second", b"value");
        assert_eq!(table.get(0).unwrap().name, b"second");
        assert_eq!(table.get(1).unwrap().name, b"custom-header");

        assert_eq!(table.get(2), Err(HpackError::IndexOutOfRange(2)));
    }

    #[test]
    fn test_dynamic_table_eviction() {
        // 名前10 + 値10 + 32 = 52 bytes per entry
        let mut table = DynamicTable::new(100);

        table.append(b"header1234", b"value12345"); // 52 bytes
        assert_eq!(table.len(), 1);

        table.append(b"header5678", b"value67890"); // 52 bytes, 100 を超過
        // 最初のエントリが削除される
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0).unwrap().name, b"header5678");
        assert!(table.size() <= table.max_size());
    }

    #[test]
    fn test_dynamic_table_oversize_entry() {
        let mut table = DynamicTable::new(50);

        // 50 bytes を超えるエントリ: 挿入即退去でテーブルは空
        table.append(b"very-long-header-name", b"very-long-value");
        assert!(table.is_empty());
        assert_eq!(table.size(), 0);
    }

    #[test]
    fn test_dynamic_table_resize() {
        let mut table = DynamicTable::new(4096);
        table.append(b"aaaaaaaaaa", b"bbbbbbbbbb"); // 52 bytes
        table.append(b"cccccccccc", b"dddddddddd"); // 52 bytes
        assert_eq!(table.len(), 2);

        // 縮小すると最古 (末尾) から退去
        table.resize(60).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0).unwrap().name, b"cccccccccc");
        assert!(table.size() <= 60);

        assert_eq!(
            table.resize(0),
            Err(HpackError::InvalidArgument("table size must be positive"))
        );
    }

    #[test]
    fn test_dynamic_table_size_invariant() {
        let mut table = DynamicTable::new(200);
        let names: [&[u8]; 5] = [b"alpha", b"bravo", b"charlie", b"delta", b"echo"];

        for (i, name) in names.iter().enumerate() {
            table.append(name, b"some-value");
            assert!(table.size() <= table.max_size());

            // size はエントリサイズの総和
            let sum: usize = (0..table.len()).map(|k| table.get(k).unwrap().size()).sum();
            assert_eq!(table.size(), sum, "after append {}", i);
        }

        table.resize(100).unwrap();
        let sum: usize = (0..table.len()).map(|k| table.get(k).unwrap().size()).sum();
        assert_eq!(table.size(), sum);
        assert!(table.size() <= 100);
    }

    #[test]
    fn test_dynamic_table_find() {
        let mut table = DynamicTable::new(4096);
        table.append(b"x-token", b"one");
        table.append(b"x-token", b"two");
        table.append(b"x-other", b"three");

        // 完全一致を優先
        let m = table.find(b"x-token", Some(b"one")).unwrap();
        assert_eq!(m.index, 64); // 位置 2 → 62 + 2
        assert_eq!(m.value, b"one");

        // 一致する値が無ければ名前のみ一致の最初のエントリ
        let m = table.find(b"x-token", Some(b"missing")).unwrap();
        assert_eq!(m.index, 63); // 位置 1 (x-token=two が新しい方)
        assert_eq!(m.value, b"two");

        // 値指定なし
        let m = table.find(b"x-other", None).unwrap();
        assert_eq!(m.index, 62);

        assert!(table.find(b"not-present", None).is_none());
    }

    #[test]
    fn test_get_indexed_boundary() {
        let mut table = DynamicTable::new(4096);
        table.append(b"x-custom", b"v");

        // 61 は静的テーブルの最後
        let (name, _) = get_indexed(&table, 61).unwrap();
        assert_eq!(name, b"www-authenticate");

        // 62 は動的テーブルの先頭
        let (name, value) = get_indexed(&table, 62).unwrap();
        assert_eq!(name, b"x-custom");
        assert_eq!(value, b"v");

        assert!(get_indexed(&table, 0).is_err());
        assert!(get_indexed(&table, 63).is_err());
    }

    #[test]
    fn test_header_field_size() {
        let field = HeaderField::new(b"content-type".as_slice(), b"text/html".as_slice());
        // 12 + 9 + 32 = 53
        assert_eq!(field.size(), 53);
    }
}
