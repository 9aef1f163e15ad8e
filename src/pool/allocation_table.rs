//! 割当情報テーブル.
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::slice;

use crate::pool::span::Span;
use crate::{ErrorKind, Result};

/// 割当情報一つ分のエンコード後のサイズ(バイト数).
pub const ALLOCATION_RECORD_SIZE: usize =
    8 /* offset */ +
    8 /* start */ +
    8 /* end */ +
    1 /* in_use */ +
    7 /* padding */;

/// 一つの割当(ないし解放済みの割当)を表すレコード.
///
/// 生成後に変化するのは`in_use`のみ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationRecord {
    /// 利用者に返したポインタの、プール先頭からのオフセット(バイト単位).
    ///
    /// 常に`span.start`のブロックの開始位置と一致する.
    pub offset: usize,

    /// 割り当てたブロック列.
    pub span: Span,

    /// 割当中なら`true`、解放済みなら`false`.
    pub in_use: bool,
}
impl AllocationRecord {
    /// レコードを`writer`に書き込む.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        track_io!(writer.write_u64::<BigEndian>(self.offset as u64))?;
        track_io!(writer.write_u64::<BigEndian>(self.span.start as u64))?;
        track_io!(writer.write_u64::<BigEndian>(self.span.end as u64))?;
        track_io!(writer.write_u8(self.in_use as u8))?;
        track_io!(writer.write_all(&[0; 7][..]))?;
        Ok(())
    }

    /// レコードを`reader`から読み込む.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let offset = track_io!(reader.read_u64::<BigEndian>())? as usize;
        let start = track_io!(reader.read_u64::<BigEndian>())? as usize;
        let end = track_io!(reader.read_u64::<BigEndian>())? as usize;
        let in_use = track_io!(reader.read_u8())?;
        let mut padding = [0; 7];
        track_io!(reader.read_exact(&mut padding))?;

        track_assert!(start < end, ErrorKind::InvalidInput; start, end);
        track_assert!(in_use <= 1, ErrorKind::InvalidInput; in_use);
        Ok(AllocationRecord {
            offset,
            span: Span { start, end },
            in_use: in_use == 1,
        })
    }
}

/// 割当情報レコード群を保持するテーブル.
///
/// レコードは"スロット"単位で管理される.
/// 解放されたレコードはテーブルから削除されず、`in_use == false`の状態で残されるが、
/// そのスロットは次の登録時に(若い番号から順に)再利用される.
///
/// 解放時の検索を高速化するために、割当中のレコード群は先頭ブロックのインデックスで索引付けされている.
#[derive(Debug, Clone, Default)]
pub struct AllocationTable {
    records: Vec<AllocationRecord>,
    retired_slots: BTreeSet<usize>,
    live: BTreeMap<usize, usize>,
}
impl AllocationTable {
    /// 空のテーブルを生成する.
    pub fn new() -> Self {
        Self::default()
    }

    /// これまでに使用されたスロットの数を返す.
    ///
    /// 解放済みのレコードも含む.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 割当中のレコードの数を返す.
    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    /// 次の登録で使用されるスロットを返す.
    pub fn next_slot(&self) -> usize {
        self.retired_slots
            .iter()
            .next()
            .cloned()
            .unwrap_or_else(|| self.records.len())
    }

    /// 新しい割当を登録し、格納先のスロットを返す.
    ///
    /// スロットは`next_slot()`の結果と一致する.
    pub fn insert(&mut self, offset: usize, span: Span) -> Result<usize> {
        track_assert!(
            !self.live.contains_key(&span.start),
            ErrorKind::InconsistentState;
            span.start
        );
        let record = AllocationRecord {
            offset,
            span,
            in_use: true,
        };
        let slot = self.next_slot();
        if slot == self.records.len() {
            self.records.push(record);
        } else {
            self.retired_slots.remove(&slot);
            self.records[slot] = record;
        }
        self.live.insert(span.start, slot);
        Ok(slot)
    }

    /// 先頭ブロックが`start`の割当中レコードを返す.
    pub fn find_live(&self, start: usize) -> Option<(usize, &AllocationRecord)> {
        self.live
            .get(&start)
            .map(|&slot| (slot, &self.records[slot]))
    }

    /// 先頭ブロックが`start`の割当中レコードを解放済みにする.
    ///
    /// 該当するレコードが存在しない場合には`None`が返される.
    pub fn retire(&mut self, start: usize) -> Option<(usize, AllocationRecord)> {
        let slot = self.live.remove(&start)?;
        let record = &mut self.records[slot];
        record.in_use = false;
        self.retired_slots.insert(slot);
        Some((slot, *record))
    }

    /// 指定スロットのレコードを返す.
    pub fn get(&self, slot: usize) -> Option<&AllocationRecord> {
        self.records.get(slot)
    }

    /// スロット順にレコードを走査するイテレータを返す.
    pub fn iter(&self) -> slice::Iter<AllocationRecord> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;

    #[test]
    fn insert_and_retire_works() -> TestResult {
        let mut table = AllocationTable::new();
        assert_eq!(table.next_slot(), 0);

        assert_eq!(track!(table.insert(1024, span(1, 3)))?, 0);
        assert_eq!(track!(table.insert(4096, span(4, 5)))?, 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.live_len(), 2);

        let (slot, record) = table.find_live(4).expect("registered");
        assert_eq!(slot, 1);
        assert_eq!(record.offset, 4096);
        assert!(record.in_use);
        assert!(table.find_live(3).is_none());

        let (slot, record) = table.retire(1).expect("registered");
        assert_eq!(slot, 0);
        assert!(!record.in_use);
        assert_eq!(table.get(0).map(|r| r.in_use), Some(false));
        assert!(table.retire(1).is_none());
        assert_eq!(table.live_len(), 1);
        Ok(())
    }

    #[test]
    fn retired_slots_are_reused() -> TestResult {
        let mut table = AllocationTable::new();
        for i in 0..4 {
            track!(table.insert(i * 10, span(i, i + 1)))?;
        }
        table.retire(2);
        table.retire(0);
        assert_eq!(table.next_slot(), 0);

        assert_eq!(track!(table.insert(100, span(10, 12)))?, 0);
        assert_eq!(track!(table.insert(200, span(20, 22)))?, 2);
        assert_eq!(track!(table.insert(300, span(30, 32)))?, 4);
        assert_eq!(table.len(), 5);
        assert_eq!(table.live_len(), 5);
        Ok(())
    }

    #[test]
    fn duplicated_start_is_rejected() -> TestResult {
        let mut table = AllocationTable::new();
        track!(table.insert(0, span(0, 2)))?;
        let e = table.insert(0, span(0, 1)).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InconsistentState));
        Ok(())
    }

    #[test]
    fn record_codec_works() -> TestResult {
        let record = AllocationRecord {
            offset: 2048,
            span: span(2, 6),
            in_use: true,
        };
        let mut buf = Vec::new();
        track!(record.write_to(&mut buf))?;
        assert_eq!(buf.len(), ALLOCATION_RECORD_SIZE);
        assert_eq!(track!(AllocationRecord::read_from(&buf[..]))?, record);

        // 不正な範囲
        let broken = AllocationRecord {
            span: span(6, 2),
            ..record
        };
        let mut buf = Vec::new();
        track!(broken.write_to(&mut buf))?;
        assert!(AllocationRecord::read_from(&buf[..]).is_err());
        Ok(())
    }

    fn span(start: usize, end: usize) -> Span {
        Span { start, end }
    }
}
