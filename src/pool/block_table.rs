//! ブロック情報テーブル.
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use std::ops::Range;

use crate::{ErrorKind, Result};

/// ブロック情報一つ分のエンコード後のサイズ(バイト数).
///
/// 状態(1バイト)とパディング(7バイト)、プール先頭からのオフセット(8バイト)から構成される.
pub const BLOCK_RECORD_SIZE: usize = 16;

const STATUS_FREE: u8 = 0;
const STATUS_ALLOCED: u8 = 1;
const STATUS_SYSTEM: u8 = 2;

/// ブロックの状態.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockStatus {
    /// 空き(割当可能).
    Free,

    /// 利用者に割当済み.
    Alloced,

    /// プール自身のメタデータ用に予約済み.
    ///
    /// 一度この状態になったブロックが、他の状態に戻ることはない.
    System,
}
impl BlockStatus {
    /// 状態を表す数値を返す.
    pub fn as_u8(self) -> u8 {
        match self {
            BlockStatus::Free => STATUS_FREE,
            BlockStatus::Alloced => STATUS_ALLOCED,
            BlockStatus::System => STATUS_SYSTEM,
        }
    }

    /// 数値から状態を復元する.
    ///
    /// # Errors
    ///
    /// 未知の値の場合には、種類が`ErrorKind::InvalidInput`のエラーが返される.
    pub fn from_u8(n: u8) -> Result<Self> {
        match n {
            STATUS_FREE => Ok(BlockStatus::Free),
            STATUS_ALLOCED => Ok(BlockStatus::Alloced),
            STATUS_SYSTEM => Ok(BlockStatus::System),
            _ => track_panic!(ErrorKind::InvalidInput, "Unknown block status: {}", n),
        }
    }
}

/// 個々のブロックの情報.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockInfo {
    /// ブロックのインデックス.
    pub index: usize,

    /// ブロックの状態.
    pub status: BlockStatus,

    /// ブロックの開始位置の、プール先頭からのオフセット(バイト単位).
    pub offset: usize,
}
impl BlockInfo {
    /// ブロック情報を`writer`に書き込む.
    ///
    /// インデックスは書き込まれない(テーブル内の位置で表現される).
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        track_io!(writer.write_u8(self.status.as_u8()))?;
        track_io!(writer.write_all(&[0; 7][..]))?;
        track_io!(writer.write_u64::<BigEndian>(self.offset as u64))?;
        Ok(())
    }

    /// `index`番目のブロック情報を`reader`から読み込む.
    pub fn read_from<R: Read>(mut reader: R, index: usize) -> Result<Self> {
        let status = track_io!(reader.read_u8())?;
        let status = track!(BlockStatus::from_u8(status))?;
        let mut padding = [0; 7];
        track_io!(reader.read_exact(&mut padding))?;
        let offset = track_io!(reader.read_u64::<BigEndian>())?;
        Ok(BlockInfo {
            index,
            status,
            offset: offset as usize,
        })
    }
}

/// プール内の全ブロックの状態を保持するテーブル.
///
/// ブロックの開始位置は、インデックスとブロックサイズから一意に決まるので、
/// テーブル自体には状態のみを保持している.
#[derive(Debug, Clone)]
pub struct BlockTable {
    statuses: Vec<BlockStatus>,
}
impl BlockTable {
    /// 全てのブロックが空きの状態のテーブルを生成する.
    pub fn new(block_count: usize) -> Self {
        BlockTable {
            statuses: vec![BlockStatus::Free; block_count],
        }
    }

    /// ブロック数を返す.
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    /// `index`番目のブロックの状態を返す.
    pub fn status(&self, index: usize) -> Option<BlockStatus> {
        self.statuses.get(index).cloned()
    }

    /// `index`番目のブロックが空きかどうかを判定する.
    ///
    /// 範囲外のインデックスに対しては`false`を返す.
    pub fn is_free(&self, index: usize) -> bool {
        self.status(index) == Some(BlockStatus::Free)
    }

    /// 指定範囲のブロックの状態を更新する.
    ///
    /// `System`状態のブロックは更新されない.
    pub fn mark(&mut self, blocks: Range<usize>, status: BlockStatus) {
        for s in &mut self.statuses[blocks] {
            if *s != BlockStatus::System {
                *s = status;
            }
        }
    }

    /// 指定された状態を持つブロックの数を返す.
    pub fn count(&self, status: BlockStatus) -> usize {
        self.statuses.iter().filter(|&&s| s == status).count()
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;

    #[test]
    fn mark_works() {
        let mut table = BlockTable::new(8);
        assert_eq!(table.len(), 8);
        assert_eq!(table.count(BlockStatus::Free), 8);

        table.mark(0..2, BlockStatus::System);
        table.mark(5..8, BlockStatus::Alloced);
        assert_eq!(table.status(1), Some(BlockStatus::System));
        assert_eq!(table.status(5), Some(BlockStatus::Alloced));
        assert_eq!(table.status(8), None);
        assert!(table.is_free(2));
        assert!(!table.is_free(5));
        assert!(!table.is_free(8));

        // SYSTEMブロックは元に戻らない
        table.mark(0..8, BlockStatus::Free);
        assert_eq!(table.count(BlockStatus::System), 2);
        assert_eq!(table.count(BlockStatus::Free), 6);
    }

    #[test]
    fn status_codec_works() -> TestResult {
        for s in &[BlockStatus::Free, BlockStatus::Alloced, BlockStatus::System] {
            assert_eq!(track!(BlockStatus::from_u8(s.as_u8()))?, *s);
        }
        assert_eq!(
            BlockStatus::from_u8(3).err().map(|e| *e.kind()),
            Some(ErrorKind::InvalidInput)
        );
        Ok(())
    }

    #[test]
    fn block_info_codec_works() -> TestResult {
        let info = BlockInfo {
            index: 3,
            status: BlockStatus::Alloced,
            offset: 3 * 1024,
        };
        let mut buf = Vec::new();
        track!(info.write_to(&mut buf))?;
        assert_eq!(buf.len(), BLOCK_RECORD_SIZE);

        let decoded = track!(BlockInfo::read_from(&buf[..], 3))?;
        assert_eq!(decoded, info);
        Ok(())
    }
}
