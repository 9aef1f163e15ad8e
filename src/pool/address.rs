//! ブロックのインデックスとプール内の位置の相互変換.
use std::ops::Range;

use crate::block::BlockSize;

/// ブロックのインデックスと、プール先頭からのオフセット(バイト単位)を相互に変換するための構造体.
///
/// 全てのブロックは同じサイズで隙間なく並んでいるため、変換は単純な算術演算で行える.
/// 実際のアドレスとの変換は、オフセットを経由して[`Pool`]が行う.
///
/// [`Pool`]: ./struct.Pool.html
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressTranslator {
    block_size: BlockSize,
    block_count: usize,
}
impl AddressTranslator {
    /// 新しい`AddressTranslator`インスタンスを生成する.
    pub fn new(block_size: BlockSize, block_count: usize) -> Self {
        AddressTranslator {
            block_size,
            block_count,
        }
    }

    /// ブロックサイズを返す.
    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    /// ブロック数を返す.
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// プール全体のサイズ(バイト単位)を返す.
    pub fn pool_size(&self) -> usize {
        self.block_count * self.block_size.as_usize()
    }

    /// `index`番目のブロックの開始オフセットを返す.
    ///
    /// `index`が範囲外の場合には`None`が返される.
    pub fn block_offset(&self, index: usize) -> Option<usize> {
        if index < self.block_count {
            Some(index * self.block_size.as_usize())
        } else {
            None
        }
    }

    /// `offset`の位置を含むブロックのインデックスを返す.
    ///
    /// `offset`がプールの範囲外の場合には`None`が返される.
    pub fn block_index(&self, offset: usize) -> Option<usize> {
        if offset < self.pool_size() {
            Some(offset / self.block_size.as_usize())
        } else {
            None
        }
    }

    /// 指定されたバイト範囲と重なる全てのブロックのインデックス範囲を返す.
    ///
    /// 範囲の終端がプールを超えている場合には`None`が返される.
    pub fn covering_blocks(&self, bytes: Range<usize>) -> Option<Range<usize>> {
        if bytes.start > bytes.end || bytes.end > self.pool_size() {
            return None;
        }
        let start = bytes.start / self.block_size.as_usize();
        let end = self.block_size.blocks_for(bytes.end);
        Some(start..end)
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;

    #[test]
    fn it_works() -> TestResult {
        let t = AddressTranslator::new(track!(BlockSize::new(100))?, 10);
        assert_eq!(t.pool_size(), 1000);

        assert_eq!(t.block_offset(0), Some(0));
        assert_eq!(t.block_offset(9), Some(900));
        assert_eq!(t.block_offset(10), None);

        assert_eq!(t.block_index(0), Some(0));
        assert_eq!(t.block_index(99), Some(0));
        assert_eq!(t.block_index(100), Some(1));
        assert_eq!(t.block_index(999), Some(9));
        assert_eq!(t.block_index(1000), None);

        for i in 0..10 {
            assert_eq!(t.block_offset(i).and_then(|o| t.block_index(o)), Some(i));
        }
        Ok(())
    }

    #[test]
    fn covering_blocks_works() -> TestResult {
        let t = AddressTranslator::new(track!(BlockSize::new(100))?, 10);
        assert_eq!(t.covering_blocks(0..1), Some(0..1));
        assert_eq!(t.covering_blocks(0..100), Some(0..1));
        assert_eq!(t.covering_blocks(90..110), Some(0..2));
        assert_eq!(t.covering_blocks(200..200), Some(2..2));
        assert_eq!(t.covering_blocks(950..1000), Some(9..10));
        assert_eq!(t.covering_blocks(950..1001), None);
        Ok(())
    }
}
