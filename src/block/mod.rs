//! プールのブロック(割当の最小単位)関連の構成要素.
use crate::{ErrorKind, Result};

pub(crate) use self::aligned_buffer::AlignedBuffer;

mod aligned_buffer;

/// [`Pool`]のブロックサイズを表現するための構造体.
///
/// "ブロック"は、割当の最小単位であり、[`Pool`]が払い出す領域のサイズは、
/// 常に`BlockSize`の倍数となる.
///
/// 指定されたサイズのブロック境界にアライメントを行うための補助メソッド群も提供している.
///
/// [`Pool`]: ../pool/struct.Pool.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockSize(usize);
impl BlockSize {
    /// バッファの先頭アドレスを揃える境界の最大値.
    ///
    /// ブロックサイズがこれより大きくても、アライメントはこの値で打ち止めとなる.
    pub const MAX_ALIGNMENT: usize = 4096;

    /// 指定された値のブロックサイズを表現する`BlockSize`インスタンスを生成する.
    ///
    /// # Errors
    ///
    /// `block_size`が`0`の場合には、種類が`ErrorKind::InvalidInput`のエラーが返される.
    ///
    /// # Examples
    ///
    /// ```
    /// use blockpool::ErrorKind;
    /// use blockpool::block::BlockSize;
    ///
    /// assert_eq!(BlockSize::new(1024).ok().map(|a| a.as_usize()), Some(1024));
    /// assert_eq!(BlockSize::new(3).ok().map(|a| a.as_usize()), Some(3));
    ///
    /// assert_eq!(BlockSize::new(0).err().map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    /// ```
    #[allow(clippy::new_ret_no_self)]
    pub fn new(block_size: usize) -> Result<Self> {
        track_assert!(block_size > 0, ErrorKind::InvalidInput);
        Ok(BlockSize(block_size))
    }

    /// `size`バイトを格納するのに必要なブロック数を返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use blockpool::block::BlockSize;
    ///
    /// let block_size = BlockSize::new(1024).unwrap();
    /// assert_eq!(block_size.blocks_for(1), 1);
    /// assert_eq!(block_size.blocks_for(1024), 1);
    /// assert_eq!(block_size.blocks_for(1025), 2);
    /// assert_eq!(block_size.blocks_for(usize::max_value()), usize::max_value() / 1024 + 1);
    /// ```
    pub fn blocks_for(self, size: usize) -> usize {
        size / self.0 + if size % self.0 == 0 { 0 } else { 1 }
    }

    /// 指定位置がブロックサイズ境界に沿っているかどうかを判定する.
    ///
    /// # Examples
    ///
    /// ```
    /// use blockpool::block::BlockSize;
    ///
    /// let block_size = BlockSize::new(512).unwrap();
    /// assert!(block_size.is_aligned(0));
    /// assert!(block_size.is_aligned(1024));
    ///
    /// assert!(!block_size.is_aligned(511));
    /// assert!(!block_size.is_aligned(513));
    /// ```
    pub fn is_aligned(self, position: usize) -> bool {
        (position % self.0) == 0
    }

    /// バッファの先頭アドレスに要求するアライメントを返す.
    ///
    /// ブロックサイズを割り切る最大の二の冪で、`MAX_ALIGNMENT`を上限とする.
    /// 先頭アドレスがこの境界に揃っていれば、全てのブロックの開始アドレスも同じ境界に揃う.
    ///
    /// # Examples
    ///
    /// ```
    /// use blockpool::block::BlockSize;
    ///
    /// assert_eq!(BlockSize::new(1024).unwrap().alignment(), 1024);
    /// assert_eq!(BlockSize::new(24).unwrap().alignment(), 8);
    /// assert_eq!(BlockSize::new(7).unwrap().alignment(), 1);
    /// assert_eq!(BlockSize::new(1 << 20).unwrap().alignment(), BlockSize::MAX_ALIGNMENT);
    /// ```
    pub fn alignment(self) -> usize {
        let lowest_bit = self.0 & self.0.wrapping_neg();
        std::cmp::min(lowest_bit, Self::MAX_ALIGNMENT)
    }

    /// ブロックサイズ値を`usize`に変換して返す.
    pub fn as_usize(self) -> usize {
        self.0
    }
}
