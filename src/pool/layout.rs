//! メタデータの配置計画.
use std::ops::Range;

use crate::block::BlockSize;
use crate::pool::allocation_table::ALLOCATION_RECORD_SIZE;
use crate::pool::block_table::BLOCK_RECORD_SIZE;
use crate::pool::header::FULL_HEADER_SIZE;
use crate::{ErrorKind, Result};

/// プールのメタデータ(ヘッダ、ブロック情報テーブル、割当情報テーブル)の格納場所.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataPlacement {
    /// バッファの先頭ブロック群に格納する.
    ///
    /// 格納先のブロックは`BlockStatus::System`となり、利用者には割り当てられない.
    /// 割当情報テーブルは、必要に応じて後続のブロックへと拡張されていく.
    InBuffer,

    /// バッファ外の通常のメモリに保持する.
    ///
    /// バッファ全体が利用者用のブロックとなる.
    External,
}
impl Default for MetadataPlacement {
    fn default() -> Self {
        MetadataPlacement::InBuffer
    }
}

/// メタデータのバッファ内での配置.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataLayout {
    placement: MetadataPlacement,
    header_blocks: usize,
    block_size: BlockSize,
}
impl MetadataLayout {
    /// 指定されたプールのためのメタデータ配置を計算する.
    ///
    /// `InBuffer`の場合、ヘッダとブロック情報テーブルを格納するブロックの数は
    /// `(ヘッダサイズ + ブロック数 * ブロック情報サイズ) / ブロックサイズ + 1`となり、
    /// その直後のブロックが割当情報テーブルの先頭となる.
    ///
    /// # Errors
    ///
    /// メタデータがプールに収まらない場合には、種類が`ErrorKind::InvalidInput`のエラーが返される.
    pub fn plan(
        placement: MetadataPlacement,
        block_size: BlockSize,
        block_count: usize,
    ) -> Result<Self> {
        let header_blocks = match placement {
            MetadataPlacement::External => 0,
            MetadataPlacement::InBuffer => {
                let metadata_bytes = track_assert_some!(
                    block_count
                        .checked_mul(BLOCK_RECORD_SIZE)
                        .and_then(|n| n.checked_add(FULL_HEADER_SIZE)),
                    ErrorKind::InvalidInput,
                    "Too many blocks: {}",
                    block_count
                );
                let header_blocks = metadata_bytes / block_size.as_usize() + 1;

                // 割当情報テーブル用のブロックも必要
                track_assert!(
                    header_blocks < block_count,
                    ErrorKind::InvalidInput,
                    "Too small pool: block_count={}, block_size={}, metadata_blocks={}",
                    block_count,
                    block_size.as_usize(),
                    header_blocks + 1
                );
                header_blocks
            }
        };
        Ok(MetadataLayout {
            placement,
            header_blocks,
            block_size,
        })
    }

    /// メタデータの格納場所を返す.
    pub fn placement(&self) -> MetadataPlacement {
        self.placement
    }

    /// プール作成時に`System`となるブロック群を返す.
    pub fn reserved_blocks(&self) -> Range<usize> {
        match self.placement {
            MetadataPlacement::External => 0..0,
            MetadataPlacement::InBuffer => 0..self.header_blocks + 1,
        }
    }

    /// ブロック情報テーブルのバッファ内での範囲を返す.
    pub fn block_table_bytes(&self, blocks: Range<usize>) -> Option<Range<usize>> {
        match self.placement {
            MetadataPlacement::External => None,
            MetadataPlacement::InBuffer => Some(
                FULL_HEADER_SIZE + blocks.start * BLOCK_RECORD_SIZE
                    ..FULL_HEADER_SIZE + blocks.end * BLOCK_RECORD_SIZE,
            ),
        }
    }

    /// 割当情報テーブルの開始位置を返す.
    pub fn allocation_table_offset(&self) -> Option<usize> {
        match self.placement {
            MetadataPlacement::External => None,
            MetadataPlacement::InBuffer => Some(self.header_blocks * self.block_size.as_usize()),
        }
    }

    /// 指定スロットの割当情報レコードのバッファ内での範囲を返す.
    ///
    /// 範囲がプール内に収まるかどうかは検査しない.
    pub fn record_bytes(&self, slot: usize) -> Option<Range<usize>> {
        let table_offset = self.allocation_table_offset()?;
        let start = slot
            .checked_mul(ALLOCATION_RECORD_SIZE)?
            .checked_add(table_offset)?;
        Some(start..start.checked_add(ALLOCATION_RECORD_SIZE)?)
    }
}
