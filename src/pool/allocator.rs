//! Block Allocator.
use std::ops::Range;

use crate::metrics::PoolMetrics;
use crate::pool::address::AddressTranslator;
use crate::pool::allocation_table::AllocationTable;
use crate::pool::block_table::{BlockInfo, BlockStatus, BlockTable};
use crate::pool::layout::MetadataLayout;
use crate::pool::span::Span;
use crate::{ErrorKind, Result};

/// 割当に成功したスパンの情報.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// 割り当てたスパン.
    pub span: Span,

    /// 割当情報を格納したスロット.
    pub slot: usize,

    /// 割当情報の格納先となったブロック群.
    ///
    /// これらのブロックは`System`状態になっている.
    /// 割当情報テーブルがバッファ外にある場合には空.
    pub table_blocks: Range<usize>,
}

/// プールのブロック群の割当を担当するアロケータ.
///
/// ブロック情報テーブルと割当情報テーブルを保持し、
/// 状態の更新はこの構造体を経由してのみ行われる.
///
/// この実装自体は、完全にメモリ上のデータ構造であり、
/// 実際のバッファへの読み書きを、この中で行うことは無い.
///
/// # 割当戦略
///
/// 末尾(最大インデックス)側から空きブロック列を探索する"LastFit"戦略を採用している.
///
/// 要求ブロック数を`n`とすると、終端(exclusive)が`top`の候補`[top - n, top)`を、
/// `top`の大きい方から順に検査する.
/// 候補内に空きではないブロック(`Alloced`と`System`は区別しない)が見つかった場合には、
/// そのブロックの直前を新たな`top`として探索を継続する.
#[derive(Debug)]
pub struct BlockAllocator {
    blocks: BlockTable,
    records: AllocationTable,
    translator: AddressTranslator,
    layout: MetadataLayout,
    max_records: Option<usize>,
    metrics: PoolMetrics,
}
impl BlockAllocator {
    /// アロケータを構築する.
    ///
    /// `layout`が予約するブロック群は、この時点で`System`となる.
    pub fn new(
        translator: AddressTranslator,
        layout: MetadataLayout,
        max_records: Option<usize>,
        metrics: PoolMetrics,
    ) -> Self {
        let mut blocks = BlockTable::new(translator.block_count());
        blocks.mark(layout.reserved_blocks(), BlockStatus::System);

        metrics.capacity_bytes.set(translator.pool_size() as f64);
        metrics
            .system_blocks
            .set(blocks.count(BlockStatus::System) as f64);
        BlockAllocator {
            blocks,
            records: AllocationTable::new(),
            translator,
            layout,
            max_records,
            metrics,
        }
    }

    /// `size`バイト分のスパンの割当を行う.
    ///
    /// # Errors
    ///
    /// - `size`が`0`の場合には`ErrorKind::InvalidInput`
    /// - 十分な連続した空きブロックが存在しない場合には`ErrorKind::PoolFull`
    /// - 割当情報テーブルに空きがない場合には`ErrorKind::MetadataFull`
    ///
    /// いずれの場合も、ブロックの状態は変更されない.
    pub fn allocate(&mut self, size: usize) -> Result<Allocation> {
        track_assert!(size > 0, ErrorKind::InvalidInput);
        let required = self.translator.block_size().blocks_for(size);
        if required > self.translator.block_count() {
            self.metrics.nospace_failures.increment();
            track_panic!(
                ErrorKind::PoolFull,
                "Too large request: size={}, required_blocks={}",
                size,
                required
            );
        }

        let (slot, table_blocks) = match self.plan_record_slot() {
            Ok(x) => x,
            Err(e) => {
                self.metrics.metadata_full_failures.increment();
                return Err(track!(e));
            }
        };

        // 割当情報テーブルの拡張先となるブロックは探索対象から除外する
        let start = if let Some(start) = self.find_free_run(required, &table_blocks) {
            start
        } else {
            self.metrics.nospace_failures.increment();
            track_panic!(
                ErrorKind::PoolFull,
                "No free run: required_blocks={}",
                required
            );
        };

        let span = Span {
            start,
            end: start + required,
        };
        self.blocks.mark(span.blocks(), BlockStatus::Alloced);
        if let Err(e) = track!(self.register(span, slot, table_blocks.clone())) {
            self.blocks.mark(span.blocks(), BlockStatus::Free);
            return Err(e);
        }
        self.metrics.count_allocation(span.len());
        Ok(Allocation {
            span,
            slot,
            table_blocks,
        })
    }

    /// 先頭位置が`offset`のスパンを解放する.
    ///
    /// `offset`に対応する割当中のスパンが存在しない場合には、何も行わずに`None`を返す.
    pub fn release(&mut self, offset: usize) -> Option<(usize, Span)> {
        let released = self
            .block_start(offset)
            .and_then(|start| self.records.retire(start));
        if let Some((slot, record)) = released {
            self.blocks.mark(record.span.blocks(), BlockStatus::Free);
            self.metrics.count_releasion(record.span.len());
            Some((slot, record.span))
        } else {
            self.metrics.unrecognized_frees.increment();
            None
        }
    }

    /// 先頭位置が`offset`の割当中のスパンを返す.
    pub fn live_span(&self, offset: usize) -> Option<Span> {
        let start = self.block_start(offset)?;
        let (_, record) = self.records.find_live(start)?;
        Some(record.span)
    }

    /// `index`番目のブロックの情報を返す.
    pub fn block_info(&self, index: usize) -> Option<BlockInfo> {
        let status = self.blocks.status(index)?;
        let offset = self.translator.block_offset(index)?;
        Some(BlockInfo {
            index,
            status,
            offset,
        })
    }

    /// ブロック情報テーブルを返す.
    pub fn blocks(&self) -> &BlockTable {
        &self.blocks
    }

    /// 割当情報テーブルを返す.
    pub fn records(&self) -> &AllocationTable {
        &self.records
    }

    /// アドレス変換用の構造体を返す.
    pub fn translator(&self) -> &AddressTranslator {
        &self.translator
    }

    /// メタデータの配置を返す.
    pub fn layout(&self) -> &MetadataLayout {
        &self.layout
    }

    /// アロケータ用のメトリクスを返す.
    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    // `offset`がブロックの先頭を指している場合に、そのブロックのインデックスを返す.
    fn block_start(&self, offset: usize) -> Option<usize> {
        if self.translator.block_size().is_aligned(offset) {
            self.translator.block_index(offset)
        } else {
            None
        }
    }

    // `required`個の連続した空きブロックを末尾側から探し、その先頭インデックスを返す.
    fn find_free_run(&self, required: usize, excluded: &Range<usize>) -> Option<usize> {
        debug_assert!(required > 0);
        let is_available = |i: usize| self.blocks.is_free(i) && !excluded.contains(&i);
        let mut top = self.blocks.len();
        while top >= required {
            let bottom = top - required;
            match (bottom..top).rev().find(|&i| !is_available(i)) {
                None => return Some(bottom),
                Some(blocked) => top = blocked,
            }
        }
        None
    }

    // 次の割当情報レコードの格納先スロットと、その格納先となるブロック群を決定する.
    //
    // 割当情報テーブルがバッファ内にある場合、格納先のブロックは
    // 割当済みであってはならない.
    fn plan_record_slot(&self) -> Result<(usize, Range<usize>)> {
        let slot = self.records.next_slot();
        if let Some(bytes) = self.layout.record_bytes(slot) {
            let blocks = track_assert_some!(
                self.translator.covering_blocks(bytes),
                ErrorKind::MetadataFull,
                "Allocation table reached the end of the pool: slot={}",
                slot
            );
            for i in blocks.clone() {
                track_assert!(
                    self.blocks.status(i) != Some(BlockStatus::Alloced),
                    ErrorKind::MetadataFull,
                    "Allocation table cannot grow into block {}",
                    i
                );
            }
            Ok((slot, blocks))
        } else {
            if let Some(max) = self.max_records {
                track_assert!(slot < max, ErrorKind::MetadataFull; slot, max);
            }
            Ok((slot, 0..0))
        }
    }

    // 割り当てたスパンを割当情報テーブルに登録し、格納先のブロック群を`System`にする.
    fn register(&mut self, span: Span, slot: usize, table_blocks: Range<usize>) -> Result<()> {
        track_assert!(
            span.start < span.end && span.end <= self.translator.block_count(),
            ErrorKind::InvalidInput;
            span.start,
            span.end
        );
        let offset = track_assert_some!(
            self.translator.block_offset(span.start),
            ErrorKind::InvalidInput
        );
        let inserted = track!(self.records.insert(offset, span))?;
        track_assert_eq!(inserted, slot, ErrorKind::InconsistentState);

        if !table_blocks.is_empty() {
            self.blocks.mark(table_blocks, BlockStatus::System);
            self.metrics
                .system_blocks
                .set(self.blocks.count(BlockStatus::System) as f64);
        }
        Ok(())
    }
}
