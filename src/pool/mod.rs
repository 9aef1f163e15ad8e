//! 固定長ブロックのメモリプール.
//!
//! このモジュールは、[Pool]と、その構成要素(ブロック情報テーブル、割当情報テーブル、
//! アロケータ、アドレス変換)を提供する.
//!
//! # メタデータの配置
//!
//! [MetadataPlacement::InBuffer]の場合(デフォルト)、バッファの先頭は以下のように使用される:
//!
//! ```text
//! [ヘッダ][ブロック情報 * ブロック数][(ブロック境界まで未使用)][割当情報 * レコード数]...[利用者用のブロック群]
//! ```
//!
//! - ヘッダとブロック情報テーブルを格納するブロックの数は
//!   `(FULL_HEADER_SIZE + ブロック数 * BLOCK_RECORD_SIZE) / ブロックサイズ + 1`
//! - その直後のブロックが割当情報テーブルの先頭となる
//! - これらのブロックは全て`BlockStatus::System`となる
//! - 割当情報テーブルは、レコードの増加に伴って後続のブロックへと拡張される
//!
//! 各値はビッグエンディアンでエンコードされ、状態が変化する度に書き戻される.
//!
//! [Pool]: ./struct.Pool.html
//! [MetadataPlacement::InBuffer]: ./enum.MetadataPlacement.html
use slog::Logger;
use std::ops::Range;
use std::ptr::NonNull;
use trackable::error::ErrorKindExt;

pub use self::address::AddressTranslator;
pub use self::allocation_table::{AllocationRecord, AllocationTable, ALLOCATION_RECORD_SIZE};
pub use self::allocator::{Allocation, BlockAllocator};
pub use self::block_table::{BlockInfo, BlockStatus, BlockTable, BLOCK_RECORD_SIZE};
pub use self::builder::PoolBuilder;
pub use self::header::{PoolHeader, FULL_HEADER_SIZE};
pub use self::layout::{MetadataLayout, MetadataPlacement};
pub use self::span::Span;

use crate::block::{AlignedBuffer, BlockSize};
use crate::metrics::PoolMetrics;
use crate::{Error, ErrorKind, Result};

mod address;
mod allocation_table;
mod allocator;
mod block_table;
mod builder;
mod header;
mod layout;
mod span;

/// バッファ内に格納されるメタデータの先頭に書き込まれるマジックナンバー.
///
/// "**B**loc**K** **P**oo**L**"の略.
pub const MAGIC_NUMBER: [u8; 4] = *b"bkpl";

/// メタデータフォーマットの現在のメジャーバージョン.
///
/// メジャーバージョンが異なるメタデータ同士の形式には互換性が無い.
pub const MAJOR_VERSION: u16 = 1;

/// メタデータフォーマットの現在のマイナーバージョン.
///
/// マイナーバージョンには、後方互換性がある.
pub const MINOR_VERSION: u16 = 1;

/// 固定長ブロックのメモリプール.
///
/// 作成時に確保した一つのバッファを`block_count`個のブロックに分割し、
/// 割当要求に対して連続したブロック列(スパン)の先頭アドレスを返す.
///
/// `Pool`は`Send`だが`Sync`ではない.
/// 状態を変更する操作は全て`&mut self`を要求するため、
/// 複数スレッドから共有する場合には、プール全体を一つのロックで保護する必要がある.
///
/// プールが破棄(drop)されると、それまでに返した全てのアドレスは無効となる.
///
/// # Examples
///
/// ```
/// use blockpool::pool::{BlockStatus, Pool};
///
/// let mut pool = Pool::create(16, 256).unwrap();
/// let ptr = pool.alloc(300).unwrap();
/// assert_eq!(pool.index_for(ptr.as_ptr()), Some(14));
/// assert_eq!(pool.block_status(15), Some(BlockStatus::Alloced));
///
/// pool.bytes_mut(ptr.as_ptr()).unwrap()[..5].copy_from_slice(b"hello");
/// assert_eq!(&pool.bytes(ptr.as_ptr()).unwrap()[..5], b"hello");
///
/// pool.free(ptr.as_ptr());
/// assert_eq!(pool.block_status(15), Some(BlockStatus::Free));
/// ```
#[derive(Debug)]
pub struct Pool {
    header: PoolHeader,
    buffer: AlignedBuffer,
    allocator: BlockAllocator,
    logger: Logger,
}
impl Pool {
    /// デフォルト設定で、`block_size`バイトのブロックを`block_count`個持つプールを生成する.
    ///
    /// 設定を変更したい場合には[PoolBuilder]を使用すること.
    ///
    /// [PoolBuilder]: ./struct.PoolBuilder.html
    pub fn create(block_count: usize, block_size: usize) -> Result<Self> {
        track!(PoolBuilder::new().create(block_count, block_size))
    }

    pub(crate) fn new(
        header: PoolHeader,
        buffer: AlignedBuffer,
        allocator: BlockAllocator,
        logger: Logger,
    ) -> Result<Self> {
        track_assert_eq!(
            buffer.len(),
            allocator.translator().pool_size(),
            ErrorKind::InconsistentState
        );
        let mut pool = Pool {
            header,
            buffer,
            allocator,
            logger,
        };
        track!(pool.write_header())?;
        track!(pool.write_block_infos(0..pool.block_count()))?;
        Ok(pool)
    }

    /// プールのヘッダ情報を返す.
    ///
    /// `record_count`は、割当の度に更新される.
    pub fn header(&self) -> &PoolHeader {
        &self.header
    }

    /// プールのメトリクスを返す.
    pub fn metrics(&self) -> &PoolMetrics {
        self.allocator.metrics()
    }

    /// ブロックサイズを返す.
    pub fn block_size(&self) -> BlockSize {
        self.header.block_size
    }

    /// ブロック数を返す.
    pub fn block_count(&self) -> usize {
        self.header.block_count
    }

    /// プール全体のサイズ(バイト単位)を返す.
    pub fn pool_size(&self) -> usize {
        self.header.pool_size()
    }

    /// プールの先頭アドレスを返す.
    ///
    /// アドレスは`block_size`(ただし最大で`BlockSize::MAX_ALIGNMENT`)の境界に揃っている.
    pub fn base(&self) -> NonNull<u8> {
        self.buffer.base()
    }

    /// メタデータの格納場所を返す.
    pub fn placement(&self) -> MetadataPlacement {
        self.allocator.layout().placement()
    }

    /// `size`バイト分の領域を割り当て、その先頭アドレスを返す.
    ///
    /// 割り当てられる領域は、ブロックサイズの倍数に切り上げられる.
    /// 空きブロックの探索は、プールの末尾から先頭に向かって行われる.
    ///
    /// # Errors
    ///
    /// - `size`が`0`の場合には`ErrorKind::InvalidInput`
    /// - 十分な連続した空きブロックが存在しない場合には`ErrorKind::PoolFull`
    /// - 割当情報テーブルに空きがない場合には`ErrorKind::MetadataFull`
    /// - バッファ内のメタデータの更新に失敗した場合には`ErrorKind::InconsistentState`
    ///
    /// `InconsistentState`以外のエラー時には、プールの状態は変化しない.
    /// `InconsistentState`の場合、割り当てたスパンは解放されるが、
    /// 拡張済みの割当情報テーブル用のブロックは`System`のまま残る.
    pub fn alloc(&mut self, size: usize) -> Result<NonNull<u8>> {
        let allocation = match self.allocator.allocate(size) {
            Ok(allocation) => allocation,
            Err(e) => {
                if *e.kind() == ErrorKind::MetadataFull {
                    warn!(self.logger, "Allocation table is full"; "size" => size);
                } else {
                    debug!(self.logger, "Allocation failed: {}", e; "size" => size);
                }
                return Err(track!(e));
            }
        };
        let Allocation {
            span,
            slot,
            table_blocks,
        } = allocation;
        debug!(
            self.logger,
            "Allocated";
            "size" => size,
            "start" => span.start,
            "end" => span.end,
            "slot" => slot
        );

        self.header.record_count = self.allocator.records().len();
        let committed = track!(self.write_allocation(span, slot, table_blocks)).and_then(|()| {
            let offset = track_assert_some!(
                self.allocator.translator().block_offset(span.start),
                ErrorKind::InconsistentState
            );
            let ptr =
                track_assert_some!(self.buffer.ptr_at(offset), ErrorKind::InconsistentState);
            Ok(ptr)
        });
        match committed {
            Ok(ptr) => Ok(ptr),
            Err(e) => {
                warn!(
                    self.logger,
                    "Cannot commit the allocation: {}", e;
                    "start" => span.start,
                    "end" => span.end
                );
                let offset = span.start * self.block_size().as_usize();
                self.allocator.release(offset);
                Err(track!(Error::from(ErrorKind::InconsistentState.cause(e))))
            }
        }
    }

    /// `ptr`から始まる割当を解放する.
    ///
    /// `ptr`は`alloc`が返したアドレスである必要がある.
    /// ヌルポインタや、割当中の領域の先頭ではないアドレス(解放済みのものも含む)が
    /// 渡された場合には、何も行われない.
    pub fn free(&mut self, ptr: *const u8) {
        if ptr.is_null() {
            return;
        }
        let released = if let Some(offset) = self.buffer.offset_of(ptr) {
            self.allocator.release(offset)
        } else {
            self.allocator.metrics().unrecognized_frees.increment();
            None
        };

        let (slot, span) = if let Some(released) = released {
            released
        } else {
            debug!(self.logger, "Unrecognized free request"; "ptr" => format!("{:p}", ptr));
            return;
        };
        debug!(
            self.logger,
            "Released";
            "start" => span.start,
            "end" => span.end,
            "slot" => slot
        );

        let result = track!(self.write_block_infos(span.blocks()))
            .and_then(|()| track!(self.write_record(slot)));
        if let Err(e) = result {
            warn!(self.logger, "Cannot update the in-buffer metadata: {}", e);
        }
    }

    /// `ptr`から`size`バイトの範囲をゼロで埋める.
    ///
    /// `ptr`がヌルポインタの場合には何も行わない.
    ///
    /// # Errors
    ///
    /// 範囲がプールのバッファ内に収まっていない場合には、
    /// 種類が`ErrorKind::InvalidInput`のエラーが返される.
    pub fn clear(&mut self, ptr: *mut u8, size: usize) -> Result<()> {
        if ptr.is_null() {
            return Ok(());
        }
        let start = track_assert_some!(
            self.buffer.offset_of(ptr),
            ErrorKind::InvalidInput,
            "Out of the pool: {:p}",
            ptr
        );
        let end = track_assert_some!(start.checked_add(size), ErrorKind::InvalidInput);
        let bytes = track_assert_some!(
            self.buffer.bytes_mut(start..end),
            ErrorKind::InvalidInput,
            "Out of the pool: offset={}, size={}",
            start,
            size
        );
        for b in bytes {
            *b = 0;
        }
        Ok(())
    }

    /// `index`番目のブロックの先頭アドレスを返す.
    ///
    /// `index`が範囲外の場合には`None`が返される.
    pub fn block_for(&self, index: usize) -> Option<NonNull<u8>> {
        let offset = self.allocator.translator().block_offset(index)?;
        self.buffer.ptr_at(offset)
    }

    /// `ptr`を含むブロックのインデックスを返す.
    ///
    /// `ptr`がヌルポインタないしプールの範囲外の場合には`None`が返される.
    pub fn index_for(&self, ptr: *const u8) -> Option<usize> {
        if ptr.is_null() {
            return None;
        }
        let offset = self.buffer.offset_of(ptr)?;
        self.allocator.translator().block_index(offset)
    }

    /// `ptr`から始まる割当中のスパンを返す.
    pub fn span(&self, ptr: *const u8) -> Option<Span> {
        let offset = self.buffer.offset_of(ptr)?;
        self.allocator.live_span(offset)
    }

    /// `ptr`から始まる割当中の領域全体を返す.
    ///
    /// 領域のサイズは、割当時に要求されたサイズをブロックサイズに切り上げたもの.
    pub fn bytes(&self, ptr: *const u8) -> Option<&[u8]> {
        let range = self.span_bytes(ptr)?;
        self.buffer.bytes(range)
    }

    /// `ptr`から始まる割当中の領域全体を、書き込み可能な形で返す.
    pub fn bytes_mut(&mut self, ptr: *const u8) -> Option<&mut [u8]> {
        let range = self.span_bytes(ptr)?;
        self.buffer.bytes_mut(range)
    }

    /// `index`番目のブロックの状態を返す.
    pub fn block_status(&self, index: usize) -> Option<BlockStatus> {
        self.allocator.blocks().status(index)
    }

    /// 全ブロックの情報を、インデックス順に走査するイテレータを返す.
    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        (0..self.block_count()).filter_map(move |i| self.allocator.block_info(i))
    }

    /// 空きブロックの数を返す.
    pub fn free_blocks(&self) -> usize {
        self.allocator.blocks().count(BlockStatus::Free)
    }

    /// 割当済みブロックの数を返す.
    pub fn allocated_blocks(&self) -> usize {
        self.allocator.blocks().count(BlockStatus::Alloced)
    }

    /// メタデータ用に予約されているブロックの数を返す.
    pub fn system_blocks(&self) -> usize {
        self.allocator.blocks().count(BlockStatus::System)
    }

    /// 割当情報レコードを、スロット順に走査するイテレータを返す.
    ///
    /// 解放済みのレコードも含まれる.
    pub fn records(&self) -> impl Iterator<Item = &AllocationRecord> {
        self.allocator.records().iter()
    }

    /// これまでに使用された割当情報レコードのスロット数を返す.
    pub fn record_count(&self) -> usize {
        self.allocator.records().len()
    }

    /// バッファ内のメタデータ(先頭の`System`ブロック群)を返す.
    ///
    /// メタデータがバッファ外に保持されている場合には`None`が返される.
    pub fn metadata_bytes(&self) -> Option<&[u8]> {
        if self.placement() != MetadataPlacement::InBuffer {
            return None;
        }
        let end = self.system_blocks() * self.block_size().as_usize();
        self.buffer.bytes(0..end)
    }

    pub(crate) fn logger(&self) -> &Logger {
        &self.logger
    }

    fn span_bytes(&self, ptr: *const u8) -> Option<Range<usize>> {
        let span = self.span(ptr)?;
        let translator = self.allocator.translator();
        let start = translator.block_offset(span.start)?;
        Some(start..start + span.len() * translator.block_size().as_usize())
    }

    fn write_header(&mut self) -> Result<()> {
        if self.placement() != MetadataPlacement::InBuffer {
            return Ok(());
        }
        let bytes = track_assert_some!(
            self.buffer.bytes_mut(0..FULL_HEADER_SIZE),
            ErrorKind::InconsistentState
        );
        track!(self.header.write_to(bytes))?;
        Ok(())
    }

    fn write_allocation(
        &mut self,
        span: Span,
        slot: usize,
        table_blocks: Range<usize>,
    ) -> Result<()> {
        track!(self.write_header())?;
        track!(self.write_block_infos(span.blocks()))?;
        track!(self.write_block_infos(table_blocks))?;
        track!(self.write_record(slot))?;
        Ok(())
    }

    fn write_block_infos(&mut self, blocks: Range<usize>) -> Result<()> {
        let range = match self.allocator.layout().block_table_bytes(blocks.clone()) {
            Some(range) => range,
            None => return Ok(()),
        };
        let mut writer = track_assert_some!(
            self.buffer.bytes_mut(range),
            ErrorKind::InconsistentState
        );
        for index in blocks {
            let info = track_assert_some!(
                self.allocator.block_info(index),
                ErrorKind::InconsistentState;
                index
            );
            track!(info.write_to(&mut writer))?;
        }
        Ok(())
    }

    fn write_record(&mut self, slot: usize) -> Result<()> {
        let range = match self.allocator.layout().record_bytes(slot) {
            Some(range) => range,
            None => return Ok(()),
        };
        let record = *track_assert_some!(
            self.allocator.records().get(slot),
            ErrorKind::InconsistentState;
            slot
        );
        let bytes = track_assert_some!(
            self.buffer.bytes_mut(range),
            ErrorKind::InconsistentState;
            slot
        );
        track!(record.write_to(bytes))?;
        Ok(())
    }
}
