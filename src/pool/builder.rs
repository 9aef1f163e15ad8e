use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};
use uuid::Uuid;

use crate::block::{AlignedBuffer, BlockSize};
use crate::metrics::PoolMetrics;
use crate::pool::address::AddressTranslator;
use crate::pool::allocator::BlockAllocator;
use crate::pool::layout::{MetadataLayout, MetadataPlacement};
use crate::pool::{Pool, PoolHeader, MAJOR_VERSION, MINOR_VERSION};
use crate::{ErrorKind, Result};

/// `Pool`のビルダ.
#[derive(Debug, Clone)]
pub struct PoolBuilder {
    placement: MetadataPlacement,
    max_allocation_records: Option<usize>,
    instance_uuid: Option<Uuid>,
    logger: Logger,
    metrics: MetricBuilder,
}
impl PoolBuilder {
    /// 新しい`PoolBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        PoolBuilder {
            placement: MetadataPlacement::default(),
            max_allocation_records: None,
            instance_uuid: None,
            logger: Logger::root(Discard, o!()),
            metrics: MetricBuilder::new(),
        }
    }

    /// メタデータの格納場所を設定する.
    ///
    /// デフォルト値は`MetadataPlacement::InBuffer`.
    pub fn metadata_placement(&mut self, placement: MetadataPlacement) -> &mut Self {
        self.placement = placement;
        self
    }

    /// 割当情報レコードの最大数を設定する.
    ///
    /// `MetadataPlacement::External`の場合にのみ有効で、
    /// 上限に達した状態で新たな割当を行おうとすると`ErrorKind::MetadataFull`となる.
    /// (`InBuffer`の場合の上限は、割当情報テーブルが拡張可能なブロックの数によって決まる)
    ///
    /// デフォルトでは上限なし.
    pub fn max_allocation_records(&mut self, max: usize) -> &mut Self {
        self.max_allocation_records = Some(max);
        self
    }

    /// プールのインスタンスを識別するためのUUIDを設定する.
    ///
    /// 本メソッドが呼ばれていない場合は、ランダムなUUIDが割り当てられる.
    pub fn instance_uuid(&mut self, uuid: Uuid) -> &mut Self {
        self.instance_uuid = Some(uuid);
        self
    }

    /// プール用の logger を登録する.
    ///
    /// デフォルトでは、ログは出力されない.
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// `block_size`バイトのブロックを`block_count`個持つプールを新規に生成する.
    ///
    /// # Errors
    ///
    /// - `block_count`ないし`block_size`が`0`の場合や、
    ///   メタデータがプールに収まらない場合には`ErrorKind::InvalidInput`
    /// - バッファが確保できない場合(`block_count * block_size`のオーバーフローを含む)には
    ///   `ErrorKind::BufferUnavailable`
    ///
    /// # 注意
    ///
    /// バッファは確保直後に全体がゼロ埋めされる.
    /// メモリのオーバーコミットが有効な環境では、確保自体は成功しても、
    /// ゼロ埋めの時点で物理メモリが不足してプロセスが強制終了される可能性がある.
    /// (この場合`ErrorKind::BufferUnavailable`は返されない)
    pub fn create(&self, block_count: usize, block_size: usize) -> Result<Pool> {
        track_assert!(block_count > 0, ErrorKind::InvalidInput; block_count, block_size);
        let block_size = track!(BlockSize::new(block_size))?;
        let pool_size = track_assert_some!(
            block_count.checked_mul(block_size.as_usize()),
            ErrorKind::BufferUnavailable,
            "Too large pool: block_count={}, block_size={}",
            block_count,
            block_size.as_usize()
        );

        let layout = track!(MetadataLayout::plan(
            self.placement,
            block_size,
            block_count
        ))?;
        let buffer = track!(AlignedBuffer::new(pool_size, block_size))?;

        let translator = AddressTranslator::new(block_size, block_count);
        let metrics = PoolMetrics::new(&self.metrics, block_size);
        let max_records = match self.placement {
            MetadataPlacement::InBuffer => None,
            MetadataPlacement::External => self.max_allocation_records,
        };
        let allocator = BlockAllocator::new(translator, layout, max_records, metrics);

        let header = PoolHeader {
            major_version: MAJOR_VERSION,
            minor_version: MINOR_VERSION,
            instance_uuid: self.instance_uuid.unwrap_or_else(Uuid::new_v4),
            block_size,
            block_count,
            allocation_table_offset: layout.allocation_table_offset().unwrap_or(0),
            record_count: 0,
        };
        let logger = self.logger.new(o!(
            "pool" => header.instance_uuid.to_string(),
            "block_count" => block_count,
            "block_size" => block_size.as_usize()
        ));
        let pool = track!(Pool::new(header, buffer, allocator, logger))?;
        info!(
            pool.logger(),
            "Pool created";
            "placement" => format!("{:?}", self.placement),
            "system_blocks" => pool.system_blocks()
        );
        Ok(pool)
    }
}
impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
