//! [Prometheus][prometheus]用のメトリクス.
//!
//! [prometheus]: https://prometheus.io/
use prometrics::metrics::{Counter, Gauge, MetricBuilder};

use crate::block::BlockSize;

/// [`Pool`]のメトリクス.
///
/// [`Pool`]: ../pool/struct.Pool.html
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub(crate) capacity_bytes: Gauge,
    pub(crate) system_blocks: Gauge,
    pub(crate) allocated_spans: Counter,
    pub(crate) allocated_bytes: Counter,
    pub(crate) released_spans: Counter,
    pub(crate) released_bytes: Counter,
    pub(crate) nospace_failures: Counter,
    pub(crate) metadata_full_failures: Counter,
    pub(crate) unrecognized_frees: Counter,
    pub(crate) block_size: BlockSize,
}
impl PoolMetrics {
    /// プールの容量(バイト単位).
    ///
    /// メタデータ用のブロックも含む.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockpool_pool_capacity_bytes <GAUGE>
    /// ```
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes.value() as u64
    }

    /// メタデータ用に予約されているブロックの数.
    ///
    /// 割当情報テーブルが拡張されると増加する.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockpool_pool_system_blocks <GAUGE>
    /// ```
    pub fn system_blocks(&self) -> u64 {
        self.system_blocks.value() as u64
    }

    /// スパンの割当回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockpool_pool_allocated_spans_total <COUNTER>
    /// ```
    pub fn allocated_spans(&self) -> u64 {
        self.allocated_spans.value() as u64
    }

    /// これまでに割り当てたスパンのバイト数(ブロック単位に切り上げた値).
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockpool_pool_allocated_bytes_total <COUNTER>
    /// ```
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes.value() as u64
    }

    /// スパンの解放回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockpool_pool_released_spans_total <COUNTER>
    /// ```
    pub fn released_spans(&self) -> u64 {
        self.released_spans.value() as u64
    }

    /// これまでに解放されたスパンのバイト数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockpool_pool_released_bytes_total <COUNTER>
    /// ```
    pub fn released_bytes(&self) -> u64 {
        self.released_bytes.value() as u64
    }

    /// 空きブロック不足による割当失敗回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockpool_pool_nospace_failures_total <COUNTER>
    /// ```
    pub fn nospace_failures(&self) -> u64 {
        self.nospace_failures.value() as u64
    }

    /// 割当情報テーブルの容量不足による割当失敗回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockpool_pool_metadata_full_failures_total <COUNTER>
    /// ```
    pub fn metadata_full_failures(&self) -> u64 {
        self.metadata_full_failures.value() as u64
    }

    /// 割当済みとして登録されていないポインタに対する解放要求の数.
    ///
    /// 二重解放もここに含まれる.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockpool_pool_unrecognized_frees_total <COUNTER>
    /// ```
    pub fn unrecognized_frees(&self) -> u64 {
        self.unrecognized_frees.value() as u64
    }

    /// 利用者に割り当てられているバイト数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockpool_pool_allocated_bytes_total - blockpool_pool_released_bytes_total
    /// ```
    pub fn usage_bytes(&self) -> u64 {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.released_bytes();
        let inc = self.allocated_bytes();
        inc - dec
    }

    /// 現在割当中のスパンの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockpool_pool_allocated_spans_total - blockpool_pool_released_spans_total
    /// ```
    pub fn live_spans(&self) -> u64 {
        let dec = self.released_spans();
        let inc = self.allocated_spans();
        inc - dec
    }

    pub(crate) fn new(builder: &MetricBuilder, block_size: BlockSize) -> Self {
        let mut builder = builder.clone();
        builder.namespace("blockpool").subsystem("pool");
        PoolMetrics {
            capacity_bytes: builder
                .gauge("capacity_bytes")
                .help("Capacity of the pool buffer")
                .finish()
                .expect("Never fails"),
            system_blocks: builder
                .gauge("system_blocks")
                .help("Number of blocks reserved for the pool metadata")
                .finish()
                .expect("Never fails"),
            allocated_spans: builder
                .counter("allocated_spans_total")
                .help("Number of allocated spans")
                .finish()
                .expect("Never fails"),
            allocated_bytes: builder
                .counter("allocated_bytes_total")
                .help("Number of allocated bytes")
                .finish()
                .expect("Never fails"),
            released_spans: builder
                .counter("released_spans_total")
                .help("Number of released spans")
                .finish()
                .expect("Never fails"),
            released_bytes: builder
                .counter("released_bytes_total")
                .help("Number of released bytes")
                .finish()
                .expect("Never fails"),
            nospace_failures: builder
                .counter("nospace_failures_total")
                .help("Number of allocation failures caused by no available blocks")
                .finish()
                .expect("Never fails"),
            metadata_full_failures: builder
                .counter("metadata_full_failures_total")
                .help("Number of allocation failures caused by a full allocation table")
                .finish()
                .expect("Never fails"),
            unrecognized_frees: builder
                .counter("unrecognized_frees_total")
                .help("Number of free requests for pointers without a live allocation")
                .finish()
                .expect("Never fails"),
            block_size,
        }
    }

    pub(crate) fn count_allocation(&self, blocks: usize) {
        self.allocated_spans.increment();
        self.allocated_bytes
            .add_u64((self.block_size.as_usize() * blocks) as u64);
    }

    pub(crate) fn count_releasion(&self, blocks: usize) {
        self.released_spans.increment();
        self.released_bytes
            .add_u64((self.block_size.as_usize() * blocks) as u64);
    }
}
