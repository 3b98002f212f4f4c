//! [Prometheus][prometheus]用のメトリクス.
//!
//! [prometheus]: https://prometheus.io/
use prometrics::metrics::{Counter, Gauge, MetricBuilder};

use crate::block::Alignment;

/// アロケータのメトリクス.
#[derive(Debug, Clone)]
pub struct AllocatorMetrics {
    pub(crate) inserted_free_blocks: Counter,
    pub(crate) removed_free_blocks: Counter,
    pub(crate) allocated_blocks: Counter,
    pub(crate) allocated_bytes: Counter,
    pub(crate) released_blocks: Counter,
    pub(crate) released_bytes: Counter,
    pub(crate) merged_free_blocks: Counter,
    pub(crate) nospace_failures: Counter,
    pub(crate) invalid_handles: Counter,
    pub(crate) capacity_bytes: Gauge,
    pub(crate) alignment: Alignment,
}
impl AllocatorMetrics {
    /// インデックスに挿入された空きブロックの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// memarena_allocator_inserted_free_blocks_total <COUNTER>
    /// ```
    pub fn inserted_free_blocks(&self) -> u64 {
        self.inserted_free_blocks.value() as u64
    }

    /// インデックスから削除された空きブロックの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// memarena_allocator_removed_free_blocks_total <COUNTER>
    /// ```
    pub fn removed_free_blocks(&self) -> u64 {
        self.removed_free_blocks.value() as u64
    }

    /// 現在の空きブロックインデックスの長さ.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// memarena_allocator_inserted_free_blocks_total - memarena_allocator_removed_free_blocks_total
    /// ```
    pub fn free_list_len(&self) -> usize {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.removed_free_blocks();
        let inc = self.inserted_free_blocks();
        (inc - dec) as usize
    }

    /// ブロックの割当回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// memarena_allocator_allocated_blocks_total <COUNTER>
    /// ```
    pub fn allocated_blocks(&self) -> u64 {
        self.allocated_blocks.value() as u64
    }

    /// これまでに割り当てたペイロードのバイト数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// memarena_allocator_allocated_bytes_total <COUNTER>
    /// ```
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes.value() as u64
    }

    /// ブロックの解放回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// memarena_allocator_released_blocks_total <COUNTER>
    /// ```
    pub fn released_blocks(&self) -> u64 {
        self.released_blocks.value() as u64
    }

    /// これまでに解放されたペイロードのバイト数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// memarena_allocator_released_bytes_total <COUNTER>
    /// ```
    pub fn released_bytes(&self) -> u64 {
        self.released_bytes.value() as u64
    }

    /// コアレッシングで隣接ブロックに吸収された空きブロックの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// memarena_allocator_merged_free_blocks_total <COUNTER>
    /// ```
    pub fn merged_free_blocks(&self) -> u64 {
        self.merged_free_blocks.value() as u64
    }

    /// 空き領域不足による割当失敗回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// memarena_allocator_nospace_failures_total <COUNTER>
    /// ```
    pub fn nospace_failures(&self) -> u64 {
        self.nospace_failures.value() as u64
    }

    /// 不正なハンドルが検出された回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// memarena_allocator_invalid_handles_total <COUNTER>
    /// ```
    pub fn invalid_handles(&self) -> u64 {
        self.invalid_handles.value() as u64
    }

    /// アリーナの容量.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// memarena_allocator_capacity_bytes <GAUGE>
    /// ```
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes.value() as u64
    }

    /// アリーナの使用量.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// memarena_allocator_allocated_bytes_total - memarena_allocator_released_bytes_total
    /// ```
    pub fn usage_bytes(&self) -> u64 {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.released_bytes();
        let inc = self.allocated_bytes();
        inc - dec
    }

    /// 要求サイズの丸めに使用されるアライメント単位を返す.
    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    pub(crate) fn new(builder: &MetricBuilder, capacity: u64, alignment: Alignment) -> Self {
        let mut builder = builder.clone();
        builder.namespace("memarena").subsystem("allocator");
        AllocatorMetrics {
            inserted_free_blocks: builder
                .counter("inserted_free_blocks_total")
                .help("Number of free blocks inserted into the index")
                .finish()
                .expect("Never fails"),
            removed_free_blocks: builder
                .counter("removed_free_blocks_total")
                .help("Number of free blocks removed from the index")
                .finish()
                .expect("Never fails"),
            allocated_blocks: builder
                .counter("allocated_blocks_total")
                .help("Number of allocated blocks")
                .finish()
                .expect("Never fails"),
            allocated_bytes: builder
                .counter("allocated_bytes_total")
                .help("Number of allocated payload bytes")
                .finish()
                .expect("Never fails"),
            released_blocks: builder
                .counter("released_blocks_total")
                .help("Number of released blocks")
                .finish()
                .expect("Never fails"),
            released_bytes: builder
                .counter("released_bytes_total")
                .help("Number of released payload bytes")
                .finish()
                .expect("Never fails"),
            merged_free_blocks: builder
                .counter("merged_free_blocks_total")
                .help("Number of free blocks absorbed by coalescing")
                .finish()
                .expect("Never fails"),
            nospace_failures: builder
                .counter("nospace_failures_total")
                .help("Number of allocation failures caused by no available space")
                .finish()
                .expect("Never fails"),
            invalid_handles: builder
                .counter("invalid_handles_total")
                .help("Number of rejected invalid handles")
                .finish()
                .expect("Never fails"),
            capacity_bytes: builder
                .gauge("capacity_bytes")
                .help("Capacity of the arena")
                .initial_value(capacity as f64)
                .finish()
                .expect("Never fails"),
            alignment,
        }
    }

    pub(crate) fn count_allocation(&self, payload_size: u64) {
        self.allocated_blocks.increment();
        self.allocated_bytes.add_u64(payload_size);
    }

    pub(crate) fn count_releasion(&self, payload_size: u64) {
        self.released_blocks.increment();
        self.released_bytes.add_u64(payload_size);
    }
}
