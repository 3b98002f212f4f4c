use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};
use uuid::Uuid;

use crate::allocator::free_block::FreeBlock;
use crate::allocator::free_index::FreeBlockIndex;
use crate::allocator::Allocator;
use crate::arena::{Address, Arena, BlockHeader, BlockState, BLOCK_HEADER_SIZE, MAX_ARENA_SIZE};
use crate::block::Alignment;
use crate::metrics::AllocatorMetrics;
use crate::region::{HeapRegion, RegionMemory};
use crate::{ErrorKind, Result};

/// `Allocator`のビルダ.
#[derive(Debug, Clone)]
pub struct AllocatorBuilder {
    alignment: Alignment,
    instance_uuid: Option<Uuid>,
    metrics: MetricBuilder,
    logger: Logger,
}
impl AllocatorBuilder {
    /// デフォルト設定で`AllocatorBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        AllocatorBuilder {
            alignment: Alignment::default(),
            instance_uuid: None,
            metrics: MetricBuilder::new(),
            logger: Logger::root(Discard, o!()),
        }
    }

    /// 要求サイズの丸めに使用するアライメント単位を設定する.
    ///
    /// デフォルト値は`Alignment::min()`.
    pub fn alignment(&mut self, alignment: Alignment) -> &mut Self {
        self.alignment = alignment;
        self
    }

    /// アリーナの特定のインスタンスを識別するためのUUIDを設定する.
    ///
    /// ここで指定した値は、構築されたアロケータが発行する全てのハンドルに埋め込まれ、
    /// 別のアリーナに対するハンドルの誤用の検出に使用される.
    ///
    /// 本メソッドが呼ばれていない場合は、ランダムなUUIDが割り当てられる.
    pub fn instance_uuid(&mut self, uuid: Uuid) -> &mut Self {
        self.instance_uuid = Some(uuid);
        self
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// ロガーを登録する.
    ///
    /// デフォルト値は`Logger::root(Discard, o!())`.
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// 指定された領域を管理する`Allocator`を構築する.
    ///
    /// 領域の全体が、一つの空きブロックとして初期化される.
    /// 領域の既存のバイト列が読み取られることはない.
    ///
    /// # Errors
    ///
    /// 以下の場合には、種類が`ErrorKind::InvalidInput`のエラーが返される:
    ///
    /// - 領域の容量がヘッダ一つとアライメント単位一つ分に満たない
    /// - 領域の容量が`MAX_ARENA_SIZE`を超えている
    pub fn build<R>(&self, region: R) -> Result<Allocator<R>>
    where
        R: RegionMemory,
    {
        let capacity = region.capacity();
        let min_capacity = u64::from(BLOCK_HEADER_SIZE) + u64::from(self.alignment.as_u16());
        track_assert!(
            capacity >= min_capacity,
            ErrorKind::InvalidInput,
            "Too small capacity: {} (minimum={})",
            capacity,
            min_capacity
        );
        track_assert!(
            capacity <= MAX_ARENA_SIZE,
            ErrorKind::InvalidInput,
            "Too large capacity: {}",
            capacity
        );

        let uuid = self.instance_uuid.unwrap_or_else(Uuid::new_v4);
        let mut arena = Arena::new(region, uuid);

        // 領域の全体を一つの空きブロックとして初期化する
        let initial = FreeBlock::new(Address::from(0), capacity);
        track!(arena.write_block_header(
            initial.start(),
            &BlockHeader::new(initial.payload_len(), BlockState::Free)
        ))?;

        let metrics = AllocatorMetrics::new(&self.metrics, capacity, self.alignment);
        let mut free_index = FreeBlockIndex::new();
        free_index.insert(initial);
        metrics.inserted_free_blocks.increment();

        let logger = self.logger.new(o!("arena" => uuid.to_string()));
        info!(logger, "Allocator initialized";
              "capacity" => capacity, "alignment" => self.alignment.as_u16());
        Ok(Allocator::new(
            arena,
            free_index,
            self.alignment,
            metrics,
            logger,
        ))
    }

    /// `capacity`バイトの領域をヒープから確保した上で`Allocator`を構築する.
    pub fn build_with_capacity(&self, capacity: u64) -> Result<Allocator<HeapRegion>> {
        track_assert!(
            capacity <= MAX_ARENA_SIZE,
            ErrorKind::InvalidInput,
            "Too large capacity: {}",
            capacity
        );
        track!(self.build(HeapRegion::reserve(capacity)))
    }
}
impl Default for AllocatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
