//! ブロックの割当・解放・再割当を担当するアロケータ本体.
//!
//! # 割当戦略
//!
//! このアロケータは"smallest-only"戦略を採用している.
//!
//! 新規割当要求が発行された際には、全空きブロックの中でペイロード長が最小のもの
//! **だけ** が検査され、それが要求サイズに満たない場合には、
//! より大きな空きブロックが存在していても割当は失敗する.
//!
//! 要求サイズを満たす空き領域を探索する、いわゆるベストフィット戦略とは
//! 異なる点に注意が必要である.
//!
//! # ブロックの分割と結合
//!
//! 割当時に、選択された空きブロックに要求サイズとヘッダ一つ、
//! およびアライメント単位一つ分以上の余裕がある場合には、ブロックは分割され、
//! 残余部分が新しい空きブロックとしてインデックスに戻される.
//!
//! 解放時には、解放対象のブロックとアドレス上隣接する空きブロックが即座に結合されるため、
//! 隣接する二つの空きブロックが同時に存在することはない.
pub use self::builder::AllocatorBuilder;

mod builder;
mod free_block;
mod free_index;

use slog::Logger;

use self::free_block::FreeBlock;
use self::free_index::FreeBlockIndex;
use crate::arena::{Address, Arena, ArenaSnapshot, BlockHeader, BlockState, BLOCK_HEADER_SIZE};
use crate::block::Alignment;
use crate::handle::MemHandle;
use crate::metrics::AllocatorMetrics;
use crate::region::{HeapRegion, RegionMemory};
use crate::{ErrorKind, Result};

/// 単一の連続メモリ領域を対象とするヒープアロケータ.
///
/// 割当の単位は"バイト"であり、要求サイズはアライメント単位に切り上げられる.
///
/// 割当済みのペイロードには[`payload`]および[`payload_mut`]でアクセスする.
///
/// [`payload`]: #method.payload
/// [`payload_mut`]: #method.payload_mut
#[derive(Debug)]
pub struct Allocator<R> {
    arena: Arena<R>,
    free_index: FreeBlockIndex,
    alignment: Alignment,
    metrics: AllocatorMetrics,
    logger: Logger,
}
impl Allocator<HeapRegion> {
    /// デフォルト設定で、`capacity`バイトの領域をヒープから確保してアロケータを構築する.
    pub fn with_capacity(capacity: u64) -> Result<Self> {
        track!(AllocatorBuilder::new().build_with_capacity(capacity))
    }
}
impl<R> Allocator<R>
where
    R: RegionMemory,
{
    pub(crate) fn new(
        arena: Arena<R>,
        free_index: FreeBlockIndex,
        alignment: Alignment,
        metrics: AllocatorMetrics,
        logger: Logger,
    ) -> Self {
        Allocator {
            arena,
            free_index,
            alignment,
            metrics,
            logger,
        }
    }

    /// ブロック一つ辺りのメタデータ(ヘッダ)のサイズを返す.
    ///
    /// 利用者はこの値を用いて、領域を過不足なく使い切る要求サイズを計算できる.
    pub fn metadata_size(&self) -> u64 {
        u64::from(BLOCK_HEADER_SIZE)
    }

    /// アリーナの容量(バイト単位)を返す.
    pub fn capacity(&self) -> u64 {
        self.arena.capacity()
    }

    /// アロケータ用のメトリクスを返す.
    pub fn metrics(&self) -> &AllocatorMetrics {
        &self.metrics
    }

    /// `size`バイト分のブロックの割当を行う.
    ///
    /// 要求サイズはアライメント単位に切り上げられた上で処理され、
    /// 割当に成功した場合には、ペイロード全体が0クリアされた状態のハンドルが返される.
    ///
    /// 十分な空きブロックが存在しない場合には`None`が返される.
    /// なお、検査対象となるのはペイロード長が最小の空きブロックのみである
    /// ([モジュールドキュメント](index.html)を参照).
    ///
    /// `size == 0`の場合には、常に`None`が返される(これはエラーではない).
    pub fn alloc(&mut self, size: u64) -> Option<MemHandle> {
        if size == 0 {
            return None;
        }
        if size > self.arena.capacity() {
            self.metrics.nospace_failures.increment();
            return None;
        }
        let size = self.alignment.ceil_align(size);

        let smallest = if let Some(block) = self.free_index.smallest() {
            block
        } else {
            debug!(self.logger, "No free block"; "requested" => size);
            self.metrics.nospace_failures.increment();
            return None;
        };
        if smallest.payload_len() < size {
            debug!(self.logger, "The smallest free block is insufficient";
                   "requested" => size, "smallest" => smallest.payload_len());
            self.metrics.nospace_failures.increment();
            return None;
        }
        self.delete_free_block(smallest);

        // 残余部分に別のブロックを構成できる場合のみ分割する
        let min_rest = u64::from(BLOCK_HEADER_SIZE) + u64::from(self.alignment.as_u16());
        let block = if smallest.payload_len() >= size + min_rest {
            let (carved, rest) = smallest.carve(size);
            self.write_header(rest.start(), rest.payload_len(), BlockState::Free);
            self.add_free_block(rest);
            carved
        } else {
            smallest
        };

        self.write_header(block.start(), block.payload_len(), BlockState::Used);
        let payload = block.start() + u64::from(BLOCK_HEADER_SIZE);
        self.arena.zero_payload(payload, block.payload_len());
        self.metrics.count_allocation(block.payload_len());
        Some(MemHandle::new(self.arena.instance_uuid(), payload))
    }

    /// 割当済みブロックの解放を行う.
    ///
    /// 解放されたブロックは、アドレス上隣接する空きブロックと即座に結合された上で、
    /// 空きブロックとして再利用可能になる.
    ///
    /// # Errors
    ///
    /// 対象ブロックが「以前に割当済み」かつ「未解放」ではない場合や、
    /// ハンドルがこのアリーナに属していない場合には、
    /// 種類が`ErrorKind::InvalidPointer`のエラーが返され、状態は一切変更されない.
    pub fn free(&mut self, handle: MemHandle) -> Result<()> {
        let (start, header) = track!(self.resolve_used(handle))?;
        let block = FreeBlock::new(start, header.block_size());

        let before = self.free_index.len();
        let merged = self.free_index.merge_adjacent(block);
        let absorbed = (before - self.free_index.len()) as u64;
        self.metrics.removed_free_blocks.add_u64(absorbed);
        self.metrics.merged_free_blocks.add_u64(absorbed);

        self.write_header(merged.start(), merged.payload_len(), BlockState::Free);
        self.add_free_block(merged);
        self.metrics.count_releasion(header.payload_size);
        Ok(())
    }

    /// 割当済みブロックのサイズ変更を行う.
    ///
    /// - `handle`が`None`の場合には、`alloc(size)`と等価
    /// - `size == 0`の場合には、`free`を行った上で`Ok(None)`を返す
    /// - 現在のペイロード長が既に`size`以上の場合には、ハンドルがそのまま返される
    ///   (ブロックの縮小や余剰分の回収は行われない)
    /// - それ以外の場合には、新規ブロックを割り当てて旧ペイロードの内容をコピーし、
    ///   旧ブロックを解放する. 新規割当に失敗した場合には`Ok(None)`が返されるが、
    ///   旧ブロックは無傷のまま残っており、引き続き利用可能である
    ///
    /// # Errors
    ///
    /// `free`と同様に、不正なハンドルに対しては
    /// 種類が`ErrorKind::InvalidPointer`のエラーが返される.
    pub fn realloc(&mut self, handle: Option<MemHandle>, size: u64) -> Result<Option<MemHandle>> {
        let handle = if let Some(handle) = handle {
            handle
        } else {
            return Ok(self.alloc(size));
        };
        if size == 0 {
            track!(self.free(handle))?;
            return Ok(None);
        }

        let (_, header) = track!(self.resolve_used(handle))?;
        if header.payload_size >= size {
            return Ok(Some(handle));
        }

        let new_handle = if let Some(new_handle) = self.alloc(size) {
            new_handle
        } else {
            return Ok(None);
        };
        self.arena
            .copy_payload(handle.address(), new_handle.address(), header.payload_size);
        track!(self.free(handle))?;
        Ok(Some(new_handle))
    }

    /// ハンドルが指すペイロードへの参照を返す.
    ///
    /// # Errors
    ///
    /// 不正なハンドルに対しては、種類が`ErrorKind::InvalidPointer`のエラーが返される.
    pub fn payload(&self, handle: MemHandle) -> Result<&[u8]> {
        let (_, header) = track!(self.resolve_used(handle))?;
        Ok(self
            .arena
            .payload_bytes(handle.address(), header.payload_size))
    }

    /// ハンドルが指すペイロードへの可変参照を返す.
    ///
    /// # Errors
    ///
    /// 不正なハンドルに対しては、種類が`ErrorKind::InvalidPointer`のエラーが返される.
    pub fn payload_mut(&mut self, handle: MemHandle) -> Result<&mut [u8]> {
        let (_, header) = track!(self.resolve_used(handle))?;
        Ok(self
            .arena
            .payload_bytes_mut(handle.address(), header.payload_size))
    }

    /// 現在のブロック配置のスナップショットを取得する.
    pub fn snapshot(&self) -> Result<ArenaSnapshot> {
        track!(self.arena.snapshot())
    }

    /// アロケータを破棄して、背後のメモリ領域を返す.
    ///
    /// ブロック管理のための全ての情報は破棄されるが、
    /// 領域のバイト列そのものには一切手を触れない.
    /// 返された領域を再度[AllocatorBuilder]に渡すことで、新しいセッションを開始できる.
    ///
    /// [AllocatorBuilder]: ./struct.AllocatorBuilder.html
    pub fn cleanup(mut self) -> R {
        self.free_index.clear();
        info!(self.logger, "Allocator cleaned up");
        self.arena.into_region()
    }

    fn resolve_used(&self, handle: MemHandle) -> Result<(Address, BlockHeader)> {
        let resolved = self.arena.resolve_handle(handle);
        if resolved.is_err() {
            warn!(self.logger, "Invalid handle: {}", handle);
            self.metrics.invalid_handles.increment();
        }
        let (start, header) = track!(resolved)?;
        if header.state == BlockState::Free {
            warn!(self.logger, "The block is already free: {}", handle);
            self.metrics.invalid_handles.increment();
            track_panic!(
                ErrorKind::InvalidPointer,
                "The block is already free: offset={}",
                handle.offset()
            );
        }
        Ok((start, header))
    }

    fn add_free_block(&mut self, block: FreeBlock) {
        self.free_index.insert(block);
        self.metrics.inserted_free_blocks.increment();
    }

    fn delete_free_block(&mut self, block: FreeBlock) {
        self.free_index.remove(block);
        self.metrics.removed_free_blocks.increment();
    }

    fn write_header(&mut self, start: Address, payload_size: u64, state: BlockState) {
        self.arena
            .write_block_header(start, &BlockHeader::new(payload_size, state))
            .expect("Never fails");
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;
    use crate::arena::BlockState;
    use crate::block::Alignment;
    use crate::region::HeapRegion;
    use crate::ErrorKind;

    #[test]
    fn it_works() -> TestResult {
        let mut allocator = track!(Allocator::with_capacity(1024))?;
        assert_eq!(allocator.metadata_size(), 16);
        assert_eq!(allocator.capacity(), 1024);

        let h0 = allocator.alloc(100).unwrap();
        assert_eq!(h0.offset(), 16);
        let h1 = allocator.alloc(100).unwrap();
        assert_eq!(h1.offset(), 136);

        track!(allocator.free(h0))?;
        track!(allocator.free(h1))?;

        // 全て結合されて初期状態に戻っている
        let snapshot = track!(allocator.snapshot())?;
        assert_eq!(snapshot.blocks.len(), 1);
        assert_eq!(snapshot.blocks[0].payload_size, 1024 - 16);
        assert_eq!(snapshot.blocks[0].state, BlockState::Free);
        Ok(())
    }

    #[test]
    fn zero_size_request_returns_none() -> TestResult {
        let mut allocator = track!(Allocator::with_capacity(1024))?;
        assert_eq!(allocator.alloc(0), None);

        // 失敗ではないので、nospace用のカウンタは増えない
        assert_eq!(allocator.metrics().nospace_failures(), 0);
        Ok(())
    }

    #[test]
    fn smallest_only_policy() -> TestResult {
        let mut allocator = track!(Allocator::with_capacity(1024))?;
        let h0 = allocator.alloc(32).unwrap();
        let _h1 = allocator.alloc(32).unwrap();
        track!(allocator.free(h0))?;

        // 後方に大きな空きブロックが残っているが、最小の空きブロック(32バイト)しか
        // 検査されないため、割当は失敗する
        assert_eq!(allocator.alloc(64), None);
        assert_eq!(allocator.metrics().nospace_failures(), 1);

        // 最小の空きブロックで足りる要求は、そのブロック自体を再利用する
        let h2 = allocator.alloc(16).unwrap();
        assert_eq!(h2.offset(), h0.offset());
        Ok(())
    }

    #[test]
    fn free_merges_adjacent_blocks() -> TestResult {
        let mut allocator = track!(Allocator::with_capacity(1024))?;
        let h1 = allocator.alloc(64).unwrap();
        let h2 = allocator.alloc(128).unwrap();
        let _h3 = allocator.alloc(512).unwrap();

        track!(allocator.free(h1))?;
        track!(allocator.free(h2))?;

        let snapshot = track!(allocator.snapshot())?;
        let free = snapshot.free_blocks();
        assert_eq!(free[0].payload_size, 64 + 128 + allocator.metadata_size());

        // 結合済みブロックからの再割当が可能
        let h4 = allocator.alloc(64 + 128).unwrap();
        assert_eq!(h4.offset(), h1.offset());
        Ok(())
    }

    #[test]
    fn merge_order_does_not_matter() -> TestResult {
        let mut allocator = track!(Allocator::with_capacity(1024))?;
        let h1 = allocator.alloc(64).unwrap();
        let h2 = allocator.alloc(128).unwrap();
        let _h3 = allocator.alloc(512).unwrap();

        // 逆順に解放しても、最終的な結合状態は同じ
        track!(allocator.free(h2))?;
        track!(allocator.free(h1))?;

        let snapshot = track!(allocator.snapshot())?;
        let free = snapshot.free_blocks();
        assert_eq!(free[0].payload_size, 64 + 128 + allocator.metadata_size());

        let h4 = allocator.alloc(64 + 128).unwrap();
        assert_eq!(h4.offset(), h1.offset());
        Ok(())
    }

    #[test]
    fn payload_is_zero_filled() -> TestResult {
        let mut allocator = track!(Allocator::with_capacity(1024))?;
        let h0 = allocator.alloc(64).unwrap();
        for b in track!(allocator.payload_mut(h0))?.iter_mut() {
            *b = 0xFF;
        }
        track!(allocator.free(h0))?;

        let h1 = allocator.alloc(64).unwrap();
        assert_eq!(h1.offset(), h0.offset());
        assert_eq!(track!(allocator.payload(h1))?.len(), 64);
        assert!(track!(allocator.payload(h1))?.iter().all(|b| *b == 0));
        Ok(())
    }

    #[test]
    fn realloc_works() -> TestResult {
        let mut allocator = track!(Allocator::with_capacity(1024))?;

        // ハンドルなしの場合はallocと等価
        let h0 = track!(allocator.realloc(None, 40))?.unwrap();
        track!(allocator.payload_mut(h0))?.copy_from_slice(&[7; 40]);

        // 現在のペイロード長以下への変更は何も行わない
        assert_eq!(track!(allocator.realloc(Some(h0), 8))?, Some(h0));
        assert_eq!(track!(allocator.realloc(Some(h0), 40))?, Some(h0));

        // 拡大時には新規ブロックに内容が引き継がれる
        let h1 = track!(allocator.realloc(Some(h0), 100))?.unwrap();
        assert_ne!(h1, h0);
        {
            let payload = track!(allocator.payload(h1))?;
            assert_eq!(&payload[..40], &[7; 40][..]);
            assert!(payload[40..].iter().all(|b| *b == 0));
        }

        // サイズ0への変更は解放と等価
        assert_eq!(track!(allocator.realloc(Some(h1), 0))?, None);
        let snapshot = track!(allocator.snapshot())?;
        assert_eq!(snapshot.blocks.len(), 1);
        assert_eq!(snapshot.blocks[0].state, BlockState::Free);
        Ok(())
    }

    #[test]
    fn realloc_failure_leaves_the_original_intact() -> TestResult {
        let mut allocator = track!(Allocator::with_capacity(256))?;
        let handle = allocator.alloc(100).unwrap();
        track!(allocator.payload_mut(handle))?[0] = 42;

        // これ以上の拡大は不可能だが、元のブロックは無傷のまま
        assert_eq!(track!(allocator.realloc(Some(handle), 200))?, None);
        assert_eq!(track!(allocator.realloc(Some(handle), 2048))?, None);
        assert_eq!(track!(allocator.payload(handle))?[0], 42);

        track!(allocator.free(handle))?;
        Ok(())
    }

    #[test]
    fn exact_capacity_allocation() -> TestResult {
        let mut allocator = track!(Allocator::with_capacity(1024))?;
        let size = 1024 - allocator.metadata_size();

        let handle = allocator.alloc(size).unwrap();
        assert_eq!(track!(allocator.payload(handle))?.len() as u64, size);

        // 領域が使い尽くされたので、これ以上は一切割当できない
        assert_eq!(allocator.alloc(1), None);
        assert_eq!(allocator.metrics().nospace_failures(), 1);

        track!(allocator.free(handle))?;
        assert!(allocator.alloc(size).is_some());
        Ok(())
    }

    #[test]
    fn invalid_handles_are_rejected() -> TestResult {
        let mut allocator = track!(Allocator::with_capacity(1024))?;
        let mut other = track!(Allocator::with_capacity(1024))?;
        let handle = allocator.alloc(10).unwrap();

        // 別のアリーナに属するハンドル
        let e = other.free(handle).err().unwrap();
        assert_eq!(*e.kind(), ErrorKind::InvalidPointer);

        // 二重解放
        track!(allocator.free(handle))?;
        let e = allocator.free(handle).err().unwrap();
        assert_eq!(*e.kind(), ErrorKind::InvalidPointer);
        assert_eq!(allocator.metrics().invalid_handles(), 1);

        // エラー後も状態は壊れていない
        track!(allocator.snapshot())?;
        Ok(())
    }

    #[test]
    fn cleanup_resets_the_session() -> TestResult {
        let mut allocator = track!(Allocator::with_capacity(1024))?;
        let h0 = allocator.alloc(100).unwrap();
        let _h1 = allocator.alloc(200).unwrap();
        track!(allocator.free(h0))?;

        // 領域は手つかずのまま返却され、再構築で新しいセッションが始まる
        let region = allocator.cleanup();
        let mut allocator = track!(AllocatorBuilder::new().build(region))?;
        assert_eq!(allocator.metrics().free_list_len(), 1);

        let size = allocator.capacity() - allocator.metadata_size();
        assert!(allocator.alloc(size).is_some());
        Ok(())
    }

    #[test]
    fn init_with_too_small_capacity_fails() {
        // ヘッダ一つ+アライメント単位一つ分に満たない容量は拒否される
        assert!(Allocator::with_capacity(0).is_err());
        assert!(Allocator::with_capacity(23).is_err());
        assert!(Allocator::with_capacity(24).is_ok());
    }

    #[test]
    fn custom_alignment() -> TestResult {
        let mut allocator = track!(AllocatorBuilder::new()
            .alignment(track!(Alignment::new(64))?)
            .build(HeapRegion::reserve(1024)))?;

        let handle = allocator.alloc(10).unwrap();
        assert_eq!(track!(allocator.payload(handle))?.len(), 64);
        Ok(())
    }

    #[test]
    fn metrics_work() -> TestResult {
        let mut allocator = track!(Allocator::with_capacity(1024))?;
        let h0 = allocator.alloc(100).unwrap();
        let h1 = allocator.alloc(50).unwrap();
        assert_eq!(allocator.metrics().allocated_blocks(), 2);
        assert_eq!(allocator.metrics().usage_bytes(), 104 + 56);

        track!(allocator.free(h0))?;
        assert_eq!(allocator.metrics().released_blocks(), 1);
        assert_eq!(allocator.metrics().usage_bytes(), 56);
        assert_eq!(allocator.metrics().free_list_len(), 2);
        assert_eq!(allocator.metrics().merged_free_blocks(), 0);

        track!(allocator.free(h1))?;
        assert_eq!(allocator.metrics().usage_bytes(), 0);
        assert_eq!(allocator.metrics().free_list_len(), 1);
        assert_eq!(allocator.metrics().merged_free_blocks(), 2);
        assert_eq!(allocator.metrics().capacity_bytes(), 1024);
        Ok(())
    }
}
