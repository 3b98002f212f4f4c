//! ブロック群を収容する連続メモリ領域(アリーナ)関連の構成要素.
//!
//! このモジュール自体は、空きブロックの追跡や割当戦略とは切り離されており、
//! バイト列上のブロックヘッダの読み書きとハンドルの検証の実装に近い.
//!
//! どのブロックを割当に使用するかの判断は
//! [allocator](../allocator/index.html)モジュールが担当する.
pub use self::address::Address;
pub use self::header::{BlockHeader, BlockState, BLOCK_HEADER_SIZE};

mod address;
mod header;

use uuid::Uuid;

use crate::handle::MemHandle;
use crate::region::RegionMemory;
use crate::{ErrorKind, Result};

/// アリーナの最大サイズ(バイト単位).
///
/// およそ1TB.
pub const MAX_ARENA_SIZE: u64 = Address::MAX;

/// ブロック群を収容する単一の連続メモリ領域.
///
/// 領域は、先頭から末尾までヘッダ+ペイロードのブロック列で隙間なく埋められる.
/// すなわち、全てのブロックについて
/// `ヘッダ位置 + BLOCK_HEADER_SIZE + ペイロード長`が次のブロックのヘッダ位置となり、
/// 最後のブロックの終端は領域の終端と一致する.
///
/// `Arena`はこのブロック列の読み書きとハンドルの検証のみを担当し、
/// 領域そのものの確保は[RegionMemory]実装に、
/// 空きブロックの追跡は[allocator]モジュールに、それぞれ委譲されている.
///
/// [RegionMemory]: ../region/trait.RegionMemory.html
/// [allocator]: ../allocator/index.html
#[derive(Debug)]
pub struct Arena<R> {
    region: R,
    instance_uuid: Uuid,
}
impl<R: RegionMemory> Arena<R> {
    pub(crate) fn new(region: R, instance_uuid: Uuid) -> Self {
        Arena {
            region,
            instance_uuid,
        }
    }

    /// アリーナの容量(バイト単位)を返す.
    pub fn capacity(&self) -> u64 {
        self.region.capacity()
    }

    /// アリーナの特定のインスタンスを識別するためのUUIDを返す.
    pub fn instance_uuid(&self) -> Uuid {
        self.instance_uuid
    }

    /// アリーナを消費して、背後の領域を返す.
    pub(crate) fn into_region(self) -> R {
        self.region
    }

    /// 指定位置にブロックヘッダを書き込む.
    pub(crate) fn write_block_header(&mut self, start: Address, header: &BlockHeader) -> Result<()> {
        let i = start.as_u64() as usize;
        let end = i + usize::from(BLOCK_HEADER_SIZE);
        track_assert!(
            start.as_u64() + header.block_size() <= self.capacity(),
            ErrorKind::InconsistentState;
            start.as_u64(), header.payload_size
        );
        track!(header.write_to(&mut self.region.as_bytes_mut()[i..end]))?;
        Ok(())
    }

    /// 指定位置からブロックヘッダを読み込む.
    pub(crate) fn read_block_header(&self, start: Address) -> Result<BlockHeader> {
        let i = start.as_u64() as usize;
        let end = i + usize::from(BLOCK_HEADER_SIZE);
        track_assert!(
            end as u64 <= self.capacity(),
            ErrorKind::InconsistentState;
            start.as_u64()
        );
        track!(BlockHeader::read_from(&self.region.as_bytes()[i..end]))
    }

    /// ハンドルを検証して、対応するブロックの開始位置とヘッダを返す.
    ///
    /// ハンドルが別のアリーナに属している場合や、
    /// オフセットがブロックを指し得ない場合には、
    /// 種類が`ErrorKind::InvalidPointer`のエラーが返される.
    pub(crate) fn resolve_handle(&self, handle: MemHandle) -> Result<(Address, BlockHeader)> {
        track_assert_eq!(
            handle.arena_uuid(),
            self.instance_uuid,
            ErrorKind::InvalidPointer
        );
        track_assert!(
            handle.offset() >= u64::from(BLOCK_HEADER_SIZE),
            ErrorKind::InvalidPointer;
            handle.offset()
        );
        track_assert!(
            handle.offset() < self.capacity(),
            ErrorKind::InvalidPointer;
            handle.offset()
        );

        let start = handle.address() - Address::from(u32::from(BLOCK_HEADER_SIZE));
        let header = track!(self.read_block_header(start))?;
        track_assert!(
            start.as_u64() + header.block_size() <= self.capacity(),
            ErrorKind::InvalidPointer;
            handle.offset(), header.payload_size
        );
        Ok((start, header))
    }

    /// 指定位置から始まるペイロードへの参照を返す.
    pub(crate) fn payload_bytes(&self, payload: Address, len: u64) -> &[u8] {
        let i = payload.as_u64() as usize;
        &self.region.as_bytes()[i..i + len as usize]
    }

    /// 指定位置から始まるペイロードへの可変参照を返す.
    pub(crate) fn payload_bytes_mut(&mut self, payload: Address, len: u64) -> &mut [u8] {
        let i = payload.as_u64() as usize;
        &mut self.region.as_bytes_mut()[i..i + len as usize]
    }

    /// 指定位置から始まるペイロードを0クリアする.
    pub(crate) fn zero_payload(&mut self, payload: Address, len: u64) {
        for b in self.payload_bytes_mut(payload, len) {
            *b = 0;
        }
    }

    /// ペイロードの内容を`src`から`dst`にコピーする.
    pub(crate) fn copy_payload(&mut self, src: Address, dst: Address, len: u64) {
        let src = src.as_u64() as usize;
        let dst = dst.as_u64() as usize;
        self.region
            .as_bytes_mut()
            .copy_within(src..src + len as usize, dst);
    }

    /// アリーナ内の全ブロックを先頭から走査して、その時点の配置を返す.
    ///
    /// 走査の過程で、ブロック列が領域を過不足なく埋めていることも検証され、
    /// 違反が見つかった場合には、種類が`ErrorKind::InconsistentState`のエラーが返される.
    pub fn snapshot(&self) -> Result<ArenaSnapshot> {
        let mut blocks = Vec::new();
        let mut position = 0;
        while position < self.capacity() {
            let start =
                track_assert_some!(Address::from_u64(position), ErrorKind::InconsistentState);
            let header = track!(self.read_block_header(start))?;
            track_assert!(
                position + header.block_size() <= self.capacity(),
                ErrorKind::InconsistentState;
                position, header.payload_size
            );
            position += header.block_size();
            blocks.push(BlockInfo {
                start,
                payload_size: header.payload_size,
                state: header.state,
            });
        }
        track_assert_eq!(position, self.capacity(), ErrorKind::InconsistentState);
        Ok(ArenaSnapshot { blocks })
    }
}

/// `Arena::snapshot`が返す、ある時点のブロック配置.
#[derive(Debug)]
pub struct ArenaSnapshot {
    /// アドレス順に並んだ全ブロックの情報.
    pub blocks: Vec<BlockInfo>,
}
impl ArenaSnapshot {
    /// 空きブロックのみをアドレス順に列挙する.
    pub fn free_blocks(&self) -> Vec<&BlockInfo> {
        self.blocks
            .iter()
            .filter(|b| b.state == BlockState::Free)
            .collect()
    }
}

/// ブロック一つ分の情報.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    /// ブロック(ヘッダ)の開始位置.
    pub start: Address,

    /// ペイロードのサイズ(バイト単位).
    pub payload_size: u64,

    /// ブロックの割当状態.
    pub state: BlockState,
}
