//! Free Block Index.
use std::collections::BTreeSet;
use std::collections::Bound::{Excluded, Unbounded};

use super::free_block::{EndBasedFreeBlock, FreeBlock, SizeBasedFreeBlock};

/// 空きブロック群を追跡するためのインデックス.
///
/// 同一のブロック群が、ペイロード長順と終端位置順の二つの順序付き集合で保持されている.
/// 前者は"smallest-only"戦略のための最小ブロックの取得に、
/// 後者は解放時の隣接ブロック検出(コアレッシング)に使用される.
///
/// インデックス自体はメモリを所有せず、どのブロックが空きかの情報のみを保持する.
///
/// # 不変条件
///
/// - ブロックは、ヘッダ上で空きと記録されている場合に限り、インデックスに存在する
/// - 二つの集合は常に同一のブロック群を保持する
/// - 同一ブロックへの重複した参照は保持されない
#[derive(Debug, Default)]
pub struct FreeBlockIndex {
    size_to_free: BTreeSet<SizeBasedFreeBlock>,
    end_to_free: BTreeSet<EndBasedFreeBlock>,
}
impl FreeBlockIndex {
    /// 空のインデックスを生成する.
    pub fn new() -> Self {
        FreeBlockIndex {
            size_to_free: BTreeSet::new(),
            end_to_free: BTreeSet::new(),
        }
    }

    /// 現在追跡中の空きブロック数を返す.
    pub fn len(&self) -> usize {
        self.size_to_free.len()
    }

    /// 空きブロックをインデックスに追加する.
    pub fn insert(&mut self, block: FreeBlock) {
        assert!(self.size_to_free.insert(SizeBasedFreeBlock(block)));
        assert!(self.end_to_free.insert(EndBasedFreeBlock(block)));
    }

    /// 空きブロックをインデックスから取り除く.
    pub fn remove(&mut self, block: FreeBlock) {
        assert!(self.size_to_free.remove(&SizeBasedFreeBlock(block)));
        assert!(self.end_to_free.remove(&EndBasedFreeBlock(block)));
    }

    /// ペイロード長が最小の空きブロックを返す.
    ///
    /// インデックスが空の場合には`None`が返される.
    ///
    /// 同一ペイロード長のブロックが複数存在する場合には、開始位置が最小のものが選ばれる.
    pub fn smallest(&self) -> Option<FreeBlock> {
        self.size_to_free.iter().next().map(|b| b.0)
    }

    /// `block`と隣接する空きブロックがインデックス内に存在する場合には、それらをまとめてしまう.
    ///
    /// 吸収された隣接ブロックはインデックスから取り除かれる.
    /// 返り値の拡張済みブロックは、まだインデックスには追加されていない.
    pub fn merge_adjacent(&mut self, mut block: FreeBlock) -> FreeBlock {
        // 「`block`の始端」に一致する終端を持つブロック`prev`を探す。
        // もし存在するなら、 prev block の並びでmerge可能である。
        // 注意: BTreeSetのgetでは、EqではなくOrd traitが用いられる。
        // 従って終端が一致する場合に限りOrdering::Equalとなる。
        let key = FreeBlock::new(block.start(), 0);
        if let Some(prev) = self.end_to_free.get(&EndBasedFreeBlock(key)).map(|b| b.0) {
            self.remove(prev);
            let mut merged = prev;
            merged.extend(block);
            block = merged;
        }

        // 「`block`の終端」に一致する始端を持つブロック`next`を探す。
        // もし存在するなら、 block next の並びでmerge可能である。
        let key = FreeBlock::new(block.end(), 0);
        if let Some(next) = self
            .end_to_free
            .range((Excluded(&EndBasedFreeBlock(key)), Unbounded))
            .next()
            .map(|b| b.0)
        {
            // `next`については`block.end < next.end`を満たす最小のブロックということしか分かっていない。
            // block.end == next.start かどうかを確認する必要がある。
            if next.start() == block.end() {
                self.remove(next);
                block.extend(next);
            }
        }

        block
    }

    /// インデックスを空にする.
    pub fn clear(&mut self) {
        self.size_to_free.clear();
        self.end_to_free.clear();
    }
}
