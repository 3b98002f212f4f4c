//! Free Block
use std::cmp;

use crate::arena::{Address, BLOCK_HEADER_SIZE};

/// 空き(割当可能)ブロックを表現するための構造体.
///
/// `len`はヘッダも含めたブロック全体の長さであり、
/// 実際に割当に利用可能な長さは`payload_len`で取得する.
#[derive(Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq)]
pub struct FreeBlock {
    start: Address,
    len: u64,
}
impl FreeBlock {
    /// 開始位置`start`、全長`len`の空きブロックを生成する.
    pub fn new(start: Address, len: u64) -> Self {
        FreeBlock { start, len }
    }

    /// ブロックの開始位置(ヘッダ位置)を返す.
    pub fn start(self) -> Address {
        self.start
    }

    /// ブロックの終端位置を返す.
    ///
    /// **注意**: ブロックは [start, end) の領域を用いるため、
    /// end部はこのブロックには含まれない.
    pub fn end(self) -> Address {
        self.start + self.len
    }

    /// ヘッダも含めたブロック全体の長さを返す.
    pub fn len(self) -> u64 {
        self.len
    }

    /// 割当に利用可能なペイロード長を返す.
    pub fn payload_len(self) -> u64 {
        self.len - u64::from(BLOCK_HEADER_SIZE)
    }

    /// 直後に隣接する`next`を吸収してブロックを拡張する.
    ///
    /// # Panics
    ///
    /// `next`が`self`の直後に隣接していない場合には、現在のスレッドがパニックする.
    pub fn extend(&mut self, next: FreeBlock) {
        assert_eq!(self.end(), next.start());
        self.len += next.len;
    }

    /// 先頭からペイロード長`payload_size`のブロックを切り出し、(切り出し分, 残余)を返す.
    ///
    /// # Panics
    ///
    /// 残余部分にヘッダとペイロードが収まらない場合には、現在のスレッドがパニックする.
    pub fn carve(self, payload_size: u64) -> (FreeBlock, FreeBlock) {
        let carved_len = u64::from(BLOCK_HEADER_SIZE) + payload_size;
        assert!(carved_len + u64::from(BLOCK_HEADER_SIZE) < self.len);
        let carved = FreeBlock::new(self.start, carved_len);
        let rest = FreeBlock::new(self.start + carved_len, self.len - carved_len);
        (carved, rest)
    }
}

/// 比較が"ペイロード長が小さい順"で行われる`FreeBlock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeBasedFreeBlock(pub FreeBlock);
impl PartialOrd for SizeBasedFreeBlock {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for SizeBasedFreeBlock {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        match self.0.len().cmp(&other.0.len()) {
            cmp::Ordering::Equal => self.0.start().cmp(&other.0.start()),
            not_equal => not_equal,
        }
    }
}

/// 比較が"終端位置が小さい順"で行われる`FreeBlock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndBasedFreeBlock(pub FreeBlock);
impl PartialOrd for EndBasedFreeBlock {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for EndBasedFreeBlock {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.0.end().cmp(&other.0.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Address;

    #[test]
    fn it_works() {
        let mut b = FreeBlock::new(Address::from(100), 50);
        assert_eq!(b.start(), Address::from(100));
        assert_eq!(b.end(), Address::from(150));
        assert_eq!(b.len(), 50);
        assert_eq!(b.payload_len(), 50 - u64::from(BLOCK_HEADER_SIZE));

        b.extend(FreeBlock::new(Address::from(150), 30));
        assert_eq!(b.start(), Address::from(100));
        assert_eq!(b.end(), Address::from(180));
        assert_eq!(b.len(), 80);
    }

    #[test]
    fn carve_works() {
        let b = FreeBlock::new(Address::from(0), 160);
        let (carved, rest) = b.carve(64);
        assert_eq!(carved.start(), Address::from(0));
        assert_eq!(carved.payload_len(), 64);
        assert_eq!(rest.start(), Address::from(80));
        assert_eq!(rest.len(), 80);
        assert_eq!(carved.end(), rest.start());
    }

    #[test]
    #[should_panic]
    fn extend_requires_adjacency() {
        let mut b = FreeBlock::new(Address::from(100), 50);
        b.extend(FreeBlock::new(Address::from(151), 30));
    }

    #[test]
    #[should_panic]
    fn carve_requires_room_for_the_rest() {
        let b = FreeBlock::new(Address::from(0), 100);
        let _ = b.carve(80);
    }

    #[test]
    fn orderings_work() {
        let small = FreeBlock::new(Address::from(200), 32);
        let large = FreeBlock::new(Address::from(0), 64);

        assert!(SizeBasedFreeBlock(small) < SizeBasedFreeBlock(large));
        assert!(EndBasedFreeBlock(large) < EndBasedFreeBlock(small));

        // ペイロード長が等しい場合は開始位置の昇順
        let tie = FreeBlock::new(Address::from(500), 32);
        assert!(SizeBasedFreeBlock(small) < SizeBasedFreeBlock(tie));
    }
}
