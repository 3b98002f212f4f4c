//! 割当サイズのアライメント(丸め)単位関連の構成要素.
use crate::{ErrorKind, Result};

/// 要求サイズのアライメント単位を表現するための構造体.
///
/// `alloc`や`realloc`に渡された要求サイズは、この単位の倍数に切り上げられてから処理される.
/// ブロックの分割時に残余部分へ要求される最小ペイロード長も、この単位となる.
///
/// 指定された単位への切り上げ・切り捨てを行うための補助メソッド群も提供している.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Alignment(u16);
impl Alignment {
    /// 許容されるアライメント単位の最小値.
    ///
    /// 全てのアライメント単位は、この値以上の2のべき乗である必要がある.
    ///
    /// また`Alignment::default()`で使われる値でもある.
    pub const MIN: u16 = 8;

    /// 許容可能な最小のアライメント単位を持つ`Alignment`インスタンスを返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use memarena::block::Alignment;
    ///
    /// assert_eq!(Alignment::min().as_u16(), Alignment::MIN);
    /// ```
    pub fn min() -> Self {
        Alignment(Self::MIN)
    }

    /// 指定された値のアライメント単位を表現する`Alignment`インスタンスを生成する.
    ///
    /// # Errors
    ///
    /// 以下の場合には、種類が`ErrorKind::InvalidInput`のエラーが返される:
    ///
    /// - `unit`が`Alignment::MIN`未満
    /// - `unit`が2のべき乗ではない
    ///
    /// # Examples
    ///
    /// ```
    /// use memarena::ErrorKind;
    /// use memarena::block::Alignment;
    ///
    /// assert_eq!(Alignment::new(8).ok().map(|a| a.as_u16()), Some(8));
    /// assert_eq!(Alignment::new(64).ok().map(|a| a.as_u16()), Some(64));
    ///
    /// assert_eq!(Alignment::new(4).err().map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    /// assert_eq!(Alignment::new(24).err().map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    /// ```
    #[allow(clippy::new_ret_no_self)]
    pub fn new(unit: u16) -> Result<Self> {
        track_assert!(unit >= Self::MIN, ErrorKind::InvalidInput);
        track_assert!(unit.is_power_of_two(), ErrorKind::InvalidInput);
        Ok(Alignment(unit))
    }

    /// 指定サイズより後方の最初のアライメント境界を返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use memarena::block::Alignment;
    ///
    /// let alignment = Alignment::new(8).unwrap();
    /// assert_eq!(alignment.ceil_align(0), 0);
    /// assert_eq!(alignment.ceil_align(1), 8);
    /// assert_eq!(alignment.ceil_align(8), 8);
    /// ```
    pub fn ceil_align(self, size: u64) -> u64 {
        let unit = u64::from(self.0);
        (size + unit - 1) / unit * unit
    }

    /// 指定サイズより前方の最初のアライメント境界を返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use memarena::block::Alignment;
    ///
    /// let alignment = Alignment::new(8).unwrap();
    /// assert_eq!(alignment.floor_align(0), 0);
    /// assert_eq!(alignment.floor_align(1), 0);
    /// assert_eq!(alignment.floor_align(8), 8);
    /// ```
    pub fn floor_align(self, size: u64) -> u64 {
        let unit = u64::from(self.0);
        (size / unit) * unit
    }

    /// アライメント単位を`u16`に変換して返す.
    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// 指定サイズがアライメント境界に沿っているかどうかを判定する.
    ///
    /// # Examples
    ///
    /// ```
    /// use memarena::block::Alignment;
    ///
    /// let alignment = Alignment::new(8).unwrap();
    /// assert!(alignment.is_aligned(0));
    /// assert!(alignment.is_aligned(16));
    ///
    /// assert!(!alignment.is_aligned(15));
    /// assert!(!alignment.is_aligned(17));
    /// ```
    pub fn is_aligned(self, size: u64) -> bool {
        (size % u64::from(self.0)) == 0
    }
}
impl Default for Alignment {
    fn default() -> Self {
        Self::min()
    }
}
