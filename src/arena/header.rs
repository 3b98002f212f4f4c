use adler32::RollingAdler32;
use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::{ErrorKind, Result};

/// ブロックヘッダを表現するのに必要なバイト数.
///
/// ペイロードの開始位置を8バイト境界に保つために、末尾にパディングが含まれている.
pub const BLOCK_HEADER_SIZE: u16 =
    4 /* checksum */ +
    8 /* payload_size */ +
    1 /* state */ +
    3 /* padding */;

const STATE_USED: u8 = 0;
const STATE_FREE: u8 = 1;

/// ブロックの割当状態.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// 割当済み.
    Used,

    /// 空き.
    Free,
}

/// 各ブロックのペイロードの直前に書き込まれるヘッダ情報.
///
/// ヘッダとペイロードの列がアリーナ全体を隙間なく埋めており、
/// `ヘッダ位置 + BLOCK_HEADER_SIZE + payload_size`が次のブロックのヘッダ位置となる.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// ペイロードのサイズ(バイト単位).
    ///
    /// ヘッダ自身のサイズは含まれない.
    pub payload_size: u64,

    /// ブロックの割当状態.
    pub state: BlockState,
}
impl BlockHeader {
    /// 新しい`BlockHeader`インスタンスを生成する.
    pub fn new(payload_size: u64, state: BlockState) -> Self {
        BlockHeader {
            payload_size,
            state,
        }
    }

    /// ヘッダも含めたブロック全体のサイズを返す.
    pub fn block_size(&self) -> u64 {
        u64::from(BLOCK_HEADER_SIZE) + self.payload_size
    }

    /// ヘッダ情報を`writer`に書き込む.
    pub(crate) fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        track_io!(writer.write_u32::<BigEndian>(self.checksum()))?;
        track_io!(writer.write_u64::<BigEndian>(self.payload_size))?;
        track_io!(writer.write_u8(self.state_tag()))?;
        track_io!(writer.write_all(&[0; 3]))?;
        Ok(())
    }

    /// ヘッダ情報を`reader`から読み込む.
    ///
    /// チェックサムの検証に失敗した場合には、
    /// 種類が`ErrorKind::InconsistentState`のエラーが返される.
    pub(crate) fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let checksum = track_io!(reader.read_u32::<BigEndian>())?;
        let payload_size = track_io!(reader.read_u64::<BigEndian>())?;
        let tag = track_io!(reader.read_u8())?;
        let state = match tag {
            STATE_USED => BlockState::Used,
            STATE_FREE => BlockState::Free,
            _ => track_panic!(ErrorKind::InconsistentState, "Unknown block state: {}", tag),
        };
        let mut padding = [0; 3];
        track_io!(reader.read_exact(&mut padding))?;

        let header = BlockHeader::new(payload_size, state);
        track_assert_eq!(header.checksum(), checksum, ErrorKind::InconsistentState);
        Ok(header)
    }

    fn state_tag(&self) -> u8 {
        match self.state {
            BlockState::Used => STATE_USED,
            BlockState::Free => STATE_FREE,
        }
    }

    fn checksum(&self) -> u32 {
        let mut adler32 = RollingAdler32::new();
        let mut buf = [0; 8];
        BigEndian::write_u64(&mut buf, self.payload_size);
        adler32.update_buffer(&buf);
        adler32.update(self.state_tag());
        adler32.hash()
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;
    use crate::ErrorKind;

    #[test]
    fn it_works() -> TestResult {
        let header = BlockHeader::new(1008, BlockState::Free);
        assert_eq!(header.block_size(), 1024);

        let mut buf = Vec::new();
        track!(header.write_to(&mut buf))?;
        assert_eq!(buf.len(), BLOCK_HEADER_SIZE as usize);

        let h = track!(BlockHeader::read_from(&buf[..]))?;
        assert_eq!(h, header);
        Ok(())
    }

    #[test]
    fn corruption_is_detected() -> TestResult {
        let header = BlockHeader::new(128, BlockState::Used);
        let mut buf = Vec::new();
        track!(header.write_to(&mut buf))?;

        // ペイロード長のバイト列を破壊するとチェックサム検証が失敗する
        buf[7] ^= 1;
        let e = BlockHeader::read_from(&buf[..]).err().unwrap();
        assert_eq!(*e.kind(), ErrorKind::InconsistentState);
        Ok(())
    }

    #[test]
    fn unknown_state_tag_is_rejected() -> TestResult {
        let header = BlockHeader::new(128, BlockState::Used);
        let mut buf = Vec::new();
        track!(header.write_to(&mut buf))?;

        buf[12] = 9;
        let e = BlockHeader::read_from(&buf[..]).err().unwrap();
        assert_eq!(*e.kind(), ErrorKind::InconsistentState);
        Ok(())
    }

    #[test]
    fn zeroed_bytes_are_not_a_valid_header() {
        let buf = [0; BLOCK_HEADER_SIZE as usize];
        assert!(BlockHeader::read_from(&buf[..]).is_err());
    }
}
