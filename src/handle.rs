use std::fmt;
use uuid::Uuid;

use crate::arena::Address;

/// 割当済みブロックのペイロードを指す不透明ハンドル.
///
/// 生ポインタの代替として`alloc`/`realloc`の結果として利用者に渡される.
///
/// ハンドルは自身が属するアリーナのUUIDを保持しており、
/// 別のアリーナインスタンスに対して使用された場合には、
/// 操作が[`ErrorKind::InvalidPointer`]として拒否される.
///
/// [`ErrorKind::InvalidPointer`]: ../enum.ErrorKind.html#variant.InvalidPointer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemHandle {
    arena_uuid: Uuid,
    offset: Address,
}
impl MemHandle {
    pub(crate) fn new(arena_uuid: Uuid, offset: Address) -> Self {
        MemHandle { arena_uuid, offset }
    }

    /// ハンドルが属するアリーナのUUIDを返す.
    pub fn arena_uuid(&self) -> Uuid {
        self.arena_uuid
    }

    /// ペイロードの、アリーナ先頭からのオフセット(バイト単位)を返す.
    ///
    /// ブロックのヘッダはこの位置の直前に置かれている.
    pub fn offset(&self) -> u64 {
        self.offset.as_u64()
    }

    pub(crate) fn address(&self) -> Address {
        self.offset
    }
}
impl fmt::Display for MemHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.offset.as_u64(), self.arena_uuid)
    }
}
