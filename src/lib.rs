//! Arena Memory Allocator.
//!
//! `memarena`は、環境から一度だけ確保した連続メモリ領域を対象とする、組み込み用のヒープアロケータ.
//!
//! # 特徴
//!
//! - 領域全体をヘッダ+ペイロードのブロック列として隙間なく管理する
//!   - 各ブロックのヘッダには、ペイロード長と割当状態、およびチェックサムが記録される
//! - 空きブロック群は(サイズ順・終端位置順の)順序付き集合で追跡される
//! - 割当時にはペイロード長が最小の空きブロックのみが検査される("smallest-only"戦略)
//! - 解放時には、アドレス上隣接する空きブロックと即座に結合(コアレッシング)される
//! - 利用者には生ポインタではなく、所属アリーナのUUIDを持つ不透明な[MemHandle]が渡される
//!   - 別のアリーナのハンドルや解放済みブロックの再解放は、エラーとして検出される
//! - 領域は初期化後に拡大も縮小もされず、環境へ返却されることもない
//!
//! # モジュールの依存関係
//!
//! ```text
//! allocator => arena => region
//! ```
//!
//! - [allocator]モジュール:
//!   - 主に[Allocator]構造体を提供
//!   - `memarena`の利用者が直接触るのはこの構造体
//!   - 空きブロックの追跡と、分割・結合・再割当のアルゴリズムを担当する
//! - [arena]モジュール:
//!   - ブロックヘッダのレイアウトと読み書き、およびハンドルの検証を担当する
//! - [region]モジュール:
//!   - 主に[RegionMemory]トレイトとその実装である[HeapRegion]を提供
//!   - 背後のメモリ領域の物理的な確保方法をアロケータ本体から切り離すのが目的
//!
//! # 並行性について
//!
//! アロケータの全操作は同期的であり、内部でロックは使用していない.
//! 複数スレッドから利用する場合には、利用者側で排他制御を行う必要がある.
//!
//! [allocator]: ./allocator/index.html
//! [Allocator]: ./allocator/struct.Allocator.html
//! [arena]: ./arena/index.html
//! [region]: ./region/index.html
//! [RegionMemory]: ./region/trait.RegionMemory.html
//! [HeapRegion]: ./region/struct.HeapRegion.html
//! [MemHandle]: ./struct.MemHandle.html
#![warn(missing_docs)]
extern crate adler32;
extern crate byteorder;
extern crate prometrics;
#[macro_use]
extern crate slog;
#[macro_use]
extern crate trackable;
extern crate uuid;

pub use crate::error::{Error, ErrorKind};
pub use crate::handle::MemHandle;

macro_rules! track_io {
    ($expr:expr) => {
        $expr.map_err(|e: ::std::io::Error| track!(crate::Error::from(e)))
    };
}

pub mod allocator;
pub mod arena;
pub mod block;
pub mod metrics;
pub mod region;

mod error;
mod handle;

/// crate固有の`Result`型.
pub type Result<T> = std::result::Result<T, Error>;
