use std;
use trackable;
use trackable::error::ErrorKindExt;

/// crate固有のエラー型.
#[derive(Debug, Clone, TrackableError)]
pub struct Error(trackable::error::TrackableError<ErrorKind>);
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if let Some(e) = e.get_ref().and_then(|e| e.downcast_ref::<Error>()).cloned() {
            e
        } else if e.kind() == std::io::ErrorKind::InvalidInput {
            ErrorKind::InvalidInput.cause(e).into()
        } else {
            ErrorKind::Other.cause(e).into()
        }
    }
}

/// 発生し得るエラーの種別.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 入力が不正.
    ///
    /// アロケータ構築時の容量がヘッダ一つとアライメント単位一つ分に満たない場合や、
    /// 不正なアライメント単位が指定された場合に、このエラーが返される.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正して入力を正しくする
    InvalidInput,

    /// ハンドルが不正.
    ///
    /// 別のアリーナに属するハンドル、領域外のオフセットを指すハンドル、
    /// および解放済みブロックの再解放に対して、このエラーが返される.
    ///
    /// このエラーが返された場合でも、アロケータの状態は一切変更されていない.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側でハンドルの受け渡しと破棄のタイミングを見直す
    InvalidPointer,

    /// 内部状態が不整合に陥っている.
    ///
    /// ブロックヘッダのチェックサム検証が失敗した場合等に、このエラーが返される.
    /// プログラムにバグがあるか、領域のバイト列が外部から破壊されたことを示している.
    ///
    /// # 典型的な対応策
    ///
    /// - もしバグであれば、バグ修正を行ってプログラムを更新する
    /// - それが無理であれば、諦めてアロケータを破棄し、新しい領域で初期化し直す
    InconsistentState,

    /// その他エラー.
    ///
    /// E.g., ヘッダ読み書き時のI/Oエラー
    Other,
}
impl trackable::error::ErrorKind for ErrorKind {}
