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
impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        if *e.kind() == ErrorKind::InvalidInput {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
        } else {
            std::io::Error::new(std::io::ErrorKind::Other, e)
        }
    }
}

/// 発生し得るエラーの種別.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// プールに十分な空きブロックが存在しない.
    ///
    /// 要求ブロック数が総ブロック数を超えている場合と、
    /// 要求を満たす連続した空きブロック列が見つからなかった場合の両方を含む.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者が不要な割当を解放した上でリトライする
    /// - より大きなプールを作り直す
    PoolFull,

    /// 割当情報テーブルに新しいレコードを格納する余地がない.
    ///
    /// ブロック自体に空きがあっても、テーブルの拡張先のブロックが
    /// 既に割当済みの場合には、このエラーが返される.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者が不要な割当を解放する (解放済みレコードのスロットは再利用される)
    MetadataFull,

    /// プールの領域(バックエンドのバッファ)を確保できなかった.
    ///
    /// # 典型的な対応策
    ///
    /// - より小さなサイズでプールを作成する
    BufferUnavailable,

    /// プールが作成されていない(ないし既に破棄されている).
    ///
    /// # 典型的な対応策
    ///
    /// - 先にプールを作成する
    PoolNotCreated,

    /// 入力が不正.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正して入力を正しくする
    InvalidInput,

    /// 内部状態が不整合に陥っている.
    ///
    /// プログラムにバグがあることを示している.
    ///
    /// # 典型的な対応策
    ///
    /// - バグ修正を行ってプログラムを更新する
    InconsistentState,

    /// その他エラー.
    ///
    /// E.g., メタデータの読み書き時のI/Oエラー
    Other,
}
impl trackable::error::ErrorKind for ErrorKind {}
