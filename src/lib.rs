//! Fixed-Block Memory Pool.
//!
//! `blockpool`は、一度だけ確保した大きなバッファを固定長のブロック群に分割し、
//! 可変長の割当要求に対して連続したブロック列(スパン)を払い出すメモリプール.
//!
//! # 特徴
//!
//! - プール作成時に一つのバッファを確保し、以後はシステムからの追加確保を一切行わない
//! - 割当の単位は"バイト"ではなく"ブロック"
//!   - 要求サイズはブロックサイズに切り上げられる
//! - 空きブロックの探索は、末尾(最大インデックス)から先頭に向かって行われる
//! - プール自身のメタデータ(ブロック情報テーブルと割当情報テーブル)は、
//!   デフォルトではバッファの先頭ブロック群に格納される ("SYSTEM"ブロック)
//!   - [`MetadataPlacement::External`]を指定すれば、バッファ外のメモリに保持することも可能
//! - スレッドセーフではない
//!   - 複数スレッドから利用する場合には、利用者側でプール全体を排他制御する必要がある
//!
//! # モジュールの依存関係
//!
//! ```text
//! manager => pool => block
//! ```
//!
//! - [manager]モジュール:
//!   - プールの生成・破棄のライフサイクルを管理する[PoolManager]を提供
//! - [pool]モジュール:
//!   - 主に[Pool]構造体と、その構築用の[PoolBuilder]を提供
//!   - ブロック情報テーブル・割当情報テーブル・アロケータ・アドレス変換を実装している
//! - [block]モジュール:
//!   - ブロックサイズを表現する[BlockSize]を提供
//!
//! # Examples
//!
//! ```
//! use blockpool::manager::PoolManager;
//!
//! let mut manager = PoolManager::new();
//! assert!(manager.create(64, 1024).unwrap());
//!
//! let ptr = manager.alloc(3000).unwrap();
//! assert!(manager.index_for(ptr.as_ptr()).is_some());
//!
//! manager.free(ptr.as_ptr());
//! assert!(manager.destroy());
//! assert!(manager.alloc(10).is_err());
//! ```
//!
//! [manager]: ./manager/index.html
//! [PoolManager]: ./manager/struct.PoolManager.html
//! [pool]: ./pool/index.html
//! [Pool]: ./pool/struct.Pool.html
//! [PoolBuilder]: ./pool/struct.PoolBuilder.html
//! [block]: ./block/index.html
//! [BlockSize]: ./block/struct.BlockSize.html
//! [`MetadataPlacement::External`]: ./pool/enum.MetadataPlacement.html
#![warn(missing_docs)]
extern crate adler32;
extern crate byteorder;
extern crate prometrics;
#[macro_use]
extern crate trackable;
extern crate uuid;
#[macro_use]
extern crate slog;

pub use crate::error::{Error, ErrorKind};

macro_rules! track_io {
    ($expr:expr) => {
        $expr.map_err(|e: ::std::io::Error| track!(crate::Error::from(e)))
    };
}

pub mod block;
pub mod manager;
pub mod metrics;
pub mod pool;

mod error;

/// crate固有の`Result`型.
pub type Result<T> = std::result::Result<T, Error>;
