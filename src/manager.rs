//! プールの生成・破棄のライフサイクル管理.
use std::ptr::NonNull;

use crate::pool::{Pool, PoolBuilder};
use crate::{ErrorKind, Result};

/// 高々一つのプールを保持し、その生成と破棄を管理するための構造体.
///
/// プールが存在しない状態での操作は、エラーないし`None`となる.
/// 独立した複数のプールが必要な場合には、`PoolManager`を複数生成すればよい.
///
/// # Examples
///
/// ```
/// use blockpool::ErrorKind;
/// use blockpool::manager::PoolManager;
///
/// let mut manager = PoolManager::new();
/// assert_eq!(manager.alloc(10).err().map(|e| *e.kind()), Some(ErrorKind::PoolNotCreated));
///
/// assert!(manager.create(32, 128).unwrap());
/// assert!(!manager.create(32, 128).unwrap()); // 既に存在する
///
/// let ptr = manager.alloc(10).unwrap();
/// assert_eq!(manager.block_for(31), Some(ptr));
/// ```
#[derive(Debug, Default)]
pub struct PoolManager {
    builder: PoolBuilder,
    pool: Option<Pool>,
}
impl PoolManager {
    /// デフォルト設定の`PoolBuilder`を用いる、新しい`PoolManager`インスタンスを生成する.
    pub fn new() -> Self {
        Self::default()
    }

    /// プールの生成に`builder`を用いる、新しい`PoolManager`インスタンスを生成する.
    pub fn with_builder(builder: PoolBuilder) -> Self {
        PoolManager {
            builder,
            pool: None,
        }
    }

    /// `block_size`バイトのブロックを`block_count`個持つプールを生成する.
    ///
    /// 既にプールが存在する場合には何も行わずに`false`を返す.
    ///
    /// # Errors
    ///
    /// [PoolBuilder::create]を参照のこと.
    /// エラー時には、プールは生成されない.
    ///
    /// [PoolBuilder::create]: ../pool/struct.PoolBuilder.html#method.create
    pub fn create(&mut self, block_count: usize, block_size: usize) -> Result<bool> {
        if self.pool.is_some() {
            return Ok(false);
        }
        let pool = track!(self.builder.create(block_count, block_size))?;
        self.pool = Some(pool);
        Ok(true)
    }

    /// プールを破棄する.
    ///
    /// プールが存在しなかった場合には`false`を返す.
    ///
    /// 破棄後は、それまでに割り当てた全てのアドレスが無効となる.
    pub fn destroy(&mut self) -> bool {
        if let Some(pool) = self.pool.take() {
            info!(
                pool.logger(),
                "Pool destroyed";
                "live_spans" => pool.metrics().live_spans()
            );
            true
        } else {
            false
        }
    }

    /// プールが存在するかどうかを判定する.
    pub fn is_created(&self) -> bool {
        self.pool.is_some()
    }

    /// プールへの参照を返す.
    pub fn pool(&self) -> Option<&Pool> {
        self.pool.as_ref()
    }

    /// プールへの可変参照を返す.
    pub fn pool_mut(&mut self) -> Option<&mut Pool> {
        self.pool.as_mut()
    }

    /// `size`バイト分の領域を割り当てる.
    ///
    /// # Errors
    ///
    /// プールが存在しない場合には、種類が`ErrorKind::PoolNotCreated`のエラーが返される.
    /// それ以外は[Pool::alloc]を参照のこと.
    ///
    /// [Pool::alloc]: ../pool/struct.Pool.html#method.alloc
    pub fn alloc(&mut self, size: usize) -> Result<NonNull<u8>> {
        let pool = track_assert_some!(self.pool.as_mut(), ErrorKind::PoolNotCreated);
        track!(pool.alloc(size))
    }

    /// `ptr`から始まる割当を解放する.
    ///
    /// プールが存在しない場合や、`ptr`が割当中の領域の先頭ではない場合には、何も行わない.
    pub fn free(&mut self, ptr: *const u8) {
        if let Some(pool) = self.pool.as_mut() {
            pool.free(ptr);
        }
    }

    /// `ptr`から`size`バイトの範囲をゼロで埋める.
    ///
    /// `ptr`がヌルポインタの場合には何も行わない.
    ///
    /// # Errors
    ///
    /// - プールが存在しない場合には`ErrorKind::PoolNotCreated`
    /// - 範囲がプールのバッファ内に収まっていない場合には`ErrorKind::InvalidInput`
    pub fn clear(&mut self, ptr: *mut u8, size: usize) -> Result<()> {
        if ptr.is_null() {
            return Ok(());
        }
        let pool = track_assert_some!(self.pool.as_mut(), ErrorKind::PoolNotCreated);
        track!(pool.clear(ptr, size))
    }

    /// `index`番目のブロックの先頭アドレスを返す.
    pub fn block_for(&self, index: usize) -> Option<NonNull<u8>> {
        self.pool.as_ref()?.block_for(index)
    }

    /// `ptr`を含むブロックのインデックスを返す.
    pub fn index_for(&self, ptr: *const u8) -> Option<usize> {
        self.pool.as_ref()?.index_for(ptr)
    }
}

#[cfg(test)]
mod tests {
    use byteorder::{ByteOrder, LittleEndian};
    use std::ptr;
    use trackable::result::TestResult;

    use super::*;
    use crate::pool::{BlockStatus, MetadataPlacement};

    #[test]
    fn lifecycle_works() -> TestResult {
        let mut manager = PoolManager::new();
        assert!(!manager.is_created());
        assert!(!manager.destroy());

        assert!(track!(manager.create(1024, 1024))?);
        assert!(manager.is_created());
        assert_eq!(manager.pool().map(|p| p.system_blocks()), Some(18));

        // 二重生成は何もしない
        let base = manager.block_for(0);
        assert!(!track!(manager.create(16, 16))?);
        assert_eq!(manager.block_for(0), base);
        assert_eq!(manager.pool().map(|p| p.block_count()), Some(1024));

        assert!(manager.destroy());
        assert!(!manager.is_created());
        assert!(!manager.destroy());

        // 破棄後は再生成できる
        assert!(track!(manager.create(16, 64))?);
        assert_eq!(manager.pool().map(|p| p.block_count()), Some(16));
        Ok(())
    }

    #[test]
    fn failed_creation_leaves_no_pool() -> TestResult {
        let mut manager = PoolManager::new();
        let e = manager.create(0, 1024).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidInput));

        let e = manager.create(usize::max_value(), 1024).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::BufferUnavailable));
        assert!(!manager.is_created());
        Ok(())
    }

    #[test]
    fn scenario_works() -> TestResult {
        let mut manager = PoolManager::new();
        assert!(track!(manager.create(1024, 1024))?);

        let ptr = track!(manager.alloc(1024 * 768))?;
        assert_eq!(manager.index_for(ptr.as_ptr()), Some(256));
        assert_eq!(manager.block_for(256), Some(ptr));

        {
            let pool = manager.pool_mut().expect("created");
            let bytes = pool.bytes_mut(ptr.as_ptr()).expect("allocated");
            for (i, chunk) in bytes.chunks_mut(4).enumerate() {
                LittleEndian::write_i32(chunk, i as i32);
            }
        }
        {
            let pool = manager.pool().expect("created");
            let bytes = pool.bytes(ptr.as_ptr()).expect("allocated");
            assert_eq!(bytes.len() / 4, 768 * 256);
            for (i, chunk) in bytes.chunks(4).enumerate() {
                assert_eq!(LittleEndian::read_i32(chunk), i as i32);
            }
        }

        // 二度目の大きな割当は、状態を変えずに失敗する
        let e = manager.alloc(1024 * 768).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::PoolFull));
        let pool = manager.pool().expect("created");
        assert_eq!(pool.allocated_blocks(), 768);
        assert_eq!(pool.block_status(255), Some(BlockStatus::Free));

        manager.free(ptr.as_ptr());
        assert_eq!(manager.pool().map(|p| p.allocated_blocks()), Some(0));
        assert!(manager.destroy());

        let e = manager.alloc(1).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::PoolNotCreated));
        Ok(())
    }

    #[test]
    fn absent_pool_operations_are_harmless() -> TestResult {
        let mut manager = PoolManager::new();
        assert_eq!(manager.block_for(0), None);
        assert_eq!(manager.index_for(ptr::null()), None);
        manager.free(ptr::null());
        track!(manager.clear(ptr::null_mut(), 10))?;

        let mut buf = [0u8; 4];
        let e = manager.clear(buf.as_mut_ptr(), 4).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::PoolNotCreated));
        Ok(())
    }

    #[test]
    fn out_of_range_lookups() -> TestResult {
        let mut manager = PoolManager::new();
        assert!(track!(manager.create(8, 32))?);
        assert_eq!(manager.block_for(8), None);
        assert_eq!(manager.index_for(ptr::null()), None);

        let outside = [0u8; 4];
        assert_eq!(manager.index_for(outside.as_ptr()), None);

        // プール外のアドレスの解放は無視される
        manager.free(outside.as_ptr());
        let pool = manager.pool().expect("created");
        assert_eq!(pool.metrics().unrecognized_frees(), 1);
        Ok(())
    }

    #[test]
    fn with_builder_works() -> TestResult {
        let mut builder = PoolBuilder::new();
        builder.metadata_placement(MetadataPlacement::External);
        let mut manager = PoolManager::with_builder(builder);
        assert!(track!(manager.create(4, 32))?);

        let ptr = track!(manager.alloc(4 * 32))?;
        assert_eq!(manager.index_for(ptr.as_ptr()), Some(0));
        assert!(manager.alloc(1).is_err());
        Ok(())
    }
}
