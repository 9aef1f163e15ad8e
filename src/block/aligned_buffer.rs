use std::ops::Range;
use std::ptr::NonNull;
use std::slice;
use trackable::error::ErrorKindExt;

use crate::block::BlockSize;
use crate::{ErrorKind, Result};

/// 先頭アドレスがブロック境界に揃えられた、プールのバックエンド用バッファ.
///
/// 内部的には`Vec<u8>`をアライメント分だけ余分に確保し、境界に揃う位置を先頭として扱う.
/// 確保後に`Vec`が再アロケートされることはないため、
/// 各位置のアドレスはインスタンスが破棄されるまで変化しない.
#[derive(Debug)]
pub struct AlignedBuffer {
    buf: Vec<u8>,
    offset: usize,
    base: NonNull<u8>,
}
unsafe impl Send for AlignedBuffer {}
impl AlignedBuffer {
    /// ゼロ埋めされた、長さ`len`のバッファを確保する.
    ///
    /// # Errors
    ///
    /// 必要な領域が確保できない場合には、種類が`ErrorKind::BufferUnavailable`のエラーが返される.
    /// ただし、検出できるのは領域の予約に失敗した場合のみで、
    /// オーバーコミット環境でゼロ埋め中に物理メモリが枯渇した場合はプロセスが終了する.
    pub fn new(len: usize, block_size: BlockSize) -> Result<Self> {
        let alignment = block_size.alignment();
        let capacity = track_assert_some!(
            len.checked_add(alignment - 1),
            ErrorKind::BufferUnavailable,
            "Too large buffer: {}",
            len
        );

        let mut buf = Vec::new();
        track!(buf
            .try_reserve_exact(capacity)
            .map_err(|e| ErrorKind::BufferUnavailable.cause(e)))?;
        buf.resize(capacity, 0);

        // 確保済み領域の範囲内で切り詰めるだけなので、再アロケートは発生しない
        let offset = alignment_offset(&buf, alignment);
        buf.truncate(offset + len);

        let base = unsafe { NonNull::new_unchecked(buf.as_mut_ptr().add(offset)) };
        Ok(AlignedBuffer { buf, offset, base })
    }

    /// バッファの先頭アドレスを返す.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// バッファの長さ(バイト単位)を返す.
    pub fn len(&self) -> usize {
        self.buf.len() - self.offset
    }

    /// `ptr`のバッファ先頭からのオフセットを返す.
    ///
    /// `ptr`がバッファの範囲外を指している場合には`None`が返される.
    pub fn offset_of(&self, ptr: *const u8) -> Option<usize> {
        let base = self.base.as_ptr() as usize;
        let addr = ptr as usize;
        if base <= addr && addr - base < self.len() {
            Some(addr - base)
        } else {
            None
        }
    }

    /// 指定オフセット位置のアドレスを返す.
    pub fn ptr_at(&self, offset: usize) -> Option<NonNull<u8>> {
        if offset < self.len() {
            Some(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) })
        } else {
            None
        }
    }

    /// 指定範囲のバイト列を返す.
    pub fn bytes(&self, range: Range<usize>) -> Option<&[u8]> {
        if self.contains_range(&range) {
            Some(unsafe {
                slice::from_raw_parts(self.base.as_ptr().add(range.start), range.len())
            })
        } else {
            None
        }
    }

    /// 指定範囲のバイト列を、書き込み可能な形で返す.
    pub fn bytes_mut(&mut self, range: Range<usize>) -> Option<&mut [u8]> {
        if self.contains_range(&range) {
            Some(unsafe {
                slice::from_raw_parts_mut(self.base.as_ptr().add(range.start), range.len())
            })
        } else {
            None
        }
    }

    fn contains_range(&self, range: &Range<usize>) -> bool {
        range.start <= range.end && range.end <= self.len()
    }
}

fn alignment_offset(buf: &[u8], alignment: usize) -> usize {
    let addr = buf.as_ptr() as usize;
    (alignment - addr % alignment) % alignment
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;

    #[test]
    fn new_works() -> TestResult {
        let block_size = track!(BlockSize::new(1024))?;
        let buf = track!(AlignedBuffer::new(4096, block_size))?;
        assert_eq!(buf.len(), 4096);
        assert_eq!(buf.base().as_ptr() as usize % 1024, 0);
        assert_eq!(buf.bytes(0..4096), Some(&[0; 4096][..]));
        Ok(())
    }

    #[test]
    fn too_large_buffer_is_rejected() -> TestResult {
        let block_size = track!(BlockSize::new(16))?;
        let e = AlignedBuffer::new(usize::max_value(), block_size).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::BufferUnavailable));

        let e = AlignedBuffer::new(usize::max_value() / 2, block_size).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::BufferUnavailable));
        Ok(())
    }

    #[test]
    fn offset_of_works() -> TestResult {
        let buf = track!(AlignedBuffer::new(100, track!(BlockSize::new(10))?))?;
        let base = buf.base().as_ptr();
        assert_eq!(buf.offset_of(base), Some(0));
        assert_eq!(buf.offset_of(base.wrapping_add(99)), Some(99));
        assert_eq!(buf.offset_of(base.wrapping_add(100)), None);
        assert_eq!(buf.offset_of(base.wrapping_sub(1)), None);
        assert_eq!(buf.ptr_at(99).map(|p| p.as_ptr()), Some(base.wrapping_add(99)));
        assert_eq!(buf.ptr_at(100), None);
        Ok(())
    }

    #[test]
    fn bytes_mut_works() -> TestResult {
        let mut buf = track!(AlignedBuffer::new(64, track!(BlockSize::new(8))?))?;
        buf.bytes_mut(8..12)
            .expect("in range")
            .copy_from_slice(b"pool");
        assert_eq!(buf.bytes(8..12), Some(&b"pool"[..]));
        assert_eq!(buf.bytes(0..8), Some(&[0; 8][..]));

        assert!(buf.bytes_mut(60..65).is_none());
        assert!(buf.bytes(65..65).is_none());
        Ok(())
    }
}
