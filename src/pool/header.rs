use adler32::RollingAdler32;
use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use uuid::Uuid;

use crate::block::BlockSize;
use crate::pool::{MAGIC_NUMBER, MAJOR_VERSION, MINOR_VERSION};
use crate::{ErrorKind, Result};

/// ヘッダを表現するのに必要なバイト数.
const HEADER_SIZE: u16 =
    2 /* major_version */ +
    2 /* minor_version */ +
    16 /* UUID */ +
    8 /* block_size */ +
    8 /* block_count */ +
    8 /* pool_size */ +
    8 /* allocation_table_offset */ +
    8 /* record_count */ +
    4 /* checksum */;

/// **マジックナンバー** と **ヘッダサイズ** も含めたサイズ.
pub const FULL_HEADER_SIZE: usize = 4 + 2 + HEADER_SIZE as usize;

/// プールのヘッダ情報.
///
/// `MetadataPlacement::InBuffer`の場合には、バッファの先頭にエンコードされた状態で格納される.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolHeader {
    /// メジャーバージョン.
    ///
    /// メジャーバージョンが異なるメタデータ同士の形式には互換性が無い.
    pub major_version: u16,

    /// マイナーバージョン.
    pub minor_version: u16,

    /// プールの特定のインスタンスを識別するためのUUID.
    pub instance_uuid: Uuid,

    /// ブロックサイズ.
    pub block_size: BlockSize,

    /// ブロック数.
    pub block_count: usize,

    /// 割当情報テーブルの開始位置(プール先頭からのオフセット).
    ///
    /// 割当情報テーブルがバッファ外にある場合には`0`.
    pub allocation_table_offset: usize,

    /// これまでに使用された割当情報レコードのスロット数.
    pub record_count: usize,
}
impl PoolHeader {
    /// プール全体のサイズ(バイト単位)を返す.
    ///
    /// 常に`block_count * block_size`と等しい.
    pub fn pool_size(&self) -> usize {
        self.block_count * self.block_size.as_usize()
    }

    /// ヘッダ情報を`reader`から読み込む.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        // magic number
        let mut magic_number = [0; 4];
        track_io!(reader.read_exact(&mut magic_number))?;
        track_assert_eq!(magic_number, MAGIC_NUMBER, ErrorKind::InvalidInput);

        // header size
        let header_size = track_io!(reader.read_u16::<BigEndian>())?;
        track_assert_eq!(header_size, HEADER_SIZE, ErrorKind::InvalidInput);
        let mut buf = [0; HEADER_SIZE as usize];
        track_io!(reader.read_exact(&mut buf))?;

        // checksum
        let (body, checksum) = buf.split_at(HEADER_SIZE as usize - 4);
        track_assert_eq!(
            RollingAdler32::from_buffer(body).hash(),
            BigEndian::read_u32(checksum),
            ErrorKind::InvalidInput,
            "Header checksum mismatched"
        );

        let mut reader = body;

        // versions
        let major_version = track_io!(reader.read_u16::<BigEndian>())?;
        let minor_version = track_io!(reader.read_u16::<BigEndian>())?;
        track_assert_eq!(
            major_version,
            MAJOR_VERSION,
            ErrorKind::InvalidInput,
            "Unsupported major version",
        );
        track_assert!(
            minor_version <= MINOR_VERSION,
            ErrorKind::InvalidInput,
            "Unsupported minor version: actual={}, supported={}",
            minor_version,
            MINOR_VERSION
        );

        // UUID
        let mut instance_uuid = [0; 16];
        track_io!(reader.read_exact(&mut instance_uuid))?;
        let instance_uuid = Uuid::from_bytes(instance_uuid);

        // sizes
        let block_size = track_io!(reader.read_u64::<BigEndian>())? as usize;
        let block_size = track!(BlockSize::new(block_size), "block_size:{}", block_size)?;
        let block_count = track_io!(reader.read_u64::<BigEndian>())? as usize;
        let pool_size = track_io!(reader.read_u64::<BigEndian>())? as usize;
        track_assert_eq!(
            block_count.checked_mul(block_size.as_usize()),
            Some(pool_size),
            ErrorKind::InvalidInput,
            "block_count:{}, block_size:{}",
            block_count,
            block_size.as_usize()
        );

        let allocation_table_offset = track_io!(reader.read_u64::<BigEndian>())? as usize;
        track_assert!(
            allocation_table_offset < pool_size,
            ErrorKind::InvalidInput,
            "allocation_table_offset:{}",
            allocation_table_offset
        );
        let record_count = track_io!(reader.read_u64::<BigEndian>())? as usize;

        track_assert!(reader.is_empty(), ErrorKind::InvalidInput);
        Ok(PoolHeader {
            major_version,
            minor_version,
            instance_uuid,
            block_size,
            block_count,
            allocation_table_offset,
            record_count,
        })
    }

    /// ヘッダ情報を`writer`に書き込む.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let mut body = Vec::with_capacity(HEADER_SIZE as usize);
        track_io!(body.write_u16::<BigEndian>(self.major_version))?;
        track_io!(body.write_u16::<BigEndian>(self.minor_version))?;
        track_io!(body.write_all(self.instance_uuid.as_bytes()))?;
        track_io!(body.write_u64::<BigEndian>(self.block_size.as_usize() as u64))?;
        track_io!(body.write_u64::<BigEndian>(self.block_count as u64))?;
        track_io!(body.write_u64::<BigEndian>(self.pool_size() as u64))?;
        track_io!(body.write_u64::<BigEndian>(
            self.allocation_table_offset as u64
        ))?;
        track_io!(body.write_u64::<BigEndian>(self.record_count as u64))?;
        let checksum = RollingAdler32::from_buffer(&body).hash();

        track_io!(writer.write_all(&MAGIC_NUMBER[..]))?;
        track_io!(writer.write_u16::<BigEndian>(HEADER_SIZE))?;
        track_io!(writer.write_all(&body))?;
        track_io!(writer.write_u32::<BigEndian>(checksum))?;
        Ok(())
    }
}
