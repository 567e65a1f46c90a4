use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use uuid::Uuid;

use crate::error::{format_err, Result};

pub const MAGIC: u32 = 0x9E2A_83C1;

// Fixed header field offsets.
pub const VERSION_OFFSET:          u64 = 4;
pub const LICENSEE_OFFSET:         u64 = 6;
pub const PACKAGE_FLAGS_OFFSET:    u64 = 8;
pub const NAME_COUNT_OFFSET:       u64 = 12;
pub const NAME_TABLE_OFFSET:       u64 = 16;
pub const EXPORT_COUNT_OFFSET:     u64 = 20;
pub const EXPORT_TABLE_OFFSET:     u64 = 24;
pub const IMPORT_COUNT_OFFSET:     u64 = 28;
pub const IMPORT_TABLE_OFFSET:     u64 = 32;
pub const GUID_OFFSET:             u64 = 36;
pub const GENERATIONS_OFFSET:      u64 = 52;

/// Snapshot of table sizes recorded each time the package was saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub export_count: u32,
    pub name_count:   u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageHeader {
    pub version:       u16,
    pub licensee:      u16,
    pub package_flags: u32,
    pub name_count:    u32,
    pub name_offset:   u32,
    pub export_count:  u32,
    pub export_offset: u32,
    pub import_count:  u32,
    pub import_offset: u32,
    pub guid:          Uuid,
    pub generations:   Vec<Generation>,
}

impl PackageHeader {
    pub fn new(version: u16, licensee: u16) -> Self {
        Self {
            version,
            licensee,
            package_flags: 0,
            name_count:    0,
            name_offset:   0,
            export_count:  0,
            export_offset: 0,
            import_count:  0,
            import_offset: 0,
            guid:          Uuid::new_v4(),
            generations:   Vec::new(),
        }
    }

    /// Encoded size, generation list included.
    pub fn encoded_len(&self) -> u64 {
        GENERATIONS_OFFSET + 4 + 8 * self.generations.len() as u64
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_u32::<LittleEndian>(MAGIC)?;
        writer.write_u16::<LittleEndian>(self.version)?;
        writer.write_u16::<LittleEndian>(self.licensee)?;
        writer.write_u32::<LittleEndian>(self.package_flags)?;
        writer.write_u32::<LittleEndian>(self.name_count)?;
        writer.write_u32::<LittleEndian>(self.name_offset)?;
        writer.write_u32::<LittleEndian>(self.export_count)?;
        writer.write_u32::<LittleEndian>(self.export_offset)?;
        writer.write_u32::<LittleEndian>(self.import_count)?;
        writer.write_u32::<LittleEndian>(self.import_offset)?;
        writer.write_all(self.guid.as_bytes())?;
        write_generations(&mut writer, &self.generations)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != MAGIC {
            return Err(format_err(format!("invalid magic {magic:#010x}")));
        }
        let version       = reader.read_u16::<LittleEndian>()?;
        let licensee      = reader.read_u16::<LittleEndian>()?;
        let package_flags = reader.read_u32::<LittleEndian>()?;
        let name_count    = reader.read_u32::<LittleEndian>()?;
        let name_offset   = reader.read_u32::<LittleEndian>()?;
        let export_count  = reader.read_u32::<LittleEndian>()?;
        let export_offset = reader.read_u32::<LittleEndian>()?;
        let import_count  = reader.read_u32::<LittleEndian>()?;
        let import_offset = reader.read_u32::<LittleEndian>()?;
        let mut guid_bytes = [0u8; 16];
        reader.read_exact(&mut guid_bytes)?;

        let generation_count = reader.read_u32::<LittleEndian>()?;
        if generation_count > 0xFFFF {
            return Err(format_err(format!("implausible generation count {generation_count}")));
        }
        let mut generations = Vec::with_capacity(generation_count as usize);
        for _ in 0..generation_count {
            generations.push(Generation {
                export_count: reader.read_u32::<LittleEndian>()?,
                name_count:   reader.read_u32::<LittleEndian>()?,
            });
        }

        Ok(Self {
            version,
            licensee,
            package_flags,
            name_count,
            name_offset,
            export_count,
            export_offset,
            import_count,
            import_offset,
            guid: Uuid::from_bytes(guid_bytes),
            generations,
        })
    }
}

pub(crate) fn write_generations<W: Write>(mut writer: W, generations: &[Generation]) -> Result<()> {
    writer.write_u32::<LittleEndian>(generations.len() as u32)?;
    for g in generations {
        writer.write_u32::<LittleEndian>(g.export_count)?;
        writer.write_u32::<LittleEndian>(g.name_count)?;
    }
    Ok(())
}
