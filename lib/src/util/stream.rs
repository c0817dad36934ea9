use std::io::{Read, Seek, SeekFrom, Write};

use binrw::{BinRead, BinReaderExt, BinWrite, BinWriterExt, Endian};

use crate::error::{Error, Result};

/// All Cobra formats are little-endian.
pub const ENDIAN: Endian = Endian::Little;

/// Reads a value, reporting short reads as [`Error::TruncatedInput`] at the
/// offset where the value started.
#[inline]
pub fn read_value<T, R>(reader: &mut R) -> Result<T>
where
    T: BinRead,
    for<'a> T::Args<'a>: Default + Clone,
    R: Read + Seek,
{
    read_value_args(reader, Default::default())
}

#[inline]
pub fn read_value_args<'a, T, R>(reader: &mut R, args: T::Args<'a>) -> Result<T>
where
    T: BinRead,
    T::Args<'a>: Clone,
    R: Read + Seek,
{
    let start = reader.stream_position()?;
    reader.read_type_args::<T>(ENDIAN, args).map_err(|e| located(e, start))
}

/// Reads `count` values in sequence.
pub fn read_values<T, R>(reader: &mut R, count: usize) -> Result<Vec<T>>
where
    T: BinRead,
    for<'a> T::Args<'a>: Default + Clone,
    R: Read + Seek,
{
    let mut out = Vec::with_capacity(count.min(0x10000));
    for _ in 0..count {
        out.push(read_value(reader)?);
    }
    Ok(out)
}

fn located(err: binrw::Error, start: u64) -> Error {
    if err.is_eof() {
        Error::TruncatedInput { offset: start }
    } else {
        err.into()
    }
}

/// Number of bytes remaining between the current position and the end.
pub fn remaining<R: Seek>(reader: &mut R) -> Result<u64> {
    let pos = reader.stream_position()?;
    let end = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(pos))?;
    Ok(end.saturating_sub(pos))
}

#[inline]
pub fn align_up(value: u64, align: u64) -> u64 { (value + align - 1) & !(align - 1) }

/// Skips forward to the next multiple of `align`, counted from `base`.
pub fn align_reader<R: Read + Seek>(reader: &mut R, base: u64, align: u64) -> Result<()> {
    let pos = reader.stream_position()?;
    skip_padding(reader, base + align_up(pos - base, align))
}

/// Skips padding up to `target`. Padding must be zero bytes.
pub fn skip_padding<R: Read + Seek>(reader: &mut R, target: u64) -> Result<()> {
    let pos = reader.stream_position()?;
    if target < pos {
        return Err(Error::malformed(format!(
            "Read position {pos:#x} is already past {target:#x}"
        )));
    }
    if remaining(reader)? < target - pos {
        return Err(Error::TruncatedInput { offset: pos });
    }
    let mut padding = vec![0u8; (target - pos) as usize];
    reader.read_exact(&mut padding)?;
    if let Some(i) = padding.iter().position(|&b| b != 0) {
        return Err(Error::malformed(format!("Non-zero padding at {:#x}", pos + i as u64)));
    }
    Ok(())
}

/// Pads with zero bytes up to the next multiple of `align`, counted from `base`.
pub fn align_writer<W: Write + Seek>(writer: &mut W, base: u64, align: u64) -> Result<()> {
    let pos = writer.stream_position()?;
    pad_to(writer, base + align_up(pos - base, align))
}

/// Pads with zero bytes until the stream reaches `target`.
pub fn pad_to<W: Write + Seek>(writer: &mut W, target: u64) -> Result<()> {
    let pos = writer.stream_position()?;
    if target < pos {
        return Err(Error::malformed(format!(
            "Write position {pos:#x} is already past {target:#x}"
        )));
    }
    if target > pos {
        writer.write_all(&vec![0u8; (target - pos) as usize])?;
    }
    Ok(())
}

#[inline]
pub fn write_value<T, W>(writer: &mut W, value: &T) -> Result<()>
where
    T: BinWrite,
    for<'a> T::Args<'a>: Default + Clone,
    W: Write + Seek,
{
    write_value_args(writer, value, Default::default())
}

#[inline]
pub fn write_value_args<'a, T, W>(writer: &mut W, value: &T, args: T::Args<'a>) -> Result<()>
where
    T: BinWrite,
    W: Write + Seek,
{
    writer.write_type_args(value, ENDIAN, args)?;
    Ok(())
}

/// An in-memory writer that refuses to grow past a fixed capacity.
#[derive(Debug)]
pub struct BoundedWriter {
    data: Vec<u8>,
    pos: usize,
    capacity: usize,
}

impl BoundedWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: Vec::with_capacity(capacity), pos: 0, capacity }
    }

    #[inline]
    pub fn capacity(&self) -> usize { self.capacity }

    #[inline]
    pub fn len(&self) -> usize { self.data.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    pub fn into_inner(self) -> Vec<u8> { self.data }
}

impl Write for BoundedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let end = self.pos + buf.len();
        if end > self.capacity {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                Error::CapacityExceeded { capacity: self.capacity, requested: end },
            ));
        }
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
}

impl Seek for BoundedWriter {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(p) => self.data.len() as i64 + p,
            SeekFrom::Current(p) => self.pos as i64 + p,
        };
        if target < 0 || target as usize > self.capacity {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Seek to {target} outside buffer of {} bytes", self.capacity),
            ));
        }
        self.pos = target as usize;
        Ok(self.pos as u64)
    }
}

/// Recovers [`Error::CapacityExceeded`] from the I/O error raised by [`BoundedWriter`].
pub fn unwrap_capacity_error(err: Error) -> Error {
    match err {
        Error::Io(e) if e.kind() == std::io::ErrorKind::WriteZero => {
            match e.into_inner().map(|inner| inner.downcast::<Error>()) {
                Some(Ok(inner)) => *inner,
                Some(Err(inner)) => {
                    Error::Io(std::io::Error::new(std::io::ErrorKind::WriteZero, inner))
                }
                None => Error::Io(std::io::ErrorKind::WriteZero.into()),
            }
        }
        e => e,
    }
}
