//! In-memory I/O adapters for FFmpeg's custom AVIO layer.
//!
//! FFmpeg reads and writes through an `AVIOContext`, which can be backed by
//! arbitrary callbacks instead of a file. This module provides the two
//! adapters the pipeline needs:
//!
//! - [`SourceCursor`]: a read/seek cursor over the caller's input buffer,
//!   borrowed for the duration of the transcode (no copy of the source).
//! - [`GrowableSink`]: a `Vec<u8>`-backed writer that grows on demand and
//!   supports the backward seeks muxers use to patch container headers.
//!
//! The C-ABI callbacks receive the adapter as an opaque pointer; the owning
//! stage keeps the `Box` raw pointer alive until the format context that
//! uses it has been torn down.

use std::io::{self, Seek, SeekFrom, Write};
use std::os::raw::{c_int, c_void};

use ffmpeg_sys_next::{AVIOContext, AVERROR_EOF};

use crate::error::RewaveError;

/// Size of the staging buffer handed to `avio_alloc_context`.
pub(crate) const IO_BUFFER_SIZE: usize = 4096;

/// `AVSEEK_SIZE` whence flag: report the total stream size without seeking.
const AVSEEK_SIZE: c_int = 0x10000;
/// `AVSEEK_FORCE` whence flag: ORed in by some muxers, carries no position.
const AVSEEK_FORCE: c_int = 0x20000;

/// Read-only cursor over the caller's source bytes.
///
/// Stores raw slice parts rather than a `&[u8]` so the C callbacks stay free
/// of lifetime parameters; the input stage pins the borrow with a
/// `PhantomData` on its own type.
pub(crate) struct SourceCursor {
    data: *const u8,
    len: usize,
    position: usize,
}

impl SourceCursor {
    pub(crate) fn new(source: &[u8]) -> Self {
        SourceCursor { data: source.as_ptr(), len: source.len(), position: 0 }
    }
}

/// Growable in-memory output sink.
///
/// Writes past the end extend the buffer; backward seeks followed by writes
/// overwrite in place, which is how muxers patch size fields in headers
/// after the trailer. The initial capacity is only an estimate, so an
/// undershoot costs reallocations but never correctness.
pub(crate) struct GrowableSink {
    buffer: Vec<u8>,
    position: u64,
}

impl GrowableSink {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        GrowableSink { buffer: Vec::with_capacity(capacity), position: 0 }
    }

    /// Take the accumulated bytes, leaving the sink empty.
    pub(crate) fn take(&mut self) -> Vec<u8> {
        self.position = 0;
        std::mem::take(&mut self.buffer)
    }
}

impl Write for GrowableSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let start = self.position as usize;
        let end = start + data.len();
        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
        }
        self.buffer[start..end].copy_from_slice(data);
        self.position = end as u64;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for GrowableSink {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.position as i64 + offset,
            SeekFrom::End(offset) => self.buffer.len() as i64 + offset,
        };
        if target < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before start"));
        }
        self.position = target as u64;
        Ok(self.position)
    }
}

/// Read callback for the input AVIO context.
pub(crate) unsafe extern "C" fn read_source(
    opaque: *mut c_void,
    buf: *mut u8,
    buf_size: c_int,
) -> c_int {
    let cursor = unsafe { &mut *(opaque as *mut SourceCursor) };
    let remaining = cursor.len - cursor.position;
    if remaining == 0 {
        return AVERROR_EOF;
    }
    let count = remaining.min(buf_size.max(0) as usize);
    unsafe {
        std::ptr::copy_nonoverlapping(cursor.data.add(cursor.position), buf, count);
    }
    cursor.position += count;
    count as c_int
}

/// Seek callback for the input AVIO context.
pub(crate) unsafe extern "C" fn seek_source(
    opaque: *mut c_void,
    offset: i64,
    whence: c_int,
) -> i64 {
    let cursor = unsafe { &mut *(opaque as *mut SourceCursor) };
    if whence & AVSEEK_SIZE != 0 {
        return cursor.len as i64;
    }
    let target = match whence & !AVSEEK_FORCE {
        0 => offset,                              // SEEK_SET
        1 => cursor.position as i64 + offset,     // SEEK_CUR
        2 => cursor.len as i64 + offset,          // SEEK_END
        _ => return -1,
    };
    if target < 0 || target > cursor.len as i64 {
        return -1;
    }
    cursor.position = target as usize;
    target
}

/// Write callback for the output AVIO context.
pub(crate) unsafe extern "C" fn write_sink(
    opaque: *mut c_void,
    buf: *const u8,
    buf_size: c_int,
) -> c_int {
    let sink = unsafe { &mut *(opaque as *mut GrowableSink) };
    let data = unsafe { std::slice::from_raw_parts(buf, buf_size.max(0) as usize) };
    match sink.write(data) {
        Ok(written) => written as c_int,
        Err(_) => -1,
    }
}

/// Seek callback for the output AVIO context.
pub(crate) unsafe extern "C" fn seek_sink(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    let sink = unsafe { &mut *(opaque as *mut GrowableSink) };
    if whence & AVSEEK_SIZE != 0 {
        return sink.buffer.len() as i64;
    }
    let seek_from = match whence & !AVSEEK_FORCE {
        0 if offset < 0 => return -1,
        0 => SeekFrom::Start(offset as u64),
        1 => SeekFrom::Current(offset),
        2 => SeekFrom::End(offset),
        _ => return -1,
    };
    match sink.seek(seek_from) {
        Ok(position) => position as i64,
        Err(_) => -1,
    }
}

/// Allocate a read-side AVIO context over `cursor`.
///
/// # Safety
///
/// `cursor` must stay valid until the context is freed with [`free_avio`].
pub(crate) unsafe fn alloc_reader_avio(
    cursor: *mut SourceCursor,
) -> Result<*mut AVIOContext, RewaveError> {
    unsafe {
        let buffer = ffmpeg_sys_next::av_malloc(IO_BUFFER_SIZE) as *mut u8;
        if buffer.is_null() {
            return Err(RewaveError::AllocationFailure("AVIO read buffer".to_string()));
        }
        let avio = ffmpeg_sys_next::avio_alloc_context(
            buffer,
            IO_BUFFER_SIZE as c_int,
            0,
            cursor as *mut c_void,
            Some(read_source),
            None,
            Some(seek_source),
        );
        if avio.is_null() {
            ffmpeg_sys_next::av_free(buffer as *mut c_void);
            return Err(RewaveError::AllocationFailure("AVIO read context".to_string()));
        }
        Ok(avio)
    }
}

/// Allocate a write-side AVIO context over `sink`.
///
/// # Safety
///
/// `sink` must stay valid until the context is freed with [`free_avio`].
pub(crate) unsafe fn alloc_writer_avio(
    sink: *mut GrowableSink,
) -> Result<*mut AVIOContext, RewaveError> {
    unsafe {
        let buffer = ffmpeg_sys_next::av_malloc(IO_BUFFER_SIZE) as *mut u8;
        if buffer.is_null() {
            return Err(RewaveError::AllocationFailure("AVIO write buffer".to_string()));
        }
        let avio = ffmpeg_sys_next::avio_alloc_context(
            buffer,
            IO_BUFFER_SIZE as c_int,
            1,
            sink as *mut c_void,
            None,
            Some(write_sink),
            Some(seek_sink),
        );
        if avio.is_null() {
            ffmpeg_sys_next::av_free(buffer as *mut c_void);
            return Err(RewaveError::AllocationFailure("AVIO write context".to_string()));
        }
        Ok(avio)
    }
}

/// Free an AVIO context allocated by this module.
///
/// The staging buffer is read back from the context because FFmpeg may have
/// reallocated it since `avio_alloc_context`.
///
/// # Safety
///
/// `avio` must come from [`alloc_reader_avio`] or [`alloc_writer_avio`] and
/// must not be referenced by any format context anymore.
pub(crate) unsafe fn free_avio(mut avio: *mut AVIOContext) {
    unsafe {
        if avio.is_null() {
            return;
        }
        if !(*avio).buffer.is_null() {
            ffmpeg_sys_next::av_free((*avio).buffer as *mut c_void);
            (*avio).buffer = std::ptr::null_mut();
        }
        ffmpeg_sys_next::avio_context_free(&mut avio);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_grows_and_overwrites_in_place() {
        let mut sink = GrowableSink::with_capacity(4);
        sink.write_all(b"hello world").expect("write");
        sink.seek(SeekFrom::Start(0)).expect("seek");
        sink.write_all(b"HELLO").expect("overwrite");
        assert_eq!(sink.take(), b"HELLO world");
    }

    #[test]
    fn sink_capacity_estimate_does_not_affect_contents() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let mut small = GrowableSink::with_capacity(1);
        let mut large = GrowableSink::with_capacity(1 << 20);
        small.write_all(&payload).expect("write");
        large.write_all(&payload).expect("write");
        assert_eq!(small.take(), large.take());
    }

    #[test]
    fn sink_rejects_seek_before_start() {
        let mut sink = GrowableSink::with_capacity(0);
        sink.write_all(b"abc").expect("write");
        assert!(sink.seek(SeekFrom::Current(-4)).is_err());
    }

    #[test]
    fn sink_rejects_negative_absolute_seek() {
        let mut sink = GrowableSink::with_capacity(0);
        sink.write_all(b"abc").expect("write");
        let opaque = &mut sink as *mut GrowableSink as *mut c_void;
        assert_eq!(unsafe { seek_sink(opaque, -1, 0) }, -1);
        assert_eq!(sink.position, 3);
        assert_eq!(unsafe { seek_sink(opaque, 1, 0) }, 1);
    }

    #[test]
    fn source_cursor_reads_until_eof() {
        let data = b"0123456789";
        let mut cursor = SourceCursor::new(data);
        let opaque = &mut cursor as *mut SourceCursor as *mut c_void;
        let mut buf = [0u8; 4];

        let first = unsafe { read_source(opaque, buf.as_mut_ptr(), 4) };
        assert_eq!(first, 4);
        assert_eq!(&buf, b"0123");

        let size = unsafe { seek_source(opaque, 0, AVSEEK_SIZE) };
        assert_eq!(size, 10);

        unsafe { seek_source(opaque, 8, 0) };
        let tail = unsafe { read_source(opaque, buf.as_mut_ptr(), 4) };
        assert_eq!(tail, 2);
        assert_eq!(&buf[..2], b"89");

        let eof = unsafe { read_source(opaque, buf.as_mut_ptr(), 4) };
        assert_eq!(eof, AVERROR_EOF);
    }

    #[test]
    fn source_cursor_rejects_out_of_range_seeks() {
        let data = b"abc";
        let mut cursor = SourceCursor::new(data);
        let opaque = &mut cursor as *mut SourceCursor as *mut c_void;
        assert_eq!(unsafe { seek_source(opaque, -1, 0) }, -1);
        assert_eq!(unsafe { seek_source(opaque, 4, 0) }, -1);
        assert_eq!(unsafe { seek_source(opaque, 3, 0) }, 3);
    }
}
