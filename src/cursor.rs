use std::io::{ErrorKind, Read};

use crate::codepage::decode_cp1251;

/// Outcome of a decode. Once a decode leaves `Ok` it never returns to it.
#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Status
{
    #[default]
    Ok,
    /// The byte source could not be established. Produced by the I/O wrapper, never by the parser itself.
    OpenError,
    /// Structural violation: bad signature or version, short read, bad tag, bad RLE data.
    FormatError,
    /// Well-formed input outside the supported feature set, e.g. 16-bit depth or CMYK.
    Unsupported,
}

/// Sequential, forward-only provider of bytes.
///
/// `read_into` fills as much of `buf` as it can and returns the number of bytes written; fewer than `buf.len()`
/// means the data ran out. Every [std::io::Read] is a `ByteSource`, so slices, files and sockets all work.
pub trait ByteSource
{
    fn read_into(&mut self, buf : &mut [u8]) -> std::io::Result<usize>;

    /// One byte, or `None` at end of data.
    fn read_one(&mut self) -> std::io::Result<Option<u8>>
    {
        let mut buf = [0; 1];
        Ok(if self.read_into(&mut buf)? == 1 { Some(buf[0]) } else { None })
    }
}

impl<R : Read> ByteSource for R
{
    fn read_into(&mut self, buf : &mut [u8]) -> std::io::Result<usize>
    {
        // Read may hand back short chunks before the real end of data, so keep going until it reports zero.
        let mut filled = 0;
        while filled < buf.len()
        {
            match self.read(&mut buf[filled..])
            {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(filled)
    }
}

/// Big-endian reader with a sticky status.
///
/// The first failure latches a [Status] and a reason. After that every read returns zeros without touching the
/// source, so parsing code can run to structural completion and check the status once at the end.
pub (crate) struct ByteCursor<S>
{
    source : S,
    pos : u64,
    status : Status,
    reason : Option<String>,
}

impl<S : ByteSource> ByteCursor<S>
{
    pub (crate) fn new(source : S) -> Self
    {
        Self { source, pos : 0, status : Status::Ok, reason : None }
    }

    #[cfg(test)]
    pub (crate) fn status(&self) -> Status { self.status }
    pub (crate) fn is_ok(&self) -> bool { self.status == Status::Ok }
    pub (crate) fn position(&self) -> u64 { self.pos }

    pub (crate) fn into_parts(self) -> (Status, Option<String>)
    {
        (self.status, self.reason)
    }

    /// Records a failure. Only the first one sticks.
    pub (crate) fn fail(&mut self, status : Status, reason : impl Into<String>)
    {
        if self.status != Status::Ok || status == Status::Ok
        {
            return;
        }
        let reason = reason.into();
        log::error!("decode failed at offset 0x{:X}: {:?}: {}", self.pos, status, reason);
        self.status = status;
        self.reason = Some(reason);
    }

    /// Fills `out` completely or latches a format error. Returns the number of bytes actually read.
    pub (crate) fn read_bytes(&mut self, out : &mut [u8]) -> usize
    {
        if !self.is_ok()
        {
            out.fill(0);
            return 0;
        }
        match self.source.read_into(out)
        {
            Ok(n) =>
            {
                self.pos += n as u64;
                if n < out.len()
                {
                    out[n..].fill(0);
                    self.fail(Status::FormatError, format!("unexpected end of data (wanted {} bytes, got {})", out.len(), n));
                }
                n
            }
            Err(err) =>
            {
                out.fill(0);
                self.fail(Status::FormatError, format!("read error: {}", err));
                0
            }
        }
    }

    pub (crate) fn read_u8(&mut self) -> u8
    {
        if !self.is_ok()
        {
            return 0;
        }
        match self.source.read_one()
        {
            Ok(Some(b)) =>
            {
                self.pos += 1;
                b
            }
            Ok(None) =>
            {
                self.fail(Status::FormatError, "unexpected end of data");
                0
            }
            Err(err) =>
            {
                self.fail(Status::FormatError, format!("read error: {}", err));
                0
            }
        }
    }

    pub (crate) fn read_b4(&mut self) -> [u8; 4]
    {
        let mut buf = [0; 4];
        self.read_bytes(&mut buf);
        buf
    }

    pub (crate) fn read_u16(&mut self) -> u16
    {
        let mut buf = [0; 2];
        self.read_bytes(&mut buf);
        u16::from_be_bytes(buf)
    }

    pub (crate) fn read_i16(&mut self) -> i16
    {
        self.read_u16() as i16
    }

    pub (crate) fn read_u32(&mut self) -> u32
    {
        u32::from_be_bytes(self.read_b4())
    }

    pub (crate) fn read_i32(&mut self) -> i32
    {
        i32::from_be_bytes(self.read_b4())
    }

    /// Reads `n` bytes and decodes them through the CP1251 table.
    pub (crate) fn read_string(&mut self, n : usize) -> String
    {
        let mut buf = vec![0; n];
        let got = self.read_bytes(&mut buf);
        decode_cp1251(&buf[..got])
    }

    /// Reads `n` bytes in fixed-size chunks and hands each to `sink`, so an untrusted length never sizes a buffer.
    fn read_chunked(&mut self, n : u64, mut sink : impl FnMut(&[u8]))
    {
        let mut scratch = [0u8; 4096];
        let mut left = n;
        while left > 0 && self.is_ok()
        {
            let chunk = left.min(scratch.len() as u64) as usize;
            let got = self.read_bytes(&mut scratch[..chunk]);
            sink(&scratch[..got]);
            left -= chunk as u64;
        }
    }

    /// Reads `n` bytes into a new vec. Stops early, with a latched status, if the source runs out.
    pub (crate) fn read_vec(&mut self, n : u64) -> Vec<u8>
    {
        let mut data = vec!();
        self.read_chunked(n, |bytes| data.extend_from_slice(bytes));
        data
    }

    /// Discards `n` bytes. There is no seeking; the bytes are read and dropped.
    pub (crate) fn skip(&mut self, n : u64)
    {
        self.read_chunked(n, |_| {});
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian()
    {
        let data = [0x12, 0x34, 0xDE, 0xAD, 0xBE, 0xEF, 0xFF, 0xFE, 0x7F];
        let mut c = ByteCursor::new(&data[..]);
        assert_eq!(c.read_u16(), 0x1234);
        assert_eq!(c.read_u32(), 0xDEADBEEF);
        assert_eq!(c.read_i16(), -2);
        assert_eq!(c.read_u8(), 0x7F);
        assert!(c.is_ok());
        assert_eq!(c.position(), 9);
    }

    #[test]
    fn short_read_latches_format_error()
    {
        let data = [0x00, 0x01, 0x02];
        let mut c = ByteCursor::new(&data[..]);
        assert_eq!(c.read_u32(), 0);
        assert_eq!(c.status(), Status::FormatError);
        assert_eq!(c.position(), 3);
    }

    #[test]
    fn reads_after_failure_are_inert()
    {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05];
        let mut c = ByteCursor::new(&data[..]);
        c.fail(Status::Unsupported, "depth 16");
        assert_eq!(c.read_u8(), 0);
        assert_eq!(c.read_u32(), 0);
        assert_eq!(c.position(), 0);
        // first failure wins
        c.fail(Status::FormatError, "later");
        let (status, reason) = c.into_parts();
        assert_eq!(status, Status::Unsupported);
        assert_eq!(reason.as_deref(), Some("depth 16"));
    }

    #[test]
    fn skip_and_strings()
    {
        let mut data = vec![0u8; 10_000];
        data.extend_from_slice(b"8BIMnorm");
        let mut c = ByteCursor::new(&data[..]);
        c.skip(10_000);
        assert_eq!(c.read_string(4), "8BIM");
        assert_eq!(&c.read_b4(), b"norm");
        assert!(c.is_ok());
        c.skip(1);
        assert_eq!(c.status(), Status::FormatError);
    }

    #[test]
    fn read_vec_stops_at_end_of_data()
    {
        let data = [1u8, 2, 3];
        let mut c = ByteCursor::new(&data[..]);
        assert_eq!(c.read_vec(2), vec![1, 2]);
        assert_eq!(c.read_vec(u32::MAX as u64), vec![3]);
        assert_eq!(c.status(), Status::FormatError);
        assert!(c.read_vec(4).is_empty());
    }

    #[test]
    fn byte_at_end_of_data_fails()
    {
        let mut c = ByteCursor::new(&[0u8; 0][..]);
        assert_eq!(c.read_u8(), 0);
        assert_eq!(c.status(), Status::FormatError);
    }

    struct Dribble<'a>(&'a [u8]);

    impl Read for Dribble<'_>
    {
        fn read(&mut self, buf : &mut [u8]) -> std::io::Result<usize>
        {
            if self.0.is_empty() || buf.is_empty()
            {
                return Ok(0);
            }
            buf[0] = self.0[0];
            self.0 = &self.0[1..];
            Ok(1)
        }
    }

    #[test]
    fn short_chunks_are_not_end_of_data()
    {
        let mut c = ByteCursor::new(Dribble(&[0, 0, 1, 0]));
        assert_eq!(c.read_u32(), 256);
        assert!(c.is_ok());
    }
}
