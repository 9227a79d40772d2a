//! Channel image data: one plane per channel, raw or PackBits, in the same order as the layer records.

use crate::cursor::{ByteCursor, ByteSource, Status};
use crate::records::{ChannelId, LayerRecord};
use crate::rle::decode_rle_into;

const COMPRESSION_RAW : u16 = 0;
const COMPRESSION_RLE : u16 = 1;

#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// Decoded layer pixels. This is non-planar: a single full RGBA pixel is 4 consecutive bytes, rows top to bottom.
pub struct PixelBuffer
{
    pub width : u32,
    pub height : u32,
    pub rgba : Vec<u8>,
}

impl PixelBuffer
{
    /// Interleaves four planes. Missing color planes read as 0, a missing alpha plane as 255.
    pub (crate) fn from_planes(width : u32, height : u32, planes : &Planes) -> Self
    {
        let n = width as usize * height as usize;
        let mut rgba = vec![0u8; n * 4];
        let sources = [&planes.red, &planes.green, &planes.blue, &planes.alpha];
        for (offset, plane) in sources.into_iter().enumerate()
        {
            match plane
            {
                Some(plane) =>
                {
                    for (px, value) in rgba.chunks_exact_mut(4).zip(plane.iter())
                    {
                        px[offset] = *value;
                    }
                }
                None if offset == 3 => rgba.chunks_exact_mut(4).for_each(|px| px[3] = 255),
                None => {}
            }
        }
        Self { width, height, rgba }
    }

    /// The RGBA bytes of one pixel.
    pub fn pixel(&self, x : u32, y : u32) -> Option<[u8; 4]>
    {
        if x >= self.width || y >= self.height
        {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.rgba.get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// One pixel packed as `0xAARRGGBB`.
    pub fn argb(&self, x : u32, y : u32) -> Option<u32>
    {
        let [r, g, b, a] = self.pixel(x, y)?;
        Some(u32::from_be_bytes([a, r, g, b]))
    }
}

/// The color planes of one layer. Anything absent from the file stays `None`.
#[derive(Debug, Default)]
pub (crate) struct Planes
{
    pub (crate) red : Option<Vec<u8>>,
    pub (crate) green : Option<Vec<u8>>,
    pub (crate) blue : Option<Vec<u8>>,
    pub (crate) alpha : Option<Vec<u8>>,
}

/// Reads every channel of `record` in declared order.
///
/// User mask data is decoded with the mask's own bounds and dropped. Channels with an unrecognised id are skipped
/// by their declared length. Stops at the first latched failure.
pub (crate) fn read_layer_planes<S : ByteSource>(cursor : &mut ByteCursor<S>, record : &LayerRecord) -> Planes
{
    let mut planes = Planes::default();
    for channel in &record.channels
    {
        if !cursor.is_ok()
        {
            break;
        }
        match channel.id
        {
            ChannelId::Red => planes.red = Some(read_plane(cursor, record.w, record.h)),
            ChannelId::Green => planes.green = Some(read_plane(cursor, record.w, record.h)),
            ChannelId::Blue => planes.blue = Some(read_plane(cursor, record.w, record.h)),
            ChannelId::Alpha => planes.alpha = Some(read_plane(cursor, record.w, record.h)),
            ChannelId::UserMask =>
            {
                let (w, h) = record.mask.map_or((0, 0), |m| (m.w, m.h));
                read_plane(cursor, w, h);
                log::debug!("layer {}: discarded {}x{} mask plane", record.index, w, h);
            }
            ChannelId::Other(id) =>
            {
                log::warn!("layer {}: skipping {} bytes of channel {}", record.index, channel.len, id);
                cursor.skip(channel.len as u64);
            }
        }
    }
    planes
}

/// Reads one `w` x `h` plane. Non-positive dimensions give an empty plane but the compression mode is still read.
pub (crate) fn read_plane<S : ByteSource>(cursor : &mut ByteCursor<S>, w : i32, h : i32) -> Vec<u8>
{
    let w = w.max(0) as usize;
    let h = h.max(0) as usize;
    let mut plane = vec!();

    let compression = cursor.read_u16();
    if !cursor.is_ok()
    {
        return plane;
    }
    match compression
    {
        COMPRESSION_RAW =>
        {
            for _ in 0..h
            {
                let start = plane.len();
                plane.resize(start + w, 0);
                cursor.read_bytes(&mut plane[start..]);
                if !cursor.is_ok()
                {
                    break;
                }
            }
        }
        COMPRESSION_RLE =>
        {
            let mut line_lengths = Vec::with_capacity(h.min(1 << 16));
            for _ in 0..h
            {
                line_lengths.push(cursor.read_u16() as usize);
            }
            let mut line = vec!();
            for (row, len) in line_lengths.into_iter().enumerate()
            {
                if !cursor.is_ok()
                {
                    break;
                }
                line.resize(len, 0);
                cursor.read_bytes(&mut line);
                let start = plane.len();
                plane.resize(start + w, 0);
                if let Err(err) = decode_rle_into(&line, &mut plane[start..])
                {
                    cursor.fail(Status::FormatError, format!("scanline {}: {}", row, err));
                }
            }
        }
        other =>
        {
            cursor.fail(Status::Unsupported, format!("compression mode {} is not supported", other));
        }
    }
    plane
}
