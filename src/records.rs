//! Layer records: the per-layer metadata block that precedes all channel image data.

use crate::blend::BlendMode;
use crate::cursor::{ByteCursor, ByteSource, Status};
use crate::options::DecodeOptions;

const BLEND_SIGNATURE : [u8; 4] = *b"8BIM";
/// Fixed part of a layer mask block: bounds (16), default color (1), flags (1).
const MASK_FIXED_LEN : u32 = 18;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub (crate) enum ChannelId
{
    Red,
    Green,
    Blue,
    Alpha,
    UserMask,
    Other(i16),
}

impl ChannelId
{
    pub (crate) fn from_raw(id : i16) -> Self
    {
        match id
        {
            0 => ChannelId::Red,
            1 => ChannelId::Green,
            2 => ChannelId::Blue,
            -1 => ChannelId::Alpha,
            -2 => ChannelId::UserMask,
            other => ChannelId::Other(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub (crate) struct ChannelInfo
{
    pub (crate) id : ChannelId,
    /// Byte length of the channel's image data block, compression mode included.
    pub (crate) len : u32,
}

#[non_exhaustive]
#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
/// Where a layer's mask is. Mask pixels are read to stay in sync with the stream, then dropped; they are never
/// composed into the layer image.
pub struct MaskData
{
    /// Mask global X position.
    pub x : i32,
    /// Mask global Y position.
    pub y : i32,
    pub w : i32,
    pub h : i32,
    /// Color of the mask outside its explicit area. 0 or 255.
    pub default_color : u8,
    /// Raw mask flags: bit 0 position relative to layer, bit 1 disabled, bit 2 inverted.
    pub flags : u8,
}

/// Per-channel blending range metadata, kept as raw bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub (crate) struct BlendingRanges(pub (crate) Vec<u8>);

/// One entry of the flat, bottom-to-top layer list.
///
/// Width and height can be zero or negative; such records are group markers rather than pixel layers.
#[derive(Clone, Debug, Default, PartialEq)]
pub (crate) struct LayerRecord
{
    pub (crate) index : usize,
    pub (crate) x : i32,
    pub (crate) y : i32,
    pub (crate) w : i32,
    pub (crate) h : i32,
    pub (crate) channels : Vec<ChannelInfo>,
    pub (crate) blend_mode : BlendMode,
    pub (crate) opacity : u8,
    pub (crate) clipping : u8,
    pub (crate) flags : u8,
    pub (crate) visible : bool,
    pub (crate) mask : Option<MaskData>,
    pub (crate) blending_ranges : BlendingRanges,
    pub (crate) name : String,
}

impl LayerRecord
{
    pub (crate) fn has_pixels(&self) -> bool
    {
        self.w > 0 && self.h > 0
    }
}

/// The layer-and-mask section header plus every layer record, before any image data.
#[derive(Debug, Default)]
pub (crate) struct LayerSection
{
    pub (crate) section_len : u32,
    pub (crate) records : Vec<LayerRecord>,
}

/// Parses the start of the layer-and-mask section and all layer records.
///
/// A zero section length means the file only carries a merged image: no records, nothing more is read. A bad
/// blend signature latches `FormatError` and stops; records parsed before it are returned.
pub (crate) fn read_layer_records<S : ByteSource>(cursor : &mut ByteCursor<S>, options : &DecodeOptions) -> LayerSection
{
    let section_len = cursor.read_u32();
    let mut section = LayerSection { section_len, records : vec!() };
    if section_len == 0 || !cursor.is_ok()
    {
        log::debug!("no layer data, base image only");
        return section;
    }

    let layer_info_len = cursor.read_u32();
    // negative means the first alpha channel holds the merged image's transparency; nothing else changes
    let layer_count = cursor.read_i16().unsigned_abs() as usize;
    log::debug!("layer section: {} bytes, layer info {} bytes, {} layers", section_len, layer_info_len, layer_count);

    for index in 0..layer_count
    {
        let record = read_layer_record(cursor, index, options);
        if !cursor.is_ok()
        {
            break;
        }
        log::debug!(
            "layer {}: {:?} at ({}, {}) {}x{}, {} channels",
            index, record.name, record.x, record.y, record.w, record.h, record.channels.len()
        );
        section.records.push(record);
    }
    section
}

fn read_layer_record<S : ByteSource>(cursor : &mut ByteCursor<S>, index : usize, options : &DecodeOptions) -> LayerRecord
{
    let top = cursor.read_i32();
    let left = cursor.read_i32();
    let bottom = cursor.read_i32();
    let right = cursor.read_i32();

    let channel_count = cursor.read_u16();
    let mut channels = Vec::with_capacity(channel_count as usize);
    for _ in 0..channel_count
    {
        let id = ChannelId::from_raw(cursor.read_i16());
        let len = cursor.read_u32();
        channels.push(ChannelInfo { id, len });
    }

    let mut record = LayerRecord
    {
        index,
        x : left,
        y : top,
        w : right.wrapping_sub(left),
        h : bottom.wrapping_sub(top),
        channels,
        ..Default::default()
    };

    let pixels = record.w.max(0) as u64 * record.h.max(0) as u64;
    if cursor.is_ok() && pixels > options.max_layer_pixels
    {
        cursor.fail(Status::Unsupported, format!(
            "layer {}: {}x{} is {} pixels, over the limit of {}",
            index, record.w, record.h, pixels, options.max_layer_pixels
        ));
        return record;
    }

    let signature = cursor.read_b4();
    if cursor.is_ok() && signature != BLEND_SIGNATURE
    {
        cursor.fail(Status::FormatError, format!("layer {}: invalid blend mode signature {:?}", index, signature));
        return record;
    }

    record.blend_mode = BlendMode::from_key(cursor.read_b4());
    if let BlendMode::Unknown(key) = record.blend_mode
    {
        log::warn!("layer {}: unknown blend mode {:?}", index, String::from_utf8_lossy(&key));
    }

    record.opacity = cursor.read_u8();
    record.clipping = cursor.read_u8();
    record.flags = cursor.read_u8();
    record.visible = (record.flags & 2) == 0;
    let _filler = cursor.read_u8();

    let extra_len = cursor.read_u32() as i64;

    let mask_len = cursor.read_u32();
    record.mask = read_mask_data(cursor, mask_len, index, options);

    let ranges_len = cursor.read_u32();
    record.blending_ranges = read_blending_ranges(cursor, ranges_len);

    let name_len = cursor.read_u8() as i64;
    // What remains of the extra data is the padded name followed by any additional layer information blocks.
    let payload_len = extra_len - (4 + mask_len as i64) - (4 + ranges_len as i64) - 1;
    if !cursor.is_ok()
    {
        return record;
    }
    if payload_len < 0
    {
        cursor.fail(Status::FormatError, format!("layer {}: extra data length {} is smaller than its contents", index, extra_len));
        return record;
    }
    if name_len > payload_len
    {
        cursor.fail(Status::FormatError, format!("layer {}: name length {} exceeds the {} bytes left in the record", index, name_len, payload_len));
        return record;
    }
    record.name = cursor.read_string(name_len as usize);
    cursor.skip((payload_len - name_len) as u64);

    record
}

/// Reads a layer mask block. An empty block yields `None`. Vector-mask fields past the fixed part are skipped.
fn read_mask_data<S : ByteSource>(cursor : &mut ByteCursor<S>, len : u32, index : usize, options : &DecodeOptions) -> Option<MaskData>
{
    if len == 0 || !cursor.is_ok()
    {
        return None;
    }
    if len < MASK_FIXED_LEN
    {
        cursor.skip(len as u64);
        cursor.fail(Status::FormatError, format!("layer {}: mask block of {} bytes is too short", index, len));
        return None;
    }

    if options.strict_masks
    {
        cursor.fail(Status::Unsupported, format!("layer {} has a mask", index));
        return None;
    }
    log::warn!("layer {} has a mask; it will be ignored", index);

    let top = cursor.read_i32();
    let left = cursor.read_i32();
    let bottom = cursor.read_i32();
    let right = cursor.read_i32();
    let default_color = cursor.read_u8();
    let flags = cursor.read_u8();
    cursor.skip((len - MASK_FIXED_LEN) as u64);

    Some(MaskData
    {
        x : left,
        y : top,
        w : right.wrapping_sub(left),
        h : bottom.wrapping_sub(top),
        default_color,
        flags,
    })
}

fn read_blending_ranges<S : ByteSource>(cursor : &mut ByteCursor<S>, len : u32) -> BlendingRanges
{
    BlendingRanges(cursor.read_vec(len as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serialises one layer record the way Photoshop lays it out, with the name padded to a multiple of 4.
    fn record_bytes(bounds : [i32; 4], channels : &[(i16, u32)], flags : u8, mask : Option<[i32; 4]>, name : &[u8]) -> Vec<u8>
    {
        let mut v = vec!();
        for b in bounds
        {
            v.extend_from_slice(&b.to_be_bytes());
        }
        v.extend_from_slice(&(channels.len() as u16).to_be_bytes());
        for (id, len) in channels
        {
            v.extend_from_slice(&id.to_be_bytes());
            v.extend_from_slice(&len.to_be_bytes());
        }
        v.extend_from_slice(b"8BIMnorm");
        v.extend_from_slice(&[255, 0, flags, 0]);

        let mut extra = vec!();
        match mask
        {
            Some(m) =>
            {
                extra.extend_from_slice(&20u32.to_be_bytes());
                for b in m
                {
                    extra.extend_from_slice(&b.to_be_bytes());
                }
                extra.extend_from_slice(&[0, 0, 0, 0]);
            }
            None => extra.extend_from_slice(&0u32.to_be_bytes()),
        }
        extra.extend_from_slice(&8u32.to_be_bytes());
        extra.extend_from_slice(&[0, 0, 255, 255, 0, 0, 255, 255]);
        extra.push(name.len() as u8);
        extra.extend_from_slice(name);
        let name_field = name.len() + 1;
        extra.resize(extra.len() + name_field.next_multiple_of(4) - name_field, 0);
        v.extend_from_slice(&(extra.len() as u32).to_be_bytes());
        v.extend_from_slice(&extra);
        v
    }

    fn section(records : &[Vec<u8>]) -> Vec<u8>
    {
        let mut body = vec!();
        body.extend_from_slice(&(records.len() as i16).to_be_bytes());
        for r in records
        {
            body.extend_from_slice(r);
        }
        let mut v = vec!();
        v.extend_from_slice(&(body.len() as u32 + 8).to_be_bytes());
        v.extend_from_slice(&(body.len() as u32).to_be_bytes());
        v.extend_from_slice(&body);
        v
    }

    #[test]
    fn zero_length_section_has_no_records()
    {
        let data = 0u32.to_be_bytes();
        let mut cursor = ByteCursor::new(&data[..]);
        let section = read_layer_records(&mut cursor, &DecodeOptions::default());
        assert!(cursor.is_ok());
        assert!(section.records.is_empty());
        assert_eq!(section.section_len, 0);
    }

    #[test]
    fn parses_bounds_channels_and_name()
    {
        let rec = record_bytes([1, 2, 11, 22], &[(0, 2), (1, 2), (2, 2), (-1, 2)], 0, None, b"Layer 1");
        let data = section(&[rec]);
        let mut cursor = ByteCursor::new(&data[..]);
        let section = read_layer_records(&mut cursor, &DecodeOptions::default());
        assert!(cursor.is_ok());
        assert_eq!(section.records.len(), 1);
        let r = &section.records[0];
        assert_eq!((r.x, r.y, r.w, r.h), (2, 1, 20, 10));
        assert_eq!(r.name, "Layer 1");
        assert_eq!(r.opacity, 255);
        assert!(r.visible);
        assert_eq!(r.blend_mode, BlendMode::Normal);
        assert_eq!(r.channels.iter().map(|c| c.id).collect::<Vec<_>>(), vec![ChannelId::Red, ChannelId::Green, ChannelId::Blue, ChannelId::Alpha]);
        assert_eq!(r.blending_ranges.0.len(), 8);
        assert!(r.mask.is_none());
        // everything consumed
        assert_eq!(cursor.position(), data.len() as u64);
    }

    #[test]
    fn hidden_flag_and_negative_count()
    {
        let rec = record_bytes([0, 0, 0, 0], &[], 2, None, b"</Layer group>");
        let mut data = section(&[rec]);
        // -1 layers: first alpha channel is merged transparency
        data[8..10].copy_from_slice(&(-1i16).to_be_bytes());
        let mut cursor = ByteCursor::new(&data[..]);
        let section = read_layer_records(&mut cursor, &DecodeOptions::default());
        assert!(cursor.is_ok());
        assert_eq!(section.records.len(), 1);
        assert!(!section.records[0].visible);
        assert!(!section.records[0].has_pixels());
        assert_eq!(section.records[0].name, "</Layer group>");
    }

    #[test]
    fn bad_blend_signature_stops_parsing()
    {
        let mut rec = record_bytes([0, 0, 1, 1], &[], 0, None, b"a");
        rec[18..22].copy_from_slice(b"XXXX");
        let data = section(&[rec.clone(), rec]);
        let mut cursor = ByteCursor::new(&data[..]);
        let section = read_layer_records(&mut cursor, &DecodeOptions::default());
        assert_eq!(cursor.status(), Status::FormatError);
        assert!(section.records.is_empty());
    }

    #[test]
    fn mask_is_recorded_in_permissive_mode()
    {
        let rec = record_bytes([0, 0, 4, 4], &[(-2, 2)], 0, Some([1, 1, 3, 4]), b"masked");
        let data = section(&[rec]);
        let mut cursor = ByteCursor::new(&data[..]);
        let section = read_layer_records(&mut cursor, &DecodeOptions::default());
        assert!(cursor.is_ok());
        let mask = section.records[0].mask.expect("mask present");
        assert_eq!((mask.x, mask.y, mask.w, mask.h), (1, 1, 3, 2));
        assert_eq!(section.records[0].name, "masked");
        assert_eq!(section.records[0].channels[0].id, ChannelId::UserMask);
    }

    #[test]
    fn mask_is_fatal_in_strict_mode()
    {
        let rec = record_bytes([0, 0, 4, 4], &[], 0, Some([1, 1, 3, 4]), b"masked");
        let data = section(&[rec]);
        let mut cursor = ByteCursor::new(&data[..]);
        read_layer_records(&mut cursor, &DecodeOptions::strict());
        assert_eq!(cursor.status(), Status::Unsupported);
    }

    #[test]
    fn oversized_name_length_is_a_format_error()
    {
        let mut rec = record_bytes([0, 0, 1, 1], &[], 0, None, b"abc");
        // name length byte sits after bounds(16) + count(2) + blend(8) + opacity..filler(4) + extra len(4)
        // + mask len(4) + ranges len(4) + ranges(8)
        let name_len_at = 16 + 2 + 8 + 4 + 4 + 4 + 4 + 8;
        rec[name_len_at] = 200;
        let data = section(&[rec]);
        let mut cursor = ByteCursor::new(&data[..]);
        read_layer_records(&mut cursor, &DecodeOptions::default());
        assert_eq!(cursor.status(), Status::FormatError);
    }

    #[test]
    fn oversized_layer_is_rejected_before_allocation()
    {
        let rec = record_bytes([0, 0, 16384, 16384], &[], 0, None, b"huge");
        let data = section(&[rec]);
        let mut cursor = ByteCursor::new(&data[..]);
        let section = read_layer_records(&mut cursor, &DecodeOptions::default());
        assert_eq!(cursor.status(), Status::Unsupported);
        assert!(section.records.is_empty());

        let options = DecodeOptions { max_layer_pixels : 16384 * 16384, ..Default::default() };
        let mut cursor = ByteCursor::new(&data[..]);
        let section = read_layer_records(&mut cursor, &options);
        assert!(cursor.is_ok());
        assert_eq!((section.records[0].w, section.records[0].h), (16384, 16384));
    }

    #[test]
    fn channel_ids()
    {
        assert_eq!(ChannelId::from_raw(0), ChannelId::Red);
        assert_eq!(ChannelId::from_raw(-1), ChannelId::Alpha);
        assert_eq!(ChannelId::from_raw(-2), ChannelId::UserMask);
        assert_eq!(ChannelId::from_raw(-3), ChannelId::Other(-3));
        assert_eq!(ChannelId::from_raw(3), ChannelId::Other(3));
    }
}
