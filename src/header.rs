use crate::cursor::{ByteCursor, ByteSource, Status};

/// Leading file signature.
pub (crate) const PSD_SIGNATURE : &str = "8BPS";
/// Image resource ID for IPTC-NAA records. Recognised by name only; the payload is skipped like any other.
pub (crate) const RESOURCE_IPTC_NAA : u16 = 0x0404;

const COLOR_MODE_RGB : u16 = 3;

#[non_exhaustive]
#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// File-wide PSD header metadata.
pub struct Header
{
    pub signature : String,
    pub version : u16,
    /// Number of channels in the merged image, including alpha.
    pub channel_count : u16,
    /// Canvas width in pixels.
    pub width : u32,
    /// Canvas height in pixels.
    pub height : u32,
    /// Bits per channel. Only 8 is supported.
    pub depth : u16,
    /// PSD-wide color mode constant. Only RGB (3) is supported.
    pub color_mode : u16,
}

/// Reads the 26-byte header, then skips the color-mode data and the image-resources section.
///
/// Bad signature or version latches `FormatError`; anything but 8-bit RGB latches `Unsupported`.
pub (crate) fn read_header<S : ByteSource>(cursor : &mut ByteCursor<S>) -> Header
{
    let signature = cursor.read_string(4);
    let version = cursor.read_u16();
    if signature != PSD_SIGNATURE || version != 1
    {
        cursor.fail(Status::FormatError, format!("not a version 1 PSD (signature {:?}, version {})", signature, version));
    }

    cursor.skip(6);

    let channel_count = cursor.read_u16();
    let height = cursor.read_u32();
    let width = cursor.read_u32();
    let depth = cursor.read_u16();
    let color_mode = cursor.read_u16();
    if depth != 8 || color_mode != COLOR_MODE_RGB
    {
        cursor.fail(Status::Unsupported, format!("only 8-bit RGB is supported (depth {}, color mode {})", depth, color_mode));
    }

    let color_data_len = cursor.read_u32();
    cursor.skip(color_data_len as u64);

    let resources_len = cursor.read_u32();
    read_image_resources(cursor, resources_len);

    log::debug!("header: {}x{}, {} channels, color data {} bytes, resources {} bytes", width, height, channel_count, color_data_len, resources_len);

    Header { signature, version, channel_count, width, height, depth, color_mode }
}

/// Only the first resource block header is looked at; everything after it is opaque to this decoder.
fn read_image_resources<S : ByteSource>(cursor : &mut ByteCursor<S>, len : u32)
{
    if len < 6
    {
        cursor.skip(len as u64);
        return;
    }
    let signature = cursor.read_string(4);
    let resource_id = cursor.read_u16();
    if resource_id == RESOURCE_IPTC_NAA
    {
        log::debug!("image resources start with an IPTC-NAA block ({})", signature);
    }
    else
    {
        log::debug!("image resources start with block 0x{:04X} ({})", resource_id, signature);
    }
    cursor.skip(len as u64 - 6);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(sig : &[u8; 4], version : u16, depth : u16, mode : u16) -> Vec<u8>
    {
        let mut v = vec!();
        v.extend_from_slice(sig);
        v.extend_from_slice(&version.to_be_bytes());
        v.extend_from_slice(&[0; 6]);
        v.extend_from_slice(&3u16.to_be_bytes());
        v.extend_from_slice(&5u32.to_be_bytes());
        v.extend_from_slice(&7u32.to_be_bytes());
        v.extend_from_slice(&depth.to_be_bytes());
        v.extend_from_slice(&mode.to_be_bytes());
        v
    }

    #[test]
    fn parses_valid_header_and_skips_sections()
    {
        let mut data = header_bytes(b"8BPS", 1, 8, 3);
        data.extend_from_slice(&3u32.to_be_bytes());
        data.extend_from_slice(&[9, 9, 9]);
        data.extend_from_slice(&10u32.to_be_bytes());
        data.extend_from_slice(b"8BIM");
        data.extend_from_slice(&RESOURCE_IPTC_NAA.to_be_bytes());
        data.extend_from_slice(&[1, 2, 3, 4]);
        data.extend_from_slice(&0xCAFEu16.to_be_bytes());

        let mut cursor = ByteCursor::new(&data[..]);
        let header = read_header(&mut cursor);
        assert!(cursor.is_ok());
        assert_eq!(header.width, 7);
        assert_eq!(header.height, 5);
        assert_eq!(header.channel_count, 3);
        assert_eq!(cursor.read_u16(), 0xCAFE);
    }

    #[test]
    fn empty_sections_consume_only_length_fields()
    {
        let mut data = header_bytes(b"8BPS", 1, 8, 3);
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        let mut cursor = ByteCursor::new(&data[..]);
        read_header(&mut cursor);
        assert!(cursor.is_ok());
        assert_eq!(cursor.position(), 34);
        assert_eq!(cursor.read_u32(), 0);
        assert!(cursor.is_ok());
    }

    #[test]
    fn bad_signature_or_version_is_format_error()
    {
        for data in [header_bytes(b"8BPX", 1, 8, 3), header_bytes(b"8BPS", 2, 8, 3)]
        {
            let mut cursor = ByteCursor::new(&data[..]);
            read_header(&mut cursor);
            assert_eq!(cursor.status(), Status::FormatError);
        }
    }

    #[test]
    fn wrong_depth_or_mode_is_unsupported()
    {
        for data in [header_bytes(b"8BPS", 1, 16, 3), header_bytes(b"8BPS", 1, 8, 4)]
        {
            let mut data = data;
            data.extend_from_slice(&[0; 8]);
            let mut cursor = ByteCursor::new(&data[..]);
            read_header(&mut cursor);
            assert_eq!(cursor.status(), Status::Unsupported);
        }
    }
}
