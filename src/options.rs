/// Layer name Photoshop gives the hidden record that opens a group. Records are stored bottom-up, so the group's
/// divider comes before its contents and the record carrying the group's real name closes it.
pub const GROUP_OPEN_MARKER : &str = "</Layer group>";

/// Default cap on the pixel count of a single layer: 2^27 pixels, a 512 MiB RGBA buffer.
pub const DEFAULT_MAX_LAYER_PIXELS : u64 = 1 << 27;

/// Knobs for [crate::decode].
///
/// Stability promise: every field is public and the struct is safe to build with `{ ..., ..Default::default() }`.
#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde_support", serde(default))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodeOptions
{
    /// Layer masks are never rendered. When this is false a masked layer logs a warning and decoding continues;
    /// when true the decode stops with [crate::Status::Unsupported]. Mask pixels are read and dropped either way.
    pub strict_masks : bool,
    /// Sentinel name that opens a group, compared case-insensitively.
    pub group_open_marker : String,
    /// Largest layer, in pixels, that will be decoded. Layer bounds come straight from the file and size the RGBA
    /// buffer, so a bigger layer stops the decode with [crate::Status::Unsupported] before anything is allocated.
    pub max_layer_pixels : u64,
}

impl Default for DecodeOptions
{
    fn default() -> Self
    {
        Self
        {
            strict_masks : false,
            group_open_marker : GROUP_OPEN_MARKER.to_string(),
            max_layer_pixels : DEFAULT_MAX_LAYER_PIXELS,
        }
    }
}

impl DecodeOptions
{
    pub fn strict() -> Self
    {
        Self { strict_masks : true, ..Default::default() }
    }

    pub (crate) fn is_group_open(&self, name : &str) -> bool
    {
        name.to_lowercase() == self.group_open_marker.to_lowercase()
    }
}
