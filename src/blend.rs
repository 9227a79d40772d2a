/// Layer blend mode, keyed by the 4-byte code stored in each layer record.
///
/// Codes that are not recognised are kept verbatim in [BlendMode::Unknown] so nothing is lost.
#[non_exhaustive]
#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode
{
    /// "Pass through" mode for groups.
    PassThrough,
    #[default]
    Normal,
    Dissolve,
    Darken,
    Multiply,
    ColorBurn,
    LinearBurn,
    DarkerColor,
    Lighten,
    Screen,
    ColorDodge,
    LinearDodge,
    LighterColor,
    Overlay,
    SoftLight,
    HardLight,
    VividLight,
    LinearLight,
    PinLight,
    HardMix,
    Difference,
    Exclusion,
    Subtract,
    Divide,
    Hue,
    Saturation,
    Color,
    Luminosity,
    Unknown([u8; 4]),
}

const KEYS : [(&[u8; 4], BlendMode); 28] = [
    (b"pass", BlendMode::PassThrough),
    (b"norm", BlendMode::Normal),
    (b"diss", BlendMode::Dissolve),
    (b"dark", BlendMode::Darken),
    (b"mul ", BlendMode::Multiply),
    (b"idiv", BlendMode::ColorBurn),
    (b"lbrn", BlendMode::LinearBurn),
    (b"dkCl", BlendMode::DarkerColor),
    (b"lite", BlendMode::Lighten),
    (b"scrn", BlendMode::Screen),
    (b"div ", BlendMode::ColorDodge),
    (b"lddg", BlendMode::LinearDodge),
    (b"lgCl", BlendMode::LighterColor),
    (b"over", BlendMode::Overlay),
    (b"sLit", BlendMode::SoftLight),
    (b"hLit", BlendMode::HardLight),
    (b"vLit", BlendMode::VividLight),
    (b"lLit", BlendMode::LinearLight),
    (b"pLit", BlendMode::PinLight),
    (b"hMix", BlendMode::HardMix),
    (b"diff", BlendMode::Difference),
    (b"smud", BlendMode::Exclusion),
    (b"fsub", BlendMode::Subtract),
    (b"fdiv", BlendMode::Divide),
    (b"hue ", BlendMode::Hue),
    (b"sat ", BlendMode::Saturation),
    (b"colr", BlendMode::Color),
    (b"lum ", BlendMode::Luminosity),
];

impl BlendMode
{
    pub fn from_key(key : [u8; 4]) -> Self
    {
        KEYS.iter().find(|(k, _)| **k == key).map(|(_, mode)| *mode).unwrap_or(BlendMode::Unknown(key))
    }

    /// The raw 4-byte code, e.g. `b"norm"`.
    pub fn key(&self) -> [u8; 4]
    {
        match self
        {
            BlendMode::Unknown(key) => *key,
            mode => KEYS.iter().find(|(_, m)| m == mode).map(|(k, _)| **k).unwrap_or(*b"norm"),
        }
    }

    pub fn is_unknown(&self) -> bool { matches!(self, BlendMode::Unknown(_)) }

    /// Human-readable name as shown in Photoshop's layer panel.
    pub fn name(&self) -> &'static str
    {
        match self
        {
            BlendMode::PassThrough => "Pass Through",
            BlendMode::Normal => "Normal",
            BlendMode::Dissolve => "Dissolve",
            BlendMode::Darken => "Darken",
            BlendMode::Multiply => "Multiply",
            BlendMode::ColorBurn => "Color Burn",
            BlendMode::LinearBurn => "Linear Burn",
            BlendMode::DarkerColor => "Darker Color",
            BlendMode::Lighten => "Lighten",
            BlendMode::Screen => "Screen",
            BlendMode::ColorDodge => "Color Dodge",
            BlendMode::LinearDodge => "Linear Dodge (Add)",
            BlendMode::LighterColor => "Lighter Color",
            BlendMode::Overlay => "Overlay",
            BlendMode::SoftLight => "Soft Light",
            BlendMode::HardLight => "Hard Light",
            BlendMode::VividLight => "Vivid Light",
            BlendMode::LinearLight => "Linear Light",
            BlendMode::PinLight => "Pin Light",
            BlendMode::HardMix => "Hard Mix",
            BlendMode::Difference => "Difference",
            BlendMode::Exclusion => "Exclusion",
            BlendMode::Subtract => "Subtract",
            BlendMode::Divide => "Divide",
            BlendMode::Hue => "Hue",
            BlendMode::Saturation => "Saturation",
            BlendMode::Color => "Color",
            BlendMode::Luminosity => "Luminosity",
            BlendMode::Unknown(_) => "Unknown",
        }
    }
}
