use thiserror::Error;

use crate::cursor::Status;

/// Errors surfaced by the decoder.
///
/// `Open`, `Format` and `Unsupported` mirror the latched [Status] values and are only produced when a caller
/// asks for the result as a `Result` (see [crate::Decoded::into_content]). `StackCorrupted` is different: it means the
/// flat layer list itself was inconsistent, and [crate::decode] returns it directly.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PsdError
{
    /// The byte source could not be established.
    #[error("could not open input: {reason}")]
    Open { reason : String },

    /// The input violates the PSD binary layout.
    #[error("malformed PSD: {reason}")]
    Format { reason : String },

    /// The input is well-formed but uses a feature this decoder does not handle.
    #[error("unsupported PSD: {reason}")]
    Unsupported { reason : String },

    /// Group open/close markers were unbalanced. `depth` is the group stack depth at the point of failure,
    /// counting the root group.
    #[error("layer group stack corrupted (depth {depth}, expected 1)")]
    StackCorrupted { depth : usize },
}

impl PsdError
{
    pub (crate) fn from_status(status : Status, reason : String) -> Option<Self>
    {
        match status
        {
            Status::Ok => None,
            Status::OpenError => Some(PsdError::Open { reason }),
            Status::FormatError => Some(PsdError::Format { reason }),
            Status::Unsupported => Some(PsdError::Unsupported { reason }),
        }
    }
}

/// Failure while expanding one PackBits scanline.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RleError
{
    /// A control byte promised more input than the scanline carries.
    #[error("packbits stream truncated")]
    Truncated,

    /// The scanline expanded past its target width.
    #[error("packbits scanline overran its width of {width}")]
    Overrun { width : usize },

    /// The scanline expanded to fewer bytes than its target width.
    #[error("packbits scanline decoded to {actual} bytes, expected {expected}")]
    LengthMismatch { expected : usize, actual : usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_status_has_no_error()
    {
        assert_eq!(PsdError::from_status(Status::Ok, String::new()), None);
    }

    #[test]
    fn statuses_map_to_matching_variants()
    {
        assert_eq!(
            PsdError::from_status(Status::FormatError, "bad".to_string()),
            Some(PsdError::Format { reason : "bad".to_string() })
        );
        assert_eq!(
            PsdError::from_status(Status::Unsupported, "cmyk".to_string()),
            Some(PsdError::Unsupported { reason : "cmyk".to_string() })
        );
        assert_eq!(
            PsdError::from_status(Status::OpenError, "missing".to_string()),
            Some(PsdError::Open { reason : "missing".to_string() })
        );
    }

    #[test]
    fn messages_are_readable()
    {
        let err = PsdError::StackCorrupted { depth : 3 };
        assert_eq!(err.to_string(), "layer group stack corrupted (depth 3, expected 1)");
        let err = RleError::LengthMismatch { expected : 4, actual : 2 };
        assert_eq!(err.to_string(), "packbits scanline decoded to 2 bytes, expected 4");
    }
}
