//! psdunpack decodes layered PSD files into a tree of layer groups and raster layers. It reads the byte stream once,
//! front to back, and hands back an immutable result: every raster layer's RGBA pixels, offset, opacity, visibility
//! and blend mode, nested under the groups Photoshop put them in.
//!
//! Only 8-bit RGB, version 1 PSDs are supported, with raw or PackBits channel data. Layer masks are read past but
//! never applied. The large document PSB variant, vector masks, zip compression and color management are out of scope.
//!
//! PSD doesn't store a tree. Layers are a flat bottom-to-top list in which hidden divider records named
//! `</Layer group>` open a group and the record carrying the group's real name closes it. psdunpack rebuilds the tree
//! from those markers and treats an unbalanced list as corruption.
//!
//! Decoding failures are sticky rather than immediate: the first problem latches a [Status], later reads return
//! zeros, and the pipeline runs to its end. Check [Decoded::status] (or use [Decoded::into_content]) before trusting
//! the result. The one exception is an unbalanced group list, which [decode] reports as [PsdError::StackCorrupted].
//!
//! You want [decode] or [decode_file].
//!
//! Example:
//!
//!```rust,no_run
//!use psdunpack::{decode_file, DecodeOptions, Node};
//!
//!let decoded = decode_file("data/test.psd", &DecodeOptions::default()).expect("layer groups are balanced");
//!let content = decoded.into_content().expect("decodes cleanly");
//!for (_, node) in content.tree.nodes()
//!{
//!    match node
//!    {
//!        Node::Group(group) => println!("group {:?} ({} children)", group.name, group.children.len()),
//!        Node::Raster(layer) => println!("layer {:?} at ({}, {}), {}x{}", layer.name, layer.x, layer.y, layer.image.width, layer.image.height),
//!    }
//!}
//!```

mod blend;
mod codepage;
mod cursor;
mod error;
mod header;
mod options;
mod planes;
mod records;
mod rle;
mod tree;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub use blend::BlendMode;
pub use codepage::decode_cp1251;
pub use cursor::{ByteSource, Status};
pub use error::{PsdError, RleError};
pub use header::Header;
pub use options::{DecodeOptions, DEFAULT_MAX_LAYER_PIXELS, GROUP_OPEN_MARKER};
pub use planes::PixelBuffer;
pub use records::MaskData;
pub use rle::{decode_rle, decode_rle_into};
pub use tree::{FileContent, LayerGroup, LayerTree, Node, NodeId, RasterLayer};

use cursor::ByteCursor;
use header::read_header;
use planes::read_layer_planes;
use records::{read_layer_records, LayerSection};
use tree::TreeBuilder;

/// Result of one decode.
///
/// Only `Status::Ok` means success. With any other status `content` holds whatever was built before the failure and
/// should be discarded.
#[non_exhaustive]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Decoded
{
    pub status : Status,
    /// Why the status left `Ok`, if it did.
    pub reason : Option<String>,
    pub header : Header,
    pub content : FileContent,
}

impl Decoded
{
    pub fn is_ok(&self) -> bool { self.status == Status::Ok }

    /// The decoded content, or the latched status as an error.
    pub fn into_content(self) -> Result<FileContent, PsdError>
    {
        match PsdError::from_status(self.status, self.reason.unwrap_or_default())
        {
            Some(err) => Err(err),
            None => Ok(self.content),
        }
    }
}

/// Decodes a PSD from any forward-only byte source.
///
/// Read and format problems are reported through [Decoded::status]. `Err` is reserved for a group open/close
/// sequence that doesn't balance, which means the layer list itself is inconsistent.
pub fn decode<S : ByteSource>(source : S, options : &DecodeOptions) -> Result<Decoded, PsdError>
{
    let mut cursor = ByteCursor::new(source);

    let header = read_header(&mut cursor);
    let section = if cursor.is_ok() { read_layer_records(&mut cursor, options) } else { LayerSection::default() };

    let mut builder = TreeBuilder::new(options);
    for record in section.records
    {
        let planes = read_layer_planes(&mut cursor, &record);
        if !cursor.is_ok()
        {
            break;
        }
        builder.add(record, &planes)?;
    }

    if section.section_len > 0 && cursor.is_ok()
    {
        let global_mask_len = cursor.read_u32();
        log::debug!("skipping {} bytes of global layer mask info", global_mask_len);
        cursor.skip(global_mask_len as u64);
    }

    // A truncated file leaves groups open; that is reported through its status, not as corruption.
    let tree = if cursor.is_ok() { builder.finish()? } else { builder.into_partial() };
    log::debug!("decoded {} nodes ending at offset 0x{:X}", tree.nodes().count(), cursor.position());

    let (status, reason) = cursor.into_parts();
    Ok(Decoded { status, reason, header, content : FileContent { tree, file_name : None } })
}

/// Opens and decodes a PSD file. A file that can't be opened gives `Status::OpenError`, not an `Err`.
pub fn decode_file(path : impl AsRef<Path>, options : &DecodeOptions) -> Result<Decoded, PsdError>
{
    let path = path.as_ref();
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
    let file = match File::open(path)
    {
        Ok(file) => file,
        Err(err) =>
        {
            log::error!("could not open {}: {}", path.display(), err);
            return Ok(Decoded
            {
                status : Status::OpenError,
                reason : Some(format!("{}: {}", path.display(), err)),
                content : FileContent { file_name, ..Default::default() },
                ..Default::default()
            });
        }
    };
    let mut decoded = decode(BufReader::new(file), options)?;
    decoded.content.file_name = file_name;
    Ok(decoded)
}
