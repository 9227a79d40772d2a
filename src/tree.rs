//! Layer tree reconstruction.
//!
//! PSD doesn't store its layers in a tree; it stores a flat bottom-to-top list where hidden marker records open and
//! close groups. The tree here is an arena: every node lives in one `Vec` and refers to its children by [NodeId].
//! Arena order is the order nodes were first seen, so the flat views fall out of it without separate bookkeeping.

use crate::blend::BlendMode;
use crate::error::PsdError;
use crate::options::DecodeOptions;
use crate::planes::{PixelBuffer, Planes};
use crate::records::{LayerRecord, MaskData};

/// Index of a node in a [LayerTree].
#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub (crate) usize);

impl NodeId
{
    pub fn index(&self) -> usize { self.0 }
}

#[non_exhaustive]
#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq)]
/// A layer with pixels.
pub struct RasterLayer
{
    pub name : String,
    /// Global X position of the layer's top left corner. Can be negative.
    pub x : f64,
    /// Global Y position of the layer's top left corner. Can be negative.
    pub y : f64,
    pub image : PixelBuffer,
    /// 0.0 to 1.0.
    pub opacity : f32,
    pub visible : bool,
    pub blend_mode : BlendMode,
    /// Does this layer have the "clipping mask" flag enabled?
    pub is_clipped : bool,
    /// Present when the file declared a mask for this layer. The mask is not applied to [RasterLayer::image].
    pub mask : Option<MaskData>,
    /// Raw blending-range bytes, uninterpreted.
    pub blending_ranges : Vec<u8>,
}

#[non_exhaustive]
#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LayerGroup
{
    /// Taken from the record that closes the group. Empty for the root.
    pub name : String,
    pub visible : bool,
    /// Bottom-to-top, as stored in the file.
    pub children : Vec<NodeId>,
}

#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub enum Node
{
    Group(LayerGroup),
    Raster(RasterLayer),
}

impl Node
{
    pub fn name(&self) -> &str
    {
        match self
        {
            Node::Group(g) => &g.name,
            Node::Raster(r) => &r.name,
        }
    }

    pub fn as_group(&self) -> Option<&LayerGroup>
    {
        match self
        {
            Node::Group(g) => Some(g),
            Node::Raster(_) => None,
        }
    }

    pub fn as_raster(&self) -> Option<&RasterLayer>
    {
        match self
        {
            Node::Raster(r) => Some(r),
            Node::Group(_) => None,
        }
    }
}

/// Owns every node. Node 0 is always the root group.
#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct LayerTree
{
    nodes : Vec<Node>,
}

impl Default for LayerTree
{
    fn default() -> Self
    {
        Self { nodes : vec![Node::Group(LayerGroup { visible : true, ..Default::default() })] }
    }
}

impl LayerTree
{
    pub const ROOT : NodeId = NodeId(0);

    pub fn root(&self) -> &LayerGroup
    {
        static EMPTY : LayerGroup = LayerGroup { name : String::new(), visible : true, children : Vec::new() };
        match self.nodes.first()
        {
            Some(Node::Group(g)) => g,
            // only reachable through a hand-edited deserialized tree
            _ => &EMPTY,
        }
    }

    pub fn get(&self, id : NodeId) -> Option<&Node>
    {
        self.nodes.get(id.0)
    }

    /// Children of a group; empty for raster layers and unknown ids.
    pub fn children(&self, id : NodeId) -> &[NodeId]
    {
        match self.nodes.get(id.0)
        {
            Some(Node::Group(g)) => &g.children,
            _ => &[],
        }
    }

    /// Every group and raster layer except the root, in the order first seen in the file.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)>
    {
        self.nodes.iter().enumerate().skip(1).map(|(i, n)| (NodeId(i), n))
    }

    /// Raster layers in file order.
    pub fn raster_layers(&self) -> impl Iterator<Item = &RasterLayer>
    {
        self.nodes.iter().filter_map(Node::as_raster)
    }

    fn push(&mut self, parent : NodeId, node : Node) -> NodeId
    {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        if let Some(Node::Group(g)) = self.nodes.get_mut(parent.0)
        {
            g.children.push(id);
        }
        id
    }

    fn group_mut(&mut self, id : NodeId) -> Option<&mut LayerGroup>
    {
        match self.nodes.get_mut(id.0)
        {
            Some(Node::Group(g)) => Some(g),
            _ => None,
        }
    }
}

#[non_exhaustive]
#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq)]
/// Everything decoded from one PSD.
pub struct FileContent
{
    pub tree : LayerTree,
    /// Set by [crate::decode_file]; `None` when decoding from a stream.
    pub file_name : Option<String>,
}

impl FileContent
{
    pub fn root(&self) -> &LayerGroup { self.tree.root() }

    /// Raster layers in file order.
    pub fn raster_layers(&self) -> Vec<&RasterLayer>
    {
        self.tree.raster_layers().collect()
    }

    /// Groups and raster layers in the order first seen, root excluded.
    pub fn all_nodes(&self) -> Vec<&Node>
    {
        self.tree.nodes().map(|(_, n)| n).collect()
    }
}

/// Threads the group stack through the flat record list.
pub (crate) struct TreeBuilder<'a>
{
    tree : LayerTree,
    stack : Vec<NodeId>,
    options : &'a DecodeOptions,
}

impl<'a> TreeBuilder<'a>
{
    pub (crate) fn new(options : &'a DecodeOptions) -> Self
    {
        Self { tree : LayerTree::default(), stack : vec![LayerTree::ROOT], options }
    }

    fn top(&self) -> NodeId
    {
        self.stack.last().copied().unwrap_or(LayerTree::ROOT)
    }

    #[cfg(test)]
    pub (crate) fn depth(&self) -> usize { self.stack.len() }

    /// Adds one record. Records with pixels become raster layers in the open group; degenerate records open or
    /// close a group depending on their name.
    pub (crate) fn add(&mut self, record : LayerRecord, planes : &Planes) -> Result<(), PsdError>
    {
        if record.has_pixels()
        {
            let image = PixelBuffer::from_planes(record.w as u32, record.h as u32, planes);
            let layer = RasterLayer
            {
                name : record.name,
                x : record.x as f64,
                y : record.y as f64,
                image,
                opacity : record.opacity as f32 / 255.0,
                visible : record.visible,
                blend_mode : record.blend_mode,
                is_clipped : record.clipping != 0,
                mask : record.mask,
                blending_ranges : record.blending_ranges.0,
            };
            let parent = self.top();
            self.tree.push(parent, Node::Raster(layer));
        }
        else if self.options.is_group_open(&record.name)
        {
            let parent = self.top();
            let id = self.tree.push(parent, Node::Group(LayerGroup::default()));
            self.stack.push(id);
            log::debug!("{}open group {}", "  ".repeat(self.stack.len() - 2), id.0);
        }
        else
        {
            // root stays put
            if self.stack.len() <= 1
            {
                log::error!("group close marker {:?} with no open group", record.name);
                return Err(PsdError::StackCorrupted { depth : self.stack.len() });
            }
            let id = self.top();
            self.stack.pop();
            log::debug!("{}close group {} as {:?}", "  ".repeat(self.stack.len() - 1), id.0, record.name);
            if let Some(group) = self.tree.group_mut(id)
            {
                group.name = record.name;
                group.visible = record.visible;
            }
        }
        Ok(())
    }

    /// Returns the tree if exactly the root group is left open.
    pub (crate) fn finish(self) -> Result<LayerTree, PsdError>
    {
        if self.stack.len() != 1
        {
            log::error!("layer group stack corrupted, {} groups still open", self.stack.len() - 1);
            return Err(PsdError::StackCorrupted { depth : self.stack.len() });
        }
        Ok(self.tree)
    }

    /// Hands back whatever was built so far, balanced or not.
    pub (crate) fn into_partial(self) -> LayerTree
    {
        self.tree
    }
}
