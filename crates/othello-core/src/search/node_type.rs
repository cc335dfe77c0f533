//! Compile-time node-type specialization for the alpha-beta search.

/// Nodes outside the principal variation, searched with null windows.
pub struct NonPV;

/// Principal-variation nodes, searched with the full window.
pub struct PV;

/// The root node.
pub struct Root;

pub trait NodeType {
    /// True for PV and Root nodes.
    const PV_NODE: bool;
    /// True for the root only.
    const ROOT_NODE: bool;
    /// Identifier carried through split points.
    const TYPE_ID: u32;
}

impl NodeType for NonPV {
    const PV_NODE: bool = false;
    const ROOT_NODE: bool = false;
    const TYPE_ID: u32 = 1;
}

impl NodeType for PV {
    const PV_NODE: bool = true;
    const ROOT_NODE: bool = false;
    const TYPE_ID: u32 = 2;
}

impl NodeType for Root {
    const PV_NODE: bool = true;
    const ROOT_NODE: bool = true;
    const TYPE_ID: u32 = 3;
}
