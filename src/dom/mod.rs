//! Parsed-document model shared by content documents and the package document.
//!
//! - [`arena`]: the tree itself
//! - [`parser`]: tolerant markup reader
//! - [`serialize`]: writer that preserves untouched markup
//! - [`patch`]: the only way passes mutate a tree
//! - [`role_map`]: `epub:type` to ARIA role tables

pub mod arena;
pub mod parser;
pub mod patch;
pub mod role_map;
pub mod serialize;

pub use arena::{Attribute, Document, Node, NodeData, NodeId};
pub use parser::{MarkupFault, Parsed, parse_document};
pub use patch::{NewElement, Patch, PatchSet, TitleSlot, apply_patch, title_patch, title_slot};
pub use role_map::{
    ElementContext, RoleTable, SemanticRoleRule, element_role, element_role_for_type, map_roles,
};
pub use serialize::{serialize, serialize_node};
