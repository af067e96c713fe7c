//! Core vocabulary of the persistent analysis graph
//!
//! Everything the registry, the relationship graph and the archive codec
//! agree on lives here:
//! - [`ItemId`] and [`ItemKind`]: identity and the closed set of item kinds
//! - [`OutputRef`]: the `filterId_outputIndex` composite key
//! - [`Arguments`]: the `Key=Value;` argument grammar with bracketed lists
//! - [`Taxonomy`]: the category tree segmentations are classified into
//! - [`labels`]: relation labels and well-known argument keys

pub mod arguments;
pub mod item;
pub mod labels;
pub mod taxonomy;

pub use arguments::{Arguments, ArgumentsError};
pub use item::{ItemId, ItemKind, OutputId, OutputRef};
pub use taxonomy::{Category, Taxonomy, TaxonomyError};
