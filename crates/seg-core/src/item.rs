//! Item identities and kinds

use crate::arguments::ArgumentsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Index of one output of a filter
pub type OutputId = u32;

/// Archive-local identity of an item
///
/// Ids are unique within one session and survive a save/load round trip
/// verbatim, so they double as vertex names in the serialized trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(u32);

impl ItemId {
    /// Wrap a raw id
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw integer value
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The id following this one
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<u32> for ItemId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Closed set of item kinds
///
/// Samples, channels, filters and segmentations are vertices of the
/// relationship graph. Category elements live in the separate
/// [`Taxonomy`](crate::Taxonomy) tree and never appear in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    /// Acquisition sample
    Sample,
    /// Image channel backed by a filter output
    Channel,
    /// Processing filter
    Filter,
    /// Segmentation produced by a filter output
    Segmentation,
    /// Element of the category tree
    CategoryElement,
}

impl ItemKind {
    /// Kinds that are vertices of the relationship graph
    pub const GRAPH_KINDS: [ItemKind; 4] = [
        ItemKind::Sample,
        ItemKind::Channel,
        ItemKind::Filter,
        ItemKind::Segmentation,
    ];

    /// Vertex shape used by the trace format
    #[must_use]
    pub const fn shape(self) -> Option<&'static str> {
        match self {
            Self::Sample => Some("trapezium"),
            Self::Channel => Some("box"),
            Self::Filter => Some("invtriangle"),
            Self::Segmentation => Some("ellipse"),
            Self::CategoryElement => None,
        }
    }

    /// Inverse of [`ItemKind::shape`]
    #[must_use]
    pub fn from_shape(shape: &str) -> Option<Self> {
        Self::GRAPH_KINDS
            .into_iter()
            .find(|kind| kind.shape() == Some(shape))
    }

    /// Whether items of this kind are relationship graph vertices
    #[inline]
    #[must_use]
    pub const fn is_graph_item(self) -> bool {
        !matches!(self, Self::CategoryElement)
    }

    /// Human readable name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sample => "sample",
            Self::Channel => "channel",
            Self::Filter => "filter",
            Self::Segmentation => "segmentation",
            Self::CategoryElement => "category element",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One output of one filter, written as `filterId_outputIndex`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputRef {
    /// Producing filter
    pub filter: ItemId,
    /// Output index on that filter
    pub output: OutputId,
}

impl OutputRef {
    /// Reference `output` of `filter`
    #[inline]
    #[must_use]
    pub const fn new(filter: ItemId, output: OutputId) -> Self {
        Self { filter, output }
    }

    /// Parse a comma separated list of references, skipping blanks
    ///
    /// # Errors
    ///
    /// Fails on the first malformed token.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, ArgumentsError> {
        raw.split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.filter, self.output)
    }
}

impl FromStr for OutputRef {
    type Err = ArgumentsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ArgumentsError::MalformedOutputRef(s.to_string());
        let (filter, output) = s.trim().split_once('_').ok_or_else(malformed)?;
        Ok(Self {
            filter: filter.parse().map_err(|_| malformed())?,
            output: output.parse().map_err(|_| malformed())?,
        })
    }
}
