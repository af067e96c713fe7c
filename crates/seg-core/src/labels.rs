//! Relation labels and well-known argument keys

use crate::item::OutputId;

/// Filter -> Segmentation: the filter output that produced a segmentation
pub const CREATE_LINK: &str = "CreateLink";

/// Filter -> Channel: the filter output backing a channel
pub const VOLUME: &str = "Volume";

/// Sample -> Channel
pub const STAIN: &str = "Stain";

/// Sample -> Segmentation
pub const WHERE: &str = "where";

/// Label of the relation feeding input `position` of a filter from
/// `output` of the upstream filter
///
/// Spelled `position-output`, so every input of a filter has its own label
/// even when two inputs come from the same upstream filter, and the label
/// survives the upstream filter being renumbered.
#[must_use]
pub fn input_slot(position: usize, output: OutputId) -> String {
    format!("{position}-{output}")
}

/// Position and output index encoded in an input-slot label
#[must_use]
pub fn parse_input_slot(label: &str) -> Option<(usize, OutputId)> {
    let (position, output) = label.split_once('-')?;
    Some((position.parse().ok()?, output.parse().ok()?))
}

/// Argument keys with meaning to the registry and the codec
pub mod keys {
    /// Channel: `filterId_outputIndex` of the backing output
    pub const VOLUME: &str = "Volume";
    /// Filter: comma separated `filterId_outputIndex` inputs
    pub const INPUTS: &str = "Inputs";
    /// Filter: bracketed list of hand-edited output indices
    pub const EDIT: &str = "Edit";
    /// Segmentation: output index on the creating filter
    pub const OUTPUT: &str = "Output";
    /// Segmentation: numeric label
    pub const NUMBER: &str = "Number";
    /// Segmentation: qualified category name
    pub const TAXONOMY: &str = "Taxonomy";
}
