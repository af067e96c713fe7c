//! Items held by the registry
//!
//! The registry owns every item by value. Cross references are ids only:
//! a channel names the filter output backing it, a segmentation the filter
//! output that produced it, a filter the outputs feeding its input slots.

use crate::filter::{Filter, FilterInputs, SnapshotCache};
use seg_core::labels::{self, keys};
use seg_core::{Arguments, ArgumentsError, ItemId, ItemKind, OutputId, OutputRef};
use std::collections::BTreeSet;

/// Acquisition sample
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sample {
    arguments: Arguments,
}

impl Sample {
    /// Sample described by `arguments`
    #[must_use]
    pub fn new(arguments: Arguments) -> Self {
        Self { arguments }
    }

    /// Free arguments
    #[inline]
    #[must_use]
    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    pub(crate) fn arguments_mut(&mut self) -> &mut Arguments {
        &mut self.arguments
    }
}

/// Image channel bound to one filter output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    volume: OutputRef,
    arguments: Arguments,
}

impl Channel {
    /// Channel backed by `volume`; a `Volume` key in `arguments` is dropped
    #[must_use]
    pub fn new(volume: OutputRef, mut arguments: Arguments) -> Self {
        arguments.remove(keys::VOLUME);
        Self { volume, arguments }
    }

    /// Channel described by serialized arguments
    ///
    /// # Errors
    ///
    /// Missing or malformed `Volume`.
    pub fn from_arguments(arguments: &Arguments) -> Result<Self, ArgumentsError> {
        let volume = arguments
            .get(keys::VOLUME)
            .ok_or_else(|| ArgumentsError::MalformedOutputRef(String::new()))?
            .parse()?;
        Ok(Self::new(volume, arguments.clone()))
    }

    /// Backing filter output
    #[inline]
    #[must_use]
    pub fn volume(&self) -> OutputRef {
        self.volume
    }

    /// Free arguments
    #[inline]
    #[must_use]
    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    pub(crate) fn arguments_mut(&mut self) -> &mut Arguments {
        &mut self.arguments
    }
}

/// Registry slot of a filter
#[derive(Debug)]
pub struct FilterItem {
    filter: Box<dyn Filter>,
    inputs: FilterInputs,
    edited: BTreeSet<OutputId>,
    cache: Option<SnapshotCache>,
}

impl FilterItem {
    /// Wrap `filter` fed by `inputs`, in slot order
    #[must_use]
    pub fn new(filter: Box<dyn Filter>, inputs: FilterInputs) -> Self {
        Self {
            filter,
            inputs,
            edited: BTreeSet::new(),
            cache: None,
        }
    }

    /// Mark outputs as edited by hand
    #[must_use]
    pub fn with_edited(mut self, edited: impl IntoIterator<Item = OutputId>) -> Self {
        self.edited.extend(edited);
        self
    }

    /// Split serialized filter arguments into input slots, edited outputs
    /// and the filter's own arguments
    ///
    /// # Errors
    ///
    /// Malformed `Inputs` tokens or `Edit` entries.
    pub fn split_arguments(
        arguments: &Arguments,
    ) -> Result<(FilterInputs, BTreeSet<OutputId>, Arguments), ArgumentsError> {
        let mut own = arguments.clone();
        let inputs = match own.remove(keys::INPUTS) {
            Some(raw) => OutputRef::parse_list(&raw)?,
            None => FilterInputs::new(),
        };

        let mut edited = BTreeSet::new();
        if let Some(raw) = own.remove(keys::EDIT) {
            let mut list = Arguments::new();
            list.insert(keys::EDIT, raw)?;
            for entry in list.list(keys::EDIT).unwrap_or_default() {
                let output = entry.parse().map_err(|_| ArgumentsError::InvalidValue {
                    key: keys::EDIT.to_string(),
                    value: entry.clone(),
                })?;
                edited.insert(output);
            }
        }
        Ok((inputs, edited, own))
    }

    /// The filter
    #[inline]
    #[must_use]
    pub fn filter(&self) -> &dyn Filter {
        self.filter.as_ref()
    }

    /// The filter, mutably
    #[inline]
    pub fn filter_mut(&mut self) -> &mut dyn Filter {
        self.filter.as_mut()
    }

    /// Inputs in slot order
    #[inline]
    #[must_use]
    pub fn inputs(&self) -> &[OutputRef] {
        &self.inputs
    }

    /// Relation label of every input slot with the output feeding it
    pub fn input_slots(&self) -> impl Iterator<Item = (String, OutputRef)> + '_ {
        self.inputs
            .iter()
            .enumerate()
            .map(|(position, input)| (labels::input_slot(position, input.output), *input))
    }

    /// Outputs edited by hand
    #[inline]
    #[must_use]
    pub fn edited_outputs(&self) -> &BTreeSet<OutputId> {
        &self.edited
    }

    /// Whether `output` must be persisted regardless of trace mode
    #[inline]
    #[must_use]
    pub fn is_edited(&self, output: OutputId) -> bool {
        self.edited.contains(&output)
    }

    /// Snapshot directory recorded at load time
    #[inline]
    #[must_use]
    pub fn cache(&self) -> Option<&SnapshotCache> {
        self.cache.as_ref()
    }

    pub(crate) fn mark_edited(&mut self, output: OutputId) -> bool {
        self.edited.insert(output)
    }

    pub(crate) fn set_cache(&mut self, cache: SnapshotCache) {
        self.cache = Some(cache);
    }

    fn serialized_arguments(&self) -> Result<Arguments, ArgumentsError> {
        let mut args = self.filter.arguments();
        if !self.inputs.is_empty() {
            let inputs: Vec<String> = self.inputs.iter().map(ToString::to_string).collect();
            args.insert(keys::INPUTS, inputs.join(","))?;
        }
        if !self.edited.is_empty() {
            args.insert_list(keys::EDIT, self.edited.iter().map(ToString::to_string))?;
        }
        Ok(args)
    }
}

/// Segmentation bound to the filter output that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segmentation {
    source: OutputRef,
    number: u32,
    category: Option<String>,
    arguments: Arguments,
}

impl Segmentation {
    /// Unlabeled, uncategorized segmentation of `source`
    #[must_use]
    pub fn new(source: OutputRef) -> Self {
        Self {
            source,
            number: 0,
            category: None,
            arguments: Arguments::new(),
        }
    }

    /// Segmentation described by serialized arguments, created by `filter`
    ///
    /// # Errors
    ///
    /// Malformed `Output` or `Number`.
    pub fn from_arguments(filter: ItemId, arguments: &Arguments) -> Result<Self, ArgumentsError> {
        let output = arguments.get_parsed(keys::OUTPUT)?.unwrap_or(0);
        let number = arguments.get_parsed(keys::NUMBER)?.unwrap_or(0);
        let category = arguments
            .get(keys::TAXONOMY)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        Ok(Self::new(OutputRef::new(filter, output))
            .with_number(number)
            .with_category(category)
            .with_arguments(arguments.clone()))
    }

    /// Explicit label; zero asks for the next free one
    #[must_use]
    pub fn with_number(mut self, number: u32) -> Self {
        self.number = number;
        self
    }

    /// Qualified category name
    #[must_use]
    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    /// Free arguments; typed keys are dropped
    #[must_use]
    pub fn with_arguments(mut self, mut arguments: Arguments) -> Self {
        for key in [keys::OUTPUT, keys::NUMBER, keys::TAXONOMY] {
            arguments.remove(key);
        }
        self.arguments = arguments;
        self
    }

    /// Producing filter output
    #[inline]
    #[must_use]
    pub fn source(&self) -> OutputRef {
        self.source
    }

    /// Numeric label, zero while unassigned
    #[inline]
    #[must_use]
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Qualified category name
    #[inline]
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    /// Free arguments
    #[inline]
    #[must_use]
    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    pub(crate) fn set_number(&mut self, number: u32) {
        self.number = number;
    }

    pub(crate) fn set_category(&mut self, category: Option<String>) {
        self.category = category;
    }

    pub(crate) fn arguments_mut(&mut self) -> &mut Arguments {
        &mut self.arguments
    }
}

/// Kind-specific payload of an item
#[derive(Debug)]
pub enum ItemData {
    /// Acquisition sample
    Sample(Sample),
    /// Image channel
    Channel(Channel),
    /// Processing filter
    Filter(FilterItem),
    /// Segmentation
    Segmentation(Segmentation),
}

impl ItemData {
    /// Kind of the payload
    #[must_use]
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Sample(_) => ItemKind::Sample,
            Self::Channel(_) => ItemKind::Channel,
            Self::Filter(_) => ItemKind::Filter,
            Self::Segmentation(_) => ItemKind::Segmentation,
        }
    }
}

/// Registry entry
#[derive(Debug)]
pub struct Item {
    id: ItemId,
    name: String,
    data: ItemData,
    // Argument keys as first serialized; typed keys go back to these slots.
    key_order: Vec<String>,
}

impl Item {
    pub(crate) fn new(id: ItemId, name: String, data: ItemData) -> Self {
        Self {
            id,
            name,
            data,
            key_order: Vec::new(),
        }
    }

    pub(crate) fn with_key_order(mut self, key_order: Vec<String>) -> Self {
        self.key_order = key_order;
        self
    }

    /// Identity
    #[inline]
    #[must_use]
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Display name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ItemKind {
        self.data.kind()
    }

    /// Payload
    #[inline]
    #[must_use]
    pub fn data(&self) -> &ItemData {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut ItemData {
        &mut self.data
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Sample payload
    #[must_use]
    pub fn as_sample(&self) -> Option<&Sample> {
        match &self.data {
            ItemData::Sample(sample) => Some(sample),
            _ => None,
        }
    }

    /// Channel payload
    #[must_use]
    pub fn as_channel(&self) -> Option<&Channel> {
        match &self.data {
            ItemData::Channel(channel) => Some(channel),
            _ => None,
        }
    }

    /// Filter payload
    #[must_use]
    pub fn as_filter(&self) -> Option<&FilterItem> {
        match &self.data {
            ItemData::Filter(filter) => Some(filter),
            _ => None,
        }
    }

    /// Segmentation payload
    #[must_use]
    pub fn as_segmentation(&self) -> Option<&Segmentation> {
        match &self.data {
            ItemData::Segmentation(segmentation) => Some(segmentation),
            _ => None,
        }
    }

    pub(crate) fn as_filter_mut(&mut self) -> Option<&mut FilterItem> {
        match &mut self.data {
            ItemData::Filter(filter) => Some(filter),
            _ => None,
        }
    }

    /// Argument map as written to the trace
    ///
    /// Keys keep the order they were loaded in; keys added since follow.
    ///
    /// # Errors
    ///
    /// A category name or filter argument that breaks the grammar.
    pub fn arguments(&self) -> Result<Arguments, ArgumentsError> {
        let mut args = self.typed_arguments()?;
        if !self.key_order.is_empty() {
            args.order_like(&self.key_order);
        }
        Ok(args)
    }

    fn typed_arguments(&self) -> Result<Arguments, ArgumentsError> {
        match &self.data {
            ItemData::Sample(sample) => Ok(sample.arguments.clone()),
            ItemData::Channel(channel) => {
                let mut args = channel.arguments.clone();
                args.insert(keys::VOLUME, channel.volume.to_string())?;
                Ok(args)
            }
            ItemData::Filter(filter) => filter.serialized_arguments(),
            ItemData::Segmentation(segmentation) => {
                let mut args = segmentation.arguments.clone();
                args.insert(keys::OUTPUT, segmentation.source.output.to_string())?;
                args.insert(keys::NUMBER, segmentation.number.to_string())?;
                if let Some(category) = &segmentation.category {
                    args.insert(keys::TAXONOMY, category.clone())?;
                }
                Ok(args)
            }
        }
    }
}

/// An item waiting to be added to the registry
#[derive(Debug)]
pub struct NewItem {
    pub(crate) id: Option<ItemId>,
    pub(crate) name: String,
    pub(crate) data: ItemData,
    pub(crate) key_order: Vec<String>,
    pub(crate) link: bool,
}

impl NewItem {
    /// Item named `name` with payload `data`
    #[must_use]
    pub fn new(name: impl Into<String>, data: ItemData) -> Self {
        Self {
            id: None,
            name: name.into(),
            data,
            key_order: Vec::new(),
            link: true,
        }
    }

    /// Sample item
    #[must_use]
    pub fn sample(name: impl Into<String>, sample: Sample) -> Self {
        Self::new(name, ItemData::Sample(sample))
    }

    /// Channel item
    #[must_use]
    pub fn channel(name: impl Into<String>, channel: Channel) -> Self {
        Self::new(name, ItemData::Channel(channel))
    }

    /// Filter item, named after its type
    #[must_use]
    pub fn filter(filter: FilterItem) -> Self {
        let name = filter.filter.type_name().to_string();
        Self::new(name, ItemData::Filter(filter))
    }

    /// Segmentation item
    #[must_use]
    pub fn segmentation(name: impl Into<String>, segmentation: Segmentation) -> Self {
        Self::new(name, ItemData::Segmentation(segmentation))
    }

    /// Request a specific id
    #[must_use]
    pub fn with_id(mut self, id: ItemId) -> Self {
        self.id = Some(id);
        self
    }

    /// Serialize arguments in the key order of `layout`
    #[must_use]
    pub fn with_key_order(mut self, layout: &Arguments) -> Self {
        self.key_order = layout.keys().map(str::to_string).collect();
        self
    }

    /// Leave the `Volume`, input-slot and `CreateLink` relations to the
    /// caller
    ///
    /// The item is registered unlinked and the caller adds those relations
    /// through [`AnalysisModel::add_relation`](crate::AnalysisModel::add_relation)
    /// before closing its bracket, in whatever order it needs to preserve.
    #[must_use]
    pub fn without_links(mut self) -> Self {
        self.link = false;
        self
    }

    /// Kind of the pending item
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ItemKind {
        self.data.kind()
    }
}
