//! Item registry and model facade
//!
//! [`AnalysisModel`] is the single mutation point of an analysis session.
//! It owns every [`Item`] by value, keeps the
//! [`RelationshipGraph`](seg_graph::RelationshipGraph) in step with the
//! registry and notifies [`ModelObserver`]s about structural changes.
//!
//! ```
//! use seg_core::Arguments;
//! use seg_model::{AnalysisModel, NewItem, Sample};
//!
//! let mut model = AnalysisModel::new();
//! let id = model.add(NewItem::sample("stack", Sample::new(Arguments::new()))).unwrap();
//! assert!(model.contains(id));
//! assert!(model.is_changed());
//! ```

mod config;
mod error;
mod filter;
mod item;
mod model;
mod observer;
mod policy;

pub use config::{ModelConfig, CATEGORY_DIMENSIONS};
pub use error::ModelError;
pub use filter::{
    Filter, FilterError, FilterFactory, FilterInputs, OutputSnapshot, SnapshotCache, HEADER_EXTENSION,
    PAYLOAD_EXTENSION,
};
pub use item::{Channel, FilterItem, Item, ItemData, NewItem, Sample, Segmentation};
pub use model::{AnalysisModel, Checkpoint};
pub use observer::{ModelEvent, ModelObserver, ObserverId, StructureChange};
pub use policy::{DeleteDecision, DeletePolicy};
