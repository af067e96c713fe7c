//! Persistence codec and reconstruction engine
//!
//! - [`Trace`]: `trace.dot`, the textual relationship graph
//! - [`parse_taxonomy`] / [`render_taxonomy`]: `taxonomy.xml`
//! - [`Settings`]: `settings.ini` and the legacy `version` member
//! - [`SegFile`]: the zip archive bundling them with filter snapshots and
//!   extension caches
//! - [`Reconstruction`]: rebuilds live items from a parsed trace
//!
//! Load and save report failures as [`IoError`]; [`IoError::status`] maps
//! them onto the [`LoadStatus`] codes.

mod archive;
mod config;
mod error;
mod extension;
mod handler;
mod read_only;
mod reconstruction;
mod settings;
mod taxonomy_xml;
mod trace;

pub use archive::{
    ArchiveContents, LoadReport, SaveReport, SegFile, LEGACY_VERSION_FILE, SETTINGS_FILE, TAXONOMY_FILE, TRACE_FILE,
};
pub use config::{ConfigError, IoConfig, SEG_FILE_COMPATIBLE_VERSION, SEG_FILE_VERSION};
pub use error::{CodecError, IoError, LoadStatus, ReconstructionError};
pub use extension::{CacheEntry, CacheExtension, ExtensionError, ExtensionRegistry};
pub use handler::{ErrorHandler, LogErrorHandler};
pub use read_only::{ReadOnlyFactory, ReadOnlyFilter};
pub use reconstruction::{Reconstruction, ReconstructionReport};
pub use settings::Settings;
pub use taxonomy_xml::{parse_taxonomy, render_taxonomy};
pub use trace::{Trace, TraceVertex};
