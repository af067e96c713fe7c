//! Zip archive of an analysis session
//!
//! | member              | content                                        |
//! |---------------------|------------------------------------------------|
//! | `settings.ini`      | format version, trace flag, generator          |
//! | `taxonomy.xml`      | category tree                                  |
//! | `trace.dot`         | relationship graph                             |
//! | `<id>_<n>.mhd/.raw` | snapshot pair of output `n` of filter `id`     |
//! | anything else       | extension caches, or copied to scratch as is   |
//!
//! Archives older than the settings file carry a bare `version` member
//! instead and load with trace mode off.

use crate::config::IoConfig;
use crate::error::IoError;
use crate::extension::{CacheExtension, ExtensionRegistry};
use crate::handler::{ErrorHandler, LogErrorHandler};
use crate::reconstruction::{Reconstruction, ReconstructionReport};
use crate::settings::Settings;
use crate::taxonomy_xml::{parse_taxonomy, render_taxonomy};
use crate::trace::Trace;
use seg_core::ItemKind;
use seg_model::{AnalysisModel, FilterFactory, SnapshotCache};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Relationship graph member
pub const TRACE_FILE: &str = "trace.dot";
/// Category tree member
pub const TAXONOMY_FILE: &str = "taxonomy.xml";
/// Settings member
pub const SETTINGS_FILE: &str = "settings.ini";
/// Version member of archives predating `settings.ini`
pub const LEGACY_VERSION_FILE: &str = "version";

const SCRATCH_PREFIX: &str = "seg-";

/// Members of an archive, read without touching any model
#[derive(Debug, Clone, Default)]
pub struct ArchiveContents {
    /// Member names in archive order
    pub members: Vec<String>,
    /// Parsed `settings.ini`, or the legacy version
    pub settings: Option<Settings>,
    /// Text of `trace.dot`
    pub trace: Option<String>,
    /// Text of `taxonomy.xml`
    pub taxonomy: Option<String>,
    /// Every other member with its content
    pub others: Vec<(String, Vec<u8>)>,
}

/// Outcome of a successful load
#[derive(Debug)]
pub struct LoadReport {
    /// Settings read from the archive
    pub settings: Option<Settings>,
    /// What reconstruction did
    pub reconstruction: ReconstructionReport,
    /// Members handed to cache extensions
    pub extension_members: Vec<String>,
    /// Members copied to the scratch directory
    pub loose_files: Vec<String>,
    /// Categories whose missing properties were filled in
    pub repaired_categories: Vec<String>,
    /// Snapshots and loose files; filters read from it, so keep it alive
    /// as long as the loaded items are in use
    pub scratch: TempDir,
}

/// Outcome of a successful save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    /// Final archive path
    pub path: PathBuf,
    /// Members written, in order
    pub members: Vec<String>,
    /// Snapshot pairs written
    pub snapshots: usize,
}

/// Loads and saves analysis archives
pub struct SegFile {
    config: IoConfig,
    extensions: ExtensionRegistry,
    handler: Box<dyn ErrorHandler>,
}

impl std::fmt::Debug for SegFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegFile")
            .field("config", &self.config)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

impl Default for SegFile {
    fn default() -> Self {
        Self::new(IoConfig::default())
    }
}

impl SegFile {
    /// Archive IO with `config`, no extensions and a logging handler
    #[must_use]
    pub fn new(config: IoConfig) -> Self {
        Self {
            config,
            extensions: ExtensionRegistry::new(),
            handler: Box::new(LogErrorHandler),
        }
    }

    /// With a cache extension
    #[must_use]
    pub fn with_extension(mut self, extension: impl CacheExtension + 'static) -> Self {
        self.extensions.register(extension);
        self
    }

    /// With an error handler
    #[must_use]
    pub fn with_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.handler = Box::new(handler);
        self
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &IoConfig {
        &self.config
    }

    /// Registered extensions
    #[inline]
    pub fn extensions_mut(&mut self) -> &mut ExtensionRegistry {
        &mut self.extensions
    }

    /// Read every member of the archive at `path`
    ///
    /// # Errors
    ///
    /// Missing file, broken zip container, unreadable `trace.dot` or
    /// `taxonomy.xml`, malformed settings.
    pub fn read(&mut self, path: &Path) -> Result<ArchiveContents, IoError> {
        let path = self.locate(path, "analysis archive")?;
        let file = File::open(&path)?;
        let mut archive = ZipArchive::new(file)?;

        let mut contents = ArchiveContents::default();
        for index in 0..archive.len() {
            let mut member = archive.by_index(index)?;
            if member.is_dir() {
                continue;
            }
            let name = member.name().to_string();
            contents.members.push(name.clone());

            let mut data = Vec::new();
            if let Err(err) = member.read_to_end(&mut data) {
                self.handler.error(&format!("could not extract `{name}`: {err}"));
                if name == TRACE_FILE || name == TAXONOMY_FILE {
                    return Err(err.into());
                }
                continue;
            }

            match name.as_str() {
                SETTINGS_FILE => contents.settings = Some(Settings::parse(&String::from_utf8_lossy(&data))?),
                LEGACY_VERSION_FILE => {
                    if contents.settings.is_none() {
                        contents.settings = Some(Settings::from_legacy_version(&String::from_utf8_lossy(&data))?);
                    }
                }
                TRACE_FILE => contents.trace = Some(String::from_utf8_lossy(&data).into_owned()),
                TAXONOMY_FILE => contents.taxonomy = Some(String::from_utf8_lossy(&data).into_owned()),
                _ => contents.others.push((name, data)),
            }
        }
        Ok(contents)
    }

    /// Load the archive at `path` into `model`
    ///
    /// Nothing in `model` changes unless the version check passes and both
    /// `trace.dot` and `taxonomy.xml` parse. Any later failure rolls the
    /// model back. Observers see one structural bracket.
    ///
    /// # Errors
    ///
    /// See [`IoError::status`] for how failures map onto status codes.
    pub fn load(
        &mut self,
        path: &Path,
        model: &mut AnalysisModel,
        factory: &dyn FilterFactory,
    ) -> Result<LoadReport, IoError> {
        let contents = self.read(path)?;

        match &contents.settings {
            Some(settings) if settings.version < self.config.compatible_version => {
                self.handler.error(&format!(
                    "invalid file version {}, current version {}",
                    settings.version, self.config.format_version
                ));
                return Err(IoError::InvalidVersion {
                    found: settings.version,
                    floor: self.config.compatible_version,
                    current: self.config.format_version,
                });
            }
            Some(_) => {}
            None => self.handler.warning("archive has no settings, keeping current trace mode"),
        }

        let (Some(trace), Some(taxonomy)) = (&contents.trace, &contents.taxonomy) else {
            self.handler.error("could not load taxonomy and/or trace files");
            return Err(IoError::MissingMember(if contents.trace.is_none() {
                TRACE_FILE
            } else {
                TAXONOMY_FILE
            }));
        };
        let trace = Trace::parse(trace)?;
        let taxonomy = parse_taxonomy(taxonomy)?;

        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(self.config.scratch_root())?;
        let mut extension_members = Vec::new();
        let mut loose_files = Vec::new();
        for (name, data) in contents.others {
            if let Some(index) = self.extensions.claim(&name) {
                extension_members.push((index, name, data));
                continue;
            }
            self.store_loose_file(scratch.path(), &name, &data)?;
            loose_files.push(name);
        }

        let was_pristine = model.is_empty() && !model.is_changed();
        let settings = contents.settings;
        let engine = Reconstruction::new(factory)
            .with_scratch_dir(scratch.path())
            .with_read_only_fallback(self.config.fallback_to_read_only);

        let (reconstruction, repaired_categories) = model.batch(|model| {
            let checkpoint = model.checkpoint();
            let result = self.mount(model, settings.as_ref(), &taxonomy, trace, &engine, scratch.path(), &extension_members);
            if result.is_err() {
                model.rollback(checkpoint);
            }
            result
        })?;

        if was_pristine {
            model.mark_saved();
        }
        tracing::info!(
            path = %path.display(),
            items = model.len(),
            loose = loose_files.len(),
            "archive loaded"
        );
        Ok(LoadReport {
            settings,
            reconstruction,
            extension_members: extension_members.into_iter().map(|(_, name, _)| name).collect(),
            loose_files,
            repaired_categories,
            scratch,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn mount(
        &mut self,
        model: &mut AnalysisModel,
        settings: Option<&Settings>,
        taxonomy: &seg_core::Taxonomy,
        trace: Trace,
        engine: &Reconstruction<'_>,
        scratch: &Path,
        extension_members: &[(usize, String, Vec<u8>)],
    ) -> Result<(ReconstructionReport, Vec<String>), IoError> {
        if let Some(settings) = settings {
            let traceable = if model.is_empty() {
                settings.traceable
            } else {
                model.is_traceable() && settings.traceable
            };
            model.set_traceable(traceable);
        }

        let repaired = model.merge_taxonomy(taxonomy);
        for category in &repaired {
            self.handler
                .warning(&format!("category `{category}` was missing some properties"));
        }

        let report = engine.run(model, trace)?;

        for (index, name, data) in extension_members {
            let Some(extension) = self.extensions.get_mut(*index) else {
                continue;
            };
            extension
                .load_cache(name, data, scratch, model)
                .map_err(|err| IoError::Extension {
                    id: extension.id().to_string(),
                    message: err.to_string(),
                })?;
        }
        Ok((report, repaired))
    }

    fn store_loose_file(&mut self, scratch: &Path, name: &str, data: &[u8]) -> Result<(), IoError> {
        // Member names are untrusted; refuse anything escaping the scratch dir.
        let relative = Path::new(name);
        if relative.is_absolute() || relative.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            self.handler.warning(&format!("skipping member `{name}` outside the archive root"));
            return Ok(());
        }
        if SnapshotCache::parse_file_name(name).is_none() {
            self.handler.warning(&format!("unknown file `{name}` copied to scratch"));
        }
        let destination = scratch.join(relative);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(destination, data)?;
        Ok(())
    }

    fn locate(&mut self, path: &Path, hint: &str) -> Result<PathBuf, IoError> {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        match self.handler.file_not_found(path, hint) {
            Some(relocated) if relocated.is_file() => {
                tracing::info!(from = %path.display(), to = %relocated.display(), "file relocated");
                Ok(relocated)
            }
            _ => {
                self.handler.error(&format!("could not open file {}", path.display()));
                Err(IoError::FileNotFound(path.to_path_buf()))
            }
        }
    }

    /// Write `model` to `path`
    ///
    /// The archive is written next to `path` and moved over it once
    /// complete, so a failed save leaves any previous file intact. Clears
    /// the model's dirty flag.
    ///
    /// # Errors
    ///
    /// Empty file name, unserializable items, snapshot or extension
    /// failures, filesystem errors.
    pub fn save(&mut self, path: &Path, model: &mut AnalysisModel) -> Result<SaveReport, IoError> {
        if path.file_name().map_or(true, |name| name.is_empty()) {
            self.handler.error("file name is empty");
            return Err(IoError::EmptyFileName);
        }

        let settings = Settings::new(self.config.format_version, model.is_traceable(), self.config.generator.clone());
        let mut entries: Vec<(String, Vec<u8>)> = vec![
            (SETTINGS_FILE.to_string(), settings.render().into_bytes()),
            (TAXONOMY_FILE.to_string(), render_taxonomy(model.taxonomy())?.into_bytes()),
            (TRACE_FILE.to_string(), Trace::from_model(model)?.render().into_bytes()),
        ];

        let snapshot_all = model.is_traceable() || self.config.snapshot_all_outputs;
        let mut snapshots = 0;
        for item in model.items_of(ItemKind::Filter) {
            let Some(slot) = item.as_filter() else {
                continue;
            };
            // Edited outputs are written whatever the trace mode.
            let mut outputs = if snapshot_all { slot.filter().outputs() } else { Vec::new() };
            for &edited in slot.edited_outputs() {
                if !outputs.contains(&edited) {
                    outputs.push(edited);
                }
            }
            for output in outputs {
                let snapshot = slot
                    .filter()
                    .snapshot(output)
                    .map_err(|source| IoError::Snapshot { id: item.id(), source })?;
                let Some(snapshot) = snapshot else {
                    continue;
                };
                let (header, payload) = SnapshotCache::file_names(item.id(), output);
                entries.push((header, snapshot.header));
                entries.push((payload, snapshot.payload));
                snapshots += 1;
            }
        }

        for extension in self.extensions.iter_mut() {
            let cache = extension.save_cache(model).map_err(|err| IoError::Extension {
                id: extension.id().to_string(),
                message: err.to_string(),
            })?;
            entries.extend(cache.into_iter().map(|entry| (entry.path, entry.data)));
        }

        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = tempfile::NamedTempFile::new_in(directory)?;
        {
            let mut zip = ZipWriter::new(temp.as_file_mut());
            let options = FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(0o644);
            for (name, data) in &entries {
                zip.start_file(name.as_str(), options)?;
                zip.write_all(data)?;
            }
            zip.finish()?;
        }
        temp.persist(path).map_err(|err| IoError::Io(err.error))?;

        model.mark_saved();
        tracing::info!(path = %path.display(), members = entries.len(), snapshots, "archive saved");
        Ok(SaveReport {
            path: path.to_path_buf(),
            members: entries.into_iter().map(|(name, _)| name).collect(),
            snapshots,
        })
    }
}
