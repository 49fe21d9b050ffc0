//! The single owned session: folder lifecycle state machine plus the shared
//! metadata binding.
//!
//! Earlier revisions of this tool kept "current folder" and "current
//! metadata" as mutable attributes on GUI window objects, duplicated per
//! window, which is exactly how two views of the same folder ended up
//! silently overwriting each other. `Session` replaces that with one owner:
//! at most one folder is open, its [`TableBinding`] is the only live copy of
//! the metadata, and every component (folder lifecycle, template store,
//! registry) is reached through the session.
//!
//! Lifecycle: `Closed` → (`create` | `open`) → `Open` → (`close` |
//! `close_discarding`) → `Closed`. There is no in-memory recording state that
//! survives a restart; a recording worker is tracked only while it runs, and
//! the folder's derived state is re-scanned from disk afterwards.
//!
//! The session never prompts. Conditions that need a human decision are
//! returned to the caller: advisory open failures as errors retried with
//! [`OpenOptions`], and template drift as a [`TemplateUpdate`] value.

use crate::acquisition::{run_recording, CancelToken, FrameSource, RunReport};
use crate::config::Settings;
use crate::error::{AppResult, RecorderError};
use crate::folder::{AcquisitionParams, ExperimentFolder, FolderState};
use crate::layout::TableLayout;
use crate::metadata::Metadata;
use crate::registry::{ExperimentRegistry, ExperimentType};
use crate::table::TableBinding;
use crate::template::{propose_update, TemplateDiff, TemplateStore};
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;

/// Caller decisions for the advisory conditions of `open`.
///
/// A first `open` call with the defaults surfaces `InvalidStructure` or
/// `MissingMetadata`; after confirming with the user, the caller retries with
/// the matching flag set. Neither condition is ever auto-resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// Open even though declared subdirectories are missing.
    pub allow_invalid_structure: bool,
    /// Create a fresh `metadata.json` with this layout if the folder has
    /// none.
    pub create_missing_metadata: Option<TableLayout>,
}

/// Snapshot of an open folder's derived state, for display.
#[derive(Debug, Clone)]
pub struct FolderInfo {
    /// Folder root path.
    pub path: PathBuf,
    /// Derived state from the filesystem scan.
    pub state: FolderState,
    /// Active table layout.
    pub layout: TableLayout,
    /// Acquisition parameters of a previous recording, if any.
    pub params: Option<AcquisitionParams>,
    /// True when the folder already has recorded media, so duration/fps
    /// controls should be locked to the sidecar values.
    pub params_locked: bool,
}

/// What happened to the experiment type's template during a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateUpdate {
    /// The experiment type has no template reference.
    NoTemplate,
    /// Table and template already agree.
    UpToDate,
    /// New variables were appended to the template.
    Applied {
        /// Number of variables appended.
        added: usize,
    },
    /// The template holds variables the table no longer has. Appending
    /// silently could resurrect rows a user intentionally deleted, so the
    /// caller must decide: [`Session::append_template_anyway`] or
    /// [`Session::branch_template`].
    NeedsDecision(TemplateDiff),
}

struct OpenFolder {
    folder: ExperimentFolder,
    experiment: ExperimentType,
    binding: TableBinding,
    on_disk: Metadata,
}

struct RecordingWorker {
    token: CancelToken,
    join: JoinHandle<AppResult<RunReport>>,
}

/// Process-wide recorder state. See the module docs for the lifecycle.
pub struct Session {
    settings: Settings,
    registry: ExperimentRegistry,
    templates: TemplateStore,
    open: Option<OpenFolder>,
    recording: Option<RecordingWorker>,
}

impl Session {
    /// Start a session: load the experiment registry and attach the template
    /// store. No folder is open.
    pub fn new(settings: Settings) -> AppResult<Self> {
        let registry = ExperimentRegistry::load(&settings.registry_file)?;
        let templates = TemplateStore::new(&settings.template_dir);
        Ok(Self {
            settings,
            registry,
            templates,
            open: None,
            recording: None,
        })
    }

    /// Runtime settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The experiment-type catalog.
    pub fn registry(&self) -> &ExperimentRegistry {
        &self.registry
    }

    /// The template store.
    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    /// Register a new experiment type (validates the path against the data
    /// root and persists the catalog).
    pub fn add_experiment(
        &mut self,
        name: &str,
        chosen_path: &Path,
        metadata_template: Option<String>,
        camera_settings: Option<PathBuf>,
        subdir_shape: crate::layout::SubdirShape,
    ) -> AppResult<()> {
        self.registry.add(
            &self.settings.data_root,
            name,
            chosen_path,
            metadata_template,
            camera_settings,
            subdir_shape,
        )?;
        Ok(())
    }

    /// Proactive reachability check for the lab data root, run before every
    /// mutating filesystem operation. Never retried automatically.
    pub fn check_data_access(&self) -> AppResult<()> {
        if self.settings.data_root.is_dir() {
            Ok(())
        } else {
            Err(RecorderError::AccessError(self.settings.data_root.clone()))
        }
    }

    /// Whether a folder is open.
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Whether a recording worker is active for the open folder. UI layers
    /// should disable editing while this is true; the mutating session
    /// operations enforce it regardless.
    pub fn is_recording(&self) -> bool {
        self.recording
            .as_ref()
            .is_some_and(|worker| !worker.join.is_finished())
    }

    fn guard_recording(&self) -> AppResult<()> {
        if self.is_recording() {
            Err(RecorderError::RecordingActive)
        } else {
            Ok(())
        }
    }

    fn open_folder(&self) -> AppResult<&OpenFolder> {
        self.open.as_ref().ok_or(RecorderError::NoOpenFolder)
    }

    /// The grid binding of the open folder, read-only.
    pub fn binding(&self) -> AppResult<&TableBinding> {
        Ok(&self.open_folder()?.binding)
    }

    /// The grid binding of the open folder, for edits. Refused while a
    /// recording worker owns the folder.
    pub fn binding_mut(&mut self) -> AppResult<&mut TableBinding> {
        self.guard_recording()?;
        Ok(&mut self.open.as_mut().ok_or(RecorderError::NoOpenFolder)?.binding)
    }

    /// Experiment type of the open folder.
    pub fn experiment(&self) -> AppResult<&ExperimentType> {
        Ok(&self.open_folder()?.experiment)
    }

    /// Create a new experiment folder and open it.
    ///
    /// The data-root reachability check runs before any mkdir, so a failed
    /// create leaves zero filesystem mutations behind. An existing target
    /// path fails with `AlreadyExists`; the caller is expected to offer
    /// opening the existing folder instead.
    pub fn create(
        &mut self,
        folder_name: &str,
        experiment_name: &str,
        layout: Option<TableLayout>,
    ) -> AppResult<FolderInfo> {
        self.guard_recording()?;
        self.ensure_closed()?;

        let experiment = self
            .registry
            .get(experiment_name)
            .ok_or_else(|| RecorderError::NotFound(experiment_name.to_string()))?
            .clone();

        self.check_data_access()?;

        let path = experiment.root_under(&self.settings.data_root).join(folder_name);
        if path.exists() {
            return Err(RecorderError::AlreadyExists(path.display().to_string()));
        }

        let layout = layout.unwrap_or(experiment.default_layout);
        let folder = ExperimentFolder::create(&path, experiment.subdir_shape)?;

        let template_variables = self.template_variables(&experiment)?;
        let binding = TableBinding::seeded(layout, &template_variables, self.settings.pad_rows);

        let initial = binding.to_metadata();
        initial.save(&folder.metadata_path())?;

        let info = folder_info(&folder, layout)?;
        self.open = Some(OpenFolder {
            folder,
            experiment,
            binding,
            on_disk: initial,
        });
        Ok(info)
    }

    /// Open an existing experiment folder.
    ///
    /// Surfaces `InvalidStructure` and `MissingMetadata` as advisory errors
    /// unless the matching [`OpenOptions`] flag confirms the override. On
    /// success the layout is detected from the metadata keys, the template's
    /// known variables are merged into the table as empty rows, and the
    /// derived folder state plus any recorded acquisition parameters are
    /// returned so the caller can lock structural controls.
    pub fn open(&mut self, path: &Path, options: OpenOptions) -> AppResult<FolderInfo> {
        self.guard_recording()?;
        self.ensure_closed()?;
        self.check_data_access()?;

        // Relative inputs are folder names under the data root.
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.settings.data_root.join(path)
        };
        if !path.starts_with(&self.settings.data_root) {
            return Err(RecorderError::PathOutsideDataRoot(path));
        }
        if !path.is_dir() {
            return Err(RecorderError::NotFound(path.display().to_string()));
        }

        let experiment = self.resolve_experiment(&path);
        let folder = ExperimentFolder::new(&path, experiment.subdir_shape);

        match folder.validate_structure() {
            Ok(()) => {}
            Err(e @ RecorderError::InvalidStructure { .. }) => {
                if options.allow_invalid_structure {
                    log::warn!("Opening {} despite missing subdirectories", path.display());
                } else {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }

        let mut metadata = match Metadata::load(&folder.metadata_path()) {
            Ok(metadata) => metadata,
            Err(RecorderError::NotFound(_)) => match options.create_missing_metadata {
                Some(layout) => {
                    let fresh = Metadata::new(layout);
                    fresh.save(&folder.metadata_path())?;
                    fresh
                }
                None => return Err(RecorderError::MissingMetadata(path)),
            },
            Err(e) => return Err(e),
        };

        let layout = metadata.detect_layout();
        // Legacy files can be missing whole columns; normalize before the
        // record becomes both the binding and the dirty-check baseline.
        metadata.ensure_layout_columns(layout);
        let mut binding = TableBinding::bind(metadata.clone(), layout, self.settings.pad_rows);
        let template_variables = self.template_variables(&experiment)?;
        binding.merge_template(&template_variables);

        let info = folder_info(&folder, layout)?;
        log::info!(
            "Opened {} ({layout} layout, state {:?})",
            path.display(),
            info.state
        );
        self.open = Some(OpenFolder {
            folder,
            experiment,
            binding,
            on_disk: metadata,
        });
        Ok(info)
    }

    /// Write the table's metadata snapshot to `metadata.json` and reconcile
    /// the experiment type's template.
    ///
    /// New variable names are appended to the template automatically; if the
    /// template holds variables the table lost, nothing is written to it and
    /// the drift is returned for the caller to resolve.
    pub fn save(&mut self) -> AppResult<TemplateUpdate> {
        self.guard_recording()?;
        self.check_data_access()?;
        let open = self.open.as_mut().ok_or(RecorderError::NoOpenFolder)?;

        let snapshot = open.binding.to_metadata();
        snapshot.save(&open.folder.metadata_path())?;
        let variables = snapshot.variables().to_vec();
        open.on_disk = snapshot;

        let Some(template_name) = open.experiment.metadata_template.clone() else {
            return Ok(TemplateUpdate::NoTemplate);
        };
        let template = match self.templates.load(&template_name) {
            Ok(vars) => vars,
            Err(RecorderError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        let diff = propose_update(&variables, &template);
        if !diff.missing.is_empty() {
            return Ok(TemplateUpdate::NeedsDecision(diff));
        }
        if diff.new.is_empty() {
            return Ok(TemplateUpdate::UpToDate);
        }
        let added = self.templates.append(&template_name, &diff.new)?;
        Ok(TemplateUpdate::Applied { added })
    }

    /// Resolve a `NeedsDecision` save outcome by appending the table's new
    /// variables to the template anyway. The template's extra variables stay;
    /// append is a union and never removes.
    pub fn append_template_anyway(&mut self) -> AppResult<usize> {
        let open = self.open_folder()?;
        let template_name = open
            .experiment
            .metadata_template
            .clone()
            .ok_or_else(|| RecorderError::NotFound("metadata template".to_string()))?;
        let variables = open.binding.to_metadata().variables().to_vec();
        self.templates.append(&template_name, &variables)
    }

    /// Resolve a `NeedsDecision` save outcome by branching: create a new
    /// template named `name` from the table's current variables and point
    /// the open session at it. The registry record on disk is unchanged.
    pub fn branch_template(&mut self, name: &str) -> AppResult<()> {
        let open = self.open.as_mut().ok_or(RecorderError::NoOpenFolder)?;
        let variables = open.binding.to_metadata().variables().to_vec();
        self.templates.create_from(name, &variables)?;
        open.experiment.metadata_template = Some(name.to_string());
        Ok(())
    }

    /// Whether the table has edits not yet in `metadata.json`. False when no
    /// folder is open.
    pub fn has_unsaved_changes(&self) -> bool {
        self.open
            .as_ref()
            .is_some_and(|open| open.binding.to_metadata() != open.on_disk)
    }

    /// Close the open folder. Refused with `UnsavedChanges` while dirty; the
    /// caller prompts save-or-discard, the session never does.
    pub fn close(&mut self) -> AppResult<()> {
        self.guard_recording()?;
        self.open_folder()?;
        if self.has_unsaved_changes() {
            return Err(RecorderError::UnsavedChanges);
        }
        self.open = None;
        Ok(())
    }

    /// Close the open folder, discarding any unsaved edits.
    pub fn close_discarding(&mut self) -> AppResult<()> {
        self.guard_recording()?;
        self.open_folder()?;
        self.open = None;
        Ok(())
    }

    /// Start a recording worker for the open folder.
    ///
    /// Saves the metadata and the parameter sidecar first, configures the
    /// frame source with the experiment's camera preset, then hands the
    /// folder to the worker. Until [`Session::finish_recording`] returns, all
    /// mutating session operations fail with `RecordingActive`.
    ///
    /// The returned token is a clone of the worker's cancellation token, for
    /// callers (signal handlers) that need to cancel without holding the
    /// session.
    pub async fn start_recording(
        &mut self,
        mut source: Box<dyn FrameSource>,
        params: AcquisitionParams,
    ) -> AppResult<CancelToken> {
        self.guard_recording()?;
        self.save()?;
        let open = self.open.as_ref().ok_or(RecorderError::NoOpenFolder)?;
        open.folder.save_params(&params)?;

        let preset = open.experiment.camera_settings.clone();
        source.configure(preset.as_deref(), params.fps).await?;

        let token = CancelToken::new();
        let join = tokio::spawn(run_recording(
            source,
            open.folder.clone(),
            params,
            token.clone(),
        ));
        self.recording = Some(RecordingWorker {
            token: token.clone(),
            join,
        });
        Ok(token)
    }

    /// Request cooperative cancellation of the active recording. Returns
    /// immediately; the worker stops at the next frame boundary and keeps
    /// the partial frames. Returns whether a worker was there to signal.
    pub fn stop_recording(&self) -> bool {
        match &self.recording {
            Some(worker) => {
                worker.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Wait for the recording worker and return its report. `None` if no
    /// worker was started. Releases the recording guard.
    pub async fn finish_recording(&mut self) -> AppResult<Option<RunReport>> {
        let Some(worker) = self.recording.take() else {
            return Ok(None);
        };
        let report = worker
            .join
            .await
            .map_err(|e| RecorderError::Acquisition(format!("recording worker panicked: {e}")))??;
        Ok(Some(report))
    }

    /// Re-derive the open folder's display info from disk.
    pub fn current_info(&self) -> AppResult<FolderInfo> {
        let open = self.open_folder()?;
        folder_info(&open.folder, open.binding.layout())
    }

    fn ensure_closed(&mut self) -> AppResult<()> {
        if self.open.is_none() {
            return Ok(());
        }
        if self.has_unsaved_changes() {
            return Err(RecorderError::UnsavedChanges);
        }
        self.open = None;
        Ok(())
    }

    /// Experiment type governing `path`, by longest registry-root prefix.
    /// Unregistered locations fall back to a flat-shape standard type so
    /// stray folders can still be opened.
    fn resolve_experiment(&self, path: &Path) -> ExperimentType {
        self.registry
            .experiments()
            .iter()
            .filter(|exp| path.starts_with(exp.root_under(&self.settings.data_root)))
            .max_by_key(|exp| exp.path.as_os_str().len())
            .cloned()
            .unwrap_or_else(|| ExperimentType {
                name: "Standard".to_string(),
                path: PathBuf::new(),
                metadata_template: None,
                camera_settings: None,
                subdir_shape: crate::layout::SubdirShape::Arenas,
                default_layout: TableLayout::Arenas,
            })
    }

    fn template_variables(&self, experiment: &ExperimentType) -> AppResult<Vec<String>> {
        let Some(name) = &experiment.metadata_template else {
            return Ok(Vec::new());
        };
        match self.templates.load(name) {
            Ok(vars) => Ok(vars),
            Err(RecorderError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

fn folder_info(folder: &ExperimentFolder, layout: TableLayout) -> AppResult<FolderInfo> {
    let state = folder.scan_state()?;
    let params = folder.load_params()?;
    let params_locked = matches!(
        state,
        FolderState::HasRecording | FolderState::HasProcessedOutput
    );
    Ok(FolderInfo {
        path: folder.path().to_path_buf(),
        state,
        layout,
        params,
        params_locked,
    })
}
