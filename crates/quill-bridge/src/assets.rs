//! Staging of the static files a surface loads before it can start.

use crate::error::{BridgeError, Result};
use quill_config::ResourceConfig;
use std::fs;
use std::path::{Path, PathBuf};

/// What to stage and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingPlan {
    /// Directory holding the root files.
    pub root_dir: PathBuf,
    /// Directory the surface loads from.
    pub staging_dir: PathBuf,
    /// Root file the surface navigates to.
    pub base_document: String,
    /// Files the engine cannot run without, relative to `root_dir`.
    pub root_files: Vec<String>,
    /// Optional host-supplied files. Relative paths resolve against `root_dir`.
    pub user_files: Vec<PathBuf>,
}

impl StagingPlan {
    pub fn from_config(resources: &ResourceConfig) -> Self {
        Self {
            root_dir: resources.root_dir.clone(),
            staging_dir: resources.staging_dir.clone(),
            base_document: resources.base_document.clone(),
            root_files: resources.root_files.clone(),
            user_files: resources
                .user_script
                .iter()
                .chain(resources.user_css.iter())
                .cloned()
                .collect(),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_dir.join(path)
        }
    }
}

/// Where the staged files ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAssets {
    /// URL of the base document.
    pub base_url: String,
    pub directory: PathBuf,
}

/// Puts a surface's files somewhere the engine can load them from.
pub trait AssetStager {
    /// Errors here are fatal to the surface.
    fn stage(&mut self, plan: &StagingPlan) -> Result<StagedAssets>;
}

/// Copies files into a local directory and serves them as `file://` URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryStager;

impl DirectoryStager {
    pub fn new() -> Self {
        Self
    }
}

impl AssetStager for DirectoryStager {
    fn stage(&mut self, plan: &StagingPlan) -> Result<StagedAssets> {
        if !plan.root_files.contains(&plan.base_document) {
            return Err(BridgeError::AssetStaging(format!(
                "base document {} is not among the root files",
                plan.base_document
            )));
        }

        fs::create_dir_all(&plan.staging_dir).map_err(|e| {
            BridgeError::AssetStaging(format!(
                "cannot create {}: {}",
                plan.staging_dir.display(),
                e
            ))
        })?;

        for name in &plan.root_files {
            let from = plan.root_dir.join(name);
            let to = plan.staging_dir.join(name);
            fs::copy(&from, &to).map_err(|e| {
                BridgeError::AssetStaging(format!("cannot stage {}: {}", from.display(), e))
            })?;
            tracing::debug!(file = %name, "staged root asset");
        }

        for path in &plan.user_files {
            let from = plan.resolve(path);
            let Some(name) = from.file_name() else {
                tracing::warn!(path = %from.display(), "user asset has no file name, skipping");
                continue;
            };
            if let Err(e) = fs::copy(&from, plan.staging_dir.join(name)) {
                tracing::warn!(path = %from.display(), error = %e, "skipping user asset");
            }
        }

        let directory = fs::canonicalize(&plan.staging_dir)?;
        let base_url = file_url(&directory.join(&plan.base_document));
        tracing::info!(%base_url, "assets staged");
        Ok(StagedAssets {
            base_url,
            directory,
        })
    }
}

fn file_url(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    if text.starts_with('/') {
        format!("file://{}", text)
    } else {
        format!("file:///{}", text)
    }
}
