//! In-memory instance workspace.

use crate::instance::ports::{
    ENV_FILE_NAME, InstanceWorkspace, WorkspaceArtifact, WorkspaceError, WorkspaceResult,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

type FolderContents = BTreeMap<String, String>;

/// In-memory workspace mirroring the checks of the directory workspace.
#[derive(Debug, Clone)]
pub struct InMemoryWorkspace {
    root: Utf8PathBuf,
    state: Arc<RwLock<InMemoryWorkspaceState>>,
}

#[derive(Debug, Default)]
struct InMemoryWorkspaceState {
    folders: BTreeMap<Utf8PathBuf, FolderContents>,
    templates: BTreeMap<Utf8PathBuf, FolderContents>,
    fail_next_write: bool,
    fail_next_remove: bool,
}

fn lock_error(path: &Utf8Path, err: impl std::fmt::Display) -> WorkspaceError {
    WorkspaceError::io(path, std::io::Error::other(err.to_string()))
}

impl InMemoryWorkspace {
    /// Creates an empty workspace rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            state: Arc::new(RwLock::new(InMemoryWorkspaceState::default())),
        }
    }

    /// Returns the files written into `folder`, if it exists.
    #[must_use]
    pub fn files(&self, folder: &Utf8Path) -> Option<FolderContents> {
        self.state
            .read()
            .ok()
            .and_then(|state| state.folders.get(folder).cloned())
    }

    /// Returns every existing folder.
    #[must_use]
    pub fn folders(&self) -> Vec<Utf8PathBuf> {
        self.state
            .read()
            .map(|state| state.folders.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Creates `folder` directly, as if a user had made it by hand.
    ///
    /// # Errors
    ///
    /// Returns workspace errors when lock acquisition fails.
    pub fn seed_folder(&self, folder: &Utf8Path) -> WorkspaceResult<()> {
        let mut state = self.state.write().map_err(|err| lock_error(folder, err))?;
        state.folders.entry(folder.to_owned()).or_default();
        Ok(())
    }

    /// Registers a stack template at `template` holding `files`, keyed by
    /// their path relative to the template.
    ///
    /// # Errors
    ///
    /// Returns workspace errors when lock acquisition fails.
    pub fn seed_template<I, K, V>(&self, template: &Utf8Path, files: I) -> WorkspaceResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut state = self
            .state
            .write()
            .map_err(|err| lock_error(template, err))?;
        state.templates.insert(
            template.to_owned(),
            files
                .into_iter()
                .map(|(name, contents)| (name.into(), contents.into()))
                .collect(),
        );
        Ok(())
    }

    /// Makes the next [`InstanceWorkspace::write_artifacts`] fail.
    ///
    /// # Errors
    ///
    /// Returns workspace errors when lock acquisition fails.
    pub fn fail_next_write(&self) -> WorkspaceResult<()> {
        let mut state = self.state.write().map_err(|err| lock_error(&self.root, err))?;
        state.fail_next_write = true;
        Ok(())
    }

    /// Makes the next [`InstanceWorkspace::remove_instance_dir`] fail.
    ///
    /// # Errors
    ///
    /// Returns workspace errors when lock acquisition fails.
    pub fn fail_next_remove(&self) -> WorkspaceResult<()> {
        let mut state = self.state.write().map_err(|err| lock_error(&self.root, err))?;
        state.fail_next_remove = true;
        Ok(())
    }

    fn check_inside(&self, folder: &Utf8Path) -> WorkspaceResult<()> {
        match folder.strip_prefix(&self.root) {
            Ok(relative) if !relative.as_str().is_empty() => Ok(()),
            _ => Err(WorkspaceError::OutsideRoot {
                path: folder.to_owned(),
                root: self.root.clone(),
            }),
        }
    }
}

impl InstanceWorkspace for InMemoryWorkspace {
    fn create_instance_dir(&self, folder: &Utf8Path) -> WorkspaceResult<()> {
        self.check_inside(folder)?;
        let mut state = self.state.write().map_err(|err| lock_error(folder, err))?;
        if state.folders.contains_key(folder) {
            return Err(WorkspaceError::AlreadyExists(folder.to_owned()));
        }
        state.folders.insert(folder.to_owned(), FolderContents::new());
        Ok(())
    }

    fn write_artifacts(
        &self,
        folder: &Utf8Path,
        artifacts: &[WorkspaceArtifact],
    ) -> WorkspaceResult<()> {
        self.check_inside(folder)?;
        let mut state = self.state.write().map_err(|err| lock_error(folder, err))?;
        if state.fail_next_write {
            state.fail_next_write = false;
            return Err(WorkspaceError::io(
                folder,
                std::io::Error::other("injected write failure"),
            ));
        }

        let contents = state.folders.get_mut(folder).ok_or_else(|| {
            WorkspaceError::io(folder, std::io::Error::from(std::io::ErrorKind::NotFound))
        })?;
        for artifact in artifacts {
            contents.insert(artifact.file_name.to_owned(), artifact.contents.clone());
        }
        Ok(())
    }

    fn copy_template(&self, template: &Utf8Path, folder: &Utf8Path) -> WorkspaceResult<()> {
        self.check_inside(folder)?;
        let mut state = self.state.write().map_err(|err| lock_error(folder, err))?;
        let files = state.templates.get(template).cloned().ok_or_else(|| {
            WorkspaceError::io(template, std::io::Error::from(std::io::ErrorKind::NotFound))
        })?;
        let contents = state.folders.get_mut(folder).ok_or_else(|| {
            WorkspaceError::io(folder, std::io::Error::from(std::io::ErrorKind::NotFound))
        })?;
        contents.extend(files.into_iter().filter(|(name, _)| name != ENV_FILE_NAME));
        Ok(())
    }

    fn read_file(&self, folder: &Utf8Path, file_name: &str) -> WorkspaceResult<Option<String>> {
        self.check_inside(folder)?;
        let state = self.state.read().map_err(|err| lock_error(folder, err))?;
        Ok(state
            .folders
            .get(folder)
            .and_then(|contents| contents.get(file_name))
            .cloned())
    }

    fn remove_instance_dir(&self, folder: &Utf8Path) -> WorkspaceResult<()> {
        self.check_inside(folder)?;
        if !folder
            .file_name()
            .is_some_and(|name| name.contains("instance"))
        {
            return Err(WorkspaceError::NotAnInstanceFolder(folder.to_owned()));
        }

        let mut state = self.state.write().map_err(|err| lock_error(folder, err))?;
        if state.fail_next_remove {
            state.fail_next_remove = false;
            return Err(WorkspaceError::io(
                folder,
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ));
        }
        state.folders.remove(folder);
        Ok(())
    }

    fn exists(&self, folder: &Utf8Path) -> bool {
        self.state
            .read()
            .is_ok_and(|state| state.folders.contains_key(folder))
    }
}
