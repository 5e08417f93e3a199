//! Directory-backed instance workspace.

use crate::instance::ports::{
    ENV_FILE_NAME, InstanceWorkspace, WorkspaceArtifact, WorkspaceError, WorkspaceResult,
};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use std::io::ErrorKind;
use tracing::debug;

/// Marker that every removable instance folder name contains.
const INSTANCE_FOLDER_MARKER: &str = "instance";

/// Workspace that manages instance folders below a root directory.
///
/// All access goes through a capability handle on the root, so paths that
/// escape it are rejected instead of followed.
#[derive(Debug, Clone)]
pub struct DirectoryWorkspace {
    root: Utf8PathBuf,
}

impl DirectoryWorkspace {
    /// Creates a workspace rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the workspace root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn open_root(&self) -> WorkspaceResult<Dir> {
        Dir::create_ambient_dir_all(&self.root, ambient_authority())
            .map_err(|err| WorkspaceError::io(&self.root, err))?;
        Dir::open_ambient_dir(&self.root, ambient_authority())
            .map_err(|err| WorkspaceError::io(&self.root, err))
    }

    fn open_instance_dir(&self, folder: &Utf8Path) -> WorkspaceResult<Dir> {
        let relative = self.relative(folder)?;
        self.open_root()?
            .open_dir(relative)
            .map_err(|err| WorkspaceError::io(folder, err))
    }

    fn relative<'a>(&self, folder: &'a Utf8Path) -> WorkspaceResult<&'a Utf8Path> {
        let outside = || WorkspaceError::OutsideRoot {
            path: folder.to_owned(),
            root: self.root.clone(),
        };
        let relative = folder.strip_prefix(&self.root).map_err(|_| outside())?;
        let is_contained = relative.components().next().is_some()
            && relative
                .components()
                .all(|component| matches!(component, Utf8Component::Normal(_)));
        if is_contained {
            Ok(relative)
        } else {
            Err(outside())
        }
    }
}

impl InstanceWorkspace for DirectoryWorkspace {
    fn create_instance_dir(&self, folder: &Utf8Path) -> WorkspaceResult<()> {
        let relative = self.relative(folder)?;
        let root = self.open_root()?;

        if let Some(parent) = relative.parent().filter(|parent| !parent.as_str().is_empty()) {
            root.create_dir_all(parent)
                .map_err(|err| WorkspaceError::io(folder, err))?;
        }
        root.create_dir(relative).map_err(|err| {
            if err.kind() == ErrorKind::AlreadyExists {
                WorkspaceError::AlreadyExists(folder.to_owned())
            } else {
                WorkspaceError::io(folder, err)
            }
        })?;

        debug!(path = %folder, "created instance folder");
        Ok(())
    }

    fn write_artifacts(
        &self,
        folder: &Utf8Path,
        artifacts: &[WorkspaceArtifact],
    ) -> WorkspaceResult<()> {
        let instance_dir = self.open_instance_dir(folder)?;

        for artifact in artifacts {
            instance_dir
                .write(artifact.file_name, artifact.contents.as_bytes())
                .map_err(|err| WorkspaceError::io(folder.join(artifact.file_name), err))?;
            debug!(path = %folder.join(artifact.file_name), "wrote instance artifact");
        }
        Ok(())
    }

    fn copy_template(&self, template: &Utf8Path, folder: &Utf8Path) -> WorkspaceResult<()> {
        let source = Dir::open_ambient_dir(template, ambient_authority())
            .map_err(|err| WorkspaceError::io(template, err))?;
        let destination = self.open_instance_dir(folder)?;
        copy_tree(&source, &destination, template, Some(ENV_FILE_NAME))?;
        debug!(template = %template, path = %folder, "copied stack template");
        Ok(())
    }

    fn read_file(&self, folder: &Utf8Path, file_name: &str) -> WorkspaceResult<Option<String>> {
        match self.open_instance_dir(folder)?.read_to_string(file_name) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(WorkspaceError::io(folder.join(file_name), err)),
        }
    }

    fn remove_instance_dir(&self, folder: &Utf8Path) -> WorkspaceResult<()> {
        let relative = self.relative(folder)?;
        let is_instance_folder = relative
            .file_name()
            .is_some_and(|name| name.contains(INSTANCE_FOLDER_MARKER));
        if !is_instance_folder {
            return Err(WorkspaceError::NotAnInstanceFolder(folder.to_owned()));
        }

        match self.open_root()?.remove_dir_all(relative) {
            Ok(()) => {
                debug!(path = %folder, "removed instance folder");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %folder, "instance folder already absent");
                Ok(())
            }
            Err(err) => Err(WorkspaceError::io(folder, err)),
        }
    }

    fn exists(&self, folder: &Utf8Path) -> bool {
        let Ok(relative) = self.relative(folder) else {
            return false;
        };
        Dir::open_ambient_dir(&self.root, ambient_authority())
            .is_ok_and(|root| root.exists(relative))
    }
}

/// Copies every entry of `source` into `destination`, descending into
/// subdirectories. `location` names `source` in errors.
fn copy_tree(
    source: &Dir,
    destination: &Dir,
    location: &Utf8Path,
    skip: Option<&str>,
) -> WorkspaceResult<()> {
    let entries = source
        .entries()
        .map_err(|err| WorkspaceError::io(location, err))?;
    for item in entries {
        let entry = item.map_err(|err| WorkspaceError::io(location, err))?;
        let name = entry
            .file_name()
            .map_err(|err| WorkspaceError::io(location, err))?;
        if skip == Some(name.as_str()) {
            continue;
        }
        let path = location.join(&name);
        let file_type = entry
            .file_type()
            .map_err(|err| WorkspaceError::io(&path, err))?;

        if file_type.is_dir() {
            destination
                .create_dir_all(&name)
                .map_err(|err| WorkspaceError::io(&path, err))?;
            let nested_source = source
                .open_dir(&name)
                .map_err(|err| WorkspaceError::io(&path, err))?;
            let nested_destination = destination
                .open_dir(&name)
                .map_err(|err| WorkspaceError::io(&path, err))?;
            copy_tree(&nested_source, &nested_destination, &path, None)?;
        } else {
            source
                .copy(&name, destination, &name)
                .map_err(|err| WorkspaceError::io(&path, err))?;
        }
    }
    Ok(())
}
