use std::path::{Component, Path, PathBuf};

use crate::error::AcquireError;

/// Stored-file textures referenced by name from `@texture <n> file <name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureLibrary {
    root: PathBuf,
}

impl TextureLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a library name to an existing file below the root.
    ///
    /// Names must be relative and may not climb out of the root.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, AcquireError> {
        let relative = Path::new(name);
        let plain = !name.trim().is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !plain {
            return Err(AcquireError::NotFound(format!(
                "'{name}' is not a valid texture name"
            )));
        }

        let path = self.root.join(relative);
        if path.is_file() {
            Ok(path)
        } else {
            Err(AcquireError::NotFound(format!(
                "texture '{name}' not found in {}",
                self.root.display()
            )))
        }
    }
}

/// Files decoded as video rather than still images.
pub fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gif"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_files_inside_the_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("wood")).unwrap();
        std::fs::write(dir.path().join("wood/oak.png"), b"png").unwrap();
        let library = TextureLibrary::new(dir.path());
        assert_eq!(
            library.resolve("wood/oak.png").unwrap(),
            dir.path().join("wood/oak.png")
        );
        assert!(matches!(
            library.resolve("wood/pine.png"),
            Err(AcquireError::NotFound(_))
        ));
    }

    #[test]
    fn rejects_names_that_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let library = TextureLibrary::new(dir.path().join("lib"));
        for name in ["../secret.png", "/etc/passwd", "", "a/../../b.png", "./x.png"] {
            assert!(library.resolve(name).is_err(), "{name}");
        }
    }

    #[test]
    fn gif_files_are_videos() {
        assert!(is_video(Path::new("clip.GIF")));
        assert!(!is_video(Path::new("still.png")));
    }
}
