//! Local persistence of downloaded images.
//!
//! Failing to save is recoverable: the caller still has the locator, so every
//! problem here ends up as a [`Persisted::Skipped`] warning instead of an error.

use crate::upstream::ImageAsset;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];
pub const DEFAULT_EXTENSION: &str = "png";

/// Outcome of a save attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Persisted {
    Saved(PathBuf),
    Skipped { warning: String },
}

impl Persisted {
    pub fn paths(&self) -> Vec<String> {
        match self {
            Persisted::Saved(path) => vec![path.to_string_lossy().into_owned()],
            Persisted::Skipped { .. } => Vec::new(),
        }
    }

    pub fn warning(&self) -> Option<String> {
        match self {
            Persisted::Saved(_) => None,
            Persisted::Skipped { warning } => Some(warning.clone()),
        }
    }
}

/// Force the name onto an allowed raster extension.
///
/// `out` becomes `out.png`, `out.gif` becomes `out.png`, `out.JPG` is kept.
/// A bare extension such as `.png` is already a complete name.
pub fn normalize_file_name(name: &str) -> String {
    if let Some(bare) = name.strip_prefix('.') {
        if ALLOWED_EXTENSIONS.contains(&bare.to_ascii_lowercase().as_str()) {
            return name.to_string();
        }
    }

    let path = Path::new(name);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) => {
            name.to_string()
        }
        Some(_) => path
            .with_extension(DEFAULT_EXTENSION)
            .to_string_lossy()
            .into_owned(),
        None => format!("{}.{}", name, DEFAULT_EXTENSION),
    }
}

/// Create the folder if needed and check it can take a new file.
pub async fn prepare_save_folder(folder: &Path) -> Result<PathBuf> {
    let path_error = |reason: String| Error::Path {
        path: folder.display().to_string(),
        reason,
    };

    tokio::fs::create_dir_all(folder)
        .await
        .map_err(|e| path_error(format!("cannot create directory: {}", e)))?;

    let metadata = tokio::fs::metadata(folder)
        .await
        .map_err(|e| path_error(format!("cannot inspect directory: {}", e)))?;

    if !metadata.is_dir() {
        return Err(path_error("not a directory".to_string()));
    }
    if metadata.permissions().readonly() {
        return Err(path_error("directory is not writable".to_string()));
    }

    Ok(folder.to_path_buf())
}

/// Write `asset` as `file_name` under `folder`. Never fails the call.
pub async fn save_image(folder: &Path, file_name: &str, asset: &ImageAsset) -> Persisted {
    let folder = match prepare_save_folder(folder).await {
        Ok(folder) => folder,
        Err(e) => {
            warn!("Skipping image save: {}", e);
            return Persisted::Skipped {
                warning: e.to_string(),
            };
        }
    };

    let file_name = normalize_file_name(file_name);
    let target = folder.join(&file_name);

    let requested = Path::new(&file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let matches_content = match requested.as_deref() {
        Some("jpeg") | Some("jpg") => asset.extension == "jpg",
        Some(ext) => ext == asset.extension,
        None => false,
    };
    if !matches_content {
        warn!(
            "Saving {} content under {} as requested",
            asset.extension,
            target.display()
        );
    }

    match tokio::fs::write(&target, &asset.bytes).await {
        Ok(()) => {
            info!("Saved image to {}", target.display());
            Persisted::Saved(target)
        }
        Err(e) => {
            warn!("Failed to write image to {}: {}", target.display(), e);
            Persisted::Skipped {
                warning: format!("Failed to write image to {}: {}", target.display(), e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn png_asset() -> ImageAsset {
        ImageAsset {
            bytes: vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
            extension: "png",
        }
    }

    #[test]
    fn test_normalize_file_name() {
        assert_eq!(normalize_file_name("out"), "out.png");
        assert_eq!(normalize_file_name("out.png"), "out.png");
        assert_eq!(normalize_file_name("out.jpg"), "out.jpg");
        assert_eq!(normalize_file_name("out.JPEG"), "out.JPEG");
        assert_eq!(normalize_file_name("out.gif"), "out.png");
        assert_eq!(normalize_file_name("my.photo"), "my.png");
    }

    #[test]
    fn test_normalize_bare_extension_is_not_doubled() {
        assert_eq!(normalize_file_name(".png"), ".png");
        assert_eq!(normalize_file_name(".JPG"), ".JPG");
        assert_eq!(normalize_file_name(".gif"), ".gif.png");
    }

    #[tokio::test]
    async fn test_save_creates_nested_folder() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("a").join("b");

        let persisted = save_image(&folder, "out", &png_asset()).await;

        let expected = folder.join("out.png");
        assert_eq!(persisted, Persisted::Saved(expected.clone()));
        assert_eq!(std::fs::read(&expected).unwrap(), png_asset().bytes);
        assert!(persisted.warning().is_none());
        assert_eq!(persisted.paths().len(), 1);
    }

    #[tokio::test]
    async fn test_folder_that_is_a_file_is_skipped() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let persisted = save_image(&blocker, "out.png", &png_asset()).await;

        assert!(persisted.paths().is_empty());
        let warning = persisted.warning().unwrap();
        assert!(warning.contains("not-a-dir"), "warning: {}", warning);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_only_folder_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("locked");
        std::fs::create_dir(&folder).unwrap();
        std::fs::set_permissions(&folder, std::fs::Permissions::from_mode(0o555)).unwrap();

        let persisted = save_image(&folder, "out.png", &png_asset()).await;

        std::fs::set_permissions(&folder, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(persisted.paths().is_empty());
        assert!(persisted.warning().unwrap().contains("not writable"));
        assert!(!folder.join("out.png").exists());
    }

    #[tokio::test]
    async fn test_write_failure_inside_usable_folder_is_skipped() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("out.png")).unwrap();

        let persisted = save_image(temp.path(), "out.png", &png_asset()).await;

        assert!(persisted.paths().is_empty());
        let warning = persisted.warning().unwrap();
        assert!(warning.starts_with("Failed to write image to"), "warning: {}", warning);
        assert!(warning.contains("out.png"), "warning: {}", warning);
        assert!(temp.path().join("out.png").is_dir());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let temp = TempDir::new().unwrap();
        let first = png_asset();
        let second = ImageAsset {
            bytes: vec![0x89, 0x50, 0x4E, 0x47, 0xFF],
            extension: "png",
        };

        save_image(temp.path(), "same", &first).await;
        save_image(temp.path(), "same", &second).await;

        assert_eq!(
            std::fs::read(temp.path().join("same.png")).unwrap(),
            second.bytes
        );
    }
}
