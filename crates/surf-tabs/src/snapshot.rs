//! Snapshot capture for evicted tabs
//!
//! Disabled unless explicitly turned on. When enabled, a bounded PNG of the
//! visible surface and a small JSON sidecar (url, title) are written right
//! before a tab is unloaded, so the UI can show a preview and recover the
//! url instantly while the real view is being recreated.

use chrono::{DateTime, Utc};
use image::imageops::FilterType;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::{Raster, RenderEngine};
use crate::error::TabError;
use crate::tab::Tab;
use crate::Result;

/// Longest edge of a stored snapshot, in pixels.
pub const MAX_SNAPSHOT_EDGE: u32 = 512;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotSidecar {
    pub url: String,
    pub title: String,
    pub captured_at: DateTime<Utc>,
}

pub struct SnapshotManager {
    dir: PathBuf,
    enabled: bool,
}

impl SnapshotManager {
    pub fn new(dir: PathBuf, enabled: bool) -> Self {
        Self { dir, enabled }
    }

    pub fn disabled() -> Self {
        Self::new(PathBuf::new(), false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Capture a preview of a loaded tab. Returns the PNG path, or `None`
    /// when disabled, when the tab has no handle, or on any failure.
    pub fn create_snapshot(&self, tab: &Tab, engine: &dyn RenderEngine) -> Option<PathBuf> {
        if !self.enabled {
            return None;
        }

        match self.capture(tab, engine) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(tab_id = %tab.id, error = %e, "Snapshot capture failed");
                None
            }
        }
    }

    fn capture(&self, tab: &Tab, engine: &dyn RenderEngine) -> Result<Option<PathBuf>> {
        let Some(handle) = tab.handle() else {
            return Ok(None);
        };

        let raster = engine.render_to_raster(handle, MAX_SNAPSHOT_EDGE)?;
        let image = bounded_image(raster)?;

        fs::create_dir_all(&self.dir).map_err(|e| TabError::Snapshot(e.to_string()))?;

        let png_path = self.dir.join(format!("{}.png", artifact_id(&tab.url)));
        image
            .save_with_format(&png_path, image::ImageFormat::Png)
            .map_err(|e| TabError::Snapshot(e.to_string()))?;

        let sidecar = SnapshotSidecar {
            url: tab.url.clone(),
            title: tab.title.clone(),
            captured_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&sidecar)
            .map_err(|e| TabError::Snapshot(e.to_string()))?;
        fs::write(sidecar_path(&png_path), json)
            .map_err(|e| TabError::Snapshot(e.to_string()))?;

        tracing::debug!(tab_id = %tab.id, path = %png_path.display(), "Captured snapshot");
        Ok(Some(png_path))
    }

    /// Use the sidecar of the tab's snapshot as an instant placeholder: the
    /// tab's url is set from it. Returns `false` when no preview is available.
    pub fn restore_snapshot(&self, tab: &mut Tab) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(path) = tab.snapshot_path.as_deref() else {
            return false;
        };

        match read_sidecar(path) {
            Some(sidecar) if !sidecar.url.is_empty() => {
                tab.url = sidecar.url;
                if tab.title.is_empty() {
                    tab.title = sidecar.title;
                }
                true
            }
            _ => false,
        }
    }

    /// Remove both artifacts of a snapshot. Missing files are not an error.
    pub fn delete_snapshot(&self, snapshot_path: &Path) {
        for path in [snapshot_path.to_path_buf(), sidecar_path(snapshot_path)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to delete snapshot");
                }
            }
        }
    }
}

/// Content-derived artifact name: url digest plus capture second.
fn artifact_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let hex: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}_{}", hex, Utc::now().timestamp())
}

fn sidecar_path(snapshot_path: &Path) -> PathBuf {
    snapshot_path.with_extension("json")
}

fn read_sidecar(snapshot_path: &Path) -> Option<SnapshotSidecar> {
    let bytes = fs::read(sidecar_path(snapshot_path)).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Convert a raster to an image whose longest edge is at most
/// [`MAX_SNAPSHOT_EDGE`], preserving aspect ratio.
fn bounded_image(raster: Raster) -> Result<RgbaImage> {
    let Raster {
        width,
        height,
        rgba,
    } = raster;
    if width == 0 || height == 0 {
        return Err(TabError::Snapshot("empty raster".to_string()));
    }

    let image = RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| TabError::Snapshot("raster size mismatch".to_string()))?;

    let longest = width.max(height);
    if longest <= MAX_SNAPSHOT_EDGE {
        return Ok(image);
    }

    let scale = |edge: u32| {
        ((edge as u64 * MAX_SNAPSHOT_EDGE as u64) / longest as u64).max(1) as u32
    };
    Ok(image::imageops::resize(
        &image,
        scale(width),
        scale(height),
        FilterType::Triangle,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedEngine;

    fn loaded_tab(engine: &ScriptedEngine) -> Tab {
        let mut tab = Tab::new("https://example.com/article").unwrap();
        tab.title = "Article".to_string();
        tab.show(engine).unwrap();
        tab
    }

    #[test]
    fn test_disabled_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ScriptedEngine::new();
        let tab = loaded_tab(&engine);

        let snapshots = SnapshotManager::new(dir.path().to_path_buf(), false);
        assert!(snapshots.create_snapshot(&tab, &engine).is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_snapshot_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ScriptedEngine::new();
        engine.set_surface_size(1920, 1080);
        let tab = loaded_tab(&engine);

        let snapshots = SnapshotManager::new(dir.path().join("snapshots"), true);
        let path = snapshots.create_snapshot(&tab, &engine).unwrap();

        let (w, h) = image::image_dimensions(&path).unwrap();
        assert_eq!(w, 512);
        assert_eq!(h, 288);

        let sidecar = read_sidecar(&path).unwrap();
        assert_eq!(sidecar.url, "https://example.com/article");
        assert_eq!(sidecar.title, "Article");
    }

    #[test]
    fn test_restore_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ScriptedEngine::new();
        engine.set_surface_size(300, 200);
        let mut tab = loaded_tab(&engine);

        let snapshots = SnapshotManager::new(dir.path().to_path_buf(), true);
        let path = snapshots.create_snapshot(&tab, &engine).unwrap();
        assert_eq!(image::image_dimensions(&path).unwrap(), (300, 200));

        tab.snapshot_path = Some(path.clone());
        tab.url = "about:blank".to_string();
        assert!(snapshots.restore_snapshot(&mut tab));
        assert_eq!(tab.url, "https://example.com/article");

        snapshots.delete_snapshot(&path);
        assert!(!path.exists());
        assert!(!sidecar_path(&path).exists());
        assert!(!snapshots.restore_snapshot(&mut tab));
    }

    #[test]
    fn test_unloaded_tab_has_no_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ScriptedEngine::new();
        let tab = Tab::new("https://example.com").unwrap();

        let snapshots = SnapshotManager::new(dir.path().to_path_buf(), true);
        assert!(snapshots.create_snapshot(&tab, &engine).is_none());
    }
}
