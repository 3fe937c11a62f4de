// SPDX-License-Identifier: MPL-2.0

//! Named storage of calibration artifacts and images.

use crate::calibration::CalibrationArtifact;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::interop::{frame_from_image, ToImage};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub trait ExperimentRepository {
    fn exists(&self, name: &str) -> Result<bool>;
    /// Persist a new artifact. Never overwrites: delete first to replace one.
    fn save(&mut self, artifact: &CalibrationArtifact) -> Result<()>;
    fn load(&self, name: &str) -> Result<CalibrationArtifact>;
    fn delete(&mut self, name: &str) -> Result<()>;
    /// Names of all the stored artifacts, sorted.
    fn list(&self) -> Result<Vec<String>>;
    /// Store an image, replacing any previous image of that name.
    fn save_image(&mut self, name: &str, image: &Frame) -> Result<()>;
    fn load_image(&self, name: &str) -> Result<Frame>;
}

/// Names are used as file names: non-empty, no path separator, no leading dot.
pub fn check_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains(|c: char| c == '/' || c == '\\' || c == '\0');
    if invalid {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

// File repository -------------------------------------------------------------
// -----------------------------------------------------------------------------

/// Repository in a directory:
/// `calibrations/<name>.json` for artifacts and `images/<name>.png`
/// (16 bits per channel) for images.
#[derive(Debug, Clone)]
pub struct FileRepository {
    root: PathBuf,
}

impl FileRepository {
    /// Open the repository at `root`, creating its directories if needed.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let repo = Self {
            root: root.as_ref().to_path_buf(),
        };
        fs::create_dir_all(repo.calibrations_dir())?;
        fs::create_dir_all(repo.images_dir())?;
        Ok(repo)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn calibrations_dir(&self) -> PathBuf {
        self.root.join("calibrations")
    }

    fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    fn artifact_path(&self, name: &str) -> Result<PathBuf> {
        check_name(name)?;
        Ok(self.calibrations_dir().join(format!("{}.json", name)))
    }

    fn image_path(&self, name: &str) -> Result<PathBuf> {
        check_name(name)?;
        Ok(self.images_dir().join(format!("{}.png", name)))
    }
}

impl ExperimentRepository for FileRepository {
    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.artifact_path(name)?.is_file())
    }

    fn save(&mut self, artifact: &CalibrationArtifact) -> Result<()> {
        let path = self.artifact_path(artifact.name())?;
        if path.exists() {
            return Err(Error::DuplicateCalibrationName(artifact.name().to_string()));
        }
        // Write aside then rename, readers never see a partial artifact.
        let tmp = self.calibrations_dir().join(format!(".{}.json.tmp", artifact.name()));
        let written = write_json(&tmp, artifact).and_then(|()| Ok(fs::rename(&tmp, &path)?));
        if written.is_err() && tmp.exists() {
            if let Err(err) = fs::remove_file(&tmp) {
                log::warn!("Could not remove {}: {}", tmp.display(), err);
            }
        }
        written
    }

    fn load(&self, name: &str) -> Result<CalibrationArtifact> {
        let path = self.artifact_path(name)?;
        if !path.is_file() {
            return Err(Error::NotFound(name.to_string()));
        }
        let reader = BufReader::new(File::open(&path)?);
        let artifact: CalibrationArtifact = serde_json::from_reader(reader)?;
        artifact.check_version()?;
        Ok(artifact)
    }

    fn delete(&mut self, name: &str) -> Result<()> {
        let path = self.artifact_path(name)?;
        if !path.is_file() {
            return Err(Error::NotFound(name.to_string()));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.calibrations_dir())? {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if check_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn save_image(&mut self, name: &str, image: &Frame) -> Result<()> {
        let path = self.image_path(name)?;
        image.to_image().save(&path)?;
        log::debug!("Saved image {}", path.display());
        Ok(())
    }

    fn load_image(&self, name: &str) -> Result<Frame> {
        let path = self.image_path(name)?;
        if !path.is_file() {
            return Err(Error::NotFound(name.to_string()));
        }
        Ok(frame_from_image(image::open(path)?))
    }
}

fn write_json(path: &Path, artifact: &CalibrationArtifact) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, artifact)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

// In-memory repository --------------------------------------------------------
// -----------------------------------------------------------------------------

/// Repository kept in memory, for tests and one-shot pipelines.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    artifacts: BTreeMap<String, CalibrationArtifact>,
    images: BTreeMap<String, Frame>,
}

impl ExperimentRepository for MemoryRepository {
    fn exists(&self, name: &str) -> Result<bool> {
        check_name(name)?;
        Ok(self.artifacts.contains_key(name))
    }

    fn save(&mut self, artifact: &CalibrationArtifact) -> Result<()> {
        if self.exists(artifact.name())? {
            return Err(Error::DuplicateCalibrationName(artifact.name().to_string()));
        }
        self.artifacts
            .insert(artifact.name().to_string(), artifact.clone());
        Ok(())
    }

    fn load(&self, name: &str) -> Result<CalibrationArtifact> {
        check_name(name)?;
        self.artifacts
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    fn delete(&mut self, name: &str) -> Result<()> {
        check_name(name)?;
        self.artifacts
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.artifacts.keys().cloned().collect())
    }

    fn save_image(&mut self, name: &str, image: &Frame) -> Result<()> {
        check_name(name)?;
        self.images.insert(name.to_string(), image.clone());
        Ok(())
    }

    fn load_image(&self, name: &str) -> Result<Frame> {
        check_name(name)?;
        self.images
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }
}
