use crate::config::SourceConfig;
use crate::core::error::{ConfigurationError, DecodeError};
use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One image in a collection. `id` is unique within its collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub path: PathBuf,
}

impl ImageRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: path.to_string_lossy().into_owned(),
            path,
        }
    }

    /// Read and decode the image, guessing the format from its content.
    pub fn decode(&self) -> Result<DynamicImage, DecodeError> {
        ImageReader::open(&self.path)
            .map_err(|e| DecodeError::new(&self.id, e))?
            .with_guessed_format()
            .map_err(|e| DecodeError::new(&self.id, e))?
            .decode()
            .map_err(|e| DecodeError::new(&self.id, e))
    }
}

#[derive(Debug, Clone)]
enum Origin {
    Directory(PathBuf),
    Paths(Vec<PathBuf>),
}

/// A collection of images. Enumeration is lazy and can be restarted.
#[derive(Debug, Clone)]
pub struct ImageSource {
    origin: Origin,
    recursive: bool,
    extensions: HashSet<String>,
    max_images: Option<usize>,
}

impl ImageSource {
    /// Open a directory as a collection.
    pub fn open(dir: &Path, config: &SourceConfig) -> Result<Self, ConfigurationError> {
        if !dir.is_dir() {
            return Err(ConfigurationError::MissingCollection {
                path: dir.to_path_buf(),
            });
        }

        Ok(Self {
            origin: Origin::Directory(dir.to_path_buf()),
            recursive: config.recursive,
            extensions: config
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            max_images: config.max_images,
        })
    }

    /// A collection made of exactly these files, in this order.
    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            origin: Origin::Paths(paths),
            recursive: false,
            extensions: HashSet::new(),
            max_images: None,
        }
    }

    pub fn root(&self) -> Option<&Path> {
        match &self.origin {
            Origin::Directory(root) => Some(root),
            Origin::Paths(_) => None,
        }
    }

    /// Image records in file-name order.
    pub fn records(&self) -> Box<dyn Iterator<Item = ImageRecord> + '_> {
        let limit = self.max_images.unwrap_or(usize::MAX);
        match &self.origin {
            Origin::Paths(paths) => Box::new(paths.iter().cloned().map(ImageRecord::new)),
            Origin::Directory(root) => {
                let max_depth = if self.recursive { usize::MAX } else { 1 };
                let walker = WalkDir::new(root)
                    .min_depth(1)
                    .max_depth(max_depth)
                    .follow_links(false)
                    .sort_by_file_name();

                Box::new(
                    walker
                        .into_iter()
                        .filter_map(|entry| match entry {
                            Ok(entry) => Some(entry),
                            Err(e) => {
                                log::warn!("Skipping unreadable entry in {}: {}", root.display(), e);
                                None
                            }
                        })
                        .filter(|entry| entry.file_type().is_file())
                        .filter(|entry| self.is_image(entry.path()))
                        .map(|entry| ImageRecord::new(entry.into_path()))
                        .take(limit),
                )
            }
        }
    }

    /// Decoded images, one result per record. A failure covers only its own record.
    pub fn images(
        &self,
    ) -> impl Iterator<Item = Result<(ImageRecord, DynamicImage), DecodeError>> + '_ {
        self.records().map(|record| {
            let image = record.decode()?;
            Ok((record, image))
        })
    }

    fn is_image(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }
}
