use anyhow::{anyhow, bail, ensure, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Image extensions picked up by [`ImageFolder::scan`] (case-insensitive).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp", "tiff", "tif"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map_or(false, |name| name.starts_with('.'))
}

/// Direct children of `dir`, sorted by name, hidden entries skipped.
fn children(dir: &Path) -> impl Iterator<Item = Result<DirEntry>> + '_ {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry))
        .map(move |entry| {
            entry.with_context(|| format!("Failed to read directory entry in {}", dir.display()))
        })
}

/// Maps a category key (the name of an image's parent directory) to its
/// integer label.
///
/// # Example
/// ```ignore
/// let categories = CategoryMap::from_names(["n01440764", "n01443537"]);
/// assert_eq!(categories.label_for(Path::new("train/n01443537/x.JPEG"))?, 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CategoryMap {
    labels: HashMap<String, usize>,
}

impl CategoryMap {
    pub fn new(labels: HashMap<String, usize>) -> Self {
        Self { labels }
    }

    /// Assigns labels `0..n` to the names in sorted order.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        let labels = names
            .into_iter()
            .enumerate()
            .map(|(label, name)| (name, label))
            .collect();
        Self { labels }
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    /// Label of the category `path` lives in, keyed by its parent directory name.
    pub fn label_for(&self, path: &Path) -> Result<usize> {
        let key = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("No category directory in path: {}", path.display()))?;
        self.get(key)
            .ok_or_else(|| anyhow!("Unknown category '{}' for {}", key, path.display()))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Category names ordered by label.
    pub fn names(&self) -> Vec<&str> {
        let mut pairs: Vec<_> = self.labels.iter().collect();
        pairs.sort_by_key(|(_, &label)| label);
        pairs.into_iter().map(|(name, _)| name.as_str()).collect()
    }
}

/// Ordered image file list plus the category map for a
/// `root/<category>/<image>` directory tree.
///
/// Categories are the sorted names of the direct subdirectories of `root`;
/// files within a category are sorted by name, so the listing order is
/// stable across runs. Hidden directories and files are skipped.
///
/// # Example
/// ```ignore
/// let folder = ImageFolder::scan("./imagenet/val")?;
/// println!("{} images in {} classes", folder.len(), folder.categories().len());
/// ```
#[derive(Debug, Clone)]
pub struct ImageFolder {
    files: Vec<PathBuf>,
    categories: CategoryMap,
}

impl ImageFolder {
    pub fn from_parts(files: Vec<PathBuf>, categories: CategoryMap) -> Self {
        Self { files, categories }
    }

    pub fn scan(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let metadata = fs::metadata(root)
            .with_context(|| format!("Failed to access directory: {}", root.display()))?;
        if !metadata.is_dir() {
            bail!("Path is not a directory: {}", root.display());
        }

        let mut class_dirs = Vec::new();
        for entry in children(root) {
            let entry = entry?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry
                .file_name()
                .to_str()
                .ok_or_else(|| anyhow!("Invalid class directory name: {}", entry.path().display()))?
                .to_string();
            class_dirs.push((name, entry.into_path()));
        }
        ensure!(
            !class_dirs.is_empty(),
            "No class directories in {}. Expected layout: root/class/image.jpg",
            root.display()
        );

        let categories = CategoryMap::from_names(class_dirs.iter().map(|(name, _)| name.clone()));

        let mut files = Vec::new();
        for (_, dir) in &class_dirs {
            for entry in children(dir) {
                let entry = entry?;
                if entry.file_type().is_file() && is_image(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        }
        ensure!(!files.is_empty(), "No images found in {}", root.display());

        tracing::debug!(
            root = %root.display(),
            images = files.len(),
            classes = categories.len(),
            "scanned image folder"
        );
        Ok(Self { files, categories })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn categories(&self) -> &CategoryMap {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn into_parts(self) -> (Vec<PathBuf>, CategoryMap) {
        (self.files, self.categories)
    }
}
