use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use capset_common::utils::fsutils;
use color_eyre::eyre::{self, Context};
use image::{codecs::jpeg::JpegEncoder, DynamicImage};

use crate::manifest::{self, Record};

pub const DEFAULT_ROOT: &str = "Dataset";
pub const IMAGES_DIR: &str = "Images";
pub const MANIFEST_FILE: &str = "customDataset.csv";
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Where the images folder and the manifest live
    pub root: PathBuf,
    pub jpeg_quality: u8,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl DatasetConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn jpeg_quality(mut self, jpeg_quality: u8) -> Self {
        self.jpeg_quality = jpeg_quality;
        self
    }
}

/// A folder of captioned images.
///
/// ```text
/// <root>/
///   Images/image1.jpeg
///   Images/image2.jpeg
///   customDataset.csv
/// ```
///
/// Images and manifest rows are only ever added, never changed or removed.
#[derive(Debug)]
pub struct Dataset {
    root: PathBuf,
    images_dir: PathBuf,
    manifest_path: PathBuf,
    jpeg_quality: u8,
    /// `root` as it is written in the manifest
    manifest_root: String,
}

impl Dataset {
    /// Opens the dataset at the configured root, creating whatever is missing of it. An
    /// existing dataset is left as is.
    pub fn open(config: DatasetConfig) -> eyre::Result<Self> {
        let DatasetConfig { root, jpeg_quality } = config;
        eyre::ensure!(
            (1..=100).contains(&jpeg_quality),
            "the jpeg quality must be between 1 and 100, not {jpeg_quality}"
        );

        let manifest_root = manifest_root(&root)?;
        let images_dir = root.join(IMAGES_DIR);
        let manifest_path = root.join(MANIFEST_FILE);

        for dir in [&root, &images_dir] {
            if fsutils::ensure_dir(dir)
                .wrap_err_with(|| format!("failed to create {}", dir.display()))?
            {
                log::info!("Created the folder {}", dir.display());
            } else {
                log::debug!("The folder {} already exists", dir.display());
            }
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&manifest_path)
        {
            Ok(file) => {
                manifest::write_to(BufWriter::new(file), &[]).wrap_err_with(|| {
                    format!("failed to write an empty manifest to {}", manifest_path.display())
                })?;
                log::info!("Created an empty manifest at {}", manifest_path.display());
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                log::debug!("Using the manifest at {}", manifest_path.display());
            }
            Err(e) => {
                return Err(e).wrap_err_with(|| {
                    format!("failed to create the manifest at {}", manifest_path.display())
                })
            }
        }

        Ok(Self {
            root,
            images_dir,
            manifest_path,
            jpeg_quality,
            manifest_root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// All rows of the manifest, in order.
    pub fn records(&self) -> eyre::Result<Vec<Record>> {
        let file = File::open(&self.manifest_path).wrap_err_with(|| {
            format!("failed to open the manifest at {}", self.manifest_path.display())
        })?;
        manifest::read_from(BufReader::new(file)).wrap_err_with(|| {
            format!("failed to read the manifest at {}", self.manifest_path.display())
        })
    }

    /// Saves `image` as the next jpeg in the images folder and appends a row for it, with
    /// `caption`, to the manifest.
    ///
    /// The image is written first, so if the manifest can't be updated there will be an
    /// image without a row.
    pub fn save(&mut self, image: &DynamicImage, caption: &str) -> eyre::Result<Record> {
        eyre::ensure!(!caption.trim().is_empty(), "the caption is empty");

        let name = self.next_image_name()?;
        let path = self.images_dir.join(&name);
        self.write_jpeg(image, &path)
            .wrap_err_with(|| format!("failed to save the image to {}", path.display()))?;
        log::info!("Saved {}", path.display());

        let mut records = self.records()?;
        let record = Record {
            sno: records.len() as u64 + 1,
            image_path: self.manifest_image_path(&name),
            caption: caption.to_string(),
        };
        records.push(record.clone());

        fsutils::replace_file(&self.manifest_path, |file| {
            manifest::write_to(BufWriter::new(file), &records)
        })
        .wrap_err_with(|| {
            format!("failed to update the manifest at {}", self.manifest_path.display())
        })?;
        log::info!("Added row {} to the manifest", record.sno);

        Ok(record)
    }

    /// How the manifest refers to the image called `name`, always with `/` between the
    /// parts. Relative roots give paths relative to the working directory.
    fn manifest_image_path(&self, name: &str) -> String {
        match self.manifest_root.as_str() {
            "" => format!("{IMAGES_DIR}/{name}"),
            "/" => format!("/{IMAGES_DIR}/{name}"),
            root => format!("{root}/{IMAGES_DIR}/{name}"),
        }
    }

    /// `image<N+1>.jpeg` where N is how many files the images folder has. Names taken by
    /// something else, which happens when files have been removed from the folder, are
    /// skipped.
    fn next_image_name(&self) -> eyre::Result<String> {
        let count = fsutils::count_entries(&self.images_dir).wrap_err_with(|| {
            format!("failed to list the images in {}", self.images_dir.display())
        })?;

        let mut next = count + 1;
        loop {
            let name = format!("image{next}.jpeg");
            debug_assert!(fsutils::is_basename(&name));
            if !self.images_dir.join(&name).exists() {
                break Ok(name);
            }
            log::warn!(
                "{name} is taken even though the images folder only has {count} files, \
                 have some been removed?"
            );
            next += 1;
        }
    }

    fn write_jpeg(&self, image: &DynamicImage, path: &Path) -> eyre::Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .wrap_err("failed to create the file")?;
        let mut writer = BufWriter::new(file);

        // jpeg has no alpha, and the encoder wants 8 bit rgb anyway
        let rgb = image.to_rgb8();
        let encoded = JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality)
            .encode_image(&rgb)
            .wrap_err("failed to encode the image");
        if let Err(e) = encoded.and_then(|()| writer.flush().wrap_err("failed to write")) {
            drop(writer);
            if let Err(rm) = fs::remove_file(path) {
                log::warn!("Could not remove the broken image at {}: {rm}", path.display());
            }
            return Err(e);
        }

        Ok(())
    }
}

/// The root as the manifest spells it. The manifest is text, so a root that isn't valid
/// UTF-8 can't be written to it.
fn manifest_root(root: &Path) -> eyre::Result<String> {
    let Some(root) = root.to_str() else {
        eyre::bail!(
            "the dataset folder {} is not valid UTF-8, so it can't be written to the manifest",
            root.display()
        );
    };
    let mut root = if std::path::MAIN_SEPARATOR == '/' {
        root.to_string()
    } else {
        root.replace(std::path::MAIN_SEPARATOR, "/")
    };
    while root.len() > 1 && root.ends_with('/') {
        root.pop();
    }
    Ok(root)
}

#[cfg(test)]
mod test {
    use image::RgbImage;

    use super::*;

    fn open_in(dir: &Path) -> eyre::Result<Dataset> {
        Dataset::open(DatasetConfig::new(dir.join(DEFAULT_ROOT)))
    }

    #[test]
    fn open_creates_the_layout() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let dataset = open_in(dir.path())?;

        assert!(dataset.images_dir().is_dir());
        assert_eq!(
            "sno,image_path,caption\n",
            fs::read_to_string(dataset.manifest_path())?
        );
        assert!(dataset.records()?.is_empty());
        Ok(())
    }

    #[test]
    fn bad_jpeg_quality() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = DatasetConfig::new(dir.path().join(DEFAULT_ROOT)).jpeg_quality(0);
        assert!(Dataset::open(config).is_err());
        assert!(!dir.path().join(DEFAULT_ROOT).exists());
        Ok(())
    }

    #[test]
    fn blank_caption_writes_nothing() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut dataset = open_in(dir.path())?;
        let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));

        assert!(dataset.save(&image, "").is_err());
        assert!(dataset.save(&image, "  \t").is_err());
        assert_eq!(0, fsutils::count_entries(dataset.images_dir())?);
        assert!(dataset.records()?.is_empty());
        Ok(())
    }

    fn manifest_path_with_root(root: &str) -> eyre::Result<String> {
        let root = PathBuf::from(root);
        let dataset = Dataset {
            images_dir: root.join(IMAGES_DIR),
            manifest_path: root.join(MANIFEST_FILE),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            manifest_root: manifest_root(&root)?,
            root,
        };
        Ok(dataset.manifest_image_path("image1.jpeg"))
    }

    #[test]
    fn paths_in_the_manifest() -> eyre::Result<()> {
        assert_eq!(
            "Dataset/Images/image1.jpeg",
            manifest_path_with_root(DEFAULT_ROOT)?
        );
        assert_eq!(
            "Dataset/Images/image1.jpeg",
            manifest_path_with_root("Dataset//")?
        );
        assert_eq!(
            "./data/set/Images/image1.jpeg",
            manifest_path_with_root("./data/set")?
        );
        assert_eq!("Images/image1.jpeg", manifest_path_with_root("")?);
        assert_eq!("/Images/image1.jpeg", manifest_path_with_root("/")?);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn root_must_be_utf8() -> eyre::Result<()> {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let dir = tempfile::tempdir()?;
        let root = dir.path().join(OsStr::from_bytes(b"data\xffset"));
        assert!(Dataset::open(DatasetConfig::new(&root)).is_err());
        assert!(!root.exists());
        Ok(())
    }

    #[test]
    fn skips_names_that_are_taken() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let dataset = open_in(dir.path())?;
        // one file, but it is called image2
        fs::write(dataset.images_dir().join("image2.jpeg"), "")?;

        assert_eq!("image3.jpeg", dataset.next_image_name()?);
        Ok(())
    }
}
