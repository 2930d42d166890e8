//! AS-02 bundle directory layout and filepath derivation.
//!
//! ```text
//! <bundle>/
//!   manifest.xml
//!   shim.xml
//!   <bundle>.mxf                 (primary version)
//!   media/<version>_v<N>.mxf     (picture essence components)
//!   media/<version>_a<N>.mxf     (sound essence components)
//! ```

use crate::error::{As02Error, Result};
use crate::manifest::{Manifest, MicContext, MicScope, MicType};
use crate::shim::{register_shim, Shim, SHIM_FILE_NAME};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

const MANIFEST_FILE_NAME: &str = "manifest.xml";
const MEDIA_SUBDIR_NAME: &str = "media";

const MAX_PATH_SIZE: usize = 10 * 1024 * 1024;

// characters escaped in relative URI path segments
const URI_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'#')
    .add(b'?')
    .add(b'%')
    .add(b'[')
    .add(b']')
    .add(b'\\');

/// An AS-02 bundle directory with its manifest and shim.
pub struct As02Bundle {
    root_filepath: PathBuf,
    bundle_name: String,
    pub manifest: Manifest,
    pub shim: Shim,
}

impl As02Bundle {
    /// Open a bundle directory, optionally creating it.
    ///
    /// A relative `root_directory` is resolved against the current working
    /// directory. Directory creation is idempotent: an existing directory is
    /// fine, an existing non-directory is fatal.
    pub fn open_new(root_directory: impl AsRef<Path>, create_directory: bool) -> Result<Self> {
        let root_directory = root_directory.as_ref();
        let root_filepath = if root_directory.is_absolute() {
            root_directory.to_path_buf()
        } else {
            std::env::current_dir()?.join(root_directory)
        };
        if root_filepath.as_os_str().len() > MAX_PATH_SIZE {
            return Err(As02Error::FormatLimit(format!(
                "Bundle path exceeds the maximum size of {} bytes",
                MAX_PATH_SIZE
            )));
        }

        if create_directory {
            ensure_directory(&root_filepath)?;
        } else if !root_filepath.is_dir() {
            return Err(As02Error::InvalidArgument(format!(
                "Bundle root directory '{}' does not exist",
                root_filepath.display()
            )));
        }
        ensure_directory(&root_filepath.join(MEDIA_SUBDIR_NAME))?;

        let bundle_name = root_filepath
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.to_string())
            .ok_or_else(|| As02Error::InvalidArgument("Empty bundle name".to_string()))?;

        let manifest = Manifest::new(&bundle_name);

        Ok(As02Bundle {
            root_filepath,
            bundle_name,
            manifest,
            shim: Shim::default(),
        })
    }

    /// The absolute bundle root.
    pub fn root(&self) -> &Path {
        &self.root_filepath
    }

    /// The bundle name, taken from the root directory name.
    pub fn bundle_name(&self) -> &str {
        &self.bundle_name
    }

    /// Filepath and relative URI of the primary version file, which carries
    /// the bundle's name.
    pub fn primary_version_filepath(&self) -> (PathBuf, String) {
        let filename = format!("{}.mxf", self.bundle_name);
        let rel_uri = encode_segment(&filename);
        (self.root_filepath.join(filename), rel_uri)
    }

    /// Filepath and relative URI of an additional version file.
    pub fn version_filepath(&self, name: &str) -> (PathBuf, String) {
        let filename = format!("{}.mxf", name);
        let rel_uri = encode_segment(&filename);
        (self.root_filepath.join(filename), rel_uri)
    }

    /// Filepath and relative URI of an essence component file.
    ///
    /// Component names derive from the version name with `_v<n-1>` /
    /// `_a<n-1>` suffixes for 1-based track numbers.
    pub fn essence_component_filepath(
        &self,
        version_filename: &str,
        is_video: bool,
        track_number: u32,
    ) -> Result<(PathBuf, String)> {
        if track_number == 0 {
            return Err(As02Error::InvalidArgument(
                "Essence component track numbers are 1-based".to_string(),
            ));
        }

        let version_name = version_filename
            .strip_suffix(".mxf")
            .unwrap_or(version_filename);
        let filename = format!(
            "{}_{}{}.mxf",
            version_name,
            if is_video { "v" } else { "a" },
            track_number - 1
        );

        let rel_uri = format!("{}/{}", MEDIA_SUBDIR_NAME, encode_segment(&filename));
        let filepath = self.root_filepath.join(MEDIA_SUBDIR_NAME).join(filename);
        Ok((filepath, rel_uri))
    }

    /// Resolve a registered relative URI back to an absolute filepath.
    pub fn complete_filepath(&self, relative_uri: &str) -> PathBuf {
        let decoded: String = percent_encoding::percent_decode_str(relative_uri)
            .decode_utf8_lossy()
            .into_owned();
        self.root_filepath.join(decoded)
    }

    /// Write the shim and the manifest, computing entire-file integrity
    /// checks on the way.
    pub fn finalize(&mut self) -> Result<()> {
        self.shim.write(fs::File::create(
            self.root_filepath.join(SHIM_FILE_NAME),
        )?)?;
        let shim_index = register_shim(&mut self.manifest);
        let shim_size = fs::metadata(self.root_filepath.join(SHIM_FILE_NAME))?.len();
        self.manifest.file_mut(shim_index).size = shim_size;

        // fill in sizes and entire-file digests
        for index in 0..self.manifest.files().len() {
            let (relative_uri, mic_type, mic_scope, has_mic) = {
                let file = self.manifest.file(index);
                (
                    file.relative_uri.clone(),
                    file.mic_type,
                    file.mic_scope,
                    file.mic.is_some(),
                )
            };
            let filepath = self.complete_filepath(&relative_uri);
            match fs::metadata(&filepath) {
                Ok(metadata) => self.manifest.file_mut(index).size = metadata.len(),
                Err(_) if relative_uri != MANIFEST_FILE_NAME => {
                    log::warn!(
                        "Registered bundle file '{}' does not exist on disk",
                        relative_uri
                    );
                }
                Err(_) => {}
            }
            if mic_type != MicType::None && mic_scope == MicScope::EntireFile && !has_mic {
                let digest = digest_file(&filepath, mic_type)?;
                self.manifest.file_mut(index).mic = digest;
            }
        }

        self.manifest
            .register_file(MANIFEST_FILE_NAME, crate::manifest::FileRole::Manifest);
        self.manifest.write(fs::File::create(
            self.root_filepath.join(MANIFEST_FILE_NAME),
        )?)?;
        Ok(())
    }
}

fn ensure_directory(path: &Path) -> Result<()> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
            if path.is_dir() {
                Ok(())
            } else {
                Err(As02Error::InvalidArgument(format!(
                    "'{}' clashes with a non-directory file",
                    path.display()
                )))
            }
        }
        Err(error) => Err(error.into()),
    }
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, URI_ESCAPE).to_string()
}

fn digest_file(path: &Path, mic_type: MicType) -> Result<Option<String>> {
    let mut context = MicContext::new(mic_type);
    let mut reader = BufReader::new(fs::File::open(path)?);
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        context.update(&buffer[..read]);
    }
    Ok(context.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FileRole;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_open_new_creates_layout() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("newsitem");
        let bundle = As02Bundle::open_new(&root, true).unwrap();

        assert!(root.is_dir());
        assert!(root.join("media").is_dir());
        assert_eq!(bundle.bundle_name(), "newsitem");

        // opening again is idempotent
        As02Bundle::open_new(&root, true).unwrap();
    }

    #[test]
    fn test_open_existing_requires_directory() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nothere");
        assert!(As02Bundle::open_new(&missing, false).is_err());

        let file_path = dir.path().join("afile");
        fs::write(&file_path, b"x").unwrap();
        assert!(As02Bundle::open_new(&file_path, true).is_err());
    }

    #[test]
    fn test_essence_component_names() {
        let dir = tempdir().unwrap();
        let bundle = As02Bundle::open_new(dir.path().join("pkg"), true).unwrap();

        let (path, rel_uri) = bundle
            .essence_component_filepath("pkg.mxf", true, 1)
            .unwrap();
        assert!(path.ends_with("media/pkg_v0.mxf"));
        assert_eq!(rel_uri, "media/pkg_v0.mxf");

        let (_, rel_uri) = bundle
            .essence_component_filepath("pkg.mxf", false, 2)
            .unwrap();
        assert_eq!(rel_uri, "media/pkg_a1.mxf");

        assert!(bundle.essence_component_filepath("pkg.mxf", true, 0).is_err());
    }

    #[test]
    fn test_relative_uri_percent_encoding() {
        let dir = tempdir().unwrap();
        let bundle = As02Bundle::open_new(dir.path().join("my bundle"), true).unwrap();

        let (_, rel_uri) = bundle.primary_version_filepath();
        assert_eq!(rel_uri, "my%20bundle.mxf");

        let roundtrip = bundle.complete_filepath(&rel_uri);
        assert!(roundtrip.ends_with("my bundle/my bundle.mxf"));
    }

    #[test]
    fn test_finalize_writes_manifest_and_shim() {
        let dir = tempdir().unwrap();
        let mut bundle = As02Bundle::open_new(dir.path().join("pkg"), true).unwrap();

        // a file with an entire-file MD5
        let (path, rel_uri) = bundle
            .essence_component_filepath("pkg.mxf", true, 1)
            .unwrap();
        fs::write(&path, b"essence bytes").unwrap();
        let index = bundle
            .manifest
            .register_file(&rel_uri, FileRole::EssenceComponent);
        bundle.manifest.file_mut(index).mic_type = MicType::Md5;
        bundle.manifest.file_mut(index).mic_scope = MicScope::EntireFile;

        bundle.finalize().unwrap();

        assert!(bundle.root().join("manifest.xml").is_file());
        assert!(bundle.root().join("shim.xml").is_file());

        let entry = bundle.manifest.find(&rel_uri).unwrap();
        assert_eq!(entry.size, 13);
        assert!(entry.mic.is_some());
    }
}
