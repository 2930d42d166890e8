//! The AS-02 manifest: a registry of bundle files with roles and media
//! integrity checks, serialized as `manifest.xml`.

use crate::error::{As02Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use md5::Digest;
use mxfwrite_core::{generate_uuid, Umid};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer as XmlWriter;
use std::io::Write;
use uuid::Uuid;

const MANIFEST_NAMESPACE: &str = "http://www.amwa.tv/as-02/1.0/manifest";

/// Role of a file within the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    PrimaryVersion,
    Version,
    EssenceComponent,
    Manifest,
    Shim,
    Graphic,
}

impl FileRole {
    fn as_str(&self) -> &'static str {
        match self {
            FileRole::PrimaryVersion => "primaryversion",
            FileRole::Version => "version",
            FileRole::EssenceComponent => "essencecomponent",
            FileRole::Manifest => "manifest",
            FileRole::Shim => "shim",
            FileRole::Graphic => "graphic",
        }
    }
}

/// Media integrity check algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MicType {
    #[default]
    None,
    Crc32,
    Md5,
    Sha1,
}

impl MicType {
    fn as_str(&self) -> &'static str {
        match self {
            MicType::None => "none",
            MicType::Crc32 => "crc32",
            MicType::Md5 => "md5",
            MicType::Sha1 => "sha1",
        }
    }
}

/// Scope of a media integrity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MicScope {
    #[default]
    EssenceOnly,
    EntireFile,
}

impl MicScope {
    fn as_str(&self) -> &'static str {
        match self {
            MicScope::EssenceOnly => "essence_only",
            MicScope::EntireFile => "entire_file",
        }
    }
}

/// A running media integrity check digest.
pub enum MicContext {
    None,
    Crc32(crc32fast::Hasher),
    Md5(md5::Md5),
    Sha1(sha1::Sha1),
}

impl MicContext {
    /// Create a context for an algorithm.
    pub fn new(mic_type: MicType) -> Self {
        match mic_type {
            MicType::None => MicContext::None,
            MicType::Crc32 => MicContext::Crc32(crc32fast::Hasher::new()),
            MicType::Md5 => MicContext::Md5(md5::Md5::new()),
            MicType::Sha1 => MicContext::Sha1(sha1::Sha1::new()),
        }
    }

    /// Feed bytes into the digest.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            MicContext::None => {}
            MicContext::Crc32(hasher) => hasher.update(data),
            MicContext::Md5(hasher) => hasher.update(data),
            MicContext::Sha1(hasher) => hasher.update(data),
        }
    }

    /// Finalize to a lowercase hex string, or `None` when no algorithm was
    /// selected.
    pub fn finalize(self) -> Option<String> {
        match self {
            MicContext::None => None,
            MicContext::Crc32(hasher) => Some(format!("{:08x}", hasher.finalize())),
            MicContext::Md5(hasher) => Some(hex_string(&hasher.finalize())),
            MicContext::Sha1(hasher) => Some(hex_string(&hasher.finalize())),
        }
    }
}

fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// One file entry in the manifest.
#[derive(Debug, Clone)]
pub struct ManifestFile {
    pub relative_uri: String,
    pub role: FileRole,
    pub id: Option<Umid>,
    pub size: u64,
    pub mic_type: MicType,
    pub mic_scope: MicScope,
    pub mic: Option<String>,
}

/// The manifest: a mapping from relative URI to file entry.
pub struct Manifest {
    bundle_name: String,
    bundle_id: Uuid,
    creator: String,
    creation_date: DateTime<Utc>,
    files: Vec<ManifestFile>,
}

impl Manifest {
    /// Create an empty manifest for a bundle.
    pub fn new(bundle_name: &str) -> Self {
        Manifest {
            bundle_name: bundle_name.to_string(),
            bundle_id: generate_uuid(),
            creator: "mxfwrite library".to_string(),
            creation_date: Utc::now(),
            files: Vec::new(),
        }
    }

    /// Set the creator string.
    pub fn set_creator(&mut self, creator: &str) {
        self.creator = creator.to_string();
    }

    /// The bundle id.
    pub fn bundle_id(&self) -> Uuid {
        self.bundle_id
    }

    /// Register a file, returning its entry index. Registering the same
    /// relative URI twice returns the existing entry.
    pub fn register_file(&mut self, relative_uri: &str, role: FileRole) -> usize {
        if let Some(index) = self
            .files
            .iter()
            .position(|file| file.relative_uri == relative_uri)
        {
            return index;
        }
        self.files.push(ManifestFile {
            relative_uri: relative_uri.to_string(),
            role,
            id: None,
            size: 0,
            mic_type: MicType::None,
            mic_scope: MicScope::EssenceOnly,
            mic: None,
        });
        self.files.len() - 1
    }

    /// Borrow a registered entry.
    pub fn file(&self, index: usize) -> &ManifestFile {
        &self.files[index]
    }

    /// Mutably borrow a registered entry.
    pub fn file_mut(&mut self, index: usize) -> &mut ManifestFile {
        &mut self.files[index]
    }

    /// All registered entries.
    pub fn files(&self) -> &[ManifestFile] {
        &self.files
    }

    /// Look an entry up by relative URI.
    pub fn find(&self, relative_uri: &str) -> Option<&ManifestFile> {
        self.files
            .iter()
            .find(|file| file.relative_uri == relative_uri)
    }

    /// Serialize the manifest document.
    pub fn write<W: Write>(&self, writer: W) -> Result<()> {
        let mut xml = XmlWriter::new_with_indent(writer, b' ', 2);

        xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)?;

        let mut root = BytesStart::new("Manifest");
        root.push_attribute(("xmlns", MANIFEST_NAMESPACE));
        xml.write_event(Event::Start(root)).map_err(xml_error)?;

        write_text_element(&mut xml, "BundleName", &self.bundle_name)?;
        write_text_element(
            &mut xml,
            "BundleID",
            &format!("urn:uuid:{}", self.bundle_id),
        )?;
        write_text_element(&mut xml, "Creator", &self.creator)?;
        write_text_element(
            &mut xml,
            "CreationDate",
            &self.creation_date.to_rfc3339_opts(SecondsFormat::Secs, true),
        )?;

        xml.write_event(Event::Start(BytesStart::new("FileList")))
            .map_err(xml_error)?;
        for file in &self.files {
            xml.write_event(Event::Start(BytesStart::new("File")))
                .map_err(xml_error)?;
            if let Some(id) = &file.id {
                write_text_element(&mut xml, "FileID", &umid_urn(id))?;
            }
            write_text_element(&mut xml, "Role", file.role.as_str())?;
            write_text_element(&mut xml, "Path", &file.relative_uri)?;
            write_text_element(&mut xml, "Size", &file.size.to_string())?;
            if file.mic_type != MicType::None {
                let mut mic = BytesStart::new("MIC");
                mic.push_attribute(("type", file.mic_type.as_str()));
                mic.push_attribute(("scope", file.mic_scope.as_str()));
                xml.write_event(Event::Start(mic)).map_err(xml_error)?;
                if let Some(value) = &file.mic {
                    xml.write_event(Event::Text(BytesText::new(value)))
                        .map_err(xml_error)?;
                }
                xml.write_event(Event::End(BytesEnd::new("MIC")))
                    .map_err(xml_error)?;
            }
            xml.write_event(Event::End(BytesEnd::new("File")))
                .map_err(xml_error)?;
        }
        xml.write_event(Event::End(BytesEnd::new("FileList")))
            .map_err(xml_error)?;

        xml.write_event(Event::End(BytesEnd::new("Manifest")))
            .map_err(xml_error)?;
        Ok(())
    }
}

fn write_text_element<W: Write>(xml: &mut XmlWriter<W>, name: &str, text: &str) -> Result<()> {
    xml.write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_error)?;
    xml.write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_error)?;
    xml.write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_error)?;
    Ok(())
}

fn xml_error<E: std::fmt::Display>(error: E) -> As02Error {
    As02Error::Xml(error.to_string())
}

fn umid_urn(umid: &Umid) -> String {
    let mut out = String::from("urn:smpte:umid:");
    for (i, byte) in umid.as_bytes().iter().enumerate() {
        if i > 0 && i % 4 == 0 {
            out.push('.');
        }
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_register_file_deduplicates() {
        let mut manifest = Manifest::new("bundle");
        let a = manifest.register_file("media/a_v0.mxf", FileRole::EssenceComponent);
        let b = manifest.register_file("media/a_v0.mxf", FileRole::EssenceComponent);
        assert_eq!(a, b);
        assert_eq!(manifest.files().len(), 1);
    }

    #[test]
    fn test_mic_md5_known_digest() {
        let mut mic = MicContext::new(MicType::Md5);
        mic.update(b"abc");
        assert_eq!(
            mic.finalize().unwrap(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_mic_sha1_known_digest() {
        let mut mic = MicContext::new(MicType::Sha1);
        mic.update(b"abc");
        assert_eq!(
            mic.finalize().unwrap(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_mic_crc32_known_value() {
        let mut mic = MicContext::new(MicType::Crc32);
        mic.update(b"123456789");
        assert_eq!(mic.finalize().unwrap(), "cbf43926");
    }

    #[test]
    fn test_mic_none_has_no_value() {
        let mut mic = MicContext::new(MicType::None);
        mic.update(b"ignored");
        assert!(mic.finalize().is_none());
    }

    #[test]
    fn test_manifest_xml_output() {
        let mut manifest = Manifest::new("newsitem");
        let index = manifest.register_file("media/newsitem_v0.mxf", FileRole::EssenceComponent);
        let umid = Umid::generate();
        {
            let file = manifest.file_mut(index);
            file.id = Some(umid);
            file.size = 1234;
            file.mic_type = MicType::Md5;
            file.mic = Some("00112233445566778899aabbccddeeff".to_string());
        }
        manifest.register_file("shim.xml", FileRole::Shim);

        let mut buffer = Vec::new();
        manifest.write(&mut buffer).unwrap();
        let xml = String::from_utf8(buffer).unwrap();

        assert!(xml.contains("<BundleName>newsitem</BundleName>"));
        assert!(xml.contains("<Path>media/newsitem_v0.mxf</Path>"));
        assert!(xml.contains("<Role>essencecomponent</Role>"));
        assert!(xml.contains("urn:smpte:umid:"));
        assert!(xml.contains("type=\"md5\""));
        assert!(xml.contains("<Role>shim</Role>"));
    }
}
