//! The AS-02 shim document, serialized as `shim.xml`.

use crate::error::Result;
use crate::manifest::{FileRole, Manifest};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer as XmlWriter;
use std::io::Write;

const SHIM_NAMESPACE: &str = "http://www.amwa.tv/as-02/1.0/shim";

/// The shim declaration of a bundle.
#[derive(Debug, Clone)]
pub struct Shim {
    pub name: String,
    pub id: String,
    pub annotation: Option<String>,
}

impl Default for Shim {
    fn default() -> Self {
        Shim {
            name: "as02-generic".to_string(),
            id: "http://www.amwa.tv/as-02/shims/generic/1.0".to_string(),
            annotation: None,
        }
    }
}

impl Shim {
    /// Serialize the shim document.
    pub fn write<W: Write>(&self, writer: W) -> Result<()> {
        let mut xml = XmlWriter::new_with_indent(writer, b' ', 2);

        xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| crate::error::As02Error::Xml(e.to_string()))?;

        let mut root = BytesStart::new("Shim");
        root.push_attribute(("xmlns", SHIM_NAMESPACE));
        write_event(&mut xml, Event::Start(root))?;

        write_text(&mut xml, "ShimName", &self.name)?;
        write_text(&mut xml, "ShimID", &self.id)?;
        if let Some(annotation) = &self.annotation {
            write_text(&mut xml, "AnnotationText", annotation)?;
        }

        write_event(&mut xml, Event::End(BytesEnd::new("Shim")))?;
        Ok(())
    }
}

/// Fixed name of the shim file within a bundle.
pub const SHIM_FILE_NAME: &str = "shim.xml";

/// Register the shim file in a manifest.
pub fn register_shim(manifest: &mut Manifest) -> usize {
    manifest.register_file(SHIM_FILE_NAME, FileRole::Shim)
}

fn write_event<W: Write>(xml: &mut XmlWriter<W>, event: Event<'_>) -> Result<()> {
    xml.write_event(event)
        .map_err(|e| crate::error::As02Error::Xml(e.to_string()))
}

fn write_text<W: Write>(xml: &mut XmlWriter<W>, name: &str, text: &str) -> Result<()> {
    write_event(xml, Event::Start(BytesStart::new(name)))?;
    write_event(xml, Event::Text(BytesText::new(text)))?;
    write_event(xml, Event::End(BytesEnd::new(name)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shim_xml_output() {
        let shim = Shim {
            annotation: Some("news delivery".to_string()),
            ..Shim::default()
        };
        let mut buffer = Vec::new();
        shim.write(&mut buffer).unwrap();
        let xml = String::from_utf8(buffer).unwrap();

        assert!(xml.contains("<ShimName>as02-generic</ShimName>"));
        assert!(xml.contains("<AnnotationText>news delivery</AnnotationText>"));
    }
}
