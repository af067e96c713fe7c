//! `taxonomy.xml` codec
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <Taxonomy>
//!   <node name="Synapse" color="#ff0000" Dim_X="30" Dim_Y="30" Dim_Z="30">
//!     <node name="Asymmetric" color="#ff0000" Dim_X="30" Dim_Y="30" Dim_Z="30"/>
//!   </node>
//! </Taxonomy>
//! ```
//!
//! Attributes other than `name` and `color` are element properties.

use crate::error::CodecError;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use seg_core::taxonomy::SEPARATOR;
use seg_core::{Category, Taxonomy};

const ROOT: &str = "Taxonomy";
const NODE: &str = "node";
const NAME: &str = "name";
const COLOR: &str = "color";

/// Parse `taxonomy.xml`
///
/// Properties are read as written; filling in missing defaults is left to
/// the model.
///
/// # Errors
///
/// [`CodecError::Taxonomy`] for malformed XML or nodes without a name.
pub fn parse_taxonomy(xml: &str) -> Result<Taxonomy, CodecError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut taxonomy = Taxonomy::new();
    // Qualified names of the open <node> elements.
    let mut open: Vec<String> = Vec::new();
    loop {
        let event = reader
            .read_event()
            .map_err(|e| CodecError::Taxonomy(format!("at byte {}: {e}", reader.buffer_position())))?;
        match event {
            Event::Start(element) if element.name().as_ref() == NODE.as_bytes() => {
                let qualified = read_node(&mut taxonomy, open.last().map(String::as_str), &element)?;
                open.push(qualified);
            }
            Event::Empty(element) if element.name().as_ref() == NODE.as_bytes() => {
                read_node(&mut taxonomy, open.last().map(String::as_str), &element)?;
            }
            Event::End(element) if element.name().as_ref() == NODE.as_bytes() => {
                open.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(taxonomy)
}

fn read_node(taxonomy: &mut Taxonomy, parent: Option<&str>, element: &BytesStart<'_>) -> Result<String, CodecError> {
    let mut name = None;
    let mut color = None;
    let mut properties = Vec::new();
    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| CodecError::Taxonomy(e.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| CodecError::Taxonomy(e.to_string()))?
            .into_owned();
        match key.as_str() {
            NAME => name = Some(value),
            COLOR => color = Some(value),
            _ => properties.push((key, value)),
        }
    }

    let name = name.ok_or_else(|| CodecError::Taxonomy("node without a name".into()))?;
    let qualified = match parent {
        Some(parent) => format!("{parent}{SEPARATOR}{name}"),
        None => name,
    };
    let node = taxonomy.create_element(&qualified)?;
    if let Some(color) = color {
        node.set_color(color);
    }
    for (key, value) in properties {
        node.set_property(key, value);
    }
    Ok(qualified)
}

/// Text of `taxonomy.xml`
///
/// # Errors
///
/// [`CodecError::Taxonomy`] if the writer fails.
pub fn render_taxonomy(taxonomy: &Taxonomy) -> Result<String, CodecError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let xml_error = |e: std::io::Error| CodecError::Taxonomy(e.to_string());

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_error)?;
    writer.write_event(Event::Start(BytesStart::new(ROOT))).map_err(xml_error)?;
    for root in taxonomy.roots() {
        write_node(&mut writer, root).map_err(xml_error)?;
    }
    writer.write_event(Event::End(BytesEnd::new(ROOT))).map_err(xml_error)?;

    let mut xml = String::from_utf8(writer.into_inner()).map_err(|e| CodecError::Taxonomy(e.to_string()))?;
    xml.push('\n');
    Ok(xml)
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Category) -> std::io::Result<()> {
    let mut start = BytesStart::new(NODE);
    start.push_attribute((NAME, node.name()));
    start.push_attribute((COLOR, node.color()));
    for (key, value) in node.properties() {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if node.children().is_empty() {
        return writer.write_event(Event::Empty(start));
    }
    writer.write_event(Event::Start(start))?;
    for child in node.children() {
        write_node(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(NODE)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const XML: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<Taxonomy>
  <node name="Synapse" color="#00ff00" Dim_X="40" Dim_Y="40" Dim_Z="40">
    <node name="Asymmetric" color="#0000ff" Dim_X="30" Dim_Y="30" Dim_Z="30"/>
    <node name="Symmetric" color="#00ffff" Dim_X="30" Dim_Y="30" Dim_Z="30"/>
  </node>
  <node name="Mitochondria" color="#ffff00" Dim_X="20" Dim_Y="20" Dim_Z="20"/>
</Taxonomy>
"##;

    #[test]
    fn nested_nodes_become_qualified_elements() {
        let taxonomy = parse_taxonomy(XML).unwrap();
        let names: Vec<String> = taxonomy.walk().into_iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec!["Synapse", "Synapse/Asymmetric", "Synapse/Symmetric", "Mitochondria"]
        );
        let asymmetric = taxonomy.element("Synapse/Asymmetric").unwrap();
        assert_eq!(asymmetric.color(), "#0000ff");
        assert_eq!(asymmetric.property("Dim_Z"), Some("30"));
    }

    #[test]
    fn render_round_trips() {
        let taxonomy = parse_taxonomy(XML).unwrap();
        let rendered = render_taxonomy(&taxonomy).unwrap();
        assert_eq!(rendered, XML);
        assert_eq!(parse_taxonomy(&rendered).unwrap(), taxonomy);
    }

    #[test]
    fn missing_properties_are_left_to_the_model() {
        let taxonomy = parse_taxonomy(r##"<Taxonomy><node name="Dendrite" color="#123456"/></Taxonomy>"##).unwrap();
        assert!(taxonomy.element("Dendrite").unwrap().properties().is_empty());
    }

    #[test]
    fn escaped_values_are_unescaped() {
        let taxonomy =
            parse_taxonomy(r##"<Taxonomy><node name="A&amp;B" color="#123456" Note="&lt;x&gt;"/></Taxonomy>"##).unwrap();
        assert_eq!(taxonomy.element("A&B").unwrap().property("Note"), Some("<x>"));
    }

    #[test]
    fn nameless_nodes_and_broken_xml_are_rejected() {
        assert!(parse_taxonomy(r##"<Taxonomy><node color="#123456"/></Taxonomy>"##).is_err());
        assert!(parse_taxonomy("<Taxonomy><node name=\"a\"></Taxonomy>").is_err());
    }

    #[test]
    fn empty_tree_renders_empty_root() {
        let rendered = render_taxonomy(&Taxonomy::new()).unwrap();
        assert!(rendered.contains("<Taxonomy>"));
        assert!(parse_taxonomy(&rendered).unwrap().is_empty());
    }
}
