//! Corps XML des NOTIFY : `<e:propertyset>`.

use std::io::BufReader;

use quick_xml::escape::escape;
use xmltree::Element;

pub const EVENT_NAMESPACE: &str = "urn:schemas-upnp-org:event-1-0";

/// Sérialise les couples `(variable, valeur)` en propertyset.
pub fn build_propertyset(values: &[(String, String)]) -> String {
    let mut body = format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<e:propertyset xmlns:e=\"{}\">",
        EVENT_NAMESPACE
    );
    for (name, value) in values {
        body.push_str(&format!(
            "<e:property><{0}>{1}</{0}></e:property>",
            name,
            escape(value.as_str())
        ));
    }
    body.push_str("</e:propertyset>");
    body
}

/// Lit les couples `(variable, valeur)` d'un propertyset, dans l'ordre.
pub fn parse_propertyset(xml: &[u8]) -> Result<Vec<(String, String)>, xmltree::ParseError> {
    let root = Element::parse(BufReader::new(xml))?;
    Ok(root
        .children
        .iter()
        .filter_map(|n| n.as_element())
        .filter(|e| e.name == "property")
        .flat_map(|prop| prop.children.iter().filter_map(|n| n.as_element()))
        .map(|var| {
            (
                var.name.clone(),
                var.get_text().map(|t| t.into_owned()).unwrap_or_default(),
            )
        })
        .collect())
}
