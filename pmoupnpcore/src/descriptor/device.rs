//! Description de périphérique (`<root>`).

use std::collections::HashMap;
use std::io::BufReader;
use std::sync::Arc;

use tracing::warn;
use url::Url;
use xmltree::{Element, XMLNode};

use crate::{
    descriptor::{DescriptorError, child_text, spec_version, text_element, write_document},
    devices::{DeviceDetails, LocalDevice, RemoteDevice},
    namespace::Namespace,
    services::{DeviceService, RemoteService, Service},
    types::{DeviceType, ServiceId, ServiceType, Udn},
};

pub const DEVICE_NAMESPACE: &str = "urn:schemas-upnp-org:device-1-0";

/// Service annoncé dans une description de périphérique, URL résolues.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescription {
    pub service_type: ServiceType,
    pub service_id: ServiceId,
    pub scpd_url: Url,
    pub control_url: Url,
    pub event_url: Url,
}

/// Description de périphérique lue, avant récupération des SCPD.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescription {
    pub udn: Udn,
    pub device_type: DeviceType,
    pub details: DeviceDetails,
    pub services: Vec<ServiceDescription>,
    pub embedded: Vec<DeviceDescription>,
}

impl DeviceDescription {
    /// Services de tout l'arbre
    pub fn all_services(&self) -> Vec<&ServiceDescription> {
        let mut out: Vec<&ServiceDescription> = self.services.iter().collect();
        for child in &self.embedded {
            out.extend(child.all_services());
        }
        out
    }
}

fn push_text(elem: &mut Element, name: &str, text: impl ToString) {
    elem.children.push(XMLNode::Element(text_element(name, text)));
}

fn push_optional(elem: &mut Element, name: &str, text: Option<impl ToString>) {
    if let Some(text) = text {
        push_text(elem, name, text);
    }
}

fn device_element(device: &LocalDevice, namespace: &Namespace) -> Element {
    let details = device.details();
    let mut elem = Element::new("device");
    push_text(&mut elem, "deviceType", device.device_type());
    push_text(&mut elem, "friendlyName", &details.friendly_name);
    push_text(&mut elem, "manufacturer", &details.manufacturer);
    push_optional(&mut elem, "manufacturerURL", details.manufacturer_url.as_ref());
    push_optional(&mut elem, "modelDescription", details.model_description.as_ref());
    push_text(&mut elem, "modelName", &details.model_name);
    push_optional(&mut elem, "modelNumber", details.model_number.as_ref());
    push_optional(&mut elem, "modelURL", details.model_url.as_ref());
    push_optional(&mut elem, "serialNumber", details.serial_number.as_ref());
    push_text(&mut elem, "UDN", device.udn());
    push_optional(&mut elem, "UPC", details.upc.as_ref());

    if !device.services().is_empty() {
        let mut list = Element::new("serviceList");
        for service in device.services() {
            let id = service.service_id();
            let mut s = Element::new("service");
            push_text(&mut s, "serviceType", service.service_type());
            push_text(&mut s, "serviceId", id);
            push_text(&mut s, "SCPDURL", namespace.service_descriptor_path(device.udn(), id));
            push_text(&mut s, "controlURL", namespace.control_path(device.udn(), id));
            push_text(&mut s, "eventSubURL", namespace.event_path(device.udn(), id));
            list.children.push(XMLNode::Element(s));
        }
        elem.children.push(XMLNode::Element(list));
    }

    if !device.embedded_devices().is_empty() {
        let mut list = Element::new("deviceList");
        for child in device.embedded_devices() {
            list.children.push(XMLNode::Element(device_element(child, namespace)));
        }
        elem.children.push(XMLNode::Element(list));
    }

    push_optional(&mut elem, "presentationURL", details.presentation_url.as_ref());
    elem
}

/// Document de description d'un périphérique local racine.
pub fn build_device_description(device: &LocalDevice, namespace: &Namespace) -> Result<String, DescriptorError> {
    let mut root = Element::new("root");
    root.attributes
        .insert("xmlns".to_string(), DEVICE_NAMESPACE.to_string());
    root.children.push(XMLNode::Element(spec_version()));
    root.children.push(XMLNode::Element(device_element(device, namespace)));
    write_document(&root)
}

fn resolve(base: &Url, raw: &str) -> Result<Url, DescriptorError> {
    base.join(raw.trim()).map_err(|e| DescriptorError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

fn optional_url(elem: &Element, name: &str, base: &Url) -> Option<Url> {
    child_text(elem, name)
        .filter(|s| !s.is_empty())
        .and_then(|raw| base.join(&raw).ok())
}

fn required(elem: &Element, name: &'static str) -> Result<String, DescriptorError> {
    child_text(elem, name).ok_or(DescriptorError::MissingElement(name))
}

fn parse_service(elem: &Element, base: &Url) -> Result<ServiceDescription, DescriptorError> {
    let service_type = required(elem, "serviceType")?
        .parse()
        .map_err(|source| DescriptorError::InvalidValue {
            element: "serviceType",
            source,
        })?;
    let service_id = required(elem, "serviceId")?
        .parse()
        .map_err(|source| DescriptorError::InvalidValue {
            element: "serviceId",
            source,
        })?;
    Ok(ServiceDescription {
        service_type,
        service_id,
        scpd_url: resolve(base, &required(elem, "SCPDURL")?)?,
        control_url: resolve(base, &required(elem, "controlURL")?)?,
        event_url: resolve(base, &required(elem, "eventSubURL")?)?,
    })
}

fn parse_device(elem: &Element, base: &Url) -> Result<DeviceDescription, DescriptorError> {
    let udn = required(elem, "UDN")?
        .parse()
        .map_err(|source| DescriptorError::InvalidValue { element: "UDN", source })?;
    let device_type = required(elem, "deviceType")?
        .parse()
        .map_err(|source| DescriptorError::InvalidValue {
            element: "deviceType",
            source,
        })?;

    let details = DeviceDetails {
        friendly_name: child_text(elem, "friendlyName").unwrap_or_default(),
        manufacturer: child_text(elem, "manufacturer").unwrap_or_default(),
        manufacturer_url: optional_url(elem, "manufacturerURL", base),
        model_name: child_text(elem, "modelName").unwrap_or_default(),
        model_description: child_text(elem, "modelDescription"),
        model_number: child_text(elem, "modelNumber"),
        model_url: optional_url(elem, "modelURL", base),
        serial_number: child_text(elem, "serialNumber"),
        upc: child_text(elem, "UPC"),
        presentation_url: optional_url(elem, "presentationURL", base),
    };

    let mut services = Vec::new();
    if let Some(list) = elem.get_child("serviceList") {
        for s in list.children.iter().filter_map(XMLNode::as_element) {
            if s.name == "service" {
                services.push(parse_service(s, base)?);
            }
        }
    }

    let mut embedded = Vec::new();
    if let Some(list) = elem.get_child("deviceList") {
        for d in list.children.iter().filter_map(XMLNode::as_element) {
            if d.name == "device" {
                embedded.push(parse_device(d, base)?);
            }
        }
    }

    Ok(DeviceDescription {
        udn,
        device_type,
        details,
        services,
        embedded,
    })
}

/// Lit une description de périphérique récupérée à `descriptor_url`.
pub fn parse_device_description(xml: &[u8], descriptor_url: &Url) -> Result<DeviceDescription, DescriptorError> {
    let root = Element::parse(BufReader::new(xml))?;
    if root.name != "root" {
        return Err(DescriptorError::UnexpectedRoot(root.name));
    }
    let base = match child_text(&root, "URLBase").filter(|s| !s.is_empty()) {
        Some(raw) => resolve(descriptor_url, &raw)?,
        None => descriptor_url.clone(),
    };
    let device = root
        .get_child("device")
        .ok_or(DescriptorError::MissingElement("device"))?;
    parse_device(device, &base)
}

/// Construit le périphérique distant à partir de sa description et des
/// SCPD récupérés, indexés par URL.
///
/// Un service dont le SCPD manque est conservé sans action ni variable.
pub fn build_remote_device(
    description: &DeviceDescription,
    location: Option<&Url>,
    scpds: &HashMap<Url, Service>,
) -> Result<Arc<RemoteDevice>, DescriptorError> {
    let mut builder = RemoteDevice::builder(
        description.udn.clone(),
        description.device_type.clone(),
        description.details.clone(),
    );
    if let Some(location) = location {
        builder = builder.location(location.clone());
    }

    for sd in &description.services {
        let service = match scpds.get(&sd.scpd_url) {
            Some(service) => service.clone(),
            None => {
                warn!(udn = %description.udn, service = %sd.service_id, "SCPD unavailable, service has no actions");
                Service::new(sd.service_type.clone(), sd.service_id.clone(), vec![], vec![])?
            }
        };
        builder = builder.service(RemoteService::new(
            service,
            sd.scpd_url.clone(),
            sd.control_url.clone(),
            sd.event_url.clone(),
        ));
    }

    for child in &description.embedded {
        builder = builder.embedded(build_remote_device(child, None, scpds)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::LocalService;

    fn local_device() -> Arc<LocalDevice> {
        let service = Service::new(
            ServiceType::uda("ConnectionManager", 1),
            ServiceId::uda("ConnectionManager"),
            vec![],
            vec![],
        )
        .unwrap();
        let child = LocalDevice::builder(
            Udn::random(),
            DeviceType::uda("MediaRenderer", 1),
            DeviceDetails::new("Child", "PMO", "Embedded"),
        )
        .service(LocalService::inert(service.clone()))
        .build()
        .unwrap();
        LocalDevice::builder(
            Udn::random(),
            DeviceType::uda("MediaServer", 1),
            DeviceDetails::new("Root", "PMO", "Server").with_serial_number("42"),
        )
        .service(LocalService::inert(service))
        .embedded(child)
        .build()
        .unwrap()
    }

    #[test]
    fn test_description_round_trip() {
        let device = local_device();
        let ns = Namespace::new("/upnp");
        let xml = build_device_description(&device, &ns).unwrap();

        let location = Url::parse("http://10.0.0.5:8200/upnp/dev/x/desc.xml").unwrap();
        let parsed = parse_device_description(xml.as_bytes(), &location).unwrap();

        assert_eq!(&parsed.udn, device.udn());
        assert_eq!(parsed.details.serial_number.as_deref(), Some("42"));
        assert_eq!(parsed.embedded.len(), 1);
        assert_eq!(parsed.all_services().len(), 2);

        let svc = &parsed.services[0];
        assert_eq!(
            svc.control_url.as_str(),
            format!(
                "http://10.0.0.5:8200{}",
                ns.control_path(device.udn(), &ServiceId::uda("ConnectionManager"))
            )
        );

        let remote = build_remote_device(&parsed, Some(&location), &HashMap::new()).unwrap();
        assert_eq!(remote.udn(), device.udn());
        assert_eq!(remote.location(), Some(&location));
        assert_eq!(remote.all_services().len(), 2);
        assert_eq!(
            remote.embedded_devices()[0].services()[0].device_udn(),
            Some(device.embedded_devices()[0].udn())
        );
    }

    #[test]
    fn test_url_base_is_honored() {
        let xml = r#"<root xmlns="urn:schemas-upnp-org:device-1-0">
  <URLBase>http://192.168.1.20:49152/</URLBase>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>TV</friendlyName>
    <UDN>uuid:abcd</UDN>
    <serviceList><service>
      <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
      <serviceId>urn:upnp-org:serviceId:AVTransport</serviceId>
      <SCPDURL>avt.xml</SCPDURL>
      <controlURL>/ctl/avt</controlURL>
      <eventSubURL>/evt/avt</eventSubURL>
    </service></serviceList>
  </device>
</root>"#;
        let location = Url::parse("http://192.168.1.20:80/desc.xml").unwrap();
        let parsed = parse_device_description(xml.as_bytes(), &location).unwrap();
        assert_eq!(parsed.services[0].scpd_url.as_str(), "http://192.168.1.20:49152/avt.xml");
        assert_eq!(parsed.services[0].event_url.as_str(), "http://192.168.1.20:49152/evt/avt");
    }

    #[test]
    fn test_missing_udn() {
        let xml = "<root><device><deviceType>urn:schemas-upnp-org:device:X:1</deviceType></device></root>";
        let location = Url::parse("http://h/desc.xml").unwrap();
        assert!(matches!(
            parse_device_description(xml.as_bytes(), &location),
            Err(DescriptorError::MissingElement("UDN"))
        ));
    }
}
