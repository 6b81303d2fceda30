//! Description de service (SCPD).

use std::io::BufReader;
use std::sync::Arc;

use tracing::warn;
use xmltree::{Element, XMLNode};

use crate::{
    actions::{Action, Argument},
    descriptor::{DescriptorError, child_text, spec_version, write_document},
    services::{Service, ServiceError},
    state_variables::StateVariable,
    types::{ServiceId, ServiceType},
    value_ranges::ValueRange,
    variable_types::{StateValue, StateVarType},
};

pub const SERVICE_NAMESPACE: &str = "urn:schemas-upnp-org:service-1-0";

/// Élément `<scpd>` d'un service.
pub fn scpd_element(service: &Service) -> Element {
    let mut elem = Element::new("scpd");
    elem.attributes
        .insert("xmlns".to_string(), SERVICE_NAMESPACE.to_string());
    elem.children.push(XMLNode::Element(spec_version()));

    if !service.actions().is_empty() {
        let mut list = Element::new("actionList");
        for action in service.actions() {
            list.children.push(XMLNode::Element(action.to_xml_element()));
        }
        elem.children.push(XMLNode::Element(list));
    }

    let mut table = Element::new("serviceStateTable");
    for variable in service.state_variables() {
        table.children.push(XMLNode::Element(variable.to_xml_element()));
    }
    elem.children.push(XMLNode::Element(table));
    elem
}

pub fn build_scpd(service: &Service) -> Result<String, DescriptorError> {
    write_document(&scpd_element(service))
}

/// Lit un SCPD et construit le [`Service`] correspondant.
///
/// Une valeur par défaut illisible est ignorée ; un type inconnu, un
/// argument sans variable ou une plage incohérente rejettent le document.
pub fn parse_scpd(
    xml: &[u8],
    service_type: ServiceType,
    service_id: ServiceId,
) -> Result<Service, DescriptorError> {
    let root = Element::parse(BufReader::new(xml))?;
    if root.name != "scpd" {
        return Err(DescriptorError::UnexpectedRoot(root.name));
    }

    let mut variables = Vec::new();
    if let Some(table) = root.get_child("serviceStateTable") {
        for elem in table.children.iter().filter_map(XMLNode::as_element) {
            if elem.name == "stateVariable" {
                variables.push(Arc::new(parse_state_variable(elem)?));
            }
        }
    }

    let mut actions = Vec::new();
    if let Some(list) = root.get_child("actionList") {
        for elem in list.children.iter().filter_map(XMLNode::as_element) {
            if elem.name == "action" {
                actions.push(parse_action(elem, &variables)?);
            }
        }
    }

    Ok(Service::new(service_type, service_id, variables, actions)?)
}

fn parse_state_variable(elem: &Element) -> Result<StateVariable, DescriptorError> {
    let name = child_text(elem, "name").ok_or(DescriptorError::MissingElement("name"))?;
    let datatype: StateVarType = child_text(elem, "dataType")
        .ok_or(DescriptorError::MissingElement("dataType"))?
        .parse()
        .map_err(|source| DescriptorError::InvalidValue {
            element: "dataType",
            source,
        })?;
    let send_events = elem
        .attributes
        .get("sendEvents")
        .is_none_or(|v| !v.trim().eq_ignore_ascii_case("no"));

    let mut variable = StateVariable::new(&name, datatype).with_events(send_events);

    if let Some(text) = child_text(elem, "defaultValue") {
        match StateValue::from_string(&text, &datatype) {
            Ok(value) => variable = variable.with_default(value),
            Err(e) => warn!(variable = %name, "Ignoring unreadable default value: {}", e),
        }
    }

    if let Some(list) = elem.get_child("allowedValueList") {
        let allowed: Vec<String> = list
            .children
            .iter()
            .filter_map(XMLNode::as_element)
            .filter(|e| e.name == "allowedValue")
            .filter_map(|e| e.get_text().map(|t| t.trim().to_string()))
            .collect();
        variable = variable.with_allowed_values(allowed);
    }

    if let Some(range) = elem.get_child("allowedValueRange") {
        let bound = |element: &'static str| -> Result<Option<StateValue>, DescriptorError> {
            child_text(range, element)
                .map(|text| StateValue::from_string(&text, &datatype))
                .transpose()
                .map_err(|source| DescriptorError::InvalidValue { element, source })
        };
        let minimum = bound("minimum")?.ok_or(DescriptorError::MissingElement("minimum"))?;
        let maximum = bound("maximum")?.ok_or(DescriptorError::MissingElement("maximum"))?;
        let mut value_range = ValueRange::new(minimum, maximum).map_err(|source| DescriptorError::InvalidValue {
            element: "allowedValueRange",
            source,
        })?;
        if let Some(step) = bound("step")? {
            value_range = value_range
                .with_step(step)
                .map_err(|source| DescriptorError::InvalidValue { element: "step", source })?;
        }
        variable = variable.with_range(value_range);
    }

    Ok(variable)
}

fn parse_action(elem: &Element, variables: &[Arc<StateVariable>]) -> Result<Action, DescriptorError> {
    let name = child_text(elem, "name").ok_or(DescriptorError::MissingElement("name"))?;
    let mut action = Action::new(&name);

    let Some(list) = elem.get_child("argumentList") else {
        return Ok(action);
    };
    for arg in list.children.iter().filter_map(XMLNode::as_element) {
        if arg.name != "argument" {
            continue;
        }
        let arg_name = child_text(arg, "name").ok_or(DescriptorError::MissingElement("name"))?;
        let related_name = child_text(arg, "relatedStateVariable")
            .ok_or(DescriptorError::MissingElement("relatedStateVariable"))?;
        let related = variables
            .iter()
            .find(|v| v.name() == related_name)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownVariable {
                action: name.clone(),
                argument: arg_name.clone(),
                variable: related_name.clone(),
            })?;

        let direction = child_text(arg, "direction").unwrap_or_default();
        let argument = if direction.eq_ignore_ascii_case("in") {
            Argument::input(&arg_name, related)
        } else {
            let output = Argument::output(&arg_name, related);
            if arg.get_child("retval").is_some() {
                output.as_return_value()
            } else {
                output
            }
        };
        action = action.with_argument(argument);
    }
    Ok(action)
}
