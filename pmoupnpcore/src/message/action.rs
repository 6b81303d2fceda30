//! Messages de contrôle : requêtes et réponses d'action SOAP.

use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::{
    actions::{
        Action, ActionError, ActionInvocation, ArgumentValues, QUERY_STATE_VARIABLE,
        QUERY_STATE_VARIABLE_ACTION,
    },
    message::{
        headers::{CONTROL_NAMESPACE, HeaderType, SoapActionHeader},
        stream::{CONTENT_TYPE_XML, StreamRequestMessage, StreamResponseMessage, UpnpMethod},
    },
    services::Service,
    soap::{self, build_soap_fault_for, build_soap_request, build_soap_response},
    types::ServiceType,
};

fn soap_namespace(action: &Action, service_type: &ServiceType) -> String {
    if action.is_query_state_variable() {
        CONTROL_NAMESPACE.to_string()
    } else {
        service_type.to_string()
    }
}

/// Requête d'action à émettre vers l'URL de contrôle d'un service distant.
pub struct OutgoingActionRequest;

impl OutgoingActionRequest {
    /// Construit le POST SOAP. Les entrées sont écrites dans l'ordre de
    /// déclaration de l'action.
    pub fn build(
        invocation: &ActionInvocation,
        service_type: &ServiceType,
        control_url: &Url,
        user_agent: Option<&str>,
    ) -> Result<StreamRequestMessage, ActionError> {
        let action = invocation.action();
        let header = if action.is_query_state_variable() {
            SoapActionHeader::query_state_variable()
        } else {
            SoapActionHeader::new(service_type.clone(), action.name())
        };

        let body = build_soap_request(
            &soap_namespace(action, service_type),
            action.name(),
            &invocation.ordered_inputs(),
        )
        .map_err(|e| ActionError::action_failed(format!("cannot write SOAP request: {}", e)))?;

        let mut request = StreamRequestMessage::new(UpnpMethod::Post, control_url.as_str())
            .with_body(CONTENT_TYPE_XML, body)
            .with_header(HeaderType::SoapAction, header.to_string());
        if let Some(ua) = invocation.user_agent().or(user_agent) {
            request.headers.set_header(HeaderType::UserAgent, ua);
        }
        Ok(request)
    }
}

/// Requête d'action reçue, résolue contre le service ciblé.
#[derive(Debug)]
pub struct IncomingActionRequest {
    pub header: SoapActionHeader,
    pub invocation: ActionInvocation,
}

impl IncomingActionRequest {
    /// Résout l'action et lit les entrées déclarées.
    ///
    /// Échoue avec `INVALID_ACTION` si l'en-tête SOAPACTION manque, si
    /// l'action est inconnue ou si le type de service demandé n'est pas
    /// implémenté par le service (sauf pour `QueryStateVariable`).
    pub fn parse(request: &StreamRequestMessage, service: &Service) -> Result<Self, ActionError> {
        let raw = request
            .header(HeaderType::SoapAction)
            .ok_or_else(|| ActionError::invalid_action("Missing SOAP action header"))?;
        let header: SoapActionHeader = raw
            .parse()
            .map_err(|e| ActionError::invalid_action(format!("Invalid SOAP action header: {}", e)))?;

        let action: Arc<Action> = if header.action_name == QUERY_STATE_VARIABLE {
            QUERY_STATE_VARIABLE_ACTION.clone()
        } else {
            let action = service.action(&header.action_name).ok_or_else(|| {
                ActionError::invalid_action(format!(
                    "Service '{}' has no action '{}'",
                    service.service_id(),
                    header.action_name
                ))
            })?;
            let compatible = header
                .service_type
                .as_ref()
                .is_some_and(|requested| service.service_type().implements_version(requested));
            if !compatible {
                return Err(ActionError::invalid_action(format!(
                    "Service type {} does not implement {}",
                    service.service_type(),
                    raw
                )));
            }
            action.clone()
        };

        let soap = soap::parse_soap_action(request.body_str().as_bytes())
            .map_err(|e| ActionError::invalid_args(format!("Malformed SOAP body: {}", e)))?;
        if soap.name != action.name() {
            return Err(ActionError::invalid_action(format!(
                "SOAP body names action '{}', header names '{}'",
                soap.name,
                action.name()
            )));
        }

        let mut invocation = ActionInvocation::new(action.clone());
        for arg in action.inputs() {
            let text = soap.arg(arg.name()).ok_or_else(|| {
                ActionError::invalid_args(format!("Missing input argument '{}'", arg.name()))
            })?;
            invocation.set_input_str(arg.name(), text)?;
        }
        invocation.set_user_agent(request.header(HeaderType::UserAgent).map(str::to_string));

        debug!(action = %action.name(), "📥 Incoming action request parsed");
        Ok(Self { header, invocation })
    }
}

/// Réponse d'action à renvoyer au point de contrôle.
pub struct OutgoingActionResponse;

impl OutgoingActionResponse {
    fn with_common_headers(response: StreamResponseMessage, server: &str) -> StreamResponseMessage {
        response
            .with_header(HeaderType::Server, server)
            .with_header(HeaderType::Ext, "")
    }

    /// 200 avec les sorties de l'invocation, dans l'ordre de déclaration
    pub fn success(
        invocation: &ActionInvocation,
        service_type: &ServiceType,
        server: &str,
    ) -> StreamResponseMessage {
        let action = invocation.action();
        match build_soap_response(
            &soap_namespace(action, service_type),
            action.name(),
            &invocation.ordered_outputs(),
        ) {
            Ok(body) => Self::with_common_headers(
                StreamResponseMessage::ok().with_body(CONTENT_TYPE_XML, body),
                server,
            ),
            Err(e) => Self::failure(
                &ActionError::action_failed(format!("cannot write SOAP response: {}", e)),
                server,
            ),
        }
    }

    /// 500 avec une faute SOAP portant l'erreur UPnP
    pub fn failure(error: &ActionError, server: &str) -> StreamResponseMessage {
        let response = match build_soap_fault_for(error) {
            Ok(body) => StreamResponseMessage::new(500).with_body(CONTENT_TYPE_XML, body),
            Err(_) => StreamResponseMessage::new(500),
        };
        Self::with_common_headers(response, server)
    }
}

/// Réponse reçue pour une action émise.
#[derive(Debug, Clone)]
pub struct IncomingActionResponse {
    pub response: StreamResponseMessage,
}

impl IncomingActionResponse {
    pub fn new(response: StreamResponseMessage) -> Self {
        Self { response }
    }

    pub fn is_failed(&self) -> bool {
        self.response.is_failed()
    }

    /// Échec sans faute SOAP exploitable : ni 405, ni 500 avec corps.
    pub fn is_failed_non_recoverable(&self) -> bool {
        self.is_failed()
            && !(self.response.status == 405
                || (self.response.status == 500 && self.response.has_body()))
    }

    /// 500 avec corps : une faute SOAP détaille l'erreur UPnP.
    pub fn is_failed_recoverable(&self) -> bool {
        self.response.status == 500 && self.response.has_body()
    }

    /// Renseigne les sorties de l'invocation ou retourne l'erreur d'action.
    pub fn read_into(&self, invocation: &mut ActionInvocation) -> Result<(), ActionError> {
        if self.is_failed_non_recoverable() {
            return Err(ActionError::action_failed(format!(
                "Non-recoverable remote execution failure: HTTP {} {}",
                self.response.status,
                self.response.reason()
            )));
        }

        if self.is_failed() {
            return Err(soap::parse_soap_fault(self.response.body_str().as_bytes())
                .map(|fault| fault.to_action_error())
                .unwrap_or_else(|e| {
                    ActionError::action_failed(format!(
                        "HTTP {} without usable SOAP fault: {}",
                        self.response.status, e
                    ))
                }));
        }

        let action = invocation.action().clone();
        let soap = soap::parse_soap_action(self.response.body_str().as_bytes())
            .map_err(|e| ActionError::action_failed(format!("Malformed SOAP response: {}", e)))?;
        let expected = format!("{}Response", action.name());
        if soap.name != expected {
            return Err(ActionError::action_failed(format!(
                "Expected <{}> in response, found <{}>",
                expected, soap.name
            )));
        }

        let mut outputs = ArgumentValues::new();
        for arg in action.outputs() {
            let text = soap.arg(arg.name()).ok_or_else(|| {
                ActionError::action_failed(format!("Missing output argument '{}'", arg.name()))
            })?;
            let value = arg.parse_value(text).map_err(|e| {
                ActionError::action_failed(format!("Invalid output argument '{}': {}", arg.name(), e))
            })?;
            outputs.insert(arg.name().to_string(), value);
        }
        invocation.set_outputs(outputs);
        Ok(())
    }
}
