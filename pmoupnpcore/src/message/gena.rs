//! Messages GENA : SUBSCRIBE, renouvellement, UNSUBSCRIBE et NOTIFY.

use url::Url;

use crate::{
    gena::{SubscriptionError, propertyset},
    message::{
        headers::{CallbackHeader, HeaderType, TimeoutHeader},
        stream::{CONTENT_TYPE_XML, StreamRequestMessage, StreamResponseMessage, UpnpMethod},
    },
    types::Sid,
};

pub const NT_EVENT: &str = "upnp:event";
pub const NTS_PROPCHANGE: &str = "upnp:propchange";

fn host_of(url: &Url) -> String {
    match (url.host_str(), url.port_or_known_default()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    }
}

/// Requêtes GENA émises par un point de contrôle.
pub struct OutgoingSubscribeRequest;

impl OutgoingSubscribeRequest {
    pub fn subscribe(
        event_url: &Url,
        callbacks: &[Url],
        timeout: TimeoutHeader,
        user_agent: &str,
    ) -> StreamRequestMessage {
        StreamRequestMessage::new(UpnpMethod::Subscribe, event_url.as_str())
            .with_header(HeaderType::Host, host_of(event_url))
            .with_header(HeaderType::Callback, CallbackHeader(callbacks.to_vec()).to_string())
            .with_header(HeaderType::Nt, NT_EVENT)
            .with_header(HeaderType::Timeout, timeout.to_string())
            .with_header(HeaderType::UserAgent, user_agent)
    }

    pub fn renew(event_url: &Url, sid: &Sid, timeout: TimeoutHeader, user_agent: &str) -> StreamRequestMessage {
        StreamRequestMessage::new(UpnpMethod::Subscribe, event_url.as_str())
            .with_header(HeaderType::Host, host_of(event_url))
            .with_header(HeaderType::Sid, sid.to_string())
            .with_header(HeaderType::Timeout, timeout.to_string())
            .with_header(HeaderType::UserAgent, user_agent)
    }

    pub fn unsubscribe(event_url: &Url, sid: &Sid, user_agent: &str) -> StreamRequestMessage {
        StreamRequestMessage::new(UpnpMethod::Unsubscribe, event_url.as_str())
            .with_header(HeaderType::Host, host_of(event_url))
            .with_header(HeaderType::Sid, sid.to_string())
            .with_header(HeaderType::UserAgent, user_agent)
    }
}

/// Réponse à un SUBSCRIBE (initial ou renouvellement).
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingSubscribeResponse {
    pub sid: Sid,
    pub timeout: TimeoutHeader,
}

impl IncomingSubscribeResponse {
    pub fn parse(response: &StreamResponseMessage) -> Result<Self, SubscriptionError> {
        if !response.is_success() {
            return Err(SubscriptionError::Rejected {
                status: response.status,
            });
        }
        let sid = response
            .headers
            .first_header_as::<Sid>(HeaderType::Sid)
            .ok_or(SubscriptionError::InvalidResponse("SID"))?;
        let timeout = response
            .headers
            .first_header_as::<TimeoutHeader>(HeaderType::Timeout)
            .ok_or(SubscriptionError::InvalidResponse("TIMEOUT"))?;
        // une durée nulle rendrait l'abonnement aussitôt périmé
        if timeout == TimeoutHeader::Seconds(0) {
            return Err(SubscriptionError::InvalidResponse("TIMEOUT"));
        }
        Ok(Self { sid, timeout })
    }
}

/// SUBSCRIBE reçu par un service local.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingSubscribeRequest {
    Subscribe {
        callbacks: Vec<Url>,
        timeout: Option<TimeoutHeader>,
    },
    Renew {
        sid: Sid,
        timeout: Option<TimeoutHeader>,
    },
}

impl IncomingSubscribeRequest {
    /// Valide la requête ; l'erreur est le statut HTTP à renvoyer.
    ///
    /// - 400 : SID combiné à CALLBACK ou NT
    /// - 412 : NT absent ou différent de `upnp:event`, CALLBACK invalide
    pub fn parse(request: &StreamRequestMessage) -> Result<Self, u16> {
        let timeout = request.headers.first_header_as(HeaderType::Timeout);
        let nt = request.header(HeaderType::Nt);
        let callback = request.header(HeaderType::Callback);

        if let Some(sid) = request.header(HeaderType::Sid) {
            if nt.is_some() || callback.is_some() {
                return Err(400);
            }
            let sid = sid.parse().map_err(|_| 412u16)?;
            return Ok(IncomingSubscribeRequest::Renew { sid, timeout });
        }

        if nt.map(str::trim) != Some(NT_EVENT) {
            return Err(412);
        }
        let callbacks = callback
            .and_then(|c| c.parse::<CallbackHeader>().ok())
            .ok_or(412u16)?;
        Ok(IncomingSubscribeRequest::Subscribe {
            callbacks: callbacks.0,
            timeout,
        })
    }
}

/// Valide un UNSUBSCRIBE reçu et retourne son SID.
pub fn parse_unsubscribe(request: &StreamRequestMessage) -> Result<Sid, u16> {
    if request.header(HeaderType::Nt).is_some() || request.header(HeaderType::Callback).is_some() {
        return Err(400);
    }
    request
        .headers
        .first_header_as::<Sid>(HeaderType::Sid)
        .ok_or(412)
}

/// Réponse 200 à un SUBSCRIBE accepté
pub fn subscribe_response(sid: &Sid, timeout: TimeoutHeader, server: &str) -> StreamResponseMessage {
    StreamResponseMessage::ok()
        .with_header(HeaderType::Sid, sid.to_string())
        .with_header(HeaderType::Timeout, timeout.to_string())
        .with_header(HeaderType::Server, server)
        .with_header(HeaderType::ContentLength, "0")
}

/// NOTIFY émis vers l'URL de rappel d'un abonné.
pub struct OutgoingEventRequest;

impl OutgoingEventRequest {
    pub fn build(callback: &Url, sid: &Sid, seq: u32, values: &[(String, String)]) -> StreamRequestMessage {
        StreamRequestMessage::new(UpnpMethod::Notify, callback.as_str())
            .with_header(HeaderType::Host, host_of(callback))
            .with_header(HeaderType::Nt, NT_EVENT)
            .with_header(HeaderType::Nts, NTS_PROPCHANGE)
            .with_header(HeaderType::Sid, sid.to_string())
            .with_header(HeaderType::Seq, seq.to_string())
            .with_body(CONTENT_TYPE_XML, propertyset::build_propertyset(values))
    }
}

/// NOTIFY reçu sur une URL de rappel.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingEventRequest {
    pub sid: Sid,
    pub seq: u32,
    pub properties: Vec<(String, String)>,
}

impl IncomingEventRequest {
    /// Valide le NOTIFY ; l'erreur est le statut HTTP à renvoyer.
    pub fn parse(request: &StreamRequestMessage) -> Result<Self, u16> {
        if request.header(HeaderType::Nt).map(str::trim) != Some(NT_EVENT)
            || request.header(HeaderType::Nts).map(str::trim) != Some(NTS_PROPCHANGE)
        {
            return Err(412);
        }
        let sid = request
            .headers
            .first_header_as::<Sid>(HeaderType::Sid)
            .ok_or(412u16)?;
        let seq = request
            .headers
            .first_header_as::<u32>(HeaderType::Seq)
            .ok_or(400u16)?;
        let properties =
            propertyset::parse_propertyset(request.body_str().as_bytes()).map_err(|_| 400u16)?;
        Ok(Self {
            sid,
            seq,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_url() -> Url {
        Url::parse("http://192.168.1.10:49152/event/avt").unwrap()
    }

    #[test]
    fn test_subscribe_request_headers() {
        let cb = Url::parse("http://192.168.1.2:8080/cb/1").unwrap();
        let req = OutgoingSubscribeRequest::subscribe(&event_url(), &[cb], TimeoutHeader::Seconds(1800), "ua");
        assert_eq!(req.header(HeaderType::Host), Some("192.168.1.10:49152"));
        assert_eq!(req.header(HeaderType::Callback), Some("<http://192.168.1.2:8080/cb/1>"));
        assert_eq!(req.header(HeaderType::Timeout), Some("Second-1800"));

        let parsed = IncomingSubscribeRequest::parse(&req).unwrap();
        assert!(matches!(parsed, IncomingSubscribeRequest::Subscribe { callbacks, .. } if callbacks.len() == 1));
    }

    #[test]
    fn test_incoming_subscribe_validation() {
        let sid = Sid::generate();
        let mut renew = OutgoingSubscribeRequest::renew(&event_url(), &sid, TimeoutHeader::Infinite, "ua");
        assert!(matches!(
            IncomingSubscribeRequest::parse(&renew),
            Ok(IncomingSubscribeRequest::Renew { .. })
        ));
        renew.headers.set_header(HeaderType::Nt, NT_EVENT);
        assert_eq!(IncomingSubscribeRequest::parse(&renew), Err(400));

        let no_nt = StreamRequestMessage::new(UpnpMethod::Subscribe, "/event")
            .with_header(HeaderType::Callback, "<http://h/cb>");
        assert_eq!(IncomingSubscribeRequest::parse(&no_nt), Err(412));
    }

    #[test]
    fn test_subscribe_response() {
        let sid = Sid::generate();
        let resp = subscribe_response(&sid, TimeoutHeader::Seconds(300), "srv");
        let parsed = IncomingSubscribeResponse::parse(&resp).unwrap();
        assert_eq!(parsed.sid, sid);
        assert_eq!(parsed.timeout, TimeoutHeader::Seconds(300));

        assert!(matches!(
            IncomingSubscribeResponse::parse(&StreamResponseMessage::new(412)),
            Err(SubscriptionError::Rejected { status: 412 })
        ));

        let zero = subscribe_response(&sid, TimeoutHeader::Seconds(0), "srv");
        assert!(matches!(
            IncomingSubscribeResponse::parse(&zero),
            Err(SubscriptionError::InvalidResponse("TIMEOUT"))
        ));
    }

    #[test]
    fn test_event_request_roundtrip() {
        let sid = Sid::generate();
        let cb = Url::parse("http://192.168.1.2:8080/cb/1").unwrap();
        let values = vec![("Volume".to_string(), "12".to_string())];
        let req = OutgoingEventRequest::build(&cb, &sid, 7, &values);
        let parsed = IncomingEventRequest::parse(&req).unwrap();
        assert_eq!(parsed.seq, 7);
        assert_eq!(parsed.properties, values);
    }
}
