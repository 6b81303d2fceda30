//! Protocoles des messages entrants.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use crate::{
    descriptor::{build_device_description, build_scpd},
    devices::LocalDevice,
    gena::RemoteGenaSubscription,
    message::{
        HeaderType, StreamRequestMessage, StreamResponseMessage,
        action::{IncomingActionRequest, OutgoingActionResponse},
        gena::{IncomingEventRequest, IncomingSubscribeRequest, parse_unsubscribe, subscribe_response},
        stream::CONTENT_TYPE_XML,
    },
    protocol::{ProtocolContext, discovery},
    registry::DeferredTask,
    services::{DeviceService, LocalService},
    transport::StreamOutcome,
    types::Udn,
};

/// Protocole choisi pour une requête HTTP entrante.
#[derive(Debug)]
pub enum ReceivingStream {
    DeviceDescriptor(Arc<LocalDevice>),
    ServiceDescriptor(Arc<LocalService>),
    Action(Arc<LocalService>),
    Subscribe(Arc<LocalService>),
    Unsubscribe(Arc<LocalService>),
    Event(Arc<RemoteGenaSubscription>),
}

impl ReceivingStream {
    pub async fn run(self, ctx: &Arc<ProtocolContext>, request: StreamRequestMessage) -> StreamOutcome {
        let server = ctx.server_header();
        match self {
            ReceivingStream::DeviceDescriptor(device) => {
                let xml = build_device_description(&device, ctx.registry().namespace());
                StreamOutcome::new(descriptor_response(xml.map_err(|e| e.to_string()), server))
            }
            ReceivingStream::ServiceDescriptor(service) => {
                let xml = build_scpd(service.service());
                StreamOutcome::new(descriptor_response(xml.map_err(|e| e.to_string()), server))
            }
            ReceivingStream::Action(service) => StreamOutcome::new(handle_action(&service, &request, server).await),
            ReceivingStream::Subscribe(service) => handle_subscribe(ctx, service, &request),
            ReceivingStream::Unsubscribe(service) => {
                let status = match parse_unsubscribe(&request) {
                    Ok(sid) if service.publisher().remove(&sid).is_some() => 200,
                    Ok(sid) => {
                        debug!(sid = %sid, "UNSUBSCRIBE for an unknown subscription");
                        412
                    }
                    Err(status) => status,
                };
                StreamOutcome::new(StreamResponseMessage::new(status).with_header(HeaderType::Server, server))
            }
            ReceivingStream::Event(subscription) => {
                let status = match IncomingEventRequest::parse(&request) {
                    Ok(event) => {
                        if subscription
                            .receive_event(&event.sid, event.seq, &event.properties)
                            .await
                        {
                            200
                        } else {
                            412
                        }
                    }
                    Err(status) => {
                        warn!(callback = %subscription.callback_id(), status, "❌ Malformed NOTIFY");
                        status
                    }
                };
                StreamOutcome::new(StreamResponseMessage::new(status))
            }
        }
    }
}

fn descriptor_response(xml: Result<String, String>, server: &str) -> StreamResponseMessage {
    match xml {
        Ok(xml) => StreamResponseMessage::ok()
            .with_header(HeaderType::Server, server)
            .with_body(CONTENT_TYPE_XML, xml),
        Err(e) => {
            warn!("❌ Cannot write descriptor: {}", e);
            StreamResponseMessage::new(500).with_header(HeaderType::Server, server)
        }
    }
}

/// Contrôle SOAP : résolution, exécution par le service local, réponse
/// ou faute.
async fn handle_action(service: &LocalService, request: &StreamRequestMessage, server: &str) -> StreamResponseMessage {
    let IncomingActionRequest { header, mut invocation } = match IncomingActionRequest::parse(request, service.service()) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(service = %service.service_id(), code = e.code.code(), "❌ Rejected action request: {}", e);
            return OutgoingActionResponse::failure(&e, server);
        }
    };

    service.execute(&mut invocation).await;
    match invocation.failure() {
        Some(e) => OutgoingActionResponse::failure(e, server),
        None => {
            let service_type = header
                .service_type
                .as_ref()
                .unwrap_or_else(|| service.service_type());
            OutgoingActionResponse::success(&invocation, service_type, server)
        }
    }
}

/// SUBSCRIBE : nouvel abonné ou renouvellement.
///
/// L'événement initial part après la réponse, pour que l'abonné
/// connaisse son SID avant de recevoir le premier NOTIFY.
fn handle_subscribe(ctx: &Arc<ProtocolContext>, service: Arc<LocalService>, request: &StreamRequestMessage) -> StreamOutcome {
    let server = ctx.server_header();
    let default_duration = ctx.settings().subscription_duration;
    let publisher = service.publisher().clone();

    let rejected = |status: u16| StreamOutcome::new(StreamResponseMessage::new(status).with_header(HeaderType::Server, server));

    match IncomingSubscribeRequest::parse(request) {
        Err(status) => rejected(status),
        Ok(IncomingSubscribeRequest::Renew { sid, timeout }) => match publisher.renew(&sid, timeout, default_duration) {
            Ok(subscription) => StreamOutcome::new(subscribe_response(subscription.sid(), subscription.timeout_header(), server)),
            Err(e) => {
                debug!(sid = %sid, "Renewal refused: {}", e);
                rejected(412)
            }
        },
        Ok(IncomingSubscribeRequest::Subscribe { callbacks, timeout }) => {
            match publisher.add_subscription(callbacks, timeout, default_duration) {
                Ok(subscription) => {
                    let response = subscribe_response(subscription.sid(), subscription.timeout_header(), server);
                    let initial_event: DeferredTask = Box::pin(async move {
                        publisher
                            .send_initial_event(&subscription, service.evented_values())
                            .await;
                    });
                    StreamOutcome::new(response).then(initial_event)
                }
                Err(e) => {
                    debug!(service = %service.service_id(), "Subscription refused: {}", e);
                    rejected(412)
                }
            }
        }
    }
}

/// Protocole choisi pour un datagramme SSDP.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceivingDatagram {
    /// `ssdp:alive` ou réponse à une recherche
    Advertisement { udn: Udn, location: Url, max_age: u32 },
    ByeBye(Udn),
    Search { st: String, mx: u32, from: SocketAddr },
}

impl ReceivingDatagram {
    pub async fn run(self, ctx: &Arc<ProtocolContext>) {
        match self {
            ReceivingDatagram::Advertisement { udn, location, max_age } => {
                discovery::handle_advertisement(ctx, udn, location, max_age).await
            }
            ReceivingDatagram::ByeBye(udn) => discovery::handle_byebye(ctx, &udn),
            ReceivingDatagram::Search { st, mx, from } => discovery::answer_search(ctx, &st, mx, from).await,
        }
    }
}
