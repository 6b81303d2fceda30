//! Protocoles sortants : action SOAP, échanges GENA et récupération des
//! descriptions distantes.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use crate::{
    actions::{ActionError, ActionInvocation},
    descriptor::{DescriptorError, build_remote_device, parse_device_description, parse_scpd},
    devices::RemoteDevice,
    gena::{RemoteGenaSubscription, SubscriptionError},
    message::{
        HeaderType, StreamRequestMessage, UpnpMethod,
        action::{IncomingActionResponse, OutgoingActionRequest},
        gena::{IncomingSubscribeResponse, OutgoingSubscribeRequest},
    },
    protocol::ProtocolContext,
    services::{DeviceService, RemoteService},
};

/// Invoque une action sur un service distant.
///
/// Une erreur de transport (délai dépassé, connexion refusée) est un
/// échec non récupérable `ACTION_FAILED` ; aucune nouvelle tentative.
pub async fn send_action(
    ctx: &ProtocolContext,
    service: &RemoteService,
    invocation: &mut ActionInvocation,
) -> Result<(), ActionError> {
    let request = OutgoingActionRequest::build(
        invocation,
        service.service_type(),
        service.control_url(),
        Some(ctx.user_agent()),
    )?;
    debug!(
        action = %invocation.action().name(),
        url = %service.control_url(),
        "📤 Sending action request"
    );

    let response = ctx.client().send(request).await.map_err(|e| {
        ActionError::action_failed(format!("Non-recoverable transport failure: {}", e))
    })?;
    IncomingActionResponse::new(response).read_into(invocation)
}

async fn fetch(ctx: &ProtocolContext, url: &Url) -> Result<String, DescriptorError> {
    let request = StreamRequestMessage::new(UpnpMethod::Get, url.as_str())
        .with_header(HeaderType::UserAgent, ctx.user_agent());
    let response = ctx
        .client()
        .send(request)
        .await
        .map_err(|e| DescriptorError::Retrieval {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    if !response.is_success() {
        return Err(DescriptorError::Retrieval {
            url: url.to_string(),
            reason: format!("HTTP {} {}", response.status, response.reason()),
        });
    }
    Ok(response.body.unwrap_or_default())
}

/// Récupère la description d'un périphérique distant puis ses SCPD.
///
/// Un SCPD illisible n'empêche pas l'enregistrement : le service est
/// conservé sans action ni variable.
pub async fn retrieve_remote_device(ctx: &ProtocolContext, location: &Url) -> Result<Arc<RemoteDevice>, DescriptorError> {
    let xml = fetch(ctx, location).await?;
    let description = parse_device_description(xml.as_bytes(), location)?;

    let mut scpds = HashMap::new();
    for sd in description.all_services() {
        if scpds.contains_key(&sd.scpd_url) {
            continue;
        }
        let parsed = match fetch(ctx, &sd.scpd_url).await {
            Ok(xml) => parse_scpd(xml.as_bytes(), sd.service_type.clone(), sd.service_id.clone()),
            Err(e) => Err(e),
        };
        match parsed {
            Ok(service) => {
                scpds.insert(sd.scpd_url.clone(), service);
            }
            Err(e) => warn!(service = %sd.service_id, url = %sd.scpd_url, "❌ Cannot read SCPD: {}", e),
        }
    }

    build_remote_device(&description, Some(location), &scpds)
}

fn callback_url(ctx: &ProtocolContext, subscription: &RemoteGenaSubscription) -> Result<Url, SubscriptionError> {
    let path = ctx.registry().namespace().callback_path(subscription.callback_id());
    ctx.local_url(&path)
        .ok_or_else(|| SubscriptionError::NoCallback(format!("{}{}", ctx.base_url(), path)))
}

/// SUBSCRIBE initial.
pub async fn send_subscribe(
    ctx: &ProtocolContext,
    subscription: &RemoteGenaSubscription,
) -> Result<IncomingSubscribeResponse, SubscriptionError> {
    let callback = callback_url(ctx, subscription)?;
    let service = subscription.service();
    let request = OutgoingSubscribeRequest::subscribe(
        service.event_url(),
        &[callback],
        subscription.requested_duration(),
        ctx.user_agent(),
    );
    debug!(url = %service.event_url(), "📤 Sending SUBSCRIBE");
    let response = ctx.client().send(request).await?;
    IncomingSubscribeResponse::parse(&response)
}

/// SUBSCRIBE de renouvellement ; le SID est conservé.
pub async fn send_renewal(
    ctx: &ProtocolContext,
    subscription: &RemoteGenaSubscription,
) -> Result<IncomingSubscribeResponse, SubscriptionError> {
    let sid = subscription.sid().ok_or(SubscriptionError::Ended)?;
    let service = subscription.service();
    let request = OutgoingSubscribeRequest::renew(
        service.event_url(),
        &sid,
        subscription.requested_duration(),
        ctx.user_agent(),
    );
    debug!(sid = %sid, "📤 Sending renewal");
    let response = ctx.client().send(request).await?;
    let renewed = IncomingSubscribeResponse::parse(&response)?;
    if renewed.sid != sid {
        return Err(SubscriptionError::InvalidResponse("SID"));
    }
    Ok(renewed)
}

/// UNSUBSCRIBE.
pub async fn send_unsubscribe(ctx: &ProtocolContext, subscription: &RemoteGenaSubscription) -> Result<(), SubscriptionError> {
    let sid = subscription.sid().ok_or(SubscriptionError::Ended)?;
    let request = OutgoingSubscribeRequest::unsubscribe(subscription.service().event_url(), &sid, ctx.user_agent());
    debug!(sid = %sid, "📤 Sending UNSUBSCRIBE");
    let response = ctx.client().send(request).await?;
    if !response.is_success() {
        return Err(SubscriptionError::Rejected {
            status: response.status,
        });
    }
    Ok(())
}
