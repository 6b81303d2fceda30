//! # Point de contrôle
//!
//! Point d'entrée des appelants pour agir sur les services, locaux ou
//! distants :
//!
//! - [`ControlPoint::invoke`] / [`ControlPoint::execute`] : invocation
//!   d'action, avec un [`ActionCallback`] à usage unique pour la variante
//!   en tâche de fond ;
//! - [`ControlPoint::subscribe`] / [`ControlPoint::execute_subscription`] :
//!   abonnement GENA à un service distant, renouvelé automatiquement avant
//!   son expiration ;
//! - [`ControlPoint::search`] : M-SEARCH.
//!
//! Chaque invocation et chaque abonnement reçoit exactement une issue
//! terminale.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    actions::{ActionError, ActionInvocation},
    gena::{EndReason, RemoteGenaSubscription, SubscriptionCallback, SubscriptionError},
    message::TimeoutHeader,
    protocol::{ProtocolContext, discovery, sending},
    registry::Registry,
    services::{DeviceService, RemoteService, ServiceHandle},
    transport::StreamClientError,
};

/// Issue d'une invocation lancée par [`ControlPoint::execute`].
///
/// Exactement une des deux méthodes est appelée, une seule fois.
pub trait ActionCallback: Send + 'static {
    fn success(self: Box<Self>, invocation: ActionInvocation);

    fn failure(self: Box<Self>, invocation: ActionInvocation, error: ActionError);
}

/// Retire l'abonnement du registre si l'échange initial est abandonné
/// avant son issue.
struct SubscribeRollback<'a> {
    registry: &'a Registry,
    subscription: &'a RemoteGenaSubscription,
    armed: bool,
}

impl SubscribeRollback<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for SubscribeRollback<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.registry.remove_remote_subscription(self.subscription.callback_id());
        self.subscription
            .fail(&SubscriptionError::Transport(StreamClientError::Cancelled {
                url: self.subscription.service().event_url().to_string(),
            }));
    }
}

#[derive(Clone)]
pub struct ControlPoint {
    context: Arc<ProtocolContext>,
    /// Tâches de renouvellement, par identifiant de rappel
    renewals: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl ControlPoint {
    pub fn new(context: Arc<ProtocolContext>) -> Self {
        Self {
            context,
            renewals: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.context.registry()
    }

    // ----- actions -----

    /// Invoque l'action sur le service et renseigne l'invocation.
    ///
    /// Un service local est exécuté en place ; un service distant reçoit
    /// un POST SOAP. En cas d'échec, l'erreur est aussi attachée à
    /// l'invocation.
    pub async fn invoke(&self, invocation: &mut ActionInvocation, service: &ServiceHandle) -> Result<(), ActionError> {
        if let Err(e) = invocation.action().validate().and_then(|_| invocation.check_inputs()) {
            invocation.set_failure(e.clone());
            return Err(e);
        }

        match service {
            ServiceHandle::Local(local) => local.execute(invocation).await,
            ServiceHandle::Remote(remote) => {
                if let Err(e) = sending::send_action(&self.context, remote, invocation).await {
                    invocation.set_failure(e);
                }
            }
        }

        match invocation.failure() {
            Some(e) => {
                debug!(action = %invocation.action().name(), "Action invocation failed: {}", e);
                Err(e.clone())
            }
            None => Ok(()),
        }
    }

    /// Lance l'invocation dans une tâche et rapporte son issue à
    /// `callback`.
    pub fn execute(
        &self,
        mut invocation: ActionInvocation,
        service: ServiceHandle,
        callback: Box<dyn ActionCallback>,
    ) -> JoinHandle<()> {
        let control_point = self.clone();
        tokio::spawn(async move {
            match control_point.invoke(&mut invocation, &service).await {
                Ok(()) => callback.success(invocation),
                Err(e) => callback.failure(invocation, e),
            }
        })
    }

    // ----- abonnements -----

    /// Abonne le point de contrôle à un service distant.
    ///
    /// L'abonnement est enregistré avant l'échange pour que son URL de
    /// rappel existe dès la réponse ; un échec ou un abandon le retire.
    pub async fn subscribe(
        &self,
        service: Arc<RemoteService>,
        callback: Arc<dyn SubscriptionCallback>,
    ) -> Result<Arc<RemoteGenaSubscription>, SubscriptionError> {
        let settings = self.context.settings();
        let requested = TimeoutHeader::Seconds(u32::try_from(settings.subscription_duration.as_secs()).unwrap_or(u32::MAX));
        let subscription = Arc::new(RemoteGenaSubscription::new(service, requested, callback));
        let registry = self.context.registry();

        if let Err(e) = registry.add_remote_subscription(subscription.clone()) {
            let error = SubscriptionError::NoCallback(e.to_string());
            subscription.fail(&error);
            return Err(error);
        }
        let mut rollback = SubscribeRollback {
            registry,
            subscription: &subscription,
            armed: true,
        };

        let exchange = subscription.lock_exchange().await;
        let outcome = sending::send_subscribe(&self.context, &subscription).await;
        match outcome {
            Ok(response) => {
                subscription.establish(response.sid, response.timeout, settings.subscription_duration);
                rollback.disarm();
                drop(exchange);
                drop(rollback);
                self.spawn_renewal(subscription.clone());
                Ok(subscription)
            }
            Err(e) => {
                rollback.disarm();
                drop(exchange);
                drop(rollback);
                registry.remove_remote_subscription(subscription.callback_id());
                subscription.fail(&e);
                Err(e)
            }
        }
    }

    /// Lance [`subscribe`](Self::subscribe) dans une tâche ; l'issue est
    /// rapportée au `SubscriptionCallback`.
    pub fn execute_subscription(
        &self,
        service: Arc<RemoteService>,
        callback: Arc<dyn SubscriptionCallback>,
    ) -> JoinHandle<Result<Arc<RemoteGenaSubscription>, SubscriptionError>> {
        let control_point = self.clone();
        tokio::spawn(async move { control_point.subscribe(service, callback).await })
    }

    fn spawn_renewal(&self, subscription: Arc<RemoteGenaSubscription>) {
        let id = subscription.callback_id().to_string();
        let context = self.context.clone();
        let renewals = self.renewals.clone();
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            renewal_loop(&context, &subscription).await;
            renewals.lock().remove(&task_id);
        });
        self.renewals.lock().insert(id, handle);
    }

    /// Met fin à un abonnement établi.
    ///
    /// L'abonnement se termine (`Unsubscribed`) même si l'UNSUBSCRIBE
    /// échoue ; l'erreur est retournée.
    pub async fn unsubscribe(&self, subscription: &Arc<RemoteGenaSubscription>) -> Result<(), SubscriptionError> {
        if !subscription.is_active() {
            return Err(SubscriptionError::Ended);
        }
        if let Some(renewal) = self.renewals.lock().remove(subscription.callback_id()) {
            renewal.abort();
        }
        self.context.registry().remove_remote_subscription(subscription.callback_id());

        let result = {
            let _exchange = subscription.lock_exchange().await;
            sending::send_unsubscribe(&self.context, subscription).await
        };
        if let Err(e) = &result {
            warn!(sid = ?subscription.sid(), "❌ UNSUBSCRIBE failed: {}", e);
        }
        subscription.end(EndReason::Unsubscribed);
        result
    }

    /// Désabonne tous les abonnements établis.
    pub async fn unsubscribe_all(&self) {
        let subscriptions = self.context.registry().remote_subscriptions();
        if subscriptions.is_empty() {
            return;
        }
        info!(count = subscriptions.len(), "👋 Ending outgoing subscriptions");
        join_all(subscriptions.iter().map(|s| self.unsubscribe(s))).await;
    }

    /// Arrête les renouvellements restants
    pub fn stop_renewals(&self) {
        for (_, renewal) in self.renewals.lock().drain() {
            renewal.abort();
        }
    }

    // ----- découverte -----

    /// Émet un M-SEARCH pour `st` (`ssdp:all`, type, `uuid:`…).
    pub async fn search(&self, st: &str) {
        discovery::send_search(&self.context, st, self.context.settings().search_mx).await;
    }
}

/// Renouvelle l'abonnement avant chaque échéance, jusqu'à sa fin.
///
/// Un renouvellement refusé ou sans réponse termine l'abonnement en
/// échec.
async fn renewal_loop(context: &ProtocolContext, subscription: &Arc<RemoteGenaSubscription>) {
    let margin = context.settings().renewal_margin;
    let default_duration = context.settings().subscription_duration;

    while let Some(at) = subscription.renewal_at(margin) {
        tokio::time::sleep_until(at).await;

        let _exchange = subscription.lock_exchange().await;
        if !subscription.begin_renewal() {
            break;
        }
        match sending::send_renewal(context, subscription).await {
            Ok(response) => subscription.renewed(response.timeout, default_duration),
            Err(e) => {
                warn!(
                    sid = ?subscription.sid(),
                    service = ?subscription.service().reference(),
                    "❌ Subscription renewal failed: {}", e
                );
                context.registry().remove_remote_subscription(subscription.callback_id());
                subscription.end(EndReason::Failed(e.to_string()));
                break;
            }
        }
    }
}
