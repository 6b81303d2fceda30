//! Abonnements sortants : un point de contrôle abonné à un service distant.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    gena::SubscriptionError,
    message::TimeoutHeader,
    services::{DeviceService, RemoteService},
    types::Sid,
    variable_types::{InvalidValueError, StateValue},
};

/// Délai minimal entre deux renouvellements d'un même abonnement.
pub const MIN_RENEWAL_DELAY: Duration = Duration::from_secs(1);

/// Raison de fin d'un abonnement.
#[derive(Debug, Clone, PartialEq)]
pub enum EndReason {
    /// UNSUBSCRIBE explicite
    Unsubscribed,
    /// Durée écoulée sans renouvellement
    Expired,
    /// Échec d'un renouvellement ou du transport
    Failed(String),
    /// Le périphérique a quitté le registre
    DeviceRemoved,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EndReason::Unsubscribed => f.write_str("unsubscribed"),
            EndReason::Expired => f.write_str("expired"),
            EndReason::Failed(reason) => write!(f, "failed: {}", reason),
            EndReason::DeviceRemoved => f.write_str("device removed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionState {
    SubscribeRequested,
    Established,
    Renewing,
    Ended(EndReason),
}

/// Position d'un numéro de séquence reçu par rapport au courant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    InOrder,
    /// Nombre d'événements sautés
    Missed(u32),
    /// Séquence déjà vue ou antérieure : l'événement est ignoré
    Stale,
}

/// Séquence suivante : 0 n'est utilisé que pour l'événement initial, et
/// après `u32::MAX` la séquence repart à 1.
pub fn next_sequence(seq: u32) -> u32 {
    if seq == u32::MAX { 1 } else { seq + 1 }
}

pub fn check_sequence(current: Option<u32>, received: u32) -> SequenceCheck {
    let Some(current) = current else {
        return SequenceCheck::InOrder;
    };
    let expected = next_sequence(current);
    if received == expected {
        SequenceCheck::InOrder
    } else if current == u32::MAX {
        if received == 0 {
            SequenceCheck::Stale
        } else {
            SequenceCheck::Missed(received - expected)
        }
    } else if received > current {
        SequenceCheck::Missed(received - expected)
    } else {
        SequenceCheck::Stale
    }
}

/// Notifications d'un abonnement sortant.
///
/// Exactement une issue terminale est signalée par abonnement :
/// `failed` si l'abonnement initial échoue, `ended` sinon.
pub trait SubscriptionCallback: Send + Sync {
    fn established(&self, _subscription: &RemoteGenaSubscription) {}

    fn event_received(&self, _subscription: &RemoteGenaSubscription, _values: &[(String, StateValue)]) {}

    fn events_missed(&self, _subscription: &RemoteGenaSubscription, _count: u32) {}

    /// Valeur reçue non conforme au type de sa variable
    fn invalid_message(&self, _subscription: &RemoteGenaSubscription, _error: &InvalidValueError) {}

    fn failed(&self, _subscription: &RemoteGenaSubscription, _error: &SubscriptionError) {}

    fn ended(&self, _subscription: &RemoteGenaSubscription, _reason: &EndReason) {}
}

#[derive(Debug)]
struct RemoteSubscriptionState {
    sid: Option<Sid>,
    actual_duration: Option<Duration>,
    last_renewed: Instant,
    state: SubscriptionState,
    current_sequence: Option<u32>,
    missed_events: u64,
    values: HashMap<String, StateValue>,
}

/// Abonnement GENA tenu par le point de contrôle.
pub struct RemoteGenaSubscription {
    service: Arc<RemoteService>,
    callback_id: String,
    requested_duration: TimeoutHeader,
    state: Mutex<RemoteSubscriptionState>,
    /// Sérialise les échanges et les livraisons d'un même abonnement
    delivery: tokio::sync::Mutex<()>,
    terminated: AtomicBool,
    callback: Arc<dyn SubscriptionCallback>,
}

impl fmt::Debug for RemoteGenaSubscription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RemoteGenaSubscription")
            .field("service", &self.service.reference())
            .field("callback_id", &self.callback_id)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl RemoteGenaSubscription {
    pub fn new(
        service: Arc<RemoteService>,
        requested_duration: TimeoutHeader,
        callback: Arc<dyn SubscriptionCallback>,
    ) -> Self {
        Self {
            service,
            callback_id: uuid::Uuid::new_v4().simple().to_string(),
            requested_duration,
            state: Mutex::new(RemoteSubscriptionState {
                sid: None,
                actual_duration: None,
                last_renewed: Instant::now(),
                state: SubscriptionState::SubscribeRequested,
                current_sequence: None,
                missed_events: 0,
                values: HashMap::new(),
            }),
            delivery: tokio::sync::Mutex::new(()),
            terminated: AtomicBool::new(false),
            callback,
        }
    }

    pub fn service(&self) -> &Arc<RemoteService> {
        &self.service
    }

    /// Identifiant de l'URL de rappel (`/cb/<id>`)
    pub fn callback_id(&self) -> &str {
        &self.callback_id
    }

    pub fn requested_duration(&self) -> TimeoutHeader {
        self.requested_duration
    }

    pub fn sid(&self) -> Option<Sid> {
        self.state.lock().sid.clone()
    }

    pub fn state(&self) -> SubscriptionState {
        self.state.lock().state.clone()
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.state.lock().state,
            SubscriptionState::Established | SubscriptionState::Renewing
        )
    }

    pub fn current_sequence(&self) -> Option<u32> {
        self.state.lock().current_sequence
    }

    pub fn missed_events(&self) -> u64 {
        self.state.lock().missed_events
    }

    pub fn actual_duration(&self) -> Option<Duration> {
        self.state.lock().actual_duration
    }

    /// Dernières valeurs reçues pour les variables évènementielles
    pub fn current_values(&self) -> HashMap<String, StateValue> {
        self.state.lock().values.clone()
    }

    /// Verrou d'échange : tenu pendant SUBSCRIBE/RENEW, et pendant chaque
    /// livraison d'événement.
    pub(crate) async fn lock_exchange(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.delivery.lock().await
    }

    /// Abonnement accepté par le service distant.
    pub(crate) fn establish(&self, sid: Sid, timeout: TimeoutHeader, default_duration: Duration) {
        {
            let mut st = self.state.lock();
            st.sid = Some(sid.clone());
            st.actual_duration = Some(
                timeout
                    .seconds()
                    .map(|s| Duration::from_secs(s as u64))
                    .unwrap_or(default_duration),
            );
            st.last_renewed = Instant::now();
            st.state = SubscriptionState::Established;
        }
        info!(sid = %sid, service = ?self.service.reference(), "✅ Subscription established");
        self.callback.established(self);
    }

    pub(crate) fn begin_renewal(&self) -> bool {
        let mut st = self.state.lock();
        if st.state != SubscriptionState::Established {
            return false;
        }
        st.state = SubscriptionState::Renewing;
        true
    }

    /// Renouvellement accepté : seule la durée change.
    pub(crate) fn renewed(&self, timeout: TimeoutHeader, default_duration: Duration) {
        let mut st = self.state.lock();
        if st.state != SubscriptionState::Renewing {
            return;
        }
        st.actual_duration = Some(
            timeout
                .seconds()
                .map(|s| Duration::from_secs(s as u64))
                .unwrap_or(default_duration),
        );
        st.last_renewed = Instant::now();
        st.state = SubscriptionState::Established;
        debug!(sid = ?st.sid, "♻️ Subscription renewed");
    }

    /// Le renouvellement doit partir si la fin est à moins de `margin`.
    pub fn renewal_due(&self, now: Instant, margin: Duration) -> bool {
        let st = self.state.lock();
        if st.state != SubscriptionState::Established {
            return false;
        }
        match st.actual_duration {
            Some(d) => now + margin >= st.last_renewed + d,
            None => false,
        }
    }

    /// Échéance du prochain renouvellement ; `None` hors de l'état établi.
    ///
    /// Si la marge dépasse la durée accordée, le renouvellement part à
    /// mi-durée, jamais moins de [`MIN_RENEWAL_DELAY`] après le précédent.
    pub fn renewal_at(&self, margin: Duration) -> Option<Instant> {
        let st = self.state.lock();
        if st.state != SubscriptionState::Established {
            return None;
        }
        let duration = st.actual_duration?;
        let lead = if margin < duration { duration - margin } else { duration / 2 };
        Some(st.last_renewed + lead.max(MIN_RENEWAL_DELAY))
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        let st = self.state.lock();
        match (&st.state, st.actual_duration) {
            (SubscriptionState::Established | SubscriptionState::Renewing, Some(d)) => {
                now > st.last_renewed + d
            }
            _ => false,
        }
    }

    /// Traite un NOTIFY reçu.
    ///
    /// Retourne `false` si l'événement ne correspond pas à cet abonnement
    /// (SID différent ou abonnement terminé).
    pub async fn receive_event(&self, sid: &Sid, seq: u32, properties: &[(String, String)]) -> bool {
        let _exchange = self.delivery.lock().await;

        let check = {
            let st = self.state.lock();
            if st.sid.as_ref() != Some(sid) || matches!(st.state, SubscriptionState::Ended(_)) {
                return false;
            }
            check_sequence(st.current_sequence, seq)
        };

        match check {
            SequenceCheck::Stale => {
                debug!(sid = %sid, seq, "Ignoring stale event");
                return true;
            }
            SequenceCheck::Missed(count) => {
                warn!(sid = %sid, seq, count, "⚠️ Events missed");
                self.state.lock().missed_events += count as u64;
                self.callback.events_missed(self, count);
            }
            SequenceCheck::InOrder => {}
        }

        let model = self.service.service();
        let mut values = Vec::with_capacity(properties.len());
        for (name, text) in properties {
            let Some(variable) = model.state_variable(name) else {
                debug!(sid = %sid, variable = %name, "Event for undeclared variable");
                continue;
            };
            match variable.parse_value(text) {
                Ok(value) => values.push((name.clone(), value)),
                Err(e) => {
                    warn!(sid = %sid, variable = %name, "❌ Invalid evented value: {}", e);
                    self.callback.invalid_message(self, &e);
                }
            }
        }

        {
            let mut st = self.state.lock();
            st.current_sequence = Some(seq);
            for (name, value) in &values {
                st.values.insert(name.clone(), value.clone());
            }
        }
        self.callback.event_received(self, &values);
        true
    }

    fn take_terminal(&self) -> bool {
        !self.terminated.swap(true, Ordering::SeqCst)
    }

    /// Échec de l'abonnement initial ; sans effet si une issue terminale a
    /// déjà été signalée.
    pub(crate) fn fail(&self, error: &SubscriptionError) {
        if !self.take_terminal() {
            return;
        }
        self.state.lock().state = SubscriptionState::Ended(EndReason::Failed(error.to_string()));
        warn!(service = ?self.service.reference(), "❌ Subscription failed: {}", error);
        self.callback.failed(self, error);
    }

    /// Fin d'un abonnement établi ; sans effet si une issue terminale a
    /// déjà été signalée.
    pub(crate) fn end(&self, reason: EndReason) {
        if !self.take_terminal() {
            return;
        }
        let sid = {
            let mut st = self.state.lock();
            st.state = SubscriptionState::Ended(reason.clone());
            st.sid.clone()
        };
        match &reason {
            EndReason::Unsubscribed => info!(sid = ?sid, "👋 Subscription ended: {}", reason),
            _ => warn!(sid = ?sid, "Subscription ended: {}", reason),
        }
        self.callback.ended(self, &reason);
    }
}
