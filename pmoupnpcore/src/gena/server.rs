//! Abonnements entrants : abonnés distants d'un service local.
//!
//! Chaque service local possède un [`LocalEventPublisher`] qui tient ses
//! abonnés, modère les changements (`maximumRate`, `minimumDelta`) et
//! livre les NOTIFY. Chaque abonné a son propre compteur de séquence et sa
//! propre file de livraison : un abonné injoignable ne retarde pas les
//! autres.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::{
    gena::{SubscriptionError, client::next_sequence},
    message::{TimeoutHeader, gena::OutgoingEventRequest},
    registry::DeferredTask,
    state_variables::StateVariable,
    transport::StreamClient,
    types::{ServiceId, Sid},
    variable_types::StateValue,
};

#[derive(Debug)]
struct LocalSubscriptionState {
    actual_duration: Duration,
    last_renewed: Instant,
    /// L'instantané de l'événement initial va être lu
    initial_event_started: bool,
    initial_event_sent: bool,
    /// Changements publiés pendant l'envoi de l'événement initial
    backlog: Vec<(String, String)>,
}

#[derive(Debug)]
struct DeliveryState {
    next_sequence: u32,
    consecutive_failures: u32,
}

/// Abonné distant d'un service local.
pub struct LocalGenaSubscription {
    sid: Sid,
    callbacks: Vec<Url>,
    state: Mutex<LocalSubscriptionState>,
    delivery: tokio::sync::Mutex<DeliveryState>,
}

impl fmt::Debug for LocalGenaSubscription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LocalGenaSubscription")
            .field("sid", &self.sid)
            .field("callbacks", &self.callbacks)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl LocalGenaSubscription {
    fn new(callbacks: Vec<Url>, duration: Duration) -> Self {
        Self {
            sid: Sid::generate(),
            callbacks,
            state: Mutex::new(LocalSubscriptionState {
                actual_duration: duration,
                last_renewed: Instant::now(),
                initial_event_started: false,
                initial_event_sent: false,
                backlog: Vec::new(),
            }),
            delivery: tokio::sync::Mutex::new(DeliveryState {
                next_sequence: 0,
                consecutive_failures: 0,
            }),
        }
    }

    pub fn sid(&self) -> &Sid {
        &self.sid
    }

    pub fn callbacks(&self) -> &[Url] {
        &self.callbacks
    }

    pub fn actual_duration(&self) -> Duration {
        self.state.lock().actual_duration
    }

    /// Valeur de l'en-tête TIMEOUT renvoyée à l'abonné
    pub fn timeout_header(&self) -> TimeoutHeader {
        TimeoutHeader::Seconds(self.actual_duration().as_secs().min(u32::MAX as u64) as u32)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        let st = self.state.lock();
        now > st.last_renewed + st.actual_duration
    }

    pub fn initial_event_sent(&self) -> bool {
        self.state.lock().initial_event_sent
    }

    /// Prend en compte un changement publié. Retourne `true` s'il doit
    /// être livré tout de suite ; pendant l'événement initial il est mis
    /// en attente, avant il figurera dans l'instantané.
    fn accept_change(&self, values: &[(String, String)]) -> bool {
        let mut st = self.state.lock();
        if st.initial_event_sent {
            return true;
        }
        if st.initial_event_started {
            for (name, value) in values {
                match st.backlog.iter_mut().find(|(n, _)| n == name) {
                    Some(entry) => entry.1 = value.clone(),
                    None => st.backlog.push((name.clone(), value.clone())),
                }
            }
        }
        false
    }

    /// Vide l'attente ; sans rien en attente l'événement initial est
    /// considéré comme terminé.
    fn take_backlog(&self) -> Option<Vec<(String, String)>> {
        let mut st = self.state.lock();
        if st.backlog.is_empty() {
            st.initial_event_sent = true;
            None
        } else {
            Some(std::mem::take(&mut st.backlog))
        }
    }

    /// Séquence du prochain NOTIFY
    pub async fn next_sequence(&self) -> u32 {
        self.delivery.lock().await.next_sequence
    }

    fn renew(&self, duration: Duration) {
        let mut st = self.state.lock();
        st.actual_duration = duration;
        st.last_renewed = Instant::now();
    }

    /// Livre un NOTIFY en essayant les URL de rappel dans l'ordre.
    ///
    /// La séquence avance à chaque tentative, réussie ou non. Retourne le
    /// nombre d'échecs consécutifs après cette livraison.
    async fn deliver(&self, client: &dyn StreamClient, values: &[(String, String)]) -> u32 {
        let mut delivery = self.delivery.lock().await;
        let seq = delivery.next_sequence;
        delivery.next_sequence = next_sequence(seq);

        let mut delivered = false;
        for callback in &self.callbacks {
            let request = OutgoingEventRequest::build(callback, &self.sid, seq, values);
            match client.send(request).await {
                Ok(response) if response.is_success() => {
                    trace!(sid = %self.sid, seq, callback = %callback, "📤 Event delivered");
                    delivered = true;
                    break;
                }
                Ok(response) => {
                    debug!(sid = %self.sid, seq, callback = %callback, status = response.status, "Event refused by subscriber");
                }
                Err(e) => {
                    debug!(sid = %self.sid, seq, callback = %callback, "Event delivery failed: {}", e);
                }
            }
        }

        if delivered {
            delivery.consecutive_failures = 0;
        } else {
            delivery.consecutive_failures += 1;
            warn!(
                sid = %self.sid,
                seq,
                failures = delivery.consecutive_failures,
                "❌ Event could not be delivered to any callback"
            );
        }
        delivery.consecutive_failures
    }
}

#[derive(Default)]
struct Moderation {
    last_sent: HashMap<String, (Instant, StateValue)>,
    pending: HashMap<String, StateValue>,
}

struct PublisherTransport {
    client: Arc<dyn StreamClient>,
    max_failures: u32,
}

/// Abonnés et livraison des événements d'un service local.
pub struct LocalEventPublisher {
    service_id: ServiceId,
    evented: HashMap<String, Arc<StateVariable>>,
    subscriptions: RwLock<HashMap<Sid, Arc<LocalGenaSubscription>>>,
    moderation: Mutex<Moderation>,
    transport: OnceCell<PublisherTransport>,
}

impl fmt::Debug for LocalEventPublisher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LocalEventPublisher")
            .field("service_id", &self.service_id)
            .field("subscriptions", &self.subscriptions.read().len())
            .finish()
    }
}

impl LocalEventPublisher {
    pub fn new<'a>(service_id: ServiceId, variables: impl IntoIterator<Item = &'a Arc<StateVariable>>) -> Self {
        let evented = variables
            .into_iter()
            .filter(|v| v.send_events())
            .map(|v| (v.name().to_string(), v.clone()))
            .collect();
        Self {
            service_id,
            evented,
            subscriptions: RwLock::new(HashMap::new()),
            moderation: Mutex::new(Moderation::default()),
            transport: OnceCell::new(),
        }
    }

    /// Branche le client HTTP utilisé pour les NOTIFY. Seul le premier
    /// appel est pris en compte.
    pub fn attach(&self, client: Arc<dyn StreamClient>, max_failures: u32) {
        let _ = self.transport.set(PublisherTransport {
            client,
            max_failures: max_failures.max(1),
        });
    }

    pub fn is_attached(&self) -> bool {
        self.transport.get().is_some()
    }

    pub fn has_evented_variables(&self) -> bool {
        !self.evented.is_empty()
    }

    /// Enregistre un nouvel abonné.
    ///
    /// Sans TIMEOUT, ou avec `infinite`, la durée par défaut s'applique.
    pub fn add_subscription(
        &self,
        callbacks: Vec<Url>,
        requested: Option<TimeoutHeader>,
        default_duration: Duration,
    ) -> Result<Arc<LocalGenaSubscription>, SubscriptionError> {
        if self.evented.is_empty() {
            return Err(SubscriptionError::NotEvented);
        }
        if callbacks.is_empty() {
            return Err(SubscriptionError::NoCallback(self.service_id.to_string()));
        }
        let duration = Self::granted_duration(requested, default_duration);
        let subscription = Arc::new(LocalGenaSubscription::new(callbacks, duration));
        self.subscriptions
            .write()
            .insert(subscription.sid.clone(), subscription.clone());
        info!(
            sid = %subscription.sid,
            service = %self.service_id,
            duration = duration.as_secs(),
            "✅ New event subscriber"
        );
        Ok(subscription)
    }

    pub fn renew(
        &self,
        sid: &Sid,
        requested: Option<TimeoutHeader>,
        default_duration: Duration,
    ) -> Result<Arc<LocalGenaSubscription>, SubscriptionError> {
        let subscription = self
            .subscription(sid)
            .ok_or_else(|| SubscriptionError::UnknownSubscription(sid.clone()))?;
        subscription.renew(Self::granted_duration(requested, default_duration));
        info!(sid = %sid, service = %self.service_id, "♻️ Subscription renewed");
        Ok(subscription)
    }

    pub fn remove(&self, sid: &Sid) -> Option<Arc<LocalGenaSubscription>> {
        let removed = self.subscriptions.write().remove(sid);
        if removed.is_some() {
            info!(sid = %sid, service = %self.service_id, "👋 Subscriber removed");
        }
        removed
    }

    pub fn subscription(&self, sid: &Sid) -> Option<Arc<LocalGenaSubscription>> {
        self.subscriptions.read().get(sid).cloned()
    }

    pub fn subscriptions(&self) -> Vec<Arc<LocalGenaSubscription>> {
        self.subscriptions.read().values().cloned().collect()
    }

    /// Retire tous les abonnés (arrêt du service ou du périphérique)
    pub fn end_all(&self) -> Vec<Arc<LocalGenaSubscription>> {
        let removed: Vec<_> = self.subscriptions.write().drain().map(|(_, s)| s).collect();
        if !removed.is_empty() {
            info!(service = %self.service_id, count = removed.len(), "👋 All subscribers removed");
        }
        removed
    }

    fn granted_duration(requested: Option<TimeoutHeader>, default_duration: Duration) -> Duration {
        match requested.and_then(|t| t.seconds()) {
            Some(seconds) if seconds > 0 => Duration::from_secs(seconds as u64),
            _ => default_duration,
        }
    }

    /// Envoie l'événement initial (SEQ 0) avec toutes les valeurs
    /// évènementielles courantes.
    ///
    /// `snapshot` n'est lu qu'une fois l'abonné marqué : un changement
    /// publié ensuite est retenu puis livré après SEQ 0, un changement
    /// antérieur figure dans l'instantané.
    pub async fn send_initial_event<F>(&self, subscription: &Arc<LocalGenaSubscription>, snapshot: F)
    where
        F: Future<Output = Vec<(String, String)>>,
    {
        let Some(transport) = self.transport.get() else {
            debug!(sid = %subscription.sid, "Publisher not attached, initial event skipped");
            return;
        };
        subscription.state.lock().initial_event_started = true;
        let values = snapshot.await;
        let mut failures = subscription.deliver(transport.client.as_ref(), &values).await;
        while failures < transport.max_failures {
            let Some(backlog) = subscription.take_backlog() else {
                break;
            };
            trace!(sid = %subscription.sid, variables = backlog.len(), "Delivering changes held during initial event");
            failures = subscription.deliver(transport.client.as_ref(), &backlog).await;
        }
        if failures >= transport.max_failures {
            warn!(sid = %subscription.sid, failures, "❌ Subscriber unreachable, ending subscription");
            self.remove(&subscription.sid);
        }
    }

    /// Publie des changements de variables à tous les abonnés actifs.
    ///
    /// Les variables non évènementielles sont ignorées. Les changements
    /// retenus par `maximumRate` partent lors d'un passage de maintenance
    /// ultérieur.
    pub async fn publish(&self, changes: Vec<(String, StateValue)>) {
        let values = self.moderate(Instant::now(), changes);
        if values.is_empty() {
            return;
        }
        self.deliver_all(&values).await;
    }

    async fn deliver_all(&self, values: &[(String, StateValue)]) {
        let Some(transport) = self.transport.get() else {
            debug!(service = %self.service_id, "Publisher not attached, events dropped");
            return;
        };
        let texts: Vec<(String, String)> = values
            .iter()
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect();
        let targets: Vec<_> = self
            .subscriptions()
            .into_iter()
            .filter(|s| s.accept_change(&texts))
            .collect();
        if targets.is_empty() {
            return;
        }

        debug!(
            service = %self.service_id,
            subscribers = targets.len(),
            variables = texts.len(),
            "📡 Publishing state changes"
        );
        let results = join_all(targets.iter().map(|s| {
            let texts = &texts;
            async move { (s, s.deliver(transport.client.as_ref(), texts).await) }
        }))
        .await;

        for (subscription, failures) in results {
            if failures >= transport.max_failures {
                warn!(sid = %subscription.sid, failures, "❌ Subscriber unreachable, ending subscription");
                self.remove(&subscription.sid);
            }
        }
    }

    /// Applique `minimumDelta` et `maximumRate` ; retourne les valeurs à
    /// envoyer immédiatement.
    fn moderate(&self, now: Instant, changes: Vec<(String, StateValue)>) -> Vec<(String, StateValue)> {
        let mut guard = self.moderation.lock();
        let moderation = &mut *guard;
        let mut out = Vec::new();
        for (name, value) in changes {
            let Some(variable) = self.evented.get(&name) else {
                trace!(variable = %name, "Variable is not evented");
                continue;
            };
            let events = variable.events();
            if let Some((sent_at, last)) = moderation.last_sent.get(&name) {
                if let (Some(delta), Some(new), Some(old)) = (events.min_delta, value.as_f64(), last.as_f64()) {
                    if (new - old).abs() < delta {
                        continue;
                    }
                }
                if let Some(rate) = events.max_rate {
                    if now < *sent_at + rate {
                        moderation.pending.insert(name, value);
                        continue;
                    }
                }
            }
            moderation.pending.remove(&name);
            moderation.last_sent.insert(name.clone(), (now, value.clone()));
            out.push((name, value));
        }
        out
    }

    /// Valeurs retenues dont la fenêtre `maximumRate` est écoulée.
    fn due_pending(&self, now: Instant) -> Vec<(String, StateValue)> {
        let mut guard = self.moderation.lock();
        let moderation = &mut *guard;
        let due: Vec<String> = moderation
            .pending
            .keys()
            .filter(|name| {
                let rate = self.evented.get(*name).and_then(|v| v.events().max_rate);
                match (moderation.last_sent.get(*name), rate) {
                    (Some((sent_at, _)), Some(rate)) => now >= *sent_at + rate,
                    _ => true,
                }
            })
            .cloned()
            .collect();
        let mut out = Vec::with_capacity(due.len());
        for name in due {
            if let Some(value) = moderation.pending.remove(&name) {
                moderation.last_sent.insert(name.clone(), (now, value.clone()));
                out.push((name, value));
            }
        }
        out
    }

    /// Passage de maintenance : retire les abonnés expirés et prépare
    /// l'envoi des changements modérés arrivés à échéance.
    pub fn maintain(self: &Arc<Self>, now: Instant) -> Vec<DeferredTask> {
        let expired: Vec<Sid> = self
            .subscriptions
            .read()
            .values()
            .filter(|s| s.is_expired(now))
            .map(|s| s.sid.clone())
            .collect();
        for sid in expired {
            if self.subscriptions.write().remove(&sid).is_some() {
                info!(sid = %sid, service = %self.service_id, "⌛ Subscriber expired");
            }
        }

        let due = self.due_pending(now);
        if due.is_empty() {
            return Vec::new();
        }
        let this = self.clone();
        let flush: DeferredTask = Box::pin(async move { this.deliver_all(&due).await });
        vec![flush]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        message::{HeaderType, StreamRequestMessage, StreamResponseMessage},
        transport::StreamClientError,
        variable_types::StateVarType,
    };
    use async_trait::async_trait;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<StreamRequestMessage>>,
        failing_host: Option<&'static str>,
        latency: Option<Duration>,
    }

    #[async_trait]
    impl StreamClient for Recorder {
        async fn send(&self, request: StreamRequestMessage) -> Result<StreamResponseMessage, StreamClientError> {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            let fail = self.failing_host.is_some_and(|h| request.uri.contains(h));
            self.sent.lock().push(request.clone());
            if fail {
                Err(StreamClientError::Connection {
                    url: request.uri,
                    reason: "refused".into(),
                })
            } else {
                Ok(StreamResponseMessage::ok())
            }
        }
    }

    fn publisher() -> Arc<LocalEventPublisher> {
        let vars = vec![
            Arc::new(StateVariable::new("Volume", StateVarType::UI2).with_events(true)),
            Arc::new(
                StateVariable::new("Position", StateVarType::UI4)
                    .with_events(true)
                    .with_max_rate(Duration::from_secs(1)),
            ),
            Arc::new(StateVariable::new("A_ARG_TYPE_Channel", StateVarType::String)),
        ];
        Arc::new(LocalEventPublisher::new(ServiceId::uda("RenderingControl"), vars.iter()))
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn seqs(recorder: &Recorder, host: &str) -> Vec<String> {
        recorder
            .sent
            .lock()
            .iter()
            .filter(|r| r.uri.contains(host))
            .filter_map(|r| r.header(HeaderType::Seq).map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn test_independent_sequences() {
        let recorder = Arc::new(Recorder::default());
        let publisher = publisher();
        publisher.attach(recorder.clone(), 3);

        let a = publisher
            .add_subscription(vec![url("http://a:1/cb")], None, Duration::from_secs(300))
            .unwrap();
        publisher
            .send_initial_event(&a, async { vec![("Volume".into(), "1".into())] })
            .await;
        publisher.publish(vec![("Volume".into(), StateValue::UI2(2))]).await;

        let b = publisher
            .add_subscription(vec![url("http://b:1/cb")], None, Duration::from_secs(300))
            .unwrap();
        publisher
            .send_initial_event(&b, async { vec![("Volume".into(), "2".into())] })
            .await;
        publisher.publish(vec![("Volume".into(), StateValue::UI2(3))]).await;

        assert_eq!(seqs(&recorder, "http://a:1"), vec!["0", "1", "2"]);
        assert_eq!(seqs(&recorder, "http://b:1"), vec!["0", "1"]);
    }

    fn bodies(recorder: &Recorder) -> Vec<(String, String)> {
        recorder
            .sent
            .lock()
            .iter()
            .map(|r| (r.header(HeaderType::Seq).unwrap_or_default().to_string(), r.body_str().to_string()))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_during_slow_initial_event_follows_it() {
        let recorder = Arc::new(Recorder {
            latency: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let publisher = publisher();
        publisher.attach(recorder.clone(), 3);
        let sub = publisher
            .add_subscription(vec![url("http://a:1/cb")], None, Duration::from_secs(300))
            .unwrap();

        let initial = {
            let (publisher, sub) = (publisher.clone(), sub.clone());
            tokio::spawn(async move {
                publisher
                    .send_initial_event(&sub, async { vec![("Volume".into(), "1".into())] })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        publisher.publish(vec![("Volume".into(), StateValue::UI2(2))]).await;
        initial.await.unwrap();

        let sent = bodies(&recorder);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "0");
        assert!(sent[0].1.contains("<Volume>1</Volume>"));
        assert_eq!(sent[1].0, "1");
        assert!(sent[1].1.contains("<Volume>2</Volume>"));
        assert!(sub.initial_event_sent());

        publisher.publish(vec![("Volume".into(), StateValue::UI2(3))]).await;
        assert_eq!(seqs(&recorder, "http://a:1"), vec!["0", "1", "2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_during_snapshot_read_follows_initial_event() {
        let recorder = Arc::new(Recorder::default());
        let publisher = publisher();
        publisher.attach(recorder.clone(), 3);
        let sub = publisher
            .add_subscription(vec![url("http://a:1/cb")], None, Duration::from_secs(300))
            .unwrap();

        let initial = {
            let (publisher, sub) = (publisher.clone(), sub.clone());
            tokio::spawn(async move {
                let slow_snapshot = async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    vec![("Volume".into(), "1".into())]
                };
                publisher.send_initial_event(&sub, slow_snapshot).await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        publisher.publish(vec![("Volume".into(), StateValue::UI2(4))]).await;
        publisher.publish(vec![("Volume".into(), StateValue::UI2(5))]).await;
        initial.await.unwrap();

        // les deux changements retenus partent en un seul NOTIFY
        let sent = bodies(&recorder);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0, "1");
        assert!(sent[1].1.contains("<Volume>5</Volume>"));
    }

    #[tokio::test]
    async fn test_failing_subscriber_is_dropped() {
        let recorder = Arc::new(Recorder {
            failing_host: Some("http://dead"),
            ..Default::default()
        });
        let publisher = publisher();
        publisher.attach(recorder.clone(), 2);

        let dead = publisher
            .add_subscription(vec![url("http://dead:1/cb")], None, Duration::from_secs(300))
            .unwrap();
        let alive = publisher
            .add_subscription(vec![url("http://alive:1/cb")], None, Duration::from_secs(300))
            .unwrap();
        publisher.send_initial_event(&dead, async { vec![] }).await;
        publisher.send_initial_event(&alive, async { vec![] }).await;

        publisher.publish(vec![("Volume".into(), StateValue::UI2(5))]).await;
        assert!(publisher.subscription(dead.sid()).is_none());
        assert!(publisher.subscription(alive.sid()).is_some());
        assert_eq!(seqs(&recorder, "http://alive:1"), vec!["0", "1"]);
    }

    #[tokio::test]
    async fn test_callbacks_tried_in_order() {
        let recorder = Arc::new(Recorder {
            failing_host: Some("http://first"),
            ..Default::default()
        });
        let publisher = publisher();
        publisher.attach(recorder.clone(), 3);
        let sub = publisher
            .add_subscription(
                vec![url("http://first:1/cb"), url("http://second:1/cb")],
                None,
                Duration::from_secs(300),
            )
            .unwrap();
        publisher.send_initial_event(&sub, async { vec![] }).await;
        assert_eq!(seqs(&recorder, "http://first"), vec!["0"]);
        assert_eq!(seqs(&recorder, "http://second"), vec!["0"]);
        assert_eq!(sub.next_sequence().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_rate_moderation() {
        let recorder = Arc::new(Recorder::default());
        let publisher = publisher();
        publisher.attach(recorder.clone(), 3);
        let sub = publisher
            .add_subscription(vec![url("http://a:1/cb")], None, Duration::from_secs(300))
            .unwrap();
        publisher.send_initial_event(&sub, async { vec![] }).await;

        publisher.publish(vec![("Position".into(), StateValue::UI4(1))]).await;
        publisher.publish(vec![("Position".into(), StateValue::UI4(2))]).await;
        assert_eq!(seqs(&recorder, "http://a:1").len(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        let tasks = publisher.maintain(Instant::now());
        assert_eq!(tasks.len(), 1);
        for task in tasks {
            task.await;
        }
        let sent = recorder.sent.lock();
        let last = sent.last().unwrap();
        assert_eq!(last.header(HeaderType::Seq), Some("2"));
        assert!(last.body_str().contains("<Position>2</Position>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiration_and_renewal() {
        let publisher = publisher();
        let sub = publisher
            .add_subscription(
                vec![url("http://a:1/cb")],
                Some(TimeoutHeader::Seconds(10)),
                Duration::from_secs(300),
            )
            .unwrap();
        assert_eq!(sub.timeout_header(), TimeoutHeader::Seconds(10));

        tokio::time::advance(Duration::from_secs(8)).await;
        publisher
            .renew(sub.sid(), Some(TimeoutHeader::Seconds(10)), Duration::from_secs(300))
            .unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(publisher.maintain(Instant::now()).is_empty());
        assert!(publisher.subscription(sub.sid()).is_some());

        tokio::time::advance(Duration::from_secs(5)).await;
        publisher.maintain(Instant::now());
        assert!(publisher.subscription(sub.sid()).is_none());
        assert!(matches!(
            publisher.renew(sub.sid(), None, Duration::from_secs(300)),
            Err(SubscriptionError::UnknownSubscription(_))
        ));
    }

    #[test]
    fn test_non_evented_service_rejects() {
        let vars = [Arc::new(StateVariable::new("X", StateVarType::String))];
        let publisher = LocalEventPublisher::new(ServiceId::uda("X"), vars.iter());
        assert_eq!(
            publisher
                .add_subscription(vec![url("http://a/cb")], None, Duration::from_secs(1))
                .unwrap_err(),
            SubscriptionError::NotEvented
        );
    }
}
