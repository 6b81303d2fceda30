mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use pmoupnpcore::{
    ControlPoint, ServiceId, ServiceReference, Sid, Udn, UpnpSettings,
    actions::ActionInvocation,
    gena::{EndReason, RemoteGenaSubscription, SubscriptionCallback, SubscriptionError, SubscriptionState},
    message::{
        StreamRequestMessage, StreamResponseMessage, TimeoutHeader, UpnpMethod,
        gena::{OutgoingEventRequest, subscribe_response},
    },
    namespace::Namespace,
    protocol::{ProtocolContext, discovery},
    registry::Registry,
    services::{RemoteService, ServiceHandle},
    transport::{StreamClient, StreamClientError},
    variable_types::StateValue,
};

use common::{MemoryNetwork, Node, RecordedDatagrams, binary_light, eventually, node, switch_power_model};

const UDN: &str = "uuid:0b0e6bd2-light-0002";

#[derive(Default)]
struct Journal {
    entries: Mutex<Vec<String>>,
}

impl Journal {
    fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

impl SubscriptionCallback for Journal {
    fn established(&self, _subscription: &RemoteGenaSubscription) {
        self.entries.lock().push("established".into());
    }

    fn event_received(&self, _subscription: &RemoteGenaSubscription, values: &[(String, StateValue)]) {
        for (name, value) in values {
            self.entries.lock().push(format!("event {}={}", name, value));
        }
    }

    fn events_missed(&self, _subscription: &RemoteGenaSubscription, count: u32) {
        self.entries.lock().push(format!("missed {}", count));
    }

    fn failed(&self, _subscription: &RemoteGenaSubscription, _error: &SubscriptionError) {
        self.entries.lock().push("failed".into());
    }

    fn ended(&self, _subscription: &RemoteGenaSubscription, reason: &EndReason) {
        self.entries.lock().push(format!("ended {:?}", reason));
    }
}

struct Setup {
    network: Arc<MemoryNetwork>,
    device: Node,
    control: Node,
    control_point: ControlPoint,
}

async fn setup() -> Setup {
    let network = MemoryNetwork::new();
    let device = node(&network, "light.test");
    let control = node(&network, "cp.test");
    device.host(binary_light(UDN));
    control.discover(&device, &Udn::new(UDN).unwrap()).await;
    let control_point = ControlPoint::new(control.context.clone());
    Setup {
        network,
        device,
        control,
        control_point,
    }
}

fn reference() -> ServiceReference {
    ServiceReference::new(Udn::new(UDN).unwrap(), ServiceId::uda("SwitchPower"))
}

impl Setup {
    fn remote_service(&self) -> Arc<RemoteService> {
        self.control
            .registry()
            .get_service(&reference())
            .and_then(|h| h.as_remote().cloned())
            .unwrap()
    }

    fn local_service(&self) -> ServiceHandle {
        self.device.registry().get_service(&reference()).unwrap()
    }

    fn callback_url(&self, subscription: &RemoteGenaSubscription) -> Url {
        let path = self.control.registry().namespace().callback_path(subscription.callback_id());
        self.control.context.local_url(&path).unwrap()
    }

    async fn notify(&self, subscription: &RemoteGenaSubscription, seq: u32, status: &str) -> u16 {
        let request: StreamRequestMessage = OutgoingEventRequest::build(
            &self.callback_url(subscription),
            &subscription.sid().unwrap(),
            seq,
            &[("Status".to_string(), status.to_string())],
        );
        self.network.send(request).await.unwrap().status
    }
}

#[tokio::test]
async fn test_initial_event_then_ordered_delivery() {
    let s = setup().await;
    let journal = Arc::new(Journal::default());
    let sub = s
        .control_point
        .subscribe(s.remote_service(), journal.clone())
        .await
        .unwrap();

    assert_eq!(sub.state(), SubscriptionState::Established);
    assert!(sub.sid().is_some());
    assert!(eventually(|| sub.current_sequence() == Some(0)).await);
    assert_eq!(sub.current_values().get("Status"), Some(&StateValue::Boolean(false)));

    let local = s.local_service();
    local
        .as_local()
        .unwrap()
        .publish(vec![("Status".to_string(), StateValue::Boolean(true))])
        .await;
    assert!(eventually(|| sub.current_sequence() == Some(1)).await);
    assert_eq!(sub.current_values().get("Status"), Some(&StateValue::Boolean(true)));
    assert_eq!(journal.count("established"), 1);
}

#[tokio::test]
async fn test_sequence_gap_counts_missed_events() {
    let s = setup().await;
    let journal = Arc::new(Journal::default());
    let sub = s
        .control_point
        .subscribe(s.remote_service(), journal.clone())
        .await
        .unwrap();
    assert!(eventually(|| sub.current_sequence() == Some(0)).await);

    assert_eq!(s.notify(&sub, 1, "1").await, 200);
    assert_eq!(s.notify(&sub, 3, "0").await, 200);

    assert_eq!(sub.missed_events(), 1);
    assert_eq!(sub.current_sequence(), Some(3));
    assert_eq!(journal.count("missed 1"), 1);

    // un événement en retard est ignoré
    assert_eq!(s.notify(&sub, 2, "1").await, 200);
    assert_eq!(sub.current_sequence(), Some(3));
    assert_eq!(sub.current_values().get("Status"), Some(&StateValue::Boolean(false)));
}

#[tokio::test]
async fn test_unsubscribe_ends_both_sides() {
    let s = setup().await;
    let journal = Arc::new(Journal::default());
    let sub = s
        .control_point
        .subscribe(s.remote_service(), journal.clone())
        .await
        .unwrap();
    let local = s.local_service();
    let publisher = local.as_local().unwrap().publisher().clone();
    assert_eq!(publisher.subscriptions().len(), 1);
    assert!(eventually(|| sub.current_sequence() == Some(0)).await);

    s.control_point.unsubscribe(&sub).await.unwrap();

    assert_eq!(sub.state(), SubscriptionState::Ended(EndReason::Unsubscribed));
    assert!(publisher.subscriptions().is_empty());
    assert!(s.control.registry().remote_subscriptions().is_empty());
    assert_eq!(s.notify(&sub, 1, "1").await, 412);
    assert!(matches!(s.control_point.unsubscribe(&sub).await, Err(SubscriptionError::Ended)));
    assert_eq!(journal.count("ended"), 1);
}

#[tokio::test]
async fn test_unreachable_publisher_fails_once() {
    let s = setup().await;
    let real = s.remote_service();
    let model = switch_power_model(1, None);
    let gone = Arc::new(RemoteService::new(
        model,
        real.descriptor_url().clone(),
        real.control_url().clone(),
        Url::parse("http://gone.test:4004/evt").unwrap(),
    ));

    let journal = Arc::new(Journal::default());
    let err = s.control_point.subscribe(gone, journal.clone()).await.unwrap_err();
    assert!(matches!(err, SubscriptionError::Transport(_)));
    assert_eq!(journal.entries(), vec!["failed".to_string()]);
    assert!(s.control.registry().remote_subscriptions().is_empty());
}

#[tokio::test]
async fn test_device_removal_ends_subscription() {
    let s = setup().await;
    let journal = Arc::new(Journal::default());
    let sub = s
        .control_point
        .subscribe(s.remote_service(), journal.clone())
        .await
        .unwrap();

    discovery::handle_byebye(&s.control.context, &Udn::new(UDN).unwrap());

    assert_eq!(sub.state(), SubscriptionState::Ended(EndReason::DeviceRemoved));
    assert_eq!(journal.count("ended"), 1);
    assert_eq!(journal.count("failed"), 0);
    assert!(s.control.registry().remote_device(&Udn::new(UDN).unwrap()).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_subscription_is_renewed_before_expiry() {
    let s = setup().await;
    let journal = Arc::new(Journal::default());
    let sub = s
        .control_point
        .subscribe(s.remote_service(), journal.clone())
        .await
        .unwrap();
    let sid = sub.sid().unwrap();

    // 300 s accordées, marge de 60 s : renouvellement à 240 s
    tokio::time::sleep(std::time::Duration::from_secs(250)).await;

    let subscribes: Vec<_> = s
        .network
        .requests()
        .into_iter()
        .filter(|r| r.method == UpnpMethod::Subscribe)
        .collect();
    assert_eq!(subscribes.len(), 2);
    assert_eq!(
        subscribes[1].header(pmoupnpcore::message::HeaderType::Sid),
        Some(sid.to_string().as_str())
    );
    assert_eq!(sub.state(), SubscriptionState::Established);
    assert_eq!(sub.sid(), Some(sid));
    assert_eq!(journal.count("ended"), 0);
}

#[tokio::test]
async fn test_change_right_after_subscribe_is_not_lost() {
    let s = setup().await;
    let journal = Arc::new(Journal::default());
    let sub = s
        .control_point
        .subscribe(s.remote_service(), journal.clone())
        .await
        .unwrap();

    // l'événement initial est peut-être encore en route
    let local = s.local_service();
    let mut set = ActionInvocation::new(local.service().action("SetTarget").unwrap().clone());
    set.set_input("NewTargetValue", StateValue::Boolean(true)).unwrap();
    s.control_point.invoke(&mut set, &local).await.unwrap();
    local.as_local().unwrap().notify_state_changed(&["Status"]).await;

    assert!(eventually(|| sub.current_values().get("Status") == Some(&StateValue::Boolean(true))).await);
    assert_eq!(sub.missed_events(), 0);
}

/// Périphérique qui accorde successivement les durées de `grants`, la
/// dernière ensuite.
struct GrantingDevice {
    sid: Sid,
    grants: Vec<u32>,
    subscribes: Mutex<usize>,
}

impl GrantingDevice {
    fn new(grants: Vec<u32>) -> Arc<Self> {
        Arc::new(Self {
            sid: Sid::generate(),
            grants,
            subscribes: Mutex::new(0),
        })
    }

    fn subscribes(&self) -> usize {
        *self.subscribes.lock()
    }
}

#[async_trait]
impl StreamClient for GrantingDevice {
    async fn send(&self, request: StreamRequestMessage) -> Result<StreamResponseMessage, StreamClientError> {
        if request.method != UpnpMethod::Subscribe {
            return Ok(StreamResponseMessage::ok());
        }
        let mut count = self.subscribes.lock();
        let grant = self.grants[(*count).min(self.grants.len() - 1)];
        *count += 1;
        Ok(subscribe_response(&self.sid, TimeoutHeader::Seconds(grant), "test"))
    }
}

fn control_point_for(device: Arc<GrantingDevice>) -> ControlPoint {
    let settings = UpnpSettings {
        subscription_duration: Duration::from_secs(300),
        ..UpnpSettings::default()
    };
    let context = ProtocolContext::new(
        Arc::new(Registry::new(Namespace::new("/upnp"))),
        device,
        Arc::new(RecordedDatagrams::default()),
        settings,
        Url::parse("http://cp.test:4004/").unwrap(),
    );
    ControlPoint::new(Arc::new(context))
}

fn granting_service() -> Arc<RemoteService> {
    let url = |p: &str| Url::parse(&format!("http://device.test:4004/{}", p)).unwrap();
    Arc::new(RemoteService::new(
        switch_power_model(1, None),
        url("desc.xml"),
        url("action"),
        url("event"),
    ))
}

#[tokio::test(start_paused = true)]
async fn test_zero_duration_grant_fails_subscription() {
    let device = GrantingDevice::new(vec![0]);
    let control_point = control_point_for(device.clone());
    let journal = Arc::new(Journal::default());

    let err = control_point
        .subscribe(granting_service(), journal.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, SubscriptionError::InvalidResponse(_)));
    assert_eq!(journal.entries(), vec!["failed".to_string()]);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(device.subscribes(), 1);
    assert!(control_point.registry().remote_subscriptions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_zero_duration_renewal_ends_subscription() {
    let device = GrantingDevice::new(vec![300, 0]);
    let control_point = control_point_for(device.clone());
    let journal = Arc::new(Journal::default());
    let sub = control_point
        .subscribe(granting_service(), journal.clone())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(600)).await;

    assert_eq!(device.subscribes(), 2);
    assert!(matches!(sub.state(), SubscriptionState::Ended(EndReason::Failed(_))));
    assert_eq!(journal.count("ended"), 1);
    assert!(control_point.registry().remote_subscriptions().is_empty());
}
