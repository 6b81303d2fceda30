mod common;

use std::sync::Arc;

use tokio::sync::oneshot;
use url::Url;

use pmoupnpcore::{
    ActionCallback, ControlPoint, ServiceId, ServiceReference, Udn,
    actions::{ActionError, ActionInvocation, ErrorCode, QUERY_STATE_VARIABLE_ACTION},
    message::UpnpMethod,
    services::{DeviceService, RemoteService, ServiceHandle},
    variable_types::StateValue,
};

use common::{MemoryNetwork, Node, binary_light, node, switch_power_model};

const UDN: &str = "uuid:0b0e6bd2-light-0001";

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

fn invocation(service: &ServiceHandle, action: &str) -> ActionInvocation {
    ActionInvocation::new(service.service().action(action).unwrap().clone())
}

#[tokio::test]
async fn test_discovery_builds_remote_model() {
    let s = setup().await;
    let remote = s.control.registry().remote_device(&Udn::new(UDN).unwrap()).unwrap();
    assert_eq!(remote.details().friendly_name, "Lampe du salon");

    let handle = s.control.registry().get_service(&reference()).unwrap();
    let service = handle.as_remote().unwrap();
    let model = service.service();
    assert_eq!(model.actions().len(), 4);
    assert!(model.state_variable("Status").unwrap().send_events());
    assert_eq!(service.control_url().host_str(), Some("light.test"));
}

#[tokio::test]
async fn test_remote_invocation_matches_local() {
    let s = setup().await;
    let remote = s.control.registry().get_service(&reference()).unwrap();
    let local = s.device.registry().get_service(&reference()).unwrap();

    let mut set = invocation(&remote, "SetTarget");
    set.set_input("NewTargetValue", StateValue::Boolean(true)).unwrap();
    s.control_point.invoke(&mut set, &remote).await.unwrap();

    let mut over_network = invocation(&remote, "GetStatus");
    s.control_point.invoke(&mut over_network, &remote).await.unwrap();
    let mut in_process = invocation(&local, "GetStatus");
    s.control_point.invoke(&mut in_process, &local).await.unwrap();

    assert_eq!(over_network.outputs(), in_process.outputs());
    assert_eq!(over_network.output("ResultStatus"), Some(&StateValue::Boolean(true)));
}

#[tokio::test]
async fn test_rediscovery_does_not_refetch() {
    let s = setup().await;
    let fetches = |network: &MemoryNetwork| {
        network
            .requests()
            .iter()
            .filter(|r| r.method == UpnpMethod::Get)
            .count()
    };
    // description + SCPD
    assert_eq!(fetches(&s.network), 2);

    s.control.discover(&s.device, &Udn::new(UDN).unwrap()).await;
    assert_eq!(fetches(&s.network), 2);
    assert_eq!(s.control.registry().remote_devices().len(), 1);
}

#[tokio::test]
async fn test_unknown_action_is_invalid_action() {
    let s = setup().await;
    let remote = s.control.registry().get_service(&reference()).unwrap();
    let real = remote.as_remote().unwrap();

    // même service vu avec une action que le périphérique ignore
    let fake = Arc::new(RemoteService::new(
        switch_power_model(1, Some("C")),
        real.descriptor_url().clone(),
        real.control_url().clone(),
        real.event_url().clone(),
    ));
    let fake = ServiceHandle::Remote(fake);
    let mut inv = invocation(&fake, "C");
    let err = s.control_point.invoke(&mut inv, &fake).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidAction);
    assert_eq!(inv.failure().map(|e| e.code), Some(ErrorCode::InvalidAction));
}

#[tokio::test]
async fn test_newer_version_is_rejected() {
    let s = setup().await;
    let remote = s.control.registry().get_service(&reference()).unwrap();
    let real = remote.as_remote().unwrap();

    let v2 = ServiceHandle::Remote(Arc::new(RemoteService::new(
        switch_power_model(2, None),
        real.descriptor_url().clone(),
        real.control_url().clone(),
        real.event_url().clone(),
    )));
    let mut inv = invocation(&v2, "GetStatus");
    let err = s.control_point.invoke(&mut inv, &v2).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidAction);
}

#[tokio::test]
async fn test_query_state_variable() {
    let s = setup().await;
    let remote = s.control.registry().get_service(&reference()).unwrap();

    let mut set = invocation(&remote, "SetTarget");
    set.set_input("NewTargetValue", StateValue::Boolean(true)).unwrap();
    s.control_point.invoke(&mut set, &remote).await.unwrap();

    let mut query = ActionInvocation::new(QUERY_STATE_VARIABLE_ACTION.clone());
    query.set_input("varName", "Status").unwrap();
    s.control_point.invoke(&mut query, &remote).await.unwrap();
    assert_eq!(query.output("return").map(|v| v.to_string()), Some("1".to_string()));

    let mut unknown = ActionInvocation::new(QUERY_STATE_VARIABLE_ACTION.clone());
    unknown.set_input("varName", "Nope").unwrap();
    let err = s.control_point.invoke(&mut unknown, &remote).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidVariable);
}

#[tokio::test]
async fn test_out_of_range_input_is_refused_before_sending() {
    let s = setup().await;
    let remote = s.control.registry().get_service(&reference()).unwrap();
    let before = s.network.requests().len();

    let mut inv = invocation(&remote, "SetLoadLevelTarget");
    let err = inv.set_input("NewLoadLevelTarget", 150u8).unwrap_err();
    assert_eq!(err.code, ErrorCode::ArgumentValueOutOfRange);
    inv.set_input("NewLoadLevelTarget", 100u8).unwrap();
    s.control_point.invoke(&mut inv, &remote).await.unwrap();

    assert_eq!(s.network.requests().len(), before + 1);
}

#[tokio::test]
async fn test_missing_input_is_refused_before_sending() {
    let s = setup().await;
    let remote = s.control.registry().get_service(&reference()).unwrap();
    let before = s.network.requests().len();

    let mut inv = invocation(&remote, "SetTarget");
    let err = s.control_point.invoke(&mut inv, &remote).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ArgumentValueInvalid);
    assert_eq!(inv.failure().map(|e| e.code), Some(ErrorCode::ArgumentValueInvalid));
    assert_eq!(s.network.requests().len(), before);
}

#[tokio::test]
async fn test_vendor_error_code_is_preserved() {
    let s = setup().await;
    let remote = s.control.registry().get_service(&reference()).unwrap();
    let mut inv = invocation(&remote, "Fail");
    let err = s.control_point.invoke(&mut inv, &remote).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Other(701));
    assert_eq!(err.description, "Busy");
}

#[tokio::test]
async fn test_unreachable_device_is_action_failed() {
    let s = setup().await;
    let remote = s.control.registry().get_service(&reference()).unwrap();
    let real = remote.as_remote().unwrap();
    let gone = ServiceHandle::Remote(Arc::new(RemoteService::new(
        switch_power_model(1, None),
        real.descriptor_url().clone(),
        Url::parse("http://gone.test:4004/ctl").unwrap(),
        real.event_url().clone(),
    )));

    let mut inv = invocation(&gone, "GetStatus");
    let err = s.control_point.invoke(&mut inv, &gone).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ActionFailed);
}

struct Reply(oneshot::Sender<Result<ActionInvocation, ActionError>>);

impl ActionCallback for Reply {
    fn success(self: Box<Self>, invocation: ActionInvocation) {
        let _ = self.0.send(Ok(invocation));
    }

    fn failure(self: Box<Self>, _invocation: ActionInvocation, error: ActionError) {
        let _ = self.0.send(Err(error));
    }
}

#[tokio::test]
async fn test_execute_reports_through_callback() {
    let s = setup().await;
    let remote = s.control.registry().get_service(&reference()).unwrap();

    let (tx, rx) = oneshot::channel();
    s.control_point
        .execute(invocation(&remote, "GetStatus"), remote.clone(), Box::new(Reply(tx)));
    let done = rx.await.unwrap().unwrap();
    assert_eq!(done.output("ResultStatus"), Some(&StateValue::Boolean(false)));

    let (tx, rx) = oneshot::channel();
    s.control_point
        .execute(invocation(&remote, "Fail"), remote, Box::new(Reply(tx)));
    assert!(rx.await.unwrap().is_err());
}
