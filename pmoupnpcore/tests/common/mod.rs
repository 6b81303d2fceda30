//! Réseau en mémoire : chaque hôte est une fabrique de protocoles, les
//! requêtes HTTP sortantes lui sont remises directement.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use pmoupnpcore::{
    DeviceType, ServiceId, ServiceType, Udn, UpnpSettings,
    actions::{Action, ActionError, Argument, ArgumentValues},
    devices::{DeviceDetails, LocalDevice},
    message::{StreamRequestMessage, StreamResponseMessage},
    namespace::Namespace,
    protocol::{ProtocolContext, ProtocolFactory, discovery},
    registry::Registry,
    services::{LocalService, Service, ServiceCommandTarget},
    state_variables::StateVariable,
    transport::{DatagramSender, StreamClient, StreamClientError, StreamHandler},
    value_ranges::ValueRange,
    variable_types::{StateValue, StateVarType},
};

#[derive(Default)]
pub struct MemoryNetwork {
    hosts: Mutex<HashMap<String, Arc<ProtocolFactory>>>,
    log: Mutex<Vec<StreamRequestMessage>>,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attach(&self, host: &str, factory: Arc<ProtocolFactory>) {
        self.hosts.lock().insert(host.to_string(), factory);
    }

    pub fn requests(&self) -> Vec<StreamRequestMessage> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl StreamClient for MemoryNetwork {
    async fn send(&self, request: StreamRequestMessage) -> Result<StreamResponseMessage, StreamClientError> {
        let url = request
            .url()
            .map_err(|e| StreamClientError::InvalidRequest(e.to_string()))?;
        self.log.lock().push(request.clone());

        let factory = url.host_str().and_then(|h| self.hosts.lock().get(h).cloned());
        let Some(factory) = factory else {
            return Err(StreamClientError::Connection {
                url: url.to_string(),
                reason: "host unreachable".into(),
            });
        };
        let outcome = factory.handle_stream(request).await;
        if let Some(task) = outcome.after_response {
            tokio::spawn(task);
        }
        Ok(outcome.response)
    }
}

/// Datagrammes émis, sans réseau
#[derive(Default)]
pub struct RecordedDatagrams(pub Mutex<Vec<(String, SocketAddr)>>);

#[async_trait]
impl DatagramSender for RecordedDatagrams {
    async fn send_datagram(&self, data: &[u8], to: SocketAddr) -> std::io::Result<()> {
        self.0.lock().push((String::from_utf8_lossy(data).into_owned(), to));
        Ok(())
    }
}

pub struct Node {
    pub context: Arc<ProtocolContext>,
    pub factory: Arc<ProtocolFactory>,
    pub datagrams: Arc<RecordedDatagrams>,
}

impl Node {
    pub fn registry(&self) -> &Arc<Registry> {
        self.context.registry()
    }

    /// Enregistre un périphérique local comme le ferait le service UPnP
    pub fn host(&self, device: Arc<LocalDevice>) {
        for service in device.all_services() {
            service.publisher().attach(self.context.client().clone(), 3);
        }
        self.registry().add_local_device(device).unwrap();
    }

    pub fn descriptor_url(&self, udn: &Udn) -> Url {
        self.context
            .local_url(&self.registry().namespace().device_descriptor_path(udn))
            .unwrap()
    }

    /// Reçoit l'annonce d'un périphérique hébergé par `other`
    pub async fn discover(&self, other: &Node, udn: &Udn) {
        discovery::handle_advertisement(&self.context, udn.clone(), other.descriptor_url(udn), 1800).await;
    }
}

pub fn node(network: &Arc<MemoryNetwork>, host: &str) -> Node {
    let settings = UpnpSettings {
        subscription_duration: Duration::from_secs(300),
        ..UpnpSettings::default()
    };
    let base_url = Url::parse(&format!("http://{}:4004/", host)).unwrap();
    let registry = Arc::new(Registry::new(Namespace::new("/upnp")));
    let datagrams = Arc::new(RecordedDatagrams::default());
    let context = Arc::new(ProtocolContext::new(
        registry,
        network.clone(),
        datagrams.clone(),
        settings,
        base_url,
    ));
    let factory = Arc::new(ProtocolFactory::new(context.clone()));
    network.attach(host, factory.clone());
    Node {
        context,
        factory,
        datagrams,
    }
}

// ----- périphérique de test -----

#[derive(Default)]
pub struct SwitchPower {
    target: bool,
    level: u8,
}

#[async_trait]
impl ServiceCommandTarget for SwitchPower {
    async fn read_state(&mut self, variable: &str) -> anyhow::Result<StateValue> {
        match variable {
            "Target" | "Status" => Ok(StateValue::Boolean(self.target)),
            "LoadLevelTarget" => Ok(StateValue::UI1(self.level)),
            other => Err(anyhow!("no state '{}'", other)),
        }
    }

    async fn invoke_action(&mut self, action: &str, inputs: &ArgumentValues) -> anyhow::Result<ArgumentValues> {
        let mut outputs = ArgumentValues::new();
        match action {
            "SetTarget" => {
                if let Some(StateValue::Boolean(b)) = inputs.get("NewTargetValue") {
                    self.target = *b;
                }
            }
            "GetStatus" => {
                outputs.insert("ResultStatus".into(), StateValue::Boolean(self.target));
            }
            "SetLoadLevelTarget" => {
                if let Some(StateValue::UI1(level)) = inputs.get("NewLoadLevelTarget") {
                    self.level = *level;
                }
            }
            "Fail" => return Err(ActionError::new(pmoupnpcore::actions::ErrorCode::Other(701), "Busy").into()),
            other => return Err(anyhow!("unexpected action '{}'", other)),
        }
        Ok(outputs)
    }
}

pub fn switch_power_model(version: u32, extra_action: Option<&str>) -> Service {
    let target = Arc::new(StateVariable::new("Target", StateVarType::Boolean));
    let status = Arc::new(StateVariable::new("Status", StateVarType::Boolean).with_events(true));
    let level = Arc::new(
        StateVariable::new("LoadLevelTarget", StateVarType::UI1)
            .with_range(ValueRange::new(StateValue::UI1(0), StateValue::UI1(100)).unwrap()),
    );

    let mut actions = vec![
        Action::new("SetTarget").with_argument(Argument::input("NewTargetValue", target.clone())),
        Action::new("GetStatus").with_argument(Argument::output("ResultStatus", status.clone()).as_return_value()),
        Action::new("SetLoadLevelTarget").with_argument(Argument::input("NewLoadLevelTarget", level.clone())),
        Action::new("Fail"),
    ];
    if let Some(name) = extra_action {
        actions.push(Action::new(name));
    }
    Service::new(
        ServiceType::uda("SwitchPower", version),
        ServiceId::uda("SwitchPower"),
        vec![target, status, level],
        actions,
    )
    .unwrap()
}

pub fn binary_light(udn: &str) -> Arc<LocalDevice> {
    LocalDevice::builder(
        Udn::new(udn).unwrap(),
        DeviceType::uda("BinaryLight", 1),
        DeviceDetails::new("Lampe du salon", "PMO", "BL-1"),
    )
    .service(LocalService::with_target(switch_power_model(1, None), SwitchPower::default()))
    .build()
    .unwrap()
}

/// Attend qu'une condition devienne vraie (au plus une seconde)
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
