mod common;

use std::net::SocketAddr;

use pmoupnpcore::{
    Udn,
    message::{
        UpnpMethod,
        ssdp::{DatagramMessage, SsdpMessage},
    },
    protocol::discovery,
    transport::{DatagramHandler, multicast::ssdp_group},
};

use common::{MemoryNetwork, Node, binary_light, node};

const UDN: &str = "uuid:0b0e6bd2-light-0003";

fn udn() -> Udn {
    Udn::new(UDN).unwrap()
}

fn fetches(network: &MemoryNetwork) -> usize {
    network
        .requests()
        .iter()
        .filter(|r| r.method == UpnpMethod::Get)
        .count()
}

/// Remet à `to` les datagrammes émis par `from` depuis l'indice `since`
async fn deliver(from: &Node, to: &Node, since: usize) -> usize {
    let sent: Vec<_> = from.datagrams.0.lock().iter().skip(since).cloned().collect();
    let origin: SocketAddr = "10.0.0.2:1900".parse().unwrap();
    for (text, _) in &sent {
        let datagram = DatagramMessage::parse(text.as_bytes(), origin).unwrap();
        to.factory.handle_datagram(datagram).await;
    }
    sent.len()
}

#[tokio::test]
async fn test_alive_announcements_register_device_once() {
    let network = MemoryNetwork::new();
    let device = node(&network, "light.test");
    let control = node(&network, "cp.test");
    let light = binary_light(UDN);
    device.host(light.clone());

    discovery::announce_alive(&device.context, &light).await;
    {
        let sent = device.datagrams.0.lock();
        // rootdevice, uuid, type de périphérique, type de service
        assert_eq!(sent.len(), 4);
        assert!(sent.iter().all(|(_, to)| *to == ssdp_group()));
        assert!(sent.iter().all(|(text, _)| text.contains("NTS: ssdp:alive")));
    }

    assert_eq!(deliver(&device, &control, 0).await, 4);
    assert_eq!(control.registry().remote_devices().len(), 1);
    // description + SCPD, une seule fois malgré quatre annonces
    assert_eq!(fetches(&network), 2);

    let expiration = control.registry().expiration(&udn()).unwrap();
    assert_eq!(expiration.max_age().map(|d| d.as_secs()), Some(1800));
}

#[tokio::test]
async fn test_byebye_removes_remote_device() {
    let network = MemoryNetwork::new();
    let device = node(&network, "light.test");
    let control = node(&network, "cp.test");
    let light = binary_light(UDN);
    device.host(light.clone());
    control.discover(&device, &udn()).await;
    assert!(control.registry().remote_device(&udn()).is_some());

    discovery::announce_byebye(&device.context, &light).await;
    deliver(&device, &control, 0).await;
    assert!(control.registry().remote_device(&udn()).is_none());
}

#[tokio::test]
async fn test_search_is_answered_in_unicast() {
    let network = MemoryNetwork::new();
    let device = node(&network, "light.test");
    let control = node(&network, "cp.test");
    device.host(binary_light(UDN));

    let searcher: SocketAddr = "10.0.0.9:50000".parse().unwrap();
    let search = SsdpMessage::Search {
        st: "urn:schemas-upnp-org:service:SwitchPower:1".to_string(),
        mx: 2,
    };
    let datagram = DatagramMessage::parse(search.to_datagram().as_bytes(), searcher).unwrap();
    device.factory.handle_datagram(datagram).await;

    let answers = device.datagrams.0.lock().clone();
    assert_eq!(answers.len(), 1);
    let (text, to) = &answers[0];
    assert_eq!(*to, searcher);
    assert!(text.starts_with("HTTP/1.1 200 OK"));
    assert!(text.contains("ST: urn:schemas-upnp-org:service:SwitchPower:1"));
    assert!(text.contains(device.descriptor_url(&udn()).as_str()));

    // la réponse suffit au point de contrôle pour récupérer le périphérique
    deliver(&device, &control, 0).await;
    assert!(control.registry().remote_device(&udn()).is_some());
}

#[tokio::test]
async fn test_search_for_other_types_is_silent() {
    let network = MemoryNetwork::new();
    let device = node(&network, "light.test");
    device.host(binary_light(UDN));

    for st in [
        "urn:schemas-upnp-org:device:MediaRenderer:1",
        "urn:schemas-upnp-org:service:SwitchPower:2",
        "uuid:someone-else",
    ] {
        let search = SsdpMessage::Search { st: st.to_string(), mx: 1 };
        let datagram = DatagramMessage::parse(search.to_datagram().as_bytes(), "10.0.0.9:50000".parse().unwrap()).unwrap();
        device.factory.handle_datagram(datagram).await;
    }
    assert!(device.datagrams.0.lock().is_empty());
}

#[tokio::test]
async fn test_local_devices_are_not_retrieved() {
    let network = MemoryNetwork::new();
    let device = node(&network, "light.test");
    let light = binary_light(UDN);
    device.host(light.clone());

    discovery::announce_alive(&device.context, &light).await;
    // le nœud entend ses propres annonces
    deliver(&device, &device, 0).await;
    assert!(device.registry().remote_devices().is_empty());
    assert_eq!(fetches(&network), 0);
}
