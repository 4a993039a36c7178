use std::net::SocketAddr;
use std::time::Duration;

use proto::RelayConfig;
use runnel_agent::{socks, Agent};
use runnel_server::RelayServer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

struct Tunnel {
    agent: SocketAddr,
}

async fn start_tunnel(relay: RelayConfig) -> Tunnel {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = RelayServer::from_listener(listener, relay);
    let server_addr = server.local_addr().unwrap();
    tokio::spawn(server.serve());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let agent = Agent::from_listener(listener, server_addr.to_string(), relay);
    let agent_addr = agent.local_addr().unwrap();
    tokio::spawn(agent.serve());

    Tunnel { agent: agent_addr }
}

/// Run the client side of the handshake and return once the destination has
/// been dialed by the relay server.
async fn open(tunnel: &Tunnel, request: &[u8], destination: &TcpListener) -> (TcpStream, TcpStream) {
    let mut client = TcpStream::connect(tunnel.agent).await.unwrap();
    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut reply = [0u8; 2];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x00]);

    client.write_all(request).await.unwrap();
    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, socks::CONNECT_REPLY);

    let (target, _) = timeout(Duration::from_secs(2), destination.accept())
        .await
        .unwrap()
        .unwrap();
    (client, target)
}

fn ipv4_request(addr: SocketAddr) -> Vec<u8> {
    let SocketAddr::V4(v4) = addr else {
        panic!("expected an IPv4 address");
    };
    let mut req = vec![0x05, 0x01, 0x00, 0x01];
    req.extend_from_slice(&v4.ip().octets());
    req.extend_from_slice(&v4.port().to_be_bytes());
    req
}

#[tokio::test]
async fn bytes_flow_end_to_end() {
    let tunnel = start_tunnel(RelayConfig::default()).await;
    let destination = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let request = ipv4_request(destination.local_addr().unwrap());
    let (mut client, mut target) = open(&tunnel, &request, &destination).await;

    client.write_all(b"request body").await.unwrap();
    let mut buf = [0u8; 12];
    target.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"request body");

    target.write_all(b"response body").await.unwrap();
    let mut buf = [0u8; 13];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"response body");

    // destination hangs up: the close travels back through both hops
    drop(target);
    let n = timeout(Duration::from_secs(2), client.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn domain_request_end_to_end() {
    let tunnel = start_tunnel(RelayConfig::default()).await;
    let destination = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = destination.local_addr().unwrap().port();

    let mut request = vec![0x05, 0x01, 0x00, 0x03, 9];
    request.extend_from_slice(b"localhost");
    request.extend_from_slice(&port.to_be_bytes());
    let (mut client, mut target) = open(&tunnel, &request, &destination).await;

    target.write_all(b"banner").await.unwrap();
    let mut buf = [0u8; 6];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"banner");

    drop(client);
    let n = timeout(Duration::from_secs(2), target.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn idle_sessions_close_on_both_ends() {
    let relay = RelayConfig {
        idle_timeout: Duration::from_millis(300),
        ..RelayConfig::default()
    };
    let tunnel = start_tunnel(relay).await;
    let destination = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let request = ipv4_request(destination.local_addr().unwrap());
    let (mut client, mut target) = open(&tunnel, &request, &destination).await;

    let mut buf = [0u8; 1];
    let n = timeout(Duration::from_secs(5), client.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);
    let n = timeout(Duration::from_secs(5), target.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);
}
