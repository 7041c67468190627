/// MQTT connection handling
use log::{debug, error, info, warn};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS,
};
use tokio::sync::watch;
use tokio::time::{sleep, Duration};

use crate::config::MqttConfig;
use crate::error::BusError;

const KEEP_ALIVE_SECS: u64 = 30;
const REQUEST_CAPACITY: usize = 64;
const RECONNECT_DELAY_SECS: u64 = 1;

/// Connection state as observed by the event loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusStatus {
    Connecting,
    Connected,
    /// Transport dropped, the client is reconnecting on its own
    Reconnecting,
    /// Closed by us
    Closed,
    /// The broker refused us; the bus will not come back
    Failed(String),
}

/// Publish side of the message bus
pub trait MessageBus {
    fn is_connected(&self) -> bool;

    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError>;

    /// Disconnect gracefully. Safe to call more than once.
    async fn close(&self);

    /// Resolves once the bus has failed for good
    async fn failed(&self) -> BusError;
}

/// rumqttc-backed bus with its event loop on a background task
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
    status: watch::Receiver<BusStatus>,
}

impl MqttBus {
    /// Start connecting to the broker
    ///
    /// Returns immediately; the connection is established by the spawned
    /// event loop and reflected in [`MqttBus::status`].
    pub fn connect(config: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(KEEP_ALIVE_SECS));
        if let Some((user, password)) = &config.credentials {
            options.set_credentials(user, password);
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (tx, rx) = watch::channel(BusStatus::Connecting);

        tokio::spawn(drive_event_loop(eventloop, tx, config.host.clone()));

        Self { client, status: rx }
    }

    pub fn status(&self) -> BusStatus {
        self.status.borrow().clone()
    }
}

impl MessageBus for MqttBus {
    fn is_connected(&self) -> bool {
        *self.status.borrow() == BusStatus::Connected
    }

    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))
    }

    async fn close(&self) {
        if matches!(self.status(), BusStatus::Closed | BusStatus::Failed(_)) {
            return;
        }
        if let Err(e) = self.client.disconnect().await {
            debug!("Disconnect request not delivered: {}", e);
        }
    }

    async fn failed(&self) -> BusError {
        let mut status = self.status.clone();
        let reason = match status
            .wait_for(|s| matches!(s, BusStatus::Failed(_)))
            .await
        {
            Ok(state) => match &*state {
                BusStatus::Failed(reason) => Some(reason.clone()),
                _ => None,
            },
            // Event loop task is gone
            Err(_) => None,
        };
        reason.map_or(BusError::Closed, BusError::Refused)
    }
}

async fn drive_event_loop(mut eventloop: EventLoop, status: watch::Sender<BusStatus>, host: String) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("Connected to mqtt host {}.", host);
                    status.send_replace(BusStatus::Connected);
                } else {
                    let reason = format!("{:?}", ack.code);
                    error!("Could not connect to mqtt host {}: {}", host, reason);
                    status.send_replace(BusStatus::Failed(reason));
                    return;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                warn!("Connection to MQTT broker {} ended", host);
                status.send_replace(BusStatus::Closed);
                return;
            }
            Ok(_) => {}
            Err(ConnectionError::ConnectionRefused(code)) => {
                let reason = format!("{:?}", code);
                error!("Could not connect to mqtt host {}: {}", host, reason);
                status.send_replace(BusStatus::Failed(reason));
                return;
            }
            Err(e) => {
                let was_connected = *status.borrow() == BusStatus::Connected;
                if was_connected {
                    warn!("Lost connection to MQTT broker {}: {}", host, e);
                } else {
                    debug!("MQTT connection attempt to {} failed: {}", host, e);
                }
                status.send_replace(BusStatus::Reconnecting);
                info!("Reconnecting to MQTT broker {}", host);
                sleep(Duration::from_secs(RECONNECT_DELAY_SECS)).await;
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
    const CONNACK_NOT_AUTHORIZED: [u8; 4] = [0x20, 0x02, 0x00, 0x05];

    fn local_config(port: u16) -> MqttConfig {
        MqttConfig {
            host: "127.0.0.1".into(),
            port,
            client_id: "netatmobridge-test".into(),
            credentials: None,
        }
    }

    /// Accept one client and answer its CONNECT with `connack`
    ///
    /// The socket stays open until the client leaves or the returned sender
    /// is used or dropped.
    async fn broker_answering(connack: [u8; 4]) -> (u16, oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (release, released) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = socket.read(&mut buf).await.unwrap();
            socket.write_all(&connack).await.unwrap();
            tokio::select! {
                _ = released => {}
                _ = async { while socket.read(&mut buf).await.map_or(false, |n| n > 0) {} } => {}
            }
        });

        (port, release)
    }

    async fn wait_for_status(bus: &MqttBus, wanted: fn(&BusStatus) -> bool) -> BusStatus {
        let mut status = bus.status.clone();
        let waited = timeout(Duration::from_secs(5), status.wait_for(wanted)).await;
        waited
            .expect("bus status did not change in time")
            .map_or(BusStatus::Closed, |s| (*s).clone())
    }

    #[tokio::test]
    async fn bus_is_not_connected_before_connack() {
        // Nothing listens on this port, the event loop keeps retrying
        let bus = MqttBus::connect(&local_config(1));

        assert!(!bus.is_connected());
        sleep(Duration::from_millis(100)).await;
        assert!(!bus.is_connected());
        assert_ne!(bus.status(), BusStatus::Connected);
    }

    #[tokio::test]
    async fn accepted_connack_connects_the_bus() {
        let (port, _release) = broker_answering(CONNACK_ACCEPTED).await;
        let bus = MqttBus::connect(&local_config(port));

        let status = wait_for_status(&bus, |s| *s == BusStatus::Connected).await;

        assert_eq!(status, BusStatus::Connected);
        assert!(bus.is_connected());
    }

    #[tokio::test]
    async fn refused_connack_fails_the_bus() {
        let (port, _release) = broker_answering(CONNACK_NOT_AUTHORIZED).await;
        let bus = MqttBus::connect(&local_config(port));

        let status = wait_for_status(&bus, |s| matches!(s, BusStatus::Failed(_))).await;

        assert!(matches!(status, BusStatus::Failed(_)));
        assert!(!bus.is_connected());
        let err = timeout(Duration::from_secs(5), bus.failed()).await.unwrap();
        assert!(matches!(err, BusError::Refused(_)));
    }

    #[tokio::test]
    async fn dropped_connection_is_retried() {
        let (port, release) = broker_answering(CONNACK_ACCEPTED).await;
        let bus = MqttBus::connect(&local_config(port));

        wait_for_status(&bus, |s| *s == BusStatus::Connected).await;
        release.send(()).unwrap();
        let status = wait_for_status(&bus, |s| *s == BusStatus::Reconnecting).await;

        assert_eq!(status, BusStatus::Reconnecting);
        assert!(!bus.is_connected());
    }
}
