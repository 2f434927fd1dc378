use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, Incoming, MqttOptions};

use super::endpoint::parse_mqtt_endpoint;
use super::Publisher;
use crate::config::PublisherSettings;

/// How long `close` waits for the connection thread to wind down.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Best-effort MQTT publisher for a single topic.
///
/// Messages are sent with QoS 0 and `retain = false`, so late subscribers never
/// see old detections. The rumqttc request channel is bounded at the configured
/// queue depth; when it is full the message is dropped with a warning instead
/// of blocking the tick.
pub struct MqttPublisher {
    topic: String,
    broker: String,
    client: Option<Client>,
    connection_handle: Option<JoinHandle<()>>,
    /// Hangs up when the connection thread exits.
    connection_done: Option<mpsc::Receiver<()>>,
    link_lost: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    dropped: u64,
}

impl MqttPublisher {
    /// Connect to the broker and wait for the CONNACK.
    ///
    /// Fails when the address is invalid or the broker does not acknowledge
    /// the connection within `settings.connect_timeout`.
    pub fn connect(settings: &PublisherSettings) -> Result<Self> {
        crate::config::validate_topic(&settings.topic)?;
        let endpoint = parse_mqtt_endpoint(&settings.broker_addr)?;

        let mut options = MqttOptions::new(&settings.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_start(true);
        if let Some(user) = settings.username.as_deref() {
            options.set_credentials(user, settings.password.as_deref().unwrap_or_default());
        }
        options.set_transport(endpoint.transport(settings.tls_ca_path.as_deref())?);

        let (client, connection) = Client::new(options, settings.queue_depth.max(1));
        let link_lost = Arc::new(AtomicBool::new(false));
        let closing = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let handle = spawn_connection(
            connection,
            ready_tx,
            done_tx,
            link_lost.clone(),
            closing.clone(),
        );

        match ready_rx.recv_timeout(settings.connect_timeout) {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                return Err(anyhow!("MQTT broker {} refused connection: {}", endpoint, reason));
            }
            Err(_) => {
                closing.store(true, Ordering::SeqCst);
                let _ = client.try_disconnect();
                return Err(anyhow!(
                    "MQTT broker {} did not acknowledge within {:?}",
                    endpoint,
                    settings.connect_timeout
                ));
            }
        }

        log::info!(
            "MqttPublisher: connected to {} (topic '{}', queue depth {}, auth: {})",
            endpoint,
            settings.topic,
            settings.queue_depth,
            settings.username.is_some()
        );
        Ok(Self {
            topic: settings.topic.clone(),
            broker: endpoint.to_string(),
            client: Some(client),
            connection_handle: Some(handle),
            connection_done: Some(done_rx),
            link_lost,
            closing,
            dropped: 0,
        })
    }

    /// Messages dropped because the request queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

fn spawn_connection(
    mut connection: Connection,
    ready_tx: mpsc::Sender<std::result::Result<(), String>>,
    done_tx: mpsc::Sender<()>,
    link_lost: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let _done = done_tx;
        let mut ready = Some(ready_tx);
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Ok(()));
                    }
                }
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Err(e.to_string()));
                    } else if !closing.load(Ordering::SeqCst) {
                        log::warn!("MQTT connection error: {}", e);
                    }
                    link_lost.store(true, Ordering::SeqCst);
                    break;
                }
            }
        }
    })
}

impl Publisher for MqttPublisher {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn publish(&mut self, payload: &str) -> Result<()> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| anyhow!("publisher for '{}' is closed", self.topic))?;
        if self.link_lost.load(Ordering::SeqCst) {
            return Err(anyhow!("MQTT connection to {} lost", self.broker));
        }
        if let Err(err) = client.try_publish(
            self.topic.as_str(),
            QoS::AtMostOnce,
            false,
            payload.as_bytes().to_vec(),
        ) {
            self.dropped += 1;
            log::warn!(
                "MqttPublisher: dropped message on '{}' ({} dropped so far): {}",
                self.topic,
                self.dropped,
                err
            );
        }
        Ok(())
    }

    fn close(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        self.closing.store(true, Ordering::SeqCst);
        // Never block on a full request queue; dropping the client ends the
        // event loop once queued requests drain.
        if let Err(err) = client.try_disconnect() {
            log::warn!(
                "MqttPublisher: disconnect from {} not queued: {}",
                self.broker,
                err
            );
        }
        drop(client);

        let finished = match self.connection_done.take() {
            Some(done) => !matches!(
                done.recv_timeout(CLOSE_TIMEOUT),
                Err(RecvTimeoutError::Timeout)
            ),
            None => true,
        };
        match self.connection_handle.take() {
            Some(handle) if finished => {
                let _ = handle.join();
            }
            Some(_) => log::warn!(
                "MqttPublisher: connection to {} did not stop within {:?}, detaching",
                self.broker,
                CLOSE_TIMEOUT
            ),
            None => {}
        }
        log::info!("MqttPublisher: closed '{}' on {}", self.topic, self.broker);
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn settings(broker_addr: String) -> PublisherSettings {
        PublisherSettings {
            topic: "detected_fruit".to_string(),
            queue_depth: 10,
            broker_addr,
            client_id: "test_publisher".to_string(),
            username: None,
            password: None,
            connect_timeout: Duration::from_millis(500),
            tls_ca_path: None,
        }
    }

    #[test]
    fn unreachable_broker_fails_connect() {
        // Bind then drop to get a port with nothing listening.
        let port = TcpListener::bind("127.0.0.1:0")
            .and_then(|l| l.local_addr())
            .map(|addr| addr.port())
            .expect("ephemeral port");
        let result = MqttPublisher::connect(&settings(format!("127.0.0.1:{}", port)));
        assert!(result.is_err());
    }

    /// Broker that acknowledges the session and then never reads again.
    fn spawn_stalled_broker() -> (u16, std::thread::JoinHandle<()>) {
        use std::io::{Read, Write};

        let listener = TcpListener::bind("127.0.0.1:0").expect("bind broker");
        let port = listener.local_addr().expect("broker addr").port();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept client");
            let mut connect = [0u8; 256];
            let _ = stream.read(&mut connect);
            // MQTT 5 CONNACK: no session present, success, no properties.
            stream
                .write_all(&[0x20, 0x03, 0x00, 0x00, 0x00])
                .expect("write connack");
            std::thread::sleep(Duration::from_secs(10));
        });
        (port, handle)
    }

    #[test]
    fn close_returns_promptly_when_broker_stalls() -> Result<()> {
        let (port, _broker) = spawn_stalled_broker();
        let mut cfg = settings(format!("127.0.0.1:{}", port));
        cfg.connect_timeout = Duration::from_secs(5);
        let mut publisher = MqttPublisher::connect(&cfg)?;

        for i in 0..50 {
            publisher.publish(&format!("apple 0.{:02}", i))?;
        }

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            publisher.close();
            publisher.close();
            let _ = tx.send(publisher.dropped());
        });
        let closed = rx.recv_timeout(CLOSE_TIMEOUT + Duration::from_secs(3));
        assert!(closed.is_ok(), "close blocked on a stalled broker");
        Ok(())
    }

    #[test]
    fn wildcard_topic_is_rejected_before_connecting() {
        let mut cfg = settings("127.0.0.1:1".to_string());
        cfg.topic = "fruit/#".to_string();
        let err = MqttPublisher::connect(&cfg).err().expect("connect must fail");
        assert!(err.to_string().contains("wildcards"));
    }
}
