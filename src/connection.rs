//! # MQTT Link Module
//!
//! Bridges the broker and the node loop. Runs in a dedicated thread with its
//! own Tokio runtime so the blocking acquisition loop never waits on the
//! network.
//!
//! ## Channels
//! - inbox (`Sender<Message>`): command-topic publishes for the node loop; bounded,
//!   a full inbox drops the newest message and answers `error_command_inbox_full`
//! - outbox (`Receiver<Status>`): status reports published to the status topic
//!
//! ## Connection Lifecycle
//! The event loop reconnects on its own after errors, pausing
//! `reconnect_delay` between attempts. Every ConnAck re-subscribes to the
//! command topic and announces `booted_up` (first connect) or
//! `reconnected_idle`. Recording state is never touched from here, so a
//! session survives a broker outage.
//!
//! The link shuts down once every `StatusReporter` is dropped: the remaining
//! statuses are published and the client disconnects.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};

use crate::command::Message;
use crate::config::Config;
use crate::error::LinkError;
use crate::status::Status;

// The capacity of the client request channel.
const REQUEST_CHANNEL_CAPACITY: usize = 10;

// Upper bound on a single publish waiting for room in the request channel.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);

// Time allowed to flush pending publishes on shutdown.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct MqttLink {
    options: MqttOptions,
    command_topic: String,
    status_topic: String,
    reconnect_delay: Duration,
    inbox: Sender<Message>,
    outbox: Receiver<Status>,
}

impl MqttLink {
    pub fn new(config: &Config, inbox: Sender<Message>, outbox: Receiver<Status>) -> Self {
        let mut options = MqttOptions::new(
            config.device_id.clone(),
            config.broker_host.clone(),
            config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username.clone(), password.clone());
        }

        Self {
            options,
            command_topic: config.command_topic.clone(),
            status_topic: config.status_topic(),
            reconnect_delay: config.reconnect_delay(),
            inbox,
            outbox,
        }
    }

    /// Runs the link until the outbox closes or the node loop goes away.
    ///
    /// Blocks the calling thread; spawn it on its own thread.
    pub fn run(self) -> Result<(), LinkError> {
        let rt = Runtime::new().map_err(|e| LinkError::RuntimeCreation(e.to_string()))?;
        let result = rt.block_on(self.serve());
        // The publisher may still be parked on the outbox
        rt.shutdown_background();
        result
    }

    async fn serve(self) -> Result<(), LinkError> {
        let (host, port) = self.options.broker_address();
        log::info!(
            "Connecting to MQTT broker {}:{} as client ID '{}'...",
            host,
            port,
            self.options.client_id()
        );

        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), REQUEST_CHANNEL_CAPACITY);
        let mut publisher = spawn_publisher(client.clone(), self.outbox.clone(), self.status_topic.clone());
        let mut connected_once = false;

        let result = loop {
            tokio::select! {
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        log::info!("Connected to MQTT broker");
                        self.on_connect(&client, connected_once);
                        connected_once = true;
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = Message::new(publish.topic.clone(), publish.payload.to_vec());
                        match forward(&self.inbox, message) {
                            Ok(None) => {}
                            Ok(Some(status)) => self.publish_now(&client, status),
                            Err(e) => break Err(e),
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!(
                            "Network/MQTT error: {}. Retrying in {:?}",
                            e,
                            self.reconnect_delay
                        );
                        tokio::time::sleep(self.reconnect_delay).await;
                    }
                },
                _ = &mut publisher => break Ok(()),
            }
        };

        flush_and_disconnect(&client, &mut eventloop).await;
        result
    }

    fn on_connect(&self, client: &AsyncClient, reconnect: bool) {
        if let Err(e) = client.try_subscribe(self.command_topic.as_str(), QoS::AtMostOnce) {
            log::error!("Impossible to subscribe to topic {}: {}", self.command_topic, e);
            return;
        }
        log::info!("Subscribed to topic: '{}'", self.command_topic);

        let status = if reconnect {
            Status::ReconnectedIdle
        } else {
            Status::BootedUp
        };
        self.publish_now(client, status);
    }

    /// Publish from the event loop task, bypassing the outbox
    fn publish_now(&self, client: &AsyncClient, status: Status) {
        if let Err(e) = client.try_publish(
            self.status_topic.as_str(),
            QoS::AtMostOnce,
            false,
            status.token(),
        ) {
            log::warn!("Failed to publish status '{}': {}", status, e);
        }
    }
}

/// Hand an inbound message to the node loop. Returns the status to answer
/// with when the message had to be dropped.
fn forward(inbox: &Sender<Message>, message: Message) -> Result<Option<Status>, LinkError> {
    match inbox.try_send(message) {
        Ok(()) => Ok(None),
        Err(TrySendError::Full(message)) => {
            log::warn!("Inbox full, dropping message on '{}'", message.topic);
            Ok(Some(Status::ErrorCommandInboxFull))
        }
        Err(TrySendError::Disconnected(_)) => Err(LinkError::Disconnected),
    }
}

/// Forward every status from the outbox to the broker, in order
fn spawn_publisher(
    client: AsyncClient,
    outbox: Receiver<Status>,
    topic: String,
) -> tokio::task::JoinHandle<()> {
    let handle = Handle::current();
    tokio::task::spawn_blocking(move || {
        for status in outbox.iter() {
            let publish = client.publish(topic.as_str(), QoS::AtMostOnce, false, status.token());
            match handle.block_on(tokio::time::timeout(PUBLISH_TIMEOUT, publish)) {
                Ok(Ok(())) => log::debug!("Published status '{}' to '{}'", status, topic),
                Ok(Err(e)) => log::warn!("Failed to publish status '{}': {}", status, e),
                Err(_) => log::warn!("Timed out publishing status '{}'", status),
            }
        }
        log::debug!("Status outbox closed");
    })
}

async fn flush_and_disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if let Err(e) = client.try_disconnect() {
        log::warn!("Error disconnecting MQTT: {}", e);
        return;
    }

    let flush = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };
    if tokio::time::timeout(DISCONNECT_TIMEOUT, flush).await.is_err() {
        log::warn!("Timed out flushing MQTT requests");
    }
    log::info!("Disconnected from MQTT broker");
}
