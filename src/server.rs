use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Mutex, RwLock};
use warp::ws::{Message, WebSocket};
use warp::Filter;

use crate::config::Config;
use crate::lobby::Lobby;
use crate::messages::ClientMessage;
use crate::registry::ConnectionId;
use crate::relay::Delivery;

type Outboxes = Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Message>>>>;

#[derive(Clone)]
pub struct Server {
    lobby: Arc<Mutex<Lobby>>,
    outboxes: Outboxes,
}

impl Server {
    pub fn new(config: &Config) -> Self {
        Server {
            lobby: Arc::new(Mutex::new(Lobby::new(config))),
            outboxes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// `GET /ws` upgrade route.
    pub fn routes(&self) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let server = self.clone();
        warp::path("ws")
            .and(warp::path::end())
            .and(warp::ws())
            .map(move |ws: warp::ws::Ws| {
                let server = server.clone();
                ws.on_upgrade(move |socket| async move {
                    server.handle_connection(socket).await;
                })
            })
    }

    pub async fn handle_connection(&self, ws: WebSocket) {
        let id = ConnectionId::new();
        let (mut ws_tx, mut ws_rx) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel();

        self.outboxes.write().await.insert(id, tx);

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = ws_tx.send(message).await {
                    error!("failed to send websocket message to {id}: {e}");
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        self.dispatch(|lobby| lobby.connect(id)).await;

        while let Some(result) = ws_rx.next().await {
            let msg = match result {
                Ok(msg) => msg,
                Err(e) => {
                    error!("websocket error on {id}: {e}");
                    break;
                }
            };
            if msg.is_close() {
                debug!("{id} sent close");
                break;
            }
            // Pings and binary frames carry no events.
            let Ok(text) = msg.to_str() else {
                continue;
            };
            match serde_json::from_str::<ClientMessage>(text) {
                Ok(client_msg) => self.dispatch(|lobby| lobby.handle(id, client_msg)).await,
                Err(e) => warn!("ignoring malformed frame from {id}: {e}"),
            }
        }

        self.dispatch(|lobby| lobby.disconnect(id)).await;
        // Dropping the last sender ends the writer task.
        self.outboxes.write().await.remove(&id);
        info!("connection {id} closed");
    }

    /// Applies one event under the lobby lock and queues its frames before
    /// the lock is released, so every recipient sees frames in state order.
    async fn dispatch<F>(&self, apply: F)
    where
        F: FnOnce(&mut Lobby) -> Vec<Delivery>,
    {
        let mut lobby = self.lobby.lock().await;
        let deliveries = apply(&mut *lobby);
        self.deliver(deliveries).await;
    }

    async fn deliver(&self, deliveries: Vec<Delivery>) {
        if deliveries.is_empty() {
            return;
        }
        let outboxes = self.outboxes.read().await;
        for Delivery { to, message } in deliveries {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!("failed to encode frame for {to}: {e}");
                    continue;
                }
            };
            match outboxes.get(&to) {
                Some(sender) => {
                    let _ = sender.send(Message::text(text));
                }
                None => debug!("no outbox for {to}, frame dropped"),
            }
        }
    }
}
