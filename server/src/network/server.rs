//! TCP game server: one task per connection, one reply per request.

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use catbattle_shared::{ClientMessage, ErrorKind, ServerMessage, PROTOCOL_VERSION};
use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

use super::codec::{read_frame, send_server_message, FrameError};
use crate::game::{GameService, ServiceError};

/// Game server
pub struct Server {
    listener: TcpListener,
    service: Arc<GameService>,
}

impl Server {
    pub async fn bind(addr: &str, service: Arc<GameService>) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, service })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Accept connections until the listener fails
    pub async fn run(self) -> Result<(), std::io::Error> {
        info!("Listening on {}", self.local_addr()?);

        loop {
            let (stream, addr) = self.listener.accept().await?;
            let service = self.service.clone();
            tokio::spawn(async move {
                info!("Client connected from {}", addr);
                match serve_connection(stream, addr, &service).await {
                    Ok(()) => info!("Client {} disconnected", addr),
                    Err(e) => warn!("Connection {} closed: {}", addr, e),
                }
            });
        }
    }
}

/// Run the request loop for one client until it disconnects.
///
/// The first message must be a `Hello` with a matching protocol version.
pub async fn serve_connection<S>(mut stream: S, peer: impl Display, service: &GameService) -> Result<(), FrameError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(frame) = read_frame(&mut stream).await? else {
        return Ok(());
    };
    match ClientMessage::deserialize(&frame) {
        Ok(ClientMessage::Hello { protocol_version }) if protocol_version == PROTOCOL_VERSION => {
            send_server_message(
                &mut stream,
                &ServerMessage::Welcome {
                    protocol_version: PROTOCOL_VERSION,
                },
            )
            .await?;
        }
        Ok(ClientMessage::Hello { protocol_version }) => {
            warn!(
                "Client {} speaks protocol {}, expected {}",
                peer, protocol_version, PROTOCOL_VERSION
            );
            let msg = ServerMessage::error(
                ErrorKind::InvalidRequest,
                format!("protocol version mismatch: server speaks {}", PROTOCOL_VERSION),
            );
            return send_server_message(&mut stream, &msg).await;
        }
        _ => {
            warn!("Client {} skipped the handshake", peer);
            let msg = ServerMessage::error(ErrorKind::InvalidRequest, "expected Hello");
            return send_server_message(&mut stream, &msg).await;
        }
    }

    while let Some(frame) = read_frame(&mut stream).await? {
        let message = match ClientMessage::deserialize(&frame) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Failed to deserialize message from {}: {}", peer, e);
                let msg = ServerMessage::error(ErrorKind::InvalidRequest, "malformed message");
                send_server_message(&mut stream, &msg).await?;
                continue;
            }
        };

        if message == ClientMessage::Disconnect {
            break;
        }

        debug!("{} -> {:?}", peer, message);
        let reply = handle_message(service, message).await;
        send_reply(&mut stream, &peer, &reply).await?;
    }

    Ok(())
}

/// Send a reply, swapping in an error when it does not fit in one frame.
///
/// The size check runs before anything is written, so the stream stays in sync.
async fn send_reply<S>(stream: &mut S, peer: &impl Display, reply: &ServerMessage) -> Result<(), FrameError>
where
    S: AsyncWrite + Unpin,
{
    match send_server_message(stream, reply).await {
        Err(FrameError::TooLarge(len)) => {
            warn!("Reply to {} is {} bytes, over the frame limit", peer, len);
            let msg = ServerMessage::error(ErrorKind::Internal, "response too large");
            send_server_message(stream, &msg).await
        }
        other => other,
    }
}

/// Run one request against the service and build its reply
async fn handle_message(service: &GameService, message: ClientMessage) -> ServerMessage {
    let result = match message {
        ClientMessage::Hello { .. } => Ok(ServerMessage::error(ErrorKind::InvalidRequest, "already connected")),
        ClientMessage::Disconnect => Ok(ServerMessage::error(ErrorKind::InvalidRequest, "disconnecting")),

        // === Accounts ===
        ClientMessage::GetUser { user_id } => service.get_user(user_id).await.map(ServerMessage::User),
        ClientMessage::FindUser { username } => service.find_user(&username).await.map(ServerMessage::User),
        ClientMessage::RegisterUser { username } => service.register_user(&username).await.map(ServerMessage::User),
        ClientMessage::UpdateUser { user_id, update } => {
            service.update_user(user_id, update).await.map(ServerMessage::User)
        }

        // === Cats ===
        ClientMessage::ListCats => service.list_cats().await.map(ServerMessage::Cats),
        ClientMessage::ListUserCats { user_id } => service.list_user_cats(user_id).await.map(ServerMessage::OwnedCats),
        ClientMessage::GetActiveCat { user_id } => service.active_cat(user_id).await.map(ServerMessage::OwnedCat),
        ClientMessage::AdoptCat { user_id, cat_id } => {
            service.adopt_cat(user_id, cat_id).await.map(ServerMessage::OwnedCat)
        }
        ClientMessage::ActivateCat { user_id, owned_cat_id } => {
            service.activate_cat(user_id, owned_cat_id).await.map(ServerMessage::OwnedCat)
        }

        // === Battles ===
        ClientMessage::StartBattle {
            user_id,
            player_cat_id,
            opponent_cat_id,
        } => service
            .start_battle(user_id, player_cat_id, opponent_cat_id)
            .await
            .map(ServerMessage::Battle),
        ClientMessage::GetActiveBattle { user_id } => service.active_battle(user_id).await.map(ServerMessage::Battle),
        ClientMessage::BattleAction {
            battle_id,
            action,
            item_id,
        } => service
            .battle_action(battle_id, &action, item_id)
            .await
            .map(ServerMessage::Battle),

        // === Items ===
        ClientMessage::ListItems => service.list_items().await.map(ServerMessage::Items),
        ClientMessage::ListUserItems { user_id } => {
            service.list_user_items(user_id).await.map(ServerMessage::OwnedItems)
        }
        ClientMessage::GiveItem {
            user_id,
            item_id,
            quantity,
        } => service
            .give_item(user_id, item_id, quantity)
            .await
            .map(ServerMessage::OwnedItem),
    };

    result.unwrap_or_else(error_reply)
}

fn error_reply(err: ServiceError) -> ServerMessage {
    match err.kind() {
        ErrorKind::Internal => {
            error!("Request failed: {}", err);
            ServerMessage::error(ErrorKind::Internal, "internal server error")
        }
        kind => ServerMessage::error(kind, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::codec::{recv_server_message, send_client_message};
    use crate::persistence::{seed_catalog, MemoryStore, Store};
    use catbattle_shared::{BattleStatus, NewBattle, ScriptedRolls};
    use tokio::io::{duplex, DuplexStream};

    async fn connect() -> DuplexStream {
        let store = Arc::new(MemoryStore::new());
        seed_catalog(store.as_ref(), true).await.unwrap();
        connect_to(store)
    }

    fn connect_to(store: Arc<MemoryStore>) -> DuplexStream {
        let service = Arc::new(GameService::new(store, Box::new(ScriptedRolls::constant(0.5))));

        let (client, server) = duplex(64 * 1024);
        tokio::spawn(async move {
            let _ = serve_connection(server, "test", &service).await;
        });
        client
    }

    async fn request(client: &mut DuplexStream, msg: ClientMessage) -> ServerMessage {
        send_client_message(client, &msg).await.unwrap();
        recv_server_message(client).await.unwrap().unwrap()
    }

    async fn handshake(client: &mut DuplexStream) {
        let reply = request(
            client,
            ClientMessage::Hello {
                protocol_version: PROTOCOL_VERSION,
            },
        )
        .await;
        assert_eq!(
            reply,
            ServerMessage::Welcome {
                protocol_version: PROTOCOL_VERSION
            }
        );
    }

    #[tokio::test]
    async fn test_requests_before_hello_are_refused() {
        let mut client = connect().await;
        let reply = request(&mut client, ClientMessage::ListCats).await;
        assert!(matches!(reply, ServerMessage::Error { kind: ErrorKind::InvalidRequest, .. }));
        assert!(recv_server_message(&mut client).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_version_mismatch_closes_connection() {
        let mut client = connect().await;
        let reply = request(&mut client, ClientMessage::Hello { protocol_version: 0 }).await;
        assert!(matches!(reply, ServerMessage::Error { kind: ErrorKind::InvalidRequest, .. }));
        assert!(recv_server_message(&mut client).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_battle_over_the_wire() {
        let mut client = connect().await;
        handshake(&mut client).await;

        let ServerMessage::User(user) = request(&mut client, ClientMessage::FindUser { username: "player1".into() }).await
        else {
            panic!("expected user");
        };
        let ServerMessage::OwnedCat(active) = request(&mut client, ClientMessage::GetActiveCat { user_id: user.id }).await
        else {
            panic!("expected active cat");
        };

        let ServerMessage::Battle(started) = request(
            &mut client,
            ClientMessage::StartBattle {
                user_id: user.id,
                player_cat_id: active.owned.id,
                opponent_cat_id: 4,
            },
        )
        .await
        else {
            panic!("expected battle");
        };

        let reply = request(
            &mut client,
            ClientMessage::BattleAction {
                battle_id: started.battle.id,
                action: "attack".into(),
                item_id: None,
            },
        )
        .await;
        let ServerMessage::Battle(finished) = reply else {
            panic!("expected battle, got {:?}", reply);
        };
        assert_eq!(finished.battle.status, BattleStatus::Won);

        let ServerMessage::User(after) = request(&mut client, ClientMessage::GetUser { user_id: user.id }).await else {
            panic!("expected user");
        };
        assert_eq!(after.coins, user.coins + 100);
    }

    #[tokio::test]
    async fn test_oversized_reply_becomes_error() {
        let store = Arc::new(MemoryStore::new());
        seed_catalog(store.as_ref(), true).await.unwrap();
        let demo = store.get_user_by_username("player1").await.unwrap().unwrap();
        let active = store.active_owned_cat(demo.id).await.unwrap().unwrap();

        let mut battle = store
            .create_battle(NewBattle {
                user_id: demo.id,
                player_cat_id: active.id,
                opponent_cat_id: 4,
                player_health: 378,
                opponent_health: 100,
            })
            .await
            .unwrap();
        battle.log = vec!["Thunder King takes a defensive stance!".repeat(4); 1_000];
        store.record_battle_turn(&battle, None).await.unwrap();

        let mut client = connect_to(store);
        handshake(&mut client).await;

        let reply = request(&mut client, ClientMessage::GetActiveBattle { user_id: demo.id }).await;
        assert_eq!(reply, ServerMessage::error(ErrorKind::Internal, "response too large"));

        let reply = request(&mut client, ClientMessage::ListCats).await;
        assert!(matches!(reply, ServerMessage::Cats(_)));
    }

    #[tokio::test]
    async fn test_errors_keep_connection_open() {
        let mut client = connect().await;
        handshake(&mut client).await;

        let reply = request(&mut client, ClientMessage::GetUser { user_id: 999 }).await;
        assert_eq!(reply, ServerMessage::error(ErrorKind::NotFound, "user not found"));

        crate::network::codec::write_frame(&mut client, &[0xff, 0xff, 0xff]).await.unwrap();
        let reply = recv_server_message(&mut client).await.unwrap().unwrap();
        assert!(matches!(reply, ServerMessage::Error { kind: ErrorKind::InvalidRequest, .. }));

        let reply = request(&mut client, ClientMessage::ListCats).await;
        assert!(matches!(reply, ServerMessage::Cats(cats) if cats.len() == 6));

        send_client_message(&mut client, &ClientMessage::Disconnect).await.unwrap();
        assert!(recv_server_message(&mut client).await.unwrap().is_none());
    }
}
