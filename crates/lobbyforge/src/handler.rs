//! Request dispatch: typed requests and raw frames in, responses out.
//!
//! Transport framing stays outside this crate. Whatever carries the bytes
//! hands each inbound frame to [`LobbyService::handle_frame`] and writes
//! the returned bytes back; events go out through [`encode_event`].

use lobbyforge_protocol::{
    ClientRequest, Codec, Envelope, LobbyEvent, Payload, ProtocolError, ServerResponse,
};
use lobbyforge_store::SessionStore;
use lobbyforge_wallet::WalletGateway;

use crate::{LobbyService, LobbyforgeError};

impl<S: SessionStore, W: WalletGateway> LobbyService<S, W> {
    /// Runs one request. Failures become [`ServerResponse::Error`].
    pub async fn dispatch(&self, request: ClientRequest) -> ServerResponse {
        let result = match request {
            ClientRequest::ListLobbies { wager, game_type } => self
                .list_lobbies(wager, game_type)
                .await
                .map(|lobbies| ServerResponse::LobbyList { lobbies }),
            ClientRequest::CreateLobby {
                wallet,
                wager,
                game_type,
                max_players,
            } => self
                .create_lobby(wallet, wager, game_type, max_players)
                .await
                .map(|lobby| ServerResponse::Lobby { lobby }),
            ClientRequest::JoinLobby { lobby_id, wallet } => self
                .join_lobby(&lobby_id, wallet)
                .await
                .map(|lobby| ServerResponse::Lobby { lobby }),
            ClientRequest::LeaveLobby { lobby_id, wallet } => self
                .leave_lobby(&lobby_id, wallet)
                .await
                .map(|_| ServerResponse::Left { lobby_id }),
            ClientRequest::SubmitResults { lobby_id, results } => self
                .submit_results(&lobby_id, results)
                .await
                .map(|summary| ServerResponse::Settlement { summary }),
        };

        result.unwrap_or_else(|e| {
            tracing::debug!(code = e.code(), kind = e.kind(), error = %e, "request failed");
            e.to_response()
        })
    }

    /// Decodes a request envelope, dispatches it, and encodes the reply.
    ///
    /// The reply echoes the request's `seq`. A frame that does not decode
    /// gets an error reply with `seq` 0; only encoding the reply itself
    /// can fail.
    pub async fn handle_frame<C: Codec>(
        &self,
        codec: &C,
        frame: &[u8],
    ) -> Result<Vec<u8>, LobbyforgeError> {
        let (seq, response) = match codec.decode::<Envelope>(frame) {
            Ok(Envelope {
                seq,
                payload: Payload::Request(request),
            }) => (seq, self.dispatch(request).await),
            Ok(Envelope { seq, .. }) => {
                let err: LobbyforgeError =
                    ProtocolError::InvalidMessage("expected a request".into()).into();
                (seq, err.to_response())
            }
            Err(e) => {
                tracing::debug!(error = %e, "failed to decode frame");
                (0, LobbyforgeError::from(e).to_response())
            }
        };

        let reply = Envelope {
            seq,
            payload: Payload::Response(response),
        };
        Ok(codec.encode(&reply)?)
    }
}

/// Encodes a lobby event for delivery to a subscriber.
pub fn encode_event<C: Codec>(
    codec: &C,
    seq: u64,
    event: LobbyEvent,
) -> Result<Vec<u8>, LobbyforgeError> {
    let envelope = Envelope {
        seq,
        payload: Payload::Event(event),
    };
    Ok(codec.encode(&envelope)?)
}
