//! SFU control plane: room lookup and join-token minting.

use livegpt_types::BOT_IDENTITY;
use livekit_api::access_token::{AccessToken, VideoGrants};
use livekit_api::services::room::RoomClient;

use crate::supervisor::SupervisorError;

/// The room attributes the supervisor acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub sid: String,
    pub name: String,
    pub num_participants: u32,
}

/// Control-plane seam; the LiveKit implementation is
/// [`LiveKitDirectory`], tests substitute a fixture.
#[async_trait::async_trait]
pub trait RoomLookup: Send + Sync {
    /// Finds a room by name; `None` when it does not exist.
    async fn find_room(&self, name: &str) -> Result<Option<RoomInfo>, SupervisorError>;

    /// Mints a join token for the bot identity in the given room.
    fn join_token(&self, room: &str) -> Result<String, SupervisorError>;
}

/// Room service client backed by the SFU's REST API.
pub struct LiveKitDirectory {
    client: RoomClient,
    api_key: String,
    api_secret: String,
}

impl LiveKitDirectory {
    pub fn new(url: &str, api_key: &str, api_secret: &str) -> Self {
        Self {
            client: RoomClient::with_api_key(url, api_key, api_secret),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl RoomLookup for LiveKitDirectory {
    async fn find_room(&self, name: &str) -> Result<Option<RoomInfo>, SupervisorError> {
        let rooms = self
            .client
            .list_rooms(vec![name.to_string()])
            .await
            .map_err(|e| SupervisorError::RoomService(e.to_string()))?;

        Ok(rooms.into_iter().find(|room| room.name == name).map(|room| {
            RoomInfo {
                sid: room.sid,
                name: room.name,
                num_participants: room.num_participants,
            }
        }))
    }

    fn join_token(&self, room: &str) -> Result<String, SupervisorError> {
        AccessToken::with_api_key(&self.api_key, &self.api_secret)
            .with_identity(BOT_IDENTITY)
            .with_name(BOT_IDENTITY)
            .with_grants(VideoGrants {
                room_join: true,
                room: room.to_string(),
                can_publish: true,
                can_subscribe: true,
                can_publish_data: true,
                ..Default::default()
            })
            .to_jwt()
            .map_err(|e| SupervisorError::Token(e.to_string()))
    }
}
