//! Process-wide agent supervision.
//!
//! One slot per room, keyed by room sid. A `Connecting` sentinel guards
//! against duplicate creation while a connect is in flight; failed
//! connects free the slot, and agents remove their own slot when they
//! disconnect.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use livegpt_agent::{Agent, AgentOptions, ConnectRequest, Providers, RoomConnector};
use livegpt_types::BOT_IDENTITY;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::directory::RoomLookup;
use crate::webhook::{WebhookEvent, EVENT_PARTICIPANT_JOINED, EVENT_PARTICIPANT_LEFT};

/// Deadline for closing every agent during graceful shutdown.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("no such room: {0}")]
    RoomNotFound(String),

    #[error("room service error: {0}")]
    RoomService(String),

    #[error("token error: {0}")]
    Token(String),

    #[error(transparent)]
    Agent(#[from] livegpt_agent::AgentError),
}

enum AgentSlot {
    Connecting,
    Ready(Agent),
}

/// Maintains the room → agent map.
pub struct Supervisor {
    weak: Weak<Supervisor>,
    config: Config,
    providers: Providers,
    connector: Arc<dyn RoomConnector>,
    directory: Arc<dyn RoomLookup>,
    agent_options: AgentOptions,
    agents: Mutex<HashMap<String, AgentSlot>>,
}

impl Supervisor {
    pub fn new(
        config: Config,
        providers: Providers,
        connector: Arc<dyn RoomConnector>,
        directory: Arc<dyn RoomLookup>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            config,
            providers,
            connector,
            directory,
            agent_options: AgentOptions::default(),
            agents: Mutex::new(HashMap::new()),
        })
    }

    /// Number of rooms currently holding a slot (connecting or ready).
    pub fn agent_count(&self) -> usize {
        self.agents.lock().expect("supervisor mutex poisoned").len()
    }

    /// Direct join: looks the room up by name and creates an agent for
    /// it if none exists.
    pub async fn join_room(&self, name: &str) -> Result<(), SupervisorError> {
        let room = self
            .directory
            .find_room(name)
            .await?
            .ok_or_else(|| SupervisorError::RoomNotFound(name.to_string()))?;

        self.ensure_agent(&room.sid, &room.name).await
    }

    /// Handles one verified webhook event.
    pub async fn on_webhook(&self, event: WebhookEvent) {
        let Some(room) = event.room else { return };

        match event.event.as_str() {
            EVENT_PARTICIPANT_JOINED => {
                let Some(participant) = event.participant else { return };
                if participant.identity == BOT_IDENTITY {
                    return;
                }
                if let Err(e) = self.ensure_agent(&room.sid, &room.name).await {
                    error!(room = %room.name, error = %e, "error connecting agent");
                }
            }
            EVENT_PARTICIPANT_LEFT => {
                // Only the bot left in the room: disconnect it.
                if room.num_participants <= 1 {
                    let agent = {
                        let mut agents =
                            self.agents.lock().expect("supervisor mutex poisoned");
                        match agents.remove(&room.sid) {
                            Some(AgentSlot::Ready(agent)) => Some(agent),
                            Some(AgentSlot::Connecting) | None => None,
                        }
                    };
                    if let Some(agent) = agent {
                        info!(room = %room.name, "room emptied, disconnecting agent");
                        agent.close().await;
                    }
                }
            }
            other => {
                tracing::debug!(event = other, "ignoring webhook event");
            }
        }
    }

    /// Creates an agent for the room unless one already exists.
    async fn ensure_agent(&self, room_sid: &str, room_name: &str) -> Result<(), SupervisorError> {
        {
            let mut agents = self.agents.lock().expect("supervisor mutex poisoned");
            if agents.contains_key(room_sid) {
                info!(room = %room_name, "agent already connected");
                return Ok(());
            }
            agents.insert(room_sid.to_string(), AgentSlot::Connecting);
        }

        let result = self.connect_agent(room_sid, room_name).await;
        if let Err(ref e) = result {
            warn!(room = %room_name, error = %e, "agent connect failed, freeing slot");
            let mut agents = self.agents.lock().expect("supervisor mutex poisoned");
            agents.remove(room_sid);
        }
        result
    }

    async fn connect_agent(&self, room_sid: &str, room_name: &str) -> Result<(), SupervisorError> {
        let token = self.directory.join_token(room_name)?;

        info!(room = %room_name, "connecting agent");
        let agent = Agent::connect(
            self.connector.as_ref(),
            ConnectRequest {
                url: self.config.livekit.url.clone(),
                token,
                room: room_name.to_string(),
                identity: BOT_IDENTITY.to_string(),
                name: BOT_IDENTITY.to_string(),
                auto_subscribe: false,
            },
            self.providers.clone(),
            self.agent_options.clone(),
        )
        .await?;

        // The agent frees its own slot when it goes away.
        let supervisor = self.weak.clone();
        let sid = room_sid.to_string();
        agent.on_disconnected(move || {
            if let Some(supervisor) = Weak::upgrade(&supervisor) {
                let mut agents = supervisor
                    .agents
                    .lock()
                    .expect("supervisor mutex poisoned");
                agents.remove(&sid);
            }
        });

        let mut agents = self.agents.lock().expect("supervisor mutex poisoned");
        agents.insert(room_sid.to_string(), AgentSlot::Ready(agent));
        Ok(())
    }

    /// Closes every agent, bounded by a deadline.
    pub async fn shutdown(&self) {
        let agents: Vec<Agent> = {
            let mut slots = self.agents.lock().expect("supervisor mutex poisoned");
            slots
                .drain()
                .filter_map(|(_, slot)| match slot {
                    AgentSlot::Ready(agent) => Some(agent),
                    AgentSlot::Connecting => None,
                })
                .collect()
        };

        if agents.is_empty() {
            return;
        }
        info!(count = agents.len(), "closing agents");

        let close_all = async {
            for agent in &agents {
                agent.close().await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_DEADLINE, close_all).await.is_err() {
            warn!("shutdown deadline exceeded, abandoning remaining agents");
        }
    }
}
