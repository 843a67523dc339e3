//! In-process room implementation.
//!
//! A small SFU look-alike: rooms with participants, track publish and
//! subscribe fan-out, reliable data broadcast, and a media pump that
//! pulls the agent's outbound track at its packet cadence. Integration
//! tests and the dev loop run the whole agent pipeline through it; a
//! deployment binds the same traits to the real conferencing SDK.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use livegpt_media::{RtpPacket, TrackCodec, OPUS_SILENCE_FRAME};
use livegpt_voice::OutboundTrack;
use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::room::{
    ConnectRequest, ParticipantInfo, RemoteTrack, RoomConnector, RoomEvent, RoomHandle, TrackInfo,
    TrackSource,
};

/// Process-local registry of rooms.
#[derive(Default)]
pub struct LocalSfu {
    rooms: Mutex<HashMap<String, Arc<LocalRoom>>>,
}

impl LocalSfu {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the room with this name, creating it if needed.
    pub fn room(&self, name: &str) -> Arc<LocalRoom> {
        let mut rooms = self.rooms.lock().expect("sfu mutex poisoned");
        rooms
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(LocalRoom {
                    name: name.to_string(),
                    state: Mutex::new(RoomState::default()),
                    next_id: AtomicU64::new(1),
                })
            })
            .clone()
    }

    /// Looks a room up without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<LocalRoom>> {
        self.rooms
            .lock()
            .expect("sfu mutex poisoned")
            .get(name)
            .cloned()
    }

    /// Joins a room under the given identity.
    pub fn join(
        &self,
        room: &str,
        identity: &str,
        name: &str,
        metadata: &str,
    ) -> (Arc<LocalRoomHandle>, mpsc::UnboundedReceiver<RoomEvent>) {
        let room = self.room(room);
        let events = room.join(identity, name, metadata);
        (
            Arc::new(LocalRoomHandle {
                room,
                identity: identity.to_string(),
            }),
            events,
        )
    }
}

#[derive(Default)]
struct RoomState {
    peers: HashMap<String, Peer>,
    tracks: HashMap<String, PublishedTrack>,
}

struct Peer {
    info: ParticipantInfo,
    events: mpsc::UnboundedSender<RoomEvent>,
}

struct PublishedTrack {
    info: TrackInfo,
    owner: String,
    subscribers: HashMap<String, mpsc::UnboundedSender<RtpPacket>>,
}

/// One room: participants, published tracks, subscription fan-out.
pub struct LocalRoom {
    name: String,
    state: Mutex<RoomState>,
    next_id: AtomicU64,
}

impl LocalRoom {
    fn next_sid(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn join(&self, identity: &str, name: &str, metadata: &str) -> mpsc::UnboundedReceiver<RoomEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let info = ParticipantInfo {
            sid: self.next_sid("PA"),
            identity: identity.to_string(),
            name: name.to_string(),
            metadata: metadata.to_string(),
        };

        let (connected, replayed) = {
            let mut state = self.state.lock().expect("room mutex poisoned");

            let connected: Vec<_> = state
                .peers
                .values()
                .map(|peer| (peer.events.clone(), info.clone()))
                .collect();

            // The new participant learns about tracks published before it
            // arrived, the way a real SFU replays publications on join.
            let replayed: Vec<_> = state
                .tracks
                .values()
                .filter_map(|track| {
                    state
                        .peers
                        .get(&track.owner)
                        .map(|owner| (track.info.clone(), owner.info.clone()))
                })
                .collect();

            state.peers.insert(
                identity.to_string(),
                Peer {
                    info,
                    events: tx.clone(),
                },
            );
            (connected, replayed)
        };

        for (peer, info) in connected {
            let _ = peer.send(RoomEvent::ParticipantConnected(info));
        }
        for (track, owner) in replayed {
            let _ = tx.send(RoomEvent::TrackPublished {
                track,
                participant: owner,
            });
        }

        rx
    }

    fn publish(&self, owner: &str, source: TrackSource, codec: TrackCodec) -> Option<TrackInfo> {
        let info = TrackInfo {
            sid: self.next_sid("TR"),
            source,
            codec,
        };

        let notified = {
            let mut state = self.state.lock().expect("room mutex poisoned");
            let owner_info = state.peers.get(owner)?.info.clone();
            state.tracks.insert(
                info.sid.clone(),
                PublishedTrack {
                    info: info.clone(),
                    owner: owner.to_string(),
                    subscribers: HashMap::new(),
                },
            );
            state
                .peers
                .values()
                .filter(|peer| peer.info.identity != owner)
                .map(|peer| (peer.events.clone(), info.clone(), owner_info.clone()))
                .collect::<Vec<_>>()
        };

        for (peer, track, participant) in notified {
            let _ = peer.send(RoomEvent::TrackPublished { track, participant });
        }
        Some(info)
    }

    fn fan_out(&self, track_sid: &str, packet: RtpPacket) {
        let subscribers = {
            let state = self.state.lock().expect("room mutex poisoned");
            match state.tracks.get(track_sid) {
                Some(track) => track.subscribers.values().cloned().collect::<Vec<_>>(),
                None => return,
            }
        };
        for subscriber in subscribers {
            let _ = subscriber.send(packet.clone());
        }
    }

    fn leave(&self, identity: &str) {
        let (peer, dropped_tracks, remaining) = {
            let mut state = self.state.lock().expect("room mutex poisoned");
            let Some(peer) = state.peers.remove(identity) else {
                return;
            };

            let dropped: Vec<String> = state
                .tracks
                .iter()
                .filter(|(_, track)| track.owner == identity)
                .map(|(sid, _)| sid.clone())
                .collect();
            let mut dropped_tracks = Vec::new();
            for sid in dropped {
                if let Some(track) = state.tracks.remove(&sid) {
                    // Subscribers see the track end: their feed channel
                    // drops here and an unsubscribe event follows.
                    let watchers: Vec<_> = track
                        .subscribers
                        .keys()
                        .filter_map(|watcher| state.peers.get(watcher))
                        .map(|p| p.events.clone())
                        .collect();
                    dropped_tracks.push((sid, watchers));
                }
            }

            let remaining: Vec<_> = state
                .peers
                .values()
                .map(|p| (p.events.clone(), peer.info.clone()))
                .collect();
            (peer, dropped_tracks, remaining)
        };

        for (sid, watchers) in dropped_tracks {
            for watcher in watchers {
                let _ = watcher.send(RoomEvent::TrackUnsubscribed {
                    track_sid: sid.clone(),
                    participant: peer.info.clone(),
                });
            }
        }
        for (events, info) in remaining {
            let _ = events.send(RoomEvent::ParticipantDisconnected(info));
        }
        let _ = peer.events.send(RoomEvent::Disconnected);
    }
}

/// A participant's handle onto a [`LocalRoom`].
pub struct LocalRoomHandle {
    room: Arc<LocalRoom>,
    identity: String,
}

impl LocalRoomHandle {
    /// Publishes a microphone track and returns the feed used to push
    /// RTP into it. Test drivers use this to play the human side.
    pub fn publish_microphone(&self, codec: TrackCodec) -> MicrophoneFeed {
        let info = self
            .room
            .publish(&self.identity, TrackSource::Microphone, codec)
            .expect("publisher has left the room");
        MicrophoneFeed {
            room: self.room.clone(),
            track_sid: info.sid,
        }
    }

    /// Publishes a non-audio track (used by tests to check that only
    /// microphones are transcribed).
    pub fn publish_source(&self, source: TrackSource, codec: TrackCodec) -> Option<TrackInfo> {
        self.room.publish(&self.identity, source, codec)
    }
}

#[async_trait::async_trait]
impl RoomHandle for LocalRoomHandle {
    fn name(&self) -> String {
        self.room.name.clone()
    }

    fn local_identity(&self) -> String {
        self.identity.clone()
    }

    fn remote_participants(&self) -> Vec<ParticipantInfo> {
        let state = self.room.state.lock().expect("room mutex poisoned");
        state
            .peers
            .values()
            .filter(|peer| peer.info.identity != self.identity)
            .map(|peer| peer.info.clone())
            .collect()
    }

    async fn set_subscribed(&self, track_sid: &str, subscribed: bool) -> Result<(), AgentError> {
        if subscribed {
            let (tx, rx) = mpsc::unbounded_channel();
            let (event, target) = {
                let mut state = self.room.state.lock().expect("room mutex poisoned");
                let (subscriber_events, subscriber_info) = state
                    .peers
                    .get(&self.identity)
                    .map(|peer| (peer.events.clone(), peer.info.clone()))
                    .ok_or_else(|| AgentError::Room("not in the room".to_string()))?;

                let (track_info, owner) = {
                    let track = state
                        .tracks
                        .get_mut(track_sid)
                        .ok_or_else(|| AgentError::Room(format!("unknown track {track_sid}")))?;
                    track.subscribers.insert(self.identity.clone(), tx);
                    (track.info.clone(), track.owner.clone())
                };

                let remote: Arc<dyn RemoteTrack> = Arc::new(LocalRemoteTrack {
                    info: track_info,
                    packets: tokio::sync::Mutex::new(rx),
                });
                let owner_info = state
                    .peers
                    .get(&owner)
                    .map(|peer| peer.info.clone())
                    .unwrap_or(subscriber_info);
                (
                    RoomEvent::TrackSubscribed {
                        track: remote,
                        participant: owner_info,
                    },
                    subscriber_events,
                )
            };
            let _ = target.send(event);
        } else {
            let (event, target) = {
                let mut state = self.room.state.lock().expect("room mutex poisoned");
                let subscriber = state
                    .peers
                    .get(&self.identity)
                    .map(|peer| peer.events.clone())
                    .ok_or_else(|| AgentError::Room("not in the room".to_string()))?;

                let owner = {
                    let Some(track) = state.tracks.get_mut(track_sid) else {
                        return Ok(());
                    };
                    track.subscribers.remove(&self.identity);
                    track.owner.clone()
                };
                let owner_info = state
                    .peers
                    .get(&owner)
                    .map(|peer| peer.info.clone())
                    .unwrap_or_else(|| ParticipantInfo {
                        sid: String::new(),
                        identity: owner,
                        name: String::new(),
                        metadata: String::new(),
                    });
                (
                    RoomEvent::TrackUnsubscribed {
                        track_sid: track_sid.to_string(),
                        participant: owner_info,
                    },
                    subscriber,
                )
            };
            let _ = target.send(event);
        }
        Ok(())
    }

    async fn publish_track(&self, track: Arc<OutboundTrack>) -> Result<(), AgentError> {
        let info = self
            .room
            .publish(&self.identity, TrackSource::Microphone, TrackCodec::opus())
            .ok_or_else(|| AgentError::Room("not in the room".to_string()))?;

        // Media pump: one pull per packet interval; silence keeps the
        // clock but is not delivered to subscribers.
        let room = self.room.clone();
        tokio::spawn(async move {
            let mut sequence: u16 = 0;
            let mut timestamp: u32 = 0;
            while let Some(sample) = track.next_sample() {
                if sample.data[..] != OPUS_SILENCE_FRAME[..] {
                    room.fan_out(
                        &info.sid,
                        RtpPacket {
                            sequence,
                            timestamp,
                            payload: sample.data.clone(),
                        },
                    );
                }
                sequence = sequence.wrapping_add(1);
                timestamp = timestamp
                    .wrapping_add((sample.duration.as_micros() as u32).saturating_mul(48) / 1000);
                tokio::time::sleep(sample.duration).await;
            }
        });
        Ok(())
    }

    async fn publish_data(&self, payload: Vec<u8>) -> Result<(), AgentError> {
        let targets = {
            let state = self.room.state.lock().expect("room mutex poisoned");
            let sender = state
                .peers
                .get(&self.identity)
                .map(|peer| peer.info.clone())
                .ok_or_else(|| AgentError::Room("not in the room".to_string()))?;
            state
                .peers
                .values()
                .filter(|peer| peer.info.identity != self.identity)
                .map(|peer| (peer.events.clone(), sender.clone()))
                .collect::<Vec<_>>()
        };

        for (events, sender) in targets {
            let _ = events.send(RoomEvent::DataReceived {
                payload: payload.clone(),
                participant: sender.clone(),
            });
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.room.leave(&self.identity);
    }
}

/// Feed side of a published microphone.
pub struct MicrophoneFeed {
    room: Arc<LocalRoom>,
    track_sid: String,
}

impl MicrophoneFeed {
    pub fn track_sid(&self) -> &str {
        &self.track_sid
    }

    pub fn send(&self, packet: RtpPacket) {
        self.room.fan_out(&self.track_sid, packet);
    }
}

struct LocalRemoteTrack {
    info: TrackInfo,
    packets: tokio::sync::Mutex<mpsc::UnboundedReceiver<RtpPacket>>,
}

#[async_trait::async_trait]
impl RemoteTrack for LocalRemoteTrack {
    fn info(&self) -> TrackInfo {
        self.info.clone()
    }

    async fn read_rtp(&self) -> Option<RtpPacket> {
        self.packets.lock().await.recv().await
    }
}

/// Connects agents to [`LocalSfu`] rooms.
pub struct LocalConnector {
    sfu: Arc<LocalSfu>,
}

impl LocalConnector {
    pub fn new(sfu: Arc<LocalSfu>) -> Self {
        Self { sfu }
    }
}

#[async_trait::async_trait]
impl RoomConnector for LocalConnector {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<(Arc<dyn RoomHandle>, mpsc::UnboundedReceiver<RoomEvent>), AgentError> {
        let (handle, events) = self
            .sfu
            .join(&request.room, &request.identity, &request.name, "");
        Ok((handle as Arc<dyn RoomHandle>, events))
    }
}
