//! Room session coordinator: room registry, attendance and per-room workers.
//!
//! Architecture:
//! ```text
//! connection A ──┐                         ┌── worker(R1) owns Room R1
//!                ├── RoomSessionCoordinator ┤     roster + MixingEngine
//! connection B ──┘   rooms: id → handle     └── worker(R2) owns Room R2
//!                    attendance: member → id
//!                           │
//!                           ▼
//!                        Outbox ──► member mailboxes
//! ```
//!
//! Every command for a room goes through that room's mpsc queue and is
//! executed by its single worker task, so roster edits, buffering and mix
//! cycles for one room never interleave while separate rooms run in
//! parallel. The registry locks are only held for lookups and inserts, never
//! across a worker round-trip.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use uuid::Uuid;

use crate::engine::{MixerConfig, MixingEngine};
use crate::error::SessionError;
use crate::graph::{MixBus, ProcessingGraph};
use crate::outbox::{Outbound, Outbox, OutboxStats};
use crate::protocol::{
    ClientEvent, CompositionMetadata, Member, PinCheck, RoomSpec, RoomSummary, RosterEntry,
    ServerEvent,
};
use crate::room::{Dissolution, LeaveOutcome, Room, RoomCounters};
use crate::sink::{CompositionSink, MemorySink, SessionArtifact};

/// Forced-exit notice sent when the host departs.
pub const HOST_LEFT_MESSAGE: &str = "The host has disconnected. Please exit the room.";
/// Notice sent to every member when a session is ended.
pub const SESSION_ENDED_MESSAGE: &str = "This room's session has ended. Please exit.";

/// Builds a fresh processing graph for each new room.
pub type GraphFactory = Arc<dyn Fn() -> Box<dyn ProcessingGraph> + Send + Sync>;

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Mixer settings applied to every room
    pub mixer: MixerConfig,
    /// Commands queued per room before senders wait
    pub room_queue_depth: usize,
    /// Events buffered per member mailbox before drops
    pub mailbox_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mixer: MixerConfig::default(),
            room_queue_depth: 256,
            mailbox_capacity: 256,
        }
    }
}

/// Work executed by a room worker.
enum RoomCommand {
    Join {
        member_id: Uuid,
        member: Member,
        reply: oneshot::Sender<Result<Vec<RosterEntry>, SessionError>>,
    },
    Leave {
        member_id: Uuid,
        reply: oneshot::Sender<Result<LeaveOutcome, SessionError>>,
    },
    Start {
        requester: Uuid,
        reply: oneshot::Sender<Result<Vec<Uuid>, SessionError>>,
    },
    Audio {
        member_id: Uuid,
        samples: Vec<f32>,
        reply: oneshot::Sender<Result<bool, SessionError>>,
    },
    Dissolve {
        reply: oneshot::Sender<Dissolution>,
    },
    Roster {
        reply: oneshot::Sender<Vec<RosterEntry>>,
    },
}

/// Registry entry for an active room.
struct RoomHandle {
    spec: RoomSpec,
    counters: Arc<RoomCounters>,
    commands: mpsc::Sender<RoomCommand>,
}

/// Owns every active room and routes member events to them.
pub struct RoomSessionCoordinator {
    config: SessionConfig,
    rooms: RwLock<HashMap<String, RoomHandle>>,
    /// member id → room id
    attendance: RwLock<HashMap<Uuid, String>>,
    outbox: Arc<Outbox>,
    sink: Arc<dyn CompositionSink>,
    graph_factory: Option<GraphFactory>,
}

impl RoomSessionCoordinator {
    /// Create a coordinator. Fails if the mixer configuration is invalid.
    pub fn new(config: SessionConfig, sink: Arc<dyn CompositionSink>) -> Result<Self, SessionError> {
        config.mixer.validate()?;
        Ok(Self::build(config, sink))
    }

    /// Default configuration with an in-memory sink.
    pub fn with_defaults() -> Self {
        Self::build(SessionConfig::default(), Arc::new(MemorySink::new()))
    }

    fn build(config: SessionConfig, sink: Arc<dyn CompositionSink>) -> Self {
        Self {
            outbox: Arc::new(Outbox::new(config.mailbox_capacity)),
            config,
            rooms: RwLock::new(HashMap::new()),
            attendance: RwLock::new(HashMap::new()),
            sink,
            graph_factory: None,
        }
    }

    /// Use a custom processing graph for rooms created from now on.
    ///
    /// The factory's render quantum must divide the block size.
    pub fn with_graph_factory(mut self, factory: GraphFactory) -> Result<Self, SessionError> {
        MixingEngine::with_graph(self.config.mixer.clone(), factory())?;
        self.graph_factory = Some(factory);
        Ok(self)
    }

    // ─── Connections ─────────────────────────────────────────────

    /// Register a connection's mailbox and send it the room table.
    pub async fn connect(&self, member_id: Uuid) -> mpsc::Receiver<Outbound> {
        let rx = self.outbox.register(member_id).await;
        self.outbox
            .send(member_id, ServerEvent::Connected { member_id })
            .await;
        let table = self.room_table().await;
        self.outbox.send(member_id, ServerEvent::UpdateRooms(table)).await;
        log::debug!("Member {member_id} connected");
        rx
    }

    /// Connection closed: leave any room, then drop the mailbox.
    pub async fn disconnect(&self, member_id: Uuid) {
        self.outbox.unregister(&member_id).await;
        let room_id = self.attendance.read().await.get(&member_id).cloned();
        if let Some(room_id) = room_id {
            log::debug!("Member {member_id} disconnected from room {room_id}");
            self.leave_room(member_id, &room_id).await;
        }
        self.attendance.write().await.remove(&member_id);
    }

    /// Single inbound entry point for transports.
    ///
    /// Errors are reported to the originating member as `RoomError`.
    pub async fn handle(&self, member_id: Uuid, event: ClientEvent) {
        log::debug!("Event {} from {member_id}", event.kind());
        let result = match event {
            ClientEvent::UpdateRooms => {
                let table = self.room_table().await;
                self.outbox.send(member_id, ServerEvent::UpdateRooms(table)).await;
                Ok(())
            }
            ClientEvent::CreateRoom { room, member } => {
                self.create_room(member_id, room, member).await
            }
            ClientEvent::LeaveRoom { room_id } => {
                self.leave_room(member_id, &room_id).await;
                Ok(())
            }
            ClientEvent::VerifyPin { room_id, pin } => {
                let check = match self.verify_pin(&room_id, &pin).await {
                    Ok(true) => PinCheck::Accepted,
                    Ok(false) => PinCheck::Incorrect,
                    Err(_) => PinCheck::Unavailable,
                };
                self.outbox.send(member_id, ServerEvent::VerifyPin(check)).await;
                Ok(())
            }
            ClientEvent::JoinRoom { room_id, member } => {
                self.join_room(member_id, &room_id, member).await
            }
            ClientEvent::StartSession { room_id } => {
                self.start_session(member_id, &room_id).await
            }
            ClientEvent::SendAudio { samples } => {
                self.send_audio(member_id, samples).await.map(|_| ())
            }
            ClientEvent::EndSession { room_id, metadata } => {
                self.end_session(&room_id, metadata).await.map(|_| ())
            }
        };

        if let Err(e) = result {
            if matches!(e, SessionError::Underflow { .. }) {
                log::error!("Mixer invariant violated for {member_id}: {e}");
            } else {
                log::info!("Rejected event from {member_id}: {e}");
            }
            self.outbox.send(member_id, ServerEvent::RoomError(e.to_string())).await;
        }
    }

    // ─── Room operations ─────────────────────────────────────────

    /// Create a room with `member_id` as its host.
    ///
    /// The member only leaves its previous room once the new one exists.
    pub async fn create_room(
        &self,
        member_id: Uuid,
        spec: RoomSpec,
        member: Member,
    ) -> Result<(), SessionError> {
        let room_id = spec.id.clone();
        let roster = {
            let mut rooms = self.rooms.write().await;
            if rooms.contains_key(&room_id) {
                return Err(SessionError::DuplicateRoom(room_id));
            }
            let engine = match &self.graph_factory {
                Some(factory) => MixingEngine::with_graph(self.config.mixer.clone(), factory())?,
                None => MixingEngine::with_graph(
                    self.config.mixer.clone(),
                    Box::new(MixBus::bypass(self.config.mixer.render_quantum)),
                )?,
            };
            let room = Room::create(spec.clone(), member_id, member, engine)?;
            let roster = room.roster();
            let counters = room.counters();
            let (tx, rx) = mpsc::channel(self.config.room_queue_depth.max(1));
            tokio::spawn(run_room(room, rx, self.outbox.clone()));
            rooms.insert(
                room_id.clone(),
                RoomHandle {
                    spec,
                    counters,
                    commands: tx,
                },
            );
            roster
        };
        self.leave_current_room(member_id, &room_id).await;
        self.attendance.write().await.insert(member_id, room_id);

        self.outbox.send(member_id, ServerEvent::UpdateMembers(roster)).await;
        self.broadcast_room_table().await;
        Ok(())
    }

    /// Check a room's PIN. Never mutates.
    pub async fn verify_pin(&self, room_id: &str, pin: &str) -> Result<bool, SessionError> {
        let rooms = self.rooms.read().await;
        let handle = rooms
            .get(room_id)
            .ok_or_else(|| SessionError::UnknownRoom(room_id.to_string()))?;
        Ok(handle.spec.pin == pin)
    }

    /// Join an existing room as a non-host member.
    ///
    /// The member only leaves its previous room once admitted here.
    pub async fn join_room(
        &self,
        member_id: Uuid,
        room_id: &str,
        member: Member,
    ) -> Result<(), SessionError> {
        let roster = self
            .request(room_id, |reply| RoomCommand::Join {
                member_id,
                member,
                reply,
            })
            .await??;
        self.leave_current_room(member_id, room_id).await;

        {
            let rooms = self.rooms.read().await;
            if rooms.contains_key(room_id) {
                self.attendance
                    .write()
                    .await
                    .insert(member_id, room_id.to_string());
            }
        }

        let members: Vec<Uuid> = roster.iter().map(|e| e.member_id).collect();
        self.outbox
            .send_many(&members, ServerEvent::UpdateMembers(roster))
            .await;
        self.broadcast_room_table().await;
        Ok(())
    }

    /// Leave a room. Idempotent; the host leaving dissolves the room.
    pub async fn leave_room(&self, member_id: Uuid, room_id: &str) {
        let outcome = match self
            .request(room_id, |reply| RoomCommand::Leave { member_id, reply })
            .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                log::error!("Leave of {member_id} from room {room_id} failed: {e}");
                return;
            }
            // Room already gone
            Err(_) => {
                self.forget_attendance(member_id, room_id).await;
                return;
            }
        };

        match outcome {
            LeaveOutcome::NotMember => {}
            LeaveOutcome::Left { roster, .. } => {
                self.forget_attendance(member_id, room_id).await;
                let members: Vec<Uuid> = roster.iter().map(|e| e.member_id).collect();
                self.outbox
                    .send_many(&members, ServerEvent::UpdateMembers(roster))
                    .await;
                self.broadcast_room_table().await;
            }
            LeaveOutcome::Dissolved(dissolution) => {
                self.forget_attendance(member_id, room_id).await;
                self.teardown(
                    room_id,
                    &dissolution.members,
                    ServerEvent::RoomError(HOST_LEFT_MESSAGE.to_string()),
                )
                .await;
                log::info!(
                    "Room {room_id} dissolved after host left ({} samples discarded)",
                    dissolution.archive.len()
                );
            }
        }
    }

    /// Host starts the session; every member gets `AudioStart`.
    pub async fn start_session(&self, requester: Uuid, room_id: &str) -> Result<(), SessionError> {
        let members = self
            .request(room_id, |reply| RoomCommand::Start { requester, reply })
            .await??;
        self.outbox.send_many(&members, ServerEvent::AudioStart).await;
        self.broadcast_room_table().await;
        Ok(())
    }

    /// Buffer a performer's audio. Returns whether a block was mixed.
    ///
    /// A member with no room is silently ignored.
    pub async fn send_audio(&self, member_id: Uuid, samples: Vec<f32>) -> Result<bool, SessionError> {
        let room_id = match self.attendance.read().await.get(&member_id) {
            Some(id) => id.clone(),
            None => return Ok(false),
        };
        match self
            .request(&room_id, |reply| RoomCommand::Audio {
                member_id,
                samples,
                reply,
            })
            .await
        {
            Ok(result) => result,
            Err(_) => Ok(false),
        }
    }

    /// End a session: dissolve the room, export its archive and hand it to
    /// the sink.
    pub async fn end_session(
        &self,
        room_id: &str,
        metadata: CompositionMetadata,
    ) -> Result<SessionArtifact, SessionError> {
        let dissolution = self
            .request(room_id, |reply| RoomCommand::Dissolve { reply })
            .await?;
        self.teardown(
            room_id,
            &dissolution.members,
            ServerEvent::AudioStop(SESSION_ENDED_MESSAGE.to_string()),
        )
        .await;

        let mixer = &self.config.mixer;
        let artifact = SessionArtifact {
            room_id: room_id.to_string(),
            metadata,
            duration_secs: dissolution
                .archive
                .duration_secs(mixer.sample_rate, mixer.channels),
            sample_rate: mixer.sample_rate,
            channels: mixer.channels,
            pcm: dissolution.archive.export(),
        };
        log::info!(
            "Room {room_id} session ended, {} blocks recorded",
            dissolution.archive.blocks()
        );

        let sink = self.sink.clone();
        let stored = artifact.clone();
        tokio::task::spawn_blocking(move || sink.store(stored))
            .await
            .map_err(|e| SessionError::Persistence(e.to_string()))??;
        Ok(artifact)
    }

    // ─── Inspection ──────────────────────────────────────────────

    /// Current room table, sorted by room id.
    pub async fn room_table(&self) -> Vec<RoomSummary> {
        let rooms = self.rooms.read().await;
        let mut table: Vec<RoomSummary> = rooms
            .values()
            .map(|h| h.counters.summary(&h.spec))
            .collect();
        table.sort_by(|a, b| a.id.cmp(&b.id));
        table
    }

    /// Roster of a room, as seen by its worker.
    pub async fn roster(&self, room_id: &str) -> Result<Vec<RosterEntry>, SessionError> {
        self.request(room_id, |reply| RoomCommand::Roster { reply })
            .await
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn has_room(&self, room_id: &str) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }

    /// Room a member currently attends.
    pub async fn room_of(&self, member_id: &Uuid) -> Option<String> {
        self.attendance.read().await.get(member_id).cloned()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn outbox_stats(&self) -> OutboxStats {
        self.outbox.stats().await
    }

    // ─── Internals ───────────────────────────────────────────────

    /// Send a command to a room worker and wait for its reply.
    ///
    /// `UnknownRoom` if the room is not registered, `RosterMissing` if its
    /// worker has already stopped.
    async fn request<T>(
        &self,
        room_id: &str,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, SessionError> {
        let commands = {
            let rooms = self.rooms.read().await;
            rooms
                .get(room_id)
                .map(|h| h.commands.clone())
                .ok_or_else(|| SessionError::UnknownRoom(room_id.to_string()))?
        };
        let (tx, rx) = oneshot::channel();
        commands
            .send(make(tx))
            .await
            .map_err(|_| SessionError::RosterMissing(room_id.to_string()))?;
        rx.await
            .map_err(|_| SessionError::RosterMissing(room_id.to_string()))
    }

    /// Leave whatever room the member attends, unless it is `next_room`.
    async fn leave_current_room(&self, member_id: Uuid, next_room: &str) {
        let current = self.attendance.read().await.get(&member_id).cloned();
        if let Some(current) = current {
            if current != next_room {
                log::debug!("Member {member_id} switching from room {current} to {next_room}");
                self.leave_room(member_id, &current).await;
            }
        }
    }

    async fn forget_attendance(&self, member_id: Uuid, room_id: &str) {
        let mut attendance = self.attendance.write().await;
        if attendance.get(&member_id).map(String::as_str) == Some(room_id) {
            attendance.remove(&member_id);
        }
    }

    /// Unregister a dissolved room and notify its former members.
    async fn teardown(&self, room_id: &str, members: &[Uuid], notice: ServerEvent) {
        self.rooms.write().await.remove(room_id);
        {
            let mut attendance = self.attendance.write().await;
            for id in members {
                if attendance.get(id).map(String::as_str) == Some(room_id) {
                    attendance.remove(id);
                }
            }
        }
        self.outbox.send_many(members, notice).await;
        self.broadcast_room_table().await;
    }

    async fn broadcast_room_table(&self) {
        let table = self.room_table().await;
        self.outbox.send_all(ServerEvent::UpdateRooms(table)).await;
    }
}

/// Room worker: executes commands for one room strictly in order.
async fn run_room(mut room: Room, mut commands: mpsc::Receiver<RoomCommand>, outbox: Arc<Outbox>) {
    let room_id = room.spec().id.clone();
    log::debug!("Room worker for {room_id} started");

    while let Some(command) = commands.recv().await {
        match command {
            RoomCommand::Join {
                member_id,
                member,
                reply,
            } => {
                let result = room.join(member_id, member).map(|_| room.roster());
                let _ = reply.send(result);
            }
            RoomCommand::Leave { member_id, reply } => {
                let result = room.leave(member_id);
                let dissolved = matches!(result, Ok(LeaveOutcome::Dissolved(_)));
                let _ = reply.send(result);
                if dissolved {
                    break;
                }
            }
            RoomCommand::Start { requester, reply } => {
                let result = room.start(requester).map(|_| room.member_ids());
                let _ = reply.send(result);
            }
            RoomCommand::Audio {
                member_id,
                samples,
                reply,
            } => {
                let result = match room.buffer_audio(member_id, &samples) {
                    Ok(Some(block)) => {
                        let listeners = room.listeners();
                        outbox
                            .send_many(&listeners, ServerEvent::PlayAudio(block))
                            .await;
                        Ok(true)
                    }
                    Ok(None) => Ok(false),
                    Err(e) => {
                        debug_assert!(
                            !matches!(e, SessionError::Underflow { .. }),
                            "mix cycle ran without readiness: {e}"
                        );
                        Err(e)
                    }
                };
                let _ = reply.send(result);
            }
            RoomCommand::Dissolve { reply } => {
                let _ = reply.send(room.dissolve());
                break;
            }
            RoomCommand::Roster { reply } => {
                let _ = reply.send(room.roster());
            }
        }
    }

    log::debug!("Room worker for {room_id} stopped");
}
