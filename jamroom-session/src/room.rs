//! Per-room membership state and its mixing engine.
//!
//! A `Room` is owned by exactly one worker task, so nothing here locks.
//! Live counts are mirrored into [`RoomCounters`] atomics so the room table
//! can be read without a round-trip to the worker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::archive::SessionArchive;
use crate::engine::MixingEngine;
use crate::error::SessionError;
use crate::protocol::{Member, Role, RoomSpec, RoomState, RoomSummary, RosterEntry};

/// Lock-free live counts shared between a room worker and the registry.
#[derive(Debug, Default)]
pub struct RoomCounters {
    listeners: AtomicUsize,
    performers: AtomicUsize,
    started: AtomicBool,
}

impl RoomCounters {
    pub fn listeners(&self) -> usize {
        self.listeners.load(Ordering::Relaxed)
    }

    pub fn performers(&self) -> usize {
        self.performers.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> RoomState {
        if self.started.load(Ordering::Relaxed) {
            RoomState::Started
        } else {
            RoomState::Active
        }
    }

    /// Build the room-table row for a room.
    pub fn summary(&self, spec: &RoomSpec) -> RoomSummary {
        RoomSummary {
            id: spec.id.clone(),
            name: spec.name.clone(),
            max_listeners: spec.max_listeners,
            max_performers: spec.max_performers,
            current_listeners: self.listeners(),
            current_performers: self.performers(),
            state: self.state(),
        }
    }

    fn counter(&self, role: Role) -> &AtomicUsize {
        match role {
            Role::Listener => &self.listeners,
            Role::Performer => &self.performers,
        }
    }
}

/// Result of a member leaving.
#[derive(Debug)]
pub enum LeaveOutcome {
    /// Member was not on the roster
    NotMember,
    /// Non-host left; remaining roster attached
    Left { role: Role, roster: Vec<RosterEntry> },
    /// Host left and the room is gone
    Dissolved(Dissolution),
}

/// Everything handed back when a room is torn down.
#[derive(Debug)]
pub struct Dissolution {
    /// Members still on the roster at teardown (host excluded on host-leave)
    pub members: Vec<Uuid>,
    pub archive: SessionArchive,
}

/// One active room.
pub struct Room {
    spec: RoomSpec,
    host: Uuid,
    roster: HashMap<Uuid, Member>,
    counters: Arc<RoomCounters>,
    engine: MixingEngine,
}

impl Room {
    /// Create a room with its host as the first member.
    pub fn create(
        spec: RoomSpec,
        host_id: Uuid,
        mut host: Member,
        engine: MixingEngine,
    ) -> Result<Self, SessionError> {
        host.is_host = true;
        let mut room = Self {
            spec,
            host: host_id,
            roster: HashMap::new(),
            counters: Arc::new(RoomCounters::default()),
            engine,
        };
        room.admit(host_id, host)?;
        log::info!("Room {} created by host {host_id}", room.spec.id);
        Ok(room)
    }

    /// Add a non-host member. Re-joining the same room is a no-op.
    pub fn join(&mut self, member_id: Uuid, mut member: Member) -> Result<(), SessionError> {
        if self.roster.contains_key(&member_id) {
            return Ok(());
        }
        member.is_host = false;
        self.admit(member_id, member)
    }

    fn admit(&mut self, member_id: Uuid, member: Member) -> Result<(), SessionError> {
        let limit = match member.role {
            Role::Listener => self.spec.max_listeners,
            Role::Performer => self.spec.max_performers,
        };
        let counter = self.counters.counter(member.role);
        if counter.load(Ordering::Relaxed) >= limit {
            log::info!(
                "Room {} rejected {} ({:?}): capacity {limit} reached",
                self.spec.id,
                member.username,
                member.role
            );
            return Err(SessionError::CapacityExceeded {
                room_id: self.spec.id.clone(),
                limit,
            });
        }
        if member.role == Role::Performer {
            self.engine.add_performer(member_id)?;
        }
        counter.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "{} joined room {} as {:?}",
            member.username,
            self.spec.id,
            member.role
        );
        self.roster.insert(member_id, member);
        Ok(())
    }

    /// Remove a member. The host leaving dissolves the room.
    pub fn leave(&mut self, member_id: Uuid) -> Result<LeaveOutcome, SessionError> {
        if member_id == self.host && self.roster.contains_key(&member_id) {
            log::info!("Host {member_id} left room {}", self.spec.id);
            self.roster.remove(&member_id);
            return Ok(LeaveOutcome::Dissolved(self.dissolve()));
        }
        let Some(member) = self.roster.remove(&member_id) else {
            return Ok(LeaveOutcome::NotMember);
        };
        if member.role == Role::Performer {
            self.engine.remove_performer(member_id)?;
        }
        self.counters
            .counter(member.role)
            .fetch_sub(1, Ordering::Relaxed);
        log::debug!("{} left room {}", member.username, self.spec.id);
        Ok(LeaveOutcome::Left {
            role: member.role,
            roster: self.roster(),
        })
    }

    /// Mark the session started. Only the host may do this.
    pub fn start(&mut self, requester: Uuid) -> Result<(), SessionError> {
        if requester != self.host || !self.roster.contains_key(&requester) {
            return Err(SessionError::NotHost(requester));
        }
        self.counters.started.store(true, Ordering::Relaxed);
        log::info!("Room {} session started", self.spec.id);
        Ok(())
    }

    /// Buffer a performer's audio and run at most one mix cycle.
    pub fn buffer_audio(
        &mut self,
        member_id: Uuid,
        samples: &[f32],
    ) -> Result<Option<Vec<f32>>, SessionError> {
        self.engine.buffer_and_process(member_id, samples)
    }

    /// Tear the room down, handing out the remaining members and the archive.
    pub fn dissolve(&mut self) -> Dissolution {
        let members = self.roster.drain().map(|(id, _)| id).collect();
        self.counters.listeners.store(0, Ordering::Relaxed);
        self.counters.performers.store(0, Ordering::Relaxed);
        Dissolution {
            members,
            archive: self.engine.take_archive(),
        }
    }

    /// Members with the listener role.
    pub fn listeners(&self) -> Vec<Uuid> {
        self.roster
            .iter()
            .filter(|(_, m)| m.role == Role::Listener)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn member_ids(&self) -> Vec<Uuid> {
        self.roster.keys().copied().collect()
    }

    /// Roster rows, host first, then by username.
    pub fn roster(&self) -> Vec<RosterEntry> {
        let mut entries: Vec<RosterEntry> = self
            .roster
            .iter()
            .map(|(id, m)| RosterEntry {
                member_id: *id,
                username: m.username.clone(),
                role: m.role,
                is_host: m.is_host,
            })
            .collect();
        entries.sort_by(|a, b| {
            b.is_host
                .cmp(&a.is_host)
                .then_with(|| a.username.cmp(&b.username))
        });
        entries
    }

    pub fn spec(&self) -> &RoomSpec {
        &self.spec
    }

    pub fn host(&self) -> Uuid {
        self.host
    }

    pub fn counters(&self) -> Arc<RoomCounters> {
        self.counters.clone()
    }

    pub fn engine(&self) -> &MixingEngine {
        &self.engine
    }
}
