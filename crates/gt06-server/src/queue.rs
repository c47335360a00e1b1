//! Per-IMEI command queue.
//!
//! A pure state machine: every operation takes the current time and returns
//! the [`Dispatch`]es the caller must transmit. Nothing here touches a socket,
//! so callers can hold the queue lock briefly and write frames after
//! releasing it.
//!
//! ```text
//!            next_dispatch / attach
//!   Idle ───────────────────────────▶ AwaitingAck
//!    ▲                                   │
//!    │   acknowledge (more pending)      │
//!    ├───────────────────────────────────┤
//!    │   sweep timeout (resend in place) │
//!    └───────────────────────────────────┘
//!   acknowledge of the last command removes the entry
//! ```

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::QueueError;
use crate::registry::SessionId;

/// Queue timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// How long to wait for a 0x15 reply before resending. Default: 15s.
    pub ack_timeout: Duration,
    /// Pause between an ack and the next command. Default: 2s.
    pub settle_delay: Duration,
    /// Sends of one command before the entry is dropped. Default: unbounded.
    pub max_attempts: Option<u32>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(15),
            settle_delay: Duration::from_secs(2),
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Idle,
    AwaitingAck,
}

/// Pending commands for one IMEI. Outlives the sessions that carry them.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    commands: Vec<String>,
    cursor: usize,
    state: QueueState,
    last_command: Option<String>,
    last_sent_at: Option<Instant>,
    attempts: u32,
    next_send_at: Option<Instant>,
    session: Option<SessionId>,
}

impl QueueEntry {
    fn new(commands: Vec<String>) -> Self {
        Self {
            commands,
            cursor: 0,
            state: QueueState::Idle,
            last_command: None,
            last_sent_at: None,
            attempts: 0,
            next_send_at: None,
            session: None,
        }
    }

    fn reset(&mut self, commands: Vec<String>) {
        let session = self.session;
        *self = Self::new(commands);
        self.session = session;
    }

    pub fn current(&self) -> Option<&str> {
        self.commands.get(self.cursor).map(String::as_str)
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

/// A command the caller must send now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub imei: String,
    pub session: SessionId,
    pub command: String,
    /// 1 on first send, incremented on each resend of the same command.
    pub attempt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Created,
    Appended,
    Replaced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Nothing was awaiting an ack for this IMEI.
    Ignored,
    /// More commands remain; the next one may go out after `settle`.
    Advanced { settle: Duration },
    /// The last command was acknowledged and the entry removed.
    Completed,
}

/// Operator-facing view of one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub imei: String,
    pub state: QueueState,
    pub cursor: usize,
    pub total: usize,
    pub current: Option<String>,
    pub attempts: u32,
    pub attached: bool,
    /// Milliseconds since the current command was last sent.
    pub sent_ms_ago: Option<u64>,
}

/// Persisted progress for one IMEI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub cursor: usize,
    pub last_command: Option<String>,
}

/// `{imei -> {cursor, lastCommand}}`.
pub type QueueSnapshot = BTreeMap<String, SnapshotEntry>;

/// All queue entries, keyed by IMEI.
#[derive(Debug, Default)]
pub struct CommandQueue {
    config: QueueConfig,
    entries: HashMap<String, QueueEntry>,
}

impl CommandQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn get(&self, imei: &str) -> Option<&QueueEntry> {
        self.entries.get(imei)
    }

    pub fn contains(&self, imei: &str) -> bool {
        self.entries.contains_key(imei)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add commands for `imei`.
    ///
    /// Appends to an idle entry. An entry awaiting an ack rejects new commands
    /// with [`QueueError::Busy`] unless `override_busy` is set, in which case
    /// the pending list is replaced and the entry goes back to idle.
    pub fn enqueue(
        &mut self,
        imei: &str,
        commands: Vec<String>,
        override_busy: bool,
    ) -> Result<EnqueueOutcome, QueueError> {
        if commands.is_empty() {
            return Err(QueueError::Empty);
        }
        let Some(entry) = self.entries.get_mut(imei) else {
            debug!(imei, count = commands.len(), "queue created");
            self.entries
                .insert(imei.to_string(), QueueEntry::new(commands));
            return Ok(EnqueueOutcome::Created);
        };

        if override_busy {
            info!(
                imei,
                replaced = entry.commands.len() - entry.cursor,
                count = commands.len(),
                "queue overridden"
            );
            entry.reset(commands);
            return Ok(EnqueueOutcome::Replaced);
        }

        if entry.state == QueueState::AwaitingAck {
            return Err(QueueError::Busy {
                imei: imei.to_string(),
                command: entry.last_command.clone().unwrap_or_default(),
            });
        }

        entry.commands.extend(commands);
        Ok(EnqueueOutcome::Appended)
    }

    /// Bind `imei`'s entry to a (new) session and send what is due.
    ///
    /// A command left awaiting an ack by a previous session is resent from
    /// the unchanged cursor.
    pub fn attach(&mut self, imei: &str, session: SessionId, now: Instant) -> Option<Dispatch> {
        let entry = self.entries.get_mut(imei)?;
        let previous = entry.session.replace(session);
        if entry.state == QueueState::AwaitingAck {
            if previous == Some(session) {
                return None;
            }
            debug!(imei, cursor = entry.cursor, "resuming command after reconnect");
            entry.state = QueueState::Idle;
            entry.next_send_at = None;
        }
        self.next_dispatch(imei, now)
    }

    /// Clear the session reference if it is still `session`. The entry stays.
    pub fn detach(&mut self, imei: &str, session: SessionId) -> bool {
        match self.entries.get_mut(imei) {
            Some(entry) if entry.session == Some(session) => {
                entry.session = None;
                true
            }
            _ => false,
        }
    }

    /// Idle to AwaitingAck, if the entry exists, has a session and is past its
    /// settle deadline.
    pub fn next_dispatch(&mut self, imei: &str, now: Instant) -> Option<Dispatch> {
        let entry = self.entries.get_mut(imei)?;
        if entry.state != QueueState::Idle {
            return None;
        }
        let session = entry.session?;
        if entry.next_send_at.is_some_and(|at| now < at) {
            return None;
        }
        let Some(command) = entry.current().map(str::to_owned) else {
            self.entries.remove(imei);
            return None;
        };
        Some(Self::mark_sent(imei, entry, session, command, now))
    }

    fn mark_sent(
        imei: &str,
        entry: &mut QueueEntry,
        session: SessionId,
        command: String,
        now: Instant,
    ) -> Dispatch {
        entry.state = QueueState::AwaitingAck;
        entry.last_sent_at = Some(now);
        entry.last_command = Some(command.clone());
        entry.next_send_at = None;
        entry.attempts += 1;
        Dispatch {
            imei: imei.to_string(),
            session,
            command,
            attempt: entry.attempts,
        }
    }

    /// A 0x15 reply arrived from `imei`.
    pub fn acknowledge(&mut self, imei: &str, now: Instant) -> AckOutcome {
        let Some(entry) = self.entries.get_mut(imei) else {
            return AckOutcome::Ignored;
        };
        if entry.state != QueueState::AwaitingAck {
            return AckOutcome::Ignored;
        }
        entry.cursor += 1;
        entry.state = QueueState::Idle;
        entry.attempts = 0;
        if entry.cursor >= entry.commands.len() {
            self.entries.remove(imei);
            return AckOutcome::Completed;
        }
        let settle = self.config.settle_delay;
        entry.next_send_at = Some(now + settle);
        AckOutcome::Advanced { settle }
    }

    /// Periodic pass: resend timed-out commands in place and pick up idle
    /// entries whose settle deadline has passed.
    pub fn sweep(&mut self, now: Instant) -> Vec<Dispatch> {
        let mut dispatches = Vec::new();
        let mut exhausted = Vec::new();

        for (imei, entry) in self.entries.iter_mut() {
            match entry.state {
                QueueState::AwaitingAck => {
                    let Some(sent) = entry.last_sent_at else {
                        continue;
                    };
                    if now.saturating_duration_since(sent) < self.config.ack_timeout {
                        continue;
                    }
                    if self
                        .config
                        .max_attempts
                        .is_some_and(|max| entry.attempts >= max)
                    {
                        exhausted.push(imei.clone());
                        continue;
                    }
                    entry.state = QueueState::Idle;
                    let Some(session) = entry.session else {
                        continue;
                    };
                    if let Some(command) = entry.current().map(str::to_owned) {
                        info!(
                            imei = %imei,
                            command = %command,
                            attempt = entry.attempts + 1,
                            "ack timeout, resending"
                        );
                        dispatches.push(Self::mark_sent(imei, entry, session, command, now));
                    }
                }
                QueueState::Idle => {
                    let (Some(session), Some(at)) = (entry.session, entry.next_send_at) else {
                        continue;
                    };
                    if now < at {
                        continue;
                    }
                    if let Some(command) = entry.current().map(str::to_owned) {
                        dispatches.push(Self::mark_sent(imei, entry, session, command, now));
                    }
                }
            }
        }

        for imei in exhausted {
            if let Some(entry) = self.entries.remove(&imei) {
                warn!(
                    imei = %imei,
                    command = entry.current().unwrap_or_default(),
                    attempts = entry.attempts,
                    "giving up on command"
                );
            }
        }

        dispatches
    }

    pub fn cancel(&mut self, imei: &str) -> bool {
        self.entries.remove(imei).is_some()
    }

    /// All entries sorted by IMEI.
    pub fn status(&self, now: Instant) -> Vec<QueueStatus> {
        let mut out: Vec<QueueStatus> = self
            .entries
            .iter()
            .map(|(imei, entry)| QueueStatus {
                imei: imei.clone(),
                state: entry.state,
                cursor: entry.cursor,
                total: entry.commands.len(),
                current: entry.current().map(str::to_owned),
                attempts: entry.attempts,
                attached: entry.session.is_some(),
                sent_ms_ago: entry
                    .last_sent_at
                    .map(|at| now.saturating_duration_since(at).as_millis() as u64),
            })
            .collect();
        out.sort_by(|a, b| a.imei.cmp(&b.imei));
        out
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.entries
            .iter()
            .map(|(imei, entry)| {
                (
                    imei.clone(),
                    SnapshotEntry {
                        cursor: entry.cursor,
                        last_command: entry.last_command.clone(),
                    },
                )
            })
            .collect()
    }

    /// Recreate entries from a snapshot against `script`, returning how many
    /// were restored.
    ///
    /// Entries come back idle and detached; entries whose cursor is past the
    /// end of the script are skipped. Existing entries are left alone.
    pub fn restore(&mut self, snapshot: &QueueSnapshot, script: &[String]) -> usize {
        let mut restored = 0;
        for (imei, saved) in snapshot {
            if saved.cursor >= script.len() || self.entries.contains_key(imei) {
                continue;
            }
            let mut entry = QueueEntry::new(script.to_vec());
            entry.cursor = saved.cursor;
            entry.last_command = saved.last_command.clone();
            if let Some(last) = &saved.last_command {
                if entry.current() != Some(last.as_str()) {
                    warn!(imei = %imei, cursor = saved.cursor, "snapshot command differs from script");
                }
            }
            self.entries.insert(imei.clone(), entry);
            restored += 1;
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMEI: &str = "865209077286178";

    fn cmds(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn queue() -> CommandQueue {
        CommandQueue::new(QueueConfig::default())
    }

    #[test]
    fn happy_path_three_commands() {
        let mut q = queue();
        let t0 = Instant::now();
        q.enqueue(IMEI, cmds(&["A#", "B#", "C#"]), false).unwrap();

        let mut sends = Vec::new();
        let mut now = t0;
        let first = q.attach(IMEI, SessionId(1), now).unwrap();
        sends.push((now, first.command));

        for _ in 0..2 {
            now += Duration::from_secs(1);
            let outcome = q.acknowledge(IMEI, now);
            assert_eq!(
                outcome,
                AckOutcome::Advanced {
                    settle: Duration::from_secs(2)
                }
            );
            assert!(q.next_dispatch(IMEI, now).is_none(), "settle gate");
            now += Duration::from_secs(2);
            let next = q.next_dispatch(IMEI, now).unwrap();
            sends.push((now, next.command));
        }

        now += Duration::from_secs(1);
        assert_eq!(q.acknowledge(IMEI, now), AckOutcome::Completed);
        assert!(!q.contains(IMEI));

        let commands: Vec<_> = sends.iter().map(|(_, c)| c.as_str()).collect();
        assert_eq!(commands, vec!["A#", "B#", "C#"]);
        assert!(sends.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn timeout_resends_same_command_once() {
        let mut q = queue();
        let t0 = Instant::now();
        q.enqueue(IMEI, cmds(&["A#", "B#"]), false).unwrap();
        let first = q.attach(IMEI, SessionId(1), t0).unwrap();
        assert_eq!(first.attempt, 1);

        assert!(q.sweep(t0 + Duration::from_secs(14)).is_empty());

        let resent = q.sweep(t0 + Duration::from_secs(15));
        assert_eq!(resent.len(), 1);
        assert_eq!(resent[0].command, "A#");
        assert_eq!(resent[0].attempt, 2);
        assert_eq!(q.get(IMEI).unwrap().cursor(), 0);

        assert!(q.sweep(t0 + Duration::from_secs(16)).is_empty());
    }

    #[test]
    fn busy_unless_overridden() {
        let mut q = queue();
        let now = Instant::now();
        q.enqueue(IMEI, cmds(&["A#"]), false).unwrap();
        q.attach(IMEI, SessionId(1), now).unwrap();

        let err = q.enqueue(IMEI, cmds(&["B#"]), false).unwrap_err();
        assert!(matches!(err, QueueError::Busy { ref command, .. } if command == "A#"));

        assert_eq!(
            q.enqueue(IMEI, cmds(&["B#"]), true).unwrap(),
            EnqueueOutcome::Replaced
        );
        let entry = q.get(IMEI).unwrap();
        assert_eq!(entry.state(), QueueState::Idle);
        assert_eq!(entry.current(), Some("B#"));

        let next = q.next_dispatch(IMEI, now).unwrap();
        assert_eq!((next.command.as_str(), next.attempt), ("B#", 1));
    }

    #[test]
    fn idle_entry_appends() {
        let mut q = queue();
        assert_eq!(
            q.enqueue(IMEI, cmds(&["A#"]), false).unwrap(),
            EnqueueOutcome::Created
        );
        assert_eq!(
            q.enqueue(IMEI, cmds(&["B#"]), false).unwrap(),
            EnqueueOutcome::Appended
        );
        assert_eq!(q.status(Instant::now())[0].total, 2);
        assert!(matches!(
            q.enqueue(IMEI, Vec::new(), false),
            Err(QueueError::Empty)
        ));
    }

    #[test]
    fn entry_survives_disconnect_and_resumes() {
        let mut q = queue();
        let t0 = Instant::now();
        q.enqueue(IMEI, cmds(&["A#", "B#"]), false).unwrap();
        q.attach(IMEI, SessionId(1), t0).unwrap();
        q.acknowledge(IMEI, t0);
        let second = q.next_dispatch(IMEI, t0 + Duration::from_secs(2)).unwrap();
        assert_eq!(second.command, "B#");

        assert!(q.detach(IMEI, SessionId(1)));
        assert!(q.contains(IMEI));
        assert!(q.sweep(t0 + Duration::from_secs(60)).is_empty());

        let resumed = q
            .attach(IMEI, SessionId(2), t0 + Duration::from_secs(61))
            .unwrap();
        assert_eq!(resumed.command, "B#");
        assert_eq!(resumed.session, SessionId(2));
        assert_eq!(q.get(IMEI).unwrap().cursor(), 1);
    }

    #[test]
    fn stale_detach_is_ignored() {
        let mut q = queue();
        let now = Instant::now();
        q.enqueue(IMEI, cmds(&["A#"]), false).unwrap();
        q.attach(IMEI, SessionId(1), now);
        q.attach(IMEI, SessionId(2), now);
        assert!(!q.detach(IMEI, SessionId(1)));
        assert!(q.status(now)[0].attached);
    }

    #[test]
    fn reattach_same_session_does_not_resend() {
        let mut q = queue();
        let now = Instant::now();
        q.enqueue(IMEI, cmds(&["A#"]), false).unwrap();
        assert!(q.attach(IMEI, SessionId(1), now).is_some());
        assert!(q.attach(IMEI, SessionId(1), now).is_none());
    }

    #[test]
    fn stray_ack_is_noop() {
        let mut q = queue();
        let now = Instant::now();
        assert_eq!(q.acknowledge(IMEI, now), AckOutcome::Ignored);
        q.enqueue(IMEI, cmds(&["A#"]), false).unwrap();
        assert_eq!(q.acknowledge(IMEI, now), AckOutcome::Ignored);
        assert_eq!(q.get(IMEI).unwrap().cursor(), 0);
    }

    #[test]
    fn detached_entry_waits() {
        let mut q = queue();
        q.enqueue(IMEI, cmds(&["A#"]), false).unwrap();
        assert!(q.next_dispatch(IMEI, Instant::now()).is_none());
    }

    #[test]
    fn cancel_removes_entry() {
        let mut q = queue();
        let now = Instant::now();
        q.enqueue(IMEI, cmds(&["A#"]), false).unwrap();
        q.attach(IMEI, SessionId(1), now);
        assert!(q.cancel(IMEI));
        assert!(!q.cancel(IMEI));
        assert!(q.sweep(now + Duration::from_secs(30)).is_empty());
        assert_eq!(q.acknowledge(IMEI, now), AckOutcome::Ignored);
    }

    #[test]
    fn retry_cap_drops_entry() {
        let mut q = CommandQueue::new(QueueConfig {
            max_attempts: Some(2),
            ..QueueConfig::default()
        });
        let t0 = Instant::now();
        q.enqueue(IMEI, cmds(&["A#"]), false).unwrap();
        q.attach(IMEI, SessionId(1), t0);

        assert_eq!(q.sweep(t0 + Duration::from_secs(15)).len(), 1);
        assert!(q.sweep(t0 + Duration::from_secs(30)).is_empty());
        assert!(!q.contains(IMEI));
    }

    #[test]
    fn sweep_sends_after_settle() {
        let mut q = queue();
        let t0 = Instant::now();
        q.enqueue(IMEI, cmds(&["A#", "B#"]), false).unwrap();
        q.attach(IMEI, SessionId(1), t0);
        q.acknowledge(IMEI, t0);

        assert!(q.sweep(t0 + Duration::from_secs(1)).is_empty());
        let due = q.sweep(t0 + Duration::from_secs(2));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].command, "B#");
    }

    #[test]
    fn snapshot_and_restore() {
        let mut q = queue();
        let t0 = Instant::now();
        let script = cmds(&["A#", "B#", "C#"]);
        q.enqueue(IMEI, script.clone(), false).unwrap();
        q.attach(IMEI, SessionId(1), t0);
        q.acknowledge(IMEI, t0);
        q.next_dispatch(IMEI, t0 + Duration::from_secs(2));

        let snapshot = q.snapshot();
        assert_eq!(
            snapshot[IMEI],
            SnapshotEntry {
                cursor: 1,
                last_command: Some("B#".to_string())
            }
        );
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json[IMEI]["lastCommand"], "B#");

        let mut fresh = queue();
        assert_eq!(fresh.restore(&snapshot, &script), 1);
        let resumed = fresh.attach(IMEI, SessionId(9), t0).unwrap();
        assert_eq!(resumed.command, "B#");
    }

    #[test]
    fn restore_skips_finished_cursor() {
        let mut snapshot = QueueSnapshot::new();
        snapshot.insert(
            IMEI.to_string(),
            SnapshotEntry {
                cursor: 3,
                last_command: None,
            },
        );
        let mut q = queue();
        assert_eq!(q.restore(&snapshot, &cmds(&["A#", "B#", "C#"])), 0);
        assert!(q.is_empty());
    }
}
