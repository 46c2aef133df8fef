//! Membership registry for connected chat sessions
//!
//! This module tracks which sessions are currently live and fans messages
//! out to them:
//! - Registration and removal of sessions as they connect and disconnect
//! - Snapshot-based broadcast so membership changes never stall delivery
//! - Shutdown support by closing every registered connection
//!
//! The registry is the only mutable state shared between sessions. It is an
//! explicitly constructed handle that is cloned into every component that
//! needs it rather than a global.

use crate::connection::CloseSignal;
use crate::identity::Identity;
use log::{debug, warn};
use shared::format_broadcast;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;

/// Lines a session may have waiting for its writer before it counts as
/// unresponsive
pub const OUTBOUND_CAPACITY: usize = 1000;

/// Sending half of a session's outbound line queue
///
/// Pushing never blocks; the session's writer task drains the queue onto the
/// socket in order. A push fails once the writer has gone away or the queue
/// is full.
#[derive(Debug, Clone)]
pub struct Outbound {
    sender: mpsc::Sender<String>,
}

impl Outbound {
    /// Creates a queue holding at most `capacity` lines and returns the
    /// handle for pushing plus the receiver for the writer task.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    pub fn send(&self, line: String) -> Result<(), mpsc::error::TrySendError<String>> {
        self.sender.try_send(line)
    }
}

/// A registered session as seen by the registry
///
/// Holds everything a broadcast or shutdown needs: who the session is, how to
/// push a line to it, and how to close its connection.
#[derive(Debug, Clone)]
pub struct Member {
    pub identity: Identity,
    outbound: Outbound,
    close: CloseSignal,
}

impl Member {
    pub fn new(identity: Identity, outbound: Outbound, close: CloseSignal) -> Self {
        Self {
            identity,
            outbound,
            close,
        }
    }
}

/// Outcome of one broadcast
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members whose outbound queue accepted the line
    pub delivered: usize,
    /// Members whose writer had already stopped or whose queue was full
    pub failed: usize,
}

/// Concurrency-safe set of live sessions keyed by identity
///
/// Cloning yields another handle to the same set. All access goes through a
/// lock that is never held across an await point or while delivering lines,
/// so a broadcast sees a consistent snapshot and never a member that is half
/// added or already removed.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    members: Arc<RwLock<HashMap<Identity, Member>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic elsewhere must not take the whole chat down with it
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Identity, Member>> {
        self.members.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Identity, Member>> {
        self.members.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a member to the active set
    ///
    /// Returns false and leaves the existing entry untouched if a member
    /// with the same identity is already registered.
    pub fn add(&self, member: Member) -> bool {
        let mut members = self.write();
        if members.contains_key(&member.identity) {
            return false;
        }
        members.insert(member.identity, member);
        true
    }

    /// Removes a member from the active set
    ///
    /// Returns true if the member was found and removed, false if they were
    /// already gone. Dropping the entry releases the registry's handle on the
    /// member's outbound queue.
    pub fn remove(&self, identity: &Identity) -> bool {
        self.write().remove(identity).is_some()
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.read().contains_key(identity)
    }

    /// Sends `"<sender>: <text>"` to every current member, the sender included
    ///
    /// Membership is snapshotted up front and the lock released before any
    /// line is pushed. Members joining or leaving meanwhile do not affect
    /// this broadcast, and a member whose writer has stopped is counted as
    /// failed without interrupting delivery to the rest.
    ///
    /// A member whose queue is full is not keeping up with the chat. Its
    /// connection is closed and the session cleans itself up.
    pub fn broadcast(&self, sender: Identity, text: &str) -> BroadcastReport {
        let recipients: Vec<Member> = self.read().values().cloned().collect();

        let line = format_broadcast(&sender.to_string(), text);
        let mut report = BroadcastReport::default();

        for member in recipients {
            match member.outbound.send(line.clone()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("{} is not reading, closing its connection", member.identity);
                    member.close.close();
                    report.failed += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Skipping {}: outbound queue closed", member.identity);
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Closes the connection of every current member
    ///
    /// Each session notices the close, leaves its receive loop and removes
    /// itself. Returns how many connections this call actually closed.
    pub fn close_all(&self) -> usize {
        let signals: Vec<CloseSignal> = {
            let members = self.read();
            members.values().map(|member| member.close.clone()).collect()
        };

        signals.iter().filter(|signal| signal.close()).count()
    }

    /// Identities of all current members in ascending order
    pub fn identities(&self) -> Vec<Identity> {
        let mut identities: Vec<Identity> = self.read().keys().copied().collect();
        identities.sort();
        identities
    }

    /// Returns the number of currently registered sessions
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if no sessions are currently registered
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn test_member(number: u64) -> (Member, mpsc::Receiver<String>) {
        let (outbound, receiver) = Outbound::channel(OUTBOUND_CAPACITY);
        let member = Member::new(Identity::new(number), outbound, CloseSignal::new());
        (member, receiver)
    }

    fn drain(receiver: &mut mpsc::Receiver<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = receiver.try_recv() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_registry_creation() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.identities().is_empty());
    }

    #[test]
    fn test_add_member() {
        let registry = Registry::new();
        let (member, _rx) = test_member(1);

        assert!(registry.add(member));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&Identity::new(1)));
    }

    #[test]
    fn test_add_duplicate_is_noop() {
        let registry = Registry::new();
        let (first, mut first_rx) = test_member(1);
        let (second, mut second_rx) = test_member(1);

        assert!(registry.add(first));
        assert!(!registry.add(second));
        assert_eq!(registry.len(), 1);

        // The original entry is still the one receiving
        registry.broadcast(Identity::new(1), "hi");
        assert_eq!(drain(&mut first_rx), vec!["User1: hi"]);
        assert!(drain(&mut second_rx).is_empty());
    }

    #[test]
    fn test_remove_member() {
        let registry = Registry::new();
        let (member, _rx) = test_member(1);
        registry.add(member);

        assert!(registry.remove(&Identity::new(1)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = Registry::new();
        let (member, _rx) = test_member(1);
        let (other, _other_rx) = test_member(2);
        registry.add(member);
        registry.add(other);

        assert!(registry.remove(&Identity::new(1)));
        assert!(!registry.remove(&Identity::new(1)));
        assert_eq!(registry.identities(), vec![Identity::new(2)]);
    }

    #[test]
    fn test_remove_nonexistent_member() {
        let registry = Registry::new();
        assert!(!registry.remove(&Identity::new(999)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_removal_closes_outbound_queue() {
        let registry = Registry::new();
        let (member, mut rx) = test_member(1);
        registry.add(member);

        registry.remove(&Identity::new(1));
        assert_eq!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        );
    }

    #[test]
    fn test_broadcast_reaches_everyone_including_sender() {
        let registry = Registry::new();
        let mut receivers = Vec::new();
        for number in 1..=3 {
            let (member, rx) = test_member(number);
            registry.add(member);
            receivers.push(rx);
        }

        let report = registry.broadcast(Identity::new(2), "hello");

        assert_eq!(report, BroadcastReport { delivered: 3, failed: 0 });
        for rx in &mut receivers {
            assert_eq!(drain(rx), vec!["User2: hello"]);
        }
    }

    #[test]
    fn test_broadcast_preserves_sender_order() {
        let registry = Registry::new();
        let (member, mut rx) = test_member(1);
        registry.add(member);

        for text in ["one", "two", "three"] {
            registry.broadcast(Identity::new(1), text);
        }

        assert_eq!(drain(&mut rx), vec!["User1: one", "User1: two", "User1: three"]);
    }

    #[test]
    fn test_broadcast_continues_past_failed_recipient() {
        let registry = Registry::new();
        let (alive, mut alive_rx) = test_member(1);
        let (gone, gone_rx) = test_member(2);
        let (also_alive, mut also_alive_rx) = test_member(3);
        registry.add(alive);
        registry.add(gone);
        registry.add(also_alive);

        drop(gone_rx);
        let report = registry.broadcast(Identity::new(1), "still here");

        assert_eq!(report, BroadcastReport { delivered: 2, failed: 1 });
        assert_eq!(drain(&mut alive_rx), vec!["User1: still here"]);
        assert_eq!(drain(&mut also_alive_rx), vec!["User1: still here"]);
    }

    #[test]
    fn test_full_queue_closes_slow_member() {
        let registry = Registry::new();
        let (outbound, mut slow_rx) = Outbound::channel(2);
        let slow_close = CloseSignal::new();
        registry.add(Member::new(Identity::new(1), outbound, slow_close.clone()));
        let (fast, mut fast_rx) = test_member(2);
        registry.add(fast);

        for text in ["one", "two"] {
            let report = registry.broadcast(Identity::new(2), text);
            assert_eq!(report, BroadcastReport { delivered: 2, failed: 0 });
        }
        assert!(!slow_close.is_closed());

        let report = registry.broadcast(Identity::new(2), "three");

        assert_eq!(report, BroadcastReport { delivered: 1, failed: 1 });
        assert!(slow_close.is_closed());
        assert_eq!(drain(&mut slow_rx), vec!["User2: one", "User2: two"]);
        assert_eq!(
            drain(&mut fast_rx),
            vec!["User2: one", "User2: two", "User2: three"]
        );
        // Closing does not unregister; the session removes itself
        assert!(registry.contains(&Identity::new(1)));
    }

    #[test]
    fn test_broadcast_to_empty_registry() {
        let registry = Registry::new();
        let report = registry.broadcast(Identity::new(1), "anyone?");
        assert_eq!(report, BroadcastReport::default());
    }

    #[test]
    fn test_member_added_after_broadcast_misses_it() {
        let registry = Registry::new();
        let (early, mut early_rx) = test_member(1);
        registry.add(early);

        registry.broadcast(Identity::new(1), "before");

        let (late, mut late_rx) = test_member(2);
        registry.add(late);

        assert_eq!(drain(&mut early_rx), vec!["User1: before"]);
        assert!(drain(&mut late_rx).is_empty());
    }

    #[test]
    fn test_close_all_closes_each_member_once() {
        let registry = Registry::new();
        let mut signals = Vec::new();
        for number in 1..=3 {
            let (outbound, _rx) = Outbound::channel(OUTBOUND_CAPACITY);
            let signal = CloseSignal::new();
            signals.push(signal.clone());
            registry.add(Member::new(Identity::new(number), outbound, signal));
        }

        assert_eq!(registry.close_all(), 3);
        assert!(signals.iter().all(CloseSignal::is_closed));
        assert_eq!(registry.close_all(), 0);
        // Closing does not unregister; sessions remove themselves
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_concurrent_adds_and_removes() {
        let registry = Registry::new();
        let threads = 8;
        let per_thread = 200;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let base = t * per_thread;
                    let mut receivers = Vec::new();
                    for i in 0..per_thread {
                        let (member, rx) = test_member(base + i + 1);
                        assert!(registry.add(member));
                        receivers.push(rx);
                        registry.broadcast(Identity::new(base + i + 1), "tick");
                    }
                    // Remove the even half, twice to exercise idempotence
                    for i in (0..per_thread).step_by(2) {
                        let identity = Identity::new(base + i + 1);
                        assert!(registry.remove(&identity));
                        assert!(!registry.remove(&identity));
                    }
                    receivers
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let identities = registry.identities();
        assert_eq!(identities.len(), (threads * per_thread / 2) as usize);
        assert!(identities.iter().all(|identity| identity.number() % 2 == 0));

        let mut deduped = identities.clone();
        deduped.dedup();
        assert_eq!(deduped, identities);
    }
}
