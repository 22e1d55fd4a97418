//! Join handshake.
//!
//! `NotJoined -> AwaitingReply -> Joined`. The introducer itself skips
//! straight to `Joined`. Without a retry policy a node whose request is lost
//! stays in `AwaitingReply` forever; with one it re-sends on an interval and
//! ends in `JoinFailed` once the attempts run out.

use murmur_common::{JoinState, MurmurError, NodeIdentity};
use rand::Rng;

use super::Node;
use crate::observer::MembershipObserver;
use crate::protocol::Message;
use crate::transport::Transport;

impl<T, O, R> Node<T, O, R>
where
    T: Transport,
    O: MembershipObserver,
    R: Rng,
{
    /// Introduce this node to the group
    pub fn start(&mut self) {
        if self.state.join.state != JoinState::NotJoined {
            return;
        }

        if self.state.identity == self.bootstrap {
            tracing::info!(node = %self.state.identity, "🌱 Starting up group");
            self.state.join.state = JoinState::Joined;
            return;
        }

        tracing::info!(
            node = %self.state.identity,
            introducer = %self.bootstrap,
            "Trying to join"
        );
        self.state.join.state = JoinState::AwaitingReply;
        self.send_join_request();
    }

    fn send_join_request(&mut self) {
        let request = Message::JoinRequest {
            sender: self.state.identity,
            heartbeat: self.state.own_heartbeat,
        };
        self.send(self.bootstrap, &request);
        self.state.join.attempts += 1;
        self.state.join.waited = 0;
    }

    /// Introducer side: admit `sender` and reply
    pub(super) fn handle_join_request(&mut self, sender: NodeIdentity, heartbeat: u64) {
        let me = self.state.identity;
        let now = self.state.local_clock;

        if self.state.table.is_empty() {
            self.state.table.admit(me, self.state.own_heartbeat, now);
        }

        if self.state.table.admit(sender, heartbeat, now) {
            self.observer.on_member_added(me, sender);
        } else {
            tracing::debug!(node = %me, peer = %sender, "Join request from known member");
        }

        self.send(sender, &Message::JoinReply);
    }

    pub(super) fn handle_join_reply(&mut self) {
        match self.state.join.state {
            JoinState::AwaitingReply => {
                self.state.join.state = JoinState::Joined;
                tracing::info!(
                    node = %self.state.identity,
                    attempts = self.state.join.attempts,
                    "✅ Joined group"
                );
            }
            other => {
                tracing::trace!(node = %self.state.identity, state = ?other, "Ignoring join reply");
            }
        }
    }

    /// Re-send the join request if a retry policy is configured and due
    pub(super) fn retry_join_if_due(&mut self) {
        if self.state.join.state != JoinState::AwaitingReply {
            return;
        }
        let Some(retry) = self.protocol.join_retry else {
            return;
        };

        self.state.join.waited += 1;
        if self.state.join.waited < retry.interval_ticks {
            return;
        }

        if self.state.join.attempts >= retry.max_attempts {
            self.state.join.state = JoinState::JoinFailed;
            let err = MurmurError::JoinFailed(format!(
                "no reply from {} after {} attempts",
                self.bootstrap, self.state.join.attempts
            ));
            tracing::error!(node = %self.state.identity, error = %err, "❌ Giving up on join");
            return;
        }

        tracing::debug!(
            node = %self.state.identity,
            attempt = self.state.join.attempts + 1,
            "Re-sending join request"
        );
        self.send_join_request();
    }
}
