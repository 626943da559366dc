//! Logged-in peers, the quick-match queue, and one-to-one invites.
//!
//! All lobby state sits behind one lock so pairing decisions are atomic: a
//! peer is either idle or seated in exactly one [`Match`]. When the lobby
//! needs a match's lock it takes it while holding its own, never the other
//! way round.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use morris_net::messages::{MatchRequest, MatchRequestResponse, PlayerPool};
use morris_net::{Message, Payload, User};
use tokio::sync::Mutex;

use crate::game_match::{Match, MatchId};
use crate::peer::{Outbox, PeerHandle, PeerId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("You have to log in first.")]
    NotLoggedIn,
    #[error("You are already logged in.")]
    AlreadyLoggedIn,
    #[error("{0} is already logged in on another connection.")]
    UsernameInUse(String),
    #[error("You are already in a match.")]
    InMatch,
    #[error("You are already waiting for a quick match.")]
    AlreadyQueued,
    #[error("You are not waiting for a quick match.")]
    NotQueued,
    #[error("There is no idle player called {0}.")]
    UnknownPlayer(String),
    #[error("You cannot invite yourself.")]
    SelfInvite,
    #[error("You already have an open match request.")]
    InviteOutstanding,
    #[error("{0} has not requested a match with you.")]
    NoInvite(String),
}

struct Member {
    handle: PeerHandle,
    user: User,
    game: Option<Arc<Match>>,
}

impl Member {
    fn is_idle(&self) -> bool {
        self.game.is_none()
    }
}

#[derive(Default)]
struct LobbyState {
    members: HashMap<PeerId, Member>,
    /// Quick-match queue, oldest first.
    queue: VecDeque<PeerId>,
    /// Outstanding invites: requester to target.
    invites: HashMap<PeerId, PeerId>,
}

impl LobbyState {
    fn member(&self, peer: PeerId) -> Result<&Member, LobbyError> {
        self.members.get(&peer).ok_or(LobbyError::NotLoggedIn)
    }

    fn idle_member(&self, peer: PeerId) -> Result<&Member, LobbyError> {
        let member = self.member(peer)?;
        if !member.is_idle() {
            return Err(LobbyError::InMatch);
        }
        Ok(member)
    }

    fn find_by_name(&self, username: &str) -> Option<(PeerId, &Member)> {
        self.members
            .iter()
            .find(|(_, m)| m.user.username == username)
            .map(|(id, m)| (*id, m))
    }

    fn idle_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self
            .members
            .values()
            .filter(|m| m.is_idle())
            .map(|m| m.user.clone())
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }

    /// Send the idle set to every idle member.
    fn broadcast_pool(&self, outbox: &mut Outbox) {
        let pool = Payload::BroadcastPlayerPool(PlayerPool {
            users: self.idle_users(),
        });
        for member in self.members.values().filter(|m| m.is_idle()) {
            outbox.push(&member.handle, Message::unsolicited(pool.clone()));
        }
    }

    /// Forget every invite naming `peer` on either side. Requesters whose
    /// invite targeted `peer` are told it was not accepted.
    fn drop_invites(&mut self, peer: PeerId, outbox: &mut Outbox) {
        self.invites.remove(&peer);
        let stale: Vec<PeerId> = self
            .invites
            .iter()
            .filter(|(_, target)| **target == peer)
            .map(|(requester, _)| *requester)
            .collect();
        let Some(name) = self.members.get(&peer).map(|m| m.user.username.clone()) else {
            for requester in stale {
                self.invites.remove(&requester);
            }
            return;
        };
        for requester in stale {
            self.invites.remove(&requester);
            if let Some(m) = self.members.get(&requester) {
                outbox.push(
                    &m.handle,
                    Message::unsolicited(Payload::MatchRequestResponse(MatchRequestResponse {
                        username: name.clone(),
                        accepted: false,
                    })),
                );
            }
        }
    }
}

pub struct Lobby {
    state: Mutex<LobbyState>,
    next_match: AtomicU64,
}

impl Default for Lobby {
    fn default() -> Self {
        Self::new()
    }
}

impl Lobby {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LobbyState::default()),
            next_match: AtomicU64::new(1),
        }
    }

    /// Add a freshly logged-in peer to the idle set.
    pub async fn join(&self, handle: PeerHandle, user: User) -> Result<Outbox, LobbyError> {
        let mut state = self.state.lock().await;
        if state.members.contains_key(&handle.id()) {
            return Err(LobbyError::AlreadyLoggedIn);
        }
        if state.find_by_name(&user.username).is_some() {
            return Err(LobbyError::UsernameInUse(user.username));
        }

        tracing::info!(peer = ?handle.id(), username = %user.username, "joined lobby");
        state.members.insert(
            handle.id(),
            Member {
                handle,
                user,
                game: None,
            },
        );
        let mut outbox = Outbox::new();
        state.broadcast_pool(&mut outbox);
        Ok(outbox)
    }

    /// Remove `peer` entirely: queue, invites, and any running match, which
    /// is aborted and its other seat released. Unknown peers are a no-op.
    pub async fn leave(&self, peer: PeerId) -> Outbox {
        let mut state = self.state.lock().await;
        let mut outbox = Outbox::new();
        if !state.members.contains_key(&peer) {
            return outbox;
        }

        state.queue.retain(|p| *p != peer);
        state.drop_invites(peer, &mut outbox);
        let Some(member) = state.members.remove(&peer) else {
            return outbox;
        };

        if let Some(game) = member.game {
            game.abort(peer).await;
            if let Some(other) = game.opponent_of(peer)
                && let Some(survivor) = state.members.get_mut(&other)
                && survivor.game.as_ref().is_some_and(|g| Arc::ptr_eq(g, &game))
            {
                survivor.game = None;
            }
        }

        tracing::info!(?peer, username = %member.user.username, "left lobby");
        state.broadcast_pool(&mut outbox);
        outbox
    }

    /// Queue `peer` for a quick match. Whenever two peers wait, the two oldest
    /// are paired.
    pub async fn enter_queue(&self, peer: PeerId) -> Result<Outbox, LobbyError> {
        let mut state = self.state.lock().await;
        state.idle_member(peer)?;
        if state.queue.contains(&peer) {
            return Err(LobbyError::AlreadyQueued);
        }
        state.queue.push_back(peer);
        tracing::debug!(?peer, waiting = state.queue.len(), "entered quick-match queue");

        let mut outbox = Outbox::new();
        while state.queue.len() >= 2 {
            let (Some(a), Some(b)) = (state.queue.pop_front(), state.queue.pop_front()) else {
                break;
            };
            outbox.append(self.pair(&mut state, a, b));
        }
        Ok(outbox)
    }

    pub async fn leave_queue(&self, peer: PeerId) -> Result<Outbox, LobbyError> {
        let mut state = self.state.lock().await;
        state.member(peer)?;
        let before = state.queue.len();
        state.queue.retain(|p| *p != peer);
        if state.queue.len() == before {
            return Err(LobbyError::NotQueued);
        }
        Ok(Outbox::new())
    }

    /// Invite the idle player called `target`.
    pub async fn request_match(&self, peer: PeerId, target: &str) -> Result<Outbox, LobbyError> {
        let mut state = self.state.lock().await;
        let requester = state.idle_member(peer)?;
        if requester.user.username == target {
            return Err(LobbyError::SelfInvite);
        }
        if state.invites.contains_key(&peer) {
            return Err(LobbyError::InviteOutstanding);
        }
        let Some((target_id, target_member)) = state
            .find_by_name(target)
            .filter(|(_, m)| m.is_idle())
        else {
            return Err(LobbyError::UnknownPlayer(target.to_string()));
        };

        let mut outbox = Outbox::new();
        outbox.push(
            &target_member.handle,
            Message::unsolicited(Payload::MatchRequest(MatchRequest {
                username: requester.user.username.clone(),
            })),
        );
        tracing::debug!(?peer, target, "match requested");
        state.invites.insert(peer, target_id);
        Ok(outbox)
    }

    /// Answer the invite `requester` sent to `peer`. Accepting starts the
    /// match; either way the requester learns the answer.
    pub async fn respond_match(
        &self,
        peer: PeerId,
        requester: &str,
        accepted: bool,
    ) -> Result<Outbox, LobbyError> {
        let mut state = self.state.lock().await;
        let responder = state.idle_member(peer)?;
        let responder_name = responder.user.username.clone();
        let Some((requester_id, requester_member)) = state
            .find_by_name(requester)
            .filter(|(id, _)| state.invites.get(id) == Some(&peer))
        else {
            return Err(LobbyError::NoInvite(requester.to_string()));
        };
        let requester_handle = requester_member.handle.clone();
        state.invites.remove(&requester_id);

        let mut outbox = Outbox::new();
        outbox.push(
            &requester_handle,
            Message::unsolicited(Payload::MatchRequestResponse(MatchRequestResponse {
                username: responder_name,
                accepted,
            })),
        );
        if accepted {
            outbox.append(self.pair(&mut state, requester_id, peer));
        }
        Ok(outbox)
    }

    /// Release both players of a finished match back to the idle set.
    pub async fn finish_match(&self, game: &Arc<Match>) -> Outbox {
        let mut state = self.state.lock().await;
        for peer in game.players() {
            if let Some(member) = state.members.get_mut(&peer)
                && member.game.as_ref().is_some_and(|g| Arc::ptr_eq(g, game))
            {
                member.game = None;
            }
        }
        let mut outbox = Outbox::new();
        state.broadcast_pool(&mut outbox);
        outbox
    }

    /// The match `peer` is seated in.
    pub async fn match_for(&self, peer: PeerId) -> Option<Arc<Match>> {
        let state = self.state.lock().await;
        state.members.get(&peer).and_then(|m| m.game.clone())
    }

    pub async fn is_member(&self, peer: PeerId) -> bool {
        self.state.lock().await.members.contains_key(&peer)
    }

    pub async fn idle_users(&self) -> Vec<User> {
        self.state.lock().await.idle_users()
    }

    /// Seat `a` and `b` in a new match. Both leave the queue and lose any
    /// invites; everyone still idle gets the shrunken pool.
    fn pair(&self, state: &mut LobbyState, a: PeerId, b: PeerId) -> Outbox {
        let mut outbox = Outbox::new();
        let (Some(first), Some(second)) = (
            state.members.get(&a).map(|m| m.handle.clone()),
            state.members.get(&b).map(|m| m.handle.clone()),
        ) else {
            return outbox;
        };

        state.queue.retain(|p| *p != a && *p != b);
        state.drop_invites(a, &mut outbox);
        state.drop_invites(b, &mut outbox);

        let id = MatchId(self.next_match.fetch_add(1, Ordering::Relaxed));
        let (game, starts) = Match::start(id, first, second);
        let game = Arc::new(game);
        for peer in [a, b] {
            if let Some(member) = state.members.get_mut(&peer) {
                member.game = Some(Arc::clone(&game));
            }
        }
        outbox.append(starts);
        state.broadcast_pool(&mut outbox);
        outbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_match::MatchStatus;
    use crate::peer::test_peer;
    use morris_engine::Colour;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn user(id: u64, name: &str) -> User {
        User {
            id,
            username: name.to_string(),
        }
    }

    async fn logged_in(lobby: &Lobby, id: u64, name: &str) -> UnboundedReceiver<Message> {
        let (handle, rx) = test_peer(id);
        lobby.join(handle, user(id, name)).await.unwrap().deliver();
        rx
    }

    fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn game_start(msgs: &[Message]) -> Option<(Colour, Colour)> {
        msgs.iter().find_map(|m| match &m.payload {
            Payload::GameStart(s) => Some((s.colour, s.starting)),
            _ => None,
        })
    }

    fn last_pool(msgs: &[Message]) -> Option<Vec<String>> {
        msgs.iter().rev().find_map(|m| match &m.payload {
            Payload::BroadcastPlayerPool(p) => {
                Some(p.users.iter().map(|u| u.username.clone()).collect())
            }
            _ => None,
        })
    }

    #[tokio::test]
    async fn test_join_broadcasts_pool_to_idle_peers() {
        let lobby = Lobby::new();
        let mut x = logged_in(&lobby, 1, "xena").await;
        let _y = logged_in(&lobby, 2, "yuri").await;
        let msgs = drain(&mut x);
        assert_eq!(last_pool(&msgs), Some(vec!["xena".into(), "yuri".into()]));
    }

    #[tokio::test]
    async fn test_duplicate_login_rejected() {
        let lobby = Lobby::new();
        let _x = logged_in(&lobby, 1, "xena").await;
        let (other, _rx) = test_peer(2);
        let err = lobby.join(other, user(1, "xena")).await.unwrap_err();
        assert_eq!(err, LobbyError::UsernameInUse("xena".into()));

        let (same, _rx) = test_peer(1);
        let err = lobby.join(same, user(3, "zed")).await.unwrap_err();
        assert_eq!(err, LobbyError::AlreadyLoggedIn);
    }

    #[tokio::test]
    async fn test_quick_match_pairs_two_oldest() {
        let lobby = Lobby::new();
        let mut x = logged_in(&lobby, 1, "xena").await;
        let mut y = logged_in(&lobby, 2, "yuri").await;
        let mut z = logged_in(&lobby, 3, "zed").await;
        drain(&mut x);
        drain(&mut y);
        drain(&mut z);

        assert!(lobby.enter_queue(PeerId(1)).await.unwrap().is_empty());
        lobby.enter_queue(PeerId(2)).await.unwrap().deliver();

        let (xc, xs) = game_start(&drain(&mut x)).expect("x starts");
        let (yc, ys) = game_start(&drain(&mut y)).expect("y starts");
        assert_eq!(xc, yc.opponent());
        assert_eq!(xs, ys);

        let m = lobby.match_for(PeerId(1)).await.unwrap();
        assert!(Arc::ptr_eq(&m, &lobby.match_for(PeerId(2)).await.unwrap()));
        assert!(lobby.match_for(PeerId(3)).await.is_none());
        assert_eq!(last_pool(&drain(&mut z)), Some(vec!["zed".into()]));

        assert_eq!(
            lobby.enter_queue(PeerId(1)).await.unwrap_err(),
            LobbyError::InMatch
        );
    }

    #[tokio::test]
    async fn test_queue_rules() {
        let lobby = Lobby::new();
        let _x = logged_in(&lobby, 1, "xena").await;
        assert_eq!(
            lobby.enter_queue(PeerId(9)).await.unwrap_err(),
            LobbyError::NotLoggedIn
        );
        lobby.enter_queue(PeerId(1)).await.unwrap();
        assert_eq!(
            lobby.enter_queue(PeerId(1)).await.unwrap_err(),
            LobbyError::AlreadyQueued
        );
        lobby.leave_queue(PeerId(1)).await.unwrap();
        assert_eq!(
            lobby.leave_queue(PeerId(1)).await.unwrap_err(),
            LobbyError::NotQueued
        );
    }

    #[tokio::test]
    async fn test_invite_accept_starts_match() {
        let lobby = Lobby::new();
        let mut a = logged_in(&lobby, 1, "alice").await;
        let mut b = logged_in(&lobby, 2, "bob").await;
        drain(&mut a);
        drain(&mut b);

        lobby.request_match(PeerId(1), "bob").await.unwrap().deliver();
        let msgs = drain(&mut b);
        assert!(matches!(
            &msgs[0].payload,
            Payload::MatchRequest(r) if r.username == "alice"
        ));
        assert_eq!(
            lobby.request_match(PeerId(1), "bob").await.unwrap_err(),
            LobbyError::InviteOutstanding
        );

        lobby
            .respond_match(PeerId(2), "alice", true)
            .await
            .unwrap()
            .deliver();
        let msgs = drain(&mut a);
        assert!(matches!(
            &msgs[0].payload,
            Payload::MatchRequestResponse(r) if r.username == "bob" && r.accepted
        ));
        assert!(game_start(&msgs).is_some());
        assert!(game_start(&drain(&mut b)).is_some());
        assert!(lobby.match_for(PeerId(1)).await.is_some());
    }

    #[tokio::test]
    async fn test_invite_decline_notifies_requester() {
        let lobby = Lobby::new();
        let mut a = logged_in(&lobby, 1, "alice").await;
        let _b = logged_in(&lobby, 2, "bob").await;
        lobby.request_match(PeerId(1), "bob").await.unwrap().deliver();
        drain(&mut a);

        lobby
            .respond_match(PeerId(2), "alice", false)
            .await
            .unwrap()
            .deliver();
        let msgs = drain(&mut a);
        assert_eq!(msgs.len(), 1);
        assert!(matches!(
            &msgs[0].payload,
            Payload::MatchRequestResponse(r) if !r.accepted
        ));
        assert!(lobby.match_for(PeerId(1)).await.is_none());
        assert_eq!(
            lobby.respond_match(PeerId(2), "alice", true).await.unwrap_err(),
            LobbyError::NoInvite("alice".into())
        );
        // The requester may invite again.
        assert!(lobby.request_match(PeerId(1), "bob").await.is_ok());
    }

    #[tokio::test]
    async fn test_invite_errors() {
        let lobby = Lobby::new();
        let _a = logged_in(&lobby, 1, "alice").await;
        assert_eq!(
            lobby.request_match(PeerId(1), "alice").await.unwrap_err(),
            LobbyError::SelfInvite
        );
        assert_eq!(
            lobby.request_match(PeerId(1), "nobody").await.unwrap_err(),
            LobbyError::UnknownPlayer("nobody".into())
        );
        assert_eq!(
            lobby.respond_match(PeerId(1), "nobody", true).await.unwrap_err(),
            LobbyError::NoInvite("nobody".into())
        );
    }

    #[tokio::test]
    async fn test_target_leaving_drops_invite() {
        let lobby = Lobby::new();
        let mut a = logged_in(&lobby, 1, "alice").await;
        let _b = logged_in(&lobby, 2, "bob").await;
        lobby.request_match(PeerId(1), "bob").await.unwrap().deliver();
        drain(&mut a);

        lobby.leave(PeerId(2)).await.deliver();
        let msgs = drain(&mut a);
        assert!(matches!(
            &msgs[0].payload,
            Payload::MatchRequestResponse(r) if r.username == "bob" && !r.accepted
        ));
        assert_eq!(last_pool(&msgs), Some(vec!["alice".into()]));
        assert!(lobby.request_match(PeerId(1), "carol").await.is_err());
    }

    #[tokio::test]
    async fn test_leaving_mid_match_aborts_and_releases_survivor() {
        let lobby = Lobby::new();
        let mut x = logged_in(&lobby, 1, "xena").await;
        let mut y = logged_in(&lobby, 2, "yuri").await;
        lobby.enter_queue(PeerId(1)).await.unwrap().deliver();
        lobby.enter_queue(PeerId(2)).await.unwrap().deliver();
        let game = lobby.match_for(PeerId(1)).await.unwrap();
        drain(&mut x);
        drain(&mut y);

        lobby.leave(PeerId(1)).await.deliver();
        let msgs = drain(&mut y);
        assert!(msgs.iter().any(|m| matches!(
            &m.payload,
            Payload::GameAborted(a) if a.reason == "Other player disconnected"
        )));
        assert_eq!(last_pool(&msgs), Some(vec!["yuri".into()]));
        assert_eq!(game.status().await, MatchStatus::Aborted);
        assert!(lobby.match_for(PeerId(2)).await.is_none());
        assert!(!lobby.is_member(PeerId(1)).await);

        // The survivor can be paired again.
        let _z = logged_in(&lobby, 3, "zed").await;
        lobby.enter_queue(PeerId(2)).await.unwrap();
        lobby.enter_queue(PeerId(3)).await.unwrap();
        let next = lobby.match_for(PeerId(2)).await.unwrap();
        assert!(!Arc::ptr_eq(&next, &game));
    }

    #[tokio::test]
    async fn test_finish_match_returns_both_to_pool() {
        let lobby = Lobby::new();
        let _x = logged_in(&lobby, 1, "xena").await;
        let _y = logged_in(&lobby, 2, "yuri").await;
        lobby.enter_queue(PeerId(1)).await.unwrap();
        lobby.enter_queue(PeerId(2)).await.unwrap();
        assert!(lobby.idle_users().await.is_empty());

        let game = lobby.match_for(PeerId(1)).await.unwrap();
        lobby.finish_match(&game).await.deliver();
        assert_eq!(lobby.idle_users().await.len(), 2);
        assert!(lobby.match_for(PeerId(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_quick_match_withdraws_open_invite() {
        let lobby = Lobby::new();
        let _a = logged_in(&lobby, 1, "alice").await;
        let mut b = logged_in(&lobby, 2, "bob").await;
        let _c = logged_in(&lobby, 3, "carol").await;
        lobby.request_match(PeerId(1), "bob").await.unwrap().deliver();

        lobby.enter_queue(PeerId(1)).await.unwrap().deliver();
        lobby.enter_queue(PeerId(3)).await.unwrap().deliver();
        let game = lobby.match_for(PeerId(1)).await.unwrap();
        assert_eq!(game.opponent_of(PeerId(1)), Some(PeerId(3)));
        drain(&mut b);

        assert_eq!(
            lobby.respond_match(PeerId(2), "alice", true).await.unwrap_err(),
            LobbyError::NoInvite("alice".into())
        );
        assert!(drain(&mut b).is_empty());
        assert!(lobby.match_for(PeerId(2)).await.is_none());
        assert_eq!(game.opponent_of(PeerId(1)), Some(PeerId(3)));
    }

    #[tokio::test]
    async fn test_leave_unknown_peer_is_noop() {
        let lobby = Lobby::new();
        assert!(lobby.leave(PeerId(42)).await.is_empty());
    }
}
