use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ai::{decision_ev_gap, find_profile, AiStepKind, AiTurnState, DecisionContext};
use crate::game::{GamePhase, TurnDecision};
use crate::protocol::{RoomPhase, RoomUpdateAction, SeatType, ServerEvent, TurnSkipReason, UserId};
use crate::storage::{keys, AlarmFired, RoomStoreExt};

use super::RoomActor;

/// Descriptor kinds for the single pending alarm.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmKind {
    TurnTimeout,
    AfkWarning,
    AfkTimeout,
    GameStart,
    AiTurn,
    ReconnectDeadline,
    RoomCleanup,
}

/// Persisted alarm purpose, written alongside every `set_alarm` so the
/// handler can recover intent after a resume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlarmData {
    #[serde(rename = "type")]
    pub kind: AlarmKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<UserId>,
    pub scheduled_at: DateTime<Utc>,
}

impl RoomActor {
    /// Compute the earliest relevant wake-up and (re)schedule it.
    ///
    /// Exactly one alarm is ever pending; this supersedes whatever was set
    /// before. The room is destroyed only when nothing else needs a wake-up.
    pub(super) async fn reschedule_alarm(&mut self) {
        let candidate = self.next_alarm_candidate();
        match candidate {
            Some(descriptor) => {
                let at = descriptor.scheduled_at;
                if let Err(e) = self.store.save(keys::ALARM_DATA, &descriptor).await {
                    tracing::error!(room = %self.code, error = %e, "Failed to persist alarm descriptor");
                }
                if let Err(e) = self.store.set_alarm(at).await {
                    tracing::error!(room = %self.code, error = %e, "Failed to schedule alarm");
                }
            }
            None => {
                if let Err(e) = self.store.delete(keys::ALARM_DATA).await {
                    tracing::warn!(room = %self.code, error = %e, "Failed to clear alarm descriptor");
                }
                if let Err(e) = self.store.delete_alarm().await {
                    tracing::warn!(room = %self.code, error = %e, "Failed to clear alarm");
                }
            }
        }
    }

    fn next_alarm_candidate(&self) -> Option<AlarmData> {
        fn consider(
            best: &mut Option<AlarmData>,
            kind: AlarmKind,
            player_id: Option<UserId>,
            at: DateTime<Utc>,
        ) {
            if best.as_ref().is_none_or(|b| at < b.scheduled_at) {
                *best = Some(AlarmData {
                    kind,
                    player_id,
                    scheduled_at: at,
                });
            }
        }

        let mut best: Option<AlarmData> = None;

        // Game-start countdown
        if self.room.phase == RoomPhase::Starting && self.game.phase == GamePhase::Starting {
            if let Some(started) = self.room.started_at {
                consider(
                    &mut best,
                    AlarmKind::GameStart,
                    None,
                    started + Duration::seconds(self.config.countdown_secs),
                );
            }
        }

        // Pending AI step
        if let Some(at) = self.ai_wake_at {
            consider(
                &mut best,
                AlarmKind::AiTurn,
                self.game.current_player_id().cloned(),
                at,
            );
        }

        // Human turn clock
        if let Some(deadline) = self.game.turn_deadline {
            let current = self.game.current_player_id().cloned();
            let warning_at = deadline - Duration::seconds(self.config.afk_warning_lead_secs);
            if !self.game.afk_warning_sent && warning_at > self.game.turn_started_at.unwrap_or(deadline) {
                consider(&mut best, AlarmKind::AfkWarning, current, warning_at);
            } else {
                consider(&mut best, AlarmKind::AfkTimeout, current, deadline);
            }
        }

        // Earliest reconnect deadline
        for seat in &self.room.seats {
            if let Some(deadline) = seat.reconnect_deadline {
                consider(
                    &mut best,
                    AlarmKind::ReconnectDeadline,
                    Some(seat.user_id.clone()),
                    deadline,
                );
            }
        }

        // Cleanup only when nothing else is pending and nobody is here
        if best.is_none() && self.connections.is_empty() {
            if let Some(idle_since) = self.idle_since {
                consider(
                    &mut best,
                    AlarmKind::RoomCleanup,
                    None,
                    idle_since + Duration::seconds(self.config.cleanup_after_secs),
                );
            }
        }

        best
    }

    pub(super) async fn handle_alarm(&mut self, fired: AlarmFired) {
        let now = Utc::now();
        tracing::debug!(
            room = %self.code,
            scheduled_for = %fired.scheduled_for,
            "Alarm fired"
        );

        // Resumption contract: never trust the in-memory caches across a
        // suspension; the persisted state is the source of truth.
        match self.store.load(keys::ROOM).await {
            Ok(Some(room)) => self.room = room,
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload room record on alarm");
                return;
            }
        }
        match self.store.load(keys::GAME_STATE).await {
            Ok(Some(game)) => self.game = game,
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload game state on alarm");
                return;
            }
        }

        let descriptor: Option<AlarmData> = match self.store.load(keys::ALARM_DATA).await {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load alarm descriptor");
                None
            }
        };
        if let Err(e) = self.store.delete(keys::ALARM_DATA).await {
            tracing::warn!(error = %e, "Failed to clear alarm descriptor");
        }

        if let Some(descriptor) = descriptor {
            tracing::debug!(room = %self.code, kind = ?descriptor.kind, "Dispatching alarm descriptor");
            match descriptor.kind {
                AlarmKind::GameStart => self.on_game_start_alarm(now).await,
                AlarmKind::AiTurn => self.on_ai_turn_alarm(now).await,
                AlarmKind::AfkWarning => self.on_afk_warning(now).await,
                AlarmKind::AfkTimeout | AlarmKind::TurnTimeout => {
                    self.on_turn_timeout(now, descriptor.player_id.as_ref()).await;
                }
                AlarmKind::ReconnectDeadline => {
                    if let Some(player_id) = descriptor.player_id.clone() {
                        self.on_reconnect_deadline(now, &player_id).await;
                    }
                }
                AlarmKind::RoomCleanup => {
                    self.on_room_cleanup(now);
                    return;
                }
            }
        }

        // Opportunistic housekeeping on every wake
        self.sweep_join_requests(now).await;
        self.expire_typing_indicators(now);
        self.reschedule_alarm().await;
    }

    /// Countdown finished: enter the first turn.
    async fn on_game_start_alarm(&mut self, now: DateTime<Utc>) {
        if self.room.phase != RoomPhase::Starting
            || !crate::game::is_valid_phase_transition(self.game.phase, GamePhase::TurnRoll)
        {
            return;
        }
        self.room.phase = RoomPhase::Playing;
        self.game.begin_turn(now);
        let Some(current) = self.game.current_player_id().cloned() else {
            return;
        };
        if let Some(seat) = self.room.seat_mut(&current) {
            seat.reset_turn_state();
        }
        self.arm_turn_clock(now);

        self.persist_room().await;
        self.persist_game().await;

        self.broadcast(
            ServerEvent::GameStarted {
                player_order: self.game.player_order.clone(),
                current_player: current.clone(),
                game: self.game.clone(),
            },
            None,
        );
        self.emit_turn_started(&current);
        self.begin_ai_turn_if_needed(&current).await;
        tracing::info!(room = %self.code, "Game started");
        self.publish_status(RoomUpdateAction::Updated).await;
    }

    /// T-10s warning for the current human turn.
    async fn on_afk_warning(&mut self, now: DateTime<Utc>) {
        let Some(deadline) = self.game.turn_deadline else {
            return;
        };
        if self.game.afk_warning_sent {
            return;
        }
        let Some(current) = self.game.current_player_id().cloned() else {
            return;
        };
        let remaining = (deadline - now).num_seconds().max(0);
        self.game.afk_warning_sent = true;
        self.persist_game().await;
        self.send_to_user(
            &current,
            ServerEvent::PlayerAfk {
                user_id: current.clone(),
                seconds_remaining: u32::try_from(remaining).unwrap_or(0),
            },
        );
    }

    /// Turn clock ran out: deterministic zero and advance.
    async fn on_turn_timeout(&mut self, now: DateTime<Utc>, player_id: Option<&UserId>) {
        let Some(deadline) = self.game.turn_deadline else {
            return;
        };
        if now < deadline {
            return;
        }
        let Some(current) = self.game.current_player_id().cloned() else {
            return;
        };
        // The descriptor may reference a player whose turn already ended
        if player_id.is_some_and(|p| p != &current) {
            return;
        }
        tracing::info!(room = %self.code, %current, "Turn timed out");
        self.skip_current_turn(&current, TurnSkipReason::Timeout).await;
    }

    /// Five-minute reconnect window elapsed.
    async fn on_reconnect_deadline(&mut self, now: DateTime<Utc>, player_id: &UserId) {
        let Some(seat) = self.room.seat(player_id) else {
            // Seat already gone; nothing to do
            return;
        };
        let Some(deadline) = seat.reconnect_deadline else {
            return;
        };
        if now < deadline || seat.is_connected {
            return;
        }
        let display_name = seat.display_name.clone();

        if self.room.phase == RoomPhase::Playing {
            // Forfeit the seat but keep it in the rotation
            if let Some(seat) = self.room.seat_mut(player_id) {
                seat.has_forfeited = true;
                seat.reconnect_deadline = None;
            }
            let line = self
                .chat
                .create_system(&format!("{display_name} forfeited"), now);
            self.persist_room().await;
            self.persist_chat().await;
            self.broadcast(ServerEvent::ChatMessage { message: line }, None);

            if self.game.current_player_id() == Some(player_id) {
                let player = player_id.clone();
                self.skip_current_turn(&player, TurnSkipReason::Disconnect).await;
            }
        } else {
            // Waiting (or finished) rooms simply release the seat
            self.room.remove_seat(player_id);
            let was_host = self.room.host_id == *player_id;
            if was_host {
                if let Some(next_host) = self.room.seats.iter_mut().find(|s| s.seat_type == SeatType::Human) {
                    next_host.is_host = true;
                    self.room.host_id = next_host.user_id.clone();
                }
            }
            let line = self
                .chat
                .create_system(&format!("{display_name} left the room"), now);
            self.persist_room().await;
            self.persist_chat().await;
            self.broadcast(
                ServerEvent::PlayerRemoved {
                    user_id: player_id.clone(),
                },
                None,
            );
            self.broadcast(ServerEvent::ChatMessage { message: line }, None);
        }
        tracing::info!(room = %self.code, %player_id, "Reconnect window expired");
        self.publish_status(RoomUpdateAction::Updated).await;
    }

    /// Inactivity window elapsed with nobody connected: tear down.
    fn on_room_cleanup(&mut self, _now: DateTime<Utc>) {
        if !self.connections.is_empty() {
            return;
        }
        tracing::info!(room = %self.code, "Cleaning up idle room");
        self.shutting_down = true;
    }

    /// One AI decision per wake-up.
    async fn on_ai_turn_alarm(&mut self, now: DateTime<Utc>) {
        self.ai_wake_at = None;
        let turn_state: Option<AiTurnState> = match self.store.load(keys::AI_TURN_DATA).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(room = %self.code, error = %e, "Failed to load AI turn state");
                None
            }
        };
        let Some(turn_state) = turn_state else {
            return;
        };
        let player_id = turn_state.player_id.clone();

        // Validate against the freshly loaded state; a stale descriptor
        // (player forfeited, turn already over) is silently dropped
        let is_current = self.game.current_player_id() == Some(&player_id);
        let seat_ok = self
            .room
            .seat(&player_id)
            .is_some_and(|s| s.seat_type == SeatType::Ai && !s.has_forfeited);
        if !is_current || !seat_ok {
            if let Err(e) = self.store.delete(keys::AI_TURN_DATA).await {
                tracing::warn!(room = %self.code, error = %e, "Failed to clear stale AI turn state");
            }
            return;
        }

        let Some(profile) = self
            .room
            .seat(&player_id)
            .and_then(|s| s.ai_profile_id.as_deref())
            .and_then(find_profile)
        else {
            return;
        };

        let dice_in_hand = self
            .room
            .seat(&player_id)
            .and_then(|s| s.current_dice)
            .is_some();

        if !dice_in_hand {
            // First action of the turn is always the opening roll
            self.broadcast(
                ServerEvent::AiRolling {
                    user_id: player_id.clone(),
                },
                None,
            );
            if let Err(rejection) = self.apply_roll(&player_id, None).await {
                tracing::warn!(room = %self.code, %rejection, "AI opening roll rejected");
                return;
            }
            self.schedule_next_ai_step(&profile, &player_id, now).await;
            return;
        }

        let ctx = self.build_ai_context(&player_id);
        let decision = crate::ai::decide(&profile, &ctx, &mut self.rng);
        match decision {
            TurnDecision::Roll { keep } => {
                self.broadcast(
                    ServerEvent::AiKeeping {
                        user_id: player_id.clone(),
                        kept_mask: keep,
                    },
                    None,
                );
                self.broadcast(
                    ServerEvent::AiRolling {
                        user_id: player_id.clone(),
                    },
                    None,
                );
                if let Err(rejection) = self.apply_roll(&player_id, Some(keep)).await {
                    tracing::warn!(room = %self.code, %rejection, "AI reroll rejected");
                    return;
                }
                self.schedule_next_ai_step(&profile, &player_id, now).await;
            }
            TurnDecision::Score { category } => {
                self.broadcast(
                    ServerEvent::AiScoring {
                        user_id: player_id.clone(),
                        category: category.wire_name().to_string(),
                    },
                    None,
                );
                if let Err(rejection) = self.apply_score(&player_id, category).await {
                    tracing::warn!(room = %self.code, %rejection, "AI score rejected");
                }
                // apply_score advanced the turn and cleared ai_turn_data
            }
        }
    }

    /// Persist the next AI step marker with a freshly sampled delay.
    async fn schedule_next_ai_step(
        &mut self,
        profile: &crate::ai::AiProfile,
        player_id: &UserId,
        now: DateTime<Utc>,
    ) {
        let ctx = self.build_ai_context(player_id);
        let step = if ctx.rolls_remaining > 0 {
            AiStepKind::Keep
        } else {
            AiStepKind::Score
        };
        let ev_gap = decision_ev_gap(&ctx);
        let delay = crate::ai::step_delay(profile, step, &ctx, ev_gap, &mut self.rng);
        let wake_at = now + Duration::milliseconds(i64::try_from(delay.as_millis()).unwrap_or(1500));

        let turn_state = AiTurnState {
            player_id: player_id.clone(),
            step,
            scheduled_at: wake_at,
        };
        if let Err(e) = self.store.save(keys::AI_TURN_DATA, &turn_state).await {
            tracing::error!(room = %self.code, error = %e, "Failed to persist AI turn state");
        }
        self.ai_wake_at = Some(wake_at);
    }

    /// Snapshot the decision inputs for the AI's current turn.
    pub(super) fn build_ai_context(&self, player_id: &UserId) -> DecisionContext {
        let seat = self.room.seat(player_id);
        let dice = seat
            .and_then(|s| s.current_dice)
            .unwrap_or(crate::game::Dice([1, 2, 3, 4, 5]));
        let kept_mask = seat.map_or([false; 5], |s| s.kept_mask);
        let rolls_remaining = seat.map_or(0, |s| s.rolls_remaining);
        let scorecard = seat.map(|s| s.scorecard.clone()).unwrap_or_default();
        let available = scorecard.remaining();
        let own_total = scorecard.total();
        let best_opponent_total = self
            .room
            .seats
            .iter()
            .filter(|s| &s.user_id != player_id)
            .map(|s| s.scorecard.total())
            .max()
            .unwrap_or(0);

        DecisionContext {
            dice,
            kept_mask,
            rolls_remaining,
            scorecard,
            available,
            own_total,
            best_opponent_total,
            round_number: self.game.round_number,
        }
    }

    /// Move stale pending join requests to expired and notify interested
    /// parties.
    pub(super) async fn sweep_join_requests(&mut self, now: DateTime<Utc>) {
        let expired = self.join_requests.sweep(now);
        if expired.is_empty() {
            return;
        }
        self.persist_join_requests().await;
        for request in expired {
            let host_id = self.room.host_id.clone();
            self.send_to_user(
                &host_id,
                ServerEvent::JoinRequestUpdate {
                    request: request.clone(),
                },
            );
            self.lobby.join_request_resolved(request).await;
        }
    }

    pub(super) fn expire_typing_indicators(&mut self, now: DateTime<Utc>) {
        for (user_id, display_name) in self.chat.expire_typing(now) {
            self.broadcast(
                ServerEvent::TypingUpdate {
                    user_id,
                    display_name,
                    is_typing: false,
                },
                None,
            );
        }
    }
}
