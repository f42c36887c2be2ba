use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use uuid::Uuid;

use crate::ai::{find_profile, AiStepKind, AiTurnState};
use crate::game::validator::{self, SeatView};
use crate::game::{Category, Dice, GamePhase, GameRejection, KeepMask};
use crate::protocol::{
    ErrorCode, RoomPhase, RoomUpdateAction, SeatType, ServerEvent, TurnSkipReason, UserId,
};
use crate::storage::{keys, RoomStoreExt};

use super::model::Seat;
use super::RoomActor;

/// What a caller must be for a command, used when the caller has no seat.
enum CallerKind {
    Host,
    CurrentPlayer,
}

impl RoomActor {
    /// Resolve the calling connection to a seated player id, or send the
    /// appropriate rejection.
    fn require_seat(&mut self, conn_id: Uuid, kind: CallerKind) -> Option<UserId> {
        let user_id = self.conn_attachment(conn_id).map(|a| a.user_id)?;
        if self.room.seat(&user_id).is_some() {
            return Some(user_id);
        }
        let code = match kind {
            CallerKind::Host => ErrorCode::NotHost,
            CallerKind::CurrentPlayer => ErrorCode::NotYourTurn,
        };
        self.send_error(conn_id, code);
        None
    }

    fn reject(&mut self, conn_id: Uuid, rejection: &GameRejection) {
        tracing::debug!(room = %self.code, %rejection, "Game command rejected");
        self.send_error(conn_id, rejection.code());
    }

    /// Run a validator against the caller's seat.
    fn validate<F>(&self, user_id: &UserId, check: F) -> Result<(), GameRejection>
    where
        F: FnOnce(&SeatView<'_>) -> Result<(), GameRejection>,
    {
        let seat = self
            .room
            .seat(user_id)
            .ok_or(GameRejection::NotYourTurn)?;
        let view = SeatView {
            user_id,
            is_host: seat.is_host,
            rolls_remaining: seat.rolls_remaining,
            scorecard: &seat.scorecard,
        };
        check(&view)
    }

    pub(super) async fn handle_start_game(&mut self, conn_id: Uuid) {
        let Some(user_id) = self.require_seat(conn_id, CallerKind::Host) else {
            return;
        };
        let seated = self.room.seats.len();
        if let Err(rejection) =
            self.validate(&user_id, |view| validator::validate_start_game(&self.game, view, seated))
        {
            self.reject(conn_id, &rejection);
            return;
        }

        let now = Utc::now();
        let mut order: Vec<UserId> = self.room.seats.iter().map(|s| s.user_id.clone()).collect();
        order.shuffle(&mut self.rng);
        for (i, id) in order.iter().enumerate() {
            if let Some(seat) = self.room.seat_mut(id) {
                seat.turn_order = i;
                seat.reset_turn_state();
            }
        }

        self.game.begin_countdown(order, now);
        self.room.phase = RoomPhase::Starting;
        self.room.started_at = Some(now);

        self.persist_room().await;
        self.persist_game().await;

        let countdown = u32::try_from(self.config.countdown_secs).unwrap_or(3);
        self.broadcast(
            ServerEvent::GameStarting {
                countdown_secs: countdown,
            },
            None,
        );
        tracing::info!(room = %self.code, players = self.game.player_order.len(), "Game starting");
        self.publish_status(RoomUpdateAction::Updated).await;
        self.reschedule_alarm().await;
    }

    pub(super) async fn handle_quick_play(&mut self, conn_id: Uuid, ai_profiles: &[String]) {
        let Some(user_id) = self.require_seat(conn_id, CallerKind::Host) else {
            return;
        };
        let other_humans = self
            .room
            .human_seats()
            .filter(|s| s.user_id != user_id)
            .count();
        if let Err(rejection) = self.validate(&user_id, |view| {
            validator::validate_quick_play(&self.game, view, other_humans, ai_profiles.len())
        }) {
            self.reject(conn_id, &rejection);
            return;
        }

        if 1 + ai_profiles.len() > usize::from(self.room.settings.max_seats) {
            self.send_error(conn_id, ErrorCode::RoomFull);
            return;
        }
        let mut profiles = Vec::with_capacity(ai_profiles.len());
        for id in ai_profiles {
            match find_profile(id) {
                Some(profile) => profiles.push(profile),
                None => {
                    self.send_error(conn_id, ErrorCode::InvalidMessage);
                    return;
                }
            }
        }

        let now = Utc::now();
        // The human keeps index 0; AIs follow in the requested order
        let mut order = vec![user_id.clone()];
        for profile in &profiles {
            let seat = Seat::ai(profile, self.room.seats.len());
            order.push(seat.user_id.clone());
            self.room.seats.push(seat);
        }
        if let Some(seat) = self.room.seat_mut(&user_id) {
            seat.turn_order = 0;
            seat.reset_turn_state();
        }

        self.game.begin_countdown(order, now);
        self.game.begin_turn(now);
        self.room.phase = RoomPhase::Playing;
        self.room.started_at = Some(now);
        self.arm_turn_clock(now);

        self.persist_room().await;
        self.persist_game().await;

        let current = self.game.player_order[0].clone();
        self.broadcast(
            ServerEvent::QuickPlayStarted {
                player_order: self.game.player_order.clone(),
                current_player: current.clone(),
                game: self.game.clone(),
                players: self.room.player_snapshots(),
            },
            None,
        );
        self.emit_turn_started(&current);
        tracing::info!(room = %self.code, ai_count = profiles.len(), "Quick play started");
        self.publish_status(RoomUpdateAction::Updated).await;
        self.reschedule_alarm().await;
    }

    pub(super) async fn handle_dice_roll(&mut self, conn_id: Uuid, kept_mask: Option<KeepMask>) {
        let Some(user_id) = self.require_seat(conn_id, CallerKind::CurrentPlayer) else {
            return;
        };
        match self.apply_roll(&user_id, kept_mask).await {
            Ok(()) => {}
            Err(rejection) => self.reject(conn_id, &rejection),
        }
    }

    /// Shared roll path for humans and AI decisions.
    pub(super) async fn apply_roll(
        &mut self,
        user_id: &UserId,
        kept_mask: Option<KeepMask>,
    ) -> Result<(), GameRejection> {
        self.validate(user_id, |view| validator::validate_dice_roll(&self.game, view))?;

        let seat = self
            .room
            .seat_mut(user_id)
            .ok_or(GameRejection::NotYourTurn)?;
        let (dice, mask) = match seat.current_dice {
            // First roll of the turn: everything rolls
            None => (Dice::roll(&mut self.rng), [false; 5]),
            Some(current) => {
                let mask = kept_mask.unwrap_or(seat.kept_mask);
                (current.reroll(mask, &mut self.rng), mask)
            }
        };
        seat.current_dice = Some(dice);
        seat.kept_mask = mask;
        seat.rolls_remaining -= 1;
        let rolls_remaining = seat.rolls_remaining;

        self.game.phase = GamePhase::TurnDecide;

        self.persist_room().await;
        self.persist_game().await;

        self.broadcast(
            ServerEvent::DiceRolled {
                user_id: user_id.clone(),
                dice,
                kept_mask: mask,
                rolls_remaining,
                phase: self.game.phase,
            },
            None,
        );
        Ok(())
    }

    pub(super) async fn handle_dice_keep(&mut self, conn_id: Uuid, indices: &[u8]) {
        let Some(user_id) = self.require_seat(conn_id, CallerKind::CurrentPlayer) else {
            return;
        };
        if let Err(rejection) =
            self.validate(&user_id, |view| validator::validate_dice_keep(&self.game, view))
        {
            self.reject(conn_id, &rejection);
            return;
        }

        let mask = crate::game::dice::mask_from_indices(indices);
        if let Some(seat) = self.room.seat_mut(&user_id) {
            seat.kept_mask = mask;
        }
        self.persist_room().await;
        self.broadcast(
            ServerEvent::DiceKept {
                user_id,
                kept_mask: mask,
            },
            None,
        );
    }

    pub(super) async fn handle_category_score(&mut self, conn_id: Uuid, category: &str) {
        let Some(user_id) = self.require_seat(conn_id, CallerKind::CurrentPlayer) else {
            return;
        };
        let Ok(category) = category.parse::<Category>() else {
            self.reject(conn_id, &GameRejection::UnknownCategory);
            return;
        };
        match self.apply_score(&user_id, category).await {
            Ok(()) => {}
            Err(rejection) => self.reject(conn_id, &rejection),
        }
    }

    /// Shared scoring path for humans and AI decisions. Writes the
    /// category, emits the event, and advances the turn.
    pub(super) async fn apply_score(
        &mut self,
        user_id: &UserId,
        category: Category,
    ) -> Result<(), GameRejection> {
        self.validate(user_id, |view| {
            validator::validate_category_score(&self.game, view, category)
        })?;

        let seat = self
            .room
            .seat_mut(user_id)
            .ok_or(GameRejection::NotYourTurn)?;
        let dice = seat.current_dice.ok_or(GameRejection::InvalidPhase)?;
        let outcome = seat
            .scorecard
            .apply(category, dice)
            .map_err(|_| GameRejection::CategoryAlreadyScored)?;
        seat.total_score = seat.scorecard.total();
        seat.reset_turn_state();
        let total_score = seat.total_score;
        let is_ai = seat.seat_type == SeatType::Ai;
        let ai_profile_id = seat.ai_profile_id.clone();

        self.persist_room().await;

        self.broadcast(
            ServerEvent::CategoryScored {
                user_id: user_id.clone(),
                category: category.wire_name().to_string(),
                score: outcome.gained,
                is_repeat_bonus: outcome.repeat_bonus_awarded,
                upper_bonus_awarded: outcome.upper_bonus_awarded,
                total_score,
            },
            None,
        );

        // AI color commentary on notable outcomes
        if is_ai {
            if let Some(profile_id) = ai_profile_id {
                let trigger = if outcome.repeat_bonus_awarded
                    || (category == Category::FiveOfAKind && outcome.gained > 0)
                {
                    Some("wow")
                } else if outcome.gained == 0 {
                    Some("ouch")
                } else {
                    None
                };
                if let Some(key) = trigger {
                    self.maybe_ai_chat(user_id, &profile_id, key).await;
                }
            }
        }

        self.advance_after_turn().await;
        Ok(())
    }

    /// Advance to the next player, skipping forfeited seats, and finish the
    /// game when the rounds are exhausted.
    pub(super) async fn advance_after_turn(&mut self) {
        let now = Utc::now();

        // Clear any in-flight AI step; the next turn schedules its own
        self.ai_wake_at = None;
        if let Err(e) = self.store.delete(keys::AI_TURN_DATA).await {
            tracing::warn!(room = %self.code, error = %e, "Failed to clear AI turn data");
        }

        loop {
            let all_complete = self
                .room
                .seats
                .iter()
                .filter(|s| self.game.player_order.contains(&s.user_id))
                .all(|s| s.scorecard.is_complete());
            if all_complete {
                self.complete_game(now).await;
                return;
            }

            let Some(next_id) = self.game.advance_turn(now).cloned() else {
                tracing::error!(room = %self.code, "Turn advance with empty player order");
                return;
            };
            if self.game.rounds_exhausted() {
                self.complete_game(now).await;
                return;
            }

            self.broadcast(
                ServerEvent::TurnChanged {
                    user_id: next_id.clone(),
                    round_number: self.game.round_number,
                },
                None,
            );

            // A forfeited seat burns its turn immediately
            let forfeited = self
                .room
                .seat(&next_id)
                .is_some_and(|s| s.has_forfeited);
            if forfeited {
                self.skip_turn_for(&next_id, TurnSkipReason::Disconnect).await;
                continue;
            }

            if let Some(seat) = self.room.seat_mut(&next_id) {
                seat.reset_turn_state();
            }
            self.arm_turn_clock(now);
            self.persist_room().await;
            self.persist_game().await;
            self.emit_turn_started(&next_id);
            self.begin_ai_turn_if_needed(&next_id).await;
            self.reschedule_alarm().await;
            return;
        }
    }

    /// Zero the first unscored category for a skipped turn. Does not
    /// advance; callers decide what happens next.
    async fn skip_turn_for(&mut self, user_id: &UserId, reason: TurnSkipReason) {
        let Some(seat) = self.room.seat_mut(user_id) else {
            return;
        };
        let Some(category) = seat.scorecard.first_unscored() else {
            return;
        };
        if seat.scorecard.apply_zero(category).is_ok() {
            seat.total_score = seat.scorecard.total();
            seat.reset_turn_state();
        }
        self.persist_room().await;
        self.broadcast(
            ServerEvent::TurnSkipped {
                user_id: user_id.clone(),
                reason,
                category_scored: category.wire_name().to_string(),
                score: 0,
            },
            None,
        );
    }

    /// Public entry for alarm handlers: skip the current player's turn and
    /// move on.
    pub(super) async fn skip_current_turn(&mut self, user_id: &UserId, reason: TurnSkipReason) {
        self.skip_turn_for(user_id, reason).await;
        self.advance_after_turn().await;
    }

    pub(super) async fn handle_rematch(&mut self, conn_id: Uuid) {
        let Some(user_id) = self.require_seat(conn_id, CallerKind::Host) else {
            return;
        };
        if let Err(rejection) =
            self.validate(&user_id, |view| validator::validate_rematch(&self.game, view))
        {
            self.reject(conn_id, &rejection);
            return;
        }

        for seat in &mut self.room.seats {
            seat.scorecard = Default::default();
            seat.total_score = 0;
            seat.has_forfeited = false;
            seat.reset_turn_state();
        }
        self.game.reset_for_rematch();
        self.room.phase = RoomPhase::Waiting;
        self.room.started_at = None;

        self.persist_room().await;
        self.persist_game().await;

        self.broadcast(
            ServerEvent::RematchStarted {
                players: self.room.player_snapshots(),
            },
            None,
        );
        tracing::info!(room = %self.code, "Rematch, room back to waiting");
        self.publish_status(RoomUpdateAction::Updated).await;
        self.reschedule_alarm().await;
    }

    pub(super) async fn handle_add_ai_player(&mut self, conn_id: Uuid, profile_id: &str) {
        let Some(user_id) = self.require_seat(conn_id, CallerKind::Host) else {
            return;
        };
        if let Err(rejection) =
            self.validate(&user_id, |view| validator::validate_add_ai(&self.game, view))
        {
            self.reject(conn_id, &rejection);
            return;
        }
        if !self.room.has_free_seat() {
            self.send_error(conn_id, ErrorCode::RoomFull);
            return;
        }
        let Some(profile) = find_profile(profile_id) else {
            self.send_error(conn_id, ErrorCode::InvalidMessage);
            return;
        };
        let ai_user_id = format!("ai-{}", profile.id);
        if self.room.seat(&ai_user_id).is_some() {
            self.send_error(conn_id, ErrorCode::InvalidMessage);
            return;
        }

        let seat = Seat::ai(&profile, self.room.seats.len());
        let snapshot = seat.snapshot();
        self.room.seats.push(seat);
        self.persist_room().await;
        self.broadcast(ServerEvent::AiPlayerJoined { player: snapshot }, None);
        tracing::info!(room = %self.code, profile = %profile.id, "AI player seated");
        self.publish_status(RoomUpdateAction::Updated).await;
    }

    /// Finish the game: rankings, phase change, cleanup scheduling.
    pub(super) async fn complete_game(&mut self, now: chrono::DateTime<Utc>) {
        let rankings = self.room.rankings();
        self.game.complete(rankings.clone(), now);
        self.room.phase = RoomPhase::Completed;
        self.ai_wake_at = None;
        if let Err(e) = self.store.delete(keys::AI_TURN_DATA).await {
            tracing::warn!(room = %self.code, error = %e, "Failed to clear AI turn data");
        }

        self.persist_room().await;
        self.persist_game().await;

        self.broadcast(
            ServerEvent::GameOver {
                rankings,
                game: self.game.clone(),
            },
            None,
        );
        tracing::info!(room = %self.code, "Game over");
        self.publish_status(RoomUpdateAction::Updated).await;
        self.reschedule_alarm().await;
    }

    /// Start the human turn clock, or leave it frozen for a disconnected
    /// current player.
    pub(super) fn arm_turn_clock(&mut self, now: chrono::DateTime<Utc>) {
        let Some(current) = self.game.current_player_id().cloned() else {
            return;
        };
        let Some(seat) = self.room.seat(&current) else {
            return;
        };
        if seat.seat_type == SeatType::Ai {
            self.game.turn_deadline = None;
            return;
        }
        if seat.is_connected {
            let timeout = i64::from(self.room.settings.turn_timeout_secs);
            self.game.turn_deadline = Some(now + Duration::seconds(timeout));
            self.game.afk_warning_sent = false;
        } else {
            // Clock starts frozen at the full allowance until they return
            self.game.turn_deadline = None;
            self.game.turn_clock_remaining_secs = Some(self.room.settings.turn_timeout_secs);
        }
    }

    pub(super) fn emit_turn_started(&mut self, user_id: &UserId) {
        let rolls = self
            .room
            .seat(user_id)
            .map_or(crate::game::MAX_ROLLS_PER_TURN, |s| s.rolls_remaining);
        let timeout = self
            .game
            .turn_deadline
            .map(|_| self.room.settings.turn_timeout_secs);
        self.broadcast(
            ServerEvent::TurnStarted {
                user_id: user_id.clone(),
                turn_number: self.game.turn_number,
                round_number: self.game.round_number,
                rolls_remaining: rolls,
                timeout_secs: timeout,
            },
            None,
        );
    }

    /// If the new current player is an AI, persist the step marker and let
    /// the alarm scheduler pick it up.
    pub(super) async fn begin_ai_turn_if_needed(&mut self, user_id: &UserId) {
        let Some(seat) = self.room.seat(user_id) else {
            return;
        };
        if seat.seat_type != SeatType::Ai {
            return;
        }
        let Some(profile) = seat.ai_profile_id.as_deref().and_then(find_profile) else {
            tracing::error!(room = %self.code, %user_id, "AI seat without a known profile");
            return;
        };

        let now = Utc::now();
        let ctx = self.build_ai_context(user_id);
        // The opening roll is automatic; no hesitation applies
        let delay = crate::ai::step_delay(&profile, AiStepKind::Roll, &ctx, 0.0, &mut self.rng);
        let wake_at = now + Duration::milliseconds(i64::try_from(delay.as_millis()).unwrap_or(1500));

        let turn_state = AiTurnState {
            player_id: user_id.clone(),
            step: AiStepKind::Roll,
            scheduled_at: wake_at,
        };
        if let Err(e) = self.store.save(keys::AI_TURN_DATA, &turn_state).await {
            tracing::error!(room = %self.code, error = %e, "Failed to persist AI turn state");
        }
        self.ai_wake_at = Some(wake_at);

        self.broadcast(
            ServerEvent::AiThinking {
                user_id: user_id.clone(),
            },
            None,
        );
    }

    /// Post a quick-chat line as the AI, honoring its chat frequency and
    /// the shared rate limits.
    async fn maybe_ai_chat(&mut self, user_id: &UserId, profile_id: &str, key: &str) {
        let Some(profile) = find_profile(profile_id) else {
            return;
        };
        if profile.traits.chat_frequency <= 0.0 {
            return;
        }
        if !rand::Rng::gen_bool(&mut self.rng, profile.traits.chat_frequency.clamp(0.0, 1.0)) {
            return;
        }
        let now = Utc::now();
        match self
            .chat
            .handle_quick(user_id, &profile.display_name, key, now)
        {
            Ok(message) => {
                self.persist_chat().await;
                self.broadcast(ServerEvent::ChatMessage { message }, None);
            }
            Err(_) => {
                // Rate limited chatter stays quiet
            }
        }
    }
}
