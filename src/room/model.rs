use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::{Dice, KeepMask, Scorecard, MAX_ROLLS_PER_TURN};
use crate::protocol::types::Ranking;
use crate::protocol::{
    PlayerRole, PlayerSnapshot, RoomPhase, RoomSettings, RoomSummary, SeatType, SpectatorSnapshot,
    UserId,
};

/// One seat in a room. A seat persists across disconnects until the
/// reconnect deadline elapses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_seed: String,
    pub seat_type: SeatType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_profile_id: Option<String>,
    pub is_host: bool,
    pub is_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disconnected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_forfeited: bool,
    pub turn_order: usize,
    pub scorecard: Scorecard,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_dice: Option<Dice>,
    pub kept_mask: KeepMask,
    pub rolls_remaining: u8,
    pub total_score: u32,
}

impl Seat {
    pub fn human(
        user_id: UserId,
        display_name: String,
        avatar_seed: String,
        is_host: bool,
        turn_order: usize,
    ) -> Self {
        Self {
            user_id,
            display_name,
            avatar_seed,
            seat_type: SeatType::Human,
            ai_profile_id: None,
            is_host,
            is_connected: true,
            disconnected_at: None,
            reconnect_deadline: None,
            has_forfeited: false,
            turn_order,
            scorecard: Scorecard::default(),
            current_dice: None,
            kept_mask: [false; 5],
            rolls_remaining: MAX_ROLLS_PER_TURN,
            total_score: 0,
        }
    }

    pub fn ai(profile: &crate::ai::AiProfile, turn_order: usize) -> Self {
        Self {
            user_id: format!("ai-{}", profile.id),
            display_name: profile.display_name.clone(),
            avatar_seed: profile.avatar_seed.clone(),
            seat_type: SeatType::Ai,
            ai_profile_id: Some(profile.id.clone()),
            is_host: false,
            is_connected: true,
            disconnected_at: None,
            reconnect_deadline: None,
            has_forfeited: false,
            turn_order,
            scorecard: Scorecard::default(),
            current_dice: None,
            kept_mask: [false; 5],
            rolls_remaining: MAX_ROLLS_PER_TURN,
            total_score: 0,
        }
    }

    /// Clear the per-turn dice state, restoring the roll allowance.
    pub fn reset_turn_state(&mut self) {
        self.current_dice = None;
        self.kept_mask = [false; 5];
        self.rolls_remaining = MAX_ROLLS_PER_TURN;
    }

    pub fn mark_disconnected(&mut self, now: DateTime<Utc>, deadline: DateTime<Utc>) {
        self.is_connected = false;
        self.disconnected_at = Some(now);
        self.reconnect_deadline = Some(deadline);
    }

    pub fn mark_reconnected(&mut self) {
        self.is_connected = true;
        self.disconnected_at = None;
        self.reconnect_deadline = None;
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            avatar_seed: self.avatar_seed.clone(),
            seat_type: self.seat_type,
            ai_profile_id: self.ai_profile_id.clone(),
            is_host: self.is_host,
            is_connected: self.is_connected,
            turn_order: self.turn_order,
            scorecard: self.scorecard.clone(),
            current_dice: self.current_dice,
            kept_mask: self.kept_mask,
            rolls_remaining: self.rolls_remaining,
            total_score: self.total_score,
        }
    }
}

/// Room metadata and seats, persisted under the `room` key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    pub code: String,
    pub phase: RoomPhase,
    pub settings: RoomSettings,
    pub host_id: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub seats: Vec<Seat>,
    #[serde(default)]
    pub spectators: Vec<SpectatorSnapshot>,
}

impl RoomRecord {
    pub fn new(code: String, host_id: UserId, settings: RoomSettings, now: DateTime<Utc>) -> Self {
        Self {
            code,
            phase: RoomPhase::Waiting,
            settings,
            host_id,
            created_at: now,
            started_at: None,
            seats: Vec::new(),
            spectators: Vec::new(),
        }
    }

    pub fn seat(&self, user_id: &UserId) -> Option<&Seat> {
        self.seats.iter().find(|s| &s.user_id == user_id)
    }

    pub fn seat_mut(&mut self, user_id: &UserId) -> Option<&mut Seat> {
        self.seats.iter_mut().find(|s| &s.user_id == user_id)
    }

    pub fn remove_seat(&mut self, user_id: &UserId) -> Option<Seat> {
        let idx = self.seats.iter().position(|s| &s.user_id == user_id)?;
        Some(self.seats.remove(idx))
    }

    pub fn has_free_seat(&self) -> bool {
        self.seats.len() < usize::from(self.settings.max_seats)
    }

    pub fn human_seats(&self) -> impl Iterator<Item = &Seat> {
        self.seats.iter().filter(|s| s.seat_type == SeatType::Human)
    }

    pub fn player_snapshots(&self) -> Vec<PlayerSnapshot> {
        self.seats.iter().map(Seat::snapshot).collect()
    }

    pub fn host_name(&self) -> String {
        self.seat(&self.host_id)
            .map(|s| s.display_name.clone())
            .unwrap_or_default()
    }

    /// Final standings: total descending, ties sharing a position.
    pub fn rankings(&self) -> Vec<Ranking> {
        let mut totals: Vec<(&Seat, u32)> = self
            .seats
            .iter()
            .map(|s| (s, s.scorecard.total()))
            .collect();
        totals.sort_by(|a, b| b.1.cmp(&a.1));

        let mut rankings = Vec::with_capacity(totals.len());
        let mut position = 0;
        let mut previous_total = None;
        for (i, (seat, total)) in totals.iter().enumerate() {
            if previous_total != Some(*total) {
                position = i + 1;
                previous_total = Some(*total);
            }
            rankings.push(Ranking {
                user_id: seat.user_id.clone(),
                display_name: seat.display_name.clone(),
                total_score: *total,
                position,
            });
        }
        rankings
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            code: self.code.clone(),
            host_name: self.host_name(),
            player_count: self.seats.len(),
            max_players: self.settings.max_seats,
            phase: self.phase,
            is_public: self.settings.is_public,
            created_at: self.created_at,
        }
    }
}

/// The small serializable context attached to each connection. Survives
/// hibernation and is the sole source of connection identity after resume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionAttachment {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_seed: String,
    pub role: PlayerRole,
    pub connected_at: DateTime<Utc>,
    pub is_host: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{decode_attachment, encode_attachment};

    fn record() -> RoomRecord {
        let now = Utc::now();
        let mut room = RoomRecord::new(
            "ABCDEF".to_string(),
            "host".to_string(),
            RoomSettings::default(),
            now,
        );
        room.seats.push(Seat::human(
            "host".to_string(),
            "Hana".to_string(),
            "seed-h".to_string(),
            true,
            0,
        ));
        room.seats.push(Seat::human(
            "guest".to_string(),
            "Gil".to_string(),
            "seed-g".to_string(),
            false,
            1,
        ));
        room
    }

    #[test]
    fn test_seat_lookup_and_capacity() {
        let room = record();
        assert!(room.seat(&"host".to_string()).is_some());
        assert!(room.seat(&"nobody".to_string()).is_none());
        assert!(room.has_free_seat());
    }

    #[test]
    fn test_rankings_with_ties() {
        let mut room = record();
        room.seats.push(Seat::human(
            "third".to_string(),
            "Tia".to_string(),
            "seed-t".to_string(),
            false,
            2,
        ));
        room.seat_mut(&"host".to_string())
            .unwrap()
            .scorecard
            .apply_zero(crate::game::Category::Ones)
            .unwrap();
        room.seat_mut(&"guest".to_string())
            .unwrap()
            .scorecard
            .apply(crate::game::Category::Chance, Dice([6, 6, 6, 6, 6]))
            .unwrap();
        room.seat_mut(&"third".to_string())
            .unwrap()
            .scorecard
            .apply(crate::game::Category::Chance, Dice([6, 6, 6, 6, 6]))
            .unwrap();

        let rankings = room.rankings();
        assert_eq!(rankings[0].position, 1);
        assert_eq!(rankings[1].position, 1);
        assert_eq!(rankings[2].position, 3);
        assert_eq!(rankings[2].user_id, "host");
    }

    #[test]
    fn test_disconnect_reconnect_bookkeeping() {
        let mut room = record();
        let now = Utc::now();
        let deadline = now + chrono::Duration::seconds(300);
        let seat = room.seat_mut(&"guest".to_string()).unwrap();
        seat.mark_disconnected(now, deadline);
        assert!(!seat.is_connected);
        assert_eq!(seat.reconnect_deadline, Some(deadline));

        seat.mark_reconnected();
        assert!(seat.is_connected);
        assert_eq!(seat.reconnect_deadline, None);
        assert_eq!(seat.disconnected_at, None);
    }

    #[test]
    fn test_attachment_fits_bound() {
        let attachment = ConnectionAttachment {
            user_id: "user-123".to_string(),
            display_name: "A fairly long display name".to_string(),
            avatar_seed: "avatar-seed-value".to_string(),
            role: PlayerRole::Player,
            connected_at: Utc::now(),
            is_host: true,
        };
        let bytes = encode_attachment(&attachment).unwrap();
        let back: ConnectionAttachment = decode_attachment(&bytes).unwrap();
        assert_eq!(back, attachment);
    }

    #[test]
    fn test_record_round_trip() {
        let room = record();
        let json = serde_json::to_value(&room).unwrap();
        let back: RoomRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, room);
    }
}
