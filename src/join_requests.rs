//! Join-request lifecycle.
//!
//! Requests are created through the lobby, resolved by the target room's
//! host, and expire after a fixed TTL. Non-pending states are terminal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::{ErrorCode, UserId};

/// Time a pending request stays valid.
pub const JOIN_REQUEST_TTL_SECS: i64 = 120;
/// Cap on simultaneously pending requests per room.
pub const MAX_PENDING_REQUESTS_PER_ROOM: usize = 8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JoinRequestStatus {
    Pending,
    Approved,
    Declined,
    Expired,
    Cancelled,
}

impl JoinRequestStatus {
    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }
}

/// One join request, persisted with the room under `join_requests`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub id: Uuid,
    pub room_code: String,
    pub requester_id: UserId,
    pub requester_name: String,
    pub requester_avatar_seed: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: JoinRequestStatus,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JoinRequestError {
    #[error("join request has expired")]
    RequestExpired,
    #[error("join request is already resolved")]
    InvalidStatusTransition,
    #[error("only the requester can cancel")]
    NotRequester,
    #[error("join request not found")]
    RequestNotFound,
    #[error("a pending request for this room already exists")]
    DuplicateRequest,
    #[error("too many pending requests for this room")]
    MaxRequestsExceeded,
}

impl JoinRequestError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::RequestExpired => ErrorCode::RequestExpired,
            Self::InvalidStatusTransition => ErrorCode::InvalidStatusTransition,
            Self::NotRequester => ErrorCode::NotRequester,
            Self::RequestNotFound => ErrorCode::RequestNotFound,
            Self::DuplicateRequest => ErrorCode::DuplicateRequest,
            Self::MaxRequestsExceeded => ErrorCode::MaxRequestsExceeded,
        }
    }
}

/// Per-room request table. Owned by the room actor; the lobby only holds
/// request ids for routing.
#[derive(Debug, Default)]
pub struct JoinRequestManager {
    requests: HashMap<Uuid, JoinRequest>,
}

impl JoinRequestManager {
    pub fn restore(requests: HashMap<Uuid, JoinRequest>) -> Self {
        Self { requests }
    }

    pub fn snapshot(&self) -> &HashMap<Uuid, JoinRequest> {
        &self.requests
    }

    pub fn get(&self, id: Uuid) -> Option<&JoinRequest> {
        self.requests.get(&id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &JoinRequest> {
        self.requests
            .values()
            .filter(|r| r.status == JoinRequestStatus::Pending)
    }

    /// Create a pending request; at most one pending per requester and a
    /// bounded number per room.
    pub fn create(
        &mut self,
        room_code: &str,
        requester_id: &UserId,
        requester_name: &str,
        requester_avatar_seed: &str,
        now: DateTime<Utc>,
    ) -> Result<JoinRequest, JoinRequestError> {
        if self
            .pending()
            .any(|r| &r.requester_id == requester_id && r.expires_at > now)
        {
            return Err(JoinRequestError::DuplicateRequest);
        }
        if self.pending().filter(|r| r.expires_at > now).count() >= MAX_PENDING_REQUESTS_PER_ROOM {
            return Err(JoinRequestError::MaxRequestsExceeded);
        }

        let request = JoinRequest {
            id: Uuid::new_v4(),
            room_code: room_code.to_string(),
            requester_id: requester_id.clone(),
            requester_name: requester_name.to_string(),
            requester_avatar_seed: requester_avatar_seed.to_string(),
            created_at: now,
            expires_at: now + Duration::seconds(JOIN_REQUEST_TTL_SECS),
            status: JoinRequestStatus::Pending,
        };
        self.requests.insert(request.id, request.clone());
        Ok(request)
    }

    pub fn approve(&mut self, id: Uuid, now: DateTime<Utc>) -> Result<JoinRequest, JoinRequestError> {
        self.transition(id, JoinRequestStatus::Approved, None, now)
    }

    pub fn decline(&mut self, id: Uuid, now: DateTime<Utc>) -> Result<JoinRequest, JoinRequestError> {
        self.transition(id, JoinRequestStatus::Declined, None, now)
    }

    /// Cancel; only the requester may do this.
    pub fn cancel(
        &mut self,
        id: Uuid,
        caller: &UserId,
        now: DateTime<Utc>,
    ) -> Result<JoinRequest, JoinRequestError> {
        self.transition(id, JoinRequestStatus::Cancelled, Some(caller), now)
    }

    /// Move stale pending requests to `expired`, returning them for event
    /// emission. Terminal requests older than the TTL are dropped from the
    /// table entirely.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<JoinRequest> {
        let mut expired = Vec::new();
        for request in self.requests.values_mut() {
            if request.status == JoinRequestStatus::Pending && now >= request.expires_at {
                request.status = JoinRequestStatus::Expired;
                expired.push(request.clone());
            }
        }
        let ttl = Duration::seconds(JOIN_REQUEST_TTL_SECS);
        self.requests
            .retain(|_, r| !r.status.is_terminal() || now - r.expires_at < ttl);
        expired
    }

    fn transition(
        &mut self,
        id: Uuid,
        to: JoinRequestStatus,
        required_caller: Option<&UserId>,
        now: DateTime<Utc>,
    ) -> Result<JoinRequest, JoinRequestError> {
        let request = self
            .requests
            .get_mut(&id)
            .ok_or(JoinRequestError::RequestNotFound)?;
        if let Some(caller) = required_caller {
            if &request.requester_id != caller {
                return Err(JoinRequestError::NotRequester);
            }
        }
        if request.status.is_terminal() {
            return Err(JoinRequestError::InvalidStatusTransition);
        }
        if now >= request.expires_at {
            // The request is stale; the sweep will mark it expired
            return Err(JoinRequestError::RequestExpired);
        }
        request.status = to;
        Ok(request.clone())
    }
}
