use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle of an audit purchase.
///
/// The delivery track runs `pending → payment_received → planning →
/// in_progress → review → completed`, one step at a time. The single side
/// branch is `pending → payment_failed`. Payment outcomes only ever
/// originate from `pending`; the webhook processor owns those two
/// transitions and staff advance the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Pending,
    PaymentReceived,
    PaymentFailed,
    Planning,
    InProgress,
    Review,
    Completed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pending => "pending",
            AuditStatus::PaymentReceived => "payment_received",
            AuditStatus::PaymentFailed => "payment_failed",
            AuditStatus::Planning => "planning",
            AuditStatus::InProgress => "in_progress",
            AuditStatus::Review => "review",
            AuditStatus::Completed => "completed",
        }
    }

    /// Position on the delivery track. The failure branch is off-track.
    pub(crate) fn track_position(self) -> Option<u8> {
        match self {
            AuditStatus::Pending => Some(0),
            AuditStatus::PaymentReceived => Some(1),
            AuditStatus::Planning => Some(2),
            AuditStatus::InProgress => Some(3),
            AuditStatus::Review => Some(4),
            AuditStatus::Completed => Some(5),
            AuditStatus::PaymentFailed => None,
        }
    }

    /// Whether `next` is a legal single forward step from `self`.
    pub fn can_transition_to(self, next: AuditStatus) -> bool {
        match (self, next) {
            (AuditStatus::Pending, AuditStatus::PaymentFailed) => true,
            (from, to) => match (from.track_position(), to.track_position()) {
                (Some(a), Some(b)) => b == a + 1,
                _ => false,
            },
        }
    }

    /// Statuses the webhook processor is allowed to write.
    pub fn is_payment_outcome(self) -> bool {
        matches!(
            self,
            AuditStatus::PaymentReceived | AuditStatus::PaymentFailed
        )
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AuditStatus::Pending),
            "payment_received" => Ok(AuditStatus::PaymentReceived),
            "payment_failed" => Ok(AuditStatus::PaymentFailed),
            "planning" => Ok(AuditStatus::Planning),
            "in_progress" => Ok(AuditStatus::InProgress),
            "review" => Ok(AuditStatus::Review),
            "completed" => Ok(AuditStatus::Completed),
            _ => Err(format!("unknown audit status: {}", s)),
        }
    }
}

/// Social media handles supplied with an audit request.
/// Stored as a JSON text column; all fields optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialHandles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiktok: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube: Option<String>,
}

/// One audit purchase, from checkout initiation through delivery.
///
/// `id` is generated before the checkout session exists and is the
/// correlation key embedded in the session's metadata. `email`,
/// `company_name` and `social_handles` are immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRequest {
    pub id: String,
    pub email: String,
    pub company_name: String,
    pub social_handles: SocialHandles,
    pub status: AuditStatus,
    /// Payment reference reported by the gateway on a successful charge.
    /// Set once by the webhook processor, never overwritten.
    pub stripe_payment_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateAuditRequest {
    pub email: String,
    pub company_name: String,
    #[serde(default)]
    pub social_handles: SocialHandles,
}
