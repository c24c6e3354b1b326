use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use konnect_types::models::{Message, Order, OrderStatus, Role, ServiceSelection, User};
use tracing::warn;

/// Parse a timestamp as SQLite stores it. `datetime('now')` produces
/// "YYYY-MM-DD HH:MM:SS" in UTC without a timezone marker; values written
/// by the application are RFC 3339.
pub fn parse_ts(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub fullname: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
    pub role: String,
    pub category: Option<String>,
    pub profile_pic: Option<String>,
    pub prices: Option<String>,
    pub created_at: String,
}

impl UserRow {
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            fullname: self.fullname,
            email: self.email,
            phone: self.phone,
            role: self.role.parse().unwrap_or(Role::Business),
            category: self.category,
            profile_pic: self.profile_pic,
            prices: self.prices.and_then(|p| serde_json::from_str(&p).ok()),
            created_at: parse_ts(&self.created_at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
    pub timestamp: String,
}

impl MessageRow {
    pub fn into_message(self) -> Message {
        Message {
            id: self.id,
            from: self.sender_id,
            to: self.receiver_id,
            text: self.content,
            temp_id: None,
            timestamp: parse_ts(&self.timestamp),
        }
    }
}

/// One conversation partner plus the last message exchanged with them.
#[derive(Debug, Clone)]
pub struct ChatPartnerRow {
    pub other_user_id: i64,
    pub other_user_name: String,
    pub last_message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct OrderRow {
    pub id: i64,
    pub user_id: i64,
    pub influencer_id: i64,
    pub influencer_name: String,
    pub order_type: String,
    pub services: String,
    pub total_price: f64,
    pub description: Option<String>,
    pub affiliated_links: String,
    pub coupon_code: Option<String>,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    pub file_url: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl OrderRow {
    pub fn into_order(self) -> Order {
        let services: Vec<ServiceSelection> =
            serde_json::from_str(&self.services).unwrap_or_else(|e| {
                warn!("Corrupt services on order {}: {}", self.id, e);
                vec![]
            });
        let affiliated_links: Vec<String> =
            serde_json::from_str(&self.affiliated_links).unwrap_or_default();

        Order {
            id: self.id,
            user_id: self.user_id,
            influencer_id: self.influencer_id,
            influencer_name: self.influencer_name,
            order_type: self.order_type,
            services,
            total_price: self.total_price,
            description: self.description,
            affiliated_links,
            coupon_code: self.coupon_code,
            scheduled_date: self
                .scheduled_date
                .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            scheduled_time: self
                .scheduled_time
                .and_then(|t| NaiveTime::parse_from_str(&t, "%H:%M:%S").ok()),
            file_url: self.file_url,
            status: self.status.parse().unwrap_or(OrderStatus::Pending),
            created_at: parse_ts(&self.created_at),
            updated_at: parse_ts(&self.updated_at),
        }
    }
}

/// Parameter bundle for the order-placement insert.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i64,
    pub influencer_id: i64,
    pub influencer_name: String,
    pub order_type: String,
    /// JSON array of service selections
    pub services: String,
    pub total_price: f64,
    pub description: Option<String>,
    /// JSON array of links
    pub affiliated_links: String,
    pub coupon_code: Option<String>,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    pub file_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OtpRow {
    pub id: i64,
    pub email: String,
    pub otp: String,
    pub verified: bool,
    pub created_at: String,
    pub expires_at: String,
}

impl OtpRow {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > parse_ts(&self.expires_at)
    }
}

#[derive(Debug, Clone)]
pub struct PromotionRow {
    pub id: i64,
    pub user_id: i64,
    pub campaign_id: String,
    pub unique_url: String,
    pub status: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct AuthSessionRow {
    pub state: String,
    pub code_verifier: String,
    pub expires: String,
}

impl AuthSessionRow {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > parse_ts(&self.expires)
    }
}

#[derive(Debug, Clone)]
pub struct ProviderAccountRow {
    pub user_id: i64,
    pub provider: String,
    pub provider_user_id: Option<String>,
    pub profile: Option<String>,
    pub posts: Option<String>,
    pub updated_at: String,
}
