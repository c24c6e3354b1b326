use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Account role. Businesses place orders, influencers fulfil them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Business,
    Influencer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Business => "business",
            Role::Influencer => "influencer",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "business" => Ok(Role::Business),
            "influencer" => Ok(Role::Influencer),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub fullname: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub category: Option<String>,
    pub profile_pic: Option<String>,
    /// Per-service price list, e.g. {"Reels/Shorts": 499}.
    pub prices: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A chat message as it travels over the wire and comes back from history
/// queries. `temp_id` is a client-side correlation token: set on gateway
/// deliveries that answer a send, absent on history rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub from: i64,
    pub to: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Order lifecycle. Transitions only move forward: Pending -> Completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Completed => "Completed",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(OrderStatus::Pending),
            "Completed" => Ok(OrderStatus::Completed),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// One entry of the service-selection list attached to an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSelection {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub influencer_id: i64,
    pub influencer_name: String,
    pub order_type: String,
    pub services: Vec<ServiceSelection>,
    pub total_price: f64,
    pub description: Option<String>,
    pub affiliated_links: Vec<String>,
    pub coupon_code: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<NaiveTime>,
    pub file_url: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
