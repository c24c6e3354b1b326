use serde::{Deserialize, Serialize};

use crate::models::{Message, Order, Role, User};

// -- JWT Claims --

/// JWT claims shared between the REST middleware and the WebSocket gateway
/// handshake. Canonical definition lives here in konnect-types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub fullname: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub message: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email or phone number
    pub user_input: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub user: User,
}

// -- OTP / password reset --

#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub success: bool,
    pub message: String,
}

// -- Chat --

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: i64,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatHistoryResponse {
    pub messages: Vec<Message>,
}

/// One conversation partner with the most recent message exchanged.
#[derive(Debug, Serialize)]
pub struct ChatSummary {
    pub other_user_id: i64,
    pub other_user_name: String,
    pub last_message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct ChatListResponse {
    pub chats: Vec<ChatSummary>,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub fullname: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserSummary>,
}

// -- Orders --

#[derive(Debug, Serialize)]
pub struct PlaceOrderResponse {
    pub message: String,
    pub order: Order,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<Order>,
}

// -- Payments --

#[derive(Debug, Deserialize)]
pub struct CreatePaymentOrderRequest {
    /// Amount in minor currency units (paise)
    pub amount: i64,
    pub currency: String,
    pub order_id: i64,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentOrderResponse {
    pub razorpay_order_id: String,
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_payment_id: String,
    pub razorpay_order_id: String,
    pub razorpay_signature: String,
    pub order_id: i64,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub message: String,
    pub order: Order,
}

// -- Promotions --

#[derive(Debug, Deserialize)]
pub struct GenerateUrlRequest {
    pub campaign_id: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateUrlResponse {
    pub message: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct PromotionSummary {
    pub id: i64,
    pub campaign_id: String,
    pub unique_url: String,
    pub status: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub unique_clicks: i64,
}

// -- Newsletter / service requests --

#[derive(Debug, Deserialize)]
pub struct NewsletterRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ServiceRequestPayload {
    pub name: String,
    pub email: String,
    pub message: String,
}

// -- Influencer directory --

#[derive(Debug, Serialize)]
pub struct InfluencerProfile {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub category: String,
    pub profile_pic: Option<String>,
    pub prices: Option<serde_json::Value>,
    /// Latest provider snapshots keyed by provider name
    pub providers: serde_json::Value,
}

// -- Wishlist --

#[derive(Debug, Serialize)]
pub struct WishlistToggleResponse {
    pub wishlisted: bool,
}

#[derive(Debug, Serialize)]
pub struct WishlistResponse {
    pub wishlist: Vec<i64>,
}
