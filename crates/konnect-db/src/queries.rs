use crate::Database;
use crate::models::{
    AuthSessionRow, ChatPartnerRow, MessageRow, NewOrder, OrderRow, OtpRow, PromotionRow,
    ProviderAccountRow, UserRow,
};
use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, params};

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        fullname: &str,
        email: &str,
        phone: Option<&str>,
        password_hash: &str,
        role: &str,
    ) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            let row = conn.query_row(
                "INSERT INTO users (fullname, email, phone, password, role)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 RETURNING id, fullname, email, phone, password, role,
                           category, profile_pic, prices, created_at",
                params![fullname, email, phone, password_hash, role],
                map_user_row,
            )?;
            Ok(row)
        })
    }

    /// Login lookup: the identifier may be an email address or a phone number.
    pub fn find_user_by_login(&self, identifier: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, fullname, email, phone, password, role,
                        category, profile_pic, prices, created_at
                 FROM users WHERE email = ?1 OR phone = ?1",
                [identifier],
                map_user_row,
            )
            .optional()
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, fullname, email, phone, password, role,
                        category, profile_pic, prices, created_at
                 FROM users WHERE id = ?1",
                [id],
                map_user_row,
            )
            .optional()
        })
    }

    pub fn user_exists(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT id FROM users WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Returns the number of rows updated (0 when the email is unknown).
    pub fn update_password(&self, email: &str, password_hash: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET password = ?1 WHERE email = ?2",
                params![password_hash, email],
            )?;
            Ok(n)
        })
    }

    pub fn list_users_except(&self, id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, fullname, email, phone, password, role,
                        category, profile_pic, prices, created_at
                 FROM users WHERE id != ?1 ORDER BY fullname",
            )?;
            let rows = stmt
                .query_map([id], map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_influencers(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, fullname, email, phone, password, role,
                        category, profile_pic, prices, created_at
                 FROM users WHERE role = 'influencer' ORDER BY fullname",
            )?;
            let rows = stmt
                .query_map([], map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Provider snapshots --

    /// Insert or refresh the snapshot for (user, provider). The UNIQUE pair
    /// makes this safe under concurrent callbacks for the same identity.
    pub fn upsert_provider_account(
        &self,
        user_id: i64,
        provider: &str,
        provider_user_id: Option<&str>,
        profile: Option<&str>,
        posts: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO provider_accounts (user_id, provider, provider_user_id, profile, posts, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (user_id, provider) DO UPDATE SET
                     provider_user_id = excluded.provider_user_id,
                     profile = excluded.profile,
                     posts = excluded.posts,
                     updated_at = excluded.updated_at",
                params![
                    user_id,
                    provider,
                    provider_user_id,
                    profile,
                    posts,
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(())
        })
    }

    pub fn provider_accounts_for(&self, user_id: i64) -> Result<Vec<ProviderAccountRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, provider, provider_user_id, profile, posts, updated_at
                 FROM provider_accounts WHERE user_id = ?1",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ProviderAccountRow {
                        user_id: row.get(0)?,
                        provider: row.get(1)?,
                        provider_user_id: row.get(2)?,
                        profile: row.get(3)?,
                        posts: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Wishlist --

    /// Toggle: removes the entry if present, inserts it if not.
    /// Returns true when the target is now wishlisted.
    pub fn toggle_wishlist(&self, user_id: i64, target_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM wishlist WHERE user_id = ?1 AND target_id = ?2",
                params![user_id, target_id],
            )?;
            if removed > 0 {
                return Ok(false);
            }
            conn.execute(
                "INSERT OR IGNORE INTO wishlist (user_id, target_id) VALUES (?1, ?2)",
                params![user_id, target_id],
            )?;
            Ok(true)
        })
    }

    pub fn wishlist_of(&self, user_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT target_id FROM wishlist WHERE user_id = ?1 ORDER BY target_id",
            )?;
            let rows = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Insert a message and return the generated id and server timestamp.
    pub fn insert_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        content: &str,
    ) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let row = conn.query_row(
                "INSERT INTO messages (sender_id, receiver_id, content)
                 VALUES (?1, ?2, ?3)
                 RETURNING id, sender_id, receiver_id, content, timestamp",
                params![sender_id, receiver_id, content],
                map_message_row,
            )?;
            Ok(row)
        })
    }

    /// All messages between two users, timestamp ascending (id as tiebreak).
    /// With `limit`, returns the most recent `limit` rows older than
    /// `before_id` (cursor pagination), still in ascending order.
    pub fn chat_between(
        &self,
        a: i64,
        b: i64,
        before_id: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            if before_id.is_none() && limit.is_none() {
                let mut stmt = conn.prepare(
                    "SELECT id, sender_id, receiver_id, content, timestamp
                     FROM messages
                     WHERE (sender_id = ?1 AND receiver_id = ?2)
                        OR (sender_id = ?2 AND receiver_id = ?1)
                     ORDER BY timestamp ASC, id ASC",
                )?;
                let rows = stmt
                    .query_map(params![a, b], map_message_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                return Ok(rows);
            }

            let before = before_id.unwrap_or(i64::MAX);
            let limit = limit.unwrap_or(50);
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, content, timestamp
                 FROM messages
                 WHERE ((sender_id = ?1 AND receiver_id = ?2)
                     OR (sender_id = ?2 AND receiver_id = ?1))
                   AND id < ?3
                 ORDER BY id DESC
                 LIMIT ?4",
            )?;
            let mut rows = stmt
                .query_map(params![a, b, before, limit], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }

    /// One row per conversation partner, carrying the last message
    /// exchanged, most recent conversation first.
    pub fn chat_partners(&self, user_id: i64) -> Result<Vec<ChatPartnerRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT last.other, u.fullname, m.content, m.timestamp
                 FROM (
                     SELECT CASE WHEN sender_id = ?1 THEN receiver_id ELSE sender_id END AS other,
                            MAX(id) AS max_id
                     FROM messages
                     WHERE sender_id = ?1 OR receiver_id = ?1
                     GROUP BY other
                 ) last
                 JOIN messages m ON m.id = last.max_id
                 JOIN users u ON u.id = last.other
                 ORDER BY m.id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ChatPartnerRow {
                        other_user_id: row.get(0)?,
                        other_user_name: row.get(1)?,
                        last_message: row.get(2)?,
                        timestamp: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Orders --

    /// Order placement runs in an explicit transaction: the insert is the
    /// only statement today, but the transaction boundary is the contract.
    pub fn insert_order(&self, new: &NewOrder) -> Result<OrderRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let row = tx.query_row(
                "INSERT INTO orders (
                     user_id, influencer_id, influencer_name, order_type,
                     services, total_price, description, affiliated_links,
                     coupon_code, scheduled_date, scheduled_time, file_url
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 RETURNING id, user_id, influencer_id, influencer_name, order_type,
                           services, total_price, description, affiliated_links,
                           coupon_code, scheduled_date, scheduled_time, file_url,
                           status, created_at, updated_at",
                params![
                    new.user_id,
                    new.influencer_id,
                    new.influencer_name,
                    new.order_type,
                    new.services,
                    new.total_price,
                    new.description,
                    new.affiliated_links,
                    new.coupon_code,
                    new.scheduled_date,
                    new.scheduled_time,
                    new.file_url,
                ],
                map_order_row,
            )?;
            tx.commit()?;
            Ok(row)
        })
    }

    pub fn get_order(&self, id: i64) -> Result<Option<OrderRow>> {
        self.with_conn(|conn| query_order(conn, id))
    }

    /// Orders where the user is buyer or influencer, newest first.
    pub fn orders_for_user(&self, user_id: i64) -> Result<Vec<OrderRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, influencer_id, influencer_name, order_type,
                        services, total_price, description, affiliated_links,
                        coupon_code, scheduled_date, scheduled_time, file_url,
                        status, created_at, updated_at
                 FROM orders
                 WHERE user_id = ?1 OR influencer_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], map_order_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Forward-only status transition. The UPDATE only fires on a Pending
    /// row; re-confirming an already Completed order returns the row
    /// untouched. Returns None for an unknown order.
    pub fn complete_order(&self, id: i64) -> Result<Option<OrderRow>> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE orders SET status = 'Completed', updated_at = ?2
                 WHERE id = ?1 AND status = 'Pending'",
                params![id, Utc::now().to_rfc3339()],
            )?;
            query_order(conn, id)
        })
    }

    /// Deletes the order and returns the removed row (None when unknown).
    pub fn delete_order(&self, id: i64) -> Result<Option<OrderRow>> {
        self.with_conn_mut(|conn| {
            let row = query_order(conn, id)?;
            if row.is_some() {
                conn.execute("DELETE FROM orders WHERE id = ?1", [id])?;
            }
            Ok(row)
        })
    }

    // -- OTPs --

    pub fn insert_otp(&self, email: &str, otp: &str, expires_at: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO otps (email, otp, expires_at) VALUES (?1, ?2, ?3)",
                params![email, otp, expires_at],
            )?;
            Ok(())
        })
    }

    /// Latest matching code for the email, if any.
    pub fn latest_otp(&self, email: &str, otp: &str) -> Result<Option<OtpRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, otp, verified, created_at, expires_at
                 FROM otps WHERE email = ?1 AND otp = ?2
                 ORDER BY id DESC LIMIT 1",
                params![email, otp],
                map_otp_row,
            )
            .optional()
        })
    }

    pub fn mark_otp_verified(&self, id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("UPDATE otps SET verified = 1 WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    pub fn latest_verified_otp(&self, email: &str) -> Result<Option<OtpRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, otp, verified, created_at, expires_at
                 FROM otps WHERE email = ?1 AND verified = 1
                 ORDER BY id DESC LIMIT 1",
                [email],
                map_otp_row,
            )
            .optional()
        })
    }

    // -- Promotions --

    pub fn find_promotion(&self, user_id: i64, campaign_id: &str) -> Result<Option<PromotionRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, campaign_id, unique_url, status, created_at
                 FROM promotions WHERE user_id = ?1 AND campaign_id = ?2",
                params![user_id, campaign_id],
                map_promotion_row,
            )
            .optional()
        })
    }

    pub fn insert_promotion(
        &self,
        user_id: i64,
        campaign_id: &str,
        unique_url: &str,
    ) -> Result<PromotionRow> {
        self.with_conn_mut(|conn| {
            let row = conn.query_row(
                "INSERT INTO promotions (user_id, campaign_id, unique_url)
                 VALUES (?1, ?2, ?3)
                 RETURNING id, user_id, campaign_id, unique_url, status, created_at",
                params![user_id, campaign_id, unique_url],
                map_promotion_row,
            )?;
            Ok(row)
        })
    }

    /// Deactivate the user's promotions older than 24 hours.
    pub fn expire_stale_promotions(&self, user_id: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE promotions SET status = 0
                 WHERE user_id = ?1 AND status = 1
                   AND created_at < datetime('now', '-24 hours')",
                [user_id],
            )?;
            Ok(n)
        })
    }

    pub fn promotions_for(&self, user_id: i64) -> Result<Vec<PromotionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, campaign_id, unique_url, status, created_at
                 FROM promotions WHERE user_id = ?1 ORDER BY id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], map_promotion_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn unique_clicks(&self, promotion_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let n = conn.query_row(
                "SELECT COUNT(DISTINCT ip_address) FROM clicks WHERE promotion_id = ?1",
                [promotion_id],
                |row| row.get(0),
            )?;
            Ok(n)
        })
    }

    /// Resolve a promotion from the public click URL components.
    pub fn find_promotion_by_code(
        &self,
        user_id: i64,
        campaign_id: &str,
        code: &str,
    ) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id FROM promotions
                 WHERE user_id = ?1 AND campaign_id = ?2 AND unique_url LIKE ?3",
                params![user_id, campaign_id, format!("%{code}")],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Record a click; duplicate IPs for the same promotion are ignored.
    pub fn record_click(&self, promotion_id: i64, ip: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO clicks (promotion_id, ip_address) VALUES (?1, ?2)",
                params![promotion_id, ip],
            )?;
            Ok(())
        })
    }

    // -- Auth sessions (PKCE state) --

    pub fn create_auth_session(&self, state: &str, verifier: &str, expires: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO auth_sessions (state, code_verifier, expires) VALUES (?1, ?2, ?3)",
                params![state, verifier, expires],
            )?;
            Ok(())
        })
    }

    /// Single use: the row is deleted on read. The caller still checks
    /// expiry on the returned row.
    pub fn consume_auth_session(&self, state: &str) -> Result<Option<AuthSessionRow>> {
        self.with_conn_mut(|conn| {
            let row = conn
                .query_row(
                    "SELECT state, code_verifier, expires FROM auth_sessions WHERE state = ?1",
                    [state],
                    |row| {
                        Ok(AuthSessionRow {
                            state: row.get(0)?,
                            code_verifier: row.get(1)?,
                            expires: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            if row.is_some() {
                conn.execute("DELETE FROM auth_sessions WHERE state = ?1", [state])?;
            }
            Ok(row)
        })
    }

    // -- Newsletter --

    pub fn subscribe_newsletter(&self, email: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO newsletter (email, status) VALUES (?1, 'subscribed')
                 ON CONFLICT (email) DO UPDATE SET status = 'subscribed'",
                [email],
            )?;
            Ok(())
        })
    }

    /// Returns false when the email was never subscribed.
    pub fn unsubscribe_newsletter(&self, email: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE newsletter SET status = 'unsubscribed' WHERE email = ?1",
                [email],
            )?;
            Ok(n > 0)
        })
    }

    // -- Service requests --

    pub fn insert_service_request(&self, name: &str, email: &str, message: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO service_requests (name, email, message) VALUES (?1, ?2, ?3)",
                params![name, email, message],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }
}

fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        fullname: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        password: row.get(4)?,
        role: row.get(5)?,
        category: row.get(6)?,
        profile_pic: row.get(7)?,
        prices: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        timestamp: row.get(4)?,
    })
}

fn map_order_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrderRow> {
    Ok(OrderRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        influencer_id: row.get(2)?,
        influencer_name: row.get(3)?,
        order_type: row.get(4)?,
        services: row.get(5)?,
        total_price: row.get(6)?,
        description: row.get(7)?,
        affiliated_links: row.get(8)?,
        coupon_code: row.get(9)?,
        scheduled_date: row.get(10)?,
        scheduled_time: row.get(11)?,
        file_url: row.get(12)?,
        status: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn map_otp_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OtpRow> {
    Ok(OtpRow {
        id: row.get(0)?,
        email: row.get(1)?,
        otp: row.get(2)?,
        verified: row.get(3)?,
        created_at: row.get(4)?,
        expires_at: row.get(5)?,
    })
}

fn map_promotion_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PromotionRow> {
    Ok(PromotionRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        campaign_id: row.get(2)?,
        unique_url: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn query_order(conn: &Connection, id: i64) -> Result<Option<OrderRow>> {
    conn.query_row(
        "SELECT id, user_id, influencer_id, influencer_name, order_type,
                services, total_price, description, affiliated_links,
                coupon_code, scheduled_date, scheduled_time, file_url,
                status, created_at, updated_at
         FROM orders WHERE id = ?1",
        [id],
        map_order_row,
    )
    .optional()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewOrder;
    use chrono::Duration;

    fn db_with_users() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("Asha Rao", "asha@example.com", Some("9000000001"), "hash-a", "business")
            .unwrap();
        db.create_user("Vikram Shetty", "vikram@example.com", None, "hash-b", "influencer")
            .unwrap();
        db
    }

    fn sample_order(db: &Database) -> OrderRow {
        db.insert_order(&NewOrder {
            user_id: 1,
            influencer_id: 2,
            influencer_name: "Vikram Shetty".into(),
            order_type: "promotion".into(),
            services: r#"[{"name":"Reels/Shorts","price":499.0}]"#.into(),
            total_price: 499.0,
            description: None,
            affiliated_links: "[]".into(),
            coupon_code: None,
            scheduled_date: None,
            scheduled_time: None,
            file_url: Some("/uploads/abc-brief.pdf".into()),
        })
        .unwrap()
    }

    #[test]
    fn message_roundtrip_ordered_ascending() {
        let db = db_with_users();
        let first = db.insert_message(1, 2, "hi").unwrap();
        let second = db.insert_message(2, 1, "hello").unwrap();
        let third = db.insert_message(1, 2, "how are you").unwrap();
        assert!(first.id < second.id && second.id < third.id);

        // Symmetric: both directions see the same ordered history
        let a_view = db.chat_between(1, 2, None, None).unwrap();
        let b_view = db.chat_between(2, 1, None, None).unwrap();
        let ids: Vec<i64> = a_view.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
        assert_eq!(ids, b_view.iter().map(|m| m.id).collect::<Vec<_>>());

        // Idempotent read
        let again = db.chat_between(1, 2, None, None).unwrap();
        assert_eq!(again.len(), 3);
        assert_eq!(again[0].content, "hi");
    }

    #[test]
    fn chat_cursor_returns_older_rows_ascending() {
        let db = db_with_users();
        for i in 0..5 {
            db.insert_message(1, 2, &format!("m{i}")).unwrap();
        }
        let all = db.chat_between(1, 2, None, None).unwrap();
        let cursor = all[3].id;

        let page = db.chat_between(1, 2, Some(cursor), Some(2)).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].content, "m1");
        assert_eq!(page[1].content, "m2");
    }

    #[test]
    fn chat_partners_carries_last_message_only() {
        let db = db_with_users();
        db.create_user("Meera Iyer", "meera@example.com", None, "hash-c", "influencer")
            .unwrap();
        db.insert_message(1, 2, "first").unwrap();
        db.insert_message(2, 1, "latest with vikram").unwrap();
        db.insert_message(3, 1, "hi from meera").unwrap();

        let partners = db.chat_partners(1).unwrap();
        assert_eq!(partners.len(), 2);
        assert_eq!(partners[0].other_user_id, 3);
        assert_eq!(partners[0].last_message, "hi from meera");
        assert_eq!(partners[1].other_user_id, 2);
        assert_eq!(partners[1].last_message, "latest with vikram");
    }

    #[test]
    fn wishlist_toggle_is_a_set() {
        let db = db_with_users();
        assert!(db.toggle_wishlist(1, 2).unwrap());
        assert_eq!(db.wishlist_of(1).unwrap(), vec![2]);

        // Toggling again removes; never duplicates
        assert!(!db.toggle_wishlist(1, 2).unwrap());
        assert!(db.wishlist_of(1).unwrap().is_empty());

        assert!(db.toggle_wishlist(1, 2).unwrap());
        assert_eq!(db.wishlist_of(1).unwrap(), vec![2]);
    }

    #[test]
    fn order_status_only_moves_forward() {
        let db = db_with_users();
        let order = sample_order(&db);
        assert_eq!(order.status, "Pending");

        let completed = db.complete_order(order.id).unwrap().unwrap();
        assert_eq!(completed.status, "Completed");

        // Re-confirm: still Completed, updated_at untouched by the no-op
        let again = db.complete_order(order.id).unwrap().unwrap();
        assert_eq!(again.status, "Completed");
        assert_eq!(again.updated_at, completed.updated_at);

        assert!(db.complete_order(9999).unwrap().is_none());
    }

    #[test]
    fn delete_order_returns_row_with_file_url() {
        let db = db_with_users();
        let order = sample_order(&db);
        let deleted = db.delete_order(order.id).unwrap().unwrap();
        assert_eq!(deleted.file_url.as_deref(), Some("/uploads/abc-brief.pdf"));
        assert!(db.get_order(order.id).unwrap().is_none());
        assert!(db.delete_order(order.id).unwrap().is_none());
    }

    #[test]
    fn otp_expiry_and_verification() {
        let db = db_with_users();
        let future = (Utc::now() + Duration::minutes(5)).to_rfc3339();
        let past = (Utc::now() - Duration::minutes(1)).to_rfc3339();

        db.insert_otp("asha@example.com", "123456", &past).unwrap();
        let expired = db.latest_otp("asha@example.com", "123456").unwrap().unwrap();
        assert!(expired.is_expired(Utc::now()));

        db.insert_otp("asha@example.com", "654321", &future).unwrap();
        let fresh = db.latest_otp("asha@example.com", "654321").unwrap().unwrap();
        assert!(!fresh.is_expired(Utc::now()));
        assert!(!fresh.verified);

        db.mark_otp_verified(fresh.id).unwrap();
        let verified = db.latest_verified_otp("asha@example.com").unwrap().unwrap();
        assert_eq!(verified.id, fresh.id);
    }

    #[test]
    fn auth_session_is_single_use() {
        let db = db_with_users();
        let expires = (Utc::now() + Duration::minutes(15)).to_rfc3339();
        db.create_auth_session("state-1", "verifier-1", &expires).unwrap();

        let first = db.consume_auth_session("state-1").unwrap().unwrap();
        assert_eq!(first.code_verifier, "verifier-1");
        assert!(!first.is_expired(Utc::now()));

        // Consumed: a second read finds nothing
        assert!(db.consume_auth_session("state-1").unwrap().is_none());
    }

    #[test]
    fn promotion_clicks_unique_per_ip() {
        let db = db_with_users();
        let promo = db
            .insert_promotion(2, "summer-launch", "https://example.com/promo/2/summer-launch/ab12cd34")
            .unwrap();

        db.record_click(promo.id, "10.0.0.1").unwrap();
        db.record_click(promo.id, "10.0.0.1").unwrap();
        db.record_click(promo.id, "10.0.0.2").unwrap();
        assert_eq!(db.unique_clicks(promo.id).unwrap(), 2);

        let found = db
            .find_promotion_by_code(2, "summer-launch", "ab12cd34")
            .unwrap();
        assert_eq!(found, Some(promo.id));
    }

    #[test]
    fn newsletter_subscribe_is_upsert() {
        let db = db_with_users();
        db.subscribe_newsletter("news@example.com").unwrap();
        assert!(db.unsubscribe_newsletter("news@example.com").unwrap());
        db.subscribe_newsletter("news@example.com").unwrap();
        assert!(!db.unsubscribe_newsletter("never@example.com").unwrap());
    }

    #[test]
    fn provider_upsert_keeps_one_row_per_provider() {
        let db = db_with_users();
        db.upsert_provider_account(2, "youtube", Some("UC123"), Some("{}"), None)
            .unwrap();
        db.upsert_provider_account(2, "youtube", Some("UC123"), Some(r#"{"subs":10}"#), None)
            .unwrap();
        let accounts = db.provider_accounts_for(2).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].profile.as_deref(), Some(r#"{"subs":10}"#));
    }
}
