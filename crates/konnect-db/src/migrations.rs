use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            fullname     TEXT NOT NULL,
            email        TEXT NOT NULL UNIQUE,
            phone        TEXT,
            password     TEXT NOT NULL,
            role         TEXT NOT NULL DEFAULT 'business'
                         CHECK (role IN ('business', 'influencer', 'admin')),
            category     TEXT,
            profile_pic  TEXT,
            prices       TEXT,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Provider profile/post snapshots, one row per (user, provider).
        -- The UNIQUE pair makes concurrent OAuth callbacks safe to upsert.
        CREATE TABLE IF NOT EXISTS provider_accounts (
            user_id           INTEGER NOT NULL REFERENCES users(id),
            provider          TEXT NOT NULL,
            provider_user_id  TEXT,
            profile           TEXT,
            posts             TEXT,
            updated_at        TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (user_id, provider)
        );

        -- Wishlist as a side table: the UNIQUE pair enforces set semantics.
        CREATE TABLE IF NOT EXISTS wishlist (
            user_id    INTEGER NOT NULL REFERENCES users(id),
            target_id  INTEGER NOT NULL REFERENCES users(id),
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (user_id, target_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id    INTEGER NOT NULL REFERENCES users(id),
            receiver_id  INTEGER NOT NULL REFERENCES users(id),
            content      TEXT NOT NULL,
            timestamp    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_id, receiver_id, id);

        CREATE TABLE IF NOT EXISTS orders (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id          INTEGER NOT NULL REFERENCES users(id),
            influencer_id    INTEGER NOT NULL REFERENCES users(id),
            influencer_name  TEXT NOT NULL,
            order_type       TEXT NOT NULL,
            services         TEXT NOT NULL,
            total_price      REAL NOT NULL,
            description      TEXT,
            affiliated_links TEXT NOT NULL DEFAULT '[]',
            coupon_code      TEXT,
            scheduled_date   TEXT,
            scheduled_time   TEXT,
            file_url         TEXT,
            status           TEXT NOT NULL DEFAULT 'Pending'
                             CHECK (status IN ('Pending', 'Completed')),
            created_at       TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at       TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_orders_parties
            ON orders(user_id, influencer_id);

        CREATE TABLE IF NOT EXISTS otps (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            email       TEXT NOT NULL,
            otp         TEXT NOT NULL,
            verified    INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            expires_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_otps_email
            ON otps(email, created_at);

        CREATE TABLE IF NOT EXISTS promotions (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER NOT NULL REFERENCES users(id),
            campaign_id TEXT NOT NULL,
            unique_url  TEXT NOT NULL,
            status      INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (user_id, campaign_id)
        );

        CREATE TABLE IF NOT EXISTS clicks (
            promotion_id INTEGER NOT NULL REFERENCES promotions(id),
            ip_address   TEXT NOT NULL,
            created_at   TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (promotion_id, ip_address)
        );

        -- Short-lived PKCE state for OAuth connect flows. Rows are single
        -- use: consumed (deleted) on callback, expiry-checked by the caller.
        CREATE TABLE IF NOT EXISTS auth_sessions (
            state         TEXT PRIMARY KEY,
            code_verifier TEXT NOT NULL,
            expires       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS newsletter (
            email      TEXT PRIMARY KEY,
            status     TEXT NOT NULL DEFAULT 'subscribed'
                       CHECK (status IN ('subscribed', 'unsubscribed')),
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS service_requests (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            name       TEXT NOT NULL,
            email      TEXT NOT NULL,
            message    TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
