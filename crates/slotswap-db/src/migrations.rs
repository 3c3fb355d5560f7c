use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL UNIQUE,
            email       TEXT,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        -- Exactly one profile per user, keyed by the user id itself
        CREATE TABLE IF NOT EXISTS profiles (
            user_id                      INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            name                         TEXT NOT NULL,
            email                        TEXT,
            avatar_url                   TEXT,
            primary_genre                TEXT NOT NULL DEFAULT '',
            reputation_score             REAL NOT NULL DEFAULT 5.0,
            auto_approve_friends         INTEGER NOT NULL DEFAULT 0,
            auto_approve_min_reputation  REAL NOT NULL DEFAULT 0.0
        );

        -- Symmetric friend edges, stored once with the lower id first
        CREATE TABLE IF NOT EXISTS friendships (
            user_low    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            user_high   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (user_low, user_high),
            CHECK (user_low < user_high)
        );

        CREATE TABLE IF NOT EXISTS slots (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            send_date        TEXT NOT NULL,
            preferred_genre  TEXT NOT NULL,
            audience_size    INTEGER NOT NULL DEFAULT 0,
            max_partners     INTEGER NOT NULL DEFAULT 5,
            created_at       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_slots_owner ON slots(owner_id);

        CREATE TABLE IF NOT EXISTS books (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id          INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title             TEXT NOT NULL,
            primary_genre     TEXT NOT NULL,
            is_primary_promo  INTEGER NOT NULL DEFAULT 0,
            is_active         INTEGER NOT NULL DEFAULT 1,
            created_at        TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_books_owner ON books(owner_id, created_at);

        CREATE TABLE IF NOT EXISTS swap_requests (
            id                         INTEGER PRIMARY KEY AUTOINCREMENT,
            slot_id                    INTEGER NOT NULL REFERENCES slots(id) ON DELETE CASCADE,
            requester_id               INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            book_id                    INTEGER REFERENCES books(id) ON DELETE CASCADE,
            offered_slot_id            INTEGER REFERENCES slots(id) ON DELETE SET NULL,
            requested_book_id          INTEGER REFERENCES books(id) ON DELETE SET NULL,
            status                     TEXT NOT NULL DEFAULT 'pending',
            message                    TEXT,
            preferred_placement        TEXT NOT NULL DEFAULT 'middle',
            max_partners_acknowledged  INTEGER NOT NULL DEFAULT 5,
            rejection_reason           TEXT,
            rejected_at                TEXT,
            scheduled_date             TEXT,
            completed_at               TEXT,
            created_at                 TEXT NOT NULL
        );

        -- At most one non-rejected request per (slot, requester)
        CREATE UNIQUE INDEX IF NOT EXISTS idx_swap_requests_active
            ON swap_requests(slot_id, requester_id)
            WHERE status <> 'rejected';

        CREATE INDEX IF NOT EXISTS idx_swap_requests_requester
            ON swap_requests(requester_id, created_at);

        CREATE TABLE IF NOT EXISTS notifications (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            recipient_id  INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title         TEXT NOT NULL,
            body          TEXT NOT NULL,
            badge         TEXT NOT NULL,
            action_url    TEXT,
            is_read       INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_recipient
            ON notifications(recipient_id, created_at);

        CREATE TABLE IF NOT EXISTS chat_messages (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            recipient_id  INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content       TEXT NOT NULL,
            attachment    TEXT,
            is_file       INTEGER NOT NULL DEFAULT 0,
            is_read       INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chat_messages_pair
            ON chat_messages(sender_id, recipient_id, id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
