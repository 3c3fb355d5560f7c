use std::str::FromStr;

use anyhow::{Result, anyhow};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use slotswap_types::models::{
    Badge, Book, ChatMessage, NewsletterSlot, Notification, Profile, SwapRequest, SwapStatus, User,
    UserId,
};

use crate::Database;
use crate::models::{
    InsertSwapOutcome, NewBook, NewSlot, NewSwapRequest, NewUser, StatusPatch, TransitionOutcome,
    UserRow,
};

const PROFILE_COLUMNS: &str = "user_id, name, email, avatar_url, primary_genre, reputation_score, \
     auto_approve_friends, auto_approve_min_reputation";

const SLOT_COLUMNS: &str =
    "id, owner_id, send_date, preferred_genre, audience_size, max_partners, created_at";

const BOOK_COLUMNS: &str = "id, owner_id, title, primary_genre, is_primary_promo, is_active, created_at";

const SWAP_COLUMNS: &str = "id, slot_id, requester_id, book_id, offered_slot_id, requested_book_id, \
     status, message, preferred_placement, max_partners_acknowledged, rejection_reason, \
     rejected_at, scheduled_date, completed_at, created_at";

const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, title, body, badge, action_url, is_read, created_at";

const CHAT_COLUMNS: &str =
    "id, sender_id, recipient_id, content, attachment, is_file, is_read, created_at";

impl Database {
    // -- Users & profiles --

    /// Creates the user and its profile in one transaction.
    pub fn create_user(&self, new: &NewUser<'_>) -> Result<UserId> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO users (username, email, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![new.username, new.email, new.password_hash, Utc::now()],
            )?;
            let user_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO profiles (user_id, name, email) VALUES (?1, ?2, ?3)",
                params![user_id, new.display_name, new.email],
            )?;
            tx.commit()?;
            Ok(user_id)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, email, password, created_at FROM users WHERE username = ?1",
                    [username],
                    |row| {
                        Ok(UserRow {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            email: row.get(2)?,
                            password: row.get(3)?,
                            created_at: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let user = conn
                .query_row(
                    "SELECT id, username, email, created_at FROM users WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(User {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            email: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(user)
        })
    }

    pub fn get_profile(&self, user_id: UserId) -> Result<Option<Profile>> {
        self.with_conn(|conn| query_profile(conn, user_id))
    }

    /// Display name for chat frames; falls back to the username.
    pub fn display_name(&self, user_id: UserId) -> Result<String> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COALESCE(NULLIF(p.name, ''), u.username)
                 FROM users u LEFT JOIN profiles p ON p.user_id = u.id
                 WHERE u.id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .map_err(|_| anyhow!("User not found: {}", user_id))
        })
    }

    pub fn update_auto_approve(
        &self,
        user_id: UserId,
        auto_approve_friends: Option<bool>,
        auto_approve_min_reputation: Option<f64>,
    ) -> Result<Option<Profile>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE profiles SET
                    auto_approve_friends = COALESCE(?2, auto_approve_friends),
                    auto_approve_min_reputation = COALESCE(?3, auto_approve_min_reputation)
                 WHERE user_id = ?1",
                params![user_id, auto_approve_friends, auto_approve_min_reputation],
            )?;
            query_profile(conn, user_id)
        })
    }

    pub fn set_reputation(&self, user_id: UserId, score: f64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE profiles SET reputation_score = ?2 WHERE user_id = ?1",
                params![user_id, score],
            )?;
            Ok(())
        })
    }

    pub fn set_profile_display(
        &self,
        user_id: UserId,
        avatar_url: Option<&str>,
        primary_genre: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE profiles SET avatar_url = ?2, primary_genre = ?3 WHERE user_id = ?1",
                params![user_id, avatar_url, primary_genre],
            )?;
            Ok(())
        })
    }

    // -- Friends --

    /// Returns false when the edge already existed.
    pub fn add_friend(&self, a: UserId, b: UserId) -> Result<bool> {
        let (low, high) = ordered_pair(a, b)?;
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO friendships (user_low, user_high, created_at) VALUES (?1, ?2, ?3)",
                params![low, high, Utc::now()],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn remove_friend(&self, a: UserId, b: UserId) -> Result<bool> {
        let (low, high) = ordered_pair(a, b)?;
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM friendships WHERE user_low = ?1 AND user_high = ?2",
                params![low, high],
            )?;
            Ok(removed == 1)
        })
    }

    pub fn are_friends(&self, a: UserId, b: UserId) -> Result<bool> {
        if a == b {
            return Ok(false);
        }
        let (low, high) = (a.min(b), a.max(b));
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM friendships WHERE user_low = ?1 AND user_high = ?2)",
                params![low, high],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn list_friends(&self, user_id: UserId) -> Result<Vec<UserId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_high FROM friendships WHERE user_low = ?1
                 UNION
                 SELECT user_low FROM friendships WHERE user_high = ?1
                 ORDER BY 1",
            )?;
            let ids = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    // -- Slots & books --

    pub fn create_slot(&self, new: &NewSlot<'_>) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO slots (owner_id, send_date, preferred_genre, audience_size, max_partners, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    new.owner_id,
                    new.send_date,
                    new.preferred_genre,
                    new.audience_size,
                    new.max_partners,
                    Utc::now()
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_slot(&self, id: i64) -> Result<Option<NewsletterSlot>> {
        self.with_conn(|conn| {
            let slot = conn
                .query_row(
                    &format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = ?1"),
                    [id],
                    slot_from_row,
                )
                .optional()?;
            Ok(slot)
        })
    }

    /// Writes a synced audience size onto every slot of the owner.
    pub fn update_audience_for_owner(&self, owner_id: UserId, audience_size: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE slots SET audience_size = ?2 WHERE owner_id = ?1",
                params![owner_id, audience_size],
            )?;
            Ok(updated)
        })
    }

    pub fn create_book(&self, new: &NewBook<'_>) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO books (owner_id, title, primary_genre, is_primary_promo, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    new.owner_id,
                    new.title,
                    new.primary_genre,
                    new.is_primary_promo,
                    new.is_active,
                    Utc::now()
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_book(&self, id: i64) -> Result<Option<Book>> {
        self.with_conn(|conn| {
            let book = conn
                .query_row(
                    &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"),
                    [id],
                    book_from_row,
                )
                .optional()?;
            Ok(book)
        })
    }

    /// The book a request promotes when none was named: the owner's primary
    /// promo book, otherwise their most recently added active book.
    pub fn find_promo_book(&self, owner_id: UserId) -> Result<Option<Book>> {
        self.with_conn(|conn| {
            let primary = conn
                .query_row(
                    &format!(
                        "SELECT {BOOK_COLUMNS} FROM books
                         WHERE owner_id = ?1 AND is_primary_promo = 1
                         ORDER BY created_at DESC, id DESC LIMIT 1"
                    ),
                    [owner_id],
                    book_from_row,
                )
                .optional()?;
            if primary.is_some() {
                return Ok(primary);
            }

            let latest = conn
                .query_row(
                    &format!(
                        "SELECT {BOOK_COLUMNS} FROM books
                         WHERE owner_id = ?1 AND is_active = 1
                         ORDER BY created_at DESC, id DESC LIMIT 1"
                    ),
                    [owner_id],
                    book_from_row,
                )
                .optional()?;
            Ok(latest)
        })
    }

    // -- Swap requests --

    /// Inserts a request unless an active one already exists for the same
    /// (slot, requester). Check and insert share one transaction.
    pub fn insert_swap_request(&self, new: &NewSwapRequest) -> Result<InsertSwapOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if let Some(existing) = query_active_status(&tx, new.slot_id, new.requester_id)? {
                return Ok(InsertSwapOutcome::Duplicate(existing));
            }

            let inserted = tx.query_row(
                &format!(
                    "INSERT INTO swap_requests (
                        slot_id, requester_id, book_id, offered_slot_id, requested_book_id, status,
                        message, preferred_placement, max_partners_acknowledged, created_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                     RETURNING {SWAP_COLUMNS}"
                ),
                params![
                    new.slot_id,
                    new.requester_id,
                    new.book_id,
                    new.offered_slot_id,
                    new.requested_book_id,
                    new.status.as_str(),
                    new.message,
                    new.preferred_placement.as_str(),
                    new.max_partners_acknowledged,
                    Utc::now()
                ],
                swap_from_row,
            );

            let created = match inserted {
                Ok(created) => created,
                Err(e) if is_unique_violation(&e) => {
                    let existing = query_active_status(&tx, new.slot_id, new.requester_id)?
                        .unwrap_or(SwapStatus::Pending);
                    return Ok(InsertSwapOutcome::Duplicate(existing));
                }
                Err(e) => return Err(e.into()),
            };

            tx.commit()?;
            Ok(InsertSwapOutcome::Created(created))
        })
    }

    pub fn get_swap_request(&self, id: i64) -> Result<Option<SwapRequest>> {
        self.with_conn(|conn| {
            let swap = conn
                .query_row(
                    &format!("SELECT {SWAP_COLUMNS} FROM swap_requests WHERE id = ?1"),
                    [id],
                    swap_from_row,
                )
                .optional()?;
            Ok(swap)
        })
    }

    /// Compare-and-set on the status column: the patch only lands if the row
    /// is still in `expected`. An applied patch hands back the updated row.
    pub fn transition_swap_request(
        &self,
        id: i64,
        expected: SwapStatus,
        patch: &StatusPatch,
    ) -> Result<TransitionOutcome> {
        self.with_conn(|conn| {
            let updated = conn
                .query_row(
                    &format!(
                        "UPDATE swap_requests SET
                            status = ?3,
                            rejection_reason = ?4,
                            rejected_at = ?5,
                            scheduled_date = COALESCE(?6, scheduled_date),
                            completed_at = COALESCE(?7, completed_at)
                         WHERE id = ?1 AND status = ?2
                         RETURNING {SWAP_COLUMNS}"
                    ),
                    params![
                        id,
                        expected.as_str(),
                        patch.status.as_str(),
                        patch.rejection_reason,
                        patch.rejected_at,
                        patch.scheduled_date,
                        patch.completed_at
                    ],
                    swap_from_row,
                )
                .optional();

            match updated {
                Ok(Some(swap)) => Ok(TransitionOutcome::Applied(swap)),
                Ok(None) => {
                    let current = conn
                        .query_row(
                            "SELECT status FROM swap_requests WHERE id = ?1",
                            [id],
                            |row| parse_text::<SwapStatus>(row, 0),
                        )
                        .optional()?;
                    Ok(current.map_or(TransitionOutcome::Missing, TransitionOutcome::Stale))
                }
                Err(e) if is_unique_violation(&e) => Ok(TransitionOutcome::Duplicate),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Requests the user sent, newest first.
    pub fn list_sent_swap_requests(&self, requester_id: UserId) -> Result<Vec<SwapRequest>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SWAP_COLUMNS} FROM swap_requests
                 WHERE requester_id = ?1
                 ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map([requester_id], swap_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Requests targeting the user's slots, newest first.
    pub fn list_received_swap_requests(&self, owner_id: UserId) -> Result<Vec<SwapRequest>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SWAP_COLUMNS} FROM swap_requests
                 WHERE slot_id IN (SELECT id FROM slots WHERE owner_id = ?1)
                 ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map([owner_id], swap_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// True when either user has a non-rejected request on the other's slot.
    pub fn has_active_swap_between(&self, a: UserId, b: UserId) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM swap_requests r JOIN slots s ON s.id = r.slot_id
                    WHERE r.status <> 'rejected'
                      AND ((r.requester_id = ?1 AND s.owner_id = ?2)
                        OR (r.requester_id = ?2 AND s.owner_id = ?1))
                 )",
                params![a, b],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    // -- Notifications --

    pub fn insert_notification(
        &self,
        recipient_id: UserId,
        title: &str,
        body: &str,
        badge: Badge,
        action_url: Option<&str>,
    ) -> Result<Notification> {
        let created_at = Utc::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (recipient_id, title, body, badge, action_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![recipient_id, title, body, badge.as_str(), action_url, created_at],
            )?;
            Ok(Notification {
                id: conn.last_insert_rowid(),
                recipient_id,
                title: title.to_string(),
                body: body.to_string(),
                badge,
                action_url: action_url.map(str::to_string),
                is_read: false,
                created_at,
            })
        })
    }

    /// Newest first.
    pub fn list_notifications(&self, recipient_id: UserId, limit: u32) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                 WHERE recipient_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![recipient_id, limit], notification_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_unread_notifications(&self, recipient_id: UserId) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND is_read = 0",
                [recipient_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Scoped to the recipient so nobody can flip someone else's rows.
    pub fn mark_notification_read(&self, recipient_id: UserId, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND recipient_id = ?2",
                params![id, recipient_id],
            )?;
            Ok(updated == 1)
        })
    }

    pub fn mark_all_notifications_read(&self, recipient_id: UserId) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE recipient_id = ?1 AND is_read = 0",
                [recipient_id],
            )?;
            Ok(updated)
        })
    }

    // -- Chat --

    pub fn insert_chat_message(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        content: &str,
        attachment: Option<&str>,
    ) -> Result<ChatMessage> {
        let created_at = Utc::now();
        let is_file = attachment.is_some();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_messages (sender_id, recipient_id, content, attachment, is_file, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![sender_id, recipient_id, content, attachment, is_file, created_at],
            )?;
            Ok(ChatMessage {
                id: conn.last_insert_rowid(),
                sender_id,
                recipient_id,
                content: content.to_string(),
                attachment: attachment.map(str::to_string),
                is_file,
                is_read: false,
                created_at,
            })
        })
    }

    /// Conversation history in creation order. `before` is a message id cursor
    /// for paging backwards.
    pub fn get_conversation(
        &self,
        a: UserId,
        b: UserId,
        limit: u32,
        before: Option<i64>,
    ) -> Result<Vec<ChatMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHAT_COLUMNS} FROM chat_messages
                 WHERE ((sender_id = ?1 AND recipient_id = ?2) OR (sender_id = ?2 AND recipient_id = ?1))
                   AND (?3 IS NULL OR id < ?3)
                 ORDER BY id DESC
                 LIMIT ?4"
            ))?;
            let mut rows = stmt
                .query_map(params![a, b, before, limit], chat_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }

    pub fn mark_conversation_read(&self, reader_id: UserId, partner_id: UserId) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE chat_messages SET is_read = 1
                 WHERE recipient_id = ?1 AND sender_id = ?2 AND is_read = 0",
                params![reader_id, partner_id],
            )?;
            Ok(updated)
        })
    }
}

fn ordered_pair(a: UserId, b: UserId) -> Result<(UserId, UserId)> {
    if a == b {
        return Err(anyhow!("A user cannot befriend themselves"));
    }
    Ok((a.min(b), a.max(b)))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn query_active_status(
    conn: &Connection,
    slot_id: i64,
    requester_id: UserId,
) -> Result<Option<SwapStatus>> {
    let status = conn
        .query_row(
            "SELECT status FROM swap_requests
             WHERE slot_id = ?1 AND requester_id = ?2 AND status <> 'rejected'
             LIMIT 1",
            params![slot_id, requester_id],
            |row| parse_text::<SwapStatus>(row, 0),
        )
        .optional()?;
    Ok(status)
}

fn query_profile(conn: &Connection, user_id: UserId) -> Result<Option<Profile>> {
    let profile = conn
        .query_row(
            &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = ?1"),
            [user_id],
            |row| {
                Ok(Profile {
                    user_id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    avatar_url: row.get(3)?,
                    primary_genre: row.get(4)?,
                    reputation_score: row.get(5)?,
                    auto_approve_friends: row.get(6)?,
                    auto_approve_min_reputation: row.get(7)?,
                })
            },
        )
        .optional()?;
    Ok(profile)
}

/// Reads a TEXT column into one of the closed enums.
fn parse_text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn slot_from_row(row: &Row<'_>) -> rusqlite::Result<NewsletterSlot> {
    Ok(NewsletterSlot {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        send_date: row.get(2)?,
        preferred_genre: row.get(3)?,
        audience_size: row.get(4)?,
        max_partners: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        primary_genre: row.get(3)?,
        is_primary_promo: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn swap_from_row(row: &Row<'_>) -> rusqlite::Result<SwapRequest> {
    Ok(SwapRequest {
        id: row.get(0)?,
        slot_id: row.get(1)?,
        requester_id: row.get(2)?,
        book_id: row.get(3)?,
        offered_slot_id: row.get(4)?,
        requested_book_id: row.get(5)?,
        status: parse_text(row, 6)?,
        message: row.get(7)?,
        preferred_placement: parse_text(row, 8)?,
        max_partners_acknowledged: row.get(9)?,
        rejection_reason: row.get(10)?,
        rejected_at: row.get(11)?,
        scheduled_date: row.get(12)?,
        completed_at: row.get(13)?,
        created_at: row.get(14)?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        recipient_id: row.get(1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        badge: parse_text(row, 4)?,
        action_url: row.get(5)?,
        is_read: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        recipient_id: row.get(2)?,
        content: row.get(3)?,
        attachment: row.get(4)?,
        is_file: row.get(5)?,
        is_read: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use slotswap_types::models::Placement;
    use std::sync::Arc;

    fn user(db: &Database, name: &str) -> UserId {
        db.create_user(&NewUser {
            username: name,
            email: Some(&format!("{name}@example.com")),
            password_hash: "hash",
            display_name: name,
        })
        .unwrap()
    }

    fn slot(db: &Database, owner: UserId) -> i64 {
        db.create_slot(&NewSlot {
            owner_id: owner,
            send_date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            preferred_genre: "fantasy",
            audience_size: 1200,
            max_partners: 5,
        })
        .unwrap()
    }

    fn draft(slot_id: i64, requester_id: UserId) -> NewSwapRequest {
        NewSwapRequest {
            slot_id,
            requester_id,
            book_id: None,
            offered_slot_id: None,
            requested_book_id: None,
            status: SwapStatus::Pending,
            message: None,
            preferred_placement: Placement::Middle,
            max_partners_acknowledged: 5,
        }
    }

    #[test]
    fn creating_a_user_creates_exactly_one_profile() {
        let db = Database::open_in_memory().unwrap();
        let id = user(&db, "ann");

        let profile = db.get_profile(id).unwrap().expect("profile created with user");
        assert_eq!(profile.name, "ann");
        assert_eq!(profile.email.as_deref(), Some("ann@example.com"));
        assert_eq!(profile.reputation_score, 5.0);
        assert!(!profile.auto_approve_friends);
    }

    #[test]
    fn friendship_is_symmetric() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "ann");
        let b = user(&db, "bob");

        assert!(db.add_friend(b, a).unwrap());
        assert!(!db.add_friend(a, b).unwrap());
        assert!(db.are_friends(a, b).unwrap());
        assert!(db.are_friends(b, a).unwrap());
        assert_eq!(db.list_friends(a).unwrap(), vec![b]);
        assert_eq!(db.list_friends(b).unwrap(), vec![a]);
        assert!(db.add_friend(a, a).is_err());

        assert!(db.remove_friend(a, b).unwrap());
        assert!(!db.are_friends(b, a).unwrap());
    }

    #[test]
    fn second_active_request_is_a_duplicate() {
        let db = Database::open_in_memory().unwrap();
        let owner = user(&db, "owner");
        let requester = user(&db, "req");
        let slot_id = slot(&db, owner);

        let first = db.insert_swap_request(&draft(slot_id, requester)).unwrap();
        let InsertSwapOutcome::Created(created) = first else {
            panic!("first insert should succeed");
        };
        assert_eq!(created.status, SwapStatus::Pending);
        assert_eq!(created.requester_id, requester);
        let id = created.id;
        assert_eq!(
            db.insert_swap_request(&draft(slot_id, requester)).unwrap(),
            InsertSwapOutcome::Duplicate(SwapStatus::Pending)
        );

        let mut reject = StatusPatch::to(SwapStatus::Rejected);
        reject.rejection_reason = Some("no".into());
        reject.rejected_at = Some(Utc::now());
        let TransitionOutcome::Applied(rejected) =
            db.transition_swap_request(id, SwapStatus::Pending, &reject).unwrap()
        else {
            panic!("reject should apply");
        };
        assert_eq!(rejected.status, SwapStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("no"));

        assert!(matches!(
            db.insert_swap_request(&draft(slot_id, requester)).unwrap(),
            InsertSwapOutcome::Created(_)
        ));

        // Restoring the old one now collides with the new active request
        assert_eq!(
            db.transition_swap_request(id, SwapStatus::Rejected, &StatusPatch::to(SwapStatus::Pending))
                .unwrap(),
            TransitionOutcome::Duplicate
        );
    }

    #[test]
    fn transition_is_compare_and_set() {
        let db = Database::open_in_memory().unwrap();
        let owner = user(&db, "owner");
        let requester = user(&db, "req");
        let slot_id = slot(&db, owner);
        let InsertSwapOutcome::Created(created) = db.insert_swap_request(&draft(slot_id, requester)).unwrap()
        else {
            panic!("insert failed");
        };
        let id = created.id;

        let confirm = StatusPatch::to(SwapStatus::Confirmed);
        assert!(matches!(
            db.transition_swap_request(id, SwapStatus::Pending, &confirm).unwrap(),
            TransitionOutcome::Applied(swap) if swap.id == id && swap.status == SwapStatus::Confirmed
        ));
        assert_eq!(
            db.transition_swap_request(id, SwapStatus::Pending, &confirm).unwrap(),
            TransitionOutcome::Stale(SwapStatus::Confirmed)
        );
        assert_eq!(
            db.transition_swap_request(9999, SwapStatus::Pending, &confirm).unwrap(),
            TransitionOutcome::Missing
        );
    }

    #[test]
    fn concurrent_inserts_yield_one_request() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let owner = user(&db, "owner");
        let requester = user(&db, "req");
        let slot_id = slot(&db, owner);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                std::thread::spawn(move || db.insert_swap_request(&draft(slot_id, requester)).unwrap())
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|outcome| matches!(outcome, InsertSwapOutcome::Created(_)))
            .count();
        assert_eq!(created, 1);
        assert_eq!(db.list_sent_swap_requests(requester).unwrap().len(), 1);
    }

    #[test]
    fn promo_book_prefers_primary_then_latest_active() {
        let db = Database::open_in_memory().unwrap();
        let owner = user(&db, "ann");
        assert!(db.find_promo_book(owner).unwrap().is_none());

        let book = |title: &str, primary: bool, active: bool| {
            db.create_book(&NewBook {
                owner_id: owner,
                title,
                primary_genre: "romance",
                is_primary_promo: primary,
                is_active: active,
            })
            .unwrap()
        };

        let older = book("Older", false, true);
        let _inactive = book("Shelved", false, false);
        assert_eq!(db.find_promo_book(owner).unwrap().unwrap().id, older);

        let primary = book("Flagship", true, true);
        let _newer = book("Newer", false, true);
        assert_eq!(db.find_promo_book(owner).unwrap().unwrap().id, primary);
    }

    #[test]
    fn active_swap_relationship_is_checked_both_ways() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "ann");
        let b = user(&db, "bob");
        let c = user(&db, "cat");
        let slot_of_b = slot(&db, b);

        db.insert_swap_request(&draft(slot_of_b, a)).unwrap();
        assert!(db.has_active_swap_between(a, b).unwrap());
        assert!(db.has_active_swap_between(b, a).unwrap());
        assert!(!db.has_active_swap_between(a, c).unwrap());
    }

    #[test]
    fn notifications_newest_first_and_read_state() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "ann");
        let b = user(&db, "bob");

        let first = db.insert_notification(a, "One", "first", Badge::Swap, None).unwrap();
        let second = db
            .insert_notification(a, "Two", "second", Badge::New, Some("/chat/2"))
            .unwrap();
        db.insert_notification(b, "Other", "not yours", Badge::New, None).unwrap();

        let listed = db.list_notifications(a, 50).unwrap();
        assert_eq!(listed.iter().map(|n| n.id).collect::<Vec<_>>(), vec![second.id, first.id]);
        assert_eq!(listed[0].action_url.as_deref(), Some("/chat/2"));
        assert_eq!(db.count_unread_notifications(a).unwrap(), 2);

        assert!(!db.mark_notification_read(b, first.id).unwrap());
        assert!(db.mark_notification_read(a, first.id).unwrap());
        assert_eq!(db.count_unread_notifications(a).unwrap(), 1);
        assert_eq!(db.mark_all_notifications_read(a).unwrap(), 1);
        assert_eq!(db.count_unread_notifications(a).unwrap(), 0);
    }

    #[test]
    fn conversation_history_is_in_creation_order() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "ann");
        let b = user(&db, "bob");

        for i in 0..5 {
            let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
            db.insert_chat_message(from, to, &format!("m{i}"), None).unwrap();
        }

        let all = db.get_conversation(b, a, 50, None).unwrap();
        let texts: Vec<_> = all.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["m0", "m1", "m2", "m3", "m4"]);

        let page = db.get_conversation(a, b, 2, Some(all[3].id)).unwrap();
        let texts: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["m1", "m2"]);

        assert_eq!(db.mark_conversation_read(a, b).unwrap(), 2);
    }
}
