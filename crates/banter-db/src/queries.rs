use crate::Database;
use crate::models::{ConversationRow, MessageRow, SessionRow, UserRow, now_timestamp};
use anyhow::Result;
use rusqlite::Connection;

/// What happened to an attempted user insert. Conflicts come back as values,
/// not errors, so callers can turn them into field-level responses.
#[derive(Debug, PartialEq, Eq)]
pub enum CreateUserOutcome {
    Created,
    UsernameTaken,
    EmailTaken,
}

impl Database {
    // -- Users --

    /// Checks uniqueness and inserts under one connection lock, so two
    /// concurrent registrations of the same name cannot both pass the check.
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<CreateUserOutcome> {
        self.with_conn_mut(|conn| {
            if query_user(conn, "username", username)?.is_some() {
                return Ok(CreateUserOutcome::UsernameTaken);
            }
            if query_user(conn, "email", email)?.is_some() {
                return Ok(CreateUserOutcome::EmailTaken);
            }

            conn.execute(
                "INSERT INTO users (id, username, email, password, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, username, email, password_hash, now_timestamp()],
            )?;
            Ok(CreateUserOutcome::Created)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    /// Partial profile update: absent fields keep their stored value.
    pub fn update_user_profile(
        &self,
        id: &str,
        name: Option<&str>,
        bio: Option<&str>,
        preferences: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users
                 SET name        = COALESCE(?2, name),
                     bio         = COALESCE(?3, bio),
                     preferences = COALESCE(?4, preferences)
                 WHERE id = ?1",
                rusqlite::params![id, name, bio, preferences],
            )?;
            Ok(())
        })
    }

    // -- Sessions --

    pub fn create_session(&self, token: &str, user_id: &str, expires_at: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO sessions (token, user_id, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![token, user_id, now_timestamp(), expires_at],
            )?;
            Ok(())
        })
    }

    /// Resolve a session token to its row, ignoring expired sessions.
    pub fn get_session(&self, token: &str) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT token, user_id, created_at, expires_at
                 FROM sessions
                 WHERE token = ?1 AND expires_at > ?2",
            )?;

            let row = stmt
                .query_row(rusqlite::params![token, now_timestamp()], |row| {
                    Ok(SessionRow {
                        token: row.get(0)?,
                        user_id: row.get(1)?,
                        created_at: row.get(2)?,
                        expires_at: row.get(3)?,
                    })
                })
                .optional()?;

            Ok(row)
        })
    }

    pub fn delete_session(&self, token: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("DELETE FROM sessions WHERE token = ?1", [token])?;
            Ok(())
        })
    }

    /// Lazy cleanup, invoked on login so the table cannot grow unbounded.
    pub fn purge_expired_sessions(&self) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let purged = conn.execute(
                "DELETE FROM sessions WHERE expires_at <= ?1",
                [now_timestamp()],
            )?;
            Ok(purged)
        })
    }

    // -- Conversations --

    pub fn create_conversation(&self, id: &str, user_id: &str, title: &str) -> Result<ConversationRow> {
        self.with_conn_mut(|conn| {
            let now = now_timestamp();
            conn.execute(
                "INSERT INTO conversations (id, user_id, title, created_at, updated_at, activity_seq)
                 VALUES (?1, ?2, ?3, ?4, ?4,
                         (SELECT IFNULL(MAX(activity_seq), 0) + 1 FROM conversations))",
                rusqlite::params![id, user_id, title, now],
            )?;
            Ok(ConversationRow {
                id: id.to_string(),
                user_id: user_id.to_string(),
                title: title.to_string(),
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    pub fn get_conversations(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            // activity_seq, not updated_at: a create and a bump landing in
            // the same millisecond must still list in activity order.
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, created_at, updated_at
                 FROM conversations
                 WHERE user_id = ?1
                 ORDER BY activity_seq DESC",
            )?;

            let rows = stmt
                .query_map([user_id], conversation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Ownership check is part of the lookup: a conversation owned by a
    /// different user resolves to `None`, indistinguishable from absent.
    pub fn get_conversation(&self, id: &str, user_id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, created_at, updated_at
                 FROM conversations
                 WHERE id = ?1 AND user_id = ?2",
            )?;

            let row = stmt
                .query_row(rusqlite::params![id, user_id], conversation_from_row)
                .optional()?;

            Ok(row)
        })
    }

    /// Deletes a conversation and all of its messages in one transaction.
    /// Returns false when the conversation does not exist or belongs to a
    /// different user; nothing is removed in that case.
    pub fn delete_conversation(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let owned: Option<String> = tx
                .query_row(
                    "SELECT id FROM conversations WHERE id = ?1 AND user_id = ?2",
                    rusqlite::params![id, user_id],
                    |row| row.get(0),
                )
                .optional()?;

            if owned.is_none() {
                return Ok(false);
            }

            tx.execute("DELETE FROM messages WHERE conversation_id = ?1", [id])?;
            tx.execute("DELETE FROM conversations WHERE id = ?1", [id])?;
            tx.commit()?;

            Ok(true)
        })
    }

    // -- Messages --

    pub fn get_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            // rowid tiebreak keeps same-instant inserts in call order
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, content, role, image_url, created_at
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;

            let rows = stmt
                .query_map([conversation_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Appending a message also bumps the parent conversation's `updated_at`,
    /// atomically.
    pub fn insert_message(
        &self,
        id: &str,
        conversation_id: &str,
        content: &str,
        role: &str,
        image_url: Option<&str>,
    ) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let now = now_timestamp();
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO messages (id, conversation_id, content, role, image_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, conversation_id, content, role, image_url, now],
            )?;
            tx.execute(
                "UPDATE conversations
                 SET updated_at = ?2,
                     activity_seq = (SELECT IFNULL(MAX(activity_seq), 0) + 1 FROM conversations)
                 WHERE id = ?1",
                rusqlite::params![conversation_id, now],
            )?;
            tx.commit()?;

            Ok(MessageRow {
                id: id.to_string(),
                conversation_id: conversation_id.to_string(),
                content: content.to_string(),
                role: role.to_string(),
                image_url: image_url.map(str::to_string),
                created_at: now,
            })
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is one of three fixed names, never caller input.
    let sql = format!(
        "SELECT id, username, email, password, name, bio, preferences, created_at
         FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                name: row.get(4)?,
                bio: row.get(5)?,
                preferences: row.get(6)?,
                created_at: row.get(7)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn conversation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        content: row.get(2)?,
        role: row.get(3)?,
        image_url: row.get(4)?,
        created_at: row.get(5)?,
    })
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
    use uuid::Uuid;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn seed_user(db: &Database, username: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let outcome = db
            .create_user(&id, username, &format!("{username}@example.com"), "hash")
            .unwrap();
        assert_eq!(outcome, CreateUserOutcome::Created);
        id
    }

    #[test]
    fn duplicate_username_reports_a_conflict() {
        let db = test_db();
        seed_user(&db, "alice");

        let outcome = db
            .create_user(
                &Uuid::new_v4().to_string(),
                "alice",
                "other@example.com",
                "hash",
            )
            .unwrap();
        assert_eq!(outcome, CreateUserOutcome::UsernameTaken);
        assert!(db.get_user_by_email("other@example.com").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_reports_a_conflict() {
        let db = test_db();
        seed_user(&db, "alice");

        let outcome = db
            .create_user(
                &Uuid::new_v4().to_string(),
                "bob",
                "alice@example.com",
                "hash",
            )
            .unwrap();
        assert_eq!(outcome, CreateUserOutcome::EmailTaken);
        assert!(db.get_user_by_username("bob").unwrap().is_none());
    }

    #[test]
    fn profile_update_keeps_absent_fields() {
        let db = test_db();
        let id = seed_user(&db, "alice");

        db.update_user_profile(&id, Some("Alice"), Some("hi"), None)
            .unwrap();
        db.update_user_profile(&id, None, Some("still me"), None)
            .unwrap();

        let user = db.get_user_by_id(&id).unwrap().unwrap();
        assert_eq!(user.name.as_deref(), Some("Alice"));
        assert_eq!(user.bio.as_deref(), Some("still me"));
        assert!(user.preferences.is_none());
    }

    #[test]
    fn conversation_lookup_enforces_ownership() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");

        let conv = db
            .create_conversation(&Uuid::new_v4().to_string(), &alice, "Hello")
            .unwrap();

        assert!(db.get_conversation(&conv.id, &alice).unwrap().is_some());
        assert!(db.get_conversation(&conv.id, &bob).unwrap().is_none());
        assert!(db.get_conversations(&bob).unwrap().is_empty());
    }

    #[test]
    fn conversations_order_by_most_recent_activity() {
        let db = test_db();
        let alice = seed_user(&db, "alice");

        let first = db
            .create_conversation(&Uuid::new_v4().to_string(), &alice, "first")
            .unwrap();
        let second = db
            .create_conversation(&Uuid::new_v4().to_string(), &alice, "second")
            .unwrap();

        let listed = db.get_conversations(&alice).unwrap();
        assert_eq!(listed[0].id, second.id);

        // Appending a message bumps the older conversation back to the top,
        // even when both rows carry the same millisecond timestamp.
        db.insert_message(&Uuid::new_v4().to_string(), &first.id, "hi", "user", None)
            .unwrap();
        let listed = db.get_conversations(&alice).unwrap();
        assert_eq!(listed[0].id, first.id);
        assert!(listed[0].updated_at >= listed[1].updated_at);

        db.insert_message(&Uuid::new_v4().to_string(), &second.id, "hey", "user", None)
            .unwrap();
        let listed = db.get_conversations(&alice).unwrap();
        assert_eq!(listed[0].id, second.id);
    }

    #[test]
    fn messages_keep_insertion_order() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        let conv = db
            .create_conversation(&Uuid::new_v4().to_string(), &alice, "Hello")
            .unwrap();

        for i in 0..5 {
            db.insert_message(
                &Uuid::new_v4().to_string(),
                &conv.id,
                &format!("msg {i}"),
                if i % 2 == 0 { "user" } else { "assistant" },
                None,
            )
            .unwrap();
        }

        let messages = db.get_messages(&conv.id).unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]);
    }

    #[test]
    fn delete_cascades_to_messages() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        let conv = db
            .create_conversation(&Uuid::new_v4().to_string(), &alice, "Hello")
            .unwrap();
        db.insert_message(&Uuid::new_v4().to_string(), &conv.id, "hi", "user", None)
            .unwrap();

        assert!(db.delete_conversation(&conv.id, &alice).unwrap());
        assert!(db.get_conversation(&conv.id, &alice).unwrap().is_none());
        assert!(db.get_messages(&conv.id).unwrap().is_empty());
    }

    #[test]
    fn delete_by_non_owner_removes_nothing() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let conv = db
            .create_conversation(&Uuid::new_v4().to_string(), &alice, "Hello")
            .unwrap();
        db.insert_message(&Uuid::new_v4().to_string(), &conv.id, "hi", "user", None)
            .unwrap();

        assert!(!db.delete_conversation(&conv.id, &bob).unwrap());
        assert!(db.get_conversation(&conv.id, &alice).unwrap().is_some());
        assert_eq!(db.get_messages(&conv.id).unwrap().len(), 1);
    }

    #[test]
    fn expired_sessions_resolve_to_none() {
        let db = test_db();
        let alice = seed_user(&db, "alice");

        db.create_session("live", &alice, "2999-01-01T00:00:00.000Z")
            .unwrap();
        db.create_session("dead", &alice, "2000-01-01T00:00:00.000Z")
            .unwrap();

        assert!(db.get_session("live").unwrap().is_some());
        assert!(db.get_session("dead").unwrap().is_none());

        assert_eq!(db.purge_expired_sessions().unwrap(), 1);
        db.delete_session("live").unwrap();
        assert!(db.get_session("live").unwrap().is_none());
    }
}
