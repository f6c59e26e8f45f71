use crate::{
    record::{SessionRecord, ThreadRecord, UserRecord, to_primitive},
    tree,
};
use sqlx::{PgPool, query, query_as, query_scalar};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use threadbare_common::{
    model::{
        Id, ModelValidationError,
        session::{Session, SessionHash},
        thread::{CommunityMarker, Feed, Thread, ThreadMarker, ThreadText},
        user::{
            AuthId, AuthorProfile, ProfileUpdate, SortOrder, User, UserMarker, UserSearch,
            UserThreads,
        },
    },
    page::{Page, feed_has_next, search_has_next},
    snowflake::{NodeId, Snowflake, SnowflakeGenerator, TimestampError},
};

pub type Result<T, E = DbError> = std::result::Result<T, E>;

/// How deep `fetch_thread` populates for the thread detail view: the root's
/// children and grandchildren. Anything deeper is fetched through the
/// child's own id.
pub const THREAD_VIEW_DEPTH: u8 = 2;

/// Errors leaving the store carry the operation they belong to, so callers
/// see "Failed to fetch thread by id: ..." instead of a bare driver error.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Could not generate an id: {0}")]
    Id(#[from] TimestampError),
    #[error("Error updating user data: The username is already taken")]
    UsernameTaken,
    #[error("{context}: {source}")]
    Query {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

fn context(context: &'static str) -> impl FnOnce(sqlx::Error) -> DbError {
    move |source| DbError::Query { context, source }
}

/// Usernames are unique per profile; a collision is the caller's mistake, not
/// a server fault, and gets its own variant.
fn upsert_error(source: sqlx::Error) -> DbError {
    if let sqlx::Error::Database(db_error) = &source
        && db_error.is_unique_violation()
        && db_error.constraint() == Some("users_username_key")
    {
        return DbError::UsernameTaken;
    }
    DbError::Query {
        context: "Error updating user data",
        source,
    }
}

const THREAD_COLUMNS: &str = "
    threads.thread_snowflake,
    threads.text,
    threads.parent_snowflake,
    threads.community_snowflake,
    threads.created_at,
    users.user_snowflake AS author_snowflake,
    users.auth_id AS author_auth_id,
    users.name AS author_name,
    users.image AS author_image
";

const USER_COLUMNS: &str = "
    users.user_snowflake,
    users.auth_id,
    users.username,
    users.name,
    users.bio,
    users.image,
    users.onboarded,
    users.created_at
";

pub struct DbClient {
    pool: PgPool,
    ids: Mutex<SnowflakeGenerator>,
}

impl std::fmt::Debug for DbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbClient").finish_non_exhaustive()
    }
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, node_id: NodeId) -> Self {
        Self {
            pool,
            ids: Mutex::new(SnowflakeGenerator::new(node_id)),
        }
    }

    fn generate_id(&self) -> Result<Snowflake> {
        let snowflake = self
            .ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()?;
        Ok(snowflake)
    }

    // ---- users ----------------------------------------------------------

    pub async fn fetch_user(&self, auth_id: &AuthId) -> Result<Option<User>> {
        let statement = format!(
            "SELECT {USER_COLUMNS} FROM users.users WHERE users.auth_id = $1"
        );

        let record = query_as::<_, UserRecord>(&statement)
            .bind(auth_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(context("Failed to fetch user"))?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    /// Creates or updates the profile behind an external identity. The write
    /// always marks the profile onboarded; that is what onboarding is.
    pub async fn upsert_user(&self, auth_id: &AuthId, profile: &ProfileUpdate) -> Result<User> {
        let statement = format!(
            "
            UPDATE users.users SET
                username = $2,
                name = $3,
                bio = $4,
                image = $5,
                onboarded = TRUE
            WHERE users.auth_id = $1
            RETURNING {USER_COLUMNS}
            "
        );

        let updated = query_as::<_, UserRecord>(&statement)
            .bind(auth_id.get())
            .bind(profile.username.get())
            .bind(&profile.name)
            .bind(&profile.bio)
            .bind(&profile.image)
            .fetch_optional(&self.pool)
            .await
            .map_err(upsert_error)?;

        if let Some(record) = updated {
            return Ok(User::try_from(record)?);
        }

        // No profile existed, so an id is spent now. A concurrent first write
        // for the same auth id resolves through the conflict clause.
        let snowflake = self.generate_id()?;
        let statement = format!(
            "
            INSERT INTO users.users
                (user_snowflake, auth_id, username, name, bio, image, onboarded, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7)
            ON CONFLICT (auth_id) DO UPDATE SET
                username = EXCLUDED.username,
                name = EXCLUDED.name,
                bio = EXCLUDED.bio,
                image = EXCLUDED.image,
                onboarded = TRUE
            RETURNING {USER_COLUMNS}
            "
        );

        let record = query_as::<_, UserRecord>(&statement)
            .bind(snowflake.get().cast_signed())
            .bind(auth_id.get())
            .bind(profile.username.get())
            .bind(&profile.name)
            .bind(&profile.bio)
            .bind(&profile.image)
            .bind(to_primitive(snowflake.created_at()))
            .fetch_one(&self.pool)
            .await
            .map_err(upsert_error)?;

        Ok(User::try_from(record)?)
    }

    pub async fn search_users(
        &self,
        requester: &AuthId,
        search: &str,
        page: Page,
        sort: SortOrder,
    ) -> Result<UserSearch> {
        // An empty search becomes the match-everything pattern, which keeps
        // one statement for both the filtered and unfiltered case.
        let pattern = format!("%{}%", escape_like(search.trim()));
        let order = match sort {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };

        let statement = format!(
            "
            SELECT {USER_COLUMNS}
            FROM users.users
            WHERE users.auth_id <> $1
                AND (users.username ILIKE $2 OR users.name ILIKE $2)
            ORDER BY users.created_at {order}, users.user_snowflake {order}
            OFFSET $3 LIMIT $4
            "
        );

        let records = query_as::<_, UserRecord>(&statement)
            .bind(requester.get())
            .bind(&pattern)
            .bind(page.offset().cast_signed())
            .bind(page.limit().cast_signed())
            .fetch_all(&self.pool)
            .await
            .map_err(context("Failed to search users"))?;

        let total = query_scalar::<_, i64>(
            "
            SELECT COUNT(*)
            FROM users.users
            WHERE users.auth_id <> $1
                AND (users.username ILIKE $2 OR users.name ILIKE $2)
            ",
        )
        .bind(requester.get())
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await
        .map_err(context("Failed to search users"))?;

        let users = records
            .into_iter()
            .map(User::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let has_next = search_has_next(total.cast_unsigned(), page.offset(), users.len());
        Ok(UserSearch { users, has_next })
    }

    // ---- threads --------------------------------------------------------

    /// Persists a new top-level thread. The author link lives on the thread
    /// row itself, so the write is a single atomic insert. The community
    /// reference is reserved: whatever the caller passes, the thread is
    /// stored without one.
    pub async fn create_thread(
        &self,
        author: &User,
        text: &ThreadText,
        _community: Option<Id<CommunityMarker>>,
    ) -> Result<Thread> {
        let snowflake = self.generate_id()?;
        let created_at = snowflake.created_at();

        query(
            "
            INSERT INTO threads.threads
                (thread_snowflake, text, author_snowflake, parent_snowflake,
                 community_snowflake, created_at)
            VALUES ($1, $2, $3, NULL, NULL, $4)
            ",
        )
        .bind(snowflake.get().cast_signed())
        .bind(text.get())
        .bind(author.id.snowflake().get().cast_signed())
        .bind(to_primitive(created_at))
        .execute(&self.pool)
        .await
        .map_err(context("Error creating thread"))?;

        Ok(Thread {
            id: snowflake.into(),
            text: text.clone(),
            author: AuthorProfile::from(author),
            parent: None,
            community: None,
            created_at,
            children: Vec::new(),
        })
    }

    /// Appends a reply under `parent`. Returns `None` when the parent does
    /// not resolve. The parent link and the reply are one row, so two
    /// concurrent comments on the same parent cannot lose each other.
    pub async fn add_comment(
        &self,
        parent: Id<ThreadMarker>,
        author: &User,
        text: &ThreadText,
    ) -> Result<Option<Thread>> {
        let parent_exists = query_scalar::<_, i64>(
            "SELECT thread_snowflake FROM threads.threads WHERE thread_snowflake = $1",
        )
        .bind(parent.snowflake().get().cast_signed())
        .fetch_optional(&self.pool)
        .await
        .map_err(context("Failed to add comment to thread"))?;

        if parent_exists.is_none() {
            return Ok(None);
        }

        let snowflake = self.generate_id()?;
        let created_at = snowflake.created_at();

        query(
            "
            INSERT INTO threads.threads
                (thread_snowflake, text, author_snowflake, parent_snowflake,
                 community_snowflake, created_at)
            VALUES ($1, $2, $3, $4, NULL, $5)
            ",
        )
        .bind(snowflake.get().cast_signed())
        .bind(text.get())
        .bind(author.id.snowflake().get().cast_signed())
        .bind(parent.snowflake().get().cast_signed())
        .bind(to_primitive(created_at))
        .execute(&self.pool)
        .await
        .map_err(context("Failed to add comment to thread"))?;

        Ok(Some(Thread {
            id: snowflake.into(),
            text: text.clone(),
            author: AuthorProfile::from(author),
            parent: Some(parent),
            community: None,
            created_at,
            children: Vec::new(),
        }))
    }

    /// Resolves a thread and populates its reply tree `depth` levels down,
    /// one query per level. Depth 0 is just the thread itself.
    pub async fn fetch_thread(
        &self,
        id: Id<ThreadMarker>,
        depth: u8,
    ) -> Result<Option<Thread>> {
        let statement = format!(
            "
            SELECT {THREAD_COLUMNS}
            FROM threads.threads
                JOIN users.users ON users.user_snowflake = threads.author_snowflake
            WHERE threads.thread_snowflake = $1
            "
        );

        let Some(record) = query_as::<_, ThreadRecord>(&statement)
            .bind(id.snowflake().get().cast_signed())
            .fetch_optional(&self.pool)
            .await
            .map_err(context("Failed to fetch thread by id"))?
        else {
            return Ok(None);
        };

        let root = Thread::try_from(record)?;

        let mut replies = Vec::new();
        let mut frontier = vec![root.id.snowflake().get().cast_signed()];
        for _ in 0..depth {
            if frontier.is_empty() {
                break;
            }
            let level = self
                .replies_of(&frontier, "Failed to fetch thread by id")
                .await?;
            frontier = level
                .iter()
                .map(|reply| reply.id.snowflake().get().cast_signed())
                .collect();
            replies.extend(level);
        }

        let mut roots = vec![root];
        tree::attach_replies(&mut roots, replies);
        Ok(roots.pop())
    }

    /// One page of the top-level feed, newest first, each post's replies
    /// populated one level deep.
    pub async fn fetch_feed(&self, page: Page) -> Result<Feed> {
        let statement = format!(
            "
            SELECT {THREAD_COLUMNS}
            FROM threads.threads
                JOIN users.users ON users.user_snowflake = threads.author_snowflake
            WHERE threads.parent_snowflake IS NULL
            ORDER BY threads.created_at DESC, threads.thread_snowflake DESC
            OFFSET $1 LIMIT $2
            "
        );

        let records = query_as::<_, ThreadRecord>(&statement)
            .bind(page.offset().cast_signed())
            .bind(page.limit().cast_signed())
            .fetch_all(&self.pool)
            .await
            .map_err(context("Failed to fetch posts"))?;

        let total = query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM threads.threads WHERE parent_snowflake IS NULL",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(context("Failed to fetch posts"))?;

        let mut posts = threads_from(records)?;
        self.populate_one_level(&mut posts, "Failed to fetch posts")
            .await?;

        Ok(Feed {
            posts,
            has_next: feed_has_next(total.cast_unsigned(), page.offset()),
        })
    }

    /// A user's profile together with every thread they authored, in
    /// insertion order, replies populated one level deep. Keyed by the
    /// external auth id.
    pub async fn fetch_user_threads(&self, auth_id: &AuthId) -> Result<Option<UserThreads>> {
        let Some(user) = self.fetch_user(auth_id).await? else {
            return Ok(None);
        };

        let statement = format!(
            "
            SELECT {THREAD_COLUMNS}
            FROM threads.threads
                JOIN users.users ON users.user_snowflake = threads.author_snowflake
            WHERE threads.author_snowflake = $1
            ORDER BY threads.thread_snowflake
            "
        );

        let records = query_as::<_, ThreadRecord>(&statement)
            .bind(user.id.snowflake().get().cast_signed())
            .fetch_all(&self.pool)
            .await
            .map_err(context("Failed to fetch user posts"))?;

        let mut threads = threads_from(records)?;
        self.populate_one_level(&mut threads, "Failed to fetch user posts")
            .await?;

        Ok(Some(UserThreads { user, threads }))
    }

    /// Replies other users left under this user's threads: the activity
    /// feed. Self-replies are excluded; order follows the replies' ids.
    pub async fn fetch_activity(&self, author: Id<UserMarker>) -> Result<Vec<Thread>> {
        let statement = format!(
            "
            SELECT {REPLY_COLUMNS}
            FROM threads.threads AS replies
                JOIN threads.threads AS parents
                    ON parents.thread_snowflake = replies.parent_snowflake
                JOIN users.users ON users.user_snowflake = replies.author_snowflake
            WHERE parents.author_snowflake = $1
                AND replies.author_snowflake <> $1
            ORDER BY replies.thread_snowflake
            "
        );

        let records = query_as::<_, ThreadRecord>(&statement)
            .bind(author.snowflake().get().cast_signed())
            .fetch_all(&self.pool)
            .await
            .map_err(context("Failed to fetch activity"))?;

        threads_from(records)
    }

    // ---- sessions -------------------------------------------------------

    pub async fn create_session(&self, session: &Session) -> Result<()> {
        query(
            "
            INSERT INTO users.sessions (token_hash, auth_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(&session.token_hash.0[..])
        .bind(session.auth_id.get())
        .bind(to_primitive(session.created_at))
        .bind(session.expires_at.map(to_primitive))
        .execute(&self.pool)
        .await
        .map_err(context("Failed to create session"))?;

        Ok(())
    }

    pub async fn fetch_session(&self, token_hash: &SessionHash) -> Result<Option<Session>> {
        let record = query_as::<_, SessionRecord>(
            "
            SELECT auth_id, token_hash, created_at, expires_at
            FROM users.sessions
            WHERE token_hash = $1
            ",
        )
        .bind(&token_hash.0[..])
        .fetch_optional(&self.pool)
        .await
        .map_err(context("Failed to fetch session"))?;

        let session = record.map(Session::try_from).transpose()?;
        Ok(session)
    }

    pub async fn delete_session(&self, token_hash: &SessionHash) -> Result<()> {
        query("DELETE FROM users.sessions WHERE token_hash = $1")
            .bind(&token_hash.0[..])
            .execute(&self.pool)
            .await
            .map_err(context("Failed to revoke session"))?;

        Ok(())
    }

    // ---- population helpers ---------------------------------------------

    /// Fetches the direct replies of every id in `parents`, ordered by id so
    /// insertion order is preserved.
    async fn replies_of(&self, parents: &[i64], ctx: &'static str) -> Result<Vec<Thread>> {
        let statement = format!(
            "
            SELECT {THREAD_COLUMNS}
            FROM threads.threads
                JOIN users.users ON users.user_snowflake = threads.author_snowflake
            WHERE threads.parent_snowflake = ANY($1)
            ORDER BY threads.thread_snowflake
            "
        );

        let records = query_as::<_, ThreadRecord>(&statement)
            .bind(parents)
            .fetch_all(&self.pool)
            .await
            .map_err(context(ctx))?;

        threads_from(records)
    }

    async fn populate_one_level(&self, roots: &mut [Thread], ctx: &'static str) -> Result<()> {
        if roots.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = roots
            .iter()
            .map(|thread| thread.id.snowflake().get().cast_signed())
            .collect();
        let replies = self.replies_of(&ids, ctx).await?;
        tree::attach_replies(roots, replies);
        Ok(())
    }
}

/// Same column list as [`THREAD_COLUMNS`], read from the `replies` alias.
const REPLY_COLUMNS: &str = "
    replies.thread_snowflake,
    replies.text,
    replies.parent_snowflake,
    replies.community_snowflake,
    replies.created_at,
    users.user_snowflake AS author_snowflake,
    users.auth_id AS author_auth_id,
    users.name AS author_name,
    users.image AS author_image
";

fn threads_from(records: Vec<ThreadRecord>) -> Result<Vec<Thread>> {
    records
        .into_iter()
        .map(|record| Thread::try_from(record).map_err(DbError::from))
        .collect()
}

/// Escapes the characters `ILIKE` treats specially, so a search string is
/// always matched literally.
fn escape_like(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len());
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::{DbClient, DbError, escape_like};
    use sqlx::PgPool;
    use threadbare_common::{
        model::{
            thread::ThreadText,
            user::{ProfileUpdate, SortOrder, User, Username},
        },
        page::Page,
        snowflake::NodeId,
    };

    #[test]
    fn escape_like_passes_plain_text_through() {
        assert_eq!(escape_like("ada lovelace"), "ada lovelace");
        assert_eq!(escape_like(""), "");
    }

    #[test]
    fn escape_like_neutralizes_wildcards() {
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
    }

    fn client(pool: PgPool) -> DbClient {
        DbClient::new(pool, NodeId::new(0).unwrap())
    }

    async fn onboard(db: &DbClient, handle: &str) -> User {
        let profile = ProfileUpdate {
            username: Username::new(handle.to_owned()).unwrap(),
            name: handle.to_owned(),
            bio: String::new(),
            image: String::new(),
        };
        db.upsert_user(&handle.parse().unwrap(), &profile)
            .await
            .unwrap()
    }

    fn text(text: &str) -> ThreadText {
        ThreadText::new(text.to_owned()).unwrap()
    }

    #[sqlx::test]
    async fn feed_contains_only_top_level_posts(pool: PgPool) {
        let db = client(pool);
        let ada = onboard(&db, "ada").await;
        let grace = onboard(&db, "grace").await;

        let post = db.create_thread(&ada, &text("first post"), None).await.unwrap();
        let reply = db
            .add_comment(post.id, &grace, &text("a reply"))
            .await
            .unwrap()
            .unwrap();

        let feed = db.fetch_feed(Page::default()).await.unwrap();

        assert!(feed.posts.iter().all(|thread| thread.parent.is_none()));
        assert_eq!(feed.posts.len(), 1);
        assert_eq!(feed.posts[0].id, post.id);
        assert_eq!(feed.posts[0].children.len(), 1);
        assert_eq!(feed.posts[0].children[0].id, reply.id);
        // The feed check only compares the total against the offset, so even
        // a single post on page 1 reports a next page.
        assert!(feed.has_next);
    }

    #[sqlx::test]
    async fn search_never_includes_the_requester(pool: PgPool) {
        let db = client(pool);
        let ada = onboard(&db, "ada").await;
        let grace = onboard(&db, "grace").await;

        let everyone = db
            .search_users(&ada.auth_id, "", Page::default(), SortOrder::default())
            .await
            .unwrap();
        assert_eq!(everyone.users.len(), 1);
        assert_eq!(everyone.users[0].auth_id, grace.auth_id);

        // Searching for your own username still comes back empty.
        let own_name = db
            .search_users(&ada.auth_id, "ada", Page::default(), SortOrder::default())
            .await
            .unwrap();
        assert!(own_name.users.is_empty());
        assert!(!own_name.has_next);
    }

    #[sqlx::test]
    async fn activity_is_replies_from_other_users(pool: PgPool) {
        let db = client(pool);
        let ada = onboard(&db, "ada").await;
        let grace = onboard(&db, "grace").await;

        let post = db.create_thread(&ada, &text("hello world"), None).await.unwrap();
        let from_grace = db
            .add_comment(post.id, &grace, &text("hi from grace"))
            .await
            .unwrap()
            .unwrap();
        db.add_comment(post.id, &ada, &text("replying to myself"))
            .await
            .unwrap()
            .unwrap();

        let activity = db.fetch_activity(ada.id).await.unwrap();
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].id, from_grace.id);
        assert_eq!(activity[0].author.auth_id, grace.auth_id);

        // The commenter got no replies, so their activity stays empty.
        let quiet = db.fetch_activity(grace.id).await.unwrap();
        assert!(quiet.is_empty());
    }

    #[sqlx::test]
    async fn upsert_updates_in_place_keeping_the_id(pool: PgPool) {
        let db = client(pool);
        let first = onboard(&db, "ada").await;

        let profile = ProfileUpdate {
            username: Username::new("ada".to_owned()).unwrap(),
            name: "Ada Lovelace".to_owned(),
            bio: "analyst".to_owned(),
            image: String::new(),
        };
        let second = db.upsert_user(&first.auth_id, &profile).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "Ada Lovelace");
        assert!(second.onboarded);

        let fetched = db.fetch_user(&first.auth_id).await.unwrap().unwrap();
        assert_eq!(fetched, second);
    }

    #[sqlx::test]
    async fn upsert_rejects_a_taken_username(pool: PgPool) {
        let db = client(pool);
        onboard(&db, "ada").await;
        let grace = onboard(&db, "grace").await;

        let profile = ProfileUpdate {
            username: Username::new("ada".to_owned()).unwrap(),
            name: "Grace Hopper".to_owned(),
            bio: String::new(),
            image: String::new(),
        };
        let result = db.upsert_user(&grace.auth_id, &profile).await;

        assert!(matches!(result, Err(DbError::UsernameTaken)));
    }
}
