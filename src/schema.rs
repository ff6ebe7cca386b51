//! Database schema definitions
//!
//! Constants for the table and column names used with rusqlite in the
//! persistent dedup tier.

/// Seen-posts table schema
pub mod seen_posts {
    /// Table name
    pub const TABLE: &str = "seen_posts";
    /// Submission identifier column (primary key)
    pub const POST_ID: &str = "post_id";
    /// Timestamp the identifier was first recorded
    pub const FIRST_SEEN_UTC: &str = "first_seen_utc";
}
