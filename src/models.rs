use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use std::fmt;

/**
 * Upper bound on question and choice text, mirrored by a CHECK constraint in
 * the schema
 */
pub const MAX_TEXT_LEN: usize = 200;

/**
 * A poll question as stored in the `questions` table
 */
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Question {
    pub id: i32,
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
}

impl Question {
    /**
     * True when the question was published within the last day.
     *
     * Recomputed on every call, never stored.
     */
    pub fn was_published_recently(&self) -> bool {
        self.was_published_recently_at(Utc::now())
    }

    /**
     * Recency check against an explicit clock, both ends of the window
     * inclusive
     */
    pub fn was_published_recently_at(&self, now: DateTime<Utc>) -> bool {
        now - Duration::days(1) <= self.pub_date && self.pub_date <= now
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.question_text)
    }
}

/**
 * One selectable answer, belonging to exactly one question
 */
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Choice {
    pub id: i32,
    pub question_id: i32,
    pub choice_text: String,
    pub votes: i32,
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.choice_text)
    }
}

/**
 * Validate user-provided text against the schema limit, counting characters
 * rather than bytes
 */
pub fn text_within_limit(text: &str) -> bool {
    text.chars().count() <= MAX_TEXT_LEN
}
