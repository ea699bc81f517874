use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::models::Choice;

/**
 * Declarative description of how choices are edited inline within their
 * parent question's form
 */
pub struct ChoiceInline {
    /**
     * Number of blank rows offered below the existing choices
     */
    pub extra: usize,
}

/**
 * Presentation configuration for the question management pages.
 *
 * These values drive the generic list/form handlers; nothing here branches.
 */
pub struct QuestionAdmin {
    pub list_display: &'static [&'static str],
    pub list_filter: &'static [&'static str],
    pub search_fields: &'static [&'static str],
    pub list_per_page: u32,
    pub inline: ChoiceInline,
}

pub const QUESTION_ADMIN: QuestionAdmin = QuestionAdmin {
    list_display: &["question_text", "pub_date", "was_published_recently"],
    list_filter: &["pub_date"],
    search_fields: &["question_text"],
    list_per_page: 10,
    inline: ChoiceInline { extra: 3 },
};

/**
 * Query string accepted by the question list page
 */
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub q: Option<String>,
    pub pub_date: Option<String>,
}

/**
 * Form body for creating or updating a question, with its inline choice rows
 *
 * serde_qs decodes the bracketed field names the form template emits, e.g.
 * `choices[0][choice_text]`
 */
#[derive(Debug, Deserialize)]
pub struct QuestionForm {
    pub question_text: String,
    pub pub_date: String,
    #[serde(default)]
    pub choices: Vec<ChoiceRowForm>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChoiceRowForm {
    pub id: Option<i32>,
    #[serde(default)]
    pub choice_text: String,
    pub votes: Option<String>,
    /**
     * Checkboxes submit "on" when ticked and nothing otherwise
     */
    pub delete: Option<String>,
}

impl ChoiceRowForm {
    /**
     * An untouched extra slot: no row behind it and no text entered
     */
    pub fn is_blank(&self) -> bool {
        self.id.is_none() && self.choice_text.trim().is_empty()
    }

    pub fn delete_ticked(&self) -> bool {
        self.delete.is_some()
    }
}

/**
 * Treat blank filter input the same as an absent parameter
 */
pub fn normalized(param: Option<String>) -> Option<String> {
    param.and_then(|value| {
        let value = value.trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

/**
 * Half-open [start, end) bounds of the given `YYYY-MM-DD` day in UTC, used by
 * the publish date filter
 */
pub fn day_bounds(day: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let date = NaiveDate::parse_from_str(day.trim(), "%Y-%m-%d").ok()?;
    let start = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
    Some((start, start + Duration::days(1)))
}

/**
 * Parse the publish date field, accepting RFC 3339 as well as the formats an
 * html datetime-local input submits
 */
pub fn parse_pub_date(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/**
 * Escape LIKE wildcards in a search term so it matches literally
 */
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if c == '\\' || c == '%' || c == '_' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/**
 * Parse the vote counter from an inline row. Blank means zero; negative or
 * garbage input is rejected.
 */
pub fn parse_votes(input: Option<&str>) -> Option<i32> {
    match input {
        None => Some(0),
        Some(raw) => {
            let raw = raw.trim();
            if raw.is_empty() {
                Some(0)
            } else {
                raw.parse::<i32>().ok().filter(|votes| *votes >= 0)
            }
        }
    }
}

pub fn page_count(total: i64, per_page: u32) -> u32 {
    if total <= 0 {
        1
    } else {
        ((total as u64 + u64::from(per_page) - 1) / u64::from(per_page)) as u32
    }
}

pub fn page_offset(page: u32, per_page: u32) -> i64 {
    i64::from(page.max(1) - 1) * i64::from(per_page)
}

/**
 * Template rows for the inline choice editor: every existing choice followed
 * by the configured number of blank slots, with continuous indices so the
 * submitted field names stay unambiguous
 */
pub fn inline_rows(choices: &[Choice], inline: &ChoiceInline) -> Vec<serde_json::Value> {
    let mut rows = Vec::with_capacity(choices.len() + inline.extra);
    for (index, choice) in choices.iter().enumerate() {
        rows.push(json!({
            "index": index,
            "id": choice.id,
            "choice_text": choice.choice_text,
            "votes": choice.votes,
            "existing": true,
        }));
    }
    for offset in 0..inline.extra {
        rows.push(json!({
            "index": choices.len() + offset,
            "existing": false,
        }));
    }
    rows
}
