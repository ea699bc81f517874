use serde::{Deserialize, Serialize};

use crate::models::{Choice, Question};

/**
 * A question together with its choices, as served by the detail endpoints
 */
#[derive(Debug, Serialize)]
pub struct QuestionResponse {
    pub question: Question,
    pub choices: Vec<Choice>,
}

/**
 * The latest published questions, newest first
 */
#[derive(Debug, Serialize)]
pub struct QuestionList {
    pub questions: Vec<Question>,
}

/**
 * Results for a question: every choice with its tally
 */
#[derive(Debug, Serialize)]
pub struct Tally {
    pub question: Question,
    pub choices: Vec<Choice>,
    pub total_votes: i64,
}

/**
 * A submitted ballot
 *
 * `choice` stays optional so an empty form decodes rather than erroring,
 * letting the handler re-render the page with a message
 */
#[derive(Debug, Default, Deserialize)]
pub struct VoteForm {
    pub choice: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ballot_decodes_from_a_form_body() {
        let form: VoteForm = serde_qs::from_str("choice=3").expect("decode");
        assert_eq!(Some(3), form.choice);
    }

    #[test]
    fn empty_ballot_decodes_to_no_selection() {
        let form: VoteForm = serde_qs::from_str("").expect("decode");
        assert_eq!(None, form.choice);
    }
}
