/*!
 * Database-level tests for the polls schema.
 *
 * These need a scratch PostgreSQL reachable via DATABASE_URL and are ignored
 * by default; run them with `cargo test -- --ignored`.
 */

use chrono::{Duration, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

async fn test_pool() -> PgPool {
    dotenv::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("failed to connect");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to migrate");
    pool
}

/**
 * Insert a question published `days` away from now and return its id
 */
async fn create_question(pool: &PgPool, text: &str, days: i64) -> i32 {
    let pub_date = Utc::now() + Duration::days(days);
    sqlx::query("INSERT INTO questions (question_text, pub_date) VALUES ($1, $2) RETURNING id")
        .bind(text)
        .bind(pub_date)
        .map(|row: PgRow| row.get("id"))
        .fetch_one(pool)
        .await
        .expect("failed to insert question")
}

async fn create_choice(pool: &PgPool, question_id: i32, text: &str) -> i32 {
    sqlx::query("INSERT INTO choices (question_id, choice_text) VALUES ($1, $2) RETURNING id")
        .bind(question_id)
        .bind(text)
        .map(|row: PgRow| row.get("id"))
        .fetch_one(pool)
        .await
        .expect("failed to insert choice")
}

async fn choice_count(pool: &PgPool, question_id: i32) -> i64 {
    sqlx::query("SELECT COUNT(*) AS total FROM choices WHERE question_id = $1")
        .bind(question_id)
        .map(|row: PgRow| row.get("total"))
        .fetch_one(pool)
        .await
        .expect("failed to count choices")
}

async fn delete_question(pool: &PgPool, question_id: i32) {
    sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(question_id)
        .execute(pool)
        .await
        .expect("failed to delete question");
}

#[async_std::test]
#[ignore]
async fn question_without_choices_has_an_empty_choice_set() {
    let pool = test_pool().await;
    let question_id = create_question(&pool, "I have no choices", 0).await;

    assert_eq!(0, choice_count(&pool, question_id).await);

    delete_question(&pool, question_id).await;
}

#[async_std::test]
#[ignore]
async fn question_reports_exactly_its_choices() {
    let pool = test_pool().await;
    let question_id = create_question(&pool, "I have several choice", 0).await;

    create_choice(&pool, question_id, "I am a choice!").await;
    create_choice(&pool, question_id, "and another choice!").await;
    create_choice(&pool, question_id, "and a final choice!").await;

    assert_eq!(3, choice_count(&pool, question_id).await);

    delete_question(&pool, question_id).await;
}

#[async_std::test]
#[ignore]
async fn deleting_a_question_cascades_to_its_choices() {
    let pool = test_pool().await;
    let question_id = create_question(&pool, "Doomed question", 0).await;
    let choice_id = create_choice(&pool, question_id, "doomed choice").await;

    delete_question(&pool, question_id).await;

    let orphans: i64 = sqlx::query("SELECT COUNT(*) AS total FROM choices WHERE id = $1")
        .bind(choice_id)
        .map(|row: PgRow| row.get("total"))
        .fetch_one(&pool)
        .await
        .expect("failed to count");
    assert_eq!(0, orphans);
}

#[async_std::test]
#[ignore]
async fn votes_default_to_zero_and_increment_by_one() {
    let pool = test_pool().await;
    let question_id = create_question(&pool, "Vote on me", 0).await;
    let choice_id = create_choice(&pool, question_id, "the only option").await;

    let votes: i32 = sqlx::query("SELECT votes FROM choices WHERE id = $1")
        .bind(choice_id)
        .map(|row: PgRow| row.get("votes"))
        .fetch_one(&pool)
        .await
        .expect("failed to fetch votes");
    assert_eq!(0, votes);

    // the same statement the vote handler runs
    sqlx::query("UPDATE choices SET votes = votes + 1 WHERE id = $1 AND question_id = $2")
        .bind(choice_id)
        .bind(question_id)
        .execute(&pool)
        .await
        .expect("failed to vote");

    let votes: i32 = sqlx::query("SELECT votes FROM choices WHERE id = $1")
        .bind(choice_id)
        .map(|row: PgRow| row.get("votes"))
        .fetch_one(&pool)
        .await
        .expect("failed to fetch votes");
    assert_eq!(1, votes);

    delete_question(&pool, question_id).await;
}

#[async_std::test]
#[ignore]
async fn future_questions_are_not_published() {
    let pool = test_pool().await;
    let future_id = create_question(&pool, "Future question.", 30).await;
    let past_id = create_question(&pool, "Past question.", -30).await;

    // the visibility predicate every public-site query applies
    let visible: i64 =
        sqlx::query("SELECT COUNT(*) AS total FROM questions WHERE id = $1 AND pub_date <= NOW()")
            .bind(future_id)
            .map(|row: PgRow| row.get("total"))
            .fetch_one(&pool)
            .await
            .expect("failed to count");
    assert_eq!(0, visible);

    let visible: i64 =
        sqlx::query("SELECT COUNT(*) AS total FROM questions WHERE id = $1 AND pub_date <= NOW()")
            .bind(past_id)
            .map(|row: PgRow| row.get("total"))
            .fetch_one(&pool)
            .await
            .expect("failed to count");
    assert_eq!(1, visible);

    delete_question(&pool, future_id).await;
    delete_question(&pool, past_id).await;
}

#[async_std::test]
#[ignore]
async fn index_lists_the_latest_five_newest_first() {
    let pool = test_pool().await;
    // work inside an uncommitted transaction so the global LIMIT sees only
    // these fixtures and the database is left untouched
    let mut tx = pool.begin().await.expect("failed to begin");
    sqlx::query("DELETE FROM questions")
        .execute(&mut tx)
        .await
        .expect("failed to clear");

    for days in &[-30i64, -20, -10, -5, -2, -1] {
        sqlx::query("INSERT INTO questions (question_text, pub_date) VALUES ($1, $2)")
            .bind(format!("Question from {} days ago", -days))
            .bind(Utc::now() + Duration::days(*days))
            .execute(&mut tx)
            .await
            .expect("failed to insert question");
    }
    // newest of all, but not published yet
    sqlx::query("INSERT INTO questions (question_text, pub_date) VALUES ($1, $2)")
        .bind("Future question.")
        .bind(Utc::now() + Duration::days(1))
        .execute(&mut tx)
        .await
        .expect("failed to insert question");

    // the index page query
    let texts: Vec<String> = sqlx::query(
        "SELECT question_text FROM questions \
         WHERE pub_date <= NOW() ORDER BY pub_date DESC LIMIT 5",
    )
    .map(|row: PgRow| row.get("question_text"))
    .fetch_all(&mut tx)
    .await
    .expect("failed to query");

    // newest first, the future question hidden, the oldest one off the page
    assert_eq!(
        vec![
            "Question from 1 days ago".to_string(),
            "Question from 2 days ago".to_string(),
            "Question from 5 days ago".to_string(),
            "Question from 10 days ago".to_string(),
            "Question from 20 days ago".to_string(),
        ],
        texts
    );

    tx.rollback().await.expect("failed to roll back");
}

#[async_std::test]
#[ignore]
async fn detail_lookup_misses_future_questions() {
    let pool = test_pool().await;
    let future_id = create_question(&pool, "Future question.", 5).await;
    let past_id = create_question(&pool, "Past question.", -5).await;

    // the same lookup the detail and results pages run
    let hidden: Option<i32> =
        sqlx::query("SELECT id FROM questions WHERE id = $1 AND pub_date <= NOW()")
            .bind(future_id)
            .map(|row: PgRow| row.get("id"))
            .fetch_optional(&pool)
            .await
            .expect("failed to query");
    assert_eq!(None, hidden);

    let visible: Option<i32> =
        sqlx::query("SELECT id FROM questions WHERE id = $1 AND pub_date <= NOW()")
            .bind(past_id)
            .map(|row: PgRow| row.get("id"))
            .fetch_optional(&pool)
            .await
            .expect("failed to query");
    assert_eq!(Some(past_id), visible);

    delete_question(&pool, future_id).await;
    delete_question(&pool, past_id).await;
}

#[async_std::test]
#[ignore]
async fn oversized_text_is_rejected_by_the_schema() {
    let pool = test_pool().await;

    let result = sqlx::query("INSERT INTO questions (question_text, pub_date) VALUES ($1, NOW())")
        .bind("x".repeat(201))
        .execute(&pool)
        .await;
    assert!(result.is_err());
}
