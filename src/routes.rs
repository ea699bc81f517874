use log::*;
use sqlx::postgres::PgPool;
use tide::http::mime;
use tide::{Redirect, Request, Response, StatusCode};

use crate::models::{Choice, Question};
use crate::AppState;

/**
 *  GET /
 */
pub async fn root(_req: Request<AppState>) -> tide::Result {
    Ok(Redirect::see_other("/polls").into())
}

/**
 * Render the named template with the given context as an HTML response
 */
fn render(state: &AppState, name: &str, context: &serde_json::Value) -> tide::Result {
    let body = state.templates.render(name, context)?;
    Ok(Response::builder(StatusCode::Ok)
        .content_type(mime::HTML)
        .body(body)
        .build())
}

/**
 * Minimal 404 page; `what` may carry user input so it gets escaped
 */
fn not_found(what: &str) -> Response {
    let body = format!(
        "<h1>Not Found</h1>\n<p>{}</p>",
        html_escape::encode_text(what)
    );
    Response::builder(StatusCode::NotFound)
        .content_type(mime::HTML)
        .body(body)
        .build()
}

/**
 * Pull the `:id` route parameter out of the request
 */
fn question_id(req: &Request<AppState>) -> Result<i32, tide::Error> {
    req.param::<i32>("id")
        .map_err(|_| tide::Error::from_str(StatusCode::BadRequest, "Invalid question id"))
}

/**
 * Decode a urlencoded form body, including the bracketed names the admin
 * templates emit
 */
async fn form_body<T: serde::de::DeserializeOwned>(req: &mut Request<AppState>) -> tide::Result<T> {
    let bytes = req.body_bytes().await?;
    serde_qs::from_bytes(&bytes).map_err(|err| {
        warn!("Unparseable form body: {:?}", err);
        tide::Error::from_str(StatusCode::BadRequest, "Invalid form submission")
    })
}

/**
 * Look up a question that is visible to the public site, i.e. not published
 * in the future
 */
async fn published_question(db: &PgPool, id: i32) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(
        "SELECT id, question_text, pub_date FROM questions WHERE id = $1 AND pub_date <= NOW()",
    )
    .bind(id)
    .fetch_optional(db)
    .await
}

async fn question_choices(db: &PgPool, question_id: i32) -> Result<Vec<Choice>, sqlx::Error> {
    sqlx::query_as::<_, Choice>(
        "SELECT id, question_id, choice_text, votes FROM choices \
         WHERE question_id = $1 ORDER BY id ASC",
    )
    .bind(question_id)
    .fetch_all(db)
    .await
}

/**
 * The five most recently published questions, excluding anything dated in
 * the future
 */
async fn latest_questions(db: &PgPool) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(
        "SELECT id, question_text, pub_date FROM questions \
         WHERE pub_date <= NOW() ORDER BY pub_date DESC LIMIT 5",
    )
    .fetch_all(db)
    .await
}

/**
 * The html pages of the public site
 */
pub mod pages {
    use log::*;
    use serde_json::json;
    use tide::{Redirect, Request};

    use super::{
        form_body, latest_questions, not_found, published_question, question_choices, question_id,
        render,
    };
    use crate::api_models::VoteForm;
    use crate::models::{Choice, Question};
    use crate::AppState;

    fn detail_context(
        question: &Question,
        choices: &[Choice],
        error_message: Option<&str>,
    ) -> serde_json::Value {
        json!({
            "question": question,
            "choices": choices,
            "error_message": error_message,
        })
    }

    /**
     *  GET /polls
     */
    pub async fn index(req: Request<AppState>) -> tide::Result {
        let questions = latest_questions(&req.state().db).await?;
        render(req.state(), "index", &json!({ "questions": questions }))
    }

    /**
     *  GET /polls/:id
     */
    pub async fn detail(req: Request<AppState>) -> tide::Result {
        let id = question_id(&req)?;

        match published_question(&req.state().db, id).await? {
            Some(question) => {
                let choices = question_choices(&req.state().db, question.id).await?;
                render(
                    req.state(),
                    "detail",
                    &detail_context(&question, &choices, None),
                )
            }
            None => Ok(not_found(&format!("poll {}", id))),
        }
    }

    /**
     *  POST /polls/:id/vote
     *
     * Records one vote for the selected choice and redirects to the results
     * page. The increment happens in SQL so concurrent ballots cannot lose
     * updates.
     */
    pub async fn vote(mut req: Request<AppState>) -> tide::Result {
        let id = question_id(&req)?;
        let ballot: VoteForm = form_body(&mut req).await.unwrap_or_default();

        let question = match published_question(&req.state().db, id).await? {
            Some(question) => question,
            None => return Ok(not_found(&format!("poll {}", id))),
        };

        let recorded = match ballot.choice {
            Some(choice_id) => {
                let updated =
                    sqlx::query("UPDATE choices SET votes = votes + 1 WHERE id = $1 AND question_id = $2")
                        .bind(choice_id)
                        .bind(question.id)
                        .execute(&req.state().db)
                        .await?;
                updated.rows_affected() > 0
            }
            None => false,
        };

        if recorded {
            debug!("Vote recorded for question {}", question.id);
            Ok(Redirect::see_other(format!("/polls/{}/results", question.id)).into())
        } else {
            let choices = question_choices(&req.state().db, question.id).await?;
            let context = detail_context(&question, &choices, Some("You didn't select a choice."));
            render(req.state(), "detail", &context)
        }
    }

    /**
     *  GET /polls/:id/results
     */
    pub async fn results(req: Request<AppState>) -> tide::Result {
        let id = question_id(&req)?;

        match published_question(&req.state().db, id).await? {
            Some(question) => {
                let choices = question_choices(&req.state().db, question.id).await?;
                let total_votes: i64 = choices.iter().map(|choice| i64::from(choice.votes)).sum();
                render(
                    req.state(),
                    "results",
                    &json!({
                        "question": question,
                        "choices": choices,
                        "total_votes": total_votes,
                    }),
                )
            }
            None => Ok(not_found(&format!("poll {}", id))),
        }
    }
}

/**
 * The JSON mirror of the public site, for scripts
 */
pub mod api {
    pub mod polls {
        use tide::{Body, Request, StatusCode};

        use crate::api_models::{QuestionList, QuestionResponse, Tally};
        use crate::routes::{latest_questions, published_question, question_choices, question_id};
        use crate::AppState;

        /**
         *  GET /api/v1/polls
         */
        pub async fn list(req: Request<AppState>) -> Result<Body, tide::Error> {
            let questions = latest_questions(&req.state().db).await?;
            Body::from_json(&QuestionList { questions })
        }

        /**
         *  GET /api/v1/polls/:id
         */
        pub async fn get(req: Request<AppState>) -> Result<Body, tide::Error> {
            let id = question_id(&req)?;

            match published_question(&req.state().db, id).await? {
                Some(question) => {
                    let choices = question_choices(&req.state().db, question.id).await?;
                    Body::from_json(&QuestionResponse { question, choices })
                }
                None => Err(tide::Error::from_str(
                    StatusCode::NotFound,
                    "Could not find poll",
                )),
            }
        }

        /**
         *  GET /api/v1/polls/:id/results
         */
        pub async fn results(req: Request<AppState>) -> Result<Body, tide::Error> {
            let id = question_id(&req)?;

            match published_question(&req.state().db, id).await? {
                Some(question) => {
                    let choices = question_choices(&req.state().db, question.id).await?;
                    let total_votes: i64 =
                        choices.iter().map(|choice| i64::from(choice.votes)).sum();
                    Body::from_json(&Tally {
                        question,
                        choices,
                        total_votes,
                    })
                }
                None => Err(tide::Error::from_str(
                    StatusCode::NotFound,
                    "Could not find poll",
                )),
            }
        }
    }
}

/**
 * Question management pages. The admin sees every question, future-dated or
 * not; presentation follows the declarative config in crate::admin.
 */
pub mod admin {
    use log::*;
    use serde_json::json;
    use sqlx::postgres::{PgPool, PgRow};
    use sqlx::{Postgres, Row, Transaction};
    use tide::{Redirect, Request, StatusCode};

    use super::{form_body, not_found, question_choices, question_id, render};
    use crate::admin::{
        self, ChoiceRowForm, ListQuery, QuestionForm, QUESTION_ADMIN,
    };
    use crate::models::{text_within_limit, Question};
    use crate::AppState;

    async fn any_question(db: &PgPool, id: i32) -> Result<Option<Question>, sqlx::Error> {
        sqlx::query_as::<_, Question>(
            "SELECT id, question_text, pub_date FROM questions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /**
     *  GET /admin/questions
     *
     * Paginated list with substring search on the question text and a
     * publish-day filter, per QUESTION_ADMIN.
     */
    pub async fn list(req: Request<AppState>) -> tide::Result {
        let query: ListQuery = serde_qs::from_str(req.url().query().unwrap_or(""))
            .map_err(|err| {
                warn!("Unparseable admin query: {:?}", err);
                tide::Error::from_str(StatusCode::BadRequest, "Invalid query string")
            })?;

        let search = admin::normalized(query.q);
        let pattern = search.as_deref().map(admin::like_pattern);
        let day = admin::normalized(query.pub_date);
        let (day_start, day_end) = match &day {
            Some(day) => match admin::day_bounds(day) {
                Some((start, end)) => (Some(start), Some(end)),
                None => {
                    return Err(tide::Error::from_str(
                        StatusCode::BadRequest,
                        "Invalid pub_date filter, expected YYYY-MM-DD",
                    ))
                }
            },
            None => (None, None),
        };

        let per_page = QUESTION_ADMIN.list_per_page;
        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM questions \
             WHERE ($1::text IS NULL OR question_text ILIKE '%' || $1 || '%') \
               AND ($2::timestamptz IS NULL OR (pub_date >= $2 AND pub_date < $3))",
        )
        .bind(pattern.as_deref())
        .bind(day_start)
        .bind(day_end)
        .map(|row: PgRow| row.get("total"))
        .fetch_one(&req.state().db)
        .await?;

        let pages = admin::page_count(total, per_page);
        let page = query.page.unwrap_or(1).max(1).min(pages);
        let questions = sqlx::query_as::<_, Question>(
            "SELECT id, question_text, pub_date FROM questions \
             WHERE ($1::text IS NULL OR question_text ILIKE '%' || $1 || '%') \
               AND ($2::timestamptz IS NULL OR (pub_date >= $2 AND pub_date < $3)) \
             ORDER BY pub_date DESC LIMIT $4 OFFSET $5",
        )
        .bind(pattern.as_deref())
        .bind(day_start)
        .bind(day_end)
        .bind(i64::from(per_page))
        .bind(admin::page_offset(page, per_page))
        .fetch_all(&req.state().db)
        .await?;

        let rows: Vec<serde_json::Value> = questions
            .iter()
            .map(|question| {
                json!({
                    "id": question.id,
                    "question_text": question.question_text,
                    "pub_date": question.pub_date.format("%Y-%m-%d %H:%M").to_string(),
                    "was_published_recently": question.was_published_recently(),
                })
            })
            .collect();

        render(
            req.state(),
            "admin/questions",
            &json!({
                "columns": QUESTION_ADMIN.list_display,
                "rows": rows,
                "page": page,
                "pages": pages,
                "has_prev": page > 1,
                "has_next": page < pages,
                "prev_page": page.saturating_sub(1),
                "next_page": page + 1,
                "q": search,
                "pub_date": day,
                "search_placeholder":
                    format!("Search {}", QUESTION_ADMIN.search_fields.join(", ")),
                "filter_by_pub_date": QUESTION_ADMIN.list_filter.contains(&"pub_date"),
            }),
        )
    }

    /**
     *  GET /admin/questions/new
     */
    pub async fn new_form(req: Request<AppState>) -> tide::Result {
        let rows = admin::inline_rows(&[], &QUESTION_ADMIN.inline);
        render(
            req.state(),
            "admin/question_form",
            &json!({
                "action": "/admin/questions",
                "rows": rows,
            }),
        )
    }

    /**
     *  GET /admin/questions/:id
     */
    pub async fn edit_form(req: Request<AppState>) -> tide::Result {
        let id = question_id(&req)?;

        match any_question(&req.state().db, id).await? {
            Some(question) => {
                let choices = question_choices(&req.state().db, question.id).await?;
                let rows = admin::inline_rows(&choices, &QUESTION_ADMIN.inline);
                render(
                    req.state(),
                    "admin/question_form",
                    &json!({
                        "action": format!("/admin/questions/{}", question.id),
                        "question": {
                            "id": question.id,
                            "question_text": question.question_text,
                            "pub_date_input":
                                question.pub_date.format("%Y-%m-%dT%H:%M:%S").to_string(),
                        },
                        "rows": rows,
                        "delete_action": format!("/admin/questions/{}/delete", question.id),
                    }),
                )
            }
            None => Ok(not_found(&format!("question {}", id))),
        }
    }

    fn validated_question(form: &QuestionForm) -> tide::Result<chrono::DateTime<chrono::Utc>> {
        if form.question_text.trim().is_empty() {
            return Err(tide::Error::from_str(
                StatusCode::BadRequest,
                "Question text is required",
            ));
        }
        if !text_within_limit(&form.question_text) {
            return Err(tide::Error::from_str(
                StatusCode::BadRequest,
                "Question text is limited to 200 characters",
            ));
        }
        admin::parse_pub_date(&form.pub_date).ok_or_else(|| {
            tide::Error::from_str(StatusCode::BadRequest, "Invalid publish date")
        })
    }

    /**
     * Apply the inline choice rows from the form: blank extra slots are
     * skipped, ticked delete boxes remove the row, the rest upsert
     */
    async fn save_choices(
        tx: &mut Transaction<'_, Postgres>,
        question_id: i32,
        rows: &[ChoiceRowForm],
    ) -> tide::Result<()> {
        for row in rows {
            if row.delete_ticked() {
                if let Some(choice_id) = row.id {
                    sqlx::query("DELETE FROM choices WHERE id = $1 AND question_id = $2")
                        .bind(choice_id)
                        .bind(question_id)
                        .execute(&mut *tx)
                        .await?;
                }
                continue;
            }
            if row.is_blank() {
                continue;
            }
            if !text_within_limit(&row.choice_text) {
                return Err(tide::Error::from_str(
                    StatusCode::BadRequest,
                    "Choice text is limited to 200 characters",
                ));
            }
            let votes = admin::parse_votes(row.votes.as_deref()).ok_or_else(|| {
                tide::Error::from_str(
                    StatusCode::BadRequest,
                    "Votes must be a non-negative number",
                )
            })?;

            match row.id {
                Some(choice_id) => {
                    sqlx::query(
                        "UPDATE choices SET choice_text = $1, votes = $2 \
                         WHERE id = $3 AND question_id = $4",
                    )
                    .bind(&row.choice_text)
                    .bind(votes)
                    .bind(choice_id)
                    .bind(question_id)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query(
                        "INSERT INTO choices (question_id, choice_text, votes) \
                         VALUES ($1, $2, $3)",
                    )
                    .bind(question_id)
                    .bind(&row.choice_text)
                    .bind(votes)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }
        Ok(())
    }

    /**
     *  POST /admin/questions
     */
    pub async fn create(mut req: Request<AppState>) -> tide::Result {
        let form: QuestionForm = form_body(&mut req).await?;
        let pub_date = validated_question(&form)?;

        let mut tx = req.state().db.begin().await?;
        let question_id: i32 =
            sqlx::query("INSERT INTO questions (question_text, pub_date) VALUES ($1, $2) RETURNING id")
                .bind(&form.question_text)
                .bind(pub_date)
                .map(|row: PgRow| row.get("id"))
                .fetch_one(&mut tx)
                .await?;
        save_choices(&mut tx, question_id, &form.choices).await?;
        tx.commit().await?;

        info!("Created question {}", question_id);
        Ok(Redirect::see_other("/admin/questions").into())
    }

    /**
     *  POST /admin/questions/:id
     */
    pub async fn update(mut req: Request<AppState>) -> tide::Result {
        let id = question_id(&req)?;
        let form: QuestionForm = form_body(&mut req).await?;
        let pub_date = validated_question(&form)?;

        let mut tx = req.state().db.begin().await?;
        let updated = sqlx::query("UPDATE questions SET question_text = $1, pub_date = $2 WHERE id = $3")
            .bind(&form.question_text)
            .bind(pub_date)
            .bind(id)
            .execute(&mut tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Ok(not_found(&format!("question {}", id)));
        }
        save_choices(&mut tx, id, &form.choices).await?;
        tx.commit().await?;

        info!("Updated question {}", id);
        Ok(Redirect::see_other("/admin/questions").into())
    }

    /**
     *  POST /admin/questions/:id/delete
     *
     * The schema cascades the delete to the question's choices
     */
    pub async fn delete(req: Request<AppState>) -> tide::Result {
        let id = question_id(&req)?;

        let deleted = sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id)
            .execute(&req.state().db)
            .await?;
        if deleted.rows_affected() == 0 {
            return Ok(not_found(&format!("question {}", id)));
        }

        info!("Deleted question {}", id);
        Ok(Redirect::see_other("/admin/questions").into())
    }
}
