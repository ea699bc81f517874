use dotenv::dotenv;
use handlebars::Handlebars;
use log::*;
use sqlx::postgres::{PgPool, PgPoolOptions};

use std::env;
use std::sync::Arc;

mod admin;
mod api_models;
mod models;
mod routes;

/**
 * Struct for carrying application state into tide request handlers
 */
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub templates: Arc<Handlebars<'static>>,
}

/**
 * Create the sqlx connection pool for postgresql
 */
async fn create_pool() -> Result<PgPool, sqlx::Error> {
    dotenv().ok();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
}

/**
 * Load every handlebars template under views/
 */
fn load_templates() -> Result<Handlebars<'static>, handlebars::TemplateFileError> {
    let mut templates = Handlebars::new();
    templates.register_templates_directory(".hbs", "views")?;
    Ok(templates)
}

#[async_std::main]
async fn main() -> Result<(), std::io::Error> {
    pretty_env_logger::init();

    match create_pool().await {
        Ok(db) => {
            if let Err(err) = sqlx::migrate!("./migrations").run(&db).await {
                error!("Could not run migrations! {:?}", err);
                return Err(std::io::Error::new(std::io::ErrorKind::Other, err));
            }

            let templates = match load_templates() {
                Ok(templates) => templates,
                Err(err) => {
                    error!("Could not load templates! {:?}", err);
                    return Err(std::io::Error::new(std::io::ErrorKind::Other, err));
                }
            };

            let state = AppState {
                db,
                templates: Arc::new(templates),
            };
            let mut app = tide::with_state(state);
            app.with(driftwood::ApacheCombinedLogger);

            app.at("/").get(routes::root);
            app.at("/polls").get(routes::pages::index);
            app.at("/polls/:id").get(routes::pages::detail);
            app.at("/polls/:id/vote").post(routes::pages::vote);
            app.at("/polls/:id/results").get(routes::pages::results);

            app.at("/api/v1/polls").get(routes::api::polls::list);
            app.at("/api/v1/polls/:id").get(routes::api::polls::get);
            app.at("/api/v1/polls/:id/results")
                .get(routes::api::polls::results);

            app.at("/admin/questions")
                .get(routes::admin::list)
                .post(routes::admin::create);
            app.at("/admin/questions/new").get(routes::admin::new_form);
            app.at("/admin/questions/:id")
                .get(routes::admin::edit_form)
                .post(routes::admin::update);
            app.at("/admin/questions/:id/delete")
                .post(routes::admin::delete);

            let host = env::var("HTTP_HOST").unwrap_or_else(|_| "127.0.0.1:8000".to_string());
            app.listen(host).await?;
            Ok(())
        }
        Err(err) => {
            error!("Could not initialize pool! {:?}", err);
            Err(std::io::Error::new(std::io::ErrorKind::Other, err))
        }
    }
}
