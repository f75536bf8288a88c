use crate::analysis::{keyword_frequencies, sentiment_distribution, Analysis};
use crate::config::Config;
use crate::credentials::{self, CredentialError};
use crate::database::{MovieDb, SessionDb};
use crate::predictor::Predictor;
use crate::session::{self, Session};
use actix_identity::Identity;
use actix_web::{error, web, HttpRequest, HttpResponse};
use log::{debug, info, warn};
use serde::Deserialize;

type Tera = web::Data<tera::Tera>;
type Db = web::Data<sled::Db>;

const KEYWORD_LIMIT: usize = 50;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/login", web::get().to(login))
        .route("/login", web::post().to(login_post))
        .route("/register", web::get().to(register))
        .route("/register", web::post().to(register_post))
        .route("/logout", web::get().to(logout))
        .route("/analysis", web::get().to(analysis))
        .route("/movies", web::get().to(movies))
        .route("/predict", web::get().to(predict))
        .route("/predict", web::post().to(predict_post));
}

fn log_error<E: std::fmt::Debug>(err: E, message: &'static str) -> error::Error {
    debug!("{:?}", err);
    error::ErrorInternalServerError(message)
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found().header("location", location).finish()
}

fn render(tera: &tera::Tera, name: &str, ctx: &tera::Context) -> actix_web::Result<HttpResponse> {
    let body = tera
        .render(name, ctx)
        .map_err(|err| log_error(err, "Template error"))?;
    Ok(HttpResponse::Ok().content_type("text/html").body(body))
}

fn current_session(id: &Identity, db: &sled::Db) -> actix_web::Result<Session> {
    Session::resolve(db, id.identity(), session::now())
        .map_err(|err| log_error(err, "Database error"))
}

/// Context shared by every page: the active page and the signed-in user.
fn page_context(page: &str, session: &Session, req: &HttpRequest) -> tera::Context {
    let mut ctx = tera::Context::new();
    ctx.insert("page", page);
    ctx.insert("username", &session.username());
    ctx.insert("notice", req.query_string());
    ctx
}

async fn index(id: Identity, db: Db) -> actix_web::Result<HttpResponse> {
    if current_session(&id, &db)?.is_authenticated() {
        Ok(redirect("/analysis"))
    } else {
        Ok(redirect("/login"))
    }
}

#[derive(Deserialize)]
struct CredentialParams {
    username: String,
    password: String,
}

async fn login(req: HttpRequest, id: Identity, tera: Tera, db: Db) -> actix_web::Result<HttpResponse> {
    let session = current_session(&id, &db)?;
    render(&tera, "login.html", &page_context("login", &session, &req))
}

async fn login_post(
    params: web::Form<CredentialParams>,
    id: Identity,
    db: Db,
    config: web::Data<Config>,
) -> actix_web::Result<HttpResponse> {
    match credentials::authenticate(db.get_ref(), &params.username, &params.password) {
        Ok(true) => {
            let now = session::now();
            let purged = db
                .purge_sessions(now)
                .map_err(|err| log_error(err, "Database error"))?;
            if purged > 0 {
                debug!("purged {} expired sessions", purged);
            }
            let session = Session::start(db.get_ref(), &params.username, config.session_ttl, now)
                .map_err(|err| log_error(err, "Database error"))?;
            if let Some(token) = session.token() {
                id.remember(token.to_owned());
            }
            info!("user {} logged in", params.username);
            Ok(redirect("/analysis"))
        }
        Ok(false) => Ok(redirect("/login?wrong_password")),
        Err(err) => {
            warn!("login failed: {}", err);
            Ok(redirect("/login?wrong_password"))
        }
    }
}

async fn register(req: HttpRequest, id: Identity, tera: Tera, db: Db) -> actix_web::Result<HttpResponse> {
    let session = current_session(&id, &db)?;
    render(&tera, "register.html", &page_context("register", &session, &req))
}

async fn register_post(
    params: web::Form<CredentialParams>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    match credentials::register(db.get_ref(), &params.username, &params.password) {
        Ok(()) => {
            info!("registered user {}", params.username);
            Ok(redirect("/login?registered"))
        }
        Err(CredentialError::UsernameTaken) => {
            debug!("username {} already taken", params.username);
            Ok(redirect("/register?failed"))
        }
        Err(err) => {
            warn!("registration failed: {}", err);
            Ok(redirect("/register?failed"))
        }
    }
}

async fn logout(id: Identity, db: Db) -> actix_web::Result<HttpResponse> {
    current_session(&id, &db)?
        .end(db.get_ref())
        .map_err(|err| log_error(err, "Database error"))?;
    id.forget();
    Ok(redirect("/login?logout"))
}

async fn analysis(req: HttpRequest, id: Identity, tera: Tera, db: Db) -> actix_web::Result<HttpResponse> {
    let session = current_session(&id, &db)?;
    if !session.is_authenticated() {
        return Ok(redirect("/login?required"));
    }
    let mut ctx = page_context("analysis", &session, &req);
    match db.list_all_movies() {
        Ok(movies) => ctx.insert("analysis", &Analysis::from_movies(&movies)),
        Err(err) => {
            warn!("analysis query failed: {}", err);
            ctx.insert("failed", &true);
        }
    }
    render(&tera, "analysis.html", &ctx)
}

#[derive(Deserialize)]
struct MovieQuery {
    title: Option<String>,
}

async fn movies(
    req: HttpRequest,
    query: web::Query<MovieQuery>,
    id: Identity,
    tera: Tera,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let session = current_session(&id, &db)?;
    if !session.is_authenticated() {
        return Ok(redirect("/login?required"));
    }
    let mut ctx = page_context("movies", &session, &req);
    let title = query.title.as_deref().map(str::trim).unwrap_or("");
    ctx.insert("title", title);
    if title.is_empty() {
        return render(&tera, "movies.html", &ctx);
    }
    let found = match db.find_movies(title) {
        Ok(found) => found,
        Err(err) => {
            warn!("movie query failed: {}", err);
            ctx.insert("failed", &true);
            return render(&tera, "movies.html", &ctx);
        }
    };
    ctx.insert("movies", &found);
    // Comments are shown for the first match only.
    if let Some(movie) = found.first() {
        match db.find_comments(movie.id) {
            Ok(comments) => {
                ctx.insert("selected", movie);
                ctx.insert("comment_count", &comments.len());
                ctx.insert("sentiments", &sentiment_distribution(&comments));
                ctx.insert("keywords", &keyword_frequencies(&comments, KEYWORD_LIMIT));
            }
            Err(err) => {
                warn!("comment query failed: {}", err);
                ctx.insert("comments_failed", &true);
            }
        }
    }
    render(&tera, "movies.html", &ctx)
}

#[derive(Deserialize)]
struct PredictParams {
    comment: String,
}

async fn predict(req: HttpRequest, id: Identity, tera: Tera, db: Db) -> actix_web::Result<HttpResponse> {
    let session = current_session(&id, &db)?;
    if !session.is_authenticated() {
        return Ok(redirect("/login?required"));
    }
    render(&tera, "predict.html", &page_context("predict", &session, &req))
}

async fn predict_post(
    req: HttpRequest,
    params: web::Form<PredictParams>,
    id: Identity,
    tera: Tera,
    db: Db,
    predictor: web::Data<Predictor>,
) -> actix_web::Result<HttpResponse> {
    let session = current_session(&id, &db)?;
    if !session.is_authenticated() {
        return Ok(redirect("/login?required"));
    }
    let mut ctx = page_context("predict", &session, &req);
    ctx.insert("comment", &params.comment);
    if !params.comment.is_empty() {
        let prediction = predictor.predict(&params.comment);
        ctx.insert("label", &prediction.label);
        ctx.insert(
            "positive",
            &prediction.positive.map(|p| format!("{:.2}", p)),
        );
    }
    render(&tera, "predict.html", &ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::UserDb;
    use crate::model::SessionRecord;
    use actix_identity::{CookieIdentityPolicy, IdentityService};
    use actix_web::{http::StatusCode, test, App};
    use std::path::PathBuf;

    fn app_db() -> sled::Db {
        sled::Config::new().temporary(true).open().unwrap()
    }

    fn app_config() -> Config {
        Config {
            bind: String::new(),
            data_dir: PathBuf::new(),
            dataset: None,
            model: PathBuf::new(),
            vectorizer: PathBuf::new(),
            templates: String::new(),
            session_ttl: 600,
            cookie_key: [0u8; 32],
        }
    }

    fn form_post(uri: &str, body: &'static str) -> test::TestRequest {
        test::TestRequest::post()
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .set_payload(body)
    }

    #[actix_rt::test]
    async fn pages_require_login() {
        let db = app_db();
        let mut app = test::init_service(
            App::new()
                .wrap(IdentityService::new(
                    CookieIdentityPolicy::new(&[0u8; 32])
                        .name("auth-cookie")
                        .secure(false),
                ))
                .data(tera::Tera::default())
                .data(db)
                .configure(configure),
        )
        .await;
        for uri in &["/analysis", "/movies?title=fiction", "/predict"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&mut app, req).await;
            assert_eq!(resp.status(), StatusCode::FOUND);
            assert_eq!(
                resp.headers().get("location").unwrap(),
                "/login?required"
            );
        }
    }

    #[actix_rt::test]
    async fn register_form_creates_user() {
        let db = app_db();
        let mut app = test::init_service(App::new().data(db.clone()).configure(configure)).await;
        let form = || form_post("/register", "username=alice&password=secret123").to_request();
        let resp = test::call_service(&mut app, form()).await;
        assert_eq!(resp.headers().get("location").unwrap(), "/login?registered");
        let resp = test::call_service(&mut app, form()).await;
        assert_eq!(resp.headers().get("location").unwrap(), "/register?failed");
        assert!(db.get_user("alice").unwrap().is_some());
    }

    #[actix_rt::test]
    async fn login_cookie_round_trip() {
        let db = app_db();
        db.insert_session(
            "stale",
            &SessionRecord {
                username: "bob".to_owned(),
                expires_at: 0,
            },
        )
        .unwrap();
        let templates = tera::Tera::new(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/**/*"))
            .unwrap();
        let mut app = test::init_service(
            App::new()
                .wrap(IdentityService::new(
                    CookieIdentityPolicy::new(&[0u8; 32])
                        .name("auth-cookie")
                        .secure(false),
                ))
                .data(templates)
                .data(db.clone())
                .app_data(web::Data::new(app_config()))
                .configure(configure),
        )
        .await;

        let req = form_post("/register", "username=alice&password=secret123").to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.headers().get("location").unwrap(), "/login?registered");

        let req = form_post("/login", "username=alice&password=wrong").to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.headers().get("location").unwrap(), "/login?wrong_password");
        assert!(resp.response().cookies().next().is_none());

        let req = form_post("/login", "username=alice&password=secret123").to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.headers().get("location").unwrap(), "/analysis");
        let cookie = resp
            .response()
            .cookies()
            .find(|c| c.name() == "auth-cookie")
            .unwrap()
            .into_owned();
        assert_eq!(db.get_session("stale").unwrap(), None);

        let req = test::TestRequest::get()
            .uri("/analysis")
            .cookie(cookie.clone())
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri("/logout")
            .cookie(cookie.clone())
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.headers().get("location").unwrap(), "/login?logout");

        let req = test::TestRequest::get()
            .uri("/analysis")
            .cookie(cookie)
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers().get("location").unwrap(), "/login?required");
    }
}
