use actix_web::get;
use actix_web::http::StatusCode;
use actix_web::post;
use actix_web::web;
use actix_web::web::Data;
use actix_web::web::Json;
use actix_web::web::Query;
use actix_web::HttpResponse;
use actix_web::Responder;
use actix_web::ResponseError;
use serde::Deserialize;
use serde::Serialize;

use crate::app::App;
use crate::error::StoreError;

/// Query parameters of the user endpoints.
#[derive(Deserialize, Debug, Default)]
pub struct UserQuery {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MessageBody {
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserBody {
    pub username: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0} is required")]
    MissingParam(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingParam(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ApiError> {
    value.ok_or(ApiError::MissingParam(name))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api/v1/users").service(store_info).service(create_user).service(get_user))
        .service(health);
}

#[get("/store")]
pub async fn store_info(app: Data<App>) -> impl Responder {
    Json(app.store.info())
}

#[post("/")]
pub async fn create_user(app: Data<App>, query: Query<UserQuery>) -> Result<HttpResponse, ApiError> {
    let UserQuery { username, password } = query.into_inner();
    let username = required(username, "username")?;
    let password = required(password, "password")?;

    app.store.set(&username, &password).await?;

    Ok(HttpResponse::Created().json(MessageBody {
        message: "user created successfully".to_string(),
    }))
}

#[get("/")]
pub async fn get_user(app: Data<App>, query: Query<UserQuery>) -> Result<HttpResponse, ApiError> {
    let username = required(query.into_inner().username, "username")?;

    app.store.get(&username).await?;

    Ok(HttpResponse::Ok().json(UserBody { username }))
}

#[get("/health")]
pub async fn health() -> impl Responder {
    Json(HealthStatus {
        status: "ok".to_string(),
    })
}
