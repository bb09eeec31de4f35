//! `/swagger.json`: a minimal hand-maintained OpenAPI description of the
//! REST surface, served as a static document rather than generated from
//! the handlers — there's no derive-based schema machinery in this stack.

use actix_web::{get, HttpResponse};

const SWAGGER_JSON: &str = include_str!("../../openapi.json");

#[get("/swagger.json")]
pub async fn swagger_json() -> HttpResponse {
    HttpResponse::Ok().content_type("application/json").body(SWAGGER_JSON)
}
