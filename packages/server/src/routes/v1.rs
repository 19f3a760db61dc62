use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/auth", auth_routes())
        .nest("/skins", skin_routes(config))
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::auth::register))
        .routes(routes!(handlers::auth::login))
        .routes(routes!(handlers::auth::me))
}

fn skin_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            handlers::skin::list_skins,
            handlers::skin::upload_skin
        ))
        .routes(routes!(
            handlers::skin::get_skin,
            handlers::skin::edit_skin,
            handlers::skin::delete_skin
        ))
        .routes(routes!(handlers::skin::download_skin))
        .layer(handlers::skin::skin_body_limit(config.storage.max_blob_size))
}
