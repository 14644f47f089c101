use axum::response::Redirect;

/// Documentation landing page.
pub async fn docs_index() -> Redirect {
    Redirect::temporary("/swagger-ui/")
}
