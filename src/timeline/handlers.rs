use axum::{extract::State, routing::get, Json, Router};
use tracing::{debug, instrument};

use crate::{
    error::Result,
    state::AppState,
    store::{Store, TimelineItem},
};

pub fn timeline_routes() -> Router<AppState> {
    Router::new().route("/timeline", get(list_timeline))
}

/// Every timeline item, oldest first.
#[instrument(skip(state))]
pub async fn list_timeline(State(state): State<AppState>) -> Result<Json<Vec<TimelineItem>>> {
    let items = state.store.get_timeline_items().await?;
    debug!(count = items.len(), "timeline listed");
    Ok(Json(items))
}
