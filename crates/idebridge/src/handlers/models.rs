use common::errors::BridgeError;
use hyper::{Response, StatusCode};
use idewire::apis::openai::Models;
use idewire::models::public_model_name;
use tracing::debug;

use crate::app::AppState;
use crate::handlers::response_handler::{json_response, ResponseBody};

/// Lists the upstream chat catalog under public model names.
pub async fn list_models(state: &AppState) -> Result<Response<ResponseBody>, BridgeError> {
    if state.credentials.is_expired().await {
        return Err(BridgeError::CredentialExpired);
    }

    let catalog = state.upstream.list_models().await?;
    debug!(count = catalog.model_configs.len(), "fetched upstream model catalog");

    let models = Models::from_ids(
        catalog
            .model_configs
            .iter()
            .map(|model| public_model_name(&model.name)),
        state.clock.now_secs(),
    );
    json_response(StatusCode::OK, &models)
}
