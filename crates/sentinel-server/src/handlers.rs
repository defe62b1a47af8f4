//! Request handlers.

use axum::Json;
use axum::extract::State;
use jiff::Timestamp;

use sentinel_core::models::{CredentialProcessOutput, SessionStatus};

use crate::AppState;
use crate::cache::still_usable;
use crate::error::ServerError;

/// `GET /` — the container-credentials endpoint the SDK polls.
///
/// Authorization is re-established from the store on every fetch: a
/// revoked or TTL-expired session is refused before any minting, so
/// revocation takes effect on the next SDK call with no STS traffic.
pub async fn get_credentials(
    State(state): State<AppState>,
) -> Result<Json<CredentialProcessOutput>, ServerError> {
    let now = Timestamp::now();
    let session = state.sessions().get(state.session_id()).await?;

    match session.effective_status(now) {
        SessionStatus::Active => {}
        SessionStatus::Revoked => {
            state.cache().evict(&session.id);
            return Err(ServerError::SessionRevoked);
        }
        SessionStatus::Expired => {
            state.cache().evict(&session.id);
            // Status repair for a TTL-expired row still marked active;
            // losing the conditional write just means someone else fixed it.
            if session.status == SessionStatus::Active {
                match state.sessions().expire(&session, now).await {
                    Ok(()) | Err(sentinel_store::StoreError::ConcurrentModification { .. }) => {}
                    Err(e) => tracing::warn!(id = %session.id, error = %e, "status repair failed"),
                }
            }
            return Err(ServerError::SessionExpired);
        }
    }

    let slot = state.cache().slot(&session.id);
    let mut guard = slot.lock().await;

    let credentials = match guard.as_ref() {
        Some(cached) if still_usable(cached, now) => cached.clone(),
        _ => {
            let fresh = state.issuer().reissue_for_session(&session).await?;
            *guard = Some(fresh.clone());
            fresh
        }
    };
    drop(guard);

    // The row is only touched after a successful mint; a failed touch
    // must not fail the fetch.
    if let Err(e) = state.sessions().touch(&session.id, Timestamp::now()).await {
        tracing::warn!(id = %session.id, error = %e, "session touch failed");
    }

    Ok(Json(credentials.to_process_output()))
}
