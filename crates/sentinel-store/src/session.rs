//! Server-session store.
//!
//! One row per server-mode issuance, keyed by the issuance's request id
//! so retried inserts cannot double-record. Revocation is a status
//! transition here; the credential server re-reads the row on every fetch
//! and refuses once it is no longer effectively active.

use aws_sdk_dynamodb::Client;
use jiff::Timestamp;

use sentinel_core::models::{ServerSession, SessionStatus};

use crate::error::StoreError;
use crate::item::{self, Item};
use crate::{GSI_PRINCIPAL, GSI_PROFILE, GSI_STATUS};

#[derive(Clone)]
pub struct SessionStore {
    client: Client,
    table: String,
}

impl SessionStore {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self::with_table(config, crate::SESSION_TABLE)
    }

    pub fn with_table(config: &aws_config::SdkConfig, table: impl Into<String>) -> Self {
        Self {
            client: Client::new(config),
            table: table.into(),
        }
    }

    /// Insert the session row. The id doubles as the issuance idempotency
    /// key: a second insert for the same id is a hard error, letting the
    /// issuer roll the duplicate issuance back.
    pub async fn create(&self, session: &ServerSession) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(to_item(session)))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
            .map_err(|e| {
                let err = e.into_service_error();
                if err.is_conditional_check_failed_exception() {
                    StoreError::IdCollision {
                        id: session.id.clone(),
                    }
                } else {
                    StoreError::Dynamo(err.to_string())
                }
            })?;

        tracing::info!(
            id = %session.id,
            user = %session.user,
            profile = %session.profile,
            "server session recorded"
        );
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<ServerSession, StoreError> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("id", item::s(id))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StoreError::Dynamo(e.into_service_error().to_string()))?;

        match resp.item() {
            Some(raw) => from_item(raw),
            None => Err(StoreError::NotFound { id: id.to_string() }),
        }
    }

    pub async fn revoke(&self, current: &ServerSession, now: Timestamp) -> Result<(), StoreError> {
        self.transition(current, SessionStatus::Revoked, now).await
    }

    pub async fn expire(&self, current: &ServerSession, now: Timestamp) -> Result<(), StoreError> {
        self.transition(current, SessionStatus::Expired, now).await
    }

    /// Record a served credential fetch: bump `request_count` and advance
    /// `last_access_at`.
    ///
    /// The write is a lower-bound update: if another instance already
    /// recorded a later access (clock skew, concurrent fetches), the
    /// condition fails and the touch is dropped rather than rewinding the
    /// row. Only `active` rows are touched.
    pub async fn touch(&self, id: &str, now: Timestamp) -> Result<(), StoreError> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table)
            .key("id", item::s(id))
            .update_expression(
                "SET last_access_at = :now, request_count = request_count + :one",
            )
            .condition_expression("#status = :active AND last_access_at <= :now")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":active", item::s(SessionStatus::Active.as_str()))
            .expression_attribute_values(":now", item::ts_s(now))
            .expression_attribute_values(":one", item::n(1))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = e.into_service_error();
                if err.is_conditional_check_failed_exception() {
                    tracing::debug!(id = id, "touch superseded by a later access");
                    Ok(())
                } else {
                    Err(StoreError::Dynamo(err.to_string()))
                }
            }
        }
    }

    pub async fn list_by_user(
        &self,
        user: &str,
        since: Timestamp,
    ) -> Result<Vec<ServerSession>, StoreError> {
        let resp = self
            .client
            .query()
            .table_name(&self.table)
            .index_name(GSI_PRINCIPAL)
            .key_condition_expression("#user = :user AND created_at >= :since")
            .expression_attribute_names("#user", "user")
            .expression_attribute_values(":user", item::s(user))
            .expression_attribute_values(":since", item::ts_s(since))
            .send()
            .await
            .map_err(|e| StoreError::Dynamo(e.into_service_error().to_string()))?;

        resp.items().iter().map(from_item).collect()
    }

    pub async fn list_by_profile(
        &self,
        profile: &str,
    ) -> Result<Vec<ServerSession>, StoreError> {
        let resp = self
            .client
            .query()
            .table_name(&self.table)
            .index_name(GSI_PROFILE)
            .key_condition_expression("#profile = :profile")
            .expression_attribute_names("#profile", "profile")
            .expression_attribute_values(":profile", item::s(profile))
            .send()
            .await
            .map_err(|e| StoreError::Dynamo(e.into_service_error().to_string()))?;

        resp.items().iter().map(from_item).collect()
    }

    pub async fn list_by_status(
        &self,
        status: SessionStatus,
    ) -> Result<Vec<ServerSession>, StoreError> {
        let resp = self
            .client
            .query()
            .table_name(&self.table)
            .index_name(GSI_STATUS)
            .key_condition_expression("#status = :status")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":status", item::s(status.as_str()))
            .send()
            .await
            .map_err(|e| StoreError::Dynamo(e.into_service_error().to_string()))?;

        resp.items().iter().map(from_item).collect()
    }

    /// Repair pass: `active` rows past `expires_at` become `expired`.
    pub async fn expire_stale(&self, now: Timestamp) -> Result<usize, StoreError> {
        let active = self.list_by_status(SessionStatus::Active).await?;
        let mut expired = 0;
        for session in active {
            if !session.is_expired(now) {
                continue;
            }
            match self.expire(&session, now).await {
                Ok(()) => expired += 1,
                Err(StoreError::ConcurrentModification { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(expired)
    }

    /// Status transitions condition on the row still being `active`; a
    /// concurrent transition wins and this one surfaces as
    /// [`StoreError::ConcurrentModification`].
    async fn transition(
        &self,
        current: &ServerSession,
        to: SessionStatus,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        if !current.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                id: current.id.clone(),
                from: current.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        self.client
            .update_item()
            .table_name(&self.table)
            .key("id", item::s(&current.id))
            .update_expression("SET #status = :to, last_access_at = :now")
            .condition_expression("#status = :from")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":to", item::s(to.as_str()))
            .expression_attribute_values(":from", item::s(current.status.as_str()))
            .expression_attribute_values(":now", item::ts_s(now))
            .send()
            .await
            .map_err(|e| {
                let err = e.into_service_error();
                if err.is_conditional_check_failed_exception() {
                    StoreError::ConcurrentModification {
                        id: current.id.clone(),
                    }
                } else {
                    StoreError::Dynamo(err.to_string())
                }
            })?;

        tracing::info!(
            id = %current.id,
            from = current.status.as_str(),
            to = to.as_str(),
            "server session transitioned"
        );
        Ok(())
    }
}

fn to_item(session: &ServerSession) -> Item {
    let mut out = Item::new();
    out.insert("id".to_string(), item::s(&session.id));
    out.insert("user".to_string(), item::s(&session.user));
    out.insert("profile".to_string(), item::s(&session.profile));
    out.insert("status".to_string(), item::s(session.status.as_str()));
    out.insert("started_at".to_string(), item::ts_s(session.started_at));
    // GSI range key; mirrors started_at for sessions.
    out.insert("created_at".to_string(), item::ts_s(session.started_at));
    out.insert(
        "last_access_at".to_string(),
        item::ts_s(session.last_access_at),
    );
    out.insert("expires_at".to_string(), item::ts_epoch(session.expires_at));
    out.insert("request_count".to_string(), item::n(session.request_count));
    out.insert(
        "server_instance_id".to_string(),
        item::s(&session.server_instance_id),
    );
    out.insert(
        "source_identity".to_string(),
        item::s(&session.source_identity),
    );
    out
}

fn from_item(raw: &Item) -> Result<ServerSession, StoreError> {
    let id = item::get_s(raw, "id", "?")?;
    let status = match item::get_s(raw, "status", &id)?.as_str() {
        "active" => SessionStatus::Active,
        "revoked" => SessionStatus::Revoked,
        "expired" => SessionStatus::Expired,
        _ => {
            return Err(StoreError::Malformed {
                id,
                field: "status".to_string(),
            });
        }
    };

    Ok(ServerSession {
        user: item::get_s(raw, "user", &id)?,
        profile: item::get_s(raw, "profile", &id)?,
        status,
        started_at: item::get_ts(raw, "started_at", &id)?,
        last_access_at: item::get_ts(raw, "last_access_at", &id)?,
        expires_at: item::get_ts_epoch(raw, "expires_at", &id)?,
        request_count: item::get_n(raw, "request_count", &id)?,
        server_instance_id: item::get_s(raw, "server_instance_id", &id)?,
        source_identity: item::get_s(raw, "source_identity", &id)?,
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::SignedDuration;

    fn session() -> ServerSession {
        ServerSession::new(
            "a1b2c3d4",
            "alice",
            "prod",
            "sentinel:alice:direct:a1b2c3d4",
            "srv-0a1b",
            SignedDuration::from_secs(3600),
            "2026-01-20T12:00:00Z".parse().unwrap(),
        )
    }

    #[test]
    fn item_round_trip() {
        let s = session();
        let back = from_item(&to_item(&s)).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn revoked_rows_cannot_move() {
        let mut s = session();
        s.status = SessionStatus::Revoked;
        assert!(!s.status.can_transition_to(SessionStatus::Expired));
    }
}
