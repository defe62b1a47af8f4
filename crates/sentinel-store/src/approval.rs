//! Approval request store.
//!
//! One DynamoDB item per request. `pending` is the only state that can
//! move; every transition is a conditional write on the current status
//! and the previously observed `updated_at`, so concurrent resolvers see
//! exactly one winner.

use aws_sdk_dynamodb::Client;
use jiff::Timestamp;

use sentinel_core::models::request::REQUEST_TTL;
use sentinel_core::models::{ApprovalRequest, RequestStatus};

use crate::error::StoreError;
use crate::item::{self, Item};
use crate::{GSI_PRINCIPAL, GSI_PROFILE, GSI_STATUS};

#[derive(Clone)]
pub struct ApprovalStore {
    client: Client,
    table: String,
}

impl ApprovalStore {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self::with_table(config, crate::APPROVAL_TABLE)
    }

    pub fn with_table(config: &aws_config::SdkConfig, table: impl Into<String>) -> Self {
        Self {
            client: Client::new(config),
            table: table.into(),
        }
    }

    /// Insert a new request. An id collision is a hard error, never an
    /// overwrite.
    pub async fn create(&self, request: &ApprovalRequest) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(to_item(request)))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
            .map_err(|e| {
                let err = e.into_service_error();
                if err.is_conditional_check_failed_exception() {
                    StoreError::IdCollision {
                        id: request.id.clone(),
                    }
                } else {
                    StoreError::Dynamo(err.to_string())
                }
            })?;

        tracing::info!(
            id = %request.id,
            requester = %request.requester,
            profile = %request.profile,
            "approval request created"
        );
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<ApprovalRequest, StoreError> {
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

    /// Move `current` to `to`, recording the resolver. `current` must be
    /// the caller's last read of the row: the write is conditional on its
    /// `status` and `updated_at`, and loses with
    /// [`StoreError::ConcurrentModification`] if either moved.
    pub async fn resolve(
        &self,
        current: &ApprovalRequest,
        to: RequestStatus,
        approver: Option<&str>,
        comment: Option<&str>,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        if !current.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                id: current.id.clone(),
                from: current.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        let mut expression = String::from("SET #status = :to, updated_at = :now");
        let mut update = self
            .client
            .update_item()
            .table_name(&self.table)
            .key("id", item::s(&current.id))
            .condition_expression("#status = :from AND updated_at = :seen")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":to", item::s(to.as_str()))
            .expression_attribute_values(":from", item::s(current.status.as_str()))
            .expression_attribute_values(":now", item::ts_s(now))
            .expression_attribute_values(":seen", item::ts_s(current.updated_at));

        if let Some(approver) = approver {
            expression.push_str(", approver = :approver");
            update = update.expression_attribute_values(":approver", item::s(approver));
            if let Some(comment) = comment {
                expression.push_str(", approver_comment = :comment");
                update = update.expression_attribute_values(":comment", item::s(comment));
            }
        }

        update.update_expression(expression).send().await.map_err(|e| {
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
            "approval request resolved"
        );
        Ok(())
    }

    /// Find a usable approval for `(requester, profile)`: status
    /// `approved`, created within the 8-hour window, TTL not yet passed.
    ///
    /// The `by-principal` GSI narrows to the requester's recent requests;
    /// profile, status, and expiry are intersected in-process. Returns the
    /// newest match.
    pub async fn find_active_approval(
        &self,
        requester: &str,
        profile: &str,
        now: Timestamp,
    ) -> Result<Option<ApprovalRequest>, StoreError> {
        let cutoff = now - REQUEST_TTL;
        let candidates = self
            .query_principal_since(requester, cutoff)
            .await?;

        let mut best: Option<ApprovalRequest> = None;
        for request in candidates {
            if request.status != RequestStatus::Approved
                || request.profile != profile
                || request.is_expired(now)
            {
                continue;
            }
            if best
                .as_ref()
                .is_none_or(|b| request.created_at > b.created_at)
            {
                best = Some(request);
            }
        }
        Ok(best)
    }

    pub async fn list_by_requester(
        &self,
        requester: &str,
        since: Timestamp,
    ) -> Result<Vec<ApprovalRequest>, StoreError> {
        self.query_principal_since(requester, since).await
    }

    pub async fn list_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<ApprovalRequest>, StoreError> {
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

    pub async fn list_by_profile(
        &self,
        profile: &str,
    ) -> Result<Vec<ApprovalRequest>, StoreError> {
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

    /// Repair pass: any `pending` request whose TTL anchor has passed is
    /// moved to `expired`. The TTL sweeper deletes rows eventually; this
    /// keeps reads honest in the meantime.
    pub async fn expire_stale(&self, now: Timestamp) -> Result<usize, StoreError> {
        let pending = self.list_by_status(RequestStatus::Pending).await?;
        let mut expired = 0;
        for request in pending {
            if !request.is_expired(now) {
                continue;
            }
            match self
                .resolve(&request, RequestStatus::Expired, None, None, now)
                .await
            {
                Ok(()) => expired += 1,
                // Lost the race to another writer; their transition stands.
                Err(StoreError::ConcurrentModification { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(expired)
    }

    async fn query_principal_since(
        &self,
        requester: &str,
        since: Timestamp,
    ) -> Result<Vec<ApprovalRequest>, StoreError> {
        let resp = self
            .client
            .query()
            .table_name(&self.table)
            .index_name(GSI_PRINCIPAL)
            .key_condition_expression("requester = :requester AND created_at >= :since")
            .expression_attribute_values(":requester", item::s(requester))
            .expression_attribute_values(":since", item::ts_s(since))
            .send()
            .await
            .map_err(|e| StoreError::Dynamo(e.into_service_error().to_string()))?;

        resp.items().iter().map(from_item).collect()
    }
}

fn to_item(request: &ApprovalRequest) -> Item {
    let mut out = Item::new();
    out.insert("id".to_string(), item::s(&request.id));
    out.insert("requester".to_string(), item::s(&request.requester));
    out.insert("profile".to_string(), item::s(&request.profile));
    out.insert(
        "justification".to_string(),
        item::s(&request.justification),
    );
    out.insert("duration".to_string(), item::n(request.duration_seconds));
    out.insert("status".to_string(), item::s(request.status.as_str()));
    out.insert("created_at".to_string(), item::ts_s(request.created_at));
    out.insert("updated_at".to_string(), item::ts_s(request.updated_at));
    out.insert("expires_at".to_string(), item::ts_epoch(request.expires_at));
    if let Some(approver) = &request.approver {
        out.insert("approver".to_string(), item::s(approver));
    }
    if let Some(comment) = &request.approver_comment {
        out.insert("approver_comment".to_string(), item::s(comment));
    }
    out
}

fn from_item(raw: &Item) -> Result<ApprovalRequest, StoreError> {
    let id = item::get_s(raw, "id", "?")?;
    let status = match item::get_s(raw, "status", &id)?.as_str() {
        "pending" => RequestStatus::Pending,
        "approved" => RequestStatus::Approved,
        "denied" => RequestStatus::Denied,
        "expired" => RequestStatus::Expired,
        "cancelled" => RequestStatus::Cancelled,
        _ => {
            return Err(StoreError::Malformed {
                id,
                field: "status".to_string(),
            });
        }
    };

    Ok(ApprovalRequest {
        requester: item::get_s(raw, "requester", &id)?,
        profile: item::get_s(raw, "profile", &id)?,
        justification: item::get_s(raw, "justification", &id)?,
        duration_seconds: item::get_n(raw, "duration", &id)?,
        status,
        created_at: item::get_ts(raw, "created_at", &id)?,
        updated_at: item::get_ts(raw, "updated_at", &id)?,
        expires_at: item::get_ts_epoch(raw, "expires_at", &id)?,
        approver: item::get_opt_s(raw, "approver"),
        approver_comment: item::get_opt_s(raw, "approver_comment"),
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::SignedDuration;

    fn request() -> ApprovalRequest {
        ApprovalRequest::new(
            "alice",
            "prod",
            "deploying the quarterly release",
            SignedDuration::from_secs(3600),
            "2026-01-20T12:00:00Z".parse().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn item_round_trip() {
        let mut r = request();
        r.approver = Some("bob".to_string());
        r.approver_comment = Some("ok for tonight".to_string());

        let back = from_item(&to_item(&r)).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn unknown_status_is_malformed() {
        let mut raw = to_item(&request());
        raw.insert("status".to_string(), item::s("granted"));
        assert!(matches!(
            from_item(&raw),
            Err(StoreError::Malformed { .. })
        ));
    }

    #[test]
    fn terminal_transition_rejected_before_any_write() {
        let mut r = request();
        r.status = RequestStatus::Denied;
        assert!(!r.status.can_transition_to(RequestStatus::Approved));
    }
}
