//! Break-glass event store.
//!
//! Emergency access events are append-heavy and rate-limited: creation
//! first counts the invoker's and the profile's recent events through the
//! GSIs and refuses with a typed retry-after when a cooldown or quota is
//! hit. Rate decisions are advisory only in the sense that they gate
//! creation; they never mutate existing rows.

use aws_sdk_dynamodb::Client;
use jiff::{SignedDuration, Timestamp};

use sentinel_core::models::{BreakGlassEvent, BreakGlassStatus, ReasonCode};
use sentinel_policy::RateLimitPolicy;

use crate::error::StoreError;
use crate::item::{self, Item};
use crate::{GSI_PRINCIPAL, GSI_PROFILE, GSI_STATUS};

#[derive(Clone)]
pub struct BreakGlassStore {
    client: Client,
    table: String,
}

impl BreakGlassStore {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self::with_table(config, crate::BREAKGLASS_TABLE)
    }

    pub fn with_table(config: &aws_config::SdkConfig, table: impl Into<String>) -> Self {
        Self {
            client: Client::new(config),
            table: table.into(),
        }
    }

    /// Rate-check, then insert. The returned error carries `retry_after`
    /// when a cooldown or quota refused the event.
    pub async fn create(
        &self,
        event: &BreakGlassEvent,
        limits: &RateLimitPolicy,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        self.check_rate_limit(&event.invoker, &event.profile, limits, now)
            .await?;

        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(to_item(event)))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
            .map_err(|e| {
                let err = e.into_service_error();
                if err.is_conditional_check_failed_exception() {
                    StoreError::IdCollision {
                        id: event.id.clone(),
                    }
                } else {
                    StoreError::Dynamo(err.to_string())
                }
            })?;

        tracing::warn!(
            id = %event.id,
            invoker = %event.invoker,
            profile = %event.profile,
            reason_code = event.reason_code.as_str(),
            "break-glass event created"
        );
        Ok(())
    }

    /// Sliding-window rate limiting over the GSIs.
    ///
    /// Cooldown: the invoker's most recent event must be at least
    /// `cooldown` old. Quotas: events per invoker and per profile within
    /// `quota_window` must stay under their maxima. Crossing the
    /// escalation threshold logs; it does not refuse.
    pub async fn check_rate_limit(
        &self,
        invoker: &str,
        profile: &str,
        limits: &RateLimitPolicy,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        let window_start = now - limits.quota_window();

        let by_invoker = self.query_invoker_since(invoker, window_start).await?;

        if let Some(latest) = by_invoker.iter().map(|e| e.created_at).max() {
            let cooldown_over = latest + limits.cooldown();
            if now < cooldown_over {
                return Err(StoreError::RateLimited {
                    retry_after_seconds: seconds_until(now, cooldown_over),
                });
            }
        }

        if by_invoker.len() >= limits.max_per_user as usize {
            return Err(StoreError::RateLimited {
                retry_after_seconds: window_retry(&by_invoker, limits.quota_window(), now),
            });
        }

        let by_profile = self.query_profile_since(profile, window_start).await?;
        if by_profile.len() >= limits.max_per_profile as usize {
            return Err(StoreError::RateLimited {
                retry_after_seconds: window_retry(&by_profile, limits.quota_window(), now),
            });
        }

        if by_invoker.len() + 1 >= limits.escalation_threshold as usize {
            tracing::warn!(
                invoker = invoker,
                count = by_invoker.len() + 1,
                threshold = limits.escalation_threshold,
                "break-glass escalation threshold reached"
            );
        }

        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<BreakGlassEvent, StoreError> {
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

    /// Close an active event. Conditional on the observed `updated_at`.
    pub async fn close(
        &self,
        current: &BreakGlassEvent,
        closed_by: &str,
        closed_reason: &str,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        self.transition(
            current,
            BreakGlassStatus::Closed,
            Some((closed_by, closed_reason)),
            now,
        )
        .await
    }

    /// Repair pass: any `active` event past its TTL anchor becomes
    /// `expired`.
    pub async fn expire_stale(&self, now: Timestamp) -> Result<usize, StoreError> {
        let active = self.list_by_status(BreakGlassStatus::Active).await?;
        let mut expired = 0;
        for event in active {
            if !event.is_expired(now) {
                continue;
            }
            match self
                .transition(&event, BreakGlassStatus::Expired, None, now)
                .await
            {
                Ok(()) => expired += 1,
                Err(StoreError::ConcurrentModification { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(expired)
    }

    pub async fn list_by_invoker(
        &self,
        invoker: &str,
        since: Timestamp,
    ) -> Result<Vec<BreakGlassEvent>, StoreError> {
        self.query_invoker_since(invoker, since).await
    }

    pub async fn list_by_profile(
        &self,
        profile: &str,
    ) -> Result<Vec<BreakGlassEvent>, StoreError> {
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
        status: BreakGlassStatus,
    ) -> Result<Vec<BreakGlassEvent>, StoreError> {
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

    async fn transition(
        &self,
        current: &BreakGlassEvent,
        to: BreakGlassStatus,
        closed: Option<(&str, &str)>,
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

        if let Some((closed_by, closed_reason)) = closed {
            expression.push_str(", closed_by = :closed_by, closed_reason = :closed_reason");
            update = update
                .expression_attribute_values(":closed_by", item::s(closed_by))
                .expression_attribute_values(":closed_reason", item::s(closed_reason));
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
            "break-glass event transitioned"
        );
        Ok(())
    }

    async fn query_invoker_since(
        &self,
        invoker: &str,
        since: Timestamp,
    ) -> Result<Vec<BreakGlassEvent>, StoreError> {
        let resp = self
            .client
            .query()
            .table_name(&self.table)
            .index_name(GSI_PRINCIPAL)
            .key_condition_expression("invoker = :invoker AND created_at >= :since")
            .expression_attribute_values(":invoker", item::s(invoker))
            .expression_attribute_values(":since", item::ts_s(since))
            .send()
            .await
            .map_err(|e| StoreError::Dynamo(e.into_service_error().to_string()))?;

        resp.items().iter().map(from_item).collect()
    }

    async fn query_profile_since(
        &self,
        profile: &str,
        since: Timestamp,
    ) -> Result<Vec<BreakGlassEvent>, StoreError> {
        let resp = self
            .client
            .query()
            .table_name(&self.table)
            .index_name(GSI_PROFILE)
            .key_condition_expression("#profile = :profile AND created_at >= :since")
            .expression_attribute_names("#profile", "profile")
            .expression_attribute_values(":profile", item::s(profile))
            .expression_attribute_values(":since", item::ts_s(since))
            .send()
            .await
            .map_err(|e| StoreError::Dynamo(e.into_service_error().to_string()))?;

        resp.items().iter().map(from_item).collect()
    }
}

fn seconds_until(now: Timestamp, then: Timestamp) -> i64 {
    (then.as_second() - now.as_second()).max(1)
}

/// Retry hint for a full quota window: when the oldest counted event
/// slides out of the window.
fn window_retry(events: &[BreakGlassEvent], window: SignedDuration, now: Timestamp) -> i64 {
    events
        .iter()
        .map(|e| e.created_at)
        .min()
        .map(|oldest| seconds_until(now, oldest + window))
        .unwrap_or(1)
}

fn to_item(event: &BreakGlassEvent) -> Item {
    let mut out = Item::new();
    out.insert("id".to_string(), item::s(&event.id));
    out.insert("invoker".to_string(), item::s(&event.invoker));
    out.insert("profile".to_string(), item::s(&event.profile));
    out.insert(
        "reason_code".to_string(),
        item::s(event.reason_code.as_str()),
    );
    out.insert(
        "justification".to_string(),
        item::s(&event.justification),
    );
    out.insert("duration".to_string(), item::n(event.duration_seconds));
    out.insert("status".to_string(), item::s(event.status.as_str()));
    out.insert("created_at".to_string(), item::ts_s(event.created_at));
    out.insert("updated_at".to_string(), item::ts_s(event.updated_at));
    out.insert("expires_at".to_string(), item::ts_epoch(event.expires_at));
    out.insert("request_id".to_string(), item::s(&event.request_id));
    if let Some(closed_by) = &event.closed_by {
        out.insert("closed_by".to_string(), item::s(closed_by));
    }
    if let Some(closed_reason) = &event.closed_reason {
        out.insert("closed_reason".to_string(), item::s(closed_reason));
    }
    out
}

fn from_item(raw: &Item) -> Result<BreakGlassEvent, StoreError> {
    let id = item::get_s(raw, "id", "?")?;

    let status = match item::get_s(raw, "status", &id)?.as_str() {
        "active" => BreakGlassStatus::Active,
        "expired" => BreakGlassStatus::Expired,
        "closed" => BreakGlassStatus::Closed,
        _ => {
            return Err(StoreError::Malformed {
                id,
                field: "status".to_string(),
            });
        }
    };
    let reason_code = match item::get_s(raw, "reason_code", &id)?.as_str() {
        "incident" => ReasonCode::Incident,
        "maintenance" => ReasonCode::Maintenance,
        "security" => ReasonCode::Security,
        "recovery" => ReasonCode::Recovery,
        "other" => ReasonCode::Other,
        _ => {
            return Err(StoreError::Malformed {
                id,
                field: "reason_code".to_string(),
            });
        }
    };

    Ok(BreakGlassEvent {
        invoker: item::get_s(raw, "invoker", &id)?,
        profile: item::get_s(raw, "profile", &id)?,
        reason_code,
        justification: item::get_s(raw, "justification", &id)?,
        duration_seconds: item::get_n(raw, "duration", &id)?,
        status,
        created_at: item::get_ts(raw, "created_at", &id)?,
        updated_at: item::get_ts(raw, "updated_at", &id)?,
        expires_at: item::get_ts_epoch(raw, "expires_at", &id)?,
        request_id: item::get_s(raw, "request_id", &id)?,
        closed_by: item::get_opt_s(raw, "closed_by"),
        closed_reason: item::get_opt_s(raw, "closed_reason"),
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::SignedDuration;
    use sentinel_core::models::ReasonCode;

    fn event(created_at: &str) -> BreakGlassEvent {
        BreakGlassEvent::new(
            "alice",
            "prod",
            ReasonCode::Incident,
            "SEV-1: primary database unreachable",
            SignedDuration::from_secs(1800),
            created_at.parse().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn item_round_trip() {
        let mut ev = event("2026-01-20T12:00:00Z");
        ev.closed_by = Some("bob".to_string());
        ev.closed_reason = Some("incident resolved".to_string());
        let back = from_item(&to_item(&ev)).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn window_retry_points_at_oldest_event_exit() {
        let now: Timestamp = "2026-01-20T12:00:00Z".parse().unwrap();
        let events = vec![
            event("2026-01-20T10:00:00Z"),
            event("2026-01-20T11:30:00Z"),
        ];
        // Oldest at 10:00, 4h window: slot opens at 14:00, 7200s away.
        let retry = window_retry(&events, SignedDuration::from_secs(4 * 3600), now);
        assert_eq!(retry, 7200);
    }

    #[test]
    fn seconds_until_never_reports_zero() {
        let now: Timestamp = "2026-01-20T12:00:00Z".parse().unwrap();
        assert_eq!(seconds_until(now, now), 1);
    }
}
