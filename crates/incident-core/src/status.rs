//! Active Incident Status

use serde::Serialize;
use storage::{Comment, Incident, Store};

use crate::error::IncidentError;
use crate::roles::{Actor, Permissions};

/// The active incident as seen by one caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentView {
    pub incident: Incident,
    pub comments: Vec<Comment>,
    pub permissions: Permissions,
}

/// `{active: false}` or `{active: true, incident, comments, permissions}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentStatusView {
    pub active: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub view: Option<IncidentView>,
}

impl IncidentStatusView {
    /// Read-only; every role including visitor may query
    pub async fn query(store: &dyn Store, actor: &Actor) -> Result<Self, IncidentError> {
        let Some(incident) = store.active_incident().await? else {
            return Ok(Self {
                active: false,
                view: None,
            });
        };

        let comments = store.comments(incident.id).await?;
        Ok(Self {
            active: true,
            view: Some(IncidentView {
                incident,
                comments,
                permissions: actor.role.permissions(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::IncidentEngine;
    use crate::policy::IncidentPolicy;
    use crate::roles::Role;
    use chrono::Utc;
    use std::sync::Arc;
    use storage::{Reading, Repository, ThresholdConfig};

    #[tokio::test]
    async fn test_inactive_shape() {
        let store = Repository::new();
        let view = IncidentStatusView::query(&store, &Actor::new(Role::Visitor, "guest"))
            .await
            .unwrap();
        assert!(!view.active);
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            serde_json::json!({ "active": false })
        );
    }

    #[tokio::test]
    async fn test_visitor_sees_active_incident() {
        let store = Arc::new(Repository::new());
        let engine = IncidentEngine::new(store.clone(), IncidentPolicy::default());
        let reading = Reading {
            id: 1,
            temperature: Some(12.0),
            humidity: Some(60.0),
            timestamp: Utc::now(),
        };
        engine.evaluate(&reading, &ThresholdConfig::default()).await.unwrap();
        let operator = Actor::new(Role::Operator1, "bob");
        let id = store.active_incident().await.unwrap().unwrap().id;
        engine.ledger().add_comment(id, &operator, "on it").await.unwrap();

        let view = IncidentStatusView::query(store.as_ref(), &Actor::new(Role::Visitor, "guest"))
            .await
            .unwrap();
        assert!(view.active);
        let inner = view.view.as_ref().unwrap();
        assert_eq!(inner.comments.len(), 1);
        assert!(!inner.permissions.can_comment);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["active"], true);
        assert_eq!(json["incident"]["counter"], 1);
        assert_eq!(json["permissions"]["can_edit_actions"], serde_json::json!([false, false, false]));
    }
}
