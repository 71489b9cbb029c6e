//! Corrective Action Ledger
//!
//! Role-gated writes on the active incident: acknowledgement, the three
//! corrective action slots and the comment log. A patch is checked field by
//! field against the capability table before anything is written; one denied
//! field rejects the whole request.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use storage::{Comment, Incident, IncidentId, Store, ACTION_SLOTS};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::IncidentError;
use crate::roles::{Actor, Capability};

/// Requested change to one corrective action slot
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotPatch {
    pub checked: Option<bool>,
    pub comment: Option<String>,
}

impl SlotPatch {
    fn is_empty(&self) -> bool {
        self.checked.is_none() && self.comment.is_none()
    }
}

/// Partial update of the active incident; absent fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncidentPatch {
    pub acknowledged: Option<bool>,
    pub action1: Option<SlotPatch>,
    pub action2: Option<SlotPatch>,
    pub action3: Option<SlotPatch>,
}

impl IncidentPatch {
    fn slots(&self) -> [Option<&SlotPatch>; ACTION_SLOTS] {
        [
            self.action1.as_ref(),
            self.action2.as_ref(),
            self.action3.as_ref(),
        ]
    }

    /// Capabilities needed to apply this patch, in field order
    fn required_capabilities(&self) -> Vec<Capability> {
        let mut required = Vec::new();
        if self.acknowledged.is_some() {
            required.push(Capability::Acknowledge);
        }
        for (index, slot) in self.slots().into_iter().enumerate() {
            if slot.map_or(false, |s| !s.is_empty()) {
                required.extend(Capability::for_slot(index));
            }
        }
        required
    }
}

/// Writes on the active incident, serialized with the incident engine
#[derive(Clone)]
pub struct CorrectiveActionLedger {
    store: Arc<dyn Store>,
    section: Arc<Mutex<()>>,
}

impl CorrectiveActionLedger {
    pub(crate) fn new(store: Arc<dyn Store>, section: Arc<Mutex<()>>) -> Self {
        Self { store, section }
    }

    /// Apply `patch` to the active incident `incident_id`
    pub async fn apply(
        &self,
        incident_id: IncidentId,
        actor: &Actor,
        patch: IncidentPatch,
    ) -> Result<Incident, IncidentError> {
        if let Some(denied) = patch
            .required_capabilities()
            .into_iter()
            .find(|cap| !actor.role.allows(*cap))
        {
            return Err(IncidentError::PermissionDenied {
                role: actor.role.to_string(),
                field: denied.as_str().to_string(),
            });
        }

        let _guard = self.section.lock().await;
        let mut incident = self.active(incident_id).await?;
        let now = Utc::now();

        if let Some(acknowledged) = patch.acknowledged {
            if acknowledged && !incident.acknowledged {
                incident.acknowledged_by = Some(actor.identity.clone());
                incident.acknowledged_at = Some(now);
            } else if !acknowledged {
                incident.acknowledged_by = None;
                incident.acknowledged_at = None;
            }
            incident.acknowledged = acknowledged;
        }

        for (slot, change) in incident
            .corrective_actions
            .iter_mut()
            .zip(patch.slots())
        {
            let Some(change) = change else { continue };
            if let Some(checked) = change.checked {
                if checked && !slot.checked {
                    slot.owner = Some(actor.identity.clone());
                    slot.acted_at = Some(now);
                } else if !checked {
                    slot.owner = None;
                    slot.acted_at = None;
                }
                slot.checked = checked;
            }
            if let Some(comment) = &change.comment {
                let comment = comment.trim();
                slot.comment = (!comment.is_empty()).then(|| comment.to_string());
            }
        }

        self.store.update_incident(&incident).await?;
        info!("Incident {} updated by {} ({})", incident.id, actor.identity, actor.role);
        Ok(incident)
    }

    /// Append a comment to the active incident `incident_id`
    pub async fn add_comment(
        &self,
        incident_id: IncidentId,
        actor: &Actor,
        text: &str,
    ) -> Result<Comment, IncidentError> {
        if !actor.role.allows(Capability::Comment) {
            return Err(IncidentError::PermissionDenied {
                role: actor.role.to_string(),
                field: Capability::Comment.as_str().to_string(),
            });
        }
        let content = text.trim();
        if content.is_empty() {
            return Err(IncidentError::EmptyContent);
        }

        let _guard = self.section.lock().await;
        self.active(incident_id).await?;

        let comment = self
            .store
            .insert_comment(Comment {
                id: 0,
                incident_id,
                author: actor.identity.clone(),
                content: content.to_string(),
                created_at: Utc::now(),
            })
            .await?;
        debug!("Comment {} added to incident {}", comment.id, incident_id);
        Ok(comment)
    }

    async fn active(&self, incident_id: IncidentId) -> Result<Incident, IncidentError> {
        match self.store.active_incident().await? {
            Some(incident) if incident.id == incident_id => Ok(incident),
            _ => Err(IncidentError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::IncidentEngine;
    use crate::policy::IncidentPolicy;
    use crate::roles::Role;
    use storage::{Reading, Repository, ThresholdConfig};

    async fn setup() -> (Arc<Repository>, IncidentEngine, IncidentId) {
        let store = Arc::new(Repository::new());
        let engine = IncidentEngine::new(store.clone(), IncidentPolicy::default());
        let reading = Reading {
            id: 1,
            temperature: Some(11.0),
            humidity: Some(50.0),
            timestamp: Utc::now(),
        };
        let transition = engine
            .evaluate(&reading, &ThresholdConfig::default())
            .await
            .unwrap();
        let id = transition.incident().unwrap().id;
        (store, engine, id)
    }

    fn check_slot(slot: usize) -> IncidentPatch {
        let change = Some(SlotPatch {
            checked: Some(true),
            comment: None,
        });
        match slot {
            1 => IncidentPatch { action1: change, ..Default::default() },
            2 => IncidentPatch { action2: change, ..Default::default() },
            _ => IncidentPatch { action3: change, ..Default::default() },
        }
    }

    #[tokio::test]
    async fn test_operator_only_writes_own_slot() {
        let (_store, engine, id) = setup().await;
        let ledger = engine.ledger();
        let operator = Actor::new(Role::Operator2, "bob");

        for slot in [1, 3] {
            match ledger.apply(id, &operator, check_slot(slot)).await {
                Err(IncidentError::PermissionDenied { field, .. }) => {
                    assert_eq!(field, format!("action{}", slot))
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        let incident = ledger.apply(id, &operator, check_slot(2)).await.unwrap();
        assert!(incident.corrective_actions[1].checked);
        assert_eq!(incident.corrective_actions[1].owner.as_deref(), Some("bob"));
        assert!(incident.corrective_actions[1].acted_at.is_some());
    }

    #[tokio::test]
    async fn test_admin_writes_any_slot() {
        let (_store, engine, id) = setup().await;
        let ledger = engine.ledger();
        let admin = Actor::new(Role::Admin, "alice");

        for slot in 1..=3 {
            ledger.apply(id, &admin, check_slot(slot)).await.unwrap();
        }
        let incident = ledger.apply(id, &admin, IncidentPatch::default()).await.unwrap();
        assert!(incident.corrective_actions.iter().all(|a| a.checked));
    }

    #[tokio::test]
    async fn test_denied_field_rejects_whole_request() {
        let (store, engine, id) = setup().await;
        let ledger = engine.ledger();
        let operator = Actor::new(Role::Operator1, "carol");

        let patch = IncidentPatch {
            acknowledged: Some(true),
            action1: Some(SlotPatch {
                checked: Some(true),
                comment: Some("moved stock".to_string()),
            }),
            action2: Some(SlotPatch {
                checked: Some(true),
                comment: None,
            }),
            ..Default::default()
        };
        assert!(matches!(
            ledger.apply(id, &operator, patch).await,
            Err(IncidentError::PermissionDenied { .. })
        ));

        let incident = store.active_incident().await.unwrap().unwrap();
        assert!(!incident.acknowledged);
        assert!(!incident.corrective_actions[0].checked);
    }

    #[tokio::test]
    async fn test_uncheck_clears_stamp() {
        let (_store, engine, id) = setup().await;
        let ledger = engine.ledger();
        let operator = Actor::new(Role::Operator3, "dave");

        ledger.apply(id, &operator, check_slot(3)).await.unwrap();
        let patch = IncidentPatch {
            action3: Some(SlotPatch {
                checked: Some(false),
                comment: Some("  door closed  ".to_string()),
            }),
            ..Default::default()
        };
        let incident = ledger.apply(id, &operator, patch).await.unwrap();
        let slot = &incident.corrective_actions[2];
        assert!(!slot.checked);
        assert_eq!(slot.owner, None);
        assert_eq!(slot.acted_at, None);
        assert_eq!(slot.comment.as_deref(), Some("door closed"));
    }

    #[tokio::test]
    async fn test_acknowledge_stamps_identity() {
        let (_store, engine, id) = setup().await;
        let ledger = engine.ledger();
        let operator = Actor::new(Role::Operator1, "erin");

        let patch = IncidentPatch {
            acknowledged: Some(true),
            ..Default::default()
        };
        let incident = ledger.apply(id, &operator, patch).await.unwrap();
        assert!(incident.acknowledged);
        assert_eq!(incident.acknowledged_by.as_deref(), Some("erin"));
        assert!(incident.acknowledged_at.is_some());
    }

    #[tokio::test]
    async fn test_visitor_cannot_acknowledge_or_comment() {
        let (_store, engine, id) = setup().await;
        let ledger = engine.ledger();
        let visitor = Actor::new(Role::Visitor, "guest");

        let patch = IncidentPatch {
            acknowledged: Some(true),
            ..Default::default()
        };
        assert!(matches!(
            ledger.apply(id, &visitor, patch).await,
            Err(IncidentError::PermissionDenied { .. })
        ));
        assert!(matches!(
            ledger.add_comment(id, &visitor, "hello").await,
            Err(IncidentError::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_comments() {
        let (store, engine, id) = setup().await;
        let ledger = engine.ledger();
        let operator = Actor::new(Role::Operator2, "bob");

        assert!(matches!(
            ledger.add_comment(id, &operator, "   ").await,
            Err(IncidentError::EmptyContent)
        ));
        assert!(matches!(
            ledger.add_comment(id + 1, &operator, "wrong incident").await,
            Err(IncidentError::NotFound)
        ));

        let comment = ledger.add_comment(id, &operator, " checked the seal ").await.unwrap();
        assert_eq!(comment.content, "checked the seal");
        assert_eq!(comment.author, "bob");
        assert_eq!(store.comments(id).await.unwrap().len(), 1);
    }

    #[test]
    fn test_patch_rejects_unknown_fields() {
        let patch: IncidentPatch =
            serde_json::from_str(r#"{"acknowledged": true, "action2": {"checked": true}}"#).unwrap();
        assert_eq!(patch.acknowledged, Some(true));
        assert_eq!(patch.action2.unwrap().checked, Some(true));

        assert!(serde_json::from_str::<IncidentPatch>(r#"{"acknowleged": true}"#).is_err());
        assert!(serde_json::from_str::<IncidentPatch>(r#"{"action1": {"checkd": true}}"#).is_err());
    }

    #[tokio::test]
    async fn test_closed_incident_is_not_found() {
        let (_store, engine, id) = setup().await;
        let normal = Reading {
            id: 2,
            temperature: Some(5.0),
            humidity: None,
            timestamp: Utc::now(),
        };
        engine.evaluate(&normal, &ThresholdConfig::default()).await.unwrap();

        let admin = Actor::new(Role::Admin, "alice");
        assert!(matches!(
            engine.ledger().apply(id, &admin, check_slot(1)).await,
            Err(IncidentError::NotFound)
        ));
        assert!(matches!(
            engine.ledger().add_comment(id, &admin, "too late").await,
            Err(IncidentError::NotFound)
        ));
    }
}
