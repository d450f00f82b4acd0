//! Definition lifecycle: create, edit, validate, publish, duplicate, and
//! status management, with every mutation audited.

use recorrido_core::audit::actions;
use recorrido_core::definition::RecorridoDefinition;
use recorrido_core::normalize::{normalize, NormalizeOptions};
use recorrido_core::slug::validate_slug_id;
use recorrido_core::validate::{validate_for_draft, validate_for_publish, PublishValidation};
use recorrido_db::models::audit::AppendAuditEntry;
use recorrido_db::models::draft::RecorridoDraft;
use recorrido_db::models::recorrido::{status, CreateRecorrido, Recorrido, UpdateRecorridoMeta};
use recorrido_db::models::version::RecorridoVersion;
use recorrido_db::repositories::{AuditRepo, DraftRepo, RecorridoRepo, VersionRepo};
use recorrido_db::DbPool;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::EngineError;

/// Input for registering a new recorrido. When no definition is given the
/// draft starts as an empty skeleton the editor fills in later.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRecorridoInput {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub definition: Option<RecorridoDefinition>,
}

/// Lifecycle operations over the registry, draft, version, and audit
/// stores. Cheap to clone; constructed once at startup.
#[derive(Clone)]
pub struct LifecycleService {
    pool: DbPool,
}

impl LifecycleService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    // -----------------------------------------------------------------------
    // Create / edit
    // -----------------------------------------------------------------------

    /// Register a new recorrido with its first draft.
    pub async fn create_recorrido(
        &self,
        input: &CreateRecorridoInput,
        actor: &str,
    ) -> Result<(Recorrido, RecorridoDraft), EngineError> {
        validate_slug_id(&input.id).map_err(|e| EngineError::InvalidSlug(e.to_string()))?;

        let definition_json = match &input.definition {
            Some(definition) => {
                let report = validate_for_draft(definition);
                if !report.valid {
                    return Err(EngineError::DraftInvalid {
                        errors: report.errors,
                    });
                }
                to_json(&normalize(definition, &NormalizeOptions::default()))?
            }
            None => serde_json::json!({
                "id": input.id,
                "entry_step_id": "",
                "steps": {},
                "edges": [],
            }),
        };

        let recorrido = RecorridoRepo::create(
            &self.pool,
            &CreateRecorrido {
                id: input.id.clone(),
                name: input.name.clone(),
                description: input.description.clone(),
            },
        )
        .await
        .map_err(|e| map_unique(e, &input.id))?;

        let draft = DraftRepo::create(&self.pool, &recorrido.id, &definition_json, actor).await?;
        let recorrido = RecorridoRepo::update_meta(
            &self.pool,
            &recorrido.id,
            &UpdateRecorridoMeta {
                current_draft_id: Some(draft.id),
                ..Default::default()
            },
        )
        .await?
        .ok_or_else(|| EngineError::RecorridoNotFound(input.id.clone()))?;

        self.audit(
            &recorrido.id,
            Some(draft.id),
            actions::CREATE,
            actor,
            serde_json::json!({ "name": recorrido.name }),
        )
        .await?;

        info!(recorrido_id = %recorrido.id, "recorrido created");
        Ok((recorrido, draft))
    }

    /// Replace the current draft's definition.
    ///
    /// Rejected definitions never touch the stored draft.
    pub async fn update_draft(
        &self,
        recorrido_id: &str,
        definition: &RecorridoDefinition,
        actor: &str,
    ) -> Result<RecorridoDraft, EngineError> {
        let recorrido = self.find_live(recorrido_id).await?;

        let report = validate_for_draft(definition);
        if !report.valid {
            return Err(EngineError::DraftInvalid {
                errors: report.errors,
            });
        }
        let normalized = to_json(&normalize(definition, &NormalizeOptions::default()))?;

        let current = DraftRepo::find_current(&self.pool, &recorrido.id)
            .await?
            .ok_or_else(|| EngineError::DraftNotFound(recorrido.id.clone()))?;

        let before = current.definition_json.clone();
        let updated = DraftRepo::update_definition(&self.pool, current.id, &normalized, actor)
            .await?
            .ok_or(EngineError::StaleDraft)?;

        self.audit(
            &recorrido.id,
            Some(updated.id),
            actions::UPDATE_DRAFT,
            actor,
            serde_json::json!({ "before": before, "after": normalized }),
        )
        .await?;

        Ok(updated)
    }

    /// Save the editor canvas against a specific draft row.
    ///
    /// The canvas write path is independent of the definition so autosaves
    /// of node positions never race a definition edit. A zero row count
    /// means the draft id is no longer the current one.
    pub async fn save_canvas(
        &self,
        recorrido_id: &str,
        draft_id: Uuid,
        canvas: &serde_json::Value,
        actor: &str,
    ) -> Result<(), EngineError> {
        let recorrido = self.find_live(recorrido_id).await?;

        let affected =
            DraftRepo::update_canvas(&self.pool, &recorrido.id, draft_id, canvas, actor).await?;
        if affected == 0 {
            return Err(EngineError::StaleDraft);
        }

        self.audit(
            &recorrido.id,
            Some(draft_id),
            actions::SAVE_CANVAS,
            actor,
            serde_json::json!({}),
        )
        .await?;

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Validation / publish
    // -----------------------------------------------------------------------

    /// Run the publish-tier validator in advisory mode, against either a
    /// supplied definition or the current draft.
    pub async fn validate_draft(
        &self,
        recorrido_id: &str,
        definition: Option<&RecorridoDefinition>,
        actor: &str,
    ) -> Result<PublishValidation, EngineError> {
        let recorrido = self.find_live(recorrido_id).await?;

        let report = match definition {
            Some(definition) => validate_for_publish(definition),
            None => {
                let draft = self.current_definition(&recorrido.id).await?;
                validate_for_publish(&draft)
            }
        };

        self.audit(
            &recorrido.id,
            None,
            actions::VALIDATE_DRAFT,
            actor,
            serde_json::json!({
                "valid": report.valid,
                "errors": report.errors,
                "warnings": report.warnings,
            }),
        )
        .await?;

        Ok(report)
    }

    /// Publish the current draft as the next immutable version.
    ///
    /// Version insert, registry pointer flip, and audit entry commit in one
    /// transaction; a failed validation audits the attempt and changes
    /// nothing else.
    pub async fn publish(
        &self,
        recorrido_id: &str,
        release_notes: Option<&str>,
        actor: &str,
    ) -> Result<RecorridoVersion, EngineError> {
        let recorrido = self.find_live(recorrido_id).await?;
        let definition = self.current_definition(&recorrido.id).await?;

        let report = validate_for_publish(&definition);
        if !report.valid {
            self.audit(
                &recorrido.id,
                None,
                actions::PUBLISH,
                actor,
                serde_json::json!({ "accepted": false, "errors": report.errors }),
            )
            .await?;
            return Err(EngineError::PublishBlocked {
                errors: report.errors,
                warnings: report.warnings,
            });
        }

        let definition_json = to_json(&definition)?;

        let mut tx = self.pool.begin().await?;
        // The registry row lock serializes concurrent publishes so the
        // MAX(version) + 1 below cannot be computed twice for the same value.
        RecorridoRepo::lock_in_tx(&mut tx, &recorrido.id).await?;
        let next = VersionRepo::latest_version_in_tx(&mut tx, &recorrido.id)
            .await?
            .unwrap_or(0)
            + 1;
        let version = VersionRepo::create_in_tx(
            &mut tx,
            &recorrido.id,
            next,
            &definition_json,
            release_notes,
            actor,
        )
        .await?;
        RecorridoRepo::update_meta_in_tx(
            &mut tx,
            &recorrido.id,
            &UpdateRecorridoMeta {
                status: Some(status::PUBLISHED.to_string()),
                current_published_version: Some(next),
                ..Default::default()
            },
        )
        .await?;
        AuditRepo::append_in_tx(
            &mut tx,
            &AppendAuditEntry {
                recorrido_id: recorrido.id.clone(),
                draft_id: None,
                action: actions::PUBLISH.to_string(),
                actor: actor.to_string(),
                detail_json: serde_json::json!({
                    "accepted": true,
                    "version": next,
                    "warnings": report.warnings,
                }),
            },
        )
        .await?;
        tx.commit().await?;

        info!(recorrido_id = %recorrido.id, version = next, "version published");
        Ok(version)
    }

    // -----------------------------------------------------------------------
    // Duplicate
    // -----------------------------------------------------------------------

    /// Copy a recorrido's current draft into a brand-new recorrido.
    ///
    /// The copy gets a fresh draft row, so autosaves still in flight
    /// against the source's draft id fail the canvas row-count check
    /// instead of landing on the copy.
    pub async fn duplicate(
        &self,
        recorrido_id: &str,
        new_id: &str,
        new_name: &str,
        actor: &str,
    ) -> Result<(Recorrido, RecorridoDraft), EngineError> {
        validate_slug_id(new_id).map_err(|e| EngineError::InvalidSlug(e.to_string()))?;
        let source = self.find_live(recorrido_id).await?;
        let mut definition = self.current_definition(&source.id).await?;
        definition.id = new_id.to_string();
        let definition_json = to_json(&definition)?;

        let mut tx = self.pool.begin().await?;
        let copy = RecorridoRepo::create_in_tx(
            &mut tx,
            &CreateRecorrido {
                id: new_id.to_string(),
                name: new_name.to_string(),
                description: source.description.clone(),
            },
        )
        .await
        .map_err(|e| map_unique(e, new_id))?;
        let draft = DraftRepo::create_in_tx(&mut tx, &copy.id, &definition_json, actor).await?;
        let copy = RecorridoRepo::update_meta_in_tx(
            &mut tx,
            &copy.id,
            &UpdateRecorridoMeta {
                current_draft_id: Some(draft.id),
                ..Default::default()
            },
        )
        .await?
        .ok_or_else(|| EngineError::RecorridoNotFound(new_id.to_string()))?;
        AuditRepo::append_in_tx(
            &mut tx,
            &AppendAuditEntry {
                recorrido_id: source.id.clone(),
                draft_id: None,
                action: actions::DUPLICATE.to_string(),
                actor: actor.to_string(),
                detail_json: serde_json::json!({ "copied_to": copy.id }),
            },
        )
        .await?;
        AuditRepo::append_in_tx(
            &mut tx,
            &AppendAuditEntry {
                recorrido_id: copy.id.clone(),
                draft_id: Some(draft.id),
                action: actions::DUPLICATE.to_string(),
                actor: actor.to_string(),
                detail_json: serde_json::json!({ "copied_from": source.id }),
            },
        )
        .await?;
        tx.commit().await?;

        Ok((copy, draft))
    }

    // -----------------------------------------------------------------------
    // Status management
    // -----------------------------------------------------------------------

    /// Move a recorrido between `draft` and `published`.
    ///
    /// Forward only: `published` requires at least one published version,
    /// and a published recorrido does not go back to `draft`.
    pub async fn set_status(
        &self,
        recorrido_id: &str,
        new_status: &str,
        actor: &str,
    ) -> Result<Recorrido, EngineError> {
        let recorrido = self.find_live(recorrido_id).await?;

        match new_status {
            status::PUBLISHED if recorrido.current_published_version.is_none() => {
                return Err(EngineError::InvalidStatus(
                    "no se puede marcar como publicado sin una versión publicada".to_string(),
                ));
            }
            status::PUBLISHED => {}
            status::DRAFT if recorrido.status == status::PUBLISHED => {
                return Err(EngineError::InvalidStatus(
                    "un recorrido publicado no vuelve a draft".to_string(),
                ));
            }
            status::DRAFT => {}
            other => {
                return Err(EngineError::InvalidStatus(format!(
                    "estado desconocido: {other}"
                )));
            }
        }

        let before = recorrido.status.clone();
        let updated = RecorridoRepo::update_meta(
            &self.pool,
            &recorrido.id,
            &UpdateRecorridoMeta {
                status: Some(new_status.to_string()),
                ..Default::default()
            },
        )
        .await?
        .ok_or_else(|| EngineError::RecorridoNotFound(recorrido.id.clone()))?;

        self.audit(
            &updated.id,
            None,
            actions::SET_STATUS,
            actor,
            serde_json::json!({ "before": before, "after": new_status }),
        )
        .await?;

        Ok(updated)
    }

    /// Soft-delete. Idempotent: deleting an already-deleted recorrido
    /// returns it unchanged without a second audit entry.
    pub async fn soft_delete(
        &self,
        recorrido_id: &str,
        actor: &str,
    ) -> Result<Recorrido, EngineError> {
        let recorrido = RecorridoRepo::find_by_id(&self.pool, recorrido_id)
            .await?
            .ok_or_else(|| EngineError::RecorridoNotFound(recorrido_id.to_string()))?;
        if recorrido.status == status::DELETED {
            return Ok(recorrido);
        }

        let before = recorrido.status.clone();
        let deleted = RecorridoRepo::soft_delete(&self.pool, &recorrido.id)
            .await?
            .ok_or_else(|| EngineError::RecorridoNotFound(recorrido.id.clone()))?;

        self.audit(
            &deleted.id,
            None,
            actions::SOFT_DELETE,
            actor,
            serde_json::json!({ "before": before, "after": status::DELETED }),
        )
        .await?;

        Ok(deleted)
    }

    /// Restore a soft-deleted recorrido, back to `published` if it has a
    /// published version and `draft` otherwise.
    pub async fn restore(&self, recorrido_id: &str, actor: &str) -> Result<Recorrido, EngineError> {
        let recorrido = RecorridoRepo::find_by_id(&self.pool, recorrido_id)
            .await?
            .ok_or_else(|| EngineError::RecorridoNotFound(recorrido_id.to_string()))?;
        if recorrido.status != status::DELETED {
            return Err(EngineError::InvalidStatus(
                "sólo un recorrido eliminado puede restaurarse".to_string(),
            ));
        }

        let target = if recorrido.current_published_version.is_some() {
            status::PUBLISHED
        } else {
            status::DRAFT
        };
        let restored = RecorridoRepo::update_meta(
            &self.pool,
            &recorrido.id,
            &UpdateRecorridoMeta {
                status: Some(target.to_string()),
                ..Default::default()
            },
        )
        .await?
        .ok_or_else(|| EngineError::RecorridoNotFound(recorrido.id.clone()))?;

        self.audit(
            &restored.id,
            None,
            actions::RESTORE,
            actor,
            serde_json::json!({ "before": status::DELETED, "after": target }),
        )
        .await?;

        Ok(restored)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Registry lookup that excludes soft-deleted rows.
    pub async fn find_live(&self, recorrido_id: &str) -> Result<Recorrido, EngineError> {
        let recorrido = RecorridoRepo::find_by_id(&self.pool, recorrido_id)
            .await?
            .filter(|r| r.status != status::DELETED)
            .ok_or_else(|| EngineError::RecorridoNotFound(recorrido_id.to_string()))?;
        Ok(recorrido)
    }

    /// The current draft's parsed definition.
    pub async fn current_definition(
        &self,
        recorrido_id: &str,
    ) -> Result<RecorridoDefinition, EngineError> {
        let draft = DraftRepo::find_current(&self.pool, recorrido_id)
            .await?
            .ok_or_else(|| EngineError::DraftNotFound(recorrido_id.to_string()))?;
        serde_json::from_value(draft.definition_json)
            .map_err(|e| EngineError::CorruptDefinition(e.to_string()))
    }

    async fn audit(
        &self,
        recorrido_id: &str,
        draft_id: Option<Uuid>,
        action: &str,
        actor: &str,
        detail: serde_json::Value,
    ) -> Result<(), EngineError> {
        AuditRepo::append(
            &self.pool,
            &AppendAuditEntry {
                recorrido_id: recorrido_id.to_string(),
                draft_id,
                action: action.to_string(),
                actor: actor.to_string(),
                detail_json: detail,
            },
        )
        .await?;
        Ok(())
    }
}

fn to_json(definition: &RecorridoDefinition) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(definition).map_err(|e| EngineError::CorruptDefinition(e.to_string()))
}

fn map_unique(err: sqlx::Error, id: &str) -> EngineError {
    match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => {
            EngineError::AlreadyExists(id.to_string())
        }
        _ => EngineError::Db(err),
    }
}
