//! Operational taxonomy: get-or-create resolution and administration.

use std::sync::Arc;

use chrono::Utc;
use coffer_shared::types::{OperationalGroupId, OperationalTypeId};

use super::error::LedgerError;
use super::types::{OperationalGroup, OperationalGroupType, OperationalTag, groups, op_types};
use crate::storage::{StorageError, TaxonomyStore};

/// Resolves and administers operational groups and types.
#[derive(Clone)]
pub struct TaxonomyResolver {
    store: Arc<dyn TaxonomyStore>,
}

fn default_description(name: &str) -> String {
    match name {
        groups::TRANSFER => "internal transaction".to_string(),
        groups::FUND => "wallet funding".to_string(),
        op_types::INTERNAL_TRANSACTION => "internal transactions".to_string(),
        op_types::ADD_FUND => "funds added".to_string(),
        op_types::REMOVE_FUND => "funds removed".to_string(),
        other => other.replace('_', " "),
    }
}

impl TaxonomyResolver {
    /// Creates a resolver over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn TaxonomyStore>) -> Self {
        Self { store }
    }

    /// Returns the ids of (`group_name`, `type_name`), creating whichever is missing.
    ///
    /// Concurrent first callers may race on creation; a loser re-fetches the
    /// winner's row, so every caller receives the same ids.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a lookup or insert fails for another reason.
    pub async fn get_or_create(
        &self,
        group_name: &str,
        type_name: &str,
    ) -> Result<OperationalTag, LedgerError> {
        let group = self.get_or_create_group(group_name).await?;
        let op_type = self.get_or_create_type(&group, type_name).await?;
        Ok(OperationalTag {
            group_id: group.id,
            type_id: op_type.id,
            group_name: group.name,
            type_name: op_type.name,
        })
    }

    async fn get_or_create_group(&self, name: &str) -> Result<OperationalGroup, LedgerError> {
        if let Some(group) = self.store.get_group_by_name(name).await? {
            return Ok(group);
        }

        let candidate = OperationalGroup {
            id: OperationalGroupId::new(),
            name: name.to_string(),
            description: default_description(name),
            created_at: Utc::now(),
        };
        match self.store.create_group(candidate).await {
            Ok(group) => {
                tracing::info!(
                    group = %group.name,
                    group_id = %group.id,
                    "operational group created"
                );
                Ok(group)
            }
            Err(StorageError::AlreadyExists { .. }) => {
                tracing::debug!(group = name, "lost operational group creation race, re-fetching");
                self.store.get_group_by_name(name).await?.ok_or_else(|| {
                    LedgerError::Internal(format!(
                        "operational group {name} reported as existing but not found"
                    ))
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_or_create_type(
        &self,
        group: &OperationalGroup,
        name: &str,
    ) -> Result<OperationalGroupType, LedgerError> {
        if let Some(op_type) = self.store.get_type_by_name(group.id, name).await? {
            return Ok(op_type);
        }

        let candidate = OperationalGroupType {
            id: OperationalTypeId::new(),
            group_id: group.id,
            name: name.to_string(),
            description: default_description(name),
            created_at: Utc::now(),
        };
        match self.store.create_type(candidate).await {
            Ok(op_type) => {
                tracing::info!(
                    group = %group.name,
                    op_type = %op_type.name,
                    type_id = %op_type.id,
                    "operational type created"
                );
                Ok(op_type)
            }
            Err(StorageError::AlreadyExists { .. }) => {
                tracing::debug!(
                    group = %group.name,
                    op_type = name,
                    "lost operational type creation race, re-fetching"
                );
                self.store
                    .get_type_by_name(group.id, name)
                    .await?
                    .ok_or_else(|| {
                        LedgerError::Internal(format!(
                            "operational type {}/{name} reported as existing but not found",
                            group.name
                        ))
                    })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Resolves a (group id, type id) pair; the type must belong to the group.
    ///
    /// # Errors
    ///
    /// Returns `UnknownOperationalGroup` or `UnknownOperationalType` if either
    /// id does not resolve.
    pub async fn resolve(
        &self,
        group_id: OperationalGroupId,
        type_id: OperationalTypeId,
    ) -> Result<OperationalTag, LedgerError> {
        let group = self
            .store
            .get_group(group_id)
            .await?
            .ok_or_else(|| LedgerError::UnknownOperationalGroup(group_id.to_string()))?;
        let op_type = self
            .store
            .get_type(type_id)
            .await?
            .filter(|t| t.group_id == group.id)
            .ok_or_else(|| LedgerError::UnknownOperationalType(type_id.to_string()))?;
        Ok(OperationalTag {
            group_id: group.id,
            type_id: op_type.id,
            group_name: group.name,
            type_name: op_type.name,
        })
    }

    /// Creates a group; an existing name is rejected.
    ///
    /// # Errors
    ///
    /// Returns `MissingField` for an empty name and `AlreadyExists` for a taken one.
    pub async fn create_operational_group(
        &self,
        name: &str,
        description: &str,
    ) -> Result<OperationalGroup, LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::MissingField("name"));
        }
        if self.store.get_group_by_name(name).await?.is_some() {
            tracing::warn!(group = name, "operational group already exists");
            return Err(LedgerError::AlreadyExists {
                entity: "operational group",
                name: name.to_string(),
            });
        }
        let group = OperationalGroup {
            id: OperationalGroupId::new(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        };
        self.store.create_group(group).await.map_err(|err| match err {
            StorageError::AlreadyExists { .. } => LedgerError::AlreadyExists {
                entity: "operational group",
                name: name.to_string(),
            },
            other => other.into(),
        })
    }

    /// Creates a type in an existing group; a duplicate (group, name) is rejected.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` for a nil group id, `MissingField` for an empty
    /// name, `OperationalGroupNotFound` and `AlreadyExists`.
    pub async fn create_operational_type(
        &self,
        group_id: OperationalGroupId,
        name: &str,
        description: &str,
    ) -> Result<OperationalGroupType, LedgerError> {
        if group_id.is_nil() {
            return Err(LedgerError::InvalidId("operational group id"));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::MissingField("name"));
        }
        if self.store.get_group(group_id).await?.is_none() {
            return Err(LedgerError::OperationalGroupNotFound(group_id));
        }
        if self.store.get_type_by_name(group_id, name).await?.is_some() {
            tracing::warn!(group_id = %group_id, op_type = name, "operational type already exists");
            return Err(LedgerError::AlreadyExists {
                entity: "operational type",
                name: name.to_string(),
            });
        }
        let op_type = OperationalGroupType {
            id: OperationalTypeId::new(),
            group_id,
            name: name.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        };
        self.store.create_type(op_type).await.map_err(|err| match err {
            StorageError::AlreadyExists { .. } => LedgerError::AlreadyExists {
                entity: "operational type",
                name: name.to_string(),
            },
            other => other.into(),
        })
    }

    /// Lists every group.
    ///
    /// # Errors
    ///
    /// Returns a storage error on lookup failure.
    pub async fn list_operational_groups(&self) -> Result<Vec<OperationalGroup>, LedgerError> {
        Ok(self.store.list_groups().await?)
    }

    /// Lists the types of a group.
    ///
    /// # Errors
    ///
    /// Returns `OperationalGroupNotFound` if the group does not exist.
    pub async fn list_operational_types(
        &self,
        group_id: OperationalGroupId,
    ) -> Result<Vec<OperationalGroupType>, LedgerError> {
        if self.store.get_group(group_id).await?.is_none() {
            return Err(LedgerError::OperationalGroupNotFound(group_id));
        }
        Ok(self.store.list_types(group_id).await?)
    }
}

impl std::fmt::Debug for TaxonomyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaxonomyResolver").finish_non_exhaustive()
    }
}
