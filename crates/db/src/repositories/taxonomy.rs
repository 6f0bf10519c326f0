//! Operational taxonomy repository: groups and their types.

use async_trait::async_trait;
use chrono::Utc;
use coffer_core::ledger::{OperationalGroup, OperationalGroupType};
use coffer_core::storage::{StorageResult, TaxonomyStore};
use coffer_shared::types::{OperationalGroupId, OperationalTypeId};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::{operational_group_types, operational_groups};
use crate::error::storage_err;

const GROUP: &str = "operational_group";
const TYPE: &str = "operational_type";

/// Taxonomy repository backed by `operational_groups` and `operational_group_types`.
#[derive(Debug, Clone)]
pub struct TaxonomyRepository {
    db: DatabaseConnection,
}

impl TaxonomyRepository {
    /// Creates a new taxonomy repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn group_to_domain(model: operational_groups::Model) -> OperationalGroup {
    OperationalGroup {
        id: OperationalGroupId::from_uuid(model.id),
        name: model.name,
        description: model.description,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn type_to_domain(model: operational_group_types::Model) -> OperationalGroupType {
    OperationalGroupType {
        id: OperationalTypeId::from_uuid(model.id),
        group_id: OperationalGroupId::from_uuid(model.group_id),
        name: model.name,
        description: model.description,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

#[async_trait]
impl TaxonomyStore for TaxonomyRepository {
    async fn get_group_by_name(&self, name: &str) -> StorageResult<Option<OperationalGroup>> {
        let model = operational_groups::Entity::find()
            .filter(operational_groups::Column::Name.eq(name))
            .one(&self.db)
            .await
            .map_err(|e| storage_err(GROUP, name, e))?;
        Ok(model.map(group_to_domain))
    }

    async fn get_group(&self, id: OperationalGroupId) -> StorageResult<Option<OperationalGroup>> {
        let model = operational_groups::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(|e| storage_err(GROUP, id.to_string(), e))?;
        Ok(model.map(group_to_domain))
    }

    async fn create_group(&self, group: OperationalGroup) -> StorageResult<OperationalGroup> {
        let name = group.name.clone();
        let model = operational_groups::ActiveModel {
            id: Set(group.id.into_inner()),
            name: Set(group.name),
            description: Set(group.description),
            created_at: Set(group.created_at.into()),
        };
        let inserted = model
            .insert(&self.db)
            .await
            .map_err(|e| storage_err(GROUP, name, e))?;
        Ok(group_to_domain(inserted))
    }

    async fn list_groups(&self) -> StorageResult<Vec<OperationalGroup>> {
        let models = operational_groups::Entity::find()
            .order_by_asc(operational_groups::Column::Name)
            .all(&self.db)
            .await
            .map_err(|e| storage_err(GROUP, "list", e))?;
        Ok(models.into_iter().map(group_to_domain).collect())
    }

    async fn get_type_by_name(
        &self,
        group_id: OperationalGroupId,
        name: &str,
    ) -> StorageResult<Option<OperationalGroupType>> {
        let model = operational_group_types::Entity::find()
            .filter(operational_group_types::Column::GroupId.eq(group_id.into_inner()))
            .filter(operational_group_types::Column::Name.eq(name))
            .one(&self.db)
            .await
            .map_err(|e| storage_err(TYPE, format!("{group_id}/{name}"), e))?;
        Ok(model.map(type_to_domain))
    }

    async fn get_type(
        &self,
        id: OperationalTypeId,
    ) -> StorageResult<Option<OperationalGroupType>> {
        let model = operational_group_types::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(|e| storage_err(TYPE, id.to_string(), e))?;
        Ok(model.map(type_to_domain))
    }

    async fn create_type(
        &self,
        op_type: OperationalGroupType,
    ) -> StorageResult<OperationalGroupType> {
        let key = format!("{}/{}", op_type.group_id, op_type.name);
        let model = operational_group_types::ActiveModel {
            id: Set(op_type.id.into_inner()),
            group_id: Set(op_type.group_id.into_inner()),
            name: Set(op_type.name),
            description: Set(op_type.description),
            created_at: Set(op_type.created_at.into()),
        };
        let inserted = model
            .insert(&self.db)
            .await
            .map_err(|e| storage_err(TYPE, key, e))?;
        Ok(type_to_domain(inserted))
    }

    async fn list_types(
        &self,
        group_id: OperationalGroupId,
    ) -> StorageResult<Vec<OperationalGroupType>> {
        let models = operational_group_types::Entity::find()
            .filter(operational_group_types::Column::GroupId.eq(group_id.into_inner()))
            .order_by_asc(operational_group_types::Column::Name)
            .all(&self.db)
            .await
            .map_err(|e| storage_err(TYPE, group_id.to_string(), e))?;
        Ok(models.into_iter().map(type_to_domain).collect())
    }
}
