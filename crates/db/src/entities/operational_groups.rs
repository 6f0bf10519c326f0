//! `SeaORM` Entity for operational_groups table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "operational_groups")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::operational_group_types::Entity")]
    OperationalGroupTypes,
}

impl Related<super::operational_group_types::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OperationalGroupTypes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
