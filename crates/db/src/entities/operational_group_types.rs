//! `SeaORM` Entity for operational_group_types table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "operational_group_types")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub group_id: Uuid,
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::operational_groups::Entity",
        from = "Column::GroupId",
        to = "super::operational_groups::Column::Id"
    )]
    OperationalGroups,
}

impl Related<super::operational_groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OperationalGroups.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
