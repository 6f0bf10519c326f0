//! `SeaORM` Entity for balance_logs table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "balance_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub component: String,
    pub currency_code: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub change_amount: Decimal,
    pub operational_group_id: Uuid,
    pub operational_type_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))", nullable)]
    pub balance_after_update: Option<Decimal>,
    #[sea_orm(unique)]
    pub transaction_id: Option<String>,
    pub status: String,
    pub timestamp: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::operational_groups::Entity",
        from = "Column::OperationalGroupId",
        to = "super::operational_groups::Column::Id"
    )]
    OperationalGroups,
    #[sea_orm(
        belongs_to = "super::operational_group_types::Entity",
        from = "Column::OperationalTypeId",
        to = "super::operational_group_types::Column::Id"
    )]
    OperationalGroupTypes,
}

impl Related<super::operational_groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OperationalGroups.def()
    }
}

impl Related<super::operational_group_types::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OperationalGroupTypes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
