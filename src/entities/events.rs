use sea_orm::entity::prelude::*;

use crate::domain::EventStatus;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Unique among rows where `deleted_at` is null (partial index).
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    /// Naive wall-clock time, seconds precision.
    pub start_time: DateTime,

    pub end_time: DateTime,

    pub location: String,

    /// Public reference such as `/uploads/events/<file>`.
    pub image: Option<String>,

    pub status: EventStatus,

    pub created_by: Uuid,

    pub published_date: Option<DateTime>,

    pub deleted_at: Option<String>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::CreatedBy",
        to = "super::users::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Creator,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Creator.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
