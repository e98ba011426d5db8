//! records entity
//! Unique uri plus a (did, collection, rkey) unique constraint in the DDL.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub did: String,
    pub collection: String,
    pub rkey: String,
    #[sea_orm(unique)]
    pub uri: String,
    pub cid: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub value: Json,
    pub indexed_at: DateTimeUtc,
    pub schema_version: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
