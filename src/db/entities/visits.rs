//! DB storage for the site-wide visit counter
use chrono::Utc;
use sea_orm::{ActiveValue::Set, IntoActiveModel, TransactionTrait, entity::prelude::*};

/// The counter lives in a single row with this id.
pub const COUNTER_ROW_ID: i32 = 1;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "visit_counter")]
/// Running count of browser sessions started
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    /// db id, always [`COUNTER_ROW_ID`]
    pub id: i32,
    /// number of sessions started so far
    pub visit_count: i64,
    /// when the count last changed
    pub updated_at: DateTime,
}

/// relations for the counter (none)
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Adds one visit and returns the new total.
pub async fn record_visit(db: &DatabaseConnection) -> Result<i64, DbErr> {
    let db_txn = db.begin().await?;
    let now = Utc::now().naive_utc();

    let visit_count = match Entity::find_by_id(COUNTER_ROW_ID).one(&db_txn).await? {
        Some(model) => {
            let visit_count = model.visit_count + 1;
            let mut am = model.into_active_model();
            am.visit_count = Set(visit_count);
            am.updated_at = Set(now);
            am.update(&db_txn).await?;
            visit_count
        }
        None => {
            let active = ActiveModel {
                id: Set(COUNTER_ROW_ID),
                visit_count: Set(1),
                updated_at: Set(now),
            };
            active.insert(&db_txn).await?;
            1
        }
    };
    db_txn.commit().await?;

    Ok(visit_count)
}

/// Current total, zero before the first visit.
pub async fn current_visits(db: &DatabaseConnection) -> Result<i64, DbErr> {
    Ok(Entity::find_by_id(COUNTER_ROW_ID)
        .one(db)
        .await?
        .map(|model| model.visit_count)
        .unwrap_or(0))
}
