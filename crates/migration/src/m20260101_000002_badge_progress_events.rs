//! Applied badge progress increments.
//!
//! One row per keyed increment, so replaying a reward request cannot move a
//! badge forward twice.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum BadgeProgressEvents {
    Table,
    Id,
    ChildId,
    BadgeId,
    RecordedAtMs,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BadgeProgressEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BadgeProgressEvents::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(BadgeProgressEvents::ChildId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BadgeProgressEvents::BadgeId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BadgeProgressEvents::RecordedAtMs)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-badge_progress_events-child_id-badge_id")
                    .table(BadgeProgressEvents::Table)
                    .col(BadgeProgressEvents::ChildId)
                    .col(BadgeProgressEvents::BadgeId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BadgeProgressEvents::Table).to_owned())
            .await
    }
}
