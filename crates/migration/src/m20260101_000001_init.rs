//! Initial schema for the economy store:
//!
//! - `transactions`: append-only coin ledger
//! - `balances`: cached wallet state per child
//! - `experience`: cached level state per child
//! - `xp_transactions`: append-only XP history
//! - `badges`: earned badges, one per child and definition
//! - `badge_progress`: open counters toward multi-step badges
//! - `task_results`: completed tasks, input of the difficulty recommender
//!
//! Timestamps are epoch milliseconds, ids are hyphenated UUID strings.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Transactions {
    Table,
    Id,
    ChildId,
    Amount,
    Category,
    Description,
    TimestampMs,
    Metadata,
}

#[derive(Iden)]
enum Balances {
    Table,
    ChildId,
    Balance,
    DailyCap,
    TodayEarned,
    TodaySpent,
    AgeGroup,
    LastUpdatedMs,
}

#[derive(Iden)]
enum Experience {
    Table,
    ChildId,
    Level,
    CurrentXp,
    TotalXpEarned,
    LastUpdatedMs,
}

#[derive(Iden)]
enum XpTransactions {
    Table,
    Id,
    ChildId,
    Amount,
    Source,
    Description,
    TimestampMs,
}

#[derive(Iden)]
enum Badges {
    Table,
    ChildId,
    DefinitionId,
    Id,
    Name,
    Category,
    Rarity,
    EarnedAtMs,
    Benefits,
}

#[derive(Iden)]
enum BadgeProgress {
    Table,
    ChildId,
    BadgeId,
    CurrentProgress,
    TargetProgress,
    LastUpdatedMs,
}

#[derive(Iden)]
enum TaskResults {
    Table,
    Id,
    ChildId,
    Subject,
    Difficulty,
    Success,
    Grade,
    TimeSpentSecs,
    HintsUsed,
    AttemptsToSolve,
    TimestampMs,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Ledger
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::ChildId).string().not_null())
                    .col(ColumnDef::new(Transactions::Amount).big_integer().not_null())
                    .col(ColumnDef::new(Transactions::Category).string().not_null())
                    .col(ColumnDef::new(Transactions::Description).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::TimestampMs)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::Metadata)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-child_id-timestamp_ms")
                    .table(Transactions::Table)
                    .col(Transactions::ChildId)
                    .col(Transactions::TimestampMs)
                    .col(Transactions::Id)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Balances
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Balances::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Balances::ChildId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Balances::Balance).big_integer().not_null())
                    .col(ColumnDef::new(Balances::DailyCap).big_integer().not_null())
                    .col(
                        ColumnDef::new(Balances::TodayEarned)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Balances::TodaySpent).big_integer().not_null())
                    .col(ColumnDef::new(Balances::AgeGroup).string().not_null())
                    .col(
                        ColumnDef::new(Balances::LastUpdatedMs)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Experience
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Experience::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Experience::ChildId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Experience::Level).integer().not_null())
                    .col(ColumnDef::new(Experience::CurrentXp).big_integer().not_null())
                    .col(
                        ColumnDef::new(Experience::TotalXpEarned)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Experience::LastUpdatedMs)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(XpTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(XpTransactions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(XpTransactions::ChildId).string().not_null())
                    .col(
                        ColumnDef::new(XpTransactions::Amount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(XpTransactions::Source).string().not_null())
                    .col(
                        ColumnDef::new(XpTransactions::Description)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(XpTransactions::TimestampMs)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-xp_transactions-child_id-timestamp_ms")
                    .table(XpTransactions::Table)
                    .col(XpTransactions::ChildId)
                    .col(XpTransactions::TimestampMs)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Badges
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Badges::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Badges::ChildId).string().not_null())
                    .col(ColumnDef::new(Badges::DefinitionId).string().not_null())
                    .col(ColumnDef::new(Badges::Id).string().not_null().unique_key())
                    .col(ColumnDef::new(Badges::Name).string().not_null())
                    .col(ColumnDef::new(Badges::Category).string().not_null())
                    .col(ColumnDef::new(Badges::Rarity).string().not_null())
                    .col(ColumnDef::new(Badges::EarnedAtMs).big_integer().not_null())
                    .col(
                        ColumnDef::new(Badges::Benefits)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .primary_key(
                        Index::create()
                            .col(Badges::ChildId)
                            .col(Badges::DefinitionId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BadgeProgress::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(BadgeProgress::ChildId).string().not_null())
                    .col(ColumnDef::new(BadgeProgress::BadgeId).string().not_null())
                    .col(
                        ColumnDef::new(BadgeProgress::CurrentProgress)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BadgeProgress::TargetProgress)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BadgeProgress::LastUpdatedMs)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(BadgeProgress::ChildId)
                            .col(BadgeProgress::BadgeId),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Task results
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(TaskResults::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TaskResults::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TaskResults::ChildId).string().not_null())
                    .col(ColumnDef::new(TaskResults::Subject).string().not_null())
                    .col(ColumnDef::new(TaskResults::Difficulty).integer().not_null())
                    .col(ColumnDef::new(TaskResults::Success).boolean().not_null())
                    .col(ColumnDef::new(TaskResults::Grade).integer().not_null())
                    .col(
                        ColumnDef::new(TaskResults::TimeSpentSecs)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TaskResults::HintsUsed).big_integer().not_null())
                    .col(
                        ColumnDef::new(TaskResults::AttemptsToSolve)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TaskResults::TimestampMs)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-task_results-child_id-subject-timestamp_ms")
                    .table(TaskResults::Table)
                    .col(TaskResults::ChildId)
                    .col(TaskResults::Subject)
                    .col(TaskResults::TimestampMs)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TaskResults::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BadgeProgress::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Badges::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(XpTransactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Experience::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Balances::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        Ok(())
    }
}
