//! 统计表初始迁移
//!
//! 创建三张核心表：
//! - packages: 包标识（name + version 唯一）
//! - download_stats: 按周期聚合的下载计数
//! - manifest_view_stats: 按周期聚合的 manifest 访问计数

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 1. 创建 packages 表
        manager
            .create_table(
                Table::create()
                    .table(Packages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Packages::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Packages::Name).string_len(255).not_null())
                    .col(ColumnDef::new(Packages::Version).string_len(100).not_null())
                    .col(
                        ColumnDef::new(Packages::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Packages::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 唯一索引：name + version
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_packages_name_version")
                    .table(Packages::Table)
                    .col(Packages::Name)
                    .col(Packages::Version)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 2. 创建 download_stats 表
        manager
            .create_table(
                Table::create()
                    .table(DownloadStats::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DownloadStats::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DownloadStats::PackageId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DownloadStats::PeriodType)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DownloadStats::PeriodValue)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DownloadStats::Count)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DownloadStats::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DownloadStats::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_download_stats_package")
                            .from(DownloadStats::Table, DownloadStats::PackageId)
                            .to(Packages::Table, Packages::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 唯一索引：package_id + period_type + period_value
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_download_stats_package_period")
                    .table(DownloadStats::Table)
                    .col(DownloadStats::PackageId)
                    .col(DownloadStats::PeriodType)
                    .col(DownloadStats::PeriodValue)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 3. 创建 manifest_view_stats 表
        manager
            .create_table(
                Table::create()
                    .table(ManifestViewStats::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ManifestViewStats::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ManifestViewStats::PackageId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ManifestViewStats::PeriodType)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ManifestViewStats::PeriodValue)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ManifestViewStats::Count)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ManifestViewStats::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ManifestViewStats::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_manifest_view_stats_package")
                            .from(ManifestViewStats::Table, ManifestViewStats::PackageId)
                            .to(Packages::Table, Packages::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 唯一索引：package_id + period_type + period_value
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_manifest_view_stats_package_period")
                    .table(ManifestViewStats::Table)
                    .col(ManifestViewStats::PackageId)
                    .col(ManifestViewStats::PeriodType)
                    .col(ManifestViewStats::PeriodValue)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 删除 manifest_view_stats
        manager
            .drop_index(
                Index::drop()
                    .name("idx_manifest_view_stats_package_period")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(ManifestViewStats::Table).to_owned())
            .await?;

        // 删除 download_stats
        manager
            .drop_index(
                Index::drop()
                    .name("idx_download_stats_package_period")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(DownloadStats::Table).to_owned())
            .await?;

        // 删除 packages
        manager
            .drop_index(Index::drop().name("idx_packages_name_version").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Packages::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Packages {
    #[sea_orm(iden = "packages")]
    Table,
    Id,
    Name,
    Version,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DownloadStats {
    #[sea_orm(iden = "download_stats")]
    Table,
    Id,
    PackageId,
    PeriodType,
    PeriodValue,
    Count,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ManifestViewStats {
    #[sea_orm(iden = "manifest_view_stats")]
    Table,
    Id,
    PackageId,
    PeriodType,
    PeriodValue,
    Count,
    CreatedAt,
    UpdatedAt,
}
