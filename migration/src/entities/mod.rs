pub mod download_stat;
pub mod manifest_view_stat;
pub mod package;

pub use download_stat::Entity as DownloadStatEntity;
pub use manifest_view_stat::Entity as ManifestViewStatEntity;
pub use package::Entity as PackageEntity;
