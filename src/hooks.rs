//! 宿主响应完成钩子
//!
//! 注册中心在 HTTP 响应结束后调用这里的函数。计数发生在响应之后，
//! 任何失败只记录日志，绝不影响已经发出的响应；
//! 参数缺失或无法解析时跳过计数并打 warn。
//! `stats.count_downloads` / `stats.count_manifest_views` 配置开关
//! 可分别关掉两类计数。

use tracing::{debug, warn};

use crate::database::StatsDatabase;

/// 判断是否为应计数的成功状态码（2xx 或 304）
pub fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status) || status == 304
}

/// 从 tarball 文件名解析版本号
///
/// `react-18.0.0.tgz` + `react` -> `18.0.0`；
/// scoped 包（`@scope/pkg`）的文件名不带 scope 前缀。
pub fn parse_tarball_version(filename: &str, package_name: &str) -> Option<String> {
    // scoped 包的文件名只含最后一段
    let base = package_name.rsplit('/').next()?;

    let rest = filename.strip_prefix(base)?.strip_prefix('-')?;
    let version = rest.strip_suffix(".tgz")?;

    if version.is_empty() {
        return None;
    }

    Some(version.to_string())
}

/// tarball 下载响应完成后调用
pub async fn on_tarball_download(
    db: &StatsDatabase,
    package_name: &str,
    filename: &str,
    status: u16,
) {
    if !db.counts_downloads() {
        return;
    }

    if !is_success_status(status) {
        debug!("Skipping download stats for non-2xx response");
        return;
    }

    if package_name.is_empty() {
        warn!("Unexpected missing package name in request");
        return;
    }

    let Some(version) = parse_tarball_version(filename, package_name) else {
        warn!(
            "Could not parse version from tarball filename '{}' for package '{}'",
            filename, package_name
        );
        return;
    };

    debug!(
        "Adding download stats for package {} version {}",
        package_name, version
    );

    if let Err(e) = db.add_download_count(package_name, &version).await {
        tracing::error!("Failed to add download count: {}", e);
    }
}

/// manifest 访问响应完成后调用；版本号可缺省
pub async fn on_manifest_view(
    db: &StatsDatabase,
    package_name: &str,
    version: Option<&str>,
    status: u16,
) {
    if !db.counts_manifest_views() {
        return;
    }

    if !is_success_status(status) {
        debug!("Skipping manifest stats for non-2xx response");
        return;
    }

    if package_name.is_empty() {
        warn!("Unexpected missing package name in request");
        return;
    }

    debug!(
        "Adding manifest view stats for package {} version {:?}",
        package_name, version
    );

    if let Err(e) = db.add_manifest_view_count(package_name, version).await {
        tracing::error!("Failed to add manifest view count: {}", e);
    }
}
