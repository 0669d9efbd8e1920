#[cfg(not(any(feature = "memory", feature = "sqlite")))]
compile_error!("Enable a repo feature: `memory` or `sqlite`.");

#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Storage adapter selected by the enabled features; SQLite wins when both are on.
#[cfg(feature = "sqlite")]
pub type Repo = sqlite::SqliteRepo;

#[cfg(all(feature = "memory", not(feature = "sqlite")))]
pub type Repo = memory::InMemoryRepo;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://fastfit.db";

#[cfg(feature = "sqlite")]
pub async fn build_repo(database_url: Option<&str>) -> anyhow::Result<Repo> {
    let url = database_url.unwrap_or(DEFAULT_DATABASE_URL);
    tracing::info!(url, "using sqlite order store");
    sqlite::SqliteRepo::new(url).await
}

#[cfg(all(feature = "memory", not(feature = "sqlite")))]
pub async fn build_repo(database_url: Option<&str>) -> anyhow::Result<Repo> {
    if database_url.is_some() {
        tracing::warn!("DATABASE_URL ignored: built with the in-memory store only");
    }
    Ok(memory::InMemoryRepo::new())
}
