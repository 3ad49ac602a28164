// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Start-up sync of configured venues and users into the store.

use chrono::{DateTime, Utc};
use courtwatch_config::model::CourtwatchConfig;
use courtwatch_core::{CourtwatchError, UserId, VenueId};
use courtwatch_storage::queries::{preferences, venues};
use courtwatch_storage::Database;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub venues_upserted: usize,
    /// Stored venues missing from config, now inactive. Never deleted.
    pub venues_deactivated: usize,
    pub users_upserted: usize,
    pub users_deactivated: usize,
}

/// Make the store's venues and users match `config`.
///
/// Idempotent. History for venues dropped from config is kept; they just
/// stop being scheduled.
pub async fn sync_from_config(
    db: &Database,
    config: &CourtwatchConfig,
    now: DateTime<Utc>,
) -> Result<SyncReport, CourtwatchError> {
    let mut report = SyncReport::default();

    let configured = config.venues();
    for venue in &configured {
        venues::upsert_venue(db, venue, now).await?;
    }
    report.venues_upserted = configured.len();
    let keep: Vec<VenueId> = configured.into_iter().map(|v| v.id).collect();
    report.venues_deactivated = venues::deactivate_except(db, &keep, now).await?;

    let users = config.users();
    for prefs in &users {
        preferences::upsert_user(db, prefs, now).await?;
    }
    report.users_upserted = users.len();
    let keep: Vec<UserId> = users.into_iter().map(|u| u.user_id).collect();
    report.users_deactivated = preferences::deactivate_except(db, &keep, now).await?;

    info!(
        venues = report.venues_upserted,
        venues_deactivated = report.venues_deactivated,
        users = report.users_upserted,
        users_deactivated = report.users_deactivated,
        "configuration synced to store"
    );
    Ok(report)
}
