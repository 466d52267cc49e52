use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::db::{count_locations, create_location};
use crate::error::AppError;

pub const DEFAULT_LOCATIONS: [(&str, &str); 5] = [
    ("Blochaus Fhyswick, Canberra", "bh-fhyswick-canberra"),
    ("Blochaus Mitchell, Canberra", "bh-mitchell-canberra"),
    ("Blochaus Port Melbourne, Melbourne", "bh-port-melbourne-melbourne"),
    ("Blochaus Marrickville, Sydney", "bh-marrickville-sydney"),
    ("Blochaus Leichhardt, Sydney", "bh-leichhardt-sydney"),
];

/// Seeds the default gyms into an empty locations table. Returns how many were inserted.
#[instrument(skip(pool))]
pub async fn seed_default_locations(pool: &Pool<Sqlite>) -> Result<usize, AppError> {
    let existing = count_locations(pool).await?;
    if existing > 0 {
        info!(existing, "Locations already present, skipping seed");
        return Ok(0);
    }

    for (name, slug) in DEFAULT_LOCATIONS {
        create_location(pool, name, slug).await?;
    }

    info!(count = DEFAULT_LOCATIONS.len(), "Seeded default locations");
    Ok(DEFAULT_LOCATIONS.len())
}
