//! OMP TLE update tool.
//!
//! Fetches the latest two-line element sets from space-track.org and stores
//! them in the OMP, both in the `omptle` table and in every `AUTO-TLE`
//! observation of the matching target.
//!
//! # Usage
//!
//! ```bash
//! # Update every AUTO-TLE target found in the database
//! cargo run --bin omp-tle --features "cli,space-track,postgres"
//!
//! # Update specific catalogue numbers
//! cargo run --bin omp-tle --features "cli,space-track,postgres" -- 25544,39504
//! ```
//!
//! # Environment Variables
//!
//! - `OMP_SITE_CONFIG`: site configuration file (default: /jac_sw/etc/ompsite.toml)
//! - `RUST_LOG`: Log filter, e.g. `debug` or `omp_rust::db=debug` (default: info)

use std::env;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use omp_rust::config::SiteConfig;
use omp_rust::db::{OmpBackend, TleDb};
use omp_rust::tle::{SpaceTrack, TleParser};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = SiteConfig::load().context("Failed to load site configuration")?;
    let backend = OmpBackend::open(config.database()?)?;
    info!("Opened {:?} backend", backend.backend_type());
    backend
        .ensure_writable()
        .context("omp-tle stores element sets and needs a writable [database]")?;
    let db = TleDb::new(backend);
    let parser = TleParser::new();

    let mut space_track = SpaceTrack::new();
    match env::args().nth(1) {
        Some(ids) => {
            for id in ids.split(',').filter(|id| !id.trim().is_empty()) {
                space_track.add_id(id)?;
            }
        }
        None => {
            for target in db.retrieve_ids()? {
                match parser.catalogue_id(&target) {
                    Some(id) => space_track.add_id(id)?,
                    None => warn!("Skipping target {} without catalogue number", target),
                }
            }
        }
    }

    if space_track.ids().is_empty() {
        info!("No TLE targets to update");
        db.into_inner().close()?;
        return Ok(());
    }

    // Runtimes must not nest: the TDS backend blocks on its own, so this one
    // is dropped before the database is used again.
    let lines = {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(space_track.send_request(config.spacetrack()?))?
    };

    let mut updated = 0;
    for (line1, line2) in SpaceTrack::pair_lines(&lines) {
        let tle = match parser.parse_tle(&line1, &line2) {
            Ok(tle) => tle,
            Err(e) => {
                warn!("Skipping element set: {}", e);
                continue;
            }
        };
        let elements = tle.export_omp();
        info!("Storing elements for {}", elements.target);
        db.submit_tle(&elements)?;
        db.update_tle_ompobs(&elements)?;
        updated += 1;
    }

    info!("Updated {} of {} requested targets", updated, space_track.ids().len());
    db.into_inner().close()?;
    Ok(())
}
