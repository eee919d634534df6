//! `search` command: one headless search session.
//!
//! Filters are seeded from the state file, overridden by flags, and run
//! through the same session and driver a map UI would use. The rendered list
//! is printed and the final filters and location are saved back.

use std::sync::Arc;

use chrono::{Local, Utc};
use clap::Args;
use yardsale_client::SalesClient;
use yardsale_core::geo::LatLng;
use yardsale_core::{
    normalize_zip, seed_filters, AppConfig, DateRange, LocationCookie, SearchFilters, StateFile,
};
use yardsale_search::{
    event_channel, HeadlessMap, SearchDriver, SearchSession, SessionConfig, SessionEvent,
    VisibleSet,
};

const VIEWPORT_WIDTH_PX: f64 = 1280.0;

#[derive(Debug, Args)]
pub(crate) struct SearchArgs {
    /// Search centre latitude
    #[arg(long, requires = "lng", allow_negative_numbers = true)]
    pub lat: Option<f64>,
    /// Search centre longitude
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lng: Option<f64>,
    /// ZIP code of the search centre (requires --lat/--lng)
    #[arg(long, requires = "lat")]
    pub zip: Option<String>,
    /// City name shown alongside the ZIP
    #[arg(long)]
    pub city: Option<String>,
    /// Search radius in miles (1-100)
    #[arg(long)]
    pub distance: Option<f64>,
    /// Date preset: any, today, weekend, next_weekend
    #[arg(long)]
    pub date: Option<DateRange>,
    /// Category filter; repeat for several
    #[arg(long = "category")]
    pub categories: Vec<String>,
    /// Pages to load
    #[arg(long, default_value = "1")]
    pub pages: u32,
    /// Do not write filters back to the state file
    #[arg(long)]
    pub no_save: bool,
}

impl SearchArgs {
    /// Apply flag overrides on top of the seeded filters.
    pub(crate) fn apply(&self, filters: &mut SearchFilters) -> anyhow::Result<()> {
        if let (Some(lat), Some(lng)) = (self.lat, self.lng) {
            let center = LatLng::new(lat, lng);
            if !center.is_finite() || !(-90.0..=90.0).contains(&lat) {
                anyhow::bail!("invalid coordinates {lat},{lng}");
            }
            filters.set_center(center);
            filters.zip = None;
            filters.city.clone_from(&self.city);
        }
        if let Some(raw) = &self.zip {
            filters.zip = Some(normalize_zip(raw)?);
        }
        if let Some(miles) = self.distance {
            filters.set_distance(miles);
        }
        if let Some(range) = self.date {
            filters.date_range = range;
        }
        if !self.categories.is_empty() {
            filters.set_categories(&self.categories)?;
        }
        Ok(())
    }
}

pub(crate) async fn run_search(config: &AppConfig, args: &SearchArgs) -> anyhow::Result<()> {
    let mut state = StateFile::load(&config.state_path)?;
    let now = Utc::now();
    let mut filters = seed_filters(&state, config.default_center, now);
    args.apply(&mut filters)?;

    let client = SalesClient::new(config)
        .map_err(|e| anyhow::anyhow!("failed to build sales client: {e}"))?;
    let session = SearchSession::new(
        filters,
        Local::now().date_naive(),
        SessionConfig {
            page_size: config.page_size,
            markers_limit: config.markers_limit,
            viewport_width_px: VIEWPORT_WIDTH_PX,
            ..SessionConfig::default()
        },
    );
    let channel = event_channel();
    let map = HeadlessMap::new(channel.0.clone(), VIEWPORT_WIDTH_PX);
    let mut driver = SearchDriver::new(session, Arc::new(client), map, channel);

    driver.start();
    driver.run_until_idle().await;
    for page in 1..args.pages {
        if !driver.session().has_more() {
            tracing::debug!(page, "no more pages");
            break;
        }
        driver.dispatch(SessionEvent::LoadMore);
        driver.run_until_idle().await;
    }

    let session = driver.into_session();
    for line in summary_lines(&session) {
        println!("{line}");
    }

    if !args.no_save {
        let filters = session.filters().clone();
        if filters.zip.is_some() {
            state.remember_location(
                LocationCookie {
                    lat: filters.lat,
                    lng: filters.lng,
                    zip: filters.zip.clone(),
                    city: filters.city.clone(),
                    state: None,
                },
                now,
            );
        }
        state.filters = Some(filters);
        state.save(&config.state_path)?;
        tracing::debug!(path = %config.state_path.display(), "state saved");
    }
    Ok(())
}

pub(crate) fn summary_lines(session: &SearchSession) -> Vec<String> {
    let filters = session.filters();
    let mut lines = vec![format!(
        "{} within {} mi of {:.4},{:.4} ({})",
        plural(session.visible().total(), "sale"),
        filters.distance_miles(),
        filters.lat,
        filters.lng,
        filters.date_range,
    )];

    if let Some(err) = session.last_error() {
        lines.push(format!("warning: {err}; showing previous results"));
    }
    if session.degraded() {
        lines.push("note: results are approximate right now".to_owned());
    }

    if let Some(empty) = session.empty_state() {
        match empty.suggested_distance_miles {
            Some(miles) => lines.push(format!(
                "No sales found. Try increasing the radius to {miles} mi (--distance {miles})."
            )),
            None => lines.push("No sales found.".to_owned()),
        }
        return lines;
    }

    lines.extend(listing_lines(session.visible()));
    if session.has_more() {
        lines.push("more results available (--pages)".to_owned());
    }
    lines
}

fn listing_lines(visible: &VisibleSet) -> Vec<String> {
    let mut lines: Vec<String> = visible
        .rendered
        .iter()
        .map(|sale| {
            let when = match (sale.date_start, sale.date_end) {
                (Some(start), Some(end)) if start != end => format!("{start}..{end}"),
                (Some(start), _) => start.to_string(),
                _ => "any day".to_owned(),
            };
            let place = sale
                .address
                .as_deref()
                .or(sale.city.as_deref())
                .unwrap_or("");
            format!("  {:<24} {when:<22} {place}", sale.title)
        })
        .collect();
    if visible.overflow > 0 {
        lines.push(format!("  and {} more", visible.overflow));
    }
    lines
}

fn plural(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("1 {noun}")
    } else {
        format!("{n} {noun}s")
    }
}
