use chrono::{DateTime, FixedOffset};
use cli_table::Table;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct DeparturesResponse {
    pub results: Vec<Departure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Departure {
    pub service_journey: ServiceJourney,
    pub estimated_otherwise_planned_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceJourney {
    pub direction_details: DirectionDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectionDetails {
    pub short_direction: String,
}

/// The soonest departures towards one direction, formatted `HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, Table)]
pub struct DepartureSample {
    #[table(title = "Direction")]
    pub direction: String,
    #[table(title = "Departures", display_fn = "render_times")]
    pub times: Vec<String>,
}

fn render_times(times: &[String]) -> String {
    times.join(", ")
}

/// Groups departures by direction, keeping the `per_direction` earliest
/// estimated times of each. Directions keep the order in which they first
/// appear in the response.
pub fn summarize(departures: &[Departure], per_direction: usize) -> Vec<DepartureSample> {
    let mut groups: Vec<(String, Vec<DateTime<FixedOffset>>)> = Vec::new();

    for departure in departures {
        let direction = &departure.service_journey.direction_details.short_direction;
        let estimated =
            match DateTime::parse_from_rfc3339(&departure.estimated_otherwise_planned_time) {
                Ok(time) => time,
                Err(err) => {
                    log::debug!(
                        "skipping departure towards {} with bad time {:?}: {}",
                        direction,
                        departure.estimated_otherwise_planned_time,
                        err
                    );
                    continue;
                }
            };

        match groups.iter_mut().find(|(name, _)| name == direction) {
            Some((_, times)) => times.push(estimated),
            None => groups.push((direction.clone(), vec![estimated])),
        }
    }

    groups
        .into_iter()
        .map(|(direction, mut times)| {
            times.sort();
            DepartureSample {
                direction,
                times: times
                    .iter()
                    .take(per_direction)
                    .map(|t| t.format("%H:%M").to_string())
                    .collect(),
            }
        })
        .collect()
}
