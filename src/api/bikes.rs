use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct StationStatusFeed {
    pub data: StationStatusData,
}

#[derive(Debug, Deserialize)]
pub struct StationStatusData {
    pub stations: Vec<StationStatus>,
}

#[derive(Debug, Deserialize)]
pub struct StationStatus {
    pub station_id: String,
    pub num_bikes_available: u32,
}

impl StationStatusFeed {
    pub fn available_bikes(&self, station_id: &str) -> Option<u32> {
        self.data
            .stations
            .iter()
            .find(|station| station.station_id == station_id)
            .map(|station| station.num_bikes_available)
    }
}
