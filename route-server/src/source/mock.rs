//! Mock timetable source for running without API credentials.
//!
//! Loads sample boards from JSON files and serves them as if they were live
//! API responses, re-stamped with the requested date and time.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveTime};
use tokio::sync::RwLock;

use crate::domain::Crs;

use super::TimetableSource;
use super::error::SourceError;
use super::types::TimetableBoard;

/// A request received by the mock, for assertions in tests.
pub type MockRequest = (Crs, NaiveDate, NaiveTime);

/// Mock timetable source that serves data from JSON files.
#[derive(Clone, Default)]
pub struct MockTimetableSource {
    /// Pre-loaded boards, keyed by CRS.
    boards: Arc<RwLock<HashMap<Crs, TimetableBoard>>>,

    /// Every request served, in arrival order.
    requests: Arc<Mutex<Vec<MockRequest>>>,
}

impl MockTimetableSource {
    /// Create a mock source by loading JSON files from a directory.
    ///
    /// Expects files named `{CRS}.json` (e.g., `KGX.json`, `YRK.json`).
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self, SourceError> {
        let data_dir = data_dir.as_ref();
        let mut boards = HashMap::new();

        let entries = std::fs::read_dir(data_dir).map_err(|e| {
            SourceError::Mock(format!("failed to read {}: {}", data_dir.display(), e))
        })?;

        for entry in entries {
            let path = entry
                .map_err(|e| SourceError::Mock(format!("failed to read directory entry: {}", e)))?
                .path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            let crs_str = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| SourceError::Mock(format!("invalid filename: {:?}", path)))?;

            let crs = Crs::parse(crs_str)
                .map_err(|_| SourceError::Mock(format!("invalid CRS in filename: {}", crs_str)))?;

            let json = std::fs::read_to_string(&path)
                .map_err(|e| SourceError::Mock(format!("failed to read {:?}: {}", path, e)))?;

            let board: TimetableBoard = serde_json::from_str(&json)
                .map_err(|e| SourceError::Mock(format!("failed to parse {:?}: {}", path, e)))?;

            boards.insert(crs, board);
        }

        if boards.is_empty() {
            return Err(SourceError::Mock(format!(
                "no mock board files found in {}",
                data_dir.display()
            )));
        }

        Ok(Self::from_boards(boards))
    }

    /// Create a mock source from boards already in memory.
    pub fn from_boards(boards: HashMap<Crs, TimetableBoard>) -> Self {
        Self {
            boards: Arc::new(RwLock::new(boards)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// List available stations in the mock data.
    pub async fn available_stations(&self) -> Vec<Crs> {
        let boards = self.boards.read().await;
        boards.keys().copied().collect()
    }

    /// Requests served so far.
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl TimetableSource for MockTimetableSource {
    /// Returns the station's static board stamped with the requested date and
    /// time, so item times are interpreted relative to the request.
    async fn fetch_board(
        &self,
        station: &Crs,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<TimetableBoard, SourceError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((*station, date, time));
        }

        let boards = self.boards.read().await;

        let mut board = boards.get(station).cloned().ok_or_else(|| SourceError::Api {
            status: 404,
            message: format!(
                "No mock data for station {}. Available: {:?}",
                station.as_str(),
                boards.keys().map(|c| c.as_str()).collect::<Vec<_>>()
            ),
        })?;

        board.date = date.format("%Y-%m-%d").to_string();
        board.time_of_day = time.format("%H:%M").to_string();
        Ok(board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const KGX_BOARD: &str = r#"{
        "date": "2024-03-15",
        "time_of_day": "10:00",
        "station_code": "KGX",
        "departures": {"all": [
            {"service": "1", "train_uid": "C1", "aimed_departure_time": "10:30", "aimed_arrival_time": null}
        ]}
    }"#;

    fn write_board(dir: &Path, name: &str, json: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(json.as_bytes()).unwrap();
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 16).unwrap()
    }

    fn time() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 15, 0).unwrap()
    }

    #[tokio::test]
    async fn load_mock_data() {
        let dir = tempfile::tempdir().unwrap();
        write_board(dir.path(), "KGX.json", KGX_BOARD);
        write_board(dir.path(), "notes.txt", "ignored");

        let source = MockTimetableSource::new(dir.path()).unwrap();
        let stations = source.available_stations().await;
        assert_eq!(stations, vec![Crs::parse("KGX").unwrap()]);
    }

    #[tokio::test]
    async fn board_is_restamped_and_recorded() {
        let dir = tempfile::tempdir().unwrap();
        write_board(dir.path(), "KGX.json", KGX_BOARD);
        let source = MockTimetableSource::new(dir.path()).unwrap();
        let kgx = Crs::parse("KGX").unwrap();

        let board = source.fetch_board(&kgx, date(), time()).await.unwrap();

        assert_eq!(board.date, "2024-03-16");
        assert_eq!(board.time_of_day, "09:15");
        assert_eq!(board.departures.all.len(), 1);
        assert_eq!(source.requests(), vec![(kgx, date(), time())]);
    }

    #[tokio::test]
    async fn unknown_station_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        write_board(dir.path(), "KGX.json", KGX_BOARD);
        let source = MockTimetableSource::new(dir.path()).unwrap();

        let result = source
            .fetch_board(&Crs::parse("XYZ").unwrap(), date(), time())
            .await;
        assert!(matches!(result, Err(SourceError::Api { status: 404, .. })));
    }

    #[tokio::test]
    async fn bundled_sample_data_loads() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/mock_timetables");
        let source = MockTimetableSource::new(&dir).unwrap();

        let mut stations = source.available_stations().await;
        stations.sort();
        let expected: Vec<Crs> = ["KGX", "PBO", "YRK"]
            .iter()
            .map(|s| Crs::parse(s).unwrap())
            .collect();
        assert_eq!(stations, expected);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            MockTimetableSource::new(dir.path()),
            Err(SourceError::Mock(_))
        ));
    }
}
