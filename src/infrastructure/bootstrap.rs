// Start-up data: bootstrap JSON files and generated sample points
use crate::application::control_service::ControlService;
use crate::application::simulator::{RandomSource, UnitCategory, round_to};
use crate::domain::group::Group;
use crate::domain::point::{Point, PointType};
use crate::domain::settings::SystemSettings;
use chrono::Utc;
use serde::de::DeserializeOwned;
use std::path::Path;

pub const POINTS_FILE: &str = "control_points.json";
pub const GROUPS_FILE: &str = "control_groups.json";
pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Default)]
pub struct BootstrapData {
    pub points: Vec<Point>,
    pub groups: Vec<Group>,
    pub settings: Option<SystemSettings>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub points: usize,
    pub groups: usize,
    pub skipped: usize,
}

/// Read whatever bootstrap files exist in `dir`. Missing files are skipped;
/// a malformed file or entry is logged and skipped.
pub async fn load_data_dir(dir: &Path) -> BootstrapData {
    let settings = match read_file(&dir.join(SETTINGS_FILE)).await {
        Some(raw) => match serde_json::from_str::<SystemSettings>(&raw) {
            Ok(settings) => match settings.validate() {
                Ok(()) => Some(settings),
                Err(e) => {
                    tracing::warn!(file = SETTINGS_FILE, "Ignoring bootstrap settings: {}", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!(file = SETTINGS_FILE, "Malformed bootstrap settings: {}", e);
                None
            }
        },
        None => None,
    };

    BootstrapData {
        points: read_entries(&dir.join(POINTS_FILE)).await,
        groups: read_entries(&dir.join(GROUPS_FILE)).await,
        settings,
    }
}

async fn read_file(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Some(raw),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to read bootstrap file: {}", e);
            None
        }
    }
}

async fn read_entries<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let Some(raw) = read_file(path).await else {
        return Vec::new();
    };
    let entries: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %path.display(), "Malformed bootstrap file: {}", e);
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(path = %path.display(), index, "Skipping bootstrap entry: {}", e);
                None
            }
        })
        .collect()
}

/// Push loaded data through the regular create path, so stored statuses are
/// recomputed and bad entries are rejected like any other request.
pub async fn seed_service(service: &ControlService, data: BootstrapData) -> BootstrapReport {
    let mut report = BootstrapReport::default();

    for point in data.points {
        let id = point.id.clone();
        match service.create_point(point).await {
            Ok(_) => report.points += 1,
            Err(e) => {
                report.skipped += 1;
                tracing::warn!(point_id = %id, "Skipping bootstrap point: {}", e);
            }
        }
    }

    for group in data.groups {
        let id = group.id.clone();
        match service.create_group(group).await {
            Ok(_) => report.groups += 1,
            Err(e) => {
                report.skipped += 1;
                tracing::warn!(group_id = %id, "Skipping bootstrap group: {}", e);
            }
        }
    }

    tracing::info!(
        points = report.points,
        groups = report.groups,
        skipped = report.skipped,
        "Bootstrap data loaded"
    );
    report
}

struct SampleProfile {
    unit: &'static str,
    min: f64,
    max: f64,
    start: (f64, f64),
}

const SAMPLE_PROFILES: [SampleProfile; 7] = [
    SampleProfile { unit: "°C", min: 0.0, max: 100.0, start: (15.0, 30.0) },
    SampleProfile { unit: "kPa", min: 0.0, max: 1000.0, start: (100.0, 500.0) },
    SampleProfile { unit: "L/min", min: 0.0, max: 200.0, start: (10.0, 100.0) },
    SampleProfile { unit: "rpm", min: 0.0, max: 3000.0, start: (500.0, 2000.0) },
    SampleProfile { unit: "V", min: 0.0, max: 240.0, start: (110.0, 230.0) },
    SampleProfile { unit: "A", min: 0.0, max: 100.0, start: (5.0, 20.0) },
    SampleProfile { unit: "%", min: 0.0, max: 100.0, start: (0.0, 100.0) },
];

fn pick(random: &mut dyn RandomSource, len: usize) -> usize {
    let index = random.uniform(0.0, len as f64).floor() as usize;
    index.min(len - 1)
}

/// `count` sensors and actuators with realistic units and ranges.
/// Ids are `s-NN` / `a-NN`, numbered across the whole batch.
pub fn generate_sample_points(count: usize, random: &mut dyn RandomSource) -> Vec<Point> {
    let now = Utc::now();
    (1..=count)
        .map(|n| {
            let (point_type, prefix, label) = if pick(random, 2) == 0 {
                (PointType::Sensor, "s", "Sensor")
            } else {
                (PointType::Actuator, "a", "Actuator")
            };
            let profile = &SAMPLE_PROFILES[pick(random, SAMPLE_PROFILES.len())];
            let decimals = UnitCategory::of(Some(profile.unit)).decimals();
            let value = round_to(random.uniform(profile.start.0, profile.start.1), decimals);

            let mut point = Point::new(format!("{prefix}-{n:02}"), format!("{label} {n}"), point_type)
                .with_description(format!("Sample {} point #{n}", label.to_lowercase()))
                .with_unit(profile.unit)
                .with_bounds(profile.min, profile.max)
                .with_value(value);
            point.timestamp = Some(now);
            point
        })
        .collect()
}
