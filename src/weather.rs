use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    debug_handler,
    extract::{Query, State},
    response::Response,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{res, AppError, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/info", get(info))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Weather {
    pub success: bool,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: i64,
    pub condition: String,
    pub description: String,
    pub icon: String,
    pub wind_speed: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uv: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_day: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Weather {
    /// Shown when no live reading is available.
    pub fn fallback() -> Self {
        Weather {
            success: false,
            temperature: 22.2,
            feels_like: 23.3,
            humidity: 65,
            condition: "Clear".to_owned(),
            description: "clear sky".to_owned(),
            icon: "01d".to_owned(),
            wind_speed: 12.9,
            wind_dir: None,
            pressure: None,
            uv: None,
            is_day: None,
            last_updated: None,
            message: Some("Using fallback weather data".to_owned()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Place {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tz_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub localtime: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherReport {
    pub weather: Weather,
    pub location: Place,
}

impl WeatherReport {
    pub fn fallback() -> Self {
        WeatherReport { weather: Weather::fallback(), location: Place::default() }
    }
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Never fails; degrades to [`WeatherReport::fallback`].
    async fn current(&self, latitude: f64, longitude: f64) -> WeatherReport;
}

pub struct WeatherApi {
    http_client: reqwest::Client,
    api_key: Option<String>,
}

impl WeatherApi {
    pub fn new(api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http_client: reqwest::Client::builder().timeout(timeout).build()?,
            api_key,
        })
    }

    async fn fetch(&self, api_key: &str, latitude: f64, longitude: f64) -> anyhow::Result<WeatherReport> {
        let body: CurrentResponse = self
            .http_client
            .get("https://api.weatherapi.com/v1/current.json")
            .query(&[
                ("key", api_key.to_owned()),
                ("q", format!("{latitude:.6},{longitude:.6}")),
                ("aqi", "no".to_owned()),
            ])
            .send()
            .await
            .map_err(reqwest::Error::without_url)?
            .error_for_status()
            .map_err(reqwest::Error::without_url)?
            .json()
            .await
            .map_err(reqwest::Error::without_url)?;
        Ok(body.into_report())
    }
}

#[async_trait]
impl WeatherProvider for WeatherApi {
    async fn current(&self, latitude: f64, longitude: f64) -> WeatherReport {
        let Some(api_key) = self.api_key.as_deref() else {
            return WeatherReport::fallback();
        };
        match self.fetch(api_key, latitude, longitude).await {
            Ok(report) => report,
            Err(err) => {
                warn!(error = %err, "weather lookup failed, using fallback");
                WeatherReport::fallback()
            }
        }
    }
}

#[derive(Deserialize)]
struct CurrentResponse {
    current: Current,
    location: Location,
}

#[derive(Deserialize)]
struct Current {
    temp_c: f64,
    feelslike_c: f64,
    humidity: i64,
    condition: Condition,
    wind_kph: f64,
    wind_dir: Option<String>,
    pressure_mb: Option<f64>,
    uv: Option<f64>,
    is_day: Option<i64>,
    last_updated: Option<String>,
}

#[derive(Deserialize)]
struct Condition {
    text: String,
    icon: String,
}

#[derive(Deserialize)]
struct Location {
    name: Option<String>,
    region: Option<String>,
    country: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    tz_id: Option<String>,
    localtime: Option<String>,
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

impl CurrentResponse {
    fn into_report(self) -> WeatherReport {
        let Self { current, location } = self;
        let icon = if current.condition.icon.starts_with("http") {
            current.condition.icon
        } else {
            format!("https:{}", current.condition.icon)
        };
        WeatherReport {
            weather: Weather {
                success: true,
                temperature: round1(current.temp_c),
                feels_like: round1(current.feelslike_c),
                humidity: current.humidity,
                description: current.condition.text.clone(),
                condition: current.condition.text,
                icon,
                wind_speed: round1(current.wind_kph),
                wind_dir: current.wind_dir,
                pressure: current.pressure_mb.map(f64::round),
                uv: current.uv,
                is_day: current.is_day.map(|d| d == 1),
                last_updated: current.last_updated,
                message: None,
            },
            location: Place {
                city: location.name,
                region: location.region,
                country: location.country,
                lat: location.lat,
                lon: location.lon,
                tz_id: location.tz_id,
                localtime: location.localtime,
            },
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct Coordinates {
    latitude: f64,
    longitude: f64,
}

#[debug_handler(state = AppState)]
pub(crate) async fn info(
    State(weather): State<Arc<dyn WeatherProvider>>,
    Query(Coordinates { latitude, longitude }): Query<Coordinates>,
) -> AppResult<Response> {
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(AppError::validation("Coordinates out of range"));
    }
    Ok(res::ok("Weather retrieved", weather.current(latitude, longitude).await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_falls_back() {
        let api = WeatherApi::new(None, Duration::from_secs(1)).unwrap();
        let report = api.current(51.5, -0.12).await;
        assert_eq!(report, WeatherReport::fallback());

        let body = serde_json::to_value(&report).unwrap();
        assert_eq!(body["weather"]["success"], false);
        assert_eq!(body["weather"]["feelsLike"], 23.3);
        assert_eq!(body["location"], serde_json::json!({}));
    }

    #[test]
    fn test_live_reply_is_mapped() {
        let body: CurrentResponse = serde_json::from_value(serde_json::json!({
            "location": { "name": "Leeds", "region": "West Yorkshire", "country": "UK", "lat": 53.8, "lon": -1.55 },
            "current": {
                "temp_c": 11.04, "feelslike_c": 9.96, "humidity": 80,
                "condition": { "text": "Light rain", "icon": "//cdn.weatherapi.com/rain.png" },
                "wind_kph": 14.44, "pressure_mb": 1012.4, "is_day": 1
            }
        }))
        .unwrap();
        let report = body.into_report();

        assert!(report.weather.success);
        assert_eq!(report.weather.temperature, 11.0);
        assert_eq!(report.weather.wind_speed, 14.4);
        assert_eq!(report.weather.icon, "https://cdn.weatherapi.com/rain.png");
        assert_eq!(report.weather.is_day, Some(true));
        assert_eq!(report.location.city.as_deref(), Some("Leeds"));
    }
}
