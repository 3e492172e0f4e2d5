//! OSRM `/route` resolver.
//!
//! Coordinates go out longitude-first (`lng,lat;lng,lat`) and the GeoJSON
//! geometry comes back as `[lng, lat]` pairs.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::RouteResolver;
use crate::error::RouteError;
use crate::geo::Coordinate;

#[derive(Debug, Clone)]
pub struct OsrmResolver {
    client: Client,
    endpoint: String,
}

impl OsrmResolver {
    /// Resolver for an OSRM endpoint (e.g. `http://localhost:5000`).
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn route_url(&self, points: &[Coordinate]) -> String {
        format!(
            "{}/route/v1/driving/{}?overview=full&geometries=geojson",
            self.endpoint,
            encode_coordinates(points)
        )
    }
}

#[async_trait]
impl RouteResolver for OsrmResolver {
    async fn resolve(&self, points: &[Coordinate]) -> Result<Vec<Coordinate>, RouteError> {
        let response = self
            .client
            .get(self.route_url(points))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let parsed: OsrmRouteResponse = response
            .json()
            .await
            .map_err(|err| RouteError::InvalidResponse(err.to_string()))?;
        parse_route_response(parsed)
    }
}

fn transport_error(err: reqwest::Error) -> RouteError {
    if err.is_timeout() {
        RouteError::Timeout
    } else {
        RouteError::Transport(err.to_string())
    }
}

/// 429 and 503 mean "try again later"; every other failure status is final.
fn classify_status(status: StatusCode) -> RouteError {
    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
            RouteError::Unavailable {
                status: status.as_u16(),
            }
        }
        _ => RouteError::Rejected {
            status: status.as_u16(),
        },
    }
}

pub(crate) fn encode_coordinates(points: &[Coordinate]) -> String {
    points
        .iter()
        .map(|p| format!("{},{}", p.lng, p.lat))
        .collect::<Vec<_>>()
        .join(";")
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsrmRouteResponse {
    code: String,
    routes: Option<Vec<OsrmRoute>>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

pub(crate) fn parse_route_response(
    response: OsrmRouteResponse,
) -> Result<Vec<Coordinate>, RouteError> {
    if response.code != "Ok" {
        return Err(RouteError::InvalidResponse(response.code));
    }
    let route = response
        .routes
        .and_then(|routes| routes.into_iter().next())
        .ok_or(RouteError::NoRoute)?;

    Ok(route
        .geometry
        .coordinates
        .into_iter()
        .map(|[lng, lat]| Coordinate::new(lat, lng))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_longitude_first() {
        let points = [Coordinate::new(-28.26, -52.40), Coordinate::new(-28.23, -52.38)];
        assert_eq!(encode_coordinates(&points), "-52.4,-28.26;-52.38,-28.23");
    }

    #[test]
    fn parses_geojson_geometry_into_lat_lng() {
        let body = r#"{
            "code": "Ok",
            "routes": [{ "geometry": { "coordinates": [[-52.40, -28.26], [-52.39, -28.25]] } }]
        }"#;
        let parsed: OsrmRouteResponse = serde_json::from_str(body).expect("json");
        let path = parse_route_response(parsed).expect("route");
        assert_eq!(path[0], Coordinate::new(-28.26, -52.40));
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn non_ok_code_is_invalid() {
        let parsed: OsrmRouteResponse =
            serde_json::from_str(r#"{ "code": "NoSegment" }"#).expect("json");
        assert_eq!(
            parse_route_response(parsed),
            Err(RouteError::InvalidResponse("NoSegment".into()))
        );
    }

    #[test]
    fn rate_limits_are_retryable_but_bad_requests_are_not() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE).is_retryable());
        assert!(!classify_status(StatusCode::BAD_REQUEST).is_retryable());
    }
}
