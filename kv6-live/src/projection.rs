//! Rijksdriehoek (RD, EPSG:28992) to WGS84 conversion.
//!
//! Uses the Schreutelkamp / Strang van Hees polynomial approximation, which
//! expands latitude and longitude as a series in the normalized offsets from
//! the Amersfoort origin. The coefficients are the published fixed tables;
//! accuracy is around a metre over the Netherlands, which is far better
//! than the vehicle positions themselves.

use serde::Serialize;

/// Amersfoort origin in RD metres.
const X0: f64 = 155_000.0;
const Y0: f64 = 463_000.0;

/// Amersfoort origin in WGS84 degrees.
const PHI0: f64 = 52.155_174_40;
const LAM0: f64 = 5.387_206_21;

/// Latitude coefficients `(p, q, K_pq)`; terms are `K_pq * dX^p * dY^q` arcseconds.
const K: [(i32, i32, f64); 11] = [
    (0, 1, 3235.653_89),
    (2, 0, -32.582_97),
    (0, 2, -0.247_50),
    (2, 1, -0.849_78),
    (0, 3, -0.065_50),
    (2, 2, -0.017_09),
    (1, 0, -0.007_38),
    (4, 0, 0.005_30),
    (2, 3, -0.000_39),
    (4, 1, 0.000_33),
    (1, 1, -0.000_12),
];

/// Longitude coefficients `(p, q, L_pq)`.
const L: [(i32, i32, f64); 12] = [
    (1, 0, 5260.529_16),
    (1, 1, 105.946_84),
    (1, 2, 2.456_56),
    (3, 0, -0.818_85),
    (1, 3, 0.055_94),
    (3, 1, -0.056_07),
    (0, 1, 0.011_99),
    (3, 2, -0.002_56),
    (1, 4, 0.001_28),
    (0, 2, 0.000_22),
    (2, 0, -0.000_22),
    (5, 0, 0.000_26),
];

/// Bounds of the RD grid's area of use.
const X_MIN: f64 = -7_000.0;
const X_MAX: f64 = 300_000.0;
const Y_MIN: f64 = 289_000.0;
const Y_MAX: f64 = 629_000.0;

/// A planar RD coordinate in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RdPoint {
    pub x: f64,
    pub y: f64,
}

impl RdPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A geographic WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WgsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Why a coordinate could not be converted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProjectionError {
    /// NaN or infinite input
    #[error("coordinate ({x}, {y}) is not finite")]
    NotFinite { x: f64, y: f64 },

    /// Outside the area the approximation is valid for
    #[error("coordinate ({x}, {y}) is outside the RD domain")]
    OutOfBounds { x: f64, y: f64 },
}

/// Convert an RD coordinate to WGS84.
///
/// # Examples
///
/// ```
/// use kv6_live::projection::{RdPoint, rd_to_wgs84};
///
/// let origin = rd_to_wgs84(RdPoint::new(155_000.0, 463_000.0)).unwrap();
/// assert!((origin.latitude - 52.1551744).abs() < 1e-9);
/// assert!((origin.longitude - 5.38720621).abs() < 1e-9);
///
/// assert!(rd_to_wgs84(RdPoint::new(-1.0, -1.0)).is_err());
/// ```
pub fn rd_to_wgs84(point: RdPoint) -> Result<WgsPoint, ProjectionError> {
    let RdPoint { x, y } = point;

    if !x.is_finite() || !y.is_finite() {
        return Err(ProjectionError::NotFinite { x, y });
    }
    if !(X_MIN..=X_MAX).contains(&x) || !(Y_MIN..=Y_MAX).contains(&y) {
        return Err(ProjectionError::OutOfBounds { x, y });
    }

    let dx = (x - X0) * 1e-5;
    let dy = (y - Y0) * 1e-5;

    let series = |coefficients: &[(i32, i32, f64)]| -> f64 {
        coefficients
            .iter()
            .map(|&(p, q, c)| c * dx.powi(p) * dy.powi(q))
            .sum()
    };

    Ok(WgsPoint {
        latitude: PHI0 + series(&K) / 3600.0,
        longitude: LAM0 + series(&L) / 3600.0,
    })
}
