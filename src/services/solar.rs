//! Solar position calculator.
//!
//! Pure astronomical functions mapping a UTC timestamp and geographic
//! coordinates to the sun's azimuth, elevation and declination. No I/O and
//! no shared state; batch timelines call these thousands of times in tight
//! loops.
//!
//! The ephemeris is the standard low-precision model: day number since
//! J2000 gives mean longitude and mean anomaly, from which ecliptic
//! longitude, declination and the equation of time follow; the hour angle
//! comes from UTC time corrected by the equation of time and longitude;
//! azimuth/elevation fall out of spherical trigonometry. Accuracy is a few
//! arc minutes, orders of magnitude below footprint digitization error.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::api::{CoreResult, GeoLocation, SolarPosition};

/// Civil sunrise/sunset threshold in degrees (refraction + solar radius).
const HORIZON_ELEVATION_DEG: f64 = -0.833;

/// Compute the solar position for one place and instant.
///
/// Fails only on domain validation: latitude outside [-90, 90] or
/// longitude outside [-180, 180].
pub fn solar_position(
    timestamp: DateTime<Utc>,
    latitude: f64,
    longitude: f64,
) -> CoreResult<SolarPosition> {
    GeoLocation::new(latitude, longitude)?;

    let n = days_since_j2000(timestamp);
    let (declination_deg, eot_minutes) = declination_and_eot(n);

    let utc_hours = fractional_utc_hours(timestamp);
    let solar_time = utc_hours + eot_minutes / 60.0 + longitude / 15.0;
    let hour_angle_deg = normalize_degrees_signed(15.0 * (solar_time - 12.0));

    let lat_rad = latitude.to_radians();
    let dec_rad = declination_deg.to_radians();
    let hour_rad = hour_angle_deg.to_radians();

    let elevation_rad = (lat_rad.sin() * dec_rad.sin()
        + lat_rad.cos() * dec_rad.cos() * hour_rad.cos())
    .asin();

    // Azimuth as compass bearing, clockwise from north. Near the zenith the
    // bearing is undefined; fall back to due south.
    let cos_elevation = elevation_rad.cos();
    let azimuth_deg = if cos_elevation.abs() < 1e-9 {
        180.0
    } else {
        let cos_az = ((dec_rad.sin() * lat_rad.cos()
            - dec_rad.cos() * lat_rad.sin() * hour_rad.cos())
            / cos_elevation)
            .clamp(-1.0, 1.0);
        let az = cos_az.acos().to_degrees();
        if hour_angle_deg > 0.0 {
            360.0 - az
        } else {
            az
        }
    };

    Ok(SolarPosition {
        timestamp,
        latitude,
        longitude,
        azimuth_deg,
        elevation_deg: elevation_rad.to_degrees(),
        declination_deg,
    })
}

/// Whether the sun is above the horizon for this position.
pub fn is_sun_visible(position: &SolarPosition) -> bool {
    position.elevation_deg > 0.0
}

/// UTC instant of solar noon (hour angle zero) for a date and location.
pub fn solar_noon(date: NaiveDate, latitude: f64, longitude: f64) -> CoreResult<DateTime<Utc>> {
    GeoLocation::new(latitude, longitude)?;

    let midday = day_start(date) + chrono::Duration::hours(12);
    let (_, eot_minutes) = declination_and_eot(days_since_j2000(midday));

    let noon_hours = 12.0 - eot_minutes / 60.0 - longitude / 15.0;
    let seconds = (noon_hours.rem_euclid(24.0) * 3600.0).round() as i64;
    Ok(day_start(date) + chrono::Duration::seconds(seconds))
}

/// Civil sunrise and sunset for a date and location. `None` under polar
/// conditions (midnight sun or polar night).
pub fn sunrise_sunset(
    date: NaiveDate,
    latitude: f64,
    longitude: f64,
) -> CoreResult<Option<(DateTime<Utc>, DateTime<Utc>)>> {
    let noon = solar_noon(date, latitude, longitude)?;
    let (declination_deg, _) = declination_and_eot(days_since_j2000(noon));

    let lat_rad = latitude.to_radians();
    let dec_rad = declination_deg.to_radians();
    let cos_h0 = (HORIZON_ELEVATION_DEG.to_radians().sin() - lat_rad.sin() * dec_rad.sin())
        / (lat_rad.cos() * dec_rad.cos());

    if !(-1.0..=1.0).contains(&cos_h0) {
        return Ok(None);
    }

    let half_day_hours = cos_h0.acos().to_degrees() / 15.0;
    let half_day = chrono::Duration::seconds((half_day_hours * 3600.0).round() as i64);
    Ok(Some((noon - half_day, noon + half_day)))
}

/// Fractional days since the J2000.0 epoch (2000-01-01 12:00 UTC).
fn days_since_j2000(timestamp: DateTime<Utc>) -> f64 {
    let j2000 = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).single();
    match j2000 {
        Some(epoch) => (timestamp - epoch).num_milliseconds() as f64 / 86_400_000.0,
        None => 0.0,
    }
}

/// Solar declination (degrees) and equation of time (minutes) for a day
/// number since J2000.
fn declination_and_eot(n: f64) -> (f64, f64) {
    let mean_longitude = (280.460 + 0.985_647_4 * n).rem_euclid(360.0);
    let mean_anomaly_rad = (357.528 + 0.985_600_3 * n).rem_euclid(360.0).to_radians();

    let ecliptic_longitude_deg = mean_longitude
        + 1.915 * mean_anomaly_rad.sin()
        + 0.020 * (2.0 * mean_anomaly_rad).sin();
    let lambda_rad = ecliptic_longitude_deg.to_radians();

    let obliquity_rad = (23.439 - 0.000_000_4 * n).to_radians();
    let declination_deg = (obliquity_rad.sin() * lambda_rad.sin()).asin().to_degrees();

    // Right ascension in the same revolution as the ecliptic longitude so
    // the equation of time stays small.
    let alpha_deg = (obliquity_rad.cos() * lambda_rad.sin())
        .atan2(lambda_rad.cos())
        .to_degrees()
        .rem_euclid(360.0);
    let eot_minutes = 4.0 * normalize_degrees_signed(mean_longitude - alpha_deg);

    (declination_deg, eot_minutes)
}

fn fractional_utc_hours(timestamp: DateTime<Utc>) -> f64 {
    let midnight = day_start(timestamp.date_naive());
    (timestamp - midnight).num_milliseconds() as f64 / 3_600_000.0
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Wrap an angle into (-180, 180].
fn normalize_degrees_signed(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}
