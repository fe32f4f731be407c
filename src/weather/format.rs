//! Plain-text rendering of weather records for tool output.

use super::provider::{DailyRecord, WarningRecord};

/// Separator between rendered records.
pub const BLOCK_SEPARATOR: &str = "\n---\n";

fn or_unknown(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("unknown")
}

pub fn format_warning(w: &WarningRecord) -> String {
    format!(
        "Warning ID: {}\n\
         Title: {}\n\
         Published: {}\n\
         Start: {}\n\
         End: {}\n\
         Type: {}\n\
         Severity: {} ({})\n\
         Issued by: {}\n\
         Status: {}\n\
         Details: {}",
        or_unknown(&w.id),
        or_unknown(&w.title),
        or_unknown(&w.pub_time),
        or_unknown(&w.start_time),
        or_unknown(&w.end_time),
        or_unknown(&w.type_name),
        or_unknown(&w.severity),
        or_unknown(&w.severity_color),
        or_unknown(&w.sender),
        or_unknown(&w.status),
        w.text.as_deref().unwrap_or("no details"),
    )
}

pub fn format_daily(d: &DailyRecord) -> String {
    format!(
        "Date: {}\n\
         Sunrise: {}  Sunset: {}\n\
         High: {}°C  Low: {}°C\n\
         Day: {}  Night: {}\n\
         Day wind: {} force {} ({} km/h)\n\
         Night wind: {} force {} ({} km/h)\n\
         Humidity: {}%\n\
         Precipitation: {} mm\n\
         UV index: {}\n\
         Visibility: {} km",
        or_unknown(&d.fx_date),
        or_unknown(&d.sunrise),
        or_unknown(&d.sunset),
        or_unknown(&d.temp_max),
        or_unknown(&d.temp_min),
        or_unknown(&d.text_day),
        or_unknown(&d.text_night),
        or_unknown(&d.wind_dir_day),
        or_unknown(&d.wind_scale_day),
        or_unknown(&d.wind_speed_day),
        or_unknown(&d.wind_dir_night),
        or_unknown(&d.wind_scale_night),
        or_unknown(&d.wind_speed_night),
        or_unknown(&d.humidity),
        or_unknown(&d.precip),
        or_unknown(&d.uv_index),
        or_unknown(&d.vis),
    )
}

/// Render every warning, or a short notice when there are none.
pub fn format_warnings(location: &str, warnings: &[WarningRecord]) -> String {
    if warnings.is_empty() {
        return format!("No active weather warnings for {location}.");
    }
    warnings
        .iter()
        .map(format_warning)
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

pub fn format_forecast(days: &[DailyRecord]) -> String {
    days.iter()
        .map(format_daily)
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}
