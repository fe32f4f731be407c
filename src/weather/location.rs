//! Location resolution: free text to a QWeather location id.
//!
//! City ids (all digits) and `lon,lat` pairs pass through unchanged. Names go
//! through the provider's city lookup first and the built-in table second.

use super::errors::WeatherError;
use super::provider::WeatherSource;

/// Major cities: (Chinese name, English name, QWeather id).
const CITY_TABLE: &[(&str, &str, &str)] = &[
    ("北京", "beijing", "101010100"),
    ("上海", "shanghai", "101020100"),
    ("广州", "guangzhou", "101280101"),
    ("深圳", "shenzhen", "101280601"),
    ("杭州", "hangzhou", "101210101"),
    ("南京", "nanjing", "101190101"),
    ("成都", "chengdu", "101270101"),
    ("武汉", "wuhan", "101200101"),
    ("重庆", "chongqing", "101040100"),
    ("天津", "tianjin", "101030100"),
    ("西安", "xi'an", "101110101"),
    ("苏州", "suzhou", "101190401"),
    ("郑州", "zhengzhou", "101180101"),
    ("长沙", "changsha", "101250101"),
    ("青岛", "qingdao", "101120201"),
    ("大连", "dalian", "101070201"),
    ("宁波", "ningbo", "101210401"),
    ("厦门", "xiamen", "101230201"),
    ("福州", "fuzhou", "101230101"),
    ("沈阳", "shenyang", "101070101"),
];

/// City id or coordinates: usable by the provider as-is.
pub fn is_direct(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && (text.chars().all(|c| c.is_ascii_digit()) || text.contains(','))
}

/// Look a city name up in the built-in table.
///
/// Chinese names match exactly (an optional trailing 市 is ignored); English
/// names match case-insensitively, with or without the apostrophe in Xi'an.
pub fn lookup_fallback(name: &str) -> Option<&'static str> {
    let name = name.trim();
    let zh = name.strip_suffix('市').unwrap_or(name);
    let en = name.to_lowercase().replace(' ', "");

    CITY_TABLE
        .iter()
        .find(|(cn, en_name, _)| *cn == zh || *en_name == en || en_name.replace('\'', "") == en)
        .map(|(_, _, id)| *id)
}

/// Client-side resolution without a provider round trip.
///
/// Unknown names are returned unchanged so the server can try its own lookup.
pub fn resolve_locally(input: &str) -> String {
    let text = input.trim();
    if is_direct(text) {
        return text.to_string();
    }
    match lookup_fallback(text) {
        Some(id) => {
            tracing::info!(input = text, id, "resolved city from built-in table");
            id.to_string()
        }
        None => {
            tracing::warn!(input = text, "city not in built-in table, passing through");
            text.to_string()
        }
    }
}

/// Full resolution: pass-through, provider lookup, then the built-in table.
pub async fn resolve(source: &dyn WeatherSource, input: &str) -> Result<String, WeatherError> {
    let text = input.trim();
    if text.is_empty() {
        return Err(WeatherError::Unresolved {
            location: input.to_string(),
        });
    }
    if is_direct(text) {
        tracing::debug!(location = text, "location is an id or coordinates");
        return Ok(text.to_string());
    }

    match source.lookup_city(text).await {
        Ok(Some(id)) => return Ok(id),
        Ok(None) => tracing::warn!(location = text, source = source.name(), "city lookup found no match"),
        Err(e) => tracing::warn!(location = text, error = %e, "city lookup failed"),
    }

    lookup_fallback(text)
        .map(str::to_string)
        .ok_or_else(|| WeatherError::Unresolved {
            location: text.to_string(),
        })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::provider::{DailyRecord, WarningRecord};
    use async_trait::async_trait;

    struct FailingLookup;

    #[async_trait]
    impl WeatherSource for FailingLookup {
        fn name(&self) -> &str {
            "failing"
        }
        async fn lookup_city(&self, _name: &str) -> Result<Option<String>, WeatherError> {
            Err(WeatherError::Status {
                endpoint: "v2/city/lookup".into(),
                status: 403,
            })
        }
        async fn warnings(&self, _location: &str) -> Result<Vec<WarningRecord>, WeatherError> {
            Ok(vec![])
        }
        async fn daily_forecast(
            &self,
            _location: &str,
            _days: u32,
        ) -> Result<Vec<DailyRecord>, WeatherError> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_direct_forms() {
        assert!(is_direct("101010100"));
        assert!(is_direct("116.41,39.92"));
        assert!(!is_direct("Beijing"));
        assert!(!is_direct(""));
    }

    #[test]
    fn test_fallback_table() {
        assert_eq!(lookup_fallback("北京"), Some("101010100"));
        assert_eq!(lookup_fallback("北京市"), Some("101010100"));
        assert_eq!(lookup_fallback("Shanghai"), Some("101020100"));
        assert_eq!(lookup_fallback("xian"), Some("101110101"));
        assert_eq!(lookup_fallback("Xi'an"), Some("101110101"));
        assert_eq!(lookup_fallback("Atlantis"), None);
        assert_eq!(CITY_TABLE.len(), 20);
    }

    #[test]
    fn test_resolve_locally() {
        assert_eq!(resolve_locally(" 深圳 "), "101280601");
        assert_eq!(resolve_locally("116.41,39.92"), "116.41,39.92");
        assert_eq!(resolve_locally("Kyoto"), "Kyoto");
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_table_when_lookup_fails() {
        assert_eq!(resolve(&FailingLookup, "Chengdu").await.unwrap(), "101270101");
        assert_eq!(resolve(&FailingLookup, "101010100").await.unwrap(), "101010100");
    }

    #[tokio::test]
    async fn test_resolve_unknown_is_error() {
        let err = resolve(&FailingLookup, "Atlantis").await.unwrap_err();
        assert!(matches!(err, WeatherError::Unresolved { location } if location == "Atlantis"));
        assert!(resolve(&FailingLookup, "   ").await.is_err());
    }
}
