//! Custom date interval codecs
//!
//! Intervals the backend cannot bucket natively (day of week, day part,
//! month number, ...) are implemented as runtime fields computed per
//! document at query time, bucketed with a plain `terms` source, and
//! decoded back when the buckets are read.

use serde_json::{json, Map, Value};

/// A named interval with a runtime-field encoding.
///
/// Resolved once per request; calendar units the backend buckets natively
/// (`day`, `week`, `month`, ...) are not codecs and resolve to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalCodec {
    DayOfWeek,
    DayPart,
    MonthNumber,
    YearNumber,
    DayOfMonth,
    WeekNumber,
}

impl IntervalCodec {
    pub fn resolve(name: &str) -> Option<IntervalCodec> {
        match name {
            "dayofweek" => Some(IntervalCodec::DayOfWeek),
            "daypart" => Some(IntervalCodec::DayPart),
            "monthnr" => Some(IntervalCodec::MonthNumber),
            "yearnr" => Some(IntervalCodec::YearNumber),
            "dayofmonth" => Some(IntervalCodec::DayOfMonth),
            "weeknr" => Some(IntervalCodec::WeekNumber),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IntervalCodec::DayOfWeek => "dayofweek",
            IntervalCodec::DayPart => "daypart",
            IntervalCodec::MonthNumber => "monthnr",
            IntervalCodec::YearNumber => "yearnr",
            IntervalCodec::DayOfMonth => "dayofmonth",
            IntervalCodec::WeekNumber => "weeknr",
        }
    }

    /// Name of the runtime field computed from `base`.
    pub fn field_name(&self, base: &str) -> String {
        format!("{}_{}", base, self.name())
    }

    fn runtime_type(&self) -> &'static str {
        match self {
            IntervalCodec::DayOfWeek | IntervalCodec::DayPart => "keyword",
            _ => "long",
        }
    }

    fn script(&self, base: &str) -> String {
        match self {
            IntervalCodec::DayOfWeek => format!(
                "emit(doc['{}'].value.dayOfWeekEnum\
                 .getDisplayName(TextStyle.FULL, Locale.ROOT))",
                base
            ),
            IntervalCodec::DayPart => format!(
                "int h = doc['{}'].value.getHour(); \
                 if (h < 6) {{ emit('Night') }} \
                 else if (h < 12) {{ emit('Morning') }} \
                 else if (h < 18) {{ emit('Afternoon') }} \
                 else {{ emit('Evening') }}",
                base
            ),
            IntervalCodec::MonthNumber => format!("emit(doc['{}'].value.getMonthValue())", base),
            IntervalCodec::YearNumber => format!("emit(doc['{}'].value.getYear())", base),
            IntervalCodec::DayOfMonth => format!("emit(doc['{}'].value.getDayOfMonth())", base),
            IntervalCodec::WeekNumber => format!(
                "emit(doc['{}'].value.get(IsoFields.WEEK_OF_WEEK_BASED_YEAR))",
                base
            ),
        }
    }

    /// Runtime mapping fragment defining the computed field.
    pub fn runtime_mapping(&self, base: &str) -> Value {
        let mut mapping = Map::new();
        mapping.insert(
            self.field_name(base),
            json!({
                "type": self.runtime_type(),
                "script": { "source": self.script(base) }
            }),
        );
        Value::Object(mapping)
    }

    /// Convert a raw bucket key back to the domain value.
    ///
    /// The current codecs emit their domain value directly (day names, part
    /// labels, plain numbers); this is the seam for codecs that need a real
    /// reverse mapping.
    pub fn decode(&self, raw: &Value) -> Value {
        raw.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_names() {
        assert_eq!(
            IntervalCodec::resolve("dayofweek"),
            Some(IntervalCodec::DayOfWeek)
        );
        assert_eq!(
            IntervalCodec::resolve("weeknr"),
            Some(IntervalCodec::WeekNumber)
        );
        // native calendar units are not codecs
        assert_eq!(IntervalCodec::resolve("day"), None);
        assert_eq!(IntervalCodec::resolve("month"), None);
    }

    #[test]
    fn test_runtime_field_name() {
        assert_eq!(
            IntervalCodec::DayPart.field_name("published"),
            "published_daypart"
        );
    }

    #[test]
    fn test_runtime_mapping_shape() {
        let mapping = IntervalCodec::MonthNumber.runtime_mapping("date");
        let field = &mapping["date_monthnr"];
        assert_eq!(field["type"], json!("long"));
        assert!(field["script"]["source"]
            .as_str()
            .unwrap()
            .contains("getMonthValue"));
    }

    #[test]
    fn test_label_codecs_are_keyword() {
        let mapping = IntervalCodec::DayOfWeek.runtime_mapping("date");
        assert_eq!(mapping["date_dayofweek"]["type"], json!("keyword"));
    }

    #[test]
    fn test_decode_passthrough() {
        assert_eq!(
            IntervalCodec::DayOfWeek.decode(&json!("Monday")),
            json!("Monday")
        );
        assert_eq!(IntervalCodec::MonthNumber.decode(&json!(3)), json!(3));
    }
}
